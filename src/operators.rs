use core::ops::Range;
use crate::field::Field;
use crate::mesh::Mesh;
use crate::subset::{secondary_offsets, LevelSet};




/**
 * Coefficients `c_j` of the one-dimensional interpolating prediction
 * operators, indexed by order. A child's value is its parent's value plus
 * `±c_j` times the difference of the parent's neighbours at distance `j`.
 */
pub const PREDICTION_COEFFICIENTS: [&[f64]; 4] = [
    &[],
    &[-1.0 / 8.0],
    &[-22.0 / 128.0, 3.0 / 128.0],
    &[-201.0 / 1024.0, 11.0 / 256.0, -5.0 / 1024.0],
];




/**
 * Return the one-dimensional weights `w[o][m + k]` of the prediction of
 * order `k`, where `o` is the child's position within its parent (0 or 1)
 * and `m` runs over the stencil `-k..=k`. The weights of each row sum to one,
 * and the two rows average to the unit vector at `m = 0`, which makes the
 * operator conservative.
 */
pub fn prediction_weights(order: usize) -> [Vec<f64>; 2] {
    let k = order;
    let c = PREDICTION_COEFFICIENTS[order];
    let mut w = [vec![0.0; 2 * k + 1], vec![0.0; 2 * k + 1]];
    w[0][k] = 1.0;
    w[1][k] = 1.0;

    for j in 1..=k {
        w[0][k + j] = c[j - 1];
        w[0][k - j] = -c[j - 1];
        w[1][k + j] = -c[j - 1];
        w[1][k - j] = c[j - 1];
    }
    w
}




/**
 * Return the projected values of a range of cells at `level`: the mean of
 * their `2^DIM` children at `level + 1`. The children must be stored.
 */
pub fn projection_values<const DIM: usize>(
    mesh: &Mesh<DIM>,
    field: &Field<f64, DIM>,
    level: usize,
    range: &Range<i64>,
    key: &[i64; DIM]) -> Vec<f64>
{
    let n = field.n_comp();
    let len = (range.end - range.start) as usize;
    let fine_range = range.start * 2..range.end * 2;
    let mut values = vec![0.0; len * n];

    for offset in secondary_offsets::<DIM>(0..2) {
        let mut child_key = *key;

        for d in 1..DIM {
            child_key[d] = 2 * key[d] + offset[d]
        }
        let source = field.interval(mesh, level + 1, &fine_range, &child_key);

        for x in 0..len {
            for c in 0..n {
                values[x * n + c] += source[2 * x * n + c] + source[(2 * x + 1) * n + c]
            }
        }
    }
    let scale = 1.0 / (1 << DIM) as f64;

    for v in values.iter_mut() {
        *v *= scale
    }
    values
}




/**
 * Return the predicted values of a range of cells at `level`, interpolated
 * from their parents at `level - 1` with the tensor-product operator of the
 * given order. The parents and their neighbours within `order` cells along
 * every axis must be stored.
 */
pub fn prediction_values<const DIM: usize>(
    mesh: &Mesh<DIM>,
    field: &Field<f64, DIM>,
    order: usize,
    level: usize,
    range: &Range<i64>,
    key: &[i64; DIM]) -> Vec<f64>
{
    assert!(level > 0, "cannot predict cells at level 0");

    let n = field.n_comp();
    let k = order as i64;
    let weights = prediction_weights(order);
    let span = (range.start >> 1) - k..((range.end - 1) >> 1) + 1 + k;
    let mut values = vec![0.0; (range.end - range.start) as usize * n];
    let mut parent_key = *key;

    for d in 1..DIM {
        parent_key[d] = key[d] >> 1
    }

    for offset in secondary_offsets::<DIM>(-k..k + 1) {
        let mut row = parent_key;
        let mut w = 1.0;

        for d in 1..DIM {
            w *= weights[(key[d] & 1) as usize][(offset[d] + k) as usize];
            row[d] += offset[d];
        }
        let source = field.interval(mesh, level - 1, &span, &row);

        for (x, i) in range.clone().enumerate() {
            let p = i >> 1;
            let o = (i & 1) as usize;

            for m in -k..=k {
                let wm = w * weights[o][(m + k) as usize];
                let s = (p + m - span.start) as usize * n;

                for c in 0..n {
                    values[x * n + c] += wm * source[s + c]
                }
            }
        }
    }
    values
}




/**
 * Fill a set of cells by projection from their children. The targets are
 * expressed at the level being filled.
 */
pub fn project<const DIM: usize>(mesh: &Mesh<DIM>, field: &mut Field<f64, DIM>, targets: &LevelSet<DIM>) {
    let level = targets.level();

    targets.apply(|range, key| {
        let values = projection_values(mesh, field, level, range, key);
        field.interval_mut(mesh, level, range, key).copy_from_slice(&values)
    })
}




/**
 * Fill a set of cells by prediction from their parents. The targets are
 * expressed at the level being filled.
 */
pub fn predict<const DIM: usize>(mesh: &Mesh<DIM>, field: &mut Field<f64, DIM>, order: usize, targets: &LevelSet<DIM>) {
    let level = targets.level();

    targets.apply(|range, key| {
        let values = prediction_values(mesh, field, order, level, range, key);
        field.interval_mut(mesh, level, range, key).copy_from_slice(&values)
    })
}




// ============================================================================
#[cfg(test)]
mod test {

    use crate::cell_array::CellList;
    use crate::config::Config;
    use crate::domain::Domain;
    use crate::field::Field;
    use crate::index_space::IndexBox;
    use crate::mesh::{Mesh, MeshRole};
    use super::*;

    /**
     * Exact mean of x^p over the cell `i` of width `h`.
     */
    fn cell_mean(p: i32, i: i64, h: f64) -> f64 {
        let (a, b) = (i as f64 * h, (i + 1) as f64 * h);
        (b.powi(p + 1) - a.powi(p + 1)) / ((p + 1) as f64 * h)
    }

    /**
     * 1D mesh on [0, 32) at level 4: level 3 leaves on the left half and
     * level 4 leaves on the right half.
     */
    fn jump_mesh_1d(order: usize) -> Mesh<1> {
        let config = Config::with_levels(3, 4).prediction_order(order).ghost_width(3);
        let mut cells = CellList::new(4);
        cells.add_interval(3, 0..8, [0]);
        cells.add_interval(4, 16..32, [0]);
        Mesh::new(config, Domain::bounded(4, IndexBox::new([0], [32])), cells).unwrap()
    }

    /**
     * 2D mesh on [0, 8)^2 at level 3: level 1 leaves for i = 0 and level 2
     * leaves for i in [2, 4).
     */
    fn jump_mesh_2d() -> Mesh<2> {
        let mut cells = CellList::new(3);
        cells.add_interval(1, 0..1, [0, 0]);
        cells.add_interval(1, 0..1, [0, 1]);
        for j in 0..4 {
            cells.add_interval(2, 2..4, [0, j]);
        }
        Mesh::new(Config::with_levels(1, 3), Domain::bounded(3, IndexBox::new([0, 0], [8, 8])), cells).unwrap()
    }

    #[test]
    fn weights_are_conservative() {
        for order in 0..=3 {
            let w = prediction_weights(order);
            for o in 0..2 {
                assert!((w[o].iter().sum::<f64>() - 1.0).abs() < 1e-14);
            }
            for m in 0..w[0].len() {
                let mean = 0.5 * (w[0][m] + w[1][m]);
                assert!((mean - if m == order { 1.0 } else { 0.0 }).abs() < 1e-14);
            }
        }
    }

    #[test]
    fn projection_is_the_mean_of_children() {
        let mesh = jump_mesh_2d();
        let field = Field::from_fn("u", 1, &mesh, |_, [i, j], u: &mut [f64]| u[0] = (i + 10 * j) as f64);
        assert!(mesh.level_set(MeshRole::ProjCells, 1).contains([1, 0]));
        let values = projection_values(&mesh, &field, 1, &(1..2), &[0, 0]);
        assert_eq!(values, vec![0.25 * (2.0 + 3.0 + 12.0 + 13.0)]);
    }

    #[test]
    fn projection_conserves_the_children_total() {
        let mesh = jump_mesh_2d();
        let mut field = Field::from_fn("u", 2, &mesh, |level, [i, j], u: &mut [f64]| {
            u[0] = ((i * 7 + j * 3) % 5) as f64 + level as f64;
            u[1] = (i * j) as f64;
        });
        let targets = mesh.level_set(MeshRole::ProjCells, 1).clone();
        project(&mesh, &mut field, &targets);

        for cell in targets.cells() {
            for c in 0..2 {
                let children: f64 = (0..2).flat_map(|a| (0..2).map(move |b| [2 * cell[0] + a, 2 * cell[1] + b]))
                    .map(|child| field.get(&mesh, 2, child)[c])
                    .sum();
                assert!((field.get(&mesh, 1, cell)[c] * 4.0 - children).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn prediction_reproduces_polynomials_of_its_order() {
        for order in 1..=3 {
            let mesh = jump_mesh_1d(order);
            let degree = 2 * order as i32;
            let field = Field::from_fn("u", 1, &mesh, |level, [i], u: &mut [f64]| {
                u[0] = cell_mean(degree, i, 1.0 / (1 << level) as f64)
            });
            let pred = mesh.level_set(MeshRole::PredCells, 4).clone();
            assert!(!pred.is_empty());

            pred.apply(|range, key| {
                let values = prediction_values(&mesh, &field, order, 4, range, key);
                for (x, i) in range.clone().enumerate() {
                    let exact = cell_mean(degree, i, 1.0 / 16.0);
                    assert!((values[x] - exact).abs() < 1e-10 * exact.abs().max(1.0), "order {} cell {}: {} != {}", order, i, values[x], exact);
                }
            });
        }
    }

    #[test]
    fn prediction_is_conservative() {
        let mesh = jump_mesh_1d(2);
        let field = Field::from_fn("u", 1, &mesh, |_, [i], u: &mut [f64]| u[0] = ((i * 37) % 11) as f64);
        let values = prediction_values(&mesh, &field, 2, 4, &(14..16), &[0]);
        let parent = field.get(&mesh, 3, [7])[0];
        assert!((0.5 * (values[0] + values[1]) - parent).abs() < 1e-12);
    }

    #[test]
    fn order_zero_prediction_copies_the_parent() {
        let mesh = jump_mesh_1d(0);
        let field = Field::from_fn("u", 1, &mesh, |level, [i], u: &mut [f64]| u[0] = (level as i64 * 100 + i) as f64);
        let values = prediction_values(&mesh, &field, 0, 4, &(14..16), &[0]);
        assert_eq!(values, vec![307.0, 307.0]);
    }
}
