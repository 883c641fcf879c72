use log::debug;
use crate::boundary::BoundaryCondition;
use crate::error::Result;
use crate::field::Field;
use crate::halo::{self, exchange_field};
use crate::mesh::{Mesh, MeshRole};
use crate::message::comm::Communicator;
use crate::observer::{timed, Observer, Phase};
use crate::operators;
use crate::subset::LevelSet;
use crate::tag::Tag;




/**
 * Return the range of levels holding reference cells on any rank. Every rank
 * of the communicator must call this collectively.
 */
pub fn global_level_bounds<C: Communicator, const DIM: usize>(mesh: &Mesh<DIM>, comm: &C) -> Result<(usize, usize)> {
    let reference = &mesh[MeshRole::Reference];
    let max_level = mesh.config().max_level;
    let min = reference.min_level().unwrap_or(max_level) as u64;
    let max = reference.finest_level().unwrap_or(0) as u64;
    let min = comm.all_reduce_min(min)? as usize;
    let max = comm.all_reduce_max(max)? as usize;
    Ok((min, max.max(min)))
}




/**
 * Make every ghost value of the given fields consistent with the leaves:
 * projection cells are filled from finer data, prediction cells from coarser
 * data, cells outside the domain from their periodic images or the boundary
 * condition, and cells owned by other ranks by halo exchange. Every rank of
 * the communicator must call this collectively, with the same fields in the
 * same order.
 */
pub fn update_ghosts<B, C, O, const DIM: usize>(
    mesh: &Mesh<DIM>,
    fields: &mut [&mut Field<f64, DIM>],
    bc: &B,
    comm: &C,
    observer: &mut O) -> Result<()>
where
    B: BoundaryCondition<DIM>,
    C: Communicator,
    O: Observer,
{
    timed(observer, Phase::GhostUpdate, |observer| {
        let (min, max) = global_level_bounds(mesh, comm)?;
        let order = mesh.config().prediction_order;
        debug!("ghost update of {} fields over levels {}..={}", fields.len(), min, max);

        for field in fields.iter_mut() {
            let field: &mut Field<f64, DIM> = field;

            for level in (min + 1..=max).rev() {
                update_ghost_subdomains(mesh, level, field, comm, observer)?;
                update_ghost_periodic(mesh, level, field, observer);

                let targets = mesh.level_set(MeshRole::ProjCells, level - 1);
                timed(observer, Phase::Projection, |_| operators::project(mesh, field, targets));
            }

            update_ghost_subdomains(mesh, min, field, comm, observer)?;
            update_ghost_periodic(mesh, min, field, observer);
            update_bc(mesh, min, field, bc, observer);

            for level in min + 1..=max {
                let targets = mesh.level_set(MeshRole::PredCells, level);
                timed(observer, Phase::Prediction, |_| operators::predict(mesh, field, order, targets));
                update_ghost_subdomains(mesh, level, field, comm, observer)?;
                update_ghost_periodic(mesh, level, field, observer);
                update_bc(mesh, level, field, bc, observer);
            }
        }
        Ok(())
    })
}




/**
 * Overwrite the cells of a level which belong to a neighbour's subdomain
 * with the neighbour's values. A no-op on a rank without neighbours.
 */
pub fn update_ghost_subdomains<C, O, const DIM: usize>(
    mesh: &Mesh<DIM>,
    level: usize,
    field: &mut Field<f64, DIM>,
    comm: &C,
    observer: &mut O) -> Result<()>
where
    C: Communicator,
    O: Observer,
{
    let interfaces = halo::field_interfaces(mesh, level);

    if interfaces.is_empty() {
        return Ok(())
    }
    timed(observer, Phase::Exchange, |_| exchange_field(comm, mesh, level, field, &interfaces, |x, v| *x = v))
}




/**
 * Combine the tags of cells stored by more than one rank, so that every rank
 * sees the union of the requests made for a cell.
 */
pub fn update_tag_subdomains<C, O, const DIM: usize>(
    mesh: &Mesh<DIM>,
    level: usize,
    tags: &mut Field<Tag, DIM>,
    comm: &C,
    observer: &mut O) -> Result<()>
where
    C: Communicator,
    O: Observer,
{
    let interfaces = halo::tag_interfaces(mesh, level);

    if interfaces.is_empty() {
        return Ok(())
    }
    timed(observer, Phase::Exchange, |_| exchange_field(comm, mesh, level, tags, &interfaces, |x, v| *x |= v))
}




/**
 * For each periodic axis, fill the cells of a level lying beyond the domain
 * from their images on the opposite side.
 */
pub fn update_ghost_periodic<O, const DIM: usize>(
    mesh: &Mesh<DIM>,
    level: usize,
    field: &mut Field<f64, DIM>,
    observer: &mut O)
where
    O: Observer
{
    if !mesh.periodicity().iter().any(|p| *p) {
        return
    }
    timed(observer, Phase::Periodic, |_| {
        for (target, shift) in periodic_pairs(mesh, level) {
            target.apply(|range, key| {
                let source_range = range.start + shift[0]..range.end + shift[0];
                let mut source_key = *key;

                for d in 1..DIM {
                    source_key[d] += shift[d]
                }
                field.copy_interval(mesh, level, (range, key), (&source_range, &source_key))
            })
        }
    })
}




/**
 * Combine the tags of cells lying beyond a periodic boundary with the tags of
 * their images, in both directions.
 */
pub fn update_tag_periodic<const DIM: usize>(mesh: &Mesh<DIM>, level: usize, tags: &mut Field<Tag, DIM>) {
    for (target, shift) in periodic_pairs(mesh, level) {
        for cell in target.cells() {
            let mut image = cell;

            for d in 0..DIM {
                image[d] += shift[d]
            }
            let ghost = tags.get(mesh, level, cell)[0];
            let inner = tags.get(mesh, level, image)[0];
            let both = ghost | inner;
            tags.get_mut(mesh, level, cell)[0] = both;
            tags.get_mut(mesh, level, image)[0] = both;
        }
    }
}




/**
 * Return, for each periodic axis and each side, the stored cells beyond the
 * domain whose image is stored, with the shift which maps them onto the
 * image.
 */
fn periodic_pairs<const DIM: usize>(mesh: &Mesh<DIM>, level: usize) -> Vec<(LevelSet<DIM>, [i64; DIM])> {
    let domain = mesh.domain();
    let all = mesh.level_set(MeshRole::AllCells, level);
    let bounds = domain.box_at(level);
    let mut pairs = Vec::new();

    for d in 0..DIM {
        if !domain.is_periodic(d) {
            continue
        }
        let shift = domain.periodic_shift(level, d);
        let mut back = [0; DIM];
        back[d] = -shift[d];

        let below = all.restrict_axis(d, i64::MIN..bounds.start()[d]);
        let above = all.restrict_axis(d, bounds.end()[d]..i64::MAX);

        pairs.push((below.intersection(&all.translate(back)), shift));
        pairs.push((above.intersection(&all.translate(shift)), back));
    }
    pairs
}




/**
 * Invoke the boundary condition on the cells of a level lying outside the
 * domain along a non-periodic axis.
 */
pub fn update_bc<B, O, const DIM: usize>(
    mesh: &Mesh<DIM>,
    level: usize,
    field: &mut Field<f64, DIM>,
    bc: &B,
    observer: &mut O)
where
    B: BoundaryCondition<DIM>,
    O: Observer,
{
    let outside = mesh.domain().outside_bounded_axes(mesh.level_set(MeshRole::AllCells, level));

    if outside.is_empty() {
        return
    }
    timed(observer, Phase::Boundary, |_| {
        let name = field.name().to_string();

        for cell in outside.cells() {
            bc.fill(&name, level, cell, field.get_mut(mesh, level, cell))
        }
    })
}




// ============================================================================
#[cfg(test)]
mod test {

    use std::collections::BTreeMap;
    use std::thread;
    use crate::boundary::Dirichlet;
    use crate::cell_array::CellList;
    use crate::config::Config;
    use crate::domain::Domain;
    use crate::field::Field;
    use crate::index_space::IndexBox;
    use crate::mesh::{Mesh, MeshRole};
    use crate::message::comm::{Communicator, SerialCommunicator};
    use crate::message::thread::ThreadCommunicator;
    use crate::observer::{Phase, Silent, Timers};
    use crate::subset::LevelSet;
    use crate::tag::Tag;
    use super::*;

    fn smooth(level: usize, cell: [i64; 2]) -> f64 {
        let h = 1.0 / (1 << level) as f64;
        let x = (cell[0] as f64 + 0.5) * h;
        let y = (cell[1] as f64 + 0.5) * h;
        (3.0 * x).sin() + (2.0 * y).cos()
    }

    /**
     * 2D mesh on [0, 16)^2 at level 4 with a refined corner patch: level 2
     * everywhere except [0, 2)^2 at level 2, which is refined to level 3.
     */
    fn corner_mesh(periodic: bool) -> Mesh<2> {
        let mut cells = CellList::new(4);
        let coarse = LevelSet::from_box(2, &IndexBox::new([0, 0], [4, 4]));
        let corner = LevelSet::from_box(2, &IndexBox::new([0, 0], [2, 2]));
        cells.add_set(&coarse.difference(&corner));
        cells.add_set(&corner.on(3));
        let domain = Domain::new(4, IndexBox::new([0, 0], [16, 16]), [periodic, false]);
        Mesh::new(Config::with_levels(2, 4), domain, cells).unwrap()
    }

    fn leaf_field(mesh: &Mesh<2>) -> Field<f64, 2> {
        let mut field = Field::new("u", 1, mesh);
        for level in 0..=4 {
            for cell in mesh.level_set(MeshRole::Cells, level).cells() {
                field.get_mut(mesh, level, cell)[0] = smooth(level, cell);
            }
        }
        field
    }

    #[test]
    fn ghost_update_is_idempotent() {
        for periodic in [false, true] {
            let mesh = corner_mesh(periodic);
            let mut field = leaf_field(&mesh);
            let bc = Dirichlet(vec![0.5]);
            update_ghosts(&mesh, &mut [&mut field], &bc, &SerialCommunicator, &mut Silent).unwrap();
            let once = field.as_slice().to_vec();
            update_ghosts(&mesh, &mut [&mut field], &bc, &SerialCommunicator, &mut Silent).unwrap();
            assert_eq!(field.as_slice(), &once[..]);
        }
    }

    #[test]
    fn ghost_update_leaves_leaves_untouched() {
        let mesh = corner_mesh(false);
        let mut field = leaf_field(&mesh);
        update_ghosts(&mesh, &mut [&mut field], &Dirichlet(vec![0.0]), &SerialCommunicator, &mut Silent).unwrap();

        for level in 0..=4 {
            for cell in mesh.level_set(MeshRole::Cells, level).cells() {
                assert_eq!(field.get(&mesh, level, cell)[0], smooth(level, cell));
            }
        }
    }

    #[test]
    fn projection_cells_hold_the_mean_of_their_children() {
        let mesh = corner_mesh(false);
        let mut field = leaf_field(&mesh);
        update_ghosts(&mesh, &mut [&mut field], &Dirichlet(vec![0.0]), &SerialCommunicator, &mut Silent).unwrap();
        let proj = mesh.level_set(MeshRole::ProjCells, 2);
        assert!(!proj.is_empty());

        for cell in proj.cells() {
            let mean: f64 = (0..2)
                .flat_map(|a| (0..2).map(move |b| [2 * cell[0] + a, 2 * cell[1] + b]))
                .map(|child| field.get(&mesh, 3, child)[0])
                .sum::<f64>() * 0.25;
            assert!((field.get(&mesh, 2, cell)[0] - mean).abs() < 1e-14);
        }
    }

    #[test]
    fn boundary_cells_take_the_dirichlet_value() {
        let mesh = corner_mesh(false);
        let mut field = leaf_field(&mesh);
        update_ghosts(&mesh, &mut [&mut field], &Dirichlet(vec![-7.0]), &SerialCommunicator, &mut Silent).unwrap();
        assert_eq!(field.get(&mesh, 2, [-1, 2])[0], -7.0);
        assert_eq!(field.get(&mesh, 3, [2, -1])[0], -7.0);
    }

    #[test]
    fn periodic_ghosts_wrap_around() {
        let config = Config::with_levels(3, 3);
        let mesh = Mesh::uniform(config, Domain::periodic(3, IndexBox::new([0], [10])), 3).unwrap();
        let mut field = Field::new("u", 2, &mesh);

        for cell in mesh.level_set(MeshRole::Cells, 3).cells() {
            field.get_mut(&mesh, 3, cell).copy_from_slice(&[cell[0] as f64, -(cell[0] as f64)]);
        }
        let mut timers = Timers::new();
        update_ghosts(&mesh, &mut [&mut field], &Dirichlet(vec![]), &SerialCommunicator, &mut timers).unwrap();

        assert_eq!(field.get(&mesh, 3, [-1]), field.get(&mesh, 3, [9]));
        assert_eq!(field.get(&mesh, 3, [-2]), &[8.0, -8.0]);
        assert_eq!(field.get(&mesh, 3, [10]), field.get(&mesh, 3, [0]));
        assert_eq!(field.get(&mesh, 3, [11]), &[1.0, -1.0]);
        assert_eq!(timers.count(Phase::GhostUpdate), 1);
        assert_eq!(timers.count(Phase::Periodic), 1);
        assert_eq!(timers.count(Phase::Boundary), 0);
    }

    #[test]
    fn tags_are_combined_across_periodic_images() {
        let mesh = Mesh::uniform(Config::with_levels(3, 3), Domain::periodic(3, IndexBox::new([0], [10])), 3).unwrap();
        let mut tags: Field<Tag, 1> = Field::new("tag", 1, &mesh);
        tags.get_mut(&mesh, 3, [-1])[0] = Tag::REFINE;
        tags.get_mut(&mesh, 3, [9])[0] = Tag::KEEP;
        update_tag_periodic(&mesh, 3, &mut tags);
        assert_eq!(tags.get(&mesh, 3, [9])[0], Tag::REFINE | Tag::KEEP);
        assert_eq!(tags.get(&mesh, 3, [-1])[0], Tag::REFINE | Tag::KEEP);
    }

    fn reference_values(mesh: &Mesh<2>, field: &Field<f64, 2>) -> Vec<((usize, [i64; 2]), f64)> {
        let mut values = Vec::new();
        for l in 0..=4 {
            for c in mesh.level_set(MeshRole::Reference, l).cells() {
                values.push(((l, c), field.get(mesh, l, c)[0]));
            }
        }
        values
    }

    /**
     * Run the ghost update of `corner_mesh(true)` on two thread ranks owning
     * the given subdomains, twice, and check both results against a serial
     * run.
     */
    fn check_distributed_against_serial(halves: [LevelSet<2>; 2]) {
        let serial: BTreeMap<_, _> = {
            let mesh = corner_mesh(true);
            let mut field = leaf_field(&mesh);
            update_ghosts(&mesh, &mut [&mut field], &Dirichlet(vec![0.5]), &SerialCommunicator, &mut Silent).unwrap();
            let values = reference_values(&mesh, &field);
            values.into_iter().collect()
        };

        let handles: Vec<_> = ThreadCommunicator::world(2)
            .into_iter()
            .map(|comm| {
                let halves = halves.clone();
                thread::spawn(move || {
                    let rank = comm.rank();
                    let whole = corner_mesh(true);
                    let mut cells = CellList::new(4);
                    for l in 0..=4 {
                        cells.add_set(&whole.level_set(MeshRole::Cells, l).intersection(&halves[rank].on(l)));
                    }
                    let mesh = Mesh::distributed(
                        whole.config().clone(),
                        whole.domain().clone(),
                        halves[rank].clone(),
                        cells,
                        vec![(1 - rank, halves[1 - rank].clone())],
                        &comm).unwrap();
                    let mut field = leaf_field(&mesh);
                    update_ghosts(&mesh, &mut [&mut field], &Dirichlet(vec![0.5]), &comm, &mut Silent).unwrap();
                    let once = reference_values(&mesh, &field);
                    update_ghosts(&mesh, &mut [&mut field], &Dirichlet(vec![0.5]), &comm, &mut Silent).unwrap();
                    let twice = reference_values(&mesh, &field);
                    (once, twice)
                })
            })
            .collect();

        for handle in handles {
            let (once, twice) = handle.join().unwrap();
            assert_eq!(once, twice);

            for (key, value) in once {
                let expected = serial[&key];
                assert!((value - expected).abs() < 1e-12, "{:?}: {} != {}", key, value, expected);
            }
        }
    }

    #[test]
    fn distributed_ghost_update_matches_serial() {
        check_distributed_against_serial([
            LevelSet::from_box(4, &IndexBox::new([0, 0], [16, 8])),
            LevelSet::from_box(4, &IndexBox::new([0, 8], [16, 16])),
        ]);
    }

    /**
     * Split along the periodic axis: the images of each rank's periodic
     * ghosts are owned by the other rank, at every level.
     */
    #[test]
    fn distributed_ghost_update_matches_serial_across_a_periodic_split() {
        check_distributed_against_serial([
            LevelSet::from_box(4, &IndexBox::new([0, 0], [8, 16])),
            LevelSet::from_box(4, &IndexBox::new([8, 0], [16, 16])),
        ]);
    }
}
