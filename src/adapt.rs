use log::{debug, info, warn};
use crate::cell_array::CellArray;
use crate::error::Result;
use crate::field::Field;
use crate::graduation::make_graduation_distributed;
use crate::mesh::{Mesh, MeshRole};
use crate::message::comm::Communicator;
use crate::observer::{timed, Observer, Phase};
use crate::operators::{prediction_values, projection_values};
use crate::subset::LevelSet;
use crate::tag::{Action, Tag};
use crate::update::{update_tag_periodic, update_tag_subdomains};




/**
 * Perform one adaptation step: tags are combined across ranks and periodic
 * images, the leaves are re-tiled according to them, the candidate leaves
 * are graduated, and, unless the candidate mesh equals the current one on
 * every rank, the fields are migrated onto the candidate mesh, which then
 * replaces the current one. The tags field is rebound to the new mesh and
 * cleared.
 *
 * Returns `Ok(true)` when the mesh did not change, in which case neither
 * the mesh nor the fields are touched. The ghost values of the fields must
 * be up to date (see `update_ghosts`), since prediction onto newly refined
 * cells reads them. Every rank of the communicator must call this
 * collectively.
 */
pub fn adapt_one_step<C, O, const DIM: usize>(
    mesh: &mut Mesh<DIM>,
    tags: &mut Field<Tag, DIM>,
    fields: &mut [&mut Field<f64, DIM>],
    comm: &C,
    observer: &mut O) -> Result<bool>
where
    C: Communicator,
    O: Observer,
{
    timed(observer, Phase::Adaptation, |observer| {
        let max = mesh.config().max_level;

        for level in 0..=max {
            update_tag_subdomains(mesh, level, tags, comm, observer)?;
            update_tag_periodic(mesh, level, tags);
            update_tag_subdomains(mesh, level, tags, comm, observer)?;
        }
        let mut cells = retile(mesh, tags);
        let ranks: Vec<usize> = mesh.neighbourhood().iter().map(|n| n.rank()).collect();

        let neighbour_leaves = timed(observer, Phase::Graduation, |_| {
            make_graduation_distributed(&mut cells, &ranks, mesh.domain(), mesh.config(), comm)
        })?;

        let mut candidate = mesh.with_leaves(CellArray::from_level_sets(max, cells), neighbour_leaves);
        let unchanged = *mesh == candidate;

        if comm.all_reduce_and(unchanged)? {
            debug!("mesh {} is unchanged by adaptation", mesh.id());
            return Ok(true)
        }
        candidate.connect(comm)?;

        timed(observer, Phase::Migration, |_| {
            for field in fields.iter_mut() {
                let migrated = migrate(mesh, &candidate, field);
                field.replace_with(migrated);
            }
        });

        info!(
            "adapted mesh {} -> {}: {} -> {} leaves",
            mesh.id(),
            candidate.id(),
            mesh.nb_cells(MeshRole::Cells),
            candidate.nb_cells(MeshRole::Cells));

        mesh.swap(&mut candidate);
        tags.resize(mesh);
        Ok(false)
    })
}




/**
 * Apply the tags to the leaves of a mesh, one level of change per leaf.
 * Refinement at the maximum level and coarsening at the minimum level are
 * downgraded to keep, and so is coarsening of a leaf whose siblings are not
 * all leaves tagged for coarsening.
 */
fn retile<const DIM: usize>(mesh: &Mesh<DIM>, tags: &Field<Tag, DIM>) -> Vec<LevelSet<DIM>> {
    let min = mesh.config().min_level;
    let max = mesh.config().max_level;
    let mut next: Vec<LevelSet<DIM>> = (0..=max).map(LevelSet::new).collect();

    for level in 0..=max {
        let leaves = mesh.level_set(MeshRole::Cells, level);

        if leaves.is_empty() {
            continue
        }
        let mut refine = LevelSet::new(level);
        let mut coarsen = LevelSet::new(level);
        let mut keep = LevelSet::new(level);

        for cell in leaves.cells() {
            match tags.get(mesh, level, cell)[0].action() {
                Action::Refine if level < max => refine.add_point(cell),
                Action::Coarsen if level > min => coarsen.add_point(cell),
                _ => keep.add_point(cell),
            }
        }
        if !refine.is_empty() {
            next[level + 1] = next[level + 1].union(&refine.on(level + 1));
        }
        if !coarsen.is_empty() {
            let parents = coarsen.on(level - 1);
            let incomplete = parents.on(level).difference(&coarsen).on(level - 1);
            let complete = parents.difference(&incomplete);
            next[level - 1] = next[level - 1].union(&complete);
            keep = keep.union(&coarsen.difference(&complete.on(level)));
        }
        next[level] = next[level].union(&keep);
    }
    next
}




/**
 * Return a field on the new mesh whose leaf values are transferred from the
 * old one: unchanged leaves are copied, coarsened leaves are projected from
 * their former children, and refined leaves are predicted from their former
 * parent, or injected from it when more than one level apart.
 */
fn migrate<const DIM: usize>(old: &Mesh<DIM>, new: &Mesh<DIM>, field: &Field<f64, DIM>) -> Field<f64, DIM> {
    let n = field.n_comp();
    let order = new.config().prediction_order;
    let max = new.config().max_level;
    let mut result = Field::new(field.name(), n, new);

    for level in 0..=max {
        let leaves = new.level_set(MeshRole::Cells, level);

        if leaves.is_empty() {
            continue
        }
        let mut filled = LevelSet::new(level);

        let copied = leaves.intersection(old.level_set(MeshRole::Cells, level));
        result.apply(new, &copied, |range, key, values| {
            values.copy_from_slice(field.interval(old, level, range, key))
        });
        filled = filled.union(&copied);

        if level < max {
            let projected = leaves.intersection(&old.level_set(MeshRole::Cells, level + 1).on(level));
            result.apply(new, &projected, |range, key, values| {
                values.copy_from_slice(&projection_values(old, field, level, range, key))
            });
            filled = filled.union(&projected);
        }

        for coarse in (0..level).rev() {
            let refined = leaves.intersection(&old.level_set(MeshRole::Cells, coarse).on(level));

            if refined.is_empty() {
                continue
            }
            if coarse + 1 == level {
                result.apply(new, &refined, |range, key, values| {
                    values.copy_from_slice(&prediction_values(old, field, order, level, range, key))
                });
            } else {
                let shift = level - coarse;

                result.apply(new, &refined, |range, key, values| {
                    for (x, i) in range.clone().enumerate() {
                        let mut parent = *key;
                        parent[0] = i;

                        for p in parent.iter_mut() {
                            *p >>= shift
                        }
                        values[x * n..(x + 1) * n].copy_from_slice(field.get(old, coarse, parent))
                    }
                });
            }
            filled = filled.union(&refined);
        }

        let missing = leaves.difference(&filled);

        if !missing.is_empty() {
            warn!("field '{}': {} leaves at level {} have no source on the old mesh", field.name(), missing.num_cells(), level);
        }
    }
    result
}
