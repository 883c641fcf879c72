use log::{debug, info};
use crate::cell_array::CellArray;
use crate::config::Config;
use crate::domain::Domain;
use crate::error::{Error, Result};
use crate::halo;
use crate::message::comm::Communicator;
use crate::subset::LevelSet;




/**
 * Refine, once, every leaf lying within `graduation_width` cells (at the finer
 * level, box stencil, across periodic boundaries) of a leaf two or more
 * levels finer. Leaves of neighbouring ranks take part as sources but are
 * never modified. Returns whether any leaf was refined.
 */
fn graduation_pass<const DIM: usize>(
    cells: &mut [LevelSet<DIM>],
    neighbour_leaves: &[CellArray<DIM>],
    domain: &Domain<DIM>,
    config: &Config) -> bool
{
    let min = config.min_level;
    let max = config.max_level;
    let mut changed = false;

    for fine in (min + 2..=max).rev() {
        let sources = neighbour_leaves.iter().fold(cells[fine].clone(), |acc, n| acc.union(&n[fine]));

        if sources.is_empty() {
            continue
        }
        let halo = domain.with_periodic_images(&sources.expand(config.graduation_width));

        for coarse in min..=fine - 2 {
            let bad = halo.on(coarse).intersection(&cells[coarse]);

            if !bad.is_empty() {
                cells[coarse] = cells[coarse].difference(&bad);
                cells[coarse + 1] = cells[coarse + 1].union(&bad.on(coarse + 1));
                changed = true;
            }
        }
    }
    changed
}




/**
 * Refine local leaves until no leaf is within the graduation width of a leaf
 * two or more levels finer, taking the given neighbour leaves into account.
 * Returns whether any leaf was refined, or an error if the configured number
 * of passes is exceeded.
 */
pub fn make_graduation<const DIM: usize>(
    cells: &mut [LevelSet<DIM>],
    neighbour_leaves: &[CellArray<DIM>],
    domain: &Domain<DIM>,
    config: &Config) -> Result<bool>
{
    for iteration in 0..config.max_graduation_iterations {
        if !graduation_pass(cells, neighbour_leaves, domain, config) {
            return Ok(iteration > 0)
        }
    }
    Err(Error::GraduationDiverged { iterations: config.max_graduation_iterations })
}




/**
 * Graduate the candidate leaves of every rank together: candidates are
 * exchanged with the neighbours and graduated locally until no rank changes
 * its leaves. Returns the final candidate leaves of the neighbours, in
 * neighbourhood order. Every rank of the communicator must call this
 * collectively.
 */
pub fn make_graduation_distributed<C, const DIM: usize>(
    cells: &mut [LevelSet<DIM>],
    ranks: &[usize],
    domain: &Domain<DIM>,
    config: &Config,
    comm: &C) -> Result<Vec<CellArray<DIM>>>
where
    C: Communicator
{
    for iteration in 0..config.max_graduation_iterations {
        let candidate = CellArray::from_level_sets(config.max_level, cells.iter().cloned());
        let neighbour_leaves = halo::exchange_snapshots(comm, ranks, &candidate)?;
        let changed = make_graduation(cells, &neighbour_leaves, domain, config)?;

        if !comm.all_reduce_or(changed)? {
            debug!("graduation converged after {} rounds", iteration + 1);
            return Ok(neighbour_leaves)
        }
    }
    info!("graduation did not converge in {} rounds", config.max_graduation_iterations);
    Err(Error::GraduationDiverged { iterations: config.max_graduation_iterations })
}




// ============================================================================
#[cfg(test)]
mod test {

    use std::thread;
    use crate::cell_array::CellArray;
    use crate::config::Config;
    use crate::domain::Domain;
    use crate::error::Error;
    use crate::index_space::IndexBox;
    use crate::message::comm::Communicator;
    use crate::message::thread::ThreadCommunicator;
    use crate::subset::LevelSet;
    use super::*;

    /**
     * Uniform level 2 leaves on [0, 32)^2 at level 5, with one nest of
     * single refined cells reaching level 5 inside the level 2 cell
     * `corner`. Each refined cell is the child at `offset` of the previous
     * one along both axes.
     */
    fn nested_leaves(corner: [i64; 2], offset: i64) -> Vec<LevelSet<2>> {
        let mut cells: Vec<_> = (0..=5).map(LevelSet::new).collect();
        cells[2] = LevelSet::from_box(2, &IndexBox::new([0, 0], [4, 4]));
        let mut cell = corner;

        for level in 2..5 {
            let mut one = LevelSet::new(level);
            one.add_point(cell);
            cells[level] = cells[level].difference(&one);
            cells[level + 1] = cells[level + 1].union(&one.on(level + 1));
            cell = [2 * cell[0] + offset, 2 * cell[1] + offset];
        }
        cells
    }

    fn area(cells: &[LevelSet<2>], max: usize) -> i64 {
        cells.iter().map(|s| s.num_cells() as i64 * (1 << (2 * (max - s.level())))).sum()
    }

    /**
     * Return the first pair of touching leaves (diagonals included, across
     * periodic boundaries when asked) whose levels differ by more than one.
     */
    fn violation(cells: &[LevelSet<2>], extent: i64, periodic: bool) -> Option<(usize, [i64; 2], usize)> {
        for fine in 0..cells.len() {
            for cell in cells[fine].expand(1).cells() {
                for coarse in 0..fine.saturating_sub(1) {
                    let shift = fine - coarse;
                    let wrap = |x: i64| if periodic { x.rem_euclid(extent << fine) } else { x };
                    let target = [wrap(cell[0]) >> shift, wrap(cell[1]) >> shift];
                    if cells[coarse].contains(target) {
                        return Some((fine, cell, coarse))
                    }
                }
            }
        }
        None
    }

    #[test]
    fn nested_refinement_is_graduated() {
        let config = Config::with_levels(2, 5);
        let domain = Domain::bounded(5, IndexBox::new([0, 0], [32, 32]));
        let mut cells = nested_leaves([1, 2], 1);
        assert!(violation(&cells, 1, false).is_some());
        assert!(make_graduation(&mut cells, &[], &domain, &config).unwrap());
        assert_eq!(violation(&cells, 1, false), None);
        assert_eq!(area(&cells, 5), 32 * 32);
        assert!(!make_graduation(&mut cells, &[], &domain, &config).unwrap());
    }

    #[test]
    fn graduation_wraps_across_periodic_boundaries() {
        let config = Config::with_levels(2, 5);
        let domain = Domain::periodic(5, IndexBox::new([0, 0], [32, 32]));
        let mut cells = nested_leaves([0, 0], 0);
        assert!(cells[2].contains([3, 3]));
        make_graduation(&mut cells, &[], &domain, &config).unwrap();
        assert_eq!(violation(&cells, 1, true), None);
        assert!(!cells[2].contains([3, 3]));
        assert_eq!(area(&cells, 5), 32 * 32);
    }

    #[test]
    fn graduated_leaves_are_left_alone() {
        let config = Config::with_levels(2, 5);
        let domain = Domain::bounded(5, IndexBox::new([0, 0], [32, 32]));
        let mut cells: Vec<_> = (0..=5).map(LevelSet::new).collect();
        cells[2] = LevelSet::from_box(2, &IndexBox::new([0, 0], [4, 4]));
        let before = cells.clone();
        assert!(!make_graduation(&mut cells, &[], &domain, &config).unwrap());
        assert_eq!(cells, before);
    }

    #[test]
    fn runaway_graduation_is_an_error() {
        let config = Config {
            max_graduation_iterations: 1,
            ..Config::with_levels(2, 5)
        };
        let domain = Domain::bounded(5, IndexBox::new([0, 0], [32, 32]));
        let mut cells = nested_leaves([1, 2], 1);
        assert_eq!(
            make_graduation(&mut cells, &[], &domain, &config),
            Err(Error::GraduationDiverged { iterations: 1 }));
    }

    #[test]
    fn distributed_graduation_matches_serial() {
        let config = Config::with_levels(2, 5);
        let domain = Domain::bounded(5, IndexBox::new([0, 0], [32, 32]));
        let mut serial = nested_leaves([1, 1], 1);
        make_graduation(&mut serial, &[], &domain, &config).unwrap();

        let handles: Vec<_> = ThreadCommunicator::world(2)
            .into_iter()
            .map(|comm| {
                let config = config.clone();
                let domain = domain.clone();
                thread::spawn(move || {
                    let rank = comm.rank();
                    let half = LevelSet::from_box(5, &IndexBox::new([16 * rank as i64, 0], [16 * (rank as i64 + 1), 32]));
                    let mut cells: Vec<_> = nested_leaves([1, 1], 1)
                        .iter()
                        .map(|s| s.intersection(&half.on(s.level())))
                        .collect();
                    make_graduation_distributed(&mut cells, &[1 - rank], &domain, &config, &comm).unwrap();
                    cells
                })
            })
            .collect();

        let parts: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        for level in 0..=5 {
            assert_eq!(parts[0][level].union(&parts[1][level]), serial[level]);
        }
        let merged = CellArray::from_level_sets(5, parts.into_iter().flatten());
        assert_eq!(merged.nb_cells(), CellArray::from_level_sets(5, serial).nb_cells());
    }
}
