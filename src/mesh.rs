use core::ops::{Index, Range};
use std::sync::atomic::{AtomicU64, Ordering};
use log::{debug, warn};
use crate::cell_array::{CellArray, CellList};
use crate::config::Config;
use crate::domain::Domain;
use crate::error::{Error, Result};
use crate::halo;
use crate::message::comm::Communicator;
use crate::subset::LevelSet;




static NEXT_MESH_ID: AtomicU64 = AtomicU64::new(1);




/**
 * The named cell sets a mesh maintains.
 *
 * - `Cells`: the leaves owned by this rank
 * - `AllCells`: every stored cell; this is the storage index of fields
 * - `Reference`: the stored cells inside the domain
 * - `Ghosts`: stored cells which are not local leaves
 * - `ProjCells`: stored cells inside the domain which are covered by finer
 *   leaves; filled by projection
 * - `PredCells`: stored cells inside the domain which lie inside a coarser
 *   leaf; filled by prediction
 */
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MeshRole {
    Cells,
    Ghosts,
    ProjCells,
    PredCells,
    Reference,
    AllCells,
}




/**
 * What a rank knows about one of its neighbours: its subdomain, and
 * snapshots of its leaves and reference cells.
 */
#[derive(Clone, Debug)]
pub struct Neighbour<const DIM: usize> {
    rank: usize,
    subdomain: Vec<LevelSet<DIM>>,
    cells: CellArray<DIM>,
    reference: CellArray<DIM>,
}

impl<const DIM: usize> Neighbour<DIM> {
    pub fn rank(&self) -> usize {
        self.rank
    }

    /**
     * The neighbour's subdomain expressed at a level.
     */
    pub fn subdomain(&self, level: usize) -> &LevelSet<DIM> {
        &self.subdomain[level]
    }

    pub fn cells(&self) -> &CellArray<DIM> {
        &self.cells
    }

    pub fn reference(&self) -> &CellArray<DIM> {
        &self.reference
    }
}




/**
 * An adaptive mesh: the role cell arrays of one rank, together with the
 * domain, the rank's subdomain and what it knows of its neighbours. Meshes
 * compare equal when their cell arrays are equal. Every mesh carries a
 * unique id which fields bound to it record.
 */
#[derive(Debug)]
pub struct Mesh<const DIM: usize> {
    id: u64,
    config: Config,
    domain: Domain<DIM>,
    subdomain: Vec<LevelSet<DIM>>,
    neighbourhood: Vec<Neighbour<DIM>>,
    roles: [CellArray<DIM>; 6],
}




// ============================================================================
impl<const DIM: usize> Mesh<DIM> {

    /**
     * Build a single-rank mesh from a list of leaves. The leaves must lie
     * in the domain between the configured level bounds, and leaves of
     * different levels must not overlap.
     */
    pub fn new(config: Config, domain: Domain<DIM>, cells: CellList<DIM>) -> Result<Self> {
        check_setup(&config, &domain)?;
        let cells = check_cells(&config, &domain, CellArray::from(cells))?;
        let subdomain = levels_of(&domain.level_set(domain.level()), config.max_level);
        Ok(Self::build(config, domain, subdomain, cells, Vec::new()))
    }

    /**
     * Build a single-rank mesh whose leaves are every cell of the domain at
     * one level.
     */
    pub fn uniform(config: Config, domain: Domain<DIM>, level: usize) -> Result<Self> {
        let mut cells = CellList::new(config.max_level);

        if level <= config.max_level {
            cells.add_set(&domain.level_set(level));
        }
        Self::new(config, domain, cells)
    }

    /**
     * Build the mesh of one rank of a distributed run. The subdomain must be
     * a union of cells at the minimum level, and `neighbours` must list every
     * rank whose subdomain lies within ghost reach of this one, including
     * across periodic boundaries. Leaf snapshots and then reference
     * snapshots are exchanged with the neighbours, so every rank of the
     * neighbourhood graph must call this collectively.
     */
    pub fn distributed<C: Communicator>(
        config: Config,
        domain: Domain<DIM>,
        subdomain: LevelSet<DIM>,
        cells: CellList<DIM>,
        neighbours: Vec<(usize, LevelSet<DIM>)>,
        comm: &C) -> Result<Self>
    {
        check_setup(&config, &domain)?;
        let cells = check_cells(&config, &domain, CellArray::from(cells))?;

        if neighbours.iter().any(|(rank, _)| *rank == comm.rank() || *rank >= comm.size()) {
            return Err(Error::InvalidConfig(format!(
                "rank {} has an invalid neighbour list {:?}",
                comm.rank(),
                neighbours.iter().map(|n| n.0).collect::<Vec<_>>())))
        }
        let ranks: Vec<usize> = neighbours.iter().map(|n| n.0).collect();
        let leaves = halo::exchange_snapshots(comm, &ranks, &cells)?;
        let neighbourhood = neighbours
            .into_iter()
            .zip(leaves)
            .map(|((rank, sub), cells)| Neighbour {
                rank,
                subdomain: levels_of(&sub, config.max_level),
                reference: CellArray::new(config.max_level),
                cells,
            })
            .collect();

        let subdomain = levels_of(&subdomain, config.max_level);
        let mut mesh = Self::build(config, domain, subdomain, cells, neighbourhood);
        mesh.connect(comm)?;
        Ok(mesh)
    }

    /**
     * Build a mesh with the same domain, subdomain and neighbours as this
     * one, but new leaves. Neighbour reference snapshots of the new mesh are
     * empty until `connect` is called.
     */
    pub(crate) fn with_leaves(&self, cells: CellArray<DIM>, neighbour_leaves: Vec<CellArray<DIM>>) -> Self {
        let neighbourhood = self.neighbourhood
            .iter()
            .zip(neighbour_leaves)
            .map(|(n, cells)| Neighbour {
                rank: n.rank,
                subdomain: n.subdomain.clone(),
                reference: CellArray::new(self.config.max_level),
                cells,
            })
            .collect();
        Self::build(self.config.clone(), self.domain.clone(), self.subdomain.clone(), cells, neighbourhood)
    }

    /**
     * Exchange reference snapshots with every neighbour.
     */
    pub(crate) fn connect<C: Communicator>(&mut self, comm: &C) -> Result<()> {
        let ranks: Vec<usize> = self.neighbourhood.iter().map(|n| n.rank).collect();
        let references = halo::exchange_snapshots(comm, &ranks, &self[MeshRole::Reference])?;

        for (n, reference) in self.neighbourhood.iter_mut().zip(references) {
            n.reference = reference
        }
        Ok(())
    }

    fn build(
        config: Config,
        domain: Domain<DIM>,
        subdomain: Vec<LevelSet<DIM>>,
        cells: CellArray<DIM>,
        neighbourhood: Vec<Neighbour<DIM>>) -> Self
    {
        let max = config.max_level;
        let min = config.min_level;
        let g = config.ghost_width;
        let k = config.prediction_order as i64;

        let known: Vec<LevelSet<DIM>> = (0..=max)
            .map(|l| neighbourhood.iter().fold(cells[l].clone(), |acc, n| acc.union(&n.cells[l])))
            .collect();

        let mut covered: Vec<LevelSet<DIM>> = (0..=max).map(LevelSet::new).collect();

        for l in (0..max).rev() {
            covered[l] = known[l + 1].union(&covered[l + 1]).on(l)
        }
        let inside: Vec<_> = (0..=max).map(|l| domain.level_set(l)).collect();
        let band: Vec<_> = (0..=max).map(|l| LevelSet::from_box(l, &domain.band_at(l, g))).collect();

        let mut stored: Vec<LevelSet<DIM>> = (0..=max)
            .map(|l| cells[l].expand(g).intersection(&band[l]).union(&cells[l]))
            .collect();

        loop {
            let mut next = stored.clone();

            for l in 0..=max {
                next[l] = domain.with_periodic_images(&next[l]).intersection(&band[l]).union(&next[l]);

                if l < max {
                    let proj = LevelSet::intersection_of(&[&next[l], &inside[l], &covered[l]]);
                    next[l + 1] = next[l + 1].union(&proj.on(l + 1));
                }
            }
            for l in (min + 1..=max).rev() {
                let pred = LevelSet::difference_of(&[&next[l].intersection(&inside[l]), &known[l], &covered[l]]);

                if !pred.is_empty() {
                    let stencil = pred.on(l - 1).expand(k).intersection(&band[l - 1]);
                    next[l - 1] = next[l - 1].union(&stencil);
                }
            }
            if next == stored {
                break
            }
            stored = next
        }

        let reference: Vec<_> = (0..=max).map(|l| stored[l].intersection(&inside[l])).collect();
        let proj: Vec<_> = (0..=max).map(|l| reference[l].intersection(&covered[l])).collect();
        let pred: Vec<_> = (0..=max)
            .map(|l| if l > min {
                LevelSet::difference_of(&[&reference[l], &known[l], &covered[l]])
            } else {
                LevelSet::new(l)
            })
            .collect();
        let ghosts: Vec<_> = (0..=max).map(|l| stored[l].difference(&cells[l])).collect();

        if min <= max {
            let orphans = LevelSet::difference_of(&[&reference[min], &known[min], &covered[min]]);

            if !orphans.is_empty() {
                warn!("{} stored cells at level {} have no data source", orphans.num_cells(), min);
            }
        }

        let array = |sets: Vec<LevelSet<DIM>>| CellArray::from_level_sets(max, sets);
        let roles = [
            cells,
            array(ghosts),
            array(proj),
            array(pred),
            array(reference),
            array(stored),
        ];
        let id = NEXT_MESH_ID.fetch_add(1, Ordering::Relaxed);

        debug!(
            "mesh {}: {} leaves, {} stored cells, {} neighbours",
            id,
            roles[0].nb_cells(),
            roles[5].nb_cells(),
            neighbourhood.len());

        Self { id, config, domain, subdomain, neighbourhood, roles }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn domain(&self) -> &Domain<DIM> {
        &self.domain
    }

    /**
     * The local subdomain expressed at a level.
     */
    pub fn subdomain(&self, level: usize) -> &LevelSet<DIM> {
        &self.subdomain[level]
    }

    pub fn neighbourhood(&self) -> &[Neighbour<DIM>] {
        &self.neighbourhood
    }

    pub fn is_periodic(&self, axis: usize) -> bool {
        self.domain.is_periodic(axis)
    }

    pub fn periodicity(&self) -> [bool; DIM] {
        self.domain.periodicity()
    }

    pub fn nb_cells(&self, role: MeshRole) -> usize {
        self[role].nb_cells()
    }

    pub fn level_set(&self, role: MeshRole, level: usize) -> &LevelSet<DIM> {
        &self[role][level]
    }

    /**
     * The coarsest level holding a local leaf (the configured minimum level
     * if this rank has none).
     */
    pub fn min_level(&self) -> usize {
        self[MeshRole::Cells].min_level().unwrap_or(self.config.min_level)
    }

    /**
     * The finest level holding a local leaf (the configured minimum level if
     * this rank has none).
     */
    pub fn max_level(&self) -> usize {
        self[MeshRole::Cells].finest_level().unwrap_or(self.config.min_level)
    }

    /**
     * Return the storage slot of a stored cell.
     */
    pub fn cell_offset(&self, level: usize, cell: [i64; DIM]) -> Option<usize> {
        self[MeshRole::AllCells].offset(level, cell)
    }

    /**
     * Return the storage slot of the first cell of a range of stored cells,
     * which must lie in one stored interval.
     */
    pub fn interval_offset(&self, level: usize, range: &Range<i64>, key: &[i64; DIM]) -> Option<usize> {
        self[MeshRole::AllCells].interval_offset(level, range, key)
    }

    /**
     * Exchange this mesh with another one. Fields bound to either mesh stay
     * bound to the mesh object they were created on, so they must be
     * migrated or resized afterwards.
     */
    pub fn swap(&mut self, other: &mut Self) {
        std::mem::swap(self, other)
    }
}




// ============================================================================
impl<const DIM: usize> Index<MeshRole> for Mesh<DIM> {
    type Output = CellArray<DIM>;

    fn index(&self, role: MeshRole) -> &CellArray<DIM> {
        &self.roles[role as usize]
    }
}

impl<const DIM: usize> PartialEq for Mesh<DIM> {
    fn eq(&self, other: &Self) -> bool {
        self.domain == other.domain && self.roles == other.roles
    }
}




// ============================================================================
fn check_setup<const DIM: usize>(config: &Config, domain: &Domain<DIM>) -> Result<()> {
    config.validate()?;

    if domain.level() != config.max_level {
        return Err(Error::InvalidConfig(format!(
            "domain level {} must equal the maximum level {}", domain.level(), config.max_level)))
    }
    domain.check_alignment(config.min_level)
}

fn check_cells<const DIM: usize>(config: &Config, domain: &Domain<DIM>, cells: CellArray<DIM>) -> Result<CellArray<DIM>> {
    if cells.max_level() != config.max_level {
        return Err(Error::InvalidConfig(format!(
            "cell list spans levels up to {}, expected {}", cells.max_level(), config.max_level)))
    }
    let mut covered = LevelSet::new(0);

    for l in 0..=config.max_level {
        covered = covered.on(l);

        if cells[l].is_empty() {
            continue
        }
        if l < config.min_level {
            return Err(Error::InvalidCells(format!("leaves at level {} below the minimum level", l)))
        }
        if !cells[l].difference(&domain.level_set(l)).is_empty() {
            return Err(Error::InvalidCells(format!("leaves at level {} lie outside the domain", l)))
        }
        let overlap = covered.intersection(&cells[l]);

        if !overlap.is_empty() {
            return Err(Error::InvalidCells(format!(
                "{} leaves at level {} overlap coarser leaves", overlap.num_cells(), l)))
        }
        covered = covered.union(&cells[l]);
    }
    Ok(cells)
}

fn levels_of<const DIM: usize>(set: &LevelSet<DIM>, max_level: usize) -> Vec<LevelSet<DIM>> {
    (0..=max_level).map(|l| set.on(l)).collect()
}
