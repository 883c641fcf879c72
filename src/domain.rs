use crate::error::{Error, Result};
use crate::index_space::IndexBox;
use crate::subset::LevelSet;




/**
 * The computational domain: an index box at the domain level (the finest
 * level of the mesh) and a periodicity flag per axis.
 */
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Domain<const DIM: usize> {
    level: usize,
    bounds: IndexBox<DIM>,
    periodic: [bool; DIM],
}




// ============================================================================
impl<const DIM: usize> Domain<DIM> {

    pub fn new(level: usize, bounds: IndexBox<DIM>, periodic: [bool; DIM]) -> Self {
        Self { level, bounds, periodic }
    }

    /**
     * A non-periodic domain.
     */
    pub fn bounded(level: usize, bounds: IndexBox<DIM>) -> Self {
        Self::new(level, bounds, [false; DIM])
    }

    /**
     * A domain periodic along every axis.
     */
    pub fn periodic(level: usize, bounds: IndexBox<DIM>) -> Self {
        Self::new(level, bounds, [true; DIM])
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn bounds(&self) -> &IndexBox<DIM> {
        &self.bounds
    }

    pub fn is_periodic(&self, axis: usize) -> bool {
        self.periodic[axis]
    }

    pub fn periodicity(&self) -> [bool; DIM] {
        self.periodic
    }

    /**
     * Check that the domain is exactly representable at `min_level`: its
     * bounds must be multiples of `2^(level - min_level)`.
     */
    pub fn check_alignment(&self, min_level: usize) -> Result<()> {
        if min_level > self.level {
            return Err(Error::InvalidConfig(format!(
                "domain level {} is coarser than the minimum level {}", self.level, min_level)))
        }
        let step = 1i64 << (self.level - min_level);

        for d in 0..DIM {
            if self.bounds.start()[d] % step != 0 || self.bounds.end()[d] % step != 0 {
                return Err(Error::InvalidConfig(format!(
                    "domain bounds {:?}..{:?} are not multiples of {} on axis {}",
                    self.bounds.start(), self.bounds.end(), step, d)))
            }
        }
        Ok(())
    }

    /**
     * The domain box expressed at a level no finer than the domain level.
     */
    pub fn box_at(&self, level: usize) -> IndexBox<DIM> {
        assert!(level <= self.level, "level {} is finer than the domain level {}", level, self.level);
        self.bounds.coarsen(self.level - level)
    }

    /**
     * The domain box at a level, grown by `width` cells on every side.
     */
    pub fn band_at(&self, level: usize, width: i64) -> IndexBox<DIM> {
        self.box_at(level).extend_all(width)
    }

    pub fn level_set(&self, level: usize) -> LevelSet<DIM> {
        LevelSet::from_box(level, &self.box_at(level))
    }

    /**
     * The number of cells spanned by the domain along an axis at a level.
     * This is the periodic shift on that axis.
     */
    pub fn extent_at(&self, level: usize, axis: usize) -> i64 {
        self.box_at(level).axis(axis).end - self.box_at(level).axis(axis).start
    }

    fn unit_shift(&self, level: usize, axis: usize) -> [i64; DIM] {
        let mut shift = [0; DIM];
        shift[axis] = self.extent_at(level, axis);
        shift
    }

    /**
     * Return the set together with the periodic images of its cells which
     * lie outside the domain along a periodic axis. Images are taken axis by
     * axis, so corner cells also receive their diagonal image.
     */
    pub fn with_periodic_images(&self, set: &LevelSet<DIM>) -> LevelSet<DIM> {
        let level = set.level();
        let bounds = self.box_at(level);
        let mut result = set.clone();

        for d in 0..DIM {
            if !self.periodic[d] {
                continue
            }
            let shift = self.unit_shift(level, d);
            let below = result.restrict_axis(d, i64::MIN..bounds.start()[d]);
            let above = result.restrict_axis(d, bounds.end()[d]..i64::MAX);
            result = LevelSet::union_of(&[&result, &below.translate(shift), &above.translate(negate(shift))]);
        }
        result
    }

    /**
     * Return the cells of a set which lie outside the domain along at least
     * one non-periodic axis. Those are the cells a boundary condition fills.
     */
    pub fn outside_bounded_axes(&self, set: &LevelSet<DIM>) -> LevelSet<DIM> {
        let bounds = self.box_at(set.level());
        let mut inside = set.clone();

        for d in 0..DIM {
            if !self.periodic[d] {
                inside = inside.restrict_axis(d, bounds.axis(d))
            }
        }
        set.difference(&inside)
    }

    /**
     * The translation which maps a cell onto its periodic image along one
     * axis, in cells of the given level.
     */
    pub fn periodic_shift(&self, level: usize, axis: usize) -> [i64; DIM] {
        self.unit_shift(level, axis)
    }
}




// ============================================================================
fn negate<const DIM: usize>(mut shift: [i64; DIM]) -> [i64; DIM] {
    for s in shift.iter_mut() {
        *s = -*s
    }
    shift
}
