use core::ops::{Index, Range};
use serde::{Deserialize, Serialize};
use crate::interval::Interval;
use crate::interval_set::IntervalSet;
use crate::subset::{row_key, LevelSet};




/**
 * A builder for cell arrays. Cells and intervals may be added in any order
 * and at any level; overlapping additions are merged.
 */
#[derive(Clone, Debug)]
pub struct CellList<const DIM: usize> {
    levels: Vec<LevelSet<DIM>>,
}




// ============================================================================
impl<const DIM: usize> CellList<DIM> {

    pub fn new(max_level: usize) -> Self {
        Self { levels: (0..=max_level).map(LevelSet::new).collect() }
    }

    pub fn add_interval(&mut self, level: usize, range: Range<i64>, key: [i64; DIM]) {
        self.levels[level].add_interval(range, key)
    }

    pub fn add_point(&mut self, level: usize, cell: [i64; DIM]) {
        self.levels[level].add_point(cell)
    }

    pub fn add_set(&mut self, set: &LevelSet<DIM>) {
        let level = set.level();
        self.levels[level] = self.levels[level].union(set)
    }

    pub fn max_level(&self) -> usize {
        self.levels.len() - 1
    }
}




/**
 * One level of a cell array: the coalesced rows of the level, with every
 * interval carrying its storage offset.
 */
#[derive(Clone, Debug)]
struct LevelCellArray<const DIM: usize> {
    set: LevelSet<DIM>,
    rows: Vec<([i64; DIM], Vec<Interval>)>,
    num_cells: usize,
}




// ============================================================================
impl<const DIM: usize> LevelCellArray<DIM> {

    fn new(set: LevelSet<DIM>, offset: &mut usize) -> Self {
        let mut rows = Vec::with_capacity(set.num_rows());
        let num_cells = set.num_cells();

        for (key, row) in set.rows() {
            let intervals = row.iter().map(|r| {
                let interval = Interval::new(r.start, r.end, *offset as i64 - r.start);
                *offset += interval.len();
                interval
            }).collect();
            rows.push((*key, intervals));
        }
        Self { set, rows, num_cells }
    }

    fn find(&self, range: &Range<i64>, key: &[i64; DIM]) -> Option<&Interval> {
        let key = row_key(*key);
        let n = self.rows.binary_search_by(|(k, _)| k.cmp(&key)).ok()?;
        let intervals = &self.rows[n].1;
        let m = intervals.partition_point(|interval| interval.end <= range.start);
        intervals.get(m).filter(|interval| interval.start <= range.start && range.end <= interval.end)
    }
}




/**
 * The storage index of a set of cells: per level, per row, coalesced
 * `Interval` objects whose storage offsets are contiguous across the whole
 * array, lowest level first. A cell array always spans levels
 * `0..=max_level`; levels without cells are empty.
 */
#[derive(Clone, Debug)]
pub struct CellArray<const DIM: usize> {
    levels: Vec<LevelCellArray<DIM>>,
    num_cells: usize,
}




// ============================================================================
impl<const DIM: usize> CellArray<DIM> {

    pub fn new(max_level: usize) -> Self {
        Self::from_level_sets(max_level, std::iter::empty())
    }

    /**
     * Build a cell array from level sets. Sets at the same level are merged.
     * Panics if a set is finer than `max_level`.
     */
    pub fn from_level_sets<I>(max_level: usize, sets: I) -> Self
    where
        I: IntoIterator<Item = LevelSet<DIM>>
    {
        let mut merged: Vec<_> = (0..=max_level).map(LevelSet::new).collect();

        for set in sets {
            let level = set.level();
            assert!(level <= max_level, "level {} exceeds the maximum level {}", level, max_level);
            merged[level] = if merged[level].is_empty() { set } else { merged[level].union(&set) };
        }
        let mut offset = 0;
        let levels = merged.into_iter().map(|set| LevelCellArray::new(set, &mut offset)).collect();
        Self { levels, num_cells: offset }
    }

    pub fn max_level(&self) -> usize {
        self.levels.len() - 1
    }

    /**
     * Return the lowest level which has cells, or `None` if the array is
     * empty.
     */
    pub fn min_level(&self) -> Option<usize> {
        self.levels.iter().position(|level| level.num_cells > 0)
    }

    /**
     * Return the highest level which has cells, or `None` if the array is
     * empty.
     */
    pub fn finest_level(&self) -> Option<usize> {
        self.levels.iter().rposition(|level| level.num_cells > 0)
    }

    pub fn is_empty(&self) -> bool {
        self.num_cells == 0
    }

    pub fn nb_cells(&self) -> usize {
        self.num_cells
    }

    pub fn level_set(&self, level: usize) -> &LevelSet<DIM> {
        &self.levels[level].set
    }

    pub fn level_sets(&self) -> impl Iterator<Item = &LevelSet<DIM>> {
        self.levels.iter().map(|level| &level.set)
    }

    pub fn contains(&self, level: usize, cell: [i64; DIM]) -> bool {
        self.levels.get(level).map_or(false, |l| l.set.contains(cell))
    }

    /**
     * Return the storage offset of a cell, or `None` if it is not in the
     * array.
     */
    pub fn offset(&self, level: usize, cell: [i64; DIM]) -> Option<usize> {
        self.interval_offset(level, &(cell[0]..cell[0] + 1), &cell)
    }

    /**
     * Return the storage offset of the first cell of a range, provided the
     * whole range lies inside one stored interval of the given row.
     */
    pub fn interval_offset(&self, level: usize, range: &Range<i64>, key: &[i64; DIM]) -> Option<usize> {
        self.levels
            .get(level)?
            .find(range, key)
            .map(|interval| interval.slot(range.start))
    }

    /**
     * Invoke a function on every stored interval, lowest level first, then in
     * row order. The function receives the level, the interval (with its
     * storage index) and the row key.
     */
    pub fn for_each_interval<F: FnMut(usize, &Interval, &[i64; DIM])>(&self, mut f: F) {
        for (level, array) in self.levels.iter().enumerate() {
            for (key, intervals) in &array.rows {
                for interval in intervals {
                    f(level, interval, key)
                }
            }
        }
    }

    pub fn to_wire(&self) -> WireCellArray {
        let mut rows = Vec::new();

        for (level, array) in self.levels.iter().enumerate() {
            for (key, intervals) in &array.rows {
                rows.push(WireRow {
                    level,
                    key: key.to_vec(),
                    intervals: intervals.iter().map(|i| (i.start, i.end)).collect(),
                })
            }
        }
        WireCellArray { dim: DIM, max_level: self.max_level(), rows }
    }

    /**
     * Rebuild a cell array from its wire form. Panics if the wire form is
     * malformed: wrong dimension, a row key of the wrong length, rows out of
     * order, or intervals that are empty, reversed, overlapping or unsorted.
     */
    pub fn from_wire(wire: WireCellArray) -> Self {
        assert_eq!(wire.dim, DIM, "cell array snapshot has dimension {}, expected {}", wire.dim, DIM);
        let mut sets: Vec<LevelSet<DIM>> = (0..=wire.max_level).map(LevelSet::new).collect();
        let mut previous: Option<(usize, [i64; DIM])> = None;

        for row in wire.rows {
            assert!(row.level <= wire.max_level, "snapshot row at level {} beyond max level", row.level);
            assert_eq!(row.key.len(), DIM, "snapshot row key has the wrong length");

            let mut key = [0; DIM];
            key.copy_from_slice(&row.key);

            if let Some(p) = previous {
                assert!(p < (row.level, key), "snapshot rows are not sorted");
            }
            previous = Some((row.level, key));

            let set = IntervalSet::from_sorted(row.intervals.into_iter().map(|(a, b)| a..b).collect());

            for range in &set {
                sets[row.level].add_interval(range.clone(), key)
            }
        }
        Self::from_level_sets(wire.max_level, sets)
    }
}




// ============================================================================
impl<const DIM: usize> Index<usize> for CellArray<DIM> {
    type Output = LevelSet<DIM>;

    fn index(&self, level: usize) -> &LevelSet<DIM> {
        self.level_set(level)
    }
}

impl<const DIM: usize> PartialEq for CellArray<DIM> {
    fn eq(&self, other: &Self) -> bool {
        self.levels.len() == other.levels.len() &&
        self.levels.iter().zip(&other.levels).all(|(a, b)| a.set == b.set)
    }
}

impl<const DIM: usize> Eq for CellArray<DIM> {}

impl<const DIM: usize> From<CellList<DIM>> for CellArray<DIM> {
    fn from(list: CellList<DIM>) -> Self {
        let max_level = list.max_level();
        Self::from_level_sets(max_level, list.levels)
    }
}




/**
 * Serializable form of a cell array. Row keys are stored as vectors so the
 * encoding does not depend on the dimension parameter.
 */
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireCellArray {
    pub dim: usize,
    pub max_level: usize,
    pub rows: Vec<WireRow>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireRow {
    pub level: usize,
    pub key: Vec<i64>,
    pub intervals: Vec<(i64, i64)>,
}
