use core::ops::{BitAnd, BitOr, Range, Sub};
use std::collections::BTreeMap;
use std::iter::Peekable;
use crate::index_space::IndexBox;
use crate::interval_set::IntervalSet;




/**
 * Return the row key of a cell: its index with the primary (interval) axis
 * component cleared.
 */
pub fn row_key<const DIM: usize>(mut index: [i64; DIM]) -> [i64; DIM] {
    if DIM > 0 {
        index[0] = 0
    }
    index
}




/**
 * A set of cells at a single level, stored as one `IntervalSet` along the
 * primary axis per row. Rows are keyed by the remaining index components and
 * kept in sorted order; empty rows are never stored. This is the value type
 * of the set algebra: intersections, unions and differences of sets at
 * different levels are taken at the finest operand level.
 */
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct LevelSet<const DIM: usize> {
    level: usize,
    rows: BTreeMap<[i64; DIM], IntervalSet>,
}




// ============================================================================
impl<const DIM: usize> LevelSet<DIM> {

    pub fn new(level: usize) -> Self {
        Self { level, rows: BTreeMap::new() }
    }

    /**
     * Return the set of all cells in an index box at the given level.
     */
    pub fn from_box(level: usize, space: &IndexBox<DIM>) -> Self {
        let mut result = Self::new(level);

        if space.is_empty() {
            return result
        }
        for key in space.with_axis(0, 0..1).iter() {
            result.add_interval(space.axis(0), key)
        }
        result
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn num_cells(&self) -> usize {
        self.rows.values().map(IntervalSet::len).sum()
    }

    pub fn num_intervals(&self) -> usize {
        self.rows.values().map(IntervalSet::num_intervals).sum()
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    /**
     * Iterate over the rows in sorted key order.
     */
    pub fn rows(&self) -> impl Iterator<Item = (&[i64; DIM], &IntervalSet)> {
        self.rows.iter()
    }

    /**
     * Add an interval of cells along the primary axis. The primary
     * component of the key is ignored.
     */
    pub fn add_interval(&mut self, range: Range<i64>, key: [i64; DIM]) {
        assert!(range.start <= range.end, "malformed interval {:?}: negative length", range);

        if range.start < range.end {
            self.rows.entry(row_key(key)).or_default().insert(range)
        }
    }

    pub fn add_point(&mut self, cell: [i64; DIM]) {
        self.add_interval(cell[0]..cell[0] + 1, cell)
    }

    fn add_row(&mut self, key: [i64; DIM], set: IntervalSet) {
        if set.is_empty() {
            return
        }
        match self.rows.get_mut(&key) {
            Some(row) => *row = row.union(&set),
            None => {
                self.rows.insert(key, set);
            }
        }
    }

    pub fn contains(&self, cell: [i64; DIM]) -> bool {
        self.rows.get(&row_key(cell)).map_or(false, |row| row.contains(cell[0]))
    }

    /**
     * Invoke a function on every interval of the set, in sorted row order
     * and ascending interval order within a row. The function receives the
     * interval and the row key.
     */
    pub fn apply<F: FnMut(&Range<i64>, &[i64; DIM])>(&self, mut f: F) {
        for (key, row) in &self.rows {
            for range in row {
                f(range, key)
            }
        }
    }

    /**
     * Iterate over every cell of the set, in the same order as `apply`.
     */
    pub fn cells(&self) -> impl Iterator<Item = [i64; DIM]> + '_ {
        self.rows.iter().flat_map(|(key, row)| {
            let key = *key;
            row.indexes().map(move |i| {
                let mut cell = key;
                cell[0] = i;
                cell
            })
        })
    }

    /**
     * Return the same region expressed at another level. Going coarser, a
     * coarse cell is present if any of its children is present. Going finer,
     * every cell is replaced by all of its descendants at the target level.
     */
    pub fn on(&self, level: usize) -> Self {
        if level == self.level {
            self.clone()
        } else if level < self.level {
            self.coarsen(self.level - level)
        } else {
            self.refine(level - self.level)
        }
    }

    fn coarsen(&self, delta: usize) -> Self {
        let mut result = Self::new(self.level - delta);

        for (key, row) in &self.rows {
            let mut coarse_key = *key;

            for d in 1..DIM {
                coarse_key[d] >>= delta
            }
            result.add_row(coarse_key, row.coarsen(delta))
        }
        result
    }

    fn refine(&self, delta: usize) -> Self {
        let mut result = Self::new(self.level + delta);
        let offsets = secondary_offsets::<DIM>(0..1 << delta);

        for (key, row) in &self.rows {
            let fine = row.refine(delta);

            for offset in offsets.iter() {
                let mut fine_key = *key;

                for d in 1..DIM {
                    fine_key[d] = (key[d] << delta) + offset[d]
                }
                result.rows.insert(fine_key, fine.clone());
            }
        }
        result
    }

    /**
     * Return the set shifted by the given offset (in cells of this level).
     */
    pub fn translate(&self, shift: [i64; DIM]) -> Self {
        let mut result = Self::new(self.level);

        for (key, row) in &self.rows {
            let mut new_key = *key;

            for d in 1..DIM {
                new_key[d] += shift[d]
            }
            result.rows.insert(new_key, row.translate(shift[0]));
        }
        result
    }

    /**
     * Box dilation: add every cell within `width` cells of the set along
     * each axis, diagonals included.
     */
    pub fn expand(&self, width: i64) -> Self {
        assert!(width >= 0, "cannot expand by a negative width");
        let mut result = Self::new(self.level);

        for (key, row) in &self.rows {
            result.rows.insert(*key, row.expand(width));
        }
        for d in 1..DIM {
            let mut grown = Self::new(self.level);

            for (key, row) in &result.rows {
                for j in -width..=width {
                    let mut new_key = *key;
                    new_key[d] += j;
                    grown.add_row(new_key, row.clone())
                }
            }
            result = grown
        }
        result
    }

    /**
     * Return the cells of the set whose component on the given axis lies in
     * a range.
     */
    pub fn restrict_axis(&self, axis: usize, range: Range<i64>) -> Self {
        let mut result = Self::new(self.level);

        if axis == 0 {
            let window: IntervalSet = std::iter::once(range).collect();

            for (key, row) in &self.rows {
                result.add_row(*key, row.intersection(&window))
            }
        } else {
            for (key, row) in &self.rows {
                if range.contains(&key[axis]) {
                    result.rows.insert(*key, row.clone());
                }
            }
        }
        result
    }

    pub fn intersection(&self, other: &Self) -> Self {
        let level = self.level.max(other.level);
        let (a, b) = (self.on(level), other.on(level));
        let mut result = Self::new(level);

        for (key, x, y) in merge_rows(&a.rows, &b.rows) {
            if let (Some(x), Some(y)) = (x, y) {
                let row = x.intersection(y);

                if !row.is_empty() {
                    result.rows.insert(*key, row);
                }
            }
        }
        result
    }

    pub fn union(&self, other: &Self) -> Self {
        let level = self.level.max(other.level);
        let (a, b) = (self.on(level), other.on(level));
        let mut result = Self::new(level);

        for (key, x, y) in merge_rows(&a.rows, &b.rows) {
            let row = match (x, y) {
                (Some(x), Some(y)) => x.union(y),
                (Some(x), None) => x.clone(),
                (None, Some(y)) => y.clone(),
                (None, None) => continue,
            };
            result.rows.insert(*key, row);
        }
        result
    }

    pub fn difference(&self, other: &Self) -> Self {
        let level = self.level.max(other.level);
        let (a, b) = (self.on(level), other.on(level));
        let mut result = Self::new(level);

        for (key, x, y) in merge_rows(&a.rows, &b.rows) {
            let row = match (x, y) {
                (Some(x), Some(y)) => x.difference(y),
                (Some(x), None) => x.clone(),
                _ => continue,
            };
            if !row.is_empty() {
                result.rows.insert(*key, row);
            }
        }
        result
    }

    /**
     * Intersection of any number of sets, taken at the finest operand level.
     */
    pub fn intersection_of(sets: &[&Self]) -> Self {
        fold_sets(sets, Self::intersection)
    }

    /**
     * Union of any number of sets, taken at the finest operand level.
     */
    pub fn union_of(sets: &[&Self]) -> Self {
        fold_sets(sets, Self::union)
    }

    /**
     * The first set minus all the others, taken at the finest operand level.
     */
    pub fn difference_of(sets: &[&Self]) -> Self {
        fold_sets(sets, Self::difference)
    }
}




// ============================================================================
fn fold_sets<const DIM: usize, F>(sets: &[&LevelSet<DIM>], f: F) -> LevelSet<DIM>
where
    F: Fn(&LevelSet<DIM>, &LevelSet<DIM>) -> LevelSet<DIM>
{
    assert!(!sets.is_empty(), "set operation needs at least one operand");
    let level = sets.iter().map(|s| s.level).max().unwrap_or(0);
    let first = sets[0].on(level);
    sets[1..].iter().fold(first, |acc, s| f(&acc, *s))
}

pub(crate) fn secondary_offsets<const DIM: usize>(range: Range<i64>) -> Vec<[i64; DIM]> {
    let mut start = [0; DIM];
    let mut end = [1; DIM];

    for d in 1..DIM {
        start[d] = range.start;
        end[d] = range.end;
    }
    IndexBox::new(start, end).iter().collect()
}




// ============================================================================
struct MergeRows<A: Iterator, B: Iterator> {
    a: Peekable<A>,
    b: Peekable<B>,
}

fn merge_rows<'a, K: Ord, V>(
    a: &'a BTreeMap<K, V>,
    b: &'a BTreeMap<K, V>) -> impl Iterator<Item = (&'a K, Option<&'a V>, Option<&'a V>)>
{
    MergeRows { a: a.iter().peekable(), b: b.iter().peekable() }
}

impl<'a, K, V, A, B> Iterator for MergeRows<A, B>
where
    K: Ord + 'a,
    V: 'a,
    A: Iterator<Item = (&'a K, &'a V)>,
    B: Iterator<Item = (&'a K, &'a V)>,
{
    type Item = (&'a K, Option<&'a V>, Option<&'a V>);

    fn next(&mut self) -> Option<Self::Item> {
        let order = match (self.a.peek(), self.b.peek()) {
            (Some((ka, _)), Some((kb, _))) => ka.cmp(kb),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => return None,
        };
        match order {
            std::cmp::Ordering::Less => self.a.next().map(|(k, v)| (k, Some(v), None)),
            std::cmp::Ordering::Greater => self.b.next().map(|(k, v)| (k, None, Some(v))),
            std::cmp::Ordering::Equal => {
                let (k, v) = self.a.next()?;
                let (_, w) = self.b.next()?;
                Some((k, Some(v), Some(w)))
            }
        }
    }
}




// ============================================================================
impl<'a, const DIM: usize> BitAnd for &'a LevelSet<DIM> {
    type Output = LevelSet<DIM>;

    fn bitand(self, other: Self) -> LevelSet<DIM> {
        self.intersection(other)
    }
}

impl<'a, const DIM: usize> BitOr for &'a LevelSet<DIM> {
    type Output = LevelSet<DIM>;

    fn bitor(self, other: Self) -> LevelSet<DIM> {
        self.union(other)
    }
}

impl<'a, const DIM: usize> Sub for &'a LevelSet<DIM> {
    type Output = LevelSet<DIM>;

    fn sub(self, other: Self) -> LevelSet<DIM> {
        self.difference(other)
    }
}
