use core::ops::Range;
use core::iter::FromIterator;




/**
 * A set of integer indexes along one axis, stored as a sorted list of
 * coalesced, non-overlapping, non-adjacent `Range` objects. All binary
 * operations are linear merge sweeps over the two range lists.
 */
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct IntervalSet {
    ranges: Vec<Range<i64>>,
}




// ============================================================================
impl IntervalSet {

    pub fn new() -> Self {
        Self { ranges: Vec::new() }
    }

    /**
     * Build a set from ranges that are already sorted and coalesced. Panics
     * if any range is empty or reversed, or if two ranges overlap, touch, or
     * are out of order. This is the entry point for ranges that arrive from
     * outside the set algebra (wire snapshots, user input).
     */
    pub fn from_sorted(ranges: Vec<Range<i64>>) -> Self {
        for r in &ranges {
            assert!(r.start < r.end, "malformed interval {:?}: length must be positive", r);
        }
        for w in ranges.windows(2) {
            assert!(w[0].end < w[1].start, "malformed interval list: {:?} is not strictly before {:?}", w[0], w[1]);
        }
        Self { ranges }
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /**
     * The number of indexes in the set.
     */
    pub fn len(&self) -> usize {
        self.ranges.iter().map(|r| (r.end - r.start) as usize).sum()
    }

    pub fn num_intervals(&self) -> usize {
        self.ranges.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Range<i64>> {
        self.ranges.iter()
    }

    pub fn indexes(&self) -> impl Iterator<Item = i64> + '_ {
        self.ranges.iter().flat_map(|r| r.clone())
    }

    /**
     * The smallest range containing every index of the set, or `None` if the
     * set is empty.
     */
    pub fn bounds(&self) -> Option<Range<i64>> {
        match (self.ranges.first(), self.ranges.last()) {
            (Some(a), Some(b)) => Some(a.start..b.end),
            _ => None,
        }
    }

    pub fn contains(&self, index: i64) -> bool {
        let n = self.ranges.partition_point(|r| r.end <= index);
        self.ranges.get(n).map_or(false, |r| r.start <= index)
    }

    /**
     * Insert a range, merging it with any ranges it overlaps or touches.
     * Panics if the range has negative length; an empty range is a no-op.
     */
    pub fn insert(&mut self, range: Range<i64>) {
        assert!(range.start <= range.end, "malformed interval {:?}: negative length", range);

        if range.start == range.end {
            return
        }
        let lo = self.ranges.partition_point(|r| r.end < range.start);
        let hi = self.ranges.partition_point(|r| r.start <= range.end);

        let merged = if lo < hi {
            self.ranges[lo].start.min(range.start)..self.ranges[hi - 1].end.max(range.end)
        } else {
            range
        };
        self.ranges.splice(lo..hi, std::iter::once(merged));
    }

    pub fn insert_point(&mut self, index: i64) {
        self.insert(index..index + 1)
    }

    pub fn union(&self, other: &Self) -> Self {
        let mut result = Vec::with_capacity(self.ranges.len() + other.ranges.len());
        let (mut a, mut b) = (self.ranges.iter().peekable(), other.ranges.iter().peekable());

        loop {
            let next = match (a.peek(), b.peek()) {
                (Some(x), Some(y)) => if x.start <= y.start { a.next() } else { b.next() },
                (Some(_), None) => a.next(),
                (None, Some(_)) => b.next(),
                (None, None) => break,
            };
            if let Some(r) = next {
                push_coalesced(&mut result, r.clone());
            }
        }
        Self { ranges: result }
    }

    pub fn intersection(&self, other: &Self) -> Self {
        let mut result = Vec::new();
        let (mut i, mut j) = (0, 0);

        while i < self.ranges.len() && j < other.ranges.len() {
            let (x, y) = (&self.ranges[i], &other.ranges[j]);
            let start = x.start.max(y.start);
            let end = x.end.min(y.end);

            if start < end {
                result.push(start..end)
            }
            if x.end <= y.end {
                i += 1
            } else {
                j += 1
            }
        }
        Self { ranges: result }
    }

    pub fn difference(&self, other: &Self) -> Self {
        let mut result = Vec::new();
        let mut j = 0;

        for x in &self.ranges {
            let mut start = x.start;

            while j < other.ranges.len() && other.ranges[j].end <= start {
                j += 1
            }
            let mut k = j;

            while k < other.ranges.len() && other.ranges[k].start < x.end {
                let y = &other.ranges[k];
                if y.start > start {
                    result.push(start..y.start)
                }
                start = start.max(y.end);
                k += 1
            }
            if start < x.end {
                result.push(start..x.end)
            }
        }
        Self { ranges: result }
    }

    pub fn translate(&self, shift: i64) -> Self {
        Self { ranges: self.ranges.iter().map(|r| r.start + shift..r.end + shift).collect() }
    }

    /**
     * Re-express the set `delta` levels coarser: an index is present in the
     * result if any of its `2^delta` finer indexes is present.
     */
    pub fn coarsen(&self, delta: usize) -> Self {
        let mut result = Vec::with_capacity(self.ranges.len());

        for r in &self.ranges {
            push_coalesced(&mut result, (r.start >> delta)..((r.end - 1) >> delta) + 1)
        }
        Self { ranges: result }
    }

    /**
     * Re-express the set `delta` levels finer: every index is replaced by
     * its `2^delta` finer indexes.
     */
    pub fn refine(&self, delta: usize) -> Self {
        Self { ranges: self.ranges.iter().map(|r| (r.start << delta)..(r.end << delta)).collect() }
    }

    /**
     * Grow every range by `width` indexes on both sides.
     */
    pub fn expand(&self, width: i64) -> Self {
        assert!(width >= 0, "cannot expand by a negative width");
        let mut result = Vec::with_capacity(self.ranges.len());

        for r in &self.ranges {
            push_coalesced(&mut result, r.start - width..r.end + width)
        }
        Self { ranges: result }
    }
}




// ============================================================================
fn push_coalesced(ranges: &mut Vec<Range<i64>>, range: Range<i64>) {
    if let Some(last) = ranges.last_mut() {
        if range.start <= last.end {
            last.end = last.end.max(range.end);
            return
        }
    }
    ranges.push(range)
}




// ============================================================================
impl FromIterator<Range<i64>> for IntervalSet {
    fn from_iter<I: IntoIterator<Item = Range<i64>>>(iter: I) -> Self {
        let mut set = Self::new();
        for r in iter {
            set.insert(r)
        }
        set
    }
}




// ============================================================================
impl<'a> IntoIterator for &'a IntervalSet {
    type Item = &'a Range<i64>;
    type IntoIter = std::slice::Iter<'a, Range<i64>>;

    fn into_iter(self) -> Self::IntoIter {
        self.ranges.iter()
    }
}
