use core::ops::Range;




/**
 * A stored interval of cells `[start, end)` along the primary axis. The
 * storage slot of the cell at primary index `i` is `index + i`.
 */
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Interval {
    pub start: i64,
    pub end: i64,
    pub index: i64,
}




// ============================================================================
impl Interval {

    pub fn new(start: i64, end: i64, index: i64) -> Self {
        assert!(start <= end, "malformed interval [{}, {}): negative length", start, end);
        Self { start, end, index }
    }

    pub fn len(&self) -> usize {
        (self.end - self.start) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn contains(&self, i: i64) -> bool {
        self.start <= i && i < self.end
    }

    pub fn range(&self) -> Range<i64> {
        self.start..self.end
    }

    /**
     * Return the storage slot of primary index `i`. The index is not checked
     * against the interval bounds.
     */
    pub fn slot(&self, i: i64) -> usize {
        (self.index + i) as usize
    }
}




// ============================================================================
#[cfg(test)]
mod test {

    use super::Interval;

    #[test]
    fn slot_is_offset_from_index() {
        let interval = Interval::new(-3, 2, 10);
        assert_eq!(interval.len(), 5);
        assert_eq!(interval.slot(-3), 7);
        assert_eq!(interval.slot(1), 11);
        assert!(interval.contains(-3));
        assert!(!interval.contains(2));
    }

    #[test]
    #[should_panic]
    fn reversed_interval_panics() {
        Interval::new(4, 3, 0);
    }
}
