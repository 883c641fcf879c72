use core::ops::Range;




/**
 * Represents a rectangular region in a discrete `DIM`-dimensional index
 * space. The index type is signed 64-bit integer.
 */
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct IndexBox<const DIM: usize> {
    start: [i64; DIM],
    end: [i64; DIM],
}




impl<const DIM: usize> IndexBox<DIM> {


    pub fn new(start: [i64; DIM], end: [i64; DIM]) -> Self {

        assert!(
            (0..DIM).all(|d| start[d] <= end[d]),
            "index box has negative volume");

        Self { start, end }
    }


    /**
     * Construct a box from one `Range` per axis.
     */
    pub fn from_ranges(ranges: [Range<i64>; DIM]) -> Self {
        let mut start = [0; DIM];
        let mut end = [0; DIM];

        for (d, r) in ranges.iter().enumerate() {
            start[d] = r.start;
            end[d] = r.end;
        }
        Self::new(start, end)
    }


    /**
     * Return the number of indexes on each axis.
     */
    pub fn dim(&self) -> [usize; DIM] {
        let mut shape = [0; DIM];

        for d in 0..DIM {
            shape[d] = (self.end[d] - self.start[d]) as usize
        }
        shape
    }


    /**
     * Return the number of elements in this index box.
     */
    pub fn len(&self) -> usize {
        self.dim().iter().product()
    }


    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }


    /**
     * Return the minimum index (inclusive).
     */
    pub fn start(&self) -> [i64; DIM] {
        self.start
    }


    /**
     * Return the maximum index (exclusive).
     */
    pub fn end(&self) -> [i64; DIM] {
        self.end
    }


    /**
     * Return the range covered on one axis.
     */
    pub fn axis(&self, axis: usize) -> Range<i64> {
        self.start[axis]..self.end[axis]
    }


    /**
     * Determine whether this index box contains the given index.
     */
    pub fn contains(&self, index: [i64; DIM]) -> bool {
        (0..DIM).all(|d| self.start[d] <= index[d] && index[d] < self.end[d])
    }


    /**
     * Determine whether another index box is a subset of this one.
     */
    pub fn contains_box(&self, other: &Self) -> bool {
        (0..DIM).all(|d| other.start[d] >= self.start[d] && other.end[d] <= self.end[d])
    }


    /**
     * Expand this index box by the given number of elements on each axis.
     */
    pub fn extend_all(&self, delta: i64) -> Self {
        let mut start = self.start;
        let mut end = self.end;

        for d in 0..DIM {
            start[d] -= delta;
            end[d] += delta;
        }
        Self::new(start, end)
    }


    /**
     * Trim this index box by the given number of elements on each axis.
     */
    pub fn trim_all(&self, delta: i64) -> Self {
        self.extend_all(-delta)
    }


    /**
     * Replace the range covered on one axis.
     */
    pub fn with_axis(&self, axis: usize, range: Range<i64>) -> Self {
        let mut start = self.start;
        let mut end = self.end;
        start[axis] = range.start;
        end[axis] = range.end;
        Self::new(start, end)
    }


    /**
     * Return the box shifted by the given offset.
     */
    pub fn translate(&self, shift: [i64; DIM]) -> Self {
        let mut start = self.start;
        let mut end = self.end;

        for d in 0..DIM {
            start[d] += shift[d];
            end[d] += shift[d];
        }
        Self::new(start, end)
    }


    /**
     * Return the smallest box at `delta` levels coarser which covers this
     * one.
     */
    pub fn coarsen(&self, delta: usize) -> Self {
        let mut start = self.start;
        let mut end = self.end;

        for d in 0..DIM {
            start[d] = self.start[d] >> delta;
            end[d] = if self.end[d] > self.start[d] { ((self.end[d] - 1) >> delta) + 1 } else { start[d] };
        }
        Self::new(start, end)
    }


    /**
     * Return the box covering the same region `delta` levels finer.
     */
    pub fn refine(&self, delta: usize) -> Self {
        let mut start = self.start;
        let mut end = self.end;

        for d in 0..DIM {
            start[d] <<= delta;
            end[d] <<= delta;
        }
        Self::new(start, end)
    }


    /**
     * Return an iterator which traverses the index box in row-major order
     * (C-like; the final index increases fastest).
     */
    pub fn iter(&self) -> impl Iterator<Item = [i64; DIM]> + '_ {
        let shape = self.dim();

        (0..self.len()).map(move |mut n| {
            let mut index = self.start;

            for d in (0..DIM).rev() {
                index[d] += (n % shape[d]) as i64;
                n /= shape[d];
            }
            index
        })
    }
}
