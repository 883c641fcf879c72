/// Supplies values for stored cells lying outside the domain along a
/// non-periodic axis. The filler receives the name of the field being
/// updated, the level and index of the cell, and the cell's values to
/// overwrite.
///
pub trait BoundaryCondition<const DIM: usize> {
    fn fill(&self, field: &str, level: usize, cell: [i64; DIM], values: &mut [f64]);
}

impl<F, const DIM: usize> BoundaryCondition<DIM> for F
where
    F: Fn(&str, usize, [i64; DIM], &mut [f64]),
{
    fn fill(&self, field: &str, level: usize, cell: [i64; DIM], values: &mut [f64]) {
        self(field, level, cell, values)
    }
}

/// A constant value per component, for every field. Components beyond the
/// supplied values take the last one; an empty list fills zeros.
///
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Dirichlet(pub Vec<f64>);

impl<const DIM: usize> BoundaryCondition<DIM> for Dirichlet {
    fn fill(&self, _field: &str, _level: usize, _cell: [i64; DIM], values: &mut [f64]) {
        for (c, x) in values.iter_mut().enumerate() {
            *x = self.0.get(c).or_else(|| self.0.last()).copied().unwrap_or(0.0)
        }
    }
}
