use core::ops::Range;
use crate::mesh::{Mesh, MeshRole};
use crate::subset::LevelSet;




/**
 * Values attached to every stored cell of a mesh. A field holds `n_comp`
 * values per cell, laid out cell-major in the storage order of the mesh's
 * `AllCells` array. A field is bound to the mesh it was created on: any
 * access through a different mesh panics.
 */
#[derive(Clone, Debug)]
pub struct Field<T, const DIM: usize> {
    name: String,
    n_comp: usize,
    mesh_id: u64,
    data: Vec<T>,
}




// ============================================================================
impl<T: Copy + Default, const DIM: usize> Field<T, DIM> {

    pub fn new(name: &str, n_comp: usize, mesh: &Mesh<DIM>) -> Self {
        assert!(n_comp > 0, "field '{}' must have at least one component", name);
        Self {
            name: name.to_string(),
            n_comp,
            mesh_id: mesh.id(),
            data: vec![T::default(); n_comp * mesh.nb_cells(MeshRole::AllCells)],
        }
    }

    /**
     * Create a field and evaluate a function on every stored cell. The
     * function receives the level, the cell index and the cell's values.
     */
    pub fn from_fn<F>(name: &str, n_comp: usize, mesh: &Mesh<DIM>, mut f: F) -> Self
    where
        F: FnMut(usize, [i64; DIM], &mut [T])
    {
        let mut field = Self::new(name, n_comp, mesh);

        mesh[MeshRole::AllCells].for_each_interval(|level, interval, key| {
            for i in interval.range() {
                let mut cell = *key;
                cell[0] = i;
                let slot = interval.slot(i) * n_comp;
                f(level, cell, &mut field.data[slot..slot + n_comp])
            }
        });
        field
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn n_comp(&self) -> usize {
        self.n_comp
    }

    /**
     * The number of cells the field holds values for.
     */
    pub fn len(&self) -> usize {
        self.data.len() / self.n_comp
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn fill(&mut self, value: T) {
        for x in self.data.iter_mut() {
            *x = value
        }
    }

    pub fn is_bound_to(&self, mesh: &Mesh<DIM>) -> bool {
        self.mesh_id == mesh.id()
    }

    /**
     * Rebind the field to a mesh, discarding its values.
     */
    pub fn resize(&mut self, mesh: &Mesh<DIM>) {
        self.mesh_id = mesh.id();
        self.data = vec![T::default(); self.n_comp * mesh.nb_cells(MeshRole::AllCells)];
    }

    /**
     * Replace the values and the binding of this field with those of
     * another one, keeping the name.
     */
    pub(crate) fn replace_with(&mut self, other: Field<T, DIM>) {
        assert_eq!(self.n_comp, other.n_comp, "cannot replace field '{}' by a field with a different component count", self.name);
        self.mesh_id = other.mesh_id;
        self.data = other.data;
    }

    fn check(&self, mesh: &Mesh<DIM>) {
        assert!(
            self.mesh_id == mesh.id(),
            "field '{}' is bound to mesh {} but was accessed through mesh {}",
            self.name,
            self.mesh_id,
            mesh.id());
    }

    fn slots(&self, mesh: &Mesh<DIM>, level: usize, range: &Range<i64>, key: &[i64; DIM]) -> Range<usize> {
        self.check(mesh);
        let offset = mesh.interval_offset(level, range, key).unwrap_or_else(|| panic!(
            "field '{}': cells {:?} of row {:?} at level {} are not stored",
            self.name, range, key, level));
        let n = (range.end - range.start) as usize;
        offset * self.n_comp..(offset + n) * self.n_comp
    }

    /**
     * Return the values of a single stored cell. Panics if the cell is not
     * stored.
     */
    pub fn get(&self, mesh: &Mesh<DIM>, level: usize, cell: [i64; DIM]) -> &[T] {
        &self.data[self.slots(mesh, level, &(cell[0]..cell[0] + 1), &cell)]
    }

    pub fn get_mut(&mut self, mesh: &Mesh<DIM>, level: usize, cell: [i64; DIM]) -> &mut [T] {
        let slots = self.slots(mesh, level, &(cell[0]..cell[0] + 1), &cell);
        &mut self.data[slots]
    }

    /**
     * Return the values of a single cell, or `None` if it is not stored.
     */
    pub fn try_get(&self, mesh: &Mesh<DIM>, level: usize, cell: [i64; DIM]) -> Option<&[T]> {
        self.check(mesh);
        let offset = mesh.cell_offset(level, cell)?;
        Some(&self.data[offset * self.n_comp..(offset + 1) * self.n_comp])
    }

    /**
     * Return the values of a range of cells on one row, which must lie in
     * one stored interval.
     */
    pub fn interval(&self, mesh: &Mesh<DIM>, level: usize, range: &Range<i64>, key: &[i64; DIM]) -> &[T] {
        &self.data[self.slots(mesh, level, range, key)]
    }

    pub fn interval_mut(&mut self, mesh: &Mesh<DIM>, level: usize, range: &Range<i64>, key: &[i64; DIM]) -> &mut [T] {
        let slots = self.slots(mesh, level, range, key);
        &mut self.data[slots]
    }

    /**
     * Invoke a function on every interval of a set of stored cells, with
     * mutable access to the values of the interval.
     */
    pub fn apply<F>(&mut self, mesh: &Mesh<DIM>, set: &LevelSet<DIM>, mut f: F)
    where
        F: FnMut(&Range<i64>, &[i64; DIM], &mut [T])
    {
        let level = set.level();
        set.apply(|range, key| f(range, key, self.interval_mut(mesh, level, range, key)))
    }

    /**
     * Copy the values of a range of stored cells onto another range of the
     * same length.
     */
    pub(crate) fn copy_interval(
        &mut self,
        mesh: &Mesh<DIM>,
        level: usize,
        target: (&Range<i64>, &[i64; DIM]),
        source: (&Range<i64>, &[i64; DIM]))
    {
        let src = self.slots(mesh, level, source.0, source.1);
        let dst = self.slots(mesh, level, target.0, target.1);
        self.data.copy_within(src, dst.start)
    }
}
