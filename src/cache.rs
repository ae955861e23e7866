use faer::Mat;

use crate::{
    data::check_indices,
    error::{check_len, Result},
    gradient::sum_rows,
    math::axpy,
};

/// The most recent per-example gradient for every visited example, together
/// with the running sum of all of them.
///
/// Rows are stored contiguously in example order, so row `i` belongs to
/// example `i`. The running sum is updated incrementally by the SAGA step
/// and is not recomputed from the rows; [`GradientCache::exact_sum`] gives
/// the full recomputation for comparison.
#[derive(Debug, Clone)]
pub struct GradientCache {
    dim: usize,
    len: usize,
    grads: Vec<f64>,
    sum: Box<[f64]>,
}

impl GradientCache {
    /// An empty cache for parameter vectors of dimension `dim`.
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            len: 0,
            grads: Vec::new(),
            sum: vec![0f64; dim].into(),
        }
    }

    /// A cache holding the rows of `grads` with their exact sum.
    pub fn from_gradients(grads: &Mat<f64>) -> Self {
        let mut cache = Self::new(grads.ncols());
        cache.append_rows(grads);
        cache
    }

    /// Restore a cache from its rows and a running sum computed elsewhere.
    pub fn from_parts(grads: &Mat<f64>, running_sum: &[f64]) -> Result<Self> {
        check_len("running gradient sum", grads.ncols(), running_sum.len())?;
        let mut cache = Self::from_gradients(grads);
        cache.sum.copy_from_slice(running_sum);
        Ok(cache)
    }

    /// Number of cached examples.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// The cached gradient of example `index`.
    pub fn row(&self, index: usize) -> Result<&[f64]> {
        check_indices(&[index], self.len)?;
        Ok(self.row_unchecked(index))
    }

    fn row_unchecked(&self, index: usize) -> &[f64] {
        &self.grads[index * self.dim..(index + 1) * self.dim]
    }

    fn row_unchecked_mut(&mut self, index: usize) -> &mut [f64] {
        &mut self.grads[index * self.dim..(index + 1) * self.dim]
    }

    /// The incrementally maintained sum over all cached rows.
    pub fn running_sum(&self) -> &[f64] {
        &self.sum
    }

    /// Sum of all cached rows, recomputed from scratch.
    pub fn exact_sum(&self) -> Box<[f64]> {
        let mut out = vec![0f64; self.dim];
        (0..self.len).for_each(|i| axpy(self.row_unchecked(i), &mut out, 1.));
        out.into()
    }

    /// Largest absolute difference between the running sum and
    /// [`GradientCache::exact_sum`].
    pub fn drift(&self) -> f64 {
        self.exact_sum()
            .iter()
            .zip(self.sum.iter())
            .map(|(a, b)| (a - b).abs())
            .fold(0f64, f64::max)
    }

    /// Sum of the cached rows at `indices`.
    pub fn sum_at(&self, indices: &[usize]) -> Result<Box<[f64]>> {
        check_indices(indices, self.len)?;
        let mut out = vec![0f64; self.dim];
        indices
            .iter()
            .for_each(|&i| axpy(self.row_unchecked(i), &mut out, 1.));
        Ok(out.into())
    }

    /// Copy the cached rows into a `len × dim` matrix.
    pub fn to_mat(&self) -> Mat<f64> {
        Mat::from_fn(self.len, self.dim, |i, j| self.grads[i * self.dim + j])
    }

    /// Append rows for the next examples and add them to the running sum.
    pub(crate) fn append_rows(&mut self, grads: &Mat<f64>) {
        assert!(grads.ncols() == self.dim);
        let start = self.len;
        self.len += grads.nrows();
        self.grads.resize(self.len * self.dim, 0f64);
        for i in 0..grads.nrows() {
            self.row_unchecked_mut(start + i)
                .iter_mut()
                .enumerate()
                .for_each(|(j, val)| *val = grads[(i, j)]);
        }
        axpy(&sum_rows(grads), &mut self.sum, 1.);
    }

    /// Drop the rows from `len` on and reset the running sum, undoing
    /// earlier calls to `append_rows`.
    pub(crate) fn truncate(&mut self, len: usize, running_sum: Box<[f64]>) {
        assert!(len <= self.len);
        assert!(running_sum.len() == self.dim);
        self.len = len;
        self.grads.truncate(len * self.dim);
        self.sum = running_sum;
    }

    /// Overwrite the rows at `indices` with the rows of `grads` and replace
    /// the running sum. Nothing is written if the shapes do not fit.
    pub(crate) fn replace_rows(
        &mut self,
        indices: &[usize],
        grads: &Mat<f64>,
        running_sum: Box<[f64]>,
    ) -> Result<()> {
        check_indices(indices, self.len)?;
        check_len("replaced gradient rows", indices.len(), grads.nrows())?;
        check_len("replaced gradient columns", self.dim, grads.ncols())?;
        check_len("running gradient sum", self.dim, running_sum.len())?;

        for (i, &idx) in indices.iter().enumerate() {
            self.row_unchecked_mut(idx)
                .iter_mut()
                .enumerate()
                .for_each(|(j, val)| *val = grads[(i, j)]);
        }
        self.sum = running_sum;
        Ok(())
    }
}
