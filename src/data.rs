use faer::Mat;

use crate::error::{check_len, Result, SamplerError};

/// Read-only access to the examples of a dataset.
///
/// The sampler never looks inside the data. It only needs the number of
/// examples, and a way to gather an aligned sub-batch for a set of indices
/// that the gradient function can consume.
pub trait Dataset: Sized {
    /// Number of examples.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of features per example.
    fn num_features(&self) -> usize;

    /// Gather the examples at `indices`, in that order.
    ///
    /// Fails with [`SamplerError::IndexOutOfBounds`] if an index is not
    /// smaller than [`Dataset::len`].
    fn select(&self, indices: &[usize]) -> Result<Self>;
}

pub(crate) fn check_indices(indices: &[usize], len: usize) -> Result<()> {
    match indices.iter().find(|&&idx| idx >= len) {
        Some(&index) => Err(SamplerError::IndexOutOfBounds { index, len }),
        None => Ok(()),
    }
}

/// Contexts and binary rewards of a logistic regression problem.
#[derive(Debug, Clone)]
pub struct LogisticData {
    contexts: Mat<f64>,
    rewards: Vec<f64>,
}

impl LogisticData {
    /// `contexts` is an `N × d` matrix with one example per row, `rewards`
    /// holds the `N` labels in `{0, 1}`.
    pub fn new(contexts: Mat<f64>, rewards: Vec<f64>) -> Result<Self> {
        check_len("logistic rewards", contexts.nrows(), rewards.len())?;
        Ok(Self { contexts, rewards })
    }

    /// Build the dataset from a list of feature rows.
    pub fn from_rows(rows: &[&[f64]], rewards: Vec<f64>) -> Result<Self> {
        let dim = rows.first().map(|row| row.len()).unwrap_or(0);
        for row in rows {
            check_len("logistic context row", dim, row.len())?;
        }
        let contexts = Mat::from_fn(rows.len(), dim, |i, j| rows[i][j]);
        Self::new(contexts, rewards)
    }

    pub fn contexts(&self) -> &Mat<f64> {
        &self.contexts
    }

    pub fn rewards(&self) -> &[f64] {
        &self.rewards
    }
}

impl Dataset for LogisticData {
    fn len(&self) -> usize {
        self.rewards.len()
    }

    fn num_features(&self) -> usize {
        self.contexts.ncols()
    }

    fn select(&self, indices: &[usize]) -> Result<Self> {
        check_indices(indices, self.len())?;
        let contexts = Dataset::select(&self.contexts, indices)?;
        let rewards = indices.iter().map(|&idx| self.rewards[idx]).collect();
        Ok(Self { contexts, rewards })
    }
}

/// A bare feature matrix, one example per row.
impl Dataset for Mat<f64> {
    fn len(&self) -> usize {
        self.nrows()
    }

    fn num_features(&self) -> usize {
        self.ncols()
    }

    fn select(&self, indices: &[usize]) -> Result<Self> {
        check_indices(indices, self.nrows())?;
        Ok(Mat::from_fn(indices.len(), self.ncols(), |i, j| {
            self[(indices[i], j)]
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn data() -> LogisticData {
        LogisticData::from_rows(&[&[1., 2.], &[3., 4.], &[5., 6.]], vec![0., 1., 1.]).unwrap()
    }

    #[test]
    fn select_keeps_rows_aligned() {
        let data = data();
        let batch = data.select(&[2, 0]).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.num_features(), 2);
        assert_eq!(batch.rewards(), &[1., 0.]);
        assert_eq!(batch.contexts()[(0, 0)], 5.);
        assert_eq!(batch.contexts()[(1, 1)], 2.);
    }

    #[test]
    fn select_out_of_bounds() {
        let err = data().select(&[0, 3]).unwrap_err();
        assert!(matches!(
            err,
            SamplerError::IndexOutOfBounds { index: 3, len: 3 }
        ));
    }

    #[test]
    fn reward_length_mismatch() {
        let err = LogisticData::new(Mat::zeros(3, 2), vec![0., 1.]).unwrap_err();
        assert!(matches!(
            err,
            SamplerError::ShapeMismatch {
                expected: 3,
                found: 2,
                ..
            }
        ));
        assert!(LogisticData::from_rows(&[&[1., 2.], &[3.]], vec![0., 1.]).is_err());
    }

    #[test]
    fn empty_selection() {
        let batch = data().select(&[]).unwrap();
        assert!(batch.is_empty());
        assert_eq!(batch.num_features(), 2);
    }
}
