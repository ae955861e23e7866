use faer::{Col, Mat};

use crate::{
    data::{Dataset, LogisticData},
    error::{check_len, Result},
    math::sigmoid,
};

/// Per-example gradients of the negative log-likelihood.
///
/// This needs to be implemented by users of the library to define the
/// likelihood of the model. Implementations must be deterministic and must
/// not keep state that depends on the position between calls.
pub trait BatchGradFunc {
    type Data: Dataset;

    /// The dimension of the parameter vector.
    fn dim(&self) -> usize;

    /// Return a `batch.len() × dim` matrix whose row `i` is the gradient of
    /// the negative log-likelihood of example `i` at `position`.
    fn batch_grad(&mut self, position: &[f64], batch: &Self::Data) -> Result<Mat<f64>>;
}

/// Call the gradient function and check the shape of its output.
pub(crate) fn batch_gradients<G: BatchGradFunc>(
    grad_func: &mut G,
    position: &[f64],
    batch: &G::Data,
) -> Result<Mat<f64>> {
    let dim = grad_func.dim();
    check_len("position", dim, position.len())?;
    let grads = grad_func.batch_grad(position, batch)?;
    check_len("gradient rows", batch.len(), grads.nrows())?;
    check_len("gradient columns", dim, grads.ncols())?;
    Ok(grads)
}

/// Sum of the rows of `grads`.
pub fn sum_rows(grads: &Mat<f64>) -> Box<[f64]> {
    let mut out = vec![0f64; grads.ncols()];
    for i in 0..grads.nrows() {
        out.iter_mut()
            .enumerate()
            .for_each(|(j, out)| *out += grads[(i, j)]);
    }
    out.into()
}

/// Gradient of the logistic regression negative log-likelihood.
///
/// For an example with context `z` and label `y` the gradient is
/// `(sigmoid(x·z) - y) z`.
#[derive(Debug, Clone, Copy)]
pub struct LogisticGrad {
    dim: usize,
}

impl LogisticGrad {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }
}

impl BatchGradFunc for LogisticGrad {
    type Data = LogisticData;

    fn dim(&self) -> usize {
        self.dim
    }

    fn batch_grad(&mut self, position: &[f64], batch: &LogisticData) -> Result<Mat<f64>> {
        check_len("position", self.dim, position.len())?;
        check_len("logistic contexts", self.dim, batch.num_features())?;

        let contexts = batch.contexts();
        let x = Col::from_fn(self.dim, |j| position[j]);
        let logits = contexts * &x;

        let residuals: Vec<f64> = logits
            .iter()
            .zip(batch.rewards())
            .map(|(&z, &y)| sigmoid(z) - y)
            .collect();

        Ok(Mat::from_fn(batch.len(), self.dim, |i, j| {
            residuals[i] * contexts[(i, j)]
        }))
    }
}
