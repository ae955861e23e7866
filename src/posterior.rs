use faer::Mat;

use crate::{
    data::Dataset,
    error::{check_len, Result},
    gradient::{batch_gradients, sum_rows, BatchGradFunc},
    math::axpy,
    prior::PriorGradFunc,
};

/// The target of the sampler: a dataset, the per-example likelihood
/// gradient and the prior gradient.
#[derive(Debug)]
pub struct Posterior<G: BatchGradFunc, P: PriorGradFunc> {
    data: G::Data,
    grad_func: G,
    prior: P,
}

impl<G: BatchGradFunc, P: PriorGradFunc> Posterior<G, P> {
    /// Fails with a shape mismatch if the features of the dataset do not
    /// match the dimension of the gradient function.
    pub fn new(data: G::Data, grad_func: G, prior: P) -> Result<Self> {
        check_len("dataset features", grad_func.dim(), data.num_features())?;
        Ok(Self {
            data,
            grad_func,
            prior,
        })
    }

    /// The dimension of the parameter vector.
    pub fn dim(&self) -> usize {
        self.grad_func.dim()
    }

    /// The total number of examples `T`.
    pub fn num_examples(&self) -> usize {
        self.data.len()
    }

    pub fn data(&self) -> &G::Data {
        &self.data
    }

    pub fn into_parts(self) -> (G::Data, G, P) {
        (self.data, self.grad_func, self.prior)
    }

    /// Per-example gradients for the examples at `indices`.
    pub fn gradients_at(&mut self, position: &[f64], indices: &[usize]) -> Result<Mat<f64>> {
        let batch = self.data.select(indices)?;
        batch_gradients(&mut self.grad_func, position, &batch)
    }

    /// Summed likelihood gradient over the whole dataset.
    pub fn full_gradient(&mut self, position: &[f64]) -> Result<Box<[f64]>> {
        let grads = batch_gradients(&mut self.grad_func, position, &self.data)?;
        Ok(sum_rows(&grads))
    }

    /// Add the prior gradient at `position` to `grad`.
    pub fn add_prior_grad(&mut self, position: &[f64], grad: &mut [f64]) -> Result<()> {
        check_len("position", self.dim(), position.len())?;
        check_len("gradient", self.dim(), grad.len())?;
        let mut prior_grad = vec![0f64; self.dim()];
        self.prior.prior_grad(position, &mut prior_grad)?;
        axpy(&prior_grad, grad, 1.);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        data::LogisticData, error::SamplerError, gradient::LogisticGrad, prior::GaussianPrior,
    };
    use approx::assert_relative_eq;

    #[test]
    fn dimension_check() {
        let data = LogisticData::from_rows(&[&[1., 2., 3.]], vec![1.]).unwrap();
        let err = Posterior::new(data, LogisticGrad::new(2), GaussianPrior::standard(2))
            .unwrap_err();
        assert!(matches!(
            err,
            SamplerError::ShapeMismatch {
                expected: 2,
                found: 3,
                ..
            }
        ));
    }

    #[test]
    fn full_gradient_with_prior() {
        let data = LogisticData::from_rows(&[&[1., 0.], &[0., 1.]], vec![1., 1.]).unwrap();
        let mut posterior =
            Posterior::new(data, LogisticGrad::new(2), GaussianPrior::standard(2)).unwrap();
        let x = [1., 0.];
        let mut grad = posterior.full_gradient(&x).unwrap();
        posterior.add_prior_grad(&x, &mut grad).unwrap();

        let p = 1. / (1. + (-1f64).exp());
        assert_relative_eq!(grad[0], (p - 1.) + 1., epsilon = 1e-12);
        assert_relative_eq!(grad[1], -0.5, epsilon = 1e-12);

        let grads = posterior.gradients_at(&x, &[1]).unwrap();
        assert_eq!(grads.nrows(), 1);
        assert_relative_eq!(grads[(0, 1)], -0.5);
    }
}
