use faer::{Col, Mat};

use crate::error::{check_len, Result, SamplerError};

/// Gradient of the negative log-density of the prior.
pub trait PriorGradFunc {
    /// Write the prior gradient at `position` into `grad`. Both slices have
    /// the dimension of the parameter vector.
    fn prior_grad(&mut self, position: &[f64], grad: &mut [f64]) -> Result<()>;
}

impl<F> PriorGradFunc for F
where
    F: FnMut(&[f64], &mut [f64]),
{
    fn prior_grad(&mut self, position: &[f64], grad: &mut [f64]) -> Result<()> {
        check_len("prior gradient", position.len(), grad.len())?;
        self(position, grad);
        Ok(())
    }
}

/// A multivariate normal prior `N(mu, cov)`.
///
/// The inverse covariance is computed once at construction, so every
/// evaluation is a single matrix-vector product.
#[derive(Debug, Clone)]
pub struct GaussianPrior {
    mu: Col<f64>,
    inv_cov: Mat<f64>,
}

impl GaussianPrior {
    /// Create a prior with mean `mu` and covariance `cov`, which defaults to
    /// the identity.
    ///
    /// The covariance must be symmetric and positive definite.
    pub fn new(mu: &[f64], cov: Option<Mat<f64>>) -> Result<Self> {
        let dim = mu.len();
        let mu = Col::from_fn(dim, |i| mu[i]);
        let inv_cov = match cov {
            None => Mat::identity(dim, dim),
            Some(cov) => invert_covariance(cov, dim)?,
        };
        Ok(Self { mu, inv_cov })
    }

    /// The standard normal prior in `dim` dimensions.
    pub fn standard(dim: usize) -> Self {
        Self {
            mu: Col::zeros(dim),
            inv_cov: Mat::identity(dim, dim),
        }
    }

    pub fn dim(&self) -> usize {
        self.mu.nrows()
    }

    pub fn inv_cov(&self) -> &Mat<f64> {
        &self.inv_cov
    }
}

fn invert_covariance(cov: Mat<f64>, dim: usize) -> Result<Mat<f64>> {
    check_len("covariance rows", dim, cov.nrows())?;
    check_len("covariance columns", dim, cov.ncols())?;

    let mut scale = 0f64;
    for i in 0..dim {
        for j in 0..dim {
            scale = scale.max(cov[(i, j)].abs());
        }
    }
    if !scale.is_finite() {
        return Err(SamplerError::SingularCovariance);
    }
    for i in 0..dim {
        for j in 0..i {
            if (cov[(i, j)] - cov[(j, i)]).abs() > 1e-10 * scale {
                return Err(SamplerError::NonSymmetricCovariance);
            }
        }
    }

    let eig = cov
        .self_adjoint_eigen(faer::Side::Lower)
        .map_err(|_| SamplerError::SingularCovariance)?;

    let u = eig.U();
    let mut vals = eig.S().column_vector().to_owned();

    let max_val = vals.iter().cloned().fold(0f64, f64::max);
    let tol = (dim as f64) * 1e-12 * max_val;
    if (max_val <= 0.) | vals.iter().any(|&val| !(val > tol)) {
        return Err(SamplerError::SingularCovariance);
    }

    vals.iter_mut().for_each(|val| *val = val.recip());
    Ok(u * vals.into_diagonal() * u.transpose())
}

impl PriorGradFunc for GaussianPrior {
    fn prior_grad(&mut self, position: &[f64], grad: &mut [f64]) -> Result<()> {
        check_len("position", self.dim(), position.len())?;
        check_len("prior gradient", self.dim(), grad.len())?;

        let diff = Col::from_fn(self.dim(), |i| position[i] - self.mu[i]);
        let out = &self.inv_cov * &diff;
        grad.iter_mut()
            .enumerate()
            .for_each(|(i, grad)| *grad = out[i]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn identity_prior_gradient() {
        let mut prior = GaussianPrior::new(&[1., -2.], None).unwrap();
        let mut grad = [0.; 2];
        prior.prior_grad(&[3., 0.], &mut grad).unwrap();
        assert_eq!(grad, [2., 2.]);
    }

    #[test]
    fn full_covariance_inverse() {
        let cov = faer::mat![[2., 1.], [1., 2.]];
        let mut prior = GaussianPrior::new(&[0., 0.], Some(cov)).unwrap();

        // inverse of [[2, 1], [1, 2]] is [[2, -1], [-1, 2]] / 3
        let inv = prior.inv_cov();
        assert_relative_eq!(inv[(0, 0)], 2. / 3., epsilon = 1e-12);
        assert_relative_eq!(inv[(0, 1)], -1. / 3., epsilon = 1e-12);
        assert_relative_eq!(inv[(1, 1)], 2. / 3., epsilon = 1e-12);

        let mut grad = [0.; 2];
        prior.prior_grad(&[1., 0.], &mut grad).unwrap();
        assert_relative_eq!(grad[0], 2. / 3., epsilon = 1e-12);
        assert_relative_eq!(grad[1], -1. / 3., epsilon = 1e-12);
    }

    #[test]
    fn singular_covariance() {
        let cov = faer::mat![[1., 1.], [1., 1.]];
        let err = GaussianPrior::new(&[0., 0.], Some(cov)).unwrap_err();
        assert!(matches!(err, SamplerError::SingularCovariance));

        let err = GaussianPrior::new(&[0., 0.], Some(Mat::zeros(2, 2))).unwrap_err();
        assert!(matches!(err, SamplerError::SingularCovariance));

        let cov = faer::mat![[1., 0.], [0., -1.]];
        let err = GaussianPrior::new(&[0., 0.], Some(cov)).unwrap_err();
        assert!(matches!(err, SamplerError::SingularCovariance));
    }

    #[test]
    fn invalid_covariance_shape() {
        let err = GaussianPrior::new(&[0., 0.], Some(Mat::identity(3, 3))).unwrap_err();
        assert!(matches!(err, SamplerError::ShapeMismatch { .. }));

        let cov = faer::mat![[1., 0.5], [0., 1.]];
        let err = GaussianPrior::new(&[0., 0.], Some(cov)).unwrap_err();
        assert!(matches!(err, SamplerError::NonSymmetricCovariance));
    }

    #[test]
    fn closure_prior() {
        let mut prior = |x: &[f64], grad: &mut [f64]| {
            grad.iter_mut().zip(x).for_each(|(g, x)| *g = 2. * x);
        };
        let mut grad = [0.; 2];
        prior.prior_grad(&[1., 2.], &mut grad).unwrap();
        assert_eq!(grad, [2., 4.]);
        assert!(prior.prior_grad(&[1., 2.], &mut [0.; 3]).is_err());
    }

    proptest! {
        #[test]
        fn zero_gradient_at_mean(
            mu in prop::collection::vec(-10f64..10., 3),
            a in prop::collection::vec(-2f64..2., 9),
        ) {
            // a aᵀ + I is symmetric positive definite
            let a = Mat::from_fn(3, 3, |i, j| a[3 * i + j]);
            let mut cov = &a * a.transpose();
            for i in 0..3 {
                cov[(i, i)] += 1.;
            }
            let mut prior = GaussianPrior::new(&mu, Some(cov)).unwrap();
            let mut grad = [1.; 3];
            prior.prior_grad(&mu, &mut grad).unwrap();
            prop_assert_eq!(grad, [0.; 3]);
        }
    }
}
