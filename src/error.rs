use thiserror::Error;

/// Errors raised by the sampler and by the gradient and prior contracts.
///
/// None of these are recoverable inside a run: a failing step aborts the
/// loop and the error is returned to the caller.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SamplerError {
    #[error("Shape mismatch in {what}: expected {expected}, found {found}")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("Covariance matrix is singular or not positive definite")]
    SingularCovariance,
    #[error("Covariance matrix is not symmetric")]
    NonSymmetricCovariance,
    #[error("Invalid sample size: {0}")]
    InvalidSampleSize(String),
    #[error("Index {index} out of bounds for {len} examples")]
    IndexOutOfBounds { index: usize, len: usize },
    #[error("Step size must be finite and non-negative, got {0}")]
    InvalidStepSize(f64),
    #[error("Gradient function returned an error")]
    GradientFailure(#[source] Box<dyn std::error::Error + Send + Sync>),
}

pub type Result<T> = std::result::Result<T, SamplerError>;

pub(crate) fn check_len(what: &'static str, expected: usize, found: usize) -> Result<()> {
    if expected != found {
        return Err(SamplerError::ShapeMismatch {
            what,
            expected,
            found,
        });
    }
    Ok(())
}
