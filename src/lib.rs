//! Sample from Bayesian posteriors with stochastic gradient Langevin dynamics.
//!
//! Two samplers are provided: plain Langevin dynamics, which evaluates the
//! gradient of every example in each step, and Langevin dynamics with the
//! SAGA variance-reduced gradient estimator, which recomputes the gradients
//! of a random subsample and corrects the estimate with a cache of the most
//! recent gradient of every example.
//!
//! Users describe the model through two traits: [`BatchGradFunc`] returns
//! per-example gradients of the negative log-likelihood, and
//! [`PriorGradFunc`] the gradient of the negative log-prior. Logistic
//! regression ([`LogisticGrad`]) and a Gaussian prior ([`GaussianPrior`]) are
//! included.
//!
//! ```
//! use sagald_rs::{sagald, GaussianPrior, LogisticData, LogisticGrad, Posterior, SagaSettings};
//!
//! let data = LogisticData::from_rows(&[&[1., 0.], &[0., 1.], &[-1., 0.]], vec![1., 1., 0.])?;
//! let mut posterior = Posterior::new(data, LogisticGrad::new(2), GaussianPrior::standard(2))?;
//! let settings = SagaSettings {
//!     batch_size: 2,
//!     seed: 42,
//!     ..Default::default()
//! };
//! let output = sagald(&mut posterior, &settings, Default::default())?;
//! assert_eq!(output.position.len(), 2);
//! # Ok::<(), sagald_rs::SamplerError>(())
//! ```

pub(crate) mod cache;
pub(crate) mod chain;
pub(crate) mod data;
pub(crate) mod error;
pub(crate) mod gradient;
pub(crate) mod langevin;
pub(crate) mod math;
pub(crate) mod posterior;
pub(crate) mod prior;
pub(crate) mod saga;

pub use cache::GradientCache;
pub use chain::{sample_sequentially, Chain, LangevinChain, Progress, SagaChain};
pub use data::{Dataset, LogisticData};
pub use error::{Result, SamplerError};
pub use gradient::{sum_rows, BatchGradFunc, LogisticGrad};
pub use langevin::{langevin, langevin_step, LangevinSettings};
pub use math::{log1pexp, log1pexp_slice, sigmoid, LARGE_NUMBER};
pub use posterior::Posterior;
pub use prior::{GaussianPrior, PriorGradFunc};
pub use saga::{init_cache, saga_step, sagald, SagaInit, SagaOutput, SagaSettings, Window};
