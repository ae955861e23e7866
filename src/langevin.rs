use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;

use crate::{
    error::{check_len, Result, SamplerError},
    gradient::BatchGradFunc,
    math::langevin_update,
    posterior::Posterior,
    prior::PriorGradFunc,
};

/// Settings for full-gradient Langevin dynamics
#[derive(Debug, Clone, Copy)]
pub struct LangevinSettings {
    /// The constant step size η. The injected noise has variance 2η.
    pub step_size: f64,
    /// The number of Langevin steps of [`langevin`].
    pub num_steps: u64,
    pub seed: u64,
}

impl Default for LangevinSettings {
    fn default() -> Self {
        Self {
            step_size: 0.01,
            num_steps: 100,
            seed: 0,
        }
    }
}

impl LangevinSettings {
    pub fn validate(&self) -> Result<()> {
        check_step_size(self.step_size)
    }

    /// The random number generator of chain `chain`.
    pub(crate) fn new_rng(&self, chain: u64) -> ChaCha8Rng {
        seeded_rng(self.seed, chain)
    }
}

pub(crate) fn seeded_rng(seed: u64, chain: u64) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    rng.set_stream(chain);
    rng
}

pub(crate) fn check_step_size(step_size: f64) -> Result<()> {
    if !step_size.is_finite() | (step_size < 0.) {
        return Err(SamplerError::InvalidStepSize(step_size));
    }
    Ok(())
}

/// `dim` independent standard normal draws.
pub(crate) fn gaussian_noise<R: Rng + ?Sized>(rng: &mut R, dim: usize) -> Box<[f64]> {
    (0..dim).map(|_| rng.sample::<f64, _>(StandardNormal)).collect()
}

/// Move `position` along the negative gradient `grad` and add noise.
pub(crate) fn apply_langevin_update<R: Rng + ?Sized>(
    position: &[f64],
    grad: &[f64],
    step_size: f64,
    rng: &mut R,
) -> Box<[f64]> {
    let noise = gaussian_noise(rng, position.len());
    let mut out = vec![0f64; position.len()];
    langevin_update(position, grad, &noise, step_size, &mut out);
    out.into()
}

/// One step of Langevin dynamics using the gradient of all examples.
///
/// Returns the new position; `position` itself is left unchanged.
pub fn langevin_step<G, P, R>(
    posterior: &mut Posterior<G, P>,
    position: &[f64],
    step_size: f64,
    rng: &mut R,
) -> Result<Box<[f64]>>
where
    G: BatchGradFunc,
    P: PriorGradFunc,
    R: Rng + ?Sized,
{
    check_step_size(step_size)?;
    check_len("position", posterior.dim(), position.len())?;

    let mut grad = posterior.full_gradient(position)?;
    posterior.add_prior_grad(position, &mut grad)?;
    Ok(apply_langevin_update(position, &grad, step_size, rng))
}

/// Run `settings.num_steps` Langevin steps starting at `init`, or at the
/// origin if no starting point is given, and return the final position.
pub fn langevin<G, P>(
    posterior: &mut Posterior<G, P>,
    settings: &LangevinSettings,
    init: Option<&[f64]>,
) -> Result<Box<[f64]>>
where
    G: BatchGradFunc,
    P: PriorGradFunc,
{
    settings.validate()?;
    let mut position: Box<[f64]> = match init {
        Some(init) => {
            check_len("initial position", posterior.dim(), init.len())?;
            init.into()
        }
        None => vec![0f64; posterior.dim()].into(),
    };

    log::debug!(
        "Running {} Langevin steps in {} dimensions with step size {}",
        settings.num_steps,
        posterior.dim(),
        settings.step_size
    );

    let mut rng = settings.new_rng(0);
    for _ in 0..settings.num_steps {
        position = langevin_step(posterior, &position, settings.step_size, &mut rng)?;
    }
    Ok(position)
}
