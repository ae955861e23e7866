use std::time::{Duration, Instant};

use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::{
    cache::GradientCache,
    error::{check_len, Result, SamplerError},
    gradient::{sum_rows, BatchGradFunc},
    langevin::{apply_langevin_update, check_step_size, seeded_rng},
    math::{axpy, axpy_out},
    posterior::Posterior,
    prior::PriorGradFunc,
};

/// How many examples `t` the sampler can draw from at each step.
///
/// Examples are always reachable as a prefix `0..t` of the dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Window {
    /// Every example of the dataset, for every step.
    #[default]
    Full,
    /// The first `t` examples, for every step.
    Fixed(usize),
    /// Start with the first `initial` examples and make `per_step` more
    /// reachable after each step, until the whole dataset is reachable.
    ///
    /// The gradient of a newly reachable example is computed at the current
    /// position and added to the cache before the example can be sampled.
    Streaming { initial: usize, per_step: usize },
}

impl Window {
    pub fn validate(&self, num_examples: usize) -> Result<()> {
        let initial = self.initial(num_examples);
        if initial == 0 {
            return Err(SamplerError::InvalidSampleSize(
                "the window must contain at least one example".into(),
            ));
        }
        if initial > num_examples {
            return Err(SamplerError::InvalidSampleSize(format!(
                "window of {} examples exceeds the {} examples of the dataset",
                initial, num_examples
            )));
        }
        Ok(())
    }

    /// The number of reachable examples at the first step.
    pub fn initial(&self, num_examples: usize) -> usize {
        match *self {
            Window::Full => num_examples,
            Window::Fixed(t) => t,
            Window::Streaming { initial, .. } => initial,
        }
    }

    /// The number of reachable examples when continuing from a cache with
    /// `cached` rows.
    ///
    /// A streaming window picks up where it stopped, so any cache between
    /// the initial window and the whole dataset is accepted. The other
    /// windows never change and need a cache of exactly their size.
    pub fn resume(&self, cached: usize, num_examples: usize) -> Result<usize> {
        let initial = self.initial(num_examples);
        let streaming = matches!(self, Window::Streaming { .. });
        if cached < initial || cached > num_examples || (cached > initial && !streaming) {
            return Err(SamplerError::ShapeMismatch {
                what: "gradient cache rows",
                expected: initial,
                found: cached,
            });
        }
        Ok(cached)
    }

    /// The number of reachable examples after a step with `t` examples.
    pub fn advance(&self, t: usize, num_examples: usize) -> usize {
        match *self {
            Window::Full | Window::Fixed(_) => t,
            Window::Streaming { per_step, .. } => t.saturating_add(per_step).min(num_examples),
        }
    }
}

/// Settings for Langevin dynamics with the SAGA gradient estimator
#[derive(Debug, Clone, Copy)]
pub struct SagaSettings {
    /// The constant step size η. The injected noise has variance 2η.
    pub step_size: f64,
    /// The maximum number of steps of [`sagald`].
    pub num_steps: u64,
    /// The number of examples whose gradient is recomputed in each step.
    pub batch_size: usize,
    /// Which examples are reachable at each step.
    pub window: Window,
    /// Stop [`sagald`] early once this much wall clock time has passed.
    pub max_time: Option<Duration>,
    pub seed: u64,
}

impl Default for SagaSettings {
    fn default() -> Self {
        Self {
            step_size: 0.01,
            num_steps: 200,
            batch_size: 32,
            window: Window::Full,
            max_time: None,
            seed: 0,
        }
    }
}

impl SagaSettings {
    pub fn validate(&self, num_examples: usize) -> Result<()> {
        check_step_size(self.step_size)?;
        check_batch_size(self.batch_size)?;
        self.window.validate(num_examples)
    }

    pub(crate) fn new_rng(&self, chain: u64) -> ChaCha8Rng {
        seeded_rng(self.seed, chain)
    }
}

fn check_batch_size(batch_size: usize) -> Result<()> {
    if batch_size == 0 {
        return Err(SamplerError::InvalidSampleSize(
            "batch size must be positive".into(),
        ));
    }
    Ok(())
}

/// Optional starting state for [`sagald`].
#[derive(Debug, Clone, Default)]
pub struct SagaInit {
    /// Defaults to the origin.
    pub position: Option<Box<[f64]>>,
    /// Defaults to the gradients of the initially reachable examples at the
    /// starting position.
    pub cache: Option<GradientCache>,
}

/// The final state of [`sagald`].
#[derive(Debug, Clone)]
pub struct SagaOutput {
    pub position: Box<[f64]>,
    /// The per-example gradients and their running sum.
    pub cache: GradientCache,
    /// The number of steps that were taken. This is smaller than
    /// `num_steps` if the run was stopped by `max_time`.
    pub num_steps: u64,
}

/// Evaluate the gradients of the first `t` examples at `position`.
pub fn init_cache<G, P>(
    posterior: &mut Posterior<G, P>,
    position: &[f64],
    t: usize,
) -> Result<GradientCache>
where
    G: BatchGradFunc,
    P: PriorGradFunc,
{
    let mut cache = GradientCache::new(posterior.dim());
    grow_cache(posterior, &mut cache, position, t)?;
    Ok(cache)
}

/// Add the gradients of examples `cache.len()..t` at `position` to the cache.
pub(crate) fn grow_cache<G, P>(
    posterior: &mut Posterior<G, P>,
    cache: &mut GradientCache,
    position: &[f64],
    t: usize,
) -> Result<()>
where
    G: BatchGradFunc,
    P: PriorGradFunc,
{
    if t <= cache.len() {
        return Ok(());
    }
    log::trace!("Adding examples {}..{} to the gradient cache", cache.len(), t);
    let indices: Vec<usize> = (cache.len()..t).collect();
    let grads = posterior.gradients_at(position, &indices)?;
    cache.append_rows(&grads);
    Ok(())
}

/// One step of Langevin dynamics with the SAGA gradient estimator.
///
/// Draws `batch_size` of the first `t` examples without replacement (or
/// takes all of them if `t <= batch_size`), recomputes their gradients at
/// `position` and replaces their entries in `cache`. The step direction
/// is the running sum corrected by `t / batch_size` times the change of the
/// sampled gradients; the running sum itself only moves by that change.
///
/// If `t` is larger than the number of cached examples, the missing ones
/// are evaluated at `position` and added first. If the step fails, `cache`
/// is left exactly as it was, including its length and running sum.
#[allow(clippy::too_many_arguments)]
pub fn saga_step<G, P, R>(
    posterior: &mut Posterior<G, P>,
    cache: &mut GradientCache,
    position: &[f64],
    t: usize,
    batch_size: usize,
    step_size: f64,
    rng: &mut R,
) -> Result<Box<[f64]>>
where
    G: BatchGradFunc,
    P: PriorGradFunc,
    R: Rng + ?Sized,
{
    check_step_size(step_size)?;
    check_batch_size(batch_size)?;
    check_len("position", posterior.dim(), position.len())?;
    check_len("gradient cache columns", posterior.dim(), cache.dim())?;
    if t == 0 {
        return Err(SamplerError::InvalidSampleSize(
            "no examples to sample from".into(),
        ));
    }
    if t > posterior.num_examples() {
        return Err(SamplerError::InvalidSampleSize(format!(
            "cannot sample from {} of {} examples",
            t,
            posterior.num_examples()
        )));
    }
    if t < cache.len() {
        return Err(SamplerError::ShapeMismatch {
            what: "gradient cache rows",
            expected: t,
            found: cache.len(),
        });
    }
    let grown_from: Option<(usize, Box<[f64]>)> =
        (t > cache.len()).then(|| (cache.len(), cache.running_sum().into()));
    grow_cache(posterior, cache, position, t)?;

    match saga_gradient(posterior, cache, position, t, batch_size, rng) {
        Ok(grad) => Ok(apply_langevin_update(position, &grad, step_size, rng)),
        Err(err) => {
            if let Some((len, running_sum)) = grown_from {
                cache.truncate(len, running_sum);
            }
            Err(err)
        }
    }
}

/// The SAGA estimate of the gradient of the negative log-posterior at
/// `position`. The cache is only written once every evaluation succeeded.
fn saga_gradient<G, P, R>(
    posterior: &mut Posterior<G, P>,
    cache: &mut GradientCache,
    position: &[f64],
    t: usize,
    batch_size: usize,
    rng: &mut R,
) -> Result<Box<[f64]>>
where
    G: BatchGradFunc,
    P: PriorGradFunc,
    R: Rng + ?Sized,
{
    let (indices, gradient_scale) = if t <= batch_size {
        ((0..t).collect::<Vec<_>>(), None)
    } else {
        let indices = rand::seq::index::sample(rng, t, batch_size).into_vec();
        (indices, Some(t as f64 / batch_size as f64))
    };

    let grads = posterior.gradients_at(position, &indices)?;
    let new_sum = sum_rows(&grads);

    let (mut grad, running_sum) = match gradient_scale {
        None => (new_sum.clone(), new_sum),
        Some(scale) => {
            let old_sum = cache.sum_at(&indices)?;
            let mut diff = new_sum;
            axpy(&old_sum, &mut diff, -1.);

            let mut grad: Box<[f64]> = vec![0f64; diff.len()].into();
            axpy_out(&diff, cache.running_sum(), scale, &mut grad);

            let mut running_sum: Box<[f64]> = vec![0f64; diff.len()].into();
            axpy_out(&diff, cache.running_sum(), 1., &mut running_sum);
            (grad, running_sum)
        }
    };

    posterior.add_prior_grad(position, &mut grad)?;
    cache.replace_rows(&indices, &grads, running_sum)?;
    Ok(grad)
}

/// Run Langevin dynamics with the SAGA gradient estimator.
///
/// Takes up to `settings.num_steps` steps, starting from the state in
/// `init`, and returns the final position together with the gradient cache.
pub fn sagald<G, P>(
    posterior: &mut Posterior<G, P>,
    settings: &SagaSettings,
    init: SagaInit,
) -> Result<SagaOutput>
where
    G: BatchGradFunc,
    P: PriorGradFunc,
{
    let num_examples = posterior.num_examples();
    settings.validate(num_examples)?;

    let mut position = match init.position {
        Some(position) => {
            check_len("initial position", posterior.dim(), position.len())?;
            position
        }
        None => vec![0f64; posterior.dim()].into(),
    };

    let (mut t, mut cache) = match init.cache {
        Some(cache) => {
            check_len("gradient cache columns", posterior.dim(), cache.dim())?;
            let t = settings.window.resume(cache.len(), num_examples)?;
            (t, cache)
        }
        None => {
            let t = settings.window.initial(num_examples);
            (t, init_cache(posterior, &position, t)?)
        }
    };

    log::debug!(
        "Running {} SAGA Langevin steps on {} of {} examples with batch size {}",
        settings.num_steps,
        t,
        num_examples,
        settings.batch_size
    );

    let mut rng = settings.new_rng(0);
    let start = Instant::now();
    let mut num_steps = 0;
    while num_steps < settings.num_steps {
        if let Some(max_time) = settings.max_time {
            if start.elapsed() >= max_time {
                log::info!(
                    "Stopping after {} of {} steps: time limit of {:?} reached",
                    num_steps,
                    settings.num_steps,
                    max_time
                );
                break;
            }
        }
        position = saga_step(
            posterior,
            &mut cache,
            &position,
            t,
            settings.batch_size,
            settings.step_size,
            &mut rng,
        )?;
        num_steps += 1;
        t = settings.window.advance(t, num_examples);
    }

    Ok(SagaOutput {
        position,
        cache,
        num_steps,
    })
}
