use anyhow::{Context, Result};
use rand_chacha::ChaCha8Rng;

use crate::{
    cache::GradientCache,
    error::check_len,
    gradient::BatchGradFunc,
    langevin::{langevin_step, LangevinSettings},
    posterior::Posterior,
    prior::PriorGradFunc,
    saga::{init_cache, saga_step, SagaOutput, SagaSettings},
};

/// Draw a sequence of samples from the posterior, one Langevin step per draw.
pub trait Chain {
    /// Move the sampler to a new position. This also resets any state that
    /// depends on the position.
    ///
    /// This fails if the gradient functions return an error.
    fn set_position(&mut self, position: &[f64]) -> Result<()>;

    /// Take one step and return the new position and some diagnostic
    /// information.
    fn draw(&mut self) -> Result<(Box<[f64]>, Progress)>;

    /// The dimensionality of the posterior.
    fn dim(&self) -> usize;
}

#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct Progress {
    pub draw: u64,
    pub chain: u64,
    pub step_size: f64,
    /// The number of examples that could be sampled in this draw.
    pub window: usize,
    /// The number of per-example gradients evaluated in this draw.
    pub num_gradients: usize,
}

/// Full-gradient Langevin dynamics as a [`Chain`].
pub struct LangevinChain<G: BatchGradFunc, P: PriorGradFunc> {
    posterior: Posterior<G, P>,
    settings: LangevinSettings,
    rng: ChaCha8Rng,
    position: Box<[f64]>,
    chain: u64,
    draw_count: u64,
}

impl<G: BatchGradFunc, P: PriorGradFunc> LangevinChain<G, P> {
    /// Create chain number `chain`, starting at the origin.
    pub fn new(posterior: Posterior<G, P>, settings: LangevinSettings, chain: u64) -> Result<Self> {
        settings.validate()?;
        let position = vec![0f64; posterior.dim()].into();
        Ok(Self {
            rng: settings.new_rng(chain),
            posterior,
            settings,
            position,
            chain,
            draw_count: 0,
        })
    }

    pub fn position(&self) -> &[f64] {
        &self.position
    }

    pub fn into_posterior(self) -> Posterior<G, P> {
        self.posterior
    }
}

impl<G: BatchGradFunc, P: PriorGradFunc> Chain for LangevinChain<G, P> {
    fn set_position(&mut self, position: &[f64]) -> Result<()> {
        check_len("initial position", self.dim(), position.len())?;
        self.position = position.into();
        Ok(())
    }

    fn draw(&mut self) -> Result<(Box<[f64]>, Progress)> {
        self.position = langevin_step(
            &mut self.posterior,
            &self.position,
            self.settings.step_size,
            &mut self.rng,
        )
        .with_context(|| {
            format!(
                "Langevin step {} of chain {} failed",
                self.draw_count, self.chain
            )
        })?;

        let progress = Progress {
            draw: self.draw_count,
            chain: self.chain,
            step_size: self.settings.step_size,
            window: self.posterior.num_examples(),
            num_gradients: self.posterior.num_examples(),
        };
        self.draw_count += 1;
        Ok((self.position.clone(), progress))
    }

    fn dim(&self) -> usize {
        self.posterior.dim()
    }
}

/// Langevin dynamics with the SAGA gradient estimator as a [`Chain`].
///
/// The chain owns the gradient cache. Every draw advances the window
/// according to the settings, so a streaming window keeps growing for as
/// long as the chain is drawn from. `settings.num_steps` and
/// `settings.max_time` are ignored; the caller decides when to stop.
pub struct SagaChain<G: BatchGradFunc, P: PriorGradFunc> {
    posterior: Posterior<G, P>,
    settings: SagaSettings,
    rng: ChaCha8Rng,
    position: Box<[f64]>,
    cache: GradientCache,
    window: usize,
    chain: u64,
    draw_count: u64,
}

impl<G: BatchGradFunc, P: PriorGradFunc> SagaChain<G, P> {
    /// Create chain number `chain`, starting at the origin.
    ///
    /// This evaluates the gradients of the initially reachable examples.
    pub fn new(mut posterior: Posterior<G, P>, settings: SagaSettings, chain: u64) -> Result<Self> {
        let num_examples = posterior.num_examples();
        settings.validate(num_examples)?;
        let window = settings.window.initial(num_examples);
        let position: Box<[f64]> = vec![0f64; posterior.dim()].into();
        let cache = init_cache(&mut posterior, &position, window)
            .context("Could not initialize gradient cache")?;

        log::debug!(
            "Created SAGA chain {} with {} of {} examples reachable",
            chain,
            window,
            num_examples
        );

        Ok(Self {
            rng: settings.new_rng(chain),
            posterior,
            settings,
            position,
            cache,
            window,
            chain,
            draw_count: 0,
        })
    }

    pub fn position(&self) -> &[f64] {
        &self.position
    }

    pub fn cache(&self) -> &GradientCache {
        &self.cache
    }

    /// The final state of the chain, in the same form [`crate::sagald`]
    /// returns it.
    pub fn into_output(self) -> SagaOutput {
        SagaOutput {
            position: self.position,
            cache: self.cache,
            num_steps: self.draw_count,
        }
    }
}

impl<G: BatchGradFunc, P: PriorGradFunc> Chain for SagaChain<G, P> {
    fn set_position(&mut self, position: &[f64]) -> Result<()> {
        check_len("initial position", self.dim(), position.len())?;
        let cache = init_cache(&mut self.posterior, position, self.window)
            .context("Could not initialize gradient cache")?;
        self.position = position.into();
        self.cache = cache;
        Ok(())
    }

    fn draw(&mut self) -> Result<(Box<[f64]>, Progress)> {
        let window = self.window;
        let cached = self.cache.len();
        self.position = saga_step(
            &mut self.posterior,
            &mut self.cache,
            &self.position,
            window,
            self.settings.batch_size,
            self.settings.step_size,
            &mut self.rng,
        )
        .with_context(|| {
            format!(
                "SAGA step {} of chain {} failed",
                self.draw_count, self.chain
            )
        })?;

        let progress = Progress {
            draw: self.draw_count,
            chain: self.chain,
            step_size: self.settings.step_size,
            window,
            num_gradients: (window - cached) + window.min(self.settings.batch_size),
        };
        self.draw_count += 1;
        self.window = self
            .settings
            .window
            .advance(window, self.posterior.num_examples());
        Ok((self.position.clone(), progress))
    }

    fn dim(&self) -> usize {
        self.posterior.dim()
    }
}

/// Move `chain` to `start` and return an iterator over `draws` draws.
pub fn sample_sequentially<C: Chain>(
    mut chain: C,
    start: &[f64],
    draws: u64,
) -> Result<impl Iterator<Item = Result<(Box<[f64]>, Progress)>>> {
    chain.set_position(start)?;
    Ok((0..draws).map(move |_| chain.draw()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{data::LogisticData, gradient::LogisticGrad, prior::GaussianPrior, saga::Window};
    use pretty_assertions::assert_eq;

    fn posterior() -> Posterior<LogisticGrad, GaussianPrior> {
        let data = LogisticData::from_rows(
            &[&[1., 0.], &[0., 1.], &[1., 1.], &[-1., 0.5], &[0.5, -1.], &[2., 0.]],
            vec![1., 0., 1., 0., 1., 1.],
        )
        .unwrap();
        Posterior::new(data, LogisticGrad::new(2), GaussianPrior::standard(2)).unwrap()
    }

    #[test]
    fn langevin_chain_matches_loop() -> Result<()> {
        let settings = LangevinSettings {
            num_steps: 20,
            seed: 11,
            ..Default::default()
        };
        let expected = crate::langevin::langevin(&mut posterior(), &settings, None)?;

        let chain = LangevinChain::new(posterior(), settings, 0)?;
        let draws = sample_sequentially(chain, &[0., 0.], 20)?.collect::<Result<Vec<_>>>()?;
        let (last, progress) = draws.last().unwrap();
        assert_eq!(last, &expected);
        assert_eq!(progress.draw, 19);
        assert_eq!(progress.num_gradients, 6);
        Ok(())
    }

    #[test]
    fn saga_chain_matches_loop() -> Result<()> {
        let settings = SagaSettings {
            num_steps: 25,
            batch_size: 2,
            seed: 3,
            ..Default::default()
        };
        let expected = crate::saga::sagald(&mut posterior(), &settings, Default::default())?;

        let mut chain = SagaChain::new(posterior(), settings, 0)?;
        for _ in 0..25 {
            chain.draw()?;
        }
        let output = chain.into_output();
        assert_eq!(output.position, expected.position);
        assert_eq!(output.cache.running_sum(), expected.cache.running_sum());
        assert_eq!(output.num_steps, 25);
        Ok(())
    }

    #[test]
    fn saga_chain_progress() -> Result<()> {
        let settings = SagaSettings {
            batch_size: 2,
            window: Window::Streaming {
                initial: 2,
                per_step: 1,
            },
            ..Default::default()
        };
        let mut chain = SagaChain::new(posterior(), settings, 1)?;
        let (_, first) = chain.draw()?;
        assert_eq!(first.window, 2);
        assert_eq!(first.num_gradients, 2);
        let (_, second) = chain.draw()?;
        assert_eq!(second.window, 3);
        assert_eq!(second.num_gradients, 3);
        assert_eq!(chain.cache().len(), 3);

        chain.set_position(&[1., -1.])?;
        assert_eq!(chain.position(), &[1., -1.]);
        assert_eq!(chain.cache().len(), 4);
        assert!(chain.set_position(&[1.]).is_err());
        Ok(())
    }
}
