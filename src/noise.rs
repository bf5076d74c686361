//! Root exploration noise.
//!
//! Root priors are mixed with a Dirichlet draw, `P = (1 - eps) * prior + eps * noise`,
//! once when the executor is built and again every time a sequence is re-rooted.

use std::time::{SystemTime, UNIX_EPOCH};

use rand::{rngs::StdRng, SeedableRng};
use rand_distr::{Distribution, Gamma};

use crate::MctsError;

/// Pluggable source of root noise.
pub trait NoiseSampler {
    /// Writes one noise vector into `out`.
    ///
    /// Entries where `mask` is `false` must be `0.0`; the legal entries must
    /// sum to one. With no legal entry `out` is all-zero.
    fn sample(&mut self, mask: &[bool], out: &mut [f32]);
}

/// Symmetric Dirichlet sampler built from `Gamma(alpha, 1)` variates.
///
/// `rand_distr::Gamma` uses the Marsaglia-Tsang rejection method, boosting
/// `alpha < 1` to `alpha + 1` and correcting with a uniform power.
pub struct GammaDirichlet {
    gamma: Gamma<f64>,
    rng: StdRng,
}

impl GammaDirichlet {
    /// Creates a sampler with concentration `alpha`.
    ///
    /// # Parameters
    /// - `alpha`: Concentration, replicated across the action dimension.
    /// - `seed`: Optional seed; the current time is used when `None`.
    pub fn new(alpha: f32, seed: Option<u64>) -> Result<Self, MctsError> {
        let gamma = Gamma::new(alpha as f64, 1.0)
            .map_err(|e| MctsError::InvalidConfig(format!("dirichlet_alpha {alpha}: {e}")))?;

        let seed = seed.unwrap_or_else(|| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| (d.as_nanos() % u64::MAX as u128) as u64)
                .unwrap_or_default()
        });

        Ok(GammaDirichlet { gamma, rng: StdRng::seed_from_u64(seed) })
    }
}

impl NoiseSampler for GammaDirichlet {
    fn sample(&mut self, mask: &[bool], out: &mut [f32]) {
        let mut total = 0.0f64;
        let mut draws = vec![0.0f64; mask.len()];
        for (x, &legal) in draws.iter_mut().zip(mask) {
            if legal {
                *x = self.gamma.sample(&mut self.rng);
                total += *x;
            }
        }

        if total > 0.0 {
            for (o, &x) in out.iter_mut().zip(&draws) {
                *o = (x / total) as f32;
            }
            return;
        }

        // Every draw underflowed (tiny alpha); spread evenly over legal actions.
        let legal = mask.iter().filter(|&&legal| legal).count().max(1);
        for (o, &is_legal) in out.iter_mut().zip(mask) {
            *o = if is_legal { 1.0 / legal as f32 } else { 0.0 };
        }
    }
}

/// Mixes noise into root priors with weight `epsilon`.
pub struct DirichletNoise<S: NoiseSampler> {
    sampler: S,
    epsilon: f32,
    buffer: Vec<f32>,
}

impl<S: NoiseSampler> DirichletNoise<S> {
    pub fn new(sampler: S, epsilon: f32) -> Self {
        DirichletNoise { sampler, epsilon, buffer: Vec::new() }
    }

    #[inline]
    pub fn epsilon(&self) -> f32 {
        self.epsilon
    }

    /// Replaces `priors` with `(1 - eps) * priors + eps * noise`, drawing fresh noise.
    ///
    /// With `epsilon == 0` no noise is drawn and `priors` is left untouched.
    pub fn apply(&mut self, priors: &mut [f32], mask: &[bool]) {
        if self.epsilon == 0.0 {
            return;
        }

        self.buffer.clear();
        self.buffer.resize(priors.len(), 0.0);
        self.sampler.sample(mask, &mut self.buffer);

        let eps = self.epsilon;
        for (p, &noise) in priors.iter_mut().zip(&self.buffer) {
            *p = (1.0 - eps) * *p + eps * noise;
        }
    }
}
