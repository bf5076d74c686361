//! Configuration of a batched MCTS executor.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::MctsError;

/// Where a block of arrays lives.
///
/// The arena is always kept on the search device. Inference functions report
/// the device they run on so the executor can hand them a contiguous batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    Cpu,
    /// Accelerator identified by its ordinal.
    Cuda(usize),
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Cuda(ordinal) => write!(f, "cuda:{ordinal}"),
        }
    }
}

/// Configuration parameters for an `MctsBatch`.
///
/// All fields are public; start from `MctsBatchConfig::DEFAULT` (or
/// `Default::default()`) and override with the `with_*` builders.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MctsBatchConfig {
    /// Base exploration weight of the PUCT score.
    pub c1: f32,
    /// Visit-count scale of the logarithmic exploration growth term.
    pub c2: f32,
    /// Discount applied to backed up values at every level.
    pub discount: f32,
    /// Number of select/expand/backup iterations performed by one `run()`.
    pub iterations: usize,
    /// Concentration of the Dirichlet noise mixed into root priors.
    pub dirichlet_alpha: f32,
    /// Fraction of the root prior replaced by noise. `0.0` disables noise.
    pub dirichlet_epsilon: f32,
    /// Device holding the arena.
    pub search_device: Device,
    /// Device the inference function and the simulator run on.
    pub inference_device: Device,
    /// Optional seed for the noise generator.
    ///
    /// `Some(value)` makes root noise reproducible. With `None` the generator
    /// is seeded from the current time.
    pub seed: Option<u64>,
}

impl MctsBatchConfig {
    /// The default executor configuration.
    pub const DEFAULT: MctsBatchConfig = MctsBatchConfig {
        c1: 1.25,
        c2: 19652.0,
        discount: 1.0,
        iterations: 100,
        dirichlet_alpha: 0.1,
        dirichlet_epsilon: 0.5,
        search_device: Device::Cpu,
        inference_device: Device::Cpu,
        seed: None,
    };

    /// Configuration without root noise, for evaluation or deterministic tests.
    pub fn for_evaluation() -> Self {
        Self {
            dirichlet_epsilon: 0.0,
            ..Self::DEFAULT
        }
    }

    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn with_puct(mut self, c1: f32, c2: f32) -> Self {
        self.c1 = c1;
        self.c2 = c2;
        self
    }

    pub fn with_discount(mut self, discount: f32) -> Self {
        self.discount = discount;
        self
    }

    pub fn with_dirichlet(mut self, alpha: f32, epsilon: f32) -> Self {
        self.dirichlet_alpha = alpha;
        self.dirichlet_epsilon = epsilon;
        self
    }

    pub fn with_devices(mut self, search_device: Device, inference_device: Device) -> Self {
        self.search_device = search_device;
        self.inference_device = inference_device;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Checks that every parameter is inside its valid range.
    ///
    /// # Returns
    /// `Err(MctsError::InvalidConfig(_))` naming the first offending field.
    pub fn validate(&self) -> Result<(), MctsError> {
        if !(self.c2 > 0.0) {
            return Err(MctsError::InvalidConfig(format!("c2 must be positive, got {}", self.c2)));
        }
        if !self.c1.is_finite() {
            return Err(MctsError::InvalidConfig(format!("c1 must be finite, got {}", self.c1)));
        }
        if !(0.0..=1.0).contains(&self.discount) {
            return Err(MctsError::InvalidConfig(format!("discount must be in [0, 1], got {}", self.discount)));
        }
        if self.iterations == 0 {
            return Err(MctsError::InvalidConfig("iterations must be at least 1".to_string()));
        }
        if !(self.dirichlet_alpha > 0.0) {
            return Err(MctsError::InvalidConfig(format!(
                "dirichlet_alpha must be positive, got {}",
                self.dirichlet_alpha
            )));
        }
        if !(0.0..=1.0).contains(&self.dirichlet_epsilon) {
            return Err(MctsError::InvalidConfig(format!(
                "dirichlet_epsilon must be in [0, 1], got {}",
                self.dirichlet_epsilon
            )));
        }
        Ok(())
    }
}

impl Default for MctsBatchConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MctsBatchConfig::default();
        assert_eq!(config.iterations, 100);
        assert!((config.c1 - 1.25).abs() < 1e-6);
        assert!((config.c2 - 19652.0).abs() < 1e-3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_pattern() {
        let config = MctsBatchConfig::default()
            .with_iterations(10)
            .with_dirichlet(0.3, 0.25)
            .with_seed(7);

        assert_eq!(config.iterations, 10);
        assert_eq!(config.seed, Some(7));
        assert!((config.dirichlet_alpha - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            MctsBatchConfig::default().with_iterations(0).validate(),
            Err(MctsError::InvalidConfig(_))
        ));
        assert!(MctsBatchConfig::default().with_dirichlet(0.0, 0.5).validate().is_err());
        assert!(MctsBatchConfig::default().with_dirichlet(0.3, 1.5).validate().is_err());
        assert!(MctsBatchConfig::default().with_puct(1.25, 0.0).validate().is_err());
        assert!(MctsBatchConfig::default().with_discount(f32::NAN).validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: MctsBatchConfig =
            serde_json::from_str(r#"{ "iterations": 64, "inference_device": { "cuda": 1 } }"#).unwrap();

        assert_eq!(config.iterations, 64);
        assert_eq!(config.inference_device, Device::Cuda(1));
        assert_eq!(config.search_device, Device::Cpu);
        assert_eq!(config.c1, MctsBatchConfig::DEFAULT.c1);
    }

    #[test]
    fn test_device_display() {
        assert_eq!(Device::Cpu.to_string(), "cpu");
        assert_eq!(Device::Cuda(2).to_string(), "cuda:2");
    }
}
