//! Test utilities for the batched MCTS executor

use ndarray::{Array1, Array2, ArrayView2};

use crate::{Inference, InferenceError, InferenceFn, NoiseSampler, Reset, Simulator, SimulatorError, Transition};

/// Inference function returning uniform priors and a zero value for every state.
pub struct UniformInference {
    action_dim: usize,
}

impl UniformInference {
    #[allow(dead_code)]
    pub fn new(action_dim: usize) -> Self {
        UniformInference { action_dim }
    }
}

impl InferenceFn for UniformInference {
    fn infer(&mut self, states: ArrayView2<f32>) -> Result<Inference, InferenceError> {
        let n = states.nrows();
        Ok(Inference {
            probabilities: Array2::from_elem((n, self.action_dim), 1.0 / self.action_dim as f32),
            values: Array1::zeros(n),
        })
    }
}

/// Inference function returning the same priors and value for every state,
/// and counting the rows it evaluated.
pub struct CountingInference {
    priors: Vec<f32>,
    value: f32,
    /// Number of state rows seen so far.
    pub rows: usize,
}

impl CountingInference {
    #[allow(dead_code)]
    pub fn new(priors: Vec<f32>, value: f32) -> Self {
        CountingInference { priors, value, rows: 0 }
    }
}

impl InferenceFn for CountingInference {
    fn infer(&mut self, states: ArrayView2<f32>) -> Result<Inference, InferenceError> {
        let n = states.nrows();
        self.rows += n;

        let mut probabilities = Array2::zeros((n, self.priors.len()));
        for mut row in probabilities.outer_iter_mut() {
            row.assign(&Array1::from(self.priors.clone()));
        }
        Ok(Inference { probabilities, values: Array1::from_elem(n, self.value) })
    }
}

/// Simulator whose reward only depends on the action taken.
///
/// The state holds the depth reached so far; every transition pays
/// `payoffs[action]` and the one reaching `depth` is terminal.
pub struct ConstantPayoff {
    payoffs: Vec<f32>,
    depth: usize,
    /// Number of `step` calls so far.
    pub calls: usize,
}

impl ConstantPayoff {
    #[allow(dead_code)]
    pub fn new(payoffs: Vec<f32>, depth: usize) -> Self {
        ConstantPayoff { payoffs, depth, calls: 0 }
    }

    #[allow(dead_code)]
    pub fn action_dim(&self) -> usize {
        self.payoffs.len()
    }
}

impl Simulator for ConstantPayoff {
    fn reset(&mut self, n: usize) -> Result<Reset, SimulatorError> {
        Ok(Reset {
            states: Array2::zeros((n, 1)),
            masks: Array2::from_elem((n, self.payoffs.len()), true),
        })
    }

    fn step(&mut self, states: ArrayView2<f32>, actions: &[usize]) -> Result<Transition, SimulatorError> {
        self.calls += 1;
        let n = states.nrows();
        let action_dim = self.payoffs.len();

        let mut next_states = states.to_owned();
        next_states.mapv_inplace(|depth| depth + 1.0);

        let mut rewards = Array1::zeros(n);
        for (reward, &action) in rewards.iter_mut().zip(actions) {
            *reward = *self
                .payoffs
                .get(action)
                .ok_or(SimulatorError::InvalidAction { action, action_dim })?;
        }

        let depth = self.depth as f32;
        let terminals = next_states.column(0).mapv(|d| d >= depth);

        Ok(Transition {
            next_states,
            next_masks: Array2::from_elem((n, action_dim), true),
            rewards,
            terminals,
        })
    }
}

/// Simulator where every sequence lasts a fixed number of steps.
///
/// The state holds the steps left. Any action moves one step along the chain
/// and pays `action as f32`; the action `0` is illegal whenever `forbid_zero`
/// is set. Sequence `i` of a reset gets `lengths[i % lengths.len()]` steps.
pub struct ChainSimulator {
    lengths: Vec<usize>,
    action_dim: usize,
    forbid_zero: bool,
}

impl ChainSimulator {
    #[allow(dead_code)]
    pub fn new(lengths: Vec<usize>, action_dim: usize) -> Self {
        ChainSimulator { lengths, action_dim, forbid_zero: false }
    }

    #[allow(dead_code)]
    pub fn forbidding_zero(mut self) -> Self {
        self.forbid_zero = true;
        self
    }

    fn masks(&self, n: usize) -> Array2<bool> {
        let mut masks = Array2::from_elem((n, self.action_dim), true);
        if self.forbid_zero {
            masks.column_mut(0).fill(false);
        }
        masks
    }
}

impl Simulator for ChainSimulator {
    fn reset(&mut self, n: usize) -> Result<Reset, SimulatorError> {
        let states = Array2::from_shape_fn((n, 1), |(i, _)| self.lengths[i % self.lengths.len()] as f32);
        Ok(Reset { states, masks: self.masks(n) })
    }

    fn step(&mut self, states: ArrayView2<f32>, actions: &[usize]) -> Result<Transition, SimulatorError> {
        let n = states.nrows();
        if let Some(&action) = actions.iter().find(|&&action| action >= self.action_dim) {
            return Err(SimulatorError::InvalidAction { action, action_dim: self.action_dim });
        }
        if states.iter().any(|&left| left <= 0.0) {
            return Err(SimulatorError::TerminalState);
        }

        let next_states = states.mapv(|left| left - 1.0);
        let terminals = next_states.column(0).mapv(|left| left <= 0.0);
        let rewards = actions.iter().map(|&action| action as f32).collect::<Array1<f32>>();

        Ok(Transition { next_states, next_masks: self.masks(n), rewards, terminals })
    }
}

/// Noise sampler always returning the same vector.
pub struct FixedNoise(pub Vec<f32>);

impl NoiseSampler for FixedNoise {
    fn sample(&mut self, _mask: &[bool], out: &mut [f32]) {
        out.copy_from_slice(&self.0);
    }
}

/// Utility function to compare float slices with tolerance
///
/// # Parameters
/// - `a`: First slice
/// - `b`: Second slice
///
/// # Returns
/// `true` if both slices have the same length and all elements are approximately equal
#[allow(dead_code)]
pub fn compare_slices(a: &[f32], b: &[f32]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| (x - y).abs() < 1e-5)
}
