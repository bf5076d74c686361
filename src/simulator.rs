//! Simulator contract consumed by the executor.

use ndarray::{Array1, Array2, ArrayView2};

use crate::SimulatorError;

/// Initial states of a batch of sequences.
#[derive(Clone, Debug)]
pub struct Reset {
    /// States, of shape `(n, state_dim)`.
    pub states: Array2<f32>,
    /// Legal-action masks, of shape `(n, action_dim)`.
    pub masks: Array2<bool>,
}

/// Outcome of stepping a batch of states.
#[derive(Clone, Debug)]
pub struct Transition {
    /// Next states, of shape `(n, state_dim)`.
    pub next_states: Array2<f32>,
    /// Legal-action masks of the next states, of shape `(n, action_dim)`.
    pub next_masks: Array2<bool>,
    /// Reward obtained by each transition, of shape `(n,)`.
    pub rewards: Array1<f32>,
    /// Whether each transition ended its sequence, of shape `(n,)`.
    pub terminals: Array1<bool>,
}

/// Trait defining the environment the search plans against.
///
/// Implementations are batched: a single call handles every row of `states`.
/// The executor only ever steps states it has stored, so `step` is never
/// asked to continue past a transition it reported as terminal.
pub trait Simulator {
    /// Produces `n` initial states and their legal-action masks.
    fn reset(&mut self, n: usize) -> Result<Reset, SimulatorError>;

    /// Applies `actions[i]` to `states[i]` for every row.
    ///
    /// # Parameters
    /// - `states`: Batch of states, of shape `(n, state_dim)`.
    /// - `actions`: One action index per row.
    fn step(&mut self, states: ArrayView2<f32>, actions: &[usize]) -> Result<Transition, SimulatorError>;
}

impl<S: Simulator + ?Sized> Simulator for Box<S> {
    fn reset(&mut self, n: usize) -> Result<Reset, SimulatorError> {
        (**self).reset(n)
    }

    fn step(&mut self, states: ArrayView2<f32>, actions: &[usize]) -> Result<Transition, SimulatorError> {
        (**self).step(states, actions)
    }
}
