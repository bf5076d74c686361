//! A deterministic lock-opening environment.
//!
//! The agent must enter a secret combination one digit per step. Every digit
//! is always legal, so the only signal is the reward at the end of the
//! combination, which makes it a convenient sanity check for the search.

use ndarray::{Array1, Array2, ArrayView2};

use crate::{Reset, Simulator, SimulatorError, Transition};

/// Slot value of a digit that has not been entered yet.
const UNSET_SLOT: f32 = -1.0;

/// Combination lock with `dim` possible digits per slot.
///
/// A state is a row of `correct_sequence.len()` slots, filled left to right
/// with the entered digits and `-1` elsewhere. Stepping writes the action into
/// the first empty slot; the transition that fills the last slot is terminal.
#[derive(Clone, Debug)]
pub struct CombinatorialLock {
    dim: usize,
    correct_sequence: Vec<usize>,
    intermediate_rewards: bool,
}

impl CombinatorialLock {
    /// Creates a lock opened by `correct_sequence`.
    ///
    /// The full sequence pays a reward of `1.0`; every other terminal
    /// transition pays nothing.
    ///
    /// # Returns
    /// `Err(SimulatorError::InvalidAction { .. })` if a digit of the sequence
    /// is not below `dim`, or `Err(SimulatorError::Failed(_))` for an empty
    /// sequence.
    pub fn new(dim: usize, correct_sequence: Vec<usize>) -> Result<Self, SimulatorError> {
        if correct_sequence.is_empty() {
            return Err(SimulatorError::Failed("combination must have at least one digit".to_string()));
        }
        if let Some(&digit) = correct_sequence.iter().find(|&&digit| digit >= dim) {
            return Err(SimulatorError::InvalidAction { action: digit, action_dim: dim });
        }

        Ok(CombinatorialLock { dim, correct_sequence, intermediate_rewards: false })
    }

    /// Pays `1 / len` every time the correctly entered prefix grows, instead of
    /// a single reward for the full combination.
    pub fn with_intermediate_rewards(mut self, intermediate_rewards: bool) -> Self {
        self.intermediate_rewards = intermediate_rewards;
        self
    }

    #[inline]
    pub fn dim(&self) -> usize {
        self.dim
    }

    #[inline]
    pub fn correct_sequence(&self) -> &[usize] {
        &self.correct_sequence
    }

    /// Number of digits already entered in `row`.
    fn entered(row: &[f32]) -> usize {
        row.iter().take_while(|&&slot| slot >= 0.0).count()
    }

    /// Number of slots holding the correct digit.
    fn matched(&self, row: &[f32]) -> usize {
        row.iter().zip(&self.correct_sequence).filter(|&(&slot, &digit)| slot == digit as f32).count()
    }
}

impl Simulator for CombinatorialLock {
    fn reset(&mut self, n: usize) -> Result<Reset, SimulatorError> {
        Ok(Reset {
            states: Array2::from_elem((n, self.correct_sequence.len()), UNSET_SLOT),
            masks: Array2::from_elem((n, self.dim), true),
        })
    }

    fn step(&mut self, states: ArrayView2<f32>, actions: &[usize]) -> Result<Transition, SimulatorError> {
        let n = states.nrows();
        let length = self.correct_sequence.len();
        if actions.len() != n {
            return Err(SimulatorError::Failed(format!("got {} actions for {n} states", actions.len())));
        }
        if let Some(&action) = actions.iter().find(|&&action| action >= self.dim) {
            return Err(SimulatorError::InvalidAction { action, action_dim: self.dim });
        }

        let mut next_states = states.to_owned();
        let mut rewards = Array1::zeros(n);
        let mut terminals = Array1::from_elem(n, false);

        for (i, (mut row, &action)) in next_states.outer_iter_mut().zip(actions).enumerate() {
            let row = row.as_slice_mut().ok_or_else(|| SimulatorError::Failed("state row is not contiguous".to_string()))?;
            let entered = Self::entered(row);
            if entered >= length {
                return Err(SimulatorError::TerminalState);
            }

            row[entered] = action as f32;
            let matched = self.matched(row);

            rewards[i] = if self.intermediate_rewards {
                if matched > entered { 1.0 / length as f32 } else { 0.0 }
            } else if matched == length {
                1.0
            } else {
                0.0
            };
            terminals[i] = entered + 1 >= length;
        }

        Ok(Transition {
            next_states,
            next_masks: Array2::from_elem((n, self.dim), true),
            rewards,
            terminals,
        })
    }
}
