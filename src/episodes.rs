//! Fixed-layout training tensors replayed from finished search trees.

use ndarray::{s, Array1, Array2, Array3};
use serde::{Deserialize, Serialize};

use crate::arena::{NodeArena, UNSET};

/// A batch of finished self-play episodes.
///
/// Slots after an episode's length are padding and hold zeros.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Episodes {
    /// States, of shape `(B, S, state_dim)` where `S` is the longest episode.
    pub states: Array3<f32>,
    /// Legal-action masks, of shape `(B, S, action_dim)`.
    pub masks: Array3<bool>,
    /// Committed actions, of shape `(B, S)`.
    pub actions: Array2<usize>,
    /// Rewards of the committed transitions, of shape `(B, S)`.
    pub rewards: Array2<f32>,
    /// Episode lengths, of shape `(B,)`.
    pub lengths: Array1<usize>,
}

impl Episodes {
    /// Replays every original root along its committed actions.
    ///
    /// Node `i` of the arena is the original root of sequence `i`.
    ///
    /// # Panics
    /// If a path runs out of committed actions before reaching a terminal
    /// transition, or is longer than `max_len`.
    pub(crate) fn from_arena(arena: &NodeArena, batch_size: usize, max_len: usize) -> Self {
        let mut states = Array3::zeros((batch_size, max_len, arena.state_dim()));
        let mut masks = Array3::from_elem((batch_size, max_len, arena.action_dim()), false);
        let mut actions = Array2::zeros((batch_size, max_len));
        let mut rewards = Array2::zeros((batch_size, max_len));
        let mut lengths = Array1::zeros(batch_size);

        for sequence in 0..batch_size {
            let mut node = sequence;
            let mut t = 0;

            loop {
                let action = arena.step_action(node);
                assert_ne!(action, UNSET, "sequence {sequence} has no committed action at step {t}");
                assert!(t < max_len, "sequence {sequence} is longer than {max_len} steps");

                let edge = arena.edge(node, action);
                states.slice_mut(s![sequence, t, ..]).assign(&arena.state(node));
                masks.slice_mut(s![sequence, t, ..]).assign(&arena.mask(node));
                actions[[sequence, t]] = action;
                rewards[[sequence, t]] = arena.reward(edge);
                t += 1;

                if arena.terminal(edge) {
                    break;
                }
                node = arena.child(edge);
            }

            lengths[sequence] = t;
        }

        Episodes { states, masks, actions, rewards, lengths }
    }

    /// Number of episodes in the batch.
    #[inline]
    pub fn batch_size(&self) -> usize {
        self.lengths.len()
    }

    /// Future discounted return `G_t = r_t + discount * G_{t+1}` of every step.
    ///
    /// Padding slots are zero.
    pub fn discounted_returns(&self, discount: f32) -> Array2<f32> {
        let mut returns = Array2::zeros(self.rewards.raw_dim());

        for (sequence, &length) in self.lengths.iter().enumerate() {
            let mut g = 0.0;
            for t in (0..length).rev() {
                g = self.rewards[[sequence, t]] + discount * g;
                returns[[sequence, t]] = g;
            }
        }
        returns
    }
}
