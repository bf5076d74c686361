//! Errors returned by the batched MCTS executor and its collaborators.

use thiserror::Error;

/// Errors raised by an inference function.
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("inference failed: {0}")]
    Failed(String),

    #[error("inference returned {what} of shape {got:?}, expected {expected:?}")]
    Shape {
        what: &'static str,
        expected: Vec<usize>,
        got: Vec<usize>,
    },
}

/// Errors raised by a simulator.
#[derive(Debug, Error)]
pub enum SimulatorError {
    #[error("action {action} is out of range for action dim {action_dim}")]
    InvalidAction { action: usize, action_dim: usize },

    #[error("cannot step a terminal state")]
    TerminalState,

    #[error("simulator failed: {0}")]
    Failed(String),
}

/// Represents possible errors that can occur during batched MCTS operations.
///
/// Every variant except the two collaborator wrappers is a usage error: the
/// caller asked for something the executor cannot do in its current state.
#[derive(Debug, Error)]
pub enum MctsError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The executor was constructed with zero sequences.
    #[error("cannot search an empty batch")]
    EmptyBatch,

    #[error("{what} has shape {got:?}, expected {expected:?}")]
    ShapeMismatch {
        what: &'static str,
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    /// `step` needs exactly one action per active sequence.
    #[error("expected one action per active sequence ({expected}), got {got}")]
    ActionCountMismatch { expected: usize, got: usize },

    #[error("action {action} is out of range for action dim {action_dim}")]
    ActionOutOfRange { action: usize, action_dim: usize },

    #[error("action {action} is not legal for sequence {sequence}")]
    IllegalAction { sequence: usize, action: usize },

    /// `run` or `step` was called after every sequence terminated.
    #[error("all sequences are terminal")]
    AllTerminal,

    #[error("cannot extract episodes while {active} sequences are still active")]
    EpisodesNotReady { active: usize },

    #[error(transparent)]
    Inference(#[from] InferenceError),

    #[error(transparent)]
    Simulator(#[from] SimulatorError),
}
