//! A batched Monte Carlo Tree Search executor for AlphaZero-style self-play.
//!
//! Many independent searches advance in lockstep: every iteration selects one
//! leaf per sequence, expands all of them with a single simulator call and a
//! single inference call, and backs the values up. Trees live in a columnar
//! arena indexed by integers, so whole batches are gathered and scattered with
//! array operations.
//!
//! # Modules
//! - `arena`: Columnar node storage with integer links.
//! - `config`: Search parameters and devices.
//! - `simulator`: The batched environment contract.
//! - `inference`: The batched policy/value contract and prior masking.
//! - `noise`: Dirichlet noise mixed into root priors.
//! - `mcts_batch`: The executor itself.
//! - `episodes`: Training tensors replayed from finished searches.
//! - `combinatorial_lock`: A deterministic environment for sanity checks.
//! - `utils`: Action selection helpers.
//! - `test_utils`: Synthetic collaborators for testing.
//!
//! # Examples
//! ```rust
//! use batch_mcts::{
//!     utils, CombinatorialLock, MctsBatch, MctsBatchConfig, MctsError, Simulator,
//!     test_utils::UniformInference,
//! };
//!
//! fn main() -> Result<(), MctsError> {
//!     let mut lock = CombinatorialLock::new(3, vec![2, 0, 1])?;
//!     let reset = lock.reset(4)?;
//!
//!     let config = MctsBatchConfig::for_evaluation().with_iterations(200);
//!     let mut mcts = MctsBatch::new(reset.states, reset.masks, UniformInference::new(3), lock, config)?;
//!
//!     while !mcts.all_terminals() {
//!         mcts.run()?;
//!
//!         // Commit the most visited action of every active sequence
//!         let actions: Vec<usize> = mcts
//!             .current_visit_counts()
//!             .outer_iter()
//!             .map(|counts| {
//!                 let counts: Vec<f32> = counts.iter().map(|&n| n as f32).collect();
//!                 utils::argmax(&counts)
//!             })
//!             .collect();
//!         mcts.step(&actions)?;
//!     }
//!
//!     let episodes = mcts.get_episodes()?;
//!     assert_eq!(episodes.lengths.to_vec(), vec![3; 4]);
//!     Ok(())
//! }
//! ```

pub mod arena;
mod combinatorial_lock;
mod config;
mod episodes;
mod error;
mod inference;
mod mcts_batch;
mod noise;
mod simulator;
pub mod utils;

#[doc(hidden)]
pub mod test_utils;

pub use arena::{NodeArena, UNSET};
pub use combinatorial_lock::*;
pub use config::*;
pub use episodes::*;
pub use error::*;
pub use inference::*;
pub use mcts_batch::*;
pub use noise::*;
pub use simulator::*;
