//! Batched Monte Carlo Tree Search executor.
//!
//! Runs one search tree per sequence, all stored in a shared `NodeArena`,
//! and advances every tree in lockstep: each iteration selects one leaf edge
//! per active sequence, expands all of them with a single simulator call and
//! a single inference call, then backs the new values up to each root.

use ndarray::{Array1, Array2, Axis};
use tracing::{debug, trace};

use crate::{
    arena::{NodeArena, UNSET},
    utils, DirichletNoise, Episodes, GammaDirichlet, InferenceAdapter, InferenceFn, MctsBatchConfig, MctsError,
    NoiseSampler, Simulator, Transition,
};

/// Lifecycle of one sequence of the batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SequenceState {
    /// The sequence has a live root and takes part in `run()` and `step()`.
    Searching,
    /// A committed action ended the sequence.
    Terminal,
}

/// Manages a batch of MCTS searches that advance in parallel.
///
/// # Type Parameters
/// - `I`: The policy/value inference function.
/// - `S`: The simulator searched against.
/// - `N`: The root noise sampler.
pub struct MctsBatch<I: InferenceFn, S: Simulator, N: NoiseSampler = GammaDirichlet> {
    config: MctsBatchConfig,
    arena: NodeArena,
    inference: InferenceAdapter<I>,
    simulator: S,
    noise: DirichletNoise<N>,
    /// Number of sequences the batch was created with.
    batch_size: usize,
    /// Live root of every active sequence.
    root_indices: Vec<usize>,
    /// Original batch position of every active sequence, parallel to `root_indices`.
    sequences: Vec<usize>,
    /// State of every original sequence.
    sequence_states: Vec<SequenceState>,
    /// Number of `step()` calls so far.
    steps: usize,
}

impl<I: InferenceFn, S: Simulator> MctsBatch<I, S, GammaDirichlet> {
    /// Creates a batch searching from the given initial states.
    ///
    /// Root noise is drawn from a `GammaDirichlet` configured by
    /// `config.dirichlet_alpha` and `config.seed`.
    ///
    /// # Parameters
    /// - `states`: Initial states, of shape `(B, state_dim)`.
    /// - `masks`: Initial legal-action masks, of shape `(B, action_dim)`.
    /// - `inference`: The policy/value function.
    /// - `simulator`: The environment to plan against.
    /// - `config`: Search parameters.
    ///
    /// # Returns
    /// - `Err(MctsError::InvalidConfig(_))` if `config` does not validate.
    /// - `Err(MctsError::EmptyBatch)` if there are no initial states.
    /// - `Err(MctsError::ShapeMismatch { .. })` if states and masks disagree.
    /// - Propagated inference errors from evaluating the roots.
    pub fn new(
        states: Array2<f32>,
        masks: Array2<bool>,
        inference: I,
        simulator: S,
        config: MctsBatchConfig,
    ) -> Result<Self, MctsError> {
        config.validate()?;
        let sampler = GammaDirichlet::new(config.dirichlet_alpha, config.seed)?;
        Self::with_noise(states, masks, inference, simulator, sampler, config)
    }
}

impl<I: InferenceFn, S: Simulator, N: NoiseSampler> MctsBatch<I, S, N> {
    /// Creates a batch with a custom root noise sampler.
    ///
    /// Same as `new`, except that `sampler` replaces the default Dirichlet
    /// sampler. `config.dirichlet_epsilon` still sets the mixing weight.
    pub fn with_noise(
        states: Array2<f32>,
        masks: Array2<bool>,
        inference: I,
        simulator: S,
        sampler: N,
        config: MctsBatchConfig,
    ) -> Result<Self, MctsError> {
        config.validate()?;

        let batch_size = states.nrows();
        if batch_size == 0 {
            return Err(MctsError::EmptyBatch);
        }
        if masks.nrows() != batch_size {
            return Err(MctsError::ShapeMismatch {
                what: "masks",
                expected: vec![batch_size, masks.ncols()],
                got: masks.shape().to_vec(),
            });
        }
        let action_dim = masks.ncols();
        if action_dim == 0 {
            return Err(MctsError::InvalidConfig("action dimension must be at least 1".to_string()));
        }

        let mut batch = MctsBatch {
            arena: NodeArena::with_roots(states, masks),
            inference: InferenceAdapter::new(inference, config.search_device, action_dim),
            simulator,
            noise: DirichletNoise::new(sampler, config.dirichlet_epsilon),
            batch_size,
            root_indices: (0..batch_size).collect(),
            sequences: (0..batch_size).collect(),
            sequence_states: vec![SequenceState::Searching; batch_size],
            steps: 0,
            config,
        };

        let evaluation = batch.inference.infer(batch.arena.states(), batch.arena.masks())?;
        for root in 0..batch_size {
            batch.arena.set_evaluation(root, evaluation.probabilities.row(root), evaluation.values[root]);
            batch.apply_root_noise(root);
        }

        debug!(
            batch_size,
            action_dim,
            state_dim = batch.arena.state_dim(),
            iterations = batch.config.iterations,
            "created batched MCTS"
        );
        Ok(batch)
    }

    /// Returns the configuration the batch was built with.
    #[inline]
    pub fn config(&self) -> &MctsBatchConfig {
        &self.config
    }

    /// Read access to the node storage, for inspection.
    #[inline]
    pub fn arena(&self) -> &NodeArena {
        &self.arena
    }

    /// The simulator searched against.
    #[inline]
    pub fn simulator(&self) -> &S {
        &self.simulator
    }

    /// Number of sequences the batch was created with.
    #[inline]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of sequences still searching.
    #[inline]
    pub fn active_count(&self) -> usize {
        self.root_indices.len()
    }

    /// Live root node of every active sequence.
    #[inline]
    pub fn root_indices(&self) -> &[usize] {
        &self.root_indices
    }

    /// Original batch position of every active sequence, in the order used
    /// by `step()` and `current_visit_counts()`.
    #[inline]
    pub fn active_sequences(&self) -> &[usize] {
        &self.sequences
    }

    /// State of every original sequence.
    #[inline]
    pub fn sequence_states(&self) -> &[SequenceState] {
        &self.sequence_states
    }

    /// Number of `step()` calls so far.
    #[inline]
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Number of calls made to the inference function.
    #[inline]
    pub fn inference_calls(&self) -> usize {
        self.inference.calls()
    }

    /// Returns `true` once every sequence has terminated.
    #[inline]
    pub fn all_terminals(&self) -> bool {
        self.root_indices.is_empty()
    }

    /// Visit counts of the live roots.
    ///
    /// # Returns
    /// An array of shape `(active, action_dim)`, one row per active sequence.
    pub fn current_visit_counts(&self) -> Array2<u32> {
        self.gather_root_rows(|arena, root| arena.visits(root).to_vec())
    }

    /// Priors of the live roots, including mixed-in noise.
    pub fn root_priors(&self) -> Array2<f32> {
        self.gather_root_rows(|arena, root| arena.priors(root).to_vec())
    }

    /// Visit-weighted mean action value of every live root.
    ///
    /// A root without visits reports its inference value estimate.
    pub fn root_values(&self) -> Array1<f32> {
        self.root_indices
            .iter()
            .map(|&root| {
                let visits = self.arena.visits(root);
                let total: u32 = visits.iter().sum();
                if total == 0 {
                    return self.arena.value(root);
                }
                let weighted: f32 = visits.iter().zip(self.arena.q(root)).map(|(&n, &q)| n as f32 * q).sum();
                weighted / total as f32
            })
            .collect()
    }

    fn gather_root_rows<T: Clone + Default>(&self, row: impl Fn(&NodeArena, usize) -> Vec<T>) -> Array2<T> {
        let a = self.arena.action_dim();
        let mut out = Array2::from_elem((self.root_indices.len(), a), T::default());
        for (mut target, &root) in out.outer_iter_mut().zip(&self.root_indices) {
            for (t, value) in target.iter_mut().zip(row(&self.arena, root)) {
                *t = value;
            }
        }
        out
    }

    /// Performs `config.iterations` select/expand/backup iterations on every
    /// active sequence.
    ///
    /// The arena is grown once up front so every iteration can allocate one
    /// node per active sequence.
    ///
    /// # Returns
    /// - `Err(MctsError::AllTerminal)` if no sequence is active.
    /// - Propagated simulator and inference errors. Iterations completed
    ///   before the failure keep their statistics.
    pub fn run(&mut self) -> Result<(), MctsError> {
        if self.all_terminals() {
            return Err(MctsError::AllTerminal);
        }

        self.arena.expand_capacity(self.root_indices.len() * self.config.iterations);

        for _ in 0..self.config.iterations {
            let selected = self.select();
            self.expand(&selected)?;
            self.backup(&selected);
        }

        debug!(
            active = self.root_indices.len(),
            iterations = self.config.iterations,
            nodes = self.arena.len(),
            capacity = self.arena.capacity(),
            "search run complete"
        );
        Ok(())
    }

    /// Commits one real action per active sequence and moves each root to
    /// the resulting child.
    ///
    /// Sequences whose committed edge is terminal leave the active set. The
    /// others get fresh Dirichlet noise on their new root. An edge the search
    /// never expanded is expanded first.
    ///
    /// # Parameters
    /// - `actions`: One action per active sequence, in `active_sequences()` order.
    ///
    /// # Returns
    /// - `Err(MctsError::AllTerminal)` if no sequence is active.
    /// - `Err(MctsError::ActionCountMismatch { .. })` if `actions` has the wrong length.
    /// - `Err(MctsError::ActionOutOfRange { .. })` or `Err(MctsError::IllegalAction { .. })`
    ///   if an action cannot be taken from its root.
    /// - Propagated simulator and inference errors.
    pub fn step(&mut self, actions: &[usize]) -> Result<(), MctsError> {
        if self.all_terminals() {
            return Err(MctsError::AllTerminal);
        }
        if actions.len() != self.root_indices.len() {
            return Err(MctsError::ActionCountMismatch { expected: self.root_indices.len(), got: actions.len() });
        }

        let action_dim = self.arena.action_dim();
        for ((&root, &sequence), &action) in self.root_indices.iter().zip(&self.sequences).zip(actions) {
            if action >= action_dim {
                return Err(MctsError::ActionOutOfRange { action, action_dim });
            }
            if !self.arena.mask(root)[action] {
                return Err(MctsError::IllegalAction { sequence, action });
            }
        }

        let unexpanded: Vec<(usize, usize)> = self
            .root_indices
            .iter()
            .zip(actions)
            .map(|(&root, &action)| (root, action))
            .filter(|&(root, action)| self.arena.child(self.arena.edge(root, action)) == UNSET)
            .collect();
        if !unexpanded.is_empty() {
            self.arena.expand_capacity(unexpanded.len());
            self.expand(&unexpanded)?;
        }

        let mut root_indices = Vec::with_capacity(self.root_indices.len());
        let mut sequences = Vec::with_capacity(self.sequences.len());
        for ((&root, &sequence), &action) in self.root_indices.iter().zip(&self.sequences).zip(actions) {
            self.arena.set_step_action(root, action);

            let edge = self.arena.edge(root, action);
            if self.arena.terminal(edge) {
                self.sequence_states[sequence] = SequenceState::Terminal;
                continue;
            }

            root_indices.push(self.arena.child(edge));
            sequences.push(sequence);
        }

        let terminated = self.root_indices.len() - root_indices.len();
        self.root_indices = root_indices;
        self.sequences = sequences;
        for i in 0..self.root_indices.len() {
            self.apply_root_noise(self.root_indices[i]);
        }
        self.steps += 1;

        debug!(
            step = self.steps,
            active = self.root_indices.len(),
            terminated,
            expanded = unexpanded.len(),
            "committed actions"
        );
        Ok(())
    }

    /// Replays every sequence along its committed actions.
    ///
    /// # Returns
    /// - `Ok(Episodes)` with a step axis as long as the number of `step()` calls.
    /// - `Err(MctsError::EpisodesNotReady { .. })` while any sequence is active.
    pub fn get_episodes(&self) -> Result<Episodes, MctsError> {
        if !self.all_terminals() {
            return Err(MctsError::EpisodesNotReady { active: self.root_indices.len() });
        }
        Ok(Episodes::from_arena(&self.arena, self.batch_size, self.steps))
    }

    fn apply_root_noise(&mut self, root: usize) {
        let mask = self.arena.mask(root).to_vec();
        self.noise.apply(self.arena.priors_mut(root), &mask);
    }

    /// Picks the action to follow from `node`.
    ///
    /// A node without visits follows its largest prior. Otherwise the legal
    /// action with the largest PUCT score wins, ties going to the lowest index.
    fn choose_action(&self, node: usize) -> usize {
        let priors = self.arena.priors(node);
        let visits = self.arena.visits(node);

        let total: u32 = visits.iter().sum();
        if total == 0 {
            return utils::argmax(priors);
        }

        let total = total as f32;
        let c1 = self.config.c1;
        let c2 = self.config.c2;
        let exploration = total.sqrt() * (c1 + ((total + c2 + 1.0) / c2).ln());

        let q = self.arena.q(node);
        let mask = self.arena.mask(node);
        let mut best = 0;
        let mut best_score = f32::NEG_INFINITY;
        for a in 0..priors.len() {
            if !mask[a] {
                continue;
            }
            let score = q[a] + priors[a] * exploration / (1.0 + visits[a] as f32);
            if score > best_score {
                best = a;
                best_score = score;
            }
        }
        best
    }

    /// Descends every active tree to the edge to expand.
    ///
    /// The trees are walked level by level: at each depth the frontier holds
    /// the sequences still descending, and sequences whose chosen edge is
    /// unexpanded or terminal drop out with their result.
    ///
    /// # Returns
    /// One `(node, action)` pair per active sequence, in batch order.
    fn select(&self) -> Vec<(usize, usize)> {
        let mut selected = vec![(UNSET, UNSET); self.root_indices.len()];
        let mut frontier: Vec<(usize, usize)> = self.root_indices.iter().copied().enumerate().collect();
        let mut depth = 0;

        while !frontier.is_empty() {
            let mut descending = Vec::with_capacity(frontier.len());
            for (position, node) in frontier {
                let action = self.choose_action(node);
                let edge = self.arena.edge(node, action);
                let child = self.arena.child(edge);

                if child == UNSET || self.arena.terminal(edge) {
                    selected[position] = (node, action);
                } else {
                    descending.push((position, child));
                }
            }
            frontier = descending;
            depth += 1;
        }

        trace!(depth, "selection reached leaves");
        selected
    }

    /// Expands the selected edges that are not already known to be terminal.
    ///
    /// All expandable edges are stepped with one simulator call; the
    /// non-terminal next states are evaluated with one inference call.
    fn expand(&mut self, selected: &[(usize, usize)]) -> Result<(), MctsError> {
        let (nodes, actions): (Vec<usize>, Vec<usize>) = selected
            .iter()
            .copied()
            .filter(|&(node, action)| !self.arena.terminal(self.arena.edge(node, action)))
            .unzip();
        if nodes.is_empty() {
            return Ok(());
        }

        let states = self.arena.states().select(Axis(0), &nodes);
        if self.config.inference_device != self.config.search_device {
            trace!(
                rows = nodes.len(),
                from = %self.config.search_device,
                to = %self.config.inference_device,
                "moving simulator batch"
            );
        }
        let transition = self.simulator.step(states.view(), &actions)?;
        check_transition(&transition, nodes.len(), self.arena.state_dim(), self.arena.action_dim())?;

        let live: Vec<usize> = (0..nodes.len()).filter(|&i| !transition.terminals[i]).collect();
        let evaluation = self.inference.infer(
            transition.next_states.select(Axis(0), &live).view(),
            transition.next_masks.select(Axis(0), &live).view(),
        )?;

        let mut live_row = 0;
        let mut allocated = 0;
        for (i, (&node, &action)) in nodes.iter().zip(&actions).enumerate() {
            let terminal = transition.terminals[i];
            let row = if terminal {
                None
            } else {
                live_row += 1;
                Some(live_row - 1)
            };

            let edge = self.arena.edge(node, action);
            if !self.arena.record_outcome(edge, transition.rewards[i], terminal) {
                continue;
            }

            let child = self.arena.allocate(node, action, transition.next_states.row(i), transition.next_masks.row(i));
            if let Some(row) = row {
                self.arena.set_evaluation(child, evaluation.probabilities.row(row), evaluation.values[row]);
            }
            allocated += 1;
        }

        trace!(stepped = nodes.len(), evaluated = live.len(), allocated, "expanded leaves");
        Ok(())
    }

    /// Backs values up from every selected edge to its sequence's root.
    ///
    /// Each walk is seeded with the child's value estimate, or zero past a
    /// terminal edge. Walks of different lengths run level by level and drop
    /// out when they reach their own root.
    fn backup(&mut self, selected: &[(usize, usize)]) {
        let discount = self.config.discount;

        let mut walks: Vec<(usize, usize, usize, f32)> = selected
            .iter()
            .zip(&self.root_indices)
            .map(|(&(node, action), &root)| {
                let edge = self.arena.edge(node, action);
                let leaf_value = if self.arena.terminal(edge) { 0.0 } else { self.arena.value(self.arena.child(edge)) };
                (root, node, action, leaf_value)
            })
            .collect();

        while !walks.is_empty() {
            let mut climbing = Vec::with_capacity(walks.len());
            for (root, node, action, value) in walks {
                let edge = self.arena.edge(node, action);
                let continuation = if self.arena.terminal(edge) { 0.0 } else { value };
                let value = self.arena.reward(edge) + discount * continuation;
                self.arena.update(edge, value);

                if node == root {
                    continue;
                }
                let parent = self.arena.parent(node);
                assert_ne!(parent, UNSET, "backup from node {node} walked past its root {root}");
                climbing.push((root, parent, self.arena.parent_action(node), value));
            }
            walks = climbing;
        }
    }
}

/// Checks that a simulator answered with one row per stepped state.
fn check_transition(transition: &Transition, n: usize, state_dim: usize, action_dim: usize) -> Result<(), MctsError> {
    let checks: [(&'static str, Vec<usize>, &[usize]); 4] = [
        ("next_states", vec![n, state_dim], transition.next_states.shape()),
        ("next_masks", vec![n, action_dim], transition.next_masks.shape()),
        ("rewards", vec![n], transition.rewards.shape()),
        ("terminals", vec![n], transition.terminals.shape()),
    ];

    for (what, expected, got) in checks {
        if expected.as_slice() != got {
            return Err(MctsError::ShapeMismatch { what, expected, got: got.to_vec() });
        }
    }
    Ok(())
}
