//! Columnar node storage for batched MCTS.
//!
//! Every tree node of every sequence lives in one set of flat arrays and is
//! identified by its index. Per-action statistics are stored row-major, so
//! the statistics of action `a` in node `i` sit at edge index `i * A + a`.
//! Missing links use the `UNSET` sentinel since `0` is a valid node index.

use ndarray::{s, Array2, ArrayView1, ArrayView2};
use tracing::debug;

/// Sentinel for a link that does not exist (yet).
pub const UNSET: usize = usize::MAX;

/// Growable arena holding the nodes of all search trees of a batch.
///
/// Nodes are appended, never removed or compacted, so an index stays valid
/// for the lifetime of the arena.
pub struct NodeArena {
    action_dim: usize,
    state_dim: usize,
    /// Number of allocated nodes.
    len: usize,
    /// Number of nodes the columns can hold.
    capacity: usize,

    states: Array2<f32>,
    masks: Array2<bool>,
    /// Predecessor of each node, `UNSET` for an original root.
    parents: Vec<usize>,
    /// Action taken in the parent to reach each node.
    parent_actions: Vec<usize>,
    /// Action committed by `step` while the node was a live root.
    step_actions: Vec<usize>,
    /// Leaf value estimate of each node.
    values: Vec<f32>,

    children: Vec<usize>,
    rewards: Vec<f32>,
    terminals: Vec<bool>,
    priors: Vec<f32>,
    q: Vec<f32>,
    visits: Vec<u32>,
}

impl NodeArena {
    /// Creates an arena holding exactly the given roots.
    ///
    /// # Parameters
    /// - `states`: Root states, of shape `(n, state_dim)`.
    /// - `masks`: Root legal-action masks, of shape `(n, action_dim)`.
    ///
    /// # Panics
    /// If `states` and `masks` disagree on the number of rows.
    pub fn with_roots(states: Array2<f32>, masks: Array2<bool>) -> Self {
        assert_eq!(states.nrows(), masks.nrows(), "one mask per root state");

        let n = states.nrows();
        let action_dim = masks.ncols();
        let state_dim = states.ncols();

        NodeArena {
            action_dim,
            state_dim,
            len: n,
            capacity: n,
            states: states.as_standard_layout().into_owned(),
            masks: masks.as_standard_layout().into_owned(),
            parents: vec![UNSET; n],
            parent_actions: vec![UNSET; n],
            step_actions: vec![UNSET; n],
            values: vec![0.0; n],
            children: vec![UNSET; n * action_dim],
            rewards: vec![0.0; n * action_dim],
            terminals: vec![false; n * action_dim],
            priors: vec![0.0; n * action_dim],
            q: vec![0.0; n * action_dim],
            visits: vec![0; n * action_dim],
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn action_dim(&self) -> usize {
        self.action_dim
    }

    #[inline]
    pub fn state_dim(&self) -> usize {
        self.state_dim
    }

    /// Flat index of the `(node, action)` edge.
    #[inline]
    pub fn edge(&self, node: usize, action: usize) -> usize {
        node * self.action_dim + action
    }

    #[inline]
    fn edges(&self, node: usize) -> std::ops::Range<usize> {
        node * self.action_dim..(node + 1) * self.action_dim
    }

    /// Guarantees room for at least `additional` more nodes.
    ///
    /// Every column is reallocated once, existing contents are copied, and
    /// the new region is filled with `UNSET` links and zeroed statistics.
    pub fn expand_capacity(&mut self, additional: usize) {
        let required = self.len + additional;
        if required <= self.capacity {
            return;
        }

        let old = self.capacity;
        let grow = required - old;
        let a = self.action_dim;

        let mut states = Array2::zeros((required, self.state_dim));
        states.slice_mut(s![..old, ..]).assign(&self.states);
        self.states = states;

        let mut masks = Array2::from_elem((required, a), false);
        masks.slice_mut(s![..old, ..]).assign(&self.masks);
        self.masks = masks;

        self.parents.resize(required, UNSET);
        self.parent_actions.resize(required, UNSET);
        self.step_actions.resize(required, UNSET);
        self.values.resize(required, 0.0);

        self.children.resize(required * a, UNSET);
        self.rewards.resize(required * a, 0.0);
        self.terminals.resize(required * a, false);
        self.priors.resize(required * a, 0.0);
        self.q.resize(required * a, 0.0);
        self.visits.resize(required * a, 0);

        self.capacity = required;
        debug!(nodes = self.len, capacity = required, added = grow, "expanded node arena");
    }

    /// Appends a node reached from `parent` through `action`.
    ///
    /// # Returns
    /// The index of the new node.
    ///
    /// # Panics
    /// If the arena is full, or if the edge already points to a child.
    pub fn allocate(&mut self, parent: usize, action: usize, state: ArrayView1<f32>, mask: ArrayView1<bool>) -> usize {
        assert!(self.len < self.capacity, "node arena is full ({} nodes)", self.capacity);
        let edge = self.edge(parent, action);
        assert_eq!(self.children[edge], UNSET, "edge ({parent}, {action}) already has a child");

        let index = self.len;
        assert_eq!(self.parents[index], UNSET, "slot {index} already has a parent");
        self.len += 1;

        self.states.row_mut(index).assign(&state);
        self.masks.row_mut(index).assign(&mask);
        self.parents[index] = parent;
        self.parent_actions[index] = action;
        self.children[edge] = index;
        index
    }

    /// Records the outcome of an edge.
    ///
    /// Recording the same outcome twice is a no-op.
    ///
    /// # Returns
    /// `true` if this call recorded the outcome for the first time.
    ///
    /// # Panics
    /// If an outcome was already recorded with a different reward or terminal flag.
    pub fn record_outcome(&mut self, edge: usize, reward: f32, terminal: bool) -> bool {
        if self.children[edge] != UNSET {
            assert!(
                self.rewards[edge] == reward && self.terminals[edge] == terminal,
                "inconsistent re-expansion of edge {edge}: stored ({}, {}), got ({reward}, {terminal})",
                self.rewards[edge],
                self.terminals[edge],
            );
            return false;
        }

        self.rewards[edge] = reward;
        self.terminals[edge] = terminal;
        true
    }

    /// Writes inference output into a node.
    pub fn set_evaluation(&mut self, node: usize, priors: ArrayView1<f32>, value: f32) {
        let edges = self.edges(node);
        for (p, &prior) in self.priors[edges].iter_mut().zip(priors.iter()) {
            *p = prior;
        }
        self.values[node] = value;
    }

    /// Folds `value` into the running mean of an edge.
    #[inline]
    pub fn update(&mut self, edge: usize, value: f32) {
        let n = self.visits[edge] as f32;
        self.q[edge] = (n * self.q[edge] + value) / (n + 1.0);
        self.visits[edge] += 1;
    }

    #[inline]
    pub fn states(&self) -> ArrayView2<f32> {
        self.states.view()
    }

    #[inline]
    pub fn masks(&self) -> ArrayView2<bool> {
        self.masks.view()
    }

    #[inline]
    pub fn state(&self, node: usize) -> ArrayView1<f32> {
        self.states.row(node)
    }

    #[inline]
    pub fn mask(&self, node: usize) -> ArrayView1<bool> {
        self.masks.row(node)
    }

    #[inline]
    pub fn parent(&self, node: usize) -> usize {
        self.parents[node]
    }

    #[inline]
    pub fn parent_action(&self, node: usize) -> usize {
        self.parent_actions[node]
    }

    #[inline]
    pub fn step_action(&self, node: usize) -> usize {
        self.step_actions[node]
    }

    #[inline]
    pub fn set_step_action(&mut self, node: usize, action: usize) {
        self.step_actions[node] = action;
    }

    #[inline]
    pub fn value(&self, node: usize) -> f32 {
        self.values[node]
    }

    #[inline]
    pub fn child(&self, edge: usize) -> usize {
        self.children[edge]
    }

    #[inline]
    pub fn reward(&self, edge: usize) -> f32 {
        self.rewards[edge]
    }

    #[inline]
    pub fn terminal(&self, edge: usize) -> bool {
        self.terminals[edge]
    }

    #[inline]
    pub fn priors(&self, node: usize) -> &[f32] {
        &self.priors[self.edges(node)]
    }

    #[inline]
    pub fn priors_mut(&mut self, node: usize) -> &mut [f32] {
        let edges = self.edges(node);
        &mut self.priors[edges]
    }

    #[inline]
    pub fn q(&self, node: usize) -> &[f32] {
        &self.q[self.edges(node)]
    }

    #[inline]
    pub fn visits(&self, node: usize) -> &[u32] {
        &self.visits[self.edges(node)]
    }

    #[inline]
    pub fn q_edge(&self, edge: usize) -> f32 {
        self.q[edge]
    }

    #[inline]
    pub fn visits_edge(&self, edge: usize) -> u32 {
        self.visits[edge]
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{array, Array2};

    use super::*;

    fn two_roots() -> NodeArena {
        NodeArena::with_roots(array![[0.0, 1.0], [2.0, 3.0]], Array2::from_elem((2, 3), true))
    }

    #[test]
    fn test_roots() {
        let arena = two_roots();

        assert_eq!(arena.len(), 2);
        assert_eq!(arena.capacity(), 2);
        assert_eq!(arena.action_dim(), 3);
        assert_eq!(arena.parent(0), UNSET);
        assert_eq!(arena.parent(1), UNSET);
        assert!((0..3).all(|a| arena.child(arena.edge(1, a)) == UNSET));
        assert_eq!(arena.state(1).to_vec(), vec![2.0, 3.0]);
    }

    #[test]
    fn test_expand_keeps_contents_and_fills_unset() {
        let mut arena = two_roots();
        arena.update(arena.edge(1, 2), 0.5);

        arena.expand_capacity(4);

        assert_eq!(arena.capacity(), 6);
        assert_eq!(arena.len(), 2);
        assert_eq!(arena.state(1).to_vec(), vec![2.0, 3.0]);
        assert_eq!(arena.visits(1), &[0, 0, 1]);
        assert_eq!(arena.q(1), &[0.0, 0.0, 0.5]);
        assert!((2..6).all(|node| arena.parent(node) == UNSET));
        assert!((6..18).all(|edge| arena.child(edge) == UNSET));

        // Enough room already.
        arena.expand_capacity(3);
        assert_eq!(arena.capacity(), 6);
    }

    #[test]
    fn test_allocate_links_parent_and_child() {
        let mut arena = two_roots();
        arena.expand_capacity(1);

        let child = arena.allocate(1, 2, array![4.0, 5.0].view(), array![true, false, true].view());

        assert_eq!(child, 2);
        assert_eq!(arena.parent(child), 1);
        assert_eq!(arena.parent_action(child), 2);
        assert_eq!(arena.child(arena.edge(1, 2)), child);
        assert_eq!(arena.mask(child).to_vec(), vec![true, false, true]);
    }

    #[test]
    #[should_panic(expected = "node arena is full")]
    fn test_allocate_without_capacity_panics() {
        let mut arena = two_roots();
        arena.allocate(0, 0, array![0.0, 0.0].view(), array![true, true, true].view());
    }

    #[test]
    #[should_panic(expected = "already has a child")]
    fn test_allocate_twice_panics() {
        let mut arena = two_roots();
        arena.expand_capacity(2);
        arena.allocate(0, 0, array![0.0, 0.0].view(), array![true, true, true].view());
        arena.allocate(0, 0, array![0.0, 0.0].view(), array![true, true, true].view());
    }

    #[test]
    fn test_record_outcome_is_idempotent() {
        let mut arena = two_roots();
        arena.expand_capacity(1);
        let edge = arena.edge(0, 1);

        assert!(arena.record_outcome(edge, 1.0, true));
        arena.allocate(0, 1, array![0.0, 0.0].view(), array![true, true, true].view());
        assert!(!arena.record_outcome(edge, 1.0, true));
        assert_eq!(arena.reward(edge), 1.0);
        assert!(arena.terminal(edge));
    }

    #[test]
    #[should_panic(expected = "inconsistent re-expansion")]
    fn test_record_outcome_inconsistent_panics() {
        let mut arena = two_roots();
        arena.expand_capacity(1);
        let edge = arena.edge(0, 1);

        arena.record_outcome(edge, 1.0, true);
        arena.allocate(0, 1, array![0.0, 0.0].view(), array![true, true, true].view());
        arena.record_outcome(edge, 0.0, true);
    }

    #[test]
    fn test_update_is_running_mean() {
        let mut arena = two_roots();
        let edge = arena.edge(0, 0);

        for value in [1.0, 0.0, 0.5, 2.5] {
            arena.update(edge, value);
        }

        assert_eq!(arena.visits_edge(edge), 4);
        assert!((arena.q_edge(edge) - 1.0).abs() < 1e-6);
    }
}
