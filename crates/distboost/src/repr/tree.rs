//! Structure-of-Arrays regression tree and its builder.

use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

/// Index of a node within its tree (0 = root).
pub type NodeId = u32;

// ============================================================================
// TreeValidationError
// ============================================================================

/// Structural validation errors for [`Tree`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreeValidationError {
    #[error("tree has no nodes")]
    EmptyTree,
    #[error("node arrays have inconsistent lengths")]
    LengthMismatch,
    #[error("{side} child {child} of node {node} is out of bounds ({n_nodes} nodes)")]
    ChildOutOfBounds {
        node: NodeId,
        side: &'static str,
        child: NodeId,
        n_nodes: usize,
    },
    #[error("node {node} references itself")]
    SelfLoop { node: NodeId },
    #[error("node {node} is reachable by more than one path")]
    DuplicateVisit { node: NodeId },
    #[error("cycle detected at node {node}")]
    CycleDetected { node: NodeId },
    #[error("node {node} is unreachable from the root")]
    UnreachableNode { node: NodeId },
}

// ============================================================================
// Tree
// ============================================================================

/// Immutable binary regression tree.
///
/// Nodes are stored in parallel arrays indexed by [`NodeId`]. A split node
/// sends a row left when its feature value is below the threshold, or when
/// the value is missing and `default_left` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    split_indices: Box<[u32]>,
    split_thresholds: Box<[f32]>,
    left_children: Box<[NodeId]>,
    right_children: Box<[NodeId]>,
    default_left: Box<[bool]>,
    is_leaf: Box<[bool]>,
    leaf_values: Box<[f32]>,
    /// Loss reduction at each split node (0 for leaves).
    gains: Box<[f32]>,
    /// Hessian sum at each node.
    covers: Box<[f32]>,
}

impl Tree {
    /// Single-leaf tree.
    pub fn leaf(value: f32) -> Self {
        let mut builder = TreeBuilder::new();
        builder.make_leaf(0, value, 0.0);
        builder.build()
    }

    #[inline]
    pub fn n_nodes(&self) -> usize {
        self.is_leaf.len()
    }

    pub fn n_leaves(&self) -> usize {
        self.is_leaf.iter().filter(|&&leaf| leaf).count()
    }

    #[inline]
    pub fn is_leaf(&self, node: NodeId) -> bool {
        self.is_leaf[node as usize]
    }

    #[inline]
    pub fn split_index(&self, node: NodeId) -> u32 {
        self.split_indices[node as usize]
    }

    #[inline]
    pub fn split_threshold(&self, node: NodeId) -> f32 {
        self.split_thresholds[node as usize]
    }

    #[inline]
    pub fn left_child(&self, node: NodeId) -> NodeId {
        self.left_children[node as usize]
    }

    #[inline]
    pub fn right_child(&self, node: NodeId) -> NodeId {
        self.right_children[node as usize]
    }

    #[inline]
    pub fn default_left(&self, node: NodeId) -> bool {
        self.default_left[node as usize]
    }

    /// Value of a leaf node (0 for split nodes).
    #[inline]
    pub fn leaf_value(&self, node: NodeId) -> f32 {
        self.leaf_values[node as usize]
    }

    /// Length of the longest root-to-leaf path, in edges.
    pub fn depth(&self) -> usize {
        let mut max_depth = 0;
        let mut stack = vec![(0 as NodeId, 0usize)];
        while let Some((node, depth)) = stack.pop() {
            if self.is_leaf(node) {
                max_depth = max_depth.max(depth);
            } else {
                stack.push((self.left_child(node), depth + 1));
                stack.push((self.right_child(node), depth + 1));
            }
        }
        max_depth
    }

    /// Leaf reached by a row of raw feature values.
    #[inline]
    pub fn predict_leaf(&self, row: ArrayView1<'_, f32>) -> NodeId {
        let mut node: NodeId = 0;
        while !self.is_leaf(node) {
            let x = row[self.split_index(node) as usize];
            let go_left = if x.is_nan() {
                self.default_left(node)
            } else {
                x < self.split_threshold(node)
            };
            node = if go_left {
                self.left_child(node)
            } else {
                self.right_child(node)
            };
        }
        node
    }

    /// Leaf value for a row of raw feature values.
    #[inline]
    pub fn predict_row(&self, row: ArrayView1<'_, f32>) -> f32 {
        self.leaf_value(self.predict_leaf(row))
    }

    /// Validate basic structural invariants.
    pub fn validate(&self) -> Result<(), TreeValidationError> {
        let n_nodes = self.n_nodes();
        if n_nodes == 0 {
            return Err(TreeValidationError::EmptyTree);
        }
        let lens = [
            self.split_indices.len(),
            self.split_thresholds.len(),
            self.left_children.len(),
            self.right_children.len(),
            self.default_left.len(),
            self.leaf_values.len(),
            self.gains.len(),
            self.covers.len(),
        ];
        if lens.iter().any(|&len| len != n_nodes) {
            return Err(TreeValidationError::LengthMismatch);
        }

        // Iterative DFS with color marking.
        // 0 = unvisited, 1 = visiting, 2 = done
        let mut color = vec![0u8; n_nodes];
        let mut stack: Vec<(NodeId, bool)> = vec![(0, false)];

        while let Some((node, finished)) = stack.pop() {
            let idx = node as usize;
            if finished {
                color[idx] = 2;
                continue;
            }
            match color[idx] {
                0 => {}
                1 => return Err(TreeValidationError::CycleDetected { node }),
                _ => return Err(TreeValidationError::DuplicateVisit { node }),
            }
            color[idx] = 1;
            stack.push((node, true));

            if self.is_leaf(node) {
                continue;
            }
            for (side, child) in [("right", self.right_child(node)), ("left", self.left_child(node))] {
                if child == node {
                    return Err(TreeValidationError::SelfLoop { node });
                }
                if child as usize >= n_nodes {
                    return Err(TreeValidationError::ChildOutOfBounds {
                        node,
                        side,
                        child,
                        n_nodes,
                    });
                }
                stack.push((child, false));
            }
        }

        match color.iter().position(|&c| c == 0) {
            Some(i) => Err(TreeValidationError::UnreachableNode { node: i as NodeId }),
            None => Ok(()),
        }
    }
}

// ============================================================================
// TreeBuilder
// ============================================================================

/// Grows a [`Tree`] node by node.
///
/// Starts with a single root leaf. [`TreeBuilder::split`] turns a leaf into a
/// split node and allocates its two children, so node ids follow creation
/// order.
#[derive(Debug, Clone)]
pub struct TreeBuilder {
    split_indices: Vec<u32>,
    split_thresholds: Vec<f32>,
    left_children: Vec<NodeId>,
    right_children: Vec<NodeId>,
    default_left: Vec<bool>,
    is_leaf: Vec<bool>,
    leaf_values: Vec<f32>,
    gains: Vec<f32>,
    covers: Vec<f32>,
}

impl Default for TreeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeBuilder {
    pub fn new() -> Self {
        let mut builder = Self {
            split_indices: Vec::new(),
            split_thresholds: Vec::new(),
            left_children: Vec::new(),
            right_children: Vec::new(),
            default_left: Vec::new(),
            is_leaf: Vec::new(),
            leaf_values: Vec::new(),
            gains: Vec::new(),
            covers: Vec::new(),
        };
        builder.push_node();
        builder
    }

    fn push_node(&mut self) -> NodeId {
        let id = self.is_leaf.len() as NodeId;
        self.split_indices.push(0);
        self.split_thresholds.push(0.0);
        self.left_children.push(0);
        self.right_children.push(0);
        self.default_left.push(false);
        self.is_leaf.push(true);
        self.leaf_values.push(0.0);
        self.gains.push(0.0);
        self.covers.push(0.0);
        id
    }

    pub fn n_nodes(&self) -> usize {
        self.is_leaf.len()
    }

    /// Turn `node` into a split and return its `(left, right)` children.
    pub fn split(
        &mut self,
        node: NodeId,
        feature: u32,
        threshold: f32,
        default_left: bool,
        gain: f32,
        cover: f32,
    ) -> (NodeId, NodeId) {
        let left = self.push_node();
        let right = self.push_node();
        let idx = node as usize;
        self.split_indices[idx] = feature;
        self.split_thresholds[idx] = threshold;
        self.left_children[idx] = left;
        self.right_children[idx] = right;
        self.default_left[idx] = default_left;
        self.is_leaf[idx] = false;
        self.leaf_values[idx] = 0.0;
        self.gains[idx] = gain;
        self.covers[idx] = cover;
        (left, right)
    }

    /// Set the value of a leaf.
    pub fn make_leaf(&mut self, node: NodeId, value: f32, cover: f32) {
        let idx = node as usize;
        debug_assert!(self.is_leaf[idx], "node {node} is already split");
        self.leaf_values[idx] = value;
        self.covers[idx] = cover;
    }

    pub fn build(self) -> Tree {
        Tree {
            split_indices: self.split_indices.into_boxed_slice(),
            split_thresholds: self.split_thresholds.into_boxed_slice(),
            left_children: self.left_children.into_boxed_slice(),
            right_children: self.right_children.into_boxed_slice(),
            default_left: self.default_left.into_boxed_slice(),
            is_leaf: self.is_leaf.into_boxed_slice(),
            leaf_values: self.leaf_values.into_boxed_slice(),
            gains: self.gains.into_boxed_slice(),
            covers: self.covers.into_boxed_slice(),
        }
    }
}
