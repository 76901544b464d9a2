//! Growable balanced binary hash tree with historical (prefix) roots.
//!
//! The tree covers a power-of-two capacity of positions. Every node splits its
//! range at the midpoint until it covers at most two positions. When the
//! capacity is exhausted a new root is allocated above the old one, so the
//! ranges of existing nodes never change and the root for the first `k`
//! elements stays the same no matter how many elements follow.
//!
//! ```ascii
//!              [0,8)
//!            /       \
//!        [0,4)       [4,8)
//!        /   \       /   \
//!     [0,2) [2,4) [4,6) [6,8)
//! ```
use super::{combine, symmetric_combine, Hash160};
use serde::{Deserialize, Serialize};
use std::cell::Cell;

/// Function used to merge two child hashes.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum Combination {
    /// `symmetric_combine`: branches need no sides.
    Symmetric,
    /// `combine`: branches carry the side of every neighbor.
    Asymmetric,
}

impl Combination {
    /// Merges the hashes of the left and right children.
    pub fn combine(self, left: &Hash160, right: &Hash160) -> Hash160 {
        match self {
            Combination::Symmetric => symmetric_combine(left, right),
            Combination::Asymmetric => combine(left, right),
        }
    }
}

/// Side of the neighbour in a sided path.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum Side {
    /// Indicates that the item is to the left of its neighbor.
    Left,
    /// Indicates that the item is to the right of its neighbor.
    Right,
}

impl Side {
    /// Orders (current, neighbor) pair of nodes as (left, right)
    pub fn order<T>(self, a: T, b: T) -> (T, T) {
        match self {
            Side::Left => (a, b),
            Side::Right => (b, a),
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
struct NodeIndex(usize);

#[derive(Clone, Debug)]
struct Node {
    start: u64,
    end: u64,
    children: Option<(NodeIndex, NodeIndex)>,
    // (end of the covered prefix, hash of that prefix)
    cache: Cell<Option<(u64, Hash160)>>,
}

/// Append-only authenticated tree over element hashes.
#[derive(Clone, Debug)]
pub struct AuthenticatedTree {
    leaves: Vec<Hash160>,
    nodes: Vec<Node>,
    root: NodeIndex,
    combination: Combination,
}

impl AuthenticatedTree {
    /// Creates an empty tree.
    pub fn new(combination: Combination) -> Self {
        Self::from_leaves(Vec::new(), combination)
    }

    /// Creates a tree over the given element hashes.
    pub fn from_leaves(leaves: Vec<Hash160>, combination: Combination) -> Self {
        let capacity = (leaves.len() as u64).next_power_of_two().max(2);
        let mut tree = AuthenticatedTree {
            leaves,
            nodes: Vec::new(),
            root: NodeIndex(0),
            combination,
        };
        tree.root = tree.build(0, capacity);
        tree
    }

    /// Combination function of this tree.
    pub fn combination(&self) -> Combination {
        self.combination
    }

    /// Number of elements.
    pub fn len(&self) -> u64 {
        self.leaves.len() as u64
    }

    /// Returns true if the tree has no elements.
    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// Element hash at the given position.
    pub fn leaf(&self, position: u64) -> Option<&Hash160> {
        self.leaves.get(position as usize)
    }

    /// All element hashes in position order.
    pub fn leaves(&self) -> &[Hash160] {
        &self.leaves
    }

    /// Appends an element hash, growing the tree when it is full.
    pub fn append(&mut self, leaf: Hash160) {
        let capacity = self.nodes[self.root.0].end;
        if self.len() == capacity {
            let right = self.build(capacity, capacity * 2);
            self.root = self.push_node(0, capacity * 2, Some((self.root, right)));
        }
        self.leaves.push(leaf);
    }

    /// Replaces the element hash at `position`.
    ///
    /// Panics if `position` is not populated.
    pub fn update(&mut self, position: u64, leaf: Hash160) {
        assert!(
            position < self.len(),
            "position {} is outside of the tree of {} elements",
            position,
            self.len()
        );
        self.leaves[position as usize] = leaf;
        let mut index = self.root;
        loop {
            let node = &self.nodes[index.0];
            node.cache.set(None);
            match node.children {
                Some((left, right)) => {
                    index = if position < self.nodes[right.0].start {
                        left
                    } else {
                        right
                    };
                }
                None => break,
            }
        }
    }

    /// Root of the whole tree.
    pub fn root(&self) -> Hash160 {
        self.root_at(self.len())
    }

    /// Root of the tree as if only the first `length` elements existed.
    ///
    /// The root of an empty prefix is the zero hash.
    /// Panics if `length` exceeds the number of elements.
    pub fn root_at(&self, length: u64) -> Hash160 {
        assert!(
            length <= self.len(),
            "prefix of {} elements requested from the tree of {} elements",
            length,
            self.len()
        );
        if length == 0 {
            return Hash160::zero();
        }
        self.node_hash(self.root, length)
    }

    /// Sibling hashes from the leaf up to the root for the element at `position`.
    ///
    /// Levels whose sibling holds no element yet are omitted.
    /// Panics if `position` is not populated.
    pub fn branch(&self, position: u64) -> Vec<Hash160> {
        self.path(position).into_iter().map(|(_, h)| h).collect()
    }

    /// Like `branch`, but pairs every neighbor with the side of the current
    /// node relative to it, as needed to verify an asymmetric tree.
    pub fn path(&self, position: u64) -> Vec<(Side, Hash160)> {
        assert!(
            position < self.len(),
            "position {} is outside of the tree of {} elements",
            position,
            self.len()
        );
        let length = self.len();
        let mut neighbors = Vec::new();
        let mut index = self.root;
        loop {
            let node = &self.nodes[index.0];
            match node.children {
                Some((left, right)) => {
                    let mid = self.nodes[right.0].start;
                    if position >= mid {
                        neighbors.push((Side::Right, self.node_hash(left, length)));
                        index = right;
                    } else {
                        if length > mid {
                            neighbors.push((Side::Left, self.node_hash(right, length)));
                        }
                        index = left;
                    }
                }
                None => {
                    if length > node.start + 1 {
                        let pair = (
                            self.leaves[node.start as usize],
                            self.leaves[node.start as usize + 1],
                        );
                        if position == node.start {
                            neighbors.push((Side::Left, pair.1));
                        } else {
                            neighbors.push((Side::Right, pair.0));
                        }
                    }
                    break;
                }
            }
        }
        neighbors.reverse();
        neighbors
    }

    /// Computes the root reached from `leaf` through a sided path.
    pub fn evaluate_path(
        leaf: Hash160,
        path: &[(Side, Hash160)],
        combination: Combination,
    ) -> Hash160 {
        path.iter().fold(leaf, |current, (side, neighbor)| {
            let (l, r) = side.order(&current, neighbor);
            combination.combine(l, r)
        })
    }

    fn push_node(
        &mut self,
        start: u64,
        end: u64,
        children: Option<(NodeIndex, NodeIndex)>,
    ) -> NodeIndex {
        self.nodes.push(Node {
            start,
            end,
            children,
            cache: Cell::new(None),
        });
        NodeIndex(self.nodes.len() - 1)
    }

    fn build(&mut self, start: u64, end: u64) -> NodeIndex {
        if end - start <= 2 {
            return self.push_node(start, end, None);
        }
        let mid = start + (end - start) / 2;
        let left = self.build(start, mid);
        let right = self.build(mid, end);
        self.push_node(start, end, Some((left, right)))
    }

    // Hash of the node restricted to the first `length` elements of the tree.
    // The node must hold at least one of them.
    fn node_hash(&self, index: NodeIndex, length: u64) -> Hash160 {
        let node = &self.nodes[index.0];
        let covered = length.min(node.end);
        if let Some((cached_end, hash)) = node.cache.get() {
            if cached_end == covered {
                return hash;
            }
        }
        let hash = match node.children {
            Some((left, right)) => {
                let mid = self.nodes[right.0].start;
                if covered > mid {
                    self.combination.combine(
                        &self.node_hash(left, length),
                        &self.node_hash(right, length),
                    )
                } else {
                    self.node_hash(left, length)
                }
            }
            None => {
                let first = self.leaves[node.start as usize];
                if covered > node.start + 1 {
                    self.combination
                        .combine(&first, &self.leaves[node.start as usize + 1])
                } else {
                    first
                }
            }
        };
        node.cache.set(Some((covered, hash)));
        hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluate_branch;

    fn leaves(n: u64) -> Vec<Hash160> {
        (0..n).map(|i| Hash160::digest(&i.to_le_bytes())).collect()
    }

    #[test]
    fn empty_and_single() {
        let mut tree = AuthenticatedTree::new(Combination::Symmetric);
        assert_eq!(tree.root(), Hash160::zero());
        let l = leaves(1);
        tree.append(l[0]);
        assert_eq!(tree.root(), l[0]);
        assert!(tree.branch(0).is_empty());
    }

    #[test]
    fn prefix_roots_are_stable() {
        let all = leaves(37);
        let mut tree = AuthenticatedTree::new(Combination::Symmetric);
        let mut roots = Vec::new();
        for leaf in all.iter() {
            tree.append(*leaf);
            roots.push(tree.root());
        }
        for (k, root) in roots.iter().enumerate() {
            assert_eq!(tree.root_at(k as u64 + 1), *root);
        }
    }

    #[test]
    fn grown_tree_matches_built_tree() {
        for n in [1u64, 2, 3, 4, 5, 8, 9, 17, 33].iter() {
            let all = leaves(*n);
            let mut grown = AuthenticatedTree::new(Combination::Asymmetric);
            for leaf in all.iter() {
                grown.append(*leaf);
            }
            let built = AuthenticatedTree::from_leaves(all, Combination::Asymmetric);
            assert_eq!(grown.root(), built.root());
        }
    }

    #[test]
    fn small_trees_match_hand_computation() {
        let l = leaves(3);
        let tree = AuthenticatedTree::from_leaves(l.clone(), Combination::Asymmetric);
        assert_eq!(tree.root_at(1), l[0]);
        assert_eq!(tree.root_at(2), combine(&l[0], &l[1]));
        assert_eq!(tree.root_at(3), combine(&combine(&l[0], &l[1]), &l[2]));
    }

    #[test]
    fn symmetric_branches_verify() {
        for n in 1..40u64 {
            let tree = AuthenticatedTree::from_leaves(leaves(n), Combination::Symmetric);
            for position in 0..n {
                let leaf = *tree.leaf(position).unwrap();
                let branch = tree.branch(position);
                assert_eq!(evaluate_branch(leaf, &branch), tree.root());
            }
        }
    }

    #[test]
    fn asymmetric_paths_verify() {
        for n in 1..20u64 {
            let tree = AuthenticatedTree::from_leaves(leaves(n), Combination::Asymmetric);
            for position in 0..n {
                let leaf = *tree.leaf(position).unwrap();
                let path = tree.path(position);
                assert_eq!(
                    AuthenticatedTree::evaluate_path(leaf, &path, Combination::Asymmetric),
                    tree.root()
                );
            }
        }
    }

    #[test]
    fn update_refreshes_cached_hashes() {
        let mut tree = AuthenticatedTree::from_leaves(leaves(6), Combination::Symmetric);
        let before = tree.root();
        let replacement = Hash160::digest(b"replacement");
        tree.update(4, replacement);
        assert_ne!(tree.root(), before);
        assert_eq!(evaluate_branch(replacement, &tree.branch(4)), tree.root());

        let mut expected = leaves(6);
        expected[4] = replacement;
        let rebuilt = AuthenticatedTree::from_leaves(expected, Combination::Symmetric);
        assert_eq!(tree.root(), rebuilt.root());
    }

    #[test]
    fn historical_queries_do_not_disturb_current_root() {
        let tree = AuthenticatedTree::from_leaves(leaves(11), Combination::Symmetric);
        let root = tree.root();
        let early = tree.root_at(5);
        assert_eq!(tree.root(), root);
        assert_eq!(tree.root_at(5), early);
    }

    #[test]
    #[should_panic]
    fn branch_out_of_range_panics() {
        let tree = AuthenticatedTree::from_leaves(leaves(3), Combination::Symmetric);
        tree.branch(3);
    }

    #[test]
    #[should_panic]
    fn update_out_of_range_panics() {
        let mut tree = AuthenticatedTree::from_leaves(leaves(3), Combination::Symmetric);
        tree.update(5, Hash160::zero());
    }
}
