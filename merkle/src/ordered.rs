//! Accumulator whose positions are fixed by the content of its elements.
use super::tree::{AuthenticatedTree, Combination};
use super::{evaluate_branch, Hash160};
use serde::{Deserialize, Serialize};

/// Element of an `OrderedAccumulator` together with its assigned position.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct OrderedElement {
    /// Absolute position: the accumulator offset plus the rank of the content hash.
    pub position: u64,
    /// Element bytes.
    pub data: Vec<u8>,
}

/// Leaf hash binding an element to its position: `Hash(position_le64 || data)`.
pub fn leaf_hash(position: u64, data: &[u8]) -> Hash160 {
    let mut input = Vec::with_capacity(8 + data.len());
    input.extend_from_slice(&position.to_le_bytes());
    input.extend_from_slice(data);
    Hash160::digest(&input)
}

/// A set of byte strings committed in the order of their content hashes,
/// so the same set always produces the same positions and root.
#[derive(Clone, Debug)]
pub struct OrderedAccumulator {
    offset: u64,
    elements: Vec<OrderedElement>,
    tree: Option<AuthenticatedTree>,
}

impl OrderedAccumulator {
    /// Creates an empty accumulator whose first position is `offset`.
    pub fn new(offset: u64) -> Self {
        OrderedAccumulator {
            offset,
            elements: Vec::new(),
            tree: None,
        }
    }

    /// Position of the first element.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Returns true if there are no elements.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Returns true if the element is present.
    pub fn contains(&self, data: &[u8]) -> bool {
        self.elements.iter().any(|e| e.data == data)
    }

    /// Adds an element. Returns false and changes nothing if it is already present.
    pub fn insert(&mut self, data: Vec<u8>) -> bool {
        if self.contains(&data) {
            return false;
        }
        self.elements.push(OrderedElement { position: 0, data });
        self.tree = None;
        true
    }

    /// Elements in canonical order.
    pub fn elements(&mut self) -> &[OrderedElement] {
        self.ensure_built();
        &self.elements
    }

    /// Canonical position of the element, if present.
    pub fn position(&mut self, data: &[u8]) -> Option<u64> {
        self.ensure_built();
        self.elements
            .iter()
            .find(|e| e.data == data)
            .map(|e| e.position)
    }

    /// Element at the given absolute position.
    pub fn element_at(&mut self, position: u64) -> Option<&[u8]> {
        self.ensure_built();
        let index = position.checked_sub(self.offset)? as usize;
        self.elements.get(index).map(|e| &e.data[..])
    }

    /// Root of the tree over the canonical leaf hashes.
    /// The root of an empty accumulator is the zero hash.
    pub fn root(&mut self) -> Hash160 {
        self.tree().root()
    }

    /// Sibling hashes of the element at `position`, without a trailer.
    pub fn siblings(&mut self, position: u64) -> Option<Vec<Hash160>> {
        let index = position.checked_sub(self.offset)?;
        let tree = self.tree();
        if index >= tree.len() {
            return None;
        }
        Some(tree.branch(index))
    }

    /// Branch of the element at `position`: its siblings followed by the root.
    pub fn branch(&mut self, position: u64) -> Option<Vec<Hash160>> {
        let mut branch = self.siblings(position)?;
        branch.push(self.root());
        Some(branch)
    }

    /// Verifies that `data` sits at `position` under `root`.
    pub fn verify_branch(position: u64, data: &[u8], branch: &[Hash160], root: &Hash160) -> bool {
        crate::verify_branch(leaf_hash(position, data), branch, root)
    }

    /// Computes the root that a trailer-free list of siblings leads to.
    pub fn evaluate_siblings(position: u64, data: &[u8], siblings: &[Hash160]) -> Hash160 {
        evaluate_branch(leaf_hash(position, data), siblings)
    }

    fn tree(&mut self) -> &AuthenticatedTree {
        self.ensure_built();
        match self.tree {
            Some(ref tree) => tree,
            None => unreachable!("tree is rebuilt above"),
        }
    }

    fn ensure_built(&mut self) {
        if self.tree.is_some() {
            return;
        }
        let mut keyed: Vec<(Hash160, OrderedElement)> = self
            .elements
            .drain(..)
            .map(|e| (Hash160::digest(&e.data), e))
            .collect();
        keyed.sort_by(|(h1, e1), (h2, e2)| h1.cmp(h2).then_with(|| e1.data.cmp(&e2.data)));
        let offset = self.offset;
        self.elements = keyed
            .into_iter()
            .enumerate()
            .map(|(rank, (_, mut e))| {
                e.position = offset + rank as u64;
                e
            })
            .collect();
        let leaves = self
            .elements
            .iter()
            .map(|e| leaf_hash(e.position, &e.data))
            .collect();
        self.tree = Some(AuthenticatedTree::from_leaves(leaves, Combination::Symmetric));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(n: u8) -> Vec<Vec<u8>> {
        (0..n).map(|i| vec![i, i.wrapping_mul(7), 42]).collect()
    }

    fn accumulate(offset: u64, items: &[Vec<u8>]) -> OrderedAccumulator {
        let mut acc = OrderedAccumulator::new(offset);
        for item in items {
            assert!(acc.insert(item.clone()));
        }
        acc
    }

    #[test]
    fn insertion_order_is_irrelevant() {
        let forward = items(13);
        let mut backward = forward.clone();
        backward.reverse();
        let mut a = accumulate(5, &forward);
        let mut b = accumulate(5, &backward);
        assert_eq!(a.root(), b.root());
        for item in forward.iter() {
            assert_eq!(a.position(item), b.position(item));
        }
    }

    #[test]
    fn positions_follow_offset() {
        let mut acc = accumulate(100, &items(4));
        let mut positions: Vec<u64> = items(4).iter().map(|i| acc.position(i).unwrap()).collect();
        positions.sort();
        assert_eq!(positions, vec![100, 101, 102, 103]);
        assert_eq!(acc.element_at(99), None);
        assert_eq!(acc.element_at(104), None);
        assert!(acc.element_at(102).is_some());
    }

    #[test]
    fn duplicates_are_refused() {
        let mut acc = accumulate(0, &items(3));
        let root = acc.root();
        assert!(!acc.insert(items(3)[1].clone()));
        assert_eq!(acc.len(), 3);
        assert_eq!(acc.root(), root);
    }

    #[test]
    fn every_branch_verifies() {
        for n in 1..18u8 {
            let mut acc = accumulate(7, &items(n));
            let root = acc.root();
            for item in items(n) {
                let position = acc.position(&item).unwrap();
                let branch = acc.branch(position).unwrap();
                assert!(OrderedAccumulator::verify_branch(position, &item, &branch, &root));
            }
        }
    }

    #[test]
    fn tampering_breaks_branches() {
        let mut acc = accumulate(0, &items(9));
        let root = acc.root();
        let item = items(9)[4].clone();
        let position = acc.position(&item).unwrap();
        let branch = acc.branch(position).unwrap();

        let mut forged_item = item.clone();
        forged_item[0] ^= 1;
        assert!(!OrderedAccumulator::verify_branch(position, &forged_item, &branch, &root));

        for i in 0..branch.len() {
            let mut forged = branch.clone();
            forged[i].0[3] ^= 0x10;
            assert!(!OrderedAccumulator::verify_branch(position, &item, &forged, &root));
        }

        assert!(!OrderedAccumulator::verify_branch(position + 1, &item, &branch, &root));
    }

    #[test]
    fn insert_after_root_reassigns_positions() {
        let mut acc = accumulate(0, &items(4));
        let before = acc.root();
        assert!(acc.insert(vec![0xff]));
        assert_ne!(acc.root(), before);
        let mut again = accumulate(0, &items(4));
        again.insert(vec![0xff]);
        assert_eq!(acc.root(), again.root());
    }

    #[test]
    fn missing_positions_have_no_branch() {
        let mut acc = accumulate(10, &items(2));
        assert!(acc.branch(9).is_none());
        assert!(acc.branch(12).is_none());
        assert!(acc.branch(11).is_some());
    }
}
