//! Diurns: the periods between calends, and the calendar built from them.
use merkle::{symmetric_combine, verify_branch, AuthenticatedTree, Combination, Hash160};

use crate::errors::MissingData;
use crate::header::{HeaderMessage, MinedCredit};
use crate::rules::LedgerRules;
use crate::store::MessageStore;
use crate::work::{ProofOfWork, Work};

/// Tree over the mined-credit hashes of one diurn, in chain order.
#[derive(Clone, Debug)]
pub struct DiurnalBlock {
    tree: AuthenticatedTree,
}

impl Default for DiurnalBlock {
    fn default() -> Self {
        DiurnalBlock::new()
    }
}

impl DiurnalBlock {
    /// Creates an empty block.
    pub fn new() -> Self {
        DiurnalBlock {
            tree: AuthenticatedTree::new(Combination::Symmetric),
        }
    }

    /// Creates a block over the given hashes.
    pub fn from_hashes(hashes: Vec<Hash160>) -> Self {
        DiurnalBlock {
            tree: AuthenticatedTree::from_leaves(hashes, Combination::Symmetric),
        }
    }

    /// Appends a mined-credit hash.
    pub fn add(&mut self, hash: Hash160) {
        self.tree.append(hash);
    }

    /// Number of hashes.
    pub fn len(&self) -> u64 {
        self.tree.len()
    }

    /// Returns true if the block is empty.
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Hashes in chain order.
    pub fn hashes(&self) -> &[Hash160] {
        self.tree.leaves()
    }

    /// Root of the block; zero when empty.
    pub fn root(&self) -> Hash160 {
        self.tree.root()
    }

    /// Position of the hash.
    pub fn position(&self, hash: &Hash160) -> Option<u64> {
        self.hashes()
            .iter()
            .position(|h| h == hash)
            .map(|p| p as u64)
    }

    /// Sibling hashes leading from the hash to the root.
    pub fn branch(&self, hash: &Hash160) -> Option<Vec<Hash160>> {
        self.position(hash).map(|p| self.tree.branch(p))
    }
}

/// Headers from one calend (inclusive) up to the next one (exclusive).
#[derive(Clone, Debug, Default)]
pub struct Diurn {
    previous_diurn_root: Hash160,
    messages: Vec<HeaderMessage>,
    block: DiurnalBlock,
}

impl Diurn {
    /// Creates an empty diurn following the given calendar root.
    pub fn new(previous_diurn_root: Hash160) -> Self {
        Diurn {
            previous_diurn_root,
            messages: Vec::new(),
            block: DiurnalBlock::new(),
        }
    }

    /// Appends the next header of the chain.
    pub fn add(&mut self, msg: HeaderMessage) {
        self.block.add(msg.mined_credit.hash());
        self.messages.push(msg);
    }

    /// Calendar root preceding this diurn.
    pub fn previous_diurn_root(&self) -> Hash160 {
        self.previous_diurn_root
    }

    /// Headers in chain order.
    pub fn messages(&self) -> &[HeaderMessage] {
        &self.messages
    }

    /// Number of headers.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Returns true if the diurn has no headers.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// The block of mined-credit hashes.
    pub fn block(&self) -> &DiurnalBlock {
        &self.block
    }

    /// Root of the block.
    pub fn block_root(&self) -> Hash160 {
        self.block.root()
    }

    /// `SymmetricCombine(previous_diurn_root, block_root)`.
    pub fn root(&self) -> Hash160 {
        symmetric_combine(&self.previous_diurn_root, &self.block_root())
    }

    /// Sum of the difficulties of the headers.
    pub fn work(&self) -> Work {
        self.messages
            .iter()
            .fold(0, |sum: Work, m| sum.saturating_add(m.header().difficulty))
    }

    /// Branch from a batch root to the diurn root:
    /// the branch bridge, the block siblings, the previous diurn root and the diurn root.
    pub fn branch(&self, mined_credit: &MinedCredit) -> Option<Vec<Hash160>> {
        let mut branch = vec![mined_credit.branch_bridge()];
        branch.extend(self.block.branch(&mined_credit.hash())?);
        branch.push(self.previous_diurn_root);
        branch.push(self.root());
        Some(branch)
    }

    /// Verifies that a batch root is committed to by the diurn root.
    pub fn verify_branch(batch_root: &Hash160, branch: &[Hash160], diurn_root: &Hash160) -> bool {
        verify_branch(*batch_root, branch, diurn_root)
    }
}

/// Calends of a chain and the diurn in progress.
#[derive(Clone, Debug, Default)]
pub struct Calendar {
    calends: Vec<HeaderMessage>,
    current_diurn: Diurn,
}

impl Calendar {
    /// Builds the calendar of the chain ending in `tip`.
    pub fn new<S: MessageStore, P: ProofOfWork>(
        rules: &LedgerRules<S, P>,
        tip: &Hash160,
    ) -> Result<Self, MissingData> {
        let mut calendar = Calendar::default();
        for id in rules.branch(&Hash160::zero(), tip)? {
            let msg = rules.header_message(&id)?;
            if rules.is_calend(&msg) {
                calendar.current_diurn = Diurn::new(msg.header().diurn_root());
                calendar.calends.push(msg.clone());
            }
            calendar.current_diurn.add(msg);
        }
        Ok(calendar)
    }

    /// Calends in chain order.
    pub fn calends(&self) -> &[HeaderMessage] {
        &self.calends
    }

    /// Diurn started by the last calend.
    pub fn current_diurn(&self) -> &Diurn {
        &self.current_diurn
    }

    /// Roots of the completed diurns, oldest first.
    pub fn diurn_roots(&self) -> Vec<Hash160> {
        self.calends.iter().map(|c| c.header().diurn_root()).collect()
    }

    /// Every calend links to the calend before it.
    pub fn check_calend_hashes(&self) -> bool {
        let mut previous = Hash160::zero();
        for calend in self.calends.iter() {
            if calend.header().previous_calend_hash != previous {
                return false;
            }
            previous = calend.id();
        }
        true
    }

    /// Every calend and every header of the current diurn carries
    /// the root of the diurn completed before it.
    pub fn check_diurn_roots(&self) -> bool {
        let mut previous = Hash160::zero();
        for calend in self.calends.iter() {
            if calend.header().previous_diurn_root != previous {
                return false;
            }
            previous = calend.header().diurn_root();
        }
        self.current_diurn
            .messages()
            .iter()
            .skip(1)
            .all(|m| m.header().previous_diurn_root == previous)
    }

    /// Sum of the diurnal difficulties of the calends.
    pub fn calend_work(&self) -> Work {
        self.calends
            .iter()
            .fold(0, |sum: Work, c| sum.saturating_add(c.header().diurnal_difficulty))
    }

    /// Work the calendar demonstrates: the calends plus the current diurn.
    /// The last calend opens the current diurn and is counted once.
    pub fn total_work(&self) -> Work {
        let overlap = self
            .calends
            .last()
            .map(|c| c.header().difficulty)
            .unwrap_or(0);
        self.calend_work()
            .saturating_add(self.current_diurn.work())
            .saturating_sub(overlap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credit::{Credit, PublicKey};
    use crate::header::LedgerHeader;

    fn message(n: u64) -> HeaderMessage {
        let mut msg = HeaderMessage::default();
        msg.mined_credit = MinedCredit {
            credit: Credit::new(PublicKey::default(), n),
            header: LedgerHeader {
                batch_root: Hash160::digest(&n.to_le_bytes()),
                batch_number: n,
                difficulty: 10,
                ..Default::default()
            },
        };
        msg
    }

    #[test]
    fn diurn_branch_leads_from_batch_root() {
        let mut diurn = Diurn::new(Hash160::digest(b"earlier"));
        for n in 1..=7 {
            diurn.add(message(n));
        }
        let root = diurn.root();
        for m in diurn.messages() {
            let branch = diurn.branch(&m.mined_credit).unwrap();
            assert!(Diurn::verify_branch(&m.header().batch_root, &branch, &root));
            assert!(!Diurn::verify_branch(&Hash160::digest(b"x"), &branch, &root));
        }
        assert!(diurn.branch(&message(9).mined_credit).is_none());
        assert_eq!(diurn.work(), 70);
    }

    #[test]
    fn block_appends_match_bulk_build() {
        let hashes: Vec<Hash160> = (0..9u8).map(|i| Hash160::digest(&[i])).collect();
        let mut block = DiurnalBlock::new();
        for h in hashes.iter() {
            block.add(*h);
        }
        assert_eq!(block.root(), DiurnalBlock::from_hashes(hashes.clone()).root());
        assert_eq!(block.position(&hashes[4]), Some(4));
        assert_eq!(DiurnalBlock::new().root(), Hash160::zero());
    }

    #[test]
    fn root_depends_on_history() {
        let mut a = Diurn::new(Hash160::zero());
        let mut b = Diurn::new(Hash160::digest(b"other"));
        a.add(message(1));
        b.add(message(1));
        assert_eq!(a.block_root(), b.block_root());
        assert_ne!(a.root(), b.root());
    }
}
