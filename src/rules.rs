//! Derivations that tie a header to its parent and its batch.
//!
//! Everything here is a pure function of the stored messages, so the
//! validator and the header builder compute exactly the same values.
use merkle::Hash160;
use std::collections::BTreeSet;
use std::convert::TryFrom;

use crate::batch::CreditBatch;
use crate::config::LedgerConfig;
use crate::credit::CreditInBatch;
use crate::diurn::DiurnalBlock;
use crate::errors::{LedgerError, MissingData};
use crate::header::{HeaderMessage, LedgerHeader};
use crate::spentchain::SpentChain;
use crate::store::{Message, MessageStore};
use crate::transaction::Transaction;
use crate::work::{adjust_diurnal_difficulty, retarget, ProofOfWork, Work, DIURN_RETARGET_STEPS};

/// Read-only view of the stored messages under the network rules.
pub struct LedgerRules<'a, S: MessageStore, P: ProofOfWork> {
    store: &'a S,
    pow: &'a P,
    config: &'a LedgerConfig,
}

/// Credits a header issues, rebuilt from its message list.
#[derive(Clone, Debug)]
pub struct ReconstructedBatch {
    /// The batch.
    pub batch: CreditBatch,
    /// False if some listed credit duplicated another one and was left out.
    pub unique: bool,
    /// Ledger positions spent by the listed transactions.
    pub spent: BTreeSet<u64>,
    /// Ids of the listed header messages.
    pub listed_headers: Vec<Hash160>,
    /// The listed transactions.
    pub transactions: Vec<Transaction>,
}

impl<'a, S: MessageStore, P: ProofOfWork> LedgerRules<'a, S, P> {
    /// Creates a view over the store.
    pub fn new(store: &'a S, pow: &'a P, config: &'a LedgerConfig) -> Self {
        LedgerRules { store, pow, config }
    }

    /// Network parameters.
    pub fn config(&self) -> &LedgerConfig {
        self.config
    }

    /// The underlying message store.
    pub fn store(&self) -> &S {
        self.store
    }

    /// Proof-of-work capability.
    pub fn pow(&self) -> &P {
        self.pow
    }

    /// Header message by id. The zero id stands for the empty parent of the first header.
    pub fn header_message(&self, id: &Hash160) -> Result<HeaderMessage, MissingData> {
        if id.is_zero() {
            return Ok(HeaderMessage::default());
        }
        self.store
            .header_message(id)
            .ok_or(MissingData::Header(*id))
    }

    /// A header is a calend when its proof reaches its diurnal difficulty.
    pub fn is_calend(&self, msg: &HeaderMessage) -> bool {
        let diurnal_difficulty = msg.header().diurnal_difficulty;
        diurnal_difficulty != 0 && self.pow.difficulty_achieved(&msg.proof) >= diurnal_difficulty
    }

    /// Difficulty required of the child of `parent`.
    /// Needs the grandparent to measure the last interval.
    pub fn next_difficulty(&self, parent: &HeaderMessage) -> Result<Work, MissingData> {
        let header = parent.header();
        if header.difficulty == 0 {
            return Ok(self.config.network.initial_difficulty());
        }
        let grandparent = self.header_message(&header.previous_header_hash)?;
        let interval = header
            .timestamp
            .saturating_sub(grandparent.header().timestamp);
        Ok(retarget(
            header.difficulty,
            interval,
            self.config.network.target_batch_interval_us,
        ))
    }

    /// Diurnal difficulty required of the child of `parent`.
    ///
    /// Eases by one step with every header. After a calend the steps taken
    /// during the diurn it closes are undone, and the difficulty moves by
    /// `DIURN_RETARGET_STEPS`: easier if the diurn took longer than the
    /// target, harder otherwise. The first diurn is measured from the empty
    /// parent of the first header.
    pub fn next_diurnal_difficulty(&self, parent: &HeaderMessage) -> Result<Work, MissingData> {
        let header = parent.header();
        if header.diurnal_difficulty == 0 {
            return Ok(self.config.network.initial_diurnal_difficulty());
        }
        if !self.is_calend(parent) {
            return Ok(adjust_diurnal_difficulty(header.diurnal_difficulty, 1));
        }
        let previous_calend = self.header_message(&header.previous_calend_hash)?;
        let since = previous_calend.header();
        let duration = header.timestamp.saturating_sub(since.timestamp);
        let retarget_steps = if duration > self.config.network.target_diurn_length_us {
            DIURN_RETARGET_STEPS
        } else {
            -DIURN_RETARGET_STEPS
        };
        let block_steps = header
            .batch_number
            .saturating_sub(since.batch_number)
            .saturating_sub(1);
        let block_steps = i64::try_from(block_steps).unwrap_or(i64::max_value());
        Ok(adjust_diurnal_difficulty(
            header.diurnal_difficulty,
            retarget_steps.saturating_sub(block_steps),
        ))
    }

    /// `previous_diurn_root` of the child of `parent`.
    pub fn next_previous_diurn_root(&self, parent: &HeaderMessage) -> Hash160 {
        if self.is_calend(parent) {
            parent.header().diurn_root()
        } else {
            parent.header().previous_diurn_root
        }
    }

    /// `previous_calend_hash` of the child of `parent`.
    pub fn next_previous_calend_hash(&self, parent_id: &Hash160, parent: &HeaderMessage) -> Hash160 {
        if self.is_calend(parent) {
            *parent_id
        } else {
            parent.header().previous_calend_hash
        }
    }

    /// Mined-credit hashes from the most recent calend up to and including `parent_id`.
    pub fn diurnal_block_hashes(&self, parent_id: &Hash160) -> Result<Vec<Hash160>, MissingData> {
        let mut hashes = Vec::new();
        let mut id = *parent_id;
        while !id.is_zero() {
            let msg = self.header_message(&id)?;
            hashes.push(msg.mined_credit.hash());
            if self.is_calend(&msg) {
                break;
            }
            id = msg.header().previous_header_hash;
        }
        hashes.reverse();
        Ok(hashes)
    }

    /// `diurnal_block_root` of the child of `parent_id`.
    pub fn next_diurnal_block_root(&self, parent_id: &Hash160) -> Result<Hash160, MissingData> {
        let block = DiurnalBlock::from_hashes(self.diurnal_block_hashes(parent_id)?);
        Ok(block.root())
    }

    /// Every header field of the child of `parent_id` that does not depend on its batch.
    pub fn succeeding_header(
        &self,
        parent_id: &Hash160,
        timestamp: u64,
    ) -> Result<LedgerHeader, MissingData> {
        let parent = self.header_message(parent_id)?;
        let p = parent.header();
        Ok(LedgerHeader {
            previous_header_hash: *parent_id,
            batch_offset: p.spent_chain_length(),
            difficulty: self.next_difficulty(&parent)?,
            diurnal_difficulty: self.next_diurnal_difficulty(&parent)?,
            previous_diurn_root: self.next_previous_diurn_root(&parent),
            diurnal_block_root: self.next_diurnal_block_root(parent_id)?,
            timestamp,
            batch_number: p.batch_number + 1,
            previous_total_work: p.total_work(),
            previous_calend_hash: self.next_previous_calend_hash(parent_id, &parent),
            network_id: self.config.network.network_id,
            ..Default::default()
        })
    }

    /// Copy of the message with its list expanded to full hashes.
    pub fn recovered(&self, msg: &HeaderMessage) -> Result<HeaderMessage, MissingData> {
        let mut recovered = msg.clone();
        if !recovered.hash_list.is_recovered() {
            recovered
                .hash_list
                .recover_full_hashes(self.store, &self.config.short_hashes)
                .map_err(|e| MissingData::MessageList(msg.id(), e))?;
        }
        Ok(recovered)
    }

    /// Full hashes of the messages the header lists, recovering them if needed.
    pub fn message_list(&self, msg: &HeaderMessage) -> Result<Vec<Hash160>, MissingData> {
        if msg.hash_list.is_recovered() {
            return Ok(msg.hash_list.full_hashes().to_vec());
        }
        Ok(self.recovered(msg)?.hash_list.full_hashes().to_vec())
    }

    /// Ids of the transactions the header lists.
    pub fn listed_transactions(&self, id: &Hash160) -> Result<Vec<Hash160>, MissingData> {
        let msg = self.header_message(id)?;
        Ok(self
            .message_list(&msg)?
            .into_iter()
            .filter(|m| self.store.transaction(m).is_some())
            .collect())
    }

    /// Rebuilds the batch of a child of `parent_id` from the listed messages.
    /// Its first credit gets ledger position `offset`.
    pub fn reconstruct_batch(
        &self,
        parent_id: &Hash160,
        offset: u64,
        message_ids: &[Hash160],
    ) -> Result<ReconstructedBatch, MissingData> {
        let mut result = ReconstructedBatch {
            batch: CreditBatch::new(*parent_id, offset),
            unique: true,
            spent: BTreeSet::new(),
            listed_headers: Vec::new(),
            transactions: Vec::new(),
        };
        for id in message_ids {
            match self.store.message(id).ok_or(MissingData::Message(*id))? {
                Message::Header(msg) => {
                    result.unique &= result.batch.add(msg.mined_credit.credit);
                    result.listed_headers.push(*id);
                }
                Message::Transaction(tx) => {
                    result.unique &= result.batch.add_credits(&tx.outputs);
                    result.spent.extend(tx.input_positions());
                    result.transactions.push(tx);
                }
            }
        }
        Ok(result)
    }

    /// Returns true if a child of `parent_id` may list the header `listed`.
    ///
    /// Besides the parent itself, a child may list a sibling of its parent
    /// that carries a sufficient proof of work and that the parent does not
    /// list already. Its mined credit is then issued by the child's batch.
    pub fn is_includable(
        &self,
        listed: &Hash160,
        parent_id: &Hash160,
        parent: &HeaderMessage,
    ) -> Result<bool, MissingData> {
        if listed == parent_id {
            return Ok(true);
        }
        let p = parent.header();
        if p.batch_number == 0 {
            return Ok(false);
        }
        let uncle = self.header_message(listed)?;
        let u = uncle.header();
        let sibling = u.previous_header_hash == p.previous_header_hash
            && u.batch_number == p.batch_number
            && u.network_id == self.config.network.network_id;
        let proven = u.difficulty == p.difficulty
            && uncle.proof.seed == uncle.mined_credit.seed()
            && self.pow.difficulty_achieved(&uncle.proof) >= u.difficulty;
        if !(sibling && proven) {
            return Ok(false);
        }
        Ok(!self.message_list(parent)?.contains(listed))
    }

    /// Ledger positions spent by the transactions a header lists.
    pub fn spent_positions(&self, msg: &HeaderMessage) -> Result<BTreeSet<u64>, MissingData> {
        let mut spent = BTreeSet::new();
        for id in self.message_list(msg)? {
            if let Message::Transaction(tx) = self.store.message(&id).ok_or(MissingData::Message(id))? {
                spent.extend(tx.input_positions());
            }
        }
        Ok(spent)
    }

    /// Height of the header; zero for the empty parent.
    pub fn batch_number(&self, id: &Hash160) -> Result<u64, MissingData> {
        Ok(self.header_message(id)?.header().batch_number)
    }

    /// Most recent common ancestor of two headers, zero if they share none.
    pub fn find_fork(&self, a: &Hash160, b: &Hash160) -> Result<Hash160, MissingData> {
        let (mut a, mut b) = (*a, *b);
        let (mut height_a, mut height_b) = (self.batch_number(&a)?, self.batch_number(&b)?);
        while a != b {
            if height_a >= height_b {
                a = self.header_message(&a)?.header().previous_header_hash;
                height_a = self.batch_number(&a)?;
            } else {
                b = self.header_message(&b)?.header().previous_header_hash;
                height_b = self.batch_number(&b)?;
            }
        }
        Ok(a)
    }

    /// Header ids after `fork` up to and including `tip`, oldest first.
    pub fn branch(&self, fork: &Hash160, tip: &Hash160) -> Result<Vec<Hash160>, MissingData> {
        let mut ids = Vec::new();
        let mut id = *tip;
        while id != *fork && !id.is_zero() {
            ids.push(id);
            id = self.header_message(&id)?.header().previous_header_hash;
        }
        ids.reverse();
        Ok(ids)
    }

    /// Returns true if `ancestor` is `descendant` or one of its ancestors.
    pub fn is_ancestor(&self, ancestor: &Hash160, descendant: &Hash160) -> Result<bool, MissingData> {
        let height = self.batch_number(ancestor)?;
        let mut id = *descendant;
        loop {
            if id == *ancestor {
                return Ok(true);
            }
            let msg = self.header_message(&id)?;
            if msg.header().batch_number <= height {
                return Ok(false);
            }
            id = msg.header().previous_header_hash;
        }
    }

    /// Spent chain as of `target`, derived from the spent chain as of `current`
    /// by undoing the spends after their fork and applying those on the way to `target`.
    pub fn spent_chain_at(
        &self,
        chain: &SpentChain,
        current: &Hash160,
        target: &Hash160,
    ) -> Result<SpentChain, MissingData> {
        if current == target {
            return Ok(chain.clone());
        }
        let fork = self.find_fork(current, target)?;
        let mut undone = BTreeSet::new();
        for id in self.branch(&fork, current)? {
            undone.extend(self.spent_positions(&self.header_message(&id)?)?);
        }
        let mut applied = BTreeSet::new();
        for id in self.branch(&fork, target)? {
            applied.extend(self.spent_positions(&self.header_message(&id)?)?);
        }
        let length = self.header_message(target)?.header().spent_chain_length();
        let mut result = chain.clone();
        result.set_length(length);
        for position in undone {
            result.clear(position);
        }
        for position in applied {
            result.set(position);
        }
        Ok(result)
    }

    /// Header at or before `tip` whose batch issued the input.
    ///
    /// The store indexes every header it holds, validated or not; only
    /// ancestors of `tip` count, and those were validated before it.
    pub fn anchoring_header(
        &self,
        input: &CreditInBatch,
        tip: &Hash160,
    ) -> Result<Option<Hash160>, MissingData> {
        let root = match input.batch_root() {
            Some(root) => root,
            None => return Ok(None),
        };
        for id in self.store.headers_with_batch_root(root) {
            let header = self.header_message(&id)?.mined_credit.header;
            if header.covers(input.position()) && self.is_ancestor(&id, tip)? {
                return Ok(Some(id));
            }
        }
        Ok(None)
    }

    /// Checks that the transaction can be included in a child of `tip`:
    /// well-formed, every input issued on this chain, unspent in `chain`
    /// and not among the positions in `taken`.
    pub fn check_spendable(
        &self,
        tx: &Transaction,
        tip: &Hash160,
        chain: &SpentChain,
        taken: &BTreeSet<u64>,
    ) -> Result<(), LedgerError> {
        tx.check(self.config.network.max_outputs_per_transaction)?;
        for input in tx.inputs.iter() {
            let position = input.position();
            if chain.get(position) || taken.contains(&position) {
                return Err(LedgerError::DoubleSpend(position));
            }
            if position >= chain.len() || self.anchoring_header(input, tip)?.is_none() {
                return Err(LedgerError::UnknownBatch(position));
            }
        }
        Ok(())
    }
}
