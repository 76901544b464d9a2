//! The ledger node state: header acceptance, fork choice and transaction admission.
use merkle::Hash160;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, info, warn};

use crate::batch::CreditBatch;
use crate::config::LedgerConfig;
use crate::credit::{Credit, CreditInBatch, PublicKey};
use crate::diurn::Calendar;
use crate::errors::{LedgerError, MissingData};
use crate::header::{HeaderMessage, LedgerHeader, MinedCredit};
use crate::mempool::Mempool;
use crate::rules::LedgerRules;
use crate::shorthash::ShortHashList;
use crate::spentchain::SpentChain;
use crate::store::{Message, MessageStore};
use crate::transaction::Transaction;
use crate::validator::{ChainValidator, Check, Validation, ValidationReport};
use crate::work::{ProofOfWork, Work};

/// Where a header stands with respect to the main chain.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeaderStatus {
    /// Waiting for its parent or for data it lists.
    Unvalidated,
    /// Valid and part of the main chain.
    Accepted,
    /// Valid but on a chain with less work.
    Superseded,
    /// Failed validation, or descends from a header that did.
    Rejected,
}

/// Result of handing a header to the ledger.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HeaderOutcome {
    /// The header was already processed.
    Known(HeaderStatus),
    /// The header is kept until the data becomes available.
    Deferred(MissingData),
    /// The header failed the listed checks.
    Rejected(ValidationReport),
    /// The header is valid and now the main chain goes through it.
    Accepted,
    /// The header is valid but its chain has less work than the main chain.
    Superseded,
}

/// Snapshot of the main chain.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainState {
    /// Id of the last header; zero before the first header.
    pub tip: Hash160,
    /// The last header.
    pub header: LedgerHeader,
    /// Spent chain as of the last header.
    pub spent_chain: SpentChain,
}

impl ChainState {
    /// Total work of the main chain.
    pub fn total_work(&self) -> Work {
        self.header.total_work()
    }
}

/// Ledger node: validates headers, follows the chain with the most work
/// and keeps the pending transactions consistent with it.
pub struct Ledger<S: MessageStore, P: ProofOfWork> {
    config: LedgerConfig,
    store: S,
    pow: P,
    state: ChainState,
    statuses: HashMap<Hash160, HeaderStatus>,
    by_work: BTreeMap<Work, Vec<Hash160>>,
    waiting: HashMap<Hash160, Vec<Hash160>>,
    deferred: Vec<Hash160>,
    mempool: Mempool,
}

impl<S: MessageStore, P: ProofOfWork> Ledger<S, P> {
    /// Creates a ledger with no headers.
    pub fn new(config: LedgerConfig, store: S, pow: P) -> Self {
        Ledger {
            config,
            store,
            pow,
            state: ChainState::default(),
            statuses: HashMap::new(),
            by_work: BTreeMap::new(),
            waiting: HashMap::new(),
            deferred: Vec::new(),
            mempool: Mempool::new(),
        }
    }

    /// Network parameters.
    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Message store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Rules evaluated against this ledger's store.
    pub fn rules(&self) -> LedgerRules<'_, S, P> {
        LedgerRules::new(&self.store, &self.pow, &self.config)
    }

    /// Id of the main chain tip.
    pub fn tip(&self) -> Hash160 {
        self.state.tip
    }

    /// Header of the main chain tip.
    pub fn tip_header(&self) -> &LedgerHeader {
        &self.state.header
    }

    /// Spent chain as of the tip.
    pub fn spent_chain(&self) -> &SpentChain {
        &self.state.spent_chain
    }

    /// Copy of the main chain state.
    pub fn snapshot(&self) -> ChainState {
        self.state.clone()
    }

    /// Pending transactions.
    pub fn mempool(&self) -> &Mempool {
        &self.mempool
    }

    /// Status of a header handed to the ledger.
    pub fn status(&self, id: &Hash160) -> Option<HeaderStatus> {
        self.statuses.get(id).cloned()
    }

    /// Headers waiting for data other than their parent.
    pub fn deferred(&self) -> &[Hash160] {
        &self.deferred
    }

    /// Calendar of the main chain.
    pub fn calendar(&self) -> Result<Calendar, MissingData> {
        Calendar::new(&self.rules(), &self.state.tip)
    }

    /// Spent chain as of any validated header.
    pub fn spent_chain_at(&self, id: &Hash160) -> Result<SpentChain, MissingData> {
        self.rules()
            .spent_chain_at(&self.state.spent_chain, &self.state.tip, id)
    }

    /// Proof that a credit was issued by the header's batch.
    pub fn credit_in_batch(
        &self,
        header_id: &Hash160,
        credit: &Credit,
    ) -> Result<Option<CreditInBatch>, MissingData> {
        let rules = self.rules();
        let msg = rules.header_message(header_id)?;
        let ids = rules.message_list(&msg)?;
        let header = msg.header();
        let mut rebuilt =
            rules.reconstruct_batch(&header.previous_header_hash, header.batch_offset, &ids)?;
        Ok(rebuilt.batch.credit_in_batch(credit))
    }

    /// Stores a message without processing it.
    /// Used to supply data that deferred headers are waiting for.
    pub fn store_message(&mut self, message: Message) -> Hash160 {
        self.store.store_message(message)
    }

    /// Validates a header and updates the main chain.
    ///
    /// Headers whose parent is not yet validated wait for it and are
    /// processed as soon as it is. `now` is the local time in microseconds.
    pub fn handle_header(&mut self, msg: HeaderMessage, now: u64) -> HeaderOutcome {
        let id = msg.id();
        match self.status(&id) {
            Some(HeaderStatus::Unvalidated) | None => {}
            Some(status) => return HeaderOutcome::Known(status),
        }
        self.store.store_message(Message::Header(msg));
        self.process(id, now)
    }

    /// Processes the deferred headers again, after the missing data was stored.
    pub fn retry_deferred(&mut self, now: u64) -> Vec<(Hash160, HeaderOutcome)> {
        let ids = self.deferred.clone();
        let mut outcomes = Vec::with_capacity(ids.len());
        for id in ids {
            let outcome = self.process(id, now);
            outcomes.push((id, outcome));
        }
        outcomes
    }

    /// Admits a transaction into the pending pool if it can extend the main chain.
    pub fn submit_transaction(&mut self, tx: Transaction) -> Result<Hash160, LedgerError> {
        let id = tx.id();
        if self.mempool.contains(&id) {
            return Ok(id);
        }
        self.rules().check_spendable(
            &tx,
            &self.state.tip,
            &self.state.spent_chain,
            self.mempool.spent_positions(),
        )?;
        let positions: Vec<u64> = tx.input_positions().collect();
        self.store.store_message(Message::Transaction(tx));
        self.mempool.insert(id, positions);
        debug!(tx = %id, "transaction admitted");
        Ok(id)
    }

    /// Builds and mines a child of `parent_id` paying the mined credit to `payout`.
    ///
    /// Candidates are transaction ids or ids of siblings of the parent. The
    /// batch holds the parent's mined credit, the mined credits of includable
    /// siblings and the outputs of every transaction that can extend the
    /// parent; the other candidates are skipped.
    pub fn build_header(
        &mut self,
        parent_id: &Hash160,
        candidates: &[Hash160],
        payout: PublicKey,
        timestamp: u64,
    ) -> Result<HeaderMessage, LedgerError> {
        let rules = LedgerRules::new(&self.store, &self.pow, &self.config);
        let mut header = rules.succeeding_header(parent_id, timestamp)?;
        let parent = rules.header_message(parent_id)?;
        let parent_chain = rules.spent_chain_at(&self.state.spent_chain, &self.state.tip, parent_id)?;

        let mut ids = Vec::with_capacity(candidates.len() + 1);
        let mut batch = CreditBatch::new(*parent_id, header.batch_offset);
        if !parent_id.is_zero() {
            ids.push(*parent_id);
            batch.add(parent.mined_credit.credit.clone());
        }
        let mut spent = BTreeSet::new();
        for tx_id in candidates {
            let tx = match self.store.message(tx_id) {
                Some(Message::Transaction(tx)) => tx,
                Some(Message::Header(uncle)) => {
                    if rules.is_includable(tx_id, parent_id, &parent).unwrap_or(false)
                        && batch.add(uncle.mined_credit.credit)
                    {
                        ids.push(*tx_id);
                    } else {
                        debug!(header = %tx_id, "header left out of the batch");
                    }
                    continue;
                }
                None => continue,
            };
            if let Err(e) = rules.check_spendable(&tx, parent_id, &parent_chain, &spent) {
                debug!(tx = %tx_id, error = %e, "transaction left out of the batch");
                continue;
            }
            if !batch.add_credits(&tx.outputs) {
                debug!(tx = %tx_id, "transaction outputs already in the batch");
                continue;
            }
            spent.extend(tx.input_positions());
            ids.push(*tx_id);
        }

        header.batch_root = batch.root();
        header.batch_size = batch.len();
        let hash_list = ShortHashList::from_full_hashes(ids.clone());
        header.message_list_hash = hash_list.hash();
        header.spent_chain_hash = parent_chain.hash_different(
            spent.iter().cloned(),
            None::<u64>,
            header.spent_chain_length(),
        );

        let mined_credit = MinedCredit {
            credit: Credit::new(payout, self.config.network.mined_credit_amount),
            header,
        };
        let proof = self
            .pow
            .do_work(mined_credit.seed(), mined_credit.header.difficulty);
        self.store.record_known_solution(hash_list.hash(), ids);
        Ok(HeaderMessage {
            mined_credit,
            hash_list,
            proof,
        })
    }

    /// Builds a child of the tip from the pending transactions.
    pub fn build_next_header(
        &mut self,
        payout: PublicKey,
        timestamp: u64,
    ) -> Result<HeaderMessage, LedgerError> {
        let tip = self.state.tip;
        let candidates = self.mempool.transactions().to_vec();
        self.build_header(&tip, &candidates, payout, timestamp)
    }

    fn process(&mut self, id: Hash160, now: u64) -> HeaderOutcome {
        let outcome = self.process_one(id, now);
        let mut ready = match outcome {
            HeaderOutcome::Deferred(_) => Vec::new(),
            _ => self.waiting.remove(&id).unwrap_or_default(),
        };
        while let Some(child) = ready.pop() {
            if let HeaderOutcome::Deferred(_) = self.process_one(child, now) {
                continue;
            }
            ready.extend(self.waiting.remove(&child).unwrap_or_default());
        }
        outcome
    }

    fn process_one(&mut self, id: Hash160, now: u64) -> HeaderOutcome {
        match self.status(&id) {
            Some(HeaderStatus::Unvalidated) | None => {}
            Some(status) => return HeaderOutcome::Known(status),
        }
        let msg = match self.store.header_message(&id) {
            Some(msg) => msg,
            None => return HeaderOutcome::Deferred(MissingData::Header(id)),
        };
        self.statuses.insert(id, HeaderStatus::Unvalidated);

        let parent_id = msg.header().previous_header_hash;
        if !parent_id.is_zero() {
            match self.status(&parent_id) {
                Some(HeaderStatus::Accepted) | Some(HeaderStatus::Superseded) => {}
                Some(HeaderStatus::Rejected) => {
                    return self.reject(id, ValidationReport::failure(Check::ParentValid));
                }
                Some(HeaderStatus::Unvalidated) | None => {
                    let children = self.waiting.entry(parent_id).or_insert_with(Vec::new);
                    if !children.contains(&id) {
                        children.push(id);
                    }
                    debug!(header = %id, parent = %parent_id, "header waits for its parent");
                    return HeaderOutcome::Deferred(MissingData::Header(parent_id));
                }
            }
        }

        let validation = match self.spent_chain_at(&parent_id) {
            Ok(parent_chain) => ChainValidator::new(&self.rules()).validate(&msg, &parent_chain, now),
            Err(missing) => Validation::Deferred(missing),
        };
        match validation {
            Validation::Deferred(missing) => {
                if !self.deferred.contains(&id) {
                    self.deferred.push(id);
                }
                debug!(header = %id, %missing, "header deferred");
                HeaderOutcome::Deferred(missing)
            }
            Validation::Invalid(report) => self.reject(id, report),
            Validation::Valid(_) => {
                self.deferred.retain(|d| *d != id);
                // Keep the expanded list so later lookups skip the search.
                let recovered = self.rules().recovered(&msg);
                if let Ok(recovered) = recovered {
                    self.store.store_message(Message::Header(recovered));
                }
                self.statuses.insert(id, HeaderStatus::Superseded);
                self.by_work
                    .entry(msg.header().total_work())
                    .or_insert_with(Vec::new)
                    .push(id);
                if let Err(missing) = self.choose_tip() {
                    warn!(header = %id, %missing, "main chain not updated");
                }
                match self.status(&id) {
                    Some(HeaderStatus::Accepted) => HeaderOutcome::Accepted,
                    _ => HeaderOutcome::Superseded,
                }
            }
        }
    }

    fn reject(&mut self, id: Hash160, report: ValidationReport) -> HeaderOutcome {
        warn!(header = %id, failed = ?report.failed(), "header rejected");
        self.deferred.retain(|d| *d != id);
        self.statuses.insert(id, HeaderStatus::Rejected);
        HeaderOutcome::Rejected(report)
    }

    // The earliest header with the most work wins; ties keep the current tip.
    fn choose_tip(&mut self) -> Result<(), MissingData> {
        let current_work = self.state.total_work();
        let best = self
            .by_work
            .iter()
            .next_back()
            .filter(|(work, _)| **work > current_work)
            .and_then(|(_, ids)| ids.first().cloned());
        match best {
            Some(id) => self.switch_tip(id),
            None => Ok(()),
        }
    }

    fn switch_tip(&mut self, new_tip: Hash160) -> Result<(), MissingData> {
        let old_tip = self.state.tip;
        let rules = LedgerRules::new(&self.store, &self.pow, &self.config);
        let fork = rules.find_fork(&old_tip, &new_tip)?;
        let abandoned = rules.branch(&fork, &old_tip)?;
        let adopted = rules.branch(&fork, &new_tip)?;
        let spent_chain = rules.spent_chain_at(&self.state.spent_chain, &old_tip, &new_tip)?;
        let header = rules.header_message(&new_tip)?.mined_credit.header;

        let mut unbound = Vec::new();
        for id in abandoned.iter() {
            unbound.extend(rules.listed_transactions(id)?);
        }
        let mut included = BTreeSet::new();
        for id in adopted.iter() {
            included.extend(rules.listed_transactions(id)?);
        }
        let dropped = self
            .mempool
            .rebind(&rules, &new_tip, &spent_chain, &included, &unbound);

        for id in abandoned.iter() {
            self.statuses.insert(*id, HeaderStatus::Superseded);
        }
        for id in adopted.iter() {
            self.statuses.insert(*id, HeaderStatus::Accepted);
        }
        if fork == old_tip {
            info!(tip = %new_tip, batch_number = header.batch_number, "main chain extended");
        } else {
            info!(
                tip = %new_tip,
                fork = %fork,
                abandoned = abandoned.len(),
                unbound = unbound.len(),
                "main chain switched"
            );
        }
        if !dropped.is_empty() {
            debug!(count = dropped.len(), "pending transactions dropped");
        }
        self.state = ChainState {
            tip: new_tip,
            header,
            spent_chain,
        };
        Ok(())
    }
}
