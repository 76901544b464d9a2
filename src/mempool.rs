//! Pool of accepted transactions not yet in the main chain.
use merkle::Hash160;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

use crate::rules::LedgerRules;
use crate::spentchain::SpentChain;
use crate::store::MessageStore;
use crate::work::ProofOfWork;

/// Implements a pool of unconfirmed (not-in-the-main-chain) transactions.
///
/// Transactions are kept in acceptance order and never spend the same
/// position twice.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Mempool {
    transactions: Vec<Hash160>,
    spent: BTreeSet<u64>,
}

impl Mempool {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Mempool::default()
    }

    /// Returns the size of the mempool in number of transactions.
    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    /// Returns true if the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Transaction ids in acceptance order.
    pub fn transactions(&self) -> &[Hash160] {
        &self.transactions
    }

    /// Returns true if the transaction is pending.
    pub fn contains(&self, id: &Hash160) -> bool {
        self.transactions.contains(id)
    }

    /// Positions spent by pending transactions.
    pub fn spent_positions(&self) -> &BTreeSet<u64> {
        &self.spent
    }

    /// Adds a transaction that was checked against the current tip.
    pub fn insert(&mut self, id: Hash160, inputs: impl IntoIterator<Item = u64>) {
        self.spent.extend(inputs);
        self.transactions.push(id);
    }

    /// Updates the pool after the main chain moved to `tip`.
    ///
    /// Transactions now in the main chain (`included`) leave the pool.
    /// Transactions that were only on the abandoned branch (`unbound`) return to it.
    /// Every remaining transaction is checked again against `chain`, the spent
    /// chain as of `tip`, and dropped if it no longer applies.
    /// Returns the dropped ids.
    pub fn rebind<S: MessageStore, P: ProofOfWork>(
        &mut self,
        rules: &LedgerRules<S, P>,
        tip: &Hash160,
        chain: &SpentChain,
        included: &BTreeSet<Hash160>,
        unbound: &[Hash160],
    ) -> Vec<Hash160> {
        let mut candidates: Vec<Hash160> = Vec::with_capacity(unbound.len() + self.len());
        for id in unbound.iter().chain(self.transactions.iter()) {
            if !included.contains(id) && !candidates.contains(id) {
                candidates.push(*id);
            }
        }

        let mut kept = Mempool::new();
        let mut dropped = Vec::new();
        for id in candidates {
            let spendable = rules.store().transaction(&id).map(|tx| {
                let ok = rules.check_spendable(&tx, tip, chain, &kept.spent).is_ok();
                (tx, ok)
            });
            match spendable {
                Some((tx, true)) => kept.insert(id, tx.input_positions()),
                _ => {
                    debug!(tx = %id, "pending transaction dropped");
                    dropped.push(id);
                }
            }
        }
        *self = kept;
        dropped
    }
}
