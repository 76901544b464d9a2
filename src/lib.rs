#![deny(missing_docs)]
//! Ledger core of a credit network.
//!
//! Headers commit to batches of credits through authenticated trees,
//! to the spent/unspent state of every ledger position through the spent
//! chain, and to the history of the chain through diurns and calends.
//! The [`Ledger`] validates relayed headers, follows the chain with the
//! most work and keeps pending transactions consistent with it.

mod batch;
mod chain;
mod config;
mod credit;
mod diurn;
mod errors;
mod header;
mod mempool;
mod rules;
mod shorthash;
mod spentchain;
mod store;
mod transaction;
mod validator;
mod work;


pub use merkle::{
    combine, symmetric_combine, verify_branch, AuthenticatedTree, Combination, Hash160, Hash256,
    OrderedAccumulator,
};

pub use self::batch::CreditBatch;
pub use self::chain::{ChainState, HeaderOutcome, HeaderStatus, Ledger};
pub use self::config::{LedgerConfig, Network, Validation as ValidationConfig};
pub use self::credit::{Credit, CreditInBatch, InclusionProof, PublicKey};
pub use self::diurn::{Calendar, Diurn, DiurnalBlock};
pub use self::errors::{LedgerError, MissingData, TransactionError};
pub use self::header::{HeaderMessage, LedgerHeader, MinedCredit};
pub use self::mempool::Mempool;
pub use self::rules::{LedgerRules, ReconstructedBatch};
pub use self::shorthash::{
    short_hash, FullHash, HashIndex, RecoveryError, ShortHashLimits, ShortHashList,
    MAX_HASH_COMBINATIONS, MAX_HASH_ENTRIES,
};
pub use self::spentchain::SpentChain;
pub use self::store::{MemoryStore, Message, MessageStore};
pub use self::transaction::Transaction;
pub use self::validator::{ChainValidator, Check, Validation, ValidationReport};
pub use self::work::{
    adjust_diurnal_difficulty, retarget, ClaimedWork, ProofOfWork, SpotCheck, Work, WorkProof,
    DIURN_RETARGET_STEPS,
};
