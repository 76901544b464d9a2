//! Consensus checks of a header against its parent.
use merkle::Hash160;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, warn};

use crate::errors::{LedgerError, MissingData};
use crate::header::HeaderMessage;
use crate::rules::LedgerRules;
use crate::spentchain::SpentChain;
use crate::store::MessageStore;
use crate::work::ProofOfWork;

/// Individual consensus checks.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Check {
    /// The parent header was not rejected.
    ParentValid,
    /// Header belongs to the configured network.
    NetworkId,
    /// Mined credit has the configured amount.
    MinedAmount,
    /// Height is one more than the parent's.
    BatchNumber,
    /// Previous total work is the parent's total work.
    PreviousTotalWork,
    /// Difficulty follows the retarget rule.
    Difficulty,
    /// Diurnal difficulty follows the retarget rule.
    DiurnalDifficulty,
    /// Batch starts where the parent's spent chain ends.
    BatchOffset,
    /// Timestamp is later than the parent's.
    TimestampAfterParent,
    /// Timestamp is not too far in the future.
    TimestampNotInFuture,
    /// Previous diurn root follows the parent.
    PreviousDiurnRoot,
    /// Previous calend hash follows the parent.
    PreviousCalendHash,
    /// Diurnal block root covers the credits since the last calend.
    DiurnalBlockRoot,
    /// Batch root matches the listed messages.
    BatchRoot,
    /// Batch size matches the listed messages.
    BatchSize,
    /// Listed messages issue no credit twice.
    UniqueCredits,
    /// Listed transactions are valid and spend unspent credits of this chain.
    TransactionInputs,
    /// Spent chain hash matches the parent's chain plus this batch.
    SpentChainHash,
    /// Message list hash matches the short-hash list.
    MessageListHash,
    /// The parent is listed; any other listed header is an includable sibling of the parent.
    ChainLinkage,
    /// Proof of work is on this mined credit and reaches the difficulty.
    ProofOfWork,
    /// Proof of work passes a spot check.
    SpotCheck,
}

/// Outcome of every check of one header.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    failed: Vec<Check>,
    skipped: Vec<Check>,
}

impl ValidationReport {
    /// Report with a single failed check.
    pub fn failure(check: Check) -> Self {
        ValidationReport {
            failed: vec![check],
            skipped: Vec::new(),
        }
    }

    /// Returns true if no check failed.
    pub fn passed(&self) -> bool {
        self.failed.is_empty()
    }

    /// Checks that failed.
    pub fn failed(&self) -> &[Check] {
        &self.failed
    }

    /// Checks skipped because the history they need is not available.
    pub fn skipped(&self) -> &[Check] {
        &self.skipped
    }

    /// Returns true if the check failed.
    pub fn has_failed(&self, check: Check) -> bool {
        self.failed.contains(&check)
    }

    fn record(&mut self, check: Check, ok: bool) {
        if !ok {
            debug!(?check, "check failed");
            self.failed.push(check);
        }
    }

    fn record_if_known(&mut self, check: Check, outcome: Result<bool, MissingData>) {
        match outcome {
            Ok(ok) => self.record(check, ok),
            Err(missing) => {
                debug!(?check, %missing, "check skipped");
                self.skipped.push(check);
            }
        }
    }
}

/// Result of validating a header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Validation {
    /// Every check passed; the report lists skipped checks.
    Valid(ValidationReport),
    /// Some checks failed.
    Invalid(ValidationReport),
    /// Validation cannot proceed until the data is available.
    Deferred(MissingData),
}

/// Checks candidate headers against their parents.
pub struct ChainValidator<'r, 'a, S: MessageStore, P: ProofOfWork> {
    rules: &'r LedgerRules<'a, S, P>,
}

impl<'r, 'a, S: MessageStore, P: ProofOfWork> ChainValidator<'r, 'a, S, P> {
    /// Creates a validator using the rules' store and parameters.
    pub fn new(rules: &'r LedgerRules<'a, S, P>) -> Self {
        ChainValidator { rules }
    }

    /// Runs every check of `msg` given the spent chain as of its parent.
    ///
    /// `now` is the local time in microseconds.
    pub fn validate(&self, msg: &HeaderMessage, parent_chain: &SpentChain, now: u64) -> Validation {
        match self.run_checks(msg, parent_chain, now) {
            Ok(report) if report.passed() => Validation::Valid(report),
            Ok(report) => Validation::Invalid(report),
            Err(missing) => Validation::Deferred(missing),
        }
    }

    fn run_checks(
        &self,
        msg: &HeaderMessage,
        parent_chain: &SpentChain,
        now: u64,
    ) -> Result<ValidationReport, MissingData> {
        let rules = self.rules;
        let config = rules.config();
        let header = msg.header();
        let parent_id = header.previous_header_hash;
        let parent = rules.header_message(&parent_id)?;
        let p = parent.header();
        let message_ids = rules.message_list(msg)?;
        let mut reconstructed =
            rules.reconstruct_batch(&parent_id, p.spent_chain_length(), &message_ids)?;
        let inputs_ok = self.transaction_inputs_valid(&reconstructed.transactions, &parent_id, parent_chain)?;

        let mut report = ValidationReport::default();
        report.record(Check::NetworkId, header.network_id == config.network.network_id);
        report.record(
            Check::MinedAmount,
            msg.mined_credit.credit.amount == config.network.mined_credit_amount,
        );
        report.record(
            Check::BatchNumber,
            header.batch_number > 0 && header.batch_number == p.batch_number + 1,
        );
        report.record(
            Check::PreviousTotalWork,
            header.previous_total_work == p.total_work(),
        );
        report.record_if_known(
            Check::Difficulty,
            rules.next_difficulty(&parent).map(|d| d == header.difficulty),
        );
        report.record_if_known(
            Check::DiurnalDifficulty,
            rules
                .next_diurnal_difficulty(&parent)
                .map(|d| d == header.diurnal_difficulty),
        );
        report.record(Check::BatchOffset, header.batch_offset == p.spent_chain_length());
        report.record(Check::TimestampAfterParent, header.timestamp > p.timestamp);
        report.record(
            Check::TimestampNotInFuture,
            header.timestamp < now.saturating_add(config.validation.timestamp_leeway_us),
        );
        report.record(
            Check::PreviousDiurnRoot,
            header.previous_diurn_root == rules.next_previous_diurn_root(&parent),
        );
        report.record(
            Check::PreviousCalendHash,
            header.previous_calend_hash == rules.next_previous_calend_hash(&parent_id, &parent),
        );
        report.record_if_known(
            Check::DiurnalBlockRoot,
            rules
                .next_diurnal_block_root(&parent_id)
                .map(|root| root == header.diurnal_block_root),
        );
        report.record(
            Check::BatchRoot,
            reconstructed.batch.root() == header.batch_root,
        );
        report.record(
            Check::BatchSize,
            reconstructed.batch.len() == header.batch_size,
        );
        report.record(Check::UniqueCredits, reconstructed.unique);
        report.record(Check::TransactionInputs, inputs_ok);

        let new_length = p.spent_chain_length().saturating_add(reconstructed.batch.len());
        let spent_chain_hash = parent_chain.hash_different(
            reconstructed.spent.iter().cloned(),
            None::<u64>,
            new_length,
        );
        report.record(Check::SpentChainHash, spent_chain_hash == header.spent_chain_hash);
        report.record(
            Check::MessageListHash,
            header.message_list_hash == msg.hash_list.hash(),
        );

        let mut linked = if header.batch_number == 1 {
            parent_id.is_zero() && reconstructed.listed_headers.is_empty()
        } else {
            reconstructed.listed_headers.contains(&parent_id)
        };
        for listed in reconstructed.listed_headers.iter() {
            linked &= rules.is_includable(listed, &parent_id, &parent)?;
        }
        report.record(Check::ChainLinkage, linked);

        let pow = rules.pow();
        report.record(
            Check::ProofOfWork,
            msg.proof.seed == msg.mined_credit.seed()
                && pow.difficulty_achieved(&msg.proof) >= header.difficulty,
        );
        if config.validation.spot_checks {
            let spot_check = pow.spot_check(&msg.proof);
            if !spot_check.is_valid() {
                warn!(header = %msg.id(), "proof of work failed a spot check");
            }
            report.record(Check::SpotCheck, spot_check.is_valid());
        }
        Ok(report)
    }

    // Transactions are checked against the parent's chain in list order,
    // so two of them cannot spend the same position.
    fn transaction_inputs_valid(
        &self,
        transactions: &[crate::transaction::Transaction],
        parent_id: &Hash160,
        parent_chain: &SpentChain,
    ) -> Result<bool, MissingData> {
        let mut taken = BTreeSet::new();
        for tx in transactions {
            match self
                .rules
                .check_spendable(tx, parent_id, parent_chain, &taken)
            {
                Ok(()) => taken.extend(tx.input_positions()),
                Err(LedgerError::MissingData(missing)) => return Err(missing),
                Err(e) => {
                    debug!(tx = %tx.id(), error = %e, "listed transaction is not spendable");
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }
}
