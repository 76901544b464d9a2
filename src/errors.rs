use merkle::Hash160;
use readerwriter::ReadError;
use thiserror::Error;

use crate::shorthash::RecoveryError;

/// Ledger error conditions.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Data needed to complete the operation is not available locally.
    #[error("Required data is missing: {0}")]
    MissingData(MissingData),

    /// Transaction is malformed or does not balance.
    #[error("Transaction is invalid: {0}")]
    InvalidTransaction(TransactionError),

    /// Transaction input is already spent on the main chain or by a pending transaction.
    #[error("Credit at position {0} is already spent")]
    DoubleSpend(u64),

    /// Transaction input refers to a batch that is not on the main chain.
    #[error("Credit at position {0} is not anchored in the main chain")]
    UnknownBatch(u64),

    /// Transaction output duplicates a credit already issued in the same batch.
    #[error("Credit is already present in the batch")]
    DuplicateCredit,

    /// Message could not be decoded.
    #[error("Message could not be decoded: {0}")]
    Decoding(ReadError),

    /// Configuration file could not be parsed.
    #[error("Configuration is invalid: {0}")]
    Config(toml::de::Error),
}

/// Data that must be obtained before a header can be validated.
///
/// Missing data never rejects a header: the caller fetches it and retries.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum MissingData {
    /// Header message is not stored.
    #[error("header {0} is not available")]
    Header(Hash160),

    /// A message listed by a header is not stored.
    #[error("message {0} is not available")]
    Message(Hash160),

    /// The short-hash list of a header could not be expanded.
    #[error("message list of {0} cannot be recovered: {1}")]
    MessageList(Hash160, RecoveryError),
}

/// Structural problems of a transaction.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum TransactionError {
    /// Transaction has no inputs.
    #[error("Transaction spends nothing.")]
    NoInputs,

    /// Transaction has no outputs.
    #[error("Transaction creates nothing.")]
    NoOutputs,

    /// Transaction has more outputs than the network allows.
    #[error("Transaction has {0} outputs, more than allowed.")]
    TooManyOutputs(usize),

    /// The same position is spent twice.
    #[error("Transaction spends position {0} twice.")]
    RepeatedInput(u64),

    /// Sum of amounts overflows.
    #[error("Transaction amounts overflow.")]
    AmountOverflow,

    /// Outputs are worth more than inputs.
    #[error("Transaction outputs exceed its inputs.")]
    Unbalanced,

    /// Inclusion proof of an input does not verify.
    #[error("Inclusion proof of the input at position {0} is invalid.")]
    InvalidInclusionProof(u64),
}

impl From<MissingData> for LedgerError {
    fn from(e: MissingData) -> LedgerError {
        LedgerError::MissingData(e)
    }
}

impl From<TransactionError> for LedgerError {
    fn from(e: TransactionError) -> LedgerError {
        LedgerError::InvalidTransaction(e)
    }
}

impl From<ReadError> for LedgerError {
    fn from(e: ReadError) -> LedgerError {
        LedgerError::Decoding(e)
    }
}

impl From<toml::de::Error> for LedgerError {
    fn from(e: toml::de::Error) -> LedgerError {
        LedgerError::Config(e)
    }
}
