//! Value transfers between credits.
use merkle::Hash160;
use readerwriter::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::credit::{Credit, CreditInBatch};
use crate::errors::TransactionError;

/// Spends credits proven to exist in earlier batches and creates new ones.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Credits being spent.
    pub inputs: Vec<CreditInBatch>,
    /// Credits being created; they are issued in the batch of the header listing the transaction.
    pub outputs: Vec<Credit>,
}

impl Transaction {
    /// Identifier: hash of the canonical encoding.
    pub fn id(&self) -> Hash160 {
        Hash160::of_encodable(self)
    }

    /// Ledger positions spent by the inputs.
    pub fn input_positions(&self) -> impl Iterator<Item = u64> + '_ {
        self.inputs.iter().map(|i| i.position())
    }

    /// Returns the first position spent twice, if any.
    pub fn repeated_input(&self) -> Option<u64> {
        let mut seen = BTreeSet::new();
        self.input_positions().find(|p| !seen.insert(*p))
    }

    /// Sum of the input amounts, `None` on overflow.
    pub fn input_total(&self) -> Option<u64> {
        self.inputs
            .iter()
            .try_fold(0u64, |sum, i| sum.checked_add(i.credit.amount))
    }

    /// Sum of the output amounts, `None` on overflow.
    pub fn output_total(&self) -> Option<u64> {
        self.outputs
            .iter()
            .try_fold(0u64, |sum, o| sum.checked_add(o.amount))
    }

    /// Checks everything that does not depend on ledger state:
    /// shape, balance and the inclusion proofs of the inputs.
    pub fn check(&self, max_outputs: usize) -> Result<(), TransactionError> {
        if self.inputs.is_empty() {
            return Err(TransactionError::NoInputs);
        }
        if self.outputs.is_empty() {
            return Err(TransactionError::NoOutputs);
        }
        if self.outputs.len() > max_outputs {
            return Err(TransactionError::TooManyOutputs(self.outputs.len()));
        }
        if let Some(position) = self.repeated_input() {
            return Err(TransactionError::RepeatedInput(position));
        }
        let total_in = self.input_total().ok_or(TransactionError::AmountOverflow)?;
        let total_out = self.output_total().ok_or(TransactionError::AmountOverflow)?;
        if total_out > total_in {
            return Err(TransactionError::Unbalanced);
        }
        if let Some(bad) = self.inputs.iter().find(|i| !i.verify()) {
            return Err(TransactionError::InvalidInclusionProof(bad.position()));
        }
        Ok(())
    }
}

impl Encodable for Transaction {
    fn encode(&self, w: &mut impl Writer) -> Result<(), WriteError> {
        self.inputs.encode(w)?;
        self.outputs.encode(w)
    }
}

impl Decodable for Transaction {
    fn decode(r: &mut impl Reader) -> Result<Self, ReadError> {
        let inputs = Vec::<CreditInBatch>::decode(r)?;
        let outputs = Vec::<Credit>::decode(r)?;
        Ok(Transaction { inputs, outputs })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::CreditBatch;
    use crate::credit::PublicKey;
    use curve25519_dalek::scalar::Scalar;

    fn key(i: u64) -> PublicKey {
        PublicKey::from_secret(&Scalar::from(i))
    }

    fn funded(amounts: &[u64]) -> Vec<CreditInBatch> {
        let mut batch = CreditBatch::new(Hash160::digest(b"prev"), 0);
        let credits: Vec<Credit> = amounts
            .iter()
            .enumerate()
            .map(|(i, a)| Credit::new(key(i as u64 + 1), *a))
            .collect();
        assert!(batch.add_credits(&credits));
        credits
            .iter()
            .map(|c| batch.credit_in_batch(c).unwrap())
            .collect()
    }

    #[test]
    fn balanced_transaction_passes() {
        let tx = Transaction {
            inputs: funded(&[30, 20]),
            outputs: vec![Credit::new(key(9), 45), Credit::new(key(10), 5)],
        };
        assert_eq!(tx.check(10), Ok(()));
        assert_eq!(tx.input_total(), Some(50));
    }

    #[test]
    fn structural_failures() {
        let inputs = funded(&[30, 20]);
        let spend = |outputs: Vec<Credit>| Transaction {
            inputs: inputs.clone(),
            outputs,
        };
        assert_eq!(spend(vec![]).check(10), Err(TransactionError::NoOutputs));
        assert_eq!(
            spend(vec![Credit::new(key(9), 51)]).check(10),
            Err(TransactionError::Unbalanced)
        );
        assert_eq!(
            spend(vec![Credit::new(key(9), 1), Credit::new(key(10), 1)]).check(1),
            Err(TransactionError::TooManyOutputs(2))
        );
        assert_eq!(
            spend(vec![Credit::new(key(9), u64::max_value()), Credit::new(key(10), 1)]).check(10),
            Err(TransactionError::AmountOverflow)
        );

        let mut repeated = spend(vec![Credit::new(key(9), 1)]);
        repeated.inputs.push(inputs[0].clone());
        assert_eq!(
            repeated.check(10),
            Err(TransactionError::RepeatedInput(inputs[0].position()))
        );

        let no_inputs = Transaction {
            inputs: vec![],
            outputs: vec![Credit::new(key(9), 1)],
        };
        assert_eq!(no_inputs.check(10), Err(TransactionError::NoInputs));
    }

    #[test]
    fn inflated_input_is_caught_by_its_proof() {
        let mut inputs = funded(&[30]);
        inputs[0].credit.amount = 3_000;
        let tx = Transaction {
            inputs,
            outputs: vec![Credit::new(key(9), 2_000)],
        };
        assert!(matches!(
            tx.check(10),
            Err(TransactionError::InvalidInclusionProof(_))
        ));
    }

    #[test]
    fn id_commits_to_outputs() {
        let inputs = funded(&[30]);
        let a = Transaction {
            inputs: inputs.clone(),
            outputs: vec![Credit::new(key(9), 10)],
        };
        let b = Transaction {
            inputs,
            outputs: vec![Credit::new(key(9), 11)],
        };
        assert_ne!(a.id(), b.id());
        assert_eq!(Transaction::decode_from_slice(&a.encode_to_vec()), Ok(a));
    }
}
