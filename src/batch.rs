//! Batch of credits issued by one header.
use merkle::{symmetric_combine, Hash160, OrderedAccumulator};

use crate::credit::{Credit, CreditInBatch, InclusionProof};

/// Credits issued together, committed in canonical order and chained
/// to the previous header through `previous_credit_hash`.
#[derive(Clone, Debug)]
pub struct CreditBatch {
    previous_credit_hash: Hash160,
    credits: Vec<Credit>,
    accumulator: OrderedAccumulator,
}

impl CreditBatch {
    /// Creates an empty batch whose first credit gets position `offset`.
    pub fn new(previous_credit_hash: Hash160, offset: u64) -> Self {
        CreditBatch {
            previous_credit_hash,
            credits: Vec::new(),
            accumulator: OrderedAccumulator::new(offset),
        }
    }

    /// Hash linking this batch to its predecessor.
    pub fn previous_credit_hash(&self) -> Hash160 {
        self.previous_credit_hash
    }

    /// Position of the first credit.
    pub fn offset(&self) -> u64 {
        self.accumulator.offset()
    }

    /// Number of credits.
    pub fn len(&self) -> u64 {
        self.credits.len() as u64
    }

    /// Returns true if there are no credits.
    pub fn is_empty(&self) -> bool {
        self.credits.is_empty()
    }

    /// Credits in the order they were added.
    pub fn credits(&self) -> &[Credit] {
        &self.credits
    }

    /// Adds a credit. Returns false and changes nothing if an identical credit is present.
    pub fn add(&mut self, credit: Credit) -> bool {
        if !self.accumulator.insert(credit.to_bytes()) {
            return false;
        }
        self.credits.push(credit);
        true
    }

    /// Adds all credits or none of them.
    pub fn add_credits(&mut self, credits: &[Credit]) -> bool {
        for (i, credit) in credits.iter().enumerate() {
            let bytes = credit.to_bytes();
            if self.accumulator.contains(&bytes)
                || credits[..i].iter().any(|c| c.to_bytes() == bytes)
            {
                return false;
            }
        }
        for credit in credits {
            self.add(credit.clone());
        }
        true
    }

    /// `SymmetricCombine(previous_credit_hash, accumulator root)`.
    pub fn root(&mut self) -> Hash160 {
        symmetric_combine(&self.previous_credit_hash, &self.accumulator.root())
    }

    /// Canonical position of the credit.
    pub fn position(&mut self, credit: &Credit) -> Option<u64> {
        self.accumulator.position(&credit.to_bytes())
    }

    /// Credit at the absolute position.
    pub fn credit_at(&mut self, position: u64) -> Option<Credit> {
        self.accumulator
            .element_at(position)
            .and_then(|bytes| Credit::from_bytes(bytes).ok())
    }

    /// Branch of the credit: siblings, the previous credit hash, then the batch root.
    pub fn branch(&mut self, credit: &Credit) -> Option<Vec<Hash160>> {
        let position = self.position(credit)?;
        let mut branch = self.accumulator.siblings(position)?;
        branch.push(self.previous_credit_hash);
        branch.push(self.root());
        Some(branch)
    }

    /// Packages the credit with its inclusion proof.
    pub fn credit_in_batch(&mut self, credit: &Credit) -> Option<CreditInBatch> {
        let position = self.position(credit)?;
        let branch = self.branch(credit)?;
        Some(CreditInBatch {
            credit: credit.clone(),
            proof: InclusionProof { position, branch },
        })
    }
}
