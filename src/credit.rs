//! Credits and their inclusion proofs.
use core::fmt;
use curve25519_dalek::constants::RISTRETTO_BASEPOINT_POINT;
use curve25519_dalek::ristretto::CompressedRistretto;
use curve25519_dalek::scalar::Scalar;
use merkle::{Hash160, OrderedAccumulator};
use readerwriter::*;
use serde::{Deserialize, Serialize};

/// Public key owning a credit: a compressed Ristretto point.
#[derive(Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKey(pub CompressedRistretto);

impl PublicKey {
    /// Derives the public key for a secret scalar.
    pub fn from_secret(secret: &Scalar) -> Self {
        PublicKey((secret * RISTRETTO_BASEPOINT_POINT).compress())
    }

    /// Wraps raw compressed point bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        PublicKey(CompressedRistretto(bytes))
    }

    /// Raw compressed point bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }
}

impl Default for PublicKey {
    fn default() -> Self {
        PublicKey::from_bytes([0u8; 32])
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", hex::encode(self.as_bytes()))
    }
}

/// An amount owned by a public key.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credit {
    /// Value of the credit.
    pub amount: u64,
    /// Owner of the credit.
    pub public_key: PublicKey,
}

impl Credit {
    /// Length of the canonical encoding.
    pub const SIZE: usize = 40;

    /// Creates a credit.
    pub fn new(public_key: PublicKey, amount: u64) -> Self {
        Credit { amount, public_key }
    }

    /// Canonical bytes: `amount (8 LE) || public_key (32)`.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.encode_to_vec()
    }

    /// Parses the canonical bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ReadError> {
        Credit::decode_from_slice(bytes)
    }

    /// Hash of the canonical bytes.
    pub fn hash(&self) -> Hash160 {
        Hash160::digest(&self.to_bytes())
    }
}

impl Encodable for Credit {
    fn encode(&self, w: &mut impl Writer) -> Result<(), WriteError> {
        w.write_u64(b"amount", self.amount)?;
        w.write(b"public_key", self.public_key.as_bytes())
    }
}

impl ExactSizeEncodable for Credit {
    fn encoded_size(&self) -> usize {
        Credit::SIZE
    }
}

impl Decodable for Credit {
    fn decode(r: &mut impl Reader) -> Result<Self, ReadError> {
        let amount = r.read_u64()?;
        let public_key = PublicKey::from_bytes(r.read_u8x32()?);
        Ok(Credit { amount, public_key })
    }
}

/// Position of a credit in its batch and the branch leading to the batch root.
///
/// The branch ends with the previous credit hash and the batch root,
/// so the batch root is always `branch.last()`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InclusionProof {
    /// Absolute ledger position of the credit.
    pub position: u64,
    /// Sibling hashes followed by the previous credit hash and the batch root.
    pub branch: Vec<Hash160>,
}

impl InclusionProof {
    /// Batch root the branch claims to lead to.
    pub fn batch_root(&self) -> Option<&Hash160> {
        self.branch.last()
    }

    /// Checks that the branch leads from the credit to its claimed batch root.
    pub fn verify(&self, credit: &Credit) -> bool {
        match self.batch_root() {
            Some(root) => OrderedAccumulator::verify_branch(
                self.position,
                &credit.to_bytes(),
                &self.branch,
                root,
            ),
            None => false,
        }
    }
}

impl Encodable for InclusionProof {
    fn encode(&self, w: &mut impl Writer) -> Result<(), WriteError> {
        w.write_u64(b"position", self.position)?;
        self.branch.encode(w)
    }
}

impl Decodable for InclusionProof {
    fn decode(r: &mut impl Reader) -> Result<Self, ReadError> {
        let position = r.read_u64()?;
        let branch = Vec::<Hash160>::decode(r)?;
        Ok(InclusionProof { position, branch })
    }
}

/// A credit together with the proof that it was issued in a batch.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditInBatch {
    /// The credit.
    pub credit: Credit,
    /// Proof of its inclusion.
    pub proof: InclusionProof,
}

impl CreditInBatch {
    /// Absolute ledger position of the credit.
    pub fn position(&self) -> u64 {
        self.proof.position
    }

    /// Batch root the proof claims.
    pub fn batch_root(&self) -> Option<&Hash160> {
        self.proof.batch_root()
    }

    /// Checks the proof against its claimed batch root.
    pub fn verify(&self) -> bool {
        self.proof.verify(&self.credit)
    }
}

impl Encodable for CreditInBatch {
    fn encode(&self, w: &mut impl Writer) -> Result<(), WriteError> {
        self.credit.encode(w)?;
        self.proof.encode(w)
    }
}

impl Decodable for CreditInBatch {
    fn decode(r: &mut impl Reader) -> Result<Self, ReadError> {
        let credit = Credit::decode(r)?;
        let proof = InclusionProof::decode(r)?;
        Ok(CreditInBatch { credit, proof })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_bytes_layout() {
        let key = PublicKey::from_secret(&Scalar::from(5u64));
        let credit = Credit::new(key, 0x0102);
        let bytes = credit.to_bytes();
        assert_eq!(bytes.len(), Credit::SIZE);
        assert_eq!(&bytes[..8], &[2, 1, 0, 0, 0, 0, 0, 0]);
        assert_eq!(&bytes[8..], key.as_bytes());
        assert_eq!(Credit::from_bytes(&bytes), Ok(credit));
    }

    #[test]
    fn proof_without_branch_is_invalid() {
        let credit = Credit::new(PublicKey::default(), 1);
        let proof = InclusionProof {
            position: 0,
            branch: vec![],
        };
        assert!(!proof.verify(&credit));
    }

    #[test]
    fn serde_roundtrip() {
        let credit = Credit::new(PublicKey::from_secret(&Scalar::from(9u64)), 77);
        let json = serde_json::to_string(&credit).unwrap();
        let back: Credit = serde_json::from_str(&json).unwrap();
        assert_eq!(back, credit);
    }
}
