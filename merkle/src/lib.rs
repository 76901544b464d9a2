#![deny(missing_docs)]

//! Hash primitives and authenticated append-only trees used by the ledger.
use merlin::Transcript;
use readerwriter::*;
use std::fmt;
use std::ops::{BitOr, BitXor};
use subtle::ConstantTimeEq;

mod ordered;
mod tree;

pub use self::ordered::{leaf_hash, OrderedAccumulator, OrderedElement};
pub use self::tree::{AuthenticatedTree, Combination, Side};

macro_rules! define_hash {
    ($name:ident, $size:expr, $read:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub [u8; $size]);

        impl $name {
            /// Length of the hash in bytes.
            pub const SIZE: usize = $size;

            /// The all-zero hash, used as "none" in chain links.
            pub fn zero() -> Self {
                $name([0u8; $size])
            }

            /// Returns true if every byte is zero.
            pub fn is_zero(&self) -> bool {
                self.0.iter().all(|b| *b == 0)
            }

            /// Copies the hash from a slice of exactly `SIZE` bytes.
            pub fn from_slice(slice: &[u8]) -> Option<Self> {
                if slice.len() != $size {
                    return None;
                }
                let mut buf = [0u8; $size];
                buf.copy_from_slice(slice);
                Some($name(buf))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::zero()
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), hex::encode(&self.0))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&hex::encode(&self.0))
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl BitXor for $name {
            type Output = $name;
            fn bitxor(self, rhs: $name) -> $name {
                let mut out = self;
                for (a, b) in out.0.iter_mut().zip(rhs.0.iter()) {
                    *a ^= *b;
                }
                out
            }
        }

        impl BitOr for $name {
            type Output = $name;
            fn bitor(self, rhs: $name) -> $name {
                let mut out = self;
                for (a, b) in out.0.iter_mut().zip(rhs.0.iter()) {
                    *a |= *b;
                }
                out
            }
        }

        impl ConstantTimeEq for $name {
            fn ct_eq(&self, other: &Self) -> subtle::Choice {
                self.0[..].ct_eq(&other.0[..])
            }
        }

        impl Encodable for $name {
            fn encode(&self, w: &mut impl Writer) -> Result<(), WriteError> {
                w.write(b"hash", &self.0)
            }
        }

        impl ExactSizeEncodable for $name {
            fn encoded_size(&self) -> usize {
                $size
            }
        }

        impl Decodable for $name {
            fn decode(reader: &mut impl Reader) -> Result<Self, ReadError> {
                reader.$read().map($name)
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.serialize_bytes(&self.0)
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                struct BytesVisitor;

                impl<'de> serde::de::Visitor<'de> for BytesVisitor {
                    type Value = $name;

                    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                        write!(formatter, "a valid {}-byte string", $size)
                    }

                    fn visit_bytes<E>(self, v: &[u8]) -> Result<$name, E>
                    where
                        E: serde::de::Error,
                    {
                        $name::from_slice(v)
                            .ok_or_else(|| serde::de::Error::invalid_length(v.len(), &self))
                    }

                    fn visit_seq<A>(self, mut seq: A) -> Result<$name, A::Error>
                    where
                        A: serde::de::SeqAccess<'de>,
                    {
                        let mut buf = [0u8; $size];
                        for (i, byte) in buf.iter_mut().enumerate() {
                            *byte = seq
                                .next_element()?
                                .ok_or_else(|| serde::de::Error::invalid_length(i, &self))?;
                        }
                        Ok($name(buf))
                    }
                }

                deserializer.deserialize_bytes(BytesVisitor)
            }
        }
    };
}

define_hash!(
    Hash160,
    20,
    read_u8x20,
    "160-bit hash identifying tree nodes, credits, batches and messages."
);
define_hash!(
    Hash256,
    32,
    read_u8x32,
    "256-bit hash used as a proof-of-work seed."
);

impl Hash160 {
    /// Hashes arbitrary bytes.
    pub fn digest(data: &[u8]) -> Self {
        let mut t = Transcript::new(b"Ledger.treehash");
        t.append_message(b"data", data);
        let mut hash = Hash160::zero();
        t.challenge_bytes(b"hash", &mut hash.0);
        hash
    }

    /// Hashes the canonical encoding of an item.
    ///
    /// The encoding is streamed into the transcript field by field,
    /// so no intermediate buffer is allocated.
    pub fn of_encodable<E: Encodable>(item: &E) -> Self {
        let mut t = Transcript::new(b"Ledger.encoding");
        item.encode(&mut TranscriptWriter(&mut t))
            .expect("Ledger messages fit their length prefixes.");
        let mut hash = Hash160::zero();
        t.challenge_bytes(b"hash", &mut hash.0);
        hash
    }
}

/// Appends each encoded field to a transcript under its label.
struct TranscriptWriter<'t>(&'t mut Transcript);

impl Writer for TranscriptWriter<'_> {
    #[inline]
    fn write(&mut self, label: &'static [u8], src: &[u8]) -> Result<(), WriteError> {
        self.0.append_message(label, src);
        Ok(())
    }
}

impl Hash256 {
    /// Hashes arbitrary bytes.
    pub fn digest(data: &[u8]) -> Self {
        let mut t = Transcript::new(b"Ledger.seed");
        t.append_message(b"data", data);
        let mut hash = Hash256::zero();
        t.challenge_bytes(b"hash", &mut hash.0);
        hash
    }
}

/// Order-dependent combination: `Hash(a || b)`.
pub fn combine(a: &Hash160, b: &Hash160) -> Hash160 {
    let mut input = [0u8; 40];
    input[..20].copy_from_slice(&a.0);
    input[20..].copy_from_slice(&b.0);
    Hash160::digest(&input)
}

/// Order-independent combination: `Hash((a ^ b) || (Hash(a) | Hash(b)))`.
///
/// The OR half keeps `x ⊕ x` from collapsing to the hash of zeros.
pub fn symmetric_combine(a: &Hash160, b: &Hash160) -> Hash160 {
    let mixed = *a ^ *b;
    let spread = Hash160::digest(&a.0) | Hash160::digest(&b.0);
    let mut input = [0u8; 40];
    input[..20].copy_from_slice(&mixed.0);
    input[20..].copy_from_slice(&spread.0);
    Hash160::digest(&input)
}

/// Folds every entry of `branch` into `hash` with `symmetric_combine`.
pub fn evaluate_branch(hash: Hash160, branch: &[Hash160]) -> Hash160 {
    branch
        .iter()
        .fold(hash, |acc, neighbor| symmetric_combine(&acc, neighbor))
}

/// Verifies a branch whose last entry is the claimed root.
///
/// All but the last entry are folded into `leaf`, the result must equal the
/// last entry, and that entry must equal the independently known `root`.
pub fn verify_branch(leaf: Hash160, branch: &[Hash160], root: &Hash160) -> bool {
    match branch.split_last() {
        None => false,
        Some((claimed, path)) => {
            let reaches = evaluate_branch(leaf, path).ct_eq(claimed);
            let matches = claimed.ct_eq(root);
            (reaches & matches).unwrap_u8() == 1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(n: u8) -> Hash160 {
        Hash160::digest(&[n])
    }

    #[test]
    fn symmetric_combine_commutes() {
        for i in 0..10 {
            let (a, b) = (h(i), h(i + 100));
            assert_eq!(symmetric_combine(&a, &b), symmetric_combine(&b, &a));
        }
    }

    #[test]
    fn combine_depends_on_order() {
        let (a, b) = (h(1), h(2));
        assert_ne!(combine(&a, &b), combine(&b, &a));
        assert_ne!(combine(&a, &b), symmetric_combine(&a, &b));
    }

    #[test]
    fn self_combination_is_not_trivial() {
        let a = h(3);
        assert_ne!(symmetric_combine(&a, &a), symmetric_combine(&Hash160::zero(), &Hash160::zero()));
    }

    #[test]
    fn digests_are_deterministic_and_domain_separated() {
        assert_eq!(Hash160::digest(b"x"), Hash160::digest(b"x"));
        assert_ne!(Hash160::digest(b"x"), Hash160::digest(b"y"));
        assert_ne!(&Hash160::digest(b"x").0[..], &Hash256::digest(b"x").0[..20]);
    }

    #[test]
    fn xor_and_or() {
        let a = Hash160([0b1010; 20]);
        let b = Hash160([0b0110; 20]);
        assert_eq!(a ^ b, Hash160([0b1100; 20]));
        assert_eq!(a | b, Hash160([0b1110; 20]));
        assert_eq!(a ^ a, Hash160::zero());
    }

    #[test]
    fn branch_needs_a_root() {
        assert!(!verify_branch(h(1), &[], &h(1)));
        let root = symmetric_combine(&h(1), &h(2));
        assert!(verify_branch(h(1), &[h(2), root], &root));
        assert!(verify_branch(h(2), &[h(1), root], &root));
        assert!(!verify_branch(h(1), &[h(2), root], &h(9)));
        assert!(!verify_branch(h(3), &[h(2), root], &root));
    }

    #[test]
    fn hash_codec() {
        let hash = h(7);
        let bytes = hash.encode_to_vec();
        assert_eq!(bytes.len(), hash.encoded_size());
        assert_eq!(Hash160::decode_from_slice(&bytes), Ok(hash));
        assert_eq!(Hash160::decode_from_slice(&bytes[1..]), Err(ReadError::InsufficientBytes));
        assert_eq!(format!("{}", Hash160([0xab; 20])), "ab".repeat(20));
    }

    struct Pair(u64, u64);

    impl Encodable for Pair {
        fn encode(&self, w: &mut impl Writer) -> Result<(), WriteError> {
            w.write_u64(b"first", self.0)?;
            w.write_u64(b"second", self.1)
        }
    }

    #[test]
    fn encodable_hash_follows_the_fields() {
        assert_eq!(Hash160::of_encodable(&Pair(1, 2)), Hash160::of_encodable(&Pair(1, 2)));
        assert_ne!(Hash160::of_encodable(&Pair(1, 2)), Hash160::of_encodable(&Pair(2, 1)));
        // Fields are labelled, so this is not a digest of the bytes.
        let bytes = Pair(1, 2).encode_to_vec();
        assert_ne!(Hash160::of_encodable(&Pair(1, 2)), Hash160::digest(&bytes));
    }
}
