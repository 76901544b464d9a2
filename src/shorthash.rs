//! Compact references to message sets.
//!
//! A list of full hashes is transmitted as the first four bytes of each hash
//! plus the XOR of all full hashes. The receiver expands every short hash into
//! the locally known candidates and searches for the combination whose XOR
//! reproduces the disambiguator.
use byteorder::{ByteOrder, LittleEndian};
use core::fmt;
use core::ops::BitXor;
use merkle::{Hash160, Hash256};
use readerwriter::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Default cap on the length of a recoverable list.
pub const MAX_HASH_ENTRIES: usize = 30_000;

/// Default cap on the number of combinations searched.
pub const MAX_HASH_COMBINATIONS: u64 = 1 << 20;

/// Hash type that can be referenced by a `ShortHashList`.
pub trait FullHash: Copy + Eq + Default + fmt::Debug + AsRef<[u8]> + BitXor<Output = Self> {
    /// Reads the hash from exactly `Self::LEN` bytes.
    fn from_bytes(bytes: &[u8]) -> Option<Self>;

    /// Length in bytes.
    const LEN: usize;
}

impl FullHash for Hash160 {
    fn from_bytes(bytes: &[u8]) -> Option<Self> {
        Hash160::from_slice(bytes)
    }
    const LEN: usize = Hash160::SIZE;
}

impl FullHash for Hash256 {
    fn from_bytes(bytes: &[u8]) -> Option<Self> {
        Hash256::from_slice(bytes)
    }
    const LEN: usize = Hash256::SIZE;
}

/// First four bytes of the hash as a little-endian integer.
pub fn short_hash<H: FullHash>(hash: &H) -> u32 {
    LittleEndian::read_u32(&hash.as_ref()[..4])
}

/// Local index the full hashes are recovered from.
pub trait HashIndex<H: FullHash> {
    /// Every known full hash whose short hash is `short_hash`.
    fn candidates(&self, short_hash: u32) -> Vec<H>;

    /// A previously recorded expansion of the list with the given hash.
    fn known_solution(&self, list_hash: &Hash160) -> Option<Vec<H>>;
}

/// Bounds of the recovery search.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortHashLimits {
    /// Longest list that is recovered at all.
    #[serde(default = "ShortHashLimits::default_max_entries")]
    pub max_entries: usize,

    /// Largest number of combinations searched before a known solution is required.
    #[serde(default = "ShortHashLimits::default_max_combinations")]
    pub max_combinations: u64,
}

impl ShortHashLimits {
    /// Default for `max_entries`.
    pub fn default_max_entries() -> usize {
        MAX_HASH_ENTRIES
    }

    /// Default for `max_combinations`.
    pub fn default_max_combinations() -> u64 {
        MAX_HASH_COMBINATIONS
    }
}

impl Default for ShortHashLimits {
    fn default() -> Self {
        ShortHashLimits {
            max_entries: Self::default_max_entries(),
            max_combinations: Self::default_max_combinations(),
        }
    }
}

/// Reasons a list cannot be expanded.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum RecoveryError {
    /// The list is longer than allowed.
    #[error("list has {0} entries, more than allowed")]
    TooManyEntries(usize),

    /// No local hash matches the short hash at this index.
    #[error("no candidates for short hash {short_hash:#010x} at index {index}")]
    NoCandidates {
        /// Index of the entry in the list.
        index: usize,
        /// The unmatched short hash.
        short_hash: u32,
    },

    /// Search space is too large and no known solution is recorded.
    #[error("{0} combinations exceed the search limit")]
    TooManyCombinations(u64),

    /// No combination reproduces the disambiguator.
    #[error("no combination of candidates matches the disambiguator")]
    NoSolution,
}

/// Compressed list of full hashes.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortHashList<H: FullHash> {
    short_hashes: Vec<u32>,
    disambiguator: H,
    #[serde(skip)]
    full_hashes: Vec<H>,
}

impl<H: FullHash> Default for ShortHashList<H> {
    fn default() -> Self {
        ShortHashList {
            short_hashes: Vec::new(),
            disambiguator: H::default(),
            full_hashes: Vec::new(),
        }
    }
}

impl<H: FullHash> fmt::Debug for ShortHashList<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShortHashList")
            .field("short_hashes", &self.short_hashes)
            .field("disambiguator", &self.disambiguator)
            .field("recovered", &self.is_recovered())
            .finish()
    }
}

impl<H: FullHash> ShortHashList<H> {
    /// Compresses the list, keeping the full hashes.
    pub fn from_full_hashes(full_hashes: Vec<H>) -> Self {
        let mut list = ShortHashList {
            full_hashes,
            ..Default::default()
        };
        list.generate_short_hashes();
        list
    }

    /// Recomputes the short hashes and disambiguator from the full hashes.
    pub fn generate_short_hashes(&mut self) {
        self.short_hashes = self.full_hashes.iter().map(short_hash).collect();
        self.disambiguator = xor_all(self.full_hashes.iter());
    }

    /// Short hashes in list order.
    pub fn short_hashes(&self) -> &[u32] {
        &self.short_hashes
    }

    /// XOR of all full hashes.
    pub fn disambiguator(&self) -> H {
        self.disambiguator
    }

    /// Recovered or original full hashes; empty until recovered.
    pub fn full_hashes(&self) -> &[H] {
        &self.full_hashes
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.short_hashes.len()
    }

    /// Returns true if the list references nothing.
    pub fn is_empty(&self) -> bool {
        self.short_hashes.is_empty()
    }

    /// Returns true if the full hashes are known and consistent with the short form.
    pub fn is_recovered(&self) -> bool {
        self.reproduced_by(&self.full_hashes)
    }

    /// Hash of the compressed form.
    pub fn hash(&self) -> Hash160 {
        Hash160::of_encodable(self)
    }

    /// Product of the candidate counts, saturating at `u64::MAX`.
    pub fn number_of_combinations(&self, index: &impl HashIndex<H>) -> u64 {
        self.short_hashes.iter().fold(1u64, |n, s| {
            n.saturating_mul(index.candidates(*s).len() as u64)
        })
    }

    /// Expands the short hashes into full hashes using the local index.
    pub fn recover_full_hashes(
        &mut self,
        index: &impl HashIndex<H>,
        limits: &ShortHashLimits,
    ) -> Result<(), RecoveryError> {
        if self.is_recovered() {
            return Ok(());
        }
        if self.short_hashes.len() > limits.max_entries {
            return Err(RecoveryError::TooManyEntries(self.short_hashes.len()));
        }
        let mut candidates = Vec::with_capacity(self.short_hashes.len());
        for (i, short_hash) in self.short_hashes.iter().enumerate() {
            let matches = index.candidates(*short_hash);
            if matches.is_empty() {
                return Err(RecoveryError::NoCandidates {
                    index: i,
                    short_hash: *short_hash,
                });
            }
            candidates.push(matches);
        }
        let combinations = candidates
            .iter()
            .fold(1u64, |n, c| n.saturating_mul(c.len() as u64));

        if combinations > limits.max_combinations {
            debug!(combinations, "short hash search too large, using known solution");
            let solution = index
                .known_solution(&self.hash())
                .ok_or(RecoveryError::TooManyCombinations(combinations))?;
            if !self.reproduced_by(&solution) {
                return Err(RecoveryError::NoSolution);
            }
            self.full_hashes = solution;
            return Ok(());
        }

        let solution = search(&candidates, self.disambiguator).ok_or(RecoveryError::NoSolution)?;
        self.full_hashes = solution;
        Ok(())
    }

    fn reproduced_by(&self, full_hashes: &[H]) -> bool {
        full_hashes.len() == self.short_hashes.len()
            && full_hashes
                .iter()
                .zip(self.short_hashes.iter())
                .all(|(h, s)| short_hash(h) == *s)
            && xor_all(full_hashes.iter()) == self.disambiguator
    }
}

fn xor_all<'a, H: FullHash + 'a>(hashes: impl Iterator<Item = &'a H>) -> H {
    hashes.fold(H::default(), |acc, h| acc ^ *h)
}

// Depth-first search over the combinations, the last ambiguous entry varying fastest.
// Unambiguous entries are folded into the target up front.
fn search<H: FullHash>(candidates: &[Vec<H>], disambiguator: H) -> Option<Vec<H>> {
    let fixed = xor_all(candidates.iter().filter(|c| c.len() == 1).map(|c| &c[0]));
    let target = disambiguator ^ fixed;
    let ambiguous: Vec<usize> = (0..candidates.len())
        .filter(|i| candidates[*i].len() > 1)
        .collect();

    let mut choice = vec![0usize; ambiguous.len()];
    loop {
        let chosen = ambiguous
            .iter()
            .zip(choice.iter())
            .map(|(i, c)| &candidates[*i][*c]);
        if xor_all(chosen) == target {
            let mut result: Vec<H> = candidates.iter().map(|c| c[0]).collect();
            for (i, c) in ambiguous.iter().zip(choice.iter()) {
                result[*i] = candidates[*i][*c];
            }
            return Some(result);
        }
        // Advance the odometer.
        let mut level = ambiguous.len();
        loop {
            if level == 0 {
                return None;
            }
            level -= 1;
            choice[level] += 1;
            if choice[level] < candidates[ambiguous[level]].len() {
                break;
            }
            choice[level] = 0;
        }
    }
}

impl<H: FullHash> Encodable for ShortHashList<H> {
    fn encode(&self, w: &mut impl Writer) -> Result<(), WriteError> {
        w.write_size(b"n", self.short_hashes.len())?;
        for s in self.short_hashes.iter() {
            w.write_u32(b"short_hash", *s)?;
        }
        w.write(b"disambiguator", self.disambiguator.as_ref())
    }
}

impl<H: FullHash> ExactSizeEncodable for ShortHashList<H> {
    fn encoded_size(&self) -> usize {
        4 + 4 * self.short_hashes.len() + H::LEN
    }
}

impl<H: FullHash> Decodable for ShortHashList<H> {
    fn decode(r: &mut impl Reader) -> Result<Self, ReadError> {
        let n = r.read_size()?;
        let short_hashes = r.read_vec(n, |r| r.read_u32())?;
        let bytes = r.read_bytes(H::LEN)?;
        let disambiguator = H::from_bytes(&bytes).ok_or(ReadError::InvalidFormat)?;
        Ok(ShortHashList {
            short_hashes,
            disambiguator,
            full_hashes: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    struct Index {
        hashes: Vec<Hash160>,
        solutions: HashMap<Hash160, Vec<Hash160>>,
    }

    impl HashIndex<Hash160> for Index {
        fn candidates(&self, s: u32) -> Vec<Hash160> {
            self.hashes
                .iter()
                .filter(|h| short_hash(*h) == s)
                .cloned()
                .collect()
        }

        fn known_solution(&self, list_hash: &Hash160) -> Option<Vec<Hash160>> {
            self.solutions.get(list_hash).cloned()
        }
    }

    // A hash whose first four bytes are `prefix` and the rest derived from `tag`.
    fn hash_with_prefix(prefix: u32, tag: u64) -> Hash160 {
        let mut h = Hash160::digest(&tag.to_le_bytes());
        h.0[..4].copy_from_slice(&prefix.to_le_bytes());
        h
    }

    // Every short hash in the list has one decoy candidate.
    fn setup(n: u64) -> (Vec<Hash160>, Index) {
        let wanted: Vec<Hash160> = (0..n).map(|i| hash_with_prefix(i as u32, i)).collect();
        let decoys = (0..n).map(|i| hash_with_prefix(i as u32, i + (1 << 35)));
        let index = Index {
            hashes: wanted.iter().cloned().chain(decoys).collect(),
            solutions: HashMap::new(),
        };
        (wanted, index)
    }

    fn compressed(full: &[Hash160]) -> ShortHashList<Hash160> {
        let original = ShortHashList::from_full_hashes(full.to_vec());
        ShortHashList::decode_from_slice(&original.encode_to_vec()).unwrap()
    }

    #[test]
    fn short_hash_is_little_endian_prefix() {
        let h = hash_with_prefix(0xdead_beef, 1);
        assert_eq!(short_hash(&h), 0xdead_beef);
    }

    #[test]
    fn counts_combinations() {
        let (wanted, index) = setup(3);
        let list = compressed(&wanted[1..3]);
        assert_eq!(list.number_of_combinations(&index), 4);
    }

    #[test]
    fn recovers_original_order_despite_decoys() {
        let (wanted, index) = setup(12);
        let mut order = wanted.clone();
        order.swap(0, 7);
        order.swap(3, 11);
        let mut list = compressed(&order);
        assert!(!list.is_recovered());
        list.recover_full_hashes(&index, &ShortHashLimits::default())
            .unwrap();
        assert_eq!(list.full_hashes(), &order[..]);
        assert!(list.is_recovered());
    }

    #[test]
    fn fails_without_the_true_hash() {
        let (wanted, mut index) = setup(5);
        let list_source = wanted.clone();
        index.hashes.retain(|h| *h != wanted[2]);
        let mut list = compressed(&list_source);
        assert_eq!(
            list.recover_full_hashes(&index, &ShortHashLimits::default()),
            Err(RecoveryError::NoSolution)
        );
        assert!(list.full_hashes().is_empty());
    }

    #[test]
    fn fails_without_any_candidate() {
        let (wanted, _) = setup(3);
        let mut list = compressed(&wanted);
        let index = Index::default();
        assert_eq!(
            list.recover_full_hashes(&index, &ShortHashLimits::default()),
            Err(RecoveryError::NoCandidates {
                index: 0,
                short_hash: 0
            })
        );
    }

    #[test]
    fn too_many_combinations_need_a_known_solution() {
        let (wanted, mut index) = setup(30);
        let mut list = compressed(&wanted);
        let limits = ShortHashLimits::default();
        assert_eq!(
            list.recover_full_hashes(&index, &limits),
            Err(RecoveryError::TooManyCombinations(1 << 30))
        );

        index.solutions.insert(list.hash(), wanted.clone());
        list.recover_full_hashes(&index, &limits).unwrap();
        assert_eq!(list.full_hashes(), &wanted[..]);
    }

    #[test]
    fn wrong_known_solution_is_refused() {
        let (wanted, mut index) = setup(30);
        let mut list = compressed(&wanted);
        let mut wrong = wanted.clone();
        wrong.swap(0, 1);
        index.solutions.insert(list.hash(), wrong);
        assert_eq!(
            list.recover_full_hashes(&index, &ShortHashLimits::default()),
            Err(RecoveryError::NoSolution)
        );
    }

    #[test]
    fn too_many_entries() {
        let (wanted, index) = setup(4);
        let mut list = compressed(&wanted);
        let limits = ShortHashLimits {
            max_entries: 3,
            max_combinations: MAX_HASH_COMBINATIONS,
        };
        assert_eq!(
            list.recover_full_hashes(&index, &limits),
            Err(RecoveryError::TooManyEntries(4))
        );
    }

    #[test]
    fn empty_list_recovers_trivially() {
        let mut list = compressed(&[]);
        list.recover_full_hashes(&Index::default(), &ShortHashLimits::default())
            .unwrap();
        assert!(list.full_hashes().is_empty());
    }

    #[test]
    fn hash_ignores_full_hashes() {
        let (wanted, _) = setup(3);
        let original = ShortHashList::from_full_hashes(wanted.clone());
        assert_eq!(original.hash(), compressed(&wanted).hash());
        assert_eq!(original.encoded_size(), original.encode_to_vec().len());
    }
}
