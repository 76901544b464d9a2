//! Ledger headers and the messages carrying them.
use merkle::{symmetric_combine, Hash160, Hash256};
use readerwriter::*;
use serde::{Deserialize, Serialize};

use crate::credit::Credit;
use crate::shorthash::ShortHashList;
use crate::work::{Work, WorkProof};

/// Header committing to a batch, the spent chain and the calendar.
///
/// Every field except those of the first header is a function of the
/// parent header and the content of the batch.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerHeader {
    /// Id of the parent header message; zero for the first header.
    pub previous_header_hash: Hash160,
    /// Root of the credit batch issued by this header.
    pub batch_root: Hash160,
    /// Ledger position of the first credit in the batch.
    pub batch_offset: u64,
    /// Number of credits in the batch.
    pub batch_size: u64,
    /// Hash of the short-hash list of messages.
    pub message_list_hash: Hash160,
    /// Hash of the spent chain after this batch.
    pub spent_chain_hash: Hash160,
    /// Work required of this header.
    pub difficulty: Work,
    /// Work that makes this header a calend.
    pub diurnal_difficulty: Work,
    /// Root of the calendar up to the most recent calend.
    pub previous_diurn_root: Hash160,
    /// Root over the mined credits since the most recent calend.
    pub diurnal_block_root: Hash160,
    /// Microseconds since the epoch.
    pub timestamp: u64,
    /// Height of this header; the first header is number 1.
    pub batch_number: u64,
    /// Total work of the parent chain.
    pub previous_total_work: Work,
    /// Id of the most recent calend; zero before the first one.
    pub previous_calend_hash: Hash160,
    /// Network the header belongs to.
    pub network_id: u64,
}

impl LedgerHeader {
    /// Total work of the chain ending in this header.
    pub fn total_work(&self) -> Work {
        self.previous_total_work.saturating_add(self.difficulty)
    }

    /// Length of the spent chain after this header.
    /// Saturates, since relayed headers may carry any offset and size.
    pub fn spent_chain_length(&self) -> u64 {
        self.batch_offset.saturating_add(self.batch_size)
    }

    /// Returns true if the batch of this header issued the ledger position.
    pub fn covers(&self, position: u64) -> bool {
        position
            .checked_sub(self.batch_offset)
            .map_or(false, |index| index < self.batch_size)
    }

    /// `SymmetricCombine(previous_diurn_root, diurnal_block_root)`.
    /// For a calend this is the root of the diurn it closes.
    pub fn diurn_root(&self) -> Hash160 {
        symmetric_combine(&self.previous_diurn_root, &self.diurnal_block_root)
    }
}

impl Encodable for LedgerHeader {
    fn encode(&self, w: &mut impl Writer) -> Result<(), WriteError> {
        self.previous_header_hash.encode(w)?;
        self.batch_root.encode(w)?;
        w.write_u64(b"batch_offset", self.batch_offset)?;
        w.write_u64(b"batch_size", self.batch_size)?;
        self.message_list_hash.encode(w)?;
        self.spent_chain_hash.encode(w)?;
        w.write_u128(b"difficulty", self.difficulty)?;
        w.write_u128(b"diurnal_difficulty", self.diurnal_difficulty)?;
        self.previous_diurn_root.encode(w)?;
        self.diurnal_block_root.encode(w)?;
        w.write_u64(b"timestamp", self.timestamp)?;
        w.write_u64(b"batch_number", self.batch_number)?;
        w.write_u128(b"previous_total_work", self.previous_total_work)?;
        self.previous_calend_hash.encode(w)?;
        w.write_u64(b"network_id", self.network_id)
    }
}

impl ExactSizeEncodable for LedgerHeader {
    fn encoded_size(&self) -> usize {
        20 * 7 + 8 * 5 + 16 * 3
    }
}

impl Decodable for LedgerHeader {
    fn decode(r: &mut impl Reader) -> Result<Self, ReadError> {
        Ok(LedgerHeader {
            previous_header_hash: Hash160::decode(r)?,
            batch_root: Hash160::decode(r)?,
            batch_offset: r.read_u64()?,
            batch_size: r.read_u64()?,
            message_list_hash: Hash160::decode(r)?,
            spent_chain_hash: Hash160::decode(r)?,
            difficulty: r.read_u128()?,
            diurnal_difficulty: r.read_u128()?,
            previous_diurn_root: Hash160::decode(r)?,
            diurnal_block_root: Hash160::decode(r)?,
            timestamp: r.read_u64()?,
            batch_number: r.read_u64()?,
            previous_total_work: r.read_u128()?,
            previous_calend_hash: Hash160::decode(r)?,
            network_id: r.read_u64()?,
        })
    }
}

/// Credit issued to the miner of a header, bundled with that header.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinedCredit {
    /// The issued credit.
    pub credit: Credit,
    /// The header being mined.
    pub header: LedgerHeader,
}

impl MinedCredit {
    /// Hash of the encoding; links the mined credit to its batch root in calendar branches.
    pub fn branch_bridge(&self) -> Hash160 {
        Hash160::of_encodable(self)
    }

    /// `SymmetricCombine(branch_bridge, batch_root)`: the leaf of the diurnal block.
    pub fn hash(&self) -> Hash160 {
        symmetric_combine(&self.branch_bridge(), &self.header.batch_root)
    }

    /// Seed the proof of work is computed on.
    pub fn seed(&self) -> Hash256 {
        Hash256::digest(&self.encode_to_vec())
    }
}

impl Encodable for MinedCredit {
    fn encode(&self, w: &mut impl Writer) -> Result<(), WriteError> {
        self.credit.encode(w)?;
        self.header.encode(w)
    }
}

impl Decodable for MinedCredit {
    fn decode(r: &mut impl Reader) -> Result<Self, ReadError> {
        let credit = Credit::decode(r)?;
        let header = LedgerHeader::decode(r)?;
        Ok(MinedCredit { credit, header })
    }
}

/// A mined header as relayed between nodes: the mined credit, the list of
/// messages forming its batch, and the proof of work.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderMessage {
    /// Mined credit carrying the header.
    pub mined_credit: MinedCredit,
    /// Messages whose credits form the batch: the parent header and transactions.
    pub hash_list: ShortHashList<Hash160>,
    /// Proof of work on the mined credit.
    pub proof: WorkProof,
}

impl HeaderMessage {
    /// Identifier: hash of the canonical encoding. Recovered full hashes are not part of it.
    pub fn id(&self) -> Hash160 {
        Hash160::of_encodable(self)
    }

    /// The header.
    pub fn header(&self) -> &LedgerHeader {
        &self.mined_credit.header
    }
}

impl Encodable for HeaderMessage {
    fn encode(&self, w: &mut impl Writer) -> Result<(), WriteError> {
        self.mined_credit.encode(w)?;
        self.hash_list.encode(w)?;
        self.proof.encode(w)
    }
}

impl Decodable for HeaderMessage {
    fn decode(r: &mut impl Reader) -> Result<Self, ReadError> {
        let mined_credit = MinedCredit::decode(r)?;
        let hash_list = ShortHashList::decode(r)?;
        let proof = WorkProof::decode(r)?;
        Ok(HeaderMessage {
            mined_credit,
            hash_list,
            proof,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credit::PublicKey;

    fn sample() -> HeaderMessage {
        let header = LedgerHeader {
            previous_header_hash: Hash160::digest(b"parent"),
            batch_root: Hash160::digest(b"batch"),
            batch_offset: 10,
            batch_size: 3,
            difficulty: 100,
            diurnal_difficulty: 10_000,
            timestamp: 1_600_000_000_000_000,
            batch_number: 5,
            previous_total_work: 400,
            network_id: 1,
            ..Default::default()
        };
        HeaderMessage {
            mined_credit: MinedCredit {
                credit: Credit::new(PublicKey::default(), 7),
                header,
            },
            hash_list: ShortHashList::from_full_hashes(vec![Hash160::digest(b"parent")]),
            proof: WorkProof::default(),
        }
    }

    #[test]
    fn header_layout_starts_with_linkage_fields() {
        let header = sample().mined_credit.header;
        let bytes = header.encode_to_vec();
        assert_eq!(bytes.len(), header.encoded_size());
        assert_eq!(&bytes[..20], &header.previous_header_hash.0[..]);
        assert_eq!(&bytes[40..48], &10u64.to_le_bytes()[..]);
        assert_eq!(LedgerHeader::decode_from_slice(&bytes), Ok(header));
    }

    #[test]
    fn message_survives_the_wire_without_full_hashes() {
        let msg = sample();
        let decoded = HeaderMessage::decode_from_slice(&msg.encode_to_vec()).unwrap();
        assert_eq!(decoded.id(), msg.id());
        assert!(decoded.hash_list.full_hashes().is_empty());
        assert_eq!(decoded.hash_list.short_hashes(), msg.hash_list.short_hashes());
    }

    #[test]
    fn every_field_affects_the_id() {
        let msg = sample();
        let mut other = msg.clone();
        other.mined_credit.header.timestamp += 1;
        assert_ne!(other.id(), msg.id());
        let mut other = msg.clone();
        other.mined_credit.header.network_id = 2;
        assert_ne!(other.id(), msg.id());
        let mut other = msg.clone();
        other.proof.claimed_difficulty = 1;
        assert_ne!(other.id(), msg.id());
    }

    #[test]
    fn mined_credit_hash_binds_batch_root() {
        let mc = sample().mined_credit;
        let mut moved = mc.clone();
        moved.header.batch_root = Hash160::digest(b"elsewhere");
        assert_ne!(mc.hash(), moved.hash());
        assert_eq!(
            mc.hash(),
            symmetric_combine(&mc.header.batch_root, &mc.branch_bridge())
        );
    }

    #[test]
    fn total_work_adds_own_difficulty() {
        let header = sample().mined_credit.header;
        assert_eq!(header.total_work(), 500);
        assert_eq!(header.spent_chain_length(), 13);
    }

    #[test]
    fn coverage_does_not_overflow() {
        let mut header = sample().mined_credit.header;
        header.batch_offset = 10;
        header.batch_size = u64::max_value();
        assert_eq!(header.spent_chain_length(), u64::max_value());
        assert!(!header.covers(9));
        assert!(header.covers(10));
        assert!(header.covers(u64::max_value()));

        header.batch_size = 3;
        assert!(header.covers(12));
        assert!(!header.covers(13));
    }
}
