//! Local index of relayed messages.
use merkle::Hash160;
use readerwriter::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::header::HeaderMessage;
use crate::shorthash::{short_hash, HashIndex};
use crate::transaction::Transaction;

/// A message that can appear in a header's message list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    /// A mined header; listing it issues its mined credit.
    Header(HeaderMessage),
    /// A transaction; listing it spends its inputs and issues its outputs.
    Transaction(Transaction),
}

impl Message {
    /// Identifier of the wrapped message.
    pub fn id(&self) -> Hash160 {
        match self {
            Message::Header(msg) => msg.id(),
            Message::Transaction(tx) => tx.id(),
        }
    }
}

impl Encodable for Message {
    fn encode(&self, w: &mut impl Writer) -> Result<(), WriteError> {
        match self {
            Message::Header(msg) => {
                w.write_u8(b"type", 0)?;
                msg.encode(w)
            }
            Message::Transaction(tx) => {
                w.write_u8(b"type", 1)?;
                tx.encode(w)
            }
        }
    }
}

impl Decodable for Message {
    fn decode(r: &mut impl Reader) -> Result<Self, ReadError> {
        match r.read_u8()? {
            0 => Ok(Message::Header(HeaderMessage::decode(r)?)),
            1 => Ok(Message::Transaction(Transaction::decode(r)?)),
            _ => Err(ReadError::InvalidFormat),
        }
    }
}

/// Storage the ledger reads messages from.
///
/// Besides lookups by id it answers short-hash queries and remembers
/// expansions of message lists that are too ambiguous to search.
pub trait MessageStore: HashIndex<Hash160> {
    /// Returns the message with the given id.
    fn message(&self, id: &Hash160) -> Option<Message>;

    /// Stores a message, replacing a stored copy with the same id. Returns the id.
    fn store_message(&mut self, message: Message) -> Hash160;

    /// Records the expansion of a message list with the given hash.
    fn record_known_solution(&mut self, list_hash: Hash160, full_hashes: Vec<Hash160>);

    /// Ids of the stored headers whose batch root is `batch_root`.
    fn headers_with_batch_root(&self, batch_root: &Hash160) -> Vec<Hash160>;

    /// Returns the header message with the given id.
    fn header_message(&self, id: &Hash160) -> Option<HeaderMessage> {
        match self.message(id)? {
            Message::Header(msg) => Some(msg),
            Message::Transaction(_) => None,
        }
    }

    /// Returns the transaction with the given id.
    fn transaction(&self, id: &Hash160) -> Option<Transaction> {
        match self.message(id)? {
            Message::Transaction(tx) => Some(tx),
            Message::Header(_) => None,
        }
    }

    /// Returns true if a message with this id is stored.
    fn contains(&self, id: &Hash160) -> bool {
        self.message(id).is_some()
    }
}

/// Message store kept in memory.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    messages: HashMap<Hash160, Message>,
    short_hashes: HashMap<u32, Vec<Hash160>>,
    known_solutions: HashMap<Hash160, Vec<Hash160>>,
    batch_roots: HashMap<Hash160, Vec<Hash160>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        MemoryStore::default()
    }

    /// Number of stored messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl HashIndex<Hash160> for MemoryStore {
    fn candidates(&self, short_hash: u32) -> Vec<Hash160> {
        self.short_hashes
            .get(&short_hash)
            .cloned()
            .unwrap_or_default()
    }

    fn known_solution(&self, list_hash: &Hash160) -> Option<Vec<Hash160>> {
        self.known_solutions.get(list_hash).cloned()
    }
}

impl MessageStore for MemoryStore {
    fn message(&self, id: &Hash160) -> Option<Message> {
        self.messages.get(id).cloned()
    }

    fn store_message(&mut self, message: Message) -> Hash160 {
        let id = message.id();
        if !self.messages.contains_key(&id) {
            self.short_hashes
                .entry(short_hash(&id))
                .or_insert_with(Vec::new)
                .push(id);
            if let Message::Header(msg) = &message {
                self.batch_roots
                    .entry(msg.header().batch_root)
                    .or_insert_with(Vec::new)
                    .push(id);
            }
        }
        self.messages.insert(id, message);
        id
    }

    fn record_known_solution(&mut self, list_hash: Hash160, full_hashes: Vec<Hash160>) {
        self.known_solutions.insert(list_hash, full_hashes);
    }

    fn headers_with_batch_root(&self, batch_root: &Hash160) -> Vec<Hash160> {
        self.batch_roots
            .get(batch_root)
            .cloned()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credit::{Credit, PublicKey};

    fn tx(amount: u64) -> Transaction {
        Transaction {
            inputs: vec![],
            outputs: vec![Credit::new(PublicKey::default(), amount)],
        }
    }

    #[test]
    fn indexes_by_short_hash() {
        let mut store = MemoryStore::new();
        let id = store.store_message(Message::Transaction(tx(1)));
        assert_eq!(store.candidates(short_hash(&id)), vec![id]);
        assert_eq!(store.transaction(&id), Some(tx(1)));
        assert_eq!(store.header_message(&id), None);
    }

    #[test]
    fn storing_twice_keeps_one_index_entry() {
        let mut store = MemoryStore::new();
        let id = store.store_message(Message::Transaction(tx(2)));
        store.store_message(Message::Transaction(tx(2)));
        assert_eq!(store.len(), 1);
        assert_eq!(store.candidates(short_hash(&id)).len(), 1);
    }

    #[test]
    fn indexes_headers_by_batch_root() {
        let mut store = MemoryStore::new();
        let mut msg = HeaderMessage::default();
        msg.mined_credit.header.batch_root = Hash160::digest(b"root");
        let id = store.store_message(Message::Header(msg));
        assert_eq!(store.headers_with_batch_root(&Hash160::digest(b"root")), vec![id]);
        assert!(store.headers_with_batch_root(&Hash160::zero()).is_empty());
    }

    #[test]
    fn message_codec_is_tagged() {
        let msg = Message::Transaction(tx(3));
        let bytes = msg.encode_to_vec();
        assert_eq!(bytes[0], 1);
        assert_eq!(Message::decode_from_slice(&bytes), Ok(msg));
        assert_eq!(Message::decode_from_slice(&[9]), Err(ReadError::InvalidFormat));
    }
}
