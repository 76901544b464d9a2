//! Spent/unspent bit per ledger position.
use core::fmt;
use merkle::Hash160;
use readerwriter::*;
use serde::{Deserialize, Serialize};

/// Packed bit vector: bit `p` is set when the credit at position `p` is spent.
///
/// Bits past `length` are always zero, so the hash depends only on the
/// first `length` bits.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpentChain {
    length: u64,
    data: Vec<u8>,
}

impl SpentChain {
    /// Creates an empty chain.
    pub fn new() -> Self {
        SpentChain::default()
    }

    /// Number of positions tracked.
    pub fn len(&self) -> u64 {
        self.length
    }

    /// Returns true if no position is tracked.
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Appends an unspent position.
    pub fn add(&mut self) {
        self.length += 1;
        if self.length > 8 * self.data.len() as u64 {
            self.data.push(0);
        }
    }

    /// Marks the position as spent. Positions past the end are ignored.
    pub fn set(&mut self, position: u64) {
        if position < self.length {
            self.data[(position / 8) as usize] |= 1 << (position % 8);
        }
    }

    /// Marks the position as unspent. Positions past the end are ignored.
    pub fn clear(&mut self, position: u64) {
        if position < self.length {
            self.data[(position / 8) as usize] &= !(1 << (position % 8));
        }
    }

    /// Returns true if the position is spent. Positions past the end are unspent.
    pub fn get(&self, position: u64) -> bool {
        position < self.length && self.data[(position / 8) as usize] & (1 << (position % 8)) != 0
    }

    /// Marks an unspent position as spent.
    /// Returns false if it is already spent or past the end.
    pub fn spend(&mut self, position: u64) -> bool {
        if position >= self.length || self.get(position) {
            return false;
        }
        self.set(position);
        true
    }

    /// Truncates or extends the chain, keeping bits past the new length clear.
    pub fn set_length(&mut self, length: u64) {
        self.length = length;
        let bytes = ((length + 7) / 8) as usize;
        self.data.resize(bytes, 0);
        let tail = length % 8;
        if tail != 0 {
            if let Some(last) = self.data.last_mut() {
                *last &= (1u8 << tail) - 1;
            }
        }
    }

    /// Hash of the used bytes; the empty chain hashes to zero.
    pub fn hash(&self) -> Hash160 {
        if self.length == 0 {
            return Hash160::zero();
        }
        let bytes = ((self.length + 7) / 8) as usize;
        Hash160::digest(&self.data[..bytes])
    }

    /// Hash the chain would have after resizing to `length` and flipping the
    /// given positions. The chain itself is not modified.
    pub fn hash_different<S, C>(&self, to_set: S, to_clear: C, length: u64) -> Hash160
    where
        S: IntoIterator<Item = u64>,
        C: IntoIterator<Item = u64>,
    {
        let mut copy = self.clone();
        copy.set_length(length);
        for position in to_set {
            copy.set(position);
        }
        for position in to_clear {
            copy.clear(position);
        }
        copy.hash()
    }

    /// Positions currently marked as spent.
    pub fn spent_positions(&self) -> impl Iterator<Item = u64> + '_ {
        (0..self.length).filter(move |p| self.get(*p))
    }
}

impl fmt::Debug for SpentChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SpentChain({})", self)
    }
}

impl fmt::Display for SpentChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for position in 0..self.length {
            f.write_str(if self.get(position) { "1" } else { "0" })?;
        }
        Ok(())
    }
}

impl Encodable for SpentChain {
    fn encode(&self, w: &mut impl Writer) -> Result<(), WriteError> {
        w.write_u64(b"length", self.length)?;
        w.write(b"data", &self.data)
    }
}

impl Decodable for SpentChain {
    fn decode(r: &mut impl Reader) -> Result<Self, ReadError> {
        let length = r.read_u64()?;
        let bytes = length
            .checked_add(7)
            .map(|n| (n / 8) as usize)
            .ok_or(ReadError::InvalidFormat)?;
        let data = r.read_bytes(bytes)?;
        if length % 8 != 0 && data[bytes - 1] >> (length % 8) != 0 {
            return Err(ReadError::InvalidFormat);
        }
        Ok(SpentChain { length, data })
    }
}
