use crate::{ReadError, Reader, WriteError, Writer};

/// A trait for encoding structures using the [Writer] trait.
///
/// [Writer]: crate::Writer
pub trait Encodable {
    /// Encodes receiver into bytes appending them to a provided buffer.
    fn encode(&self, w: &mut impl Writer) -> Result<(), WriteError>;

    /// Encodes the receiver into a newly allocated vector of bytes.
    fn encode_to_vec(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode(&mut buf)
            .expect("Ledger messages fit their length prefixes.");
        buf
    }
}

/// Encodable type with a precisely known length.
pub trait ExactSizeEncodable: Encodable {
    /// Returns precise length in bytes for the serialized representation of the receiver.
    fn encoded_size(&self) -> usize;
}

/// A trait for decoding bytes into structure using the [Reader] trait.
///
/// [Reader]: crate::Reader
pub trait Decodable: Sized {
    /// Decodes bytes into self by reading bytes from reader.
    fn decode(buf: &mut impl Reader) -> Result<Self, ReadError>;

    /// Decodes a value that occupies the entire slice.
    fn decode_from_slice(mut bytes: &[u8]) -> Result<Self, ReadError> {
        bytes.parse(|r| Self::decode(r))
    }
}

/// Trait which implements for structures which implement both [Decodable] and [Encodable] traits.
pub trait Codable: Encodable + Decodable {}

impl<T: Encodable + Decodable> Codable for T {}

impl<T: Encodable> Encodable for Vec<T> {
    fn encode(&self, w: &mut impl Writer) -> Result<(), WriteError> {
        w.write_size(b"n", self.len())?;
        for item in self.iter() {
            item.encode(w)?;
        }
        Ok(())
    }
}

impl<T: Decodable> Decodable for Vec<T> {
    fn decode(r: &mut impl Reader) -> Result<Self, ReadError> {
        let n = r.read_size()?;
        r.read_vec(n, |r| T::decode(r))
    }
}
