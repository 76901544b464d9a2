use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;

/// Error kinds returned by the reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ReadError {
    /// Not enough bytes left to complete the read.
    #[error("insufficient bytes")]
    InsufficientBytes,
    /// Bytes left over after a complete `parse`.
    #[error("unexpected trailing bytes")]
    TrailingBytes,
    /// Bytes do not describe a valid value.
    #[error("invalid format")]
    InvalidFormat,
}

/// An interface for reading binary data.
pub trait Reader {
    /// Copies bytes into a slice. If there is not enough bytes available,
    /// does not consume any byte and returns ReadError::InsufficientBytes.
    fn read(&mut self, dst: &mut [u8]) -> Result<(), ReadError>;

    /// Advances the internal cursor by the number of bytes.
    /// If there is not enough bytes, does nothing and returns ReadError::InsufficientBytes.
    fn advance(&mut self, cnt: usize) -> Result<(), ReadError>;

    /// Returns remaining number of bytes available for reading.
    fn remaining_bytes(&self) -> usize;

    /// Reads a single byte.
    fn read_u8(&mut self) -> Result<u8, ReadError> {
        let mut buf = [0u8; 1];
        self.read(&mut buf)?;
        Ok(buf[0])
    }

    /// Reads a LE32-encoded integer.
    fn read_u32(&mut self) -> Result<u32, ReadError> {
        let mut buf = [0u8; 4];
        self.read(&mut buf)?;
        Ok(LittleEndian::read_u32(&buf))
    }

    /// Reads a LE64-encoded integer.
    fn read_u64(&mut self) -> Result<u64, ReadError> {
        let mut buf = [0u8; 8];
        self.read(&mut buf)?;
        Ok(LittleEndian::read_u64(&buf))
    }

    /// Reads a LE128-encoded integer.
    fn read_u128(&mut self) -> Result<u128, ReadError> {
        let mut buf = [0u8; 16];
        self.read(&mut buf)?;
        Ok(LittleEndian::read_u128(&buf))
    }

    /// Reads a LE32-encoded length prefix.
    fn read_size(&mut self) -> Result<usize, ReadError> {
        self.read_u32().map(|n| n as usize)
    }

    /// Reads a 20-byte string.
    fn read_u8x20(&mut self) -> Result<[u8; 20], ReadError> {
        let mut buf = [0u8; 20];
        self.read(&mut buf)?;
        Ok(buf)
    }

    /// Reads a 32-byte string.
    fn read_u8x32(&mut self) -> Result<[u8; 32], ReadError> {
        let mut buf = [0u8; 32];
        self.read(&mut buf)?;
        Ok(buf)
    }

    /// Reads `len` bytes into a new vector.
    fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>, ReadError> {
        if len > self.remaining_bytes() {
            return Err(ReadError::InsufficientBytes);
        }
        let mut buf = vec![0u8; len];
        self.read(&mut buf)?;
        Ok(buf)
    }

    /// Reads `len` items using the closure for each one.
    fn read_vec<T, F>(&mut self, len: usize, mut closure: F) -> Result<Vec<T>, ReadError>
    where
        F: FnMut(&mut Self) -> Result<T, ReadError>,
        Self: Sized,
    {
        // Every item takes at least one byte, so the length cannot exceed what is left.
        let mut items = Vec::with_capacity(len.min(self.remaining_bytes()));
        for _ in 0..len {
            items.push(closure(self)?);
        }
        Ok(items)
    }

    /// Wraps the reading logic in a block that checks that all bytes have been read.
    /// If some are left unread, returns `Err(From<ReadError::TrailingBytes>)`.
    /// Use method `skip_trailing_bytes` to ignore trailing bytes.
    fn parse<F, T, E>(&mut self, parse_fn: F) -> Result<T, E>
    where
        F: FnOnce(&mut Self) -> Result<T, E>,
        E: From<ReadError>,
        Self: Sized,
    {
        let result = parse_fn(self)?;
        if self.remaining_bytes() != 0 {
            return Err(ReadError::TrailingBytes.into());
        }
        Ok(result)
    }

    /// Marks remaining unread bytes as read so that `parse` does not fail.
    /// After calling this method, no more bytes can be read.
    fn skip_trailing_bytes(&mut self) -> usize {
        let rem = self.remaining_bytes();
        self.advance(rem)
            .expect("Reader::advance(remaining()) should never fail");
        rem
    }
}

impl Reader for &[u8] {
    #[inline]
    fn read(&mut self, dst: &mut [u8]) -> Result<(), ReadError> {
        let n = dst.len();
        if n > self.len() {
            return Err(ReadError::InsufficientBytes);
        }
        let (a, b) = self.split_at(n);
        dst.copy_from_slice(a);
        *self = b;
        Ok(())
    }

    #[inline]
    fn advance(&mut self, cnt: usize) -> Result<(), ReadError> {
        if cnt > self.len() {
            return Err(ReadError::InsufficientBytes);
        }
        *self = &self[cnt..];
        Ok(())
    }

    #[inline]
    fn remaining_bytes(&self) -> usize {
        self.len()
    }
}
