use std::convert::TryFrom;
use thiserror::Error;

/// Error kinds returned by a writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WriteError {
    /// A collection is too long for its `u32` length prefix.
    #[error("length {0} does not fit a u32 prefix")]
    LengthOverflow(usize),
}

/// Sink for the canonical encoding of ledger messages.
///
/// Labels name each field so that transcript-based writers can domain
/// separate them; byte sinks ignore them.
pub trait Writer {
    /// Appends bytes under the given label.
    fn write(&mut self, label: &'static [u8], src: &[u8]) -> Result<(), WriteError>;

    /// Writes a single byte, used for message tags.
    #[inline]
    fn write_u8(&mut self, label: &'static [u8], x: u8) -> Result<(), WriteError> {
        self.write(label, &[x])
    }

    /// Writes a LE32-encoded integer.
    #[inline]
    fn write_u32(&mut self, label: &'static [u8], x: u32) -> Result<(), WriteError> {
        self.write(label, &x.to_le_bytes())
    }

    /// Writes a LE64-encoded integer: positions, sizes and timestamps.
    #[inline]
    fn write_u64(&mut self, label: &'static [u8], x: u64) -> Result<(), WriteError> {
        self.write(label, &x.to_le_bytes())
    }

    /// Writes a LE128-encoded integer: difficulties and work.
    #[inline]
    fn write_u128(&mut self, label: &'static [u8], x: u128) -> Result<(), WriteError> {
        self.write(label, &x.to_le_bytes())
    }

    /// Writes a length prefix as a LE32-encoded integer.
    #[inline]
    fn write_size(&mut self, label: &'static [u8], n: usize) -> Result<(), WriteError> {
        let n = u32::try_from(n).map_err(|_| WriteError::LengthOverflow(n))?;
        self.write_u32(label, n)
    }
}

impl Writer for Vec<u8> {
    #[inline]
    fn write(&mut self, _label: &'static [u8], src: &[u8]) -> Result<(), WriteError> {
        self.extend_from_slice(src);
        Ok(())
    }

    #[inline]
    fn write_u8(&mut self, _label: &'static [u8], x: u8) -> Result<(), WriteError> {
        self.push(x);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_are_little_endian() {
        let mut buf = Vec::new();
        buf.write_u8(b"tag", 9).unwrap();
        buf.write_u32(b"x", 0x0403_0201).unwrap();
        buf.write_u64(b"y", 5).unwrap();
        assert_eq!(buf, vec![9, 1, 2, 3, 4, 5, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn oversized_length_prefix_is_refused() {
        let mut buf = Vec::new();
        assert_eq!(buf.write_size(b"n", 3), Ok(()));
        if let Some(n) = (u32::max_value() as usize).checked_add(1) {
            assert_eq!(buf.write_size(b"n", n), Err(WriteError::LengthOverflow(n)));
        }
        assert_eq!(buf, vec![3, 0, 0, 0]);
    }
}
