//! Binary encoding interfaces shared by the ledger types.
//!
//! Every ledger message has one canonical encoding: little-endian integers
//! and `u32` length prefixes. Ids are hashes of that encoding.
mod codable;
mod reader;
mod writer;

pub use codable::{Codable, Decodable, Encodable, ExactSizeEncodable};
pub use reader::{ReadError, Reader};
pub use writer::{WriteError, Writer};
