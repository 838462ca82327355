pub mod hasher;
pub mod pow_hash;
pub mod scan;

// Re-export commonly used types
pub use hasher::double_sha256;
pub use pow_hash::{le_words, midstate, BlockContext, SHA256_IV};
pub use scan::{has_zero_top_word, scan_range, Candidate};

use std::fmt;

pub const HASH_SIZE: usize = 32;

/// A 32-byte digest in the byte order SHA-256 produces it.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Hash([u8; HASH_SIZE]);

impl Hash {
    /// Block explorer order: the digest bytes reversed.
    pub fn to_display_hex(&self) -> String {
        let mut reversed = self.0;
        reversed.reverse();
        hex::encode(reversed)
    }
}

impl From<[u8; HASH_SIZE]> for Hash {
    fn from(bytes: [u8; HASH_SIZE]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_display_hex())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", hex::encode(self.0))
    }
}
