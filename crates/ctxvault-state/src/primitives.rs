//! Small shared helpers: token estimation and short content hashes.

use sha2::{Digest, Sha256};

/// Coarse token estimate: the larger of the whitespace word count and a
/// quarter of the character count.
pub fn estimate_tokens(text: &str) -> u64 {
    let words = text.split_whitespace().count() as u64;
    let chars = text.chars().count() as u64;
    words.max(chars / 4)
}

/// First `len` hex chars of the SHA-256 digest of `text`.
pub fn short_hash(text: &str, len: usize) -> String {
    let digest = hex::encode(Sha256::digest(text.as_bytes()));
    digest[..len.min(digest.len())].to_string()
}
