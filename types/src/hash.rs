//! 32-byte SHA-256 hash values.
//!
//! All hashes in the node — state hashes, batch hashes, essence hashes,
//! transaction ids — are plain SHA-256 digests.

use {
    serde::{Deserialize, Serialize},
    sha2::{Digest, Sha256},
    std::fmt,
};

/// Length of a hash value in bytes.
pub const HASH_LEN: usize = 32;

/// A 32-byte SHA-256 digest.
#[derive(
    Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct HashValue([u8; HASH_LEN]);

impl HashValue {
    /// Wrap raw bytes as a hash value.
    pub const fn new(bytes: [u8; HASH_LEN]) -> Self {
        Self(bytes)
    }

    /// The all-zero hash.
    pub const fn nil() -> Self {
        Self([0u8; HASH_LEN])
    }

    /// Borrow the raw bytes.
    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    /// Copy the raw bytes out.
    pub fn to_bytes(self) -> [u8; HASH_LEN] {
        self.0
    }

    /// Parse a hash from a byte slice. Returns `None` on wrong length.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; HASH_LEN] = bytes.try_into().ok()?;
        Some(Self(arr))
    }

    /// Short hex prefix for logging.
    pub fn short(&self) -> String {
        let mut s = String::with_capacity(8);
        for b in &self.0[..3] {
            s.push_str(&format!("{b:02x}"));
        }
        s.push_str("..");
        s
    }
}

impl AsRef<[u8]> for HashValue {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for HashValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for HashValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HashValue({self})")
    }
}

/// Hash a single byte string.
pub fn hash_data(data: &[u8]) -> HashValue {
    let mut hasher = Sha256::new();
    hasher.update(data);
    HashValue(hasher.finalize().into())
}

/// Hash the concatenation of several byte strings.
pub fn hash_chunks(chunks: &[&[u8]]) -> HashValue {
    let mut hasher = Sha256::new();
    for chunk in chunks {
        hasher.update(chunk);
    }
    HashValue(hasher.finalize().into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_deterministic() {
        assert_eq!(hash_data(b"synod"), hash_data(b"synod"));
        assert_ne!(hash_data(b"synod"), hash_data(b"sonyd"));
    }

    #[test]
    fn test_hash_chunks_equals_concatenation() {
        let joined = hash_data(b"hello world");
        let chunked = hash_chunks(&[b"hello", b" ", b"world"]);
        assert_eq!(joined, chunked);
    }

    #[test]
    fn test_from_slice_length_check() {
        assert!(HashValue::from_slice(&[0u8; 32]).is_some());
        assert!(HashValue::from_slice(&[0u8; 31]).is_none());
        assert!(HashValue::from_slice(&[0u8; 33]).is_none());
    }

    #[test]
    fn test_display_is_hex() {
        let h = HashValue::new([0xab; 32]);
        assert_eq!(format!("{h}").len(), 64);
        assert!(format!("{h}").starts_with("abab"));
    }
}
