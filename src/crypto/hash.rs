//! Content fingerprinting
//!
//! A fingerprint is the plain SHA-256 digest of the content bytes. No domain
//! prefix is applied so the value matches `sha256sum` output and the
//! `file_hash` column of the `proofs` table.

use std::fmt;
use std::io::Read;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::infra::{ProvenanceError, Result};

/// 32-byte SHA-256 hash
pub type Hash256 = [u8; 32];

/// Read buffer used when hashing from a reader
const READ_CHUNK: usize = 64 * 1024;

/// Content-addressable digest of a piece of content.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentFingerprint(Hash256);

impl ContentFingerprint {
    /// Create from raw digest bytes
    pub fn from_bytes(bytes: Hash256) -> Self {
        Self(bytes)
    }

    /// Get the raw digest bytes
    pub fn as_bytes(&self) -> &Hash256 {
        &self.0
    }

    /// Lowercase hex rendering (64 chars)
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex, with or without a `0x` prefix
    pub fn from_hex(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let trimmed = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let bytes = hex::decode(trimmed)
            .map_err(|e| ProvenanceError::InvalidFingerprint(format!("{s}: {e}")))?;
        let arr: Hash256 = bytes.try_into().map_err(|_| {
            ProvenanceError::InvalidFingerprint(format!("{s}: expected 32 bytes"))
        })?;
        Ok(Self(arr))
    }
}

impl fmt::Debug for ContentFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentFingerprint({})", &self.to_hex()[..12])
    }
}

impl fmt::Display for ContentFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for ContentFingerprint {
    type Err = ProvenanceError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl From<Hash256> for ContentFingerprint {
    fn from(bytes: Hash256) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for ContentFingerprint {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for ContentFingerprint {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ContentFingerprint {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Compute the fingerprint of in-memory content.
pub fn compute_fingerprint(bytes: &[u8]) -> ContentFingerprint {
    ContentFingerprint(Sha256::digest(bytes).into())
}

/// Compute the fingerprint of content read to exhaustion from `reader`.
///
/// Returns [`ProvenanceError::Hash`] if the reader fails before EOF.
pub fn fingerprint_reader<R: Read>(mut reader: R) -> Result<ContentFingerprint> {
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; READ_CHUNK];

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(ProvenanceError::Hash(e.to_string())),
        };
        hasher.update(&buf[..n]);
    }

    Ok(ContentFingerprint(hasher.finalize().into()))
}

/// Compute the fingerprint of a file on disk.
pub fn fingerprint_file(path: impl AsRef<std::path::Path>) -> Result<ContentFingerprint> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)
        .map_err(|e| ProvenanceError::Hash(format!("{}: {e}", path.display())))?;
    fingerprint_reader(std::io::BufReader::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;

    // sha256("abc")
    const ABC_HEX: &str = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";

    #[test]
    fn test_known_vector() {
        assert_eq!(compute_fingerprint(b"abc").to_hex(), ABC_HEX);
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(
            compute_fingerprint(b"").to_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_reader_matches_slice() {
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        let from_reader = fingerprint_reader(std::io::Cursor::new(&data)).unwrap();
        assert_eq!(from_reader, compute_fingerprint(&data));
    }

    #[test]
    fn test_reader_error_is_hash_error() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _: &mut [u8]) -> std::io::Result<usize> {
                Err(std::io::Error::new(std::io::ErrorKind::Other, "disk gone"))
            }
        }

        let err = fingerprint_reader(Broken).unwrap_err();
        assert!(matches!(err, ProvenanceError::Hash(_)));
    }

    #[test]
    fn test_hex_parse() {
        let fp = ContentFingerprint::from_hex(ABC_HEX).unwrap();
        assert_eq!(fp, compute_fingerprint(b"abc"));

        let prefixed = ContentFingerprint::from_hex(&format!("0x{ABC_HEX}")).unwrap();
        assert_eq!(prefixed, fp);

        assert!(ContentFingerprint::from_hex("abcd").is_err());
        assert!(ContentFingerprint::from_hex("zz").is_err());
    }

    #[test]
    fn test_serde_as_hex_string() {
        let fp = compute_fingerprint(b"abc");
        let json = serde_json::to_string(&fp).unwrap();
        assert_eq!(json, format!("\"{ABC_HEX}\""));
        let back: ContentFingerprint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, fp);
    }

    #[test]
    fn test_missing_file() {
        let err = fingerprint_file("/definitely/not/here.bin").unwrap_err();
        assert!(matches!(err, ProvenanceError::Hash(_)));
    }
}
