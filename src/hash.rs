//! Content hashing shared by every layer of a package.
//!
//! All digests are SHA-256.  Stream input is consumed in fixed
//! [`HASH_BLOCK_SIZE`] blocks so memory use does not depend on input size,
//! and an in-memory buffer hashes to exactly the same value as a file
//! holding the same bytes.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::str::FromStr;

/// Block size used when reading a stream into the hasher.
pub const HASH_BLOCK_SIZE: usize = 4096;

/// A 32-byte SHA-256 digest.  Stored in metadata as 64 lower-case hex chars.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a 64-char hex digest.  Upper-case input is accepted.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.to_hex())
    }
}

impl FromStr for ContentHash {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for ContentHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ContentHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

// ── Digest entry points ───────────────────────────────────────────────────────

/// Hash an in-memory buffer.
pub fn digest(bytes: &[u8]) -> ContentHash {
    let mut hasher = Sha256::new();
    for block in bytes.chunks(HASH_BLOCK_SIZE) {
        hasher.update(block);
    }
    ContentHash(hasher.finalize().into())
}

/// Hash everything readable from `reader`, one block at a time.
///
/// I/O errors from the underlying source propagate unchanged.
pub fn digest_reader<R: Read>(mut reader: R) -> io::Result<ContentHash> {
    let mut hasher = Sha256::new();
    let mut block = [0u8; HASH_BLOCK_SIZE];
    loop {
        let n = match reader.read(&mut block) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&block[..n]);
    }
    Ok(ContentHash(hasher.finalize().into()))
}

/// Hash the file at `path`.
pub fn digest_file<P: AsRef<Path>>(path: P) -> io::Result<ContentHash> {
    digest_reader(File::open(path)?)
}
