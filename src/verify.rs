//! Layered integrity check.
//!
//! A package stores three views of the same content: the encrypted payload,
//! the decrypted bundle, and each member file.  Verification recomputes the
//! hash of each view, cheapest first, and stops at the first disagreement:
//!
//! 1. title length
//! 2. hash of the encrypted payload
//! 3. hash of the decrypted bundle (a wrong key fails here)
//! 4. member list, both directions
//! 5. hash of every member
//!
//! Nothing is written to disk.  The cipher is unauthenticated, so this is
//! the only place corruption or tampering is detected.

use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};

use crate::bundle::BundleReader;
use crate::container::Container;
use crate::crypto::{decrypt, derive_key};
use crate::error::{PackageError, Result};
use crate::hash::{digest, ContentHash};
use crate::metadata::{is_valid_title, title_len};
use crate::package::read_metadata;

/// The layer at which stored and recomputed values disagree.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Mismatch {
    #[error("title length {len} is outside 1-100 characters")]
    InvalidTitle { len: usize },
    #[error("encrypted payload hash mismatch (stored {expected}, computed {actual})")]
    EncryptedPayload { expected: ContentHash, actual: ContentHash },
    #[error("archive hash mismatch (stored {expected}, computed {actual})")]
    Archive { expected: ContentHash, actual: ContentHash },
    #[error("member {0} is listed in metadata but absent from the archive")]
    MissingMember(String),
    #[error("member {0} is in the archive but not listed in metadata")]
    UnexpectedMember(String),
    #[error("member {path} hash mismatch (stored {expected}, computed {actual})")]
    Member { path: String, expected: ContentHash, actual: ContentHash },
}

impl Mismatch {
    pub fn layer(&self) -> &'static str {
        match self {
            Mismatch::InvalidTitle { .. }     => "title",
            Mismatch::EncryptedPayload { .. } => "encrypted-payload",
            Mismatch::Archive { .. }          => "archive",
            Mismatch::MissingMember(_)
            | Mismatch::UnexpectedMember(_)   => "member-list",
            Mismatch::Member { .. }           => "member",
        }
    }
}

/// Outcome of verifying one package.
#[derive(Debug)]
pub enum Verification {
    Verified,
    /// The package was readable but its content does not match its hashes.
    Mismatch(Mismatch),
    /// The package could not be read or decoded at all.
    Unreadable(PackageError),
}

impl Verification {
    pub fn is_verified(&self) -> bool {
        matches!(self, Verification::Verified)
    }

    pub fn mismatch(&self) -> Option<&Mismatch> {
        match self {
            Verification::Mismatch(m) => Some(m),
            _ => None,
        }
    }
}

/// Verify an already decoded container.
///
/// `id_override` replaces the embedded id for key derivation.
pub fn verify_container(container: &Container, id_override: Option<&str>) -> Verification {
    match check(container, id_override) {
        Ok(None) => {
            debug!(id = %container.metadata.id, "package verified");
            Verification::Verified
        }
        Ok(Some(mismatch)) => {
            warn!(layer = mismatch.layer(), "verification failed: {mismatch}");
            Verification::Mismatch(mismatch)
        }
        Err(e) => {
            warn!(error = %e, "verification could not complete");
            Verification::Unreadable(e)
        }
    }
}

/// Read, decode and verify the package at `path`.  Never returns an error;
/// every failure is folded into the [`Verification`].
pub fn verify_file<P: AsRef<Path>>(path: P, id_override: Option<&str>) -> Verification {
    match read_metadata(path.as_ref()) {
        Ok(container) => verify_container(&container, id_override),
        Err(e) => {
            warn!(path = %path.as_ref().display(), error = %e, "package is unreadable");
            Verification::Unreadable(e)
        }
    }
}

/// `true` only if every layer of the package at `path` checks out.
pub fn verify<P: AsRef<Path>>(path: P, id_override: Option<&str>) -> bool {
    verify_file(path, id_override).is_verified()
}

fn check(container: &Container, id_override: Option<&str>) -> Result<Option<Mismatch>> {
    let meta = &container.metadata;

    if !is_valid_title(&meta.title) {
        return Ok(Some(Mismatch::InvalidTitle { len: title_len(&meta.title) }));
    }

    let actual = digest(&container.payload);
    if actual != meta.encrypted_payload_hash {
        return Ok(Some(Mismatch::EncryptedPayload {
            expected: meta.encrypted_payload_hash,
            actual,
        }));
    }

    let key = derive_key(id_override.unwrap_or(&meta.id));
    let plaintext = decrypt(&key, &container.iv, &container.payload);
    let actual = digest(&plaintext);
    if actual != meta.archive_hash {
        return Ok(Some(Mismatch::Archive { expected: meta.archive_hash, actual }));
    }

    let mut reader = BundleReader::new(&plaintext)?;
    let names = reader.member_names();
    if let Some(missing) = meta.member_hashes.keys().find(|k| !names.contains(*k)) {
        return Ok(Some(Mismatch::MissingMember(missing.clone())));
    }
    if let Some(extra) = names.iter().find(|n| !meta.member_hashes.contains_key(*n)) {
        return Ok(Some(Mismatch::UnexpectedMember(extra.clone())));
    }

    for (path, expected) in &meta.member_hashes {
        let actual = reader.digest_member(path)?;
        if actual != *expected {
            return Ok(Some(Mismatch::Member {
                path: path.clone(),
                expected: *expected,
                actual,
            }));
        }
    }
    Ok(None)
}
