use serde::{Deserialize, Serialize};

use crate::bundle::MemberHashes;
use crate::error::{PackageError, Result};
use crate::hash::ContentHash;

/// Longest accepted title, in characters.
pub const MAX_TITLE_LEN: usize = 100;
/// Schema version written into new packages.
pub const METADATA_VERSION: u32 = 1;

/// The structured trailer of a package.
///
/// Field names on disk keep the short keys older packages were written
/// with (`UID`, `zipHash`, `files`, ...).  Unknown keys are ignored on
/// decode; `UID`, `title`, both payload hashes and `files` are required.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageMetadata {
    /// Random 128-bit id in hyphenated text form.  Also the key material.
    #[serde(rename = "UID")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Preview thumbnail; base64 text on disk.
    #[serde(default, with = "image_base64")]
    pub image: Option<Vec<u8>>,
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Primary executable or asset inside the bundle.  Informational only.
    #[serde(rename = "mainExe", default)]
    pub entry_point: String,
    #[serde(rename = "zipEncryptedHash")]
    pub encrypted_payload_hash: ContentHash,
    #[serde(rename = "zipHash")]
    pub archive_hash: ContentHash,
    #[serde(rename = "files")]
    pub member_hashes: MemberHashes,
    #[serde(rename = "formatVersion", default = "legacy_version")]
    pub format_version: u32,
}

fn legacy_version() -> u32 {
    METADATA_VERSION
}

impl PackageMetadata {
    /// MessagePack map with named fields.
    pub fn to_bytes(&self) -> std::result::Result<Vec<u8>, rmp_serde::encode::Error> {
        rmp_serde::to_vec_named(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> std::result::Result<Self, rmp_serde::decode::Error> {
        rmp_serde::from_slice(bytes)
    }
}

/// Title length in characters, as counted by validation.
pub fn title_len(title: &str) -> usize {
    title.chars().count()
}

pub fn is_valid_title(title: &str) -> bool {
    (1..=MAX_TITLE_LEN).contains(&title_len(title))
}

pub fn validate_title(title: &str) -> Result<()> {
    if is_valid_title(title) {
        Ok(())
    } else {
        Err(PackageError::InvalidTitle(title_len(title)))
    }
}

mod image_base64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(
        image: &Option<Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match image {
            Some(bytes) => serializer.serialize_some(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    // An empty string is how older packages say "no image".
    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            Some(text) if !text.is_empty() => STANDARD
                .decode(text.as_bytes())
                .map(Some)
                .map_err(serde::de::Error::custom),
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::digest;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn sample() -> PackageMetadata {
        let mut member_hashes = MemberHashes::new();
        member_hashes.insert("a.txt".into(), digest(b"hi"));
        PackageMetadata {
            id:                     "0b5e7a4c-1f1e-4c4f-9a3e-2a7d6a0f9c11".into(),
            title:                  "T".into(),
            description:            "D".into(),
            image:                  Some(vec![0x89, b'P', b'N', b'G']),
            kind:                   "game".into(),
            entry_point:            "run.sh".into(),
            encrypted_payload_hash: digest(b"ct"),
            archive_hash:           digest(b"zip"),
            member_hashes,
            format_version:         METADATA_VERSION,
        }
    }

    #[test]
    fn title_bounds() {
        assert!(!is_valid_title(""));
        assert!(is_valid_title("T"));
        assert!(is_valid_title(&"x".repeat(100)));
        assert!(!is_valid_title(&"x".repeat(101)));
        // Counted in characters, not bytes.
        assert!(is_valid_title(&"é".repeat(100)));
        assert!(matches!(validate_title(""), Err(PackageError::InvalidTitle(0))));
    }

    #[test]
    fn legacy_record_with_extra_keys_decodes() {
        // Shape of a record written by older tooling: no formatVersion,
        // empty image string, plus a key this crate does not know.
        let legacy = json!({
            "UID": "abc",
            "title": "Old",
            "description": "",
            "image": "",
            "type": "",
            "mainExe": "",
            "zipEncryptedHash": digest(b"ct").to_hex(),
            "zipHash": digest(b"zip").to_hex(),
            "files": { "a.txt": digest(b"hi").to_hex() },
            "vendorNote": "ignored",
        });
        let bytes = rmp_serde::to_vec_named(&legacy).unwrap();

        let meta = PackageMetadata::from_bytes(&bytes).unwrap();
        assert_eq!(meta.id, "abc");
        assert_eq!(meta.image, None);
        assert_eq!(meta.format_version, METADATA_VERSION);
        assert_eq!(meta.member_hashes.get("a.txt"), Some(&digest(b"hi")));
    }

    #[test]
    fn missing_required_field_fails() {
        let mut partial = BTreeMap::new();
        partial.insert("title", "no id here");
        let bytes = rmp_serde::to_vec_named(&partial).unwrap();
        assert!(PackageMetadata::from_bytes(&bytes).is_err());
    }

    #[test]
    fn record_survives_encoding() {
        let meta = sample();
        let back = PackageMetadata::from_bytes(&meta.to_bytes().unwrap()).unwrap();
        assert_eq!(back, meta);
    }
}
