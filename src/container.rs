//! On-disk container layout.
//!
//! ```text
//! [ encrypted payload | iv (16 B) | metadata (L B, MessagePack) | L (8 B, big-endian) ]
//! ```
//!
//! There is no header.  Readers locate the metadata by reading the footer
//! backwards from the end of the file, so any metadata change means
//! rewriting the whole container.

use byteorder::{BigEndian, ByteOrder};
use std::io::{self, Write};
use thiserror::Error;

use crate::crypto::{Iv, IV_LEN};
use crate::metadata::PackageMetadata;

/// Size of the trailing metadata-length field.
pub const FOOTER_LEN: usize = 8;

#[derive(Error, Debug)]
pub enum ContainerError {
    #[error("Container is {len} bytes but its footer requires at least {required}")]
    Truncated { len: u64, required: u64 },
    #[error("Undecodable metadata: {0}")]
    MetadataDecode(#[from] rmp_serde::decode::Error),
    #[error("Metadata could not be serialized: {0}")]
    MetadataEncode(#[from] rmp_serde::encode::Error),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// A decoded container.  The payload is still encrypted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Container {
    pub payload:  Vec<u8>,
    pub iv:       Iv,
    pub metadata: PackageMetadata,
}

impl Container {
    /// Stream the container layout into `writer`.
    pub fn write<W: Write>(&self, mut writer: W) -> Result<(), ContainerError> {
        let meta = self.metadata.to_bytes()?;
        let mut footer = [0u8; FOOTER_LEN];
        BigEndian::write_u64(&mut footer, meta.len() as u64);

        writer.write_all(&self.payload)?;
        writer.write_all(&self.iv)?;
        writer.write_all(&meta)?;
        writer.write_all(&footer)?;
        Ok(())
    }

    pub fn encode(&self) -> Result<Vec<u8>, ContainerError> {
        let mut out = Vec::with_capacity(self.payload.len() + IV_LEN + FOOTER_LEN + 512);
        self.write(&mut out)?;
        Ok(out)
    }

    /// Split a whole container file back into its parts.
    pub fn decode(bytes: &[u8]) -> Result<Self, ContainerError> {
        let len = bytes.len() as u64;
        let min = (IV_LEN + FOOTER_LEN) as u64;
        if len < min {
            return Err(ContainerError::Truncated { len, required: min });
        }

        let meta_len = BigEndian::read_u64(&bytes[bytes.len() - FOOTER_LEN..]);
        let required = meta_len
            .checked_add(min)
            .ok_or(ContainerError::Truncated { len, required: u64::MAX })?;
        if len < required {
            return Err(ContainerError::Truncated { len, required });
        }

        // required <= len, so every offset below fits in usize.
        let meta_end    = bytes.len() - FOOTER_LEN;
        let meta_start  = meta_end - meta_len as usize;
        let payload_end = meta_start - IV_LEN;

        let mut iv = [0u8; IV_LEN];
        iv.copy_from_slice(&bytes[payload_end..meta_start]);
        let metadata = PackageMetadata::from_bytes(&bytes[meta_start..meta_end])?;

        Ok(Self {
            payload: bytes[..payload_end].to_vec(),
            iv,
            metadata,
        })
    }
}
