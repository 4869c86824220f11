//! High-level package API — the primary embedding surface.
//!
//! ```no_run
//! use std::path::Path;
//! use uspkg::package::{build, extract, BuildOptions, Package};
//!
//! // Build
//! let opts = BuildOptions::new("My Game", "A short description").entry_point("bin/game");
//! let meta = build(Path::new("game/"), Path::new("game.uspkg"), &opts, None)?;
//! println!("built package {}", meta.id);
//!
//! // Verify, then extract
//! let pkg = Package::open("game.uspkg")?;
//! if pkg.verify(None).is_verified() {
//!     pkg.extract_to("installed/")?;
//! }
//! # Ok::<(), uspkg::PackageError>(())
//! ```

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use uuid::Uuid;

use crate::bundle::{self, Bundle, Compression, ProgressFn};
use crate::container::Container;
use crate::crypto::{decrypt, derive_key, encrypt};
use crate::error::Result;
use crate::hash::digest;
use crate::metadata::{validate_title, PackageMetadata, METADATA_VERSION};
use crate::verify::{verify_container, Verification};

// ── BuildOptions ──────────────────────────────────────────────────────────────

/// Everything [`build`] needs besides the source and output paths.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// 1-100 characters; checked before any I/O.
    pub title:       String,
    pub description: String,
    /// Preview thumbnail bytes (PNG, JPEG, ...), stored as-is.
    pub image:       Option<Vec<u8>>,
    /// Free-form category tag.
    pub kind:        String,
    /// Bundle-relative path of the primary executable or asset.
    pub entry_point: String,
    pub compression: Compression,
    /// Method-specific level; `None` uses the method's default.
    pub level:       Option<i64>,
}

impl BuildOptions {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            ..Self::default()
        }
    }

    pub fn image(mut self, bytes: Vec<u8>) -> Self {
        self.image = Some(bytes);
        self
    }

    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    pub fn entry_point(mut self, path: impl Into<String>) -> Self {
        self.entry_point = path.into();
        self
    }

    pub fn compression(mut self, compression: Compression, level: Option<i64>) -> Self {
        self.compression = compression;
        self.level = level;
        self
    }
}

// ── Pipelines ─────────────────────────────────────────────────────────────────

/// Package the directory `source` into a new container at `output`.
///
/// A fresh random id is generated and the payload key derived from it.  The
/// container is written to a unique temporary file next to `output` and
/// renamed into place, so a failure never leaves a partial file at `output`.
///
/// Returns the metadata that was written.
pub fn build(
    source:   &Path,
    output:   &Path,
    opts:     &BuildOptions,
    progress: Option<&mut ProgressFn<'_>>,
) -> Result<PackageMetadata> {
    validate_title(&opts.title)?;

    let id  = Uuid::new_v4().to_string();
    let key = derive_key(&id);

    let Bundle { bytes, members } = bundle::build(source, opts.compression, opts.level, progress)?;
    let archive_hash = digest(&bytes);
    let (payload, iv) = encrypt(&key, &bytes);
    drop(bytes);
    let encrypted_payload_hash = digest(&payload);
    debug!(%id, members = members.len(), payload_len = payload.len(), "payload sealed");

    let container = Container {
        payload,
        iv,
        metadata: PackageMetadata {
            id,
            title:          opts.title.clone(),
            description:    opts.description.clone(),
            image:          opts.image.clone(),
            kind:           opts.kind.clone(),
            entry_point:    opts.entry_point.clone(),
            encrypted_payload_hash,
            archive_hash,
            member_hashes:  members,
            format_version: METADATA_VERSION,
        },
    };
    write_atomically(output, &container)?;

    info!(
        id = %container.metadata.id,
        output = %output.display(),
        members = container.metadata.member_hashes.len(),
        "package built"
    );
    Ok(container.metadata)
}

/// Decode the container at `path` without decrypting or verifying it.
pub fn read_metadata(path: &Path) -> Result<Container> {
    let bytes = fs::read(path)?;
    Ok(Container::decode(&bytes)?)
}

/// Decrypt the package at `path` and write its files under `out_dir`.
///
/// The key comes from the package's own embedded id.  No verification is
/// performed; call [`crate::verify::verify`] first to reject tampered or
/// corrupted packages.  Returns the number of files written.
pub fn extract(path: &Path, out_dir: &Path) -> Result<usize> {
    Package::open(path)?.extract_to(out_dir)
}

fn write_atomically(output: &Path, container: &Container) -> Result<()> {
    let dir = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut builder = tempfile::Builder::new();
    builder.prefix(".uspkg-");
    // Same mode a plain create would get: 0o666 filtered by the umask.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(fs::Permissions::from_mode(0o666));
    }
    let mut tmp = builder.tempfile_in(dir)?;
    {
        let mut writer = BufWriter::new(&mut tmp);
        container.write(&mut writer)?;
        writer.flush()?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(output).map_err(|e| e.error)?;
    Ok(())
}

// ── Package ───────────────────────────────────────────────────────────────────

/// A package opened from disk.  Decoding happens once, in [`Package::open`].
#[derive(Debug, Clone)]
pub struct Package {
    path:      PathBuf,
    container: Container,
}

impl Package {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_owned();
        let container = read_metadata(&path)?;
        Ok(Self { path, container })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn metadata(&self) -> &PackageMetadata {
        &self.container.metadata
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn into_container(self) -> Container {
        self.container
    }

    pub fn verify(&self, id_override: Option<&str>) -> Verification {
        verify_container(&self.container, id_override)
    }

    /// Decrypted bundle bytes, using the embedded id.
    pub fn decrypt_bundle(&self) -> Vec<u8> {
        let key = derive_key(&self.container.metadata.id);
        decrypt(&key, &self.container.iv, &self.container.payload)
    }

    /// Unbundle into `dest`, creating it if necessary.  Does not verify.
    pub fn extract_to<P: AsRef<Path>>(&self, dest: P) -> Result<usize> {
        let dest = dest.as_ref();
        let written = bundle::unbundle(&self.decrypt_bundle(), dest)?;
        info!(
            package = %self.path.display(),
            dest = %dest.display(),
            files = written,
            "package extracted"
        );
        Ok(written)
    }
}
