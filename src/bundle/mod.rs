//! Directory tree ↔ single-file ZIP bundle.
//!
//! # Building
//! [`build`] walks the source tree, adds every regular file under its
//! root-relative path (components joined with `/`), and hashes each member
//! from the *source file* rather than from the bundle, so compression can
//! never mask a corrupted input.  The bundle is assembled in memory; there
//! is no shared temporary file, so concurrent builds cannot collide.
//!
//! Symbolic links are not followed and are skipped.  Walk order is sorted
//! by file name within each directory, but nothing downstream depends on
//! member order.
//!
//! # Unbundling
//! [`unbundle`] validates every stored path before writing anything.  A
//! member that is absolute or climbs out with `..` aborts the whole
//! extraction with [`BundleError::UnsafePath`].

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::{self, Cursor};
use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::hash::{self, ContentHash};

/// Archive-relative path → SHA-256 of that member's content.
pub type MemberHashes = BTreeMap<String, ContentHash>;

#[derive(Error, Debug)]
pub enum BundleError {
    #[error("Zip error: {0}")]
    Zip(ZipError),
    #[error("Member path escapes the output directory: {0}")]
    UnsafePath(String),
    #[error("Path is not valid UTF-8: {}", .0.display())]
    NonUtf8Path(PathBuf),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl From<ZipError> for BundleError {
    fn from(e: ZipError) -> Self {
        match e {
            ZipError::Io(e) => BundleError::Io(e),
            other => BundleError::Zip(other),
        }
    }
}

// ── Compression ───────────────────────────────────────────────────────────────

/// Compression method applied to every member of the bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    Stored,
    /// Deflate; what historical packages use.
    #[default]
    Deflate,
    Zstd,
}

impl Compression {
    pub fn method(self) -> CompressionMethod {
        match self {
            Compression::Stored  => CompressionMethod::Stored,
            Compression::Deflate => CompressionMethod::Deflated,
            Compression::Zstd    => CompressionMethod::Zstd,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Compression::Stored  => "stored",
            Compression::Deflate => "deflate",
            Compression::Zstd    => "zstd",
        }
    }

    /// Parse from a CLI string.
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "stored" | "none"    => Some(Compression::Stored),
            "deflate" | "deflated" => Some(Compression::Deflate),
            "zstd"               => Some(Compression::Zstd),
            _                    => None,
        }
    }
}

// ── Progress ──────────────────────────────────────────────────────────────────

/// Emitted once per member, after it has been added to the bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    /// Members added so far, including this one.
    pub processed: usize,
    /// Member count, known before the first write.
    pub total:     usize,
    /// Archive-relative path of the member just added.
    pub member:    String,
}

impl Progress {
    /// Share of members processed, in `0.0..=100.0`.  An empty tree is done.
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        self.processed as f64 * 100.0 / self.total as f64
    }
}

pub type ProgressFn<'a> = dyn FnMut(&Progress) + 'a;

// ── Build ─────────────────────────────────────────────────────────────────────

/// An in-memory bundle plus the per-member hashes taken from the source tree.
#[derive(Debug, Clone)]
pub struct Bundle {
    pub bytes:   Vec<u8>,
    pub members: MemberHashes,
}

/// Bundle every regular file under `root`.
///
/// * `compression` — method applied to each member.
/// * `level`       — optional method-specific compression level.
/// * `progress`    — optional callback, called after each member in walk order.
pub fn build(
    root:         &Path,
    compression:  Compression,
    level:        Option<i64>,
    mut progress: Option<&mut ProgressFn<'_>>,
) -> Result<Bundle, BundleError> {
    if !fs::metadata(root)?.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("not a directory: {}", root.display()),
        )
        .into());
    }

    let files = collect_files(root)?;
    let total = files.len();
    debug!(root = %root.display(), total, compression = compression.name(), "bundling");

    let base = SimpleFileOptions::default()
        .compression_method(compression.method())
        .compression_level(effective_level(compression, level));

    let mut writer  = ZipWriter::new(Cursor::new(Vec::new()));
    let mut members = MemberHashes::new();

    for (i, (path, name)) in files.into_iter().enumerate() {
        let content_hash = hash::digest_file(&path)?;

        let mut source = File::open(&path)?;
        let meta       = source.metadata()?;
        let mut options = base.large_file(meta.len() >= u64::from(u32::MAX));
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            options = options.unix_permissions(meta.permissions().mode() & 0o777);
        }

        writer.start_file(name.as_str(), options)?;
        io::copy(&mut source, &mut writer)?;
        members.insert(name.clone(), content_hash);

        if let Some(ref mut cb) = progress {
            cb(&Progress { processed: i + 1, total, member: name });
        }
    }

    let bytes = writer.finish()?.into_inner();
    Ok(Bundle { bytes, members })
}

/// Stored members take no level; the zip writer rejects one.
fn effective_level(compression: Compression, level: Option<i64>) -> Option<i64> {
    match compression {
        Compression::Stored => None,
        _ => level,
    }
}

fn collect_files(root: &Path) -> Result<Vec<(PathBuf, String)>, BundleError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let entry     = entry.map_err(io::Error::from)?;
        let file_type = entry.file_type();
        if file_type.is_symlink() {
            warn!(path = %entry.path().display(), "skipping symbolic link");
            continue;
        }
        if !file_type.is_file() {
            continue;
        }
        let name = member_name(root, entry.path())?;
        files.push((entry.into_path(), name));
    }
    Ok(files)
}

fn member_name(root: &Path, path: &Path) -> Result<String, BundleError> {
    let rel = path
        .strip_prefix(root)
        .map_err(|_| BundleError::UnsafePath(path.display().to_string()))?;
    let mut parts = Vec::new();
    for component in rel.components() {
        match component {
            Component::Normal(part) => parts.push(
                part.to_str().ok_or_else(|| BundleError::NonUtf8Path(path.to_owned()))?,
            ),
            _ => return Err(BundleError::UnsafePath(rel.display().to_string())),
        }
    }
    Ok(parts.join("/"))
}

// ── Read ──────────────────────────────────────────────────────────────────────

/// Read-only view over bundle bytes.  Never touches the filesystem.
pub struct BundleReader<'a> {
    archive: ZipArchive<Cursor<&'a [u8]>>,
}

impl<'a> BundleReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Result<Self, BundleError> {
        Ok(Self { archive: ZipArchive::new(Cursor::new(bytes))? })
    }

    /// Paths of all file members (directory entries are left out).
    pub fn member_names(&self) -> BTreeSet<String> {
        self.archive
            .file_names()
            .filter(|name| !name.ends_with('/'))
            .map(str::to_owned)
            .collect()
    }

    /// Hash one member's decompressed content.
    pub fn digest_member(&mut self, name: &str) -> Result<ContentHash, BundleError> {
        let member = self.archive.by_name(name)?;
        Ok(hash::digest_reader(member)?)
    }
}

impl std::fmt::Debug for BundleReader<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BundleReader").field("entries", &self.archive.len()).finish()
    }
}

// ── Unbundle ──────────────────────────────────────────────────────────────────

/// Materialize every member under `out_dir`, creating directories and
/// overwriting existing files.  Returns the number of files written.
pub fn unbundle(bytes: &[u8], out_dir: &Path) -> Result<usize, BundleError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;

    // Reject the whole bundle up front; nothing is written if any path is unsafe.
    if let Some(bad) = archive.file_names().find(|name| enclosed_path(name).is_none()) {
        return Err(BundleError::UnsafePath(bad.to_owned()));
    }

    fs::create_dir_all(out_dir)?;
    let mut written = 0;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let rel = enclosed_path(entry.name())
            .ok_or_else(|| BundleError::UnsafePath(entry.name().to_owned()))?;
        let dest = out_dir.join(rel);

        if entry.is_dir() {
            fs::create_dir_all(&dest)?;
            continue;
        }
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        // Replace rather than truncate: the old file may be read-only or a symlink.
        match fs::symlink_metadata(&dest) {
            Ok(existing) if !existing.is_dir() => fs::remove_file(&dest)?,
            _ => {}
        }
        let mut out = File::create(&dest)?;
        io::copy(&mut entry, &mut out)?;

        // Restored modes keep owner-write so the next extraction can replace the file.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                fs::set_permissions(&dest, fs::Permissions::from_mode(mode & 0o777 | 0o200))?;
            }
        }
        written += 1;
    }
    debug!(out_dir = %out_dir.display(), written, "unbundled");
    Ok(written)
}

/// Interpret a stored member name as a path that stays inside the output
/// directory.  `None` for absolute paths, drive prefixes, `..`, or an empty
/// name.
fn enclosed_path(name: &str) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in Path::new(name).components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if out.as_os_str().is_empty() {
        return None;
    }
    Some(out)
}
