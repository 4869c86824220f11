use std::io;
use thiserror::Error;

use crate::bundle::BundleError;
use crate::container::ContainerError;
use crate::metadata::MAX_TITLE_LEN;

#[derive(Error, Debug)]
pub enum PackageError {
    /// Raised before any I/O when the title is empty or too long.
    #[error("Title must contain 1-{MAX_TITLE_LEN} characters (got {0})")]
    InvalidTitle(usize),
    #[error("Malformed container: {0}")]
    Container(#[source] ContainerError),
    #[error("Bundle error: {0}")]
    Bundle(#[source] BundleError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, PackageError>;

// Storage failures surface as plain `Io` no matter which layer hit them.

impl From<ContainerError> for PackageError {
    fn from(e: ContainerError) -> Self {
        match e {
            ContainerError::Io(e) => PackageError::Io(e),
            other => PackageError::Container(other),
        }
    }
}

impl From<BundleError> for PackageError {
    fn from(e: BundleError) -> Self {
        match e {
            BundleError::Io(e) => PackageError::Io(e),
            other => PackageError::Bundle(other),
        }
    }
}
