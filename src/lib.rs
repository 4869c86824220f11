pub mod hash;
pub mod crypto;
pub mod bundle;
pub mod metadata;
pub mod container;
pub mod package;
pub mod verify;
pub mod error;

pub use bundle::{Compression, Progress};
pub use container::Container;
pub use error::{PackageError, Result};
pub use metadata::PackageMetadata;
pub use package::{build, extract, read_metadata, BuildOptions, Package};
pub use verify::{verify, verify_file, Mismatch, Verification};
