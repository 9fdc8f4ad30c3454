//! Go toolchain acquisition and bookkeeping.
//!
//! ## Module Structure
//!
//! - [`platform`] - Architecture names and host detection
//! - [`version`] - Numeric Go version ordering
//! - [`paths`] - Directory layout under the base directory
//! - [`catalog`] - Release catalog, its cache, and version resolution
//! - [`download`] - Streaming HTTP download with incremental hashing
//! - [`verify`] - SHA-256 checks
//! - [`archive`] - Zip extraction with traversal checks
//! - [`install`] - The install pipeline
//! - [`registry`] - Installed versions and the current pointer
//! - [`cancel`] - Ctrl-C cancellation tokens

pub mod archive;
pub mod cancel;
pub mod catalog;
pub mod download;
pub mod install;
pub mod paths;
pub mod platform;
pub mod registry;
pub mod verify;
pub mod version;

pub use catalog::{CatalogCache, HttpCatalog, ReleaseDescriptor};
pub use download::{Downloader, ProgressCallback, ProgressEvent};
pub use install::{InstallOutcome, Installer};
pub use paths::GvsPaths;
pub use platform::Architecture;
pub use registry::{InstalledVersion, VersionRegistry};
pub use version::GoVersion;
