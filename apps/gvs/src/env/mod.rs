//! Machine environment handling.
//!
//! ## Module Structure
//!
//! - [`store`] - The `EnvironmentStore` port and an in-memory store
//! - [`windows`] - Registry and `reg.exe` stores, change broadcast
//! - [`backup`] - Snapshot files and latest-valid selection
//! - [`mutator`] - Activation with compensation, and rollback

pub mod backup;
pub mod mutator;
pub mod store;
pub mod windows;

pub use backup::BackupStore;
pub use mutator::{ActivationPolicy, ApplyOutcome, GoVersionCheck, Mutator};
pub use windows::open_store;
