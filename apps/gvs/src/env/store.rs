//! The environment store port.
//!
//! gvs touches exactly three machine-wide variables. Everything that reads or
//! writes them goes through [`EnvironmentStore`], so the activation logic can
//! run against an in-memory store in tests and against the Windows registry
//! in production.

use crate::errors::GvsResult;

/// Install root of the active toolchain.
pub const GOROOT: &str = "GOROOT";
/// Target architecture of the active toolchain.
pub const GOARCH: &str = "GOARCH";
/// Executable search path.
pub const PATH: &str = "Path";

/// Variables gvs manages, in write order.
pub const MANAGED_VARIABLES: [&str; 3] = [GOROOT, GOARCH, PATH];

/// Persistent, machine-wide environment variables.
///
/// Names are case-insensitive, as on Windows. Each `write` or `remove` is
/// one atomic operation on one variable; there is no multi-variable
/// transaction, which is why activation compensates by hand.
pub trait EnvironmentStore {
    /// Returns the raw (unexpanded) value, or `None` if the variable is unset.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn read(&self, name: &str) -> GvsResult<Option<String>>;

    /// Sets a variable, preserving its existing value type where the store has one.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be written.
    fn write(&self, name: &str, value: &str) -> GvsResult<()>;

    /// Deletes a variable. Deleting an unset variable succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be deleted.
    fn remove(&self, name: &str) -> GvsResult<()>;

    /// Every variable in the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be enumerated.
    fn list(&self) -> GvsResult<Vec<(String, String)>>;

    /// Fails with `PermissionDenied` if the caller may not modify the store.
    ///
    /// # Errors
    ///
    /// Returns `PermissionDenied` when writes would be rejected.
    fn ensure_writable(&self) -> GvsResult<()> {
        Ok(())
    }

    /// Tells running processes that the environment changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the notification could not be sent.
    fn broadcast(&self) -> GvsResult<()> {
        Ok(())
    }
}

/// The three managed values at one point in time. `None` means unset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvValues {
    pub install_root: Option<String>,
    pub architecture: Option<String>,
    pub search_path: Option<String>,
}

impl EnvValues {
    /// Reads the managed variables from `store`.
    ///
    /// # Errors
    ///
    /// Returns the first read error.
    pub fn read_from(store: &dyn EnvironmentStore) -> GvsResult<Self> {
        Ok(Self {
            install_root: store.read(GOROOT)?,
            architecture: store.read(GOARCH)?,
            search_path: store.read(PATH)?,
        })
    }

    /// Value for one of [`MANAGED_VARIABLES`].
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        let value = if name.eq_ignore_ascii_case(GOROOT) {
            &self.install_root
        } else if name.eq_ignore_ascii_case(GOARCH) {
            &self.architecture
        } else if name.eq_ignore_ascii_case(PATH) {
            &self.search_path
        } else {
            &None
        };
        value.as_deref()
    }
}

/// The managed variables that are set, in [`MANAGED_VARIABLES`] order, under
/// the names the store reports.
///
/// # Errors
///
/// Returns the store's enumeration error.
pub fn managed_listing(store: &dyn EnvironmentStore) -> GvsResult<Vec<(String, String)>> {
    let all = store.list()?;
    Ok(MANAGED_VARIABLES
        .iter()
        .filter_map(|wanted| {
            all.iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(wanted))
                .cloned()
        })
        .collect())
}


#[cfg(test)]
pub use memory::MemoryStore;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::GvsError;

    #[test]
    fn names_are_case_insensitive() {
        let store = MemoryStore::with_values([("PATH", r"C:\Windows")]);
        assert_eq!(store.read("Path").unwrap().as_deref(), Some(r"C:\Windows"));

        store.write("path", r"C:\Go\bin;C:\Windows").unwrap();
        assert_eq!(store.list().unwrap().len(), 1);
        assert_eq!(store.snapshot()["PATH"], r"C:\Go\bin;C:\Windows");

        store.remove("pAtH").unwrap();
        assert!(store.read(PATH).unwrap().is_none());
    }

    #[test]
    fn write_budget_fails_later_writes() {
        let store = MemoryStore::new();
        store.fail_writes_after(GOROOT, 1);

        store.write(GOROOT, "a").unwrap();
        assert!(store.write(GOROOT, "b").is_err());
        assert_eq!(store.read(GOROOT).unwrap().as_deref(), Some("a"));
        store.write(GOARCH, "amd64").unwrap();
    }

    #[test]
    fn denied_store_rejects_writes() {
        let store = MemoryStore::new();
        store.deny_writes();
        assert!(matches!(
            store.ensure_writable(),
            Err(GvsError::PermissionDenied { .. })
        ));
        assert!(store.write(GOROOT, "x").is_err());
    }

    #[test]
    fn managed_listing_skips_unmanaged_and_unset() {
        let store = MemoryStore::with_values([
            ("TEMP", r"C:\Temp"),
            ("PATH", r"C:\Go\bin;C:\Windows"),
            ("goroot", r"C:\Go"),
        ]);

        let listing = managed_listing(&store).unwrap();

        assert_eq!(
            listing,
            [
                ("goroot".to_string(), r"C:\Go".to_string()),
                ("PATH".to_string(), r"C:\Go\bin;C:\Windows".to_string()),
            ]
        );
    }

    #[test]
    fn env_values_reads_all_three() {
        let store = MemoryStore::with_values([(GOROOT, r"C:\Go"), (PATH, r"C:\Go\bin")]);
        let values = EnvValues::read_from(&store).unwrap();
        assert_eq!(values.get(GOROOT), Some(r"C:\Go"));
        assert_eq!(values.get(GOARCH), None);
        assert_eq!(values.get("path"), Some(r"C:\Go\bin"));
        assert_eq!(values.get("GOPATH"), None);
    }
}
