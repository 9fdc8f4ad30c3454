//! User settings.
//!
//! Settings come from an optional `config/settings.toml` under the base
//! directory, and environment variables override individual fields:
//!
//! | Field                    | Default          | Override                |
//! |--------------------------|------------------|-------------------------|
//! | `dist_server`            | `https://go.dev` | `GVS_DIST_SERVER`       |
//! | `download_timeout_secs`  | 300              | `GVS_DOWNLOAD_TIMEOUT`  |
//! | `catalog_timeout_secs`   | 30               |                         |
//! | `refresh_interval_hours` | 168 (7 days)     |                         |
//! | `verify_after_apply`     | `true`           |                         |
//! | `store`                  | `native`         | `GVS_STORE`             |

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::toolchain::GvsPaths;

/// Environment variable overriding the release server.
pub const DIST_SERVER_ENV: &str = "GVS_DIST_SERVER";

/// Environment variable overriding the download timeout, in seconds.
pub const DOWNLOAD_TIMEOUT_ENV: &str = "GVS_DOWNLOAD_TIMEOUT";

/// Environment variable selecting the environment store backend.
pub const STORE_ENV: &str = "GVS_STORE";

const DEFAULT_DIST_SERVER: &str = "https://go.dev";

/// How the machine environment is read and written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// Native registry API.
    #[default]
    Native,
    /// `reg.exe` subprocesses.
    Shell,
}

/// Effective settings for one invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Base URL of the Go release server.
    pub dist_server: String,
    /// Upper bound for a single archive download.
    pub download_timeout_secs: u64,
    /// Upper bound for fetching the release catalog.
    pub catalog_timeout_secs: u64,
    /// Age after which the cached catalog is refreshed.
    pub refresh_interval_hours: u64,
    /// Run `go version` after switching and roll back if it fails.
    pub verify_after_apply: bool,
    /// Environment store backend.
    pub store: StoreKind,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            dist_server: DEFAULT_DIST_SERVER.to_string(),
            download_timeout_secs: 300,
            catalog_timeout_secs: 30,
            refresh_interval_hours: 7 * 24,
            verify_after_apply: true,
            store: StoreKind::Native,
        }
    }
}

impl Settings {
    /// Loads settings for the given layout.
    ///
    /// A missing settings file yields the defaults. Environment overrides are
    /// applied afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed, or an
    /// override holds an invalid value.
    pub fn load(paths: &GvsPaths) -> Result<Self> {
        let file = paths.settings_file();
        let mut settings = if file.exists() {
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read settings from {}", file.display()))?;
            Self::from_toml(&content)
                .with_context(|| format!("Failed to parse settings in {}", file.display()))?
        } else {
            Self::default()
        };
        settings.apply_env_overrides()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Parses settings from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error on malformed TOML or unknown keys.
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(server) = non_empty_env(DIST_SERVER_ENV) {
            self.dist_server = server;
        }
        if let Some(raw) = non_empty_env(DOWNLOAD_TIMEOUT_ENV) {
            self.download_timeout_secs = raw
                .parse()
                .with_context(|| format!("{DOWNLOAD_TIMEOUT_ENV} must be a number of seconds"))?;
        }
        if let Some(raw) = non_empty_env(STORE_ENV) {
            self.store = match raw.to_ascii_lowercase().as_str() {
                "native" => StoreKind::Native,
                "shell" => StoreKind::Shell,
                other => bail!("{STORE_ENV} must be 'native' or 'shell', got '{other}'"),
            };
        }
        Ok(())
    }

    /// Rejects values no invocation can work with.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.download_timeout_secs == 0 {
            bail!(
                "download_timeout_secs must be at least 1 second \
                 (set in settings.toml or {DOWNLOAD_TIMEOUT_ENV})"
            );
        }
        if self.catalog_timeout_secs == 0 {
            bail!("catalog_timeout_secs must be at least 1 second");
        }
        if self.dist_server().is_empty() {
            bail!("dist_server must not be empty");
        }
        Ok(())
    }

    /// Release server URL without a trailing slash.
    #[must_use]
    pub fn dist_server(&self) -> &str {
        self.dist_server.trim().trim_end_matches('/')
    }

    /// Download timeout as a `Duration`.
    #[must_use]
    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    /// Catalog fetch timeout as a `Duration`.
    #[must_use]
    pub fn catalog_timeout(&self) -> Duration {
        Duration::from_secs(self.catalog_timeout_secs)
    }

    /// Catalog refresh interval as a `Duration`.
    #[must_use]
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_hours.saturating_mul(3600))
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let settings = Settings::default();
        assert_eq!(settings.dist_server(), "https://go.dev");
        assert_eq!(settings.download_timeout(), Duration::from_secs(300));
        assert_eq!(settings.refresh_interval(), Duration::from_secs(7 * 24 * 3600));
        assert!(settings.verify_after_apply);
        assert_eq!(settings.store, StoreKind::Native);
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let settings = Settings::from_toml(
            "dist_server = \"https://mirror.example/\"\nstore = \"shell\"\n",
        )
        .unwrap();
        assert_eq!(settings.dist_server(), "https://mirror.example");
        assert_eq!(settings.store, StoreKind::Shell);
        assert_eq!(settings.catalog_timeout_secs, 30);
    }

    #[test]
    fn zero_timeouts_are_rejected() {
        let settings = Settings::from_toml("download_timeout_secs = 0\n").unwrap();
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("download_timeout_secs"));

        let settings = Settings::from_toml("catalog_timeout_secs = 0\n").unwrap();
        assert!(settings.validate().is_err());
        assert!(Settings::default().validate().is_ok());
    }

    #[test]
    fn huge_refresh_interval_saturates() {
        let settings =
            Settings::from_toml(&format!("refresh_interval_hours = {}\n", i64::MAX)).unwrap();
        assert_eq!(settings.refresh_interval(), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(Settings::from_toml("colour = \"blue\"").is_err());
    }

    #[test]
    #[serial_test::serial]
    fn environment_overrides_file_values() {
        let root = std::env::temp_dir().join(format!("gvs_test_settings_{}", rand::random::<u64>()));
        let paths = GvsPaths::with_root(root.clone());
        std::fs::create_dir_all(&paths.config).unwrap();
        std::fs::write(paths.settings_file(), "download_timeout_secs = 10\n").unwrap();

        // SAFETY: serialised with the other environment-mutating tests.
        unsafe {
            std::env::set_var(DOWNLOAD_TIMEOUT_ENV, "45");
            std::env::set_var(STORE_ENV, "Shell");
        }
        let settings = Settings::load(&paths).unwrap();
        unsafe {
            std::env::remove_var(DOWNLOAD_TIMEOUT_ENV);
            std::env::remove_var(STORE_ENV);
        }

        assert_eq!(settings.download_timeout_secs, 45);
        assert_eq!(settings.store, StoreKind::Shell);
        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    #[serial_test::serial]
    fn invalid_timeout_override_is_an_error() {
        let paths = GvsPaths::with_root(std::env::temp_dir().join("gvs_test_settings_missing"));
        unsafe {
            std::env::set_var(DOWNLOAD_TIMEOUT_ENV, "soon");
        }
        let result = Settings::load(&paths);
        unsafe {
            std::env::remove_var(DOWNLOAD_TIMEOUT_ENV);
        }
        assert!(result.is_err());
    }

    #[test]
    #[serial_test::serial]
    fn zero_timeout_override_is_an_error() {
        let paths = GvsPaths::with_root(std::env::temp_dir().join("gvs_test_settings_zero"));
        unsafe {
            std::env::set_var(DOWNLOAD_TIMEOUT_ENV, "0");
        }
        let result = Settings::load(&paths);
        unsafe {
            std::env::remove_var(DOWNLOAD_TIMEOUT_ENV);
        }
        assert!(result.is_err());
    }
}
