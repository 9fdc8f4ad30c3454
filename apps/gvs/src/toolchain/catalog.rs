//! Release catalog: what Go versions exist and where to download them.
//!
//! The upstream source is the go.dev download index
//! (`<server>/dl/?mode=json&include=all`). Only Windows zip archives are kept;
//! installers, source tarballs and pre-releases are dropped while reading.
//!
//! The parsed list is cached at `config/versions.json`. The file's mtime is the
//! "last updated" time: the cache is refreshed once it is older than the
//! refresh interval (7 days by default) or when a refresh is forced. A failed
//! refresh falls back to the existing cache with a warning; it only fails when
//! there is no cache at all.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

use super::download::{USER_AGENT, format_bytes};
use super::paths::write_atomic;
use super::verify::is_sha256_hex;
use super::platform::Architecture;
use super::version::GoVersion;
use crate::errors::{GvsError, GvsResult};

/// Index path on the distribution server.
const INDEX_PATH: &str = "/dl/?mode=json&include=all";

/// One downloadable Windows archive.
///
/// Identity is `(version, arch)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseDescriptor {
    pub version: GoVersion,
    pub os: String,
    pub arch: Architecture,
    pub kind: String,
    pub size: u64,
    pub display_size: String,
    pub sha256: String,
    pub download_url: String,
}

impl ReleaseDescriptor {
    /// Cache file name for this release, e.g. `go1.21.0.windows-amd64.zip`.
    #[must_use]
    pub fn archive_filename(&self) -> String {
        archive_filename(&self.version, self.arch)
    }
}

/// Deterministic archive name for a version and architecture.
#[must_use]
pub fn archive_filename(version: &GoVersion, arch: Architecture) -> String {
    format!("go{version}.windows-{}.zip", arch.go_name())
}

/// Source of release descriptors.
#[allow(async_fn_in_trait)]
pub trait CatalogProvider {
    /// Fetches the full list of Windows archive releases.
    async fn fetch(&self) -> GvsResult<Vec<ReleaseDescriptor>>;
}

/// Release file as published in the go.dev JSON index.
#[derive(Debug, Deserialize)]
struct WireFile {
    filename: String,
    os: String,
    arch: String,
    version: String,
    #[serde(default)]
    sha256: String,
    #[serde(default)]
    size: u64,
    kind: String,
}

#[derive(Debug, Deserialize)]
struct WireRelease {
    files: Vec<WireFile>,
}

/// Catalog provider backed by the go.dev download index.
#[derive(Debug, Clone)]
pub struct HttpCatalog {
    client: reqwest::Client,
    server: String,
}

impl HttpCatalog {
    /// Creates a provider for `server` (e.g. `https://go.dev`).
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(server: &str, timeout: Duration) -> GvsResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| GvsError::download_with_source("Failed to create HTTP client", e))?;
        Ok(Self {
            client,
            server: server.trim_end_matches('/').to_string(),
        })
    }

    fn index_url(&self) -> String {
        format!("{}{INDEX_PATH}", self.server)
    }

    fn convert(&self, file: WireFile) -> Option<ReleaseDescriptor> {
        if file.os != "windows" || file.kind != "archive" {
            return None;
        }
        let version = file.version.parse::<GoVersion>().ok()?;
        let arch = file.arch.parse::<Architecture>().ok()?;
        if !is_sha256_hex(&file.sha256) {
            debug!(filename = %file.filename, "skipping release without a valid digest");
            return None;
        }
        Some(ReleaseDescriptor {
            version,
            os: file.os,
            arch,
            kind: file.kind,
            size: file.size,
            display_size: format_bytes(file.size),
            sha256: file.sha256.to_ascii_lowercase(),
            download_url: format!("{}/dl/{}", self.server, file.filename),
        })
    }
}

impl CatalogProvider for HttpCatalog {
    async fn fetch(&self) -> GvsResult<Vec<ReleaseDescriptor>> {
        let url = self.index_url();
        debug!(%url, "fetching release index");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| GvsError::download_with_source(format!("Failed to fetch {url}"), e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GvsError::catalog(format!("HTTP error {status}: {url}")));
        }

        let text = response
            .text()
            .await
            .map_err(|e| GvsError::download_with_source(format!("Failed to read {url}"), e))?;
        let releases: Vec<WireRelease> = serde_json::from_str(&text)
            .map_err(|e| GvsError::serialization(format!("Failed to parse index from {url}"), e))?;

        let mut descriptors: Vec<ReleaseDescriptor> = releases
            .into_iter()
            .flat_map(|release| release.files)
            .filter_map(|file| self.convert(file))
            .collect();
        sort_releases(&mut descriptors);
        descriptors.dedup_by(|a, b| a.version == b.version && a.arch == b.arch);
        Ok(descriptors)
    }
}

/// Sorts newest version first, then by architecture.
pub fn sort_releases(releases: &mut [ReleaseDescriptor]) {
    releases.sort_by(|a, b| b.version.cmp(&a.version).then(a.arch.cmp(&b.arch)));
}

/// Finds the descriptor for an exact version and architecture.
#[must_use]
pub fn find<'a>(
    releases: &'a [ReleaseDescriptor],
    version: &GoVersion,
    arch: Architecture,
) -> Option<&'a ReleaseDescriptor> {
    releases
        .iter()
        .find(|r| &r.version == version && r.arch == arch)
}

/// Like [`find`], but a miss is an error.
///
/// # Errors
///
/// Returns `NotFound` if the catalog has no such release.
pub fn resolve(
    releases: &[ReleaseDescriptor],
    version: &GoVersion,
    arch: Architecture,
) -> GvsResult<ReleaseDescriptor> {
    find(releases, version, arch)
        .cloned()
        .ok_or_else(|| GvsError::not_found(version.to_string(), arch.to_string()))
}

/// On-disk cache of the catalog.
#[derive(Debug, Clone)]
pub struct CatalogCache {
    path: PathBuf,
    refresh_interval: Duration,
}

impl CatalogCache {
    #[must_use]
    pub fn new(path: PathBuf, refresh_interval: Duration) -> Self {
        Self {
            path,
            refresh_interval,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Time of the last successful refresh, if a cache exists.
    #[must_use]
    pub fn last_updated(&self) -> Option<SystemTime> {
        std::fs::metadata(&self.path).and_then(|m| m.modified()).ok()
    }

    /// True when there is no cache or it is older than the refresh interval.
    #[must_use]
    pub fn is_stale(&self) -> bool {
        match self.last_updated() {
            None => true,
            Some(modified) => SystemTime::now()
                .duration_since(modified)
                .is_ok_and(|age| age >= self.refresh_interval),
        }
    }

    /// Reads the cached list. A missing or unreadable cache yields `None`.
    #[must_use]
    pub fn load(&self) -> Option<Vec<ReleaseDescriptor>> {
        let content = std::fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&content) {
            Ok(releases) => Some(releases),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "ignoring unreadable catalog cache");
                None
            }
        }
    }

    /// Replaces the cache, which also resets its refresh clock.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be serialized or written.
    pub fn save(&self, releases: &[ReleaseDescriptor]) -> GvsResult<()> {
        let content = serde_json::to_vec_pretty(releases)
            .map_err(|e| GvsError::serialization("Failed to serialize catalog", e))?;
        write_atomic(&self.path, &content)
    }

    /// Returns the catalog, refreshing it from `provider` when stale or forced.
    ///
    /// # Errors
    ///
    /// Returns the provider's error when the refresh fails and there is no
    /// usable cache to fall back to.
    pub async fn get<P: CatalogProvider>(&self, provider: &P, force: bool) -> GvsResult<CatalogLoad> {
        if !force
            && !self.is_stale()
            && let Some(releases) = self.load()
        {
            debug!(count = releases.len(), "using cached catalog");
            return Ok(CatalogLoad {
                releases,
                refresh_attempted: false,
            });
        }

        let releases = match provider.fetch().await {
            Ok(releases) => {
                self.save(&releases)?;
                debug!(count = releases.len(), "catalog refreshed");
                releases
            }
            Err(e) => match self.load() {
                Some(releases) => {
                    warn!(error = %e, "catalog refresh failed, using cached copy");
                    releases
                }
                None => {
                    return Err(GvsError::catalog(format!(
                        "Failed to fetch release catalog and no cache exists: {e}"
                    )));
                }
            },
        };
        Ok(CatalogLoad {
            releases,
            refresh_attempted: true,
        })
    }

    /// Returns a catalog that should list `(version, arch)`.
    ///
    /// A cached catalog can predate a new release, so a miss in one that was
    /// served without asking the provider triggers a single forced refresh.
    /// The release may still be missing afterwards; resolving it is up to the
    /// caller.
    ///
    /// # Errors
    ///
    /// Same as [`CatalogCache::get`].
    pub async fn get_for<P: CatalogProvider>(
        &self,
        provider: &P,
        version: &GoVersion,
        arch: Architecture,
    ) -> GvsResult<Vec<ReleaseDescriptor>> {
        let load = self.get(provider, false).await?;
        if load.refresh_attempted || find(&load.releases, version, arch).is_some() {
            return Ok(load.releases);
        }
        debug!(%version, %arch, "release not in cached catalog, refreshing");
        Ok(self.get(provider, true).await?.releases)
    }
}

/// What [`CatalogCache::get`] returned and how.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogLoad {
    pub releases: Vec<ReleaseDescriptor>,
    /// The provider was asked for a new catalog, whether or not it answered.
    pub refresh_attempted: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::temp_test_dir;
    use httpmock::{Method::GET, MockServer};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    struct StaticCatalog {
        releases: Option<Vec<ReleaseDescriptor>>,
        calls: AtomicUsize,
    }

    impl StaticCatalog {
        fn ok(releases: Vec<ReleaseDescriptor>) -> Self {
            Self {
                releases: Some(releases),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                releases: None,
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl CatalogProvider for StaticCatalog {
        async fn fetch(&self) -> GvsResult<Vec<ReleaseDescriptor>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.releases
                .clone()
                .ok_or_else(|| GvsError::download("connection refused"))
        }
    }

    fn release(version: &str, arch: Architecture) -> ReleaseDescriptor {
        let version: GoVersion = version.parse().unwrap();
        ReleaseDescriptor {
            download_url: format!("https://go.dev/dl/{}", archive_filename(&version, arch)),
            version,
            os: "windows".to_string(),
            arch,
            kind: "archive".to_string(),
            size: 1024,
            display_size: "1.00 KB".to_string(),
            sha256: "0".repeat(64),
        }
    }

    fn age_file(path: &Path, age: Duration) {
        let file = std::fs::File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - age).unwrap();
    }

    #[test]
    fn archive_filename_uses_go_arch_name() {
        let r = release("1.21.0", Architecture::X86);
        assert_eq!(r.archive_filename(), "go1.21.0.windows-386.zip");
        let r = release("1.21.0", Architecture::X64);
        assert_eq!(r.archive_filename(), "go1.21.0.windows-amd64.zip");
    }

    #[test]
    fn resolve_matches_version_and_arch_exactly() {
        let releases = vec![
            release("1.21.0", Architecture::X64),
            release("1.21.0", Architecture::X86),
            release("1.21", Architecture::X64),
        ];
        let found = resolve(&releases, &"1.21.0".parse().unwrap(), Architecture::X64).unwrap();
        assert_eq!(found, releases[0]);

        let err = resolve(&releases, &"1.20.0".parse().unwrap(), Architecture::X64).unwrap_err();
        assert!(matches!(err, GvsError::NotFound { .. }));
        let err = resolve(&releases, &"1.21".parse().unwrap(), Architecture::Arm64).unwrap_err();
        assert!(matches!(err, GvsError::NotFound { .. }));
    }

    #[test]
    fn sort_releases_is_numeric_newest_first() {
        let mut releases = vec![
            release("1.9.10", Architecture::X64),
            release("1.10.1", Architecture::X64),
            release("1.2.0", Architecture::X64),
        ];
        sort_releases(&mut releases);
        let order: Vec<String> = releases.iter().map(|r| r.version.to_string()).collect();
        assert_eq!(order, ["1.10.1", "1.9.10", "1.2.0"]);
    }

    #[tokio::test]
    async fn missing_cache_is_fetched_and_saved() {
        let dir = temp_test_dir("catalog_fetch");
        let cache = CatalogCache::new(dir.join("versions.json"), 7 * DAY);
        let provider = StaticCatalog::ok(vec![release("1.21.0", Architecture::X64)]);

        let load = cache.get(&provider, false).await.unwrap();
        let releases = load.releases;

        assert!(load.refresh_attempted);
        assert_eq!(releases.len(), 1);
        assert_eq!(provider.calls(), 1);
        assert_eq!(cache.load().unwrap(), releases);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn fresh_cache_skips_provider_unless_forced() {
        let dir = temp_test_dir("catalog_fresh");
        let cache = CatalogCache::new(dir.join("versions.json"), 7 * DAY);
        cache.save(&[release("1.20.0", Architecture::X64)]).unwrap();
        let provider = StaticCatalog::ok(vec![release("1.21.0", Architecture::X64)]);

        let load = cache.get(&provider, false).await.unwrap();
        assert_eq!(provider.calls(), 0);
        assert!(!load.refresh_attempted);
        assert_eq!(load.releases[0].version.to_string(), "1.20.0");

        let releases = cache.get(&provider, true).await.unwrap().releases;
        assert_eq!(provider.calls(), 1);
        assert_eq!(releases[0].version.to_string(), "1.21.0");
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn stale_cache_is_refreshed() {
        let dir = temp_test_dir("catalog_stale");
        let cache = CatalogCache::new(dir.join("versions.json"), 7 * DAY);
        cache.save(&[release("1.20.0", Architecture::X64)]).unwrap();
        age_file(cache.path(), 8 * DAY);
        assert!(cache.is_stale());

        let provider = StaticCatalog::ok(vec![release("1.21.0", Architecture::X64)]);
        let releases = cache.get(&provider, false).await.unwrap().releases;

        assert_eq!(provider.calls(), 1);
        assert_eq!(releases[0].version.to_string(), "1.21.0");
        assert!(!cache.is_stale());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn failed_refresh_falls_back_to_cache() {
        let dir = temp_test_dir("catalog_fallback");
        let cache = CatalogCache::new(dir.join("versions.json"), 7 * DAY);
        cache.save(&[release("1.20.0", Architecture::X64)]).unwrap();

        let load = cache.get(&StaticCatalog::failing(), true).await.unwrap();
        let releases = load.releases;

        assert!(load.refresh_attempted);
        assert_eq!(releases.len(), 1);
        assert_eq!(releases[0].version.to_string(), "1.20.0");
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn release_lookup_refreshes_fresh_cache_once_on_miss() {
        let dir = temp_test_dir("catalog_for_fresh");
        let cache = CatalogCache::new(dir.join("versions.json"), 7 * DAY);
        cache.save(&[release("1.20.0", Architecture::X64)]).unwrap();
        let provider = StaticCatalog::ok(vec![release("1.21.0", Architecture::X64)]);
        let wanted: GoVersion = "1.21.0".parse().unwrap();

        let releases = cache.get_for(&provider, &wanted, Architecture::X64).await.unwrap();
        assert_eq!(provider.calls(), 1);
        assert!(find(&releases, &wanted, Architecture::X64).is_some());

        let releases = cache.get_for(&provider, &wanted, Architecture::X64).await.unwrap();
        assert_eq!(provider.calls(), 1);
        assert_eq!(releases.len(), 1);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn release_lookup_does_not_refetch_after_stale_refresh() {
        let dir = temp_test_dir("catalog_for_stale");
        let cache = CatalogCache::new(dir.join("versions.json"), 7 * DAY);
        cache.save(&[release("1.20.0", Architecture::X64)]).unwrap();
        age_file(cache.path(), 8 * DAY);
        let provider = StaticCatalog::ok(vec![release("1.20.0", Architecture::X64)]);

        let releases = cache
            .get_for(&provider, &"1.99.0".parse().unwrap(), Architecture::X64)
            .await
            .unwrap();

        assert_eq!(provider.calls(), 1);
        assert_eq!(releases.len(), 1);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn release_lookup_does_not_retry_a_failed_refresh() {
        let dir = temp_test_dir("catalog_for_failing");
        let cache = CatalogCache::new(dir.join("versions.json"), 7 * DAY);
        cache.save(&[release("1.20.0", Architecture::X64)]).unwrap();
        age_file(cache.path(), 8 * DAY);
        let provider = StaticCatalog::failing();

        let releases = cache
            .get_for(&provider, &"1.21.0".parse().unwrap(), Architecture::X64)
            .await
            .unwrap();

        assert_eq!(provider.calls(), 1);
        assert_eq!(releases[0].version.to_string(), "1.20.0");
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn failed_refresh_without_cache_is_an_error() {
        let dir = temp_test_dir("catalog_nocache");
        let cache = CatalogCache::new(dir.join("versions.json"), 7 * DAY);

        let err = cache.get(&StaticCatalog::failing(), false).await.unwrap_err();

        assert!(matches!(err, GvsError::Catalog { .. }));
        assert!(!cache.path().exists());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn http_catalog_keeps_only_windows_archives() {
        let index = br#"[
          {"version": "go1.21.0", "stable": true, "files": [
            {"filename": "go1.21.0.windows-amd64.zip", "os": "windows", "arch": "amd64",
             "version": "go1.21.0", "sha256": "ABCDEF0123456789ABCDEF0123456789ABCDEF0123456789ABCDEF0123456789",
             "size": 73400320, "kind": "archive"},
            {"filename": "go1.21.0.windows-amd64.msi", "os": "windows", "arch": "amd64",
             "version": "go1.21.0", "sha256": "00", "size": 1, "kind": "installer"},
            {"filename": "go1.21.0.linux-amd64.tar.gz", "os": "linux", "arch": "amd64",
             "version": "go1.21.0", "sha256": "00", "size": 1, "kind": "archive"},
            {"filename": "go1.21.0.windows-386.zip", "os": "windows", "arch": "386",
             "version": "go1.21.0", "sha256": "1111111111111111111111111111111111111111111111111111111111111111",
             "size": 2048, "kind": "archive"},
            {"filename": "go1.21.0.windows-arm64.zip", "os": "windows", "arch": "arm64",
             "version": "go1.21.0", "sha256": "not-a-digest", "size": 1, "kind": "archive"},
            {"filename": "go1.21.0.src.tar.gz", "os": "", "arch": "",
             "version": "go1.21.0", "sha256": "22", "size": 1, "kind": "source"}
          ]},
          {"version": "go1.22rc1", "stable": false, "files": [
            {"filename": "go1.22rc1.windows-amd64.zip", "os": "windows", "arch": "amd64",
             "version": "go1.22rc1", "sha256": "33", "size": 1, "kind": "archive"}
          ]}
        ]"#;
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/dl/")
                .query_param("mode", "json")
                .query_param("include", "all");
            then.status(200)
                .header("content-type", "application/json")
                .body(index);
        });
        let catalog =
            HttpCatalog::new(&format!("{}/", server.base_url()), Duration::from_secs(10)).unwrap();

        let releases = catalog.fetch().await.unwrap();

        mock.assert_hits(1);
        assert_eq!(releases.len(), 2);
        let x64 = find(&releases, &"1.21.0".parse().unwrap(), Architecture::X64).unwrap();
        assert_eq!(x64.download_url, server.url("/dl/go1.21.0.windows-amd64.zip"));
        assert_eq!(x64.sha256, "abcdef0123456789abcdef0123456789abcdef0123456789abcdef0123456789");
        assert_eq!(x64.display_size, "70.00 MB");
        assert!(find(&releases, &"1.21.0".parse().unwrap(), Architecture::X86).is_some());
    }

    #[tokio::test]
    async fn http_catalog_reports_server_errors() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/dl/");
            then.status(503);
        });
        let catalog = HttpCatalog::new(&server.base_url(), Duration::from_secs(10)).unwrap();

        let err = catalog.fetch().await.unwrap_err();
        assert!(matches!(&err, GvsError::Catalog { message } if message.contains("503")));
    }
}
