//! HTTP download of toolchain archives.
//!
//! A download is a single pipe: response chunks are written to a temporary
//! file and fed to a SHA-256 hasher as they arrive. The temporary file is
//! renamed onto the destination only after the whole body was received, so a
//! file at the destination path is always complete.
//!
//! Failures are surfaced, not retried:
//!
//! - non-2xx status
//! - connection or read errors, including the request timeout
//! - a body shorter than its `Content-Length`
//! - cancellation
//!
//! In every case the temporary file is removed.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;

use super::cancel::CancelToken;
use crate::errors::{GvsError, GvsResult};

/// User-Agent header for HTTP requests.
pub const USER_AGENT: &str = concat!("gvs/", env!("CARGO_PKG_VERSION"));

/// Progress event emitted during downloads.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// Response headers received.
    Started {
        /// Announced body size, if any.
        total: Option<u64>,
    },
    /// More bytes arrived.
    Progress {
        /// Bytes written so far.
        downloaded: u64,
        /// Announced body size, if any.
        total: Option<u64>,
        /// Average speed in bytes per second.
        speed: u64,
    },
    /// The body was fully written and renamed into place.
    Completed {
        /// Final size in bytes.
        bytes: u64,
    },
}

/// Callback type for receiving progress updates.
pub type ProgressCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// Minimum interval between progress callbacks.
const PROGRESS_INTERVAL: Duration = Duration::from_millis(250);

/// Streams HTTP bodies to disk.
#[derive(Debug, Clone)]
pub struct Downloader {
    client: reqwest::Client,
}

impl Downloader {
    /// Creates a downloader whose requests are bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(timeout: Duration) -> GvsResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| GvsError::download_with_source("Failed to create HTTP client", e))?;
        Ok(Self { client })
    }

    /// Downloads `url` to `dest` and returns the lowercase hex SHA-256 of the body.
    ///
    /// # Errors
    ///
    /// Returns `Download` for HTTP, network and truncation failures,
    /// `Cancelled` when `cancel` fires, and `Io` for local file errors.
    pub async fn download(
        &self,
        url: &str,
        dest: &Path,
        cancel: &CancelToken,
        progress: Option<&ProgressCallback>,
    ) -> GvsResult<String> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                GvsError::io(format!("Failed to create directory: {}", parent.display()), e)
            })?;
        }

        let temp_path = temp_path_for(dest);
        match self.stream_to(url, &temp_path, cancel, progress).await {
            Ok((digest, bytes)) => {
                tokio::fs::rename(&temp_path, dest).await.map_err(|e| {
                    GvsError::io(
                        format!(
                            "Failed to rename {} to {}",
                            temp_path.display(),
                            dest.display()
                        ),
                        e,
                    )
                })?;
                if let Some(callback) = progress {
                    callback(ProgressEvent::Completed { bytes });
                }
                Ok(digest)
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&temp_path).await;
                Err(e)
            }
        }
    }

    async fn stream_to(
        &self,
        url: &str,
        temp_path: &Path,
        cancel: &CancelToken,
        progress: Option<&ProgressCallback>,
    ) -> GvsResult<(String, u64)> {
        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(GvsError::Cancelled),
            response = self.client.get(url).send() => response
                .map_err(|e| GvsError::download_with_source(format!("Failed to connect to {url}"), e))?,
        };

        let status = response.status();
        if !status.is_success() {
            return Err(GvsError::download(format!("HTTP error {status}: {url}")));
        }

        let total = response.content_length();
        if let Some(callback) = progress {
            callback(ProgressEvent::Started { total });
        }

        let mut file = tokio::fs::File::create(temp_path).await.map_err(|e| {
            GvsError::io(format!("Failed to create file: {}", temp_path.display()), e)
        })?;

        let mut hasher = Sha256::new();
        let mut stream = response.bytes_stream();
        let mut downloaded: u64 = 0;
        let start = Instant::now();
        let mut last_update = Instant::now();

        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(GvsError::Cancelled),
                next = stream.next() => next,
            };
            let Some(chunk) = next else { break };
            let chunk = chunk.map_err(|e| {
                GvsError::download_with_source(format!("Failed to read response body from {url}"), e)
            })?;

            file.write_all(&chunk).await.map_err(|e| {
                GvsError::io(format!("Failed to write to {}", temp_path.display()), e)
            })?;
            hasher.update(&chunk);
            downloaded += chunk.len() as u64;

            if let Some(callback) = progress
                && last_update.elapsed() >= PROGRESS_INTERVAL
            {
                callback(ProgressEvent::Progress {
                    downloaded,
                    total,
                    speed: average_speed(downloaded, start.elapsed()),
                });
                last_update = Instant::now();
            }
        }

        if let Some(expected) = total
            && downloaded != expected
        {
            return Err(GvsError::download(format!(
                "Truncated download from {url}: received {downloaded} of {expected} bytes"
            )));
        }

        file.flush()
            .await
            .map_err(|e| GvsError::io(format!("Failed to flush {}", temp_path.display()), e))?;
        file.sync_all()
            .await
            .map_err(|e| GvsError::io(format!("Failed to sync {}", temp_path.display()), e))?;

        Ok((hex::encode(hasher.finalize()), downloaded))
    }
}

/// Temporary sibling used while a download is in flight.
#[must_use]
pub fn temp_path_for(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn average_speed(bytes: u64, elapsed: Duration) -> u64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        (bytes as f64 / secs) as u64
    } else {
        0
    }
}

/// Formats bytes into a human-readable string (KB, MB, GB).
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;

    #[allow(clippy::cast_precision_loss)]
    let bytes_f = bytes as f64;

    if bytes_f >= GB {
        format!("{:.2} GB", bytes_f / GB)
    } else if bytes_f >= MB {
        format!("{:.2} MB", bytes_f / MB)
    } else if bytes_f >= KB {
        format!("{:.2} KB", bytes_f / KB)
    } else {
        format!("{bytes} B")
    }
}

/// Formats a speed in bytes per second.
#[must_use]
pub fn format_speed(bytes_per_sec: u64) -> String {
    format!("{}/s", format_bytes(bytes_per_sec))
}
