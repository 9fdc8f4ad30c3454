//! Shared fixtures for unit tests: scratch directories, zip builders and a
//! raw HTTP server.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::toolchain::install::go_binary_name;

/// Creates a fresh, empty scratch directory.
pub fn temp_test_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("gvs_test_{}_{}", name, rand::random::<u64>()));
    std::fs::create_dir_all(&dir).expect("Should create temp dir");
    dir
}

/// A zip entry: a file with content, or a directory when `content` is `None`.
pub struct ZipEntry<'a> {
    pub name: &'a str,
    pub content: Option<&'a [u8]>,
}

impl<'a> ZipEntry<'a> {
    pub fn file(name: &'a str, content: &'a [u8]) -> Self {
        Self {
            name,
            content: Some(content),
        }
    }

    pub fn dir(name: &'a str) -> Self {
        Self {
            name,
            content: None,
        }
    }
}

/// Writes a zip archive with the given entries.
pub fn write_zip(path: &Path, entries: &[ZipEntry<'_>]) {
    let file = std::fs::File::create(path).expect("Should create zip file");
    let mut zip = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default();
    for entry in entries {
        match entry.content {
            Some(content) => {
                zip.start_file(entry.name, options)
                    .expect("Should start file");
                zip.write_all(content).expect("Should write content");
            }
            None => {
                zip.add_directory(entry.name, options)
                    .expect("Should add directory");
            }
        }
    }
    zip.finish().expect("Should finish");
}

/// Writes a minimal Go toolchain archive with the official `go/` wrapper.
pub fn write_go_archive(path: &Path) {
    let binary = format!("go/bin/{}", go_binary_name());
    write_zip(
        path,
        &[
            ZipEntry::dir("go/"),
            ZipEntry::file(&binary, b"fake go binary"),
            ZipEntry::file("go/pkg/tool/README", b"tools"),
            ZipEntry::file("go/src/runtime/runtime.go", b"package runtime"),
            ZipEntry::file("go/VERSION", b"go1.21.0"),
        ],
    );
}

/// Builds a toolchain layout directly on disk.
pub fn fake_install(dir: &Path) {
    std::fs::create_dir_all(dir.join("bin")).unwrap();
    std::fs::create_dir_all(dir.join("pkg")).unwrap();
    std::fs::create_dir_all(dir.join("src")).unwrap();
    std::fs::write(dir.join("bin").join(go_binary_name()), b"fake go binary").unwrap();
}

/// Raw HTTP/1.1 server for replies a mock server will not produce: a body
/// shorter than its `Content-Length`, or a different reply per connection.
/// The last reply repeats once the list is exhausted.
pub struct RawServer {
    pub url: String,
    hits: Arc<AtomicUsize>,
}

impl RawServer {
    pub async fn start(replies: Vec<Vec<u8>>) -> Self {
        assert!(!replies.is_empty());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Should bind");
        let addr = listener.local_addr().expect("Should have address");
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                let reply = replies[n.min(replies.len() - 1)].clone();
                tokio::spawn(async move {
                    let mut head = Vec::new();
                    let mut buf = [0u8; 1024];
                    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                        match socket.read(&mut buf).await {
                            Ok(0) | Err(_) => break,
                            Ok(read) => head.extend_from_slice(&buf[..read]),
                        }
                    }
                    let _ = socket.write_all(&reply).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        Self {
            url: format!("http://{addr}"),
            hits,
        }
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

/// `200 OK` announcing `announced` bytes and sending `body`.
pub fn http_reply(body: &[u8], announced: usize) -> Vec<u8> {
    let mut reply = format!(
        "HTTP/1.1 200 OK\r\nContent-Length: {announced}\r\nConnection: close\r\n\r\n"
    )
    .into_bytes();
    reply.extend_from_slice(body);
    reply
}
