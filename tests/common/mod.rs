//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use url_rewriter::config::RewriterServiceConfig;

pub const ADMIN_KEY: &str = "test-admin-key";

pub const RULES: &str = r#"
[[rule]]
id = "about"
kind = "url"
source = "/about-us"
target = "/about"

[[rule]]
id = "campaign"
kind = "url"
source = "/promo?id=7"
target = "https://shop.example.com/summer"

[[rule]]
id = "report"
kind = "url"
source = "/docs/report.pdf"
target = "/files/report-2024.pdf"

[[rule]]
id = "legacy"
kind = "hostname"
source_host_name = "old.example.com"
target_host_name = "www.example.com"
"#;

pub const EXCEPTIONS: &str = r#"
[[type_exception]]
name = "pdf"
sub_types = ["pdf"]
"#;

/// A fresh directory under the system temp dir.
pub fn temp_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("url-rewriter-it-{}", uuid::Uuid::new_v4()));
    fs::create_dir_all(&dir).unwrap();
    dir
}

pub fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

/// Config listening on ephemeral ports, with rule files in `dir`.
pub fn test_config(dir: &Path, upstream: Option<SocketAddr>) -> RewriterServiceConfig {
    let mut config = RewriterServiceConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.rewriter.rules_location = Some(write_file(dir, "rules.toml", RULES));
    config.rewriter.exceptions_location = Some(write_file(dir, "exceptions.toml", EXCEPTIONS));
    config.rewriter.watch_rules = false;
    config.upstream.address = upstream.map(|a| a.to_string());
    config.admin.enabled = true;
    config.admin.bind_address = "127.0.0.1:0".into();
    config.admin.api_key = ADMIN_KEY.into();
    config
}

/// HTTP client that reports redirects instead of following them.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}

/// Start a mock upstream that answers `upstream:<method> <path>`.
pub async fn start_mock_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    tokio::spawn(async move {
                        let mut buf = vec![0u8; 8192];
                        let mut read = 0;
                        while read < buf.len() {
                            match socket.read(&mut buf[read..]).await {
                                Ok(0) | Err(_) => break,
                                Ok(n) => read += n,
                            }
                            if buf[..read].windows(4).any(|w| w == b"\r\n\r\n") {
                                break;
                            }
                        }

                        let head = String::from_utf8_lossy(&buf[..read]);
                        let request_line = head.lines().next().unwrap_or_default();
                        let mut parts = request_line.split_whitespace();
                        let body = format!(
                            "upstream:{} {}",
                            parts.next().unwrap_or_default(),
                            parts.next().unwrap_or_default()
                        );

                        let response = format!(
                            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}
