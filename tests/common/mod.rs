//! Shared fixtures for integration tests: fake worlds, a fake Java runtime and a
//! mocked release index

#![allow(dead_code)]

use chunker_batch::config::{DiskSpaceConfig, RetryConfig};
use chunker_batch::{BatchEvent, BatchHandle, Config};
use std::path::{Path, PathBuf};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Converter bytes served by the mock release server
pub const JAR_BYTES: &[u8] = b"PK\x03\x04 not really a jar";

/// Create a Java Edition world (level.dat + region/) under `root`
pub fn create_world(root: &Path, name: &str) -> PathBuf {
    let world = root.join(name);
    std::fs::create_dir_all(world.join("region")).unwrap();
    std::fs::write(world.join("level.dat"), b"\x0a\x00\x00").unwrap();
    world
}

/// Write an executable shell script standing in for `java`
///
/// `-version` prints a Java 21 banner; any other invocation runs `body` with the
/// converter arguments (`-jar <jar> -i <world> -o <out> -f <format>`).
#[cfg(unix)]
pub fn fake_java(dir: &Path, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("java");
    let script = format!(
        "#!/bin/sh\nif [ \"$1\" = \"-version\" ]; then\n  echo 'openjdk version \"21.0.2\" 2024-01-16' >&2\n  exit 0\nfi\n{}\n",
        body
    );
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Release index with two converter versions, newest listed second
pub fn release_index(server_uri: &str) -> serde_json::Value {
    serde_json::json!([
        {
            "tag_name": "1.6.0",
            "draft": false,
            "published_at": "2024-11-02T10:00:00Z",
            "assets": [{
                "name": "chunker-cli-1.6.0.jar",
                "browser_download_url": format!("{}/download/1.6.0/chunker-cli-1.6.0.jar", server_uri),
                "size": JAR_BYTES.len()
            }]
        },
        {
            "tag_name": "1.7.0",
            "draft": false,
            "published_at": "2025-03-14T09:30:00Z",
            "assets": [
                {
                    "name": "chunker-app-1.7.0.exe",
                    "browser_download_url": format!("{}/download/1.7.0/chunker-app-1.7.0.exe", server_uri),
                    "size": 1024
                },
                {
                    "name": "chunker-cli-1.7.0.jar",
                    "browser_download_url": format!("{}/download/1.7.0/chunker-cli-1.7.0.jar", server_uri),
                    "size": JAR_BYTES.len()
                }
            ]
        }
    ])
}

/// Start a release server serving the index and both jars
pub async fn release_server() -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/releases"))
        .respond_with(ResponseTemplate::new(200).set_body_json(release_index(&server.uri())))
        .mount(&server)
        .await;

    for tag in ["1.6.0", "1.7.0"] {
        Mock::given(method("GET"))
            .and(path(format!("/download/{tag}/chunker-cli-{tag}.jar")))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(JAR_BYTES))
            .mount(&server)
            .await;
    }

    server
}

/// Configuration isolated from the host: temp cache, no PATH search, fast retries
pub fn test_config(server: &MockServer, cache_dir: &Path) -> Config {
    let mut config = Config::default();
    config.release.index_url = format!("{}/releases", server.uri());
    config.release.cache_dir = cache_dir.to_path_buf();
    config.release.retry = RetryConfig {
        max_attempts: 1,
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(10),
        backoff_multiplier: 1.0,
        jitter: false,
    };
    config.runtime.search_path = false;
    config.runtime.java_home = Some(cache_dir.join("no-java-home"));
    config.batch.termination_grace_period = Duration::from_millis(500);
    config.disk_space = DiskSpaceConfig {
        enabled: false,
        ..Default::default()
    };
    config
}

/// Drain the batch event stream, failing the test if it stalls
pub async fn collect_events(handle: &mut BatchHandle) -> Vec<BatchEvent> {
    let mut events = Vec::new();
    loop {
        match tokio::time::timeout(Duration::from_secs(30), handle.next_event()).await {
            Ok(Some(event)) => events.push(event),
            Ok(None) => return events,
            Err(_) => panic!("batch event stream stalled"),
        }
    }
}
