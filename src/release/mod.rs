//! Converter release discovery and artifact download
//!
//! [`ReleaseFetcher`] lists published converter versions from the release index
//! and downloads the chosen artifact into a local cache:
//!
//! ```text
//! <cache_dir>/<tag>/<jar_name>
//! ```
//!
//! Downloads stream into `<jar_name>.part` and are renamed into place only after
//! the body is complete (and its digest verified, when the index publishes one),
//! so a cached file is always a whole artifact. A cached file whose size matches
//! the index is reused without touching the network.

mod index;


use crate::config::{DiskSpaceConfig, ReleaseConfig};
use crate::error::{Error, ReleaseError, Result};
use crate::retry::retry_with_backoff;
use crate::types::{Event, ToolArtifact};
use crate::utils::{check_disk_space, ensure_dir, sanitize_component};
use futures::StreamExt;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast;

/// Bytes between two progress events
const PROGRESS_STEP: u64 = 256 * 1024;

/// Lists and downloads converter releases
#[derive(Clone)]
pub struct ReleaseFetcher {
    config: ReleaseConfig,
    disk_space: DiskSpaceConfig,
    client: reqwest::Client,
    event_tx: broadcast::Sender<Event>,
}

impl ReleaseFetcher {
    /// Create a fetcher
    ///
    /// The request timeout bounds connection setup and index queries; artifact
    /// bodies may take as long as they need.
    pub fn new(
        config: ReleaseConfig,
        disk_space: DiskSpaceConfig,
        event_tx: broadcast::Sender<Event>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.request_timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| Error::Other(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config,
            disk_space,
            client,
            event_tx,
        })
    }

    /// Published converter versions, newest first
    ///
    /// Each entry carries `local_path` when the artifact is already present in the
    /// cache or a search directory.
    ///
    /// # Errors
    ///
    /// - [`ReleaseError::Unreachable`] if the index cannot be fetched (after retries)
    /// - [`ReleaseError::Parse`] if the response is not a release listing
    pub async fn list_versions(&self) -> Result<Vec<ToolArtifact>> {
        let url = self.config.index_url.clone();
        let body = retry_with_backoff(&self.config.retry, || self.fetch_index(&url)).await?;

        let mut artifacts = index::parse_index(
            &body,
            &self.config.asset_prefix,
            &self.config.asset_suffix,
        )
        .map_err(|e| ReleaseError::Parse {
            url: url.clone(),
            reason: e.to_string(),
        })?;

        for artifact in &mut artifacts {
            artifact.local_path = self.find_local(artifact).await;
        }

        tracing::info!(url = %url, count = artifacts.len(), "fetched release index");
        self.event_tx
            .send(Event::ReleasesListed {
                count: artifacts.len(),
            })
            .ok();

        Ok(artifacts)
    }

    /// Download the artifact published under `tag` (or reuse the cached copy)
    ///
    /// When the index cannot be reached, a copy of `tag` already in the cache or a
    /// search directory is used as is (its size cannot be checked offline).
    ///
    /// # Errors
    ///
    /// [`ReleaseError::NotFound`] if the index has no converter artifact for `tag`,
    /// [`ReleaseError::Unreachable`] if the index is down and nothing is cached,
    /// plus everything [`download_artifact`](Self::download_artifact) returns.
    pub async fn download(&self, tag: &str) -> Result<PathBuf> {
        let artifacts = match self.list_versions().await {
            Ok(artifacts) => artifacts,
            Err(Error::Release(ReleaseError::Unreachable { url, reason })) => {
                let Some(path) = self.cached_copy(tag).await? else {
                    return Err(ReleaseError::Unreachable { url, reason }.into());
                };
                tracing::warn!(
                    tag = %tag,
                    path = %path.display(),
                    reason = %reason,
                    "release index unreachable, using cached artifact"
                );
                self.event_tx
                    .send(Event::ArtifactCached {
                        tag: tag.to_string(),
                        path: path.clone(),
                    })
                    .ok();
                return Ok(path);
            }
            Err(e) => return Err(e),
        };
        let artifact = artifacts
            .into_iter()
            .find(|a| a.version_tag == tag)
            .ok_or_else(|| ReleaseError::NotFound {
                tag: tag.to_string(),
            })?;

        self.download_artifact(&artifact).await
    }

    /// Download one artifact into the cache and return its local path
    ///
    /// An already-cached copy is returned immediately. On any failure the
    /// partially written file is removed and nothing is left at the final path.
    pub async fn download_artifact(&self, artifact: &ToolArtifact) -> Result<PathBuf> {
        let tag = artifact.version_tag.clone();

        if let Some(path) = self.find_local(artifact).await {
            tracing::debug!(tag = %tag, path = %path.display(), "artifact already cached");
            self.event_tx
                .send(Event::ArtifactCached {
                    tag,
                    path: path.clone(),
                })
                .ok();
            return Ok(path);
        }

        let final_path = self.cache_path(artifact);
        let part_path = part_path(&final_path);

        let result = async {
            if let Some(dir) = final_path.parent() {
                check_disk_space(dir, artifact.size.unwrap_or(0), &self.disk_space)?;
                ensure_dir(dir).await?;
            }

            self.event_tx
                .send(Event::DownloadStarted {
                    tag: tag.clone(),
                    total_bytes: artifact.size,
                })
                .ok();
            tracing::info!(
                tag = %tag,
                url = %artifact.download_url,
                size = ?artifact.size,
                "downloading converter artifact"
            );

            retry_with_backoff(&self.config.retry, || {
                self.fetch_artifact(artifact, &part_path)
            })
            .await?;

            tokio::fs::rename(&part_path, &final_path)
                .await
                .map_err(|e| Error::disk(&final_path, e))
        }
        .await;

        match result {
            Ok(()) => {
                tracing::info!(tag = %tag, path = %final_path.display(), "artifact downloaded");
                self.event_tx
                    .send(Event::DownloadComplete {
                        tag,
                        path: final_path.clone(),
                    })
                    .ok();
                Ok(final_path)
            }
            Err(e) => {
                // NotFound is fine here: the part file may never have been created
                let _ = tokio::fs::remove_file(&part_path).await;
                tracing::warn!(tag = %tag, error = %e, "artifact download failed");
                self.event_tx
                    .send(Event::DownloadFailed {
                        tag,
                        error: e.to_string(),
                    })
                    .ok();
                Err(e)
            }
        }
    }

    /// Artifacts already present locally, without consulting the index
    ///
    /// Scans `<cache_dir>/<tag>/` and the configured search directories for files
    /// matching the asset prefix and suffix. Sorted by tag, newest name last.
    pub async fn cached_artifacts(&self) -> Result<Vec<ToolArtifact>> {
        let mut found = Vec::new();

        if let Some(mut entries) = read_dir_if_exists(&self.config.cache_dir).await? {
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| Error::disk(&self.config.cache_dir, e))?
            {
                let dir = entry.path();
                if !dir.is_dir() {
                    continue;
                }
                let tag = entry.file_name().to_string_lossy().into_owned();
                for path in self.matching_files(&dir).await? {
                    found.push(local_artifact(tag.clone(), path));
                }
            }
        }

        for dir in &self.config.search_dirs {
            for path in self.matching_files(dir).await? {
                let tag = self.tag_from_file_name(&path);
                found.push(local_artifact(tag, path));
            }
        }

        found.sort_by(|a, b| a.version_tag.cmp(&b.version_tag));
        Ok(found)
    }

    /// Local copy of `tag` found without the index
    async fn cached_copy(&self, tag: &str) -> Result<Option<PathBuf>> {
        let dir_name = sanitize_component(tag);
        Ok(self
            .cached_artifacts()
            .await?
            .into_iter()
            .find(|a| a.version_tag == tag || a.version_tag == dir_name)
            .and_then(|a| a.local_path))
    }

    /// Cache location of an artifact
    pub fn cache_path(&self, artifact: &ToolArtifact) -> PathBuf {
        self.config
            .cache_dir
            .join(sanitize_component(&artifact.version_tag))
            .join(sanitize_component(&artifact.jar_name))
    }

    async fn fetch_index(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .timeout(self.config.request_timeout)
            .send()
            .await
            .map_err(|e| unreachable(url, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ReleaseError::Unreachable {
                url: url.to_string(),
                reason: format!("HTTP {}", status.as_u16()),
            }
            .into());
        }

        let body = response.bytes().await.map_err(|e| unreachable(url, &e))?;
        Ok(body.to_vec())
    }

    /// One download attempt; truncates and rewrites `part_path`
    async fn fetch_artifact(&self, artifact: &ToolArtifact, part_path: &Path) -> Result<()> {
        let url = artifact.download_url.as_str();
        let tag = artifact.version_tag.as_str();

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| unreachable(url, &e))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ReleaseError::NotFound {
                tag: tag.to_string(),
            }
            .into());
        }
        if !status.is_success() {
            return Err(ReleaseError::Unreachable {
                url: url.to_string(),
                reason: format!("HTTP {}", status.as_u16()),
            }
            .into());
        }

        let total = response.content_length().or(artifact.size);
        let mut file = tokio::fs::File::create(part_path)
            .await
            .map_err(|e| Error::disk(part_path, e))?;
        let mut hasher = Sha256::new();
        let mut downloaded: u64 = 0;
        let mut last_reported: u64 = 0;

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| unreachable(url, &e))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| Error::disk(part_path, e))?;
            hasher.update(&chunk);
            downloaded += chunk.len() as u64;

            if downloaded - last_reported >= PROGRESS_STEP || Some(downloaded) == total {
                last_reported = downloaded;
                self.event_tx
                    .send(Event::DownloadProgress {
                        tag: tag.to_string(),
                        downloaded_bytes: downloaded,
                        percent: total
                            .filter(|t| *t > 0)
                            .map(|t| (downloaded as f64 / t as f64 * 100.0).min(100.0) as f32),
                    })
                    .ok();
            }
        }

        file.flush().await.map_err(|e| Error::disk(part_path, e))?;
        drop(file);

        if self.config.verify_checksums
            && let Some(expected) = &artifact.sha256
        {
            let actual = format!("{:x}", hasher.finalize());
            if !actual.eq_ignore_ascii_case(expected) {
                return Err(ReleaseError::Checksum {
                    tag: tag.to_string(),
                    expected: expected.clone(),
                    actual,
                }
                .into());
            }
        }

        Ok(())
    }

    /// Cached or search-directory copy of an artifact with the expected size
    async fn find_local(&self, artifact: &ToolArtifact) -> Option<PathBuf> {
        let candidates = std::iter::once(self.cache_path(artifact)).chain(
            self.config
                .search_dirs
                .iter()
                .map(|dir| dir.join(sanitize_component(&artifact.jar_name))),
        );

        for candidate in candidates {
            let Ok(metadata) = tokio::fs::metadata(&candidate).await else {
                continue;
            };
            if !metadata.is_file() {
                continue;
            }
            match artifact.size {
                Some(expected) if expected != metadata.len() => {
                    tracing::debug!(
                        path = %candidate.display(),
                        expected,
                        actual = metadata.len(),
                        "ignoring local artifact with unexpected size"
                    );
                }
                _ => return Some(candidate),
            }
        }

        None
    }

    async fn matching_files(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let Some(mut entries) = read_dir_if_exists(dir).await? else {
            return Ok(files);
        };

        while let Some(entry) = entries.next_entry().await.map_err(|e| Error::disk(dir, e))? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(&self.config.asset_prefix)
                && name.ends_with(&self.config.asset_suffix)
                && entry.path().is_file()
            {
                files.push(entry.path());
            }
        }

        files.sort();
        Ok(files)
    }

    /// `chunker-cli-1.7.0.jar` -> `1.7.0`
    fn tag_from_file_name(&self, path: &Path) -> String {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        name.strip_prefix(self.config.asset_prefix.as_str())
            .and_then(|rest| rest.strip_suffix(self.config.asset_suffix.as_str()))
            .map(str::to_string)
            .unwrap_or(name)
    }
}

fn part_path(final_path: &Path) -> PathBuf {
    let mut name = final_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    final_path.with_file_name(name)
}

fn unreachable(url: &str, error: &reqwest::Error) -> Error {
    let reason = if error.is_timeout() {
        "timed out".to_string()
    } else if error.is_connect() {
        format!("connection failed: {}", error)
    } else {
        error.to_string()
    };

    ReleaseError::Unreachable {
        url: url.to_string(),
        reason,
    }
    .into()
}

async fn read_dir_if_exists(dir: &Path) -> Result<Option<tokio::fs::ReadDir>> {
    match tokio::fs::read_dir(dir).await {
        Ok(entries) => Ok(Some(entries)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::disk(dir, e)),
    }
}

fn local_artifact(version_tag: String, path: PathBuf) -> ToolArtifact {
    let jar_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    ToolArtifact {
        version_tag,
        jar_name,
        download_url: String::new(),
        published_at: None,
        size: std::fs::metadata(&path).ok().map(|m| m.len()),
        sha256: None,
        local_path: Some(path),
    }
}
