use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use plume_platform::AppPaths;

use crate::download::{DownloadProgress, download_archive};
use crate::events::UpdateEvent;
use crate::release::RendererManifest;

const MANIFEST_FILE: &str = "manifest.json";
const EXTRACTED_DIR: &str = "renderer";
const ENTRY_FILE: &str = "index.html";

/// Durable record of the renderer bundle that was last successfully applied.
///
/// Written strictly after the version directory rename, so a crash mid-apply
/// never leaves it pointing at an incomplete bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstalledManifest {
    pub version: String,
    pub hash: String,
    pub commit: String,
    pub filename: String,
    pub main_hash: String,
    pub downloaded_at: DateTime<Utc>,
}

impl InstalledManifest {
    #[must_use]
    pub fn from_release(manifest: &RendererManifest) -> Self {
        Self {
            version: manifest.version.clone(),
            hash: manifest.hash.clone(),
            commit: manifest.commit.clone(),
            filename: manifest.filename.clone(),
            main_hash: manifest.main_hash.clone(),
            downloaded_at: Utc::now(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SwapError {
    #[error("renderer archive download failed for {url}")]
    DownloadFailed { url: String },
    #[error("extraction produced no '{EXTRACTED_DIR}' directory under {root}")]
    MissingExtractedBundle { root: String },
    #[error("failed to serialize installed manifest: {0}")]
    ManifestEncode(#[source] serde_json::Error),
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl SwapError {
    fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }
}

/// On-disk store of installed renderer bundles.
///
/// Layout under `root`: `manifest.json` plus one directory per installed
/// version. Exactly one version directory survives cleanup, the one named by
/// the manifest.
pub struct RendererStore {
    root: PathBuf,
    staging_dir: PathBuf,
    hot_update_enabled: bool,
}

impl RendererStore {
    #[must_use]
    pub fn new(root: PathBuf, staging_dir: PathBuf, hot_update_enabled: bool) -> Self {
        Self {
            root,
            staging_dir,
            hot_update_enabled,
        }
    }

    #[must_use]
    pub fn from_paths(paths: &AppPaths, hot_update_enabled: bool) -> Self {
        Self::new(
            paths.renderer_root(),
            paths.renderer_staging_dir(),
            hot_update_enabled,
        )
    }

    fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    /// Download, extract, and promote a renderer bundle.
    ///
    /// No-ops when renderer hot update is disabled. Progress and the final
    /// ready notification are forwarded on `events`.
    ///
    /// # Errors
    /// Returns an error when the download fails or the extract/promote/persist
    /// sequence hits the filesystem; nothing is committed in that case.
    pub async fn apply(
        &self,
        client: &reqwest::Client,
        manifest: &RendererManifest,
        events: &mpsc::Sender<UpdateEvent>,
    ) -> Result<(), SwapError> {
        if !self.hot_update_enabled {
            info!("Renderer hot update is disabled, skipping apply");
            return Ok(());
        }

        let archive_path = self.staging_dir.join(&manifest.filename);

        let (tx, mut rx) = mpsc::channel::<DownloadProgress>(16);
        let forward = events.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(progress) = rx.recv().await {
                let _ = forward
                    .send(UpdateEvent::RendererDownloading {
                        downloaded: progress.downloaded,
                        total: progress.total,
                        percent: progress.percent,
                    })
                    .await;
            }
        });

        info!(
            "Downloading renderer {} from {}",
            manifest.version, manifest.download_url
        );
        let ok = download_archive(
            client,
            &manifest.download_url,
            &archive_path,
            Some(&manifest.hash),
            Some(tx),
        )
        .await;
        let _ = forwarder.await;

        if !ok {
            return Err(SwapError::DownloadFailed {
                url: manifest.download_url.clone(),
            });
        }

        self.install_archive(&archive_path, manifest)?;

        if let Err(error) = tokio::fs::remove_file(&archive_path).await {
            warn!(
                "Failed to remove downloaded archive {}: {error}",
                archive_path.display()
            );
        }

        let _ = events
            .send(UpdateEvent::RendererReady {
                version: manifest.version.clone(),
            })
            .await;

        Ok(())
    }

    /// Extract a downloaded archive and promote it to the current version.
    ///
    /// The installed-manifest write is strictly the last step; a failure
    /// anywhere earlier leaves the previous manifest untouched.
    fn install_archive(
        &self,
        archive_path: &Path,
        manifest: &RendererManifest,
    ) -> Result<(), SwapError> {
        std::fs::create_dir_all(&self.root)
            .map_err(|error| SwapError::io("failed to create renderer root", error))?;

        extract_tar_gz(archive_path, &self.root)
            .map_err(|error| SwapError::io("failed to extract renderer archive", error))?;

        let extracted = self.root.join(EXTRACTED_DIR);
        if !extracted.is_dir() {
            return Err(SwapError::MissingExtractedBundle {
                root: self.root.display().to_string(),
            });
        }

        let version_dir = self.root.join(&manifest.version);
        if version_dir.exists() {
            // A retried or interrupted earlier attempt must not block this one.
            std::fs::remove_dir_all(&version_dir).map_err(|error| {
                SwapError::io("failed to remove previous version directory", error)
            })?;
        }
        std::fs::rename(&extracted, &version_dir)
            .map_err(|error| SwapError::io("failed to promote extracted renderer", error))?;

        let data = serde_json::to_vec_pretty(&InstalledManifest::from_release(manifest))
            .map_err(SwapError::ManifestEncode)?;
        write_atomic(&self.manifest_path(), &data)
            .map_err(|error| SwapError::io("failed to write installed manifest", error))?;

        info!("Renderer {} promoted to current", manifest.version);
        Ok(())
    }

    /// Installed manifest, if a valid one exists on disk. Unreadable or
    /// unparseable manifests read as absent.
    #[must_use]
    pub fn installed_manifest(&self) -> Option<InstalledManifest> {
        let data = std::fs::read_to_string(self.manifest_path()).ok()?;
        serde_json::from_str(&data).ok()
    }

    /// Entry-point HTML of the currently installed renderer, or `None` when
    /// the app should fall back to its bundled renderer.
    #[must_use]
    pub fn current_entry_point(&self, running_main_hash: &str) -> Option<PathBuf> {
        let manifest = self.installed_manifest()?;
        if manifest.main_hash != running_main_hash {
            debug!(
                "Installed renderer {} targets main build {}, falling back to bundled renderer",
                manifest.version, manifest.main_hash
            );
            return None;
        }

        let entry = self.root.join(&manifest.version).join(ENTRY_FILE);
        if entry.is_file() { Some(entry) } else { None }
    }

    /// Remove stale renderer versions, keeping only the manifest's version.
    ///
    /// Without a manifest nothing on disk is trustworthy and the whole root
    /// is wiped. Deletions are best-effort per entry.
    pub fn cleanup(&self) {
        let Some(manifest) = self.installed_manifest() else {
            if self.root.exists() {
                info!("No installed manifest, clearing renderer root");
                let _ = std::fs::remove_dir_all(&self.root);
            }
            return;
        };

        let Ok(entries) = std::fs::read_dir(&self.root) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() && entry.file_name().to_string_lossy() != manifest.version {
                debug!("Removing stale renderer version: {}", path.display());
                let _ = std::fs::remove_dir_all(&path);
            }
        }
    }
}

fn extract_tar_gz(archive_path: &Path, dest: &Path) -> std::io::Result<()> {
    let file = std::fs::File::open(archive_path)?;
    let decoder = flate2::read::GzDecoder::new(file);
    let mut archive = tar::Archive::new(decoder);
    archive.unpack(dest)
}

fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let parent = path.parent().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "manifest path has no parent",
        )
    })?;

    let file_name = path
        .file_name()
        .and_then(std::ffi::OsStr::to_str)
        .unwrap_or(MANIFEST_FILE);
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |duration| duration.as_nanos());
    let tmp_path = parent.join(format!(".{file_name}.{}.{timestamp}.tmp", std::process::id()));

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&tmp_path)?;
    if let Err(error) = file.write_all(data).and_then(|()| file.sync_all()) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(error);
    }
    drop(file);

    // Windows rename does not replace an existing destination.
    #[cfg(windows)]
    if path.exists() {
        std::fs::remove_file(path)?;
    }

    if let Err(error) = std::fs::rename(&tmp_path, path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(error);
    }

    Ok(())
}
