use async_trait::async_trait;
use log::warn;
use serde::Serialize;
use thiserror::Error;

use crate::release::{AppPayload, PlatformEntry};

/// One installer file in the generic shape the native auto-updater consumes.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateFileInfo {
    pub url: String,
    pub sha512: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// Release description handed to the native auto-updater's provider hook.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseInfo {
    pub version: String,
    pub files: Vec<UpdateFileInfo>,
    pub path: String,
    pub sha512: String,
    pub release_name: Option<String>,
    pub release_notes: Option<String>,
    pub release_date: Option<String>,
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("platform {platform} offers no usable installer files")]
    NoUsableFiles { platform: String },
}

#[derive(Debug, Error)]
#[error("{0}")]
pub struct NativeUpdaterError(pub String);

/// The external native auto-updater, treated as a black box. It drives its
/// own download/install flow through its own event callbacks; this engine
/// only hands it release info and forwards control calls.
#[async_trait]
pub trait NativeUpdater: Send + Sync {
    async fn check_for_updates(&self, release: ReleaseInfo) -> Result<(), NativeUpdaterError>;
    async fn download_update(&self) -> Result<(), NativeUpdaterError>;
    fn quit_and_install(&self);
}

fn normalized_arch(arch: &str) -> &str {
    match arch {
        "x86_64" => "x64",
        "aarch64" => "arm64",
        other => other,
    }
}

fn os_aliases(os: &str) -> &'static [&'static str] {
    match os {
        "macos" => &["darwin", "mac", "macos", "osx"],
        "windows" => &["win32", "win", "windows"],
        "linux" => &["linux"],
        _ => &[],
    }
}

/// Pick the platform entry to hand to the native updater.
///
/// Preference order: the payload's explicitly pre-selected platform, an
/// alias-normalized `os-arch` match, a bare-os match, then the first entry.
/// `None` only when the payload lists no platforms at all.
#[must_use]
pub fn select_platform<'a>(app: &'a AppPayload, os: &str, arch: &str) -> Option<&'a PlatformEntry> {
    if let Some(selected) = &app.selected_platform
        && let Some(entry) = app
            .platforms
            .iter()
            .find(|entry| entry.platform.eq_ignore_ascii_case(selected))
    {
        return Some(entry);
    }

    let arch = normalized_arch(arch);
    let aliases = os_aliases(os);

    if let Some(entry) = app.platforms.iter().find(|entry| {
        let candidate = entry.platform.to_ascii_lowercase();
        aliases.iter().any(|alias| candidate == format!("{alias}-{arch}"))
    }) {
        return Some(entry);
    }

    if let Some(entry) = app.platforms.iter().find(|entry| {
        aliases
            .iter()
            .any(|alias| entry.platform.eq_ignore_ascii_case(alias))
    }) {
        return Some(entry);
    }

    app.platforms.first()
}

/// Translate a selected platform's files into the native updater's release
/// shape. Malformed file entries (missing url or sha512) are logged and
/// skipped rather than failing the whole check.
///
/// # Errors
/// Returns an error when no usable installer file remains after filtering.
pub fn release_info_for_platform(
    app: &AppPayload,
    entry: &PlatformEntry,
) -> Result<ReleaseInfo, ProviderError> {
    let files: Vec<UpdateFileInfo> = entry
        .files
        .iter()
        .filter_map(|file| match (&file.url, &file.sha512) {
            (Some(url), Some(sha512)) => Some(UpdateFileInfo {
                url: url.clone(),
                sha512: sha512.clone(),
                size: file.size,
            }),
            _ => {
                warn!(
                    "Skipping malformed installer file entry for platform {}",
                    entry.platform
                );
                None
            }
        })
        .collect();

    let Some(primary) = files.first() else {
        return Err(ProviderError::NoUsableFiles {
            platform: entry.platform.clone(),
        });
    };

    Ok(ReleaseInfo {
        version: app.version.clone(),
        path: primary.url.clone(),
        sha512: primary.sha512.clone(),
        files,
        release_name: app.release_name.clone(),
        release_notes: app.release_notes.clone(),
        release_date: app.release_date.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::{ProviderError, release_info_for_platform, select_platform};
    use crate::release::{AppPayload, PlatformEntry, PlatformFile};

    fn file(url: &str) -> PlatformFile {
        PlatformFile {
            url: Some(url.to_string()),
            sha512: Some(format!("sha512-of-{url}")),
            size: Some(1024),
        }
    }

    fn entry(platform: &str) -> PlatformEntry {
        PlatformEntry {
            platform: platform.to_string(),
            files: vec![file(&format!("https://dl.example.com/{platform}.dmg"))],
        }
    }

    fn payload(platforms: Vec<PlatformEntry>, selected: Option<&str>) -> AppPayload {
        AppPayload {
            version: "2.1.0".to_string(),
            platforms,
            selected_platform: selected.map(ToString::to_string),
            release_name: Some("Plume 2.1.0".to_string()),
            release_notes: None,
            release_date: Some("2026-08-01T00:00:00Z".to_string()),
        }
    }

    #[test]
    fn preselected_platform_wins() {
        let app = payload(vec![entry("darwin-arm64"), entry("win32-x64")], Some("win32-x64"));
        let selected = select_platform(&app, "macos", "aarch64")
            .expect("preselected platform should be found");
        assert_eq!(selected.platform, "win32-x64");
    }

    #[test]
    fn arch_specific_alias_match_beats_bare_os() {
        let app = payload(vec![entry("mac"), entry("darwin-arm64")], None);
        let selected =
            select_platform(&app, "macos", "aarch64").expect("alias match should be found");
        assert_eq!(selected.platform, "darwin-arm64");
    }

    #[test]
    fn bare_os_alias_matches_when_no_arch_entry_exists() {
        let app = payload(vec![entry("linux-x64"), entry("macOS")], None);
        let selected =
            select_platform(&app, "macos", "x86_64").expect("bare-os match should be found");
        assert_eq!(selected.platform, "macOS");

        let windows_app = payload(vec![entry("win32")], None);
        let selected = select_platform(&windows_app, "windows", "x86_64")
            .expect("win32 should alias to windows");
        assert_eq!(selected.platform, "win32");
    }

    #[test]
    fn falls_back_to_first_platform_and_none_only_when_empty() {
        let app = payload(vec![entry("linux-arm64")], None);
        let selected = select_platform(&app, "macos", "aarch64")
            .expect("a lone platform should be the fallback");
        assert_eq!(selected.platform, "linux-arm64");

        let empty = payload(vec![], None);
        assert!(select_platform(&empty, "macos", "aarch64").is_none());
    }

    #[test]
    fn translation_skips_malformed_files_and_uses_first_usable() {
        let mut platform = entry("darwin-arm64");
        platform.files.insert(
            0,
            PlatformFile {
                url: None,
                sha512: None,
                size: Some(7),
            },
        );
        let app = payload(vec![platform.clone()], None);

        let info = release_info_for_platform(&app, &platform)
            .expect("one usable file should be enough");
        assert_eq!(info.version, "2.1.0");
        assert_eq!(info.files.len(), 1);
        assert_eq!(info.path, info.files[0].url);
        assert_eq!(info.sha512, info.files[0].sha512);
    }

    #[test]
    fn translation_fails_when_no_usable_files_remain() {
        let platform = PlatformEntry {
            platform: "darwin-arm64".to_string(),
            files: vec![PlatformFile {
                url: Some("https://dl.example.com/app.dmg".to_string()),
                sha512: None,
                size: None,
            }],
        };
        let app = payload(vec![platform.clone()], None);

        let error = release_info_for_platform(&app, &platform)
            .expect_err("entry without a checksum should not be usable");
        assert!(matches!(error, ProviderError::NoUsableFiles { ref platform } if platform == "darwin-arm64"));
    }

    #[test]
    fn release_info_serializes_in_the_native_updater_shape() {
        let platform = entry("darwin-arm64");
        let app = payload(vec![platform.clone()], None);

        let info = release_info_for_platform(&app, &platform)
            .expect("translation should succeed");
        let json = serde_json::to_value(&info).expect("release info should serialize");

        assert_eq!(json["version"], "2.1.0");
        assert_eq!(json["releaseName"], "Plume 2.1.0");
        assert!(json["files"][0]["url"].is_string());
        assert!(json["files"][0]["sha512"].is_string());
        assert_eq!(json["path"], json["files"][0]["url"]);
    }
}
