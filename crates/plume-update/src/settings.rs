use serde::{Deserialize, Serialize};
use std::path::Path;

use plume_platform::AppPaths;

/// Update feature flags and polling configuration.
///
/// Loaded fail-open: a missing or unreadable settings file yields defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct UpdateSettings {
    /// Master switch for the whole update subsystem.
    #[serde(default = "default_true")]
    pub enable_app_update: bool,

    /// Full native-core (installer) updates.
    #[serde(default = "default_true")]
    pub enable_core_update: bool,

    /// Renderer bundle hot updates.
    #[serde(default = "default_true")]
    pub enable_render_hot_update: bool,

    /// Updates delivered through a distribution store instead of our own
    /// release feed.
    #[serde(default)]
    pub enable_distribution_store_update: bool,

    #[serde(default = "default_true")]
    pub auto_check_update: bool,

    #[serde(default = "default_true")]
    pub auto_download_update: bool,

    #[serde(default = "default_check_interval_ms")]
    pub check_update_interval_ms: u64,
}

fn default_true() -> bool {
    true
}

fn default_check_interval_ms() -> u64 {
    15 * 60 * 1000
}

impl Default for UpdateSettings {
    fn default() -> Self {
        Self {
            enable_app_update: true,
            enable_core_update: true,
            enable_render_hot_update: true,
            enable_distribution_store_update: false,
            auto_check_update: true,
            auto_download_update: true,
            check_update_interval_ms: default_check_interval_ms(),
        }
    }
}

impl UpdateSettings {
    fn load_from_path(path: &Path) -> Option<Self> {
        let data = std::fs::read_to_string(path).ok()?;
        serde_json::from_str(&data).ok()
    }

    #[must_use]
    pub fn load() -> Self {
        AppPaths::new()
            .ok()
            .and_then(|paths| Self::load_from_path(&paths.settings_file()))
            .unwrap_or_default()
    }

    pub fn save(&self) {
        let Ok(paths) = AppPaths::new() else {
            return;
        };
        let _ = paths.ensure_dirs();
        if let Ok(data) = serde_json::to_vec_pretty(self) {
            let _ = std::fs::write(paths.settings_file(), data);
        }
    }
}
