use crate::release::RendererManifest;
use crate::swap::InstalledManifest;

/// Identity of the running binary, against which renderer bundles are
/// negotiated.
#[derive(Debug, Clone)]
pub struct RunningBuild {
    pub main_hash: String,
    pub version: String,
    pub commit: String,
}

/// Outcome of negotiating a renderer manifest against the running binary and
/// the bundle already installed on disk.
#[derive(Debug, Clone)]
pub enum Eligibility {
    /// No manifest was offered (or it failed to fetch/parse).
    NoManifest { reason: String },
    /// The bundle targets a different native-process build; hot-swapping it
    /// would break the IPC contract. Remediation is a full app update.
    RequiresFullAppUpdate { reason: String },
    /// Nothing to do: the offered bundle is already running or already on
    /// disk awaiting a reload.
    AlreadyCurrent { reason: String },
    /// Safe to download and apply.
    Eligible(RendererManifest),
}

/// Decide whether a renderer manifest can be hot-applied.
///
/// Checks run in a fixed order and the first match wins: the
/// native-compatibility gate comes before any version comparison, and a
/// bundle already swapped onto disk counts as current even though the running
/// process may still be loading the previous one (a reload picks it up).
#[must_use]
pub fn evaluate(
    manifest: Option<&RendererManifest>,
    running: &RunningBuild,
    installed: Option<&InstalledManifest>,
) -> Eligibility {
    let Some(manifest) = manifest else {
        return Eligibility::NoManifest {
            reason: "release payload carries no renderer manifest".to_string(),
        };
    };

    if manifest.main_hash != running.main_hash {
        return Eligibility::RequiresFullAppUpdate {
            reason: format!(
                "renderer {} targets main build {}, running main build is {}",
                manifest.version, manifest.main_hash, running.main_hash
            ),
        };
    }

    if manifest.version == running.version {
        return Eligibility::AlreadyCurrent {
            reason: format!("version {} is already running", manifest.version),
        };
    }

    if manifest.commit == running.commit {
        return Eligibility::AlreadyCurrent {
            reason: format!("commit {} is already running", manifest.commit),
        };
    }

    if let Some(installed) = installed
        && (installed.version == manifest.version || installed.commit == manifest.commit)
    {
        return Eligibility::AlreadyCurrent {
            reason: format!(
                "version {} is already installed on disk (pending reload)",
                installed.version
            ),
        };
    }

    Eligibility::Eligible(manifest.clone())
}
