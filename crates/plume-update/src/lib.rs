//! Application and renderer hot-update engine for Plume.
//!
//! This crate decides whether a published release can be hot-applied to the
//! running app and carries out the renderer bundle swap when it can:
//! - Release metadata fetching with an in-memory last-payload cache.
//! - Compatibility evaluation against the running binary's identity.
//! - Streaming archive download with redirect bounding and SHA-256 checks.
//! - Atomic renderer bundle promotion plus stale-version cleanup.
//! - A top-level orchestrator that polls, classifies decisions, and hands
//!   full-app updates to the native updater behind a trait seam.

mod download;
mod eligibility;
mod events;
mod native;
mod orchestrator;
mod release;
mod settings;
mod swap;

#[cfg(test)]
pub(crate) mod test_support;

/// Streaming archive fetcher with throttled progress reporting.
pub use download::{DownloadProgress, archive_client, download_archive};
/// Renderer compatibility decision algorithm.
pub use eligibility::{Eligibility, RunningBuild, evaluate};
/// Outbound notifications the host app subscribes to.
pub use events::UpdateEvent;
/// Native auto-updater collaborator seam and release-info translation.
pub use native::{
    NativeUpdater, NativeUpdaterError, ProviderError, ReleaseInfo, UpdateFileInfo,
    release_info_for_platform, select_platform,
};
/// Top-level update controller.
pub use orchestrator::{CheckOutcome, Updater};
/// Release payload model and metadata client.
pub use release::{
    AppPayload, Decision, DecisionKind, PlatformEntry, PlatformFile, ReleaseClient, ReleaseError,
    ReleasePayload, RendererManifest,
};
/// Update feature flags and poll interval configuration.
pub use settings::UpdateSettings;
/// Renderer bundle store: apply, entry-point lookup, cleanup.
pub use swap::{InstalledManifest, RendererStore, SwapError};
