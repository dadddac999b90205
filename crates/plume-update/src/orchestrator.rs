use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::download::archive_client;
use crate::eligibility::{Eligibility, RunningBuild, evaluate};
use crate::events::UpdateEvent;
use crate::native::{NativeUpdater, NativeUpdaterError, release_info_for_platform, select_platform};
use crate::release::{Decision, DecisionKind, ReleaseClient};
use crate::settings::UpdateSettings;
use crate::swap::{InstalledManifest, RendererStore};

/// Settle time for window teardown before the native installer takes over.
/// Empirical margin, not a contract.
const QUIT_INSTALL_DELAY: Duration = Duration::from_secs(1);

/// Result shape of a single update check, as exposed to the host app.
#[derive(Debug, Clone, Default)]
pub struct CheckOutcome {
    pub has_update: bool,
    pub error: Option<String>,
}

impl CheckOutcome {
    fn no_update() -> Self {
        Self::default()
    }

    fn update() -> Self {
        Self {
            has_update: true,
            error: None,
        }
    }

    fn failed(error: impl Into<String>) -> Self {
        Self {
            has_update: false,
            error: Some(error.into()),
        }
    }
}

/// Top-level update controller.
///
/// Classifies each release decision (none / renderer / full app), drives the
/// renderer swap engine for hot updates, and delegates full-app updates to
/// the native updater. At most one check and one native download may be in
/// flight; duplicate callers no-op. Nothing here ever panics the host: every
/// public entry point converts failures into result values.
pub struct Updater {
    settings: UpdateSettings,
    running: RunningBuild,
    releases: ReleaseClient,
    store: RendererStore,
    native: Box<dyn NativeUpdater>,
    archive_client: reqwest::Client,
    events: mpsc::Sender<UpdateEvent>,
    checking: AtomicBool,
    downloading: AtomicBool,
    poll_task: Mutex<Option<JoinHandle<()>>>,
}

impl Updater {
    /// # Errors
    /// Returns an error when the archive HTTP client cannot be constructed.
    pub fn new(
        settings: UpdateSettings,
        running: RunningBuild,
        releases: ReleaseClient,
        store: RendererStore,
        native: Box<dyn NativeUpdater>,
        events: mpsc::Sender<UpdateEvent>,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self {
            settings,
            running,
            releases,
            store,
            native,
            archive_client: archive_client()?,
            events,
            checking: AtomicBool::new(false),
            downloading: AtomicBool::new(false),
            poll_task: Mutex::new(None),
        })
    }

    /// Check for updates and, when a renderer update is eligible, apply it.
    ///
    /// Returns immediately with no update when the subsystem is disabled or
    /// another check is already in flight.
    pub async fn check_for_updates(&self, refresh: bool) -> CheckOutcome {
        if !self.settings.enable_app_update {
            return CheckOutcome::no_update();
        }

        if self
            .checking
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Update check already in flight");
            return CheckOutcome::no_update();
        }

        let _ = self.events.send(UpdateEvent::CheckingForUpdate).await;
        let outcome = self.classify_and_dispatch(refresh).await;
        self.checking.store(false, Ordering::SeqCst);
        outcome
    }

    async fn classify_and_dispatch(&self, refresh: bool) -> CheckOutcome {
        let payload = match self.releases.fetch_latest(refresh).await {
            Ok(payload) => payload,
            Err(error) => return CheckOutcome::failed(error.to_string()),
        };

        match payload.decision.kind {
            DecisionKind::None => CheckOutcome::no_update(),
            DecisionKind::Renderer => self.handle_renderer_decision(&payload.decision).await,
            DecisionKind::App => self.handle_app_decision(&payload.decision).await,
            DecisionKind::Unknown => {
                warn!("Unrecognized update decision type, reporting no update");
                CheckOutcome::no_update()
            }
        }
    }

    async fn handle_renderer_decision(&self, decision: &Decision) -> CheckOutcome {
        if !self.settings.enable_render_hot_update {
            if decision.app.is_some() {
                return self.handle_app_decision(decision).await;
            }
            info!("Renderer hot update disabled and no app payload offered");
            return CheckOutcome::no_update();
        }

        let installed = self.store.installed_manifest();
        match evaluate(decision.renderer.as_ref(), &self.running, installed.as_ref()) {
            Eligibility::NoManifest { reason } => CheckOutcome::failed(reason),
            Eligibility::AlreadyCurrent { reason } => {
                info!("Renderer already current: {reason}");
                CheckOutcome::no_update()
            }
            Eligibility::RequiresFullAppUpdate { reason } => {
                if decision.app.is_some() {
                    info!("Renderer incompatible ({reason}), falling back to full app update");
                    self.handle_app_decision(decision).await
                } else {
                    // Degraded: nothing to offer until the server also
                    // publishes a full-app path.
                    CheckOutcome::failed(reason)
                }
            }
            Eligibility::Eligible(manifest) => {
                match self
                    .store
                    .apply(&self.archive_client, &manifest, &self.events)
                    .await
                {
                    Ok(()) => CheckOutcome::update(),
                    Err(error) => CheckOutcome::failed(error.to_string()),
                }
            }
        }
    }

    async fn handle_app_decision(&self, decision: &Decision) -> CheckOutcome {
        if !self.settings.enable_core_update {
            info!("Full app updates disabled, skipping app decision");
            return CheckOutcome::no_update();
        }

        if self.settings.enable_distribution_store_update {
            info!("Distribution store owns full app updates, skipping app decision");
            return CheckOutcome::no_update();
        }

        let Some(app) = &decision.app else {
            return CheckOutcome::failed("release payload carries no app update metadata");
        };

        let os = std::env::consts::OS;
        let arch = std::env::consts::ARCH;
        let Some(platform) = select_platform(app, os, arch) else {
            return CheckOutcome::failed(format!("no installer available for platform {os}-{arch}"));
        };

        let release = match release_info_for_platform(app, platform) {
            Ok(release) => release,
            Err(error) => return CheckOutcome::failed(error.to_string()),
        };

        info!(
            "Delegating app update {} ({}) to the native updater",
            release.version, platform.platform
        );
        match self.native.check_for_updates(release).await {
            Ok(()) => {
                if self.settings.auto_download_update
                    && let Err(error) = self.download_app_update().await
                {
                    warn!("Automatic app update download failed: {error}");
                }
                CheckOutcome::update()
            }
            Err(error) => CheckOutcome::failed(error.to_string()),
        }
    }

    /// Ask the native updater to download the pending full-app installer.
    ///
    /// # Errors
    /// Returns the native updater's error; the in-flight flag is cleared so
    /// the download can be retried.
    pub async fn download_app_update(&self) -> Result<(), NativeUpdaterError> {
        if self
            .downloading
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("App update download already in flight");
            return Ok(());
        }

        match self.native.download_update().await {
            Ok(()) => Ok(()),
            Err(error) => {
                self.downloading.store(false, Ordering::SeqCst);
                Err(error)
            }
        }
    }

    #[must_use]
    pub fn is_downloading(&self) -> bool {
        self.downloading.load(Ordering::SeqCst)
    }

    /// Tear down the main window, let it settle, then hand control to the
    /// native installer.
    pub async fn quit_and_install(&self) {
        let _ = self.events.send(UpdateEvent::CloseMainWindow).await;
        tokio::time::sleep(QUIT_INSTALL_DELAY).await;
        self.native.quit_and_install();
    }

    /// Entry point of the installed renderer bundle, or `None` when the host
    /// should load its bundled renderer.
    #[must_use]
    pub fn current_entry_point(&self) -> Option<PathBuf> {
        self.store.current_entry_point(&self.running.main_hash)
    }

    #[must_use]
    pub fn installed_manifest(&self) -> Option<InstalledManifest> {
        self.store.installed_manifest()
    }

    /// Prune renderer versions other than the installed one. Intended to run
    /// on app quit.
    pub fn cleanup_renderers(&self) {
        self.store.cleanup();
    }

    /// Start (or restart) background polling. Any previous poll task is
    /// cancelled first, so re-registration never leaks a duplicate timer.
    /// With auto-check disabled this only clears the previous task.
    pub fn start_polling(self: Arc<Self>) {
        let mut guard = self
            .poll_task
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(previous) = guard.take() {
            previous.abort();
        }

        if !self.settings.auto_check_update {
            return;
        }

        let updater = Arc::clone(&self);
        *guard = Some(tokio::spawn(async move {
            let interval = Duration::from_millis(updater.settings.check_update_interval_ms.max(1));
            loop {
                // A failed tick is logged and never stops future polling.
                let outcome = updater.check_for_updates(true).await;
                if let Some(error) = outcome.error {
                    warn!("Scheduled update check failed: {error}");
                }
                tokio::time::sleep(interval).await;
            }
        }));
    }

    pub fn stop_polling(&self) {
        let mut guard = self
            .poll_task
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(task) = guard.take() {
            task.abort();
        }
    }
}

impl Drop for Updater {
    fn drop(&mut self) {
        self.stop_polling();
    }
}
