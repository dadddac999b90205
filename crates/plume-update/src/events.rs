/// Notifications the engine sends to the host app over an mpsc channel.
///
/// The host forwards these across its own IPC boundary (renderer reload
/// prompts, progress UI, window teardown before install).
#[derive(Debug, Clone)]
pub enum UpdateEvent {
    CheckingForUpdate,
    RendererDownloading {
        downloaded: u64,
        total: u64,
        percent: f64,
    },
    /// A new renderer bundle has been promoted on disk; a reload will pick
    /// it up.
    RendererReady { version: String },
    /// Sent just before the native updater's quit-and-install runs.
    CloseMainWindow,
}
