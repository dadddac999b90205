#[cfg(debug_assertions)]
use simplelog::{ColorChoice, TermLogger, TerminalMode};
use simplelog::{CombinedLogger, ConfigBuilder, LevelFilter, SharedLogger, WriteLogger};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::paths::AppPaths;

const MAX_LOG_BYTES: u64 = 2 * 1024 * 1024;

/// Append-only log sink that survives the log file being deleted or rotated
/// away underneath it while the app is running.
struct ReopeningLogWriter {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl ReopeningLogWriter {
    fn open(path: PathBuf) -> io::Result<Self> {
        let writer = Self {
            path,
            file: Mutex::new(None),
        };
        *writer
            .file
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(writer.reopen()?);
        Ok(writer)
    }

    fn reopen(&self) -> io::Result<File> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        OpenOptions::new().create(true).append(true).open(&self.path)
    }
}

impl Write for ReopeningLogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = self
            .file
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if guard.is_none() || !self.path.exists() {
            *guard = Some(self.reopen()?);
        }
        match guard.as_mut() {
            Some(file) => file.write(buf),
            None => Err(io::Error::other("log file unavailable")),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut guard = self
            .file
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        match guard.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

// Keeps roughly the newest half of the budget, cut on a line boundary.
fn truncate_old_entries(path: &Path, max_bytes: u64) {
    let Ok(metadata) = std::fs::metadata(path) else {
        return;
    };
    if metadata.len() <= max_bytes {
        return;
    }
    let Ok(contents) = std::fs::read(path) else {
        return;
    };

    let keep = usize::try_from(max_bytes / 2).unwrap_or(usize::MAX);
    let tail_start = contents.len().saturating_sub(keep);
    let cut = contents[tail_start..]
        .iter()
        .position(|&byte| byte == b'\n')
        .map_or(tail_start, |offset| tail_start + offset + 1);
    let _ = std::fs::write(path, &contents[cut..]);
}

/// Install the global logger: a trimmed append-only file sink, plus a
/// terminal sink in debug builds. Failures leave logging uninitialized
/// rather than failing startup.
pub fn init_logging(paths: &AppPaths, debug_enabled: bool) {
    let _ = paths.ensure_dirs();
    let log_path = paths.log_file();
    truncate_old_entries(&log_path, MAX_LOG_BYTES);

    let config = ConfigBuilder::new()
        .set_time_format_rfc3339()
        .add_filter_allow_str("plume")
        .build();

    let mut sinks: Vec<Box<dyn SharedLogger>> = Vec::new();

    #[cfg(debug_assertions)]
    sinks.push(TermLogger::new(
        LevelFilter::Debug,
        config.clone(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    ));

    if let Ok(writer) = ReopeningLogWriter::open(log_path.clone()) {
        sinks.push(WriteLogger::new(LevelFilter::Debug, config, writer));
    }

    if !sinks.is_empty() {
        let _ = CombinedLogger::init(sinks);
    }

    set_logging_enabled(debug_enabled);

    if debug_enabled {
        log::info!("Debug logging enabled, log file: {}", log_path.display());
    }
}

pub fn set_logging_enabled(enabled: bool) {
    let level = if enabled {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Off
    };
    log::set_max_level(level);
}
