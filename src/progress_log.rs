//! Append-only stage log, one `"<timestamp>: <message>"` line per event.
//!
//! The log is best effort: failing to open or write it is reported through
//! `tracing` and otherwise ignored, so it can never hide a pipeline error.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::{info, warn};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

pub struct ProgressLog {
    sink: Option<(PathBuf, File)>,
}

impl ProgressLog {
    /// Open `path` for appending, creating it if needed
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        match OpenOptions::new().create(true).append(true).open(&path) {
            Ok(file) => Self {
                sink: Some((path, file)),
            },
            Err(e) => {
                warn!("⚠️ Progress log {} unavailable: {}", path.display(), e);
                Self::disabled()
            }
        }
    }

    /// A log that only forwards to `tracing`
    pub fn disabled() -> Self {
        Self { sink: None }
    }

    pub fn path(&self) -> Option<&Path> {
        self.sink.as_ref().map(|(path, _)| path.as_path())
    }

    pub fn log(&mut self, message: &str) {
        info!("📋 {}", message);

        if let Some((path, file)) = &mut self.sink {
            let line = format!("{}: {}\n", Local::now().format(TIMESTAMP_FORMAT), message);
            if let Err(e) = file.write_all(line.as_bytes()) {
                warn!("⚠️ Failed to write progress log {}: {}", path.display(), e);
            }
        }
    }
}

impl Drop for ProgressLog {
    fn drop(&mut self) {
        if let Some((path, file)) = &mut self.sink {
            if let Err(e) = file.sync_all() {
                warn!("⚠️ Failed to sync progress log {}: {}", path.display(), e);
            }
        }
    }
}
