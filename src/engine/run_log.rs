//! Plain-text run log.
//!
//! Append-only, one line per event: `<unix-ts> <feature> <status> [detail]`.
//! Advisory for operators; never read back. Write failures are logged and
//! otherwise ignored so a full disk cannot fail a run.

use crate::types::StepStatus;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

pub const RUN_LOG_PATH: &str = "/var/log/igel-router/install.log";

pub struct RunLog {
    path: PathBuf,
    file: Option<File>,
}

impl RunLog {
    /// Open (or create) the log below `root`.
    pub fn open(root: &Path) -> Self {
        let path = root.join(RUN_LOG_PATH.trim_start_matches('/'));
        let file = path
            .parent()
            .map_or(Ok(()), fs::create_dir_all)
            .and_then(|_| OpenOptions::new().create(true).append(true).open(&path));
        let file = match file {
            Ok(f) => Some(f),
            Err(e) => {
                tracing::warn!("Run log {} unavailable: {}", path.display(), e);
                None
            }
        };
        Self { path, file }
    }

    /// A log that records nothing (dry runs).
    pub fn disabled() -> Self {
        Self {
            path: PathBuf::new(),
            file: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn run_started(&mut self, order: &[String]) {
        self.line(&format!("- run-start {}", order.join(",")));
    }

    pub fn run_finished(&mut self, outcome: &str) {
        self.line(&format!("- run-end {}", outcome));
    }

    pub fn step(&mut self, feature: &str, status: StepStatus, detail: Option<&str>) {
        match detail {
            Some(d) => self.line(&format!("{} {} {}", feature, status, one_line(d))),
            None => self.line(&format!("{} {}", feature, status)),
        }
    }

    fn line(&mut self, text: &str) {
        let Some(file) = self.file.as_mut() else {
            return;
        };
        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        if let Err(e) = writeln!(file, "{} {}", ts, text) {
            tracing::warn!("Failed to write run log: {}", e);
            self.file = None;
        }
    }
}

fn one_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
