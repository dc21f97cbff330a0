//! The host as seen by feature actions.
//!
//! Bundles the command runner, the filesystem root and the network
//! collaborators so actions never touch globals. Every absolute path an action
//! writes is re-rooted under [`Host::root`], which is `/` in production and a
//! temporary directory in tests.

use crate::command_runner::{CommandOutput, CommandRunner};
use crate::host_command::HostCommand;
use crate::network::inventory::{ClassificationTable, InterfaceInventory, LinkSource};
use crate::network::wan::{Prober, WanDetection, WanDetector};
use anyhow::{Context, Result};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct Host {
    runner: Arc<dyn CommandRunner>,
    root: PathBuf,
    links: Arc<dyn LinkSource>,
    prober: Arc<dyn Prober>,
    table: ClassificationTable,
    /// Files are reported, never written
    dry_run: bool,
}

impl Host {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        root: impl Into<PathBuf>,
        links: Arc<dyn LinkSource>,
        prober: Arc<dyn Prober>,
    ) -> Self {
        Self {
            runner,
            root: root.into(),
            links,
            prober,
            table: ClassificationTable::default(),
            dry_run: false,
        }
    }

    /// Gate file changes the way the runner gates mutating commands.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn runner(&self) -> &dyn CommandRunner {
        self.runner.as_ref()
    }

    pub fn table(&self) -> &ClassificationTable {
        &self.table
    }

    /// Map an absolute host path below the root.
    pub fn path(&self, absolute: &str) -> PathBuf {
        self.root.join(absolute.trim_start_matches('/'))
    }

    /// Fresh interface inventory view.
    pub fn inventory(&self) -> InterfaceInventory<'_> {
        InterfaceInventory::new(self.links.as_ref(), &self.table)
    }

    /// Run WAN detection against the current inventory.
    pub fn detect_wan(&self) -> WanDetection {
        let inventory = self.inventory();
        WanDetector::new(&inventory, self.prober.as_ref()).detect()
    }

    // ========================================================================
    // Commands
    // ========================================================================

    pub fn run(&self, cmd: &dyn HostCommand) -> Result<CommandOutput> {
        self.runner().exec(cmd)
    }

    /// Run and fail on non-zero exit.
    pub fn run_checked(&self, cmd: &dyn HostCommand) -> Result<CommandOutput> {
        self.runner().exec_checked(cmd)
    }

    /// Run for cleanup: failures are logged, never returned.
    pub fn run_tolerant(&self, cmd: &dyn HostCommand) {
        let line = cmd.to_command_line();
        match self.runner.run(&line) {
            Ok(out) if out.success => {}
            Ok(out) => tracing::debug!(
                "ignored failure of '{}': {}",
                line,
                out.stderr.trim()
            ),
            Err(e) => tracing::debug!("ignored failure of '{}': {:#}", line, e),
        }
    }

    // ========================================================================
    // Files
    // ========================================================================

    /// Write `contents` unless the file already holds exactly that.
    ///
    /// Returns true if the file changed (in dry-run: would have changed).
    pub fn write_file(&self, absolute: &str, contents: &str, mode: u32) -> Result<bool> {
        let path = self.path(absolute);
        if let Ok(existing) = std::fs::read_to_string(&path) {
            if existing == contents {
                return Ok(false);
            }
        }
        if self.dry_run {
            tracing::info!("[dry-run] would write {} ({} bytes)", path.display(), contents.len());
            return Ok(true);
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(&path, contents)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode))
            .with_context(|| format!("Failed to chmod {}", path.display()))?;
        tracing::debug!("wrote {}", path.display());
        Ok(true)
    }

    /// Remove a file; a missing file is not an error. Returns true if removed.
    pub fn remove_file(&self, absolute: &str) -> Result<bool> {
        let path = self.path(absolute);
        if self.dry_run {
            let exists = path.exists();
            if exists {
                tracing::info!("[dry-run] would remove {}", path.display());
            }
            return Ok(exists);
        }
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
        }
    }

    /// Create a directory and its parents below the root.
    pub fn create_dir_all(&self, absolute: &str) -> Result<()> {
        let path = self.path(absolute);
        if self.dry_run {
            tracing::debug!("[dry-run] would create {}", path.display());
            return Ok(());
        }
        std::fs::create_dir_all(&path)
            .with_context(|| format!("Failed to create {}", path.display()))
    }

    pub fn file_exists(&self, absolute: &str) -> bool {
        self.path(absolute).exists()
    }
}
