//! Shared building blocks for package-plus-service features.

use super::{FeatureAction, StepContext};
use crate::commands::packages::{AptInstall, AptRemove, AptUpdate};
use crate::commands::services::Systemctl;
use crate::host::Host;
use anyhow::{Context, Result};

/// Install packages, refreshing the package index once if the first attempt fails.
pub fn install_packages(host: &Host, packages: &[&str]) -> Result<()> {
    let install = AptInstall::new(packages);
    let first = host.run(&install)?;
    if first.success {
        return Ok(());
    }
    tracing::info!("Package install failed, refreshing package index and retrying");
    host.run_checked(&AptUpdate)?;
    host.run_checked(&install)
        .with_context(|| format!("installing {}", packages.join(" ")))?;
    Ok(())
}

/// Remove packages during rollback; failures are only logged.
pub fn remove_packages(host: &Host, packages: &[&str]) {
    host.run_tolerant(&AptRemove::new(packages));
}

/// A feature that is nothing more than packages plus enabled units.
#[derive(Debug, Clone, Copy)]
pub struct PackageService {
    pub packages: &'static [&'static str],
    pub units: &'static [&'static str],
}

impl FeatureAction for PackageService {
    fn install(&self, ctx: &StepContext) -> Result<()> {
        install_packages(ctx.host, self.packages)?;
        if !self.units.is_empty() {
            ctx.host.run_checked(&Systemctl::enable_now(self.units))?;
        }
        Ok(())
    }

    fn rollback(&self, ctx: &StepContext) -> Result<()> {
        if !self.units.is_empty() {
            ctx.host.run_tolerant(&Systemctl::disable_now(self.units));
        }
        remove_packages(ctx.host, self.packages);
        Ok(())
    }
}
