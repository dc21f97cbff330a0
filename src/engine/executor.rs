//! Step Executor
//!
//! Runs each feature's `install` action in resolved order, strictly one at a
//! time, recording every transition in the ledger and the run log.
//!
//! # Failure handling
//!
//! - Missing required configuration fails the feature before its action runs
//! - A fatal action error stops the run; the caller hands the ledger to the
//!   rollback manager
//! - A best-effort action error is a warning; features depending on it are
//!   skipped rather than installed on top of a missing prerequisite
//! - A termination signal fails the current step like any fatal error

use super::ledger::InstallationState;
use super::run_log::RunLog;
use crate::config::ConfigStore;
use crate::error::{ProvisionError, Result};
use crate::features::{FeatureDescriptor, FeatureRegistry, StepContext};
use crate::host::Host;
use crate::process_guard;
use crate::types::StepStatus;
use std::collections::BTreeSet;

pub struct StepExecutor<'a> {
    registry: &'a FeatureRegistry,
    config: &'a ConfigStore,
    host: &'a Host,
    enabled: &'a BTreeSet<String>,
}

impl<'a> StepExecutor<'a> {
    pub fn new(
        registry: &'a FeatureRegistry,
        config: &'a ConfigStore,
        host: &'a Host,
        enabled: &'a BTreeSet<String>,
    ) -> Self {
        Self {
            registry,
            config,
            host,
            enabled,
        }
    }

    /// Install every queued feature of `ledger` in queue order.
    ///
    /// Returns the first fatal error; the ledger then holds exactly the
    /// features that completed before it.
    pub fn execute(&self, ledger: &mut InstallationState, log: &mut RunLog) -> Result<()> {
        let order: Vec<String> = ledger.features().map(str::to_string).collect();
        for id in &order {
            let feature = self.registry.get(id).ok_or_else(|| ProvisionError::UnknownFeature {
                feature: id.clone(),
                referenced_by: "ledger".to_string(),
            })?;
            self.execute_one(feature, ledger, log)?;
        }
        Ok(())
    }

    fn execute_one(
        &self,
        feature: &FeatureDescriptor,
        ledger: &mut InstallationState,
        log: &mut RunLog,
    ) -> Result<()> {
        let id = feature.id.as_str();

        if process_guard::cancellation_requested() {
            let reason = cancel_reason();
            record(ledger, log, id, StepStatus::Failed, Some(&reason));
            return Err(ProvisionError::step_failed(id, reason));
        }

        // Dependencies that did not complete can only be best-effort ones
        if let Some(dep) = feature
            .depends_on
            .iter()
            .find(|d| ledger.status(d) != Some(StepStatus::Completed))
        {
            let detail = format!("dependency '{}' did not complete", dep);
            tracing::warn!("Skipping {}: {}", id, detail);
            record(ledger, log, id, StepStatus::Skipped, Some(&detail));
            return Ok(());
        }

        for key in &feature.required_config_keys {
            if !self.config.is_present(key) {
                let detail = format!("missing configuration key '{}'", key);
                record(ledger, log, id, StepStatus::Failed, Some(&detail));
                return Err(ProvisionError::MissingConfiguration {
                    feature: id.to_string(),
                    key: key.clone(),
                });
            }
        }

        tracing::info!("Installing {} ({})", id, feature.summary);
        record(ledger, log, id, StepStatus::Running, None);

        let ctx = StepContext {
            feature: id,
            config: self.config,
            host: self.host,
            enabled: self.enabled,
        };
        match feature.action.install(&ctx) {
            Ok(()) if process_guard::cancellation_requested() => {
                // The signal landed after the last command; keep the step for rollback
                record(ledger, log, id, StepStatus::Completed, None);
                Err(ProvisionError::step_failed(id, cancel_reason()))
            }
            Ok(()) => {
                tracing::info!("Installed {}", id);
                record(ledger, log, id, StepStatus::Completed, None);
                Ok(())
            }
            Err(e) => {
                let mut reason = format!("{:#}", e);
                if process_guard::cancellation_requested() {
                    reason = format!("{} ({})", cancel_reason(), reason);
                }
                record(ledger, log, id, StepStatus::Failed, Some(&reason));
                if feature.best_effort && !process_guard::cancellation_requested() {
                    tracing::warn!("Best-effort feature {} failed: {}", id, reason);
                    Ok(())
                } else {
                    tracing::error!("Feature {} failed: {}", id, reason);
                    Err(ProvisionError::step_failed(id, reason))
                }
            }
        }
    }
}

fn cancel_reason() -> String {
    match process_guard::cancel_signal() {
        Some(sig) => format!("interrupted by signal {}", sig),
        None => "interrupted".to_string(),
    }
}

/// Apply a transition and mirror it to the run log.
pub(crate) fn record(
    ledger: &mut InstallationState,
    log: &mut RunLog,
    feature: &str,
    status: StepStatus,
    detail: Option<&str>,
) {
    match ledger.transition(feature, status, detail.map(str::to_string)) {
        Ok(()) => log.step(feature, status, detail),
        // Only reachable through a bug in the executor itself
        Err(e) => tracing::error!("Ledger: {}", e),
    }
}
