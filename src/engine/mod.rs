//! Engine modules: the run itself.
//!
//! The orchestrator sits between the frozen configuration (what the operator
//! wants) and the feature actions (what the host gets). It resolves a plan,
//! refuses to start if the plan cannot complete, runs the steps with the
//! rollback manager armed, and always finishes by re-applying the firewall.
//!
//! # Modules
//!
//! - `ledger`: per-run installation state with validated transitions
//! - `executor`: sequential install of the resolved order
//! - `rollback`: reverse-order compensation of completed features
//! - `run_log`: advisory plain-text log of every step event

pub mod executor;
pub mod ledger;
pub mod rollback;
pub mod run_log;

use crate::config::{ConfigStore, ValueSource, feature_key};
use crate::error::{EXIT_EXECUTION, EXIT_SUCCESS, ProvisionError, Result};
use crate::features::{FeatureRegistry, StepContext};
use crate::firewall::{self, AllowList};
use crate::host::Host;
use crate::logic::resolver::{self, Resolution};
use crate::process_guard::{self, RunGuard};
use crate::types::PortRule;
use executor::StepExecutor;
use ledger::InstallationState;
use rollback::RollbackReport;
use run_log::RunLog;
use serde::Serialize;
use std::collections::BTreeSet;

// ============================================================================
// Plan
// ============================================================================

/// One feature of a resolved plan.
#[derive(Debug, Clone, Serialize)]
pub struct PlannedFeature {
    pub id: String,
    pub summary: String,
    /// Pulled in only as a dependency
    pub auto_included: bool,
    pub depends_on: Vec<String>,
    pub required_config_keys: Vec<String>,
    /// Required keys that are absent or empty
    pub missing_keys: Vec<String>,
    pub ports: BTreeSet<PortRule>,
    pub best_effort: bool,
}

/// What a run would do, computed without touching the host.
#[derive(Debug, Clone, Serialize)]
pub struct Plan {
    #[serde(skip)]
    pub resolution: Resolution,
    pub features: Vec<PlannedFeature>,
    /// Allow-list if every feature completes
    pub firewall: AllowList,
}

impl Plan {
    pub fn build(registry: &FeatureRegistry, config: &ConfigStore) -> Result<Self> {
        let requested: BTreeSet<String> = registry
            .iter()
            .filter(|f| config.feature_enabled(&f.id))
            .map(|f| f.id.clone())
            .collect();
        let resolution = resolver::resolve(registry, &requested)?;

        let features = resolution
            .order
            .iter()
            .filter_map(|id| registry.get(id))
            .map(|f| PlannedFeature {
                id: f.id.clone(),
                summary: f.summary.clone(),
                auto_included: resolution.auto_included.contains(&f.id),
                depends_on: f.depends_on.clone(),
                required_config_keys: f.required_config_keys.clone(),
                missing_keys: f
                    .required_config_keys
                    .iter()
                    .filter(|k| !config.is_present(k))
                    .cloned()
                    .collect(),
                ports: f.resolved_ports(config),
                best_effort: f.best_effort,
            })
            .collect();

        let firewall =
            AllowList::for_features(registry, config, resolution.order.iter().map(String::as_str));

        Ok(Self {
            resolution,
            features,
            firewall,
        })
    }

    /// Fail on the first feature, in install order, with a missing key.
    pub fn check_required_config(&self) -> Result<()> {
        for f in &self.features {
            if let Some(key) = f.missing_keys.first() {
                return Err(ProvisionError::MissingConfiguration {
                    feature: f.id.clone(),
                    key: key.clone(),
                });
            }
        }
        Ok(())
    }
}

// ============================================================================
// Run
// ============================================================================

/// Everything a run did; printed on exit and optionally written as JSON.
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub dry_run: bool,
    pub order: Vec<String>,
    pub auto_included: BTreeSet<String>,
    pub ledger: InstallationState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollback: Option<RollbackReport>,
    /// Allow-list actually applied, if applying succeeded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub firewall: Option<AllowList>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    #[serde(skip)]
    pub error: Option<ProvisionError>,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }

    pub fn exit_code(&self) -> u8 {
        if self.succeeded() {
            EXIT_SUCCESS
        } else {
            EXIT_EXECUTION
        }
    }
}

/// Runs a plan against a host. A dry run is whatever the host says it is:
/// its runner skips mutating commands and its file writes are only reported.
pub struct Orchestrator<'a> {
    registry: &'a FeatureRegistry,
    host: &'a Host,
}

impl<'a> Orchestrator<'a> {
    pub fn new(registry: &'a FeatureRegistry, host: &'a Host) -> Self {
        Self { registry, host }
    }

    pub fn plan(&self, config: &ConfigStore) -> Result<Plan> {
        Plan::build(self.registry, config)
    }

    /// Provision the host.
    ///
    /// `Err` means validation failed and nothing was touched. Failures after
    /// the first step started are carried in the report, after rollback.
    pub fn run(&self, config: &ConfigStore) -> Result<RunReport> {
        let plan = self.plan(config)?;
        warn_forced_dependencies(config, &plan.resolution);
        plan.check_required_config()?;

        let order = plan.resolution.order.clone();
        let enabled = plan.resolution.enabled();
        self.preflight(config, &order, &enabled)?;
        let mut ledger = InstallationState::pending(plan.features.iter().map(|f| f.id.clone()));
        let dry_run = self.host.is_dry_run();
        let mut log = if dry_run {
            RunLog::disabled()
        } else {
            RunLog::open(self.host.root())
        };
        log.run_started(&order);
        tracing::info!("Install order: {}", order.join(" -> "));

        process_guard::reset_cancellation();
        let _armed = RunGuard::arm();

        let mut error = StepExecutor::new(self.registry, config, self.host, &enabled)
            .execute(&mut ledger, &mut log)
            .err();

        let mut firewall_applied = None;
        if error.is_none() {
            match self.apply_firewall(config, &ledger) {
                Ok(list) => firewall_applied = Some(list),
                Err(e) => {
                    tracing::error!("Firewall apply failed: {:#}", e);
                    error = Some(ProvisionError::step_failed("firewall", format!("{:#}", e)));
                }
            }
        }

        let mut rollback_report = None;
        if let Some(err) = &error {
            tracing::error!("{}; rolling back", err);
            let report =
                rollback::rollback(self.registry, config, self.host, &enabled, &mut ledger, &mut log);
            if !report.is_clean() {
                tracing::warn!(
                    "{} rollback action(s) failed; see the ledger",
                    report.failed.len()
                );
            }
            rollback_report = Some(report);

            // Nothing completed is left standing, so only what survived keeps its ports
            match self.apply_firewall(config, &ledger) {
                Ok(list) => firewall_applied = Some(list),
                Err(e) => tracing::warn!("Firewall re-apply after rollback failed: {:#}", e),
            }
        }

        log.run_finished(if error.is_none() { "succeeded" } else { "rolled_back" });

        Ok(RunReport {
            dry_run,
            order,
            auto_included: plan.resolution.auto_included.clone(),
            ledger,
            rollback: rollback_report,
            firewall: firewall_applied,
            failure: error.as_ref().map(ToString::to_string),
            error,
        })
    }

    /// Read-only host checks of every planned feature, before anything is armed.
    fn preflight(&self, config: &ConfigStore, order: &[String], enabled: &BTreeSet<String>) -> Result<()> {
        for id in order {
            let Some(feature) = self.registry.get(id) else {
                continue;
            };
            let ctx = StepContext {
                feature: id.as_str(),
                config,
                host: self.host,
                enabled,
            };
            feature
                .action
                .preflight(&ctx)
                .map_err(|e| ProvisionError::HostMismatch {
                    feature: id.clone(),
                    reason: format!("{:#}", e),
                })?;
        }
        Ok(())
    }

    fn apply_firewall(&self, config: &ConfigStore, ledger: &InstallationState) -> anyhow::Result<AllowList> {
        let list = AllowList::for_features(self.registry, config, ledger.completed());
        firewall::apply(self.host, &list)?;
        Ok(list)
    }
}

/// Dependencies are installed even when the operator switched them off.
fn warn_forced_dependencies(config: &ConfigStore, resolution: &Resolution) {
    for id in &resolution.auto_included {
        let source = config.source(&feature_key(id));
        if matches!(source, Some(s) if s != ValueSource::Default) {
            tracing::warn!(
                "Feature '{}' was disabled but is required by an enabled feature; installing it anyway",
                id
            );
        }
    }
}
