//! Rollback Manager
//!
//! Walks the ledger in reverse and runs the compensating action of every
//! `completed` feature. Features never reached are never touched. A failing
//! compensation is reported and the unwind continues.

use super::executor::record;
use super::ledger::InstallationState;
use super::run_log::RunLog;
use crate::config::ConfigStore;
use crate::error::ProvisionError;
use crate::features::{FeatureRegistry, StepContext};
use crate::host::Host;
use crate::types::StepStatus;
use serde::Serialize;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RollbackReport {
    /// Features unwound, in unwind order
    pub rolled_back: Vec<String>,
    /// `(feature, reason)` for compensations that failed
    pub failed: Vec<(String, String)>,
}

impl RollbackReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

pub fn rollback(
    registry: &FeatureRegistry,
    config: &ConfigStore,
    host: &Host,
    enabled: &BTreeSet<String>,
    ledger: &mut InstallationState,
    log: &mut RunLog,
) -> RollbackReport {
    let mut report = RollbackReport::default();
    let completed: Vec<String> = ledger.completed().map(str::to_string).collect();

    for id in completed.iter().rev() {
        let Some(feature) = registry.get(id) else {
            continue;
        };
        tracing::info!("Rolling back {}", id);
        let ctx = StepContext {
            feature: id,
            config,
            host,
            enabled,
        };
        match feature.action.rollback(&ctx) {
            Ok(()) => {
                record(ledger, log, id, StepStatus::RolledBack, None);
                report.rolled_back.push(id.clone());
            }
            Err(e) => {
                let err = ProvisionError::RollbackActionFailed {
                    feature: id.clone(),
                    reason: format!("{:#}", e),
                };
                tracing::warn!("{}", err);
                let reason = format!("{:#}", e);
                record(ledger, log, id, StepStatus::RollbackFailed, Some(&reason));
                report.failed.push((id.clone(), reason));
            }
        }
    }
    report
}
