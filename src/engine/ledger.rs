//! Installation ledger
//!
//! The ordered record of what a run attempted, and the sole input of the
//! rollback manager. It starts empty and is append-only: queueing a feature
//! appends a `pending` entry, and every later move appends another. A
//! feature's status is its latest entry. Moves only ever go forward:
//!
//! ```text
//! pending ──→ running ──→ completed ──→ rolled_back
//!    │           │             └──────→ rollback_failed
//!    │           └──→ failed
//!    ├──→ failed   (pre-flight: missing configuration)
//!    └──→ skipped  (a best-effort dependency did not complete)
//! ```
//!
//! The ledger lives in memory for one run only. Re-running the orchestrator is
//! the recovery path.

use crate::types::StepStatus;
use serde::Serialize;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Errors from invalid ledger moves.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerTransitionError {
    #[error("Feature '{feature}' is not part of this run")]
    UnknownFeature { feature: String },

    #[error("Feature '{feature}' is already queued")]
    AlreadyQueued { feature: String },

    #[error("Feature '{feature}' cannot move from {from} to {to}")]
    InvalidTransition {
        feature: String,
        from: StepStatus,
        to: StepStatus,
    },
}

/// One recorded move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    pub feature: String,
    pub status: StepStatus,
    /// Unix seconds
    pub timestamp: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

const fn is_valid_transition(from: StepStatus, to: StepStatus) -> bool {
    use StepStatus::*;
    matches!(
        (from, to),
        (Pending, Running)
            | (Pending, Failed)
            | (Pending, Skipped)
            | (Running, Completed)
            | (Running, Failed)
            | (Completed, RolledBack)
            | (Completed, RollbackFailed)
    )
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct InstallationState {
    /// Queued features in install order
    #[serde(skip)]
    queue: Vec<String>,
    history: Vec<LedgerEntry>,
}

impl InstallationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue every feature, in install order.
    pub fn pending<I, S>(features: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut ledger = Self::new();
        for feature in features {
            // Resolved orders never repeat an id
            let _ = ledger.enqueue(feature);
        }
        ledger
    }

    /// Append a `pending` entry for a feature not yet in the run.
    pub fn enqueue(&mut self, feature: impl Into<String>) -> Result<(), LedgerTransitionError> {
        let feature = feature.into();
        if self.queue.contains(&feature) {
            return Err(LedgerTransitionError::AlreadyQueued { feature });
        }
        self.history.push(LedgerEntry {
            feature: feature.clone(),
            status: StepStatus::Pending,
            timestamp: now(),
            detail: None,
        });
        self.queue.push(feature);
        Ok(())
    }

    /// Queued features in install order.
    pub fn features(&self) -> impl Iterator<Item = &str> {
        self.queue.iter().map(String::as_str)
    }

    /// Every recorded move, oldest first.
    pub fn history(&self) -> &[LedgerEntry] {
        &self.history
    }

    /// Moves recorded for one feature, oldest first.
    pub fn history_of<'a>(&'a self, feature: &'a str) -> impl Iterator<Item = &'a LedgerEntry> {
        self.history.iter().filter(move |e| e.feature == feature)
    }

    /// Latest entry of `feature`.
    pub fn latest(&self, feature: &str) -> Option<&LedgerEntry> {
        self.history.iter().rev().find(|e| e.feature == feature)
    }

    pub fn status(&self, feature: &str) -> Option<StepStatus> {
        self.latest(feature).map(|e| e.status)
    }

    /// Record a move of `feature` to `to`.
    ///
    /// # Errors
    ///
    /// - `UnknownFeature` if the feature was never queued
    /// - `InvalidTransition` for any move outside the diagram above
    pub fn transition(
        &mut self,
        feature: &str,
        to: StepStatus,
        detail: Option<String>,
    ) -> Result<(), LedgerTransitionError> {
        let from = self
            .status(feature)
            .ok_or_else(|| LedgerTransitionError::UnknownFeature {
                feature: feature.to_string(),
            })?;

        if !is_valid_transition(from, to) {
            return Err(LedgerTransitionError::InvalidTransition {
                feature: feature.to_string(),
                from,
                to,
            });
        }

        self.history.push(LedgerEntry {
            feature: feature.to_string(),
            status: to,
            timestamp: now(),
            detail,
        });
        Ok(())
    }

    /// Features currently `completed`, in install order.
    pub fn completed(&self) -> impl Iterator<Item = &str> {
        self.with_status(StepStatus::Completed)
    }

    pub fn with_status(&self, status: StepStatus) -> impl Iterator<Item = &str> {
        self.features()
            .filter(move |f| self.status(f) == Some(status))
    }
}

impl fmt::Display for InstallationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self.queue.iter().map(String::len).max().unwrap_or(0);
        for entry in self.features().filter_map(|id| self.latest(id)) {
            write!(f, "  {:width$}  {}", entry.feature, entry.status, width = width)?;
            if let Some(detail) = &entry.detail {
                write!(f, " ({})", detail)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> InstallationState {
        InstallationState::pending(["networkPriority", "hardening"])
    }

    #[test]
    fn test_starts_empty() {
        let l = InstallationState::new();
        assert!(l.history().is_empty());
        assert_eq!(l.status("networkPriority"), None);
    }

    #[test]
    fn test_pending_in_order() {
        let l = ledger();
        assert_eq!(l.features().collect::<Vec<_>>(), vec!["networkPriority", "hardening"]);
        assert_eq!(l.history().len(), 2);
        assert!(l.history().iter().all(|e| e.status == StepStatus::Pending));
    }

    #[test]
    fn test_history_is_appended_per_transition() {
        let mut l = ledger();
        l.transition("networkPriority", StepStatus::Running, None).unwrap();
        l.transition("hardening", StepStatus::Skipped, Some("no".into())).unwrap();
        l.transition("networkPriority", StepStatus::Completed, None).unwrap();
        l.transition("networkPriority", StepStatus::RolledBack, None).unwrap();

        let moves: Vec<StepStatus> = l.history_of("networkPriority").map(|e| e.status).collect();
        assert_eq!(
            moves,
            vec![
                StepStatus::Pending,
                StepStatus::Running,
                StepStatus::Completed,
                StepStatus::RolledBack
            ]
        );
        let stamps: Vec<u64> = l.history_of("networkPriority").map(|e| e.timestamp).collect();
        assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(l.history().len(), 6);
        // Interleaved moves keep their global order
        assert_eq!(l.history()[3].feature, "hardening");
        assert_eq!(l.status("networkPriority"), Some(StepStatus::RolledBack));
        assert_eq!(l.status("hardening"), Some(StepStatus::Skipped));
    }

    #[test]
    fn test_cannot_complete_without_running() {
        let mut l = ledger();
        let err = l
            .transition("networkPriority", StepStatus::Completed, None)
            .unwrap_err();
        assert_eq!(
            err,
            LedgerTransitionError::InvalidTransition {
                feature: "networkPriority".into(),
                from: StepStatus::Pending,
                to: StepStatus::Completed,
            }
        );
        // Rejected moves leave no trace
        assert_eq!(l.history().len(), 2);
    }

    #[test]
    fn test_failed_cannot_be_rolled_back() {
        let mut l = ledger();
        l.transition("networkPriority", StepStatus::Running, None).unwrap();
        l.transition("networkPriority", StepStatus::Failed, Some("boom".into()))
            .unwrap();
        assert!(l
            .transition("networkPriority", StepStatus::RolledBack, None)
            .is_err());
        assert_eq!(l.latest("networkPriority").unwrap().detail.as_deref(), Some("boom"));
    }

    #[test]
    fn test_unknown_and_duplicate_features() {
        let mut l = ledger();
        assert!(matches!(
            l.transition("docker", StepStatus::Running, None),
            Err(LedgerTransitionError::UnknownFeature { .. })
        ));
        assert!(matches!(
            l.enqueue("hardening"),
            Err(LedgerTransitionError::AlreadyQueued { .. })
        ));
    }

    #[test]
    fn test_completed_in_install_order() {
        let mut l = ledger();
        l.transition("hardening", StepStatus::Running, None).unwrap();
        l.transition("hardening", StepStatus::Completed, None).unwrap();
        l.transition("networkPriority", StepStatus::Running, None).unwrap();
        l.transition("networkPriority", StepStatus::Completed, None).unwrap();
        assert_eq!(
            l.completed().collect::<Vec<_>>(),
            vec!["networkPriority", "hardening"]
        );
        let text = l.to_string();
        assert!(text.contains("networkPriority  completed"));
    }
}
