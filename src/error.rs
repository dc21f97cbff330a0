//! Error handling module for the provisioning orchestrator
//!
//! Provides the error taxonomy shared by configuration, resolution and execution.
//! Validation-phase errors abort before any mutation; execution-phase errors are
//! always routed through the rollback manager before the process exits.

use thiserror::Error;

/// Exit code for a successful run.
pub const EXIT_SUCCESS: u8 = 0;
/// Exit code for usage/validation errors (no mutation attempted).
pub const EXIT_VALIDATION: u8 = 1;
/// Exit code for fatal execution errors (rollback was attempted).
pub const EXIT_EXECUTION: u8 = 2;

/// Main error type for the orchestrator
#[derive(Error, Debug)]
pub enum ProvisionError {
    /// Bad command-line input
    #[error("Usage error: {0}")]
    Usage(String),

    /// Configuration values that failed validation (hostname, routes, ports)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A feature's required configuration key is absent or empty
    #[error("Feature '{feature}' requires configuration key '{key}'")]
    MissingConfiguration { feature: String, key: String },

    /// The enabled feature set contains a dependency cycle
    #[error("Cyclic dependency: {}", cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },

    /// Two enabled features declare a conflict
    #[error("Features '{a}' and '{b}' cannot be enabled together")]
    ConflictingFeatures { a: String, b: String },

    /// A feature references (or the user requested) an id not in the registry
    #[error("Unknown feature '{feature}' (referenced by '{referenced_by}')")]
    UnknownFeature {
        feature: String,
        referenced_by: String,
    },

    /// A feature's install action failed
    #[error("Step '{feature}' failed: {reason}")]
    StepFailed { feature: String, reason: String },

    /// A feature's settings clash with what was found on the host (checked before arming)
    #[error("Feature '{feature}' cannot run on this host: {reason}")]
    HostMismatch { feature: String, reason: String },

    /// A rollback action failed (reported, never escalated)
    #[error("Rollback of '{feature}' failed: {reason}")]
    RollbackActionFailed { feature: String, reason: String },

    /// Pre-flight environment checks failed (not root, missing binaries)
    #[error("Environment check failed: {0}")]
    Environment(String),

    /// IO errors (file operations, command spawning)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors (reports, plan output)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for orchestrator operations
pub type Result<T> = std::result::Result<T, ProvisionError>;

impl ProvisionError {
    /// Create a usage error
    pub fn usage(msg: impl Into<String>) -> Self {
        Self::Usage(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an environment error
    pub fn environment(msg: impl Into<String>) -> Self {
        Self::Environment(msg.into())
    }

    /// Create a step failure for a feature
    pub fn step_failed(feature: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StepFailed {
            feature: feature.into(),
            reason: reason.into(),
        }
    }

    /// Returns true for errors raised before any mutation took place.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::Usage(_)
                | Self::Config(_)
                | Self::CyclicDependency { .. }
                | Self::ConflictingFeatures { .. }
                | Self::UnknownFeature { .. }
                | Self::HostMismatch { .. }
                | Self::Environment(_)
        )
    }

    /// Process exit code for this error.
    ///
    /// `MissingConfiguration` counts as an execution error: when it is raised by the
    /// step executor, earlier features may already have been installed and rolled back.
    pub fn exit_code(&self) -> u8 {
        if self.is_validation() {
            EXIT_VALIDATION
        } else {
            EXIT_EXECUTION
        }
    }

    /// Feature id this error is about, if any.
    pub fn feature(&self) -> Option<&str> {
        match self {
            Self::MissingConfiguration { feature, .. }
            | Self::UnknownFeature { feature, .. }
            | Self::StepFailed { feature, .. }
            | Self::HostMismatch { feature, .. }
            | Self::RollbackActionFailed { feature, .. } => Some(feature),
            Self::ConflictingFeatures { a, .. } => Some(a),
            Self::CyclicDependency { cycle } => cycle.first().map(String::as_str),
            _ => None,
        }
    }

    /// One-line remediation hint shown next to the error.
    pub fn remediation(&self) -> String {
        match self {
            Self::Usage(_) => "run with --help to list the accepted flags".to_string(),
            Self::Config(_) => {
                "correct the value via its flag or IGEL_* environment variable".to_string()
            }
            Self::MissingConfiguration { key, .. } => format!(
                "set {} or export {}",
                crate::config::flag_hint(key),
                crate::config::env_var_name(key)
            ),
            Self::CyclicDependency { .. } => {
                "break the cycle in the feature registry dependsOn lists".to_string()
            }
            Self::ConflictingFeatures { b, .. } => {
                format!("disable one of them, e.g. --no-{}", crate::config::kebab(b))
            }
            Self::UnknownFeature { .. } => "check the feature id spelling".to_string(),
            Self::StepFailed { feature, .. } => format!(
                "fix the cause (see the run log), then re-run; or skip it with --no-{}",
                crate::config::kebab(feature)
            ),
            Self::HostMismatch { feature, .. } => format!(
                "adjust the feature's settings, or skip it with --no-{}",
                crate::config::kebab(feature)
            ),
            Self::RollbackActionFailed { feature, .. } => {
                format!("inspect '{}' manually; the unwind continued", feature)
            }
            Self::Environment(_) => "run as root on the target appliance".to_string(),
            Self::Io(_) | Self::Json(_) => "check permissions under --root".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProvisionError::CyclicDependency {
            cycle: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "Cyclic dependency: a -> b -> a");

        let err = ProvisionError::MissingConfiguration {
            feature: "headscale".into(),
            key: "headscale.domain".into(),
        };
        assert_eq!(
            err.to_string(),
            "Feature 'headscale' requires configuration key 'headscale.domain'"
        );
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(ProvisionError::usage("--bogus").exit_code(), EXIT_VALIDATION);
        let conflict = ProvisionError::ConflictingFeatures {
            a: "wifiAp".into(),
            b: "wifiUplink".into(),
        };
        assert_eq!(conflict.exit_code(), EXIT_VALIDATION);
        assert_eq!(
            ProvisionError::step_failed("cockpit", "apt-get failed").exit_code(),
            EXIT_EXECUTION
        );
    }

    #[test]
    fn test_host_mismatch_is_validation() {
        let err = ProvisionError::HostMismatch {
            feature: "wifiAp".into(),
            reason: "wlan0 carries the uplink".into(),
        };
        assert_eq!(err.exit_code(), EXIT_VALIDATION);
        assert_eq!(err.feature(), Some("wifiAp"));
        assert!(err.remediation().contains("--no-wifi-ap"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: ProvisionError = io_err.into();
        assert!(matches!(err, ProvisionError::Io(_)));
        assert!(!err.is_validation());
    }

    #[test]
    fn test_remediation_mentions_flag_and_env() {
        let err = ProvisionError::MissingConfiguration {
            feature: "headscale".into(),
            key: "headscale.domain".into(),
        };
        let hint = err.remediation();
        assert!(hint.contains("--headscale-domain"));
        assert!(hint.contains("IGEL_HEADSCALE_DOMAIN"));
        assert_eq!(err.feature(), Some("headscale"));
    }
}
