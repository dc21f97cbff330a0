//! Feature Registry
//!
//! A static, declarative table of installable features. Each entry carries its
//! dependency and conflict metadata, the configuration keys it needs, the ports
//! it opens, and an action implementing `install`/`rollback`. Orchestration
//! code never special-cases a feature: adding one means adding an entry here.
//!
//! # Contract for actions
//!
//! - `install` is idempotent: re-running it is a no-op or a safe overwrite.
//! - `rollback` is safe to call even if `install` partially failed or never ran.

pub mod builtin;
pub mod containers;
pub mod dashboard;
pub mod hardening;
pub mod headscale;
pub mod network_priority;
pub mod services;
pub mod tailscale;
pub mod wifi;

use crate::config::{ConfigBuilder, ConfigStore};
use crate::error::{ProvisionError, Result};
use crate::host::Host;
use crate::types::{PortRule, Protocol};
use std::collections::{BTreeSet, HashSet};
use std::fmt;

/// A port a feature needs opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortSpec {
    Fixed(PortRule),
    /// Port read from a configuration key at resolution time
    Configured {
        key: &'static str,
        protocol: Protocol,
        default: u16,
    },
}

impl PortSpec {
    pub fn resolve(&self, config: &ConfigStore) -> PortRule {
        match *self {
            Self::Fixed(rule) => rule,
            Self::Configured {
                key,
                protocol,
                default,
            } => PortRule {
                protocol,
                port: config.port(key).unwrap_or(default),
            },
        }
    }
}

/// Everything an action may touch.
pub struct StepContext<'a> {
    pub feature: &'a str,
    pub config: &'a ConfigStore,
    pub host: &'a Host,
    /// Features in the resolved run (for cross-feature wiring such as the
    /// client logging in to a local coordinator)
    pub enabled: &'a BTreeSet<String>,
}

impl StepContext<'_> {
    pub fn is_enabled(&self, feature: &str) -> bool {
        self.enabled.contains(feature)
    }
}

/// Install and compensating actions of a feature.
pub trait FeatureAction: Send + Sync {
    /// Read-only check against the live host, run for every planned feature
    /// before anything is armed. An `Err` aborts the run as a validation error.
    fn preflight(&self, _ctx: &StepContext) -> anyhow::Result<()> {
        Ok(())
    }

    fn install(&self, ctx: &StepContext) -> anyhow::Result<()>;

    fn rollback(&self, ctx: &StepContext) -> anyhow::Result<()>;
}

/// One registry entry.
pub struct FeatureDescriptor {
    pub id: String,
    /// Short human description (prompts, plan output)
    pub summary: String,
    pub enabled_by_default: bool,
    pub depends_on: Vec<String>,
    pub conflicts_with: Vec<String>,
    pub required_config_keys: Vec<String>,
    pub ports: Vec<PortSpec>,
    /// Config key naming an interface that traffic is NATed out of
    pub masquerade_key: Option<String>,
    /// Failure is a warning, never a rollback trigger
    pub best_effort: bool,
    pub action: Box<dyn FeatureAction>,
}

impl FeatureDescriptor {
    pub fn new(id: &str, summary: &str, action: impl FeatureAction + 'static) -> Self {
        Self {
            id: id.to_string(),
            summary: summary.to_string(),
            enabled_by_default: false,
            depends_on: Vec::new(),
            conflicts_with: Vec::new(),
            required_config_keys: Vec::new(),
            ports: Vec::new(),
            masquerade_key: None,
            best_effort: false,
            action: Box::new(action),
        }
    }

    pub fn default_on(mut self) -> Self {
        self.enabled_by_default = true;
        self
    }

    pub fn depends_on(mut self, ids: &[&str]) -> Self {
        self.depends_on.extend(ids.iter().map(|s| s.to_string()));
        self
    }

    pub fn conflicts_with(mut self, ids: &[&str]) -> Self {
        self.conflicts_with.extend(ids.iter().map(|s| s.to_string()));
        self
    }

    pub fn requires(mut self, keys: &[&str]) -> Self {
        self.required_config_keys
            .extend(keys.iter().map(|s| s.to_string()));
        self
    }

    pub fn port(mut self, spec: PortSpec) -> Self {
        self.ports.push(spec);
        self
    }

    pub fn masquerade_via(mut self, key: &str) -> Self {
        self.masquerade_key = Some(key.to_string());
        self
    }

    pub fn best_effort(mut self) -> Self {
        self.best_effort = true;
        self
    }

    /// Ports with configured values substituted.
    pub fn resolved_ports(&self, config: &ConfigStore) -> BTreeSet<PortRule> {
        self.ports.iter().map(|p| p.resolve(config)).collect()
    }
}

impl fmt::Debug for FeatureDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureDescriptor")
            .field("id", &self.id)
            .field("enabled_by_default", &self.enabled_by_default)
            .field("depends_on", &self.depends_on)
            .field("conflicts_with", &self.conflicts_with)
            .field("required_config_keys", &self.required_config_keys)
            .field("ports", &self.ports)
            .field("masquerade_key", &self.masquerade_key)
            .field("best_effort", &self.best_effort)
            .finish_non_exhaustive()
    }
}

/// Features in declaration order.
#[derive(Debug, Default)]
pub struct FeatureRegistry {
    features: Vec<FeatureDescriptor>,
}

impl FeatureRegistry {
    /// Build a registry, rejecting duplicate ids and references to unknown ids.
    ///
    /// Cycles are not rejected here; the resolver reports them only when the
    /// features involved are actually enabled.
    pub fn new(features: Vec<FeatureDescriptor>) -> Result<Self> {
        let mut seen = HashSet::new();
        for f in &features {
            if !seen.insert(f.id.as_str()) {
                return Err(ProvisionError::config(format!(
                    "feature '{}' is declared twice",
                    f.id
                )));
            }
        }
        for f in &features {
            for referenced in f.depends_on.iter().chain(&f.conflicts_with) {
                if !seen.contains(referenced.as_str()) {
                    return Err(ProvisionError::UnknownFeature {
                        feature: referenced.clone(),
                        referenced_by: f.id.clone(),
                    });
                }
            }
        }
        Ok(Self { features })
    }

    pub fn get(&self, id: &str) -> Option<&FeatureDescriptor> {
        self.features.iter().find(|f| f.id == id)
    }

    /// Declaration index (the resolver's tie-break).
    pub fn position(&self, id: &str) -> Option<usize> {
        self.features.iter().position(|f| f.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FeatureDescriptor> {
        self.features.iter()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.features.iter().map(|f| f.id.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Register one `features.<id>.enabled` toggle per feature.
    pub fn register_toggles(&self, builder: &mut ConfigBuilder) {
        for f in &self.features {
            builder.register_feature(&f.id, f.enabled_by_default, &f.summary);
        }
    }

    /// `ids` plus every transitive dependency. Unknown ids are kept as-is so
    /// the resolver can report them.
    pub fn dependency_closure(&self, ids: &BTreeSet<String>) -> BTreeSet<String> {
        let mut closure = ids.clone();
        let mut stack: Vec<String> = ids.iter().cloned().collect();
        while let Some(id) = stack.pop() {
            if let Some(f) = self.get(&id) {
                for dep in &f.depends_on {
                    if closure.insert(dep.clone()) {
                        stack.push(dep.clone());
                    }
                }
            }
        }
        closure
    }
}
