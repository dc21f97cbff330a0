//! Priority Assigner
//!
//! Writes one NetworkManager drop-in per interface *class* present, carrying
//! that class's route metric. Interfaces are matched by the classification
//! table's name globs, so a newly attached dongle inherits its class priority
//! without reconfiguration. Output is a pure function of the set of classes
//! present; files for classes that disappeared are removed.

use crate::commands::network::NmcliReloadConf;
use crate::host::Host;
use crate::network::inventory::{ClassificationTable, NetworkInterface};
use crate::types::InterfaceClass;
use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeMap;
use strum::IntoEnumIterator;

pub const CONF_DIR: &str = "/etc/NetworkManager/conf.d";

/// Drop-in path for a class.
pub fn conf_path(class: InterfaceClass) -> String {
    format!("{}/90-igel-metric-{}.conf", CONF_DIR, class)
}

/// `{class → metric}` for every prioritized class present in `interfaces`.
pub fn assignments(interfaces: &[NetworkInterface]) -> BTreeMap<InterfaceClass, u32> {
    interfaces
        .iter()
        .filter_map(|i| i.class.route_metric().map(|m| (i.class, m)))
        .collect()
}

/// Render the drop-in for one class.
pub fn render(class: InterfaceClass, metric: u32, table: &ClassificationTable) -> String {
    let mut matches: Vec<String> = table
        .patterns_for(class)
        .into_iter()
        .map(|p| format!("interface-name:{}", p))
        .collect();
    matches.extend(
        table
            .shadowing_patterns(class)
            .into_iter()
            .map(|p| format!("except:interface-name:{}", p)),
    );

    format!(
        "# Managed by igel-router: {class} interfaces\n\
         [connection-igel-{class}]\n\
         match-device={matches}\n\
         ipv4.route-metric={metric}\n\
         ipv6.route-metric={metric}\n",
        class = class,
        matches = matches.join(";"),
        metric = metric,
    )
}

/// What an `apply` changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PriorityOutcome {
    pub assignments: BTreeMap<InterfaceClass, u32>,
    pub written: Vec<String>,
    pub removed: Vec<String>,
}

impl PriorityOutcome {
    pub fn changed(&self) -> bool {
        !self.written.is_empty() || !self.removed.is_empty()
    }
}

/// Regenerate the drop-ins for the current inventory and reload NetworkManager
/// if anything changed.
pub fn apply(host: &Host) -> Result<PriorityOutcome> {
    let interfaces = host.inventory().list()?;
    let assignments = assignments(&interfaces);
    let mut outcome = PriorityOutcome {
        assignments: assignments.clone(),
        ..Default::default()
    };

    for class in InterfaceClass::iter().filter(|c| c.is_prioritized()) {
        let path = conf_path(class);
        match assignments.get(&class) {
            Some(metric) => {
                if host.write_file(&path, &render(class, *metric, host.table()), 0o644)? {
                    outcome.written.push(path);
                }
            }
            None => {
                if host.remove_file(&path)? {
                    outcome.removed.push(path);
                }
            }
        }
    }

    for (class, metric) in &outcome.assignments {
        tracing::info!("Route metric {} for {} interfaces", metric, class);
    }

    if outcome.changed() {
        host.run_checked(&NmcliReloadConf)?;
    }
    Ok(outcome)
}

/// Remove every drop-in this module manages.
pub fn remove_all(host: &Host) -> Result<()> {
    let mut removed = false;
    for class in InterfaceClass::iter().filter(|c| c.is_prioritized()) {
        removed |= host.remove_file(&conf_path(class))?;
    }
    if removed {
        host.run_tolerant(&NmcliReloadConf);
    }
    Ok(())
}
