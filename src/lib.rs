//! IGEL Router Library
//!
//! Configuration-driven provisioning of a thin client as a mesh-VPN subnet
//! router: feature registry and dependency resolution, a sequential step
//! executor with ledger-driven rollback, network interface prioritization and
//! WAN detection, and a firewall recomputed from the installed feature set.

pub mod cli;
pub mod command_runner;
pub mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod features;
pub mod firewall;
pub mod host;
pub mod host_command;
pub mod logic;
pub mod network;
pub mod process_guard;
pub mod prompt;
pub mod sanity;
pub mod types;

// Re-export main types for convenience
pub use command_runner::{CommandLine, CommandOutput, CommandRunner, SystemRunner};
pub use config::{ConfigBuilder, ConfigStore, ConfigValue, ValueSource};
pub use engine::ledger::{InstallationState, LedgerEntry, LedgerTransitionError};
pub use engine::rollback::RollbackReport;
pub use engine::{Orchestrator, Plan, RunReport};
pub use error::{ProvisionError, Result};
pub use features::{FeatureAction, FeatureDescriptor, FeatureRegistry, PortSpec, StepContext};
pub use firewall::AllowList;
pub use host::Host;
pub use host_command::HostCommand;
pub use logic::resolver::{Resolution, resolve};
pub use network::inventory::{ClassificationTable, InterfaceInventory, LinkSource, NetworkInterface};
pub use network::wan::{Prober, WanDetection, WanDetector};
pub use process_guard::{ChildRegistry, CommandProcessGroup, ProcessGuard};
pub use types::{InterfaceClass, OperState, PortRule, Protocol, StepStatus};
