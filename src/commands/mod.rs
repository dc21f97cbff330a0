//! Typed host command modules.
//!
//! Each struct implements [`HostCommand`](crate::host_command::HostCommand) and maps
//! Rust fields to the exact flags expected by the corresponding host tool.

pub mod containers;
pub mod firewall;
pub mod network;
pub mod packages;
pub mod services;
pub mod vpn;
pub mod wifi;
