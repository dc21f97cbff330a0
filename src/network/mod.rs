//! Network interface prioritization and WAN detection.

pub mod inventory;
pub mod priority;
pub mod wan;
pub mod wifi;
