//! Logic modules: pure translation of the enabled feature set into a plan.
//!
//! # Modules
//!
//! - `resolver`: dependency closure, conflict check and install ordering

pub mod resolver;
