//! Route-metric prioritization by interface class.

use super::{FeatureAction, StepContext};
use crate::network::priority;
use crate::network::wan::WanDetection;
use anyhow::Result;

pub struct NetworkPriority;

impl FeatureAction for NetworkPriority {
    fn install(&self, ctx: &StepContext) -> Result<()> {
        let outcome = priority::apply(ctx.host)?;
        if outcome.assignments.is_empty() {
            tracing::warn!("No prioritizable interfaces present; no route metrics written");
        }

        match ctx.host.detect_wan() {
            WanDetection::NoneFound => tracing::warn!(
                "No internet uplink detected; internet-dependent features may fail"
            ),
            wan => tracing::info!("WAN interface: {}", wan),
        }
        Ok(())
    }

    fn rollback(&self, ctx: &StepContext) -> Result<()> {
        priority::remove_all(ctx.host)
    }
}
