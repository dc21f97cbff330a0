//! Dependency Resolver
//!
//! Turns the set of requested feature ids into a total install order.
//!
//! # Design
//!
//! - **Closure first**: hard dependencies are auto-included even if not requested
//! - **Conflicts before ordering**: a pure validation pass, checked both ways
//! - **Deterministic**: DFS visits roots and dependencies in registry declaration
//!   order, so unrelated features keep the order they were declared in
//! - **Pure logic**: no I/O, no side effects

use crate::error::{ProvisionError, Result};
use crate::features::FeatureRegistry;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

/// Resolved install plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    /// Install order; every feature follows all of its dependencies
    pub order: Vec<String>,
    /// Ids that were enabled in the configuration
    pub requested: BTreeSet<String>,
    /// Ids pulled in only as dependencies
    pub auto_included: BTreeSet<String>,
}

impl Resolution {
    pub fn enabled(&self) -> BTreeSet<String> {
        self.order.iter().cloned().collect()
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    OnStack,
    Done,
}

// ============================================================================
// Resolution
// ============================================================================

/// Resolve `requested` against `registry`.
///
/// # Errors
///
/// - `UnknownFeature` for a requested id the registry does not declare
/// - `ConflictingFeatures` when two features of the closure conflict
/// - `CyclicDependency` naming the cycle, first node repeated at the end
pub fn resolve(registry: &FeatureRegistry, requested: &BTreeSet<String>) -> Result<Resolution> {
    for id in requested {
        if registry.get(id).is_none() {
            return Err(ProvisionError::UnknownFeature {
                feature: id.clone(),
                referenced_by: "configuration".to_string(),
            });
        }
    }

    let closure = registry.dependency_closure(requested);
    check_conflicts(registry, &closure)?;

    let mut marks: HashMap<&str, Mark> = HashMap::new();
    let mut stack: Vec<&str> = Vec::new();
    let mut order = Vec::with_capacity(closure.len());

    for feature in registry.iter() {
        if closure.contains(&feature.id) {
            visit(registry, &feature.id, &mut marks, &mut stack, &mut order)?;
        }
    }

    let auto_included = closure.difference(requested).cloned().collect();
    Ok(Resolution {
        order,
        requested: requested.clone(),
        auto_included,
    })
}

fn check_conflicts(registry: &FeatureRegistry, enabled: &BTreeSet<String>) -> Result<()> {
    // Walk in declaration order so the reported pair is stable
    for feature in registry.iter().filter(|f| enabled.contains(&f.id)) {
        for other in registry.iter().filter(|o| enabled.contains(&o.id)) {
            if feature.id == other.id {
                continue;
            }
            if feature.conflicts_with.contains(&other.id) || other.conflicts_with.contains(&feature.id)
            {
                return Err(ProvisionError::ConflictingFeatures {
                    a: feature.id.clone(),
                    b: other.id.clone(),
                });
            }
        }
    }
    Ok(())
}

fn visit<'a>(
    registry: &'a FeatureRegistry,
    id: &'a str,
    marks: &mut HashMap<&'a str, Mark>,
    stack: &mut Vec<&'a str>,
    order: &mut Vec<String>,
) -> Result<()> {
    match marks.get(id) {
        Some(Mark::Done) => return Ok(()),
        Some(Mark::OnStack) => {
            let start = stack.iter().position(|s| *s == id).unwrap_or(0);
            let mut cycle: Vec<String> = stack[start..].iter().map(|s| s.to_string()).collect();
            cycle.push(id.to_string());
            return Err(ProvisionError::CyclicDependency { cycle });
        }
        None => {}
    }

    let Some(feature) = registry.get(id) else {
        return Err(ProvisionError::UnknownFeature {
            feature: id.to_string(),
            referenced_by: stack.last().map(|s| s.to_string()).unwrap_or_default(),
        });
    };

    marks.insert(id, Mark::OnStack);
    stack.push(id);

    let mut deps: Vec<&'a str> = feature.depends_on.iter().map(String::as_str).collect();
    deps.sort_by_key(|d| registry.position(d).unwrap_or(usize::MAX));
    for dep in deps {
        visit(registry, dep, marks, stack, order)?;
    }

    stack.pop();
    marks.insert(id, Mark::Done);
    order.push(id.to_string());
    Ok(())
}
