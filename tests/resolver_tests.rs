//! Property-Based Tests for the dependency resolver
//!
//! These tests verify:
//! - Every feature follows all of its dependencies
//! - Cycles among enabled features are always reported, naming the cycle
//! - The coordinator UI pulls in its server

mod common;

use common::{Journal, Scripted};
use igel_router::error::ProvisionError;
use igel_router::features::{FeatureDescriptor, FeatureRegistry, builtin};
use igel_router::logic::resolver::resolve;
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

/// Acyclic graph: feature `i` may depend on any `j < i`. Declared in reverse
/// so declaration order never coincides with a valid install order.
fn dag_strategy() -> impl Strategy<Value = Vec<Vec<usize>>> {
    (1usize..10).prop_flat_map(|n| {
        (0..n)
            .map(|i| proptest::sample::subsequence((0..i).collect::<Vec<_>>(), 0..=i))
            .collect::<Vec<_>>()
    })
}

fn registry_from(deps: &[Vec<usize>]) -> FeatureRegistry {
    let j = journal();
    let features = (0..deps.len())
        .rev()
        .map(|i| {
            let names: Vec<String> = deps[i].iter().map(|d| format!("n{}", d)).collect();
            let refs: Vec<&str> = names.iter().map(String::as_str).collect();
            FeatureDescriptor::new(&format!("n{}", i), "node", Scripted::ok(&j)).depends_on(&refs)
        })
        .collect();
    FeatureRegistry::new(features).unwrap()
}

// =============================================================================
// Ordering
// =============================================================================

proptest! {
    #[test]
    fn order_respects_dependencies(deps in dag_strategy(), pick in any::<proptest::sample::Index>()) {
        let registry = registry_from(&deps);
        let requested = BTreeSet::from([format!("n{}", pick.index(deps.len()))]);

        let res = resolve(&registry, &requested).unwrap();

        let pos = |id: &str| res.order.iter().position(|f| f == id);
        let unique: BTreeSet<&String> = res.order.iter().collect();
        prop_assert_eq!(unique.len(), res.order.len());
        for id in &res.order {
            let feature = registry.get(id).unwrap();
            for dep in &feature.depends_on {
                let (d, f) = (pos(dep.as_str()), pos(id.as_str()));
                prop_assert!(d.is_some(), "dependency {} of {} missing", dep, id);
                prop_assert!(d < f, "{} must precede {}", dep, id);
            }
        }
        // Exactly the closure: requested plus what it needs
        let closure = registry.dependency_closure(&requested);
        prop_assert_eq!(unique.len(), closure.len());
        prop_assert!(res.auto_included.iter().all(|a| !requested.contains(a)));
    }

    #[test]
    fn resolution_is_deterministic(deps in dag_strategy()) {
        let registry = registry_from(&deps);
        let all: BTreeSet<String> = (0..deps.len()).map(|i| format!("n{}", i)).collect();
        let first = resolve(&registry, &all).unwrap();
        let second = resolve(&registry, &all).unwrap();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn cycles_are_reported(ring in 1usize..6, extra in 0usize..4, entry in any::<proptest::sample::Index>()) {
        let j = journal();
        let mut features = Vec::new();
        for i in 0..ring {
            let next = format!("c{}", (i + 1) % ring);
            features.push(FeatureDescriptor::new(&format!("c{}", i), "cycle", Scripted::ok(&j)).depends_on(&[next.as_str()]));
        }
        for i in 0..extra {
            features.push(FeatureDescriptor::new(&format!("x{}", i), "extra", Scripted::ok(&j)).depends_on(&["c0"]));
        }
        let registry = FeatureRegistry::new(features).unwrap();
        let start = format!("c{}", entry.index(ring));

        match resolve(&registry, &BTreeSet::from([start])) {
            Err(ProvisionError::CyclicDependency { cycle }) => {
                prop_assert_eq!(cycle.first(), cycle.last());
                prop_assert_eq!(cycle.len(), ring + 1);
                prop_assert!(cycle.iter().all(|c| c.starts_with('c')));
            }
            other => prop_assert!(false, "expected a cycle, got {:?}", other),
        }
    }
}

// =============================================================================
// Built-in registry scenarios
// =============================================================================

#[test]
fn test_headplane_alone_pulls_in_coordinator_server() {
    let registry = builtin::registry().unwrap();
    let res = resolve(&registry, &BTreeSet::from(["headplane".to_string()])).unwrap();
    let pos = |id: &str| res.order.iter().position(|f| f == id).unwrap();
    assert!(pos("headscale") < pos("headplane"));
    assert!(res.auto_included.contains("headscale"));
    assert!(!res.auto_included.contains("headplane"));
}

#[test]
fn test_default_feature_set_order() {
    let registry = builtin::registry().unwrap();
    let defaults: BTreeSet<String> = registry
        .iter()
        .filter(|f| f.enabled_by_default)
        .map(|f| f.id.clone())
        .collect();
    let res = resolve(&registry, &defaults).unwrap();
    assert_eq!(
        res.order,
        vec!["networkPriority", "tailscale", "cockpit", "dashboard", "hardening"]
    );
}

#[test]
fn test_full_preset_is_conflict_free() {
    let registry = builtin::registry().unwrap();
    let full: BTreeSet<String> = registry
        .ids()
        .into_iter()
        .filter(|id| !builtin::FULL_PRESET_EXCLUDES.contains(id))
        .map(str::to_string)
        .collect();
    let res = resolve(&registry, &full).unwrap();
    assert_eq!(res.order.len(), registry.len() - 1);
}
