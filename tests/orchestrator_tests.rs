//! Orchestrator integration tests: ledger, rollback, firewall and idempotence.

mod common;

use common::{FakeLinks, FakeProber, FakeRunner, Journal, Scripted};
use igel_router::engine::Orchestrator;
use igel_router::engine::executor::StepExecutor;
use igel_router::engine::ledger::InstallationState;
use igel_router::engine::run_log::RunLog;
use igel_router::error::{EXIT_EXECUTION, EXIT_SUCCESS, EXIT_VALIDATION, ProvisionError};
use igel_router::features::{FeatureDescriptor, FeatureRegistry, PortSpec, builtin};
use igel_router::host::Host;
use igel_router::network::inventory::LinkInfo;
use igel_router::types::{OperState, PortRule, StepStatus};
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::fs;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

/// `n` independent default-on features `f0..f{n-1}`; `fail_at` fails.
fn chain(n: usize, fail_at: Option<usize>, journal: &Journal) -> FeatureRegistry {
    let features = (0..n)
        .map(|i| {
            let action = if Some(i) == fail_at {
                Scripted::failing(journal)
            } else {
                Scripted::ok(journal)
            };
            FeatureDescriptor::new(&format!("f{}", i), "scripted", action)
                .default_on()
                .port(PortSpec::Fixed(PortRule::tcp(10_000 + i as u16)))
        })
        .collect();
    FeatureRegistry::new(features).unwrap()
}

// =============================================================================
// Rollback
// =============================================================================

proptest! {
    /// Failing at step k unwinds exactly steps 1..k-1, in reverse order.
    #[test]
    fn rollback_unwinds_completed_steps_in_reverse((n, k) in (1usize..8).prop_flat_map(|n| (Just(n), 0..n))) {
        let dir = TempDir::new().unwrap();
        let runner = FakeRunner::new();
        let journal = journal();
        let registry = chain(n, Some(k), &journal);
        let config = common::config(&registry, &[]);
        let host = common::host(dir.path(), runner);

        let report = Orchestrator::new(&registry, &host).run(&config).unwrap();
        prop_assert_eq!(report.exit_code(), EXIT_EXECUTION);

        let mut expected: Vec<String> = (0..=k).map(|i| format!("install:f{}", i)).collect();
        expected.extend((0..k).rev().map(|i| format!("rollback:f{}", i)));
        prop_assert_eq!(&*journal.lock().unwrap(), &expected);

        let rollback = report.rollback.as_ref().unwrap();
        let unwound: Vec<String> = (0..k).rev().map(|i| format!("f{}", i)).collect();
        prop_assert_eq!(&rollback.rolled_back, &unwound);

        for i in 0..n {
            let status = report.ledger.status(&format!("f{}", i)).unwrap();
            let want = if i < k {
                StepStatus::RolledBack
            } else if i == k {
                StepStatus::Failed
            } else {
                StepStatus::Pending
            };
            prop_assert_eq!(status, want);
        }
    }
}

#[test]
fn test_failed_rollback_does_not_stop_the_unwind() {
    let dir = TempDir::new().unwrap();
    let journal = journal();
    let registry = FeatureRegistry::new(vec![
        FeatureDescriptor::new("a", "A", Scripted::ok(&journal)).default_on(),
        FeatureDescriptor::new(
            "b",
            "B",
            Scripted {
                fail_rollback: true,
                ..Scripted::ok(&journal)
            },
        )
        .default_on(),
        FeatureDescriptor::new("c", "C", Scripted::failing(&journal)).default_on(),
    ])
    .unwrap();
    let config = common::config(&registry, &[]);
    let host = common::host(dir.path(), FakeRunner::new());

    let report = Orchestrator::new(&registry, &host).run(&config).unwrap();

    assert_eq!(report.exit_code(), EXIT_EXECUTION);
    assert!(matches!(report.error, Some(ProvisionError::StepFailed { ref feature, .. }) if feature == "c"));
    assert_eq!(report.ledger.status("b"), Some(StepStatus::RollbackFailed));
    assert_eq!(report.ledger.status("a"), Some(StepStatus::RolledBack));
    let rollback = report.rollback.unwrap();
    assert_eq!(rollback.failed.len(), 1);
    assert_eq!(rollback.rolled_back, vec!["a"]);
}

#[test]
fn test_best_effort_failure_skips_dependents_without_rollback() {
    let dir = TempDir::new().unwrap();
    let journal = journal();
    let registry = FeatureRegistry::new(vec![
        FeatureDescriptor::new("base", "Base", Scripted::ok(&journal)).default_on(),
        FeatureDescriptor::new("extra", "Extra", Scripted::failing(&journal))
            .default_on()
            .best_effort()
            .port(PortSpec::Fixed(PortRule::tcp(7000))),
        FeatureDescriptor::new("onTop", "On top", Scripted::ok(&journal))
            .default_on()
            .depends_on(&["extra"])
            .port(PortSpec::Fixed(PortRule::tcp(7001))),
    ])
    .unwrap();
    let config = common::config(&registry, &[]);
    let host = common::host(dir.path(), FakeRunner::new());

    let report = Orchestrator::new(&registry, &host).run(&config).unwrap();

    assert_eq!(report.exit_code(), EXIT_SUCCESS);
    assert!(report.rollback.is_none());
    assert_eq!(report.ledger.status("extra"), Some(StepStatus::Failed));
    assert_eq!(report.ledger.status("onTop"), Some(StepStatus::Skipped));
    assert_eq!(
        *journal.lock().unwrap(),
        vec!["install:base", "install:extra"]
    );
    let firewall = report.firewall.unwrap();
    assert!(!firewall.allows(PortRule::tcp(7000)));
    assert!(!firewall.allows(PortRule::tcp(7001)));
}

#[test]
fn test_missing_configuration_is_caught_before_any_step() {
    let dir = TempDir::new().unwrap();
    let runner = FakeRunner::new();
    let registry = builtin::registry().unwrap();
    let config = common::config(&registry, &[("features.headscale.enabled", "true")]);
    let host = common::host(dir.path(), Arc::clone(&runner));

    let err = Orchestrator::new(&registry, &host).run(&config).unwrap_err();

    assert!(matches!(
        err,
        ProvisionError::MissingConfiguration { ref feature, ref key }
            if feature == "headscale" && key == "headscale.domain"
    ));
    assert!(runner.rendered().is_empty());
    assert!(!dir.path().join("var/log/igel-router/install.log").exists());
}

#[test]
fn test_conflict_is_rejected_without_mutation() {
    let dir = TempDir::new().unwrap();
    let runner = FakeRunner::new();
    let registry = builtin::registry().unwrap();
    let config = common::config(
        &registry,
        &[
            ("features.wifiAp.enabled", "true"),
            ("features.wifiUplink.enabled", "true"),
            ("wifi.apSsid", "igel"),
            ("wifi.apPassword", "correct-horse"),
            ("wifi.uplinkSsid", "cafe"),
        ],
    );
    let host = common::host(dir.path(), Arc::clone(&runner));

    let err = Orchestrator::new(&registry, &host).run(&config).unwrap_err();
    assert_eq!(err.exit_code(), 1);
    assert!(runner.rendered().is_empty());
}

#[test]
fn test_executor_stops_at_missing_configuration() {
    let dir = TempDir::new().unwrap();
    let journal = journal();
    let registry = FeatureRegistry::new(vec![
        FeatureDescriptor::new("first", "first", Scripted::ok(&journal)).default_on(),
        FeatureDescriptor::new("second", "second", Scripted::ok(&journal))
            .default_on()
            .requires(&["headscale.domain"]),
        FeatureDescriptor::new("third", "third", Scripted::ok(&journal)).default_on(),
    ])
    .unwrap();
    let config = common::config(&registry, &[]);
    let host = common::host(dir.path(), FakeRunner::new());
    let enabled = BTreeSet::from(["first".to_string(), "second".to_string(), "third".to_string()]);
    let mut ledger = InstallationState::pending(["first", "second", "third"]);

    let err = StepExecutor::new(&registry, &config, &host, &enabled)
        .execute(&mut ledger, &mut RunLog::disabled())
        .unwrap_err();

    assert!(matches!(
        err,
        ProvisionError::MissingConfiguration { ref feature, ref key }
            if feature == "second" && key == "headscale.domain"
    ));
    assert_eq!(*journal.lock().unwrap(), vec!["install:first"]);
    assert_eq!(ledger.status("first"), Some(StepStatus::Completed));
    assert_eq!(ledger.status("second"), Some(StepStatus::Failed));
    assert_eq!(ledger.status("third"), Some(StepStatus::Pending));
    // The action never ran, so the failure skipped `running`
    let moves: Vec<StepStatus> = ledger.history_of("second").map(|e| e.status).collect();
    assert_eq!(moves, vec![StepStatus::Pending, StepStatus::Failed]);
    assert_eq!(
        ledger.latest("second").unwrap().detail.as_deref(),
        Some("missing configuration key 'headscale.domain'")
    );
}

#[test]
fn test_ledger_keeps_every_move_of_a_rolled_back_feature() {
    let dir = TempDir::new().unwrap();
    let journal = journal();
    let registry = chain(2, Some(1), &journal);
    let config = common::config(&registry, &[]);
    let host = common::host(dir.path(), FakeRunner::new());

    let report = Orchestrator::new(&registry, &host).run(&config).unwrap();

    let moves: Vec<StepStatus> = report.ledger.history_of("f0").map(|e| e.status).collect();
    assert_eq!(
        moves,
        vec![
            StepStatus::Pending,
            StepStatus::Running,
            StepStatus::Completed,
            StepStatus::RolledBack
        ]
    );
    // Rollback entries come after the failure that triggered them
    let history = report.ledger.history();
    let failed = history
        .iter()
        .position(|e| e.feature == "f1" && e.status == StepStatus::Failed)
        .unwrap();
    let unwound = history
        .iter()
        .position(|e| e.feature == "f0" && e.status == StepStatus::RolledBack)
        .unwrap();
    assert!(failed < unwound);
}

// =============================================================================
// Built-in features against a fake host
// =============================================================================

#[test]
fn test_cockpit_disabled_keeps_9090_closed() {
    let dir = TempDir::new().unwrap();
    let registry = builtin::registry().unwrap();
    let config = common::config(&registry, &[("features.cockpit.enabled", "false")]);
    let host = common::host(dir.path(), FakeRunner::new());

    let report = Orchestrator::new(&registry, &host).run(&config).unwrap();

    assert!(report.succeeded(), "{:?}", report.failure);
    let firewall = report.firewall.unwrap();
    let expected = BTreeSet::from([
        PortRule::tcp(22),
        PortRule::tcp(8088),
        PortRule::udp(41641),
    ]);
    assert_eq!(firewall.ports, expected);
    let rules = fs::read_to_string(dir.path().join("etc/igel-router/firewall.nft")).unwrap();
    assert!(!rules.contains("9090"));
}

#[test]
fn test_disabling_a_feature_on_rerun_removes_its_port() {
    let dir = TempDir::new().unwrap();
    let registry = builtin::registry().unwrap();
    let rules_path = dir.path().join("etc/igel-router/firewall.nft");

    let first = common::config(&registry, &[]);
    let host = common::host(dir.path(), FakeRunner::new());
    Orchestrator::new(&registry, &host).run(&first).unwrap();
    assert!(fs::read_to_string(&rules_path).unwrap().contains("tcp dport 9090 accept"));

    let second = common::config(&registry, &[("features.cockpit.enabled", "false")]);
    let report = Orchestrator::new(&registry, &host).run(&second).unwrap();
    assert!(report.succeeded());
    assert!(!fs::read_to_string(&rules_path).unwrap().contains("9090"));
}

#[test]
fn test_two_identical_runs_converge() {
    let dir = TempDir::new().unwrap();
    let registry = builtin::registry().unwrap();
    let config = common::config(&registry, &[("network.routes", "192.168.1.0/24")]);
    let runner = FakeRunner::new();
    let host = common::host(dir.path(), Arc::clone(&runner));

    let snapshot = || {
        let mut files = Vec::new();
        for rel in [
            "etc/igel-router/firewall.nft",
            "etc/NetworkManager/conf.d/90-igel-metric-ethernet.conf",
            "etc/NetworkManager/conf.d/90-igel-metric-cellular.conf",
        ] {
            files.push(fs::read_to_string(dir.path().join(rel)).unwrap());
        }
        let wireless = dir
            .path()
            .join("etc/NetworkManager/conf.d/90-igel-metric-wireless.conf");
        assert!(!wireless.exists());
        files
    };

    let first = Orchestrator::new(&registry, &host).run(&config).unwrap();
    let after_first = snapshot();
    let reloads = runner.count("nmcli general reload conf");

    let second = Orchestrator::new(&registry, &host).run(&config).unwrap();
    let after_second = snapshot();

    assert!(first.succeeded() && second.succeeded());
    assert_eq!(after_first, after_second);
    assert_eq!(first.firewall, second.firewall);
    assert_eq!(first.order, second.order);
    // Unchanged drop-ins do not reload the connection manager again
    assert_eq!(runner.count("nmcli general reload conf"), reloads);
    assert!(after_first[1].contains("ipv4.route-metric=100"));
    assert!(after_first[2].contains("ipv4.route-metric=300"));
}

#[test]
fn test_fatal_failure_rolls_back_and_shrinks_firewall() {
    let dir = TempDir::new().unwrap();
    let registry = builtin::registry().unwrap();
    let config = common::config(&registry, &[]);
    let runner = FakeRunner::new();
    // The dashboard's units fail to start
    runner.fail_when("enable --now igel-dashboard.service");
    let host = common::host(dir.path(), Arc::clone(&runner));

    let report = Orchestrator::new(&registry, &host).run(&config).unwrap();

    assert_eq!(report.exit_code(), EXIT_EXECUTION);
    assert_eq!(report.ledger.status("dashboard"), Some(StepStatus::Failed));
    assert_eq!(report.ledger.status("tailscale"), Some(StepStatus::RolledBack));
    assert_eq!(report.ledger.status("networkPriority"), Some(StepStatus::RolledBack));
    assert_eq!(report.ledger.status("hardening"), Some(StepStatus::Pending));
    // Only the baseline survives a full unwind
    assert_eq!(report.firewall.unwrap().ports, BTreeSet::from([PortRule::tcp(22)]));
    assert!(!dir
        .path()
        .join("etc/NetworkManager/conf.d/90-igel-metric-ethernet.conf")
        .exists());

    let log = fs::read_to_string(dir.path().join("var/log/igel-router/install.log")).unwrap();
    assert!(log.contains("dashboard failed"));
    assert!(log.contains("tailscale rolled_back"));
    assert!(log.lines().last().unwrap().ends_with("run-end rolled_back"));
}

// =============================================================================
// Firewall union property
// =============================================================================

const OPTIONAL: [&str; 11] = [
    "networkPriority",
    "tailscale",
    "docker",
    "headscale",
    "headplane",
    "portainer",
    "cockpit",
    "dashboard",
    "wifiUplink",
    "wifiAp",
    "hardening",
];

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// The applied allow-list is exactly the baseline plus the ports of the
    /// features that ended completed.
    #[test]
    fn firewall_is_union_of_completed_ports(mask in 0u16..(1 << 11), fail_hardening in any::<bool>()) {
        let dir = TempDir::new().unwrap();
        let registry = builtin::registry().unwrap();
        let mut flags: Vec<(String, String)> = OPTIONAL
            .iter()
            .enumerate()
            .map(|(i, id)| (format!("features.{}.enabled", id), (mask & (1 << i) != 0).to_string()))
            .collect();
        if mask & (1 << 8) != 0 && mask & (1 << 9) != 0 {
            flags.push(("features.wifiUplink.enabled".into(), "false".into()));
        }
        for (k, v) in [
            ("headscale.domain", "vpn.example.net"),
            ("wifi.apSsid", "igel"),
            ("wifi.apPassword", "correct-horse"),
            ("wifi.uplinkSsid", "cafe"),
            ("dashboard.port", "8099"),
        ] {
            flags.push((k.into(), v.into()));
        }
        let flag_refs: Vec<(&str, &str)> = flags.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        let config = common::config(&registry, &flag_refs);

        let runner = FakeRunner::new();
        if fail_hardening {
            runner.fail_when("fail2ban");
        }
        let host = common::host(dir.path(), runner);
        let report = Orchestrator::new(&registry, &host).run(&config).unwrap();
        prop_assert!(report.succeeded(), "{:?}", report.failure);

        let mut expected = BTreeSet::from([PortRule::tcp(22)]);
        for id in report.ledger.completed() {
            expected.extend(registry.get(id).unwrap().resolved_ports(&config));
        }
        let applied = report.firewall.unwrap();
        prop_assert_eq!(&applied.ports, &expected);
        prop_assert!(!applied.allows(PortRule::tcp(8088)));

        let rules = fs::read_to_string(dir.path().join("etc/igel-router/firewall.nft")).unwrap();
        for rule in &expected {
            let needle = format!("{} dport {} accept", rule.protocol, rule.port);
            prop_assert!(rules.contains(&needle), "missing {}", needle);
        }
    }
}

// =============================================================================
// Dry run and the Wi-Fi gateway
// =============================================================================

#[test]
fn test_dry_run_leaves_root_untouched() {
    let dir = TempDir::new().unwrap();
    let registry = builtin::registry().unwrap();
    let config = common::config(
        &registry,
        &[
            ("features.headscale.enabled", "true"),
            ("features.headplane.enabled", "true"),
            ("features.wifiAp.enabled", "true"),
            ("headscale.domain", "vpn.example.net"),
            ("wifi.apSsid", "igel"),
            ("wifi.apPassword", "correct-horse"),
            ("network.routes", "192.168.1.0/24"),
        ],
    );
    let runner = FakeRunner::new();
    let host = common::host(dir.path(), Arc::clone(&runner)).dry_run(true);

    let report = Orchestrator::new(&registry, &host).run(&config).unwrap();

    assert!(report.succeeded(), "{:?}", report.failure);
    assert!(report.dry_run);
    // No rule set, drop-in, cache directory or run log
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    // Both nft invocations, syntax check included, sit behind the dry-run gate
    let calls = runner.calls.lock().unwrap();
    let nft: Vec<_> = calls.iter().filter(|l| l.program == "nft").collect();
    assert_eq!(nft.len(), 2);
    assert!(nft.iter().all(|l| l.mutating));
}

/// Appliance whose only uplink is the Wi-Fi radio.
fn radio_uplink_host(root: &std::path::Path, runner: Arc<FakeRunner>) -> Host {
    let links = FakeLinks {
        links: vec![
            LinkInfo::new("lo", OperState::Up, Some(Ipv4Addr::LOCALHOST)),
            LinkInfo::new("eth0", OperState::Up, Some(Ipv4Addr::new(10, 42, 0, 1))),
            LinkInfo::new("wlan0", OperState::Up, Some(Ipv4Addr::new(192, 168, 8, 23))),
        ],
        default: Some("wlan0".to_string()),
    };
    Host::new(
        runner,
        root,
        Arc::new(links),
        Arc::new(FakeProber::reaching(&[None])),
    )
}

#[test]
fn test_access_point_on_the_wan_radio_is_refused() {
    let dir = TempDir::new().unwrap();
    let registry = builtin::registry().unwrap();
    let config = common::config(
        &registry,
        &[
            ("features.wifiAp.enabled", "true"),
            ("wifi.apSsid", "igel"),
            ("wifi.apPassword", "correct-horse"),
        ],
    );
    let runner = FakeRunner::new();
    let host = radio_uplink_host(dir.path(), Arc::clone(&runner));

    let err = Orchestrator::new(&registry, &host).run(&config).unwrap_err();

    match &err {
        ProvisionError::HostMismatch { feature, reason } => {
            assert_eq!(feature, "wifiAp");
            assert!(reason.contains("wlan0 carries the WAN"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(err.exit_code(), EXIT_VALIDATION);
    assert!(runner.rendered().is_empty());
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);

    // A different radio is fine
    let config = common::config(
        &registry,
        &[
            ("features.wifiAp.enabled", "true"),
            ("wifi.apSsid", "igel"),
            ("wifi.apPassword", "correct-horse"),
            ("wifi.interface", "wlan1"),
        ],
    );
    let report = Orchestrator::new(&registry, &host).run(&config).unwrap();
    assert!(report.succeeded(), "{:?}", report.failure);
    assert_eq!(report.ledger.status("wifiAp"), Some(StepStatus::Completed));
}

#[test]
fn test_wifi_uplink_gateway_masquerades_out_of_the_radio() {
    let dir = TempDir::new().unwrap();
    let registry = builtin::registry().unwrap();
    let config = common::config(
        &registry,
        &[
            ("features.wifiUplink.enabled", "true"),
            ("wifi.uplinkSsid", "cafe"),
        ],
    );
    let runner = FakeRunner::new();
    let host = radio_uplink_host(dir.path(), Arc::clone(&runner));

    let report = Orchestrator::new(&registry, &host).run(&config).unwrap();

    assert!(report.succeeded(), "{:?}", report.failure);
    let firewall = report.firewall.unwrap();
    assert_eq!(firewall.masquerade, BTreeSet::from(["wlan0".to_string()]));
    let rules = fs::read_to_string(dir.path().join("etc/igel-router/firewall.nft")).unwrap();
    assert!(rules.contains("type nat hook postrouting priority srcnat"));
    assert!(rules.contains("oifname \"wlan0\" masquerade"));
    let sysctl = fs::read_to_string(dir.path().join("etc/sysctl.d/90-igel-gateway.conf")).unwrap();
    assert!(sysctl.contains("net.ipv4.ip_forward = 1"));

    // Without the uplink feature nothing is NATed
    let config = common::config(&registry, &[]);
    let report = Orchestrator::new(&registry, &host).run(&config).unwrap();
    assert!(report.firewall.unwrap().masquerade.is_empty());
    let rules = fs::read_to_string(dir.path().join("etc/igel-router/firewall.nft")).unwrap();
    assert!(!rules.contains("masquerade"));
}
