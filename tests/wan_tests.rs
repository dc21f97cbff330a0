//! WAN detection through the host, with the appliance link layout.

mod common;

use common::{FakeLinks, FakeProber, FakeRunner};
use igel_router::host::Host;
use igel_router::network::inventory::LinkInfo;
use igel_router::network::wan::WanDetection;
use igel_router::types::{InterfaceClass, OperState};
use std::net::Ipv4Addr;
use std::sync::Arc;
use tempfile::TempDir;

fn host_with(links: FakeLinks, prober: Arc<FakeProber>) -> (TempDir, Host) {
    let dir = TempDir::new().unwrap();
    let host = Host::new(FakeRunner::new(), dir.path(), Arc::new(links), prober);
    (dir, host)
}

#[test]
fn test_failed_default_route_falls_through_to_second_interface() {
    let prober = Arc::new(FakeProber::reaching(&[Some("enx001122334455")]));
    let (_dir, host) = host_with(FakeLinks::appliance(), Arc::clone(&prober));

    let detection = host.detect_wan();

    assert_eq!(
        detection,
        WanDetection::Verified {
            interface: "enx001122334455".to_string(),
            tier: 2
        }
    );
    let calls = prober.calls.lock().unwrap();
    // Tier 1 went out unbound; the failed default interface is never retried
    assert_eq!(calls.first(), Some(&None));
    assert!(!calls.contains(&Some("eth0".to_string())));
    assert!(!calls.contains(&Some("lo".to_string())));
}

#[test]
fn test_default_route_verified_first() {
    let prober = Arc::new(FakeProber::reaching(&[None, Some("enx001122334455")]));
    let (_dir, host) = host_with(FakeLinks::appliance(), Arc::clone(&prober));

    assert_eq!(
        host.detect_wan(),
        WanDetection::Verified {
            interface: "eth0".to_string(),
            tier: 1
        }
    );
    assert!(prober.calls.lock().unwrap().iter().all(Option::is_none));
}

#[test]
fn test_unreachable_everywhere_reports_unverified_primary() {
    let prober = Arc::new(FakeProber::reaching(&[]));
    let (_dir, host) = host_with(FakeLinks::appliance(), prober);

    let detection = host.detect_wan();

    assert_eq!(
        detection,
        WanDetection::Unverified {
            interface: "eth0".to_string()
        }
    );
    assert_eq!(detection.interface(), Some("eth0"));
}

#[test]
fn test_no_route_and_no_address_is_none_found() {
    let links = FakeLinks {
        links: vec![
            LinkInfo::new("lo", OperState::Up, Some(Ipv4Addr::LOCALHOST)),
            LinkInfo::new("eth0", OperState::Down, None),
        ],
        default: None,
    };
    let prober = Arc::new(FakeProber::reaching(&[Some("lo")]));
    let (_dir, host) = host_with(links, Arc::clone(&prober));

    assert_eq!(host.detect_wan(), WanDetection::NoneFound);
    // Loopback is never a candidate
    assert!(prober.calls.lock().unwrap().is_empty());
}

#[test]
fn test_inventory_classifies_appliance_links() {
    let (_dir, host) = host_with(FakeLinks::appliance(), Arc::new(FakeProber::default()));
    let interfaces = host.inventory().list().unwrap();

    let classes: Vec<(&str, InterfaceClass)> = interfaces
        .iter()
        .map(|i| (i.name.as_str(), i.class))
        .collect();
    assert_eq!(
        classes,
        vec![
            ("enx001122334455", InterfaceClass::Cellular),
            ("eth0", InterfaceClass::Ethernet),
            ("lo", InterfaceClass::Other),
        ]
    );
    assert!(interfaces.iter().all(|i| i.has_ipv4));
}
