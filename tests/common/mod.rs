//! Shared fakes for integration tests.

#![allow(dead_code)]

use anyhow::{Result, bail};
use igel_router::command_runner::{CommandLine, CommandOutput, CommandRunner};
use igel_router::config::{ConfigBuilder, ConfigStore, ValueSource};
use igel_router::features::{FeatureAction, FeatureRegistry, StepContext};
use igel_router::host::Host;
use igel_router::network::inventory::{LinkInfo, LinkSource};
use igel_router::network::wan::Prober;
use igel_router::types::OperState;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Records every command line; fails those whose rendering contains a
/// configured substring.
#[derive(Default)]
pub struct FakeRunner {
    pub calls: Mutex<Vec<CommandLine>>,
    failing: Mutex<Vec<String>>,
}

impl FakeRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_when(&self, needle: &str) {
        self.failing.lock().unwrap().push(needle.to_string());
    }

    /// Rendered command lines, in call order.
    pub fn rendered(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|l| format!("{} {}", l.program, l.args.join(" ")))
            .collect()
    }

    pub fn count(&self, needle: &str) -> usize {
        self.rendered().iter().filter(|l| l.contains(needle)).count()
    }
}

impl CommandRunner for FakeRunner {
    fn run(&self, line: &CommandLine) -> Result<CommandOutput> {
        self.calls.lock().unwrap().push(line.clone());
        let rendered = format!("{} {}", line.program, line.args.join(" "));
        if self
            .failing
            .lock()
            .unwrap()
            .iter()
            .any(|n| rendered.contains(n.as_str()))
        {
            return Ok(CommandOutput::failed(1, "scripted failure"));
        }
        Ok(CommandOutput::ok(""))
    }
}

/// Fixed link list and default route.
pub struct FakeLinks {
    pub links: Vec<LinkInfo>,
    pub default: Option<String>,
}

impl FakeLinks {
    /// A typical appliance: wired uplink with the default route, a USB modem
    /// and the loopback.
    pub fn appliance() -> Self {
        Self {
            links: vec![
                LinkInfo::new("lo", OperState::Up, Some(Ipv4Addr::LOCALHOST)),
                LinkInfo::new("eth0", OperState::Up, Some(Ipv4Addr::new(192, 168, 1, 20))),
                LinkInfo::new("enx001122334455", OperState::Up, Some(Ipv4Addr::new(10, 0, 0, 2))),
            ],
            default: Some("eth0".to_string()),
        }
    }
}

impl LinkSource for FakeLinks {
    fn links(&self) -> Result<Vec<LinkInfo>> {
        Ok(self.links.clone())
    }

    fn default_route_interface(&self) -> Result<Option<String>> {
        Ok(self.default.clone())
    }
}

/// Succeeds for the listed bindings (`None` = unbound) and records attempts.
#[derive(Default)]
pub struct FakeProber {
    pub reachable: Vec<Option<String>>,
    pub calls: Mutex<Vec<Option<String>>>,
}

impl FakeProber {
    pub fn reaching(bindings: &[Option<&str>]) -> Self {
        Self {
            reachable: bindings.iter().map(|b| b.map(str::to_string)).collect(),
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl Prober for FakeProber {
    fn probe(&self, interface: Option<&str>, _target: SocketAddr, _timeout: Duration) -> bool {
        let binding = interface.map(str::to_string);
        self.calls.lock().unwrap().push(binding.clone());
        self.reachable.contains(&binding)
    }
}

pub fn host(root: &Path, runner: Arc<FakeRunner>) -> Host {
    Host::new(
        runner,
        root,
        Arc::new(FakeLinks::appliance()),
        Arc::new(FakeProber::reaching(&[None])),
    )
}

/// Frozen, non-interactive configuration with the registry's toggles and the
/// given raw flag values.
pub fn config(registry: &FeatureRegistry, flags: &[(&str, &str)]) -> ConfigStore {
    let mut builder = ConfigBuilder::new();
    registry.register_toggles(&mut builder);
    builder
        .set_raw("install.interactive", "false", ValueSource::Flag)
        .unwrap();
    for (key, value) in flags {
        builder.set_raw(key, value, ValueSource::Flag).unwrap();
    }
    builder.freeze().unwrap()
}

/// Shared journal of `install:<id>` / `rollback:<id>` events.
pub type Journal = Arc<Mutex<Vec<String>>>;

/// Records calls to a journal; install fails when `fail` is set.
pub struct Scripted {
    pub journal: Journal,
    pub fail: bool,
    pub fail_rollback: bool,
}

impl Scripted {
    pub fn ok(journal: &Journal) -> Self {
        Self {
            journal: Arc::clone(journal),
            fail: false,
            fail_rollback: false,
        }
    }

    pub fn failing(journal: &Journal) -> Self {
        Self {
            fail: true,
            ..Self::ok(journal)
        }
    }
}

impl FeatureAction for Scripted {
    fn install(&self, ctx: &StepContext) -> Result<()> {
        self.journal
            .lock()
            .unwrap()
            .push(format!("install:{}", ctx.feature));
        if self.fail {
            bail!("{} exploded", ctx.feature);
        }
        Ok(())
    }

    fn rollback(&self, ctx: &StepContext) -> Result<()> {
        self.journal
            .lock()
            .unwrap()
            .push(format!("rollback:{}", ctx.feature));
        if self.fail_rollback {
            bail!("{} refused to leave", ctx.feature);
        }
        Ok(())
    }
}
