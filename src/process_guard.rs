//! Process lifecycle management for host commands
//!
//! Every mutating command (`apt-get`, `nmcli`, `tailscale up`, ...) is spawned in
//! its own process group and tracked in a global registry. When the
//! orchestrator is interrupted, the running command's whole process tree is
//! terminated.
//!
//! # Cancellation
//! While a provisioning run is armed, SIGINT/SIGTERM/SIGHUP do not exit the
//! process. The signal thread kills the running command and raises the
//! cancellation flag; the step executor then fails the current step and the
//! rollback manager unwinds completed features before the process exits.
//! A second signal, or a signal outside an armed run, exits immediately with
//! `128 + signo`.

use nix::libc;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};

static CHILD_REGISTRY: OnceLock<Arc<Mutex<ChildRegistry>>> = OnceLock::new();

/// Set while a provisioning run can still be unwound
static RUN_ARMED: AtomicBool = AtomicBool::new(false);
/// Set once a termination signal arrived during an armed run
static CANCELLED: AtomicBool = AtomicBool::new(false);
static CANCEL_SIGNAL: AtomicI32 = AtomicI32::new(0);

/// Registry tracking all spawned child processes
#[derive(Debug, Default)]
pub struct ChildRegistry {
    pids: HashSet<u32>,
    /// Final cleanup already ran (prevents double-cleanup on exit paths)
    cleanup_initiated: bool,
}

impl ChildRegistry {
    /// Get or create the global child registry
    pub fn global() -> Arc<Mutex<ChildRegistry>> {
        CHILD_REGISTRY
            .get_or_init(|| Arc::new(Mutex::new(ChildRegistry::default())))
            .clone()
    }

    pub fn register(&mut self, pid: u32) {
        self.pids.insert(pid);
        tracing::debug!("Registered child process PID {}", pid);
    }

    pub fn unregister(&mut self, pid: u32) {
        self.pids.remove(&pid);
        tracing::debug!("Unregistered child process PID {}", pid);
    }

    pub fn count(&self) -> usize {
        self.pids.len()
    }

    /// Final cleanup: terminate everything once, never again.
    pub fn terminate_all(&mut self, grace_period: Duration) {
        if self.cleanup_initiated {
            tracing::debug!("Cleanup already initiated, skipping");
            return;
        }
        self.cleanup_initiated = true;
        self.terminate_running(grace_period);
    }

    /// Terminate the currently tracked children without latching, so rollback
    /// commands can still be spawned afterwards.
    ///
    /// Sends SIGTERM to each process group, waits up to `grace_period`, then SIGKILL.
    pub fn terminate_running(&mut self, grace_period: Duration) {
        if self.pids.is_empty() {
            tracing::debug!("No child processes to terminate");
            return;
        }

        tracing::info!("Terminating {} child process(es)...", self.pids.len());

        let pids_to_kill: Vec<u32> = self.pids.iter().copied().collect();
        for &pid in &pids_to_kill {
            if let Err(e) = send_signal_to_group(pid, Signal::SIGTERM) {
                tracing::warn!("Failed to send SIGTERM to process group {}: {}", pid, e);
                if let Err(e2) = send_signal(pid, Signal::SIGTERM) {
                    tracing::warn!("Failed to send SIGTERM to PID {}: {}", pid, e2);
                }
            }
        }

        let start = Instant::now();
        while start.elapsed() < grace_period {
            if pids_to_kill.iter().all(|&pid| !is_process_alive(pid)) {
                tracing::info!("All child processes terminated gracefully");
                self.pids.clear();
                return;
            }
            std::thread::sleep(Duration::from_millis(100));
        }

        for &pid in &pids_to_kill {
            if is_process_alive(pid) {
                tracing::warn!("Process group {} did not terminate, sending SIGKILL", pid);
                if let Err(e) = send_signal_to_group(pid, Signal::SIGKILL) {
                    tracing::error!("Failed to send SIGKILL to process group {}: {}", pid, e);
                    let _ = send_signal(pid, Signal::SIGKILL);
                }
            }
        }

        self.pids.clear();
    }
}

fn send_signal(pid: u32, signal: Signal) -> Result<(), nix::Error> {
    signal::kill(Pid::from_raw(pid as i32), signal)
}

/// Negative PID signals the whole group, so grandchildren (dpkg under apt-get) stop too.
fn send_signal_to_group(pgid: u32, signal: Signal) -> Result<(), nix::Error> {
    signal::kill(Pid::from_raw(-(pgid as i32)), signal)
}

/// Check if a process is still alive (not dead or zombie)
fn is_process_alive(pid: u32) -> bool {
    if signal::kill(Pid::from_raw(pid as i32), None).is_err() {
        return false;
    }

    // Field 3 of /proc/pid/stat is the state; Z and X are not running
    if let Ok(stat) = std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
        let fields: Vec<&str> = stat.split_whitespace().collect();
        if fields.len() > 2 {
            return !matches!(fields[2], "Z" | "X");
        }
    }

    true
}

/// RAII guard that terminates all children on drop
pub struct ProcessGuard {
    registry: Arc<Mutex<ChildRegistry>>,
}

impl ProcessGuard {
    pub fn new() -> Self {
        Self {
            registry: ChildRegistry::global(),
        }
    }
}

impl Default for ProcessGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ProcessGuard {
    fn drop(&mut self) {
        tracing::debug!("ProcessGuard dropped, initiating cleanup");
        if let Ok(mut registry) = self.registry.lock() {
            registry.terminate_all(Duration::from_secs(5));
        }
    }
}

// ============================================================================
// Cancellation
// ============================================================================

/// Arms cancellation for the lifetime of a provisioning run.
///
/// While the guard lives, termination signals request cancellation instead of
/// exiting. Dropping it disarms.
pub struct RunGuard(());

impl RunGuard {
    pub fn arm() -> Self {
        RUN_ARMED.store(true, Ordering::SeqCst);
        Self(())
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        RUN_ARMED.store(false, Ordering::SeqCst);
    }
}

/// Returns true if a termination signal arrived during the current run.
pub fn cancellation_requested() -> bool {
    CANCELLED.load(Ordering::SeqCst)
}

/// Signal number that triggered cancellation, if any.
pub fn cancel_signal() -> Option<i32> {
    match CANCEL_SIGNAL.load(Ordering::SeqCst) {
        0 => None,
        sig => Some(sig),
    }
}

/// Request cancellation as if a signal had arrived (used by tests and the signal thread).
pub fn request_cancellation(sig: i32) {
    CANCEL_SIGNAL.store(sig, Ordering::SeqCst);
    CANCELLED.store(true, Ordering::SeqCst);
}

/// Clear a previous cancellation request.
pub fn reset_cancellation() {
    CANCELLED.store(false, Ordering::SeqCst);
    CANCEL_SIGNAL.store(0, Ordering::SeqCst);
}

/// Initialize global signal handlers for SIGINT, SIGTERM and SIGHUP.
/// Call this once at program start.
pub fn init_signal_handlers() -> Result<(), std::io::Error> {
    use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;
    use std::thread;

    let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP])?;

    thread::spawn(move || {
        for sig in signals.forever() {
            let signal_name = match sig {
                SIGINT => "SIGINT",
                SIGTERM => "SIGTERM",
                SIGHUP => "SIGHUP",
                _ => "UNKNOWN",
            };

            let armed = RUN_ARMED.load(Ordering::SeqCst);
            if armed && !cancellation_requested() {
                tracing::warn!("Received {}, cancelling run and rolling back...", signal_name);
                request_cancellation(sig);
                if let Ok(mut registry) = ChildRegistry::global().lock() {
                    registry.terminate_running(Duration::from_secs(3));
                }
                continue;
            }

            tracing::info!("Received {} signal, cleaning up...", signal_name);
            if let Ok(mut registry) = ChildRegistry::global().lock() {
                registry.terminate_all(Duration::from_secs(3));
            }
            std::process::exit(128 + sig);
        }
    });

    Ok(())
}

/// Extension trait for std::process::Command to set up process groups
pub trait CommandProcessGroup {
    /// Run the command in its own process group, dying with the parent
    fn in_new_process_group(&mut self) -> &mut Self;
}

impl CommandProcessGroup for std::process::Command {
    fn in_new_process_group(&mut self) -> &mut Self {
        use std::os::unix::process::CommandExt;
        unsafe {
            self.pre_exec(|| {
                nix::unistd::setpgid(Pid::from_raw(0), Pid::from_raw(0))
                    .map_err(std::io::Error::other)?;

                // A half-applied package install must not outlive the orchestrator
                if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM) == -1 {
                    return Err(std::io::Error::last_os_error());
                }

                Ok(())
            });
        }
        self
    }
}
