//! Live-process set for tracking and terminating spawned child processes.
//!
//! Every child started by the [`ProcessRunner`](super::ProcessRunner) is
//! registered here between spawn and exit. When the program receives an
//! interrupt or terminate signal, the handler calls
//! [`ProcessSet::terminate_all`] so no build step outlives kiln.
//!
//! # Process Groups
//!
//! On Unix the runner places each child in its own process group, so a
//! termination request reaches the whole tree the step spawned (compilers,
//! package managers and so on), not just the direct child.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Set of live child processes, keyed by PID.
///
/// Owned by the invocation and shared by `Arc` between the process runner
/// and the signal handler.
#[derive(Debug, Default)]
pub struct ProcessSet {
    /// Map of process IDs to the command line that started them.
    pids: Mutex<BTreeMap<u32, String>>,
}

impl ProcessSet {
    /// Creates a new empty process set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<u32, String>> {
        // A panic while holding the lock leaves the map itself intact.
        self.pids.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a process with the given PID and label.
    ///
    /// Call this immediately after spawning a child process.
    pub fn register(&self, pid: u32, label: impl Into<String>) {
        let label = label.into();
        debug!(pid, command = %label, "Registering process");
        self.lock().insert(pid, label);
    }

    /// Unregisters a process after it has completed.
    pub fn unregister(&self, pid: u32) {
        if let Some(label) = self.lock().remove(&pid) {
            debug!(pid, command = %label, "Unregistering process");
        }
    }

    /// Returns the number of currently tracked processes.
    #[must_use]
    pub fn count(&self) -> usize {
        self.lock().len()
    }

    /// Returns the tracked PIDs in ascending order.
    #[must_use]
    pub fn pids(&self) -> Vec<u32> {
        self.lock().keys().copied().collect()
    }

    /// Sends a termination request to every tracked process.
    ///
    /// 1. Sends SIGTERM to every tracked process group
    /// 2. Waits up to `grace` for the processes to go away
    /// 3. Sends SIGKILL to whatever is still alive
    ///
    /// Returns the number of processes that were signalled.
    pub fn terminate_all(&self, grace: Duration) -> usize {
        let mut pids = self.lock();

        if pids.is_empty() {
            return 0;
        }

        let signalled = pids.len();
        info!(count = signalled, "Terminating child processes");

        for (pid, label) in pids.iter() {
            debug!(pid, command = %label, "Sending SIGTERM");
            send_term_signal(*pid);
        }

        let deadline = Instant::now() + grace;
        while !pids.is_empty() && Instant::now() < deadline {
            pids.retain(|pid, label| {
                let alive = is_process_alive(*pid);
                if !alive {
                    debug!(pid = *pid, command = %label, "Process exited");
                }
                alive
            });

            if !pids.is_empty() {
                std::thread::sleep(Duration::from_millis(50));
            }
        }

        for (pid, label) in std::mem::take(&mut *pids) {
            warn!(pid, command = %label, "Force killing process after grace period");
            send_kill_signal(pid);
        }

        signalled
    }
}

/// Sends `signal` to the process group led by `pid`, falling back to the
/// process itself when it does not lead a group.
#[cfg(unix)]
fn signal_group(pid: u32, signal: libc::c_int) {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return;
    };

    // SAFETY: kill(2) has no memory-safety preconditions; a stale or
    // foreign pid only yields ESRCH/EPERM, which we ignore.
    #[expect(unsafe_code, reason = "Required for POSIX signal handling")]
    unsafe {
        if libc::kill(-pid, signal) != 0 {
            libc::kill(pid, signal);
        }
    }
}

#[cfg(unix)]
fn send_term_signal(pid: u32) {
    signal_group(pid, libc::SIGTERM);
}

#[cfg(unix)]
fn send_kill_signal(pid: u32) {
    signal_group(pid, libc::SIGKILL);
}

#[cfg(unix)]
fn is_process_alive(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };

    // SAFETY: signal 0 only checks for existence; no signal is delivered.
    #[expect(unsafe_code, reason = "Required for POSIX process existence check")]
    unsafe {
        libc::kill(pid, 0) == 0
    }
}

#[cfg(not(unix))]
fn send_term_signal(pid: u32) {
    warn!(pid, "Process termination is only supported on Unix");
}

#[cfg(not(unix))]
fn send_kill_signal(pid: u32) {
    warn!(pid, "Process termination is only supported on Unix");
}

#[cfg(not(unix))]
fn is_process_alive(_pid: u32) -> bool {
    false
}
