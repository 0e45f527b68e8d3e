//! External command execution.

use super::ProcessSet;
use crate::{Error, Result};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Captured result of a command run in capture mode.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Exit status of the process
    pub status: ExitStatus,
    /// Standard output, lossily decoded
    pub stdout: String,
    /// Standard error, lossily decoded
    pub stderr: String,
}

impl CommandOutput {
    /// Whether the process exited successfully
    #[must_use]
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Exit code, `None` when the process was killed by a signal
    #[must_use]
    pub fn exit_code(&self) -> Option<i32> {
        self.status.code()
    }
}

/// Runs external commands and tracks them in a [`ProcessSet`] while they live.
///
/// Command lines are split on whitespace; there is no shell and no quoting.
/// Children get a null stdin.
/// The working directory is set on the child only, the parent's current
/// directory never changes.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    processes: Arc<ProcessSet>,
}

/// Keeps a child registered for as long as the guard lives.
struct Registration<'a> {
    processes: &'a ProcessSet,
    pid: u32,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.processes.unregister(self.pid);
    }
}

impl ProcessRunner {
    /// Create a runner registering children in `processes`
    #[must_use]
    pub fn new(processes: Arc<ProcessSet>) -> Self {
        Self { processes }
    }

    /// The live-process set children are registered in
    #[must_use]
    pub fn processes(&self) -> &Arc<ProcessSet> {
        &self.processes
    }

    /// Run a command with inherited stdio and wait for it to exit.
    pub fn run(&self, command_line: &str, directory: Option<&Path>) -> Result<ExitStatus> {
        let mut child = self.spawn(command_line, directory, false)?;
        let _registration = self.register(&child, command_line);

        let status = child
            .wait()
            .map_err(|e| Error::io(e, None, format!("wait for `{command_line}`")))?;

        log_exit(command_line, status);
        Ok(status)
    }

    /// Run a command capturing stdout and stderr.
    pub fn run_captured(&self, command_line: &str, directory: Option<&Path>) -> Result<CommandOutput> {
        let child = self.spawn(command_line, directory, true)?;
        let _registration = self.register(&child, command_line);

        let output = child
            .wait_with_output()
            .map_err(|e| Error::io(e, None, format!("wait for `{command_line}`")))?;

        log_exit(command_line, output.status);
        Ok(CommandOutput {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn spawn(&self, command_line: &str, directory: Option<&Path>, capture: bool) -> Result<Child> {
        let mut parts = command_line.split_whitespace();
        let Some(program) = parts.next() else {
            return Err(Error::configuration("Cannot run an empty command"));
        };

        let mut cmd = Command::new(program);
        cmd.args(parts);

        if let Some(dir) = directory {
            cmd.current_dir(dir);
        }

        if capture {
            cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        }

        // Children leave the terminal's foreground group below, so a tty
        // read would stop them with SIGTTIN
        cmd.stdin(Stdio::null());

        // Own process group so termination reaches grandchildren too
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        info!(
            command = %command_line,
            directory = ?directory.map(Path::display),
            "Running command"
        );

        cmd.spawn().map_err(|e| Error::process(command_line, e))
    }

    fn register(&self, child: &Child, command_line: &str) -> Registration<'_> {
        let pid = child.id();
        self.processes.register(pid, command_line);
        Registration {
            processes: &self.processes,
            pid,
        }
    }
}

fn log_exit(command_line: &str, status: ExitStatus) {
    if status.success() {
        debug!(command = %command_line, "Command finished");
    } else {
        warn!(command = %command_line, exit = ?status.code(), "Command failed");
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn runner() -> ProcessRunner {
        ProcessRunner::new(Arc::new(ProcessSet::new()))
    }

    #[test]
    fn test_capture_stdout() {
        let runner = runner();
        let output = runner.run_captured("echo hello world", None).unwrap();
        assert!(output.success());
        assert_eq!(output.stdout, "hello world\n");
        assert_eq!(runner.processes().count(), 0);
    }

    #[test]
    fn test_whitespace_tokenization() {
        let output = runner().run_captured("echo   a    b", None).unwrap();
        assert_eq!(output.stdout, "a b\n");
    }

    #[test]
    fn test_nonzero_exit_is_reported_not_raised() {
        let runner = runner();
        let status = runner.run("false", None).unwrap();
        assert!(!status.success());
        assert_eq!(status.code(), Some(1));
        assert_eq!(runner.processes().count(), 0);
    }

    #[test]
    fn test_working_directory_applies_to_child_only() {
        let dir = tempfile::tempdir().unwrap();
        let before = std::env::current_dir().unwrap();

        let output = runner().run_captured("pwd", Some(dir.path())).unwrap();

        assert_eq!(
            std::fs::canonicalize(output.stdout.trim()).unwrap(),
            std::fs::canonicalize(dir.path()).unwrap()
        );
        assert_eq!(std::env::current_dir().unwrap(), before);
    }

    #[test]
    fn test_spawn_failure() {
        let runner = runner();
        let err = runner.run("kiln_nonexistent_command_xyz", None).unwrap_err();
        assert!(matches!(err, Error::Process { .. }));
        assert_eq!(runner.processes().count(), 0);
    }

    #[test]
    fn test_stdin_is_closed() {
        let output = runner().run_captured("cat", None).unwrap();
        assert!(output.success());
        assert_eq!(output.stdout, "");
    }

    #[test]
    fn test_empty_command_rejected() {
        let err = runner().run("   ", None).unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[test]
    fn test_process_registered_while_running() {
        let processes = Arc::new(ProcessSet::new());
        let runner = ProcessRunner::new(Arc::clone(&processes));

        let watcher = {
            let processes = Arc::clone(&processes);
            std::thread::spawn(move || {
                let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
                while std::time::Instant::now() < deadline {
                    if processes.count() == 1 {
                        return true;
                    }
                    std::thread::sleep(std::time::Duration::from_millis(10));
                }
                false
            })
        };

        runner.run("sleep 1", None).unwrap();
        assert!(watcher.join().unwrap());
        assert_eq!(processes.count(), 0);
    }
}
