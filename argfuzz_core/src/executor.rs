use crate::expander::ExpandedCase;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, ScopedJoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StdinMode {
    #[default]
    Null,
    /// Shares the fuzzer's stdin. The target leads its own process group, so
    /// reading from a controlling terminal stops it with `SIGTTIN`; with no
    /// timeout such a case never finishes.
    Inherit,
}

#[derive(Debug, Clone, Default)]
pub struct CommandExecutorConfig {
    /// `None` waits for the target to exit on its own.
    pub timeout: Option<Duration>,
    pub working_dir: Option<PathBuf>,
    pub stdin: StdinMode,
}

/// Why a case produced no regular exit status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionFault {
    Spawn(String),
    Io(String),
}

/// Observed result of running one case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub exit_code: Option<i32>,
    /// Signal that terminated the target, when it was not killed by us.
    pub signal: Option<i32>,
    pub stdout_len: u64,
    pub stderr_len: u64,
    pub timed_out: bool,
    pub fault: Option<ExecutionFault>,
    pub payload_label: String,
}

impl RunOutcome {
    fn faulted(payload_label: String, fault: ExecutionFault) -> Self {
        Self {
            exit_code: None,
            signal: None,
            stdout_len: 0,
            stderr_len: 0,
            timed_out: false,
            fault: Some(fault),
            payload_label,
        }
    }
}

enum WaitResult {
    Exited(ExitStatus),
    TimedOut,
}

/// Kills and reaps the child on every path out of [`CommandExecutor::run`].
struct ChildGuard {
    child: Child,
    reaped: bool,
}

impl ChildGuard {
    fn new(child: Child) -> Self {
        Self {
            child,
            reaped: false,
        }
    }

    // The target leads its own process group, so this also reaches helpers it
    // forked that may still hold the output pipes.
    #[cfg(unix)]
    fn kill_group(&self) {
        if let Ok(pgid) = libc::pid_t::try_from(self.child.id()) {
            // SAFETY: kill(2) has no memory-safety preconditions.
            unsafe {
                libc::kill(-pgid, libc::SIGKILL);
            }
        }
    }

    #[cfg(not(unix))]
    fn kill_group(&self) {}

    fn terminate(&mut self) -> io::Result<ExitStatus> {
        self.kill_group();
        if let Err(e) = self.child.kill() {
            debug!("kill on exited target: {e}");
        }
        let status = self.child.wait()?;
        self.reaped = true;
        Ok(status)
    }

    fn wait(&mut self) -> io::Result<ExitStatus> {
        let status = self.child.wait()?;
        self.reaped = true;
        Ok(status)
    }

    fn try_wait(&mut self) -> io::Result<Option<ExitStatus>> {
        let status = self.child.try_wait()?;
        self.reaped = status.is_some();
        Ok(status)
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if !self.reaped {
            self.kill_group();
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

/// Runs the target once per case, strictly one process at a time.
pub struct CommandExecutor {
    config: CommandExecutorConfig,
}

impl CommandExecutor {
    pub fn new(config: CommandExecutorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CommandExecutorConfig {
        &self.config
    }

    /// Spawns `case.argv[0]` with the remaining arguments, no shell involved,
    /// and measures how much it wrote to stdout and stderr.
    ///
    /// Never fails: spawn and capture errors are folded into the outcome.
    pub fn run(&self, case: ExpandedCase) -> RunOutcome {
        let ExpandedCase {
            argv,
            payload_label,
        } = case;

        let Some((program, args)) = argv.split_first() else {
            return RunOutcome::faulted(
                payload_label,
                ExecutionFault::Spawn("empty argument vector".to_string()),
            );
        };

        let mut cmd = Command::new(c_visible(program));
        cmd.args(args.iter().map(|arg| c_visible(arg)));
        if let Some(cwd) = &self.config.working_dir {
            cmd.current_dir(cwd);
        }
        cmd.stdin(match self.config.stdin {
            StdinMode::Null => Stdio::null(),
            StdinMode::Inherit => Stdio::inherit(),
        });
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                let error_msg = format!("Failed to spawn command '{program}': {e}");
                warn!(payload = %payload_label, "{error_msg}");
                return RunOutcome::faulted(payload_label, ExecutionFault::Spawn(error_msg));
            }
        };
        debug!(pid = child.id(), payload = %payload_label, "spawned target");

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let mut guard = ChildGuard::new(child);

        thread::scope(|scope| {
            let stdout_reader = scope.spawn(move || drain(stdout));
            let stderr_reader = scope.spawn(move || drain(stderr));

            let waited = self.run_and_wait_with_timeout(&mut guard);
            if waited.is_err() {
                let _ = guard.terminate();
            }
            // Stragglers left in the group would keep the pipes open.
            guard.kill_group();

            let stdout_len = join_reader(stdout_reader);
            let stderr_len = join_reader(stderr_reader);
            assemble(payload_label, waited, stdout_len, stderr_len)
        })
    }

    fn run_and_wait_with_timeout(&self, guard: &mut ChildGuard) -> io::Result<WaitResult> {
        let Some(timeout) = self.config.timeout else {
            return guard.wait().map(WaitResult::Exited);
        };

        let start_time = Instant::now();
        loop {
            if let Some(status) = guard.try_wait()? {
                return Ok(WaitResult::Exited(status));
            }
            if start_time.elapsed() >= timeout {
                debug!("Target timed out after {timeout:?}, killing...");
                guard.terminate()?;
                return Ok(WaitResult::TimedOut);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

fn assemble(
    payload_label: String,
    waited: io::Result<WaitResult>,
    stdout_len: io::Result<u64>,
    stderr_len: io::Result<u64>,
) -> RunOutcome {
    let mut outcome = RunOutcome {
        exit_code: None,
        signal: None,
        stdout_len: 0,
        stderr_len: 0,
        timed_out: false,
        fault: None,
        payload_label,
    };

    match waited {
        Ok(WaitResult::Exited(status)) => {
            outcome.exit_code = status.code();
            #[cfg(unix)]
            {
                use std::os::unix::process::ExitStatusExt;
                outcome.signal = status.signal();
            }
        }
        Ok(WaitResult::TimedOut) => outcome.timed_out = true,
        Err(e) => outcome.fault = Some(ExecutionFault::Io(format!("Error waiting for child: {e}"))),
    }

    match stdout_len {
        Ok(len) => outcome.stdout_len = len,
        Err(e) => {
            outcome
                .fault
                .get_or_insert(ExecutionFault::Io(format!("Failed to read stdout: {e}")));
        }
    }
    match stderr_len {
        Ok(len) => outcome.stderr_len = len,
        Err(e) => {
            outcome
                .fault
                .get_or_insert(ExecutionFault::Io(format!("Failed to read stderr: {e}")));
        }
    }

    if let Some(ExecutionFault::Io(msg)) = &outcome.fault {
        warn!(payload = %outcome.payload_label, "{msg}");
    }
    outcome
}

fn drain<R: Read>(pipe: Option<R>) -> io::Result<u64> {
    match pipe {
        Some(mut pipe) => io::copy(&mut pipe, &mut io::sink()),
        None => Ok(0),
    }
}

fn join_reader(handle: ScopedJoinHandle<'_, io::Result<u64>>) -> io::Result<u64> {
    handle
        .join()
        .unwrap_or_else(|_| Err(io::Error::other("output reader panicked")))
}

/// The part of `arg` a target receives through `execve`: text after an
/// embedded NUL never reaches it.
fn c_visible(arg: &str) -> &str {
    match arg.find('\0') {
        Some(end) => &arg[..end],
        None => arg,
    }
}
