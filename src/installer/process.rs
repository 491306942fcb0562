// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! External process execution.
//!
//! Package managers are slow, talk to the network, and are sometimes
//! interrupted by an impatient user. Thus every command is run with a bounded
//! wait: the child is killed if it outlives the configured timeout, or if the
//! user hits Ctrl-C while waiting on it. A Ctrl-C is latched through
//! [`Interrupt`], so nothing else gets spawned after it.

use crate::installer::command::CommandTemplate;

use std::{process::Stdio, sync::Arc, time::Duration};
use tokio::{io::AsyncReadExt, process::Command, sync::watch, task::JoinHandle};
use tracing::{debug, info, instrument, warn};

/// Completed external process.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code of process.
    pub code: i32,

    /// Captured standard output, if capture was requested.
    pub stdout: Option<String>,

    /// Captured standard error, if capture was requested.
    pub stderr: Option<String>,
}

impl ProcessOutput {
    pub fn success() -> Self {
        Self::default()
    }
}

/// Layer of indirection for running command templates.
#[allow(async_fn_in_trait)]
pub trait Runner {
    /// Run command to completion.
    ///
    /// # Errors
    ///
    /// - Return [`ProcessError`] if command cannot be spawned, exits with
    ///   non-zero status, outlives its timeout, or is interrupted.
    async fn run(&self, command: &CommandTemplate) -> Result<ProcessOutput>;
}

/// Latched Ctrl-C state shared by every command of a run.
///
/// Once triggered, the interrupt stays triggered. Commands waiting on a child
/// kill it, and commands that have not started yet refuse to spawn.
#[derive(Debug, Clone)]
pub struct Interrupt {
    sender: Arc<watch::Sender<bool>>,
}

impl Default for Interrupt {
    fn default() -> Self {
        Self::new()
    }
}

impl Interrupt {
    /// Construct new untriggered interrupt.
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Trigger interrupt on first Ctrl-C for the rest of the process.
    ///
    /// Must be called from inside a tokio runtime. If the signal handler
    /// cannot be installed, the interrupt is simply never triggered.
    pub fn listen_ctrl_c(&self) {
        let interrupt = self.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => interrupt.trigger(),
                Err(error) => warn!("cannot listen for Ctrl-C: {error}"),
            }
        });
    }

    pub fn trigger(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.sender.borrow()
    }

    async fn triggered(&self) {
        let mut receiver = self.sender.subscribe();

        // INVARIANT: Sender lives in self, so waiting can only end by trigger.
        let _ = receiver.wait_for(|triggered| *triggered).await;
    }
}

/// Run commands as child processes through tokio.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    timeout: Option<Duration>,
    capture: bool,
    interrupt: Interrupt,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new(Some(Duration::from_secs(600)), false)
    }
}

impl ProcessRunner {
    /// Construct new runner.
    ///
    /// A timeout of `None` waits forever. Output is inherited from strapon
    /// unless `capture` is set.
    pub fn new(timeout: Option<Duration>, capture: bool) -> Self {
        Self {
            timeout,
            capture,
            interrupt: Interrupt::new(),
        }
    }

    /// Share interrupt with runner.
    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }
}

impl Runner for ProcessRunner {
    #[instrument(skip(self, command), fields(command = %command), level = "debug")]
    async fn run(&self, command: &CommandTemplate) -> Result<ProcessOutput> {
        if self.interrupt.is_triggered() {
            warn!("interrupted, not starting {command}");
            return Err(ProcessError::Interrupted {
                command: command.to_string(),
            });
        }

        info!("run {command}");
        let output: fn() -> Stdio = if self.capture {
            Stdio::piped
        } else {
            Stdio::inherit
        };

        let mut child = Command::new(command.program())
            .args(command.args())
            .stdin(Stdio::inherit())
            .stdout(output())
            .stderr(output())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ProcessError::Spawn {
                command: command.to_string(),
                source,
            })?;

        let stdout = child.stdout.take().map(collect);
        let stderr = child.stderr.take().map(collect);

        let deadline = async {
            match self.timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending().await,
            }
        };

        // INVARIANT: Interrupt wins over a child that died from the same Ctrl-C.
        let status = tokio::select! {
            biased;

            _ = self.interrupt.triggered() => {
                warn!("interrupted, killing {command}");
                let _ = child.kill().await;
                return Err(ProcessError::Interrupted {
                    command: command.to_string(),
                });
            }
            status = child.wait() => status.map_err(|source| ProcessError::Spawn {
                command: command.to_string(),
                source,
            })?,
            _ = deadline => {
                warn!("{command} timed out, killing it");
                let _ = child.kill().await;
                return Err(ProcessError::Timeout {
                    command: command.to_string(),
                    after: self.timeout.unwrap_or_default(),
                });
            }
        };

        let stdout = join_output(stdout).await;
        let stderr = join_output(stderr).await;

        if killed_by_sigint(&status) {
            self.interrupt.trigger();
            return Err(ProcessError::Interrupted {
                command: command.to_string(),
            });
        }

        let Some(code) = status.code() else {
            return Err(ProcessError::Signaled {
                command: command.to_string(),
                description: describe_signal(&status),
            });
        };

        if code != 0 {
            return Err(ProcessError::Failed {
                command: command.to_string(),
                code,
                description: describe_exit_code(code),
                stderr,
            });
        }

        debug!("{command} exited successfully");
        Ok(ProcessOutput {
            code,
            stdout,
            stderr,
        })
    }
}

/// Child died of SIGINT, or exited with the shell code for it.
fn killed_by_sigint(status: &std::process::ExitStatus) -> bool {
    status.code() == Some(EXIT_SIGINT) || signal_number(status) == Some(SIGINT)
}

fn collect<R>(mut reader: R) -> JoinHandle<String>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buffer = Vec::new();
        let _ = reader.read_to_end(&mut buffer).await;
        String::from_utf8_lossy(&buffer).into_owned()
    })
}

async fn join_output(handle: Option<JoinHandle<String>>) -> Option<String> {
    let output = handle?.await.ok()?;

    // INVARIANT: Chomp trailing newlines.
    Some(output.trim_end_matches(['\r', '\n']).to_string())
}

/// Signal number of keyboard interrupt.
const SIGINT: i32 = 2;

/// Shell exit code of a process that died from keyboard interrupt.
pub const EXIT_SIGINT: i32 = 128 + SIGINT;

/// Linux signal names indexed by signal number.
const SIGNALS: [&str; 32] = [
    "", "SIGHUP", "SIGINT", "SIGQUIT", "SIGILL", "SIGTRAP", "SIGABRT", "SIGBUS", "SIGFPE",
    "SIGKILL", "SIGUSR1", "SIGSEGV", "SIGUSR2", "SIGPIPE", "SIGALRM", "SIGTERM", "SIGSTKFLT",
    "SIGCHLD", "SIGCONT", "SIGSTOP", "SIGTSTP", "SIGTTIN", "SIGTTOU", "SIGURG", "SIGXCPU",
    "SIGXFSZ", "SIGVTALRM", "SIGPROF", "SIGWINCH", "SIGIO", "SIGPWR", "SIGSYS",
];

/// Describe meaning of signal number.
pub fn describe_signal_number(signal: i32) -> &'static str {
    match signal {
        1 => "hangup detected on controlling terminal or death of controlling process",
        2 => "process interrupted from keyboard",
        3 => "process quit from keyboard",
        4 => "illegal instruction",
        5 => "trace or breakpoint trap",
        6 => "abort signal dispatched",
        7 => "bus error / bad memory access",
        8 => "floating-point exception",
        9 => "kill signal received",
        10 | 12 => "user reserved signal",
        11 => "segfault / invalid memory reference",
        13 => "broken pipe / write to pipe with no readers",
        14 => "timer signal dispatched",
        15 => "termination signal",
        16 => "stack fault on coprocessor",
        17 => "child stopped or terminated",
        18 => "continue if stopped",
        19 => "stopped process temporarily",
        20 => "stopped process temporarily from terminal",
        21 => "terminal input for background process",
        22 => "terminal output for background process",
        23 => "urgent condition on socket",
        24 => "CPU time limit exceeded",
        25 => "file size limit exceeded",
        26 => "virtual alarm clock",
        27 => "profiling timer expired",
        28 => "window resize signal",
        29 => "IO is now possible",
        30 => "power failure",
        31 => "bad system call",
        _ => "unknown signal",
    }
}

/// Describe meaning of exit code by shell conventions.
///
/// Codes above 128 are treated as death by signal `code - 128`.
pub fn describe_exit_code(code: i32) -> String {
    match code {
        0 => "success".into(),
        1 => "general error".into(),
        2 => "misuse of shell builtin".into(),
        126 => "could not execute, permission problem or not executable".into(),
        127 => "command not found".into(),
        128 => "invalid argument to exit".into(),
        129..=159 => {
            let signal = code - 128;
            format!(
                "{} ({})",
                describe_signal_number(signal),
                SIGNALS[signal as usize]
            )
        }
        255.. => "exit status out of range".into(),
        _ => "unknown error".into(),
    }
}

fn describe_signal(status: &std::process::ExitStatus) -> String {
    match signal_number(status) {
        Some(signal) if (1..32).contains(&signal) => format!(
            "{} ({})",
            describe_signal_number(signal),
            SIGNALS[signal as usize]
        ),
        Some(signal) => format!("signal {signal}"),
        None => "terminated without exit code".into(),
    }
}

#[cfg(unix)]
fn signal_number(status: &std::process::ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;

    status.signal()
}

#[cfg(not(unix))]
fn signal_number(_status: &std::process::ExitStatus) -> Option<i32> {
    None
}

/// External process did not complete successfully.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    /// Process could not be started or waited on.
    #[error("failed to run {command:?}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Process exited with non-zero status.
    #[error("{command:?} failed with code [{code}] ({description})")]
    Failed {
        command: String,
        code: i32,
        description: String,
        stderr: Option<String>,
    },

    /// Process was terminated by a signal.
    #[error("{command:?} terminated: {description}")]
    Signaled {
        command: String,
        description: String,
    },

    /// Process outlived its timeout and was killed.
    #[error("{command:?} timed out after {after:?}")]
    Timeout { command: String, after: Duration },

    /// User interrupted strapon while process was running.
    #[error("{command:?} interrupted")]
    Interrupted { command: String },
}

/// Friendly result alias :3
pub type Result<T, E = ProcessError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use simple_test_case::test_case;

    #[test_case(1, "general error"; "general")]
    #[test_case(127, "command not found"; "not found")]
    #[test_case(130, "process interrupted from keyboard (SIGINT)"; "sigint")]
    #[test_case(137, "kill signal received (SIGKILL)"; "sigkill")]
    #[test_case(300, "exit status out of range"; "out of range")]
    #[test_case(42, "unknown error"; "unknown")]
    #[test]
    fn exit_code_descriptions(code: i32, expect: &str) {
        pretty_assertions::assert_eq!(describe_exit_code(code), expect);
    }

    #[tokio::test]
    async fn run_captures_output() -> anyhow::Result<()> {
        let runner = ProcessRunner::new(Some(Duration::from_secs(10)), true);
        let command = CommandTemplate::new("sh").bake(["-c", "echo hello; echo oops >&2"]);
        let result = runner.run(&command).await?;
        let expect = ProcessOutput {
            code: 0,
            stdout: Some("hello".into()),
            stderr: Some("oops".into()),
        };
        pretty_assertions::assert_eq!(result, expect);

        Ok(())
    }

    #[tokio::test]
    async fn run_reports_exit_code() {
        let runner = ProcessRunner::new(Some(Duration::from_secs(10)), true);
        let command = CommandTemplate::new("sh").bake(["-c", "echo nope >&2; exit 127"]);
        match runner.run(&command).await {
            Err(ProcessError::Failed { code, stderr, .. }) => {
                pretty_assertions::assert_eq!(code, 127);
                pretty_assertions::assert_eq!(stderr.as_deref(), Some("nope"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn run_kills_after_timeout() {
        let runner = ProcessRunner::new(Some(Duration::from_millis(100)), true);
        let command = CommandTemplate::new("sleep").bake(["5"]);
        let result = runner.run(&command).await;
        assert!(matches!(result, Err(ProcessError::Timeout { .. })));
    }

    #[tokio::test]
    async fn run_missing_program() {
        let runner = ProcessRunner::default();
        let command = CommandTemplate::new("strapon-no-such-program");
        let result = runner.run(&command).await;
        assert!(matches!(result, Err(ProcessError::Spawn { .. })));
    }

    async fn assert_sigint_is_interrupt(script: &str) {
        let interrupt = Interrupt::new();
        let runner = ProcessRunner::new(Some(Duration::from_secs(10)), true)
            .with_interrupt(interrupt.clone());
        let command = CommandTemplate::new("sh").bake(["-c", script]);

        let result = runner.run(&command).await;
        assert!(matches!(result, Err(ProcessError::Interrupted { .. })));
        assert!(interrupt.is_triggered());
    }

    #[tokio::test]
    async fn run_child_killed_by_sigint() {
        assert_sigint_is_interrupt("kill -INT $$").await;
    }

    #[tokio::test]
    async fn run_child_exits_with_sigint_code() {
        assert_sigint_is_interrupt("exit 130").await;
    }

    #[tokio::test]
    async fn run_kills_child_on_interrupt() {
        let interrupt = Interrupt::new();
        let runner = ProcessRunner::new(Some(Duration::from_secs(10)), false)
            .with_interrupt(interrupt.clone());
        let command = CommandTemplate::new("sleep").bake(["5"]);

        let trigger = interrupt.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.trigger();
        });

        let started = std::time::Instant::now();
        let result = runner.run(&command).await;
        assert!(matches!(result, Err(ProcessError::Interrupted { .. })));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn run_refuses_to_spawn_after_interrupt() {
        let interrupt = Interrupt::new();
        let runner = ProcessRunner::default().with_interrupt(interrupt.clone());
        let next = runner.clone();

        interrupt.trigger();
        let command = CommandTemplate::new("strapon-no-such-program");
        let result = next.run(&command).await;
        assert!(matches!(result, Err(ProcessError::Interrupted { .. })));
    }

    #[tokio::test]
    async fn untriggered_interrupt_leaves_run_alone() -> anyhow::Result<()> {
        let interrupt = Interrupt::new();
        let runner = ProcessRunner::new(Some(Duration::from_secs(10)), true)
            .with_interrupt(interrupt.clone());
        let output = runner
            .run(&CommandTemplate::new("sh").bake(["-c", "echo ok"]))
            .await?;
        pretty_assertions::assert_eq!(output.stdout.as_deref(), Some("ok"));
        assert!(!interrupt.is_triggered());

        Ok(())
    }
}
