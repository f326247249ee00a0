//! Process execution inside network namespaces.
//!
//! [`Executor`] is the seam between session logic and the OS. [`ShellExecutor`]
//! runs commands through `tokio::process`, wrapping namespaced commands in
//! `ip netns exec` (and `sudo` when configured). Every spawned child leads its
//! own process group so deadline and teardown signals reach the whole
//! pipeline, not only the wrapper.

use std::fmt;
use std::future::Future;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::SessionConfig;
use crate::error::{FlowError, Result};

/// A command, optionally bound to a network namespace.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandSpec {
    program: String,
    args: Vec<String>,
    namespace: Option<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            namespace: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn in_namespace(mut self, ns_id: impl Into<String>) -> Self {
        self.namespace = Some(ns_id.into());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Full argument vector as executed.
    ///
    /// `sudo` only wraps namespaced commands; host-side commands (credential
    /// generation) run as the current user.
    pub fn argv(&self, use_sudo: bool) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.args.len() + 5);
        if let Some(ns) = &self.namespace {
            if use_sudo {
                argv.push("sudo".to_string());
            }
            argv.extend(["ip", "netns", "exec", ns.as_str()].map(String::from));
        }
        argv.push(self.program.clone());
        argv.extend(self.args.iter().cloned());
        argv
    }

    /// True if the program or any argument contains `needle`.
    pub fn mentions(&self, needle: &str) -> bool {
        self.program.contains(needle) || self.args.iter().any(|a| a.contains(needle))
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let words: Vec<String> = self.argv(false).iter().map(|w| shell_quote(w)).collect();
        f.write_str(&words.join(" "))
    }
}

/// Quote `word` for a POSIX shell if it needs it.
pub fn shell_quote(word: &str) -> String {
    let plain = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@%+,".contains(c));
    if plain {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

/// Result of a deadline-bounded process run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionOutcome {
    /// Exit code; `None` when the process died from a signal.
    pub status: Option<i32>,
    /// The process was still running at the deadline and was terminated.
    pub deadline_reached: bool,
    pub stdout: String,
    pub stderr: String,
}

impl SessionOutcome {
    /// A session succeeded if it exited cleanly or ran until its deadline.
    pub fn is_success(&self) -> bool {
        self.deadline_reached || self.status == Some(0)
    }
}

/// Process execution primitives used by provisioning and sessions.
pub trait Executor: Send + Sync {
    /// Owner of a background process; dropping it tears the process down.
    type Handle: Send;

    /// Run `cmd` to completion and return its exit code.
    fn exec_exp_commands(&self, cmd: &CommandSpec)
    -> impl Future<Output = Result<Option<i32>>> + Send;

    /// Start `cmd` detached and hand back its owner.
    fn exec_in_background(&self, cmd: &CommandSpec) -> Result<Self::Handle>;

    /// Run `cmd` for at most `bound`, terminating it at the deadline.
    fn run_bounded(
        &self,
        cmd: &CommandSpec,
        bound: Duration,
    ) -> impl Future<Output = Result<SessionOutcome>> + Send;
}

#[derive(Clone, Debug)]
pub struct ShellExecutor {
    use_sudo: bool,
    grace: Duration,
}

impl ShellExecutor {
    pub fn new(use_sudo: bool, grace: Duration) -> Self {
        Self { use_sudo, grace }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(config.use_sudo, config.termination_grace)
    }

    fn command(&self, cmd: &CommandSpec) -> Command {
        let argv = cmd.argv(self.use_sudo);
        let mut command = Command::new(&argv[0]);
        command.args(&argv[1..]).stdin(Stdio::null());
        command
    }

    fn spawn(&self, cmd: &CommandSpec, command: &mut Command) -> Result<Child> {
        command
            .process_group(0)
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| FlowError::Spawn {
                command: cmd.to_string(),
                source,
            })
    }

    /// SIGTERM the group, then SIGKILL if it outlives the grace period.
    async fn terminate(&self, child: &mut Child) -> Result<Option<i32>> {
        let pid = child.id();
        if let Some(pid) = pid {
            signal_group(pid, "TERM", self.use_sudo).await;
        }
        match timeout(self.grace, child.wait()).await {
            Ok(status) => Ok(status?.code()),
            Err(_) => {
                if let Some(pid) = pid {
                    warn!(pid, "process group ignored SIGTERM, killing");
                    signal_group(pid, "KILL", self.use_sudo).await;
                }
                let _ = child.start_kill();
                Ok(child.wait().await?.code())
            }
        }
    }
}

impl Executor for ShellExecutor {
    type Handle = BackgroundProcess;

    async fn exec_exp_commands(&self, cmd: &CommandSpec) -> Result<Option<i32>> {
        let output = self
            .command(cmd)
            .output()
            .await
            .map_err(|source| FlowError::Spawn {
                command: cmd.to_string(),
                source,
            })?;

        if !output.status.success() {
            debug!(
                command = %cmd,
                status = ?output.status.code(),
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "command failed"
            );
        }
        Ok(output.status.code())
    }

    fn exec_in_background(&self, cmd: &CommandSpec) -> Result<BackgroundProcess> {
        let mut command = self.command(cmd);
        command.stdout(Stdio::null()).stderr(Stdio::null());
        let child = self.spawn(cmd, &mut command)?;

        debug!(command = %cmd, pid = child.id(), "spawned background process");
        Ok(BackgroundProcess {
            child,
            label: cmd.to_string(),
            executor: self.clone(),
        })
    }

    async fn run_bounded(&self, cmd: &CommandSpec, bound: Duration) -> Result<SessionOutcome> {
        let mut command = self.command(cmd);
        command.stdout(Stdio::piped()).stderr(Stdio::piped());
        let mut child = self.spawn(cmd, &mut command)?;

        debug!(command = %cmd, pid = child.id(), ?bound, "spawned bounded process");

        let stdout = child.stdout.take().map(|s| tokio::spawn(drain(s)));
        let stderr = child.stderr.take().map(|s| tokio::spawn(drain(s)));

        let (status, deadline_reached) = match timeout(bound, child.wait()).await {
            Ok(status) => (status?.code(), false),
            Err(_) => {
                debug!(command = %cmd, "deadline reached, terminating");
                (self.terminate(&mut child).await?, true)
            }
        };

        Ok(SessionOutcome {
            status,
            deadline_reached,
            stdout: collect(stdout, self.grace).await,
            stderr: collect(stderr, self.grace).await,
        })
    }
}

/// A detached process started by [`ShellExecutor::exec_in_background`].
///
/// Dropping the handle kills the whole process group.
#[derive(Debug)]
pub struct BackgroundProcess {
    child: Child,
    label: String,
    executor: ShellExecutor,
}

impl BackgroundProcess {
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Exit code if the process has already exited.
    pub fn try_status(&mut self) -> Result<Option<Option<i32>>> {
        Ok(self.child.try_wait()?.map(|status| status.code()))
    }

    /// Stop the process group and wait for it.
    pub async fn terminate(mut self) -> Result<Option<i32>> {
        if let Some(status) = self.try_status()? {
            return Ok(status);
        }
        debug!(label = %self.label, "terminating background process");
        let executor = self.executor.clone();
        executor.terminate(&mut self.child).await
    }
}

impl Drop for BackgroundProcess {
    fn drop(&mut self) {
        if !self.is_running() {
            return;
        }
        let _ = self.child.start_kill();
        let Some(pid) = self.child.id() else {
            return;
        };
        let use_sudo = self.executor.use_sudo;
        match Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(signal_group(pid, "KILL", use_sudo));
            }
            // Outside a runtime nothing can await the signal, so send it inline
            Err(_) => {
                let argv = kill_argv(pid, "KILL", use_sudo);
                let _ = std::process::Command::new(&argv[0])
                    .args(&argv[1..])
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .status();
            }
        }
    }
}

fn kill_argv(pid: u32, signal: &str, use_sudo: bool) -> Vec<String> {
    let mut argv = Vec::new();
    if use_sudo {
        argv.push("sudo".to_string());
    }
    argv.extend(["kill".to_string(), format!("-{signal}"), "--".into()]);
    argv.push(format!("-{pid}"));
    argv
}

async fn signal_group(pid: u32, signal: &'static str, use_sudo: bool) {
    let argv = kill_argv(pid, signal, use_sudo);
    let result = Command::new(&argv[0])
        .args(&argv[1..])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
    if let Err(err) = result {
        warn!(pid, signal, "failed to signal process group: {err}");
    }
}

async fn drain<R: AsyncRead + Unpin>(mut reader: R) -> String {
    let mut buf = Vec::new();
    let _ = reader.read_to_end(&mut buf).await;
    String::from_utf8_lossy(&buf).into_owned()
}

async fn collect(task: Option<JoinHandle<String>>, grace: Duration) -> String {
    let Some(mut task) = task else {
        return String::new();
    };
    match timeout(grace, &mut task).await {
        Ok(Ok(text)) => text,
        _ => {
            task.abort();
            String::new()
        }
    }
}
