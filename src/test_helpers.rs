#![cfg(any(test, feature = "test-internals"))]
#![allow(dead_code)] // Allow unused helpers - they're used by library tests but not binary tests

use std::path::PathBuf;
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::SessionConfig;
use crate::error::Result;
use crate::exec::{CommandSpec, Executor, SessionOutcome};
use crate::session::SessionManager;
use crate::topology::TopologyMap;

/// Stand-in for a background process started by [`MockExecutor`].
#[derive(Debug)]
pub struct MockHandle {
    pub command: CommandSpec,
}

/// Executor that records every command instead of running it.
///
/// Successful commands with an `-out <path>` argument write a unique marker
/// into `<path>`, imitating openssl producing a file.
#[derive(Debug, Default)]
pub struct MockExecutor {
    calls: Mutex<Vec<CommandSpec>>,
    bounds: Mutex<Vec<Duration>>,
    failure: Mutex<Option<(String, i32)>>,
    stuck_outputs: AtomicBool,
    outcome: Mutex<SessionOutcome>,
    generation: AtomicUsize,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make any run-to-completion command mentioning `needle` exit `status`.
    pub fn fail_when(self, needle: &str, status: i32) -> Self {
        *self.failure.lock().unwrap() = Some((needle.to_string(), status));
        self
    }

    /// A failing command leaves a directory at its `-out` path, which file
    /// cleanup cannot remove.
    pub fn leave_stuck_outputs(self) -> Self {
        self.stuck_outputs.store(true, Ordering::Relaxed);
        self
    }

    /// Outcome returned by every bounded run.
    pub fn with_outcome(self, outcome: SessionOutcome) -> Self {
        *self.outcome.lock().unwrap() = outcome;
        self
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }

    pub fn bounds(&self) -> Vec<Duration> {
        self.bounds.lock().unwrap().clone()
    }

    /// Commands that ran inside a namespace (sessions, not provisioning).
    pub fn namespaced_calls(&self) -> Vec<CommandSpec> {
        self.calls()
            .into_iter()
            .filter(|c| c.namespace().is_some())
            .collect()
    }

    fn record(&self, cmd: &CommandSpec) {
        self.calls.lock().unwrap().push(cmd.clone());
    }

    fn write_outputs(&self, cmd: &CommandSpec) -> std::io::Result<()> {
        let args = cmd.arguments();
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        for pair in args.windows(2) {
            if pair[0] == "-out" {
                std::fs::write(&pair[1], format!("generation {generation}\n"))?;
            }
        }
        Ok(())
    }
}

impl Executor for MockExecutor {
    type Handle = MockHandle;

    async fn exec_exp_commands(&self, cmd: &CommandSpec) -> Result<Option<i32>> {
        self.record(cmd);
        let failure = self.failure.lock().unwrap().clone();
        if let Some((needle, status)) = failure
            && cmd.mentions(&needle)
        {
            if self.stuck_outputs.load(Ordering::Relaxed) {
                for pair in cmd.arguments().windows(2) {
                    if pair[0] == "-out" {
                        std::fs::create_dir_all(&pair[1])?;
                    }
                }
            }
            return Ok(Some(status));
        }
        self.write_outputs(cmd)?;
        Ok(Some(0))
    }

    fn exec_in_background(&self, cmd: &CommandSpec) -> Result<MockHandle> {
        self.record(cmd);
        Ok(MockHandle {
            command: cmd.clone(),
        })
    }

    async fn run_bounded(&self, cmd: &CommandSpec, bound: Duration) -> Result<SessionOutcome> {
        self.record(cmd);
        self.bounds.lock().unwrap().push(bound);
        Ok(self.outcome.lock().unwrap().clone())
    }
}

/// Config pointing at `dir`, with everything else at defaults.
pub fn test_config(dir: impl Into<PathBuf>) -> SessionConfig {
    SessionConfig {
        scratch_dir: dir.into(),
        ..SessionConfig::default()
    }
}

pub fn mock_sessions(
    executor: MockExecutor,
    config: SessionConfig,
) -> Arc<SessionManager<MockExecutor>> {
    Arc::new(SessionManager::new(executor, config).expect("create session manager"))
}

pub fn test_topology() -> Arc<TopologyMap> {
    let mut topo = TopologyMap::new();
    topo.add_node("ns-client", "h1");
    topo.add_node("ns-server", "h2");
    Arc::new(topo)
}

/// Collects formatted log output so tests can assert on warnings.
#[derive(Clone, Debug, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// A subscriber writing into this capture; install it with
    /// `tracing::subscriber::set_default` or `with_default`.
    pub fn subscriber(&self) -> impl tracing::Subscriber + Send + Sync + 'static {
        tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

pub struct CaptureWriter(Arc<Mutex<Vec<u8>>>);

impl Write for CaptureWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LogCapture {
    type Writer = CaptureWriter;

    fn make_writer(&'a self) -> Self::Writer {
        CaptureWriter(Arc::clone(&self.0))
    }
}
