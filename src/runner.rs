//! Runners schedule a flow's processes relative to experiment time.
//!
//! [`RunnerBase`] carries the fields every runner shares and the uniform
//! execution wrapper that turns failed sessions into log lines and hands
//! setup errors back to the caller.
//! [`OpensslRunner`] drives one TLS/DTLS client session against a server
//! started separately with [`OpensslRunner::run_openssl_server`].

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, error, info};

use crate::error::Result;
use crate::exec::{Executor, SessionOutcome};
use crate::flow::{Address, Flow, seconds};
use crate::options::KEY_PROTOCOL;
use crate::protocol::SecureProtocol;
use crate::session::SessionManager;
use crate::topology::TopologyMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunStatus {
    Succeeded,
    Failed,
}

#[derive(Clone, Debug)]
pub struct RunnerBase {
    pub ns_id: String,
    /// Seconds after experiment start at which the runner begins.
    pub start_time: f64,
    /// Seconds the runner's traffic lasts.
    pub run_time: f64,
    pub destination_address: Address,
    pub dst_ns: String,
    topology: Arc<TopologyMap>,
}

impl RunnerBase {
    pub fn new(
        topology: Arc<TopologyMap>,
        ns_id: impl Into<String>,
        start_time: f64,
        run_time: f64,
        destination_address: Address,
        dst_ns: impl Into<String>,
    ) -> Self {
        Self {
            ns_id: ns_id.into(),
            start_time,
            run_time,
            destination_address,
            dst_ns: dst_ns.into(),
            topology,
        }
    }

    pub fn topology(&self) -> &TopologyMap {
        &self.topology
    }

    /// Await `invocation` and report its result under `error_prefix`.
    ///
    /// A session that fails is logged against the runner's node and becomes
    /// [`RunStatus::Failed`], so one failing flow does not stop its siblings.
    /// Errors raised before the session ran (bad configuration, a failed
    /// credential step) are logged the same way and returned to the caller.
    pub async fn execute<F>(&self, invocation: F, error_prefix: &str) -> Result<RunStatus>
    where
        F: Future<Output = Result<SessionOutcome>>,
    {
        let node = self.topology.node_name(&self.ns_id);
        match invocation.await {
            Ok(outcome) if outcome.is_success() => {
                debug!(
                    node = %node,
                    deadline_reached = outcome.deadline_reached,
                    "{error_prefix} finished"
                );
                Ok(RunStatus::Succeeded)
            }
            Ok(outcome) => {
                let status = outcome
                    .status
                    .map_or_else(|| "signal".to_string(), |code| code.to_string());
                error!(
                    "{error_prefix} at {node} failed with status {status}. {}",
                    outcome.stderr.trim()
                );
                Ok(RunStatus::Failed)
            }
            Err(err) => {
                error!("{error_prefix} at {node} failed: {err}");
                Err(err)
            }
        }
    }
}

/// Runs an openssl client session for a scheduled flow.
#[derive(Debug)]
pub struct OpensslRunner<E> {
    base: RunnerBase,
    protocol: SecureProtocol,
    sessions: Arc<SessionManager<E>>,
}

impl<E: Executor> OpensslRunner<E> {
    /// A TLS runner; see [`Self::with_protocol`] for DTLS.
    pub fn new(base: RunnerBase, sessions: Arc<SessionManager<E>>) -> Self {
        Self {
            base,
            protocol: SecureProtocol::default(),
            sessions,
        }
    }

    /// Select the session protocol by name (`tls` or `dtls`, any case).
    pub fn with_protocol(mut self, protocol: &str) -> Result<Self> {
        self.protocol = protocol.parse()?;
        Ok(self)
    }

    /// Runner for `flow`, taking the session protocol from its options
    /// (TLS if none is recorded).
    pub fn from_flow(
        flow: &Flow,
        topology: Arc<TopologyMap>,
        sessions: Arc<SessionManager<E>>,
    ) -> Result<Self> {
        let protocol = match flow.options.get(KEY_PROTOCOL) {
            None => SecureProtocol::default(),
            Some(value) => {
                let name = value.as_str().map_or_else(|| value.to_string(), str::to_string);
                name.parse()?
            }
        };
        let base = RunnerBase::new(
            topology,
            flow.source_ns.clone(),
            flow.start_time,
            flow.run_time(),
            flow.destination_address.clone(),
            flow.destination_ns.clone(),
        );
        Ok(Self {
            base,
            protocol,
            sessions,
        })
    }

    pub fn base(&self) -> &RunnerBase {
        &self.base
    }

    pub fn protocol(&self) -> SecureProtocol {
        self.protocol
    }

    /// Start `s_server` in `ns_id`, returning its handle.
    ///
    /// A failed start is logged against the node and yields `None`.
    pub async fn run_openssl_server(&self, ns_id: &str) -> Option<E::Handle> {
        match self
            .sessions
            .start_server(ns_id, self.protocol.as_str())
            .await
        {
            Ok(handle) => Some(handle),
            Err(err) => {
                let node = self.base.topology().node_name(ns_id);
                error!("Error running openssl s_server at {node}. {err}");
                None
            }
        }
    }

    /// Wait for the scheduled start, then run the client for `run_time`.
    ///
    /// A failed session is `Ok(RunStatus::Failed)`; a configuration or
    /// credential error aborts the attempt with `Err`.
    pub async fn run(&self) -> Result<RunStatus> {
        if self.base.start_time > 0.0 {
            tokio::time::sleep(seconds(self.base.start_time)).await;
        }

        let destination = self.base.destination_address.get_addr(false);
        info!(
            ns = %self.base.ns_id,
            destination = %destination,
            protocol = %self.protocol,
            run_time = self.base.run_time,
            "starting openssl flow"
        );

        self.base
            .execute(
                self.sessions.run_client(
                    &self.base.ns_id,
                    &destination,
                    seconds(self.base.run_time),
                    self.protocol.as_str(),
                ),
                &self.protocol.error_prefix(),
            )
            .await
    }
}
