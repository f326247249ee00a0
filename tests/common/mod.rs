//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use network_sim::{HostPair, check_openssl, check_session_deps};
use secure_flow::{SessionConfig, SessionManager, ShellExecutor, TopologyMap};

/// Returns `true` (and prints why) when namespace sessions cannot run here.
/// Use at the top of every namespace test.
pub fn skip_without_deps() -> bool {
    match check_session_deps() {
        Ok(()) => false,
        Err(reason) => {
            eprintln!("Skipping: {reason}");
            true
        }
    }
}

/// Like `skip_without_deps` but only needs the openssl binary.
pub fn skip_without_openssl() -> bool {
    match check_openssl() {
        Ok(()) => false,
        Err(reason) => {
            eprintln!("Skipping: {reason}");
            true
        }
    }
}

/// A config writing credentials into the pair's scratch directory, with
/// namespace commands run through sudo.
pub fn pair_config(pair: &HostPair) -> SessionConfig {
    SessionConfig {
        scratch_dir: pair.scratch_dir().to_path_buf(),
        use_sudo: true,
        termination_grace: Duration::from_millis(500),
        ..SessionConfig::default()
    }
}

pub fn pair_sessions(pair: &HostPair) -> Arc<SessionManager<ShellExecutor>> {
    let config = pair_config(pair);
    let executor = ShellExecutor::from_config(&config);
    Arc::new(SessionManager::new(executor, config).expect("session manager"))
}

/// Topology naming the pair's namespaces `client` and `server`.
pub fn pair_topology(pair: &HostPair) -> Arc<TopologyMap> {
    let mut topology = TopologyMap::new();
    topology.add_node(pair.client.name.clone(), "client");
    topology.add_node(pair.server.name.clone(), "server");
    Arc::new(topology)
}
