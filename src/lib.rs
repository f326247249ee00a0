//! Secure flow orchestration for namespace-based network testbeds.
//!
//! This library builds UDP/DTLS/TLS flow options for experiment definitions,
//! provisions throwaway keys and certificates, and runs OpenSSL client and
//! server sessions inside Linux network namespaces for a bounded time.

pub mod config;
pub mod credentials;
pub mod error;
pub mod exec;
pub mod experiment;
pub mod flow;
pub mod options;
pub mod protocol;
pub mod runner;
pub mod session;
pub mod topology;

// Test helpers module - available when test-internals feature is enabled
#[cfg(any(test, feature = "test-internals"))]
pub mod test_helpers;

#[cfg(test)]
pub mod tests;

pub use config::SessionConfig;
pub use credentials::{CredentialBundle, Role, ScratchDir, provision};
pub use error::{FlowError, Result};
pub use exec::{BackgroundProcess, CommandSpec, Executor, SessionOutcome, ShellExecutor};
pub use experiment::Experiment;
pub use flow::{Address, Bandwidth, Flow};
pub use options::{FlowOptions, UdpFlowArgs};
pub use protocol::{Protocol, SecureProtocol, Tool};
pub use runner::{OpensslRunner, RunStatus, RunnerBase};
pub use session::SessionManager;
pub use topology::TopologyMap;
