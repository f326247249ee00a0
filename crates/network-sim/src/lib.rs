//! Network namespace fixtures for secure-flow integration tests.
//!
//! Creates isolated client/server hosts as Linux network namespaces joined
//! by veth links, so TLS/DTLS sessions can be exercised end to end.
//!
//! # Modules
//!
//! - [`topology`]: Namespace and veth link management (RAII cleanup on drop)
//! - [`harness`]: Dependency checks, client/server host pairs, listener polling
//! - [`test_util`]: Privilege checks and unique name generation for tests

pub mod harness;
pub mod test_util;
pub mod topology;

pub use harness::{
    HostPair, SkipReason, Transport, check_binary, check_openssl, check_session_deps,
    wait_for_listener,
};
pub use test_util::{check_privileges, unique_ns_name};
pub use topology::Namespace;
