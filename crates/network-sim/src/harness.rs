//! Fixtures for end-to-end secure-flow tests.
//!
//! [`HostPair`] builds two namespaces joined by a veth link, standing in for
//! the client and server hosts of an experiment. [`wait_for_listener`] polls
//! until a server inside a namespace has bound its port.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use tempfile::TempDir;

use crate::test_util::{check_privileges, unique_ns_name};
use crate::topology::Namespace;

// ---------------------------------------------------------------------------
// Dependency checking
// ---------------------------------------------------------------------------

/// Check if a binary exists in PATH.
pub fn check_binary(name: &str) -> Option<PathBuf> {
    Command::new("sh")
        .args(["-c", &format!("command -v {name}")])
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| PathBuf::from(String::from_utf8_lossy(&o.stdout).trim().to_string()))
}

/// Reason an end-to-end test cannot run here.
#[derive(Debug)]
pub enum SkipReason {
    NotRoot,
    MissingTool(String),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::NotRoot => write!(f, "requires root / passwordless sudo"),
            SkipReason::MissingTool(t) => write!(f, "system tool '{t}' not found"),
        }
    }
}

/// Tools needed to provision credentials only.
pub fn check_openssl() -> std::result::Result<(), SkipReason> {
    match check_binary("openssl") {
        Some(_) => Ok(()),
        None => Err(SkipReason::MissingTool("openssl".into())),
    }
}

/// Everything needed to run sessions between namespaces.
pub fn check_session_deps() -> std::result::Result<(), SkipReason> {
    if !check_privileges() {
        return Err(SkipReason::NotRoot);
    }
    for tool in ["ip", "ss", "bash", "openssl", "kill"] {
        if check_binary(tool).is_none() {
            return Err(SkipReason::MissingTool(tool.to_string()));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// HostPair
// ---------------------------------------------------------------------------

static SUBNET_SEQ: AtomicU32 = AtomicU32::new(0);

/// Client and server namespaces on a shared /24, plus a private scratch
/// directory for their credentials.
#[derive(Debug)]
pub struct HostPair {
    pub client: Namespace,
    pub server: Namespace,
    /// Client address with prefix, e.g. `10.150.3.1/24`.
    pub client_addr: String,
    /// Server address with prefix, e.g. `10.150.3.2/24`.
    pub server_addr: String,
    scratch: TempDir,
}

impl HostPair {
    pub fn new(test_name: &str) -> Result<Self> {
        let client = Namespace::new(&unique_ns_name(&format!("{test_name}_c")))?;
        let server = Namespace::new(&unique_ns_name(&format!("{test_name}_s")))?;

        let seq = SUBNET_SEQ.fetch_add(1, Ordering::Relaxed);
        let pid = std::process::id();
        let subnet = format!("10.{}.{}", 150 + pid % 100, seq % 250);
        let client_addr = format!("{subnet}.1/24");
        let server_addr = format!("{subnet}.2/24");

        let tag = format!("{:x}{seq}", pid % 0xffff);
        let mut c_iface = format!("vc{tag}");
        let mut s_iface = format!("vs{tag}");
        c_iface.truncate(15);
        s_iface.truncate(15);

        client.connect(&server, (&c_iface, &client_addr), (&s_iface, &server_addr))?;

        let scratch = tempfile::tempdir().context("create credential scratch dir")?;
        Ok(Self {
            client,
            server,
            client_addr,
            server_addr,
            scratch,
        })
    }

    /// Server address without the prefix.
    pub fn server_ip(&self) -> &str {
        strip_prefix_len(&self.server_addr)
    }

    pub fn client_ip(&self) -> &str {
        strip_prefix_len(&self.client_addr)
    }

    pub fn scratch_dir(&self) -> &Path {
        self.scratch.path()
    }
}

fn strip_prefix_len(addr: &str) -> &str {
    addr.split_once('/').map_or(addr, |(ip, _)| ip)
}

// ---------------------------------------------------------------------------
// Waiting helpers
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transport {
    Tcp,
    Udp,
}

/// Poll `ss` inside `ns` until something listens on `port`.
pub fn wait_for_listener(
    ns: &Namespace,
    port: u16,
    transport: Transport,
    timeout: Duration,
) -> Result<()> {
    let flags = match transport {
        Transport::Tcp => "-tln",
        Transport::Udp => "-uln",
    };
    let port_str = format!(":{port}");
    let start = Instant::now();

    loop {
        let out = ns.exec("ss", &[flags])?;
        let stdout = String::from_utf8_lossy(&out.stdout);
        if stdout.lines().any(|line| line.contains(&port_str)) {
            return Ok(());
        }
        if start.elapsed() > timeout {
            bail!(
                "timeout waiting for {transport:?} listener on port {port} in ns {}\nlast ss \
                 {flags} output:\n{stdout}",
                ns.name
            );
        }
        std::thread::sleep(Duration::from_millis(200));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_prefix_len() {
        assert_eq!(strip_prefix_len("10.150.3.2/24"), "10.150.3.2");
        assert_eq!(strip_prefix_len("10.150.3.2"), "10.150.3.2");
    }

    #[test]
    fn test_check_binary_finds_sh() {
        assert!(check_binary("sh").is_some());
        assert!(check_binary("no-such-binary-7c1e").is_none());
    }
}
