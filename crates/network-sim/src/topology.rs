use std::process::{Command, Output};

use anyhow::{Context, Result, bail};
use tracing::debug;

/// A Linux network namespace, deleted on drop.
///
/// Commands inside the namespace run via `sudo ip netns exec`.
#[derive(Debug)]
pub struct Namespace {
    pub name: String,
}

impl Namespace {
    pub fn new(name: &str) -> Result<Self> {
        // A leftover namespace from an aborted run would make `add` fail
        let _ = sudo(&["ip", "netns", "del", name]);

        sudo_checked(&["ip", "netns", "add", name])
            .with_context(|| format!("create netns '{name}'"))?;
        debug!(ns = name, "created network namespace");

        let ns = Self {
            name: name.to_string(),
        };
        // s_client/s_server fall back to loopback for some lookups
        ns.exec_checked("ip", &["link", "set", "lo", "up"])
            .context("bring loopback up")?;
        Ok(ns)
    }

    /// Run a command inside this namespace, returning raw output.
    pub fn exec(&self, cmd: &str, args: &[&str]) -> Result<Output> {
        sudo(&self.netns_argv(cmd, args))
            .with_context(|| format!("exec '{cmd}' in ns '{}'", self.name))
    }

    /// Run a command inside this namespace, failing if it exits non-zero.
    pub fn exec_checked(&self, cmd: &str, args: &[&str]) -> Result<Output> {
        sudo_checked(&self.netns_argv(cmd, args))
            .with_context(|| format!("exec '{cmd}' in ns '{}'", self.name))
    }

    fn netns_argv<'a>(&'a self, cmd: &'a str, args: &[&'a str]) -> Vec<&'a str> {
        let mut argv = vec!["ip", "netns", "exec", self.name.as_str(), cmd];
        argv.extend_from_slice(args);
        argv
    }

    /// Connect this namespace to `peer` with a veth pair.
    ///
    /// `local`/`remote` are `(interface, address/prefix)`; interface names
    /// must fit the 15-byte netdev limit.
    pub fn connect(&self, peer: &Namespace, local: (&str, &str), remote: (&str, &str)) -> Result<()> {
        let (local_iface, local_ip) = local;
        let (peer_iface, peer_ip) = remote;

        let _ = sudo(&["ip", "link", "del", local_iface]);
        sudo_checked(&[
            "ip", "link", "add", local_iface, "type", "veth", "peer", "name", peer_iface,
        ])
        .context("create veth pair")?;

        for (ns, iface, ip) in [(self, local_iface, local_ip), (peer, peer_iface, peer_ip)] {
            sudo_checked(&["ip", "link", "set", iface, "netns", &ns.name])
                .with_context(|| format!("move {iface} into {}", ns.name))?;
            ns.exec_checked("ip", &["addr", "add", ip, "dev", iface])
                .with_context(|| format!("assign {ip} to {iface}"))?;
            ns.exec_checked("ip", &["link", "set", iface, "up"])
                .with_context(|| format!("bring {iface} up"))?;
        }

        debug!(
            ns_local = self.name,
            ns_peer = peer.name,
            local_ip,
            peer_ip,
            "veth link configured"
        );
        Ok(())
    }
}

impl Drop for Namespace {
    fn drop(&mut self) {
        debug!(ns = self.name, "deleting network namespace");
        let _ = sudo(&["ip", "netns", "del", &self.name]);
    }
}

/// Run `sudo <args>`, returning raw output.
pub(crate) fn sudo(args: &[&str]) -> Result<Output> {
    Command::new("sudo")
        .args(args)
        .output()
        .with_context(|| format!("sudo {}", args.join(" ")))
}

/// Run `sudo <args>`, bailing with stderr on a non-zero exit.
pub(crate) fn sudo_checked(args: &[&str]) -> Result<Output> {
    let output = sudo(args)?;
    if !output.status.success() {
        bail!(
            "command failed: sudo {}\n{}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(output)
}
