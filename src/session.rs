//! OpenSSL client and server sessions inside network namespaces.

use std::net::IpAddr;
use std::time::Duration;

use tracing::{debug, info};

use crate::config::SessionConfig;
use crate::credentials::{CredentialBundle, Role, ScratchDir, provision};
use crate::error::Result;
use crate::exec::{CommandSpec, Executor, SessionOutcome, shell_quote};
use crate::protocol::SecureProtocol;

/// Line the client writes to the session once per second.
pub const TEST_MESSAGE: &str = "Test message";

/// Starts `s_server` and runs `s_client` sessions, provisioning fresh
/// credentials for each.
#[derive(Debug)]
pub struct SessionManager<E> {
    executor: E,
    config: SessionConfig,
    scratch: ScratchDir,
}

impl<E: Executor> SessionManager<E> {
    pub fn new(executor: E, config: SessionConfig) -> Result<Self> {
        let scratch = ScratchDir::new(&config.scratch_dir)?;
        Ok(Self {
            executor,
            config,
            scratch,
        })
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Scratch directory used for credentials of `ns_id`.
    pub fn scratch_for(&self, ns_id: &str) -> Result<ScratchDir> {
        if self.config.isolate_credentials {
            self.scratch.scoped(ns_id)
        } else {
            Ok(self.scratch.clone())
        }
    }

    /// Provision server credentials and start `s_server` in `ns_id`.
    ///
    /// The server runs until the returned handle is terminated or dropped.
    pub async fn start_server(&self, ns_id: &str, protocol: &str) -> Result<E::Handle> {
        let protocol: SecureProtocol = protocol.parse()?;
        let scratch = self.scratch_for(ns_id)?;
        let bundle = provision(&self.executor, &self.config.openssl, Role::Server, &scratch).await?;

        let cmd = server_command(&self.config.openssl, ns_id, protocol, &bundle);
        let handle = self.executor.exec_in_background(&cmd)?;
        info!(ns = ns_id, %protocol, port = protocol.binding().port, "openssl server started");
        Ok(handle)
    }

    /// Provision client credentials and run `s_client` from `ns_id` against
    /// `destination_ip` for at most `run_time`.
    ///
    /// Reaching `run_time` is the normal end of a session. A non-zero exit
    /// before then is returned in the outcome, not raised.
    pub async fn run_client(
        &self,
        ns_id: &str,
        destination_ip: &str,
        run_time: Duration,
        protocol: &str,
    ) -> Result<SessionOutcome> {
        let protocol: SecureProtocol = protocol.parse()?;
        let scratch = self.scratch_for(ns_id)?;
        let bundle = provision(&self.executor, &self.config.openssl, Role::Client, &scratch).await?;

        let cmd = client_command(&self.config.openssl, ns_id, destination_ip, protocol, &bundle);
        info!(ns = ns_id, destination = destination_ip, %protocol, ?run_time, "openssl client starting");
        let outcome = self.executor.run_bounded(&cmd, run_time).await?;

        if !outcome.is_success() {
            debug!(
                ns = ns_id,
                status = ?outcome.status,
                "openssl client exited before its deadline"
            );
        }
        Ok(outcome)
    }
}

/// `s_server` bound to the protocol's port, using the server credentials.
pub fn server_command(
    openssl: &str,
    ns_id: &str,
    protocol: SecureProtocol,
    bundle: &CredentialBundle,
) -> CommandSpec {
    let binding = protocol.binding();
    CommandSpec::new(openssl)
        .arg("s_server")
        .args(binding.flag)
        .args([
            "-key".to_string(),
            bundle.key.display().to_string(),
            "-cert".into(),
            bundle.cert.display().to_string(),
            "-accept".into(),
            binding.port.to_string(),
            "-quiet".into(),
        ])
        .in_namespace(ns_id)
}

/// A message loop piped into `s_client`, run through `bash -c`.
pub fn client_command(
    openssl: &str,
    ns_id: &str,
    destination_ip: &str,
    protocol: SecureProtocol,
    bundle: &CredentialBundle,
) -> CommandSpec {
    let binding = protocol.binding();
    let mut client = vec![shell_quote(openssl), "s_client".to_string()];
    client.extend(binding.flag.map(String::from));
    client.extend([
        "-connect".to_string(),
        shell_quote(&connect_target(destination_ip, binding.port)),
        "-cert".into(),
        shell_quote(&bundle.cert.display().to_string()),
        "-key".into(),
        shell_quote(&bundle.key.display().to_string()),
        "-quiet".into(),
    ]);

    let script = format!(
        "while true; do echo \"{TEST_MESSAGE}\"; sleep 1; done | {}",
        client.join(" ")
    );
    CommandSpec::new("bash")
        .args(["-c".to_string(), script])
        .in_namespace(ns_id)
}

fn connect_target(destination_ip: &str, port: u16) -> String {
    match destination_ip.parse::<IpAddr>() {
        Ok(IpAddr::V6(ip)) => format!("[{ip}]:{port}"),
        _ => format!("{destination_ip}:{port}"),
    }
}
