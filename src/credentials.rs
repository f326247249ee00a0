//! Key and certificate provisioning for TLS/DTLS sessions.
//!
//! Every session invocation generates a fresh RSA key and a self-signed
//! certificate with the `openssl` command-line tool. Artifacts live in a
//! [`ScratchDir`] under fixed per-role file names, so a second provisioning
//! for the same role replaces the first. Prior artifacts are removed before
//! generation starts; a failed run therefore never leaves a usable
//! certificate behind.

use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{FlowError, Result};
use crate::exec::{CommandSpec, Executor};

/// RSA modulus size of generated keys.
pub const KEY_BITS: u32 = 2048;

/// Validity of the server certificate, in days.
pub const CERT_DAYS: u32 = 365;

/// Placeholder subject used for every generated certificate.
pub const CERT_SUBJECT: &str = "/C=IN/ST=./L=./O=./OU=./CN=./emailAddress=.";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    Client,
    Server,
}

impl Role {
    pub const fn as_str(self) -> &'static str {
        match self {
            Role::Client => "client",
            Role::Server => "server",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Directory holding generated key material.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScratchDir {
    root: PathBuf,
}

impl ScratchDir {
    /// Use `root`, creating it if absent.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| FlowError::Scratch {
            path: root.clone(),
            source,
        })?;
        Ok(Self { root })
    }

    /// `<cwd>/temp`.
    pub fn default_location() -> Result<Self> {
        Self::new(std::env::current_dir()?.join("temp"))
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// A subdirectory private to `label` (typically a namespace id).
    pub fn scoped(&self, label: &str) -> Result<Self> {
        let name: String = label
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        let name = if name.is_empty() { "_".to_string() } else { name };
        Self::new(self.root.join(name))
    }

    pub fn key_path(&self, role: Role) -> PathBuf {
        self.root.join(format!("{role}.key"))
    }

    pub fn csr_path(&self, role: Role) -> PathBuf {
        self.root.join(format!("{role}.csr"))
    }

    pub fn cert_path(&self, role: Role) -> PathBuf {
        self.root.join(format!("{role}.crt"))
    }
}

/// Paths of the key material generated for one role.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CredentialBundle {
    pub role: Role,
    pub key: PathBuf,
    /// Only clients go through a signing request.
    pub csr: Option<PathBuf>,
    pub cert: PathBuf,
}

impl CredentialBundle {
    pub fn for_role(role: Role, scratch: &ScratchDir) -> Self {
        Self {
            role,
            key: scratch.key_path(role),
            csr: (role == Role::Client).then(|| scratch.csr_path(role)),
            cert: scratch.cert_path(role),
        }
    }

    fn paths(&self) -> impl Iterator<Item = &PathBuf> {
        [Some(&self.key), self.csr.as_ref(), Some(&self.cert)]
            .into_iter()
            .flatten()
    }

    fn remove_all(&self) -> Result<()> {
        for path in self.paths() {
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }

    /// Best-effort removal after a failed step; files that stay behind are
    /// logged.
    fn discard(&self) {
        for path in self.paths() {
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => warn!(
                    role = %self.role,
                    path = %path.display(),
                    "could not remove partial credential: {err}"
                ),
            }
        }
    }

    /// The openssl invocations that produce this bundle, in order.
    pub fn steps(&self, openssl: &str) -> Vec<(&'static str, CommandSpec)> {
        let path = |p: &Path| p.display().to_string();
        let genrsa = CommandSpec::new(openssl).args([
            "genrsa".to_string(),
            "-out".into(),
            path(&self.key),
            KEY_BITS.to_string(),
        ]);

        match &self.csr {
            Some(csr) => vec![
                ("genrsa", genrsa),
                (
                    "req",
                    CommandSpec::new(openssl).args([
                        "req".to_string(),
                        "-new".into(),
                        "-key".into(),
                        path(&self.key),
                        "-out".into(),
                        path(csr),
                        "-subj".into(),
                        CERT_SUBJECT.into(),
                    ]),
                ),
                (
                    "x509",
                    CommandSpec::new(openssl).args([
                        "x509".to_string(),
                        "-req".into(),
                        "-in".into(),
                        path(csr),
                        "-signkey".into(),
                        path(&self.key),
                        "-out".into(),
                        path(&self.cert),
                    ]),
                ),
            ],
            None => vec![
                ("genrsa", genrsa),
                (
                    "req-x509",
                    CommandSpec::new(openssl).args([
                        "req".to_string(),
                        "-new".into(),
                        "-x509".into(),
                        "-key".into(),
                        path(&self.key),
                        "-out".into(),
                        path(&self.cert),
                        "-days".into(),
                        CERT_DAYS.to_string(),
                        "-subj".into(),
                        CERT_SUBJECT.into(),
                    ]),
                ),
            ],
        }
    }
}

/// Generate a fresh key and certificate for `role` in `scratch`.
///
/// The first failing step aborts the rest and is returned as
/// [`FlowError::ToolChain`]; whatever it left behind is removed.
pub async fn provision<E: Executor>(
    executor: &E,
    openssl: &str,
    role: Role,
    scratch: &ScratchDir,
) -> Result<CredentialBundle> {
    let bundle = CredentialBundle::for_role(role, scratch);
    bundle.remove_all()?;

    for (step, cmd) in bundle.steps(openssl) {
        debug!(%role, step, command = %cmd, "provisioning");
        let failure = match executor.exec_exp_commands(&cmd).await {
            Ok(Some(0)) => continue,
            Ok(status) => FlowError::ToolChain { role, step, status },
            Err(err) => err,
        };
        bundle.discard();
        return Err(failure);
    }

    info!(%role, dir = %scratch.path().display(), "provisioned credentials");
    Ok(bundle)
}
