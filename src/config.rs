//! Session configuration.
//!
//! Settings come from defaults, then environment variables, then command-line
//! flags (applied by the binary).

use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

pub const ENV_SCRATCH_DIR: &str = "SECURE_FLOW_SCRATCH_DIR";
pub const ENV_OPENSSL: &str = "SECURE_FLOW_OPENSSL";
pub const ENV_SUDO: &str = "SECURE_FLOW_SUDO";
pub const ENV_ISOLATE_CREDENTIALS: &str = "SECURE_FLOW_ISOLATE_CREDENTIALS";

/// Time a terminated process group gets between SIGTERM and SIGKILL.
pub const DEFAULT_TERMINATION_GRACE: Duration = Duration::from_secs(2);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    /// Directory holding generated keys and certificates.
    pub scratch_dir: PathBuf,
    /// openssl binary, resolved through `PATH` unless absolute.
    pub openssl: String,
    /// Prefix namespace commands and signals with `sudo`.
    pub use_sudo: bool,
    /// Give every namespace its own credential subdirectory instead of
    /// sharing one per role.
    pub isolate_credentials: bool,
    pub termination_grace: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            scratch_dir: cwd.join("temp"),
            openssl: "openssl".to_string(),
            use_sudo: false,
            isolate_credentials: false,
            termination_grace: DEFAULT_TERMINATION_GRACE,
        }
    }
}

impl SessionConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from defaults overlaid with whatever `lookup` returns
    /// for the `SECURE_FLOW_*` variables.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(dir) = lookup(ENV_SCRATCH_DIR).filter(|v| !v.trim().is_empty()) {
            config.scratch_dir = PathBuf::from(dir);
        }
        if let Some(bin) = lookup(ENV_OPENSSL).filter(|v| !v.trim().is_empty()) {
            config.openssl = bin;
        }
        if let Some(flag) = lookup(ENV_SUDO).and_then(|v| parse_flag(ENV_SUDO, &v)) {
            config.use_sudo = flag;
        }
        if let Some(flag) =
            lookup(ENV_ISOLATE_CREDENTIALS).and_then(|v| parse_flag(ENV_ISOLATE_CREDENTIALS, &v))
        {
            config.isolate_credentials = flag;
        }

        config
    }
}

fn parse_flag(key: &str, value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        other => {
            warn!("ignoring {key}='{other}': use on or off");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = SessionConfig::from_lookup(|_| None);
        assert!(config.scratch_dir.ends_with("temp"));
        assert_eq!(config.openssl, "openssl");
        assert!(!config.use_sudo);
        assert!(!config.isolate_credentials);
        assert_eq!(config.termination_grace, Duration::from_secs(2));
    }

    #[test]
    fn test_env_overrides() {
        let config = SessionConfig::from_lookup(lookup_from(&[
            (ENV_SCRATCH_DIR, "/tmp/creds"),
            (ENV_OPENSSL, "/opt/ssl/bin/openssl"),
            (ENV_SUDO, "yes"),
            (ENV_ISOLATE_CREDENTIALS, "1"),
        ]));
        assert_eq!(config.scratch_dir, PathBuf::from("/tmp/creds"));
        assert_eq!(config.openssl, "/opt/ssl/bin/openssl");
        assert!(config.use_sudo);
        assert!(config.isolate_credentials);
    }

    #[test]
    fn test_invalid_flag_keeps_default() {
        let config = SessionConfig::from_lookup(lookup_from(&[(ENV_SUDO, "maybe")]));
        assert!(!config.use_sudo);
    }

    #[test]
    fn test_blank_values_ignored() {
        let config = SessionConfig::from_lookup(lookup_from(&[
            (ENV_SCRATCH_DIR, "  "),
            (ENV_OPENSSL, ""),
        ]));
        assert!(config.scratch_dir.ends_with("temp"));
        assert_eq!(config.openssl, "openssl");
    }
}
