//! Protocol and tool enums, and the TLS/DTLS port binding.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::FlowError;

/// TCP port `openssl s_server` accepts TLS sessions on.
pub const TLS_PORT: u16 = 443;

/// UDP port `openssl s_server` accepts DTLS sessions on.
pub const DTLS_PORT: u16 = 4433;

/// Transport protocol recorded in a flow's options.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Udp,
    Tls,
    Dtls,
}

impl Protocol {
    pub const fn as_str(self) -> &'static str {
        match self {
            Protocol::Udp => "udp",
            Protocol::Tls => "tls",
            Protocol::Dtls => "dtls",
        }
    }

    /// The session protocol for secure flows, `None` for plain UDP.
    pub const fn secure(self) -> Option<SecureProtocol> {
        match self {
            Protocol::Udp => None,
            Protocol::Tls => Some(SecureProtocol::Tls),
            Protocol::Dtls => Some(SecureProtocol::Dtls),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "udp" => Ok(Protocol::Udp),
            "tls" => Ok(Protocol::Tls),
            "dtls" => Ok(Protocol::Dtls),
            _ => Err(FlowError::InvalidProtocol(s.to_string())),
        }
    }
}

/// Protocol of an openssl client/server session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecureProtocol {
    #[default]
    Tls,
    Dtls,
}

/// Command-line flag and port derived from a [`SecureProtocol`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProtocolBinding {
    /// Extra `s_client`/`s_server` flag; `None` for TLS.
    pub flag: Option<&'static str>,
    pub port: u16,
}

impl SecureProtocol {
    pub const fn binding(self) -> ProtocolBinding {
        match self {
            SecureProtocol::Tls => ProtocolBinding {
                flag: None,
                port: TLS_PORT,
            },
            SecureProtocol::Dtls => ProtocolBinding {
                flag: Some("-dtls"),
                port: DTLS_PORT,
            },
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            SecureProtocol::Tls => "tls",
            SecureProtocol::Dtls => "dtls",
        }
    }

    /// Prefix used when reporting a failed session, e.g. `Running openssl (TLS)`.
    pub fn error_prefix(self) -> String {
        format!("Running openssl ({})", self.as_str().to_ascii_uppercase())
    }
}

impl fmt::Display for SecureProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SecureProtocol {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tls" => Ok(SecureProtocol::Tls),
            "dtls" => Ok(SecureProtocol::Dtls),
            _ => Err(FlowError::InvalidProtocol(s.to_string())),
        }
    }
}

impl From<SecureProtocol> for Protocol {
    fn from(value: SecureProtocol) -> Self {
        match value {
            SecureProtocol::Tls => Protocol::Tls,
            SecureProtocol::Dtls => Protocol::Dtls,
        }
    }
}

impl clap::ValueEnum for SecureProtocol {
    fn value_variants<'a>() -> &'a [Self] {
        &[SecureProtocol::Tls, SecureProtocol::Dtls]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        Some(clap::builder::PossibleValue::new(self.as_str()))
    }
}

/// Traffic generator used for a flow.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    #[default]
    Iperf3,
    Netperf,
    Openssl,
}

impl Tool {
    pub const fn as_str(self) -> &'static str {
        match self {
            Tool::Iperf3 => "iperf3",
            Tool::Netperf => "netperf",
            Tool::Openssl => "openssl",
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tool {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "iperf3" => Ok(Tool::Iperf3),
            "netperf" => Ok(Tool::Netperf),
            "openssl" => Ok(Tool::Openssl),
            _ => Err(FlowError::InvalidTool(s.to_string())),
        }
    }
}

impl clap::ValueEnum for Tool {
    fn value_variants<'a>() -> &'a [Self] {
        &[Tool::Iperf3, Tool::Netperf, Tool::Openssl]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        Some(clap::builder::PossibleValue::new(self.as_str()))
    }
}
