//! Error type shared by flow configuration, provisioning and session control.

use std::path::PathBuf;

use thiserror::Error;

use crate::credentials::Role;

pub type Result<T> = std::result::Result<T, FlowError>;

#[derive(Error, Debug)]
pub enum FlowError {
    /// Session protocol was neither `tls` nor `dtls`.
    #[error("invalid protocol '{0}': use tls or dtls")]
    InvalidProtocol(String),

    #[error("invalid tool '{0}': use iperf3, netperf or openssl")]
    InvalidTool(String),

    /// A user-supplied flow option could not be used.
    #[error("invalid option '{key}': {reason}")]
    InvalidOption { key: String, reason: String },

    /// An openssl provisioning step exited non-zero.
    #[error("{role} credential step '{step}' failed with exit status {status:?}")]
    ToolChain {
        role: Role,
        step: &'static str,
        status: Option<i32>,
    },

    #[error("failed to spawn `{command}`")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("scratch directory {path}: {source}")]
    Scratch {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl FlowError {
    /// True for errors raised before any process was spawned.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            FlowError::InvalidProtocol(_)
                | FlowError::InvalidTool(_)
                | FlowError::InvalidOption { .. }
        )
    }
}
