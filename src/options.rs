//! Flow options: the flat configuration mapping attached to every flow.
//!
//! [`build_udp_options`] assembles the options of a UDP or DTLS flow from the
//! caller's arguments. It coerces the tool for DTLS flows, merges the
//! user-supplied server and client options, and assigns a random port where
//! the traffic tool needs one.

use std::collections::BTreeMap;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{FlowError, Result};
use crate::flow::Bandwidth;
use crate::protocol::{Protocol, Tool};

/// Lowest port handed out by random assignment.
pub const PORT_RANGE_START: u16 = 1024;

/// User-supplied options, keyed by option name.
pub type OptionMap = BTreeMap<String, Value>;

pub const KEY_PROTOCOL: &str = "protocol";
pub const KEY_TOOL: &str = "tool";
pub const KEY_TARGET_BW: &str = "target_bw";
pub const KEY_PORT_NO: &str = "port_no";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlowOptions(OptionMap);

impl FlowOptions {
    fn base(protocol: Protocol, tool: Tool, target_bw: &Bandwidth) -> Self {
        let mut map = OptionMap::new();
        map.insert(KEY_PROTOCOL.into(), Value::from(protocol.as_str()));
        map.insert(KEY_TOOL.into(), Value::from(tool.as_str()));
        map.insert(KEY_TARGET_BW.into(), Value::from(target_bw.string_value()));
        Self(map)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The protocol, if present and one this crate knows. User options are
    /// stored as given, so an unrecognized value reads as `None`.
    pub fn protocol(&self) -> Option<Protocol> {
        self.known(KEY_PROTOCOL)
    }

    /// The tool, read the same lenient way as [`Self::protocol`].
    pub fn tool(&self) -> Option<Tool> {
        self.known(KEY_TOOL)
    }

    pub fn target_bw(&self) -> Option<&str> {
        self.get(KEY_TARGET_BW).and_then(Value::as_str)
    }

    /// The port number, if present and integral. Values are passed through as
    /// supplied; no range check is applied here.
    pub fn port_no(&self) -> Option<u64> {
        self.get(KEY_PORT_NO).and_then(Value::as_u64)
    }

    fn known<T: FromStr>(&self, key: &str) -> Option<T> {
        self.get(key)
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok())
    }
}

impl From<OptionMap> for FlowOptions {
    fn from(value: OptionMap) -> Self {
        Self(value)
    }
}

/// Arguments for adding a UDP (or DTLS) flow to an experiment.
#[derive(Clone, Debug, Default)]
pub struct UdpFlowArgs {
    pub target_bandwidth: Bandwidth,
    pub tool: Tool,
    pub enable_dtls: bool,
    pub server_options: Option<OptionMap>,
    pub client_options: Option<OptionMap>,
}

/// Report of a tool that cannot carry DTLS being replaced by `openssl`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolCoercion {
    /// The tool as it was asked for, which may not be one this crate knows.
    pub requested: String,
}

/// Build the options of a UDP/DTLS flow.
///
/// Server options are applied first and client options overlay them, so a
/// key present in both resolves to the client value. User values are kept
/// as given, except that DTLS flows always end up with `dtls`/`openssl`.
pub fn build_udp_options<R: Rng>(
    args: &UdpFlowArgs,
    rng: &mut R,
) -> (FlowOptions, Option<ToolCoercion>) {
    let mut coercion = None;
    let mut tool = args.tool;
    let protocol = if args.enable_dtls {
        if tool != Tool::Openssl {
            coercion = Some(ToolCoercion {
                requested: tool.as_str().to_string(),
            });
            tool = Tool::Openssl;
        }
        Protocol::Dtls
    } else {
        Protocol::Udp
    };

    let mut options = FlowOptions::base(protocol, tool, &args.target_bandwidth);
    for (key, value) in merge_user_options(&args.server_options, &args.client_options) {
        options.insert(key, value);
    }

    // A DTLS protocol, whether asked for or set through user options, only
    // works with openssl.
    let dtls = args.enable_dtls || options.protocol() == Some(Protocol::Dtls);
    if dtls {
        if options.tool() != Some(Tool::Openssl) {
            let requested = options
                .get(KEY_TOOL)
                .map(|v| v.as_str().map_or_else(|| v.to_string(), str::to_string))
                .unwrap_or_default();
            coercion.get_or_insert(ToolCoercion { requested });
        }
        options.insert(KEY_PROTOCOL, Protocol::Dtls.as_str());
        options.insert(KEY_TOOL, Tool::Openssl.as_str());
    }

    let needs_port = dtls || args.tool == Tool::Iperf3;
    if needs_port && !options.contains_key(KEY_PORT_NO) {
        let port: u16 = rng.random_range(PORT_RANGE_START..=u16::MAX);
        options.insert(KEY_PORT_NO, port);
    }

    (options, coercion)
}

/// Options for a TLS flow. TLS sessions always use the fixed openssl port,
/// so no `port_no` is assigned.
pub fn build_tls_options(target_bandwidth: &Bandwidth) -> FlowOptions {
    FlowOptions::base(Protocol::Tls, Tool::Openssl, target_bandwidth)
}

fn merge_user_options(server: &Option<OptionMap>, client: &Option<OptionMap>) -> OptionMap {
    let mut merged = OptionMap::new();
    for map in [server, client].into_iter().flatten() {
        merged.extend(map.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    merged
}

/// Parse a `key=value` option as given on the command line.
///
/// Integers, floats and booleans are stored typed; everything else is a
/// string.
pub fn parse_option_pair(pair: &str) -> Result<(String, Value)> {
    let (key, raw) = pair.split_once('=').ok_or_else(|| FlowError::InvalidOption {
        key: pair.to_string(),
        reason: "expected key=value".into(),
    })?;
    let key = key.trim();
    if key.is_empty() {
        return Err(FlowError::InvalidOption {
            key: pair.to_string(),
            reason: "empty key".into(),
        });
    }

    let raw = raw.trim();
    let value = if let Ok(n) = raw.parse::<i64>() {
        Value::from(n)
    } else if let Ok(b) = raw.parse::<bool>() {
        Value::from(b)
    } else if let Some(f) = raw.parse::<f64>().ok().filter(|f| f.is_finite()) {
        Value::from(f)
    } else {
        Value::from(raw)
    };
    Ok((key.to_string(), value))
}
