//! Flow value objects: bandwidth, addresses and the flow itself.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::FlowError;
use crate::options::FlowOptions;

/// A bandwidth such as `1mbit` or `512kbit`, kept in the textual form the
/// traffic tools accept.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Bandwidth {
    value: u64,
    unit: BandwidthUnit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BandwidthUnit {
    Bit,
    Kbit,
    Mbit,
    Gbit,
}

impl BandwidthUnit {
    const fn suffix(self) -> &'static str {
        match self {
            BandwidthUnit::Bit => "bit",
            BandwidthUnit::Kbit => "kbit",
            BandwidthUnit::Mbit => "mbit",
            BandwidthUnit::Gbit => "gbit",
        }
    }

    const fn multiplier(self) -> u64 {
        match self {
            BandwidthUnit::Bit => 1,
            BandwidthUnit::Kbit => 1_000,
            BandwidthUnit::Mbit => 1_000_000,
            BandwidthUnit::Gbit => 1_000_000_000,
        }
    }
}

impl Bandwidth {
    pub fn bits_per_sec(&self) -> u64 {
        self.value.saturating_mul(self.unit.multiplier())
    }

    /// Textual form stored in flow options, e.g. `"1mbit"`.
    pub fn string_value(&self) -> String {
        self.to_string()
    }
}

impl Default for Bandwidth {
    fn default() -> Self {
        Self {
            value: 1,
            unit: BandwidthUnit::Mbit,
        }
    }
}

impl fmt::Display for Bandwidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.value, self.unit.suffix())
    }
}

impl FromStr for Bandwidth {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| FlowError::InvalidOption {
            key: "target_bw".into(),
            reason: format!("'{s}': {reason}"),
        };

        let text = s.trim().to_ascii_lowercase();
        let split = text
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(text.len());
        let (digits, suffix) = text.split_at(split);
        let value = digits
            .parse::<u64>()
            .map_err(|_| invalid("expected a number followed by a unit"))?;
        let unit = match suffix {
            "bit" => BandwidthUnit::Bit,
            "kbit" => BandwidthUnit::Kbit,
            "mbit" => BandwidthUnit::Mbit,
            "gbit" => BandwidthUnit::Gbit,
            _ => return Err(invalid("unit must be bit, kbit, mbit or gbit")),
        };
        Ok(Self { value, unit })
    }
}

impl TryFrom<String> for Bandwidth {
    type Error = FlowError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Bandwidth> for String {
    fn from(value: Bandwidth) -> Self {
        value.to_string()
    }
}

/// An interface address, optionally carrying a subnet prefix (`10.0.0.2/24`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address {
    ip: IpAddr,
    prefix: Option<u8>,
}

impl Address {
    pub fn new(ip: IpAddr, prefix: Option<u8>) -> Self {
        Self { ip, prefix }
    }

    pub fn ip(&self) -> IpAddr {
        self.ip
    }

    /// Render the address, with or without its `/prefix` suffix.
    pub fn get_addr(&self, with_subnet: bool) -> String {
        match (with_subnet, self.prefix) {
            (true, Some(prefix)) => format!("{}/{prefix}", self.ip),
            _ => self.ip.to_string(),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.get_addr(true))
    }
}

impl FromStr for Address {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || FlowError::InvalidOption {
            key: "destination_address".into(),
            reason: format!("'{s}' is not an IP address"),
        };

        let (ip, prefix) = match s.trim().split_once('/') {
            Some((ip, prefix)) => (ip, Some(prefix.parse::<u8>().map_err(|_| invalid())?)),
            None => (s.trim(), None),
        };
        let ip = ip.parse::<IpAddr>().map_err(|_| invalid())?;
        let max = if ip.is_ipv4() { 32 } else { 128 };
        if prefix.is_some_and(|p| p > max) {
            return Err(invalid());
        }
        Ok(Self { ip, prefix })
    }
}

impl TryFrom<String> for Address {
    type Error = FlowError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Address> for String {
    fn from(value: Address) -> Self {
        value.to_string()
    }
}

/// A traffic exchange between two namespaces, scheduled in experiment time
/// (seconds from the experiment start).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Flow {
    pub source_ns: String,
    pub destination_ns: String,
    pub destination_address: Address,
    pub start_time: f64,
    pub stop_time: f64,
    #[serde(default = "default_streams")]
    pub streams: u32,
    #[serde(default)]
    pub options: FlowOptions,
}

fn default_streams() -> u32 {
    1
}

impl Flow {
    pub fn new(
        source_ns: impl Into<String>,
        destination_ns: impl Into<String>,
        destination_address: Address,
        start_time: f64,
        stop_time: f64,
    ) -> Self {
        Self {
            source_ns: source_ns.into(),
            destination_ns: destination_ns.into(),
            destination_address,
            start_time,
            stop_time,
            streams: default_streams(),
            options: FlowOptions::default(),
        }
    }

    /// Seconds the flow is active; zero if the stop precedes the start.
    pub fn run_time(&self) -> f64 {
        (self.stop_time - self.start_time).max(0.0)
    }
}

/// Experiment seconds as a [`Duration`]. Negative, NaN or overflowing values
/// become zero.
pub fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or_default()
}
