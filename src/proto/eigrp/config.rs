//! Router process and interface settings, with the range checks applied
//! when they are loaded.

use std::net::Ipv4Addr;

use thiserror::Error;

use super::addr::RouterId;
use super::message::StubFlags;
use super::metric::KValues;

pub const DEFAULT_HELLO_INTERVAL: u16 = 5;
pub const DEFAULT_HOLD_INTERVAL: u16 = 15;
pub const DEFAULT_BANDWIDTH_KBPS: u32 = 100_000;
pub const DEFAULT_DELAY: u32 = 10;
pub const DEFAULT_MTU: u32 = 1500;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("router {router}: bad value for EIGRP autonomous system number {value} (<1, 65535>)")]
    AsNumber { router: String, value: u64 },
    #[error("router {router}: K-values must have exactly 6 items, got {count}")]
    KValueCount { router: String, count: usize },
    #[error("router {router}: bad value for K{index} {value} (<0, 255>)")]
    KValue {
        router: String,
        index: usize,
        value: u64,
    },
    #[error("router {router}: bad value for maximum-paths {value} (<1, 255>)")]
    MaximumPath { router: String, value: u64 },
    #[error("router {router}: bad value for variance {value} (<1, 128>)")]
    Variance { router: String, value: u64 },
    #[error("router {router}: interface {iface}: bad value for {field} {value} (<{min}, {max}>)")]
    InterfaceValue {
        router: String,
        iface: String,
        field: &'static str,
        value: u64,
        min: u64,
        max: u64,
    },
    #[error("router {router}: unknown interface {iface}")]
    UnknownInterface { router: String, iface: String },
    #[error("unknown router {0}")]
    UnknownRouter(String),
    #[error("unknown link {0}")]
    UnknownLink(String),
    #[error("duplicate router name {0}")]
    DuplicateRouter(String),
    #[error("duplicate link name {0}")]
    DuplicateLink(String),
    #[error("router {router}: duplicate interface name {iface}")]
    DuplicateInterface { router: String, iface: String },
    #[error("router {router}: malformed address or prefix {value:?}")]
    BadAddress { router: String, value: String },
    #[error("router {router}: {value:?} is not an {family} address")]
    FamilyMismatch {
        router: String,
        value: String,
        family: &'static str,
    },
    #[error("router {router}: IPv6 EIGRP process requires an explicit router-id")]
    MissingRouterId { router: String },
    #[error("router {router}: unknown stub flag {flag:?}")]
    UnknownStubFlag { router: String, flag: String },
    #[error("router {router}: stub receive-only cannot be combined with other stub flags")]
    StubConflict { router: String },
    #[error("scenario has no routers")]
    NoRouters,
}

/// Per-router EIGRP process settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessConfig {
    pub as_number: u16,
    pub router_id: RouterId,
    pub k_values: KValues,
    pub maximum_path: usize,
    pub variance: u32,
    /// Administrative distance of internal EIGRP routes.
    pub admin_distance: u8,
    /// `Some` when this router is an EIGRP stub.
    pub stub: Option<StubFlags>,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            as_number: 1,
            router_id: Ipv4Addr::UNSPECIFIED,
            k_values: KValues::default(),
            maximum_path: 4,
            variance: 1,
            admin_distance: 90,
            stub: None,
        }
    }
}

/// Per-interface settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceConfig {
    pub name: String,
    pub hello_interval: u16,
    pub hold_interval: u16,
    pub split_horizon: bool,
    pub passive: bool,
    pub bandwidth: u32,
    pub delay: u32,
    pub reliability: u8,
    pub load: u8,
}

impl InterfaceConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

impl Default for InterfaceConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            hello_interval: DEFAULT_HELLO_INTERVAL,
            hold_interval: DEFAULT_HOLD_INTERVAL,
            split_horizon: true,
            passive: false,
            bandwidth: DEFAULT_BANDWIDTH_KBPS,
            delay: DEFAULT_DELAY,
            reliability: 255,
            load: 1,
        }
    }
}

pub fn check_as_number(router: &str, value: u64) -> Result<u16, ConfigError> {
    match u16::try_from(value) {
        Ok(v) if v >= 1 => Ok(v),
        _ => Err(ConfigError::AsNumber {
            router: router.to_string(),
            value,
        }),
    }
}

pub fn check_k_values(router: &str, values: &[u64]) -> Result<KValues, ConfigError> {
    if values.len() != 6 {
        return Err(ConfigError::KValueCount {
            router: router.to_string(),
            count: values.len(),
        });
    }
    let mut k = [0u8; 6];
    for (i, v) in values.iter().enumerate() {
        k[i] = u8::try_from(*v).map_err(|_| ConfigError::KValue {
            router: router.to_string(),
            index: i + 1,
            value: *v,
        })?;
    }
    Ok(KValues::from_array(k))
}

pub fn check_maximum_path(router: &str, value: u64) -> Result<usize, ConfigError> {
    if (1..=255).contains(&value) {
        Ok(value as usize)
    } else {
        Err(ConfigError::MaximumPath {
            router: router.to_string(),
            value,
        })
    }
}

pub fn check_variance(router: &str, value: u64) -> Result<u32, ConfigError> {
    if (1..=128).contains(&value) {
        Ok(value as u32)
    } else {
        Err(ConfigError::Variance {
            router: router.to_string(),
            value,
        })
    }
}

/// Range check for one interface field; returns the value unchanged.
pub fn check_iface_value(
    router: &str,
    iface: &str,
    field: &'static str,
    value: u64,
    min: u64,
    max: u64,
) -> Result<u64, ConfigError> {
    if (min..=max).contains(&value) {
        Ok(value)
    } else {
        Err(ConfigError::InterfaceValue {
            router: router.to_string(),
            iface: iface.to_string(),
            field,
            value,
            min,
            max,
        })
    }
}

/// Parses stub flag names. An empty list means connected + summary.
pub fn parse_stub_flags(router: &str, flags: &[String]) -> Result<StubFlags, ConfigError> {
    if flags.is_empty() {
        return Ok(StubFlags {
            connected: true,
            summary: true,
            ..StubFlags::default()
        });
    }
    let mut out = StubFlags::default();
    for flag in flags {
        match flag.as_str() {
            "connected" => out.connected = true,
            "leak_map" | "leak-map" => out.leak_map = true,
            "receive_only" | "receive-only" => out.receive_only = true,
            "redistributed" => out.redistributed = true,
            "static" => out.static_routes = true,
            "summary" => out.summary = true,
            other => {
                return Err(ConfigError::UnknownStubFlag {
                    router: router.to_string(),
                    flag: other.to_string(),
                });
            }
        }
    }
    if out.receive_only && flags.len() > 1 {
        return Err(ConfigError::StubConflict {
            router: router.to_string(),
        });
    }
    Ok(out)
}
