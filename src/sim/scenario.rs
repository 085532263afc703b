//! 仿真场景描述
//!
//! JSON 场景文档：链路、路由器（EIGRP 进程与接口配置）以及按时间触发的事件。
//! 字段缺省时使用协议默认值，取值范围检查在构建拓扑时进行。

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::proto::eigrp::ConfigError;

fn default_until_ms() -> u64 {
    60_000
}

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("cannot read scenario: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed scenario: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioSpec {
    #[serde(default = "default_until_ms")]
    pub until_ms: u64,
    #[serde(default)]
    pub links: Vec<LinkSpec>,
    pub routers: Vec<RouterSpec>,
    #[serde(default)]
    pub events: Vec<EventSpec>,
}

impl ScenarioSpec {
    pub fn from_json_str(s: &str) -> Result<Self, ScenarioError> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ScenarioError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// 场景是否为 IPv6：由第一个接口地址决定
    pub fn is_ipv6(&self) -> bool {
        self.routers
            .iter()
            .flat_map(|r| r.interfaces.iter())
            .next()
            .is_some_and(|i| i.address.contains(':'))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkSpec {
    pub name: String,
    #[serde(default)]
    pub latency_us: Option<u64>,
    #[serde(default)]
    pub bandwidth_mbps: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterSpec {
    pub name: String,
    #[serde(default)]
    pub router_id: Option<String>,
    #[serde(default)]
    pub as_number: Option<u64>,
    #[serde(default)]
    pub k_values: Option<Vec<u64>>,
    #[serde(default)]
    pub maximum_path: Option<u64>,
    #[serde(default)]
    pub variance: Option<u64>,
    /// 存在即为 stub 路由器；空列表表示 connected + summary
    #[serde(default)]
    pub stub: Option<Vec<String>>,
    /// EIGRP `network` 语句；为空时所有接口都运行 EIGRP
    #[serde(default)]
    pub networks: Vec<String>,
    #[serde(default)]
    pub interfaces: Vec<InterfaceSpec>,
    #[serde(default)]
    pub static_routes: Vec<StaticRouteSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfaceSpec {
    pub name: String,
    pub link: String,
    /// `addr/len`
    pub address: String,
    #[serde(default)]
    pub hello_interval: Option<u64>,
    #[serde(default)]
    pub hold_interval: Option<u64>,
    #[serde(default)]
    pub split_horizon: Option<bool>,
    #[serde(default)]
    pub passive: Option<bool>,
    #[serde(default)]
    pub bandwidth: Option<u64>,
    #[serde(default)]
    pub delay: Option<u64>,
    #[serde(default)]
    pub reliability: Option<u64>,
    #[serde(default)]
    pub load: Option<u64>,
    #[serde(default)]
    pub mtu: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticRouteSpec {
    pub prefix: String,
    pub gateway: String,
    pub interface: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventSpec {
    LinkDown {
        at_ms: u64,
        link: String,
    },
    LinkUp {
        at_ms: u64,
        link: String,
    },
    SetDelay {
        at_ms: u64,
        router: String,
        interface: String,
        delay: u64,
    },
    SetBandwidth {
        at_ms: u64,
        router: String,
        interface: String,
        bandwidth: u64,
    },
    ClearRoute {
        at_ms: u64,
        router: String,
        prefix: String,
    },
}

impl EventSpec {
    pub fn at_ms(&self) -> u64 {
        match self {
            EventSpec::LinkDown { at_ms, .. }
            | EventSpec::LinkUp { at_ms, .. }
            | EventSpec::SetDelay { at_ms, .. }
            | EventSpec::SetBandwidth { at_ms, .. }
            | EventSpec::ClearRoute { at_ms, .. } => *at_ms,
        }
    }
}
