//! 链路类型
//!
//! 广播网段：任意多个路由器接口挂在同一链路上，发出的帧到达除发送者外的所有接口。

use serde::Serialize;

use super::id::{IfaceId, NodeId};
use crate::sim::SimTime;

/// 广播链路
#[derive(Debug, Serialize)]
pub struct Link {
    pub name: String,
    /// 挂接的 (路由器, 接口)
    pub attachments: Vec<(NodeId, IfaceId)>,
    pub latency: SimTime,
    pub bandwidth_bps: u64,
    /// 串行化发送占用到此刻
    pub busy_until: SimTime,
    pub up: bool,
}

impl Link {
    /// 创建新链路
    pub fn new(name: impl Into<String>, latency: SimTime, bandwidth_bps: u64) -> Self {
        Self {
            name: name.into(),
            attachments: Vec::new(),
            latency,
            bandwidth_bps,
            busy_until: SimTime::ZERO,
            up: true,
        }
    }

    /// 计算传输指定字节数所需的时间
    pub(crate) fn tx_time(&self, bytes: u32) -> SimTime {
        // ceil(bytes*8 / bps) 秒 -> 纳秒
        if self.bandwidth_bps == 0 {
            return SimTime(u64::MAX / 4);
        }
        let bits = (bytes as u128).saturating_mul(8);
        let nanos = (bits.saturating_mul(1_000_000_000u128) + (self.bandwidth_bps as u128 - 1))
            / self.bandwidth_bps as u128;
        SimTime(nanos.min(u64::MAX as u128) as u64)
    }
}
