//! 统计信息
//!
//! 定义网络仿真统计数据结构。

use std::collections::BTreeMap;

use serde::Serialize;

/// 网络统计信息
#[derive(Debug, Default, Clone, Serialize)]
pub struct Stats {
    pub sent_pkts: u64,
    pub sent_bytes: u64,
    /// 每个接收接口计一次
    pub delivered_pkts: u64,
    /// 链路 down 时被丢弃
    pub dropped_pkts: u64,
    /// 按报文类别（Hello/Ack/Update/...）统计的发送数
    pub sent_by_kind: BTreeMap<String, u64>,
}

impl Stats {
    pub(crate) fn on_sent(&mut self, kind: &str, bytes: u32) {
        self.sent_pkts += 1;
        self.sent_bytes += u64::from(bytes);
        *self.sent_by_kind.entry(kind.to_string()).or_default() += 1;
    }

    pub fn sent_of(&self, kind: &str) -> u64 {
        self.sent_by_kind.get(kind).copied().unwrap_or(0)
    }
}
