//! 主机路由表（RIB）
//!
//! 每个路由器持有一张路由表：直连路由、静态路由与 EIGRP 安装的路由共存，
//! 以管理距离（AD）区分优先级。查找时做最长前缀匹配，对等价的多条
//! EIGRP 路径按流做确定性的 ECMP 选择。

use serde::Serialize;

use super::id::IfaceId;
use crate::proto::eigrp::AddressFamily;

/// 路由来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteOrigin {
    Connected,
    Static,
    Eigrp,
}

impl RouteOrigin {
    pub fn default_admin_distance(self) -> u8 {
        match self {
            RouteOrigin::Connected => 0,
            RouteOrigin::Static => 1,
            RouteOrigin::Eigrp => 90,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RibEntry<A> {
    pub prefix: A,
    pub prefix_len: u8,
    /// 未指定地址表示直连
    pub gateway: A,
    pub iface: IfaceId,
    pub metric: u64,
    pub admin_distance: u8,
    pub origin: RouteOrigin,
}

/// 删除 EIGRP 路由的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed,
    NotFound,
    /// 该位置被其它来源（AD 更小）的路由占据，未删除
    Foreign,
}

#[derive(Debug, Clone)]
pub struct RoutingTable<A> {
    entries: Vec<RibEntry<A>>,
    /// 用于 ECMP hashing 的盐（保证稳定且可控）
    hash_salt: u64,
}

impl<A: AddressFamily> Default for RoutingTable<A> {
    fn default() -> Self {
        Self::new(0)
    }
}

impl<A: AddressFamily> RoutingTable<A> {
    pub fn new(hash_salt: u64) -> Self {
        Self {
            entries: Vec::new(),
            hash_salt,
        }
    }

    pub fn entries(&self) -> &[RibEntry<A>] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn eigrp_routes(&self) -> impl Iterator<Item = &RibEntry<A>> {
        self.entries.iter().filter(|e| e.origin == RouteOrigin::Eigrp)
    }

    /// 精确匹配 (prefix, len, gateway)
    pub fn find(&self, prefix: A, prefix_len: u8, gateway: A) -> Option<&RibEntry<A>> {
        self.entries
            .iter()
            .find(|e| e.prefix == prefix && e.prefix_len == prefix_len && e.gateway == gateway)
    }

    /// 前缀下是否不存在 AD 更小的路由
    pub fn is_safe_for_add(&self, prefix: A, prefix_len: u8, admin_distance: u8) -> bool {
        !self.entries.iter().any(|e| {
            e.prefix == prefix && e.prefix_len == prefix_len && e.admin_distance < admin_distance
        })
    }

    pub fn add_connected(&mut self, address: A, prefix_len: u8, iface: IfaceId) {
        let prefix = address.network(prefix_len);
        if self.find(prefix, prefix_len, A::UNSPEC).is_some() {
            return;
        }
        self.entries.push(RibEntry {
            prefix,
            prefix_len,
            gateway: A::UNSPEC,
            iface,
            metric: 0,
            admin_distance: RouteOrigin::Connected.default_admin_distance(),
            origin: RouteOrigin::Connected,
        });
    }

    pub fn remove_connected(&mut self, iface: IfaceId) {
        self.entries
            .retain(|e| !(e.origin == RouteOrigin::Connected && e.iface == iface));
    }

    pub fn add_static(&mut self, prefix: A, prefix_len: u8, gateway: A, iface: IfaceId) {
        self.entries.push(RibEntry {
            prefix: prefix.network(prefix_len),
            prefix_len,
            gateway,
            iface,
            metric: 0,
            admin_distance: RouteOrigin::Static.default_admin_distance(),
            origin: RouteOrigin::Static,
        });
    }

    /// 安装或刷新一条 EIGRP 路径，返回路由表是否发生了变化（新增）。
    pub fn install_eigrp(
        &mut self,
        prefix: A,
        prefix_len: u8,
        gateway: A,
        iface: IfaceId,
        metric: u64,
        admin_distance: u8,
    ) -> bool {
        let existing = self
            .entries
            .iter_mut()
            .find(|e| e.prefix == prefix && e.prefix_len == prefix_len && e.gateway == gateway);
        match existing {
            Some(e) if e.origin == RouteOrigin::Eigrp => {
                e.metric = metric;
                e.iface = iface;
                false
            }
            Some(_) => false,
            None => {
                self.entries.push(RibEntry {
                    prefix,
                    prefix_len,
                    gateway,
                    iface,
                    metric,
                    admin_distance,
                    origin: RouteOrigin::Eigrp,
                });
                true
            }
        }
    }

    pub fn remove_eigrp(&mut self, prefix: A, prefix_len: u8, gateway: A) -> RemoveOutcome {
        let Some(idx) = self
            .entries
            .iter()
            .position(|e| e.prefix == prefix && e.prefix_len == prefix_len && e.gateway == gateway)
        else {
            return RemoveOutcome::NotFound;
        };
        if self.entries[idx].origin != RouteOrigin::Eigrp {
            return RemoveOutcome::Foreign;
        }
        self.entries.remove(idx);
        RemoveOutcome::Removed
    }

    /// 外部删除（管理操作），返回被删的条目
    pub fn remove(&mut self, prefix: A, prefix_len: u8) -> Vec<RibEntry<A>> {
        let prefix = prefix.network(prefix_len);
        let mut removed = Vec::new();
        self.entries.retain(|e| {
            if e.prefix == prefix && e.prefix_len == prefix_len {
                removed.push(e.clone());
                false
            } else {
                true
            }
        });
        removed
    }

    /// 最长前缀匹配，返回 AD 最小、度量最小的等价路径集合。
    pub fn lookup(&self, dst: A) -> Vec<&RibEntry<A>> {
        let Some(best_len) = self
            .entries
            .iter()
            .filter(|e| dst.network(e.prefix_len) == e.prefix)
            .map(|e| e.prefix_len)
            .max()
        else {
            return Vec::new();
        };
        let cands: Vec<&RibEntry<A>> = self
            .entries
            .iter()
            .filter(|e| e.prefix_len == best_len && dst.network(best_len) == e.prefix)
            .collect();
        let Some(best) = cands.iter().map(|e| (e.admin_distance, e.metric)).min() else {
            return Vec::new();
        };
        cands
            .into_iter()
            .filter(|e| (e.admin_distance, e.metric) == best)
            .collect()
    }

    /// 按流选择一条路径（ECMP）。
    pub fn select(&self, dst: A, flow_key: u64) -> Option<&RibEntry<A>> {
        let cands = self.lookup(dst);
        if cands.is_empty() {
            return None;
        }
        let h = mix64(flow_key ^ (dst.to_bits() as u64) ^ self.hash_salt);
        Some(cands[(h as usize) % cands.len()])
    }
}

/// 一个简单、确定性的 64-bit mixing（替代 RandomState，避免每次运行 hash 不稳定）。
pub(crate) fn mix64(mut x: u64) -> u64 {
    // splitmix64
    x = x.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}
