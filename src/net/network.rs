//! 网络拓扑管理
//!
//! 路由器与广播链路的集合，负责帧的串行化发送、按链路投递、链路状态与管理操作的分发。

use std::collections::HashSet;

use serde::Serialize;

use super::deliver_packet::DeliverPacket;
use super::id::{IfaceId, LinkId, NodeId};
use super::link::Link;
use super::node::{Node, RouterCommand};
use super::packet::{Packet, Payload};
use super::router::{Router, RouterReport};
use super::stats::Stats;
use crate::proto::eigrp::AddressFamily;
use crate::proto::eigrp::EigrpTimer;
use crate::sim::{SimTime, Simulator};
use tracing::{debug, info, trace, warn};

/// 逐跳追踪结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceOutcome {
    /// 到达拥有目的地址的路由器
    Delivered(Vec<NodeId>),
    /// 某一跳查不到路由
    NoRoute(Vec<NodeId>),
    /// 重复经过同一路由器
    Loop(Vec<NodeId>),
}

impl TraceOutcome {
    pub fn path(&self) -> &[NodeId] {
        match self {
            TraceOutcome::Delivered(p) | TraceOutcome::NoRoute(p) | TraceOutcome::Loop(p) => p,
        }
    }

    pub fn is_loop(&self) -> bool {
        matches!(self, TraceOutcome::Loop(_))
    }
}

/// 整个网络的状态快照（JSON 报告）
#[derive(Debug, Clone, Serialize)]
pub struct NetworkReport<A> {
    pub now_ms: u64,
    pub stats: Stats,
    pub links: Vec<LinkReport>,
    pub routers: Vec<RouterReport<A>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LinkReport {
    pub name: String,
    pub up: bool,
    pub attachments: usize,
}

/// 网络拓扑
#[derive(Default)]
pub struct Network {
    nodes: Vec<Option<Box<dyn Node>>>,
    links: Vec<Link>,
    next_pkt_id: u64,
    pub stats: Stats,
}

impl Network {
    /// 下一个节点的标识符（用于先构造节点再加入）
    pub fn next_node_id(&self) -> NodeId {
        NodeId(self.nodes.len())
    }

    /// 添加路由器节点；节点自身的 id 必须等于 `next_node_id()`
    pub fn add_router(&mut self, node: Box<dyn Node>) -> NodeId {
        let id = NodeId(self.nodes.len());
        debug_assert_eq!(node.id(), id);
        debug!(node = node.name(), id = id.0, "添加路由器");
        self.nodes.push(Some(node));
        id
    }

    /// 添加广播链路
    pub fn add_link(&mut self, name: impl Into<String>, latency: SimTime, bandwidth_bps: u64) -> LinkId {
        let id = LinkId(self.links.len());
        self.links.push(Link::new(name, latency, bandwidth_bps));
        id
    }

    /// 把路由器接口挂到链路上
    pub fn attach(&mut self, link: LinkId, node: NodeId, iface: IfaceId) {
        self.links[link.0].attachments.push((node, iface));
    }

    pub fn link(&self, id: LinkId) -> &Link {
        &self.links[id.0]
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn link_by_name(&self, name: &str) -> Option<LinkId> {
        self.links.iter().position(|l| l.name == name).map(LinkId)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, id: NodeId) -> Option<&dyn Node> {
        self.nodes.get(id.0).and_then(|n| n.as_deref())
    }

    pub fn node_by_name(&self, name: &str) -> Option<NodeId> {
        self.nodes
            .iter()
            .position(|n| n.as_ref().is_some_and(|n| n.name() == name))
            .map(NodeId)
    }

    /// 取得某地址族的路由器视图
    pub fn router<A: AddressFamily>(&self, id: NodeId) -> Option<&Router<A>> {
        self.node(id)?.as_any().downcast_ref::<Router<A>>()
    }

    pub fn routers<A: AddressFamily>(&self) -> impl Iterator<Item = &Router<A>> {
        self.nodes
            .iter()
            .filter_map(|n| n.as_ref()?.as_any().downcast_ref::<Router<A>>())
    }

    pub fn report<A: AddressFamily>(&self, now: SimTime) -> NetworkReport<A> {
        NetworkReport {
            now_ms: now.as_millis(),
            stats: self.stats.clone(),
            links: self
                .links
                .iter()
                .map(|l| LinkReport {
                    name: l.name.clone(),
                    up: l.up,
                    attachments: l.attachments.len(),
                })
                .collect(),
            routers: self.routers::<A>().map(Router::report).collect(),
        }
    }

    /// 启动所有路由器
    #[tracing::instrument(skip(self, sim))]
    pub fn start_all(&mut self, sim: &mut Simulator) {
        info!(routers = self.nodes.len(), links = self.links.len(), "🚀 启动网络");
        for i in 0..self.nodes.len() {
            self.with_node(NodeId(i), |node, net| node.start(sim, net));
        }
    }

    /// 暂时把节点取出来，避免 &mut self 与 &mut node 的重叠借用。
    fn with_node(&mut self, id: NodeId, f: impl FnOnce(&mut Box<dyn Node>, &mut Network)) {
        let Some(mut node) = self.nodes.get_mut(id.0).and_then(Option::take) else {
            warn!(node = id.0, "节点不存在或正在处理中");
            return;
        };
        trace!(node_name = node.name(), "取出节点");
        f(&mut node, self);
        self.nodes[id.0] = Some(node);
    }

    /// 从某路由器经链路发出一帧：按链路带宽串行化，到达除发送者外的每个挂接接口
    #[tracing::instrument(skip(self, payload, sim), fields(from = from.0, link = link.0, kind = payload.kind()))]
    pub fn transmit(&mut self, from: NodeId, link: LinkId, payload: Payload, sim: &mut Simulator) {
        let Some(l) = self.links.get_mut(link.0) else {
            warn!("链路不存在，丢弃");
            return;
        };
        if !l.up {
            trace!("链路 down，丢弃");
            self.stats.dropped_pkts += 1;
            return;
        }

        let size_bytes = payload.size_bytes();
        let now = sim.now();
        let start = now.max(l.busy_until);
        let depart = start.saturating_add(l.tx_time(size_bytes));
        l.busy_until = depart;
        let arrive = depart.saturating_add(l.latency);
        let receivers: Vec<(NodeId, IfaceId)> = l
            .attachments
            .iter()
            .copied()
            .filter(|(n, _)| *n != from)
            .collect();

        let id = self.next_pkt_id;
        self.next_pkt_id = self.next_pkt_id.wrapping_add(1);
        self.stats.on_sent(payload.kind(), size_bytes);
        debug!(pkt_id = id, size_bytes, ?arrive, receivers = receivers.len(), "📤 发送");

        for (to, iface) in receivers {
            let pkt = Packet {
                id,
                from,
                link,
                size_bytes,
                payload: payload.clone(),
            };
            sim.schedule(arrive, DeliverPacket { to, iface, pkt });
        }
    }

    /// 将数据包交付给节点处理；传输途中链路断开的帧被丢弃
    pub fn deliver(&mut self, to: NodeId, iface: IfaceId, pkt: Packet, sim: &mut Simulator) {
        if !self.links.get(pkt.link.0).is_some_and(|l| l.up) {
            trace!(pkt_id = pkt.id, "链路已 down，帧丢失");
            self.stats.dropped_pkts += 1;
            return;
        }
        self.stats.delivered_pkts += 1;
        self.with_node(to, |node, net| node.on_packet(iface, pkt, sim, net));
    }

    pub fn deliver_timer(&mut self, to: NodeId, timer: EigrpTimer, sim: &mut Simulator) {
        self.with_node(to, |node, net| node.on_timer(timer, sim, net));
    }

    /// 链路 up/down：通知每个挂接的接口
    #[tracing::instrument(skip(self, sim))]
    pub fn set_link_state(&mut self, link: LinkId, up: bool, sim: &mut Simulator) {
        let Some(l) = self.links.get_mut(link.0) else {
            warn!("链路不存在");
            return;
        };
        if l.up == up {
            return;
        }
        l.up = up;
        if !up {
            l.busy_until = sim.now();
        }
        info!(link = %l.name, up, "🔌 链路状态变化");
        let attached = l.attachments.clone();
        for (node, iface) in attached {
            self.with_node(node, |n, net| n.on_link_state(iface, up, sim, net));
        }
    }

    pub fn command(&mut self, to: NodeId, cmd: RouterCommand, sim: &mut Simulator) {
        self.with_node(to, |node, net| node.on_command(cmd, sim, net));
    }

    /// 按各路由器的路由表逐跳追踪到 `dst` 的路径
    pub fn trace_route<A: AddressFamily>(&self, from: NodeId, dst: A, flow_key: u64) -> TraceOutcome {
        let mut path = vec![from];
        let mut seen = HashSet::from([from]);
        let mut cur = from;
        loop {
            let Some(router) = self.router::<A>(cur) else {
                return TraceOutcome::NoRoute(path);
            };
            if router.owns_address(dst) {
                return TraceOutcome::Delivered(path);
            }
            let Some(entry) = router.pdm().rib().select(dst, flow_key) else {
                return TraceOutcome::NoRoute(path);
            };
            let Some(rif) = router.interface(entry.iface) else {
                return TraceOutcome::NoRoute(path);
            };
            let link = &self.links[rif.link.0];
            let peer = if entry.gateway.is_unspec() {
                link.attachments
                    .iter()
                    .map(|(n, _)| *n)
                    .find(|n| *n != cur && self.router::<A>(*n).is_some_and(|r| r.owns_address(dst)))
            } else {
                link.attachments
                    .iter()
                    .map(|(n, _)| *n)
                    .find(|n| *n != cur && self.router::<A>(*n).is_some_and(|r| r.owns_address(entry.gateway)))
            };
            let Some(next) = peer else {
                return TraceOutcome::NoRoute(path);
            };
            path.push(next);
            if !seen.insert(next) {
                return TraceOutcome::Loop(path);
            }
            cur = next;
        }
    }
}
