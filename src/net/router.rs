//! 路由器节点
//!
//! 把一个 EIGRP 进程（`Pdm`）接到仿真网络上：接口挂在广播链路上，
//! 收到的帧交给 PDM，PDM 产生的报文从对应接口发出，定时器映射为仿真事件。

use std::any::Any;

use serde::Serialize;
use tracing::{debug, info, trace, warn};

use super::id::{IfaceId, LinkId, NodeId};
use super::network::Network;
use super::node::{Node, RouterCommand};
use super::packet::Packet;
use super::router_timer::RouterTimer;
use super::routing::RibEntry;
use crate::proto::eigrp::{
    AddressFamily, EigrpTimer, InterfaceConfig, Neighbor, Pdm, ProcessConfig, RouteSource,
    RouterId, TimerScheduler, parse_prefix,
};
use crate::sim::{EventId, SimTime, Simulator};

/// 路由器上的一个接口
#[derive(Debug, Clone, Serialize)]
pub struct RouterIface<A> {
    pub id: IfaceId,
    pub name: String,
    pub link: LinkId,
    pub address: A,
    pub prefix_len: u8,
    pub mtu: u32,
    pub up: bool,
    #[serde(skip)]
    pub cfg: InterfaceConfig,
}

/// 拓扑表中的一个目的网络
#[derive(Debug, Clone, Serialize)]
pub struct TopologyEntry<A> {
    pub prefix: String,
    pub fd: u64,
    pub active: bool,
    pub successors: usize,
    pub sources: Vec<RouteSource<A>>,
}

/// 路由器状态快照（JSON 报告）
#[derive(Debug, Clone, Serialize)]
pub struct RouterReport<A> {
    pub name: String,
    pub router_id: RouterId,
    pub family: &'static str,
    pub interfaces: Vec<RouterIface<A>>,
    pub neighbors: Vec<Neighbor<A>>,
    pub topology: Vec<TopologyEntry<A>>,
    pub routes: Vec<RibEntry<A>>,
}

/// 把 PDM 的定时器请求落到仿真器事件队列上
struct SimTimers<'a> {
    sim: &'a mut Simulator,
    node: NodeId,
}

impl TimerScheduler for SimTimers<'_> {
    fn now(&self) -> SimTime {
        self.sim.now()
    }

    fn schedule(&mut self, after: SimTime, timer: EigrpTimer) -> EventId {
        let at = self.sim.now().saturating_add(after);
        self.sim.schedule(
            at,
            RouterTimer {
                node: self.node,
                timer,
            },
        )
    }

    fn cancel(&mut self, id: EventId) {
        self.sim.cancel(id);
    }
}

/// 运行 EIGRP 的路由器
pub struct Router<A: AddressFamily> {
    id: NodeId,
    name: String,
    ifaces: Vec<RouterIface<A>>,
    pdm: Pdm<A>,
}

impl<A: AddressFamily> Router<A> {
    pub fn new(id: NodeId, name: impl Into<String>, config: ProcessConfig, networks: Vec<(A, u8)>) -> Self {
        let name = name.into();
        let salt = u64::from(u32::from(config.router_id)) ^ (id.0 as u64).rotate_left(32);
        Self {
            id,
            name,
            ifaces: Vec::new(),
            pdm: Pdm::new(config, networks, salt),
        }
    }

    /// 添加接口（仿真开始前）；链路挂接由 `Network::attach` 完成
    pub fn add_interface(
        &mut self,
        link: LinkId,
        address: A,
        prefix_len: u8,
        mtu: u32,
        cfg: InterfaceConfig,
    ) -> IfaceId {
        let id = IfaceId(self.ifaces.len());
        self.ifaces.push(RouterIface {
            id,
            name: cfg.name.clone(),
            link,
            address,
            prefix_len,
            mtu,
            up: true,
            cfg,
        });
        id
    }

    /// 静态路由（AD 1）；会挡住同前缀的 EIGRP 路由
    pub fn add_static_route(&mut self, prefix: A, prefix_len: u8, gateway: A, iface: IfaceId) {
        self.pdm
            .rib_mut()
            .add_static(prefix.network(prefix_len), prefix_len, gateway, iface);
    }

    pub fn pdm(&self) -> &Pdm<A> {
        &self.pdm
    }

    pub fn interfaces(&self) -> &[RouterIface<A>] {
        &self.ifaces
    }

    pub fn interface(&self, id: IfaceId) -> Option<&RouterIface<A>> {
        self.ifaces.get(id.0)
    }

    pub fn interface_by_name(&self, name: &str) -> Option<&RouterIface<A>> {
        self.ifaces.iter().find(|i| i.name == name)
    }

    pub fn owns_address(&self, address: A) -> bool {
        self.ifaces.iter().any(|i| i.address == address)
    }

    pub fn report(&self) -> RouterReport<A> {
        let tt = self.pdm.topology();
        let topology = tt
            .routes()
            .map(|r| TopologyEntry {
                prefix: r.prefix().to_string(),
                fd: r.fd,
                active: r.is_active(),
                successors: r.num_successors,
                sources: tt.sources_of(r.id).filter(|s| s.is_valid()).cloned().collect(),
            })
            .collect();
        RouterReport {
            name: self.name.clone(),
            router_id: self.pdm.config().router_id,
            family: A::NAME,
            interfaces: self.ifaces.clone(),
            neighbors: self.pdm.neighbors().iter().cloned().collect(),
            topology,
            routes: self.pdm.rib().entries().to_vec(),
        }
    }

    /// 把 PDM 产生的报文发到链路上
    fn transmit(&mut self, sim: &mut Simulator, net: &mut Network) {
        for out in self.pdm.take_outbound() {
            let Some(iface) = self.ifaces.get(out.iface.0) else {
                warn!(iface = %out.iface, "报文指向不存在的接口，丢弃");
                continue;
            };
            if !iface.up {
                trace!(iface = %iface.id, "接口 down，报文丢弃");
                net.stats.dropped_pkts += 1;
                continue;
            }
            net.transmit(self.id, iface.link, A::into_payload(out.datagram), sim);
        }
    }
}

impl<A: AddressFamily> Node for Router<A> {
    fn id(&self) -> NodeId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    #[tracing::instrument(skip(self, sim, net), fields(router = %self.name))]
    fn start(&mut self, sim: &mut Simulator, net: &mut Network) {
        info!(rid = %self.pdm.config().router_id, family = A::NAME, "🚀 路由器启动");
        let mut timers = SimTimers { sim, node: self.id };
        for i in 0..self.ifaces.len() {
            let iface = self.ifaces[i].clone();
            if iface.up {
                self.pdm
                    .rib_mut()
                    .add_connected(iface.address, iface.prefix_len, iface.id);
            }
            let eigrp = self.pdm.add_interface(
                iface.id,
                iface.address,
                iface.prefix_len,
                iface.mtu,
                &iface.cfg,
                iface.up,
                &mut timers,
            );
            debug!(iface = %iface.name, address = %iface.address, eigrp, "接口已配置");
        }
        self.transmit(sim, net);
    }

    #[tracing::instrument(skip(self, pkt, sim, net), fields(router = %self.name, pkt_id = pkt.id))]
    fn on_packet(&mut self, iface: IfaceId, pkt: Packet, sim: &mut Simulator, net: &mut Network) {
        let Some(rif) = self.ifaces.get(iface.0) else {
            return;
        };
        if !rif.up {
            trace!("接口 down，忽略到达的帧");
            return;
        }
        let Some(dgram) = A::from_payload(pkt.payload) else {
            trace!("地址族不匹配，忽略");
            return;
        };
        if dgram.dst != A::eigrp_multicast() && dgram.dst != rif.address {
            trace!(dst = %dgram.dst, "目的地址不是本接口，忽略");
            return;
        }

        let mut timers = SimTimers { sim, node: self.id };
        self.pdm
            .handle_message(iface, dgram.src, &dgram.msg, &mut timers);
        self.transmit(sim, net);
    }

    fn on_timer(&mut self, timer: EigrpTimer, sim: &mut Simulator, net: &mut Network) {
        let mut timers = SimTimers { sim, node: self.id };
        self.pdm.handle_timer(timer, &mut timers);
        self.transmit(sim, net);
    }

    #[tracing::instrument(skip(self, sim, net), fields(router = %self.name))]
    fn on_link_state(&mut self, iface: IfaceId, up: bool, sim: &mut Simulator, net: &mut Network) {
        let Some(rif) = self.ifaces.get_mut(iface.0) else {
            return;
        };
        if rif.up == up {
            return;
        }
        rif.up = up;
        let (address, plen) = (rif.address, rif.prefix_len);
        info!(iface = %rif.name, up, "接口状态变化");

        if up {
            self.pdm.rib_mut().add_connected(address, plen, iface);
        } else {
            self.pdm.rib_mut().remove_connected(iface);
        }
        let mut timers = SimTimers { sim, node: self.id };
        self.pdm.interface_state_changed(iface, up, &mut timers);
        self.transmit(sim, net);
    }

    #[tracing::instrument(skip(self, sim, net), fields(router = %self.name))]
    fn on_command(&mut self, cmd: RouterCommand, sim: &mut Simulator, net: &mut Network) {
        match cmd {
            RouterCommand::SetMetric {
                iface,
                bandwidth,
                delay,
            } => {
                if let Some(rif) = self.ifaces.get_mut(iface.0) {
                    if let Some(bw) = bandwidth {
                        rif.cfg.bandwidth = bw;
                    }
                    if let Some(d) = delay {
                        rif.cfg.delay = d;
                    }
                }
                self.pdm.interface_config_changed(iface, bandwidth, delay);
            }
            RouterCommand::ClearRoute { prefix } => match parse_prefix::<A>(&prefix) {
                Some((addr, plen)) => self.pdm.rib_route_removed(addr.network(plen), plen),
                None => warn!(%prefix, "无法解析的前缀，忽略"),
            },
        }
        self.transmit(sim, net);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
