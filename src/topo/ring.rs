//! 环形拓扑构建
//!
//! N 台 IPv4 路由器围成一圈：第 i 条环上链路连接 r{i} 与 r{(i+1)%N}，
//! 地址 10.0.i.1/24 与 10.0.i.2/24；每台路由器另有一个只挂自己的 LAN
//! 192.168.i.0/24，作为可达性检查的目的网络。

use std::net::Ipv4Addr;

use crate::net::{LinkId, NetWorld, NodeId, Router};
use crate::proto::eigrp::{InterfaceConfig, ProcessConfig};
use crate::proto::eigrp::config::DEFAULT_MTU;
use crate::sim::SimTime;

/// 环形拓扑配置选项
#[derive(Debug, Clone)]
pub struct RingOpts {
    pub routers: usize,
    pub link_latency: SimTime,
    pub bandwidth_mbps: u64,
    pub hello_interval: u16,
    pub hold_interval: u16,
}

impl Default for RingOpts {
    fn default() -> Self {
        Self {
            routers: 4,
            link_latency: SimTime::from_micros(100),
            bandwidth_mbps: 100,
            hello_interval: 5,
            hold_interval: 15,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Ring {
    pub routers: Vec<NodeId>,
    /// `ring_links[i]` 连接 `routers[i]` 与 `routers[(i+1)%N]`
    pub ring_links: Vec<LinkId>,
    /// 每台路由器 LAN 上的主机地址
    pub lan_hosts: Vec<Ipv4Addr>,
}

fn octet(i: usize) -> u8 {
    (i % 256) as u8
}

/// 构建环形拓扑（至少 3 台路由器；更少时按 3 台处理）
pub fn build_ring(world: &mut NetWorld, opts: &RingOpts) -> Ring {
    let n = opts.routers.max(3);
    let net = &mut world.net;
    let bps = opts.bandwidth_mbps.saturating_mul(1_000_000);

    let ring_links: Vec<LinkId> = (0..n)
        .map(|i| net.add_link(format!("ring{i}"), opts.link_latency, bps))
        .collect();

    let iface_cfg = |name: String| InterfaceConfig {
        hello_interval: opts.hello_interval,
        hold_interval: opts.hold_interval,
        ..InterfaceConfig::named(name)
    };

    let mut routers = Vec::with_capacity(n);
    let mut lan_hosts = Vec::with_capacity(n);
    for i in 0..n {
        let id = net.next_node_id();
        let config = ProcessConfig {
            router_id: Ipv4Addr::new(1, 1, 1, octet(i + 1)),
            ..ProcessConfig::default()
        };
        let networks = vec![
            (Ipv4Addr::new(10, 0, 0, 0), 8),
            (Ipv4Addr::new(192, 168, 0, 0), 16),
        ];
        let mut router = Router::<Ipv4Addr>::new(id, format!("r{i}"), config, networks);

        // 顺时针一侧：本路由器是 ring{i} 的 .1
        let cw = ring_links[i];
        let address = Ipv4Addr::new(10, 0, octet(i), 1);
        let iface = router.add_interface(cw, address, 24, DEFAULT_MTU, iface_cfg("cw".into()));
        net.attach(cw, id, iface);

        // 逆时针一侧：本路由器是 ring{i-1} 的 .2
        let prev = (i + n - 1) % n;
        let ccw = ring_links[prev];
        let address = Ipv4Addr::new(10, 0, octet(prev), 2);
        let iface = router.add_interface(ccw, address, 24, DEFAULT_MTU, iface_cfg("ccw".into()));
        net.attach(ccw, id, iface);

        let lan = net.add_link(format!("lan{i}"), opts.link_latency, bps);
        let address = Ipv4Addr::new(192, 168, octet(i), 1);
        let iface = router.add_interface(lan, address, 24, DEFAULT_MTU, iface_cfg("lan".into()));
        net.attach(lan, id, iface);
        lan_hosts.push(address);

        routers.push(net.add_router(Box::new(router)));
    }

    Ring {
        routers,
        ring_links,
        lan_hosts,
    }
}
