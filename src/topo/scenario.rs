//! 由场景文档构建网络
//!
//! 校验所有配置（取值范围、名称引用、地址族），创建链路与路由器，
//! 并把场景事件调度到仿真器上。任何配置错误都在仿真开始前返回。

use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr};

use tracing::{debug, info};

use crate::net::{
    IfaceId, LinkId, LinkStateChange, NetWorld, NodeCommand, NodeId, Router, RouterCommand,
};
use crate::proto::eigrp::config::{
    DEFAULT_MTU, check_as_number, check_iface_value, check_k_values, check_maximum_path,
    check_variance, parse_stub_flags,
};
use crate::proto::eigrp::{AddressFamily, ConfigError, InterfaceConfig, ProcessConfig, parse_prefix};
use crate::sim::{EventSpec, InterfaceSpec, RouterSpec, ScenarioSpec, SimTime, Simulator};

const DEFAULT_LINK_LATENCY_US: u64 = 100;
const DEFAULT_LINK_MBPS: u64 = 100;

/// 构建结果
#[derive(Debug, Clone)]
pub struct ScenarioNetwork {
    pub routers: Vec<NodeId>,
    pub links: Vec<LinkId>,
    pub until: SimTime,
}

fn parse_addr<A: AddressFamily>(router: &str, value: &str) -> Result<(A, u8), ConfigError> {
    if let Some(parsed) = parse_prefix::<A>(value) {
        return Ok(parsed);
    }
    let addr = value.split_once('/').map_or(value, |(a, _)| a).trim();
    if addr.parse::<IpAddr>().is_ok() {
        Err(ConfigError::FamilyMismatch {
            router: router.to_string(),
            value: value.to_string(),
            family: A::NAME,
        })
    } else {
        Err(ConfigError::BadAddress {
            router: router.to_string(),
            value: value.to_string(),
        })
    }
}

fn process_config<A: AddressFamily>(
    spec: &RouterSpec,
    addresses: &[A],
) -> Result<ProcessConfig, ConfigError> {
    let name = spec.name.as_str();
    let mut cfg = ProcessConfig::default();
    if let Some(v) = spec.as_number {
        cfg.as_number = check_as_number(name, v)?;
    }
    if let Some(k) = &spec.k_values {
        cfg.k_values = check_k_values(name, k)?;
    }
    if let Some(v) = spec.maximum_path {
        cfg.maximum_path = check_maximum_path(name, v)?;
    }
    if let Some(v) = spec.variance {
        cfg.variance = check_variance(name, v)?;
    }
    if let Some(flags) = &spec.stub {
        cfg.stub = Some(parse_stub_flags(name, flags)?);
    }
    cfg.router_id = match &spec.router_id {
        Some(rid) => rid.parse::<Ipv4Addr>().map_err(|_| ConfigError::BadAddress {
            router: name.to_string(),
            value: rid.clone(),
        })?,
        // IPv4 路由器缺省取最大的接口地址
        None if A::BITS == 32 => addresses
            .iter()
            .map(|a| Ipv4Addr::from(a.to_bits() as u32))
            .max()
            .unwrap_or(Ipv4Addr::UNSPECIFIED),
        None => {
            return Err(ConfigError::MissingRouterId {
                router: name.to_string(),
            });
        }
    };
    Ok(cfg)
}

fn interface_config(router: &str, spec: &InterfaceSpec) -> Result<(InterfaceConfig, u32), ConfigError> {
    let check = |field: &'static str, value: Option<u64>, min: u64, max: u64| {
        value
            .map(|v| check_iface_value(router, &spec.name, field, v, min, max))
            .transpose()
    };
    let mut cfg = InterfaceConfig::named(spec.name.clone());
    if let Some(v) = check("hello_interval", spec.hello_interval, 1, 65_535)? {
        cfg.hello_interval = v as u16;
    }
    if let Some(v) = check("hold_interval", spec.hold_interval, 1, 65_535)? {
        cfg.hold_interval = v as u16;
    }
    if let Some(v) = check("bandwidth", spec.bandwidth, 0, 10_000_000)? {
        cfg.bandwidth = v as u32;
    }
    if let Some(v) = check("delay", spec.delay, 0, 16_777_215)? {
        cfg.delay = v as u32;
    }
    if let Some(v) = check("reliability", spec.reliability, 1, 255)? {
        cfg.reliability = v as u8;
    }
    if let Some(v) = check("load", spec.load, 1, 255)? {
        cfg.load = v as u8;
    }
    let mtu = check("mtu", spec.mtu, 68, 65_535)?.map_or(DEFAULT_MTU, |v| v as u32);
    cfg.split_horizon = spec.split_horizon.unwrap_or(true);
    cfg.passive = spec.passive.unwrap_or(false);
    Ok((cfg, mtu))
}

/// 按场景文档构建网络并调度事件；所有路由器使用同一地址族 `A`
#[tracing::instrument(skip_all, fields(family = A::NAME))]
pub fn build_scenario<A: AddressFamily>(
    world: &mut NetWorld,
    sim: &mut Simulator,
    spec: &ScenarioSpec,
) -> Result<ScenarioNetwork, ConfigError> {
    if spec.routers.is_empty() {
        return Err(ConfigError::NoRouters);
    }

    let mut link_names = HashSet::new();
    for l in &spec.links {
        if !link_names.insert(l.name.as_str()) {
            return Err(ConfigError::DuplicateLink(l.name.clone()));
        }
    }
    let mut router_names = HashSet::new();
    for r in &spec.routers {
        if !router_names.insert(r.name.as_str()) {
            return Err(ConfigError::DuplicateRouter(r.name.clone()));
        }
    }

    // 先完整校验再修改网络，避免留下半构建的拓扑
    let mut routers = Vec::with_capacity(spec.routers.len());
    for r in &spec.routers {
        let name = r.name.as_str();
        let mut iface_names = HashSet::new();
        let mut ifaces = Vec::with_capacity(r.interfaces.len());
        for i in &r.interfaces {
            if !iface_names.insert(i.name.as_str()) {
                return Err(ConfigError::DuplicateInterface {
                    router: name.to_string(),
                    iface: i.name.clone(),
                });
            }
            if !link_names.contains(i.link.as_str()) {
                return Err(ConfigError::UnknownLink(i.link.clone()));
            }
            let (address, plen) = parse_addr::<A>(name, &i.address)?;
            let (cfg, mtu) = interface_config(name, i)?;
            ifaces.push((i.link.as_str(), address, plen, mtu, cfg));
        }

        let networks = if r.networks.is_empty() {
            vec![(A::UNSPEC, 0)]
        } else {
            r.networks
                .iter()
                .map(|n| parse_addr::<A>(name, n).map(|(a, l)| (a.network(l), l)))
                .collect::<Result<Vec<_>, _>>()?
        };

        let mut statics = Vec::with_capacity(r.static_routes.len());
        for s in &r.static_routes {
            let (prefix, plen) = parse_addr::<A>(name, &s.prefix)?;
            let (gateway, _) = parse_addr::<A>(name, &s.gateway)?;
            let Some(idx) = r.interfaces.iter().position(|i| i.name == s.interface) else {
                return Err(ConfigError::UnknownInterface {
                    router: name.to_string(),
                    iface: s.interface.clone(),
                });
            };
            statics.push((prefix, plen, gateway, IfaceId(idx)));
        }

        let addresses: Vec<A> = ifaces.iter().map(|i| i.1).collect();
        let config = process_config::<A>(r, &addresses)?;
        routers.push((r, config, networks, ifaces, statics));
    }

    for ev in &spec.events {
        match ev {
            EventSpec::LinkDown { link, .. } | EventSpec::LinkUp { link, .. } => {
                if !link_names.contains(link.as_str()) {
                    return Err(ConfigError::UnknownLink(link.clone()));
                }
            }
            EventSpec::SetDelay { router, interface, delay: value, .. }
            | EventSpec::SetBandwidth { router, interface, bandwidth: value, .. } => {
                let Some(r) = spec.routers.iter().find(|r| &r.name == router) else {
                    return Err(ConfigError::UnknownRouter(router.clone()));
                };
                if !r.interfaces.iter().any(|i| &i.name == interface) {
                    return Err(ConfigError::UnknownInterface {
                        router: router.clone(),
                        iface: interface.clone(),
                    });
                }
                let (field, max) = match ev {
                    EventSpec::SetDelay { .. } => ("delay", 16_777_215),
                    _ => ("bandwidth", 10_000_000),
                };
                check_iface_value(router, interface, field, *value, 0, max)?;
            }
            EventSpec::ClearRoute { router, prefix, .. } => {
                if !router_names.contains(router.as_str()) {
                    return Err(ConfigError::UnknownRouter(router.clone()));
                }
                parse_addr::<A>(router, prefix)?;
            }
        }
    }

    // 构建
    let net = &mut world.net;
    let mut links = Vec::with_capacity(spec.links.len());
    for l in &spec.links {
        let latency = SimTime::from_micros(l.latency_us.unwrap_or(DEFAULT_LINK_LATENCY_US));
        let bps = l.bandwidth_mbps.unwrap_or(DEFAULT_LINK_MBPS).saturating_mul(1_000_000);
        links.push(net.add_link(l.name.clone(), latency, bps));
    }

    let mut ids = Vec::with_capacity(routers.len());
    for (r, config, networks, ifaces, statics) in routers {
        let id = net.next_node_id();
        let mut router = Router::<A>::new(id, r.name.clone(), config, networks);
        for (link_name, address, plen, mtu, cfg) in ifaces {
            let Some(link) = net.link_by_name(link_name) else {
                return Err(ConfigError::UnknownLink(link_name.to_string()));
            };
            let iface = router.add_interface(link, address, plen, mtu, cfg);
            net.attach(link, id, iface);
        }
        for (prefix, plen, gateway, iface) in statics {
            router.add_static_route(prefix, plen, gateway, iface);
        }
        debug!(router = %r.name, interfaces = router.interfaces().len(), "路由器已创建");
        ids.push(net.add_router(Box::new(router)));
    }

    for ev in &spec.events {
        let at = SimTime::from_millis(ev.at_ms());
        let router_id = |name: &str| {
            net.node_by_name(name)
                .ok_or_else(|| ConfigError::UnknownRouter(name.to_string()))
        };
        let iface_id = |router: &str, iface: &str| {
            spec.routers
                .iter()
                .find(|r| r.name == router)
                .and_then(|r| r.interfaces.iter().position(|i| i.name == iface))
                .map(IfaceId)
                .ok_or_else(|| ConfigError::UnknownInterface {
                    router: router.to_string(),
                    iface: iface.to_string(),
                })
        };
        match ev {
            EventSpec::LinkDown { link, .. } | EventSpec::LinkUp { link, .. } => {
                let link = net
                    .link_by_name(link)
                    .ok_or_else(|| ConfigError::UnknownLink(link.clone()))?;
                let up = matches!(ev, EventSpec::LinkUp { .. });
                sim.schedule(at, LinkStateChange { link, up });
            }
            EventSpec::SetDelay { router, interface, delay, .. } => {
                let cmd = RouterCommand::SetMetric {
                    iface: iface_id(router, interface)?,
                    bandwidth: None,
                    delay: Some(*delay as u32),
                };
                sim.schedule(at, NodeCommand { to: router_id(router)?, cmd });
            }
            EventSpec::SetBandwidth { router, interface, bandwidth, .. } => {
                let cmd = RouterCommand::SetMetric {
                    iface: iface_id(router, interface)?,
                    bandwidth: Some(*bandwidth as u32),
                    delay: None,
                };
                sim.schedule(at, NodeCommand { to: router_id(router)?, cmd });
            }
            EventSpec::ClearRoute { router, prefix, .. } => {
                let cmd = RouterCommand::ClearRoute { prefix: prefix.clone() };
                sim.schedule(at, NodeCommand { to: router_id(router)?, cmd });
            }
        }
    }

    info!(
        routers = ids.len(),
        links = links.len(),
        events = spec.events.len(),
        "场景构建完成"
    );
    Ok(ScenarioNetwork {
        routers: ids,
        links,
        until: SimTime::from_millis(spec.until_ms),
    })
}
