//! EIGRP interface table.
//!
//! Interfaces matching a `network` statement are tracked here; only the
//! enabled ones take part in the protocol.

use serde::Serialize;

use super::addr::AddressFamily;
use super::config::InterfaceConfig;
use super::metric::MetricParams;
use crate::net::IfaceId;
use crate::sim::EventId;

#[derive(Debug, Clone, Serialize)]
pub struct EigrpInterface<A> {
    pub id: IfaceId,
    pub name: String,
    pub address: A,
    pub prefix_len: u8,
    pub enabled: bool,
    pub passive: bool,
    pub split_horizon: bool,
    pub multicast: bool,
    /// Seconds.
    pub hello_interval: u16,
    /// Seconds; advertised in our Hellos.
    pub hold_interval: u16,
    /// Kbit/s.
    pub bandwidth: u32,
    /// Tens of microseconds.
    pub delay: u32,
    pub reliability: u8,
    pub load: u8,
    pub mtu: u32,
    pub num_neighbors: usize,
    pub num_stubs: usize,
    /// Reliable messages sent on this interface and not yet fully acknowledged.
    pub pending_msgs: usize,
    #[serde(skip)]
    pub(crate) hello_timer: Option<EventId>,
}

impl<A: AddressFamily> EigrpInterface<A> {
    pub fn new(id: IfaceId, address: A, prefix_len: u8, mtu: u32, cfg: &InterfaceConfig) -> Self {
        Self {
            id,
            name: cfg.name.clone(),
            address,
            prefix_len,
            enabled: false,
            passive: cfg.passive,
            split_horizon: cfg.split_horizon,
            multicast: true,
            hello_interval: cfg.hello_interval,
            hold_interval: cfg.hold_interval,
            bandwidth: cfg.bandwidth,
            delay: cfg.delay,
            reliability: cfg.reliability,
            load: cfg.load,
            mtu,
            num_neighbors: 0,
            num_stubs: 0,
            pending_msgs: 0,
            hello_timer: None,
        }
    }

    pub fn metric_params(&self) -> MetricParams {
        MetricParams::interface(
            self.bandwidth,
            self.delay,
            self.reliability,
            self.load,
            self.mtu,
        )
    }

    pub fn network(&self) -> A {
        self.address.network(self.prefix_len)
    }

    pub fn has_neighbors(&self) -> bool {
        self.num_neighbors > 0
    }
}

#[derive(Debug, Clone)]
pub struct InterfaceTable<A> {
    ifaces: Vec<EigrpInterface<A>>,
}

impl<A: AddressFamily> Default for InterfaceTable<A> {
    fn default() -> Self {
        Self { ifaces: Vec::new() }
    }
}

impl<A: AddressFamily> InterfaceTable<A> {
    pub fn add(&mut self, iface: EigrpInterface<A>) {
        self.ifaces.retain(|i| i.id != iface.id);
        self.ifaces.push(iface);
    }

    /// Any interface, enabled or not.
    pub fn get(&self, id: IfaceId) -> Option<&EigrpInterface<A>> {
        self.ifaces.iter().find(|i| i.id == id)
    }

    pub fn get_mut(&mut self, id: IfaceId) -> Option<&mut EigrpInterface<A>> {
        self.ifaces.iter_mut().find(|i| i.id == id)
    }

    pub fn enabled(&self, id: IfaceId) -> Option<&EigrpInterface<A>> {
        self.get(id).filter(|i| i.enabled)
    }

    pub fn enabled_mut(&mut self, id: IfaceId) -> Option<&mut EigrpInterface<A>> {
        self.get_mut(id).filter(|i| i.enabled)
    }

    pub fn iter_enabled(&self) -> impl Iterator<Item = &EigrpInterface<A>> {
        self.ifaces.iter().filter(|i| i.enabled)
    }

    pub fn enabled_ids(&self) -> Vec<IfaceId> {
        self.iter_enabled().map(|i| i.id).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EigrpInterface<A>> {
        self.ifaces.iter()
    }
}
