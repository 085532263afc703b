//! Neighbor table.

use std::fmt;

use serde::Serialize;

use super::addr::AddressFamily;
use super::message::StubFlags;
use crate::net::IfaceId;
use crate::sim::{EventId, SimTime};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct NeighborId(pub u32);

impl NeighborId {
    /// Next hop ID of directly connected sources.
    pub const CONNECTED: NeighborId = NeighborId(0);
}

impl fmt::Display for NeighborId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Neighbor<A> {
    pub id: NeighborId,
    pub address: A,
    pub iface: IfaceId,
    /// Hold interval the neighbor advertised, in seconds.
    pub hold_interval: u16,
    /// False until the neighbor acknowledges our INIT update.
    pub up: bool,
    /// Last sequence number received from the neighbor.
    pub seq_number: u32,
    /// Sequence number of our reliable message this neighbor still has to ack.
    pub waiting_ack: u32,
    /// Unreachable sources wait for this neighbor's next Ack before removal.
    pub routes_for_deletion: bool,
    pub stub: Option<StubFlags>,
    pub created_at: SimTime,
    #[serde(skip)]
    pub(crate) hold_timer: Option<EventId>,
}

impl<A: AddressFamily> Neighbor<A> {
    pub fn is_stub(&self) -> bool {
        self.stub.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct NeighborTable<A> {
    neighbors: Vec<Neighbor<A>>,
    next_id: u32,
    stub_count: usize,
}

impl<A: AddressFamily> Default for NeighborTable<A> {
    fn default() -> Self {
        Self {
            neighbors: Vec::new(),
            next_id: 1,
            stub_count: 0,
        }
    }
}

impl<A: AddressFamily> NeighborTable<A> {
    pub fn add(
        &mut self,
        address: A,
        iface: IfaceId,
        hold_interval: u16,
        stub: Option<StubFlags>,
        now: SimTime,
    ) -> NeighborId {
        let id = NeighborId(self.next_id);
        self.next_id += 1;
        if stub.is_some() {
            self.stub_count += 1;
        }
        self.neighbors.push(Neighbor {
            id,
            address,
            iface,
            hold_interval,
            up: false,
            seq_number: 0,
            waiting_ack: 0,
            routes_for_deletion: false,
            stub,
            created_at: now,
            hold_timer: None,
        });
        id
    }

    pub fn remove(&mut self, id: NeighborId) -> Option<Neighbor<A>> {
        let idx = self.neighbors.iter().position(|n| n.id == id)?;
        let neigh = self.neighbors.remove(idx);
        if neigh.is_stub() {
            self.stub_count = self.stub_count.saturating_sub(1);
        }
        Some(neigh)
    }

    pub fn get(&self, id: NeighborId) -> Option<&Neighbor<A>> {
        self.neighbors.iter().find(|n| n.id == id)
    }

    pub fn get_mut(&mut self, id: NeighborId) -> Option<&mut Neighbor<A>> {
        self.neighbors.iter_mut().find(|n| n.id == id)
    }

    pub fn find_by_address(&self, address: A) -> Option<&Neighbor<A>> {
        self.neighbors.iter().find(|n| n.address == address)
    }

    pub fn find_by_address_on(&self, address: A, iface: IfaceId) -> Option<&Neighbor<A>> {
        self.neighbors
            .iter()
            .find(|n| n.address == address && n.iface == iface)
    }

    pub fn on_iface(&self, iface: IfaceId) -> impl Iterator<Item = &Neighbor<A>> {
        self.neighbors.iter().filter(move |n| n.iface == iface)
    }

    pub fn on_iface_mut(&mut self, iface: IfaceId) -> impl Iterator<Item = &mut Neighbor<A>> {
        self.neighbors.iter_mut().filter(move |n| n.iface == iface)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Neighbor<A>> {
        self.neighbors.iter()
    }

    pub fn ids(&self) -> Vec<NeighborId> {
        self.neighbors.iter().map(|n| n.id).collect()
    }

    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }

    pub fn stub_count(&self) -> usize {
        self.stub_count
    }
}
