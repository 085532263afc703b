//! EIGRP messages as they travel through the simulated network, and the
//! transport requests they are built from.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::addr::RouterId;
use super::metric::{KValues, MetricParams};
use super::neighbor::NeighborId;
use super::topology::{RouteId, SourceId};
use crate::net::IfaceId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Opcode {
    Update,
    Request,
    Query,
    Reply,
    Hello,
}

impl Opcode {
    pub fn name(self) -> &'static str {
        match self {
            Opcode::Update => "Update",
            Opcode::Request => "Request",
            Opcode::Query => "Query",
            Opcode::Reply => "Reply",
            Opcode::Hello => "Hello",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Header {
    pub as_number: u16,
    pub seq: u32,
    pub ack: u32,
    pub init: bool,
    pub eot: bool,
    pub conditional_receive: bool,
    pub restart: bool,
}

/// Stub capabilities a router advertises in its Hellos.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StubFlags {
    pub connected: bool,
    pub leak_map: bool,
    pub receive_only: bool,
    pub redistributed: bool,
    pub static_routes: bool,
    pub summary: bool,
}

impl StubFlags {
    pub fn any(&self) -> bool {
        self.connected
            || self.leak_map
            || self.receive_only
            || self.redistributed
            || self.static_routes
            || self.summary
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HelloParams {
    pub hold_interval: u16,
    pub k_values: KValues,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteTlv<A> {
    pub dest: A,
    pub prefix_len: u8,
    /// Unspecified means "the sender".
    pub next_hop: A,
    pub originator: RouterId,
    pub metric: MetricParams,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Body<A> {
    Hello {
        params: HelloParams,
        stub: Option<StubFlags>,
    },
    /// Hello with no parameters and a non-zero ack number.
    Ack,
    Update(Vec<RouteTlv<A>>),
    Query(Vec<RouteTlv<A>>),
    Reply(Vec<RouteTlv<A>>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message<A> {
    pub header: Header,
    pub body: Body<A>,
}

impl<A> Message<A> {
    pub fn opcode(&self) -> Opcode {
        match self.body {
            Body::Hello { .. } | Body::Ack => Opcode::Hello,
            Body::Update(_) => Opcode::Update,
            Body::Query(_) => Opcode::Query,
            Body::Reply(_) => Opcode::Reply,
        }
    }

    /// Label used in logs and statistics.
    pub fn kind(&self) -> &'static str {
        match &self.body {
            Body::Hello { params, .. } if params.k_values.is_goodbye() => "Goodbye",
            Body::Hello { .. } => "Hello",
            Body::Ack => "Ack",
            Body::Update(_) => "Update",
            Body::Query(_) => "Query",
            Body::Reply(_) => "Reply",
        }
    }

    pub fn routes(&self) -> &[RouteTlv<A>] {
        match &self.body {
            Body::Update(r) | Body::Query(r) | Body::Reply(r) => r,
            Body::Hello { .. } | Body::Ack => &[],
        }
    }

    /// Rough wire size used for link serialisation delay.
    pub fn size_bytes(&self) -> u32 {
        const HEADER: u32 = 20 + 20;
        const ROUTE_TLV: u32 = 44;
        match &self.body {
            Body::Hello { stub, .. } => HEADER + 12 + if stub.is_some() { 6 } else { 0 },
            Body::Ack => HEADER,
            Body::Update(r) | Body::Query(r) | Body::Reply(r) => {
                HEADER + ROUTE_TLV * r.len() as u32
            }
        }
    }
}

/// One route reference inside a transport request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MsgRoute {
    pub source: SourceId,
    pub route: RouteId,
    pub originator: RouterId,
    pub unreachable: bool,
}

/// Who a request is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Receiver {
    /// Every neighbor on the interface (multicast).
    All,
    /// Stub neighbors only; never used for diffusing computations.
    Stubs,
    Neighbor(NeighborId),
}

/// What to put in the body of a Hello-class request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelloKind {
    Hello,
    Goodbye,
    Ack,
}

/// Transport-layer request owned by the RTP queue until sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MsgReq {
    pub opcode: Opcode,
    pub hello: HelloKind,
    /// `None` means multicast to all neighbors on the interface.
    pub dest_neighbor: Option<NeighborId>,
    pub dest_iface: IfaceId,
    pub seq: u32,
    pub ack: u32,
    /// Acks still expected for a sent reliable request; 0 before sending.
    pub num_of_ack: usize,
    pub sent: bool,
    pub init: bool,
    pub eot: bool,
    pub routes: Vec<MsgRoute>,
}

impl MsgReq {
    pub fn new(opcode: Opcode, dest_iface: IfaceId, dest_neighbor: Option<NeighborId>) -> Self {
        Self {
            opcode,
            hello: HelloKind::Hello,
            dest_neighbor,
            dest_iface,
            seq: 0,
            ack: 0,
            num_of_ack: 0,
            sent: false,
            init: false,
            eot: false,
            routes: Vec::new(),
        }
    }

    pub fn hello(dest_iface: IfaceId, kind: HelloKind, dest_neighbor: Option<NeighborId>) -> Self {
        Self {
            hello: kind,
            ..Self::new(Opcode::Hello, dest_iface, dest_neighbor)
        }
    }

    /// Hellos, Goodbyes and Acks are unreliable; everything else is acked.
    pub fn is_reliable(&self) -> bool {
        self.opcode != Opcode::Hello
    }

    pub fn is_multicast(&self) -> bool {
        self.dest_neighbor.is_none()
    }

    pub fn find_route(&self, route: RouteId) -> Option<usize> {
        self.routes.iter().position(|r| r.route == route)
    }
}
