//! Topology table.
//!
//! Destinations ([`Route`]) and the candidate paths to them ([`RouteSource`])
//! live in one arena keyed by stable integer IDs. Sources are soft-deleted by
//! clearing `valid` and physically removed only at purge points; a route goes
//! away once nothing references it, it is passive and no queued message still
//! names it.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;
use tracing::trace;

use super::addr::{AddressFamily, Prefix, RouterId};
use super::metric::{METRIC_INF, MetricParams};
use super::neighbor::NeighborId;
use crate::net::{IfaceId, RemoveOutcome, RoutingTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct RouteId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SourceId(pub u32);

/// DUAL query origin flag.
///
/// Together with the reply status table it selects the handler for the next
/// event. `Qo1` with no outstanding replies is the passive state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum QueryOrigin {
    Qo0,
    Qo1,
    Qo2,
    Qo3,
}

impl QueryOrigin {
    pub fn as_u8(self) -> u8 {
        match self {
            QueryOrigin::Qo0 => 0,
            QueryOrigin::Qo1 => 1,
            QueryOrigin::Qo2 => 2,
            QueryOrigin::Qo3 => 3,
        }
    }
}

impl fmt::Display for QueryOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Route<A> {
    pub id: RouteId,
    pub address: A,
    pub prefix_len: u8,
    /// Feasible distance.
    pub fd: u64,
    /// Distance through the current best path.
    pub dij: u64,
    /// Parameters of the current best path; what gets advertised.
    pub rd_par: MetricParams,
    pub query_origin: QueryOrigin,
    reply_status: BTreeSet<NeighborId>,
    pub successor: Option<SourceId>,
    pub num_successors: usize,
    ref_count: usize,
    pending_msgs: usize,
}

impl<A: AddressFamily> Route<A> {
    fn new(id: RouteId, address: A, prefix_len: u8) -> Self {
        Self {
            id,
            address,
            prefix_len,
            fd: METRIC_INF,
            dij: METRIC_INF,
            rd_par: MetricParams::unreachable(),
            query_origin: QueryOrigin::Qo1,
            reply_status: BTreeSet::new(),
            successor: None,
            num_successors: 0,
            ref_count: 0,
            pending_msgs: 0,
        }
    }

    pub fn prefix(&self) -> Prefix<A> {
        Prefix(self.address, self.prefix_len)
    }

    pub fn is_active(&self) -> bool {
        !self.reply_status.is_empty()
    }

    pub fn reply_status_sum(&self) -> usize {
        self.reply_status.len()
    }

    pub fn reply_status(&self) -> impl Iterator<Item = NeighborId> + '_ {
        self.reply_status.iter().copied()
    }

    pub fn has_reply_status(&self, neigh: NeighborId) -> bool {
        self.reply_status.contains(&neigh)
    }

    pub fn set_reply_status(&mut self, neigh: NeighborId) {
        self.reply_status.insert(neigh);
    }

    /// Returns true when the neighbor was actually outstanding.
    pub fn unset_reply_status(&mut self, neigh: NeighborId) -> bool {
        self.reply_status.remove(&neigh)
    }

    pub fn set_unreachable(&mut self) {
        self.dij = METRIC_INF;
        self.rd_par = MetricParams::unreachable();
    }

    pub fn ref_count(&self) -> usize {
        self.ref_count
    }

    pub fn pending_msgs(&self) -> usize {
        self.pending_msgs
    }

    pub(crate) fn lock(&mut self) {
        self.pending_msgs += 1;
    }

    pub(crate) fn unlock(&mut self) {
        self.pending_msgs = self.pending_msgs.saturating_sub(1);
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RouteSource<A> {
    pub id: SourceId,
    pub route_id: RouteId,
    /// [`NeighborId::CONNECTED`] for the router's own interface network.
    pub next_hop_id: NeighborId,
    pub next_hop: A,
    pub iface: IfaceId,
    pub originator: RouterId,
    /// Reported distance.
    pub rd: u64,
    pub rd_params: MetricParams,
    pub metric: u64,
    pub metric_params: MetricParams,
    pub successor: bool,
    valid: bool,
    pub delayed_remove: Option<NeighborId>,
}

impl<A: AddressFamily> RouteSource<A> {
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn set_valid(&mut self, valid: bool) {
        self.valid = valid;
    }

    pub fn is_unreachable(&self) -> bool {
        self.metric == METRIC_INF
    }

    pub fn set_unreachable_metric(&mut self) {
        self.metric_params.set_unreachable();
        self.metric = METRIC_INF;
    }

    pub fn is_connected(&self) -> bool {
        self.next_hop_id == NeighborId::CONNECTED
    }
}

/// Limits applied while choosing successors.
#[derive(Debug, Clone, Copy)]
pub struct SuccessorPolicy {
    pub variance: u32,
    pub maximum_path: usize,
    pub admin_distance: u8,
}

/// Outcome of [`TopologyTable::update_route`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteUpdate {
    pub successor: Option<SourceId>,
    pub rtable_changed: bool,
}

#[derive(Debug, Clone)]
pub struct TopologyTable<A> {
    router_id: RouterId,
    routes: BTreeMap<RouteId, Route<A>>,
    sources: Vec<RouteSource<A>>,
    next_route_id: u32,
    next_source_id: u32,
}

impl<A: AddressFamily> TopologyTable<A> {
    pub fn new(router_id: RouterId) -> Self {
        Self {
            router_id,
            routes: BTreeMap::new(),
            sources: Vec::new(),
            next_route_id: 1,
            next_source_id: 1,
        }
    }

    pub fn router_id(&self) -> RouterId {
        self.router_id
    }

    pub fn route(&self, id: RouteId) -> Option<&Route<A>> {
        self.routes.get(&id)
    }

    pub fn route_mut(&mut self, id: RouteId) -> Option<&mut Route<A>> {
        self.routes.get_mut(&id)
    }

    pub fn source(&self, id: SourceId) -> Option<&RouteSource<A>> {
        self.sources.iter().find(|s| s.id == id)
    }

    pub fn source_mut(&mut self, id: SourceId) -> Option<&mut RouteSource<A>> {
        self.sources.iter_mut().find(|s| s.id == id)
    }

    pub fn routes(&self) -> impl Iterator<Item = &Route<A>> {
        self.routes.values()
    }

    pub fn route_ids(&self) -> Vec<RouteId> {
        self.routes.keys().copied().collect()
    }

    /// All sources in table order, including not yet purged invalid ones.
    pub fn sources(&self) -> impl Iterator<Item = &RouteSource<A>> {
        self.sources.iter()
    }

    pub fn num_routes(&self) -> usize {
        self.routes.len()
    }

    pub fn num_sources(&self) -> usize {
        self.sources.len()
    }

    /// Valid sources of a route.
    pub fn sources_of(&self, route: RouteId) -> impl Iterator<Item = &RouteSource<A>> {
        self.sources
            .iter()
            .filter(move |s| s.route_id == route && s.valid)
    }

    pub fn source_ids_of(&self, route: RouteId) -> Vec<SourceId> {
        self.sources_of(route).map(|s| s.id).collect()
    }

    pub fn find_route(&self, address: A, prefix_len: u8) -> Option<RouteId> {
        self.routes
            .values()
            .find(|r| r.address == address && r.prefix_len == prefix_len)
            .map(|r| r.id)
    }

    pub fn find_source(&self, route: RouteId, next_hop_id: NeighborId) -> Option<SourceId> {
        self.sources
            .iter()
            .find(|s| s.route_id == route && s.next_hop_id == next_hop_id && s.valid)
            .map(|s| s.id)
    }

    pub fn find_source_by_prefix(
        &self,
        address: A,
        prefix_len: u8,
        next_hop_id: NeighborId,
    ) -> Option<SourceId> {
        let route = self.find_route(address, prefix_len)?;
        self.find_source(route, next_hop_id)
    }

    /// Looks up the path `(address/prefix_len via next_hop_id)`, creating the
    /// route and/or the source when missing. Returns the source and whether it
    /// was created.
    pub fn find_or_create_route(
        &mut self,
        address: A,
        prefix_len: u8,
        originator: RouterId,
        iface: IfaceId,
        next_hop_id: NeighborId,
        next_hop: A,
    ) -> (SourceId, bool) {
        let route_id = match self.find_route(address, prefix_len) {
            Some(id) => {
                if let Some(sid) = self.find_source(id, next_hop_id) {
                    return (sid, false);
                }
                id
            }
            None => {
                let id = RouteId(self.next_route_id);
                self.next_route_id += 1;
                self.routes.insert(id, Route::new(id, address, prefix_len));
                id
            }
        };

        let id = SourceId(self.next_source_id);
        self.next_source_id += 1;
        let source = RouteSource {
            id,
            route_id,
            next_hop_id,
            next_hop,
            iface,
            originator,
            rd: 0,
            rd_params: MetricParams::unreachable(),
            metric: METRIC_INF,
            metric_params: MetricParams::unreachable(),
            successor: false,
            valid: true,
            delayed_remove: None,
        };
        self.add_source(source);
        trace!(source = id.0, route = route_id.0, next_hop = %next_hop, "new route source");
        (id, true)
    }

    /// Inserts right after the last source of the same route.
    fn add_source(&mut self, source: RouteSource<A>) {
        let route_id = source.route_id;
        let pos = self
            .sources
            .iter()
            .rposition(|s| s.route_id == route_id)
            .map(|i| i + 1)
            .unwrap_or(self.sources.len());
        self.sources.insert(pos, source);
        if let Some(route) = self.routes.get_mut(&route_id) {
            route.ref_count += 1;
        }
    }

    /// Smallest metric among the valid sources of the route.
    pub fn find_route_dmin(&self, route: RouteId) -> u64 {
        self.sources_of(route)
            .map(|s| s.metric)
            .min()
            .unwrap_or(METRIC_INF)
    }

    /// Returns `(has_feasible_successor, dmin)`.
    ///
    /// A source achieving the minimum metric with `rd < fd` makes the route
    /// feasible; a strictly smaller minimum found later resets the verdict.
    pub fn has_feasible_successor(&self, route: RouteId) -> (bool, u64) {
        let Some(fd) = self.routes.get(&route).map(|r| r.fd) else {
            return (false, METRIC_INF);
        };
        let mut dmin = METRIC_INF;
        let mut has_fs = false;
        for s in self.sources_of(route) {
            if s.is_unreachable() {
                continue;
            }
            if s.metric < dmin {
                dmin = s.metric;
                has_fs = s.rd < fd;
            } else if s.metric == dmin && s.rd < fd {
                has_fs = true;
            }
        }
        (has_fs, dmin)
    }

    /// Installed path with the lowest metric; ties go to the lower next hop.
    pub fn best_successor(&self, route: RouteId) -> Option<SourceId> {
        self.sources_of(route)
            .filter(|s| s.successor)
            .min_by(|a, b| a.metric.cmp(&b.metric).then(a.next_hop.cmp(&b.next_hop)))
            .map(|s| s.id)
    }

    pub fn best_successor_by_iface(&self, route: RouteId, iface: IfaceId) -> Option<SourceId> {
        self.sources_of(route)
            .filter(|s| s.successor && s.iface == iface)
            .min_by(|a, b| a.metric.cmp(&b.metric).then(a.next_hop.cmp(&b.next_hop)))
            .map(|s| s.id)
    }

    pub fn num_successors(&self, route: RouteId) -> usize {
        self.sources_of(route).filter(|s| s.successor).count()
    }

    /// Re-selects the successors of a route and syncs them into the host
    /// routing table.
    pub fn update_route(
        &mut self,
        route_id: RouteId,
        dmin: u64,
        remove_unreachable: bool,
        policy: &SuccessorPolicy,
        rib: &mut RoutingTable<A>,
    ) -> RouteUpdate {
        let Some(route) = self.routes.get(&route_id) else {
            return RouteUpdate {
                successor: None,
                rtable_changed: false,
            };
        };
        let (prefix, prefix_len, fd) = (route.address, route.prefix_len, route.fd);
        let threshold = dmin.saturating_mul(u64::from(policy.variance.max(1)));

        let mut paths = 0usize;
        let mut rtable_changed = false;
        let mut lost_successor = Vec::new();

        for source in self
            .sources
            .iter_mut()
            .filter(|s| s.route_id == route_id && s.valid)
        {
            let eligible = !source.is_unreachable()
                && source.rd < fd
                && source.metric <= threshold
                && paths < policy.maximum_path;

            if eligible {
                let in_rib = rib.find(prefix, prefix_len, source.next_hop).is_some();
                if !in_rib && !rib.is_safe_for_add(prefix, prefix_len, policy.admin_distance) {
                    // A better-AD route owns the prefix.
                    source.successor = false;
                } else {
                    if rib.install_eigrp(
                        prefix,
                        prefix_len,
                        source.next_hop,
                        source.iface,
                        source.metric,
                        policy.admin_distance,
                    ) {
                        rtable_changed = true;
                    }
                    paths += 1;
                    source.successor = true;
                }
            } else if source.successor {
                source.successor = false;
                match rib.remove_eigrp(prefix, prefix_len, source.next_hop) {
                    RemoveOutcome::Removed => {
                        rtable_changed = true;
                        lost_successor.push(source.id);
                    }
                    RemoveOutcome::NotFound => lost_successor.push(source.id),
                    RemoveOutcome::Foreign if source.is_connected() => {
                        lost_successor.push(source.id);
                    }
                    RemoveOutcome::Foreign => {
                        // Stays tagged so it is not retried on every pass.
                        source.successor = true;
                    }
                }
            }

            if remove_unreachable
                && source.is_unreachable()
                && source.delayed_remove.is_none()
                && !source.successor
            {
                source.valid = false;
            }
        }

        let best = self.best_successor(route_id);
        let best_data = best.and_then(|id| self.source(id)).map(|s| (s.metric, s.metric_params));
        let num_sources = self.sources_of(route_id).count();

        let Some(route) = self.routes.get_mut(&route_id) else {
            return RouteUpdate {
                successor: None,
                rtable_changed,
            };
        };
        route.num_successors = paths;
        if let Some(cur) = route.successor {
            if lost_successor.contains(&cur) {
                route.successor = None;
            }
        }
        match (best, best_data) {
            (Some(id), Some((metric, params))) => {
                route.successor = Some(id);
                route.fd = route.fd.min(dmin);
                route.dij = dmin;
                route.rd_par = params;
                if num_sources == 1 {
                    route.fd = metric;
                }
            }
            _ => route.successor = None,
        }

        RouteUpdate {
            successor: best,
            rtable_changed,
        }
    }

    fn remove_sources_where(&mut self, mut pred: impl FnMut(&RouteSource<A>) -> bool) -> usize {
        let mut dropped = Vec::new();
        self.sources.retain(|s| {
            if pred(s) {
                dropped.push((s.route_id, s.id));
                false
            } else {
                true
            }
        });
        for (route_id, source_id) in &dropped {
            if let Some(route) = self.routes.get_mut(route_id) {
                route.ref_count = route.ref_count.saturating_sub(1);
                if route.successor == Some(*source_id) {
                    route.successor = None;
                }
            }
        }
        self.routes
            .retain(|_, r| r.ref_count > 0 || r.is_active() || r.pending_msgs > 0);
        dropped.len()
    }

    /// Physically removes invalid sources and the routes left unreferenced.
    pub fn purge(&mut self) -> usize {
        let n = self.remove_sources_where(|s| !s.valid);
        if n > 0 {
            trace!(removed = n, routes = self.routes.len(), "topology table purged");
        }
        n
    }

    /// Drops the unreachable sources whose removal waited for an Ack from `neighbor`.
    pub fn delayed_remove(&mut self, neighbor: NeighborId) -> usize {
        let n = self.remove_sources_where(|s| {
            s.delayed_remove == Some(neighbor) && s.is_unreachable() && !s.successor
        });
        for s in self
            .sources
            .iter_mut()
            .filter(|s| s.delayed_remove == Some(neighbor))
        {
            s.delayed_remove = None;
        }
        n
    }
}
