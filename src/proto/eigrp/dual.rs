//! DUAL finite-state machine.
//!
//! A route's state is its query origin plus its reply status table. Every
//! input goes through [`Dual::process_event`], which dispatches to one of five
//! per-state handlers; each handler maps (event, guard) to one of the 18
//! numbered transitions of the published DUAL automaton. The numbering is kept
//! so the code can be audited against that description.
//!
//! DUAL owns no state. It reads and mutates the topology table and asks the
//! protocol-dependent module to send messages through [`DualPdm`].

use std::fmt;
use std::marker::PhantomData;

use tracing::{debug, trace, warn};

use super::addr::AddressFamily;
use super::message::Receiver;
use super::metric::{METRIC_INF, MetricParams};
use super::neighbor::NeighborId;
use super::topology::{QueryOrigin, Route, RouteId, RouteUpdate, SourceId, TopologyTable};

/// DUAL input events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DualEvent {
    RecvUpdate,
    RecvQuery,
    RecvReply,
    NeighborDown,
    InterfaceDown,
    InterfaceUp,
    /// An installed path was deleted from the routing table by someone else.
    LostRoute,
}

impl DualEvent {
    pub fn describe(self) -> &'static str {
        match self {
            DualEvent::RecvUpdate => "received Update",
            DualEvent::RecvQuery => "received Query",
            DualEvent::RecvReply => "received Reply",
            DualEvent::NeighborDown => "neighbor down",
            DualEvent::InterfaceDown => "interface down",
            DualEvent::InterfaceUp => "interface up",
            DualEvent::LostRoute => "route deletion",
        }
    }
}

impl fmt::Display for DualEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// Result of building a reply status table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplyStatus {
    /// At least one neighbor must answer; the route goes active.
    pub go_active: bool,
    pub neighbors: usize,
    pub stubs: usize,
}

/// Services DUAL needs from the protocol-dependent module.
pub trait DualPdm<A: AddressFamily> {
    fn topology(&self) -> &TopologyTable<A>;
    fn topology_mut(&mut self) -> &mut TopologyTable<A>;

    fn send_update(
        &mut self,
        dest: Receiver,
        route: RouteId,
        source: SourceId,
        force_poison_rev: bool,
        reason: &str,
    );

    fn send_query(
        &mut self,
        dest: Receiver,
        route: RouteId,
        source: SourceId,
        force_poison_rev: bool,
    );

    fn send_reply(
        &mut self,
        route: RouteId,
        dest: NeighborId,
        source: SourceId,
        force_poison_rev: bool,
        is_unreachable: bool,
    );

    fn update_route(&mut self, route: RouteId, dmin: u64, remove_unreachable: bool) -> RouteUpdate;

    fn find_route_dmin(&self, route: RouteId) -> u64 {
        self.topology().find_route_dmin(route)
    }

    fn has_feasible_successor(&self, route: RouteId) -> (bool, u64) {
        self.topology().has_feasible_successor(route)
    }

    fn best_successor(&self, route: RouteId) -> Option<SourceId> {
        self.topology().best_successor(route)
    }

    fn set_reply_status_table(
        &mut self,
        route: RouteId,
        source: SourceId,
        force_poison_rev: bool,
    ) -> ReplyStatus;

    fn has_neighbor_for_update(&self, source: SourceId) -> bool;

    fn set_delayed_remove(&mut self, neighbor: NeighborId, source: SourceId);

    fn send_update_to_stubs(
        &mut self,
        successor: Option<SourceId>,
        old_successor: Option<SourceId>,
        route: RouteId,
    );
}

pub struct Dual<'a, A, P> {
    pdm: &'a mut P,
    _af: PhantomData<A>,
}

impl<'a, A: AddressFamily, P: DualPdm<A>> Dual<'a, A, P> {
    pub fn new(pdm: &'a mut P) -> Self {
        Self {
            pdm,
            _af: PhantomData,
        }
    }

    // Small lookups. A source or route that was purged reads as "absent".

    fn route(&self, id: RouteId) -> Option<&Route<A>> {
        self.pdm.topology().route(id)
    }

    fn with_route(&mut self, id: RouteId, f: impl FnOnce(&mut Route<A>)) {
        if let Some(r) = self.pdm.topology_mut().route_mut(id) {
            f(r);
        }
    }

    fn dij(&self, id: RouteId) -> u64 {
        self.route(id).map_or(METRIC_INF, |r| r.dij)
    }

    fn reply_sum(&self, id: RouteId) -> usize {
        self.route(id).map_or(0, |r| r.reply_status_sum())
    }

    fn unset_reply_status(&mut self, id: RouteId, neighbor: NeighborId) -> bool {
        self.pdm
            .topology_mut()
            .route_mut(id)
            .is_some_and(|r| r.unset_reply_status(neighbor))
    }

    fn is_successor(&self, s: SourceId) -> bool {
        self.pdm.topology().source(s).is_some_and(|s| s.successor)
    }

    fn is_unreachable(&self, s: SourceId) -> bool {
        self.pdm.topology().source(s).is_none_or(|s| s.is_unreachable())
    }

    fn next_hop_of(&self, s: SourceId) -> NeighborId {
        self.pdm
            .topology()
            .source(s)
            .map_or(NeighborId::CONNECTED, |s| s.next_hop_id)
    }

    fn metric_of(&self, s: SourceId) -> (u64, MetricParams) {
        self.pdm
            .topology()
            .source(s)
            .map_or((METRIC_INF, MetricParams::unreachable()), |s| {
                (s.metric, s.metric_params)
            })
    }

    fn invalidate(&mut self, s: SourceId) {
        if let Some(src) = self.pdm.topology_mut().source_mut(s) {
            if src.is_valid() {
                trace!(source = s.0, "source invalidated");
                src.set_valid(false);
            }
        }
    }

    fn log(&self, transition: u8, route: RouteId, event: DualEvent) {
        if let Some(r) = self.route(route) {
            debug!(
                transition,
                route = %r.prefix(),
                qo = %r.query_origin,
                replies = r.reply_status_sum(),
                fd = r.fd,
                dij = r.dij,
                %event,
                "DUAL transition"
            );
        }
    }

    /// Sole entry point of the automaton.
    #[tracing::instrument(skip(self), fields(source = source.0, neighbor = %neighbor))]
    pub fn process_event(
        &mut self,
        event: DualEvent,
        source: SourceId,
        neighbor: NeighborId,
        is_source_new: bool,
    ) {
        let Some(route_id) = self.pdm.topology().source(source).map(|s| s.route_id) else {
            warn!(%event, "event for unknown route source ignored");
            return;
        };

        if matches!(event, DualEvent::NeighborDown | DualEvent::InterfaceDown) {
            if let Some(src) = self.pdm.topology_mut().source_mut(source) {
                src.set_unreachable_metric();
            }
        }

        let Some(route) = self.route(route_id) else {
            warn!(%event, route = route_id.0, "event for unknown route ignored");
            return;
        };
        let qo = route.query_origin;
        let active = route.is_active();

        match qo {
            QueryOrigin::Qo0 => self.process_qo0(event, source, route_id, neighbor, is_source_new),
            QueryOrigin::Qo1 if !active => {
                self.process_qo1_passive(event, source, route_id, neighbor)
            }
            QueryOrigin::Qo1 => {
                self.process_qo1_active(event, source, route_id, neighbor, is_source_new)
            }
            QueryOrigin::Qo2 => self.process_qo2(event, source, route_id, neighbor, is_source_new),
            QueryOrigin::Qo3 => self.process_qo3(event, source, route_id, neighbor, is_source_new),
        }
    }

    // ---- per-state handlers ------------------------------------------------

    fn process_qo0(
        &mut self,
        event: DualEvent,
        source: SourceId,
        route: RouteId,
        neighbor: NeighborId,
        is_source_new: bool,
    ) {
        match event {
            DualEvent::InterfaceUp | DualEvent::RecvUpdate => {
                self.transition7(event, source, route, neighbor)
            }
            DualEvent::RecvQuery => {
                if self.is_successor(source) {
                    self.transition5(event, source, route, neighbor);
                } else {
                    self.transition6(event, source, route, neighbor);
                }
            }
            DualEvent::RecvReply | DualEvent::NeighborDown | DualEvent::InterfaceDown => {
                if self.unset_reply_status(route, neighbor) {
                    if self.reply_sum(route) == 0 {
                        let (has_fs, dmin) = self.pdm.has_feasible_successor(route);
                        if has_fs {
                            self.transition14(event, source, route, dmin, neighbor);
                        } else {
                            self.transition11(event, source, route, dmin, neighbor);
                        }
                    } else {
                        self.transition8(event, source, route, neighbor, is_source_new);
                    }
                }
            }
            DualEvent::LostRoute => {}
        }
    }

    fn process_qo1_passive(
        &mut self,
        event: DualEvent,
        source: SourceId,
        route: RouteId,
        neighbor: NeighborId,
    ) {
        match event {
            DualEvent::LostRoute
            | DualEvent::InterfaceUp
            | DualEvent::RecvUpdate
            | DualEvent::NeighborDown
            | DualEvent::InterfaceDown => {
                if event == DualEvent::LostRoute {
                    // Forces every source to fail the feasibility check.
                    self.with_route(route, |r| r.fd = 0);
                }
                let (has_fs, dmin) = self.pdm.has_feasible_successor(route);
                if has_fs {
                    self.transition2(event, source, route, dmin, neighbor);
                } else {
                    self.transition4(event, source, route, dmin, neighbor);
                }
            }
            DualEvent::RecvQuery => {
                let num_succ = self.route(route).map_or(0, |r| r.num_successors);
                let (has_fs, dmin) = self.pdm.has_feasible_successor(route);
                if num_succ == 0 || has_fs {
                    if self.is_successor(source) {
                        self.transition2(event, source, route, dmin, neighbor);
                    } else {
                        self.transition1(event, source, route, dmin, neighbor);
                    }
                } else if self.is_successor(source) {
                    self.transition3(event, source, route, dmin, neighbor);
                } else {
                    self.transition4(event, source, route, dmin, neighbor);
                }
            }
            DualEvent::RecvReply => {
                trace!(%event, "reply for passive route ignored");
            }
        }
    }

    fn process_qo1_active(
        &mut self,
        event: DualEvent,
        source: SourceId,
        route: RouteId,
        neighbor: NeighborId,
        is_source_new: bool,
    ) {
        match event {
            DualEvent::InterfaceUp => self.transition17(event, source, route, neighbor),
            DualEvent::RecvUpdate => {
                if self.is_successor(source) {
                    self.transition9(event, source, route, neighbor);
                } else {
                    self.transition17(event, source, route, neighbor);
                }
            }
            DualEvent::RecvQuery => {
                if self.is_successor(source) {
                    self.transition5(event, source, route, neighbor);
                } else {
                    self.transition6(event, source, route, neighbor);
                }
            }
            DualEvent::RecvReply => {
                if self.unset_reply_status(route, neighbor) {
                    if self.reply_sum(route) == 0 {
                        self.transition15(event, source, route, neighbor);
                    } else {
                        self.transition18(event, source, route, neighbor, is_source_new);
                    }
                }
            }
            DualEvent::NeighborDown | DualEvent::InterfaceDown => {
                // Loss of the successor (transition 9) takes precedence over
                // the last-reply check; with no reply owed 9 finishes the
                // computation itself.
                let had_status = self.unset_reply_status(route, neighbor);
                if self.is_successor(source) {
                    let last = self.reply_sum(route) == 0;
                    self.transition9(event, source, route, neighbor);
                    if !last && had_status {
                        self.transition18(event, source, route, neighbor, is_source_new);
                    }
                    return;
                }
                if self.reply_sum(route) == 0 {
                    self.transition15(event, source, route, neighbor);
                } else if had_status {
                    self.transition18(event, source, route, neighbor, is_source_new);
                }
            }
            DualEvent::LostRoute => {}
        }
    }

    fn process_qo2(
        &mut self,
        event: DualEvent,
        source: SourceId,
        route: RouteId,
        neighbor: NeighborId,
        is_source_new: bool,
    ) {
        match event {
            DualEvent::InterfaceUp | DualEvent::RecvUpdate => {
                self.transition7(event, source, route, neighbor)
            }
            DualEvent::RecvQuery => {
                if self.is_successor(source) {
                    self.query_from_successor_while_active(route, neighbor);
                }
                self.transition6(event, source, route, neighbor);
            }
            DualEvent::RecvReply | DualEvent::NeighborDown | DualEvent::InterfaceDown => {
                if self.unset_reply_status(route, neighbor) {
                    if self.reply_sum(route) == 0 {
                        let (has_fs, dmin) = self.pdm.has_feasible_successor(route);
                        if has_fs {
                            self.transition16(event, source, route, dmin, neighbor);
                        } else {
                            self.transition12(event, source, route, dmin, neighbor);
                        }
                    } else {
                        self.transition8(event, source, route, neighbor, is_source_new);
                    }
                }
            }
            DualEvent::LostRoute => {}
        }
    }

    fn process_qo3(
        &mut self,
        event: DualEvent,
        source: SourceId,
        route: RouteId,
        neighbor: NeighborId,
        is_source_new: bool,
    ) {
        match event {
            DualEvent::InterfaceUp => self.transition17(event, source, route, neighbor),
            DualEvent::RecvUpdate => {
                if self.is_successor(source) {
                    self.transition10(event, source, route, neighbor);
                } else {
                    self.transition17(event, source, route, neighbor);
                }
            }
            DualEvent::RecvQuery => {
                if self.is_successor(source) {
                    self.query_from_successor_while_active(route, neighbor);
                }
                self.transition6(event, source, route, neighbor);
            }
            DualEvent::RecvReply => {
                if self.unset_reply_status(route, neighbor) {
                    if self.reply_sum(route) == 0 {
                        self.transition13(event, source, route, neighbor);
                    } else {
                        self.transition18(event, source, route, neighbor, is_source_new);
                    }
                }
            }
            DualEvent::NeighborDown | DualEvent::InterfaceDown => {
                // Same ordering as in the QO 1 active handler, with 10 and 13.
                let had_status = self.unset_reply_status(route, neighbor);
                if self.is_successor(source) {
                    let last = self.reply_sum(route) == 0;
                    self.transition10(event, source, route, neighbor);
                    if !last && had_status {
                        self.transition18(event, source, route, neighbor, is_source_new);
                    }
                    return;
                }
                if self.reply_sum(route) == 0 {
                    self.transition13(event, source, route, neighbor);
                } else if had_status {
                    self.transition18(event, source, route, neighbor, is_source_new);
                }
            }
            DualEvent::LostRoute => {}
        }
    }

    /// A successor querying us while we wait for its own computation to end
    /// cannot come from a conforming peer.
    fn query_from_successor_while_active(&self, route: RouteId, neighbor: NeighborId) {
        let (prefix, qo) = self
            .route(route)
            .map(|r| (r.prefix().to_string(), r.query_origin))
            .unwrap_or_else(|| (String::from("?"), QueryOrigin::Qo1));
        panic!(
            "DUAL protocol violation: Query from successor {neighbor} for {prefix} while active with QO {qo}"
        );
    }

    // ---- transitions -------------------------------------------------------

    fn send_update_after_change(
        &mut self,
        route: RouteId,
        successor: SourceId,
        rtable_changed: bool,
        old_dij: u64,
    ) {
        if !self.pdm.has_neighbor_for_update(successor) {
            return;
        }
        if rtable_changed {
            self.pdm
                .send_update(Receiver::All, route, successor, true, "RT changed");
        } else if self.dij(route) != old_dij {
            // Split horizon only, unless the path is our own interface.
            let force_poison_rev = self.next_hop_of(successor) == NeighborId::CONNECTED;
            self.pdm.send_update(
                Receiver::All,
                route,
                successor,
                force_poison_rev,
                "metric changed",
            );
        }
    }

    /// Passive, feasible (or no successor at all): answer a non-successor's query.
    fn transition1(
        &mut self,
        event: DualEvent,
        source: SourceId,
        route: RouteId,
        _dmin: u64,
        neighbor: NeighborId,
    ) {
        self.log(1, route, event);
        match self.pdm.best_successor(route) {
            Some(succ) => self.pdm.send_reply(route, neighbor, succ, false, false),
            None => self.pdm.send_reply(route, neighbor, source, false, true),
        }
        if self.is_unreachable(source) {
            // Removed once the neighbor acks the reply.
            self.pdm.set_delayed_remove(neighbor, source);
        }
    }

    /// Passive and stays passive: a feasible successor takes over locally.
    fn transition2(
        &mut self,
        event: DualEvent,
        source: SourceId,
        route: RouteId,
        dmin: u64,
        neighbor: NeighborId,
    ) {
        self.log(2, route, event);
        let old_dij = self.dij(route);
        let RouteUpdate {
            successor,
            rtable_changed,
        } = self.pdm.update_route(route, dmin, false);

        if event == DualEvent::RecvQuery {
            match successor {
                Some(succ) => {
                    let poison = neighbor == self.next_hop_of(succ);
                    self.pdm.send_reply(route, neighbor, succ, poison, false);
                }
                None => {
                    warn!(route = route.0, "no successor after feasible update, replying unreachable");
                    self.pdm.send_reply(route, neighbor, source, false, true);
                }
            }
            if self.is_unreachable(source) {
                self.pdm.set_delayed_remove(neighbor, source);
            }
        } else if self.is_unreachable(source) {
            // No reply goes out, nothing to wait for.
            self.invalidate(source);
        }

        if let Some(succ) = successor {
            self.send_update_after_change(route, succ, rtable_changed, old_dij);
        }
    }

    /// Passive to active (QO 3): our successor queried and nothing is feasible.
    fn transition3(
        &mut self,
        event: DualEvent,
        source: SourceId,
        route: RouteId,
        _dmin: u64,
        neighbor: NeighborId,
    ) {
        self.log(3, route, event);
        let (_, params) = self.metric_of(source);
        self.with_route(route, |r| {
            r.query_origin = QueryOrigin::Qo3;
            // Dij stays; the passive transition compares against it.
            r.rd_par = params;
            r.fd = r.dij;
        });

        let status = self.pdm.set_reply_status_table(route, source, false);
        if status.go_active {
            self.pdm.send_query(Receiver::All, route, source, false);
        } else {
            self.transition13(event, source, route, neighbor);
        }
    }

    /// Passive to active (QO 1): start our own diffusing computation.
    fn transition4(
        &mut self,
        event: DualEvent,
        source: SourceId,
        route: RouteId,
        _dmin: u64,
        neighbor: NeighborId,
    ) {
        self.log(4, route, event);
        let old_successor = self.pdm.best_successor(route).unwrap_or(source);
        let (metric, params) = self.metric_of(old_successor);

        self.with_route(route, |r| {
            r.query_origin = QueryOrigin::Qo1;
            if event == DualEvent::LostRoute {
                r.set_unreachable();
            } else {
                r.dij = metric;
                r.rd_par = params;
            }
            r.fd = r.dij;
        });

        if event == DualEvent::RecvQuery {
            self.pdm
                .send_reply(route, neighbor, old_successor, false, false);
        }

        let status = self.pdm.set_reply_status_table(route, source, true);
        if status.go_active {
            self.pdm.send_query(Receiver::All, route, old_successor, true);
        } else {
            self.transition15(event, source, route, neighbor);
        }
    }

    /// Active: the successor queried; remember it (QO 2).
    fn transition5(&mut self, event: DualEvent, _source: SourceId, route: RouteId, _neighbor: NeighborId) {
        self.log(5, route, event);
        self.with_route(route, |r| r.query_origin = QueryOrigin::Qo2);
    }

    /// Active: answer a non-successor's query with the pre-computation distance.
    fn transition6(&mut self, event: DualEvent, source: SourceId, route: RouteId, neighbor: NeighborId) {
        self.log(6, route, event);
        match self.pdm.best_successor(route) {
            Some(old) => {
                let poison = self.is_successor(source);
                self.pdm.send_reply(route, neighbor, old, poison, false);
            }
            None => {
                debug!(route = route.0, "active route without successor, replying unreachable");
                self.pdm.send_reply(route, neighbor, source, false, true);
            }
        }
    }

    /// Active: distance change through a non-successor. Dij is left alone
    /// until the computation ends.
    fn transition7(&mut self, event: DualEvent, _source: SourceId, route: RouteId, _neighbor: NeighborId) {
        self.log(7, route, event);
    }

    /// Active: a reply that is not the last one.
    fn transition8(
        &mut self,
        event: DualEvent,
        source: SourceId,
        route: RouteId,
        _neighbor: NeighborId,
        is_source_new: bool,
    ) {
        self.log(8, route, event);
        if self.is_unreachable(source) && is_source_new {
            self.invalidate(source);
        }
    }

    /// Active QO 1: successor's distance changed; QO becomes 0.
    fn transition9(&mut self, event: DualEvent, source: SourceId, route: RouteId, neighbor: NeighborId) {
        self.log(9, route, event);
        let (metric, _) = self.metric_of(source);
        self.with_route(route, |r| {
            r.query_origin = QueryOrigin::Qo0;
            r.dij = metric;
        });

        if self.reply_sum(route) == 0 {
            let (has_fs, dmin) = self.pdm.has_feasible_successor(route);
            if has_fs {
                self.transition14(event, source, route, dmin, neighbor);
            } else {
                self.transition11(event, source, route, dmin, neighbor);
            }
        }
    }

    /// Active QO 3: successor's distance changed; QO becomes 2.
    fn transition10(&mut self, event: DualEvent, source: SourceId, route: RouteId, neighbor: NeighborId) {
        self.log(10, route, event);
        let (metric, _) = self.metric_of(source);
        self.with_route(route, |r| {
            r.query_origin = QueryOrigin::Qo2;
            r.dij = metric;
        });

        if self.reply_sum(route) == 0 {
            let (has_fs, dmin) = self.pdm.has_feasible_successor(route);
            if has_fs {
                self.transition16(event, source, route, dmin, neighbor);
            } else {
                self.transition12(event, source, route, dmin, neighbor);
            }
        }
    }

    /// Last reply, QO 0, not feasible: start a new computation (QO 1).
    fn transition11(
        &mut self,
        event: DualEvent,
        source: SourceId,
        route: RouteId,
        _dmin: u64,
        neighbor: NeighborId,
    ) {
        self.log(11, route, event);
        self.with_route(route, |r| r.query_origin = QueryOrigin::Qo1);

        let status = self.pdm.set_reply_status_table(route, source, false);
        if status.go_active {
            // A restarted computation always poisons toward the old successor.
            self.pdm.send_query(Receiver::All, route, source, true);
        } else {
            self.transition15(event, source, route, neighbor);
        }
    }

    /// Last reply, QO 2, not feasible: start a new computation (QO 3).
    fn transition12(
        &mut self,
        event: DualEvent,
        source: SourceId,
        route: RouteId,
        _dmin: u64,
        neighbor: NeighborId,
    ) {
        self.log(12, route, event);
        self.with_route(route, |r| r.query_origin = QueryOrigin::Qo3);

        let status = self.pdm.set_reply_status_table(route, source, false);
        if status.go_active {
            self.pdm.send_query(Receiver::All, route, source, false);
        } else {
            self.transition13(event, source, route, neighbor);
        }
    }

    /// Last reply, QO 3: back to passive and answer the old successor.
    fn transition13(&mut self, event: DualEvent, source: SourceId, route: RouteId, _neighbor: NeighborId) {
        self.log(13, route, event);
        let old_successor = self.pdm.best_successor(route);
        let old_dij = self.dij(route);

        self.with_route(route, |r| {
            r.query_origin = QueryOrigin::Qo1;
            r.fd = METRIC_INF;
        });
        let dmin = self.pdm.find_route_dmin(route);
        let RouteUpdate {
            successor,
            rtable_changed,
        } = self.pdm.update_route(route, dmin, true);
        if self.is_unreachable(source) {
            self.invalidate(source);
        }

        if let Some(old) = old_successor {
            let old_nh = self.next_hop_of(old);
            match successor {
                None => {
                    if self.is_unreachable(old) {
                        self.pdm.set_delayed_remove(old_nh, old);
                    }
                    self.pdm.send_reply(route, old_nh, old, true, false);
                }
                Some(succ) => self.pdm.send_reply(route, old_nh, succ, true, false),
            }
        }

        if let Some(succ) = successor {
            self.send_update_after_change(route, succ, rtable_changed, old_dij);
        }
        self.pdm.send_update_to_stubs(successor, old_successor, route);
    }

    /// Last reply, QO 0, feasible: back to passive.
    fn transition14(
        &mut self,
        event: DualEvent,
        source: SourceId,
        route: RouteId,
        dmin: u64,
        _neighbor: NeighborId,
    ) {
        self.log(14, route, event);
        let old_dij = self.dij(route);
        self.with_route(route, |r| r.query_origin = QueryOrigin::Qo1);
        let old_successor = self.pdm.best_successor(route);

        let RouteUpdate {
            successor,
            rtable_changed,
        } = self.pdm.update_route(route, dmin, true);
        if self.is_unreachable(source) {
            self.invalidate(source);
        }

        if let Some(succ) = successor {
            self.send_update_after_change(route, succ, rtable_changed, old_dij);
        }
        self.pdm.send_update_to_stubs(successor, old_successor, route);
    }

    /// Last reply, QO 1: back to passive with whatever is left.
    fn transition15(&mut self, event: DualEvent, source: SourceId, route: RouteId, _neighbor: NeighborId) {
        self.log(15, route, event);
        let old_dij = self.dij(route);
        self.with_route(route, |r| r.fd = METRIC_INF);

        let Some(old_successor) = self.pdm.best_successor(route) else {
            trace!(route = route.0, "no old successor, nothing to finalize");
            return;
        };

        let dmin = self.pdm.find_route_dmin(route);
        let RouteUpdate {
            successor,
            rtable_changed,
        } = self.pdm.update_route(route, dmin, true);
        if self.is_unreachable(source) {
            self.invalidate(source);
        }

        if let Some(succ) = successor {
            self.send_update_after_change(route, succ, rtable_changed, old_dij);
        }
        self.pdm
            .send_update_to_stubs(successor, Some(old_successor), route);
    }

    /// Last reply, QO 2, feasible: back to passive and answer the old successor.
    fn transition16(
        &mut self,
        event: DualEvent,
        source: SourceId,
        route: RouteId,
        dmin: u64,
        _neighbor: NeighborId,
    ) {
        self.log(16, route, event);
        let old_successor = self.pdm.best_successor(route);
        let old_dij = self.dij(route);
        self.with_route(route, |r| r.query_origin = QueryOrigin::Qo1);

        let RouteUpdate {
            successor,
            rtable_changed,
        } = self.pdm.update_route(route, dmin, true);
        if self.is_unreachable(source) {
            self.invalidate(source);
        }

        match (successor, old_successor) {
            (Some(succ), old) => {
                if let Some(old) = old {
                    let old_nh = self.next_hop_of(old);
                    self.pdm.send_reply(route, old_nh, succ, true, false);
                }
                self.send_update_after_change(route, succ, rtable_changed, old_dij);
            }
            (None, Some(old)) => {
                // The feasible path could not be installed.
                warn!(route = route.0, "no successor installed on return to passive");
                let old_nh = self.next_hop_of(old);
                if self.is_unreachable(old) {
                    self.pdm.set_delayed_remove(old_nh, old);
                }
                self.pdm.send_reply(route, old_nh, old, true, false);
            }
            (None, None) => {}
        }
        self.pdm.send_update_to_stubs(successor, old_successor, route);
    }

    /// Active: distance change or interface up; no bookkeeping.
    fn transition17(&mut self, event: DualEvent, _source: SourceId, route: RouteId, _neighbor: NeighborId) {
        self.log(17, route, event);
    }

    /// Active: a reply that is not the last one.
    fn transition18(
        &mut self,
        event: DualEvent,
        source: SourceId,
        route: RouteId,
        _neighbor: NeighborId,
        is_source_new: bool,
    ) {
        self.log(18, route, event);
        if self.is_unreachable(source) && is_source_new {
            self.invalidate(source);
        }
    }
}
