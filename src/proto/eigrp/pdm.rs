//! Protocol-dependent module.
//!
//! Owns every table of one EIGRP process and turns network input (packets,
//! interface changes, timer expiries, routing table deletions) into DUAL
//! events. DUAL answers through [`DualPdm`]; its send requests are coalesced
//! into [`MsgReq`]s per (interface, opcode, neighbor) and handed to RTP at the
//! end of each input, queries first. Whatever RTP releases is built into a
//! [`Message`] and left in the outbox for the host to transmit.

use tracing::{debug, info, trace, warn};

use super::addr::{AddressFamily, Prefix};
use super::config::{InterfaceConfig, ProcessConfig};
use super::dual::{Dual, DualEvent, DualPdm, ReplyStatus};
use super::interface::{EigrpInterface, InterfaceTable};
use super::message::{
    Body, Header, HelloKind, HelloParams, Message, MsgReq, MsgRoute, Opcode, Receiver, RouteTlv,
    StubFlags,
};
use super::metric::{
    BANDWIDTH_INF, DELAY_INF, KValues, MetricParams, adjust_param, compare_parameters,
    compute_classic_metric,
};
use super::neighbor::{Neighbor, NeighborId, NeighborTable};
use super::rtp::{Rtp, RtpAction};
use super::timer::{
    EigrpTimer, TimerScheduler, hello_period, hold_period, initial_hello_jitter,
};
use super::topology::{RouteId, RouteUpdate, SourceId, SuccessorPolicy, TopologyTable};
use crate::net::routing::{RouteOrigin, RoutingTable};
use crate::net::{Datagram, IfaceId};
use crate::sim::SimTime;

/// A message ready for the wire.
#[derive(Debug, Clone)]
pub struct Outbound<A> {
    pub iface: IfaceId,
    pub datagram: Datagram<A>,
}

pub struct Pdm<A: AddressFamily> {
    config: ProcessConfig,
    /// `network` statements; an interface whose address falls in one runs EIGRP.
    networks: Vec<(A, u8)>,
    tt: TopologyTable<A>,
    nt: NeighborTable<A>,
    ift: InterfaceTable<A>,
    rtp: Rtp,
    rib: RoutingTable<A>,
    /// Requests built by DUAL, waiting for the next flush.
    reqs: Vec<MsgReq>,
    /// Requests handed to RTP at the end of the current input.
    to_rtp: Vec<MsgReq>,
    outbox: Vec<Outbound<A>>,
}

impl<A: AddressFamily> Pdm<A> {
    pub fn new(config: ProcessConfig, networks: Vec<(A, u8)>, hash_salt: u64) -> Self {
        let tt = TopologyTable::new(config.router_id);
        Self {
            config,
            networks,
            tt,
            nt: NeighborTable::default(),
            ift: InterfaceTable::default(),
            rtp: Rtp::default(),
            rib: RoutingTable::new(hash_salt),
            reqs: Vec::new(),
            to_rtp: Vec::new(),
            outbox: Vec::new(),
        }
    }

    pub fn config(&self) -> &ProcessConfig {
        &self.config
    }

    pub fn topology(&self) -> &TopologyTable<A> {
        &self.tt
    }

    pub fn neighbors(&self) -> &NeighborTable<A> {
        &self.nt
    }

    pub fn interfaces(&self) -> &InterfaceTable<A> {
        &self.ift
    }

    pub fn rtp(&self) -> &Rtp {
        &self.rtp
    }

    pub fn rib(&self) -> &RoutingTable<A> {
        &self.rib
    }

    pub fn rib_mut(&mut self) -> &mut RoutingTable<A> {
        &mut self.rib
    }

    pub fn take_outbound(&mut self) -> Vec<Outbound<A>> {
        std::mem::take(&mut self.outbox)
    }

    fn is_stub(&self) -> bool {
        self.config.stub.is_some()
    }

    fn policy(&self) -> SuccessorPolicy {
        SuccessorPolicy {
            variance: self.config.variance,
            maximum_path: self.config.maximum_path,
            admin_distance: self.config.admin_distance,
        }
    }

    fn metric(&self, params: &MetricParams) -> u64 {
        compute_classic_metric(params, &self.config.k_values)
    }

    fn is_included(&self, address: A) -> bool {
        self.networks
            .iter()
            .any(|&(net, plen)| address.same_subnet(net, plen))
    }

    fn dual(&mut self, event: DualEvent, source: SourceId, neighbor: NeighborId, is_new: bool) {
        Dual::new(self).process_event(event, source, neighbor, is_new);
    }

    // ---- interfaces --------------------------------------------------------

    /// Registers a router interface. Interfaces outside every `network`
    /// statement are ignored; returns whether EIGRP runs on it.
    pub fn add_interface(
        &mut self,
        id: IfaceId,
        address: A,
        prefix_len: u8,
        mtu: u32,
        cfg: &InterfaceConfig,
        up: bool,
        timers: &mut dyn TimerScheduler,
    ) -> bool {
        if !self.is_included(address) {
            debug!(iface = %id, %address, "interface not covered by any network statement");
            return false;
        }
        self.ift
            .add(EigrpInterface::new(id, address, prefix_len, mtu, cfg));
        if up {
            self.enable_interface(id);
            let first = initial_hello_jitter(self.config.router_id, id);
            self.start_hello_timer(id, first, timers);
        }
        self.dispatch_to_rtp();
        true
    }

    /// The link under an interface went up or down.
    #[tracing::instrument(skip(self, timers), fields(rid = %self.config.router_id))]
    pub fn interface_state_changed(
        &mut self,
        iface: IfaceId,
        up: bool,
        timers: &mut dyn TimerScheduler,
    ) {
        let Some(eif) = self.ift.get(iface) else {
            return;
        };
        match (up, eif.enabled) {
            (true, false) => {
                let period = hello_period(eif.hello_interval);
                self.enable_interface(iface);
                self.start_hello_timer(iface, period, timers);
            }
            (false, true) => self.disable_interface(iface, timers),
            _ => {}
        }
        self.dispatch_to_rtp();
    }

    fn enable_interface(&mut self, iface: IfaceId) {
        let Some(eif) = self.ift.get_mut(iface) else {
            return;
        };
        eif.enabled = true;
        let (network, plen, params) = (eif.network(), eif.prefix_len, eif.metric_params());
        info!(%iface, network = %Prefix(network, plen), "EIGRP enabled on interface");

        let (sid, is_new) = self.tt.find_or_create_route(
            network,
            plen,
            self.config.router_id,
            iface,
            NeighborId::CONNECTED,
            A::UNSPEC,
        );
        let metric = self.metric(&params);
        if let Some(src) = self.tt.source_mut(sid) {
            src.metric_params = params;
            src.metric = metric;
        }
        self.dual(DualEvent::InterfaceUp, sid, NeighborId::CONNECTED, is_new);
        self.flush_msg_requests();
        self.tt.purge();
    }

    fn disable_interface(&mut self, iface: IfaceId, timers: &mut dyn TimerScheduler) {
        let Some(eif) = self.ift.get(iface) else {
            return;
        };
        let (network, plen) = (eif.network(), eif.prefix_len);
        info!(%iface, network = %Prefix(network, plen), "EIGRP disabled on interface");

        if eif.has_neighbors() && !eif.passive {
            self.to_rtp
                .push(MsgReq::hello(iface, HelloKind::Goodbye, None));
            self.dispatch_to_rtp();
        }
        if let Some(t) = self.ift.get_mut(iface).and_then(|e| e.hello_timer.take()) {
            timers.cancel(t);
        }

        if let Some(sid) = self
            .tt
            .find_source_by_prefix(network, plen, NeighborId::CONNECTED)
        {
            self.dual(DualEvent::InterfaceDown, sid, NeighborId::CONNECTED, false);
        }

        if let Some(eif) = self.ift.get_mut(iface) {
            eif.enabled = false;
        }
        let on_iface: Vec<NeighborId> = self.nt.on_iface(iface).map(|n| n.id).collect();
        for nid in on_iface {
            self.remove_neighbor(nid, timers);
        }
        let mut out = Vec::new();
        self.rtp.interface_down(iface, &mut self.ift, &mut out);
        self.process_rtp_actions(out);

        self.flush_msg_requests();
        self.tt.purge();
    }

    /// Applies new bandwidth/delay to an interface and re-evaluates every path
    /// through it.
    pub fn interface_config_changed(
        &mut self,
        iface: IfaceId,
        bandwidth: Option<u32>,
        delay: Option<u32>,
    ) {
        let Some(eif) = self.ift.get_mut(iface) else {
            warn!(%iface, "config change for interface without EIGRP ignored");
            return;
        };
        if let Some(bw) = bandwidth {
            eif.bandwidth = bw;
        }
        if let Some(d) = delay {
            eif.delay = d;
        }
        let if_params = eif.metric_params();
        debug!(%iface, bandwidth = eif.bandwidth, delay = eif.delay, "interface metric changed");

        let through: Vec<SourceId> = self
            .tt
            .sources()
            .filter(|s| s.iface == iface && s.is_valid())
            .map(|s| s.id)
            .collect();
        for sid in through {
            let Some(src) = self.tt.source(sid) else {
                continue;
            };
            let new_params = if src.is_connected() {
                if_params
            } else {
                adjust_param(&if_params, &src.rd_params)
            };
            if compare_parameters(&new_params, &src.metric_params, &self.config.k_values) {
                continue;
            }
            let metric = self.metric(&new_params);
            let next_hop = src.next_hop_id;
            if let Some(src) = self.tt.source_mut(sid) {
                src.metric_params = new_params;
                src.metric = metric;
            }
            self.dual(DualEvent::RecvUpdate, sid, next_hop, false);
        }
        self.flush_msg_requests();
        self.tt.purge();
        self.dispatch_to_rtp();
    }

    /// Removes a prefix from the host routing table on behalf of someone other
    /// than EIGRP (an operator clearing the route).
    pub fn rib_route_removed(&mut self, prefix: A, prefix_len: u8) {
        let removed = self.rib.remove(prefix, prefix_len);
        let mut lost = Vec::new();
        for entry in removed.iter().filter(|e| e.origin == RouteOrigin::Eigrp) {
            let Some(route) = self.tt.find_route(entry.prefix, entry.prefix_len) else {
                warn!(prefix = %Prefix(entry.prefix, entry.prefix_len), "EIGRP route without topology entry removed");
                continue;
            };
            let active = self.tt.route(route).is_some_and(|r| r.is_active());
            let source = self
                .tt
                .sources_of(route)
                .find(|s| s.next_hop == entry.gateway && s.successor)
                .map(|s| s.id);
            if let Some(sid) = source {
                if !active && !lost.contains(&sid) {
                    lost.push(sid);
                }
            }
        }
        for sid in lost {
            debug!(source = sid.0, "installed path deleted from routing table");
            self.dual(DualEvent::LostRoute, sid, NeighborId::CONNECTED, false);
        }
        self.flush_msg_requests();
        self.tt.purge();
        self.dispatch_to_rtp();
    }

    // ---- timers ------------------------------------------------------------

    fn start_hello_timer(&mut self, iface: IfaceId, after: SimTime, timers: &mut dyn TimerScheduler) {
        let Some(eif) = self.ift.enabled_mut(iface) else {
            return;
        };
        if eif.passive {
            return;
        }
        if let Some(old) = eif.hello_timer.take() {
            timers.cancel(old);
        }
        eif.hello_timer = Some(timers.schedule(after, EigrpTimer::Hello { iface }));
    }

    fn reset_hello_timer(&mut self, iface: IfaceId, timers: &mut dyn TimerScheduler) {
        if let Some(eif) = self.ift.enabled(iface) {
            let period = hello_period(eif.hello_interval);
            self.start_hello_timer(iface, period, timers);
        }
    }

    fn reset_hold_timer(&mut self, neighbor: NeighborId, timers: &mut dyn TimerScheduler) {
        let Some(n) = self.nt.get_mut(neighbor) else {
            return;
        };
        if let Some(old) = n.hold_timer.take() {
            timers.cancel(old);
        }
        n.hold_timer = Some(timers.schedule(
            hold_period(n.hold_interval),
            EigrpTimer::Hold { neighbor },
        ));
    }

    #[tracing::instrument(skip(self, timers), fields(rid = %self.config.router_id))]
    pub fn handle_timer(&mut self, timer: EigrpTimer, timers: &mut dyn TimerScheduler) {
        match timer {
            EigrpTimer::Hello { iface } => {
                let Some(eif) = self.ift.enabled_mut(iface) else {
                    return;
                };
                // This expiry consumed the handle.
                eif.hello_timer = None;
                self.reset_hello_timer(iface, timers);
                self.to_rtp.push(MsgReq::hello(iface, HelloKind::Hello, None));
            }
            EigrpTimer::Hold { neighbor } => {
                let Some(n) = self.nt.get_mut(neighbor) else {
                    return;
                };
                n.hold_timer = None;
                let (iface, address) = (n.iface, n.address);
                info!(%neighbor, %address, "neighbor is down, holding time expired");
                self.remove_neighbor(neighbor, timers);
                self.flush_msg_requests();
                self.tt.purge();

                self.reset_hello_timer(iface, timers);
                self.to_rtp
                    .push(MsgReq::hello(iface, HelloKind::Goodbye, None));
            }
        }
        self.dispatch_to_rtp();
    }

    // ---- packets -----------------------------------------------------------

    #[tracing::instrument(skip(self, msg, timers), fields(rid = %self.config.router_id, kind = msg.kind()))]
    pub fn handle_message(
        &mut self,
        iface: IfaceId,
        src: A,
        msg: &Message<A>,
        timers: &mut dyn TimerScheduler,
    ) {
        match self.ift.enabled(iface) {
            Some(eif) if !eif.passive => {}
            _ => {
                trace!(%iface, "EIGRP not running on interface, message dropped");
                return;
            }
        }
        debug!(
            %iface, %src,
            seq = msg.header.seq, ack = msg.header.ack,
            init = msg.header.init, eot = msg.header.eot,
            routes = msg.routes().len(),
            "received message"
        );

        let neighbor = self.nt.find_by_address_on(src, iface).map(|n| n.id);
        if let Some(n) = neighbor {
            self.reset_hold_timer(n, timers);
        }

        match (&msg.body, neighbor) {
            (Body::Hello { params, stub }, _) => {
                self.process_hello(iface, src, &msg.header, params, *stub, neighbor, timers)
            }
            (Body::Ack, Some(n)) => self.process_ack(iface, n),
            (Body::Update(tlvs), Some(n)) => self.process_update(iface, src, &msg.header, tlvs, n),
            (Body::Query(tlvs), Some(n)) => {
                self.process_diffusing(DualEvent::RecvQuery, iface, src, tlvs, n)
            }
            (Body::Reply(tlvs), Some(n)) => {
                self.process_diffusing(DualEvent::RecvReply, iface, src, tlvs, n)
            }
            (_, None) => {
                debug!(%src, kind = msg.kind(), "message from a router that is not a neighbor, skipped")
            }
        }

        // Sequencing and acks see the neighbor table as left by the handlers.
        if let Some(n) = self.nt.find_by_address_on(src, iface).map(|n| n.id) {
            let mut out = Vec::new();
            self.rtp
                .process_header(&msg.header, n, iface, &mut self.nt, &mut self.ift, &mut out);
            self.process_rtp_actions(out);
        }
        self.dispatch_to_rtp();
    }

    fn process_ack(&mut self, iface: IfaceId, neighbor: NeighborId) {
        let Some(n) = self.nt.get_mut(neighbor) else {
            return;
        };
        if !n.up {
            n.up = true;
            info!(%neighbor, address = %n.address, "neighbor is up, new adjacency");
            self.send_all_eigrp_paths(iface, neighbor);
        }
        let Some(n) = self.nt.get_mut(neighbor) else {
            return;
        };
        if n.routes_for_deletion {
            n.routes_for_deletion = false;
            let removed = self.tt.delayed_remove(neighbor);
            trace!(%neighbor, removed, "delayed route removal");
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn process_hello(
        &mut self,
        iface: IfaceId,
        src: A,
        header: &Header,
        params: &HelloParams,
        stub: Option<StubFlags>,
        neighbor: Option<NeighborId>,
        timers: &mut dyn TimerScheduler,
    ) {
        if params.k_values.is_goodbye() {
            if let Some(n) = neighbor {
                info!(neighbor = %n, address = %src, "neighbor is down, interface goodbye received");
                self.remove_neighbor(n, timers);
                self.flush_msg_requests();
                self.tt.purge();
            }
            return;
        }

        match neighbor {
            None => self.process_new_neighbor(iface, src, header, params, stub, timers),
            Some(n) if params.k_values != self.config.k_values => {
                info!(neighbor = %n, address = %src, "neighbor is down, K-value mismatch");
                self.remove_neighbor(n, timers);
                self.flush_msg_requests();
                self.tt.purge();
                self.reset_hello_timer(iface, timers);
                self.to_rtp
                    .push(MsgReq::hello(iface, HelloKind::Goodbye, None));
            }
            Some(n) => {
                if let Some(neigh) = self.nt.get_mut(n) {
                    if neigh.hold_interval != params.hold_interval {
                        neigh.hold_interval = params.hold_interval;
                    }
                }
            }
        }
    }

    fn neighborship_error(
        &self,
        iface: IfaceId,
        src: A,
        as_number: u16,
        k_values: &KValues,
    ) -> Option<&'static str> {
        let Some(eif) = self.ift.enabled(iface) else {
            return Some("EIGRP is not enabled on the interface");
        };
        if as_number != self.config.as_number {
            return Some("AS number mismatch");
        }
        if *k_values != self.config.k_values {
            return Some("K-value mismatch");
        }
        if !src.same_subnet(eif.address, eif.prefix_len) {
            return Some("not on the common subnet");
        }
        None
    }

    fn process_new_neighbor(
        &mut self,
        iface: IfaceId,
        src: A,
        header: &Header,
        params: &HelloParams,
        stub: Option<StubFlags>,
        timers: &mut dyn TimerScheduler,
    ) {
        if let Some(reason) = self.neighborship_error(iface, src, header.as_number, &params.k_values) {
            info!(address = %src, %iface, reason, "cannot establish neighborship");
            if params.k_values != self.config.k_values {
                self.reset_hello_timer(iface, timers);
                self.to_rtp
                    .push(MsgReq::hello(iface, HelloKind::Goodbye, None));
            }
            return;
        }

        let stub = stub.filter(StubFlags::any);
        let nid = self
            .nt
            .add(src, iface, params.hold_interval, stub, timers.now());
        self.reset_hold_timer(nid, timers);
        if let Some(eif) = self.ift.get_mut(iface) {
            eif.num_neighbors += 1;
            if stub.is_some() {
                eif.num_stubs += 1;
            }
        }
        info!(neighbor = %nid, address = %src, %iface, stub = stub.is_some(), "new neighbor, pending");

        self.reset_hello_timer(iface, timers);
        self.to_rtp.push(MsgReq::hello(iface, HelloKind::Hello, None));
        let mut init = MsgReq::new(Opcode::Update, iface, Some(nid));
        init.init = true;
        self.to_rtp.push(init);
    }

    fn process_update(
        &mut self,
        iface: IfaceId,
        src: A,
        header: &Header,
        tlvs: &[RouteTlv<A>],
        neighbor: NeighborId,
    ) {
        let Some(n) = self.nt.get_mut(neighbor) else {
            return;
        };
        if !n.up && header.ack != 0 {
            n.up = true;
            info!(%neighbor, address = %src, "neighbor is up, new adjacency");
            self.send_all_eigrp_paths(iface, neighbor);
        }
        let up = self.nt.get(neighbor).is_some_and(|n| n.up);

        if header.init {
            if up {
                self.send_all_eigrp_paths(iface, neighbor);
            }
            return;
        }
        if !up {
            trace!(%neighbor, "update from pending neighbor ignored");
            return;
        }

        for tlv in tlvs {
            if tlv.originator == self.tt.router_id() || tlv.metric.is_maximal() {
                let next_hop = resolve_next_hop(tlv.next_hop, src);
                if self
                    .find_source_by_next_hop(tlv.dest, tlv.prefix_len, next_hop)
                    .is_none()
                {
                    trace!(route = %Prefix(tlv.dest, tlv.prefix_len), "route discarded");
                    continue;
                }
            }
            let (sid, notify, is_new) = self.process_inter_route(tlv, src, neighbor, iface);
            if notify {
                self.dual(DualEvent::RecvUpdate, sid, neighbor, is_new);
            } else {
                trace!(route = %Prefix(tlv.dest, tlv.prefix_len), "no change of metric, DUAL not involved");
            }
        }
        self.flush_msg_requests();
        self.tt.purge();
    }

    /// Queries and replies always reach DUAL.
    fn process_diffusing(
        &mut self,
        event: DualEvent,
        iface: IfaceId,
        src: A,
        tlvs: &[RouteTlv<A>],
        neighbor: NeighborId,
    ) {
        for tlv in tlvs {
            let (sid, _, is_new) = self.process_inter_route(tlv, src, neighbor, iface);
            self.dual(event, sid, neighbor, is_new);
        }
        self.flush_msg_requests();
        self.tt.purge();
    }

    fn find_source_by_next_hop(&self, dest: A, prefix_len: u8, next_hop: A) -> Option<SourceId> {
        let route = self.tt.find_route(dest, prefix_len)?;
        self.tt
            .sources_of(route)
            .find(|s| s.next_hop == next_hop)
            .map(|s| s.id)
    }

    /// Records a received route TLV. Returns the source, whether its metric
    /// changed, and whether it was just created.
    fn process_inter_route(
        &mut self,
        tlv: &RouteTlv<A>,
        src: A,
        sender: NeighborId,
        iface: IfaceId,
    ) -> (SourceId, bool, bool) {
        let next_hop = resolve_next_hop(tlv.next_hop, src);
        // Sources are keyed by next hop, which need not be the sender.
        let next_hop_id = self
            .nt
            .find_by_address(next_hop)
            .map_or(sender, |n| n.id);
        let if_params = self
            .ift
            .get(iface)
            .map_or_else(MetricParams::unreachable, EigrpInterface::metric_params);
        let k = self.config.k_values;

        let (sid, is_new) = self.tt.find_or_create_route(
            tlv.dest.network(tlv.prefix_len),
            tlv.prefix_len,
            tlv.originator,
            iface,
            next_hop_id,
            next_hop,
        );
        let Some(source) = self.tt.source_mut(sid) else {
            return (sid, false, is_new);
        };

        let mut notify = false;
        if is_new || !compare_parameters(&tlv.metric, &source.rd_params, &k) {
            source.rd_params = tlv.metric;
            source.rd = compute_classic_metric(&tlv.metric, &k);
            let new_params = adjust_param(&if_params, &tlv.metric);
            if !compare_parameters(&new_params, &source.metric_params, &k) {
                source.metric_params = new_params;
                source.metric = compute_classic_metric(&new_params, &k);
                notify = true;
            }
        }
        (sid, notify, is_new)
    }

    // ---- neighbors ---------------------------------------------------------

    fn remove_neighbor(&mut self, nid: NeighborId, timers: &mut dyn TimerScheduler) {
        let Some(mut neigh) = self.nt.remove(nid) else {
            return;
        };
        if let Some(t) = neigh.hold_timer.take() {
            timers.cancel(t);
        }
        if let Some(eif) = self.ift.get_mut(neigh.iface) {
            eif.num_neighbors = eif.num_neighbors.saturating_sub(1);
            if neigh.is_stub() {
                eif.num_stubs = eif.num_stubs.saturating_sub(1);
            }
        }
        debug!(neighbor = %nid, address = %neigh.address, "neighbor removed");

        let mut out = Vec::new();
        self.rtp
            .neighbor_removed(&neigh, &mut self.nt, &mut self.ift, &mut out);
        self.process_rtp_actions(out);

        self.routes_lost_via(&neigh);
        // Queued requests stay until the caller flushes.
    }

    fn routes_lost_via(&mut self, neigh: &Neighbor<A>) {
        for route_id in self.tt.route_ids() {
            let Some(route) = self.tt.route(route_id) else {
                continue;
            };
            let (active, address, plen) = (route.is_active(), route.address, route.prefix_len);
            let source = self.tt.find_source(route_id, neigh.id);

            match (source, active) {
                (Some(sid), _) => self.dual(DualEvent::NeighborDown, sid, neigh.id, false),
                (None, true) => {
                    // Stands in for the Reply the neighbor will never send.
                    let (sid, _) = self.tt.find_or_create_route(
                        address,
                        plen,
                        self.config.router_id,
                        neigh.iface,
                        neigh.id,
                        neigh.address,
                    );
                    trace!(route = %Prefix(address, plen), "dummy source for lost reply");
                    self.dual(DualEvent::NeighborDown, sid, neigh.id, true);
                }
                (None, false) => {}
            }
        }
    }

    fn send_all_eigrp_paths(&mut self, iface: IfaceId, neighbor: NeighborId) {
        let Some(eif) = self.ift.get(iface) else {
            return;
        };
        let split_horizon = eif.split_horizon;
        let mut req = MsgReq::new(Opcode::Update, iface, Some(neighbor));
        req.eot = true;

        for route_id in self.tt.route_ids() {
            let Some(route) = self.tt.route(route_id) else {
                continue;
            };
            if route.is_active() {
                continue;
            }
            let Some(sid) = self.tt.best_successor(route_id) else {
                continue;
            };
            if self.is_stub() && self.apply_stub_to_update(sid) {
                continue;
            }
            if split_horizon && self.apply_split_horizon(iface, sid, route_id) {
                continue;
            }
            let Some(src) = self.tt.source(sid) else {
                continue;
            };
            req.routes.push(MsgRoute {
                source: sid,
                route: route_id,
                originator: src.originator,
                unreachable: false,
            });
            if let Some(r) = self.tt.route_mut(route_id) {
                r.lock();
            }
        }
        debug!(%neighbor, routes = req.routes.len(), "sending full topology");
        self.to_rtp.push(req);
    }

    // ---- outgoing requests -------------------------------------------------

    fn apply_split_horizon(&self, iface: IfaceId, source: SourceId, route: RouteId) -> bool {
        let num_succ = self.tt.route(route).map_or(0, |r| r.num_successors);
        if num_succ <= 1 {
            self.tt.source(source).is_some_and(|s| s.iface == iface)
        } else {
            self.tt.best_successor_by_iface(route, iface).is_some()
        }
    }

    /// True when our stub configuration forbids advertising the source.
    fn apply_stub_to_update(&self, source: SourceId) -> bool {
        let Some(stub) = self.config.stub else {
            return false;
        };
        if stub.receive_only {
            return true;
        }
        let connected = self.tt.source(source).is_some_and(|s| s.is_connected());
        !(stub.connected && connected)
    }

    /// True when every neighbor on the interface is a stub.
    fn apply_stub_to_query(&self, iface: &EigrpInterface<A>) -> bool {
        !self.is_stub() && iface.num_neighbors == iface.num_stubs
    }

    fn msg_to_all_ifaces(
        &mut self,
        dest: Receiver,
        opcode: Opcode,
        source: SourceId,
        force_poison_rev: bool,
        force_unreachable: bool,
    ) {
        let only_iface = match dest {
            Receiver::Neighbor(n) => match self.nt.get(n) {
                Some(neigh) => Some(neigh.iface),
                None => return,
            },
            _ => None,
        };
        for iface in self.ift.enabled_ids() {
            if only_iface.is_some_and(|i| i != iface) {
                continue;
            }
            let Some(eif) = self.ift.enabled(iface) else {
                continue;
            };
            if dest == Receiver::Stubs && eif.num_stubs == 0 {
                continue;
            }
            if eif.num_neighbors == 0 {
                continue;
            }
            if opcode == Opcode::Query && self.apply_stub_to_query(eif) {
                continue;
            }
            self.msg_to_iface(opcode, source, iface, dest, force_poison_rev, force_unreachable);
        }
    }

    fn msg_to_iface(
        &mut self,
        opcode: Opcode,
        source: SourceId,
        iface: IfaceId,
        dest: Receiver,
        force_poison_rev: bool,
        force_unreachable: bool,
    ) {
        let Some(src) = self.tt.source(source) else {
            return;
        };
        let (route, originator) = (src.route_id, src.originator);
        let Some(eif) = self.ift.enabled(iface) else {
            return;
        };

        let mut unreachable = force_unreachable;
        if eif.split_horizon && self.apply_split_horizon(iface, source, route) {
            if force_poison_rev {
                unreachable = true;
            } else {
                return;
            }
        }

        let dest_neighbor = match dest {
            Receiver::Neighbor(n) => Some(n),
            _ if eif.multicast => None,
            _ => match self.nt.on_iface(iface).next() {
                Some(n) => Some(n.id),
                None => return,
            },
        };
        self.push_msg_route(
            opcode,
            iface,
            dest_neighbor,
            MsgRoute {
                source,
                route,
                originator,
                unreachable,
            },
        );
    }

    fn push_msg_route(
        &mut self,
        opcode: Opcode,
        iface: IfaceId,
        dest_neighbor: Option<NeighborId>,
        msg_route: MsgRoute,
    ) {
        let idx = match self.reqs.iter().position(|r| {
            r.dest_iface == iface && r.opcode == opcode && r.dest_neighbor == dest_neighbor
        }) {
            Some(idx) => idx,
            None => {
                self.reqs.push(MsgReq::new(opcode, iface, dest_neighbor));
                self.reqs.len() - 1
            }
        };
        let req = &mut self.reqs[idx];
        match req.find_route(msg_route.route) {
            Some(idx) => {
                if msg_route.unreachable {
                    req.routes[idx].unreachable = true;
                }
            }
            None => {
                req.routes.push(msg_route);
                if let Some(r) = self.tt.route_mut(msg_route.route) {
                    r.lock();
                }
            }
        }
    }

    /// Hands the coalesced requests over, queries first. Requests for an
    /// interface that is no longer enabled are dropped.
    fn flush_msg_requests(&mut self) {
        let reqs = std::mem::take(&mut self.reqs);
        let (queries, others): (Vec<_>, Vec<_>) =
            reqs.into_iter().partition(|r| r.opcode == Opcode::Query);
        for req in queries.into_iter().chain(others) {
            if self.ift.enabled(req.dest_iface).is_some() {
                self.to_rtp.push(req);
            } else {
                self.unlock_routes(&req);
            }
        }
    }

    fn dispatch_to_rtp(&mut self) {
        while !self.to_rtp.is_empty() {
            let batch = std::mem::take(&mut self.to_rtp);
            for req in batch {
                let mut out = Vec::new();
                self.rtp
                    .process_request(req, &mut self.nt, &mut self.ift, &mut out);
                self.process_rtp_actions(out);
            }
        }
    }

    fn process_rtp_actions(&mut self, actions: Vec<RtpAction>) {
        for action in actions {
            match action {
                RtpAction::Send(req) => self.process_msg_from_rtp(req),
                RtpAction::Discard(req) => {
                    trace!(opcode = %req.opcode, iface = %req.dest_iface, "request discarded");
                    self.unlock_routes(&req);
                }
            }
        }
    }

    fn unlock_routes(&mut self, req: &MsgReq) {
        for r in &req.routes {
            if let Some(route) = self.tt.route_mut(r.route) {
                route.unlock();
            }
        }
    }

    /// Builds the message for a request RTP released.
    fn process_msg_from_rtp(&mut self, req: MsgReq) {
        let dest = match req.dest_neighbor {
            None => Some(A::eigrp_multicast()),
            Some(n) => self.nt.get(n).map(|n| n.address),
        };
        let iface = self
            .ift
            .enabled(req.dest_iface)
            .map(|e| (e.address, e.hold_interval));
        let (Some(dst), Some((src, hold_interval))) = (dest, iface) else {
            trace!(opcode = %req.opcode, "destination vanished, message not built");
            self.unlock_routes(&req);
            return;
        };

        let header = Header {
            as_number: self.config.as_number,
            seq: req.seq,
            ack: req.ack,
            init: req.init,
            eot: req.eot,
            conditional_receive: false,
            restart: false,
        };
        let body = match (req.opcode, req.hello) {
            (Opcode::Hello, HelloKind::Ack) => Body::Ack,
            (Opcode::Hello, kind) => Body::Hello {
                params: HelloParams {
                    hold_interval,
                    k_values: if kind == HelloKind::Goodbye {
                        KValues::GOODBYE
                    } else {
                        self.config.k_values
                    },
                },
                stub: self.config.stub,
            },
            (Opcode::Update | Opcode::Request, _) => Body::Update(self.route_tlvs(&req)),
            (Opcode::Query, _) => Body::Query(self.route_tlvs(&req)),
            (Opcode::Reply, _) => Body::Reply(self.route_tlvs(&req)),
        };
        self.unlock_routes(&req);

        let msg = Message { header, body };
        debug!(
            kind = msg.kind(),
            %dst,
            iface = %req.dest_iface,
            seq = req.seq,
            ack = req.ack,
            routes = msg.routes().len(),
            "send message"
        );
        self.outbox.push(Outbound {
            iface: req.dest_iface,
            datagram: Datagram { src, dst, msg },
        });
    }

    fn route_tlvs(&self, req: &MsgReq) -> Vec<RouteTlv<A>> {
        req.routes
            .iter()
            .filter_map(|mr| {
                let Some(route) = self.tt.route(mr.route) else {
                    warn!(route = mr.route.0, "route vanished before its message was built");
                    return None;
                };
                let mut metric = route.rd_par;
                if mr.unreachable {
                    metric.delay = DELAY_INF;
                    metric.bandwidth = BANDWIDTH_INF;
                }
                Some(RouteTlv {
                    dest: route.address,
                    prefix_len: route.prefix_len,
                    next_hop: A::UNSPEC,
                    originator: mr.originator,
                    metric,
                })
            })
            .collect()
    }
}

fn resolve_next_hop<A: AddressFamily>(tlv_next_hop: A, sender: A) -> A {
    if tlv_next_hop.is_unspec() {
        sender
    } else {
        tlv_next_hop
    }
}

impl<A: AddressFamily> DualPdm<A> for Pdm<A> {
    fn topology(&self) -> &TopologyTable<A> {
        &self.tt
    }

    fn topology_mut(&mut self) -> &mut TopologyTable<A> {
        &mut self.tt
    }

    fn send_update(
        &mut self,
        dest: Receiver,
        route: RouteId,
        source: SourceId,
        force_poison_rev: bool,
        reason: &str,
    ) {
        if let Some(r) = self.tt.route(route) {
            debug!(route = %r.prefix(), reason, ?dest, "DUAL: send Update");
        }
        if self.is_stub() && self.apply_stub_to_update(source) {
            trace!("stub routing applied, Update suppressed");
            return;
        }
        self.msg_to_all_ifaces(dest, Opcode::Update, source, force_poison_rev, false);
    }

    fn send_query(
        &mut self,
        dest: Receiver,
        route: RouteId,
        source: SourceId,
        force_poison_rev: bool,
    ) {
        if let Some(r) = self.tt.route(route) {
            debug!(route = %r.prefix(), ?dest, "DUAL: send Query");
        }
        let mut force_poison_rev = force_poison_rev;
        let force_unreachable = self.is_stub();
        if !force_unreachable && self.nt.stub_count() > 0 {
            force_poison_rev = true;
        }
        self.msg_to_all_ifaces(dest, Opcode::Query, source, force_poison_rev, force_unreachable);
    }

    fn send_reply(
        &mut self,
        route: RouteId,
        dest: NeighborId,
        source: SourceId,
        force_poison_rev: bool,
        is_unreachable: bool,
    ) {
        let Some(neigh) = self.nt.get(dest) else {
            trace!(neighbor = %dest, "Reply to unknown neighbor skipped");
            return;
        };
        let iface = neigh.iface;
        let Some(src) = self.tt.source(source) else {
            return;
        };
        if let Some(r) = self.tt.route(route) {
            debug!(route = %r.prefix(), neighbor = %dest, is_unreachable, "DUAL: send Reply");
        }

        let mut unreachable = is_unreachable || self.is_stub();
        let split_horizon = self.ift.get(iface).is_some_and(|i| i.split_horizon);
        if !is_unreachable && split_horizon && force_poison_rev {
            unreachable = true;
        }
        let msg_route = MsgRoute {
            source,
            route: src.route_id,
            originator: src.originator,
            unreachable,
        };
        self.push_msg_route(Opcode::Reply, iface, Some(dest), msg_route);
    }

    fn update_route(&mut self, route: RouteId, dmin: u64, remove_unreachable: bool) -> RouteUpdate {
        let policy = self.policy();
        self.tt
            .update_route(route, dmin, remove_unreachable, &policy, &mut self.rib)
    }

    fn set_reply_status_table(
        &mut self,
        route: RouteId,
        source: SourceId,
        force_poison_rev: bool,
    ) -> ReplyStatus {
        let mut status = ReplyStatus::default();
        let stub_enabled = self.is_stub();
        let any_stubs = self.nt.stub_count() > 0;

        let candidates: Vec<(NeighborId, IfaceId, bool)> = self
            .nt
            .iter()
            .map(|n| (n.id, n.iface, n.is_stub()))
            .collect();
        for (nid, iface, is_stub) in candidates {
            let Some(eif) = self.ift.enabled(iface) else {
                continue;
            };
            let split_horizon = eif.split_horizon;

            let mut poison = force_poison_rev;
            if !stub_enabled {
                if is_stub {
                    // Stubs are never queried.
                    status.stubs += 1;
                    status.neighbors += 1;
                    continue;
                }
                if any_stubs {
                    poison = true;
                }
            }

            if split_horizon && self.apply_split_horizon(iface, source, route) && !poison {
                continue;
            }
            if let Some(r) = self.tt.route_mut(route) {
                r.set_reply_status(nid);
            }
            status.neighbors += 1;
        }

        status.go_active = self.tt.route(route).is_some_and(|r| r.reply_status_sum() > 0);
        status
    }

    fn has_neighbor_for_update(&self, _source: SourceId) -> bool {
        self.ift.iter_enabled().any(|i| i.has_neighbors())
    }

    fn set_delayed_remove(&mut self, neighbor: NeighborId, source: SourceId) {
        match self.nt.get_mut(neighbor) {
            Some(n) => {
                n.routes_for_deletion = true;
                if let Some(src) = self.tt.source_mut(source) {
                    src.delayed_remove = Some(neighbor);
                    src.set_valid(true);
                }
                trace!(%neighbor, source = source.0, "source removed after next Ack");
            }
            None => {
                // Nobody to wait for.
                if let Some(src) = self.tt.source_mut(source) {
                    src.set_valid(false);
                }
            }
        }
    }

    fn send_update_to_stubs(
        &mut self,
        successor: Option<SourceId>,
        old_successor: Option<SourceId>,
        route: RouteId,
    ) {
        if self.is_stub() || self.nt.stub_count() == 0 {
            return;
        }
        if let Some(source) = successor.or(old_successor) {
            self.send_update(
                Receiver::Stubs,
                route,
                source,
                true,
                "notify stubs about change",
            );
        }
    }
}
