use std::net::Ipv4Addr;

use crate::net::IfaceId;
use crate::proto::eigrp::config::InterfaceConfig;
use crate::proto::eigrp::pdm::Outbound;
use crate::proto::eigrp::{
    Body, EigrpTimer, Header, Message, MetricParams, Opcode, Pdm, ProcessConfig, RouteTlv,
    StubFlags, TimerScheduler,
};
use crate::sim::{EventId, SimTime};

/// Records timers instead of running them.
#[derive(Default)]
struct ManualTimers {
    now: SimTime,
    next: u64,
    armed: Vec<(EventId, SimTime, EigrpTimer)>,
}

impl TimerScheduler for ManualTimers {
    fn now(&self) -> SimTime {
        self.now
    }

    fn schedule(&mut self, after: SimTime, timer: EigrpTimer) -> EventId {
        self.next += 1;
        let id = EventId(self.next);
        self.armed.push((id, self.now.saturating_add(after), timer));
        id
    }

    fn cancel(&mut self, id: EventId) {
        self.armed.retain(|(e, _, _)| *e != id);
    }
}

impl ManualTimers {
    fn is_armed(&self, timer: EigrpTimer) -> bool {
        self.armed.iter().any(|(_, _, t)| *t == timer)
    }

    /// Expires `timer`: its entry leaves the armed list before the router
    /// sees the expiry, as with a real scheduler.
    fn fire(&mut self, pdm: &mut Pdm<Ipv4Addr>, timer: EigrpTimer) {
        if let Some(pos) = self.armed.iter().position(|(_, _, t)| *t == timer) {
            self.armed.remove(pos);
        }
        pdm.handle_timer(timer, self);
    }
}

fn ip(s: &str) -> Ipv4Addr {
    s.parse().expect("ipv4")
}

const LINK: IfaceId = IfaceId(0);
const LAN: IfaceId = IfaceId(1);

/// A router with a shared link on if0 (10.0.0.x/24) and a LAN on if1.
fn router(host: u8, config: ProcessConfig, timers: &mut ManualTimers) -> Pdm<Ipv4Addr> {
    let mut pdm = Pdm::new(config, vec![(Ipv4Addr::UNSPECIFIED, 0)], u64::from(host));
    let link_addr = Ipv4Addr::new(10, 0, 0, host);
    let lan_addr = Ipv4Addr::new(192, 168, host, 1);
    pdm.rib_mut().add_connected(link_addr, 24, LINK);
    pdm.rib_mut().add_connected(lan_addr, 24, LAN);
    assert!(pdm.add_interface(LINK, link_addr, 24, 1500, &InterfaceConfig::named("link"), true, timers));
    assert!(pdm.add_interface(LAN, lan_addr, 24, 1500, &InterfaceConfig::named("lan"), true, timers));
    pdm
}

fn config(rid: &str) -> ProcessConfig {
    ProcessConfig {
        router_id: ip(rid),
        ..ProcessConfig::default()
    }
}

/// Hands every datagram sent on the shared link to the other router until
/// neither has anything left to say. Returns everything that crossed the link.
fn pump(
    a: &mut Pdm<Ipv4Addr>,
    ta: &mut ManualTimers,
    b: &mut Pdm<Ipv4Addr>,
    tb: &mut ManualTimers,
) -> Vec<Outbound<Ipv4Addr>> {
    let mut seen = Vec::new();
    for _ in 0..64 {
        let from_a = a.take_outbound();
        let from_b = b.take_outbound();
        if from_a.is_empty() && from_b.is_empty() {
            return seen;
        }
        for out in from_a.into_iter().filter(|o| o.iface == LINK) {
            let d = &out.datagram;
            b.handle_message(LINK, d.src, &d.msg, tb);
            seen.push(out);
        }
        for out in from_b.into_iter().filter(|o| o.iface == LINK) {
            let d = &out.datagram;
            a.handle_message(LINK, d.src, &d.msg, ta);
            seen.push(out);
        }
    }
    panic!("message exchange did not settle");
}

fn adjacent(
    ca: ProcessConfig,
    cb: ProcessConfig,
) -> (Pdm<Ipv4Addr>, ManualTimers, Pdm<Ipv4Addr>, ManualTimers) {
    let mut ta = ManualTimers::default();
    let mut tb = ManualTimers::default();
    let mut a = router(1, ca, &mut ta);
    let mut b = router(2, cb, &mut tb);
    ta.fire(&mut a, EigrpTimer::Hello { iface: LINK });
    pump(&mut a, &mut ta, &mut b, &mut tb);
    (a, ta, b, tb)
}

#[test]
fn interfaces_outside_networks_are_ignored() {
    let mut timers = ManualTimers::default();
    let mut pdm = Pdm::new(config("1.1.1.1"), vec![(ip("10.0.0.0"), 8)], 0);
    assert!(pdm.add_interface(LINK, ip("10.1.0.1"), 24, 1500, &InterfaceConfig::named("a"), true, &mut timers));
    assert!(!pdm.add_interface(LAN, ip("192.168.0.1"), 24, 1500, &InterfaceConfig::named("b"), true, &mut timers));
    assert!(pdm.interfaces().get(LAN).is_none());
    assert!(timers.is_armed(EigrpTimer::Hello { iface: LINK }));
    assert!(!timers.is_armed(EigrpTimer::Hello { iface: LAN }));
}

#[test]
fn enabled_interface_network_enters_topology() {
    let mut timers = ManualTimers::default();
    let pdm = router(1, config("1.1.1.1"), &mut timers);
    let tt = pdm.topology();
    assert_eq!(tt.num_routes(), 2);
    let route = tt.find_route(ip("192.168.1.0"), 24).expect("lan route");
    let r = tt.route(route).expect("route");
    assert!(!r.is_active());
    assert!(r.fd < crate::proto::eigrp::METRIC_INF);
    assert!(r.successor.is_some());
}

#[test]
fn two_routers_form_adjacency_and_exchange_routes() {
    let (a, _, b, _) = adjacent(config("1.1.1.1"), config("2.2.2.2"));

    for (pdm, peer) in [(&a, "10.0.0.2"), (&b, "10.0.0.1")] {
        let n = pdm.neighbors().find_by_address(ip(peer)).expect("neighbor");
        assert!(n.up);
        assert_eq!(pdm.interfaces().get(LINK).expect("link").num_neighbors, 1);
        assert_eq!(pdm.interfaces().get(LINK).expect("link").pending_msgs, 0);
        assert!(pdm.rtp().queue().is_empty());
    }

    let learned: Vec<_> = a.rib().eigrp_routes().collect();
    assert_eq!(learned.len(), 1);
    assert_eq!(learned[0].prefix, ip("192.168.2.0"));
    assert_eq!(learned[0].gateway, ip("10.0.0.2"));
    assert_eq!(learned[0].iface, LINK);
    assert_eq!(learned[0].admin_distance, 90);

    let route = a.topology().find_route(ip("192.168.2.0"), 24).expect("route");
    let r = a.topology().route(route).expect("route");
    assert_eq!(r.fd, learned[0].metric);
    assert!(b.rib().find(ip("192.168.1.0"), 24, ip("10.0.0.1")).is_some());
}

#[test]
fn adjacency_starts_with_init_update_and_ends_with_eot() {
    let mut ta = ManualTimers::default();
    let mut tb = ManualTimers::default();
    let mut a = router(1, config("1.1.1.1"), &mut ta);
    let mut b = router(2, config("2.2.2.2"), &mut tb);
    ta.fire(&mut a, EigrpTimer::Hello { iface: LINK });
    let wire = pump(&mut a, &mut ta, &mut b, &mut tb);

    let updates: Vec<_> = wire
        .iter()
        .filter(|o| o.datagram.msg.opcode() == Opcode::Update)
        .collect();
    assert!(updates.iter().any(|o| o.datagram.msg.header.init));
    assert!(updates.iter().any(|o| o.datagram.msg.header.eot));
    assert!(wire.iter().any(|o| o.datagram.msg.kind() == "Ack"));
    assert!(updates.iter().all(|o| o.datagram.msg.header.seq != 0));
    assert!(!wire.iter().any(|o| o.datagram.msg.opcode() == Opcode::Query));
}

#[test]
fn new_neighbor_arms_hold_timer() {
    let (a, ta, _, _) = adjacent(config("1.1.1.1"), config("2.2.2.2"));
    let nid = a.neighbors().find_by_address(ip("10.0.0.2")).expect("neighbor").id;
    assert!(ta.is_armed(EigrpTimer::Hold { neighbor: nid }));
}

#[test]
fn hold_expiry_drops_neighbor_and_its_routes() {
    let (mut a, mut ta, _, _) = adjacent(config("1.1.1.1"), config("2.2.2.2"));
    let nid = a.neighbors().find_by_address(ip("10.0.0.2")).expect("neighbor").id;

    ta.fire(&mut a, EigrpTimer::Hold { neighbor: nid });

    assert!(a.neighbors().is_empty());
    assert_eq!(a.rib().eigrp_routes().count(), 0);
    assert!(a.topology().find_route(ip("192.168.2.0"), 24).is_none());
    let out = a.take_outbound();
    assert!(out.iter().any(|o| o.datagram.msg.kind() == "Goodbye"));
    assert!(!out.iter().any(|o| o.datagram.msg.opcode() == Opcode::Query));
}

#[test]
fn interface_shutdown_sends_goodbye_to_peer() {
    let (mut a, mut ta, mut b, mut tb) = adjacent(config("1.1.1.1"), config("2.2.2.2"));

    a.rib_mut().remove_connected(LINK);
    a.interface_state_changed(LINK, false, &mut ta);
    assert!(a.neighbors().is_empty());
    assert!(a.interfaces().enabled(LINK).is_none());
    assert!(a.topology().find_route(ip("10.0.0.0"), 24).is_none());
    assert!(!ta.is_armed(EigrpTimer::Hello { iface: LINK }));

    pump(&mut a, &mut ta, &mut b, &mut tb);
    assert!(b.neighbors().is_empty());
    assert_eq!(b.rib().eigrp_routes().count(), 0);
}

#[test]
fn peer_withdrawal_removes_learned_route() {
    let (mut a, mut ta, mut b, mut tb) = adjacent(config("1.1.1.1"), config("2.2.2.2"));
    assert_eq!(a.rib().eigrp_routes().count(), 1);

    b.rib_mut().remove_connected(LAN);
    b.interface_state_changed(LAN, false, &mut tb);
    let wire = pump(&mut a, &mut ta, &mut b, &mut tb);

    // b goes active and queries a, which has no other path.
    assert!(wire.iter().any(|o| o.datagram.msg.opcode() == Opcode::Query));
    assert!(wire.iter().any(|o| o.datagram.msg.opcode() == Opcode::Reply));
    assert_eq!(a.rib().eigrp_routes().count(), 0);
    assert!(a.topology().find_route(ip("192.168.2.0"), 24).is_none());
    assert!(b.topology().find_route(ip("192.168.2.0"), 24).is_none());
    for pdm in [&a, &b] {
        assert!(pdm.topology().routes().all(|r| !r.is_active()));
        assert!(pdm.rtp().queue().is_empty());
    }
}

#[test]
fn as_number_mismatch_prevents_adjacency() {
    let cb = ProcessConfig {
        as_number: 2,
        ..config("2.2.2.2")
    };
    let (a, _, b, _) = adjacent(config("1.1.1.1"), cb);
    assert!(a.neighbors().is_empty());
    assert!(b.neighbors().is_empty());
}

#[test]
fn k_value_mismatch_prevents_adjacency() {
    let cb = ProcessConfig {
        k_values: crate::proto::eigrp::KValues::from_array([1, 0, 1, 0, 1, 0]),
        ..config("2.2.2.2")
    };
    let (a, _, b, _) = adjacent(config("1.1.1.1"), cb);
    assert!(a.neighbors().is_empty());
    assert!(b.neighbors().is_empty());
}

#[test]
fn passive_interface_ignores_hellos() {
    let mut ta = ManualTimers::default();
    let mut tb = ManualTimers::default();
    let mut a = Pdm::new(config("1.1.1.1"), vec![(Ipv4Addr::UNSPECIFIED, 0)], 1);
    let cfg = InterfaceConfig {
        passive: true,
        ..InterfaceConfig::named("link")
    };
    a.add_interface(LINK, ip("10.0.0.1"), 24, 1500, &cfg, true, &mut ta);
    assert!(!ta.is_armed(EigrpTimer::Hello { iface: LINK }));

    let mut b = router(2, config("2.2.2.2"), &mut tb);
    tb.fire(&mut b, EigrpTimer::Hello { iface: LINK });
    pump(&mut a, &mut ta, &mut b, &mut tb);
    assert!(a.neighbors().is_empty());
    // The passive network is still advertised elsewhere.
    assert!(a.topology().find_route(ip("10.0.0.0"), 24).is_some());
}

#[test]
fn stub_neighbor_is_not_queried_but_told_about_loss() {
    let stub = ProcessConfig {
        stub: Some(StubFlags {
            connected: true,
            summary: true,
            ..StubFlags::default()
        }),
        ..config("2.2.2.2")
    };
    let (mut a, mut ta, b, _) = adjacent(config("1.1.1.1"), stub);
    let link = a.interfaces().get(LINK).expect("link");
    assert_eq!(link.num_stubs, 1);
    assert!(a.neighbors().iter().all(|n| n.is_stub()));
    assert!(b.rib().find(ip("192.168.1.0"), 24, ip("10.0.0.1")).is_some());

    a.rib_mut().remove_connected(LAN);
    a.interface_state_changed(LAN, false, &mut ta);

    let out = a.take_outbound();
    assert!(!out.iter().any(|o| o.datagram.msg.opcode() == Opcode::Query));
    let update = out
        .iter()
        .find(|o| o.datagram.msg.opcode() == Opcode::Update)
        .expect("update to stubs");
    assert_eq!(update.iface, LINK);
    let Body::Update(tlvs) = &update.datagram.msg.body else {
        panic!("not an update");
    };
    let tlv = tlvs
        .iter()
        .find(|t| t.dest == ip("192.168.1.0"))
        .expect("lan tlv");
    assert!(tlv.metric.is_maximal());
    assert!(a.topology().routes().all(|r| !r.is_active()));
}

#[test]
fn rib_deletion_triggers_recomputation() {
    let (mut a, mut ta, mut b, mut tb) = adjacent(config("1.1.1.1"), config("2.2.2.2"));
    a.rib_route_removed(ip("192.168.2.0"), 24);
    pump(&mut a, &mut ta, &mut b, &mut tb);

    // b still advertises the LAN, so the path comes back.
    let route = a.topology().find_route(ip("192.168.2.0"), 24).expect("route");
    assert!(!a.topology().route(route).expect("route").is_active());
    assert!(a.rib().find(ip("192.168.2.0"), 24, ip("10.0.0.2")).is_some());
}

#[test]
fn delay_change_updates_metric_and_notifies_peer() {
    let (mut a, mut ta, mut b, mut tb) = adjacent(config("1.1.1.1"), config("2.2.2.2"));
    let before = b
        .rib()
        .find(ip("192.168.1.0"), 24, ip("10.0.0.1"))
        .expect("route")
        .metric;

    a.interface_config_changed(LAN, None, Some(5_000));
    pump(&mut a, &mut ta, &mut b, &mut tb);

    let after = b
        .rib()
        .find(ip("192.168.1.0"), 24, ip("10.0.0.1"))
        .expect("route")
        .metric;
    assert!(after > before);
}

#[test]
fn unknown_neighbor_messages_are_skipped() {
    let mut ta = ManualTimers::default();
    let mut a = router(1, config("1.1.1.1"), &mut ta);
    let msg = Message {
        header: Header {
            as_number: 1,
            seq: 1,
            ..Header::default()
        },
        body: Body::Update(vec![RouteTlv {
            dest: ip("172.16.0.0"),
            prefix_len: 16,
            next_hop: Ipv4Addr::UNSPECIFIED,
            originator: ip("9.9.9.9"),
            metric: MetricParams::interface(100_000, 10, 255, 1, 1500),
        }]),
    };
    a.handle_message(LINK, ip("10.0.0.9"), &msg, &mut ta);

    assert!(a.neighbors().is_empty());
    assert_eq!(a.topology().num_routes(), 2);
    assert_eq!(a.rib().eigrp_routes().count(), 0);
    // Not acknowledged either.
    assert!(a.take_outbound().is_empty());
}
