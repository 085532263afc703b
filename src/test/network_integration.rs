use std::net::Ipv4Addr;

use crate::net::{
    IfaceId, Link, LinkStateChange, NetWorld, Node, NodeCommand, NodeId, RouterCommand,
    TraceOutcome,
};
use crate::sim::{SimTime, Simulator};
use crate::topo::{Ring, RingOpts, build_ring};

fn expected_tx_time_ns(bytes: u32, bandwidth_bps: u64) -> u64 {
    if bandwidth_bps == 0 {
        return u64::MAX / 4;
    }
    let bits = (bytes as u128).saturating_mul(8);
    let nanos = (bits.saturating_mul(1_000_000_000u128) + (bandwidth_bps as u128 - 1))
        / bandwidth_bps as u128;
    nanos.min(u64::MAX as u128) as u64
}

fn ring(routers: usize) -> (Simulator, NetWorld, Ring) {
    let mut sim = Simulator::default();
    let mut world = NetWorld::default();
    let ring = build_ring(
        &mut world,
        &RingOpts {
            routers,
            ..RingOpts::default()
        },
    );
    world.net.start_all(&mut sim);
    (sim, world, ring)
}

fn trace(world: &NetWorld, from: NodeId, dst: Ipv4Addr) -> TraceOutcome {
    world.net.trace_route::<Ipv4Addr>(from, dst, 7)
}

fn assert_full_reachability(world: &NetWorld, ring: &Ring) {
    for &from in &ring.routers {
        for &dst in &ring.lan_hosts {
            let out = trace(world, from, dst);
            assert!(
                matches!(out, TraceOutcome::Delivered(_)),
                "r{} -> {dst}: {out:?}",
                from.0
            );
        }
    }
}

fn assert_converged(world: &NetWorld) {
    assert!(world.is_converged::<Ipv4Addr>());
    for r in world.net.routers::<Ipv4Addr>() {
        assert!(r.pdm().rtp().queue().is_empty(), "{} has queued messages", r.name());
    }
}

#[test]
fn link_tx_time_matches_serialization_delay() {
    let link = Link::new("l", SimTime::from_micros(100), 100_000_000);
    assert_eq!(link.tx_time(1500).0, expected_tx_time_ns(1500, 100_000_000));
    assert_eq!(link.tx_time(1500), SimTime::from_micros(120));
    // 向上取整
    let slow = Link::new("slow", SimTime::ZERO, 3);
    assert_eq!(slow.tx_time(1).0, expected_tx_time_ns(1, 3));
    assert_eq!(slow.tx_time(1).0, 2_666_666_667);

    let dead = Link::new("dead", SimTime::ZERO, 0);
    assert_eq!(dead.tx_time(64).0, u64::MAX / 4);
}

#[test]
fn ring_converges_to_full_reachability() {
    let (mut sim, mut world, ring) = ring(4);
    sim.run_until(SimTime::from_secs(30), &mut world);

    assert_full_reachability(&world, &ring);
    assert_converged(&world);

    for r in world.net.routers::<Ipv4Addr>() {
        assert_eq!(r.pdm().neighbors().len(), 2);
        // 4 个环上网段 + 4 个 LAN
        assert_eq!(r.pdm().topology().num_routes(), 8);
    }

    // 相邻路由器的 LAN 一跳可达
    let out = trace(&world, ring.routers[0], ring.lan_hosts[1]);
    assert_eq!(out, TraceOutcome::Delivered(vec![ring.routers[0], ring.routers[1]]));
    // 对面的 LAN 两条等价路径，任一条都是两跳
    assert_eq!(trace(&world, ring.routers[0], ring.lan_hosts[2]).path().len(), 3);

    let stats = &world.net.stats;
    assert!(stats.sent_of("Hello") > 0);
    assert!(stats.sent_of("Update") > 0);
    assert!(stats.sent_of("Ack") > 0);
    assert!(stats.delivered_pkts > 0);
}

#[test]
fn opposite_lan_uses_both_equal_cost_paths() {
    let (mut sim, mut world, ring) = ring(4);
    sim.run_until(SimTime::from_secs(30), &mut world);

    let r0 = world.net.router::<Ipv4Addr>(ring.routers[0]).expect("r0");
    let paths = r0
        .pdm()
        .rib()
        .eigrp_routes()
        .filter(|e| e.prefix == Ipv4Addr::new(192, 168, 2, 0))
        .count();
    assert_eq!(paths, 2);

    let route = r0
        .pdm()
        .topology()
        .find_route(Ipv4Addr::new(192, 168, 2, 0), 24)
        .and_then(|id| r0.pdm().topology().route(id))
        .expect("route to r2 lan");
    assert_eq!(route.num_successors, 2);
}

#[test]
fn link_failure_reroutes_around_the_ring() {
    let (mut sim, mut world, ring) = ring(4);
    sim.run_until(SimTime::from_secs(30), &mut world);

    sim.schedule(
        SimTime::from_secs(30),
        LinkStateChange {
            link: ring.ring_links[0],
            up: false,
        },
    );
    sim.run_until(SimTime::from_secs(60), &mut world);

    assert_full_reachability(&world, &ring);
    assert_converged(&world);
    let (r0, r1, r2, r3) = (ring.routers[0], ring.routers[1], ring.routers[2], ring.routers[3]);
    assert_eq!(
        trace(&world, r0, ring.lan_hosts[1]),
        TraceOutcome::Delivered(vec![r0, r3, r2, r1])
    );
    assert_eq!(
        trace(&world, r1, ring.lan_hosts[0]),
        TraceOutcome::Delivered(vec![r1, r2, r3, r0])
    );
    for r in [r0, r1] {
        assert_eq!(world.net.router::<Ipv4Addr>(r).expect("router").pdm().neighbors().len(), 1);
    }
    // 失效网段本身从其他路由器的路由表里消失
    let r2_router = world.net.router::<Ipv4Addr>(r2).expect("r2");
    assert!(
        r2_router
            .pdm()
            .rib()
            .eigrp_routes()
            .all(|e| e.prefix != Ipv4Addr::new(10, 0, 0, 0))
    );
    assert!(world.net.stats.sent_of("Query") > 0);
    assert!(world.net.stats.sent_of("Reply") > 0);
}

#[test]
fn restored_link_brings_back_the_short_path() {
    let (mut sim, mut world, ring) = ring(5);
    sim.run_until(SimTime::from_secs(30), &mut world);
    let link = ring.ring_links[0];
    sim.schedule(SimTime::from_secs(30), LinkStateChange { link, up: false });
    sim.schedule(SimTime::from_secs(45), LinkStateChange { link, up: true });
    sim.run_until(SimTime::from_secs(90), &mut world);

    assert_full_reachability(&world, &ring);
    assert_converged(&world);
    let (r0, r1) = (ring.routers[0], ring.routers[1]);
    assert_eq!(
        trace(&world, r0, ring.lan_hosts[1]),
        TraceOutcome::Delivered(vec![r0, r1])
    );
}

#[test]
fn no_router_loops_while_failure_propagates() {
    let (mut sim, mut world, ring) = ring(6);
    sim.run_until(SimTime::from_secs(30), &mut world);
    sim.schedule(
        SimTime::from_secs(30),
        LinkStateChange {
            link: ring.ring_links[2],
            up: false,
        },
    );

    // 逐毫秒检查收敛过程中的转发路径
    let mut t = SimTime::from_secs(30);
    let end = SimTime::from_millis(30_200);
    while t <= end {
        sim.run_until(t, &mut world);
        for &from in &ring.routers {
            for &dst in &ring.lan_hosts {
                let out = trace(&world, from, dst);
                assert!(!out.is_loop(), "loop at {t}: {out:?}");
            }
        }
        t = t.saturating_add(SimTime::from_millis(1));
    }
    sim.run_until(SimTime::from_secs(60), &mut world);
    assert_full_reachability(&world, &ring);
}

#[test]
fn frames_on_a_failed_link_are_dropped() {
    let (mut sim, mut world, ring) = ring(4);
    sim.run_until(SimTime::from_secs(30), &mut world);
    let before = world.net.stats.dropped_pkts;
    let goodbyes = world.net.stats.sent_of("Goodbye");

    sim.schedule(
        SimTime::from_secs(30),
        LinkStateChange {
            link: ring.ring_links[0],
            up: false,
        },
    );
    sim.run_until(SimTime::from_secs(31), &mut world);

    // 两端的 Goodbye 都落在已断开的接口上
    assert!(world.net.stats.dropped_pkts >= before + 2);
    assert_eq!(world.net.stats.sent_of("Goodbye"), goodbyes);
    assert!(!world.net.link(ring.ring_links[0]).up);
    let r0 = world.net.router::<Ipv4Addr>(ring.routers[0]).expect("r0");
    assert_eq!(r0.pdm().neighbors().len(), 1);
}

#[test]
fn raised_delay_shifts_traffic_to_the_long_way() {
    let (mut sim, mut world, ring) = ring(4);
    sim.run_until(SimTime::from_secs(30), &mut world);

    let (r0, r1, r2, r3) = (ring.routers[0], ring.routers[1], ring.routers[2], ring.routers[3]);
    // r0 的 cw 接口（IfaceId(0)）面向 r1
    sim.schedule(
        SimTime::from_secs(30),
        NodeCommand {
            to: r0,
            cmd: RouterCommand::SetMetric {
                iface: IfaceId(0),
                bandwidth: None,
                delay: Some(100_000),
            },
        },
    );
    sim.run_until(SimTime::from_secs(60), &mut world);

    assert_eq!(
        trace(&world, r0, ring.lan_hosts[1]),
        TraceOutcome::Delivered(vec![r0, r3, r2, r1])
    );
    // 链路本身仍然 up，邻居关系不受影响
    let router = world.net.router::<Ipv4Addr>(r0).expect("r0");
    assert_eq!(router.pdm().neighbors().len(), 2);
    assert_converged(&world);
}

#[test]
fn cleared_route_is_relearned() {
    let (mut sim, mut world, ring) = ring(4);
    sim.run_until(SimTime::from_secs(30), &mut world);
    let r0 = ring.routers[0];
    sim.schedule(
        SimTime::from_secs(30),
        NodeCommand {
            to: r0,
            cmd: RouterCommand::ClearRoute {
                prefix: "192.168.2.0/24".into(),
            },
        },
    );
    sim.run_until(SimTime::from_secs(40), &mut world);

    assert!(matches!(
        trace(&world, r0, ring.lan_hosts[2]),
        TraceOutcome::Delivered(_)
    ));
}
