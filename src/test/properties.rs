use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use super::dual::{MockPdm, Sent};
use crate::proto::eigrp::{Dual, DualEvent, METRIC_INF, NeighborId, QueryOrigin, RouteId};

const NEIGHBORS: u32 = 4;

/// splitmix64; deterministic per seed.
struct Rng(u64);

impl Rng {
    fn next(&mut self) -> u64 {
        self.0 = self.0.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.0;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    fn below(&mut self, n: u64) -> u64 {
        self.next() % n
    }
}

fn route_id(pdm: &MockPdm) -> Option<RouteId> {
    pdm.tt.find_route(Ipv4Addr::new(10, 9, 0, 0), 16)
}

fn source_of(pdm: &MockPdm, n: u32) -> Option<&crate::proto::eigrp::RouteSource<Ipv4Addr>> {
    let route = route_id(pdm)?;
    let sid = pdm.tt.find_source(route, NeighborId(n))?;
    pdm.tt.source(sid)
}

/// Metric and reported distance for a path through neighbor `n`. Metrics of
/// different neighbors never tie, so there is a single successor.
fn distance(rng: &mut Rng, n: u32) -> (u64, u64) {
    if rng.below(5) == 0 {
        return (METRIC_INF, METRIC_INF);
    }
    let rd = (1 + rng.below(64)) * 8;
    (rd + u64::from(n), rd)
}

fn check_invariants(pdm: &MockPdm, seed: u64, step: usize) {
    let Some(id) = route_id(pdm) else {
        return;
    };
    let route = pdm.tt.route(id).expect("route");
    let ctx = format!("seed {seed} step {step}");

    if !route.is_active() {
        assert_eq!(route.query_origin, QueryOrigin::Qo1, "{ctx}: passive route must be QO 1");
        for s in pdm.tt.sources_of(id).filter(|s| s.is_valid() && s.successor) {
            assert!(
                s.rd < route.fd,
                "{ctx}: successor via {} has rd {} >= fd {}",
                s.next_hop_id,
                s.rd,
                route.fd
            );
        }
    }
    for n in route.reply_status() {
        assert!(
            pdm.neighbors.iter().any(|(m, _)| *m == n),
            "{ctx}: reply status holds unknown neighbor {n}"
        );
    }
    if let Some(succ) = route.successor {
        let s = pdm
            .tt
            .source(succ)
            .unwrap_or_else(|| panic!("{ctx}: successor {} was purged", succ.0));
        assert_eq!(s.route_id, id, "{ctx}: successor belongs to another route");
    }
}

/// Losing the successor mid-computation clears the query origin (1 to 0,
/// 3 to 2) unless the computation already finished or restarted.
fn check_successor_loss(pdm: &MockPdm, qo_before: QueryOrigin, sent_before: usize) {
    let Some(route) = route_id(pdm).and_then(|id| pdm.tt.route(id)) else {
        return;
    };
    if !route.is_active() {
        return;
    }
    let restarted = pdm.sent[sent_before..]
        .iter()
        .any(|s| matches!(s, Sent::Query { .. }));
    let expected = match qo_before {
        QueryOrigin::Qo1 => QueryOrigin::Qo0,
        QueryOrigin::Qo3 => QueryOrigin::Qo2,
        _ => return,
    };
    assert!(
        route.query_origin == expected || restarted,
        "successor lost in QO {qo_before} left the route in QO {}",
        route.query_origin
    );
}

/// Picks the next input that a well-behaved neighbor could send.
fn step(pdm: &mut MockPdm, rng: &mut Rng, owed: &mut BTreeMap<NeighborId, usize>) {
    let n = 1 + rng.below(u64::from(NEIGHBORS)) as u32;
    let route = route_id(pdm).and_then(|id| pdm.tt.route(id));
    let active = route.is_some_and(|r| r.is_active());
    let waiting_on_n = route.is_some_and(|r| r.has_reply_status(NeighborId(n)));
    let qo = route.map_or(QueryOrigin::Qo1, |r| r.query_origin);
    let successor = route
        .and_then(|r| r.successor)
        .filter(|s| pdm.tt.source(*s).is_some_and(|s| s.successor));
    let src = source_of(pdm, n);
    let has_source = src.is_some();
    let is_successor = src.is_some_and(|s| s.successor);

    match rng.below(6) {
        0 | 1 => {
            let (metric, rd) = distance(rng, n);
            pdm.event(DualEvent::RecvUpdate, n, metric, rd);
        }
        2 if !(is_successor && matches!(qo, QueryOrigin::Qo2 | QueryOrigin::Qo3)) => {
            let (metric, rd) = distance(rng, n);
            owed.insert(NeighborId(n), pdm.sent.len());
            pdm.event(DualEvent::RecvQuery, n, metric, rd);
        }
        3 if active && waiting_on_n => {
            let (metric, rd) = distance(rng, n);
            pdm.event(DualEvent::RecvReply, n, metric, rd);
        }
        4 if has_source => {
            owed.remove(&NeighborId(n));
            let sent_before = pdm.sent.len();
            pdm.event(DualEvent::NeighborDown, n, METRIC_INF, METRIC_INF);
            if active && is_successor {
                check_successor_loss(pdm, qo, sent_before);
            }
        }
        5 if !active => {
            if let Some(sid) = successor {
                Dual::<Ipv4Addr, _>::new(&mut *pdm).process_event(
                    DualEvent::LostRoute,
                    sid,
                    NeighborId::CONNECTED,
                    false,
                );
                pdm.tt.purge();
            }
        }
        _ => {}
    }
}

/// Answers every outstanding query until the route is passive again.
fn drain(pdm: &mut MockPdm, rng: &mut Rng, seed: u64) {
    for round in 0..32 {
        let pending: Vec<NeighborId> = route_id(pdm)
            .and_then(|id| pdm.tt.route(id))
            .map(|r| r.reply_status().collect())
            .unwrap_or_default();
        if pending.is_empty() {
            return;
        }
        for n in pending {
            let (metric, rd) = distance(rng, n.0);
            pdm.event(DualEvent::RecvReply, n.0, metric, rd);
            check_invariants(pdm, seed, 1000 + round);
        }
    }
    panic!("seed {seed}: route never returned to passive");
}

#[test]
fn random_event_sequences_keep_dual_invariants() {
    for seed in 0..300u64 {
        let mut rng = Rng(seed);
        let neighbors: Vec<(u32, bool)> = (1..=NEIGHBORS).map(|n| (n, false)).collect();
        let mut pdm = MockPdm::new(&neighbors);
        let mut owed = BTreeMap::new();

        for i in 0..80 {
            step(&mut pdm, &mut rng, &mut owed);
            check_invariants(&pdm, seed, i);
        }
        drain(&mut pdm, &mut rng, seed);

        // 每个发过 Query 的邻居最终都收到了 Reply
        for (n, since) in owed {
            let answered = pdm.sent[since..]
                .iter()
                .any(|s| matches!(s, Sent::Reply { to, .. } if *to == n));
            assert!(answered, "seed {seed}: query from {n} never answered");
        }
    }
}

#[test]
fn quiescent_route_is_passive_or_gone() {
    for seed in 1000..1100u64 {
        let mut rng = Rng(seed);
        let neighbors: Vec<(u32, bool)> = (1..=NEIGHBORS).map(|n| (n, false)).collect();
        let mut pdm = MockPdm::new(&neighbors);
        let mut owed = BTreeMap::new();
        for _ in 0..40 {
            step(&mut pdm, &mut rng, &mut owed);
        }
        drain(&mut pdm, &mut rng, seed);

        let Some(id) = route_id(&pdm) else {
            continue;
        };
        let route = pdm.tt.route(id).expect("route");
        assert!(!route.is_active());
        let reachable = pdm
            .tt
            .sources_of(id)
            .any(|s| s.is_valid() && !s.is_unreachable());
        if route.successor.is_some() {
            assert!(reachable, "seed {seed}: successor without a reachable path");
            assert!(route.fd < METRIC_INF);
        }
    }
}
