use std::net::Ipv4Addr;

use crate::net::{IfaceId, RemoveOutcome, RouteOrigin, RoutingTable};

fn ip(s: &str) -> Ipv4Addr {
    s.parse().expect("ipv4")
}

#[test]
fn routing_table_longest_prefix_match_wins() {
    let mut rt = RoutingTable::<Ipv4Addr>::new(0);
    rt.add_connected(ip("10.0.0.1"), 8, IfaceId(0));
    rt.install_eigrp(ip("10.1.0.0"), 16, ip("10.0.0.2"), IfaceId(0), 2_000, 90);

    let hit = rt.lookup(ip("10.1.2.3"));
    assert_eq!(hit.len(), 1);
    assert_eq!(hit[0].prefix_len, 16);
    assert_eq!(hit[0].origin, RouteOrigin::Eigrp);

    let hit = rt.lookup(ip("10.2.0.1"));
    assert_eq!(hit[0].origin, RouteOrigin::Connected);
    assert!(hit[0].gateway.is_unspecified());

    assert!(rt.lookup(ip("172.16.0.1")).is_empty());
}

#[test]
fn routing_table_static_route_blocks_eigrp_install() {
    let mut rt = RoutingTable::<Ipv4Addr>::new(0);
    rt.add_static(ip("172.16.1.9"), 24, ip("10.0.0.9"), IfaceId(1));

    assert_eq!(rt.entries()[0].prefix, ip("172.16.1.0"));
    assert!(!rt.is_safe_for_add(ip("172.16.1.0"), 24, 90));
    assert!(rt.is_safe_for_add(ip("172.16.2.0"), 24, 90));
    assert!(rt.is_safe_for_add(ip("172.16.1.0"), 24, 1));
}

#[test]
fn routing_table_install_eigrp_refreshes_existing_path() {
    let mut rt = RoutingTable::<Ipv4Addr>::new(0);
    assert!(rt.install_eigrp(ip("10.9.0.0"), 16, ip("10.0.0.2"), IfaceId(0), 100, 90));
    assert!(!rt.install_eigrp(ip("10.9.0.0"), 16, ip("10.0.0.2"), IfaceId(2), 300, 90));

    assert_eq!(rt.len(), 1);
    let e = rt.find(ip("10.9.0.0"), 16, ip("10.0.0.2")).expect("entry");
    assert_eq!(e.metric, 300);
    assert_eq!(e.iface, IfaceId(2));
}

#[test]
fn routing_table_remove_eigrp_leaves_foreign_entries() {
    let mut rt = RoutingTable::<Ipv4Addr>::new(0);
    rt.add_static(ip("10.5.0.0"), 16, ip("10.0.0.2"), IfaceId(0));
    rt.install_eigrp(ip("10.6.0.0"), 16, ip("10.0.0.2"), IfaceId(0), 10, 90);

    assert_eq!(
        rt.remove_eigrp(ip("10.5.0.0"), 16, ip("10.0.0.2")),
        RemoveOutcome::Foreign
    );
    assert_eq!(
        rt.remove_eigrp(ip("10.6.0.0"), 16, ip("10.0.0.2")),
        RemoveOutcome::Removed
    );
    assert_eq!(
        rt.remove_eigrp(ip("10.6.0.0"), 16, ip("10.0.0.2")),
        RemoveOutcome::NotFound
    );
    assert_eq!(rt.len(), 1);
}

#[test]
fn routing_table_remove_returns_every_path_of_the_prefix() {
    let mut rt = RoutingTable::<Ipv4Addr>::new(0);
    rt.install_eigrp(ip("10.6.0.0"), 16, ip("10.0.0.2"), IfaceId(0), 10, 90);
    rt.install_eigrp(ip("10.6.0.0"), 16, ip("10.0.1.2"), IfaceId(1), 10, 90);
    rt.add_connected(ip("10.0.0.1"), 24, IfaceId(0));

    let removed = rt.remove(ip("10.6.7.8"), 16);
    assert_eq!(removed.len(), 2);
    assert_eq!(rt.eigrp_routes().count(), 0);
    assert_eq!(rt.len(), 1);
}

#[test]
fn routing_table_select_is_deterministic_and_within_candidates() {
    let mut rt = RoutingTable::<Ipv4Addr>::new(123);
    rt.install_eigrp(ip("10.6.0.0"), 16, ip("10.0.0.2"), IfaceId(0), 10, 90);
    rt.install_eigrp(ip("10.6.0.0"), 16, ip("10.0.1.2"), IfaceId(1), 10, 90);
    rt.install_eigrp(ip("10.6.0.0"), 16, ip("10.0.2.2"), IfaceId(2), 99, 90);

    assert_eq!(rt.lookup(ip("10.6.0.1")).len(), 2);
    let a = rt.select(ip("10.6.0.1"), 999).expect("path");
    let b = rt.select(ip("10.6.0.1"), 999).expect("path");
    assert_eq!(a, b);
    assert_ne!(a.iface, IfaceId(2));

    let ifaces: std::collections::HashSet<IfaceId> = (0..64)
        .filter_map(|k| rt.select(ip("10.6.0.1"), k))
        .map(|e| e.iface)
        .collect();
    assert_eq!(ifaces.len(), 2);
}

#[test]
fn routing_table_remove_connected_only_touches_that_interface() {
    let mut rt = RoutingTable::<Ipv4Addr>::new(0);
    rt.add_connected(ip("10.0.0.1"), 24, IfaceId(0));
    rt.add_connected(ip("10.0.1.1"), 24, IfaceId(1));
    rt.add_connected(ip("10.0.1.7"), 24, IfaceId(1));
    assert_eq!(rt.len(), 2);

    rt.remove_connected(IfaceId(1));
    assert_eq!(rt.len(), 1);
    assert_eq!(rt.entries()[0].iface, IfaceId(0));
}
