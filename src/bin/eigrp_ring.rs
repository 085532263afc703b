//! 环形拓扑收敛实验
//!
//! N 台路由器成环，等待收敛后可断开一条环上链路，检查所有 LAN 之间仍可达且无环路。

use std::net::Ipv4Addr;

use clap::Parser;
use eigrpsim_rs::net::{LinkStateChange, NetWorld, TraceOutcome};
use eigrpsim_rs::sim::{SimTime, Simulator};
use eigrpsim_rs::topo::{RingOpts, build_ring};

#[derive(Debug, Parser)]
#[command(name = "eigrp-ring", about = "环形拓扑上的 EIGRP 收敛实验")]
struct Args {
    #[arg(long, default_value_t = 6)]
    routers: usize,
    /// 在仿真中途断开第 K 条环上链路
    #[arg(long)]
    fail_link: Option<usize>,
    /// 链路传播时延（微秒）
    #[arg(long, default_value_t = 100)]
    link_latency_us: u64,
    /// 仿真运行到多少毫秒
    #[arg(long, default_value_t = 60_000)]
    until_ms: u64,
}

fn main() {
    // 初始化 tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_file(true)
        .with_line_number(true)
        .with_target(true)
        .init();

    let args = Args::parse();

    let mut sim = Simulator::default();
    let mut world = NetWorld::default();
    let opts = RingOpts {
        routers: args.routers,
        link_latency: SimTime::from_micros(args.link_latency_us),
        ..RingOpts::default()
    };
    let ring = build_ring(&mut world, &opts);
    let until = SimTime::from_millis(args.until_ms);

    if let Some(k) = args.fail_link {
        let link = ring.ring_links[k % ring.ring_links.len()];
        sim.schedule(
            SimTime(until.0 / 2),
            LinkStateChange { link, up: false },
        );
    }

    world.net.start_all(&mut sim);
    sim.run_until(until, &mut world);

    let mut reachable = 0usize;
    let mut loops = 0usize;
    let mut total = 0usize;
    for (i, &from) in ring.routers.iter().enumerate() {
        for (j, &dst) in ring.lan_hosts.iter().enumerate() {
            if i == j {
                continue;
            }
            total += 1;
            match world.net.trace_route::<Ipv4Addr>(from, dst, 0) {
                TraceOutcome::Delivered(path) => {
                    reachable += 1;
                    println!("r{i} -> {dst}: {} hops", path.len() - 1);
                }
                TraceOutcome::NoRoute(_) => println!("r{i} -> {dst}: unreachable"),
                TraceOutcome::Loop(path) => {
                    loops += 1;
                    println!("r{i} -> {dst}: LOOP {:?}", path);
                }
            }
        }
    }
    println!(
        "done @ {}, reachable={reachable}/{total}, loops={loops}, converged={}, sent_pkts={}, events={}",
        sim.now(),
        world.is_converged::<Ipv4Addr>(),
        world.net.stats.sent_pkts,
        sim.executed_events()
    );
}
