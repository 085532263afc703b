//! EIGRP 场景仿真
//!
//! 读取 JSON 场景，运行到指定时间，打印各路由器的路由表与拓扑表，可选输出 JSON 报告。

use std::fs;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use eigrpsim_rs::net::{NetWorld, Node, RouteOrigin};
use eigrpsim_rs::proto::eigrp::{AddressFamily, Prefix};
use eigrpsim_rs::sim::{ScenarioError, ScenarioSpec, SimTime, Simulator};
use eigrpsim_rs::topo::build_scenario;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(name = "eigrp-sim", about = "在离散事件网络仿真器上运行 EIGRP 场景")]
struct Args {
    /// 场景文件（JSON）
    #[arg(long)]
    scenario: PathBuf,

    /// 覆盖场景中的运行时长（毫秒）
    #[arg(long)]
    until_ms: Option<u64>,

    /// 输出 JSON 报告
    #[arg(long)]
    json_out: Option<PathBuf>,
}

fn run<A: AddressFamily>(spec: &ScenarioSpec, args: &Args) -> Result<(), ScenarioError> {
    let mut sim = Simulator::default();
    let mut world = NetWorld::default();

    let built = build_scenario::<A>(&mut world, &mut sim, spec)?;
    let until = args.until_ms.map_or(built.until, SimTime::from_millis);

    world.net.start_all(&mut sim);
    sim.run_until(until, &mut world);
    info!(
        now = %sim.now(),
        events = sim.executed_events(),
        sent = world.net.stats.sent_pkts,
        "✅ 仿真结束"
    );

    for router in world.net.routers::<A>() {
        let pdm = router.pdm();
        println!(
            "router {} (rid {}, {} neighbors)",
            router.name(),
            pdm.config().router_id,
            pdm.neighbors().len()
        );
        for e in pdm.rib().entries() {
            let via = if e.gateway.is_unspec() {
                "directly connected".to_string()
            } else {
                format!("via {}", e.gateway)
            };
            let origin = match e.origin {
                RouteOrigin::Connected => "C",
                RouteOrigin::Static => "S",
                RouteOrigin::Eigrp => "D",
            };
            let iface = router
                .interface(e.iface)
                .map_or_else(|| e.iface.to_string(), |i| i.name.clone());
            println!(
                "  {origin} {} [{}/{}] {via}, {iface}",
                Prefix(e.prefix, e.prefix_len),
                e.admin_distance,
                e.metric
            );
        }
        for route in pdm.topology().routes() {
            let state = if route.is_active() { "A" } else { "P" };
            println!(
                "  topo {state} {} fd={} successors={}",
                route.prefix(),
                route.fd,
                route.num_successors
            );
        }
    }
    println!(
        "done @ {}, sent_pkts={}, delivered_pkts={}, dropped_pkts={}",
        sim.now(),
        world.net.stats.sent_pkts,
        world.net.stats.delivered_pkts,
        world.net.stats.dropped_pkts
    );

    if let Some(path) = &args.json_out {
        let report = world.net.report::<A>(sim.now());
        fs::write(path, serde_json::to_string_pretty(&report)?)?;
        info!(path = %path.display(), "报告已写出");
    }
    Ok(())
}

fn main() -> ExitCode {
    // 初始化 tracing（输出到 stderr，stdout 留给路由表）
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

    let result = ScenarioSpec::load(&args.scenario).and_then(|spec| {
        if spec.is_ipv6() {
            run::<Ipv6Addr>(&spec, &args)
        } else {
            run::<Ipv4Addr>(&spec, &args)
        }
    });
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "场景运行失败");
            eprintln!("error: {e}");
            ExitCode::from(2)
        }
    }
}
