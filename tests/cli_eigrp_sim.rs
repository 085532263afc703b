use serde_json::Value;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

fn unique_temp_dir(prefix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time went backwards")
        .as_nanos();
    let dir = std::env::temp_dir().join(format!(
        "eigrpsim-rs-{prefix}-{}-{nanos}",
        std::process::id()
    ));
    fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

fn write_file(dir: &PathBuf, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).expect("write temp file");
    path
}

const TRIANGLE: &str = r#"
{
    "until_ms": 30000,
    "links": [
        { "name": "ab" }, { "name": "bc" }, { "name": "ca" }, { "name": "lan-c" }
    ],
    "routers": [
        {
            "name": "a",
            "interfaces": [
                { "name": "to-b", "link": "ab", "address": "10.0.1.1/24" },
                { "name": "to-c", "link": "ca", "address": "10.0.3.2/24" }
            ]
        },
        {
            "name": "b",
            "interfaces": [
                { "name": "to-a", "link": "ab", "address": "10.0.1.2/24" },
                { "name": "to-c", "link": "bc", "address": "10.0.2.1/24" }
            ]
        },
        {
            "name": "c",
            "interfaces": [
                { "name": "to-b", "link": "bc", "address": "10.0.2.2/24" },
                { "name": "to-a", "link": "ca", "address": "10.0.3.1/24" },
                { "name": "lan", "link": "lan-c", "address": "192.168.3.1/24" }
            ]
        }
    ],
    "events": [
        { "kind": "link_down", "at_ms": 20000, "link": "ca" }
    ]
}
"#;

fn routes_of<'a>(report: &'a Value, router: &str) -> &'a Vec<Value> {
    report["routers"]
        .as_array()
        .expect("routers array")
        .iter()
        .find(|r| r["name"] == router)
        .and_then(|r| r["routes"].as_array())
        .expect("router routes")
}

#[test]
fn eigrp_sim_writes_json_report_with_learned_routes() {
    let dir = unique_temp_dir("eigrp-sim-report");
    let scenario = write_file(&dir, "triangle.json", TRIANGLE);
    let out_json = dir.join("report.json");

    let output = Command::new(env!("CARGO_BIN_EXE_eigrp_sim"))
        .args([
            "--scenario",
            scenario.to_str().unwrap(),
            "--json-out",
            out_json.to_str().unwrap(),
        ])
        .output()
        .expect("run eigrp_sim");
    assert!(
        output.status.success(),
        "eigrp_sim failed: stderr={}",
        String::from_utf8_lossy(&output.stderr)
    );

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("router a"), "stdout={stdout}");
    assert!(stdout.contains("D 192.168.3.0/24 [90/"), "stdout={stdout}");
    assert!(stdout.lines().last().is_some_and(|l| l.starts_with("done @ ")));

    let raw = fs::read_to_string(&out_json).expect("read report.json");
    let v: Value = serde_json::from_str(&raw).expect("parse report.json");
    assert_eq!(v["now_ms"].as_u64(), Some(30_000));
    assert_eq!(v["routers"].as_array().map(Vec::len), Some(3));

    // ca 断开后 a 只能经 b 到达 c 的 LAN
    let to_lan: Vec<&Value> = routes_of(&v, "a")
        .iter()
        .filter(|r| r["prefix"] == "192.168.3.0")
        .collect();
    assert_eq!(to_lan.len(), 1, "routes={to_lan:?}");
    assert_eq!(to_lan[0]["gateway"], "10.0.1.2");
    assert_eq!(to_lan[0]["origin"], "eigrp");
    assert_eq!(to_lan[0]["admin_distance"], 90);

    let ca = v["links"]
        .as_array()
        .expect("links array")
        .iter()
        .find(|l| l["name"] == "ca")
        .expect("link ca");
    assert_eq!(ca["up"], false);
    assert!(v["stats"]["sent_pkts"].as_u64().unwrap_or(0) > 0);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn eigrp_sim_until_override_stops_before_failure() {
    let dir = unique_temp_dir("eigrp-sim-until");
    let scenario = write_file(&dir, "triangle.json", TRIANGLE);
    let out_json = dir.join("report.json");

    let output = Command::new(env!("CARGO_BIN_EXE_eigrp_sim"))
        .args([
            "--scenario",
            scenario.to_str().unwrap(),
            "--until-ms",
            "15000",
            "--json-out",
            out_json.to_str().unwrap(),
        ])
        .output()
        .expect("run eigrp_sim");
    assert!(output.status.success());

    let raw = fs::read_to_string(&out_json).expect("read report.json");
    let v: Value = serde_json::from_str(&raw).expect("parse report.json");
    assert_eq!(v["now_ms"].as_u64(), Some(15_000));
    let to_lan = routes_of(&v, "a")
        .iter()
        .find(|r| r["prefix"] == "192.168.3.0")
        .expect("route to c's lan");
    assert_eq!(to_lan["gateway"], "10.0.3.1");

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn eigrp_sim_exits_nonzero_on_bad_config() {
    let dir = unique_temp_dir("eigrp-sim-bad-config");
    let scenario = write_file(
        &dir,
        "bad.json",
        r#"
{
    "links": [ { "name": "l" } ],
    "routers": [
        {
            "name": "a",
            "variance": 500,
            "interfaces": [ { "name": "e0", "link": "l", "address": "10.0.0.1/24" } ]
        }
    ]
}
        "#,
    );

    let output = Command::new(env!("CARGO_BIN_EXE_eigrp_sim"))
        .args(["--scenario", scenario.to_str().unwrap()])
        .output()
        .expect("run eigrp_sim");
    assert!(!output.status.success(), "expected non-zero exit, got success");
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("bad value for variance 500"),
        "unexpected stderr: {stderr}"
    );

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn eigrp_sim_exits_nonzero_on_missing_scenario() {
    let output = Command::new(env!("CARGO_BIN_EXE_eigrp_sim"))
        .args(["--scenario", "/nonexistent/eigrp/scenario.json"])
        .output()
        .expect("run eigrp_sim");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("cannot read scenario"), "unexpected stderr: {stderr}");
}

#[test]
fn eigrp_ring_stays_loop_free_after_link_failure() {
    let output = Command::new(env!("CARGO_BIN_EXE_eigrp_ring"))
        .args(["--routers", "5", "--fail-link", "2", "--until-ms", "40000"])
        .output()
        .expect("run eigrp_ring");
    assert!(
        output.status.success(),
        "eigrp_ring failed: stderr={}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    let summary = stdout
        .lines()
        .find(|l| l.starts_with("done @ "))
        .expect("summary line");
    assert!(summary.contains("reachable=20/20"), "summary={summary}");
    assert!(summary.contains("loops=0"), "summary={summary}");
    assert!(summary.contains("converged=true"), "summary={summary}");
}
