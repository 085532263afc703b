//! 拓扑构建

pub mod ring;
pub mod scenario;

pub use ring::{Ring, RingOpts, build_ring};
pub use scenario::{ScenarioNetwork, build_scenario};
