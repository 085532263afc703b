//! 路由器定时器事件
//!
//! Hello / Hold 定时器到期后交给对应路由器处理。

use super::id::NodeId;
use super::net_world::NetWorld;
use crate::proto::eigrp::EigrpTimer;
use crate::sim::{Event, Simulator, World};
use tracing::trace;

/// 事件：某路由器的定时器到期。
#[derive(Debug)]
pub struct RouterTimer {
    pub node: NodeId,
    pub timer: EigrpTimer,
}

impl Event for RouterTimer {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let RouterTimer { node, timer } = *self;
        trace!(node = node.0, ?timer, now = %sim.now(), "⏰ 定时器到期");

        let w = world
            .as_any_mut()
            .downcast_mut::<NetWorld>()
            .expect("world must be NetWorld");
        w.net.deliver_timer(node, timer, sim);
    }

    fn kind(&self) -> &'static str {
        "router_timer"
    }
}
