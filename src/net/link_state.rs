//! 链路状态变化事件

use super::id::LinkId;
use super::net_world::NetWorld;
use crate::sim::{Event, Simulator, World};

/// 事件：链路 up 或 down。
#[derive(Debug)]
pub struct LinkStateChange {
    pub link: LinkId,
    pub up: bool,
}

impl Event for LinkStateChange {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let w = world
            .as_any_mut()
            .downcast_mut::<NetWorld>()
            .expect("world must be NetWorld");
        w.net.set_link_state(self.link, self.up, sim);
    }

    fn kind(&self) -> &'static str {
        "link_state"
    }
}
