//! 管理操作事件

use super::id::NodeId;
use super::net_world::NetWorld;
use super::node::RouterCommand;
use crate::sim::{Event, Simulator, World};
use tracing::info;

/// 事件：在指定时刻对某路由器执行管理操作。
#[derive(Debug)]
pub struct NodeCommand {
    pub to: NodeId,
    pub cmd: RouterCommand,
}

impl Event for NodeCommand {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let NodeCommand { to, cmd } = *self;
        info!(node = to.0, ?cmd, now = %sim.now(), "🛠️ 执行管理操作");

        let w = world
            .as_any_mut()
            .downcast_mut::<NetWorld>()
            .expect("world must be NetWorld");
        w.net.command(to, cmd, sim);
    }

    fn kind(&self) -> &'static str {
        "node_command"
    }
}
