//! 数据包交付事件
//!
//! 定义网络模拟中的数据包交付事件。

use super::id::{IfaceId, NodeId};
use super::net_world::NetWorld;
use super::packet::Packet;
use crate::sim::{Event, Simulator, World};
use tracing::{debug, trace};

/// 事件：把一帧交给某个路由器的某个接口。
#[derive(Debug)]
pub struct DeliverPacket {
    pub to: NodeId,
    pub iface: IfaceId,
    pub pkt: Packet,
}

impl Event for DeliverPacket {
    #[tracing::instrument(skip(self, sim, world), fields(pkt_id = self.pkt.id, to = self.to.0, iface = %self.iface))]
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let DeliverPacket { to, iface, pkt } = *self;

        debug!(
            kind = pkt.payload.kind(),
            size_bytes = pkt.size_bytes,
            from = pkt.from.0,
            now = %sim.now(),
            "📨 帧到达接口"
        );

        let w = world
            .as_any_mut()
            .downcast_mut::<NetWorld>()
            .expect("world must be NetWorld");
        w.net.deliver(to, iface, pkt, sim);

        trace!("DeliverPacket::execute 完成");
    }

    fn kind(&self) -> &'static str {
        "deliver_packet"
    }
}
