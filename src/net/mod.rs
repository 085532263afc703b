//! 网络模拟模块
//!
//! 此模块包含网络模拟的核心组件：路由器节点、广播链路、数据包、主机路由表与网络拓扑。

// 子模块声明
mod deliver_packet;
mod id;
mod link;
mod link_state;
mod net_world;
mod network;
mod node;
mod node_command;
mod packet;
mod router;
mod router_timer;
pub mod routing;
mod stats;

// 重新导出公共接口
pub use deliver_packet::DeliverPacket;
pub use id::{IfaceId, LinkId, NodeId};
pub use link::Link;
pub use link_state::LinkStateChange;
pub use net_world::NetWorld;
pub use network::{LinkReport, Network, NetworkReport, TraceOutcome};
pub use node::{Node, RouterCommand};
pub use node_command::NodeCommand;
pub use packet::{Datagram, Packet, Payload};
pub use router::{Router, RouterIface, RouterReport, TopologyEntry};
pub use router_timer::RouterTimer;
pub(crate) use routing::mix64;
pub use routing::{RemoveOutcome, RibEntry, RouteOrigin, RoutingTable};
pub use stats::Stats;
