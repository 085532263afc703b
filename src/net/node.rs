//! 节点类型
//!
//! 定义网络节点 trait。具体实现是运行 EIGRP 的路由器（见 `router`）。

use std::any::Any;

use super::id::{IfaceId, NodeId};
use super::network::Network;
use super::packet::Packet;
use crate::proto::eigrp::EigrpTimer;
use crate::sim::Simulator;

/// 运行期对某个路由器的管理操作（由场景事件触发）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouterCommand {
    /// 修改接口带宽（Kbit/s）/ 时延（10 µs）
    SetMetric {
        iface: IfaceId,
        bandwidth: Option<u32>,
        delay: Option<u32>,
    },
    /// 从主机路由表删除一个前缀（`addr/len`）
    ClearRoute { prefix: String },
}

/// 节点接口
pub trait Node: Send {
    /// 获取节点标识符
    fn id(&self) -> NodeId;

    /// 获取节点名称
    fn name(&self) -> &str;

    /// 仿真开始：启用接口、启动定时器
    fn start(&mut self, sim: &mut Simulator, net: &mut Network);

    /// 处理到达某接口的数据包
    fn on_packet(&mut self, iface: IfaceId, pkt: Packet, sim: &mut Simulator, net: &mut Network);

    /// 定时器到期
    fn on_timer(&mut self, timer: EigrpTimer, sim: &mut Simulator, net: &mut Network);

    /// 接口所在链路 up/down
    fn on_link_state(&mut self, iface: IfaceId, up: bool, sim: &mut Simulator, net: &mut Network);

    /// 管理操作
    fn on_command(&mut self, cmd: RouterCommand, sim: &mut Simulator, net: &mut Network);

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}
