//! 事件 trait
//!
//! 仿真里的一切都是事件：报文到达、路由器定时器到期、链路通断、外部命令。

use super::simulator::Simulator;
use super::world::World;

/// 可调度的事件。执行时按值消费自身（`self: Box<Self>`），
/// 因此携带的报文可以直接移交给接收方。
pub trait Event: Send + 'static {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World);

    /// 日志里显示的事件类别，默认取类型名
    fn kind(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}
