//! 世界 trait
//!
//! 事件执行时看到的可变状态。仿真内核不关心它的具体类型，
//! 事件通过 `as_any_mut` 向下转型取回自己的世界（见 `net::NetWorld`）。

use super::simulator::Simulator;
use std::any::Any;

pub trait World: Any {
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn as_any(&self) -> &dyn Any;

    /// 每个事件执行完后调用一次
    fn on_tick(&mut self, _sim: &mut Simulator) {}
}
