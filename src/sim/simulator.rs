//! 仿真器
//!
//! 定义事件驱动仿真器，维护当前时间与事件队列。
//! 支持同步取消已调度事件（定时器重置/邻居删除前必须先取消）。

use super::event::Event;
use super::scheduled_event::{EventId, ScheduledEvent};
use super::time::SimTime;
use super::world::World;
use std::collections::{BinaryHeap, HashSet};
use tracing::{debug, info, trace};

/// 事件驱动仿真器：维护当前时间与事件队列。
#[derive(Default)]
pub struct Simulator {
    now: SimTime,
    next_seq: u64,
    q: BinaryHeap<ScheduledEvent>,
    cancelled: HashSet<u64>,
    executed: u64,
}

impl Simulator {
    /// 获取当前仿真时间
    pub fn now(&self) -> SimTime {
        self.now
    }

    /// 已执行的事件数
    pub fn executed_events(&self) -> u64 {
        self.executed
    }

    /// 队列中尚未执行（且未取消）的事件数
    pub fn pending_events(&self) -> usize {
        self.q.len().saturating_sub(self.cancelled.len())
    }

    /// 调度事件在指定时间执行，返回可用于取消的句柄。
    #[tracing::instrument(skip(self, ev), fields(event_type = std::any::type_name::<E>(), schedule_at = ?at))]
    pub fn schedule<E: Event>(&mut self, at: SimTime, ev: E) -> EventId {
        let seq = self.next_seq;
        trace!(now = ?self.now, seq, "调度事件");

        self.next_seq = self.next_seq.wrapping_add(1);
        self.q.push(ScheduledEvent {
            at: at.max(self.now),
            seq,
            ev: Box::new(ev),
        });

        trace!(queue_size = self.q.len(), "事件已加入队列");
        EventId(seq)
    }

    /// 取消一个尚未执行的事件。对已执行的事件调用无效果。
    pub fn cancel(&mut self, id: EventId) {
        if id.0 < self.next_seq && self.q.iter().any(|e| e.seq == id.0) {
            trace!(seq = id.0, "取消事件");
            self.cancelled.insert(id.0);
        }
    }

    fn pop_live(&mut self) -> Option<ScheduledEvent> {
        while let Some(item) = self.q.pop() {
            if self.cancelled.remove(&item.seq) {
                continue;
            }
            return Some(item);
        }
        None
    }

    fn peek_live_at(&mut self) -> Option<SimTime> {
        while let Some(top) = self.q.peek() {
            if self.cancelled.contains(&top.seq) {
                let seq = top.seq;
                self.q.pop();
                self.cancelled.remove(&seq);
                continue;
            }
            return Some(top.at);
        }
        None
    }

    /// 运行直到事件队列为空或到达 `until`。
    pub fn run_until(&mut self, until: SimTime, world: &mut dyn World) {
        while let Some(at) = self.peek_live_at() {
            if at > until {
                break;
            }
            let Some(item) = self.pop_live() else {
                break;
            };
            self.now = item.at;
            self.executed += 1;
            trace!(now = ?self.now, kind = item.ev.kind(), "执行事件");
            item.ev.execute(self, world);
            world.on_tick(self);
        }
        self.now = self.now.max(until);
    }

    /// 运行所有事件直到队列为空。
    ///
    /// 注意：路由协议的 Hello 定时器会不断重新调度自身，这种世界里应使用 `run_until`。
    #[tracing::instrument(skip(self, world))]
    pub fn run(&mut self, world: &mut dyn World) {
        info!("▶️  开始运行仿真");
        debug!(now = ?self.now, queue_size = self.q.len(), "初始状态");

        let mut event_count = 0;
        while let Some(item) = self.pop_live() {
            event_count += 1;
            self.now = item.at;
            self.executed += 1;

            trace!(
                event_num = event_count,
                now = ?self.now,
                seq = item.seq,
                kind = item.ev.kind(),
                remaining_queue = self.q.len(),
                "执行事件"
            );

            item.ev.execute(self, world);
            world.on_tick(self);
        }

        info!(
            total_events = event_count,
            final_time = ?self.now,
            "✅ 仿真完成"
        );
    }
}
