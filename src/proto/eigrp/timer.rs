//! Hello and Hold timers.
//!
//! Timers are owned by the interface (Hello) or neighbor (Hold) they belong
//! to: the handle is stored on the object and cancelled before the object is
//! dropped or the timer is re-armed.

use std::net::Ipv4Addr;

use crate::net::IfaceId;
use crate::net::mix64;
use crate::sim::{EventId, SimTime};

use super::neighbor::NeighborId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EigrpTimer {
    Hello { iface: IfaceId },
    Hold { neighbor: NeighborId },
}

/// Timer service the PDM runs against. The simulated router implements it on
/// top of the event queue; tests use a manual clock.
pub trait TimerScheduler {
    fn now(&self) -> SimTime;
    fn schedule(&mut self, after: SimTime, timer: EigrpTimer) -> EventId;
    fn cancel(&mut self, id: EventId);
}

/// Hellos go out half a second before the interval elapses.
pub fn hello_period(hello_interval: u16) -> SimTime {
    SimTime::from_millis(u64::from(hello_interval) * 1000).saturating_sub(SimTime::from_millis(500))
}

pub fn hold_period(hold_interval: u16) -> SimTime {
    SimTime::from_secs(u64::from(hold_interval))
}

/// First Hello on a freshly enabled interface: somewhere within the first
/// second, fixed per (router, interface).
pub fn initial_hello_jitter(router_id: Ipv4Addr, iface: IfaceId) -> SimTime {
    let h = mix64(u64::from(u32::from(router_id)) << 16 ^ iface.0 as u64);
    SimTime::from_micros(h % 1_000_000)
}
