use crate::sim::{Event, SimTime, Simulator, World};
use std::any::Any;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct DummyWorld {
    ticks: usize,
}

impl World for DummyWorld {
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn on_tick(&mut self, _sim: &mut Simulator) {
        self.ticks = self.ticks.saturating_add(1);
    }
}

type Log = Arc<Mutex<Vec<u32>>>;

struct Push {
    id: u32,
    log: Log,
}

fn push(id: u32, log: &Log) -> Push {
    Push {
        id,
        log: Arc::clone(log),
    }
}

fn logged(log: &Log) -> Vec<u32> {
    log.lock().expect("log lock").clone()
}

impl Event for Push {
    fn execute(self: Box<Self>, _sim: &mut Simulator, _world: &mut dyn World) {
        let Push { id, log } = *self;
        log.lock().expect("log lock").push(id);
    }
}

struct PushThenScheduleNow {
    id: u32,
    next_id: u32,
    log: Log,
}

impl Event for PushThenScheduleNow {
    fn execute(self: Box<Self>, sim: &mut Simulator, _world: &mut dyn World) {
        let PushThenScheduleNow { id, next_id, log } = *self;
        log.lock().expect("log lock").push(id);
        sim.schedule(sim.now(), Push { id: next_id, log });
    }
}

#[test]
fn scheduled_events_order_by_time_then_seq() {
    let log = Log::default();

    let mut sim = Simulator::default();
    sim.schedule(SimTime(10), push(1, &log));
    sim.schedule(SimTime(5), push(2, &log));
    sim.schedule(SimTime(10), push(3, &log));

    let mut world = DummyWorld::default();
    sim.run(&mut world);

    assert_eq!(logged(&log), [2, 1, 3]);
    assert_eq!(world.ticks, 3);
    assert_eq!(sim.now(), SimTime(10));
}

#[test]
fn event_scheduled_at_same_time_inside_event_runs_after_current_event() {
    let log = Log::default();

    let mut sim = Simulator::default();
    sim.schedule(
        SimTime::ZERO,
        PushThenScheduleNow {
            id: 1,
            next_id: 2,
            log: Arc::clone(&log),
        },
    );

    let mut world = DummyWorld::default();
    sim.run(&mut world);

    assert_eq!(logged(&log), [1, 2]);
    assert_eq!(world.ticks, 2);
    assert_eq!(sim.now(), SimTime::ZERO);
}

#[test]
fn run_until_skips_events_after_until_and_advances_time() {
    let log = Log::default();

    let mut sim = Simulator::default();
    sim.schedule(SimTime::ZERO, push(1, &log));
    sim.schedule(SimTime(10), push(2, &log));

    let mut world = DummyWorld::default();
    sim.run_until(SimTime(5), &mut world);

    assert_eq!(logged(&log), [1]);
    assert_eq!(world.ticks, 1);
    assert_eq!(sim.now(), SimTime(5));

    sim.run(&mut world);
    assert_eq!(logged(&log), [1, 2]);
    assert_eq!(world.ticks, 2);
    assert_eq!(sim.now(), SimTime(10));
}

#[test]
fn cancelled_event_never_runs() {
    let log = Log::default();

    let mut sim = Simulator::default();
    let hold = sim.schedule(SimTime::from_secs(15), push(1, &log));
    sim.schedule(SimTime::from_secs(5), push(2, &log));
    assert_eq!(sim.pending_events(), 2);

    sim.cancel(hold);
    assert_eq!(sim.pending_events(), 1);

    let mut world = DummyWorld::default();
    sim.run(&mut world);

    assert_eq!(logged(&log), [2]);
    assert_eq!(sim.executed_events(), 1);
    assert_eq!(sim.now(), SimTime::from_secs(5));
}

#[test]
fn cancelling_an_executed_event_is_a_no_op() {
    let log = Log::default();

    let mut sim = Simulator::default();
    let first = sim.schedule(SimTime(1), push(1, &log));
    let mut world = DummyWorld::default();
    sim.run(&mut world);

    sim.cancel(first);
    sim.schedule(SimTime(2), push(2, &log));
    sim.run(&mut world);

    assert_eq!(logged(&log), [1, 2]);
}

#[test]
fn events_scheduled_in_the_past_run_now() {
    let log = Log::default();

    let mut sim = Simulator::default();
    let mut world = DummyWorld::default();
    sim.run_until(SimTime(100), &mut world);
    sim.schedule(SimTime(10), push(1, &log));
    sim.run(&mut world);

    assert_eq!(logged(&log), [1]);
    assert_eq!(sim.now(), SimTime(100));
}
