//! Event queue and simulation clock for the hotend simulator

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::time::Duration;

/// Simulation event type
#[derive(Debug, Clone, PartialEq)]
pub enum SimEventKind {
    /// Run the controller and advance the plant by one step.
    ControlTick,
    /// New target temperature in °C.
    SetpointChange(f64),
    /// Extra cooling coefficient from the part-cooling fan, 0 turns it off.
    FanChange(f64),
}

impl SimEventKind {
    /// Control ticks run last among events scheduled for the same instant.
    fn priority(&self) -> u8 {
        match self {
            SimEventKind::ControlTick => 1,
            _ => 0,
        }
    }
}

/// Simulation event
#[derive(Debug, Clone)]
pub struct SimEvent {
    pub timestamp: Duration,
    pub kind: SimEventKind,
    seq: u64,
}

impl SimEvent {
    pub fn seq(&self) -> u64 {
        self.seq
    }

    fn key(&self) -> (Duration, u8, u64) {
        (self.timestamp, self.kind.priority(), self.seq)
    }
}

impl PartialEq for SimEvent {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}
impl Eq for SimEvent {}
impl PartialOrd for SimEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for SimEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

/// Time-ordered event queue. Events at the same timestamp pop in insertion
/// order, except that control ticks yield to setpoint and fan changes.
#[derive(Debug, Default)]
pub struct SimEventQueue {
    queue: BinaryHeap<Reverse<SimEvent>>,
    next_seq: u64,
}

impl SimEventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, timestamp: Duration, kind: SimEventKind) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Reverse(SimEvent { timestamp, kind, seq }));
    }

    pub fn pop(&mut self) -> Option<SimEvent> {
        self.queue.pop().map(|Reverse(event)| event)
    }

    pub fn peek_time(&self) -> Option<Duration> {
        self.queue.peek().map(|Reverse(event)| event.timestamp)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

/// Simulation clock
#[derive(Debug, Clone, Default)]
pub struct SimClock {
    pub current_time: Duration,
}

impl SimClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the clock forward to `time`. The clock never runs backwards.
    pub fn advance_to(&mut self, time: Duration) {
        if time > self.current_time {
            self.current_time = time;
        }
    }

    pub fn seconds(&self) -> f64 {
        self.current_time.as_secs_f64()
    }
}
