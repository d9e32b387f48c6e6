use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};

use crate::error::{Error, Result};
use crate::events::{Event, EventId, ScheduledEvent, SimTime};

/// Virtual clock plus the time-ordered set of pending events.
#[derive(Debug)]
pub struct EventQueue {
    now: SimTime,
    horizon: SimTime,
    next_id: u64,
    processed: u64,
    heap: BinaryHeap<Reverse<ScheduledEvent>>,
    live: HashSet<EventId>,
}

impl EventQueue {
    pub fn new(start: SimTime, horizon: SimTime) -> Self {
        Self {
            now: start,
            horizon,
            next_id: 0,
            processed: 0,
            heap: BinaryHeap::new(),
            live: HashSet::new(),
        }
    }

    pub fn now(&self) -> SimTime {
        self.now
    }

    pub fn horizon(&self) -> SimTime {
        self.horizon
    }

    /// Live events still waiting to fire.
    pub fn pending(&self) -> usize {
        self.live.len()
    }

    pub fn processed(&self) -> u64 {
        self.processed
    }

    pub fn schedule(&mut self, delay: f64, event: Event) -> Result<EventId> {
        if !delay.is_finite() || delay < 0.0 {
            return Err(Error::SchedulingInvariantViolation {
                now: self.now,
                requested: self.now + delay,
            });
        }
        self.schedule_at(self.now + delay, event)
    }

    pub fn schedule_at(&mut self, time: SimTime, event: Event) -> Result<EventId> {
        if time.is_nan() || time < self.now {
            return Err(Error::SchedulingInvariantViolation {
                now: self.now,
                requested: time,
            });
        }
        let id = EventId(self.next_id);
        self.next_id += 1;
        self.live.insert(id);
        self.heap.push(Reverse(ScheduledEvent::new(id, time, event)));
        Ok(id)
    }

    /// Invalidates a pending event; it is dropped instead of firing.
    /// Cancelling an event that already fired is a no-op.
    pub fn cancel(&mut self, id: EventId) -> bool {
        self.live.remove(&id)
    }

    pub fn is_pending(&self, id: EventId) -> bool {
        self.live.contains(&id)
    }

    /// Time of the earliest live event, horizon or not. Cancelled entries at
    /// the head are discarded on the way.
    pub fn peek_time(&mut self) -> Option<SimTime> {
        loop {
            let Reverse(head) = self.heap.peek()?;
            if self.live.contains(&head.id) {
                return Some(head.time);
            }
            self.heap.pop();
        }
    }

    /// Whether another live event is due at the current instant.
    pub fn more_at_now(&mut self) -> bool {
        self.peek_time() == Some(self.now)
    }

    /// Pops the earliest live event at or before the horizon and advances the
    /// clock to it.
    pub fn pop(&mut self) -> Option<ScheduledEvent> {
        loop {
            let next_time = self.heap.peek()?.0.time;
            if next_time > self.horizon {
                return None;
            }
            let Reverse(scheduled) = self.heap.pop()?;
            if !self.live.remove(&scheduled.id) {
                continue;
            }
            self.now = scheduled.time;
            self.processed += 1;
            return Some(scheduled);
        }
    }
}
