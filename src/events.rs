use std::cmp::Ordering;

use crate::models::RiskLevel;

/// Minutes since midnight of day 0.
pub type SimTime = f64;

pub type ClientId = usize;
pub type CounsellorId = usize;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct EventId(pub u64);

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Arrival {
    pub time: SimTime,
    pub risk: Option<RiskLevel>,
    pub patience: Option<f64>,
    pub chat_duration: Option<f64>,
}

impl Arrival {
    pub fn at(time: SimTime) -> Self {
        Self {
            time,
            risk: None,
            patience: None,
            chat_duration: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    ClientArrival(Arrival),
    Renege { client: ClientId },
    ChatComplete { counsellor: CounsellorId, client: ClientId },
    WrapUpComplete { counsellor: CounsellorId },
    ShiftStart { counsellor: CounsellorId },
    BreakStart { counsellor: CounsellorId, window: usize },
    BreakEnd { counsellor: CounsellorId },
    ShiftEnd { counsellor: CounsellorId },
}

#[derive(Clone, Debug, PartialEq)]
pub struct ScheduledEvent {
    pub id: EventId,
    pub time: SimTime,
    pub event: Event,
}

impl ScheduledEvent {
    pub fn new(id: EventId, time: SimTime, event: Event) -> Self {
        Self { id, time, event }
    }
}

impl Eq for ScheduledEvent {}

impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time
            .total_cmp(&other.time)
            .then_with(|| self.event.priority().cmp(&other.event.priority()))
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Event {
    /// Precedence among events sharing an instant. A chat that ends exactly
    /// when a break starts completes rather than being preempted, and a
    /// client whose patience runs out at that instant leaves. Waiting clients
    /// are only handed out once every event of the instant has fired, so a
    /// counsellor freed at the start of their break is not given a new chat.
    fn priority(&self) -> u8 {
        match self {
            Event::ChatComplete { .. } => 0,
            Event::WrapUpComplete { .. } => 1,
            Event::Renege { .. } => 2,
            Event::BreakEnd { .. } => 3,
            Event::ShiftEnd { .. } => 4,
            Event::BreakStart { .. } => 5,
            Event::ShiftStart { .. } => 6,
            Event::ClientArrival(_) => 7,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Event::ClientArrival(_) => "arrival",
            Event::Renege { .. } => "renege",
            Event::ChatComplete { .. } => "chat-complete",
            Event::WrapUpComplete { .. } => "wrap-up-complete",
            Event::ShiftStart { .. } => "shift-start",
            Event::BreakStart { .. } => "break-start",
            Event::BreakEnd { .. } => "break-end",
            Event::ShiftEnd { .. } => "shift-end",
        }
    }
}
