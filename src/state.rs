use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::events::{ClientId, CounsellorId, EventId, SimTime};
use crate::models::{CounsellorKind, CounsellorRole, RiskLevel, UserStatus};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClientState {
    Waiting,
    InService,
    Abandoned,
    Completed,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Client {
    pub id: ClientId,
    pub arrival_time: SimTime,
    pub status: UserStatus,
    pub risk: RiskLevel,
    pub patience: f64,
    pub chat_duration: f64,
    pub remaining: f64,
    pub state: ClientState,
    pub transferred: bool,
    pub chat_minutes: f64,
    pub first_service: Option<SimTime>,
    pub left_at: Option<SimTime>,
    #[serde(skip)]
    pub renege: Option<EventId>,
    /// Instant the outstanding reneging timer fires.
    pub renege_at: SimTime,
}

impl Client {
    pub fn new(
        id: ClientId,
        arrival_time: SimTime,
        status: UserStatus,
        risk: RiskLevel,
        patience: f64,
        chat_duration: f64,
    ) -> Self {
        Self {
            id,
            arrival_time,
            status,
            risk,
            patience,
            chat_duration,
            remaining: chat_duration,
            state: ClientState::Waiting,
            transferred: false,
            chat_minutes: 0.0,
            first_service: None,
            left_at: None,
            renege: None,
            renege_at: arrival_time + patience,
        }
    }

    /// Picks the client up; returns true on their first pickup.
    pub fn start_service(&mut self, now: SimTime) -> Result<bool> {
        self.expect(now, ClientState::Waiting, "start service")?;
        self.state = ClientState::InService;
        self.renege = None;
        let first = self.first_service.is_none();
        if first {
            self.first_service = Some(now);
        }
        Ok(first)
    }

    /// Hands an interrupted chat back to the queue with what is left of it.
    pub fn preempt(&mut self, now: SimTime, elapsed: f64) -> Result<()> {
        self.expect(now, ClientState::InService, "be preempted")?;
        self.chat_minutes += elapsed;
        self.remaining = (self.remaining - elapsed).max(0.0);
        self.transferred = true;
        self.state = ClientState::Waiting;
        Ok(())
    }

    pub fn complete(&mut self, now: SimTime, elapsed: f64) -> Result<()> {
        self.expect(now, ClientState::InService, "complete")?;
        self.chat_minutes += elapsed;
        self.remaining = 0.0;
        self.state = ClientState::Completed;
        self.left_at = Some(now);
        Ok(())
    }

    pub fn abandon(&mut self, now: SimTime) -> Result<()> {
        self.expect(now, ClientState::Waiting, "abandon")?;
        self.state = ClientState::Abandoned;
        self.renege = None;
        self.left_at = Some(now);
        Ok(())
    }

    fn expect(&self, now: SimTime, state: ClientState, action: &str) -> Result<()> {
        if self.state == state {
            return Ok(());
        }
        Err(Error::InvalidTransition {
            at: now,
            detail: format!("client {} cannot {} while {:?}", self.id, action, self.state),
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChatEnd {
    Completed,
    Preempted,
    InProgress,
}

/// One stretch of a client being served by one counsellor.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Assignment {
    pub client: ClientId,
    pub counsellor: CounsellorId,
    pub counsellor_label: String,
    pub started_at: SimTime,
    pub ended_at: SimTime,
    pub end: ChatEnd,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ReplicationResult {
    pub replication: usize,
    pub seed: u64,
    pub arrivals: u64,
    pub declined_terms: u64,
    pub entered_queue: u64,
    pub n_served: u64,
    pub n_completed: u64,
    pub n_abandoned: u64,
    pub n_abandoned_after_transfer: u64,
    pub n_transferred: u64,
    pub n_valid_chats: u64,
    /// Reneged clients whose case a counsellor closed after they left.
    pub n_cases_closed: u64,
    pub waiting_at_end: usize,
    pub in_service_at_end: usize,
    pub mean_wait: f64,
    pub mean_abandon_wait: f64,
    pub abandonment_rate: f64,
    pub max_queue_length: usize,
    pub utilization: BTreeMap<CounsellorKind, f64>,
    pub utilization_by_role: BTreeMap<CounsellorRole, f64>,
    pub served_by_status: BTreeMap<UserStatus, u64>,
}
