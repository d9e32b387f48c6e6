use crate::error::{Error, Result};
use crate::events::{ClientId, CounsellorId, EventId, SimTime};
use crate::models::{CounsellorKind, CounsellorRole, RiskLevel};
use crate::roster::{BreakWindow, ShiftInstance};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CounsellorState {
    Off,
    SignedIn,
    OnBreak,
    Serving,
    /// Filling out a case after a chat or closing a reneged client's case.
    WrapUp,
}

/// The chat a counsellor is currently holding.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ActiveChat {
    pub client: ClientId,
    pub completion: EventId,
    pub started_at: SimTime,
}

#[derive(Clone, Debug)]
pub struct Counsellor {
    pub id: CounsellorId,
    pub label: String,
    pub role: CounsellorRole,
    pub shift_start: SimTime,
    pub shift_end: SimTime,
    pub breaks: Vec<BreakWindow>,
    state: CounsellorState,
    current: Option<ActiveChat>,
    wrap_up: Option<EventId>,
    sign_off_pending: bool,
    /// Pending break-start and break-end events, cancelled at sign-off.
    pub timers: Vec<EventId>,
    since: SimTime,
    busy_minutes: f64,
    on_duty_minutes: f64,
}

impl Counsellor {
    pub fn from_shift(id: CounsellorId, shift: &ShiftInstance) -> Self {
        Self {
            id,
            label: shift.label(),
            role: shift.role,
            shift_start: shift.start,
            shift_end: shift.end,
            breaks: shift.breaks.clone(),
            state: CounsellorState::Off,
            current: None,
            wrap_up: None,
            sign_off_pending: false,
            timers: Vec::new(),
            since: shift.start,
            busy_minutes: 0.0,
            on_duty_minutes: 0.0,
        }
    }

    pub fn kind(&self) -> CounsellorKind {
        self.role.kind()
    }

    pub fn state(&self) -> CounsellorState {
        self.state
    }

    pub fn current_client(&self) -> Option<ClientId> {
        self.current.map(|chat| chat.client)
    }

    pub fn active_chat(&self) -> Option<ActiveChat> {
        self.current
    }

    pub fn is_on_duty(&self) -> bool {
        matches!(
            self.state,
            CounsellorState::SignedIn | CounsellorState::Serving | CounsellorState::WrapUp
        )
    }

    pub fn sign_off_pending(&self) -> bool {
        self.sign_off_pending
    }

    pub fn busy_minutes(&self) -> f64 {
        self.busy_minutes
    }

    pub fn on_duty_minutes(&self) -> f64 {
        self.on_duty_minutes
    }

    /// Whether this counsellor may start a chat with a client of `risk` now.
    pub fn can_take(&self, risk: RiskLevel, now: SimTime, cutoff: f64) -> bool {
        self.state == CounsellorState::SignedIn
            && !self.sign_off_pending
            && self.shift_end - now >= cutoff
            && self.role.handles(risk)
    }

    pub fn sign_in(&mut self, now: SimTime) -> Result<()> {
        self.expect(now, &[CounsellorState::Off], "sign in")?;
        self.transition(now, CounsellorState::SignedIn);
        Ok(())
    }

    pub fn start_chat(&mut self, now: SimTime, client: ClientId, completion: EventId) -> Result<()> {
        self.expect(now, &[CounsellorState::SignedIn], "start a chat")?;
        if self.sign_off_pending {
            return Err(self.invalid(now, "start a chat after shift end"));
        }
        self.transition(now, CounsellorState::Serving);
        self.current = Some(ActiveChat {
            client,
            completion,
            started_at: now,
        });
        Ok(())
    }

    /// Ends the current chat normally and returns it.
    pub fn finish_chat(&mut self, now: SimTime) -> Result<ActiveChat> {
        self.expect(now, &[CounsellorState::Serving], "finish a chat")?;
        let chat = self.current.take().ok_or_else(|| self.invalid(now, "serving nobody"))?;
        self.transition(now, CounsellorState::SignedIn);
        Ok(chat)
    }

    /// Starts case paperwork that ends when `timer` fires.
    pub fn start_wrap_up(&mut self, now: SimTime, timer: EventId) -> Result<()> {
        self.expect(now, &[CounsellorState::SignedIn], "start a wrap-up")?;
        self.transition(now, CounsellorState::WrapUp);
        self.wrap_up = Some(timer);
        Ok(())
    }

    pub fn end_wrap_up(&mut self, now: SimTime) -> Result<()> {
        self.expect(now, &[CounsellorState::WrapUp], "end a wrap-up")?;
        self.wrap_up = None;
        self.transition(now, CounsellorState::SignedIn);
        Ok(())
    }

    /// Takes the pending wrap-up timer so the caller can cancel it.
    pub fn take_wrap_up(&mut self) -> Option<EventId> {
        self.wrap_up.take()
    }

    /// Break interrupt. Fires whatever the counsellor is doing; a chat in
    /// progress is handed back.
    pub fn start_break(&mut self, now: SimTime) -> Result<Option<ActiveChat>> {
        self.expect(
            now,
            &[
                CounsellorState::SignedIn,
                CounsellorState::Serving,
                CounsellorState::WrapUp,
            ],
            "start a break",
        )?;
        let preempted = self.current.take();
        self.wrap_up = None;
        self.transition(now, CounsellorState::OnBreak);
        Ok(preempted)
    }

    pub fn end_break(&mut self, now: SimTime) -> Result<()> {
        self.expect(now, &[CounsellorState::OnBreak], "end a break")?;
        self.transition(now, CounsellorState::SignedIn);
        Ok(())
    }

    /// Marks a busy counsellor to sign off once the current chat or wrap-up
    /// ends.
    pub fn defer_sign_off(&mut self, now: SimTime) -> Result<()> {
        self.expect(
            now,
            &[CounsellorState::Serving, CounsellorState::WrapUp],
            "defer sign-off",
        )?;
        self.sign_off_pending = true;
        Ok(())
    }

    /// Goes off duty, handing back any chat in progress.
    pub fn sign_off(&mut self, now: SimTime) -> Result<Option<ActiveChat>> {
        self.expect(
            now,
            &[
                CounsellorState::SignedIn,
                CounsellorState::OnBreak,
                CounsellorState::Serving,
                CounsellorState::WrapUp,
            ],
            "sign off",
        )?;
        let preempted = self.current.take();
        self.wrap_up = None;
        self.transition(now, CounsellorState::Off);
        self.sign_off_pending = false;
        Ok(preempted)
    }

    /// Closes the time tallies at the end of the run.
    pub fn close(&mut self, now: SimTime) {
        let state = self.state;
        self.transition(now, state);
    }

    fn transition(&mut self, now: SimTime, next: CounsellorState) {
        let elapsed = (now - self.since).max(0.0);
        match self.state {
            CounsellorState::Serving | CounsellorState::WrapUp => {
                self.busy_minutes += elapsed;
                self.on_duty_minutes += elapsed;
            }
            CounsellorState::SignedIn => self.on_duty_minutes += elapsed,
            CounsellorState::Off | CounsellorState::OnBreak => {}
        }
        self.since = now;
        self.state = next;
    }

    fn expect(&self, now: SimTime, allowed: &[CounsellorState], action: &str) -> Result<()> {
        if allowed.contains(&self.state) {
            return Ok(());
        }
        Err(self.invalid(now, &format!("{} while {:?}", action, self.state)))
    }

    fn invalid(&self, now: SimTime, detail: &str) -> Error {
        Error::InvalidTransition {
            at: now,
            detail: format!("counsellor {} cannot {}", self.label, detail),
        }
    }
}
