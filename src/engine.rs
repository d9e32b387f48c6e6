use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, trace};

use crate::arrivals::{build_source, ArrivalSource};
use crate::clients::{ClientFactory, ClientProfiles};
use crate::clock::EventQueue;
use crate::counsellor::{ActiveChat, Counsellor, CounsellorState};
use crate::error::{Error, Result};
use crate::events::{Arrival, ClientId, CounsellorId, Event, SimTime};
use crate::models::{
    CounsellorKind, CounsellorRole, DeskConfig, RiskLevel, ServicePolicy, ShiftEndPolicy, UserStatus,
};
use crate::queue::WaitingRoom;
use crate::rng::SeedBank;
use crate::roster::Roster;
use crate::state::{Assignment, ChatEnd, Client, ClientState, ReplicationResult};

/// Everything one replication produced.
#[derive(Clone, Debug)]
pub struct RunOutcome {
    pub result: ReplicationResult,
    pub assignments: Vec<Assignment>,
    pub clients: Vec<Client>,
    /// Counsellors on duty after each instant at which the count changed.
    pub staffing: Vec<StaffingSample>,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct StaffingSample {
    pub time: SimTime,
    pub paid_on_duty: usize,
    pub volunteers_on_duty: usize,
}

/// A reneged client's case waiting for a counsellor to close it.
#[derive(Clone, Copy, Debug, PartialEq)]
struct CaseClosure {
    client: ClientId,
    risk: RiskLevel,
    minutes: f64,
}

#[derive(Clone, Debug, Default)]
struct Tally {
    arrivals: u64,
    declined_terms: u64,
    served: u64,
    completed: u64,
    abandoned: u64,
    abandoned_after_transfer: u64,
    transferred: u64,
    cases_closed: u64,
    served_by_status: BTreeMap<UserStatus, u64>,
    total_wait: f64,
    total_abandon_wait: f64,
}

/// One replication of the desk: clock, queue, counsellors and arrivals.
pub struct ServiceOperation {
    policy: ServicePolicy,
    replication: usize,
    seed: u64,
    clock: EventQueue,
    queue: WaitingRoom,
    closures: VecDeque<CaseClosure>,
    counsellors: Vec<Counsellor>,
    idle: BTreeSet<CounsellorId>,
    clients: Vec<Client>,
    arrivals: Box<dyn ArrivalSource>,
    factory: ClientFactory,
    tally: Tally,
    assignments: Vec<Assignment>,
    staffing: Vec<StaffingSample>,
    store_trace: bool,
}

impl ServiceOperation {
    pub fn new(
        config: &DeskConfig,
        roster: &Roster,
        replication: usize,
        base_seed: u64,
    ) -> Result<Self> {
        let profiles = Arc::new(ClientProfiles::new(&config.clients, &config.policy)?);
        Self::with_profiles(config, roster, profiles, replication, base_seed)
    }

    /// Like `new`, reusing client profiles validated once for the whole run.
    pub fn with_profiles(
        config: &DeskConfig,
        roster: &Roster,
        profiles: Arc<ClientProfiles>,
        replication: usize,
        base_seed: u64,
    ) -> Result<Self> {
        let seeds = SeedBank::new(base_seed, replication);
        let (start, end) = (config.start_minute, config.end_minute());
        let mut clock = EventQueue::new(start, end);

        let mut counsellors = Vec::with_capacity(roster.len());
        for (id, shift) in roster.instances().iter().enumerate() {
            let mut counsellor = Counsellor::from_shift(id, shift);
            clock.schedule_at(shift.start, Event::ShiftStart { counsellor: id })?;
            for (window, brk) in shift.breaks.iter().enumerate() {
                let timer = clock.schedule_at(
                    brk.start,
                    Event::BreakStart {
                        counsellor: id,
                        window,
                    },
                )?;
                counsellor.timers.push(timer);
            }
            clock.schedule_at(shift.end, Event::ShiftEnd { counsellor: id })?;
            counsellors.push(counsellor);
        }

        let mut arrivals = build_source(&config.arrivals, start, end, &seeds)?;
        if let Some(first) = arrivals.next_arrival(start) {
            clock.schedule_at(first.time, Event::ClientArrival(first))?;
        }

        Ok(Self {
            policy: config.policy.clone(),
            replication,
            seed: seeds.replication_seed(),
            clock,
            queue: WaitingRoom::new(),
            closures: VecDeque::new(),
            counsellors,
            idle: BTreeSet::new(),
            clients: Vec::new(),
            arrivals,
            factory: ClientFactory::new(profiles, &seeds),
            tally: Tally::default(),
            assignments: Vec::new(),
            staffing: Vec::new(),
            store_trace: false,
        })
    }

    pub fn run(&mut self, store_trace: bool) -> Result<RunOutcome> {
        self.store_trace = store_trace;
        while let Some(scheduled) = self.clock.pop() {
            if self.clock.processed() > self.policy.max_events {
                return Err(Error::EventBudgetExhausted(self.policy.max_events));
            }
            trace!(
                replication = self.replication,
                time = scheduled.time,
                event = scheduled.event.label(),
                "event"
            );
            self.handle(scheduled.event)?;
            // hand out work only once the whole instant has played out
            if !self.clock.more_at_now() {
                self.dispatch()?;
                self.sample_staffing();
            }
        }
        Ok(self.finish())
    }

    fn handle(&mut self, event: Event) -> Result<()> {
        match event {
            Event::ClientArrival(arrival) => self.on_arrival(arrival),
            Event::Renege { client } => self.on_renege(client),
            Event::ChatComplete { counsellor, client } => self.on_chat_complete(counsellor, client),
            Event::WrapUpComplete { counsellor } => self.on_wrap_up_complete(counsellor),
            Event::ShiftStart { counsellor } => {
                self.counsellors[counsellor].sign_in(self.clock.now())?;
                self.idle.insert(counsellor);
                debug!(counsellor = %self.counsellors[counsellor].label, at = self.clock.now(), "signed in");
                Ok(())
            }
            Event::BreakStart { counsellor, window } => self.on_break_start(counsellor, window),
            Event::BreakEnd { counsellor } => {
                self.counsellors[counsellor].end_break(self.clock.now())?;
                self.idle.insert(counsellor);
                Ok(())
            }
            Event::ShiftEnd { counsellor } => self.on_shift_end(counsellor),
        }
    }

    fn on_arrival(&mut self, arrival: Arrival) -> Result<()> {
        let now = self.clock.now();
        if let Some(next) = self.arrivals.next_arrival(now) {
            self.clock.schedule_at(next.time, Event::ClientArrival(next))?;
        }
        self.tally.arrivals += 1;
        let draft = self.factory.draw(&arrival)?;
        if !draft.accepts_terms {
            self.tally.declined_terms += 1;
            return Ok(());
        }
        let id = self.clients.len();
        let mut client = Client::new(
            id,
            now,
            draft.status,
            draft.risk,
            draft.patience,
            draft.chat_duration,
        );
        client.renege = Some(self.clock.schedule(draft.patience, Event::Renege { client: id })?);
        self.clients.push(client);
        self.queue.push_back(id, now);
        Ok(())
    }

    fn on_renege(&mut self, id: ClientId) -> Result<()> {
        let now = self.clock.now();
        let client = &mut self.clients[id];
        client.abandon(now)?;
        self.queue.remove(id);
        self.tally.abandoned += 1;
        self.tally.total_abandon_wait += now - client.arrival_time;
        let minutes = if client.transferred {
            self.tally.abandoned_after_transfer += 1;
            self.policy.postchat_minutes_served
        } else {
            self.policy.postchat_minutes_reneged
        };
        if minutes > 0.0 {
            self.closures.push_back(CaseClosure {
                client: id,
                risk: client.risk,
                minutes,
            });
        }
        debug!(client = id, at = now, "client abandoned");
        Ok(())
    }

    fn on_chat_complete(&mut self, id: CounsellorId, client: ClientId) -> Result<()> {
        let now = self.clock.now();
        let chat = self.counsellors[id].finish_chat(now)?;
        if chat.client != client {
            return Err(Error::InvalidTransition {
                at: now,
                detail: format!(
                    "counsellor {} completed client {} while serving {}",
                    self.counsellors[id].label, client, chat.client
                ),
            });
        }
        self.clients[client].complete(now, now - chat.started_at)?;
        self.tally.completed += 1;
        self.record(id, &chat, ChatEnd::Completed, now);
        let wrap_up = self.policy.postchat_minutes_served;
        if wrap_up > 0.0 {
            return self.start_wrap_up(id, wrap_up);
        }
        self.release(id)
    }

    fn on_wrap_up_complete(&mut self, id: CounsellorId) -> Result<()> {
        self.counsellors[id].end_wrap_up(self.clock.now())?;
        self.release(id)
    }

    /// Frees a counsellor after a chat or wrap-up, or signs them off if
    /// their shift has already ended.
    fn release(&mut self, id: CounsellorId) -> Result<()> {
        if self.counsellors[id].sign_off_pending() {
            return self.sign_off(id);
        }
        self.idle.insert(id);
        Ok(())
    }

    fn start_wrap_up(&mut self, id: CounsellorId, minutes: f64) -> Result<()> {
        let now = self.clock.now();
        let timer = self
            .clock
            .schedule(minutes, Event::WrapUpComplete { counsellor: id })?;
        self.counsellors[id].start_wrap_up(now, timer)?;
        self.idle.remove(&id);
        trace!(counsellor = %self.counsellors[id].label, at = now, until = now + minutes, "wrap-up started");
        Ok(())
    }

    fn on_break_start(&mut self, id: CounsellorId, window: usize) -> Result<()> {
        let now = self.clock.now();
        let counsellor = &mut self.counsellors[id];
        let end = counsellor
            .breaks
            .get(window)
            .map(|brk| brk.end)
            .ok_or_else(|| Error::InvalidTransition {
                at: now,
                detail: format!("counsellor {} has no break {}", counsellor.label, window),
            })?;
        if let Some(timer) = counsellor.take_wrap_up() {
            self.clock.cancel(timer);
        }
        let preempted = counsellor.start_break(now)?;
        self.idle.remove(&id);
        let timer = self.clock.schedule_at(end, Event::BreakEnd { counsellor: id })?;
        self.counsellors[id].timers.push(timer);
        if let Some(chat) = preempted {
            self.hand_back(id, chat)?;
        }
        debug!(counsellor = %self.counsellors[id].label, at = now, until = end, "break started");
        Ok(())
    }

    fn on_shift_end(&mut self, id: CounsellorId) -> Result<()> {
        let now = self.clock.now();
        for timer in std::mem::take(&mut self.counsellors[id].timers) {
            self.clock.cancel(timer);
        }
        let busy = matches!(
            self.counsellors[id].state(),
            CounsellorState::Serving | CounsellorState::WrapUp
        );
        if busy && self.policy.shift_end == ShiftEndPolicy::FinishChat {
            self.counsellors[id].defer_sign_off(now)?;
            debug!(counsellor = %self.counsellors[id].label, at = now, "finishing last chat");
            return Ok(());
        }
        self.sign_off(id)
    }

    fn sign_off(&mut self, id: CounsellorId) -> Result<()> {
        let now = self.clock.now();
        if let Some(timer) = self.counsellors[id].take_wrap_up() {
            self.clock.cancel(timer);
        }
        let preempted = self.counsellors[id].sign_off(now)?;
        self.idle.remove(&id);
        if let Some(chat) = preempted {
            self.hand_back(id, chat)?;
        }
        debug!(counsellor = %self.counsellors[id].label, at = now, "signed off");
        Ok(())
    }

    /// Returns an interrupted client to the front of the queue with the rest
    /// of their chat and a fresh reneging deadline.
    fn hand_back(&mut self, counsellor: CounsellorId, chat: ActiveChat) -> Result<()> {
        let now = self.clock.now();
        self.clock.cancel(chat.completion);
        let client = &mut self.clients[chat.client];
        client.preempt(now, now - chat.started_at)?;
        let patience = client.patience;
        let arrival_time = client.arrival_time;
        client.renege_at = now + patience;
        client.renege = Some(self.clock.schedule(
            patience,
            Event::Renege {
                client: chat.client,
            },
        )?);
        self.queue.requeue_front(chat.client, arrival_time);
        self.tally.transferred += 1;
        self.record(counsellor, &chat, ChatEnd::Preempted, now);
        debug!(client = chat.client, at = now, "chat handed back to the queue");
        Ok(())
    }

    /// Hands open case closures, then waiting clients, to free counsellors,
    /// oldest first.
    fn dispatch(&mut self) -> Result<()> {
        let now = self.clock.now();
        let cutoff = self.policy.cutoff_minutes;
        let mut next = 0;
        while next < self.closures.len() && !self.idle.is_empty() {
            let closure = self.closures[next];
            let counsellors = &self.counsellors;
            let found = self
                .idle
                .iter()
                .copied()
                .find(|c| counsellors[*c].can_take(closure.risk, now, cutoff));
            let Some(counsellor) = found else {
                next += 1;
                continue;
            };
            self.closures.remove(next);
            self.tally.cases_closed += 1;
            trace!(client = closure.client, "closing reneged case");
            self.start_wrap_up(counsellor, closure.minutes)?;
        }
        while !self.idle.is_empty() && !self.queue.is_empty() {
            let mut chosen = None;
            let clients = &self.clients;
            let counsellors = &self.counsellors;
            let idle = &self.idle;
            let picked = self.queue.take_first(|id| {
                let client = &clients[id];
                // a client whose patience runs out now leaves instead
                if client.renege_at <= now {
                    return false;
                }
                chosen = idle
                    .iter()
                    .copied()
                    .find(|c| counsellors[*c].can_take(client.risk, now, cutoff));
                chosen.is_some()
            });
            match (picked, chosen) {
                (Some(client), Some(counsellor)) => self.start_chat(client, counsellor)?,
                _ => break,
            }
        }
        Ok(())
    }

    fn start_chat(&mut self, id: ClientId, counsellor: CounsellorId) -> Result<()> {
        let now = self.clock.now();
        let client = &mut self.clients[id];
        if let Some(renege) = client.renege.take() {
            self.clock.cancel(renege);
        }
        if client.start_service(now)? {
            self.tally.served += 1;
            *self.tally.served_by_status.entry(client.status).or_default() += 1;
            self.tally.total_wait += now - client.arrival_time;
        }
        let completion = self.clock.schedule(
            client.remaining,
            Event::ChatComplete {
                counsellor,
                client: id,
            },
        )?;
        self.counsellors[counsellor].start_chat(now, id, completion)?;
        self.idle.remove(&counsellor);
        debug!(client = id, counsellor = %self.counsellors[counsellor].label, at = now, "chat started");
        Ok(())
    }

    fn record(&mut self, counsellor: CounsellorId, chat: &ActiveChat, end: ChatEnd, at: SimTime) {
        if !self.store_trace {
            return;
        }
        self.assignments.push(Assignment {
            client: chat.client,
            counsellor,
            counsellor_label: self.counsellors[counsellor].label.clone(),
            started_at: chat.started_at,
            ended_at: at,
            end,
        });
    }

    fn sample_staffing(&mut self) {
        if !self.store_trace {
            return;
        }
        let (mut paid, mut volunteers) = (0, 0);
        for counsellor in self.counsellors.iter().filter(|c| c.is_on_duty()) {
            match counsellor.kind() {
                CounsellorKind::Paid => paid += 1,
                CounsellorKind::Volunteer => volunteers += 1,
            }
        }
        let unchanged = self
            .staffing
            .last()
            .is_some_and(|last| last.paid_on_duty == paid && last.volunteers_on_duty == volunteers);
        if unchanged {
            return;
        }
        self.staffing.push(StaffingSample {
            time: self.clock.now(),
            paid_on_duty: paid,
            volunteers_on_duty: volunteers,
        });
    }

    fn finish(&mut self) -> RunOutcome {
        let end = self.clock.horizon();
        let mut in_service_at_end = 0;
        for id in 0..self.counsellors.len() {
            self.counsellors[id].close(end);
            let Some(chat) = self.counsellors[id].active_chat() else {
                continue;
            };
            in_service_at_end += 1;
            self.clients[chat.client].chat_minutes += end - chat.started_at;
            self.record(id, &chat, ChatEnd::InProgress, end);
        }

        let mut busy: BTreeMap<CounsellorKind, (f64, f64)> = BTreeMap::new();
        let mut busy_by_role: BTreeMap<CounsellorRole, (f64, f64)> = BTreeMap::new();
        for counsellor in &self.counsellors {
            let kind = busy.entry(counsellor.kind()).or_default();
            kind.0 += counsellor.busy_minutes();
            kind.1 += counsellor.on_duty_minutes();
            let role = busy_by_role.entry(counsellor.role).or_default();
            role.0 += counsellor.busy_minutes();
            role.1 += counsellor.on_duty_minutes();
        }

        let tally = &self.tally;
        let entered_queue = self.clients.len() as u64;
        let n_valid_chats = self
            .clients
            .iter()
            .filter(|client| client.chat_minutes >= self.policy.valid_chat_minutes)
            .count() as u64;
        let waiting_at_end = self
            .clients
            .iter()
            .filter(|client| client.state == ClientState::Waiting)
            .count();
        let result = ReplicationResult {
            replication: self.replication,
            seed: self.seed,
            arrivals: tally.arrivals,
            declined_terms: tally.declined_terms,
            entered_queue,
            n_served: tally.served,
            n_completed: tally.completed,
            n_abandoned: tally.abandoned,
            n_abandoned_after_transfer: tally.abandoned_after_transfer,
            n_transferred: tally.transferred,
            n_valid_chats,
            n_cases_closed: tally.cases_closed,
            waiting_at_end,
            in_service_at_end,
            mean_wait: ratio(tally.total_wait, tally.served as f64),
            mean_abandon_wait: ratio(tally.total_abandon_wait, tally.abandoned as f64),
            abandonment_rate: ratio(tally.abandoned as f64, entered_queue as f64),
            max_queue_length: self.queue.max_len(),
            utilization: busy
                .into_iter()
                .map(|(kind, (busy, on_duty))| (kind, ratio(busy, on_duty)))
                .collect(),
            utilization_by_role: busy_by_role
                .into_iter()
                .map(|(role, (busy, on_duty))| (role, ratio(busy, on_duty)))
                .collect(),
            served_by_status: tally.served_by_status.clone(),
        };
        debug!(
            replication = self.replication,
            served = result.n_served,
            abandoned = result.n_abandoned,
            events = self.clock.processed(),
            "replication finished"
        );
        RunOutcome {
            result,
            assignments: std::mem::take(&mut self.assignments),
            clients: std::mem::take(&mut self.clients),
            staffing: std::mem::take(&mut self.staffing),
        }
    }
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator <= 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

/// Runs one replication and keeps only its result.
pub fn run_replication(
    config: &DeskConfig,
    roster: &Roster,
    replication: usize,
    base_seed: u64,
) -> Result<ReplicationResult> {
    let mut operation = ServiceOperation::new(config, roster, replication, base_seed)?;
    Ok(operation.run(false)?.result)
}
