use desk_sim::engine::{run_replication, ServiceOperation};
use desk_sim::error::Error;
use desk_sim::models::{
    ArrivalConfig, ArrivalRecord, ClientConfig, CounsellorRole, DeskConfig, DistributionConfig,
    RateSegment, ReplicationConfig, RiskLevel, RiskProfile, ServicePolicy, ShiftConfig,
    ShiftEndPolicy, ShiftKind, UserStatus,
};
use desk_sim::roster::Roster;
use desk_sim::state::{ChatEnd, ClientState};

fn shift(name: &str, role: CounsellorRole, start: f64, end: f64, breaks: Vec<f64>) -> ShiftConfig {
    ShiftConfig {
        name: name.to_string(),
        kind: ShiftKind::Am,
        role,
        start_minute: start,
        end_minute: end,
        workers: 1,
        slots: 1,
        breaks: Some(breaks),
        repeat_daily: true,
    }
}

fn record(time: f64, patience: f64, chat_duration: f64) -> ArrivalRecord {
    ArrivalRecord {
        time,
        risk: None,
        patience: Some(patience),
        chat_duration: Some(chat_duration),
    }
}

fn clients() -> ClientConfig {
    ClientConfig {
        terms_acceptance: 1.0,
        patience: DistributionConfig::Constant { value: 600.0 },
        risk: vec![
            RiskProfile {
                level: RiskLevel::Low,
                weight: 1.0,
                chat_duration: DistributionConfig::Constant { value: 20.0 },
                patience: None,
            },
            RiskProfile {
                level: RiskLevel::Crisis,
                weight: 0.0,
                chat_duration: DistributionConfig::Constant { value: 45.0 },
                patience: None,
            },
        ],
        user_status: Vec::new(),
    }
}

/// 09:00 to 17:00 on day 0.
fn office_hours(roster: Vec<ShiftConfig>, records: Vec<ArrivalRecord>) -> DeskConfig {
    DeskConfig {
        start_minute: 540.0,
        horizon_minutes: 480.0,
        roster,
        arrivals: ArrivalConfig::Recorded { records },
        clients: clients(),
        policy: ServicePolicy::default(),
        replications: ReplicationConfig::default(),
    }
}

fn run(config: &DeskConfig) -> desk_sim::engine::RunOutcome {
    let roster = Roster::build(config).expect("roster should build");
    let mut operation = ServiceOperation::new(config, &roster, 0, 1).expect("operation");
    operation.run(true).expect("run should succeed")
}

#[test]
fn client_arriving_inside_cutoff_is_not_picked_up() {
    let config = office_hours(
        vec![shift("day", CounsellorRole::SocialWorker, 540.0, 1020.0, vec![])],
        vec![record(1005.0, 600.0, 20.0)],
    );
    let outcome = run(&config);
    assert_eq!(outcome.result.n_served, 0);
    assert_eq!(outcome.result.waiting_at_end, 1);
    assert_eq!(outcome.clients[0].state, ClientState::Waiting);
    assert!(outcome.assignments.is_empty());
}

#[test]
fn break_preempts_chat_and_client_resumes_after_it() {
    // "busy" holds a long chat so nobody else can take the handed-back client
    let config = office_hours(
        vec![
            shift("busy", CounsellorRole::SocialWorker, 540.0, 1020.0, vec![]),
            shift("lunch", CounsellorRole::SocialWorker, 540.0, 1020.0, vec![720.0]),
        ],
        vec![record(600.0, 600.0, 400.0), record(700.0, 600.0, 30.0)],
    );
    let outcome = run(&config);

    let second: Vec<_> = outcome
        .assignments
        .iter()
        .filter(|assignment| assignment.client == 1)
        .map(|assignment| {
            (
                assignment.counsellor_label.as_str(),
                assignment.started_at,
                assignment.ended_at,
                assignment.end,
            )
        })
        .collect();
    assert_eq!(
        second,
        vec![
            ("lunch-1.1@d0", 700.0, 720.0, ChatEnd::Preempted),
            ("lunch-1.1@d0", 780.0, 790.0, ChatEnd::Completed),
        ]
    );
    let client = &outcome.clients[1];
    assert_eq!(client.state, ClientState::Completed);
    assert!(client.transferred);
    assert_eq!(client.chat_minutes, 30.0);
    assert_eq!(outcome.result.n_transferred, 1);
    assert_eq!(outcome.result.n_served, 2);
    assert_eq!(outcome.result.n_completed, 2);
    assert_eq!(outcome.result.mean_wait, 0.0);
}

#[test]
fn impatient_client_abandons_while_everyone_is_busy() {
    let config = office_hours(
        vec![shift("day", CounsellorRole::DutyOfficer, 540.0, 1020.0, vec![])],
        vec![record(600.0, 600.0, 10.0), record(601.0, 5.0, 20.0)],
    );
    let outcome = run(&config);
    let client = &outcome.clients[1];
    assert_eq!(client.state, ClientState::Abandoned);
    assert_eq!(client.left_at, Some(606.0));
    assert_eq!(client.first_service, None);
    assert_eq!(outcome.result.n_abandoned, 1);
    assert_eq!(outcome.result.mean_abandon_wait, 5.0);
    assert_eq!(outcome.result.abandonment_rate, 0.5);
}

#[test]
fn abandonment_wins_a_same_instant_race() {
    let config = office_hours(
        vec![shift("day", CounsellorRole::DutyOfficer, 540.0, 1020.0, vec![])],
        vec![record(600.0, 600.0, 10.0), record(605.0, 5.0, 20.0)],
    );
    let outcome = run(&config);
    assert_eq!(outcome.clients[1].state, ClientState::Abandoned);
    assert_eq!(outcome.clients[1].left_at, Some(610.0));
    assert!(outcome.assignments.iter().all(|a| a.client != 1));
}

#[test]
fn waiting_clients_are_served_first_come_first_served() {
    let config = office_hours(
        vec![shift("day", CounsellorRole::SocialWorker, 540.0, 1020.0, vec![])],
        vec![
            record(600.0, 600.0, 30.0),
            record(601.0, 600.0, 5.0),
            record(602.0, 600.0, 5.0),
            record(603.0, 600.0, 5.0),
        ],
    );
    let outcome = run(&config);
    let order: Vec<_> = outcome
        .assignments
        .iter()
        .map(|assignment| (assignment.client, assignment.started_at))
        .collect();
    assert_eq!(
        order,
        vec![(0, 600.0), (1, 630.0), (2, 635.0), (3, 640.0)]
    );
}

#[test]
fn counsellor_freed_as_their_break_starts_takes_no_new_chat() {
    let config = office_hours(
        vec![
            shift("busy", CounsellorRole::SocialWorker, 540.0, 1020.0, vec![]),
            shift("lunch", CounsellorRole::SocialWorker, 540.0, 1020.0, vec![720.0]),
        ],
        vec![
            record(600.0, 600.0, 400.0),
            record(700.0, 600.0, 20.0),
            record(705.0, 600.0, 30.0),
        ],
    );
    let outcome = run(&config);
    let third: Vec<_> = outcome
        .assignments
        .iter()
        .filter(|assignment| assignment.client == 2)
        .map(|assignment| {
            (
                assignment.counsellor_label.as_str(),
                assignment.started_at,
                assignment.ended_at,
                assignment.end,
            )
        })
        .collect();
    assert_eq!(third, vec![("lunch-1.1@d0", 780.0, 810.0, ChatEnd::Completed)]);
    assert_eq!(outcome.result.n_transferred, 0);
    assert_eq!(outcome.result.n_served, 3);
    assert_eq!(outcome.result.mean_wait, 25.0);
}

#[test]
fn post_chat_wrap_up_delays_the_next_pickup() {
    let mut config = office_hours(
        vec![shift("day", CounsellorRole::SocialWorker, 540.0, 1020.0, vec![])],
        vec![record(600.0, 600.0, 10.0), record(605.0, 600.0, 20.0)],
    );
    config.policy.postchat_minutes_served = 20.0;
    let outcome = run(&config);
    let starts: Vec<_> = outcome
        .assignments
        .iter()
        .map(|assignment| (assignment.client, assignment.started_at))
        .collect();
    assert_eq!(starts, vec![(0, 600.0), (1, 630.0)]);
    assert_eq!(outcome.result.mean_wait, 12.5);
    assert_eq!(outcome.result.served_by_status[&UserStatus::Regular], 2);
    assert_eq!(outcome.result.n_cases_closed, 0);
}

#[test]
fn reneged_case_is_closed_before_the_next_client_is_served() {
    let mut config = office_hours(
        vec![shift("day", CounsellorRole::SocialWorker, 540.0, 1020.0, vec![])],
        vec![
            record(600.0, 600.0, 30.0),
            record(601.0, 5.0, 20.0),
            record(610.0, 600.0, 20.0),
        ],
    );
    config.policy.postchat_minutes_reneged = 5.0;
    let outcome = run(&config);
    assert_eq!(outcome.clients[1].state, ClientState::Abandoned);
    assert_eq!(outcome.clients[2].first_service, Some(635.0));
    assert_eq!(outcome.result.n_cases_closed, 1);
}

#[test]
fn paid_staff_stay_on_duty_through_breaks_and_handovers() {
    let roster = vec![
        shift("a", CounsellorRole::SocialWorker, 0.0, 720.0, vec![240.0]),
        shift("b", CounsellorRole::DutyOfficer, 0.0, 720.0, vec![480.0]),
        shift("c", CounsellorRole::SocialWorker, 720.0, 1440.0, vec![960.0]),
        shift("d", CounsellorRole::DutyOfficer, 720.0, 1440.0, vec![1200.0]),
    ];
    let config = DeskConfig {
        start_minute: 0.0,
        horizon_minutes: 2880.0,
        roster,
        arrivals: ArrivalConfig::Poisson { rate_per_hour: 3.0 },
        clients: clients(),
        policy: ServicePolicy::default(),
        replications: ReplicationConfig::default(),
    };
    let outcome = run(&config);
    let samples = &outcome.staffing;
    assert!(!samples.is_empty());
    assert_eq!(samples[0].time, 0.0);
    assert_eq!(samples[0].paid_on_duty, 2);
    for sample in samples.iter().filter(|sample| sample.time < 2880.0) {
        assert!(sample.paid_on_duty >= 1, "nobody paid on duty at {:?}", sample);
        assert_eq!(sample.volunteers_on_duty, 0);
    }
    assert!(samples.windows(2).all(|pair| pair[0].time < pair[1].time));
}

#[test]
fn volunteers_leave_crisis_clients_to_paid_staff() {
    let mut crisis = record(600.0, 600.0, 45.0);
    crisis.risk = Some(RiskLevel::Crisis);
    let mut low = record(601.0, 600.0, 20.0);
    low.risk = Some(RiskLevel::Low);
    let config = office_hours(
        vec![
            shift("vol", CounsellorRole::Volunteer, 540.0, 1020.0, vec![]),
            shift("sw", CounsellorRole::SocialWorker, 540.0, 1020.0, vec![]),
        ],
        vec![crisis, low],
    );
    let outcome = run(&config);
    let served_by: Vec<_> = outcome
        .assignments
        .iter()
        .map(|assignment| (assignment.client, assignment.counsellor_label.as_str()))
        .collect();
    assert_eq!(served_by, vec![(1, "vol-1.1@d0"), (0, "sw-1.1@d0")]);
}

fn late_handover(policy: ShiftEndPolicy) -> desk_sim::engine::RunOutcome {
    let mut config = office_hours(
        vec![
            shift("day", CounsellorRole::SocialWorker, 540.0, 1020.0, vec![]),
            shift("late", CounsellorRole::SocialWorker, 960.0, 1440.0, vec![]),
        ],
        vec![record(985.0, 600.0, 60.0)],
    );
    config.horizon_minutes = 900.0;
    config.policy.shift_end = policy;
    run(&config)
}

#[test]
fn finish_chat_policy_drains_the_last_chat() {
    let outcome = late_handover(ShiftEndPolicy::FinishChat);
    assert_eq!(outcome.result.n_transferred, 0);
    assert_eq!(outcome.assignments.len(), 1);
    assert_eq!(outcome.assignments[0].counsellor_label, "day-1.1@d0");
    assert_eq!(outcome.assignments[0].ended_at, 1045.0);
}

#[test]
fn hand_over_policy_passes_the_chat_on_at_shift_end() {
    let outcome = late_handover(ShiftEndPolicy::HandOver);
    assert_eq!(outcome.result.n_transferred, 1);
    let legs: Vec<_> = outcome
        .assignments
        .iter()
        .map(|a| (a.counsellor_label.as_str(), a.started_at, a.ended_at, a.end))
        .collect();
    assert_eq!(
        legs,
        vec![
            ("day-1.1@d0", 985.0, 1020.0, ChatEnd::Preempted),
            ("late-1.1@d0", 1020.0, 1045.0, ChatEnd::Completed),
        ]
    );
}

#[test]
fn short_chats_do_not_count_as_valid() {
    let config = office_hours(
        vec![shift("day", CounsellorRole::SocialWorker, 540.0, 1020.0, vec![])],
        vec![record(600.0, 600.0, 5.0), record(700.0, 600.0, 10.0)],
    );
    let outcome = run(&config);
    assert_eq!(outcome.result.n_completed, 2);
    assert_eq!(outcome.result.n_valid_chats, 1);
}

#[test]
fn declined_terms_never_reach_the_queue() {
    let mut config = office_hours(
        vec![shift("day", CounsellorRole::SocialWorker, 540.0, 1020.0, vec![])],
        vec![record(600.0, 600.0, 5.0), record(700.0, 600.0, 10.0)],
    );
    config.clients.terms_acceptance = 0.0;
    let outcome = run(&config);
    assert_eq!(outcome.result.arrivals, 2);
    assert_eq!(outcome.result.declined_terms, 2);
    assert_eq!(outcome.result.entered_queue, 0);
    assert_eq!(outcome.result.abandonment_rate, 0.0);
}

#[test]
fn utilization_is_busy_over_on_duty_time() {
    let config = office_hours(
        vec![shift("day", CounsellorRole::SocialWorker, 540.0, 1020.0, vec![])],
        vec![record(600.0, 600.0, 120.0)],
    );
    let outcome = run(&config);
    let paid = outcome.result.utilization[&desk_sim::models::CounsellorKind::Paid];
    assert_eq!(paid, 120.0 / 480.0);
    assert_eq!(
        outcome.result.utilization_by_role[&CounsellorRole::SocialWorker],
        0.25
    );
}

fn busy_week() -> DeskConfig {
    let mut config = office_hours(
        vec![
            shift("early", CounsellorRole::SocialWorker, 0.0, 780.0, vec![300.0]),
            shift("day", CounsellorRole::DutyOfficer, 240.0, 1020.0, vec![600.0]),
            shift("late", CounsellorRole::SocialWorker, 720.0, 1440.0, vec![]),
            shift("vol", CounsellorRole::Volunteer, 1080.0, 1320.0, vec![]),
        ],
        Vec::new(),
    );
    config.start_minute = 0.0;
    config.horizon_minutes = 3.0 * 1440.0;
    config.arrivals = ArrivalConfig::Thinning {
        segments: vec![
            RateSegment {
                start_minute: 0.0,
                rate_per_hour: 1.0,
            },
            RateSegment {
                start_minute: 480.0,
                rate_per_hour: 4.0,
            },
            RateSegment {
                start_minute: 1200.0,
                rate_per_hour: 2.0,
            },
        ],
        period_minutes: Some(1440.0),
    };
    config.clients.patience = DistributionConfig::Exponential {
        mean: 5.29,
        loc: 0.0,
    };
    config.clients.risk[0].chat_duration = DistributionConfig::Beta {
        alpha: 1.67,
        beta: 4.64,
        scale: 190.5,
        loc: 0.0,
    };
    config.clients.risk[1].weight = 0.2;
    config.clients.terms_acceptance = 0.748;
    config
}

#[test]
fn same_seed_gives_bit_identical_results() {
    let config = busy_week();
    let roster = Roster::build(&config).unwrap();
    let first = run_replication(&config, &roster, 3, 99).unwrap();
    let second = run_replication(&config, &roster, 3, 99).unwrap();
    assert_eq!(first, second);
    assert!(first.arrivals > 0);

    let other = run_replication(&config, &roster, 4, 99).unwrap();
    assert_ne!(first.seed, other.seed);
}

#[test]
fn every_arrival_is_accounted_for() {
    let config = busy_week();
    let roster = Roster::build(&config).unwrap();
    let mut operation = ServiceOperation::new(&config, &roster, 0, 728).unwrap();
    let outcome = operation.run(false).unwrap();
    let result = &outcome.result;
    assert_eq!(result.arrivals, result.declined_terms + result.entered_queue);
    let completed = outcome
        .clients
        .iter()
        .filter(|c| c.state == ClientState::Completed)
        .count() as u64;
    assert_eq!(completed, result.n_completed);
    assert_eq!(
        result.entered_queue,
        result.n_completed
            + result.n_abandoned
            + result.waiting_at_end as u64
            + result.in_service_at_end as u64
    );
    for client in &outcome.clients {
        if client.state == ClientState::Abandoned {
            let waited = client.left_at.unwrap() - client.arrival_time;
            assert!(client.transferred || waited <= client.patience + 1e-9);
        }
    }
    assert!(outcome.assignments.is_empty());
}

#[test]
fn event_budget_stops_a_runaway_replication() {
    let mut config = busy_week();
    config.policy.max_events = 10;
    let roster = Roster::build(&config).unwrap();
    let err = run_replication(&config, &roster, 0, 1).unwrap_err();
    assert_eq!(err, Error::EventBudgetExhausted(10));
}
