use desk_sim::error::Error;
use desk_sim::models::{
    ArrivalConfig, ClientConfig, CounsellorRole, DeskConfig, DistributionConfig, FailurePolicy,
    ReplicationConfig, RiskLevel, RiskProfile, ServicePolicy, ShiftConfig, ShiftKind,
};
use desk_sim::runner::{ReplicationOutcome, ReplicationRunner};

fn desk(count: usize, workers: usize) -> DeskConfig {
    DeskConfig {
        start_minute: 540.0,
        horizon_minutes: 480.0,
        roster: vec![
            ShiftConfig {
                name: "day".to_string(),
                kind: ShiftKind::Am,
                role: CounsellorRole::SocialWorker,
                start_minute: 540.0,
                end_minute: 1020.0,
                workers: 2,
                slots: 1,
                breaks: Some(vec![720.0]),
                repeat_daily: true,
            },
            ShiftConfig {
                name: "relief".to_string(),
                kind: ShiftKind::Special,
                role: CounsellorRole::DutyOfficer,
                start_minute: 700.0,
                end_minute: 900.0,
                workers: 1,
                slots: 1,
                breaks: Some(vec![]),
                repeat_daily: true,
            },
            ShiftConfig {
                name: "cover".to_string(),
                kind: ShiftKind::Special,
                role: CounsellorRole::Volunteer,
                start_minute: 700.0,
                end_minute: 900.0,
                workers: 1,
                slots: 2,
                breaks: Some(vec![]),
                repeat_daily: true,
            },
        ],
        arrivals: ArrivalConfig::Poisson { rate_per_hour: 6.0 },
        clients: ClientConfig {
            terms_acceptance: 0.9,
            patience: DistributionConfig::Exponential {
                mean: 8.0,
                loc: 0.0,
            },
            risk: vec![
                RiskProfile {
                    level: RiskLevel::Low,
                    weight: 3.0,
                    chat_duration: DistributionConfig::Gamma {
                        shape: 2.0,
                        scale: 15.0,
                        loc: 0.0,
                    },
                    patience: None,
                },
                RiskProfile {
                    level: RiskLevel::High,
                    weight: 1.0,
                    chat_duration: DistributionConfig::LogNormal {
                        mu: 3.5,
                        sigma: 0.4,
                        loc: 0.0,
                    },
                    patience: Some(DistributionConfig::Constant { value: 15.0 }),
                },
            ],
            user_status: Vec::new(),
        },
        policy: ServicePolicy::default(),
        replications: ReplicationConfig {
            count,
            base_seed: 11,
            workers: Some(workers),
            on_failure: FailurePolicy::Continue,
        },
    }
}

#[test]
fn outcomes_do_not_depend_on_worker_count() {
    let serial = ReplicationRunner::new(desk(6, 1)).unwrap().run().unwrap();
    let parallel = ReplicationRunner::new(desk(6, 4)).unwrap().run().unwrap();
    assert_eq!(serial.outcomes, parallel.outcomes);
    assert_eq!(serial.summary, parallel.summary);
    let indices: Vec<_> = parallel.outcomes.iter().map(|o| o.index()).collect();
    assert_eq!(indices, vec![0, 1, 2, 3, 4, 5]);
    assert_eq!(parallel.summary.succeeded, 6);
    assert!(parallel.summary.mean_wait.is_some());
}

#[test]
fn failed_replication_is_reported_and_others_still_count() {
    let runner = ReplicationRunner::new(desk(4, 2)).unwrap();
    let report = runner
        .run_with(|ctx| {
            if ctx.index == 1 {
                return Err(Error::EventBudgetExhausted(5));
            }
            if ctx.index == 2 {
                panic!("counsellor table corrupted");
            }
            ctx.run()
        })
        .unwrap();

    assert_eq!(report.summary.requested, 4);
    assert_eq!(report.summary.succeeded, 2);
    assert_eq!(report.summary.failed, 2);
    assert_eq!(report.summary.failed_indices, vec![1, 2]);
    assert_eq!(
        report.outcomes[1],
        ReplicationOutcome::Failed {
            index: 1,
            reason: "event budget of 5 events exhausted before the horizon".to_string(),
        }
    );
    assert_eq!(
        report.outcomes[2],
        ReplicationOutcome::Failed {
            index: 2,
            reason: "panicked: counsellor table corrupted".to_string(),
        }
    );
    assert!(report.outcomes[0].result().is_some());
    assert!(report.outcomes[3].result().is_some());
}

#[test]
fn abort_policy_cancels_what_has_not_started() {
    let mut config = desk(4, 1);
    config.replications.on_failure = FailurePolicy::Abort;
    let runner = ReplicationRunner::new(config).unwrap();
    let report = runner
        .run_with(|ctx| {
            if ctx.index == 0 {
                return Err(Error::EventBudgetExhausted(1));
            }
            ctx.run()
        })
        .unwrap();
    assert_eq!(report.summary.failed, 1);
    assert_eq!(report.summary.cancelled, 3);
    assert_eq!(report.summary.succeeded, 0);
    assert!(report.summary.mean_wait.is_none());
}

#[test]
fn cancelled_token_skips_every_replication() {
    let runner = ReplicationRunner::new(desk(3, 2)).unwrap();
    runner.cancel_token().cancel();
    let report = runner.run().unwrap();
    assert!(report
        .outcomes
        .iter()
        .all(|outcome| matches!(outcome, ReplicationOutcome::Cancelled { .. })));
    assert_eq!(report.summary.cancelled, 3);
}

#[test]
fn configuration_errors_stop_the_run_before_it_starts() {
    let mut config = desk(2, 1);
    config.roster.truncate(1);
    config.roster[0].workers = 1;
    config.roster[0].breaks = None;
    let err = ReplicationRunner::new(config).err().unwrap();
    assert_eq!(err, Error::CoverageGap { from: 750.0, to: 810.0 });
    assert!(err.is_configuration());

    let mut config = desk(2, 1);
    config.replications.count = 0;
    assert_eq!(
        ReplicationRunner::new(config).err().unwrap(),
        Error::ReplicationsZero
    );

    let mut config = desk(2, 1);
    config.arrivals = ArrivalConfig::Recorded {
        records: vec![desk_sim::models::ArrivalRecord {
            time: 600.0,
            risk: Some(RiskLevel::Crisis),
            patience: None,
            chat_duration: None,
        }],
    };
    assert!(matches!(
        ReplicationRunner::new(config),
        Err(Error::InvalidArrivals(_))
    ));
}
