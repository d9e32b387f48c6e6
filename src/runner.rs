//! Parallel replications.
//!
//! Each replication builds its own [`ServiceOperation`] on a rayon worker and
//! shares nothing mutable with the others; results are collected in index
//! order and reduced by [`summary::aggregate`].

use rayon::prelude::*;
use serde::Serialize;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use crate::arrivals::build_source;
use crate::clients::ClientProfiles;
use crate::engine::ServiceOperation;
use crate::error::{Error, Result};
use crate::models::{ArrivalConfig, DeskConfig, FailurePolicy};
use crate::rng::SeedBank;
use crate::roster::Roster;
use crate::state::ReplicationResult;
use crate::summary::{self, Summary};

/// Stops replications that have not started yet.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum ReplicationOutcome {
    Completed(ReplicationResult),
    Failed { index: usize, reason: String },
    Cancelled { index: usize },
}

impl ReplicationOutcome {
    pub fn index(&self) -> usize {
        match self {
            ReplicationOutcome::Completed(result) => result.replication,
            ReplicationOutcome::Failed { index, .. } | ReplicationOutcome::Cancelled { index } => {
                *index
            }
        }
    }

    pub fn result(&self) -> Option<&ReplicationResult> {
        match self {
            ReplicationOutcome::Completed(result) => Some(result),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RunReport {
    pub base_seed: u64,
    pub outcomes: Vec<ReplicationOutcome>,
    pub summary: Summary,
}

/// What a replication job gets to work with.
pub struct ReplicationContext<'a> {
    pub index: usize,
    pub base_seed: u64,
    pub config: &'a DeskConfig,
    pub roster: &'a Roster,
    pub profiles: &'a Arc<ClientProfiles>,
}

impl ReplicationContext<'_> {
    pub fn run(&self) -> Result<ReplicationResult> {
        let mut operation = ServiceOperation::with_profiles(
            self.config,
            self.roster,
            Arc::clone(self.profiles),
            self.index,
            self.base_seed,
        )?;
        Ok(operation.run(false)?.result)
    }
}

pub struct ReplicationRunner {
    config: Arc<DeskConfig>,
    roster: Arc<Roster>,
    profiles: Arc<ClientProfiles>,
    cancel: CancelToken,
}

impl ReplicationRunner {
    /// Validates the whole configuration; nothing is simulated if this fails.
    pub fn new(config: DeskConfig) -> Result<Self> {
        config.validate()?;
        let profiles = ClientProfiles::new(&config.clients, &config.policy)?;
        if let ArrivalConfig::Recorded { records } = &config.arrivals {
            if let Some(record) = records
                .iter()
                .find(|record| record.risk.is_some_and(|level| !profiles.covers(level)))
            {
                return Err(Error::InvalidArrivals(format!(
                    "arrival at minute {} uses a risk level with no profile",
                    record.time
                )));
            }
        }
        build_source(
            &config.arrivals,
            config.start_minute,
            config.end_minute(),
            &SeedBank::new(config.replications.base_seed, 0),
        )?;
        let roster = Roster::build(&config)?;
        Ok(Self {
            config: Arc::new(config),
            roster: Arc::new(roster),
            profiles: Arc::new(profiles),
            cancel: CancelToken::new(),
        })
    }

    pub fn config(&self) -> &DeskConfig {
        &self.config
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn run(&self) -> Result<RunReport> {
        self.run_with(|ctx| ctx.run())
    }

    /// Runs `job` once per replication on the worker pool.
    pub fn run_with<F>(&self, job: F) -> Result<RunReport>
    where
        F: Fn(&ReplicationContext<'_>) -> Result<ReplicationResult> + Sync + Send,
    {
        let replications = &self.config.replications;
        let mut builder = rayon::ThreadPoolBuilder::new();
        if let Some(workers) = replications.workers {
            builder = builder.num_threads(workers);
        }
        let pool = builder
            .build()
            .map_err(|err| Error::WorkerPool(err.to_string()))?;
        info!(
            replications = replications.count,
            base_seed = replications.base_seed,
            workers = pool.current_num_threads(),
            "starting replications"
        );

        let outcomes: Vec<ReplicationOutcome> = pool.install(|| {
            (0..replications.count)
                .into_par_iter()
                .map(|index| self.run_one(index, &job))
                .collect()
        });
        let summary = summary::aggregate(&outcomes);
        info!(
            succeeded = summary.succeeded,
            requested = summary.requested,
            "replications finished"
        );
        Ok(RunReport {
            base_seed: replications.base_seed,
            outcomes,
            summary,
        })
    }

    fn run_one<F>(&self, index: usize, job: &F) -> ReplicationOutcome
    where
        F: Fn(&ReplicationContext<'_>) -> Result<ReplicationResult> + Sync + Send,
    {
        if self.cancel.is_cancelled() {
            return ReplicationOutcome::Cancelled { index };
        }
        let ctx = ReplicationContext {
            index,
            base_seed: self.config.replications.base_seed,
            config: &self.config,
            roster: &self.roster,
            profiles: &self.profiles,
        };
        let reason = match panic::catch_unwind(AssertUnwindSafe(|| job(&ctx))) {
            Ok(Ok(result)) => return ReplicationOutcome::Completed(result),
            Ok(Err(err)) => err.to_string(),
            Err(payload) => format!("panicked: {}", panic_message(payload.as_ref())),
        };
        warn!(replication = index, %reason, "replication failed");
        if self.config.replications.on_failure == FailurePolicy::Abort {
            self.cancel.cancel();
        }
        ReplicationOutcome::Failed { index, reason }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
