use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("roster must contain at least one shift")]
    EmptyRoster,
    #[error("roster leaves desk uncovered between minute {from} and minute {to}")]
    CoverageGap { from: f64, to: f64 },
    #[error("invalid shift '{name}': {reason}")]
    InvalidShift { name: String, reason: String },
    #[error("invalid break in shift '{name}': {reason}")]
    InvalidBreak { name: String, reason: String },
    #[error("invalid {what} distribution: {reason}")]
    InvalidDistribution { what: String, reason: String },
    #[error("invalid arrival rate: {0}")]
    InvalidRate(String),
    #[error("invalid arrivals: {0}")]
    InvalidArrivals(String),
    #[error("horizon must be > 0 minutes (got {0})")]
    InvalidHorizon(f64),
    #[error("{what} must be a probability in [0, 1] (got {value})")]
    InvalidProbability { what: String, value: f64 },
    #[error("invalid policy: {0}")]
    InvalidPolicy(String),
    #[error("replications must be greater than 0")]
    ReplicationsZero,
    #[error("event scheduled in the past: now={now}, requested={requested}")]
    SchedulingInvariantViolation { now: f64, requested: f64 },
    #[error("invalid transition at minute {at}: {detail}")]
    InvalidTransition { at: f64, detail: String },
    #[error("event budget of {0} events exhausted before the horizon")]
    EventBudgetExhausted(u64),
    #[error("worker pool: {0}")]
    WorkerPool(String),
    #[error("{0}")]
    ConfigIo(String),
    #[error("{0}")]
    ConfigParse(String),
    #[error("unsupported config format '{0}'")]
    UnsupportedConfigFormat(String),
    #[error("{0}")]
    Cli(String),
    #[error("logging: {0}")]
    Logging(String),
}

impl Error {
    /// Errors raised while validating input, before any simulated time passes.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::EmptyRoster
                | Error::CoverageGap { .. }
                | Error::InvalidShift { .. }
                | Error::InvalidBreak { .. }
                | Error::InvalidDistribution { .. }
                | Error::InvalidRate(_)
                | Error::InvalidArrivals(_)
                | Error::InvalidHorizon(_)
                | Error::InvalidProbability { .. }
                | Error::InvalidPolicy(_)
                | Error::ReplicationsZero
                | Error::ConfigIo(_)
                | Error::ConfigParse(_)
                | Error::UnsupportedConfigFormat(_)
                | Error::Cli(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
