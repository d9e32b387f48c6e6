use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::error::{Error, Result};

pub const MINUTES_PER_DAY: f64 = 1440.0;

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct DeskConfig {
    #[serde(default)]
    pub start_minute: f64,
    pub horizon_minutes: f64,
    pub roster: Vec<ShiftConfig>,
    pub arrivals: ArrivalConfig,
    pub clients: ClientConfig,
    #[serde(default)]
    pub policy: ServicePolicy,
    #[serde(default)]
    pub replications: ReplicationConfig,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct ShiftConfig {
    pub name: String,
    pub kind: ShiftKind,
    pub role: CounsellorRole,
    pub start_minute: f64,
    pub end_minute: f64,
    #[serde(default = "default_one")]
    pub workers: u32,
    #[serde(default = "default_one")]
    pub slots: u32,
    /// Break start times on the same clock as `start_minute`/`end_minute`.
    /// `None` uses the kind's default placement.
    #[serde(default)]
    pub breaks: Option<Vec<f64>>,
    #[serde(default = "default_true")]
    pub repeat_daily: bool,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ShiftKind {
    Am,
    Pm,
    Special,
    Graveyard,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum CounsellorRole {
    DutyOfficer,
    SocialWorker,
    Volunteer,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum CounsellorKind {
    Paid,
    Volunteer,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Crisis,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(tag = "source", rename_all = "kebab-case")]
pub enum ArrivalConfig {
    Poisson {
        rate_per_hour: f64,
    },
    Thinning {
        segments: Vec<RateSegment>,
        #[serde(default)]
        period_minutes: Option<f64>,
    },
    Interarrivals {
        #[serde(default)]
        gaps: Vec<f64>,
        #[serde(default = "default_true")]
        cycle: bool,
    },
    Recorded {
        records: Vec<ArrivalRecord>,
    },
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq)]
pub struct RateSegment {
    pub start_minute: f64,
    pub rate_per_hour: f64,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq)]
pub struct ArrivalRecord {
    pub time: f64,
    #[serde(default)]
    pub risk: Option<RiskLevel>,
    #[serde(default)]
    pub patience: Option<f64>,
    #[serde(default)]
    pub chat_duration: Option<f64>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct ClientConfig {
    #[serde(default = "default_probability_one")]
    pub terms_acceptance: f64,
    pub patience: DistributionConfig,
    pub risk: Vec<RiskProfile>,
    /// Repeated versus first-time users. Empty means every client is
    /// `regular` and risk follows the mix in `risk`.
    #[serde(default)]
    pub user_status: Vec<StatusProfile>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct StatusProfile {
    pub status: UserStatus,
    pub weight: f64,
    /// Risk weights for clients of this status, replacing the `risk` weights.
    #[serde(default)]
    pub risk_weights: Option<BTreeMap<RiskLevel, f64>>,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[serde(rename_all = "kebab-case")]
pub enum UserStatus {
    #[default]
    Regular,
    Repeated,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct RiskProfile {
    pub level: RiskLevel,
    pub weight: f64,
    pub chat_duration: DistributionConfig,
    #[serde(default)]
    pub patience: Option<DistributionConfig>,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq)]
#[serde(tag = "family", rename_all = "kebab-case")]
pub enum DistributionConfig {
    Constant {
        value: f64,
    },
    Exponential {
        mean: f64,
        #[serde(default)]
        loc: f64,
    },
    Gamma {
        shape: f64,
        scale: f64,
        #[serde(default)]
        loc: f64,
    },
    LogNormal {
        mu: f64,
        sigma: f64,
        #[serde(default)]
        loc: f64,
    },
    Beta {
        alpha: f64,
        beta: f64,
        scale: f64,
        #[serde(default)]
        loc: f64,
    },
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ServicePolicy {
    pub cutoff_minutes: f64,
    pub meal_break_minutes: f64,
    pub nap_minutes: f64,
    pub max_chat_minutes: f64,
    pub valid_chat_minutes: f64,
    /// Paperwork after a completed chat; the counsellor takes no client meanwhile.
    pub postchat_minutes_served: f64,
    /// Paperwork to close the case of a client who gave up waiting.
    pub postchat_minutes_reneged: f64,
    pub shift_end: ShiftEndPolicy,
    pub max_events: u64,
}

impl Default for ServicePolicy {
    fn default() -> Self {
        Self {
            cutoff_minutes: 30.0,
            meal_break_minutes: 60.0,
            nap_minutes: 180.0,
            max_chat_minutes: 660.0,
            valid_chat_minutes: 7.5,
            postchat_minutes_served: 0.0,
            postchat_minutes_reneged: 0.0,
            shift_end: ShiftEndPolicy::FinishChat,
            max_events: 10_000_000,
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ShiftEndPolicy {
    #[default]
    FinishChat,
    HandOver,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ReplicationConfig {
    pub count: usize,
    pub base_seed: u64,
    pub workers: Option<usize>,
    pub on_failure: FailurePolicy,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            count: 1,
            base_seed: 728,
            workers: None,
            on_failure: FailurePolicy::Continue,
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    #[default]
    Continue,
    Abort,
}

impl DeskConfig {
    pub fn end_minute(&self) -> f64 {
        self.start_minute + self.horizon_minutes
    }

    /// Checks every parameter that does not need the expanded roster.
    pub fn validate(&self) -> Result<()> {
        if !self.start_minute.is_finite() || self.start_minute < 0.0 {
            return Err(Error::InvalidHorizon(self.start_minute));
        }
        if !self.horizon_minutes.is_finite() || self.horizon_minutes <= 0.0 {
            return Err(Error::InvalidHorizon(self.horizon_minutes));
        }
        if self.roster.is_empty() {
            return Err(Error::EmptyRoster);
        }
        if self.replications.count == 0 {
            return Err(Error::ReplicationsZero);
        }
        if self.replications.workers == Some(0) {
            return Err(Error::InvalidPolicy("workers must be > 0".to_string()));
        }
        self.policy.validate()?;
        self.clients.validate()?;
        self.arrivals.validate()?;
        Ok(())
    }
}

impl ServicePolicy {
    fn validate(&self) -> Result<()> {
        let durations = [
            ("cutoff_minutes", self.cutoff_minutes, true),
            ("meal_break_minutes", self.meal_break_minutes, false),
            ("nap_minutes", self.nap_minutes, false),
            ("max_chat_minutes", self.max_chat_minutes, false),
            ("valid_chat_minutes", self.valid_chat_minutes, true),
            ("postchat_minutes_served", self.postchat_minutes_served, true),
            ("postchat_minutes_reneged", self.postchat_minutes_reneged, true),
        ];
        for (name, value, zero_ok) in durations {
            let valid = value.is_finite() && (value > 0.0 || (zero_ok && value == 0.0));
            if !valid {
                return Err(Error::InvalidPolicy(format!("{} out of range ({})", name, value)));
            }
        }
        if self.max_events == 0 {
            return Err(Error::InvalidPolicy("max_events must be > 0".to_string()));
        }
        Ok(())
    }
}

impl ClientConfig {
    fn validate(&self) -> Result<()> {
        check_probability("terms_acceptance", self.terms_acceptance)?;
        if self.risk.is_empty() {
            return Err(Error::InvalidDistribution {
                what: "risk mix".to_string(),
                reason: "at least one risk level is required".to_string(),
            });
        }
        let mut seen = BTreeSet::new();
        let mut total = 0.0;
        for profile in &self.risk {
            if !seen.insert(profile.level) {
                return Err(Error::InvalidDistribution {
                    what: "risk mix".to_string(),
                    reason: format!("duplicate risk level '{}'", profile.level),
                });
            }
            if !profile.weight.is_finite() || profile.weight < 0.0 {
                return Err(Error::InvalidDistribution {
                    what: format!("{} risk weight", profile.level),
                    reason: format!("weight must be >= 0 (got {})", profile.weight),
                });
            }
            total += profile.weight;
        }
        if total <= 0.0 {
            return Err(Error::InvalidDistribution {
                what: "risk mix".to_string(),
                reason: "weights must not all be zero".to_string(),
            });
        }
        self.validate_user_status(&seen)
    }

    fn validate_user_status(&self, levels: &BTreeSet<RiskLevel>) -> Result<()> {
        if self.user_status.is_empty() {
            return Ok(());
        }
        let mut seen = BTreeSet::new();
        let mut total = 0.0;
        for profile in &self.user_status {
            let what = format!("{} user status", profile.status);
            if !seen.insert(profile.status) {
                return Err(Error::InvalidDistribution {
                    what: "user status mix".to_string(),
                    reason: format!("duplicate user status '{}'", profile.status),
                });
            }
            if !profile.weight.is_finite() || profile.weight < 0.0 {
                return Err(Error::InvalidDistribution {
                    what,
                    reason: format!("weight must be >= 0 (got {})", profile.weight),
                });
            }
            total += profile.weight;
            let Some(weights) = &profile.risk_weights else {
                continue;
            };
            if let Some(level) = weights.keys().find(|level| !levels.contains(*level)) {
                return Err(Error::InvalidDistribution {
                    what,
                    reason: format!("risk level '{}' has no profile", level),
                });
            }
            if weights.values().any(|weight| !weight.is_finite() || *weight < 0.0)
                || weights.values().sum::<f64>() <= 0.0
            {
                return Err(Error::InvalidDistribution {
                    what,
                    reason: "risk weights must be >= 0 and not all zero".to_string(),
                });
            }
        }
        if total <= 0.0 {
            return Err(Error::InvalidDistribution {
                what: "user status mix".to_string(),
                reason: "weights must not all be zero".to_string(),
            });
        }
        Ok(())
    }
}

impl ArrivalConfig {
    fn validate(&self) -> Result<()> {
        match self {
            ArrivalConfig::Poisson { rate_per_hour } => {
                if !rate_per_hour.is_finite() || *rate_per_hour <= 0.0 {
                    return Err(Error::InvalidRate(format!(
                        "rate must be > 0 (got {})",
                        rate_per_hour
                    )));
                }
            }
            ArrivalConfig::Thinning {
                segments,
                period_minutes,
            } => {
                if segments.is_empty() {
                    return Err(Error::InvalidRate("at least one segment is required".to_string()));
                }
                if let Some(period) = period_minutes {
                    if !period.is_finite() || *period <= 0.0 {
                        return Err(Error::InvalidRate(format!(
                            "period must be > 0 (got {})",
                            period
                        )));
                    }
                }
            }
            ArrivalConfig::Interarrivals { gaps, cycle } => {
                if gaps.iter().any(|gap| !gap.is_finite() || *gap < 0.0) {
                    return Err(Error::InvalidArrivals(
                        "interarrival gaps must be finite and >= 0".to_string(),
                    ));
                }
                if *cycle && !gaps.iter().any(|gap| *gap > 0.0) {
                    return Err(Error::InvalidArrivals(
                        "cycled interarrivals need at least one positive gap".to_string(),
                    ));
                }
            }
            ArrivalConfig::Recorded { records } => {
                if records.iter().any(|record| !record.time.is_finite()) {
                    return Err(Error::InvalidArrivals("arrival times must be finite".to_string()));
                }
                if records.windows(2).any(|pair| pair[1].time < pair[0].time) {
                    return Err(Error::InvalidArrivals(
                        "recorded arrivals must be sorted by time".to_string(),
                    ));
                }
                for record in records {
                    for (label, value) in [
                        ("patience", record.patience),
                        ("chat_duration", record.chat_duration),
                    ] {
                        if let Some(value) = value {
                            if !value.is_finite() || value <= 0.0 {
                                return Err(Error::InvalidArrivals(format!(
                                    "{} override must be > 0 (got {})",
                                    label, value
                                )));
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

fn check_probability(what: &str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(Error::InvalidProbability {
            what: what.to_string(),
            value,
        });
    }
    Ok(())
}

impl CounsellorRole {
    pub fn kind(self) -> CounsellorKind {
        match self {
            CounsellorRole::DutyOfficer | CounsellorRole::SocialWorker => CounsellorKind::Paid,
            CounsellorRole::Volunteer => CounsellorKind::Volunteer,
        }
    }

    /// Volunteers are kept away from high-risk and crisis chats.
    pub fn handles(self, risk: RiskLevel) -> bool {
        match self {
            CounsellorRole::Volunteer => matches!(risk, RiskLevel::Low | RiskLevel::Medium),
            CounsellorRole::DutyOfficer | CounsellorRole::SocialWorker => true,
        }
    }
}

impl fmt::Display for CounsellorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CounsellorRole::DutyOfficer => "duty-officer",
            CounsellorRole::SocialWorker => "social-worker",
            CounsellorRole::Volunteer => "volunteer",
        };
        write!(f, "{}", label)
    }
}

impl fmt::Display for CounsellorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CounsellorKind::Paid => "paid",
            CounsellorKind::Volunteer => "volunteer",
        };
        write!(f, "{}", label)
    }
}

impl fmt::Display for ShiftKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ShiftKind::Am => "am",
            ShiftKind::Pm => "pm",
            ShiftKind::Special => "special",
            ShiftKind::Graveyard => "graveyard",
        };
        write!(f, "{}", label)
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Crisis => "crisis",
        };
        write!(f, "{}", label)
    }
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserStatus::Regular => write!(f, "regular"),
            UserStatus::Repeated => write!(f, "repeated"),
        }
    }
}

impl fmt::Display for ShiftEndPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShiftEndPolicy::FinishChat => write!(f, "finish-chat"),
            ShiftEndPolicy::HandOver => write!(f, "hand-over"),
        }
    }
}

fn default_one() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

fn default_probability_one() -> f64 {
    1.0
}
