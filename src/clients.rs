use rand::distributions::WeightedIndex;
use rand::Rng;
use rand_distr::Distribution;
use rand_pcg::Pcg64Mcg;
use std::sync::Arc;

use crate::distributions::{Variate, MIN_VARIATE};
use crate::error::{Error, Result};
use crate::events::Arrival;
use crate::models::{ClientConfig, RiskLevel, ServicePolicy, UserStatus};
use crate::rng::{SeedBank, Stream};

/// Validated per-risk distributions, shared by every replication.
#[derive(Clone, Debug)]
pub struct ClientProfiles {
    levels: Vec<RiskLevel>,
    mix: WeightedIndex<f64>,
    statuses: Vec<UserStatus>,
    status_mix: Option<WeightedIndex<f64>>,
    /// Per-status risk mix, aligned with `statuses`; `None` falls back to `mix`.
    status_risk: Vec<Option<WeightedIndex<f64>>>,
    default_patience: Variate,
    patience: Vec<Option<Variate>>,
    durations: Vec<Variate>,
    terms_acceptance: f64,
    max_chat_minutes: f64,
}

impl ClientProfiles {
    pub fn new(clients: &ClientConfig, policy: &ServicePolicy) -> Result<Self> {
        let weights: Vec<f64> = clients.risk.iter().map(|profile| profile.weight).collect();
        let mix = weighted(&weights, "risk mix")?;
        let default_patience = Variate::from_config(&clients.patience, "patience")?;
        let mut levels = Vec::with_capacity(clients.risk.len());
        let mut patience = Vec::with_capacity(clients.risk.len());
        let mut durations = Vec::with_capacity(clients.risk.len());
        for profile in &clients.risk {
            levels.push(profile.level);
            durations.push(Variate::bounded(
                &profile.chat_duration,
                &format!("{} chat duration", profile.level),
                policy.max_chat_minutes,
            )?);
            patience.push(
                profile
                    .patience
                    .as_ref()
                    .map(|config| Variate::from_config(config, &format!("{} patience", profile.level)))
                    .transpose()?,
            );
        }
        let statuses: Vec<UserStatus> = clients.user_status.iter().map(|p| p.status).collect();
        let status_mix = if clients.user_status.is_empty() {
            None
        } else {
            let weights: Vec<f64> = clients.user_status.iter().map(|p| p.weight).collect();
            Some(weighted(&weights, "user status mix")?)
        };
        let mut status_risk = Vec::with_capacity(statuses.len());
        for profile in &clients.user_status {
            let mix = match &profile.risk_weights {
                Some(by_level) => {
                    let weights: Vec<f64> = levels
                        .iter()
                        .map(|level| by_level.get(level).copied().unwrap_or(0.0))
                        .collect();
                    Some(weighted(&weights, &format!("{} risk mix", profile.status))?)
                }
                None => None,
            };
            status_risk.push(mix);
        }
        Ok(Self {
            levels,
            mix,
            statuses,
            status_mix,
            status_risk,
            default_patience,
            patience,
            durations,
            terms_acceptance: clients.terms_acceptance,
            max_chat_minutes: policy.max_chat_minutes,
        })
    }

    pub fn covers(&self, level: RiskLevel) -> bool {
        self.levels.contains(&level)
    }

    fn index_of(&self, level: RiskLevel) -> Result<usize> {
        self.levels
            .iter()
            .position(|known| *known == level)
            .ok_or_else(|| Error::InvalidArrivals(format!("risk level '{}' has no profile", level)))
    }
}

fn weighted(weights: &[f64], what: &str) -> Result<WeightedIndex<f64>> {
    WeightedIndex::new(weights).map_err(|err| Error::InvalidDistribution {
        what: what.to_string(),
        reason: err.to_string(),
    })
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClientDraft {
    pub status: UserStatus,
    pub risk: RiskLevel,
    pub patience: f64,
    pub chat_duration: f64,
    pub accepts_terms: bool,
}

/// Draws client attributes, one random stream per attribute.
pub struct ClientFactory {
    profiles: Arc<ClientProfiles>,
    risk_rng: Pcg64Mcg,
    patience_rng: Pcg64Mcg,
    duration_rng: Pcg64Mcg,
    terms_rng: Pcg64Mcg,
    status_rng: Pcg64Mcg,
}

impl ClientFactory {
    pub fn new(profiles: Arc<ClientProfiles>, seeds: &SeedBank) -> Self {
        Self {
            profiles,
            risk_rng: seeds.stream(Stream::Risk),
            patience_rng: seeds.stream(Stream::Patience),
            duration_rng: seeds.stream(Stream::ChatDuration),
            terms_rng: seeds.stream(Stream::Terms),
            status_rng: seeds.stream(Stream::UserStatus),
        }
    }

    /// Values carried by the arrival take precedence over sampled ones.
    pub fn draw(&mut self, arrival: &Arrival) -> Result<ClientDraft> {
        let profiles = &self.profiles;
        let status_slot = profiles
            .status_mix
            .as_ref()
            .map(|mix| mix.sample(&mut self.status_rng));
        let status = status_slot
            .map(|slot| profiles.statuses[slot])
            .unwrap_or_default();
        let index = match arrival.risk {
            Some(level) => profiles.index_of(level)?,
            None => status_slot
                .and_then(|slot| profiles.status_risk[slot].as_ref())
                .unwrap_or(&profiles.mix)
                .sample(&mut self.risk_rng),
        };
        let patience = match arrival.patience {
            Some(value) => value.max(MIN_VARIATE),
            None => profiles.patience[index]
                .as_ref()
                .unwrap_or(&profiles.default_patience)
                .sample(&mut self.patience_rng),
        };
        let chat_duration = match arrival.chat_duration {
            Some(value) => value.clamp(MIN_VARIATE, profiles.max_chat_minutes),
            None => profiles.durations[index].sample(&mut self.duration_rng),
        };
        let accepts_terms = self.terms_rng.gen::<f64>() < profiles.terms_acceptance;
        Ok(ClientDraft {
            status,
            risk: profiles.levels[index],
            patience,
            chat_duration,
            accepts_terms,
        })
    }
}
