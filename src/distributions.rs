use rand::Rng;
use rand_distr::{Beta, Distribution, Exp, Gamma, LogNormal};

use crate::error::{Error, Result};
use crate::models::DistributionConfig;

/// Floor applied to every sampled duration; a zero-length chat or patience
/// would collapse two events onto the same instant.
pub const MIN_VARIATE: f64 = 0.1;

/// A validated, ready-to-sample duration distribution (minutes).
#[derive(Clone, Debug)]
pub struct Variate {
    kind: VariateKind,
    loc: f64,
    max: f64,
}

#[derive(Clone, Debug)]
enum VariateKind {
    Constant(f64),
    Exponential(Exp<f64>),
    Gamma(Gamma<f64>),
    LogNormal(LogNormal<f64>),
    Beta { dist: Beta<f64>, scale: f64 },
}

impl Variate {
    pub fn from_config(config: &DistributionConfig, what: &str) -> Result<Self> {
        Self::bounded(config, what, f64::INFINITY)
    }

    /// Like `from_config`, with samples capped at `max`.
    pub fn bounded(config: &DistributionConfig, what: &str, max: f64) -> Result<Self> {
        let invalid = |reason: String| Error::InvalidDistribution {
            what: what.to_string(),
            reason,
        };
        let (kind, loc) = match *config {
            DistributionConfig::Constant { value } => {
                if !value.is_finite() || value <= 0.0 {
                    return Err(invalid(format!("value must be > 0 (got {})", value)));
                }
                (VariateKind::Constant(value), 0.0)
            }
            DistributionConfig::Exponential { mean, loc } => {
                check_positive(mean, "mean").map_err(invalid)?;
                let dist = Exp::new(1.0 / mean).map_err(|err| invalid(format!("{:?}", err)))?;
                (VariateKind::Exponential(dist), loc)
            }
            DistributionConfig::Gamma { shape, scale, loc } => {
                check_positive(shape, "shape").map_err(invalid)?;
                check_positive(scale, "scale").map_err(invalid)?;
                let dist = Gamma::new(shape, scale).map_err(|err| invalid(format!("{:?}", err)))?;
                (VariateKind::Gamma(dist), loc)
            }
            DistributionConfig::LogNormal { mu, sigma, loc } => {
                if !mu.is_finite() {
                    return Err(invalid(format!("mu must be finite (got {})", mu)));
                }
                check_positive(sigma, "sigma").map_err(invalid)?;
                let dist =
                    LogNormal::new(mu, sigma).map_err(|err| invalid(format!("{:?}", err)))?;
                (VariateKind::LogNormal(dist), loc)
            }
            DistributionConfig::Beta {
                alpha,
                beta,
                scale,
                loc,
            } => {
                check_positive(alpha, "alpha").map_err(invalid)?;
                check_positive(beta, "beta").map_err(invalid)?;
                check_positive(scale, "scale").map_err(invalid)?;
                let dist = Beta::new(alpha, beta).map_err(|err| invalid(format!("{:?}", err)))?;
                (VariateKind::Beta { dist, scale }, loc)
            }
        };
        if !loc.is_finite() {
            return Err(invalid(format!("loc must be finite (got {})", loc)));
        }
        if max.is_nan() || max < MIN_VARIATE {
            return Err(invalid(format!("cap must be >= {} (got {})", MIN_VARIATE, max)));
        }
        Ok(Self { kind, loc, max })
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let raw = match &self.kind {
            VariateKind::Constant(value) => *value,
            VariateKind::Exponential(dist) => dist.sample(rng),
            VariateKind::Gamma(dist) => dist.sample(rng),
            VariateKind::LogNormal(dist) => dist.sample(rng),
            VariateKind::Beta { dist, scale } => dist.sample(rng) * scale,
        };
        (raw + self.loc).clamp(MIN_VARIATE, self.max)
    }
}

fn check_positive(value: f64, name: &str) -> std::result::Result<(), String> {
    if !value.is_finite() || value <= 0.0 {
        return Err(format!("{} must be > 0 (got {})", name, value));
    }
    Ok(())
}
