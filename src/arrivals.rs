//! Arrival sources.
//!
//! The service operation only needs "the next arrival after now"; where it
//! comes from (a thinned non-homogeneous Poisson process, a replayed list of
//! interarrival gaps or scripted records) is hidden behind [`ArrivalSource`].

use rand::Rng;
use rand_distr::{Distribution, Exp};
use rand_pcg::Pcg64Mcg;

use crate::error::{Error, Result};
use crate::events::{Arrival, SimTime};
use crate::models::{ArrivalConfig, ArrivalRecord, RateSegment};
use crate::rng::{SeedBank, Stream};

pub trait ArrivalSource {
    /// Next arrival strictly driven by the source's own cursor; `now` is the
    /// current clock value and is never later than the returned time.
    fn next_arrival(&mut self, now: SimTime) -> Option<Arrival>;
}

/// Builds the arrival source for one replication.
pub fn build_source(
    config: &ArrivalConfig,
    start: SimTime,
    end: SimTime,
    seeds: &SeedBank,
) -> Result<Box<dyn ArrivalSource>> {
    let source: Box<dyn ArrivalSource> = match config {
        ArrivalConfig::Poisson { rate_per_hour } => {
            let rate = RateFunction::new(
                vec![RateSegment {
                    start_minute: 0.0,
                    rate_per_hour: *rate_per_hour,
                }],
                None,
            )?;
            Box::new(ThinningArrivals::new(rate, start, end, seeds))
        }
        ArrivalConfig::Thinning {
            segments,
            period_minutes,
        } => {
            let rate = RateFunction::new(segments.clone(), *period_minutes)?;
            Box::new(ThinningArrivals::new(rate, start, end, seeds))
        }
        ArrivalConfig::Interarrivals { gaps, cycle } => {
            Box::new(InterarrivalReplay::new(gaps.clone(), *cycle, start, end))
        }
        ArrivalConfig::Recorded { records } => {
            Box::new(RecordedArrivals::new(records.clone(), start, end))
        }
    };
    Ok(source)
}

/// Piecewise-constant arrival rate λ(t), stored in clients per minute.
#[derive(Clone, Debug, PartialEq)]
pub struct RateFunction {
    segments: Vec<(f64, f64)>,
    period: Option<f64>,
}

impl RateFunction {
    /// Segments give the rate from their start until the next segment's start;
    /// with a period the pattern repeats and times are taken modulo the period.
    pub fn new(mut segments: Vec<RateSegment>, period: Option<f64>) -> Result<Self> {
        if segments.is_empty() {
            return Err(Error::InvalidRate("at least one segment is required".to_string()));
        }
        for segment in &segments {
            if !segment.rate_per_hour.is_finite() || segment.rate_per_hour < 0.0 {
                return Err(Error::InvalidRate(format!(
                    "rate must be finite and >= 0 (got {})",
                    segment.rate_per_hour
                )));
            }
            if !segment.start_minute.is_finite() || segment.start_minute < 0.0 {
                return Err(Error::InvalidRate(format!(
                    "segment start must be >= 0 (got {})",
                    segment.start_minute
                )));
            }
            if let Some(period) = period {
                if segment.start_minute >= period {
                    return Err(Error::InvalidRate(format!(
                        "segment start {} lies outside the {} minute period",
                        segment.start_minute, period
                    )));
                }
            }
        }
        segments.sort_by(|a, b| a.start_minute.total_cmp(&b.start_minute));
        if segments
            .windows(2)
            .any(|pair| pair[0].start_minute == pair[1].start_minute)
        {
            return Err(Error::InvalidRate("segment starts must be distinct".to_string()));
        }
        Ok(Self {
            segments: segments
                .iter()
                .map(|segment| (segment.start_minute, segment.rate_per_hour / 60.0))
                .collect(),
            period,
        })
    }

    /// Arrival rate per minute at `time`.
    pub fn rate_at(&self, time: SimTime) -> f64 {
        let local = match self.period {
            Some(period) => time.rem_euclid(period),
            None => time,
        };
        match self
            .segments
            .iter()
            .rposition(|(start, _)| *start <= local)
        {
            Some(idx) => self.segments[idx].1,
            // before the first segment a periodic pattern wraps to its last one
            None if self.period.is_some() => self.segments[self.segments.len() - 1].1,
            None => 0.0,
        }
    }

    /// Supremum of λ over `[start, end]`.
    pub fn max_over(&self, start: SimTime, end: SimTime) -> f64 {
        let mut max = self.rate_at(start);
        match self.period {
            Some(period) => {
                if end - start >= period {
                    return self.segments.iter().map(|(_, rate)| *rate).fold(0.0, f64::max);
                }
                let first_cycle = (start / period).floor();
                let last_cycle = (end / period).floor();
                let mut cycle = first_cycle;
                while cycle <= last_cycle {
                    for (seg_start, rate) in &self.segments {
                        let boundary = cycle * period + seg_start;
                        if boundary > start && boundary <= end {
                            max = max.max(*rate);
                        }
                    }
                    cycle += 1.0;
                }
            }
            None => {
                for (seg_start, rate) in &self.segments {
                    if *seg_start > start && *seg_start <= end {
                        max = max.max(*rate);
                    }
                }
            }
        }
        max
    }
}

/// Non-homogeneous Poisson arrivals by thinning a homogeneous process at λ_max.
pub struct ThinningArrivals {
    rate: RateFunction,
    lambda_max: f64,
    candidates: Option<Exp<f64>>,
    cursor: SimTime,
    end: SimTime,
    candidate_rng: Pcg64Mcg,
    thinning_rng: Pcg64Mcg,
}

impl ThinningArrivals {
    pub fn new(rate: RateFunction, start: SimTime, end: SimTime, seeds: &SeedBank) -> Self {
        let lambda_max = rate.max_over(start, end);
        let candidates = if lambda_max > 0.0 {
            Exp::new(lambda_max).ok()
        } else {
            None
        };
        Self {
            rate,
            lambda_max,
            candidates,
            cursor: start,
            end,
            candidate_rng: seeds.stream(Stream::ArrivalCandidates),
            thinning_rng: seeds.stream(Stream::Thinning),
        }
    }

    pub fn lambda_max(&self) -> f64 {
        self.lambda_max
    }
}

impl ArrivalSource for ThinningArrivals {
    fn next_arrival(&mut self, now: SimTime) -> Option<Arrival> {
        let Some(candidates) = self.candidates.as_ref() else {
            return None;
        };
        self.cursor = self.cursor.max(now);
        loop {
            self.cursor += candidates.sample(&mut self.candidate_rng);
            if self.cursor > self.end {
                return None;
            }
            let ratio = self.rate.rate_at(self.cursor) / self.lambda_max;
            let u: f64 = self.thinning_rng.gen();
            if u <= ratio {
                return Some(Arrival::at(self.cursor));
            }
        }
    }
}

/// Replays a fixed list of interarrival gaps, optionally cycling through it.
pub struct InterarrivalReplay {
    gaps: Vec<f64>,
    cycle: bool,
    next: usize,
    cursor: SimTime,
    end: SimTime,
}

impl InterarrivalReplay {
    pub fn new(gaps: Vec<f64>, cycle: bool, start: SimTime, end: SimTime) -> Self {
        Self {
            gaps,
            cycle,
            next: 0,
            cursor: start,
            end,
        }
    }
}

impl ArrivalSource for InterarrivalReplay {
    fn next_arrival(&mut self, now: SimTime) -> Option<Arrival> {
        if self.gaps.is_empty() || (!self.cycle && self.next >= self.gaps.len()) {
            return None;
        }
        let gap = self.gaps[self.next % self.gaps.len()];
        self.next += 1;
        self.cursor = self.cursor.max(now) + gap;
        if self.cursor > self.end {
            return None;
        }
        Some(Arrival::at(self.cursor))
    }
}

/// Scripted arrivals with absolute times and optional per-client attributes.
pub struct RecordedArrivals {
    records: std::vec::IntoIter<ArrivalRecord>,
}

impl RecordedArrivals {
    /// Records outside `[start, end]` are dropped.
    pub fn new(records: Vec<ArrivalRecord>, start: SimTime, end: SimTime) -> Self {
        let kept: Vec<ArrivalRecord> = records
            .into_iter()
            .filter(|record| record.time >= start && record.time <= end)
            .collect();
        Self {
            records: kept.into_iter(),
        }
    }
}

impl ArrivalSource for RecordedArrivals {
    fn next_arrival(&mut self, _now: SimTime) -> Option<Arrival> {
        self.records.next().map(|record| Arrival {
            time: record.time,
            risk: record.risk,
            patience: record.patience,
            chat_duration: record.chat_duration,
        })
    }
}
