//! Shift roster expansion and coverage validation.
//!
//! A [`ShiftConfig`] describes one kind of shift; the roster turns it into
//! concrete [`ShiftInstance`]s on the simulated timeline (one per day, worker
//! and chat slot) and refuses to build when paid staff leave any instant of
//! the window uncovered.

use tracing::debug;

use crate::error::{Error, Result};
use crate::events::SimTime;
use crate::models::{
    CounsellorKind, CounsellorRole, DeskConfig, ServicePolicy, ShiftConfig, ShiftKind,
    MINUTES_PER_DAY,
};

/// Minutes after a graveyard shift starts when the nap begins.
pub const GRAVEYARD_NAP_OFFSET: f64 = 225.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BreakWindow {
    pub start: SimTime,
    pub end: SimTime,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ShiftInstance {
    pub shift: String,
    pub kind: ShiftKind,
    pub role: CounsellorRole,
    pub day: i64,
    pub worker: u32,
    pub slot: u32,
    pub start: SimTime,
    pub end: SimTime,
    pub breaks: Vec<BreakWindow>,
}

impl ShiftInstance {
    pub fn label(&self) -> String {
        format!(
            "{}-{}.{}@d{}",
            self.shift,
            self.worker + 1,
            self.slot + 1,
            self.day
        )
    }

    /// Intervals where the counsellor is signed in: the shift minus its breaks.
    pub fn on_duty(&self) -> Vec<(SimTime, SimTime)> {
        let mut intervals = Vec::with_capacity(self.breaks.len() + 1);
        let mut cursor = self.start;
        for window in &self.breaks {
            if window.start > cursor {
                intervals.push((cursor, window.start));
            }
            cursor = cursor.max(window.end);
        }
        if self.end > cursor {
            intervals.push((cursor, self.end));
        }
        intervals
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Roster {
    window: (SimTime, SimTime),
    instances: Vec<ShiftInstance>,
}

impl Roster {
    pub fn build(config: &DeskConfig) -> Result<Self> {
        if config.roster.is_empty() {
            return Err(Error::EmptyRoster);
        }
        let window = (config.start_minute, config.end_minute());
        let mut instances = Vec::new();
        for shift in &config.roster {
            let breaks = break_offsets(shift, &config.policy)?;
            if shift.workers == 0 {
                debug!(shift = %shift.name, "shift has no workers, skipping");
                continue;
            }
            for (day, start, end) in occurrences(shift, window) {
                let Some((start, breaks)) = clip_to_window(start, end, &breaks, window.0) else {
                    continue;
                };
                for worker in 0..shift.workers {
                    for slot in 0..shift.slots {
                        instances.push(ShiftInstance {
                            shift: shift.name.clone(),
                            kind: shift.kind,
                            role: shift.role,
                            day,
                            worker,
                            slot,
                            start,
                            end,
                            breaks: breaks.clone(),
                        });
                    }
                }
            }
        }
        instances.sort_by(|a, b| {
            a.start
                .total_cmp(&b.start)
                .then_with(|| a.end.total_cmp(&b.end))
        });
        let roster = Self { window, instances };
        roster.check_coverage()?;
        debug!(instances = roster.instances.len(), "roster built");
        Ok(roster)
    }

    pub fn window(&self) -> (SimTime, SimTime) {
        self.window
    }

    pub fn instances(&self) -> &[ShiftInstance] {
        &self.instances
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Counsellor kinds present in the roster, in order.
    pub fn kinds(&self) -> Vec<CounsellorKind> {
        let mut kinds: Vec<_> = self.instances.iter().map(|i| i.role.kind()).collect();
        kinds.sort();
        kinds.dedup();
        kinds
    }

    pub fn roles(&self) -> Vec<CounsellorRole> {
        let mut roles: Vec<_> = self.instances.iter().map(|i| i.role).collect();
        roles.sort();
        roles.dedup();
        roles
    }

    /// Paid staff must cover every instant of the window; volunteers do not
    /// count towards coverage.
    fn check_coverage(&self) -> Result<()> {
        let (from, to) = self.window;
        let mut intervals: Vec<(SimTime, SimTime)> = self
            .instances
            .iter()
            .filter(|instance| instance.role.kind() == CounsellorKind::Paid)
            .flat_map(ShiftInstance::on_duty)
            .filter(|(start, end)| *end >= from && *start <= to)
            .collect();
        intervals.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut covered_to = from;
        for (start, end) in intervals {
            if start > covered_to {
                return Err(Error::CoverageGap {
                    from: covered_to,
                    to: start,
                });
            }
            covered_to = covered_to.max(end);
            if covered_to >= to {
                return Ok(());
            }
        }
        if covered_to < to {
            return Err(Error::CoverageGap {
                from: covered_to,
                to,
            });
        }
        Ok(())
    }
}

/// Validated break windows as offsets from the shift start.
fn break_offsets(shift: &ShiftConfig, policy: &ServicePolicy) -> Result<Vec<BreakWindow>> {
    let invalid_shift = |reason: String| Error::InvalidShift {
        name: shift.name.clone(),
        reason,
    };
    if !shift.start_minute.is_finite() || shift.start_minute < 0.0 {
        return Err(invalid_shift(format!(
            "start must be >= 0 (got {})",
            shift.start_minute
        )));
    }
    if !shift.end_minute.is_finite() || shift.end_minute <= shift.start_minute {
        return Err(invalid_shift(format!(
            "end {} must be after start {}",
            shift.end_minute, shift.start_minute
        )));
    }
    if shift.repeat_daily {
        if shift.start_minute >= MINUTES_PER_DAY {
            return Err(invalid_shift(format!(
                "daily shift must start within the day (got {})",
                shift.start_minute
            )));
        }
        if shift.end_minute - shift.start_minute > MINUTES_PER_DAY {
            return Err(invalid_shift("daily shift cannot last more than a day".to_string()));
        }
    }
    if shift.slots == 0 {
        return Err(invalid_shift("slots must be > 0".to_string()));
    }

    let duration = match shift.kind {
        ShiftKind::Graveyard => policy.nap_minutes,
        ShiftKind::Am | ShiftKind::Pm | ShiftKind::Special => policy.meal_break_minutes,
    };
    let starts = match &shift.breaks {
        Some(starts) => starts.clone(),
        None => default_break_starts(shift, duration),
    };

    let invalid_break = |reason: String| Error::InvalidBreak {
        name: shift.name.clone(),
        reason,
    };
    let mut windows: Vec<BreakWindow> = Vec::with_capacity(starts.len());
    for start in starts {
        let end = start + duration;
        if !start.is_finite() || start <= shift.start_minute || end > shift.end_minute {
            return Err(invalid_break(format!(
                "break {}..{} lies outside shift {}..{}",
                start, end, shift.start_minute, shift.end_minute
            )));
        }
        windows.push(BreakWindow {
            start: start - shift.start_minute,
            end: end - shift.start_minute,
        });
    }
    windows.sort_by(|a, b| a.start.total_cmp(&b.start));
    if let Some(pair) = windows.windows(2).find(|pair| pair[1].start < pair[0].end) {
        return Err(invalid_break(format!(
            "breaks starting at {} and {} overlap",
            pair[0].start, pair[1].start
        )));
    }
    Ok(windows)
}

fn default_break_starts(shift: &ShiftConfig, duration: f64) -> Vec<f64> {
    if shift.role.kind() == CounsellorKind::Volunteer {
        return Vec::new();
    }
    match shift.kind {
        ShiftKind::Graveyard => vec![shift.start_minute + GRAVEYARD_NAP_OFFSET],
        ShiftKind::Am | ShiftKind::Pm | ShiftKind::Special => {
            let midpoint = (shift.start_minute + shift.end_minute) / 2.0;
            vec![midpoint - duration / 2.0]
        }
    }
}

/// Absolute `(day, start, end)` occurrences of a shift that overlap the window.
fn occurrences(shift: &ShiftConfig, window: (SimTime, SimTime)) -> Vec<(i64, SimTime, SimTime)> {
    let (from, to) = window;
    if !shift.repeat_daily {
        let day = (shift.start_minute / MINUTES_PER_DAY).floor() as i64;
        if shift.end_minute > from && shift.start_minute < to {
            return vec![(day, shift.start_minute, shift.end_minute)];
        }
        return Vec::new();
    }
    let first_day = (from / MINUTES_PER_DAY).floor() as i64 - 1;
    let last_day = (to / MINUTES_PER_DAY).floor() as i64;
    (first_day..=last_day)
        .filter_map(|day| {
            let offset = day as f64 * MINUTES_PER_DAY;
            let start = offset + shift.start_minute;
            let end = offset + shift.end_minute;
            (end > from && start < to).then_some((day, start, end))
        })
        .collect()
}

/// Moves breaks onto the absolute timeline and trims anything before the
/// window start. A shift that is on break when the window opens signs in
/// when that break ends. Returns `None` if nothing of the shift remains.
fn clip_to_window(
    start: SimTime,
    end: SimTime,
    offsets: &[BreakWindow],
    from: SimTime,
) -> Option<(SimTime, Vec<BreakWindow>)> {
    let mut effective_start = start.max(from);
    let mut breaks = Vec::with_capacity(offsets.len());
    for offset in offsets {
        let window = BreakWindow {
            start: start + offset.start,
            end: start + offset.end,
        };
        if window.end <= effective_start {
            continue;
        }
        if window.start <= effective_start {
            effective_start = window.end;
            continue;
        }
        breaks.push(window);
    }
    (effective_start < end).then_some((effective_start, breaks))
}
