//! Working-hours evaluation: is an entity open right now, and do we know?
//!
//! The evaluator fails open. A record whose hours cannot be read is assumed
//! open during the default window with `hours_known = false`, because a record
//! wrongly marked closed is never fetched again by the fetch policy.

use crate::clock::Moment;
use crate::error::{Error, Result};
use crate::record::WorkingHours;
use serde::{Deserialize, Serialize};

/// Opening hour assumed when no schedule is known.
pub const DEFAULT_OPEN_HOUR: u32 = 9;

/// Closing hour (exclusive) assumed when no schedule is known.
pub const DEFAULT_CLOSE_HOUR: u32 = 23;

/// Local-hour window `[open_hour, close_hour)` assumed for entities with
/// unknown hours.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenWindow {
    pub open_hour: u32,
    pub close_hour: u32,
}

impl Default for OpenWindow {
    fn default() -> Self {
        OpenWindow {
            open_hour: DEFAULT_OPEN_HOUR,
            close_hour: DEFAULT_CLOSE_HOUR,
        }
    }
}

impl OpenWindow {
    pub fn contains(&self, hour: u32) -> bool {
        self.open_hour <= hour && hour < self.close_hour
    }
}

/// Derived open-state of one entity at one moment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OpenState {
    pub is_open: bool,
    /// True iff the state came from an authoritative weekly schedule.
    pub hours_known: bool,
}

impl OpenState {
    /// The state assumed without a usable schedule.
    pub fn assumed(window: OpenWindow, hour: u32) -> Self {
        OpenState {
            is_open: window.contains(hour),
            hours_known: false,
        }
    }

    /// Known hours, currently closed: the only state that forces zero load.
    pub fn is_known_closed(&self) -> bool {
        self.hours_known && !self.is_open
    }
}

/// Parsed interval in 24-hour local hours. `close` may be 24 (midnight).
///
/// An interval whose `close` precedes its `open` runs past midnight.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HourRange {
    pub open: u32,
    pub close: u32,
}

impl HourRange {
    pub fn contains(&self, hour: u32) -> bool {
        if self.open < self.close {
            self.open <= hour && hour < self.close
        } else if self.open > self.close {
            hour >= self.open || hour < self.close
        } else {
            false
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Meridiem {
    Am,
    Pm,
}

impl Meridiem {
    fn opposite(self) -> Self {
        match self {
            Meridiem::Am => Meridiem::Pm,
            Meridiem::Pm => Meridiem::Am,
        }
    }

    fn to_24h(self, hour: u32) -> u32 {
        match (self, hour) {
            (Meridiem::Am, 12) => 0,
            (Meridiem::Am, h) => h,
            (Meridiem::Pm, 12) => 12,
            (Meridiem::Pm, h) => h + 12,
        }
    }
}

struct Bound {
    hour: u32,
    meridiem: Option<Meridiem>,
}

fn parse_bound(raw: &str, slot: &str) -> Result<Bound> {
    let upper = raw.to_ascii_uppercase();
    let (digits, meridiem) = if let Some(d) = upper.strip_suffix("AM") {
        (d, Some(Meridiem::Am))
    } else if let Some(d) = upper.strip_suffix("PM") {
        (d, Some(Meridiem::Pm))
    } else {
        (upper.as_str(), None)
    };

    let hour: u32 = digits
        .parse()
        .map_err(|_| Error::ScheduleError(format!("bad hour '{}' in '{}'", raw, slot)))?;

    let valid = match meridiem {
        Some(_) => (1..=12).contains(&hour),
        None => hour <= 24,
    };
    if !valid {
        return Err(Error::ScheduleError(format!(
            "hour out of range '{}' in '{}'",
            raw, slot
        )));
    }

    Ok(Bound { hour, meridiem })
}

fn close_hour(hour: u32) -> u32 {
    if hour == 0 {
        24
    } else {
        hour
    }
}

/// Hours covered by `range`, wrapping past midnight; equal bounds cover the day.
fn span(range: &HourRange) -> u32 {
    match (range.close + 24 - range.open) % 24 {
        0 => 24,
        n => n,
    }
}

/// The narrower of two readings; the first wins a tie.
fn shortest(candidates: [HourRange; 2]) -> HourRange {
    let [first, second] = candidates;
    if span(&second) < span(&first) {
        second
    } else {
        first
    }
}

fn normalize(slot: &str) -> String {
    slot.chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| match c {
            '\u{2013}' | '\u{2014}' => '-',
            other => other,
        })
        .collect()
}

/// Parse one "HH[AM|PM]-HH[AM|PM]" interval string.
///
/// A side without a marker takes whichever marker gives the shorter interval,
/// the other side's marker on a tie: `"12-7PM"` is 12..19, `"9-5PM"` is
/// 9..17 and `"6-2AM"` is 18..2 across midnight. With no markers at all both
/// sides are read as 24-hour values. A close of midnight becomes 24.
///
/// # Errors
/// Returns `Error::ScheduleError` if the slot is not two parseable hours.
pub fn parse_interval(slot: &str) -> Result<HourRange> {
    let normalized = normalize(slot);
    let parts: Vec<&str> = normalized.split('-').collect();
    if parts.len() != 2 {
        return Err(Error::ScheduleError(format!(
            "expected 'open-close', got '{}'",
            slot
        )));
    }

    let start = parse_bound(parts[0], slot)?;
    let end = parse_bound(parts[1], slot)?;

    let range = match (start.meridiem, end.meridiem) {
        (Some(a), Some(b)) => HourRange {
            open: a.to_24h(start.hour),
            close: close_hour(b.to_24h(end.hour)),
        },
        (None, Some(m)) => {
            let close = close_hour(m.to_24h(end.hour));
            shortest([m, m.opposite()].map(|c| HourRange {
                open: c.to_24h(start.hour),
                close,
            }))
        }
        (Some(m), None) => {
            let open = m.to_24h(start.hour);
            shortest([m, m.opposite()].map(|c| HourRange {
                open,
                close: close_hour(c.to_24h(end.hour)),
            }))
        }
        (None, None) => {
            if start.hour >= 24 {
                return Err(Error::ScheduleError(format!(
                    "opening hour out of range in '{}'",
                    slot
                )));
            }
            HourRange {
                open: start.hour,
                close: close_hour(end.hour),
            }
        }
    };

    Ok(range)
}

fn is_closed_marker(slot: &str) -> bool {
    slot.trim().eq_ignore_ascii_case("closed")
}

fn is_all_day(slot: &str) -> bool {
    let compact = normalize(slot).to_ascii_lowercase();
    compact == "open24hours" || compact == "24hours"
}

fn slots_for<'a>(hours: &'a WorkingHours, weekday: &str) -> &'a [String] {
    hours
        .get(weekday)
        .or_else(|| {
            hours
                .iter()
                .find(|(day, _)| day.eq_ignore_ascii_case(weekday))
                .map(|(_, slots)| slots)
        })
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Whether any of one day's slots covers `hour`.
///
/// # Errors
/// Returns `Error::ScheduleError` for the first slot that fails to parse
/// before a match is found.
pub fn open_during(slots: &[String], hour: u32) -> Result<bool> {
    let slots: Vec<&str> = slots
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();

    if slots.iter().all(|s| is_closed_marker(s)) {
        return Ok(false);
    }

    for slot in slots {
        if is_closed_marker(slot) {
            continue;
        }
        if is_all_day(slot) || parse_interval(slot)?.contains(hour) {
            return Ok(true);
        }
    }

    Ok(false)
}

/// Derive the open-state of an entity at `moment`.
///
/// - no schedule: open inside `window`, hours unknown
/// - today empty or "Closed": closed, hours known
/// - otherwise open iff some interval covers the local hour, hours known
/// - any unparseable slot: same as no schedule
pub fn evaluate(hours: Option<&WorkingHours>, moment: &Moment, window: OpenWindow) -> OpenState {
    let hour = moment.hour();
    let Some(hours) = hours.filter(|h| !h.is_empty()) else {
        return OpenState::assumed(window, hour);
    };

    match open_during(slots_for(hours, moment.weekday_name()), hour) {
        Ok(is_open) => OpenState {
            is_open,
            hours_known: true,
        },
        Err(e) => {
            debug!("Unreadable working hours, assuming default window: {}", e);
            OpenState::assumed(window, hour)
        }
    }
}
