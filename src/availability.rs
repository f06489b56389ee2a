//! Free/busy analysis over a meeting snapshot.
//!
//! Everything here is recomputed from the meetings passed in; nothing is
//! cached between calls because the calendar can change between turns.

use std::collections::VecDeque;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::error::AssistantError;
use crate::types::{Interval, MeetingInterval};

/// Daily working window, as local wall-clock times.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusinessHours {
    start: NaiveTime,
    end: NaiveTime,
}

impl BusinessHours {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Result<Self, AssistantError> {
        if start >= end {
            return Err(AssistantError::Configuration(format!(
                "business hours must start before they end ({} >= {})",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    /// Whole-hour constructor used by the config file (`workHoursStart`/`workHoursEnd`).
    pub fn from_hours(start: u8, end: u8) -> Result<Self, AssistantError> {
        let invalid = || AssistantError::InvalidBusinessHours { start, end };
        let start_time = NaiveTime::from_hms_opt(start as u32, 0, 0).ok_or_else(invalid)?;
        // 24 means "until midnight"; keep it inside the day.
        let end_time = if end == 24 {
            NaiveTime::from_hms_opt(23, 59, 59)
        } else {
            NaiveTime::from_hms_opt(end as u32, 0, 0)
        }
        .ok_or_else(invalid)?;
        Self::new(start_time, end_time).map_err(|_| invalid())
    }

    pub fn start(&self) -> NaiveTime {
        self.start
    }

    pub fn end(&self) -> NaiveTime {
        self.end
    }

    /// Whether a local wall-clock time falls inside `[start, end)`.
    pub fn contains(&self, time: NaiveTime) -> bool {
        time >= self.start && time < self.end
    }

    /// The business window of one local day, as UTC instants.
    pub fn on(&self, date: NaiveDate, tz: &Tz) -> Interval {
        Interval {
            start: resolve_local_datetime(tz, date, self.start).with_timezone(&Utc),
            end: resolve_local_datetime(tz, date, self.end).with_timezone(&Utc),
        }
    }
}

impl Default for BusinessHours {
    fn default() -> Self {
        Self {
            start: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN),
            end: NaiveTime::from_hms_opt(17, 0, 0).unwrap_or(NaiveTime::MIN),
        }
    }
}

/// Resolve a local date + wall-clock time to a timezone-aware DateTime, handling DST gaps.
///
/// During a spring-forward gap the local time does not exist; it is moved one
/// hour later, past the transition, and as a last resort read as UTC.
pub fn resolve_local_datetime(tz: &Tz, date: NaiveDate, time: NaiveTime) -> DateTime<Tz> {
    let naive = NaiveDateTime::new(date, time);

    if let Some(dt) = tz.from_local_datetime(&naive).earliest() {
        return dt;
    }

    // DST spring-forward gap: local time doesn't exist. Skip ahead an hour.
    if let Some(dt) = tz
        .from_local_datetime(&(naive + Duration::hours(1)))
        .earliest()
    {
        log::warn!(
            "DST gap detected for {} {} in {}; using post-transition time",
            date,
            time,
            tz
        );
        return dt;
    }

    // Absolute fallback: interpret as UTC and convert.
    log::warn!(
        "Could not resolve local datetime {} {} in {}; falling back to UTC",
        date,
        time,
        tz
    );
    Utc.from_utc_datetime(&naive).with_timezone(tz)
}

/// Meetings that overlap `candidate` under half-open semantics.
///
/// Back-to-back meetings that only share a boundary instant are not conflicts.
pub fn conflicts<'a>(
    meetings: &'a [MeetingInterval],
    candidate: &Interval,
) -> Vec<&'a MeetingInterval> {
    meetings
        .iter()
        .filter(|m| m.start() < candidate.end && candidate.start < m.end())
        .collect()
}

/// Busy time inside `[window_start, window_end)`: meetings sorted by start
/// (ties by end), clipped to the window and merged where they overlap or touch.
pub fn busy_blocks(
    meetings: &[MeetingInterval],
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
) -> Vec<Interval> {
    let intervals = meetings
        .iter()
        .filter(|m| m.end() > window_start && m.start() < window_end)
        .map(|m| Interval {
            start: m.start().max(window_start),
            end: m.end().min(window_end),
        })
        .collect();
    merge_intervals(intervals)
}

fn merge_intervals(mut intervals: Vec<Interval>) -> Vec<Interval> {
    if intervals.is_empty() {
        return Vec::new();
    }

    intervals.sort_by_key(|i| (i.start, i.end));
    let mut merged: Vec<Interval> = Vec::new();

    for interval in intervals {
        if let Some(current) = merged.last_mut() {
            if interval.start <= current.end {
                if interval.end > current.end {
                    current.end = interval.end;
                }
                continue;
            }
        }
        merged.push(interval);
    }

    merged
}

/// Free slots of at least `duration` inside business hours and the window.
///
/// The returned iterator works one local calendar day at a time and yields
/// slots in chronological order. Days with no qualifying gap yield nothing.
pub fn free_slots(
    meetings: &[MeetingInterval],
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    duration: Duration,
    business_hours: &BusinessHours,
    tz: Tz,
) -> FreeSlots {
    let busy = if window_end > window_start {
        busy_blocks(meetings, window_start, window_end)
    } else {
        Vec::new()
    };

    let first_day = window_start.with_timezone(&tz).date_naive();
    let last_day = window_end.with_timezone(&tz).date_naive();

    FreeSlots {
        busy,
        busy_cursor: 0,
        window: (window_start, window_end),
        duration: duration.max(Duration::minutes(1)),
        hours: *business_hours,
        tz,
        next_day: if window_end > window_start {
            Some(first_day)
        } else {
            None
        },
        last_day,
        ready: VecDeque::new(),
    }
}

/// Lazy iterator returned by [`free_slots`].
#[derive(Debug)]
pub struct FreeSlots {
    busy: Vec<Interval>,
    busy_cursor: usize,
    window: (DateTime<Utc>, DateTime<Utc>),
    duration: Duration,
    hours: BusinessHours,
    tz: Tz,
    next_day: Option<NaiveDate>,
    last_day: NaiveDate,
    ready: VecDeque<Interval>,
}

impl FreeSlots {
    fn fill_day(&mut self, day: NaiveDate) {
        let business = self.hours.on(day, &self.tz);
        let day_start = business.start.max(self.window.0);
        let day_end = business.end.min(self.window.1);
        if day_end <= day_start {
            return;
        }

        // Busy blocks are sorted and days advance monotonically, so blocks
        // ending before this day can be skipped for good.
        while self.busy_cursor < self.busy.len() && self.busy[self.busy_cursor].end <= day_start {
            self.busy_cursor += 1;
        }

        let mut cursor = day_start;
        let mut i = self.busy_cursor;
        while let Some(block) = self.busy.get(i).copied() {
            if block.start >= day_end {
                break;
            }
            if block.start > cursor {
                self.push_gap(cursor, block.start);
            }
            if block.end > cursor {
                cursor = block.end;
            }
            i += 1;
        }

        if day_end > cursor {
            self.push_gap(cursor, day_end);
        }
    }

    fn push_gap(&mut self, start: DateTime<Utc>, end: DateTime<Utc>) {
        if end.signed_duration_since(start) >= self.duration {
            self.ready.push_back(Interval { start, end });
        }
    }
}

impl Iterator for FreeSlots {
    type Item = Interval;

    fn next(&mut self) -> Option<Interval> {
        loop {
            if let Some(slot) = self.ready.pop_front() {
                return Some(slot);
            }
            let day = self.next_day?;
            self.next_day = if day < self.last_day {
                day.succ_opt()
            } else {
                None
            };
            self.fill_day(day);
        }
    }
}

/// Midnight-to-midnight bounds of a local day, as UTC instants.
pub fn local_day_bounds(date: NaiveDate, tz: &Tz) -> Interval {
    let start = resolve_local_datetime(tz, date, NaiveTime::MIN).with_timezone(&Utc);
    let end = date
        .succ_opt()
        .map(|next| resolve_local_datetime(tz, next, NaiveTime::MIN).with_timezone(&Utc))
        .unwrap_or(start + Duration::days(1));
    Interval { start, end }
}

/// Monday of the ISO week containing `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}
