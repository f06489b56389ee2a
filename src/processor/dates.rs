//! Date, time, duration and window expressions.
//!
//! Every detector reports the byte range it consumed so later detectors (and
//! the free-text extraction in `mod.rs`) never read the same words twice.
//! Detectors run in a fixed order; a match overlapping an earlier one is dropped.

use std::ops::Range;
use std::sync::OnceLock;

use chrono::{DateTime, Datelike, Days, Duration, NaiveDate, NaiveTime, Timelike, Utc, Weekday};
use chrono_tz::Tz;
use regex::{Captures, Regex};

use super::{Confidence, Entity, EntityValue, Field};
use crate::availability::{local_day_bounds, week_start, BusinessHours};
use crate::types::Interval;

/// Longest meeting or free block a duration expression may ask for.
const MAX_DURATION_MINUTES: i64 = 24 * 60;

/// Furthest "the next N days" may reach.
const MAX_WINDOW_DAYS: u64 = 366;

/// One recognised expression.
#[derive(Debug, Clone)]
pub(crate) struct Found {
    pub range: Range<usize>,
    pub field: Field,
    pub entity: Entity,
}

fn re_relative() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\bin\s+(half\s+an|an?|\d+(?:\.\d+)?|one|two|three|four|five|six|seven|eight|nine|ten|eleven|twelve|fifteen|twenty|thirty|forty-five)\s+(minutes?|mins?|hours?|hrs?|days?|weeks?)\b").unwrap()
    })
}

fn re_time_range() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:from\s+|between\s+)?(\d{1,2})(?::(\d{2}))?\s*(?:([ap])\.?m\b\.?)?\s*(?:-|–|to|until|till|and)\s*(\d{1,2})(?::(\d{2}))?\s*([ap])\.?m\b\.?").unwrap()
    })
}

fn re_time_meridiem() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:at\s+|@\s*|around\s+|by\s+)?(\d{1,2})(?::(\d{2}))?\s*([ap])\.?m\b\.?").unwrap()
    })
}

fn re_time_clock() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(?:at\s+|@\s*|around\s+)?([01]?\d|2[0-3]):([0-5]\d)\b").unwrap())
}

fn re_time_named() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(?:at\s+)?(noon|midday|midnight)\b").unwrap())
}

fn re_time_bare() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(?:at|around)\s+(\d{1,2})\b").unwrap())
}

fn re_date_iso() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(\d{4})-(\d{1,2})-(\d{1,2})\b").unwrap())
}

const MONTHS: &str = "january|february|march|april|may|june|july|august|september|october|november|december|jan|feb|mar|apr|jun|jul|aug|sept|sep|oct|nov|dec";

fn re_date_day_month() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(
            r"(?i)\b(\d{{1,2}})(?:st|nd|rd|th)?\s+(?:of\s+)?({})\b\.?(?:,?\s+(\d{{4}})\b)?",
            MONTHS
        ))
        .unwrap()
    })
}

fn re_date_month_day() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(
            r"(?i)\b({})\.?\s+(\d{{1,2}})(?:st|nd|rd|th)?\b(?:,?\s+(\d{{4}})\b)?",
            MONTHS
        ))
        .unwrap()
    })
}

fn re_date_relative() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:the\s+)?(day\s+after\s+tomorrow|today|tonight|tomorrow|tmrw)\b").unwrap()
    })
}

fn re_weekday() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:(next|this|coming|on)\s+)?(monday|tuesday|wednesday|thursday|friday|saturday|sunday)\b").unwrap()
    })
}

fn re_window() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:(this|next)\s+(week|weekend)|(?:the\s+)?weekend|(?:the\s+)?next\s+(\d+|two|three|four|five|six|seven|ten|fourteen)\s+days)\b").unwrap()
    })
}

fn re_duration_hour_and_half() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bfor\s+(an?|one|\d+)\s+hours?\s+and\s+a\s+half\b").unwrap())
}

fn re_duration_for() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\bfor\s+(half\s+an|an?|\d+(?:\.\d+)?|one|two|three|four|five|six|ten|fifteen|twenty|thirty|forty-five|ninety)\s*(hours?|hrs?|h|minutes?|mins?|m)\b").unwrap()
    })
}

fn re_duration_adjective() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(\d+)[- ]?(minute|min|hour|hr)s?\b").unwrap())
}

/// Parse a small number written as digits or words.
pub(crate) fn number_word(value: &str) -> Option<f64> {
    let value = value.trim().to_lowercase();
    let n = match value.as_str() {
        "a" | "an" | "one" => 1.0,
        "half an" | "half a" => 0.5,
        "two" => 2.0,
        "three" => 3.0,
        "four" => 4.0,
        "five" => 5.0,
        "six" => 6.0,
        "seven" => 7.0,
        "eight" => 8.0,
        "nine" => 9.0,
        "ten" => 10.0,
        "eleven" => 11.0,
        "twelve" => 12.0,
        "fourteen" => 14.0,
        "fifteen" => 15.0,
        "twenty" => 20.0,
        "thirty" => 30.0,
        "forty-five" => 45.0,
        "ninety" => 90.0,
        other => other.parse::<f64>().ok()?,
    };
    Some(n)
}

fn month_number(name: &str) -> Option<u32> {
    let lower = name.to_lowercase();
    let key = lower.get(..3)?;
    let n = match key {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(n)
}

fn weekday_from(name: &str) -> Option<Weekday> {
    name.to_lowercase().parse::<Weekday>().ok()
}

/// The next occurrence of `target` strictly after `today`.
///
/// "Friday" said on a Friday means the following week; only "today" means today.
pub(crate) fn next_weekday(today: NaiveDate, target: Weekday) -> NaiveDate {
    let current = today.weekday().num_days_from_monday() as i64;
    let wanted = target.num_days_from_monday() as i64;
    let mut days = (wanted - current).rem_euclid(7);
    if days == 0 {
        days = 7;
    }
    today + Duration::days(days)
}

fn to_24h(hour: u32, meridiem: &str) -> Option<u32> {
    if !(1..=12).contains(&hour) {
        return None;
    }
    let pm = meridiem.eq_ignore_ascii_case("p");
    Some(match (hour, pm) {
        (12, false) => 0,
        (12, true) => 12,
        (h, false) => h,
        (h, true) => h + 12,
    })
}

/// A clock time with no am/pm.
///
/// Hours 0 and 13-23 are unambiguous. For 1-12, the reading that falls inside
/// business hours wins; when both or neither do, the time is flagged.
fn bare_clock(hour: u32, minute: u32, hours: &BusinessHours) -> Option<(NaiveTime, Confidence)> {
    if hour == 0 || hour >= 13 {
        return NaiveTime::from_hms_opt(hour, minute, 0).map(|t| (t, Confidence::Resolved));
    }
    let am = NaiveTime::from_hms_opt(hour % 12, minute, 0)?;
    let pm = NaiveTime::from_hms_opt(hour % 12 + 12, minute, 0)?;
    match (hours.contains(am), hours.contains(pm)) {
        (true, false) => Some((am, Confidence::Resolved)),
        (false, true) => Some((pm, Confidence::Resolved)),
        _ => {
            let guess = if hour < 8 { pm } else { am };
            Some((guess, Confidence::Ambiguous))
        }
    }
}

struct Scanner<'a> {
    text: &'a str,
    found: Vec<Found>,
}

impl<'a> Scanner<'a> {
    fn overlaps(&self, range: &Range<usize>) -> bool {
        self.found
            .iter()
            .any(|f| f.range.start < range.end && range.start < f.range.end)
    }

    fn push(&mut self, range: Range<usize>, field: Field, entity: Entity) {
        self.found.push(Found {
            range,
            field,
            entity,
        });
    }

    /// Run `re` over the text, handing each non-overlapping match to `f`.
    fn each<F>(&mut self, re: &Regex, mut f: F)
    where
        F: FnMut(&Captures<'a>) -> Vec<(Field, Entity)>,
    {
        let text = self.text;
        for caps in re.captures_iter(text) {
            let Some(whole) = caps.get(0) else { continue };
            let range = whole.range();
            if self.overlaps(&range) {
                continue;
            }
            for (field, entity) in f(&caps) {
                self.push(range.clone(), field, entity);
            }
        }
    }
}

fn raw(caps: &Captures<'_>) -> String {
    caps.get(0)
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default()
}

fn cap_u32(caps: &Captures<'_>, i: usize) -> Option<u32> {
    caps.get(i).and_then(|m| m.as_str().parse().ok())
}

/// Scan `text` for temporal expressions relative to `now` in `tz`.
pub(crate) fn scan(
    text: &str,
    now: DateTime<Utc>,
    tz: &Tz,
    hours: &BusinessHours,
) -> Vec<Found> {
    let local_now = now.with_timezone(tz);
    let today = local_now.date_naive();
    let mut scanner = Scanner {
        text,
        found: Vec::new(),
    };

    // "in two hours", "in 3 days"
    scanner.each(re_relative(), |caps| {
        let Some(n) = number_word(&caps[1]) else {
            return Vec::new();
        };
        let unit = caps[2].to_lowercase();
        let minutes = if unit.starts_with("min") {
            n
        } else if unit.starts_with('h') {
            n * 60.0
        } else if unit.starts_with('d') {
            n * 60.0 * 24.0
        } else {
            n * 60.0 * 24.0 * 7.0
        };
        let Some(target) = whole_minutes(minutes).and_then(|d| local_now.checked_add_signed(d))
        else {
            return vec![(Field::Date, Entity::malformed(raw(caps)))];
        };
        let date = Entity::resolved(EntityValue::Date(target.date_naive()), raw(caps));
        if unit.starts_with('d') || unit.starts_with('w') {
            return vec![(Field::Date, date)];
        }
        let time = target
            .time()
            .with_second(0)
            .and_then(|t| t.with_nanosecond(0))
            .unwrap_or(target.time());
        vec![
            (Field::Date, date),
            (Field::Time, Entity::resolved(EntityValue::Time(time), raw(caps))),
        ]
    });

    // "2-3pm", "from 2pm to 3:30pm"
    scanner.each(re_time_range(), |caps| {
        let end_meridiem = caps[6].to_string();
        let start_meridiem = caps
            .get(3)
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| end_meridiem.clone());
        let (Some(sh), Some(eh)) = (cap_u32(caps, 1), cap_u32(caps, 4)) else {
            return Vec::new();
        };
        let sm = cap_u32(caps, 2).unwrap_or(0);
        let em = cap_u32(caps, 5).unwrap_or(0);
        let end = to_24h(eh, &end_meridiem).and_then(|h| NaiveTime::from_hms_opt(h, em, 0));
        let mut start =
            to_24h(sh, &start_meridiem).and_then(|h| NaiveTime::from_hms_opt(h, sm, 0));
        // "11-1pm" means 11am to 1pm
        if let (Some(s), Some(e), None) = (start, end, caps.get(3)) {
            if s >= e {
                start = to_24h(sh, "a").and_then(|h| NaiveTime::from_hms_opt(h, sm, 0));
            }
        }
        match (start, end) {
            (Some(s), Some(e)) if s < e => {
                let minutes = e.signed_duration_since(s).num_minutes();
                vec![
                    (Field::Time, Entity::resolved(EntityValue::Time(s), raw(caps))),
                    (
                        Field::Duration,
                        Entity::resolved(EntityValue::Minutes(minutes), raw(caps)),
                    ),
                ]
            }
            _ => vec![(Field::Time, Entity::malformed(raw(caps)))],
        }
    });

    // "2pm", "at 10:30 a.m."
    scanner.each(re_time_meridiem(), |caps| {
        let Some(hour) = cap_u32(caps, 1) else {
            return Vec::new();
        };
        let minute = cap_u32(caps, 2).unwrap_or(0);
        match to_24h(hour, &caps[3]).and_then(|h| NaiveTime::from_hms_opt(h, minute, 0)) {
            Some(t) => vec![(Field::Time, Entity::resolved(EntityValue::Time(t), raw(caps)))],
            None => vec![(Field::Time, Entity::malformed(raw(caps)))],
        }
    });

    // "14:00", "at 9:30"
    scanner.each(re_time_clock(), |caps| {
        let (Some(hour), Some(minute)) = (cap_u32(caps, 1), cap_u32(caps, 2)) else {
            return Vec::new();
        };
        match bare_clock(hour, minute, hours) {
            Some((t, confidence)) => vec![(
                Field::Time,
                Entity::new(EntityValue::Time(t), confidence, raw(caps)),
            )],
            None => vec![(Field::Time, Entity::malformed(raw(caps)))],
        }
    });

    scanner.each(re_time_named(), |caps| {
        let hour = if caps[1].eq_ignore_ascii_case("midnight") {
            0
        } else {
            12
        };
        NaiveTime::from_hms_opt(hour, 0, 0)
            .map(|t| vec![(Field::Time, Entity::resolved(EntityValue::Time(t), raw(caps)))])
            .unwrap_or_default()
    });

    // "at 3"
    scanner.each(re_time_bare(), |caps| {
        let Some(hour) = cap_u32(caps, 1) else {
            return Vec::new();
        };
        if hour > 23 {
            return vec![(Field::Time, Entity::malformed(raw(caps)))];
        }
        match bare_clock(hour, 0, hours) {
            Some((t, confidence)) => vec![(
                Field::Time,
                Entity::new(EntityValue::Time(t), confidence, raw(caps)),
            )],
            None => Vec::new(),
        }
    });

    // "2026-06-28"
    scanner.each(re_date_iso(), |caps| {
        let date = match (cap_u32(caps, 1), cap_u32(caps, 2), cap_u32(caps, 3)) {
            (Some(y), Some(m), Some(d)) => NaiveDate::from_ymd_opt(y as i32, m, d),
            _ => None,
        };
        vec![(Field::Date, date_entity(date, raw(caps)))]
    });

    // "28 June", "28th of June 2026"
    scanner.each(re_date_day_month(), |caps| {
        let date = calendar_date(
            today,
            cap_u32(caps, 1),
            month_number(&caps[2]),
            cap_u32(caps, 3),
        );
        vec![(Field::Date, date_entity(date, raw(caps)))]
    });

    // "June 28", "June 28th, 2026"
    scanner.each(re_date_month_day(), |caps| {
        let date = calendar_date(
            today,
            cap_u32(caps, 2),
            month_number(&caps[1]),
            cap_u32(caps, 3),
        );
        vec![(Field::Date, date_entity(date, raw(caps)))]
    });

    scanner.each(re_date_relative(), |caps| {
        let word = caps[1].to_lowercase();
        let date = if word.starts_with("day") {
            today + Duration::days(2)
        } else if word == "today" || word == "tonight" {
            today
        } else {
            today + Duration::days(1)
        };
        vec![(
            Field::Date,
            Entity::resolved(EntityValue::Date(date), raw(caps)),
        )]
    });

    scanner.each(re_weekday(), |caps| {
        weekday_from(&caps[2])
            .map(|wd| {
                vec![(
                    Field::Date,
                    Entity::resolved(EntityValue::Date(next_weekday(today, wd)), raw(caps)),
                )]
            })
            .unwrap_or_default()
    });

    scanner.each(re_window(), |caps| {
        window_for(caps, today, tz)
            .map(|w| vec![(Field::Window, w)])
            .unwrap_or_default()
    });

    scanner.each(re_duration_hour_and_half(), |caps| {
        number_word(&caps[1])
            .map(|n| vec![(Field::Duration, minutes_entity(n * 60.0 + 30.0, raw(caps)))])
            .unwrap_or_default()
    });

    scanner.each(re_duration_for(), |caps| duration_entity(caps));
    scanner.each(re_duration_adjective(), |caps| duration_entity(caps));

    scanner.found.sort_by_key(|f| f.range.start);
    scanner.found
}

fn duration_entity(caps: &Captures<'_>) -> Vec<(Field, Entity)> {
    let Some(n) = number_word(&caps[1]) else {
        return Vec::new();
    };
    let unit = caps[2].to_lowercase();
    let minutes = if unit.starts_with('h') {
        n * 60.0
    } else {
        n
    };
    vec![(Field::Duration, minutes_entity(minutes, raw(caps)))]
}

/// A meeting length: positive whole minutes no longer than a day.
fn minutes_entity(minutes: f64, raw: String) -> Entity {
    match whole_minutes(minutes).map(|d| d.num_minutes()) {
        Some(m) if m > 0 && m <= MAX_DURATION_MINUTES => {
            Entity::resolved(EntityValue::Minutes(m), raw)
        }
        _ => Entity::malformed(raw),
    }
}

/// `minutes` rounded to a duration chrono can represent.
fn whole_minutes(minutes: f64) -> Option<Duration> {
    let rounded = minutes.round();
    if !rounded.is_finite() || rounded.abs() >= i64::MAX as f64 {
        return None;
    }
    Duration::try_minutes(rounded as i64)
}

fn date_entity(date: Option<NaiveDate>, raw: String) -> Entity {
    match date {
        Some(d) => Entity::resolved(EntityValue::Date(d), raw),
        None => Entity::malformed(raw),
    }
}

/// Build a date from day/month/optional year. Without a year, a date already
/// past this year means next year.
fn calendar_date(
    today: NaiveDate,
    day: Option<u32>,
    month: Option<u32>,
    year: Option<u32>,
) -> Option<NaiveDate> {
    let (day, month) = (day?, month?);
    match year {
        Some(y) => NaiveDate::from_ymd_opt(y as i32, month, day),
        None => {
            let this_year = NaiveDate::from_ymd_opt(today.year(), month, day)?;
            if this_year < today {
                NaiveDate::from_ymd_opt(today.year() + 1, month, day)
            } else {
                Some(this_year)
            }
        }
    }
}

fn window_for(caps: &Captures<'_>, today: NaiveDate, tz: &Tz) -> Option<Entity> {
    if let Some(n) = caps.get(3) {
        let days = number_word(n.as_str())?;
        if days < 1.0 {
            return None;
        }
        let end = Some(days as u64)
            .filter(|d| *d <= MAX_WINDOW_DAYS)
            .and_then(|d| today.checked_add_days(Days::new(d)));
        return Some(match end {
            Some(end) => Entity::resolved(
                EntityValue::Window(Interval {
                    start: local_day_bounds(today, tz).start,
                    end: local_day_bounds(end, tz).start,
                }),
                raw(caps),
            ),
            None => Entity::malformed(raw(caps)),
        });
    }
    named_window(caps, today, tz).map(|w| Entity::resolved(EntityValue::Window(w), raw(caps)))
}

/// "this week", "next weekend" and friends.
fn named_window(caps: &Captures<'_>, today: NaiveDate, tz: &Tz) -> Option<Interval> {
    let day_start = |d: NaiveDate| local_day_bounds(d, tz).start;
    let which = caps.get(1).map(|m| m.as_str().to_lowercase());
    let unit = caps.get(2).map(|m| m.as_str().to_lowercase());

    let monday = week_start(today);
    match (which.as_deref(), unit.as_deref()) {
        (Some("this"), Some("week")) => Some(Interval {
            start: day_start(today),
            end: day_start(monday + Duration::days(7)),
        }),
        (Some("next"), Some("week")) => Some(Interval {
            start: day_start(monday + Duration::days(7)),
            end: day_start(monday + Duration::days(14)),
        }),
        (Some("next"), Some("weekend")) => {
            let saturday = monday + Duration::days(12);
            Some(Interval {
                start: day_start(saturday),
                end: day_start(saturday + Duration::days(2)),
            })
        }
        _ => {
            // "this weekend" / "the weekend": the coming one, or the current one
            let saturday = monday + Duration::days(5);
            Some(Interval {
                start: day_start(saturday.max(today)),
                end: day_start(saturday + Duration::days(2)),
            })
        }
    }
}
