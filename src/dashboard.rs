//! Today at a glance: meetings, task-like calendar entries, open tasks,
//! unread mail and how much of the working day is still free.

use chrono::{DateTime, Duration, NaiveDate, Timelike, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use crate::agent::{is_important, render};
use crate::availability::{free_slots, local_day_bounds};
use crate::error::AssistantError;
use crate::types::{Config, EmailSummary, Interval, MeetingInterval, Priority, Snapshot, Source, Task};

const MAX_TASKS: usize = 10;
const MAX_EMAILS: usize = 10;
const MAX_SUGGESTIONS: usize = 4;

/// Titles containing any of these are meetings, whatever else they say.
const MEETING_KEYWORDS: &[&str] = &[
    "meeting",
    "call",
    "conference",
    "discussion",
    "standup",
    "sync",
    "team",
    "group",
    "session",
    "interview",
    "presentation",
    "demo",
    "workshop",
    "training",
    "seminar",
];

/// Task regardless of attendees.
const EXPLICIT_TASK_KEYWORDS: &[&str] = &[
    "deadline", "due", "submit", "reminder", "task", "todo", "to do",
];

const TASK_KEYWORDS: &[&str] = &[
    "finish",
    "complete",
    "draft",
    "personal appointment",
    "prepare",
    "pick up",
    "drop off",
    "appointment",
    "dentist",
    "doctor",
    "checkup",
    "visit",
];

const PERSONAL_PATTERNS: &[&str] = &[
    "prep", "bedtime", "morning", "workout", "exercise", "study", "practice", "clean",
    "organize", "shopping", "errands",
];

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardMeeting {
    pub id: String,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Local start time, e.g. "2:00 PM".
    pub time: String,
    pub duration_minutes: i64,
    pub attendees: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

/// A calendar entry that reads like something to do rather than a meeting.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarTask {
    pub id: String,
    pub title: String,
    pub due: DateTime<Utc>,
    pub due_label: String,
    pub priority: Priority,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayStats {
    pub meetings: usize,
    pub emails: usize,
    pub tasks: usize,
    pub free_minutes: i64,
    pub free_time: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardData {
    pub date: NaiveDate,
    pub meetings: Vec<DashboardMeeting>,
    pub calendar_tasks: Vec<CalendarTask>,
    pub tasks: Vec<Task>,
    pub emails: Vec<EmailSummary>,
    pub stats: DayStats,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unavailable: Vec<Source>,
}

/// Build the dashboard for the local day containing `snapshot.now`.
pub fn build_dashboard(snapshot: &Snapshot, config: &Config) -> Result<DashboardData, AssistantError> {
    let tz = config.tz()?;
    let hours = config.business_hours()?;
    let now = snapshot.now;
    let today = now.with_timezone(&tz).date_naive();
    let bounds = local_day_bounds(today, &tz);

    let mut events: Vec<&MeetingInterval> = snapshot
        .meetings
        .iter()
        .filter(|m| m.end() > bounds.start)
        .collect();
    events.sort_by_key(|m| (m.start(), m.end()));

    let mut meetings = Vec::new();
    let mut calendar_tasks = Vec::new();
    for event in events.iter().copied() {
        if looks_like_task(event) {
            let due_day = event.start().with_timezone(&tz).date_naive();
            calendar_tasks.push(CalendarTask {
                id: event.id().to_string(),
                title: event.title().to_string(),
                due: event.start(),
                due_label: render::when(event.start(), &tz, today),
                priority: if due_day <= today {
                    Priority::P1
                } else {
                    Priority::P2
                },
            });
        } else if event.start() < bounds.end {
            meetings.push(DashboardMeeting {
                id: event.id().to_string(),
                title: event.title().to_string(),
                start: event.start(),
                end: event.end(),
                time: render::time(event.start(), &tz),
                duration_minutes: event.duration_minutes(),
                attendees: event.attendees().to_vec(),
                location: event.location().map(str::to_string),
            });
        }
    }

    // Task-like entries still occupy the calendar.
    let todays: Vec<MeetingInterval> = events
        .iter()
        .filter(|m| m.start() < bounds.end)
        .map(|m| (*m).clone())
        .collect();
    let business = hours.on(today, &tz);
    let free_minutes: i64 = free_slots(
        &todays,
        now.max(business.start),
        business.end,
        Duration::minutes(1),
        &hours,
        tz,
    )
    .map(|slot| slot.minutes())
    .sum();
    let free_time = if snapshot.is_available(Source::Calendar) {
        free_time_label(now, &business, meetings.len(), free_minutes)
    } else {
        "Calendar unavailable".to_string()
    };

    let mut pending: Vec<Task> = snapshot.pending_tasks().cloned().collect();
    pending.sort_by(|a, b| {
        (a.priority, a.due.is_none(), a.due, &a.title).cmp(&(b.priority, b.due.is_none(), b.due, &b.title))
    });
    let task_count = pending.len();
    pending.truncate(MAX_TASKS);

    let mut unread: Vec<EmailSummary> = snapshot.emails.iter().filter(|e| !e.read).cloned().collect();
    unread.sort_by_key(|e| !is_important(e));
    let email_count = unread.len();
    unread.truncate(MAX_EMAILS);

    Ok(DashboardData {
        date: today,
        stats: DayStats {
            meetings: meetings.len(),
            emails: email_count,
            tasks: task_count,
            free_minutes,
            free_time,
        },
        meetings,
        calendar_tasks,
        tasks: pending,
        emails: unread,
        unavailable: snapshot.unavailable.clone(),
    })
}

fn free_time_label(
    now: DateTime<Utc>,
    business: &Interval,
    meetings_today: usize,
    free_minutes: i64,
) -> String {
    if now >= business.end {
        return "Day complete".to_string();
    }
    if meetings_today == 0 {
        return if now < business.start {
            "Full day available".to_string()
        } else {
            format!("{} remaining today", render::minutes(free_minutes))
        };
    }
    let hours = free_minutes as f64 / 60.0;
    if hours > 6.0 {
        format!("{hours:.1}h free")
    } else if hours > 3.0 {
        format!("{hours:.1}h available")
    } else if hours > 1.0 {
        format!("{hours:.1}h left")
    } else {
        "Busy day".to_string()
    }
}

/// Whether a calendar event is really a personal task.
///
/// Meeting words always win. Otherwise explicit task words decide, and
/// events nobody else attends also count when they name a chore or routine.
pub fn looks_like_task(event: &MeetingInterval) -> bool {
    let title = padded_words(event.title());
    if mentions_any(&title, MEETING_KEYWORDS) {
        return false;
    }
    if mentions_any(&title, EXPLICIT_TASK_KEYWORDS) {
        return true;
    }
    event.attendees().is_empty()
        && (mentions_any(&title, TASK_KEYWORDS) || mentions_any(&title, PERSONAL_PATTERNS))
}

/// Lowercased words separated and surrounded by single spaces.
fn padded_words(text: &str) -> String {
    let lowered = text.to_lowercase();
    let words: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    format!(" {} ", words.join(" "))
}

fn mentions_any(padded: &str, keywords: &[&str]) -> bool {
    keywords
        .iter()
        .any(|kw| padded.contains(&format!(" {kw} ")) || padded.contains(&format!(" {kw}s ")))
}

/// Prompts worth offering at this hour of the user's day.
pub fn suggestions(now_local: DateTime<Tz>, pending_tasks: usize) -> Vec<String> {
    let hour = now_local.hour();
    let by_hour: [&str; 3] = match hour {
        8..=10 => [
            "Check my unread emails",
            "What meetings do I have today?",
            "Show my high priority tasks",
        ],
        11..=13 => [
            "Schedule a lunch meeting next week",
            "What's on my calendar this afternoon?",
            "Send a follow-up email",
        ],
        14..=17 => [
            "When am I free tomorrow?",
            "Check for urgent emails",
            "Schedule an end-of-week review on Friday",
        ],
        _ => [
            "What meetings do I have tomorrow?",
            "Show my tasks due tomorrow",
            "Add a task to prepare tomorrow's agenda",
        ],
    };

    let mut out = Vec::with_capacity(MAX_SUGGESTIONS);
    if pending_tasks > 0 {
        out.push(format!("Complete {pending_tasks} pending tasks"));
    }
    out.extend(by_hour.iter().map(|s| s.to_string()));
    out.truncate(MAX_SUGGESTIONS);
    out
}
