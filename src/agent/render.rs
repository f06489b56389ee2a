//! Turning records and questions into reply text.

use chrono::{DateTime, NaiveDate, NaiveTime, Timelike, Utc};
use chrono_tz::Tz;

use crate::processor::{Field, IntentCategory, Referent};
use crate::types::{EmailPriority, EmailSummary, Interval, MeetingInterval, Task};

pub fn clock(time: NaiveTime) -> String {
    time.format("%-I:%M %p").to_string()
}

pub fn time(instant: DateTime<Utc>, tz: &Tz) -> String {
    instant.with_timezone(tz).format("%-I:%M %p").to_string()
}

/// "today", "tomorrow", or "Friday, February 13".
pub fn day(date: NaiveDate, today: NaiveDate) -> String {
    if date == today {
        "today".to_string()
    } else if Some(date) == today.succ_opt() {
        "tomorrow".to_string()
    } else {
        date.format("%A, %B %-d").to_string()
    }
}

/// "tomorrow at 2:00 PM"
pub fn when(instant: DateTime<Utc>, tz: &Tz, today: NaiveDate) -> String {
    let local = instant.with_timezone(tz);
    format!("{} at {}", day(local.date_naive(), today), clock(local.time()))
}

/// "2:00 PM - 3:30 PM", with the day prefixed when it differs from `today`
/// or the interval crosses midnight.
pub fn span(interval: &Interval, tz: &Tz, today: NaiveDate) -> String {
    let start = interval.start.with_timezone(tz);
    let end = interval.end.with_timezone(tz);
    let mut out = if start.date_naive() == today {
        clock(start.time())
    } else {
        format!("{}, {}", day(start.date_naive(), today), clock(start.time()))
    };
    out.push_str(" - ");
    if end.date_naive() != start.date_naive() && end.time() != NaiveTime::MIN {
        out.push_str(&day(end.date_naive(), today));
        out.push_str(", ");
    }
    out.push_str(&clock(end.time()));
    out
}

pub fn minutes(total: i64) -> String {
    let (hours, rest) = (total / 60, total % 60);
    let plural = |n: i64, unit: &str| {
        if n == 1 {
            format!("1 {unit}")
        } else {
            format!("{n} {unit}s")
        }
    };
    match (hours, rest) {
        (0, m) => plural(m, "minute"),
        (h, 0) => plural(h, "hour"),
        (h, m) => format!("{} {}", plural(h, "hour"), plural(m, "minute")),
    }
}

/// "a", "a and b", "a, b and c"
pub fn join(items: &[String]) -> String {
    match items {
        [] => String::new(),
        [only] => only.clone(),
        [init @ .., last] => format!("{} and {}", init.join(", "), last),
    }
}

/// "2:00 PM - 3:00 PM: Budget review (1 hour) with dana@example.com in Room 4"
pub fn meeting_line(meeting: &MeetingInterval, tz: &Tz, today: NaiveDate) -> String {
    let mut line = format!(
        "{}: {} ({})",
        span(&meeting.interval(), tz, today),
        meeting.title(),
        minutes(meeting.duration_minutes())
    );
    if !meeting.attendees().is_empty() {
        line.push_str(" with ");
        line.push_str(&join(meeting.attendees()));
    }
    if let Some(location) = meeting.location() {
        line.push_str(" in ");
        line.push_str(location);
    }
    line
}

pub fn task_line(task: &Task, today: NaiveDate) -> String {
    let mut notes = Vec::new();
    if task.priority != Default::default() {
        notes.push(format!("{} priority", task.priority.label()));
    }
    if let Some(due) = task.due {
        if due < today {
            notes.push(format!("overdue since {}", day(due, today)));
        } else {
            notes.push(format!("due {}", day(due, today)));
        }
    }
    if notes.is_empty() {
        task.title.clone()
    } else {
        format!("{} ({})", task.title, notes.join(", "))
    }
}

pub fn email_line(email: &EmailSummary) -> String {
    let marker = if email.priority == EmailPriority::High {
        " [important]"
    } else {
        ""
    };
    format!("{}: {}{}", email.sender, email.subject, marker)
}

pub fn bullets(lines: impl IntoIterator<Item = String>) -> String {
    lines
        .into_iter()
        .map(|line| format!("• {line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn numbered(lines: impl IntoIterator<Item = String>) -> String {
    lines
        .into_iter()
        .enumerate()
        .map(|(i, line)| format!("{}. {}", i + 1, line))
        .collect::<Vec<_>>()
        .join("\n")
}

/// How a candidate is listed when asking "which one?".
pub fn choice_line(choice: &Referent, tz: &Tz, today: NaiveDate) -> String {
    let title = choice.title.as_deref().unwrap_or("Untitled");
    match choice.start {
        Some(start) => format!("{} ({})", title, when(start, tz, today)),
        None => title.to_string(),
    }
}

/// Opening question for a request that named nothing to act on.
pub fn capability_prompt(category: IntentCategory) -> &'static str {
    match category {
        IntentCategory::CreateMeeting => {
            "I'd be happy to set up a meeting! What should it be called, and when should it start? \
             You can also say how long it runs, who to invite and where. \
             For example: 'Budget review with Alice tomorrow at 2pm for 30 minutes'"
        }
        IntentCategory::DeleteMeeting => "Which meeting should I cancel?",
        IntentCategory::CreateTask => {
            "I'd be happy to help you create a new task! What's it about? \
             You can add a deadline and how important it is. \
             For example: 'Create task: Review quarterly budget by Friday - high priority'"
        }
        IntentCategory::CompleteTask => "Which task did you finish?",
        IntentCategory::DeleteTask => "Which task should I delete?",
        IntentCategory::SendEmail => {
            "Who should I send it to, and what should it say? A subject is optional."
        }
        _ => "What would you like me to do?",
    }
}

/// A follow-up question for fields that are still missing.
pub fn ask_for(category: IntentCategory, missing: &[Field]) -> String {
    match (category, missing) {
        (IntentCategory::CreateMeeting, [Field::Title]) => {
            "What should the meeting be called?".to_string()
        }
        (IntentCategory::CreateMeeting, [Field::Time]) => "When should it start?".to_string(),
        (IntentCategory::CreateTask, [Field::Title]) => "What's the task?".to_string(),
        (IntentCategory::SendEmail, [Field::Recipients]) => {
            "Who should I send it to?".to_string()
        }
        (IntentCategory::SendEmail, [Field::Body]) => "What should the email say?".to_string(),
        (_, fields) => {
            let labels: Vec<String> = fields.iter().map(|f| f.label().to_string()).collect();
            format!("I still need {}.", join(&labels))
        }
    }
}

/// Question for a value that has two readings or could not be read.
pub fn clarify(field: Field, raw: &str, guess: Option<NaiveTime>) -> String {
    match (field, guess) {
        (Field::Time, Some(t)) => {
            let hour = t.hour() % 12;
            let hour = if hour == 0 { 12 } else { hour };
            let minute = if t.minute() == 0 {
                String::new()
            } else {
                format!(":{:02}", t.minute())
            };
            format!("Did you mean {hour}{minute} AM or {hour}{minute} PM?")
        }
        (Field::Date, _) => format!("I couldn't make sense of the date '{raw}'. Which day do you mean?"),
        (Field::Time, None) => format!("I couldn't read '{raw}' as a time. When should it be?"),
        (Field::Duration, _) => format!("'{raw}' isn't a length I can use. How long should it be?"),
        (Field::Window, _) => format!("I can't look as far as '{raw}'. Which days do you mean?"),
        (field, _) if field.is_people() => {
            format!("'{raw}' doesn't look like a valid email address. What's the right one?")
        }
        (field, _) => format!("I couldn't understand '{raw}'. Could you give me {}?", field.label()),
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, 12).unwrap()
    }

    #[test]
    fn days_are_relative_when_close() {
        assert_eq!(day(today(), today()), "today");
        assert_eq!(day(NaiveDate::from_ymd_opt(2026, 2, 13).unwrap(), today()), "tomorrow");
        assert_eq!(
            day(NaiveDate::from_ymd_opt(2026, 2, 16).unwrap(), today()),
            "Monday, February 16"
        );
    }

    #[test]
    fn spans_render_in_local_time() {
        let tz: Tz = "America/New_York".parse().unwrap();
        let interval = Interval {
            start: Utc.with_ymd_and_hms(2026, 2, 12, 19, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2026, 2, 12, 20, 30, 0).unwrap(),
        };
        assert_eq!(span(&interval, &tz, today()), "2:00 PM - 3:30 PM");
    }

    #[test]
    fn minute_counts() {
        assert_eq!(minutes(30), "30 minutes");
        assert_eq!(minutes(60), "1 hour");
        assert_eq!(minutes(90), "1 hour 30 minutes");
        assert_eq!(minutes(1), "1 minute");
    }

    #[test]
    fn lists_join_naturally() {
        let items = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert_eq!(join(&items(&["a"])), "a");
        assert_eq!(join(&items(&["a", "b"])), "a and b");
        assert_eq!(join(&items(&["a", "b", "c"])), "a, b and c");
    }

    #[test]
    fn ambiguous_hour_question() {
        let seven = NaiveTime::from_hms_opt(19, 0, 0).unwrap();
        assert_eq!(clarify(Field::Time, "at 7", Some(seven)), "Did you mean 7 AM or 7 PM?");
        let half = NaiveTime::from_hms_opt(6, 30, 0).unwrap();
        assert_eq!(clarify(Field::Time, "6:30", Some(half)), "Did you mean 6:30 AM or 6:30 PM?");
    }

    #[test]
    fn task_lines_flag_overdue() {
        let task = Task {
            id: "t1".into(),
            title: "File expenses".into(),
            due: NaiveDate::from_ymd_opt(2026, 2, 10),
            completed: false,
            priority: crate::types::Priority::P1,
            description: String::new(),
        };
        assert_eq!(
            task_line(&task, today()),
            "File expenses (high priority, overdue since Tuesday, February 10)"
        );
    }
}
