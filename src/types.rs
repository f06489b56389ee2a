use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::availability::BusinessHours;
use crate::error::AssistantError;

/// Configuration stored in ~/.execassist/config.json
///
/// Every key is optional; a missing file or an empty object yields the
/// defaults below.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// IANA timezone used to interpret "tomorrow", "at 2pm" and business hours.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_work_hours_start")]
    pub work_hours_start: u8,
    #[serde(default = "default_work_hours_end")]
    pub work_hours_end: u8,
    /// Number of conversation turns kept for follow-up resolution.
    #[serde(default = "default_memory_window")]
    pub memory_window: usize,
    #[serde(default = "default_meeting_minutes")]
    pub default_meeting_minutes: u32,
    /// Look-ahead for availability questions when no window is named.
    #[serde(default = "default_availability_days")]
    pub availability_days: u32,
    #[serde(default = "default_max_slots_shown")]
    pub max_slots_shown: usize,
    #[serde(default)]
    pub conflict_policy: ConflictPolicy,
    /// Conversations idle longer than this are dropped by the session store.
    #[serde(default = "default_session_idle_minutes")]
    pub session_idle_minutes: u32,
    /// Address book: display name → email address.
    #[serde(default)]
    pub contacts: BTreeMap<String, String>,
}

fn default_timezone() -> String {
    "Europe/London".to_string()
}
fn default_work_hours_start() -> u8 {
    9
}
fn default_work_hours_end() -> u8 {
    17
}
fn default_memory_window() -> usize {
    10
}
fn default_meeting_minutes() -> u32 {
    60
}
fn default_availability_days() -> u32 {
    7
}
fn default_max_slots_shown() -> usize {
    8
}
fn default_session_idle_minutes() -> u32 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            work_hours_start: default_work_hours_start(),
            work_hours_end: default_work_hours_end(),
            memory_window: default_memory_window(),
            default_meeting_minutes: default_meeting_minutes(),
            availability_days: default_availability_days(),
            max_slots_shown: default_max_slots_shown(),
            conflict_policy: ConflictPolicy::default(),
            session_idle_minutes: default_session_idle_minutes(),
            contacts: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Parse the configured timezone.
    pub fn tz(&self) -> Result<Tz, AssistantError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| AssistantError::UnknownTimezone(self.timezone.clone()))
    }

    pub fn business_hours(&self) -> Result<BusinessHours, AssistantError> {
        BusinessHours::from_hours(self.work_hours_start, self.work_hours_end)
    }

    pub fn default_meeting_length(&self) -> Duration {
        Duration::minutes(self.default_meeting_minutes.max(1) as i64)
    }

    /// Check every derived value up front so the pipeline never has to.
    pub fn validate(&self) -> Result<(), AssistantError> {
        self.tz()?;
        self.business_hours()?;
        if self.memory_window == 0 {
            return Err(AssistantError::Configuration(
                "memoryWindow must be at least 1".to_string(),
            ));
        }
        if !(1..=366).contains(&self.availability_days) {
            return Err(AssistantError::Configuration(
                "availabilityDays must be between 1 and 366".to_string(),
            ));
        }
        if !(1..=24 * 60).contains(&self.default_meeting_minutes) {
            return Err(AssistantError::Configuration(
                "defaultMeetingMinutes must be between 1 and 1440".to_string(),
            ));
        }
        Ok(())
    }
}

/// What to do when a new meeting overlaps existing ones.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    /// Create the meeting and tell the user about the overlap.
    #[default]
    Warn,
    /// Refuse and ask for another time.
    Block,
}

/// A remote data source behind the workspace collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Calendar,
    Tasks,
    Email,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Calendar => "calendar",
            Source::Tasks => "tasks",
            Source::Email => "email",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a request or a conversational referent is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subject {
    Meeting,
    Task,
    Email,
}

impl Subject {
    pub fn as_str(&self) -> &'static str {
        match self {
            Subject::Meeting => "meeting",
            Subject::Task => "task",
            Subject::Email => "email",
        }
    }
}

/// A half-open time interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Interval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Interval {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, AssistantError> {
        if start >= end {
            return Err(AssistantError::InvalidInterval { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn duration(&self) -> Duration {
        self.end.signed_duration_since(self.start)
    }

    pub fn minutes(&self) -> i64 {
        self.duration().num_minutes()
    }

    /// Half-open overlap: touching boundaries do not overlap.
    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// A meeting read from the calendar collaborator.
///
/// `start < end` is enforced on construction and on deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "MeetingRecord")]
pub struct MeetingInterval {
    id: String,
    title: String,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    attendees: Vec<String>,
    location: Option<String>,
}

/// Unchecked wire shape of a meeting.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MeetingRecord {
    id: String,
    title: String,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    #[serde(default)]
    attendees: Vec<String>,
    #[serde(default)]
    location: Option<String>,
}

impl TryFrom<MeetingRecord> for MeetingInterval {
    type Error = AssistantError;

    fn try_from(raw: MeetingRecord) -> Result<Self, Self::Error> {
        let meeting = MeetingInterval::new(raw.id, raw.title, raw.start, raw.end)?
            .with_attendees(raw.attendees);
        Ok(match raw.location {
            Some(location) => meeting.with_location(location),
            None => meeting,
        })
    }
}

impl MeetingInterval {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Self, AssistantError> {
        if start >= end {
            return Err(AssistantError::InvalidInterval { start, end });
        }
        Ok(Self {
            id: id.into(),
            title: title.into(),
            start,
            end,
            attendees: Vec::new(),
            location: None,
        })
    }

    pub fn with_attendees(mut self, attendees: Vec<String>) -> Self {
        self.attendees = attendees;
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        let location = location.into();
        self.location = if location.trim().is_empty() {
            None
        } else {
            Some(location)
        };
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn attendees(&self) -> &[String] {
        &self.attendees
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    pub fn interval(&self) -> Interval {
        Interval {
            start: self.start,
            end: self.end,
        }
    }

    pub fn duration_minutes(&self) -> i64 {
        self.interval().minutes()
    }
}

/// Task priority level
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Priority {
    P1,
    #[default]
    P2,
    P3,
}

impl Priority {
    pub fn label(&self) -> &'static str {
        match self {
            Priority::P1 => "high",
            Priority::P2 => "medium",
            Priority::P3 => "low",
        }
    }
}

/// A task read from the task collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due: Option<NaiveDate>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub description: String,
}

/// Email priority level
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmailPriority {
    High,
    #[default]
    Normal,
}

/// A recent or unread email summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailSummary {
    pub id: String,
    pub sender: String,
    pub subject: String,
    #[serde(default)]
    pub priority: EmailPriority,
    #[serde(default)]
    pub read: bool,
    pub received_at: DateTime<Utc>,
}

/// Point-in-time copy of the user's data for one decision cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub now: DateTime<Utc>,
    #[serde(default)]
    pub meetings: Vec<MeetingInterval>,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub emails: Vec<EmailSummary>,
    /// Sources whose read failed; their lists above are empty, not "nothing".
    #[serde(default)]
    pub unavailable: Vec<Source>,
}

impl Snapshot {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now,
            meetings: Vec::new(),
            tasks: Vec::new(),
            emails: Vec::new(),
            unavailable: Vec::new(),
        }
    }

    pub fn with_meetings(mut self, meetings: Vec<MeetingInterval>) -> Self {
        self.meetings = meetings;
        self
    }

    pub fn with_tasks(mut self, tasks: Vec<Task>) -> Self {
        self.tasks = tasks;
        self
    }

    pub fn with_emails(mut self, emails: Vec<EmailSummary>) -> Self {
        self.emails = emails;
        self
    }

    pub fn is_available(&self, source: Source) -> bool {
        !self.unavailable.contains(&source)
    }

    pub fn pending_tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter().filter(|t| !t.completed)
    }
}

/// Which read-only report a query asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    Meetings,
    Tasks,
    Emails,
    Availability,
}

/// A fully specified request for a collaborator to execute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionRequest {
    CreateMeeting {
        title: String,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        attendees: Vec<String>,
        location: Option<String>,
    },
    DeleteMeeting {
        id: String,
    },
    CreateTask {
        title: String,
        due_date: Option<NaiveDate>,
        description: Option<String>,
        priority: Option<Priority>,
    },
    CompleteTask {
        id: String,
    },
    DeleteTask {
        id: String,
    },
    SendEmail {
        to: Vec<String>,
        subject: String,
        body: String,
    },
    Query {
        kind: QueryKind,
    },
}

impl ActionRequest {
    pub fn is_mutating(&self) -> bool {
        !matches!(self, ActionRequest::Query { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            ActionRequest::CreateMeeting { .. } => "create_meeting",
            ActionRequest::DeleteMeeting { .. } => "delete_meeting",
            ActionRequest::CreateTask { .. } => "create_task",
            ActionRequest::CompleteTask { .. } => "complete_task",
            ActionRequest::DeleteTask { .. } => "delete_task",
            ActionRequest::SendEmail { .. } => "send_email",
            ActionRequest::Query { .. } => "query",
        }
    }

    /// The collaborator that executes this request.
    pub fn source(&self) -> Option<Source> {
        match self {
            ActionRequest::CreateMeeting { .. } | ActionRequest::DeleteMeeting { .. } => {
                Some(Source::Calendar)
            }
            ActionRequest::CreateTask { .. }
            | ActionRequest::CompleteTask { .. }
            | ActionRequest::DeleteTask { .. } => Some(Source::Tasks),
            ActionRequest::SendEmail { .. } => Some(Source::Email),
            ActionRequest::Query { .. } => None,
        }
    }
}

/// A collaborator's confirmation of an executed action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    /// Remote id of the created or affected record, when there is one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub message: String,
}
