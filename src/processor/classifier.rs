//! Pattern-based intent classification for chat utterances.
//!
//! Read-only questions are checked first, in a fixed order, and must be phrased
//! as questions or listing commands. After that the action rules compete. The
//! rule whose verb appears earliest in the utterance wins, and ties go to the
//! rule listed first. "Schedule a meeting to complete the report" is about
//! scheduling, not completing. Anything left over is general chat.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::types::Subject;

/// What the user wants done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentCategory {
    CreateMeeting,
    QueryMeetings,
    DeleteMeeting,
    CreateTask,
    CompleteTask,
    DeleteTask,
    SendEmail,
    QueryAvailability,
    QueryTasks,
    QueryEmails,
    GeneralChat,
}

impl IntentCategory {
    /// Human-readable label for this category.
    pub fn label(&self) -> &'static str {
        match self {
            Self::CreateMeeting => "create_meeting",
            Self::QueryMeetings => "query_meetings",
            Self::DeleteMeeting => "delete_meeting",
            Self::CreateTask => "create_task",
            Self::CompleteTask => "complete_task",
            Self::DeleteTask => "delete_task",
            Self::SendEmail => "send_email",
            Self::QueryAvailability => "query_availability",
            Self::QueryTasks => "query_tasks",
            Self::QueryEmails => "query_emails",
            Self::GeneralChat => "general_chat",
        }
    }

    /// The kind of record this category is about, if any.
    pub fn subject(&self) -> Option<Subject> {
        match self {
            Self::CreateMeeting | Self::QueryMeetings | Self::DeleteMeeting => {
                Some(Subject::Meeting)
            }
            Self::CreateTask | Self::CompleteTask | Self::DeleteTask | Self::QueryTasks => {
                Some(Subject::Task)
            }
            Self::SendEmail | Self::QueryEmails => Some(Subject::Email),
            Self::QueryAvailability | Self::GeneralChat => None,
        }
    }

    /// Whether acting on this category changes the user's data.
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            Self::CreateMeeting
                | Self::DeleteMeeting
                | Self::CreateTask
                | Self::CompleteTask
                | Self::DeleteTask
                | Self::SendEmail
        )
    }
}

/// Inputs the rules look at.
#[derive(Debug, Clone)]
pub struct Signals<'a> {
    /// NFKC-normalized, lowercased utterance.
    pub text: &'a str,
    /// Subject of a pronoun such as "it" or "that meeting", when one was found.
    pub referent: Option<Subject>,
}

fn re_query_availability() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(?:when am i free|am i free|when are you free|are you free|when (?:can|could) (?:i|we) meet|free time|free slots?|free blocks?|open slots?|availability|when am i available|am i available|find (?:me )?(?:a |some )?(?:free )?time|any gaps?|gaps? in my)\b").unwrap()
    })
}

const QUERY_LEAD: &str = r"^(?:please\s+)?(?:can you\s+|could you\s+)?(?:what|which|show|list|display|tell me|do i have|have i got|any|how many|what's|whats|what is|what are|when is|when's|view|see|give me|check|read)\b";

fn re_query_tasks() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(
            r"{}.*\b(?:tasks?|to-?dos?|to do list|reminders?)\b|^(?:my\s+)?(?:tasks|to-?dos)$",
            QUERY_LEAD
        ))
        .unwrap()
    })
}

fn re_query_emails() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(
            r"{}.*\b(?:e-?mails?|inbox|mail|messages)\b|^(?:my\s+)?(?:e-?mails|inbox)$",
            QUERY_LEAD
        ))
        .unwrap()
    })
}

fn re_query_meetings() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(
            r"{}.*\b(?:meetings?|events?|calls?|appointments?|calendar|schedule|agenda|on today|on tomorrow|on (?:monday|tuesday|wednesday|thursday|friday|saturday|sunday))\b|^what(?:'s| is| do i have| have i got)\b.*\b(?:today|tomorrow|this week|next week)\b|^(?:my\s+)?(?:meetings|schedule|agenda|calendar)$",
            QUERY_LEAD
        ))
        .unwrap()
    })
}

fn re_complete_task() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\bmark\b[^.?!]*?\b(?:as\s+)?(?:done|complete|completed|finished)\b|\b(?:complete|finish|tick off|check off|cross off)\b|\bi(?:'ve| have)?\s+(?:finished|completed|done)\b|\bdone with\b").unwrap()
    })
}

fn re_delete_verb() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(?:cancel|delete|remove|drop|call off|scrap|clear)\b").unwrap())
}

fn re_subject_noun() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(?:(meetings?|events?|calls?|appointments?|syncs?|standups?|invites?|1:1s?)|(tasks?|to-?dos?|reminders?))\b").unwrap()
    })
}

fn re_create_task() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(?:create|add|make|new|set)\s+(?:a\s+|an\s+)?(?:new\s+)?(?:task|to-?do|reminder)\b|\bremind me to\b|\b(?:task|to-?do)\s*:|\badd\b.*\bto my (?:task|to-?do) list\b|\bi need to remember to\b").unwrap()
    })
}

fn re_send_email() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(?:send|write|compose|draft)\s+(?:an?\s+)?(?:new\s+|quick\s+)?(?:e-?mail|message|note|mail)\b|\b(?:e-?mail|message)\s+(?:to\s+)?[\w.+-]+@|\bwrite to\b|\bsend\b[^.?!]*\bto\b[^.?!]*@|^(?:please\s+)?e-?mail\s+\w+|\breply to\b").unwrap()
    })
}

fn re_create_meeting() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(?:schedule|book|arrange|organi[sz]e|set up|setup)\b|\b(?:create|add|put|make|new)\s+(?:a\s+|an\s+)?(?:new\s+)?(?:meeting|event|call|appointment)\b|\bput\b.*\bon my calendar\b|\b(?:let's|can we|could we) meet\b").unwrap()
    })
}

fn re_dismissal() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:oh\s+)?(?:never\s?mind|forget (?:it|that|about it)|cancel that|scratch that|stop|no thanks|skip it|don't bother)\b").unwrap()
    })
}

fn re_small_talk() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:(?:hi|hello|hey|hiya|howdy|good\s+(?:morning|afternoon|evening))(?:\s+there)?|thanks|thank\s+you|cheers|thx|ok(?:ay)?|help|what\s+can\s+you\s+do|how\s+does\s+this\s+work)[\s!.,]*$").unwrap()
    })
}

type QueryRule = (IntentCategory, fn() -> &'static Regex);

/// Read-only questions, in priority order.
const QUERY_RULES: &[QueryRule] = &[
    (IntentCategory::QueryAvailability, re_query_availability),
    (IntentCategory::QueryTasks, re_query_tasks),
    (IntentCategory::QueryEmails, re_query_emails),
    (IntentCategory::QueryMeetings, re_query_meetings),
];

type ActionRule = fn(&Signals<'_>) -> Option<(usize, IntentCategory)>;

/// Action rules; table order breaks ties between matches at the same position.
const ACTION_RULES: &[ActionRule] = &[
    complete_task,
    deletion,
    create_task,
    send_email,
    create_meeting,
];

fn first_match(re: &Regex, text: &str) -> Option<usize> {
    re.find(text).map(|m| m.start())
}

fn complete_task(signals: &Signals<'_>) -> Option<(usize, IntentCategory)> {
    first_match(re_complete_task(), signals.text).map(|at| (at, IntentCategory::CompleteTask))
}

/// "cancel"/"delete"/"remove". The first subject noun after the verb decides
/// between meeting and task, then the pronoun's referent. With neither,
/// deletion is about a meeting.
fn deletion(signals: &Signals<'_>) -> Option<(usize, IntentCategory)> {
    let verb = re_delete_verb().find(signals.text)?;
    let after = &signals.text[verb.end()..];
    let subject = re_subject_noun()
        .captures(after)
        .map(|caps| {
            if caps.get(1).is_some() {
                Subject::Meeting
            } else {
                Subject::Task
            }
        })
        .or(signals.referent)
        .unwrap_or(Subject::Meeting);
    let category = match subject {
        Subject::Task => IntentCategory::DeleteTask,
        _ => IntentCategory::DeleteMeeting,
    };
    Some((verb.start(), category))
}

fn create_task(signals: &Signals<'_>) -> Option<(usize, IntentCategory)> {
    first_match(re_create_task(), signals.text).map(|at| (at, IntentCategory::CreateTask))
}

fn send_email(signals: &Signals<'_>) -> Option<(usize, IntentCategory)> {
    first_match(re_send_email(), signals.text).map(|at| (at, IntentCategory::SendEmail))
}

fn create_meeting(signals: &Signals<'_>) -> Option<(usize, IntentCategory)> {
    first_match(re_create_meeting(), signals.text).map(|at| (at, IntentCategory::CreateMeeting))
}

/// Classify an utterance. `None` means no rule matched (general chat, or a
/// bare answer to an earlier question).
pub fn classify(signals: &Signals<'_>) -> Option<IntentCategory> {
    let text = signals.text.trim();
    if text.is_empty() {
        return None;
    }

    for (category, re) in QUERY_RULES {
        if re().is_match(text) {
            return Some(*category);
        }
    }

    let mut best: Option<(usize, IntentCategory)> = None;
    for rule in ACTION_RULES {
        if let Some((at, category)) = rule(signals) {
            if best.map_or(true, |(best_at, _)| at < best_at) {
                best = Some((at, category));
            }
        }
    }
    best.map(|(_, category)| category)
}

/// "never mind", "forget it" and similar: drop whatever was being asked.
pub fn is_dismissal(text: &str) -> bool {
    re_dismissal().is_match(text.trim())
}

/// A bare greeting, thanks or plea for help; never an answer to a question.
pub fn is_small_talk(text: &str) -> bool {
    re_small_talk().is_match(text.trim())
}
