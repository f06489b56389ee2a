//! The scheduling agent: turns a routed intent and its entities into an
//! action, a clarifying question or an answer.
//!
//! The agent is pure. It reads a [`Snapshot`] taken for this turn and never
//! talks to a collaborator; executing the action is the caller's job.

pub mod render;
pub mod requirements;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use log::debug;
use regex::Regex;

use crate::availability::{self, BusinessHours};
use crate::context::PendingClarification;
use crate::error::AssistantError;
use crate::helpers::{capitalize_first, first_words, normalize_key, strip_article};
use crate::processor::attendees::resolve_all;
use crate::processor::router::Intent;
use crate::processor::{
    Attendee, Confidence, Entity, EntityBag, EntityValue, Field, IntentCategory, Referent,
};
use crate::types::{
    ActionRequest, Config, ConflictPolicy, EmailPriority, EmailSummary, Interval,
    MeetingInterval, QueryKind, Snapshot, Source, Subject, Task,
};
use requirements::relevant_fields;

/// Jaro-Winkler score above which a title is taken to name a record.
const TITLE_MATCH_THRESHOLD: f64 = 0.85;
/// Candidates listed when asking "which one?".
const MAX_CHOICES: usize = 5;
const MAX_TASKS_SHOWN: usize = 10;
const MAX_EMAILS_SHOWN: usize = 10;
/// Default look-ahead for meeting listings.
const MEETING_QUERY_DAYS: i64 = 7;
const SUBJECT_WORDS: usize = 6;

/// Subject-line words that mark an email as needing attention.
const URGENT_WORDS: &[&str] = &[
    "urgent",
    "asap",
    "important",
    "action required",
    "deadline",
    "immediately",
    "overdue",
    "emergency",
    "critical",
];

/// What the agent decided for one utterance.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// A fully specified request, ready to execute.
    Act {
        action: ActionRequest,
        /// Meetings the new one overlaps (only when the policy lets it through).
        conflicts: Vec<MeetingInterval>,
        message: String,
        /// The entities as acted on; creates carry a referent for the new record.
        resolved: EntityBag,
    },
    /// Something is missing or unclear.
    Ask {
        question: String,
        pending: PendingClarification,
    },
    /// A read-only reply.
    Answer {
        text: String,
        query: Option<QueryKind>,
    },
}

#[derive(Debug, Clone)]
pub struct SchedulingAgent {
    tz: Tz,
    hours: BusinessHours,
    meeting_length: Duration,
    availability_days: i64,
    max_slots: usize,
    policy: ConflictPolicy,
    contacts: BTreeMap<String, String>,
}

impl SchedulingAgent {
    pub fn new(config: &Config) -> Result<Self, AssistantError> {
        Ok(Self {
            tz: config.tz()?,
            hours: config.business_hours()?,
            meeting_length: config.default_meeting_length(),
            availability_days: config.availability_days.max(1) as i64,
            max_slots: config.max_slots_shown.max(1),
            policy: config.conflict_policy,
            contacts: config.contacts.clone(),
        })
    }

    pub fn tz(&self) -> Tz {
        self.tz
    }

    /// Decide what to do about `intent`.
    ///
    /// `pending` is the clarification outstanding before this utterance; a
    /// question re-asked while continuing it keeps its original creation time.
    pub fn handle(
        &self,
        utterance: &str,
        intent: &Intent,
        entities: EntityBag,
        pending: Option<&PendingClarification>,
        snapshot: &Snapshot,
    ) -> Outcome {
        let created_at = pending
            .filter(|_| intent.continues)
            .map(|p| p.created_at)
            .unwrap_or(snapshot.now);
        let cycle = Cycle {
            agent: self,
            snapshot,
            category: intent.category,
            today: snapshot.now.with_timezone(&self.tz).date_naive(),
            created_at,
        };
        debug!(
            "handling {} (continues: {}, under-specified: {})",
            intent.category.label(),
            intent.continues,
            intent.under_specified
        );

        match intent.category {
            IntentCategory::GeneralChat => Outcome::Answer {
                text: cycle.chat(utterance),
                query: None,
            },
            IntentCategory::QueryMeetings => cycle.list_meetings(&entities),
            IntentCategory::QueryAvailability => cycle.list_free_slots(&entities),
            IntentCategory::QueryTasks => cycle.list_tasks(&entities),
            IntentCategory::QueryEmails => cycle.list_emails(re_urgent_request().is_match(utterance)),
            _ if intent.under_specified => cycle.prompt(entities),
            _ => match cycle.unclear(&entities) {
                Some(question) => question,
                None => cycle.act(entities),
            },
        }
    }
}

/// State for one decision.
struct Cycle<'a> {
    agent: &'a SchedulingAgent,
    snapshot: &'a Snapshot,
    category: IntentCategory,
    today: NaiveDate,
    created_at: DateTime<Utc>,
}

fn re_greeting() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(?:hi|hello|hey|hiya|howdy|good\s+(?:morning|afternoon|evening))\b").unwrap()
    })
}

fn re_thanks() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(?:thanks|thank\s+you|cheers|thx)\b").unwrap())
}

fn re_help() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:help|what\s+can\s+you\s+do|how\s+does\s+this\s+work)\b").unwrap()
    })
}

fn re_urgent_request() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(?:urgent|important|priority|critical|asap)\b").unwrap())
}

fn re_clock_question() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bwhat(?:'s|\s+is)\s+the\s+time\b|\bwhat\s+time\s+is\s+it\b").unwrap())
}

fn re_date_question() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\bwhat(?:'s|\s+is)\s+(?:the\s+date|today'?s\s+date)\b|\bwhat\s+day\s+is\s+(?:it|today)\b").unwrap()
    })
}

impl<'a> Cycle<'a> {
    fn tz(&self) -> &Tz {
        &self.agent.tz
    }

    fn ask(&self, question: String, mut known: EntityBag, missing: &[Field]) -> Outcome {
        known.retain(relevant_fields(self.category));
        known.hint = Some(self.category);
        known.residual.clear();
        Outcome::Ask {
            question,
            pending: PendingClarification {
                category: self.category,
                known,
                missing: missing.iter().copied().collect::<BTreeSet<_>>(),
                created_at: self.created_at,
            },
        }
    }

    fn unavailable(&self, source: Source, what: &str) -> Option<String> {
        if self.snapshot.is_available(source) {
            return None;
        }
        let place = match source {
            Source::Calendar => "your calendar",
            Source::Tasks => "your task list",
            Source::Email => "your inbox",
        };
        Some(format!(
            "I couldn't reach {place} right now, so I can't {what}. Please try again in a moment."
        ))
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// The opening question for a request that named nothing to act on.
    fn prompt(&self, mut entities: EntityBag) -> Outcome {
        let missing = match self.target_subject() {
            Some(_) => vec![Field::Target],
            None => requirements::missing(self.category, &entities),
        };
        let mut question = render::capability_prompt(self.category).to_string();
        if let Some(subject) = self.target_subject() {
            let (source, what) = match subject {
                Subject::Meeting => (Source::Calendar, "look up your meetings"),
                _ => (Source::Tasks, "look up your tasks"),
            };
            if let Some(text) = self.unavailable(source, what) {
                return Outcome::Answer { text, query: None };
            }
            let choices = self.choices(subject, None);
            if choices.is_empty() {
                return self.nothing_to_target(subject);
            }
            question.push_str("\n\n");
            question.push_str(&self.render_choices(&choices));
            entities.insert(
                Field::Target,
                Entity::ambiguous(EntityValue::Choices(choices), ""),
            );
        }
        self.ask(question, entities, &missing)
    }

    /// A question for the first relevant value that is unreadable or has two
    /// readings.
    fn unclear(&self, entities: &EntityBag) -> Option<Outcome> {
        for field in relevant_fields(self.category) {
            let Some(entity) = entities.get(*field) else {
                continue;
            };
            let flagged = match entity.confidence {
                Confidence::Malformed => true,
                Confidence::Ambiguous => matches!(field, Field::Time | Field::Date),
                Confidence::Resolved => false,
            };
            if !flagged {
                continue;
            }
            let guess = match entity.confidence {
                Confidence::Ambiguous => entity.value.as_time(),
                _ => None,
            };
            let question = render::clarify(*field, &entity.raw, guess);
            let mut known = entities.clone();
            known.remove(*field);
            // keep the valid addresses that came with a broken one
            if let Some(valid) = entity.value.as_people().filter(|p| !p.is_empty()) {
                known.insert(*field, people_entity(valid.to_vec(), &entity.raw));
            }
            return Some(self.ask(question, known, &[*field]));
        }
        None
    }

    fn act(&self, entities: EntityBag) -> Outcome {
        let missing = requirements::missing(self.category, &entities);
        if !missing.is_empty() {
            if self.target_subject().is_some() {
                return self.prompt(entities);
            }
            let question = render::ask_for(self.category, &missing);
            return self.ask(question, entities, &missing);
        }
        match self.category {
            IntentCategory::CreateMeeting => self.create_meeting(entities),
            IntentCategory::DeleteMeeting => self.delete_meeting(entities),
            IntentCategory::CreateTask => self.create_task(entities),
            IntentCategory::CompleteTask | IntentCategory::DeleteTask => self.task_action(entities),
            IntentCategory::SendEmail => self.send_email(entities),
            _ => Outcome::Answer {
                text: "What would you like me to do?".to_string(),
                query: None,
            },
        }
    }

    /// Ask for addresses of people the address book doesn't know.
    fn resolve_people(&self, field: Field, entities: &mut EntityBag) -> Result<Vec<String>, Outcome> {
        let Some(people) = entities.people(field) else {
            return Ok(Vec::new());
        };
        let mut people = people.to_vec();
        resolve_all(&mut people, &self.agent.contacts);
        let raw = entities.get(field).map(|e| e.raw.clone()).unwrap_or_default();
        entities.insert(field, people_entity(people.clone(), &raw));

        let unknown: Vec<String> = people
            .iter()
            .filter(|p| !p.is_resolved())
            .map(|p| p.display().to_string())
            .collect();
        if !unknown.is_empty() {
            let question = if unknown.len() == 1 {
                format!("I don't have an email address for {}. What is it?", unknown[0])
            } else {
                format!(
                    "I don't have email addresses for {}. What are they?",
                    render::join(&unknown)
                )
            };
            return Err(self.ask(question, entities.clone(), &[field]));
        }

        let mut addresses: Vec<String> = Vec::new();
        for address in people.into_iter().filter_map(|p| p.email) {
            if !addresses.contains(&address) {
                addresses.push(address);
            }
        }
        Ok(addresses)
    }

    fn create_meeting(&self, mut entities: EntityBag) -> Outcome {
        let (Some(title), Some(time)) = (
            entities.text(Field::Title).map(str::to_string),
            entities.time(Field::Time),
        ) else {
            return self.ask(
                render::ask_for(self.category, &[Field::Title, Field::Time]),
                entities,
                &[Field::Title, Field::Time],
            );
        };
        let tz = *self.tz();
        let now_local = self.snapshot.now.with_timezone(&tz);

        // With no date, the next occurrence of the time.
        let date = entities.date(Field::Date).unwrap_or_else(|| {
            if time > now_local.time() {
                self.today
            } else {
                self.today.succ_opt().unwrap_or(self.today)
            }
        });
        let start = availability::resolve_local_datetime(&tz, date, time).with_timezone(&Utc);
        if start <= self.snapshot.now {
            let question = format!(
                "{} has already passed. When should it start instead?",
                capitalize_first(&render::when(start, &tz, self.today))
            );
            entities.remove(Field::Time);
            entities.remove(Field::Date);
            return self.ask(question, entities, &[Field::Time]);
        }

        let length = match entities.minutes(Field::Duration) {
            Some(minutes) if minutes > 0 => Duration::try_minutes(minutes),
            Some(_) => None,
            None => Some(self.agent.meeting_length),
        };
        let Some((length, end)) = length.and_then(|l| start.checked_add_signed(l).map(|e| (l, e))) else {
            let raw = entities.get(Field::Duration).map(|e| e.raw.clone()).unwrap_or_default();
            entities.remove(Field::Duration);
            return self.ask(render::clarify(Field::Duration, &raw, None), entities, &[Field::Duration]);
        };
        let interval = Interval { start, end };

        let attendees = match self.resolve_people(Field::Attendees, &mut entities) {
            Ok(addresses) => addresses,
            Err(question) => return question,
        };
        let location = entities.text(Field::Location).map(str::to_string);

        let calendar_known = self.snapshot.is_available(Source::Calendar);
        let conflicts: Vec<MeetingInterval> = if calendar_known {
            availability::conflicts(&self.snapshot.meetings, &interval)
                .into_iter()
                .cloned()
                .collect()
        } else {
            Vec::new()
        };

        if !conflicts.is_empty() && self.agent.policy == ConflictPolicy::Block {
            let mut question = format!(
                "That overlaps with {}.",
                render::join(&self.conflict_names(&conflicts))
            );
            let free = self.free_on(date, length);
            if !free.is_empty() {
                question.push_str(&format!(
                    " You're free {}: {}.",
                    render::day(date, self.today),
                    render::join(&free)
                ));
            }
            question.push_str(" What time would work instead?");
            entities.remove(Field::Time);
            return self.ask(question, entities, &[Field::Time]);
        }

        let mut message = format!(
            "Scheduled '{}' for {} ({})",
            title,
            render::when(start, &tz, self.today),
            render::minutes(length.num_minutes())
        );
        if !attendees.is_empty() {
            message.push_str(&format!(" with {}", render::join(&attendees)));
        }
        if let Some(location) = &location {
            message.push_str(&format!(" in {location}"));
        }
        message.push('.');
        if !conflicts.is_empty() {
            message.push_str(&format!(
                "\nHeads up: it overlaps with {}.",
                render::join(&self.conflict_names(&conflicts))
            ));
        }
        if !calendar_known {
            message.push_str("\nI couldn't check your calendar for conflicts.");
        }

        entities.insert(Field::Date, Entity::resolved(EntityValue::Date(date), date.to_string()));
        entities.insert(
            Field::Target,
            Entity::resolved(
                EntityValue::Referent(Referent {
                    subject: Subject::Meeting,
                    id: None,
                    title: Some(title.clone()),
                    start: Some(start),
                }),
                title.clone(),
            ),
        );

        Outcome::Act {
            action: ActionRequest::CreateMeeting {
                title,
                start: interval.start,
                end: interval.end,
                attendees,
                location,
            },
            conflicts,
            message,
            resolved: entities,
        }
    }

    fn conflict_names(&self, conflicts: &[MeetingInterval]) -> Vec<String> {
        conflicts
            .iter()
            .map(|m| {
                format!(
                    "'{}' ({})",
                    m.title(),
                    render::span(&m.interval(), self.tz(), self.today)
                )
            })
            .collect()
    }

    /// Up to three free slots on `date` from now on.
    fn free_on(&self, date: NaiveDate, length: Duration) -> Vec<String> {
        let tz = *self.tz();
        let day = availability::local_day_bounds(date, &tz);
        let from = day.start.max(self.snapshot.now);
        availability::free_slots(
            &self.snapshot.meetings,
            from,
            day.end,
            length,
            &self.agent.hours,
            tz,
        )
        .take(3)
        .map(|slot| render::span(&slot, &tz, date))
        .collect()
    }

    fn delete_meeting(&self, entities: EntityBag) -> Outcome {
        if let Some(referent) = entities.referent(Field::Target) {
            if let Some(id) = &referent.id {
                let found = self.snapshot.meetings.iter().find(|m| m.id() == id);
                let description = match found {
                    Some(meeting) => format!(
                        "'{}' ({})",
                        meeting.title(),
                        render::when(meeting.start(), self.tz(), self.today)
                    ),
                    None => format!("'{}'", referent.title.as_deref().unwrap_or("the meeting")),
                };
                return self.cancel(id.clone(), description, entities);
            }
        }
        if let Some(text) = self.unavailable(Source::Calendar, "look up that meeting") {
            return Outcome::Answer { text, query: None };
        }

        let filter = TargetFilter::from_entities(&entities);
        if !filter.identifies() {
            return self.prompt(entities);
        }

        let tz = *self.tz();
        let mut upcoming: Vec<&MeetingInterval> = self
            .snapshot
            .meetings
            .iter()
            .filter(|m| m.end() > self.snapshot.now)
            .filter(|m| filter.allows_id(m.id()))
            .filter(|m| {
                let local = m.start().with_timezone(&tz);
                filter.date.map_or(true, |d| local.date_naive() == d)
                    && filter.time.map_or(true, |t| local.time() == t)
                    && filter.start.map_or(true, |s| m.start() == s)
                    && filter.people.iter().all(|p| attends(p, m.attendees()))
            })
            .collect();
        upcoming.sort_by_key(|m| (m.start(), m.end()));
        let matches = match &filter.name {
            Some(name) => match_titles(upcoming, name, |m| m.title()),
            None => upcoming,
        };

        match matches.as_slice() {
            [meeting] => {
                let description = format!(
                    "'{}' ({})",
                    meeting.title(),
                    render::when(meeting.start(), &tz, self.today)
                );
                self.cancel(meeting.id().to_string(), description, entities)
            }
            [] => self.not_found(Subject::Meeting, filter.describe(&tz, self.today), entities),
            several => {
                let choices: Vec<Referent> = several
                    .iter()
                    .take(MAX_CHOICES)
                    .map(|m| meeting_referent(m))
                    .collect();
                self.ask_choice(choices, "Which one do you mean?".to_string(), entities)
            }
        }
    }

    fn cancel(&self, id: String, description: String, entities: EntityBag) -> Outcome {
        Outcome::Act {
            action: ActionRequest::DeleteMeeting { id },
            conflicts: Vec::new(),
            message: format!("Cancelled {description}."),
            resolved: entities,
        }
    }

    fn create_task(&self, mut entities: EntityBag) -> Outcome {
        let Some(title) = entities.text(Field::Title).map(str::to_string) else {
            return self.ask(
                render::ask_for(self.category, &[Field::Title]),
                entities,
                &[Field::Title],
            );
        };
        let due_date = entities.date(Field::Date);
        let priority = entities.priority(Field::Priority);
        let description = entities.text(Field::Description).map(str::to_string);

        let mut notes = Vec::new();
        if let Some(due) = due_date {
            notes.push(format!("due {}", render::day(due, self.today)));
        }
        if let Some(priority) = priority {
            notes.push(format!("{} priority", priority.label()));
        }
        let message = if notes.is_empty() {
            format!("Added task '{title}'.")
        } else {
            format!("Added task '{}' ({}).", title, notes.join(", "))
        };

        entities.insert(
            Field::Target,
            Entity::resolved(
                EntityValue::Referent(Referent {
                    subject: Subject::Task,
                    id: None,
                    title: Some(title.clone()),
                    start: None,
                }),
                title.clone(),
            ),
        );
        Outcome::Act {
            action: ActionRequest::CreateTask {
                title,
                due_date,
                description,
                priority,
            },
            conflicts: Vec::new(),
            message,
            resolved: entities,
        }
    }

    /// Complete or delete a task.
    fn task_action(&self, entities: EntityBag) -> Outcome {
        let finish = |task_id: String, title: &str, entities: EntityBag| {
            let (action, message) = if self.category == IntentCategory::CompleteTask {
                (
                    ActionRequest::CompleteTask { id: task_id },
                    format!("Marked '{title}' as complete."),
                )
            } else {
                (
                    ActionRequest::DeleteTask { id: task_id },
                    format!("Deleted task '{title}'."),
                )
            };
            Outcome::Act {
                action,
                conflicts: Vec::new(),
                message,
                resolved: entities,
            }
        };

        if let Some(referent) = entities.referent(Field::Target) {
            if let Some(id) = &referent.id {
                let title = self
                    .snapshot
                    .tasks
                    .iter()
                    .find(|t| &t.id == id)
                    .map(|t| t.title.clone())
                    .or_else(|| referent.title.clone())
                    .unwrap_or_else(|| "the task".to_string());
                return finish(id.clone(), &title, entities);
            }
        }
        if let Some(text) = self.unavailable(Source::Tasks, "look up that task") {
            return Outcome::Answer { text, query: None };
        }
        let pending: Vec<&Task> = self.snapshot.pending_tasks().collect();
        if pending.is_empty() {
            return self.nothing_to_target(Subject::Task);
        }

        let filter = TargetFilter::from_entities(&entities);
        let Some(name) = filter.name.clone() else {
            return self.prompt(entities);
        };
        let candidates: Vec<&Task> = pending
            .into_iter()
            .filter(|t| filter.allows_id(&t.id))
            .collect();
        let matches = match_titles(candidates, &name, |t| t.title.as_str());

        match matches.as_slice() {
            [task] => finish(task.id.clone(), &task.title, entities),
            [] => self.not_found(Subject::Task, format!("'{name}'"), entities),
            several => {
                let choices: Vec<Referent> =
                    several.iter().take(MAX_CHOICES).map(|t| task_referent(t)).collect();
                self.ask_choice(choices, "Which one do you mean?".to_string(), entities)
            }
        }
    }

    fn send_email(&self, mut entities: EntityBag) -> Outcome {
        let to = match self.resolve_people(Field::Recipients, &mut entities) {
            Ok(addresses) => addresses,
            Err(question) => return question,
        };
        let Some(body) = entities.text(Field::Body).map(str::to_string) else {
            return self.ask(
                render::ask_for(self.category, &[Field::Body]),
                entities,
                &[Field::Body],
            );
        };
        let subject = entities
            .text(Field::Subject)
            .map(str::to_string)
            .unwrap_or_else(|| capitalize_first(&first_words(&body, SUBJECT_WORDS)));

        let message = format!(
            "Email sent to {}.\nSubject: {}",
            render::join(&to),
            subject
        );
        Outcome::Act {
            action: ActionRequest::SendEmail { to, subject, body },
            conflicts: Vec::new(),
            message,
            resolved: entities,
        }
    }

    // ------------------------------------------------------------------
    // Target choices
    // ------------------------------------------------------------------

    fn target_subject(&self) -> Option<Subject> {
        match self.category {
            IntentCategory::DeleteMeeting => Some(Subject::Meeting),
            IntentCategory::CompleteTask | IntentCategory::DeleteTask => Some(Subject::Task),
            _ => None,
        }
    }

    /// Upcoming meetings or pending tasks to offer, soonest first.
    fn choices(&self, subject: Subject, limit: Option<usize>) -> Vec<Referent> {
        let limit = limit.unwrap_or(MAX_CHOICES);
        match subject {
            Subject::Meeting => {
                let mut upcoming: Vec<&MeetingInterval> = self
                    .snapshot
                    .meetings
                    .iter()
                    .filter(|m| m.end() > self.snapshot.now)
                    .collect();
                upcoming.sort_by_key(|m| (m.start(), m.end()));
                upcoming.into_iter().take(limit).map(meeting_referent).collect()
            }
            Subject::Task => {
                let mut pending: Vec<&Task> = self.snapshot.pending_tasks().collect();
                pending.sort_by_key(|t| (t.priority, t.due.unwrap_or(NaiveDate::MAX)));
                pending.into_iter().take(limit).map(task_referent).collect()
            }
            Subject::Email => Vec::new(),
        }
    }

    fn render_choices(&self, choices: &[Referent]) -> String {
        render::numbered(
            choices
                .iter()
                .map(|c| render::choice_line(c, self.tz(), self.today)),
        )
    }

    fn ask_choice(&self, choices: Vec<Referent>, lead: String, mut entities: EntityBag) -> Outcome {
        let question = format!("{}\n{}", lead, self.render_choices(&choices));
        entities.insert(
            Field::Target,
            Entity::ambiguous(EntityValue::Choices(choices), ""),
        );
        self.ask(question, entities, &[Field::Target])
    }

    fn not_found(&self, subject: Subject, description: String, mut entities: EntityBag) -> Outcome {
        let choices = self.choices(subject, None);
        if choices.is_empty() {
            return self.nothing_to_target(subject);
        }
        for field in [Field::Target, Field::Date, Field::Time, Field::Attendees] {
            entities.remove(field);
        }
        let lead = format!(
            "I couldn't find a {} matching {}. Which one do you mean?",
            subject.as_str(),
            description
        );
        self.ask_choice(choices, lead, entities)
    }

    fn nothing_to_target(&self, subject: Subject) -> Outcome {
        let text = match (subject, self.category) {
            (Subject::Meeting, _) => "You have no upcoming meetings to cancel.",
            (_, IntentCategory::CompleteTask) => "You have no pending tasks to complete.",
            _ => "You have no pending tasks to delete.",
        };
        Outcome::Answer {
            text: text.to_string(),
            query: None,
        }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// The window a query covers, with a phrase naming it.
    fn query_window(&self, entities: &EntityBag, default_days: i64) -> (Interval, String) {
        let tz = *self.tz();
        if let Some(window) = entities.window(Field::Window) {
            let raw = entities
                .get(Field::Window)
                .map(|e| e.raw.to_lowercase())
                .unwrap_or_default();
            let label = if raw.starts_with("next") && raw.ends_with("days") {
                format!("in the {raw}")
            } else {
                raw
            };
            return (window, label);
        }
        if let Some(date) = entities.date(Field::Date) {
            let label = if date == self.today || Some(date) == self.today.succ_opt() {
                render::day(date, self.today)
            } else {
                format!("on {}", render::day(date, self.today))
            };
            return (availability::local_day_bounds(date, &tz), label);
        }
        let start = availability::local_day_bounds(self.today, &tz).start;
        (
            Interval {
                start,
                end: start + Duration::days(default_days),
            },
            format!("in the next {default_days} days"),
        )
    }

    /// A date, range or length in a question that could not be read is
    /// quoted back instead of being replaced by a default.
    fn unreadable(&self, entities: &EntityBag) -> Option<String> {
        relevant_fields(self.category).iter().find_map(|field| {
            let entity = entities.get(*field)?;
            (entity.confidence == Confidence::Malformed)
                .then(|| render::clarify(*field, &entity.raw, None))
        })
    }

    fn list_meetings(&self, entities: &EntityBag) -> Outcome {
        let query = Some(QueryKind::Meetings);
        if let Some(text) = self.unavailable(Source::Calendar, "list your meetings") {
            return Outcome::Answer { text, query };
        }
        if let Some(text) = self.unreadable(entities) {
            return Outcome::Answer { text, query };
        }
        let tz = *self.tz();
        let (window, label) = self.query_window(entities, MEETING_QUERY_DAYS);
        let people: Vec<Attendee> = entities
            .people(Field::Attendees)
            .map(<[Attendee]>::to_vec)
            .unwrap_or_default();

        let mut found: Vec<&MeetingInterval> = self
            .snapshot
            .meetings
            .iter()
            .filter(|m| m.interval().overlaps(&window))
            .filter(|m| people.iter().all(|p| attends(p, m.attendees())))
            .collect();
        found.sort_by_key(|m| (m.start(), m.end()));

        let with = if people.is_empty() {
            String::new()
        } else {
            let names: Vec<String> = people.iter().map(|p| p.display().to_string()).collect();
            format!(" with {}", render::join(&names))
        };
        let text = match found.len() {
            0 => format!("You have no meetings{with} {label}."),
            n => format!(
                "You have {} meeting{}{} {}:\n{}",
                n,
                if n == 1 { "" } else { "s" },
                with,
                label,
                render::bullets(found.iter().map(|m| render::meeting_line(m, &tz, self.today)))
            ),
        };
        Outcome::Answer { text, query }
    }

    fn list_free_slots(&self, entities: &EntityBag) -> Outcome {
        let query = Some(QueryKind::Availability);
        if let Some(text) = self.unavailable(Source::Calendar, "tell when you're free") {
            return Outcome::Answer { text, query };
        }
        if let Some(text) = self.unreadable(entities) {
            return Outcome::Answer { text, query };
        }
        let tz = *self.tz();
        let length = entities
            .minutes(Field::Duration)
            .filter(|m| *m > 0)
            .and_then(Duration::try_minutes)
            .unwrap_or(self.agent.meeting_length);

        let (window, label) = if entities.contains(Field::Window) || entities.contains(Field::Date) {
            self.query_window(entities, self.agent.availability_days)
        } else {
            let days = self.agent.availability_days;
            (
                Interval {
                    start: self.snapshot.now,
                    end: self.snapshot.now + Duration::days(days),
                },
                format!("in the next {days} days"),
            )
        };
        let from = window.start.max(self.snapshot.now);
        if window.end <= from {
            return Outcome::Answer {
                text: "That time has already passed.".to_string(),
                query,
            };
        }

        let slots: Vec<Interval> = availability::free_slots(
            &self.snapshot.meetings,
            from,
            window.end,
            length,
            &self.agent.hours,
            tz,
        )
        .take(self.agent.max_slots)
        .collect();

        let text = if slots.is_empty() {
            format!(
                "You don't have a free {} block {} during working hours ({} - {}).",
                render::minutes(length.num_minutes()),
                label,
                render::clock(self.agent.hours.start()),
                render::clock(self.agent.hours.end())
            )
        } else {
            format!(
                "Here's when you're free for {} {}:\n{}",
                render::minutes(length.num_minutes()),
                label,
                render::bullets(slots.iter().map(|s| render::span(s, &tz, self.today)))
            )
        };
        Outcome::Answer { text, query }
    }

    fn list_tasks(&self, entities: &EntityBag) -> Outcome {
        let query = Some(QueryKind::Tasks);
        if let Some(text) = self.unavailable(Source::Tasks, "list your tasks") {
            return Outcome::Answer { text, query };
        }
        if let Some(text) = self.unreadable(entities) {
            return Outcome::Answer { text, query };
        }
        let tz = *self.tz();
        let window = entities.window(Field::Window).map(|w| {
            (
                w.start.with_timezone(&tz).date_naive(),
                w.end.with_timezone(&tz).date_naive(),
            )
        });
        let by_date = entities.date(Field::Date);
        let priority = entities.priority(Field::Priority);
        let filtered = window.is_some() || by_date.is_some() || priority.is_some();

        let mut tasks: Vec<&Task> = self
            .snapshot
            .pending_tasks()
            .filter(|t| by_date.map_or(true, |d| t.due.is_some_and(|due| due <= d)))
            .filter(|t| {
                window.map_or(true, |(from, to)| {
                    t.due.is_some_and(|due| due >= from && due < to)
                })
            })
            .filter(|t| priority.map_or(true, |p| t.priority == p))
            .collect();
        tasks.sort_by(|a, b| {
            (a.priority, a.due.unwrap_or(NaiveDate::MAX), &a.title)
                .cmp(&(b.priority, b.due.unwrap_or(NaiveDate::MAX), &b.title))
        });

        let text = match tasks.len() {
            0 if filtered => "No pending tasks match that.".to_string(),
            0 => "You have no pending tasks. Great job staying on top of things!".to_string(),
            n => {
                let mut text = format!(
                    "Your pending tasks ({} total):\n{}",
                    n,
                    render::bullets(
                        tasks
                            .iter()
                            .take(MAX_TASKS_SHOWN)
                            .map(|t| render::task_line(t, self.today))
                    )
                );
                if n > MAX_TASKS_SHOWN {
                    text.push_str(&format!("\n...and {} more.", n - MAX_TASKS_SHOWN));
                }
                text
            }
        };
        Outcome::Answer { text, query }
    }

    fn list_emails(&self, urgent_only: bool) -> Outcome {
        let query = Some(QueryKind::Emails);
        if let Some(text) = self.unavailable(Source::Email, "check your email") {
            return Outcome::Answer { text, query };
        }
        let mut unread: Vec<&EmailSummary> =
            self.snapshot.emails.iter().filter(|e| !e.read).collect();
        if unread.is_empty() {
            return Outcome::Answer {
                text: "You have no unread emails! Your inbox is clear.".to_string(),
                query,
            };
        }
        if urgent_only {
            let total = unread.len();
            unread.retain(|e| is_important(e));
            if unread.is_empty() {
                return Outcome::Answer {
                    text: format!(
                        "Nothing urgent. You have {} unread email{}, none marked important.",
                        total,
                        if total == 1 { "" } else { "s" }
                    ),
                    query,
                };
            }
        }
        // important first, then newest first
        unread.sort_by(|a, b| {
            is_important(b)
                .cmp(&is_important(a))
                .then(b.received_at.cmp(&a.received_at))
        });
        let important = unread.iter().filter(|e| is_important(e)).count();

        let mut text = format!(
            "You have {} unread email{}",
            unread.len(),
            if unread.len() == 1 { "" } else { "s" }
        );
        if important > 0 {
            text.push_str(&format!(" ({important} look important)"));
        }
        text.push_str(":\n");
        text.push_str(&render::bullets(
            unread
                .iter()
                .take(MAX_EMAILS_SHOWN)
                .map(|e| render::email_line(e)),
        ));
        if unread.len() > MAX_EMAILS_SHOWN {
            text.push_str(&format!("\n...and {} more.", unread.len() - MAX_EMAILS_SHOWN));
        }
        Outcome::Answer { text, query }
    }

    fn chat(&self, utterance: &str) -> String {
        let text = utterance.trim();
        if re_clock_question().is_match(text) {
            let now = self.snapshot.now.with_timezone(self.tz());
            return format!("It's {}.", render::clock(now.time()));
        }
        if re_date_question().is_match(text) {
            return format!("Today is {}.", self.today.format("%A, %B %-d, %Y"));
        }
        if re_thanks().is_match(text) {
            return "You're welcome! Anything else?".to_string();
        }
        if re_greeting().is_match(text) {
            return "Hello! I can help with your calendar, tasks and email. What would you like to do?"
                .to_string();
        }
        if re_help().is_match(text) {
            return "I can schedule or cancel meetings, find free time, add and complete tasks, \
                    and send or check email. Try 'What's on my calendar tomorrow?' or \
                    'Remind me to file expenses by Friday'."
                .to_string();
        }
        "I'm here to help! Ask me about your calendar, tasks or email.".to_string()
    }
}

/// What a user said to identify an existing record.
#[derive(Debug, Default)]
struct TargetFilter {
    name: Option<String>,
    start: Option<DateTime<Utc>>,
    date: Option<NaiveDate>,
    time: Option<NaiveTime>,
    people: Vec<Attendee>,
    /// Ids offered in an earlier "which one?" question.
    offered: Option<Vec<String>>,
}

impl TargetFilter {
    fn from_entities(entities: &EntityBag) -> Self {
        let mut filter = TargetFilter {
            date: entities.date(Field::Date),
            time: entities.time(Field::Time),
            people: entities
                .people(Field::Attendees)
                .map(<[Attendee]>::to_vec)
                .unwrap_or_default(),
            ..Default::default()
        };
        if let Some(entity) = entities.get(Field::Target) {
            match (&entity.value, entity.confidence) {
                (EntityValue::Text(name), Confidence::Resolved) => {
                    filter.name = Some(name.clone());
                }
                (EntityValue::Referent(referent), Confidence::Resolved) => {
                    filter.name = referent.title.clone();
                    filter.start = referent.start;
                }
                (EntityValue::Choices(choices), _) => {
                    filter.offered = Some(choices.iter().filter_map(|c| c.id.clone()).collect());
                }
                _ => {}
            }
        }
        filter
    }

    /// Whether anything narrows the search beyond an earlier list.
    fn identifies(&self) -> bool {
        self.name.is_some()
            || self.start.is_some()
            || self.date.is_some()
            || self.time.is_some()
            || !self.people.is_empty()
    }

    fn allows_id(&self, id: &str) -> bool {
        self.offered
            .as_ref()
            .map_or(true, |ids| ids.iter().any(|offered| offered == id))
    }

    fn describe(&self, tz: &Tz, today: NaiveDate) -> String {
        let mut parts = Vec::new();
        if let Some(name) = &self.name {
            parts.push(format!("'{name}'"));
        }
        if let Some(date) = self.date {
            parts.push(format!("on {}", render::day(date, today)));
        }
        if let Some(time) = self.time {
            parts.push(format!("at {}", render::clock(time)));
        }
        if let Some(start) = self.start.filter(|_| self.time.is_none()) {
            parts.push(format!("at {}", render::time(start, tz)));
        }
        if !self.people.is_empty() {
            let names: Vec<String> = self.people.iter().map(|p| p.display().to_string()).collect();
            parts.push(format!("with {}", render::join(&names)));
        }
        parts.join(" ")
    }
}

fn people_entity(people: Vec<Attendee>, raw: &str) -> Entity {
    let confidence = if people.iter().all(Attendee::is_resolved) {
        Confidence::Resolved
    } else {
        Confidence::Ambiguous
    };
    Entity::new(EntityValue::People(people), confidence, raw)
}

fn meeting_referent(meeting: &MeetingInterval) -> Referent {
    Referent {
        subject: Subject::Meeting,
        id: Some(meeting.id().to_string()),
        title: Some(meeting.title().to_string()),
        start: Some(meeting.start()),
    }
}

fn task_referent(task: &Task) -> Referent {
    Referent {
        subject: Subject::Task,
        id: Some(task.id.clone()),
        title: Some(task.title.clone()),
        start: None,
    }
}

/// Whether `person` is on a meeting's attendee list (addresses).
fn attends(person: &Attendee, attendees: &[String]) -> bool {
    attendees.iter().any(|address| {
        let address = address.to_lowercase();
        if let Some(email) = &person.email {
            if address == email.to_lowercase() {
                return true;
            }
        }
        person.name.as_ref().is_some_and(|name| {
            let first = name.split_whitespace().next().unwrap_or("").to_lowercase();
            let local = address.split('@').next().unwrap_or("");
            !first.is_empty() && local.split(['.', '_', '-']).any(|part| part == first)
        })
    })
}

/// Records whose title matches `wanted`: exact, then containing, then close.
fn match_titles<'t, T: ?Sized>(
    items: Vec<&'t T>,
    wanted: &str,
    title: impl Fn(&T) -> &str,
) -> Vec<&'t T> {
    let key = normalize_key(strip_article(wanted));
    if key.is_empty() {
        return items;
    }
    let exact: Vec<&T> = items
        .iter()
        .copied()
        .filter(|item| normalize_key(title(*item)) == key)
        .collect();
    if !exact.is_empty() {
        return exact;
    }
    let containing: Vec<&T> = items
        .iter()
        .copied()
        .filter(|item| {
            let candidate = normalize_key(title(*item));
            !candidate.is_empty() && (candidate.contains(&key) || key.contains(&candidate))
        })
        .collect();
    if !containing.is_empty() {
        return containing;
    }
    let wanted = wanted.to_lowercase();
    items
        .into_iter()
        .filter(|item| {
            strsim::jaro_winkler(&title(*item).to_lowercase(), &wanted) >= TITLE_MATCH_THRESHOLD
        })
        .collect()
}

pub(crate) fn is_important(email: &EmailSummary) -> bool {
    if email.priority == EmailPriority::High {
        return true;
    }
    let subject = email.subject.to_lowercase();
    URGENT_WORDS.iter().any(|word| subject.contains(word))
}

#[cfg(test)]
mod tests;
