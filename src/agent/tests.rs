use chrono::{NaiveTime, TimeZone};

use super::*;
use crate::types::{EmailPriority, Priority};

fn at(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 2, day, hour, minute, 0).unwrap()
}

/// Thursday 12 February 2026, 10:00 in London (UTC+0).
fn now() -> DateTime<Utc> {
    at(12, 10, 0)
}

fn config() -> Config {
    let mut config = Config::default();
    config
        .contacts
        .insert("Alice Smith".to_string(), "alice@example.com".to_string());
    config
        .contacts
        .insert("Bob Jones".to_string(), "bob@example.com".to_string());
    config
}

fn agent() -> SchedulingAgent {
    SchedulingAgent::new(&config()).unwrap()
}

fn meeting(id: &str, title: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> MeetingInterval {
    MeetingInterval::new(id, title, start, end).unwrap()
}

fn task(id: &str, title: &str, priority: Priority, due: Option<u32>) -> Task {
    Task {
        id: id.to_string(),
        title: title.to_string(),
        due: due.and_then(|d| NaiveDate::from_ymd_opt(2026, 2, d)),
        completed: false,
        priority,
        description: String::new(),
    }
}

fn email(id: &str, sender: &str, subject: &str, priority: EmailPriority, read: bool) -> EmailSummary {
    EmailSummary {
        id: id.to_string(),
        sender: sender.to_string(),
        subject: subject.to_string(),
        priority,
        read,
        received_at: at(12, 8, 0),
    }
}

fn snapshot() -> Snapshot {
    let mut done = task("t3", "Book travel", Priority::P2, None);
    done.completed = true;
    Snapshot::new(now())
        .with_meetings(vec![
            meeting("m1", "Standup", at(12, 11, 0), at(12, 11, 30)),
            meeting("m2", "Budget review", at(13, 14, 0), at(13, 15, 0)),
            meeting("m3", "Design sync", at(13, 16, 0), at(13, 17, 0))
                .with_attendees(vec!["alice@example.com".to_string()]),
            meeting("m4", "Standup", at(13, 11, 0), at(13, 11, 30)),
            meeting("m0", "Breakfast", at(12, 8, 0), at(12, 9, 0)),
        ])
        .with_tasks(vec![
            task("t2", "Review deck", Priority::P2, None),
            task("t1", "File expenses", Priority::P1, Some(13)),
            done,
        ])
        .with_emails(vec![
            email("e1", "Dana", "Contract deadline", EmailPriority::High, false),
            email("e2", "Lee", "Lunch?", EmailPriority::Normal, false),
            email("e3", "Sam", "Old news", EmailPriority::Normal, true),
        ])
}

fn intent(category: IntentCategory) -> Intent {
    Intent {
        category,
        continues: false,
        under_specified: false,
    }
}

fn text(value: &str) -> Entity {
    Entity::resolved(EntityValue::Text(value.to_string()), value)
}

fn time(hour: u32, minute: u32) -> Entity {
    Entity::resolved(
        EntityValue::Time(NaiveTime::from_hms_opt(hour, minute, 0).unwrap()),
        format!("{hour}:{minute:02}"),
    )
}

fn date(day: u32) -> Entity {
    Entity::resolved(
        EntityValue::Date(NaiveDate::from_ymd_opt(2026, 2, day).unwrap()),
        format!("{day} February"),
    )
}

fn people(names: &[&str]) -> Entity {
    Entity::new(
        EntityValue::People(names.iter().map(|n| Attendee::unresolved(*n)).collect()),
        Confidence::Ambiguous,
        names.join(", "),
    )
}

fn bag(fields: Vec<(Field, Entity)>) -> EntityBag {
    let mut bag = EntityBag::new();
    for (field, entity) in fields {
        bag.insert(field, entity);
    }
    bag
}

fn run(category: IntentCategory, entities: EntityBag) -> Outcome {
    agent().handle("", &intent(category), entities, None, &snapshot())
}

fn expect_act(outcome: Outcome) -> (ActionRequest, Vec<MeetingInterval>, String, EntityBag) {
    match outcome {
        Outcome::Act {
            action,
            conflicts,
            message,
            resolved,
        } => (action, conflicts, message, resolved),
        other => panic!("expected an action, got {other:?}"),
    }
}

fn expect_ask(outcome: Outcome) -> (String, PendingClarification) {
    match outcome {
        Outcome::Ask { question, pending } => (question, pending),
        other => panic!("expected a question, got {other:?}"),
    }
}

fn expect_answer(outcome: Outcome) -> (String, Option<QueryKind>) {
    match outcome {
        Outcome::Answer { text, query } => (text, query),
        other => panic!("expected an answer, got {other:?}"),
    }
}

// ----------------------------------------------------------------------
// Creating meetings
// ----------------------------------------------------------------------

#[test]
fn complete_meeting_request_acts() {
    let entities = bag(vec![
        (Field::Title, text("Budget review")),
        (Field::Date, date(16)),
        (Field::Time, time(15, 0)),
        (
            Field::Duration,
            Entity::resolved(EntityValue::Minutes(30), "for 30 minutes"),
        ),
        (Field::Attendees, people(&["Alice"])),
        (Field::Location, text("Room 4")),
    ]);
    let (action, conflicts, message, resolved) =
        expect_act(run(IntentCategory::CreateMeeting, entities));

    assert_eq!(
        action,
        ActionRequest::CreateMeeting {
            title: "Budget review".to_string(),
            start: at(16, 15, 0),
            end: at(16, 15, 30),
            attendees: vec!["alice@example.com".to_string()],
            location: Some("Room 4".to_string()),
        }
    );
    assert!(conflicts.is_empty());
    assert_eq!(
        message,
        "Scheduled 'Budget review' for Monday, February 16 at 3:00 PM (30 minutes) \
         with alice@example.com in Room 4."
    );
    let referent = resolved.referent(Field::Target).unwrap();
    assert_eq!(referent.subject, Subject::Meeting);
    assert_eq!(referent.start, Some(at(16, 15, 0)));
    assert!(referent.id.is_none());
}

#[test]
fn default_length_applies() {
    let entities = bag(vec![
        (Field::Title, text("Retro")),
        (Field::Date, date(16)),
        (Field::Time, time(10, 0)),
    ]);
    let (action, ..) = expect_act(run(IntentCategory::CreateMeeting, entities));
    let ActionRequest::CreateMeeting { start, end, .. } = action else {
        panic!("wrong action");
    };
    assert_eq!(end - start, Duration::minutes(60));
}

#[test]
fn time_without_date_means_its_next_occurrence() {
    // 15:00 is still ahead today
    let later = bag(vec![(Field::Title, text("Retro")), (Field::Time, time(15, 0))]);
    let (action, ..) = expect_act(run(IntentCategory::CreateMeeting, later));
    assert!(matches!(action, ActionRequest::CreateMeeting { start, .. } if start == at(12, 15, 0)));

    // 09:00 has passed, so tomorrow
    let earlier = bag(vec![(Field::Title, text("Retro")), (Field::Time, time(9, 0))]);
    let (action, ..) = expect_act(run(IntentCategory::CreateMeeting, earlier));
    assert!(matches!(action, ActionRequest::CreateMeeting { start, .. } if start == at(13, 9, 0)));
}

#[test]
fn past_start_asks_again() {
    let entities = bag(vec![
        (Field::Title, text("Retro")),
        (Field::Date, date(11)),
        (Field::Time, time(15, 0)),
    ]);
    let (question, pending) = expect_ask(run(IntentCategory::CreateMeeting, entities));
    assert!(question.contains("already passed"), "{question}");
    assert_eq!(pending.missing, BTreeSet::from([Field::Time]));
    assert_eq!(pending.known.text(Field::Title), Some("Retro"));
    assert!(!pending.known.contains(Field::Date));
}

#[test]
fn overlap_warns_by_default() {
    let entities = bag(vec![
        (Field::Title, text("1:1")),
        (Field::Date, date(13)),
        (Field::Time, time(14, 30)),
    ]);
    let (_, conflicts, message, _) = expect_act(run(IntentCategory::CreateMeeting, entities));
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].id(), "m2");
    assert!(message.contains("overlaps with 'Budget review'"), "{message}");
}

#[test]
fn back_to_back_is_not_a_conflict() {
    let entities = bag(vec![
        (Field::Title, text("1:1")),
        (Field::Date, date(13)),
        (Field::Time, time(15, 0)),
        (Field::Duration, Entity::resolved(EntityValue::Minutes(60), "1h")),
    ]);
    let (_, conflicts, ..) = expect_act(run(IntentCategory::CreateMeeting, entities));
    assert!(conflicts.is_empty());
}

#[test]
fn overlap_blocks_when_configured() {
    let mut config = config();
    config.conflict_policy = ConflictPolicy::Block;
    let agent = SchedulingAgent::new(&config).unwrap();
    let entities = bag(vec![
        (Field::Title, text("1:1")),
        (Field::Date, date(13)),
        (Field::Time, time(14, 30)),
    ]);
    let outcome = agent.handle(
        "",
        &intent(IntentCategory::CreateMeeting),
        entities,
        None,
        &snapshot(),
    );
    let (question, pending) = expect_ask(outcome);
    assert!(question.contains("9:00 AM - 11:00 AM"), "{question}");
    assert!(question.ends_with("What time would work instead?"));
    assert_eq!(pending.missing, BTreeSet::from([Field::Time]));
    assert!(pending.known.contains(Field::Date));
}

#[test]
fn unknown_attendee_asks_for_an_address() {
    let entities = bag(vec![
        (Field::Title, text("Retro")),
        (Field::Date, date(16)),
        (Field::Time, time(10, 0)),
        (Field::Attendees, people(&["Alice", "Zed"])),
    ]);
    let (question, pending) = expect_ask(run(IntentCategory::CreateMeeting, entities));
    assert_eq!(question, "I don't have an email address for Zed. What is it?");
    assert_eq!(pending.missing, BTreeSet::from([Field::Attendees]));
    let known = pending.known.people(Field::Attendees).unwrap();
    assert_eq!(known[0].email.as_deref(), Some("alice@example.com"));
    assert!(known[1].email.is_none());
    assert!(pending.known.time(Field::Time).is_some());
}

#[test]
fn ambiguous_hour_is_questioned() {
    let entities = bag(vec![
        (Field::Title, text("Dinner")),
        (
            Field::Time,
            Entity::ambiguous(
                EntityValue::Time(NaiveTime::from_hms_opt(19, 0, 0).unwrap()),
                "at 7",
            ),
        ),
    ]);
    let (question, pending) = expect_ask(run(IntentCategory::CreateMeeting, entities));
    assert_eq!(question, "Did you mean 7 AM or 7 PM?");
    assert!(!pending.known.contains(Field::Time));
    assert_eq!(pending.known.text(Field::Title), Some("Dinner"));
}

#[test]
fn malformed_date_is_quoted_back() {
    let entities = bag(vec![
        (Field::Title, text("Retro")),
        (Field::Date, Entity::malformed("31 February")),
        (Field::Time, time(10, 0)),
    ]);
    let (question, pending) = expect_ask(run(IntentCategory::CreateMeeting, entities));
    assert!(question.contains("'31 February'"), "{question}");
    assert_eq!(pending.missing, BTreeSet::from([Field::Date]));
}

#[test]
fn under_specified_meeting_gets_the_capability_prompt() {
    let outcome = agent().handle(
        "schedule a meeting",
        &Intent {
            category: IntentCategory::CreateMeeting,
            continues: false,
            under_specified: true,
        },
        EntityBag::new(),
        None,
        &snapshot(),
    );
    let (question, pending) = expect_ask(outcome);
    assert!(question.starts_with("I'd be happy to set up a meeting!"));
    assert_eq!(pending.missing, BTreeSet::from([Field::Title, Field::Time]));
    assert_eq!(pending.created_at, now());
}

#[test]
fn missing_time_only() {
    let entities = bag(vec![(Field::Title, text("Retro")), (Field::Date, date(16))]);
    let (question, pending) = expect_ask(run(IntentCategory::CreateMeeting, entities));
    assert_eq!(question, "When should it start?");
    assert_eq!(pending.missing, BTreeSet::from([Field::Time]));
    assert!(pending.known.date(Field::Date).is_some());
}

#[test]
fn continued_question_keeps_its_creation_time() {
    let earlier = PendingClarification {
        category: IntentCategory::CreateMeeting,
        known: EntityBag::new(),
        missing: BTreeSet::from([Field::Title, Field::Time]),
        created_at: at(12, 9, 55),
    };
    let outcome = agent().handle(
        "retro",
        &Intent {
            category: IntentCategory::CreateMeeting,
            continues: true,
            under_specified: false,
        },
        bag(vec![(Field::Title, text("Retro"))]),
        Some(&earlier),
        &snapshot(),
    );
    let (_, pending) = expect_ask(outcome);
    assert_eq!(pending.created_at, at(12, 9, 55));
}

// ----------------------------------------------------------------------
// Cancelling meetings
// ----------------------------------------------------------------------

#[test]
fn cancel_by_title() {
    let entities = bag(vec![(Field::Target, text("budget review"))]);
    let (action, _, message, _) = expect_act(run(IntentCategory::DeleteMeeting, entities));
    assert_eq!(
        action,
        ActionRequest::DeleteMeeting {
            id: "m2".to_string()
        }
    );
    assert_eq!(message, "Cancelled 'Budget review' (tomorrow at 2:00 PM).");
}

#[test]
fn cancel_by_date_and_time() {
    let entities = bag(vec![(Field::Date, date(13)), (Field::Time, time(16, 0))]);
    let (action, ..) = expect_act(run(IntentCategory::DeleteMeeting, entities));
    assert_eq!(
        action,
        ActionRequest::DeleteMeeting {
            id: "m3".to_string()
        }
    );
}

#[test]
fn cancel_by_fuzzy_title() {
    let entities = bag(vec![(Field::Target, text("desgin sync"))]);
    let (action, ..) = expect_act(run(IntentCategory::DeleteMeeting, entities));
    assert_eq!(
        action,
        ActionRequest::DeleteMeeting {
            id: "m3".to_string()
        }
    );
}

#[test]
fn past_meetings_are_not_candidates() {
    let entities = bag(vec![(Field::Target, text("breakfast"))]);
    let (question, _) = expect_ask(run(IntentCategory::DeleteMeeting, entities));
    assert!(question.starts_with("I couldn't find a meeting matching 'breakfast'"));
}

#[test]
fn several_matches_are_offered_as_choices() {
    let entities = bag(vec![(Field::Target, text("standup"))]);
    let (question, pending) = expect_ask(run(IntentCategory::DeleteMeeting, entities));
    assert_eq!(
        question,
        "Which one do you mean?\n1. Standup (today at 11:00 AM)\n2. Standup (tomorrow at 11:00 AM)"
    );
    assert_eq!(pending.missing, BTreeSet::from([Field::Target]));
    let choices = pending
        .known
        .get(Field::Target)
        .and_then(|e| e.value.as_choices())
        .unwrap();
    let ids: Vec<&str> = choices.iter().filter_map(|c| c.id.as_deref()).collect();
    assert_eq!(ids, vec!["m1", "m4"]);
}

#[test]
fn time_narrows_offered_choices() {
    let choices = vec![
        meeting_referent(&meeting("m1", "Standup", at(12, 11, 0), at(12, 11, 30))),
        meeting_referent(&meeting("m4", "Standup", at(13, 11, 0), at(13, 11, 30))),
    ];
    let entities = bag(vec![
        (
            Field::Target,
            Entity::ambiguous(EntityValue::Choices(choices), ""),
        ),
        (Field::Date, date(13)),
    ]);
    let (action, ..) = expect_act(run(IntentCategory::DeleteMeeting, entities));
    assert_eq!(
        action,
        ActionRequest::DeleteMeeting {
            id: "m4".to_string()
        }
    );
}

#[test]
fn referent_with_id_is_used_directly() {
    let referent = Referent {
        subject: Subject::Meeting,
        id: Some("evt-42".to_string()),
        title: Some("Retro".to_string()),
        start: Some(at(16, 10, 0)),
    };
    let entities = bag(vec![(
        Field::Target,
        Entity::resolved(EntityValue::Referent(referent), "it"),
    )]);
    let (action, _, message, _) = expect_act(run(IntentCategory::DeleteMeeting, entities));
    assert_eq!(
        action,
        ActionRequest::DeleteMeeting {
            id: "evt-42".to_string()
        }
    );
    assert_eq!(message, "Cancelled 'Retro'.");
}

#[test]
fn unresolved_pronoun_lists_upcoming_meetings() {
    let entities = bag(vec![(
        Field::Target,
        Entity::ambiguous(EntityValue::Text("it".to_string()), "it"),
    )]);
    let (question, pending) = expect_ask(run(IntentCategory::DeleteMeeting, entities));
    assert!(question.starts_with("Which meeting should I cancel?"));
    assert!(question.contains("1. Standup (today at 11:00 AM)"));
    assert_eq!(pending.missing, BTreeSet::from([Field::Target]));
}

#[test]
fn cancel_with_calendar_down_says_so() {
    let mut snapshot = snapshot();
    snapshot.unavailable.push(Source::Calendar);
    let outcome = agent().handle(
        "",
        &intent(IntentCategory::DeleteMeeting),
        bag(vec![(Field::Target, text("budget review"))]),
        None,
        &snapshot,
    );
    let (text, _) = expect_answer(outcome);
    assert!(text.starts_with("I couldn't reach your calendar"));
}

// ----------------------------------------------------------------------
// Tasks and email
// ----------------------------------------------------------------------

#[test]
fn create_task_with_due_date_and_priority() {
    let entities = bag(vec![
        (Field::Title, text("Prepare slides")),
        (Field::Date, date(13)),
        (
            Field::Priority,
            Entity::resolved(EntityValue::Priority(Priority::P1), "high priority"),
        ),
    ]);
    let (action, _, message, resolved) = expect_act(run(IntentCategory::CreateTask, entities));
    assert_eq!(
        action,
        ActionRequest::CreateTask {
            title: "Prepare slides".to_string(),
            due_date: NaiveDate::from_ymd_opt(2026, 2, 13),
            description: None,
            priority: Some(Priority::P1),
        }
    );
    assert_eq!(message, "Added task 'Prepare slides' (due tomorrow, high priority).");
    assert_eq!(
        resolved.referent(Field::Target).map(|r| r.subject),
        Some(Subject::Task)
    );
}

#[test]
fn complete_task_by_partial_title() {
    let entities = bag(vec![(Field::Target, text("expenses"))]);
    let (action, _, message, _) = expect_act(run(IntentCategory::CompleteTask, entities));
    assert_eq!(
        action,
        ActionRequest::CompleteTask {
            id: "t1".to_string()
        }
    );
    assert_eq!(message, "Marked 'File expenses' as complete.");
}

#[test]
fn completed_tasks_cannot_be_targeted() {
    let entities = bag(vec![(Field::Target, text("book travel"))]);
    let (question, pending) = expect_ask(run(IntentCategory::DeleteTask, entities));
    assert!(question.starts_with("I couldn't find a task matching 'book travel'"));
    // highest priority first
    assert!(question.contains("1. File expenses"));
    assert_eq!(pending.category, IntentCategory::DeleteTask);
}

#[test]
fn nothing_to_complete() {
    let snapshot = Snapshot::new(now());
    let outcome = agent().handle(
        "",
        &intent(IntentCategory::CompleteTask),
        bag(vec![(Field::Target, text("expenses"))]),
        None,
        &snapshot,
    );
    let (text, _) = expect_answer(outcome);
    assert_eq!(text, "You have no pending tasks to complete.");
}

#[test]
fn email_subject_defaults_to_opening_words() {
    let recipients = Entity::resolved(
        EntityValue::People(vec![Attendee::email("bob@example.com")]),
        "bob@example.com",
    );
    let entities = bag(vec![
        (Field::Recipients, recipients),
        (Field::Body, text("can we move the review to Monday afternoon")),
    ]);
    let (action, _, message, _) = expect_act(run(IntentCategory::SendEmail, entities));
    assert_eq!(
        action,
        ActionRequest::SendEmail {
            to: vec!["bob@example.com".to_string()],
            subject: "Can we move the review to...".to_string(),
            body: "can we move the review to Monday afternoon".to_string(),
        }
    );
    assert!(message.starts_with("Email sent to bob@example.com."));
}

#[test]
fn email_recipient_by_contact_name() {
    let entities = bag(vec![
        (Field::Recipients, people(&["Bob"])),
        (Field::Subject, text("Slides")),
        (Field::Body, text("attached")),
    ]);
    let (action, ..) = expect_act(run(IntentCategory::SendEmail, entities));
    assert!(matches!(action, ActionRequest::SendEmail { ref to, .. } if to == &["bob@example.com"]));
}

#[test]
fn email_to_a_stranger_asks_for_the_address() {
    let entities = bag(vec![
        (Field::Recipients, people(&["Dana"])),
        (Field::Body, text("hello")),
    ]);
    let (question, pending) = expect_ask(run(IntentCategory::SendEmail, entities));
    assert_eq!(question, "I don't have an email address for Dana. What is it?");
    assert_eq!(pending.missing, BTreeSet::from([Field::Recipients]));
    assert_eq!(pending.known.text(Field::Body), Some("hello"));
}

#[test]
fn email_without_body_asks_for_it() {
    let recipients = Entity::resolved(
        EntityValue::People(vec![Attendee::email("bob@example.com")]),
        "bob@example.com",
    );
    let (question, _) = expect_ask(run(
        IntentCategory::SendEmail,
        bag(vec![(Field::Recipients, recipients)]),
    ));
    assert_eq!(question, "What should the email say?");
}

// ----------------------------------------------------------------------
// Queries and chat
// ----------------------------------------------------------------------

#[test]
fn free_slots_for_a_day() {
    let entities = bag(vec![(Field::Date, date(13))]);
    let (text, query) = expect_answer(run(IntentCategory::QueryAvailability, entities));
    assert_eq!(query, Some(QueryKind::Availability));
    assert_eq!(
        text,
        "Here's when you're free for 1 hour tomorrow:\n\
         • tomorrow, 9:00 AM - 11:00 AM\n\
         • tomorrow, 11:30 AM - 2:00 PM\n\
         • tomorrow, 3:00 PM - 4:00 PM"
    );
}

#[test]
fn free_slots_start_from_now() {
    let (text, _) = expect_answer(run(IntentCategory::QueryAvailability, EntityBag::new()));
    let first = text.lines().nth(1).unwrap();
    assert_eq!(first, "• 10:00 AM - 11:00 AM");
    assert!(text.starts_with("Here's when you're free for 1 hour in the next 7 days:"));
    assert_eq!(text.lines().count(), 1 + 8);
}

#[test]
fn no_room_for_a_long_block() {
    let entities = bag(vec![
        (Field::Date, date(13)),
        (Field::Duration, Entity::resolved(EntityValue::Minutes(180), "3 hours")),
    ]);
    let (text, _) = expect_answer(run(IntentCategory::QueryAvailability, entities));
    assert_eq!(
        text,
        "You don't have a free 3 hours block tomorrow during working hours (9:00 AM - 5:00 PM)."
    );
}

#[test]
fn meetings_for_tomorrow() {
    let (text, query) = expect_answer(run(
        IntentCategory::QueryMeetings,
        bag(vec![(Field::Date, date(13))]),
    ));
    assert_eq!(query, Some(QueryKind::Meetings));
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "You have 3 meetings tomorrow:");
    assert_eq!(lines[1], "• tomorrow, 11:00 AM - 11:30 AM: Standup (30 minutes)");
    assert_eq!(lines[2], "• tomorrow, 2:00 PM - 3:00 PM: Budget review (1 hour)");
    assert_eq!(
        lines[3],
        "• tomorrow, 4:00 PM - 5:00 PM: Design sync (1 hour) with alice@example.com"
    );
}

#[test]
fn meetings_with_a_person() {
    let entities = bag(vec![(Field::Attendees, people(&["Alice"]))]);
    let (text, _) = expect_answer(run(IntentCategory::QueryMeetings, entities));
    assert!(text.starts_with("You have 1 meeting with Alice in the next 7 days:"), "{text}");
    assert!(text.contains("Design sync"));
}

#[test]
fn pending_tasks_by_priority() {
    let (text, query) = expect_answer(run(IntentCategory::QueryTasks, EntityBag::new()));
    assert_eq!(query, Some(QueryKind::Tasks));
    assert_eq!(
        text,
        "Your pending tasks (2 total):\n\
         • File expenses (high priority, due tomorrow)\n\
         • Review deck"
    );
}

#[test]
fn unread_email_summary() {
    let (text, _) = expect_answer(run(IntentCategory::QueryEmails, EntityBag::new()));
    assert_eq!(
        text,
        "You have 2 unread emails (1 look important):\n\
         • Dana: Contract deadline [important]\n\
         • Lee: Lunch?"
    );
}

#[test]
fn urgent_email_request_filters() {
    let outcome = agent().handle(
        "any urgent emails?",
        &intent(IntentCategory::QueryEmails),
        EntityBag::new(),
        None,
        &snapshot(),
    );
    let (text, _) = expect_answer(outcome);
    assert_eq!(
        text,
        "You have 1 unread email (1 look important):\n\
         • Dana: Contract deadline [important]"
    );

    let calm = snapshot().with_emails(vec![email("e2", "Lee", "Lunch?", EmailPriority::Normal, false)]);
    let outcome = agent().handle(
        "anything urgent in my inbox",
        &intent(IntentCategory::QueryEmails),
        EntityBag::new(),
        None,
        &calm,
    );
    let (text, _) = expect_answer(outcome);
    assert_eq!(text, "Nothing urgent. You have 1 unread email, none marked important.");
}

#[test]
fn unavailable_source_is_reported_not_hidden() {
    let mut snapshot = snapshot();
    snapshot.unavailable.push(Source::Tasks);
    snapshot.tasks.clear();
    let outcome = agent().handle(
        "",
        &intent(IntentCategory::QueryTasks),
        EntityBag::new(),
        None,
        &snapshot,
    );
    let (text, _) = expect_answer(outcome);
    assert!(text.starts_with("I couldn't reach your task list right now"));
}

#[test]
fn chat_replies() {
    let chat = |utterance: &str| {
        let outcome = agent().handle(
            utterance,
            &intent(IntentCategory::GeneralChat),
            EntityBag::new(),
            None,
            &snapshot(),
        );
        expect_answer(outcome).0
    };
    assert!(chat("hello there").starts_with("Hello!"));
    assert_eq!(chat("what time is it?"), "It's 10:00 AM.");
    assert_eq!(chat("what's the date"), "Today is Thursday, February 12, 2026.");
    assert_eq!(chat("thanks!"), "You're welcome! Anything else?");
}
