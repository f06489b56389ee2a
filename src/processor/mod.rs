//! Utterance processing: entity extraction, intent classification and routing.
//!
//! `extract` turns one utterance into an `EntityBag`. It never fails: anything
//! it cannot make sense of is either flagged (ambiguous or malformed) or left
//! in the bag's residual text for the router to consider.

pub mod attendees;
pub mod classifier;
pub(crate) mod dates;
pub mod entities;
pub mod metadata;
pub mod router;

use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use regex::Regex;

use crate::availability::BusinessHours;
use crate::context::{ConversationTurn, Role};
use crate::helpers::{capitalize_first, normalize_utterance};
use crate::types::Subject;

pub use attendees::Attendee;
pub use classifier::IntentCategory;
pub use entities::{Confidence, Entity, EntityBag, EntityValue, Field, Referent};

/// What the extractor needs to know about the world.
#[derive(Debug, Clone, Copy)]
pub struct ExtractContext<'a> {
    pub now: DateTime<Utc>,
    pub tz: Tz,
    pub business_hours: BusinessHours,
    pub contacts: &'a BTreeMap<String, String>,
}

fn re_location() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:in|at)\s+((?:the\s+)?(?:(?:main|large|small|big)\s+)?(?:conference\s+room|meeting\s+room|board\s*room|room|office|cafe|café|lobby|kitchen|library)(?:\s+[A-Z0-9][\w-]*)?)").unwrap()
    })
}

fn re_location_virtual() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:on|via|over)\s+(zoom|google\s+meet|microsoft\s+teams|teams|skype|the\s+phone|phone|slack)\b").unwrap()
    })
}

fn re_location_label() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\blocation\s*:\s*([^,.;]+)").unwrap())
}

fn re_referent() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:(?:that|this|the\s+last)\s+(meeting|event|call|appointment|task|to-?do|reminder|e-?mail|message)|(that\s+one|this\s+one|it))\b").unwrap()
    })
}

fn re_quoted() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""([^"]+)""#).unwrap())
}

fn re_named() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(?:called|titled|named)\s+").unwrap())
}

fn re_meeting_trigger() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:schedule|book|arrange|organi[sz]e|set\s+up|setup|create|add|put|make)\b(?:\s+(?:me|us))?\s*").unwrap()
    })
}

fn re_topic() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:about|regarding|re|to\s+discuss|to\s+talk\s+about|to\s+go\s+over)\s+").unwrap()
    })
}

fn re_task_label() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(?:task|to-?do)\s*:\s*").unwrap())
}

fn re_task_trigger() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:remind\s+me\s+to|i\s+need\s+to\s+remember\s+to|(?:create|add|make|new|set)\s+(?:a\s+|an\s+)?(?:new\s+)?(?:task|to-?do|reminder)(?:\s+(?:to|for|called|named|that\s+says))?)\s*").unwrap()
    })
}

fn re_task_list() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\badd\s+(.+?)\s+to\s+my\s+(?:task|to-?do)\s+list\b").unwrap())
}

fn re_description() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(?:description|notes?|details?)\s*:\s*(.+)$").unwrap())
}

fn re_email_subject() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(?:subject|titled|re)\s*:?\s+").unwrap())
}

fn re_email_body() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:saying|that\s+says|to\s+say|telling\s+(?:him|her|them)|asking\s+(?:him|her|them)|body\s*:|message\s*:)\s*").unwrap()
    })
}

fn re_target_verb() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:cancel|delete|remove|drop|call\s+off|scrap|clear|mark|complete|completed|finish|finished|done\s+with|tick\s+off|check\s+off|cross\s+off)\b\s*").unwrap()
    })
}

fn re_target_tail() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\s+(?:as\s+)?(?:done|complete|completed|finished|off)$").unwrap()
    })
}

/// Words skipped at the start of a free-text clause.
const LEADING_FILLERS: &[&str] = &[
    "a", "an", "the", "new", "my", "our", "some", "quick", "please",
];

/// Words that mean "a meeting" without naming one.
const GENERIC_MEETING_WORDS: &[&str] = &[
    "meeting", "meetings", "call", "event", "appointment", "session", "slot", "time", "meet",
];

const MEETING_TITLE_STOPS: &[&str] = &[
    "with", "about", "regarding", "re", "on", "at", "in", "for", "from", "by", "tomorrow",
    "today", "tonight", "next", "this", "between", "called", "titled", "named", "to",
    "please", "and", "inviting", "including",
];

const TASK_TITLE_STOPS: &[&str] = &[
    "by", "due", "before", "on", "at", "tomorrow", "today", "tonight", "next", "this",
    "please",
];

const SUBJECT_STOPS: &[&str] = &[
    "saying", "that", "telling", "asking", "with", "body", "message", "and", "to",
];

const TARGET_STOPS: &[&str] = &[
    "on", "at", "from", "with", "for", "tomorrow", "today", "tonight", "next", "this",
    "please",
];

const TARGET_FILLERS: &[&str] = &[
    "my", "the", "our", "meeting", "event", "call", "appointment", "task", "to-do", "todo",
    "reminder",
];

/// Conversational padding around a bare answer.
const RESIDUAL_PREFIXES: &[&str] = &[
    "it's called",
    "it is called",
    "call it",
    "the title is",
    "title is",
    "title",
    "the subject is",
    "subject is",
    "subject",
    "make it",
    "let's say",
    "how about",
    "okay",
    "ok",
    "yes",
    "yeah",
    "sure",
    "please",
    "and",
    "with",
    "it's",
    "it is",
];

const RESIDUAL_SUFFIXES: &[&str] = &["please", "thanks", "thank you", "then"];

struct Claims {
    ranges: Vec<Range<usize>>,
}

impl Claims {
    fn is_free(&self, range: &Range<usize>) -> bool {
        !self
            .ranges
            .iter()
            .any(|r| r.start < range.end && range.start < r.end)
    }

    fn claim(&mut self, range: Range<usize>) {
        if !range.is_empty() {
            self.ranges.push(range);
        }
    }
}

/// Extract typed entities from `text`.
///
/// `recent` is the conversation window, consulted to resolve "it" and
/// "that meeting".
pub fn extract(text: &str, recent: &[ConversationTurn], ctx: &ExtractContext<'_>) -> EntityBag {
    let text = normalize_utterance(text);
    let lower = text.to_lowercase();
    let mut bag = EntityBag::new();
    let mut claims = Claims { ranges: Vec::new() };

    if text.is_empty() {
        return bag;
    }

    for found in dates::scan(&text, ctx.now, &ctx.tz, &ctx.business_hours) {
        bag.offer(found.field, found.entity);
        claims.claim(found.range);
    }

    if let Some((range, priority)) = metadata::find_priority(&text) {
        if claims.is_free(&range) {
            bag.offer(
                Field::Priority,
                Entity::resolved(EntityValue::Priority(priority), &text[range.clone()]),
            );
            claims.claim(range);
        }
    }

    extract_location(&text, &mut bag, &mut claims);

    let referent_phrase = find_referent_phrase(&text);
    let referent = referent_phrase
        .as_ref()
        .and_then(|(_, subject)| resolve_referent(*subject, recent));
    let referent_subject = referent
        .as_ref()
        .map(|r| r.subject)
        .or_else(|| referent_phrase.as_ref().and_then(|(_, s)| *s));

    let hint = classifier::classify(&classifier::Signals {
        text: &lower,
        referent: referent_subject,
    });
    bag.hint = hint;

    extract_people(&text, hint, ctx, &mut bag, &mut claims);

    match hint {
        Some(IntentCategory::CreateMeeting) => extract_meeting_title(&text, &mut bag, &mut claims),
        Some(IntentCategory::CreateTask) => extract_task_text(&text, &mut bag, &mut claims),
        Some(IntentCategory::SendEmail) => extract_email_text(&text, &mut bag, &mut claims),
        Some(
            IntentCategory::DeleteMeeting
            | IntentCategory::CompleteTask
            | IntentCategory::DeleteTask,
        )
        | None => {
            extract_target(
                &text,
                hint,
                referent_phrase.as_ref().map(|(r, _)| r.clone()),
                referent,
                &mut bag,
                &mut claims,
            );
        }
        Some(_) => {}
    }

    bag.residual = residual(&text, &claims);
    if hint.is_none() {
        bare_contact_list(ctx, &mut bag);
    }
    bag
}

fn extract_location(text: &str, bag: &mut EntityBag, claims: &mut Claims) {
    for re in [re_location_label(), re_location(), re_location_virtual()] {
        let Some(caps) = re.captures(text) else {
            continue;
        };
        let (Some(whole), Some(place)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if !claims.is_free(&whole.range()) {
            continue;
        }
        let place = place.as_str().trim();
        bag.offer(
            Field::Location,
            Entity::resolved(EntityValue::Text(capitalize_first(place)), whole.as_str()),
        );
        claims.claim(whole.range());
        return;
    }
}

/// Find "it", "that one" or "that meeting". The subject is known only when a
/// noun was used.
fn find_referent_phrase(text: &str) -> Option<(Range<usize>, Option<Subject>)> {
    for caps in re_referent().captures_iter(text) {
        let whole = caps.get(0)?;
        // "it's" and "it is" are filler, not a reference
        let after = &text[whole.end()..];
        if caps.get(2).is_some() && (after.starts_with('\'') || after.starts_with(" is ")) {
            continue;
        }
        let subject = caps.get(1).map(|noun| {
            let noun = noun.as_str().to_lowercase();
            match noun.as_str() {
                "task" | "todo" | "to-do" | "reminder" => Subject::Task,
                "email" | "e-mail" | "message" => Subject::Email,
                _ => Subject::Meeting,
            }
        });
        return Some((whole.range(), subject));
    }
    None
}

/// The record the most recent relevant user turn was about.
fn resolve_referent(subject: Option<Subject>, recent: &[ConversationTurn]) -> Option<Referent> {
    recent
        .iter()
        .rev()
        .filter(|turn| {
            turn.role == Role::User
                && turn
                    .extracted_intent
                    .and_then(|i| i.subject())
                    .is_some_and(|s| subject.map_or(true, |wanted| wanted == s))
        })
        .find_map(ConversationTurn::referent)
}

fn people_entity(people: Vec<Attendee>, raw: &str) -> Entity {
    let confidence = if people.iter().all(Attendee::is_resolved) {
        Confidence::Resolved
    } else {
        Confidence::Ambiguous
    };
    Entity::new(EntityValue::People(people), confidence, raw)
}

fn extract_people(
    text: &str,
    hint: Option<IntentCategory>,
    ctx: &ExtractContext<'_>,
    bag: &mut EntityBag,
    claims: &mut Claims,
) {
    let emails = attendees::find_emails(text);
    let malformed = attendees::malformed_addresses(text);
    // Names may run up to and around addresses, so addresses are not stops here.
    let stops: Vec<Range<usize>> = claims.ranges.clone();

    let mut invited: Vec<Attendee> = emails
        .iter()
        .map(|(_, address)| Attendee::email(address.clone()))
        .collect();
    let mut recipients = invited.clone();
    let mut raw = emails
        .iter()
        .map(|(_, a)| a.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    for (range, _) in &emails {
        claims.claim(range.clone());
    }

    if let Some((range, names)) = attendees::names_after_with(text, &stops) {
        if !matches!(
            hint,
            Some(IntentCategory::SendEmail | IntentCategory::CreateTask)
        ) {
            let mut named: Vec<Attendee> = names.into_iter().map(Attendee::unresolved).collect();
            attendees::resolve_all(&mut named, ctx.contacts);
            invited.extend(named);
            raw = text[range.clone()].to_string();
            claims.claim(range);
        }
    }

    if matches!(hint, Some(IntentCategory::SendEmail) | None) {
        if let Some((range, names)) = attendees::names_after_to(text, &stops) {
            let mut named: Vec<Attendee> = names.into_iter().map(Attendee::unresolved).collect();
            attendees::resolve_all(&mut named, ctx.contacts);
            // outside an email request, "to ..." is only a recipient if it is a contact
            if hint.is_none() && !named.iter().all(Attendee::is_resolved) {
                named.clear();
            }
            if !named.is_empty() {
                recipients.extend(named);
                if raw.is_empty() {
                    raw = text[range.clone()].to_string();
                }
                claims.claim(range);
            }
        }
    }

    if let Some((range, _)) = malformed.first() {
        claims.claim(range.clone());
    }
    finish_people(bag, invited, recipients, &raw, malformed.first());
}

fn finish_people(
    bag: &mut EntityBag,
    invited: Vec<Attendee>,
    recipients: Vec<Attendee>,
    raw: &str,
    malformed: Option<&(Range<usize>, String)>,
) {
    if let Some((_, token)) = malformed {
        let mut flagged = Entity::malformed(token.clone());
        flagged.value = EntityValue::People(invited);
        bag.insert(Field::Attendees, flagged.clone());
        flagged.value = EntityValue::People(recipients);
        bag.insert(Field::Recipients, flagged);
        return;
    }

    if !invited.is_empty() {
        bag.insert(Field::Attendees, people_entity(invited, raw));
    }
    if !recipients.is_empty() {
        bag.insert(Field::Recipients, people_entity(recipients, raw));
    }
}

/// Extent of a free-text clause beginning at `start`.
///
/// Leading fillers and already claimed words are skipped. The clause ends at
/// sentence punctuation, " - ", the next claimed range or a stop word.
fn clause(text: &str, start: usize, claims: &Claims, stops: &[&str]) -> Option<Range<usize>> {
    let mut start = start.min(text.len());
    loop {
        let rest = &text[start..];
        let trimmed = rest.trim_start();
        start += rest.len() - trimmed.len();
        if let Some(r) = claims.ranges.iter().find(|r| r.start == start && r.end > start) {
            start = r.end;
            continue;
        }
        let word_len = trimmed
            .find(char::is_whitespace)
            .unwrap_or(trimmed.len());
        let word = trimmed[..word_len].to_lowercase();
        if word_len > 0 && LEADING_FILLERS.contains(&word.as_str()) {
            start += word_len;
            continue;
        }
        break;
    }

    let hard = claims
        .ranges
        .iter()
        .filter(|r| r.start >= start)
        .map(|r| r.start)
        .min()
        .unwrap_or(text.len());
    let hard = text[start..hard]
        .find(['.', '?', '!', ';', ',', '\n', '"', '('])
        .map(|i| start + i)
        .unwrap_or(hard);
    let hard = text[start..hard]
        .find(" - ")
        .map(|i| start + i)
        .unwrap_or(hard);

    let mut end = start;
    let mut offset = start;
    for word in text[start..hard].split_inclusive(char::is_whitespace) {
        let bare = word
            .trim()
            .trim_matches(|c: char| !c.is_alphanumeric())
            .to_lowercase();
        if stops.contains(&bare.as_str()) {
            break;
        }
        offset += word.len();
        end = offset;
    }

    let len = text[start..end].trim_end().len();
    (len > 0).then(|| start..start + len)
}

fn quoted(text: &str, claims: &Claims) -> Option<Range<usize>> {
    re_quoted()
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.range())
        .find(|r| claims.is_free(r) && !text[r.clone()].trim().is_empty())
}

fn after(re: &Regex, text: &str, claims: &Claims, stops: &[&str]) -> Option<(Range<usize>, Range<usize>)> {
    for m in re.find_iter(text) {
        if !claims.is_free(&m.range()) {
            continue;
        }
        if let Some(span) = clause(text, m.end(), claims, stops) {
            return Some((m.range(), span));
        }
    }
    None
}

fn put_text(field: Field, value: &str, raw: &str, bag: &mut EntityBag) {
    let value = value.trim();
    if !value.is_empty() {
        bag.offer(
            field,
            Entity::resolved(EntityValue::Text(capitalize_first(value)), raw),
        );
    }
}

/// Drop a trailing "meeting"/"call" and reject titles that are nothing but.
fn meeting_title(raw: &str) -> Option<String> {
    let mut words: Vec<&str> = raw.split_whitespace().collect();
    if words
        .iter()
        .all(|w| GENERIC_MEETING_WORDS.contains(&w.to_lowercase().as_str()))
    {
        return None;
    }
    if words.len() > 1 {
        if let Some(last) = words.last() {
            if GENERIC_MEETING_WORDS.contains(&last.to_lowercase().as_str()) {
                words.pop();
            }
        }
    }
    Some(words.join(" "))
}

fn extract_meeting_title(text: &str, bag: &mut EntityBag, claims: &mut Claims) {
    if let Some(span) = quoted(text, claims) {
        put_text(Field::Title, &text[span.clone()], &text[span.clone()], bag);
        claims.claim(span.start.saturating_sub(1)..(span.end + 1).min(text.len()));
        return;
    }

    if let Some((cue, span)) = after(re_named(), text, claims, MEETING_TITLE_STOPS) {
        put_text(Field::Title, &text[span.clone()], &text[span.clone()], bag);
        claims.claim(cue.start..span.end);
        return;
    }

    if let Some((cue, span)) = after(re_meeting_trigger(), text, claims, MEETING_TITLE_STOPS) {
        // "a meeting" is consumed even though it names nothing
        claims.claim(cue.start..span.end);
        if let Some(title) = meeting_title(&text[span.clone()]) {
            put_text(Field::Title, &title, &text[span], bag);
            return;
        }
    }

    if let Some((cue, span)) = after(re_topic(), text, claims, MEETING_TITLE_STOPS) {
        let topic = crate::helpers::strip_article(&text[span.clone()]).to_string();
        put_text(Field::Title, &topic, &text[span.clone()], bag);
        claims.claim(cue.start..span.end);
    }
}

fn extract_task_text(text: &str, bag: &mut EntityBag, claims: &mut Claims) {
    if let Some(caps) = re_description().captures(text) {
        if let (Some(whole), Some(body)) = (caps.get(0), caps.get(1)) {
            put_text(Field::Description, body.as_str(), body.as_str(), bag);
            claims.claim(whole.range());
        }
    }

    let title_span = if let Some(span) = quoted(text, claims) {
        Some(span)
    } else if let Some(caps) = re_task_list().captures(text) {
        caps.get(1).map(|m| m.range())
    } else {
        after(re_task_label(), text, claims, TASK_TITLE_STOPS)
            .or_else(|| after(re_named(), text, claims, TASK_TITLE_STOPS))
            .or_else(|| after(re_task_trigger(), text, claims, TASK_TITLE_STOPS))
            .map(|(cue, span)| {
                claims.claim(cue.start..span.start);
                span
            })
    };

    if let Some(span) = title_span {
        let title = metadata::strip_priority(&text[span.clone()]);
        put_text(Field::Title, &title, &text[span.clone()], bag);
        claims.claim(span);
    }
}

fn extract_email_text(text: &str, bag: &mut EntityBag, claims: &mut Claims) {
    let body = re_email_body()
        .find_iter(text)
        .find(|m| claims.is_free(&m.range()))
        .map(|m| (m.range(), m.end()..text.len()));
    if let Some((cue, span)) = body {
        let content = text[span.clone()].trim().trim_matches('"').trim();
        put_text(Field::Body, content, content, bag);
        claims.claim(cue.start..span.end);
    }

    if let Some((cue, span)) = after(re_email_subject(), text, claims, SUBJECT_STOPS)
        .or_else(|| after(re_topic(), text, claims, SUBJECT_STOPS))
    {
        let subject = crate::helpers::strip_article(&text[span.clone()]).to_string();
        put_text(Field::Subject, &subject, &text[span.clone()], bag);
        claims.claim(cue.start..span.end);
    }

    if !bag.contains(Field::Body) {
        if let Some(span) = quoted(text, claims) {
            put_text(Field::Body, &text[span.clone()], &text[span.clone()], bag);
            claims.claim(span);
        } else if let Some(idx) = text.find(": ") {
            // "email bob: running late"
            let span = idx + 2..text.len();
            if claims.is_free(&span) {
                put_text(Field::Body, &text[span.clone()], &text[span.clone()], bag);
                claims.claim(idx..text.len());
            }
        } else {
            // "email alice that I'm running late"
            let that = text
                .match_indices(" that ")
                .map(|(i, _)| i)
                .find(|i| claims.is_free(&(*i..i + 6)));
            if let Some(i) = that {
                let span = i + 6..text.len();
                put_text(Field::Body, &text[span.clone()], &text[span.clone()], bag);
                claims.claim(i..text.len());
            }
        }
    }

    if let Some(m) = re_send_trigger().find(text) {
        claims.claim(m.range());
    }
}

fn re_send_trigger() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(?:please\s+)?(?:send|write|compose|draft|e-?mail)\b(?:\s+(?:an?|quick|new)\b)*(?:\s+(?:e-?mail|message|note|mail)\b)?").unwrap()
    })
}

fn extract_target(
    text: &str,
    hint: Option<IntentCategory>,
    referent_range: Option<Range<usize>>,
    referent: Option<Referent>,
    bag: &mut EntityBag,
    claims: &mut Claims,
) {
    if let Some(range) = referent_range {
        let raw = text[range.clone()].to_string();
        match referent {
            Some(referent) => bag.insert(
                Field::Target,
                Entity::resolved(EntityValue::Referent(referent), raw),
            ),
            None if hint.is_some() => bag.insert(
                Field::Target,
                Entity::ambiguous(EntityValue::Text(raw.clone()), raw),
            ),
            // a bare "it" with nothing to point at, outside any request
            None => {}
        }
        claims.claim(range);
        if let Some(m) = re_target_verb().find(text) {
            claims.claim(m.range());
        }
        return;
    }

    if hint.is_none() {
        return;
    }

    let span = quoted(text, claims).or_else(|| {
        after(re_target_verb(), text, claims, TARGET_STOPS).map(|(cue, span)| {
            claims.claim(cue.start..span.start);
            span
        })
    });
    let Some(span) = span else {
        if let Some(m) = re_target_verb().find(text) {
            claims.claim(m.range());
        }
        return;
    };

    let raw = &text[span.clone()];
    let trimmed = re_target_tail().replace(raw, "");
    let name: Vec<&str> = trimmed
        .split_whitespace()
        .filter(|w| !TARGET_FILLERS.contains(&w.to_lowercase().as_str()))
        .collect();
    claims.claim(span.clone());
    if !name.is_empty() {
        let name = name.join(" ");
        bag.insert(Field::Target, Entity::resolved(EntityValue::Text(name), raw));
    }
}

/// Text nobody claimed, with conversational padding removed.
fn residual(text: &str, claims: &Claims) -> String {
    let mut kept = String::with_capacity(text.len());
    let mut last = 0;
    let mut ranges = claims.ranges.clone();
    ranges.sort_by_key(|r| r.start);
    for r in ranges {
        if r.start > last {
            kept.push_str(&text[last..r.start]);
            kept.push(' ');
        }
        last = last.max(r.end);
    }
    if last < text.len() {
        kept.push_str(&text[last..]);
    }

    let mut out = kept.split_whitespace().collect::<Vec<_>>().join(" ");
    loop {
        let before = out.len();
        out = out
            .trim_matches(|c: char| c.is_ascii_punctuation() && c != '\'' && c != '@')
            .trim()
            .to_string();
        let lower = out.to_lowercase();
        for prefix in RESIDUAL_PREFIXES {
            let boundary = lower
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.is_empty() || rest.starts_with([' ', ',', ':']));
            if boundary {
                out = out[prefix.len()..].to_string();
                break;
            }
        }
        let lower = out.to_lowercase();
        for suffix in RESIDUAL_SUFFIXES {
            if lower.ends_with(&format!(" {suffix}")) || lower == *suffix {
                out.truncate(out.len() - suffix.len());
                break;
            }
        }
        if out.len() == before {
            break;
        }
    }
    out.trim().to_string()
}

/// A bare reply like "Alice and Bob" counts as people only when every name
/// is in the address book. Anything else stays free text.
fn bare_contact_list(ctx: &ExtractContext<'_>, bag: &mut EntityBag) {
    if bag.residual.is_empty() || bag.contains(Field::Attendees) || ctx.contacts.is_empty() {
        return;
    }
    let names = attendees::split_names(&bag.residual);
    if names.is_empty() {
        return;
    }
    let mut people: Vec<Attendee> = names.into_iter().map(Attendee::unresolved).collect();
    attendees::resolve_all(&mut people, ctx.contacts);
    if !people.iter().all(Attendee::is_resolved) {
        return;
    }
    let raw = std::mem::take(&mut bag.residual);
    bag.insert(Field::Attendees, people_entity(people.clone(), &raw));
    bag.insert(Field::Recipients, people_entity(people, &raw));
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveTime, TimeZone};

    use super::*;
    use crate::types::Priority;

    fn contacts() -> BTreeMap<String, String> {
        BTreeMap::from([
            ("Alice Smith".to_string(), "alice@example.com".to_string()),
            ("Bob Jones".to_string(), "bob@example.com".to_string()),
        ])
    }

    fn run_with(text: &str, recent: &[ConversationTurn]) -> EntityBag {
        let book = contacts();
        let ctx = ExtractContext {
            // Thursday 2026-02-12, 10:00 London
            now: Utc.with_ymd_and_hms(2026, 2, 12, 10, 0, 0).unwrap(),
            tz: chrono_tz::Europe::London,
            business_hours: BusinessHours::default(),
            contacts: &book,
        };
        extract(text, recent, &ctx)
    }

    fn run(text: &str) -> EntityBag {
        run_with(text, &[])
    }

    fn emails(bag: &EntityBag, field: Field) -> Vec<String> {
        bag.people(field)
            .unwrap_or_default()
            .iter()
            .filter_map(|a| a.email.clone())
            .collect()
    }

    #[test]
    fn full_meeting_request() {
        let bag = run("Schedule a budget review tomorrow at 2pm with alice@example.com");
        assert_eq!(bag.hint, Some(IntentCategory::CreateMeeting));
        assert_eq!(bag.text(Field::Title), Some("Budget review"));
        assert_eq!(bag.date(Field::Date), NaiveDate::from_ymd_opt(2026, 2, 13));
        assert_eq!(bag.time(Field::Time), NaiveTime::from_hms_opt(14, 0, 0));
        assert_eq!(emails(&bag, Field::Attendees), vec!["alice@example.com"]);
        assert!(bag.residual.is_empty(), "residual: {:?}", bag.residual);
    }

    #[test]
    fn generic_meeting_has_no_title() {
        let bag = run("Schedule a meeting");
        assert_eq!(bag.hint, Some(IntentCategory::CreateMeeting));
        assert!(!bag.contains(Field::Title));
    }

    #[test]
    fn topic_becomes_title() {
        let bag = run("set up a call with Bob about the roadmap next Friday");
        assert_eq!(bag.text(Field::Title), Some("Roadmap"));
        assert_eq!(emails(&bag, Field::Attendees), vec!["bob@example.com"]);
        assert_eq!(bag.date(Field::Date), NaiveDate::from_ymd_opt(2026, 2, 13));
    }

    #[test]
    fn unknown_names_are_kept_unresolved() {
        let bag = run("book a sync with Zed at 3pm");
        let people = bag.people(Field::Attendees).unwrap();
        assert_eq!(people.len(), 1);
        assert_eq!(people[0].name.as_deref(), Some("Zed"));
        assert!(!people[0].is_resolved());
        assert_eq!(bag.get(Field::Attendees).unwrap().confidence, Confidence::Ambiguous);
        assert_eq!(bag.text(Field::Title), Some("Sync"));
    }

    #[test]
    fn location_and_duration() {
        let bag = run("schedule design review on Monday at 10am for 30 minutes in room 4");
        assert_eq!(bag.text(Field::Title), Some("Design review"));
        assert_eq!(bag.minutes(Field::Duration), Some(30));
        assert_eq!(bag.text(Field::Location), Some("Room 4"));
    }

    #[test]
    fn task_with_deadline_and_priority() {
        let bag = run("task: Review quarterly budget by Friday - high priority");
        assert_eq!(bag.hint, Some(IntentCategory::CreateTask));
        assert_eq!(bag.text(Field::Title), Some("Review quarterly budget"));
        assert_eq!(bag.date(Field::Date), NaiveDate::from_ymd_opt(2026, 2, 13));
        assert_eq!(bag.priority(Field::Priority), Some(Priority::P1));
    }

    #[test]
    fn priority_words_leave_the_task_title() {
        let bag = run("Remind me to call the bank urgently");
        assert_eq!(bag.text(Field::Title), Some("Call the bank"));
        assert_eq!(bag.priority(Field::Priority), Some(Priority::P1));
        assert!(!bag.contains(Field::Description));
    }

    #[test]
    fn remind_me_to() {
        let bag = run("Remind me to follow up with finance tomorrow");
        assert_eq!(bag.text(Field::Title), Some("Follow up with finance"));
        assert_eq!(bag.date(Field::Date), NaiveDate::from_ymd_opt(2026, 2, 13));
    }

    #[test]
    fn email_parts() {
        let bag = run("Send an email to bob@example.com about the launch saying we're ready");
        assert_eq!(bag.hint, Some(IntentCategory::SendEmail));
        assert_eq!(emails(&bag, Field::Recipients), vec!["bob@example.com"]);
        assert_eq!(bag.text(Field::Subject), Some("Launch"));
        assert_eq!(bag.text(Field::Body), Some("We're ready"));
    }

    #[test]
    fn email_to_a_contact_name() {
        let bag = run("email Alice that I'm running late");
        assert_eq!(emails(&bag, Field::Recipients), vec!["alice@example.com"]);
        assert_eq!(bag.text(Field::Body), Some("I'm running late"));
    }

    #[test]
    fn malformed_address_is_flagged() {
        let bag = run("send an email to bob@ saying hi");
        let entity = bag.get(Field::Recipients).unwrap();
        assert_eq!(entity.confidence, Confidence::Malformed);
        assert_eq!(entity.raw, "bob@");
    }

    #[test]
    fn named_targets() {
        let bag = run("mark review budget as done");
        assert_eq!(bag.hint, Some(IntentCategory::CompleteTask));
        assert_eq!(bag.text(Field::Target), Some("review budget"));

        let bag = run("cancel the budget review");
        assert_eq!(bag.hint, Some(IntentCategory::DeleteMeeting));
        assert_eq!(bag.text(Field::Target), Some("budget review"));
    }

    #[test]
    fn pronoun_resolves_to_the_last_meeting() {
        let mut known = EntityBag::new();
        known.insert(
            Field::Target,
            Entity::resolved(
                EntityValue::Referent(Referent {
                    subject: Subject::Meeting,
                    id: Some("evt-1".to_string()),
                    title: Some("Budget review".to_string()),
                    start: None,
                }),
                "budget review",
            ),
        );
        let turns = vec![
            ConversationTurn::user("schedule budget review", Utc::now())
                .with_intent(IntentCategory::CreateMeeting)
                .with_entities(known),
            ConversationTurn::assistant("Scheduled.", Utc::now()),
        ];
        let bag = run_with("cancel it", &turns);
        assert_eq!(bag.hint, Some(IntentCategory::DeleteMeeting));
        let referent = bag.referent(Field::Target).unwrap();
        assert_eq!(referent.id.as_deref(), Some("evt-1"));
    }

    #[test]
    fn pronoun_looks_past_a_query_turn() {
        let mut known = EntityBag::new();
        known.insert(
            Field::Target,
            Entity::resolved(
                EntityValue::Referent(Referent {
                    subject: Subject::Meeting,
                    id: Some("evt-1".to_string()),
                    title: Some("Budget review".to_string()),
                    start: None,
                }),
                "budget review",
            ),
        );
        let turns = vec![
            ConversationTurn::user("schedule budget review", Utc::now())
                .with_intent(IntentCategory::CreateMeeting)
                .with_entities(known),
            ConversationTurn::assistant("Scheduled.", Utc::now()),
            ConversationTurn::user("what meetings do I have tomorrow?", Utc::now())
                .with_intent(IntentCategory::QueryMeetings)
                .with_entities(EntityBag::new()),
            ConversationTurn::assistant("Tomorrow: Budget review.", Utc::now()),
        ];
        let bag = run_with("cancel it", &turns);
        let referent = bag.referent(Field::Target).unwrap();
        assert_eq!(referent.id.as_deref(), Some("evt-1"));
    }

    #[test]
    fn unresolvable_pronoun_is_ambiguous() {
        let bag = run("cancel it");
        assert_eq!(bag.hint, Some(IntentCategory::DeleteMeeting));
        let target = bag.get(Field::Target).unwrap();
        assert_eq!(target.confidence, Confidence::Ambiguous);
    }

    #[test]
    fn bare_answers_land_in_residual() {
        let bag = run("Budget review");
        assert_eq!(bag.hint, None);
        assert_eq!(bag.residual, "Budget review");

        let bag = run("it's called Quarterly planning, thanks");
        assert_eq!(bag.residual, "Quarterly planning");

        let bag = run("at 3pm please");
        assert_eq!(bag.time(Field::Time), NaiveTime::from_hms_opt(15, 0, 0));
        assert!(bag.residual.is_empty());
    }

    #[test]
    fn bare_contact_names_become_people() {
        let bag = run("Alice and Bob");
        assert_eq!(
            emails(&bag, Field::Attendees),
            vec!["alice@example.com", "bob@example.com"]
        );
        assert!(bag.residual.is_empty());
    }

    #[test]
    fn garbage_never_panics() {
        for text in ["", "   ", "@@@", "\"", "cancel", "schedule \"\"", "with , and", "ｓｃｈｅｄｕｌｅ ２pm"] {
            let _ = run(text);
        }
    }
}
