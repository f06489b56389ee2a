//! Typed entities pulled out of an utterance.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use super::attendees::Attendee;
use super::classifier::IntentCategory;
use crate::types::{Interval, Priority, Subject};

/// A slot an action may need filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Title,
    Date,
    Time,
    Duration,
    Attendees,
    Location,
    Recipients,
    Subject,
    Body,
    Description,
    Priority,
    Window,
    Target,
}

impl Field {
    /// How the field is named when asking for it.
    pub fn label(&self) -> &'static str {
        match self {
            Field::Title => "a title",
            Field::Date => "a date",
            Field::Time => "a start time",
            Field::Duration => "a length",
            Field::Attendees => "who should attend",
            Field::Location => "a location",
            Field::Recipients => "who it should go to",
            Field::Subject => "a subject",
            Field::Body => "what it should say",
            Field::Description => "a description",
            Field::Priority => "a priority",
            Field::Window => "a time range",
            Field::Target => "which one you mean",
        }
    }

    /// Fields a bare answer ("Budget review") can fill, in the order tried.
    pub fn free_text() -> &'static [Field] {
        &[
            Field::Title,
            Field::Body,
            Field::Subject,
            Field::Description,
            Field::Target,
        ]
    }

    pub fn is_people(&self) -> bool {
        matches!(self, Field::Attendees | Field::Recipients)
    }
}

/// How sure the extractor is about a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Resolved,
    /// More than one reading ("at 7": morning or evening?).
    Ambiguous,
    /// Recognisably an attempt, but not a valid value ("31 February").
    Malformed,
}

/// A record referred to in conversation ("it", "that meeting").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Referent {
    pub subject: Subject,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum EntityValue {
    Text(String),
    Date(NaiveDate),
    Time(NaiveTime),
    Minutes(i64),
    People(Vec<Attendee>),
    Priority(Priority),
    Window(Interval),
    Referent(Referent),
    /// Numbered candidates offered to the user ("1. Standup, 2. Review").
    Choices(Vec<Referent>),
}

impl EntityValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            EntityValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            EntityValue::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_time(&self) -> Option<NaiveTime> {
        match self {
            EntityValue::Time(t) => Some(*t),
            _ => None,
        }
    }

    pub fn as_minutes(&self) -> Option<i64> {
        match self {
            EntityValue::Minutes(m) => Some(*m),
            _ => None,
        }
    }

    pub fn as_people(&self) -> Option<&[Attendee]> {
        match self {
            EntityValue::People(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_priority(&self) -> Option<Priority> {
        match self {
            EntityValue::Priority(p) => Some(*p),
            _ => None,
        }
    }

    pub fn as_window(&self) -> Option<Interval> {
        match self {
            EntityValue::Window(w) => Some(*w),
            _ => None,
        }
    }

    pub fn as_referent(&self) -> Option<&Referent> {
        match self {
            EntityValue::Referent(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_choices(&self) -> Option<&[Referent]> {
        match self {
            EntityValue::Choices(c) => Some(c),
            _ => None,
        }
    }
}

/// A value with its confidence and the words it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub value: EntityValue,
    pub confidence: Confidence,
    pub raw: String,
}

impl Entity {
    pub fn new(value: EntityValue, confidence: Confidence, raw: impl Into<String>) -> Self {
        Self {
            value,
            confidence,
            raw: raw.into(),
        }
    }

    pub fn resolved(value: EntityValue, raw: impl Into<String>) -> Self {
        Self::new(value, Confidence::Resolved, raw)
    }

    pub fn ambiguous(value: EntityValue, raw: impl Into<String>) -> Self {
        Self::new(value, Confidence::Ambiguous, raw)
    }

    /// An unusable attempt; the raw text is kept so the question can quote it.
    pub fn malformed(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        Self::new(EntityValue::Text(raw.clone()), Confidence::Malformed, raw)
    }

    pub fn is_resolved(&self) -> bool {
        self.confidence == Confidence::Resolved
    }
}

/// Everything extracted from one utterance (or accumulated over a
/// clarification exchange).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityBag {
    fields: BTreeMap<Field, Entity>,
    /// Category suggested by the wording, before routing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<IntentCategory>,
    /// Words no extractor claimed; a bare answer to a question lives here.
    #[serde(default)]
    pub residual: String,
}

impl EntityBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field, replacing any previous value.
    pub fn insert(&mut self, field: Field, entity: Entity) {
        self.fields.insert(field, entity);
    }

    /// Set a field only if it is still empty.
    pub fn offer(&mut self, field: Field, entity: Entity) {
        self.fields.entry(field).or_insert(entity);
    }

    pub fn get(&self, field: Field) -> Option<&Entity> {
        self.fields.get(&field)
    }

    pub fn get_mut(&mut self, field: Field) -> Option<&mut Entity> {
        self.fields.get_mut(&field)
    }

    pub fn remove(&mut self, field: Field) -> Option<Entity> {
        self.fields.remove(&field)
    }

    pub fn contains(&self, field: Field) -> bool {
        self.fields.contains_key(&field)
    }

    pub fn is_resolved(&self, field: Field) -> bool {
        self.get(field).is_some_and(Entity::is_resolved)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = (Field, &Entity)> {
        self.fields.iter().map(|(f, e)| (*f, e))
    }

    fn resolved_value(&self, field: Field) -> Option<&EntityValue> {
        self.get(field).filter(|e| e.is_resolved()).map(|e| &e.value)
    }

    pub fn text(&self, field: Field) -> Option<&str> {
        self.resolved_value(field).and_then(EntityValue::as_text)
    }

    pub fn date(&self, field: Field) -> Option<NaiveDate> {
        self.resolved_value(field).and_then(EntityValue::as_date)
    }

    pub fn time(&self, field: Field) -> Option<NaiveTime> {
        self.resolved_value(field).and_then(EntityValue::as_time)
    }

    pub fn minutes(&self, field: Field) -> Option<i64> {
        self.resolved_value(field).and_then(EntityValue::as_minutes)
    }

    /// People regardless of confidence; unresolved names are kept.
    pub fn people(&self, field: Field) -> Option<&[Attendee]> {
        self.get(field).and_then(|e| e.value.as_people())
    }

    pub fn priority(&self, field: Field) -> Option<Priority> {
        self.resolved_value(field).and_then(EntityValue::as_priority)
    }

    pub fn window(&self, field: Field) -> Option<Interval> {
        self.resolved_value(field).and_then(EntityValue::as_window)
    }

    pub fn referent(&self, field: Field) -> Option<&Referent> {
        self.resolved_value(field).and_then(EntityValue::as_referent)
    }

    /// Keep only the listed fields.
    pub fn retain(&mut self, keep: &[Field]) {
        self.fields.retain(|field, _| keep.contains(field));
    }

    /// Fold `newer` into this bag for the listed fields.
    ///
    /// Newer values win, except for people. A list of bare addresses answers
    /// the earlier unresolved names in order, and other newcomers are appended.
    pub fn absorb(&mut self, newer: &EntityBag, fields: &[Field]) {
        for (field, entity) in newer.fields() {
            if !fields.contains(&field) {
                continue;
            }
            if field.is_people() {
                if let (Some(old), Some(new)) = (self.people(field), entity.value.as_people()) {
                    let merged = merge_people(old, new);
                    let confidence = if entity.confidence == Confidence::Malformed {
                        Confidence::Malformed
                    } else if merged.iter().all(Attendee::is_resolved) {
                        Confidence::Resolved
                    } else {
                        Confidence::Ambiguous
                    };
                    self.insert(
                        field,
                        Entity::new(EntityValue::People(merged), confidence, entity.raw.clone()),
                    );
                    continue;
                }
            }
            self.insert(field, entity.clone());
        }
    }
}

fn merge_people(old: &[Attendee], new: &[Attendee]) -> Vec<Attendee> {
    let mut merged: Vec<Attendee> = old.to_vec();
    let mut addresses = new
        .iter()
        .filter(|a| a.name.is_none())
        .filter_map(|a| a.email.clone())
        .collect::<Vec<_>>()
        .into_iter();

    for person in merged.iter_mut().filter(|p| !p.is_resolved()) {
        match addresses.next() {
            Some(address) => person.email = Some(address),
            None => break,
        }
    }
    let leftovers: Vec<String> = addresses.collect();

    for person in new {
        let bare_address = person.name.is_none()
            && person
                .email
                .as_ref()
                .is_some_and(|e| !leftovers.contains(e));
        if bare_address {
            continue;
        }
        let duplicate = merged.iter().any(|m| {
            (m.email.is_some() && m.email == person.email)
                || (m.name.is_some() && m.name == person.name)
        });
        if !duplicate {
            merged.push(person.clone());
        }
    }
    merged
}
