//! Intent routing: decide whether an utterance answers the outstanding
//! question or starts something new.
//!
//! With a clarification pending, an utterance that names no other request and
//! supplies at least one missing field continues it. Its entities are merged
//! into what is already known. An utterance naming a different request
//! abandons the pending one, and so does one that fills nothing. "never mind"
//! drops it outright.

use std::sync::OnceLock;

use log::debug;
use regex::Regex;
use serde::Serialize;

use super::attendees::{split_names, Attendee};
use super::classifier::{is_dismissal, is_small_talk, IntentCategory};
use super::entities::{Confidence, Entity, EntityBag, EntityValue, Field};
use crate::agent::requirements::relevant_fields;
use crate::context::PendingClarification;
use crate::helpers::capitalize_first;

/// The routed intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Intent {
    pub category: IntentCategory,
    /// Continues the pending clarification rather than starting afresh.
    pub continues: bool,
    /// Names a request but nothing to act on ("schedule a meeting").
    pub under_specified: bool,
}

/// Result of routing one utterance.
#[derive(Debug, Clone)]
pub struct RouteDecision {
    pub intent: Intent,
    /// The entities to act on: the utterance's own, or the pending request's
    /// merged with this utterance's answers.
    pub entities: EntityBag,
    /// A pending clarification this utterance left behind.
    pub abandoned: Option<PendingClarification>,
    /// The user explicitly called off the pending request.
    pub dismissed: bool,
}

fn re_ordinal() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(?:the\s+|number\s+|no\.?\s*|#)?(\d|first|second|third|fourth|fifth|1st|2nd|3rd|4th|5th|last)(?:\s+one)?$").unwrap()
    })
}

/// "2", "the second one", "#3"; 1-based.
fn ordinal(text: &str, count: usize) -> Option<usize> {
    let caps = re_ordinal().captures(text.trim())?;
    let n = match caps[1].to_lowercase().as_str() {
        "first" | "1st" => 1,
        "second" | "2nd" => 2,
        "third" | "3rd" => 3,
        "fourth" | "4th" => 4,
        "fifth" | "5th" => 5,
        "last" => count,
        digit => digit.parse().ok()?,
    };
    (1..=count).contains(&n).then_some(n)
}

/// Fields whose presence counts as answering a question about `field`.
///
/// "When should it start?" is answered by "tomorrow" as much as by "3pm", and
/// "which meeting?" by "the one at 3".
fn answered_by(field: Field) -> &'static [Field] {
    match field {
        Field::Time => &[Field::Time, Field::Date],
        Field::Date => &[Field::Date, Field::Time],
        Field::Target => &[Field::Target, Field::Date, Field::Time, Field::Attendees],
        Field::Title => &[Field::Title],
        Field::Duration => &[Field::Duration],
        Field::Attendees => &[Field::Attendees],
        Field::Location => &[Field::Location],
        Field::Recipients => &[Field::Recipients],
        Field::Subject => &[Field::Subject],
        Field::Body => &[Field::Body],
        Field::Description => &[Field::Description],
        Field::Priority => &[Field::Priority],
        Field::Window => &[Field::Window],
    }
}

/// Route `entities`, extracted from `utterance`, against the pending
/// clarification if there is one.
pub fn route(
    utterance: &str,
    entities: EntityBag,
    pending: Option<&PendingClarification>,
) -> RouteDecision {
    if let Some(pending) = pending {
        if is_dismissal(&utterance.to_lowercase()) {
            debug!("pending {} dismissed", pending.category.label());
            return RouteDecision {
                intent: Intent {
                    category: IntentCategory::GeneralChat,
                    continues: false,
                    under_specified: false,
                },
                entities,
                abandoned: Some(pending.clone()),
                dismissed: true,
            };
        }

        let same_or_none = entities.hint.map_or(true, |hint| hint == pending.category);
        if same_or_none {
            if let Some(merged) = continuation(utterance, &entities, pending) {
                return RouteDecision {
                    intent: Intent {
                        category: pending.category,
                        continues: true,
                        under_specified: false,
                    },
                    entities: merged,
                    abandoned: None,
                    dismissed: false,
                };
            }
        }

        debug!(
            "pending {} abandoned for {:?}",
            pending.category.label(),
            entities.hint.map(|h| h.label())
        );
        let mut decision = fresh(entities);
        decision.abandoned = Some(pending.clone());
        return decision;
    }

    fresh(entities)
}

fn fresh(entities: EntityBag) -> RouteDecision {
    let category = entities.hint.unwrap_or(IntentCategory::GeneralChat);
    let under_specified = category.is_mutating()
        && !relevant_fields(category)
            .iter()
            .any(|field| entities.is_resolved(*field));
    RouteDecision {
        intent: Intent {
            category,
            continues: false,
            under_specified,
        },
        entities,
        abandoned: None,
        dismissed: false,
    }
}

/// Merge an answer into the pending request, or `None` if it answers nothing.
fn continuation(
    utterance: &str,
    entities: &EntityBag,
    pending: &PendingClarification,
) -> Option<EntityBag> {
    let relevant = relevant_fields(pending.category);
    let explicit_same = entities.hint == Some(pending.category);

    let fills_missing = pending
        .missing
        .iter()
        .flat_map(|field| answered_by(*field))
        .any(|field| entities.contains(*field));

    let mut merged = pending.known.clone();
    merged.absorb(entities, relevant);
    merged.hint = Some(pending.category);

    // neither a question nor small talk is ever an answer
    let answered = !utterance.trim_end().ends_with('?')
        && !is_small_talk(&utterance.to_lowercase())
        && fill_from_residual(entities, pending, &mut merged);
    (fills_missing || explicit_same || answered).then_some(merged)
}

/// Let the unclaimed words answer the question ("Budget review", "2",
/// "Dana and Lee"). Returns whether they did.
fn fill_from_residual(
    entities: &EntityBag,
    pending: &PendingClarification,
    merged: &mut EntityBag,
) -> bool {
    let residual = entities.residual.trim();
    if residual.is_empty() {
        return false;
    }

    // A numbered choice from the list we offered.
    if pending.missing.contains(&Field::Target) && !entities.contains(Field::Target) {
        if let Some(choices) = pending.known.get(Field::Target).and_then(|e| e.value.as_choices()) {
            if let Some(n) = ordinal(residual, choices.len()) {
                merged.insert(
                    Field::Target,
                    Entity::resolved(EntityValue::Referent(choices[n - 1].clone()), residual),
                );
                return true;
            }
        }
    }

    // A bare phrase fills the first free-text field we asked for.
    if let Some(field) = Field::free_text()
        .iter()
        .find(|f| pending.missing.contains(*f) && !entities.contains(**f))
    {
        let value = if *field == Field::Target {
            residual.to_string()
        } else {
            capitalize_first(residual)
        };
        merged.insert(*field, Entity::resolved(EntityValue::Text(value), residual));
        return true;
    }

    // Bare names for a people field; the agent resolves them.
    if let Some(field) = pending
        .missing
        .iter()
        .find(|f| f.is_people() && !entities.contains(**f))
    {
        let names = split_names(residual);
        if !names.is_empty() {
            let answer = Entity::new(
                EntityValue::People(names.into_iter().map(Attendee::unresolved).collect()),
                Confidence::Ambiguous,
                residual,
            );
            let mut reply = EntityBag::new();
            reply.insert(*field, answer);
            merged.absorb(&reply, &[*field]);
            return true;
        }
    }

    false
}
