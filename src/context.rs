//! Per-conversation memory: a bounded window of recent turns plus the one
//! outstanding clarification, if any.
//!
//! A context belongs to exactly one conversation and is only touched while its
//! session lock is held (see `state::SessionStore`).

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::processor::{EntityBag, EntityValue, Field, IntentCategory, Referent};
use crate::types::Subject;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One message in the conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationTurn {
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_intent: Option<IntentCategory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_entities: Option<EntityBag>,
}

impl ConversationTurn {
    pub fn user(text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            timestamp,
            extracted_intent: None,
            extracted_entities: None,
        }
    }

    pub fn assistant(text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            role: Role::Assistant,
            ..Self::user(text, timestamp)
        }
    }

    pub fn with_intent(mut self, intent: IntentCategory) -> Self {
        self.extracted_intent = Some(intent);
        self
    }

    pub fn with_entities(mut self, entities: EntityBag) -> Self {
        self.extracted_entities = Some(entities);
        self
    }

    /// The record this turn was about, if it named or produced one.
    pub fn referent(&self) -> Option<Referent> {
        let subject = self.extracted_intent?.subject()?;
        let entities = self.extracted_entities.as_ref()?;
        if let Some(referent) = entities.referent(Field::Target) {
            return Some(referent.clone());
        }
        entities.text(Field::Title).map(|title| Referent {
            subject,
            id: None,
            title: Some(title.to_string()),
            start: None,
        })
    }
}

/// A request the agent could not complete, waiting for the user's answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingClarification {
    pub category: IntentCategory,
    /// Everything resolved so far.
    pub known: EntityBag,
    /// What the question asked for.
    pub missing: BTreeSet<Field>,
    pub created_at: DateTime<Utc>,
}

/// Memory for one conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationContext {
    id: String,
    turns: Vec<ConversationTurn>,
    window: usize,
    pending: Option<PendingClarification>,
    last_active: DateTime<Utc>,
}

impl ConversationContext {
    /// A new, empty context keeping at most `window` turns (minimum 1).
    pub fn new(id: impl Into<String>, window: usize, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            turns: Vec::new(),
            window: window.max(1),
            pending: None,
            last_active: now,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Append a turn, evicting the oldest beyond the window.
    pub fn push_turn(&mut self, turn: ConversationTurn) {
        if turn.timestamp > self.last_active {
            self.last_active = turn.timestamp;
        }
        self.turns.push(turn);
        if self.turns.len() > self.window {
            let excess = self.turns.len() - self.window;
            self.turns.drain(..excess);
        }
    }

    /// Replace the text of the newest assistant turn.
    pub fn amend_reply(&mut self, text: impl Into<String>) -> bool {
        match self.turns.iter_mut().rev().find(|t| t.role == Role::Assistant) {
            Some(turn) => {
                turn.text = text.into();
                true
            }
            None => false,
        }
    }

    /// Retained turns, oldest first.
    pub fn recent_turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn pending(&self) -> Option<&PendingClarification> {
        self.pending.as_ref()
    }

    pub fn set_pending(&mut self, pending: PendingClarification) {
        self.pending = Some(pending);
    }

    pub fn take_pending(&mut self) -> Option<PendingClarification> {
        self.pending.take()
    }

    pub fn clear_pending(&mut self) {
        self.pending = None;
    }

    /// Forget everything.
    pub fn clear(&mut self) {
        self.turns.clear();
        self.pending = None;
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.last_active {
            self.last_active = now;
        }
    }

    pub fn last_active(&self) -> DateTime<Utc> {
        self.last_active
    }

    pub fn is_idle(&self, now: DateTime<Utc>, idle: Duration) -> bool {
        now.signed_duration_since(self.last_active) >= idle
    }

    /// Attach the id a collaborator assigned to a record created in this
    /// conversation, so "cancel it" can later address it directly.
    ///
    /// The newest user turn about `subject` whose referent has no id yet wins.
    pub fn record_receipt(&mut self, subject: Subject, id: &str) -> bool {
        for turn in self.turns.iter_mut().rev() {
            if turn.role != Role::User {
                continue;
            }
            let Some(entities) = turn.extracted_entities.as_mut() else {
                continue;
            };
            let Some(entity) = entities.get_mut(Field::Target) else {
                continue;
            };
            if let EntityValue::Referent(referent) = &mut entity.value {
                if referent.subject == subject && referent.id.is_none() {
                    referent.id = Some(id.to_string());
                    return true;
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::processor::Entity;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 12, 10, minute, 0).unwrap()
    }

    fn created_meeting(title: &str) -> EntityBag {
        let mut bag = EntityBag::new();
        bag.insert(
            Field::Title,
            Entity::resolved(EntityValue::Text(title.to_string()), title),
        );
        bag.insert(
            Field::Target,
            Entity::resolved(
                EntityValue::Referent(Referent {
                    subject: Subject::Meeting,
                    id: None,
                    title: Some(title.to_string()),
                    start: Some(at(0)),
                }),
                title,
            ),
        );
        bag
    }

    #[test]
    fn window_evicts_oldest() {
        let mut ctx = ConversationContext::new("c1", 3, at(0));
        for i in 0..5 {
            ctx.push_turn(ConversationTurn::user(format!("turn {i}"), at(i)));
        }
        let texts: Vec<&str> = ctx.recent_turns().iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["turn 2", "turn 3", "turn 4"]);
        assert_eq!(ctx.last_active(), at(4));
    }

    #[test]
    fn zero_window_still_keeps_one_turn() {
        let mut ctx = ConversationContext::new("c1", 0, at(0));
        ctx.push_turn(ConversationTurn::user("a", at(1)));
        ctx.push_turn(ConversationTurn::user("b", at(2)));
        assert_eq!(ctx.recent_turns().len(), 1);
    }

    #[test]
    fn pending_round_trip() {
        let mut ctx = ConversationContext::new("c1", 10, at(0));
        assert!(ctx.pending().is_none());
        ctx.set_pending(PendingClarification {
            category: IntentCategory::CreateMeeting,
            known: EntityBag::new(),
            missing: BTreeSet::from([Field::Time]),
            created_at: at(1),
        });
        assert_eq!(
            ctx.pending().map(|p| p.category),
            Some(IntentCategory::CreateMeeting)
        );
        assert!(ctx.take_pending().is_some());
        assert!(ctx.pending().is_none());
    }

    #[test]
    fn receipt_lands_on_newest_matching_turn() {
        let mut ctx = ConversationContext::new("c1", 10, at(0));
        ctx.push_turn(
            ConversationTurn::user("schedule standup", at(1))
                .with_intent(IntentCategory::CreateMeeting)
                .with_entities(created_meeting("Standup")),
        );
        ctx.push_turn(
            ConversationTurn::user("schedule review", at(2))
                .with_intent(IntentCategory::CreateMeeting)
                .with_entities(created_meeting("Review")),
        );

        assert!(ctx.record_receipt(Subject::Meeting, "evt-9"));
        let newest = ctx.recent_turns()[1].referent().unwrap();
        assert_eq!(newest.id.as_deref(), Some("evt-9"));
        assert!(ctx.recent_turns()[0].referent().unwrap().id.is_none());

        assert!(!ctx.record_receipt(Subject::Task, "task-1"));
    }

    #[test]
    fn referent_falls_back_to_title() {
        let mut bag = EntityBag::new();
        bag.insert(
            Field::Title,
            Entity::resolved(EntityValue::Text("File expenses".to_string()), "file expenses"),
        );
        let turn = ConversationTurn::user("remind me to file expenses", at(0))
            .with_intent(IntentCategory::CreateTask)
            .with_entities(bag);
        let referent = turn.referent().unwrap();
        assert_eq!(referent.subject, Subject::Task);
        assert_eq!(referent.title.as_deref(), Some("File expenses"));
    }

    #[test]
    fn idleness() {
        let ctx = ConversationContext::new("c1", 10, at(0));
        assert!(!ctx.is_idle(at(10), Duration::minutes(30)));
        assert!(ctx.is_idle(at(30), Duration::minutes(30)));
    }
}
