//! One conversational turn, end to end: extract, route, decide, remember.
//!
//! `Assistant` is synchronous and holds no conversation state of its own; the
//! caller passes the conversation's context and a snapshot of the user's data.
//! Executing the returned action is the caller's job (see `service`).

use chrono::{DateTime, Utc};
use log::info;
use serde::Serialize;

use crate::agent::{Outcome, SchedulingAgent};
use crate::availability::BusinessHours;
use crate::context::{ConversationContext, ConversationTurn};
use crate::error::{AssistantError, ErrorReply};
use crate::processor::router::{self, RouteDecision};
use crate::processor::{self, ExtractContext, Field, IntentCategory};
use crate::types::{ActionRequest, Config, MeetingInterval, Receipt, Snapshot, Subject};

/// What the assistant says back, plus what it decided.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reply {
    pub text: String,
    pub category: IntentCategory,
    /// This utterance answered an earlier question.
    pub continues: bool,
    /// The request to execute; queries carry `Query { kind }`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<ActionRequest>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub conflicts: Vec<MeetingInterval>,
    /// Fields the assistant is waiting for.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub awaiting: Vec<Field>,
    /// Set when the collaborator refused or failed to carry out `action`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorReply>,
}

impl Reply {
    fn text_only(text: impl Into<String>, category: IntentCategory) -> Self {
        Self {
            text: text.into(),
            category,
            continues: false,
            action: None,
            conflicts: Vec::new(),
            awaiting: Vec::new(),
            error: None,
        }
    }

    /// Whether the reply carries a request that changes the user's data.
    pub fn is_mutating(&self) -> bool {
        self.action.as_ref().is_some_and(ActionRequest::is_mutating)
    }
}

pub struct Assistant {
    config: Config,
    agent: SchedulingAgent,
    hours: BusinessHours,
}

impl Assistant {
    pub fn new(config: Config) -> Result<Self, AssistantError> {
        config.validate()?;
        Ok(Self {
            agent: SchedulingAgent::new(&config)?,
            hours: config.business_hours()?,
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// A fresh context sized by the configured memory window.
    pub fn new_context(&self, id: impl Into<String>, now: DateTime<Utc>) -> ConversationContext {
        ConversationContext::new(id, self.config.memory_window, now)
    }

    /// Respond to one utterance.
    pub fn respond(
        &self,
        ctx: &mut ConversationContext,
        text: &str,
        snapshot: &Snapshot,
    ) -> Reply {
        let now = snapshot.now;
        let utterance = text.trim();
        if utterance.is_empty() {
            ctx.touch(now);
            return Reply::text_only(
                "I didn't catch that. What would you like to do?",
                IntentCategory::GeneralChat,
            );
        }

        let extract_ctx = ExtractContext {
            now,
            tz: self.agent.tz(),
            business_hours: self.hours,
            contacts: &self.config.contacts,
        };
        let entities = processor::extract(utterance, ctx.recent_turns(), &extract_ctx);
        let decision: RouteDecision = router::route(utterance, entities, ctx.pending());

        if let Some(abandoned) = &decision.abandoned {
            info!(
                "conversation {}: dropped pending {} ({})",
                ctx.id(),
                abandoned.category.label(),
                if decision.dismissed { "dismissed" } else { "pivot" }
            );
        }

        let intent = decision.intent;
        let outcome = if decision.dismissed {
            Outcome::Answer {
                text: "Okay, I've dropped that. What else can I help with?".to_string(),
                query: None,
            }
        } else {
            self.agent.handle(
                utterance,
                &intent,
                decision.entities.clone(),
                ctx.pending(),
                snapshot,
            )
        };

        let user_turn = ConversationTurn::user(utterance, now).with_intent(intent.category);
        let mut reply = Reply {
            continues: intent.continues,
            ..Reply::text_only(String::new(), intent.category)
        };
        let user_turn = match outcome {
            Outcome::Act {
                action,
                conflicts,
                message,
                resolved,
            } => {
                info!("conversation {}: {}", ctx.id(), action.label());
                ctx.clear_pending();
                reply.text = message;
                reply.action = Some(action);
                reply.conflicts = conflicts;
                user_turn.with_entities(resolved)
            }
            Outcome::Ask { question, pending } => {
                reply.text = question;
                reply.awaiting = pending.missing.iter().copied().collect();
                let known = pending.known.clone();
                ctx.set_pending(pending);
                user_turn.with_entities(known)
            }
            Outcome::Answer { text, query } => {
                ctx.clear_pending();
                reply.text = text;
                reply.action = query.map(|kind| ActionRequest::Query { kind });
                user_turn.with_entities(decision.entities)
            }
        };

        ctx.push_turn(user_turn);
        ctx.push_turn(ConversationTurn::assistant(reply.text.clone(), now));
        reply
    }

    /// Remember the id a collaborator gave a record this conversation created.
    pub fn record_receipt(
        &self,
        ctx: &mut ConversationContext,
        action: &ActionRequest,
        receipt: &Receipt,
    ) -> bool {
        let subject = match action {
            ActionRequest::CreateMeeting { .. } => Subject::Meeting,
            ActionRequest::CreateTask { .. } => Subject::Task,
            _ => return false,
        };
        match &receipt.id {
            Some(id) => ctx.record_receipt(subject, id),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::types::QueryKind;

    fn at(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, day, hour, minute, 0).unwrap()
    }

    fn assistant() -> Assistant {
        let mut config = Config::default();
        config
            .contacts
            .insert("Bob Jones".to_string(), "bob@example.com".to_string());
        Assistant::new(config).unwrap()
    }

    fn snapshot(minutes_later: i64) -> Snapshot {
        Snapshot::new(at(12, 10, 0) + chrono::Duration::minutes(minutes_later)).with_meetings(vec![
            MeetingInterval::new("m1", "Standup", at(12, 11, 0), at(12, 11, 30)).unwrap(),
            MeetingInterval::new("m4", "Standup", at(13, 11, 0), at(13, 11, 30)).unwrap(),
        ])
    }

    #[test]
    fn complete_request_acts_in_one_turn() {
        let assistant = assistant();
        let mut ctx = assistant.new_context("c1", at(12, 10, 0));
        let reply = assistant.respond(
            &mut ctx,
            "Schedule a budget review tomorrow at 2pm with alice@example.com",
            &snapshot(0),
        );
        assert_eq!(reply.category, IntentCategory::CreateMeeting);
        assert_eq!(
            reply.action,
            Some(ActionRequest::CreateMeeting {
                title: "Budget review".to_string(),
                start: at(13, 14, 0),
                end: at(13, 15, 0),
                attendees: vec!["alice@example.com".to_string()],
                location: None,
            })
        );
        assert!(reply.is_mutating());
        assert!(ctx.pending().is_none());
        assert_eq!(ctx.recent_turns().len(), 2);
    }

    #[test]
    fn clarification_dialogue_accumulates() {
        let assistant = assistant();
        let mut ctx = assistant.new_context("c1", at(12, 10, 0));

        let first = assistant.respond(&mut ctx, "Schedule a meeting", &snapshot(0));
        assert!(first.action.is_none());
        assert_eq!(first.awaiting, vec![Field::Title, Field::Time]);
        let created = ctx.pending().unwrap().created_at;

        let second = assistant.respond(&mut ctx, "Budget review", &snapshot(1));
        assert!(second.continues);
        assert_eq!(second.text, "When should it start?");
        assert_eq!(ctx.pending().unwrap().created_at, created);

        let third = assistant.respond(&mut ctx, "tomorrow at 2pm", &snapshot(2));
        assert!(third.continues);
        assert!(matches!(
            third.action,
            Some(ActionRequest::CreateMeeting { ref title, start, .. })
                if title == "Budget review" && start == at(13, 14, 0)
        ));
        assert!(ctx.pending().is_none());
    }

    #[test]
    fn follow_up_supplies_time_and_attendees_together() {
        let assistant = assistant();
        let mut ctx = assistant.new_context("c1", at(12, 10, 0));
        let first = assistant.respond(&mut ctx, "Schedule a budget review", &snapshot(0));
        assert_eq!(first.awaiting, vec![Field::Time]);

        let second = assistant.respond(&mut ctx, "tomorrow at 2pm with alice@x.com", &snapshot(1));
        assert!(second.continues);
        assert_eq!(
            second.action,
            Some(ActionRequest::CreateMeeting {
                title: "Budget review".to_string(),
                start: at(13, 14, 0),
                end: at(13, 15, 0),
                attendees: vec!["alice@x.com".to_string()],
                location: None,
            })
        );
        assert!(ctx.pending().is_none());
    }

    #[test]
    fn greeting_mid_question_is_answered_not_used_as_title() {
        let assistant = assistant();
        let mut ctx = assistant.new_context("c1", at(12, 10, 0));
        assistant.respond(&mut ctx, "Schedule a meeting", &snapshot(0));
        assert!(ctx.pending().is_some());

        let reply = assistant.respond(&mut ctx, "hello", &snapshot(1));
        assert_eq!(reply.category, IntentCategory::GeneralChat);
        assert!(!reply.continues);
        assert!(reply.action.is_none());
        assert!(reply.text.starts_with("Hello!"), "{}", reply.text);
        assert!(ctx.pending().is_none());
    }

    #[test]
    fn far_out_offsets_and_lengths_are_questioned() {
        let assistant = assistant();

        let mut ctx = assistant.new_context("c1", at(12, 10, 0));
        let reply = assistant.respond(&mut ctx, "schedule sync in 99999999999 weeks", &snapshot(0));
        assert!(reply.action.is_none());
        assert_eq!(reply.awaiting, vec![Field::Date]);
        assert!(reply.text.contains("in 99999999999 weeks"), "{}", reply.text);

        let mut ctx = assistant.new_context("c2", at(12, 10, 0));
        let reply = assistant.respond(
            &mut ctx,
            "schedule sync tomorrow at 2pm for 99999999999 hours",
            &snapshot(0),
        );
        assert!(reply.action.is_none());
        assert_eq!(reply.awaiting, vec![Field::Duration]);

        let mut ctx = assistant.new_context("c3", at(12, 10, 0));
        let reply = assistant.respond(
            &mut ctx,
            "when am I free in the next 99999999999 days",
            &snapshot(0),
        );
        assert_eq!(reply.category, IntentCategory::QueryAvailability);
        assert!(reply.text.contains("the next 99999999999 days"), "{}", reply.text);
    }

    #[test]
    fn receipt_lets_a_pronoun_reach_the_new_meeting() {
        let assistant = assistant();
        let mut ctx = assistant.new_context("c1", at(12, 10, 0));
        let reply = assistant.respond(&mut ctx, "Schedule a budget review tomorrow at 2pm", &snapshot(0));
        let action = reply.action.unwrap();
        let receipt = Receipt {
            id: Some("evt-1".to_string()),
            message: "created".to_string(),
        };
        assert!(assistant.record_receipt(&mut ctx, &action, &receipt));

        let reply = assistant.respond(&mut ctx, "cancel it", &snapshot(1));
        assert_eq!(
            reply.action,
            Some(ActionRequest::DeleteMeeting {
                id: "evt-1".to_string()
            })
        );
    }

    #[test]
    fn numbered_choice_picks_the_meeting() {
        let assistant = assistant();
        let mut ctx = assistant.new_context("c1", at(12, 10, 0));
        let reply = assistant.respond(&mut ctx, "cancel the standup", &snapshot(0));
        assert_eq!(reply.awaiting, vec![Field::Target]);
        assert!(reply.text.contains("2. Standup (tomorrow at 11:00 AM)"), "{}", reply.text);

        let reply = assistant.respond(&mut ctx, "2", &snapshot(1));
        assert_eq!(
            reply.action,
            Some(ActionRequest::DeleteMeeting {
                id: "m4".to_string()
            })
        );
    }

    #[test]
    fn new_request_abandons_the_question() {
        let assistant = assistant();
        let mut ctx = assistant.new_context("c1", at(12, 10, 0));
        assistant.respond(&mut ctx, "Schedule a meeting", &snapshot(0));
        assert!(ctx.pending().is_some());

        let reply = assistant.respond(&mut ctx, "what tasks do I have?", &snapshot(1));
        assert_eq!(reply.category, IntentCategory::QueryTasks);
        assert_eq!(
            reply.action,
            Some(ActionRequest::Query {
                kind: QueryKind::Tasks
            })
        );
        assert!(ctx.pending().is_none());
    }

    #[test]
    fn never_mind_drops_the_question() {
        let assistant = assistant();
        let mut ctx = assistant.new_context("c1", at(12, 10, 0));
        assistant.respond(&mut ctx, "Schedule a meeting", &snapshot(0));
        let reply = assistant.respond(&mut ctx, "never mind", &snapshot(1));
        assert!(reply.text.starts_with("Okay"));
        assert!(ctx.pending().is_none());
    }

    #[test]
    fn unknown_recipient_is_asked_for_then_used() {
        let assistant = assistant();
        let mut ctx = assistant.new_context("c1", at(12, 10, 0));
        let reply = assistant.respond(&mut ctx, "email Dana that the deck is ready", &snapshot(0));
        assert_eq!(reply.text, "I don't have an email address for Dana. What is it?");
        assert_eq!(reply.awaiting, vec![Field::Recipients]);

        let reply = assistant.respond(&mut ctx, "dana@example.com", &snapshot(1));
        match reply.action {
            Some(ActionRequest::SendEmail { to, .. }) => assert_eq!(to, vec!["dana@example.com"]),
            other => panic!("expected an email, got {other:?}"),
        }
    }

    #[test]
    fn blank_input_changes_nothing() {
        let assistant = assistant();
        let mut ctx = assistant.new_context("c1", at(12, 10, 0));
        let reply = assistant.respond(&mut ctx, "   ", &snapshot(5));
        assert!(reply.action.is_none());
        assert!(ctx.recent_turns().is_empty());
        assert_eq!(ctx.last_active(), at(12, 10, 5));
    }

    #[test]
    fn receipt_for_a_query_is_ignored() {
        let assistant = assistant();
        let mut ctx = assistant.new_context("c1", at(12, 10, 0));
        let receipt = Receipt {
            id: Some("x".to_string()),
            message: String::new(),
        };
        let query = ActionRequest::Query {
            kind: QueryKind::Meetings,
        };
        assert!(!assistant.record_receipt(&mut ctx, &query, &receipt));
    }
}
