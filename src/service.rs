//! The assistant wired to a workspace: gathers a snapshot, runs one
//! conversational turn under the conversation's lock and executes whatever
//! the turn decided.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};

use crate::assistant::{Assistant, Reply};
use crate::availability::local_day_bounds;
use crate::dashboard::{build_dashboard, DashboardData};
use crate::error::{AssistantError, ErrorReply};
use crate::helpers::capitalize_first;
use crate::state::SessionStore;
use crate::types::{Config, Snapshot, Source};
use crate::workspace::Workspace;

/// Meetings further out than this are never needed to answer a message.
const SNAPSHOT_DAYS: i64 = 30;

pub struct AssistantService<W: Workspace> {
    assistant: Assistant,
    workspace: Arc<W>,
    sessions: SessionStore,
}

impl<W: Workspace> AssistantService<W> {
    pub fn new(config: Config, workspace: Arc<W>) -> Result<Self, AssistantError> {
        let sessions = SessionStore::from_config(&config);
        Ok(Self {
            assistant: Assistant::new(config)?,
            workspace,
            sessions,
        })
    }

    pub fn config(&self) -> &Config {
        self.assistant.config()
    }

    pub fn workspace(&self) -> &W {
        &self.workspace
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub async fn handle_message(&self, conversation_id: &str, text: &str) -> Reply {
        self.handle_message_at(conversation_id, text, Utc::now()).await
    }

    /// Handle one utterance as of `now`.
    ///
    /// Utterances of the same conversation are processed one at a time; the
    /// snapshot is read after taking the lock so each turn sees the effects
    /// of the one before it.
    pub async fn handle_message_at(
        &self,
        conversation_id: &str,
        text: &str,
        now: DateTime<Utc>,
    ) -> Reply {
        let session = self.sessions.get_or_create(conversation_id, now);
        let mut ctx = session.lock().await;

        let snapshot = self.snapshot(now).await;
        let mut reply = self.assistant.respond(&mut ctx, text, &snapshot);

        let Some(action) = reply.action.clone().filter(|a| a.is_mutating()) else {
            return reply;
        };

        match self.workspace.execute(&action).await {
            Ok(receipt) => {
                debug!(
                    "conversation {conversation_id}: {} -> {:?}",
                    action.label(),
                    receipt.id
                );
                self.assistant.record_receipt(&mut ctx, &action, &receipt);
            }
            Err(e) => {
                warn!("conversation {conversation_id}: {} failed: {e}", action.label());
                reply.text = format!(
                    "Sorry, that didn't go through. {}. {}",
                    capitalize_first(&e.to_string()),
                    e.recovery_suggestion()
                );
                reply.conflicts.clear();
                reply.error = Some(ErrorReply::from(&e));
                ctx.amend_reply(reply.text.clone());
            }
        }
        reply
    }

    /// Read everything a turn might need. A source that fails is marked
    /// unavailable rather than failing the turn.
    pub async fn snapshot(&self, now: DateTime<Utc>) -> Snapshot {
        let tz = self.assistant.config().tz().unwrap_or(chrono_tz::Tz::UTC);
        let today = now.with_timezone(&tz).date_naive();
        let from = local_day_bounds(today, &tz).start;
        let days = SNAPSHOT_DAYS.max(self.config().availability_days as i64 + 1);
        let to = now + Duration::days(days);

        let (meetings, tasks, emails) = tokio::join!(
            self.workspace.meetings(from, to),
            self.workspace.tasks(),
            self.workspace.emails(),
        );

        let mut snapshot = Snapshot::new(now);
        match meetings {
            Ok(meetings) => snapshot.meetings = meetings,
            Err(e) => mark_unavailable(&mut snapshot, Source::Calendar, &e),
        }
        match tasks {
            Ok(tasks) => snapshot.tasks = tasks,
            Err(e) => mark_unavailable(&mut snapshot, Source::Tasks, &e),
        }
        match emails {
            Ok(emails) => snapshot.emails = emails,
            Err(e) => mark_unavailable(&mut snapshot, Source::Email, &e),
        }
        snapshot
    }

    pub async fn dashboard(&self, now: DateTime<Utc>) -> Result<DashboardData, AssistantError> {
        let snapshot = self.snapshot(now).await;
        build_dashboard(&snapshot, self.config())
    }

    pub fn evict_idle(&self, now: DateTime<Utc>) -> usize {
        self.sessions.evict_idle(now)
    }

    /// Forget a conversation entirely.
    pub fn end_conversation(&self, conversation_id: &str) -> bool {
        let removed = self.sessions.remove(conversation_id);
        if removed {
            info!("conversation {conversation_id} ended");
        }
        removed
    }
}

fn mark_unavailable(snapshot: &mut Snapshot, source: Source, error: &AssistantError) {
    warn!("Could not read {source}: {error}");
    snapshot.unavailable.push(source);
}
