//! The collaborators behind the assistant: calendar, task list and mailbox.
//!
//! The core only ever sees them through [`Workspace`]. `InMemoryWorkspace` is
//! the reference implementation used by the CLI and the tests; a Google-backed
//! implementation plugs in at the same seam.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::AssistantError;
use crate::types::{
    ActionRequest, EmailSummary, MeetingInterval, Receipt, Snapshot, Source, Task,
};

/// Read and write access to the user's calendar, tasks and email.
///
/// Implementations must be safe to share between conversations.
#[async_trait]
pub trait Workspace: Send + Sync {
    /// Meetings overlapping `[from, to)`.
    async fn meetings(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<MeetingInterval>, AssistantError>;

    async fn tasks(&self) -> Result<Vec<Task>, AssistantError>;

    /// Recent and unread email.
    async fn emails(&self) -> Result<Vec<EmailSummary>, AssistantError>;

    /// Carry out a mutating request.
    async fn execute(&self, action: &ActionRequest) -> Result<Receipt, AssistantError>;
}

/// A message handed to the mailbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentEmail {
    pub id: String,
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Default)]
struct Store {
    meetings: Vec<MeetingInterval>,
    tasks: Vec<Task>,
    emails: Vec<EmailSummary>,
    outbox: Vec<SentEmail>,
    failing: HashSet<Source>,
}

impl Store {
    fn check(&self, source: Source) -> Result<(), AssistantError> {
        if self.failing.contains(&source) {
            warn!("{source} is failing");
            return Err(AssistantError::Timeout(source));
        }
        Ok(())
    }
}

/// Workspace kept in memory, seeded from a snapshot.
#[derive(Debug, Default)]
pub struct InMemoryWorkspace {
    inner: Mutex<Store>,
}

impl InMemoryWorkspace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        Self {
            inner: Mutex::new(Store {
                meetings: snapshot.meetings.clone(),
                tasks: snapshot.tasks.clone(),
                emails: snapshot.emails.clone(),
                ..Default::default()
            }),
        }
    }

    /// Make every call touching `source` fail until restored.
    pub async fn fail_source(&self, source: Source) {
        self.inner.lock().await.failing.insert(source);
    }

    pub async fn restore_source(&self, source: Source) {
        self.inner.lock().await.failing.remove(&source);
    }

    pub async fn outbox(&self) -> Vec<SentEmail> {
        self.inner.lock().await.outbox.clone()
    }
}

#[async_trait]
impl Workspace for InMemoryWorkspace {
    async fn meetings(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<MeetingInterval>, AssistantError> {
        let store = self.inner.lock().await;
        store.check(Source::Calendar)?;
        let mut found: Vec<MeetingInterval> = store
            .meetings
            .iter()
            .filter(|m| m.start() < to && from < m.end())
            .cloned()
            .collect();
        found.sort_by_key(|m| (m.start(), m.end()));
        Ok(found)
    }

    async fn tasks(&self) -> Result<Vec<Task>, AssistantError> {
        let store = self.inner.lock().await;
        store.check(Source::Tasks)?;
        Ok(store.tasks.clone())
    }

    async fn emails(&self) -> Result<Vec<EmailSummary>, AssistantError> {
        let store = self.inner.lock().await;
        store.check(Source::Email)?;
        Ok(store.emails.clone())
    }

    async fn execute(&self, action: &ActionRequest) -> Result<Receipt, AssistantError> {
        let mut store = self.inner.lock().await;
        if let Some(source) = action.source() {
            store.check(source)?;
        }
        debug!("executing {}", action.label());

        match action {
            ActionRequest::CreateMeeting {
                title,
                start,
                end,
                attendees,
                location,
            } => {
                let id = format!("evt-{}", Uuid::new_v4());
                let mut meeting = MeetingInterval::new(id.clone(), title.clone(), *start, *end)?
                    .with_attendees(attendees.clone());
                if let Some(location) = location {
                    meeting = meeting.with_location(location.clone());
                }
                store.meetings.push(meeting);
                Ok(Receipt {
                    id: Some(id),
                    message: format!("Created '{title}'"),
                })
            }
            ActionRequest::DeleteMeeting { id } => {
                let index = store
                    .meetings
                    .iter()
                    .position(|m| m.id() == id)
                    .ok_or_else(|| AssistantError::NotFound(format!("meeting {id}")))?;
                let removed = store.meetings.remove(index);
                Ok(Receipt {
                    id: Some(id.clone()),
                    message: format!("Cancelled '{}'", removed.title()),
                })
            }
            ActionRequest::CreateTask {
                title,
                due_date,
                description,
                priority,
            } => {
                let id = format!("task-{}", Uuid::new_v4());
                store.tasks.push(Task {
                    id: id.clone(),
                    title: title.clone(),
                    due: *due_date,
                    completed: false,
                    priority: priority.unwrap_or_default(),
                    description: description.clone().unwrap_or_default(),
                });
                Ok(Receipt {
                    id: Some(id),
                    message: format!("Added '{title}'"),
                })
            }
            ActionRequest::CompleteTask { id } => {
                let task = store
                    .tasks
                    .iter_mut()
                    .find(|t| &t.id == id)
                    .ok_or_else(|| AssistantError::NotFound(format!("task {id}")))?;
                task.completed = true;
                Ok(Receipt {
                    id: Some(id.clone()),
                    message: format!("Completed '{}'", task.title),
                })
            }
            ActionRequest::DeleteTask { id } => {
                let index = store
                    .tasks
                    .iter()
                    .position(|t| &t.id == id)
                    .ok_or_else(|| AssistantError::NotFound(format!("task {id}")))?;
                let removed = store.tasks.remove(index);
                Ok(Receipt {
                    id: Some(id.clone()),
                    message: format!("Deleted '{}'", removed.title),
                })
            }
            ActionRequest::SendEmail { to, subject, body } => {
                if to.is_empty() {
                    return Err(AssistantError::Rejected {
                        source_name: Source::Email,
                        message: "no recipients".to_string(),
                    });
                }
                let id = format!("msg-{}", Uuid::new_v4());
                store.outbox.push(SentEmail {
                    id: id.clone(),
                    to: to.clone(),
                    subject: subject.clone(),
                    body: body.clone(),
                });
                Ok(Receipt {
                    id: Some(id),
                    message: format!("Sent '{subject}'"),
                })
            }
            ActionRequest::Query { .. } => Ok(Receipt {
                id: None,
                message: "Nothing to execute".to_string(),
            }),
        }
    }
}
