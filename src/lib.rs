//! A conversational executive assistant core.
//!
//! Free-text requests become calendar, task and email actions: entities are
//! extracted, an intent is routed against the conversation's memory, and the
//! scheduling agent either acts, asks one clarifying question or answers.

pub mod agent;
pub mod assistant;
pub mod availability;
pub mod context;
pub mod dashboard;
pub mod error;
pub mod helpers;
pub mod processor;
pub mod service;
pub mod state;
pub mod types;
pub mod workspace;

pub use assistant::{Assistant, Reply};
pub use error::AssistantError;
pub use service::AssistantService;
pub use workspace::{InMemoryWorkspace, Workspace};
