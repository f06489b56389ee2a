//! Interactive terminal front end.
//!
//! Usage: `execassist [snapshot.json]`
//!
//! With a snapshot file the workspace is seeded from it and the clock is
//! frozen at its `now`, which keeps demos reproducible. Without one the
//! workspace starts empty and the real clock is used.

use std::fs;
use std::io::{self, BufRead, Write};
use std::sync::Arc;

use chrono::Utc;
use log::info;
use uuid::Uuid;

use execassist::dashboard::suggestions;
use execassist::error::AssistantError;
use execassist::service::AssistantService;
use execassist::state::load_config_or_default;
use execassist::types::Snapshot;
use execassist::workspace::InMemoryWorkspace;

const HELP: &str = "Commands: :dashboard  :suggest  :new  :help  :quit";

#[tokio::main]
async fn main() -> Result<(), AssistantError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let config = load_config_or_default()?;
    let seed = match std::env::args().nth(1) {
        Some(path) => {
            let content = fs::read_to_string(&path)?;
            let snapshot: Snapshot = serde_json::from_str(&content)?;
            info!(
                "Seeded from {path}: {} meetings, {} tasks, {} emails",
                snapshot.meetings.len(),
                snapshot.tasks.len(),
                snapshot.emails.len()
            );
            Some(snapshot)
        }
        None => None,
    };

    let frozen = seed.as_ref().map(|s| s.now);
    let workspace = match &seed {
        Some(snapshot) => InMemoryWorkspace::from_snapshot(snapshot),
        None => InMemoryWorkspace::new(),
    };
    let tz = config.tz()?;
    let service = AssistantService::new(config, Arc::new(workspace))?;
    let mut conversation = Uuid::new_v4().to_string();

    println!("Hi! Ask me about your meetings, tasks or email. {HELP}");
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    loop {
        print!("> ");
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let now = frozen.unwrap_or_else(Utc::now);

        match line.trim() {
            ":quit" | ":q" => break,
            ":help" => println!("{HELP}"),
            ":new" => {
                service.end_conversation(&conversation);
                conversation = Uuid::new_v4().to_string();
                println!("Starting over.");
            }
            ":dashboard" => match service.dashboard(now).await {
                Ok(data) => println!("{}", serde_json::to_string_pretty(&data)?),
                Err(e) => println!("{e}. {}", e.recovery_suggestion()),
            },
            ":suggest" => {
                let snapshot = service.snapshot(now).await;
                let pending = snapshot.pending_tasks().count();
                for idea in suggestions(now.with_timezone(&tz), pending) {
                    println!("• {idea}");
                }
            }
            text => {
                let reply = service.handle_message_at(&conversation, text, now).await;
                println!("{}", reply.text);
            }
        }
        service.evict_idle(now);
    }

    Ok(())
}
