use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use log::{debug, info};
use tokio::sync::Mutex;

use crate::context::ConversationContext;
use crate::error::AssistantError;
use crate::types::Config;

/// Location of the config file: ~/.execassist/config.json
pub fn config_path() -> Result<PathBuf, AssistantError> {
    let home = dirs::home_dir()
        .ok_or_else(|| AssistantError::Configuration("Could not find home directory".into()))?;
    Ok(home.join(".execassist").join("config.json"))
}

/// Load and validate the config at the default location.
pub fn load_config() -> Result<Config, AssistantError> {
    load_config_from(&config_path()?)
}

pub fn load_config_from(path: &Path) -> Result<Config, AssistantError> {
    if !path.exists() {
        return Err(AssistantError::ConfigNotFound(path.to_path_buf()));
    }

    let content = fs::read_to_string(path)?;
    let config: Config = serde_json::from_str(&content)
        .map_err(|e| AssistantError::Configuration(format!("Failed to parse config: {e}")))?;
    config.validate()?;

    Ok(config)
}

/// The config at the default location, or the defaults when there is none.
///
/// A file that exists but is invalid is still an error.
pub fn load_config_or_default() -> Result<Config, AssistantError> {
    match load_config() {
        Err(AssistantError::ConfigNotFound(path)) => {
            info!("No config at {}, using defaults", path.display());
            Ok(Config::default())
        }
        other => other,
    }
}

pub fn save_config(config: &Config) -> Result<PathBuf, AssistantError> {
    let path = config_path()?;
    save_config_to(&path, config)?;
    Ok(path)
}

pub fn save_config_to(path: &Path, config: &Config) -> Result<(), AssistantError> {
    config.validate()?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(config)?;
    fs::write(path, content)?;
    Ok(())
}

/// Conversations keyed by id.
///
/// Each context sits behind its own async mutex so one conversation's
/// utterances are handled strictly in order while others proceed.
pub struct SessionStore {
    sessions: DashMap<String, Arc<Mutex<ConversationContext>>>,
    window: usize,
    idle: Duration,
}

impl SessionStore {
    pub fn new(window: usize, idle: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            window,
            idle,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.memory_window,
            Duration::minutes(config.session_idle_minutes as i64),
        )
    }

    /// The conversation's context, created on first use.
    ///
    /// An existing context is touched while its entry is held, so an eviction
    /// pass between this call and the caller's `lock()` keeps it.
    pub fn get_or_create(&self, id: &str, now: DateTime<Utc>) -> Arc<Mutex<ConversationContext>> {
        self.sessions
            .entry(id.to_string())
            .and_modify(|ctx| {
                if let Ok(mut ctx) = ctx.try_lock() {
                    ctx.touch(now);
                }
            })
            .or_insert_with(|| {
                debug!("Starting conversation {id}");
                Arc::new(Mutex::new(ConversationContext::new(id, self.window, now)))
            })
            .clone()
    }

    pub fn get(&self, id: &str) -> Option<Arc<Mutex<ConversationContext>>> {
        self.sessions.get(id).map(|entry| entry.value().clone())
    }

    pub fn remove(&self, id: &str) -> bool {
        self.sessions.remove(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Drop conversations idle for longer than the configured limit.
    ///
    /// A conversation whose lock is held is mid-utterance and always kept.
    pub fn evict_idle(&self, now: DateTime<Utc>) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, ctx| match ctx.try_lock() {
            Ok(ctx) => !ctx.is_idle(now, self.idle),
            Err(_) => true,
        });
        let evicted = before.saturating_sub(self.sessions.len());
        if evicted > 0 {
            info!("Evicted {evicted} idle conversation(s)");
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::types::ConflictPolicy;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 12, 10, 0, 0).unwrap()
    }

    #[test]
    fn empty_object_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{}").unwrap();

        let config = load_config_from(&path).unwrap();
        assert_eq!(config.timezone, "Europe/London");
        assert_eq!(config.work_hours_start, 9);
        assert_eq!(config.work_hours_end, 17);
        assert_eq!(config.memory_window, 10);
        assert_eq!(config.conflict_policy, ConflictPolicy::Warn);
    }

    #[test]
    fn save_then_load_keeps_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let mut config = Config::default();
        config.timezone = "America/New_York".to_string();
        config.conflict_policy = ConflictPolicy::Block;
        config
            .contacts
            .insert("Dana".to_string(), "dana@example.com".to_string());

        save_config_to(&path, &config).unwrap();
        let written = fs::read_to_string(&path).unwrap();
        assert!(written.contains("\"conflictPolicy\": \"block\""));

        let loaded = load_config_from(&path).unwrap();
        assert_eq!(loaded.timezone, "America/New_York");
        assert_eq!(loaded.conflict_policy, ConflictPolicy::Block);
        assert_eq!(loaded.contacts["Dana"], "dana@example.com");
    }

    #[test]
    fn missing_file_is_config_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_config_from(&dir.path().join("absent.json"));
        assert!(matches!(result, Err(AssistantError::ConfigNotFound(_))));
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        fs::write(&path, r#"{"timezone": "Mars/Olympus"}"#).unwrap();
        assert!(matches!(
            load_config_from(&path),
            Err(AssistantError::UnknownTimezone(_))
        ));

        fs::write(&path, r#"{"workHoursStart": 18, "workHoursEnd": 9}"#).unwrap();
        assert!(matches!(
            load_config_from(&path),
            Err(AssistantError::InvalidBusinessHours { .. })
        ));

        fs::write(&path, "not json").unwrap();
        assert!(matches!(
            load_config_from(&path),
            Err(AssistantError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        let store = SessionStore::new(10, Duration::minutes(30));
        let a = store.get_or_create("a", now());
        let b = store.get_or_create("b", now());
        assert_eq!(store.len(), 2);

        a.lock()
            .await
            .push_turn(crate::context::ConversationTurn::user("hello", now()));
        assert_eq!(a.lock().await.recent_turns().len(), 1);
        assert!(b.lock().await.recent_turns().is_empty());

        // same id returns the same context
        let again = store.get_or_create("a", now());
        assert!(Arc::ptr_eq(&a, &again));
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn idle_sessions_are_evicted() {
        let store = SessionStore::new(10, Duration::minutes(30));
        store.get_or_create("old", now());
        let fresh = store.get_or_create("fresh", now());
        fresh.lock().await.touch(now() + Duration::minutes(25));

        let evicted = store.evict_idle(now() + Duration::minutes(40));
        assert_eq!(evicted, 1);
        assert!(store.get("old").is_none());
        assert!(store.get("fresh").is_some());
    }

    #[tokio::test]
    async fn returning_to_a_conversation_keeps_it_alive() {
        let store = SessionStore::new(10, Duration::minutes(30));
        store.get_or_create("c1", now());
        let later = now() + Duration::hours(2);

        // handed out but not yet locked when the eviction pass runs
        let ctx = store.get_or_create("c1", later);
        assert_eq!(store.evict_idle(later), 0);
        let again = store.get("c1").unwrap();
        assert!(Arc::ptr_eq(&ctx, &again));
        assert_eq!(ctx.lock().await.last_active(), later);
    }

    #[tokio::test]
    async fn busy_sessions_survive_eviction() {
        let store = SessionStore::new(10, Duration::minutes(30));
        let ctx = store.get_or_create("busy", now());
        let _guard = ctx.lock().await;

        assert_eq!(store.evict_idle(now() + Duration::hours(2)), 0);
        assert!(store.remove("busy"));
        assert!(store.is_empty());
    }
}
