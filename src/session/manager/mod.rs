use crate::errors::{RelayError, RelayResult};
use crate::session::store::{ChatBinding, SessionStore};
use crate::utils::{atomic_write, ensure_dir};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

pub const SESSIONS_FILE: &str = "sessions.json";

/// JSON-file backed [`SessionStore`].
///
/// The whole store lives in one file. Every operation reloads it before
/// mutating, so edits made by another process between calls are picked up;
/// concurrent writers across processes are last-writer-wins.
pub struct FileSessionStore {
    path: PathBuf,
    cache: Mutex<BTreeMap<String, ChatBinding>>,
}

impl FileSessionStore {
    /// Open (or lazily create) `<data_dir>/sessions.json`.
    pub fn new(data_dir: &Path) -> RelayResult<Self> {
        ensure_dir(data_dir).map_err(|e| RelayError::persistence(format!("{:#}", e)))?;
        Ok(Self::at(data_dir.join(SESSIONS_FILE)))
    }

    /// Use an explicit file path without touching the filesystem.
    pub fn at(path: PathBuf) -> Self {
        Self {
            path,
            cache: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, ChatBinding>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", self.path.display()))
    }

    fn save(&self, bindings: &BTreeMap<String, ChatBinding>) -> Result<()> {
        let content = serde_json::to_string_pretty(bindings)?;
        atomic_write(&self.path, &content)
    }

    /// Run `f` against a freshly loaded copy of the store while holding the
    /// cache lock. The store is written back only when `f` reports a change.
    async fn mutate<T>(
        &self,
        f: impl FnOnce(&mut BTreeMap<String, ChatBinding>) -> (T, bool),
    ) -> RelayResult<T> {
        let mut cache = self.cache.lock().await;
        let mut bindings = self.load().map_err(persistence)?;
        let (out, changed) = f(&mut bindings);
        if changed {
            self.save(&bindings).map_err(persistence)?;
        }
        *cache = bindings;
        Ok(out)
    }
}

/// Oldest `last_used` that survives cleanup. A window reaching past the
/// representable range keeps every binding.
fn retention_cutoff(now: DateTime<Utc>, max_age_days: u32) -> DateTime<Utc> {
    Duration::try_days(i64::from(max_age_days))
        .and_then(|window| now.checked_sub_signed(window))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn persistence(e: anyhow::Error) -> RelayError {
    RelayError::persistence(format!("{:#}", e))
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn get_or_create(&self, chat_id: &str) -> RelayResult<String> {
        self.mutate(|bindings| {
            if let Some(binding) = bindings.get_mut(chat_id) {
                binding.touch();
                (binding.session_id.clone(), true)
            } else {
                debug!("creating binding for chat {}", chat_id);
                bindings.insert(chat_id.to_string(), ChatBinding::new(""));
                (String::new(), true)
            }
        })
        .await
    }

    async fn set_session_id(&self, chat_id: &str, session_id: &str) -> RelayResult<()> {
        self.mutate(|bindings| {
            bindings.insert(chat_id.to_string(), ChatBinding::new(session_id));
            ((), true)
        })
        .await
    }

    async fn delete(&self, chat_id: &str) -> RelayResult<()> {
        self.mutate(|bindings| ((), bindings.remove(chat_id).is_some()))
            .await
    }

    async fn cleanup(&self, max_age_days: u32) -> RelayResult<usize> {
        let cutoff = retention_cutoff(Utc::now(), max_age_days);
        let removed = self
            .mutate(|bindings| {
                let before = bindings.len();
                bindings.retain(|_, b| b.last_used >= cutoff);
                let removed = before - bindings.len();
                (removed, removed > 0)
            })
            .await?;
        if removed > 0 {
            info!(
                "removed {} session binding(s) idle for more than {} days",
                removed, max_age_days
            );
        }
        Ok(removed)
    }

    async fn all(&self) -> RelayResult<BTreeMap<String, ChatBinding>> {
        self.mutate(|bindings| (bindings.clone(), false)).await
    }
}
