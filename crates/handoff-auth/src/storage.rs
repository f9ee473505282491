//! Session and token storage
//!
//! [`SessionStore`] and [`TokenStore`] are the seams the managers are built
//! against, so several server processes can share one durable backend.
//! [`FileStorage`] keeps everything in a single JSON document
//! (`sessions.json`) with one collection per session kind.

use crate::session::{DeviceInfo, SessionKind, SessionRecord, SessionStatus, TokenPayload};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use handoff_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Atomic, single-record state transitions for session records
///
/// Every transition is a compare-and-set on the stored status: of two
/// concurrent callers, exactly one succeeds and the other gets
/// [`Error::Conflict`]. Reads never fail on a missing record.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Store a freshly created record. Fails with `Conflict` if the id is taken.
    async fn insert_session(&self, record: SessionRecord) -> Result<()>;

    /// Look up a session within its flow
    async fn get_session(&self, session_id: &str, kind: SessionKind)
        -> Result<Option<SessionRecord>>;

    /// QR only: pending → authenticating if still pending and unexpired
    async fn transition_to_authenticating(
        &self,
        session_id: &str,
        provider: &str,
    ) -> Result<SessionRecord>;

    /// {pending, authenticating} → complete with `payload`
    async fn complete_session(
        &self,
        session_id: &str,
        kind: SessionKind,
        payload: TokenPayload,
    ) -> Result<SessionRecord>;

    /// Complete only if the stored status still equals `expected`, so a
    /// caller that checked the status can't act on a stale read
    async fn complete_session_from(
        &self,
        session_id: &str,
        kind: SessionKind,
        expected: SessionStatus,
        payload: TokenPayload,
    ) -> Result<SessionRecord>;

    /// {pending, authenticating} → failed
    async fn fail_session(
        &self,
        session_id: &str,
        kind: SessionKind,
        error: &str,
    ) -> Result<SessionRecord>;

    /// Swap the token of a complete session, returning the payload it replaced.
    /// Fails with `Conflict` unless the installed token is `expected_token`.
    async fn replace_tokens(
        &self,
        session_id: &str,
        kind: SessionKind,
        expected_token: &str,
        payload: TokenPayload,
    ) -> Result<TokenPayload>;

    async fn create_pairing_session(
        &self,
        client_id: &str,
        ttl: Duration,
    ) -> Result<SessionRecord> {
        let record = SessionRecord::new_pairing(client_id, ttl)?;
        self.insert_session(record.clone()).await?;
        Ok(record)
    }

    async fn create_qr_session(
        &self,
        client_id: &str,
        device_type: &str,
        device_info: Option<DeviceInfo>,
        ttl: Duration,
    ) -> Result<SessionRecord> {
        let record = SessionRecord::new_qr(client_id, device_type, device_info, ttl)?;
        self.insert_session(record.clone()).await?;
        Ok(record)
    }
}

/// What a minted token resolves back to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenBinding {
    pub user_id: String,
    /// Session (or other scope) the token was minted for
    pub scope: String,
    pub issued_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revoked_at: Option<DateTime<Utc>>,
}

impl TokenBinding {
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }
}

/// Registry of minted tokens, keyed by token hash
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Record a new binding. Fails with `Conflict` if the hash already exists.
    async fn insert_token(&self, token_hash: &str, binding: TokenBinding) -> Result<()>;

    async fn get_token(&self, token_hash: &str) -> Result<Option<TokenBinding>>;

    /// Mark a token revoked. Returns `false` if unknown or already revoked.
    async fn revoke_token(&self, token_hash: &str) -> Result<bool>;
}

/// Stored data structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredData {
    #[serde(default)]
    pairing_sessions: HashMap<String, SessionRecord>,
    #[serde(default)]
    qr_sessions: HashMap<String, SessionRecord>,
    #[serde(default)]
    tokens: HashMap<String, TokenBinding>,
}

impl StoredData {
    fn sessions(&self, kind: SessionKind) -> &HashMap<String, SessionRecord> {
        match kind {
            SessionKind::Pairing => &self.pairing_sessions,
            SessionKind::Qr => &self.qr_sessions,
        }
    }

    fn sessions_mut(&mut self, kind: SessionKind) -> &mut HashMap<String, SessionRecord> {
        match kind {
            SessionKind::Pairing => &mut self.pairing_sessions,
            SessionKind::Qr => &mut self.qr_sessions,
        }
    }
}

/// Session and token storage with optional file persistence
pub struct FileStorage {
    /// Path to the storage file; `None` keeps everything in memory
    path: Option<PathBuf>,
    data: RwLock<StoredData>,
}

impl FileStorage {
    /// Storage that never touches disk
    pub fn in_memory() -> Self {
        Self {
            path: None,
            data: RwLock::new(StoredData::default()),
        }
    }

    /// Create storage at a specific path
    ///
    /// Loads existing data from disk if present.
    pub fn with_path(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let data = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            match serde_json::from_str(&contents) {
                Ok(data) => {
                    info!("Loaded session storage from {:?}", path);
                    data
                }
                Err(e) => {
                    warn!("Failed to parse session storage, starting fresh: {}", e);
                    StoredData::default()
                }
            }
        } else {
            debug!("No existing session storage, creating new");
            StoredData::default()
        };

        Ok(Self {
            path: Some(path),
            data: RwLock::new(data),
        })
    }

    /// Write the whole document. Called with the write lock held.
    fn persist(&self, data: &StoredData) -> Result<()> {
        if let Some(path) = &self.path {
            let json = serde_json::to_string_pretty(data)?;
            std::fs::write(path, json)?;
            debug!("Saved session storage to {:?}", path);
        }
        Ok(())
    }

    /// Apply `change` to one record under the write lock and persist it.
    /// The record is restored if persisting fails.
    async fn mutate<T, F>(&self, session_id: &str, kind: SessionKind, change: F) -> Result<T>
    where
        F: FnOnce(&mut SessionRecord) -> Result<T> + Send,
        T: Send,
    {
        let mut data = self.data.write().await;
        let record = data
            .sessions_mut(kind)
            .get_mut(session_id)
            .ok_or_else(Error::session_not_found)?;

        let previous = record.clone();
        let output = change(record)?;

        if let Err(e) = self.persist(&data) {
            data.sessions_mut(kind).insert(session_id.to_string(), previous);
            return Err(e);
        }
        Ok(output)
    }

    /// Number of stored sessions of a kind, expired ones included
    pub async fn session_count(&self, kind: SessionKind) -> usize {
        self.data.read().await.sessions(kind).len()
    }
}

#[async_trait]
impl SessionStore for FileStorage {
    async fn insert_session(&self, record: SessionRecord) -> Result<()> {
        let mut data = self.data.write().await;
        let sessions = data.sessions_mut(record.kind);
        if sessions.contains_key(&record.session_id) {
            return Err(Error::conflict("Session id already in use"));
        }
        let (id, kind) = (record.session_id.clone(), record.kind);
        sessions.insert(id.clone(), record);

        if let Err(e) = self.persist(&data) {
            data.sessions_mut(kind).remove(&id);
            return Err(e);
        }
        Ok(())
    }

    async fn get_session(
        &self,
        session_id: &str,
        kind: SessionKind,
    ) -> Result<Option<SessionRecord>> {
        Ok(self.data.read().await.sessions(kind).get(session_id).cloned())
    }

    async fn transition_to_authenticating(
        &self,
        session_id: &str,
        provider: &str,
    ) -> Result<SessionRecord> {
        self.mutate(session_id, SessionKind::Qr, |record| {
            record.begin_authenticating(provider, Utc::now())?;
            Ok(record.clone())
        })
        .await
    }

    async fn complete_session(
        &self,
        session_id: &str,
        kind: SessionKind,
        payload: TokenPayload,
    ) -> Result<SessionRecord> {
        self.mutate(session_id, kind, |record| {
            record.complete(payload)?;
            Ok(record.clone())
        })
        .await
    }

    async fn complete_session_from(
        &self,
        session_id: &str,
        kind: SessionKind,
        expected: SessionStatus,
        payload: TokenPayload,
    ) -> Result<SessionRecord> {
        self.mutate(session_id, kind, |record| {
            record.complete_from(expected, payload)?;
            Ok(record.clone())
        })
        .await
    }

    async fn fail_session(
        &self,
        session_id: &str,
        kind: SessionKind,
        error: &str,
    ) -> Result<SessionRecord> {
        self.mutate(session_id, kind, |record| {
            record.fail(error)?;
            Ok(record.clone())
        })
        .await
    }

    async fn replace_tokens(
        &self,
        session_id: &str,
        kind: SessionKind,
        expected_token: &str,
        payload: TokenPayload,
    ) -> Result<TokenPayload> {
        self.mutate(session_id, kind, |record| {
            record.replace_tokens(expected_token, payload)
        })
        .await
    }
}

#[async_trait]
impl TokenStore for FileStorage {
    async fn insert_token(&self, token_hash: &str, binding: TokenBinding) -> Result<()> {
        let mut data = self.data.write().await;
        if data.tokens.contains_key(token_hash) {
            return Err(Error::conflict("Token already issued"));
        }
        data.tokens.insert(token_hash.to_string(), binding);

        if let Err(e) = self.persist(&data) {
            data.tokens.remove(token_hash);
            return Err(e);
        }
        Ok(())
    }

    async fn get_token(&self, token_hash: &str) -> Result<Option<TokenBinding>> {
        Ok(self.data.read().await.tokens.get(token_hash).cloned())
    }

    async fn revoke_token(&self, token_hash: &str) -> Result<bool> {
        let mut data = self.data.write().await;
        let Some(binding) = data.tokens.get_mut(token_hash) else {
            return Ok(false);
        };
        if binding.is_revoked() {
            return Ok(false);
        }
        binding.revoked_at = Some(Utc::now());

        if let Err(e) = self.persist(&data) {
            if let Some(binding) = data.tokens.get_mut(token_hash) {
                binding.revoked_at = None;
            }
            return Err(e);
        }
        Ok(true)
    }
}
