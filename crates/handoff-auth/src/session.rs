//! Session records and their state machine
//!
//! A session is created pending by the requesting device and moves along
//! `pending → authenticating → complete | failed` (pairing sessions skip
//! `authenticating`). `expired` is never stored; it is derived from
//! `expires_at` every time a record is read.

use crate::user::User;
use chrono::{DateTime, Utc};
use handoff_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Which handoff flow a session belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    Pairing,
    Qr,
}

impl std::fmt::Display for SessionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionKind::Pairing => write!(f, "pairing"),
            SessionKind::Qr => write!(f, "qr"),
        }
    }
}

/// Stored status of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Pending,
    Authenticating,
    Complete,
    Failed,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Complete | SessionStatus::Failed)
    }

    /// Edges of the state machine. Nothing leaves a terminal state.
    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        matches!(
            (self, next),
            (Pending, Authenticating)
                | (Pending, Complete)
                | (Pending, Failed)
                | (Authenticating, Complete)
                | (Authenticating, Failed)
        )
    }
}

/// Status as seen by a reader at a given instant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObservedStatus {
    Pending,
    Authenticating,
    Complete,
    Failed,
    Expired,
}

impl From<SessionStatus> for ObservedStatus {
    fn from(status: SessionStatus) -> Self {
        match status {
            SessionStatus::Pending => ObservedStatus::Pending,
            SessionStatus::Authenticating => ObservedStatus::Authenticating,
            SessionStatus::Complete => ObservedStatus::Complete,
            SessionStatus::Failed => ObservedStatus::Failed,
        }
    }
}

/// Display-only metadata about the requesting device (QR sessions)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
}

/// Immutable copy of a user's authorization-relevant fields at mint time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSnapshot {
    pub id: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub approved: bool,
    pub limited_access: bool,
    pub admin: bool,
}

impl From<&User> for UserSnapshot {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            email: user.email.clone(),
            name: user.name.clone(),
            image: user.image.clone(),
            approved: user.approved,
            limited_access: user.limited_access,
            admin: user.admin,
        }
    }
}

/// Token payload embedded in a completed session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPayload {
    pub mobile_session_token: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub issued_at: DateTime<Utc>,
    /// Session this token was minted for; never changes across refreshes
    pub session_id: String,
    pub user: UserSnapshot,
}

/// A stored session record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub session_id: String,
    pub kind: SessionKind,
    pub client_id: String,
    pub status: SessionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_info: Option<DeviceInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub tokens: Option<TokenPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Generate an unguessable session id
pub fn generate_session_id() -> String {
    Uuid::new_v4().to_string()
}

impl SessionRecord {
    /// A new pending pairing session
    pub fn new_pairing(client_id: &str, ttl: Duration) -> Result<Self> {
        Self::new(SessionKind::Pairing, client_id, None, None, ttl)
    }

    /// A new pending QR session
    pub fn new_qr(
        client_id: &str,
        device_type: &str,
        device_info: Option<DeviceInfo>,
        ttl: Duration,
    ) -> Result<Self> {
        let device_type = device_type.trim();
        if device_type.is_empty() {
            return Err(Error::validation("deviceType is required"));
        }
        Self::new(
            SessionKind::Qr,
            client_id,
            Some(device_type.to_string()),
            device_info,
            ttl,
        )
    }

    fn new(
        kind: SessionKind,
        client_id: &str,
        device_type: Option<String>,
        device_info: Option<DeviceInfo>,
        ttl: Duration,
    ) -> Result<Self> {
        let client_id = client_id.trim();
        if client_id.is_empty() {
            return Err(Error::validation("clientId is required"));
        }
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|_| Error::validation("session TTL out of range"))?;
        let now = Utc::now();

        Ok(Self {
            session_id: generate_session_id(),
            kind,
            client_id: client_id.to_string(),
            status: SessionStatus::Pending,
            device_type,
            device_info,
            provider: None,
            created_at: now,
            expires_at: now + ttl,
            tokens: None,
            error: None,
        })
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Status a reader should report at `now`
    pub fn observed_status_at(&self, now: DateTime<Utc>) -> ObservedStatus {
        if self.is_expired_at(now) {
            ObservedStatus::Expired
        } else {
            self.status.into()
        }
    }

    pub fn observed_status(&self) -> ObservedStatus {
        self.observed_status_at(Utc::now())
    }

    fn transition(&mut self, next: SessionStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(Error::conflict(format!(
                "Session is {:?}, cannot move to {:?}",
                self.status, next
            )));
        }
        self.status = next;
        Ok(())
    }

    /// pending → authenticating, recording the chosen provider
    pub fn begin_authenticating(&mut self, provider: &str, now: DateTime<Utc>) -> Result<()> {
        if self.status != SessionStatus::Pending || self.is_expired_at(now) {
            return Err(Error::conflict("Session is not pending"));
        }
        self.transition(SessionStatus::Authenticating)?;
        self.provider = Some(provider.to_string());
        Ok(())
    }

    /// {pending, authenticating} → complete with the given tokens
    pub fn complete(&mut self, payload: TokenPayload) -> Result<()> {
        if payload.session_id != self.session_id {
            return Err(Error::conflict("Token payload is bound to another session"));
        }
        self.transition(SessionStatus::Complete)?;
        self.tokens = Some(payload);
        Ok(())
    }

    /// Complete only if the stored status is still `expected`
    pub fn complete_from(&mut self, expected: SessionStatus, payload: TokenPayload) -> Result<()> {
        if self.status != expected {
            return Err(Error::conflict(format!(
                "Session is {:?}, expected {:?}",
                self.status, expected
            )));
        }
        self.complete(payload)
    }

    /// {pending, authenticating} → failed with an error message
    pub fn fail(&mut self, message: &str) -> Result<()> {
        self.transition(SessionStatus::Failed)?;
        self.error = Some(message.to_string());
        Ok(())
    }

    /// Swap the token of a complete session, returning the previous payload
    ///
    /// Only succeeds while the installed token is still `expected_token`, so
    /// of two overlapping refreshes the second one conflicts.
    pub fn replace_tokens(
        &mut self,
        expected_token: &str,
        payload: TokenPayload,
    ) -> Result<TokenPayload> {
        if self.status != SessionStatus::Complete {
            return Err(Error::conflict("Session is not complete"));
        }
        if payload.session_id != self.session_id {
            return Err(Error::conflict("Token payload is bound to another session"));
        }
        match &self.tokens {
            Some(current) if current.mobile_session_token == expected_token => {}
            Some(_) => return Err(Error::conflict("Session token was already rotated")),
            None => return Err(Error::conflict("Session has no tokens to replace")),
        }
        self.tokens
            .replace(payload)
            .ok_or_else(|| Error::conflict("Session has no tokens to replace"))
    }
}
