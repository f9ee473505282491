//! QR sessions
//!
//! The requesting device registers and renders the session id as a QR code.
//! The approving device scans it, reads the unauthenticated [`QrSessionInfo`]
//! to show what is asking for access, and then either:
//! - approves directly when already signed in, or
//! - picks an identity provider (`begin_authenticating`), signs in there, and
//!   the provider's return path completes the session.
//!
//! Meanwhile the requesting device polls [`QrSessionManager::check_status`].

use crate::guard::{complete_for, load_live, require};
use crate::session::{
    DeviceInfo, ObservedStatus, SessionKind, SessionRecord, SessionStatus, TokenPayload,
};
use crate::storage::SessionStore;
use crate::token::TokenIssuer;
use crate::user::User;
use chrono::{DateTime, Utc};
use handoff_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Response to a QR registration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrRegistration {
    pub qr_session_id: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub expires_at: DateTime<Utc>,
}

/// Public projection of a QR session. Never carries tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrSessionInfo {
    pub qr_session_id: String,
    pub client_id: String,
    pub device_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_info: Option<DeviceInfo>,
    pub status: ObservedStatus,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub expires_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

/// Where to send the approving device to sign in
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthRedirect {
    pub auth_url: String,
    pub qr_session_id: String,
    pub provider: String,
    pub status: ObservedStatus,
}

/// What a polling requesting device sees
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrStatus {
    pub qr_session_id: String,
    pub status: ObservedStatus,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub expires_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<TokenPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Orchestrates the QR flow
pub struct QrSessionManager {
    store: Arc<dyn SessionStore>,
    tokens: Arc<TokenIssuer>,
    providers: Vec<String>,
    public_url: String,
    ttl: Duration,
}

impl QrSessionManager {
    pub fn new(
        store: Arc<dyn SessionStore>,
        tokens: Arc<TokenIssuer>,
        providers: Vec<String>,
        public_url: String,
        ttl: Duration,
    ) -> Self {
        Self {
            store,
            tokens,
            providers,
            public_url: public_url.trim_end_matches('/').to_string(),
            ttl,
        }
    }

    /// Start a new QR session for a requesting device
    pub async fn register(
        &self,
        client_id: &str,
        device_type: &str,
        device_info: Option<DeviceInfo>,
    ) -> Result<QrRegistration> {
        let record = self
            .store
            .create_qr_session(client_id, device_type, device_info, self.ttl)
            .await?;
        info!(
            "Registered QR session {} for client {} ({})",
            record.session_id,
            record.client_id,
            record.device_type.as_deref().unwrap_or("unknown")
        );
        Ok(QrRegistration {
            qr_session_id: record.session_id,
            expires_at: record.expires_at,
        })
    }

    /// Unauthenticated view for whoever scanned the code
    pub async fn info(&self, qr_session_id: &str) -> Result<QrSessionInfo> {
        require("qrSessionId", qr_session_id)?;

        let record = self
            .store
            .get_session(qr_session_id, SessionKind::Qr)
            .await?
            .ok_or_else(Error::session_not_found)?;

        Ok(QrSessionInfo {
            status: record.observed_status(),
            qr_session_id: record.session_id,
            client_id: record.client_id,
            device_type: record.device_type.unwrap_or_default(),
            device_info: record.device_info,
            expires_at: record.expires_at,
            created_at: record.created_at,
        })
    }

    /// Whether `provider` is on the allow-list
    pub fn supports_provider(&self, provider: &str) -> bool {
        self.providers.iter().any(|p| p == provider)
    }

    /// Record the provider the approving device chose and lock the session
    /// against a second, racing choice
    pub async fn begin_authenticating(
        &self,
        qr_session_id: &str,
        provider: &str,
    ) -> Result<AuthRedirect> {
        require("qrSessionId", qr_session_id)?;
        require("provider", provider)?;

        let provider = provider.trim().to_lowercase();
        if !self.supports_provider(&provider) {
            return Err(Error::validation(format!(
                "Unsupported provider: {}",
                provider
            )));
        }

        let record = self
            .store
            .transition_to_authenticating(qr_session_id, &provider)
            .await
            .map_err(|e| {
                if matches!(e, Error::Conflict(_)) {
                    warn!("Rejected provider choice for QR session {}", qr_session_id);
                }
                e
            })?;

        info!(
            "QR session {} authenticating via {}",
            record.session_id, provider
        );
        Ok(AuthRedirect {
            auth_url: format!(
                "{}/auth/{}?qrSessionId={}",
                self.public_url,
                provider,
                urlencoding::encode(&record.session_id)
            ),
            qr_session_id: record.session_id,
            provider,
            status: ObservedStatus::Authenticating,
        })
    }

    /// Complete a pending session on behalf of an already signed-in approver
    ///
    /// Only `pending` sessions qualify: a session left `authenticating` by a
    /// provider attempt must finish through that provider.
    pub async fn approve(&self, qr_session_id: &str, approver: &User) -> Result<()> {
        require("qrSessionId", qr_session_id)?;

        let record = load_live(self.store.as_ref(), qr_session_id, SessionKind::Qr).await?;
        if record.status != SessionStatus::Pending {
            warn!(
                "Rejected approval of QR session {} in state {:?}",
                qr_session_id, record.status
            );
            return Err(Error::conflict("Session is not pending"));
        }

        complete_for(self.store.as_ref(), &self.tokens, &record, approver).await?;
        Ok(())
    }

    /// Provider return path: complete an authenticating session for `user`
    pub async fn complete_with_provider(
        &self,
        qr_session_id: &str,
        provider: &str,
        user: &User,
    ) -> Result<()> {
        require("qrSessionId", qr_session_id)?;
        let record = self.authenticating_via(qr_session_id, provider).await?;
        complete_for(self.store.as_ref(), &self.tokens, &record, user).await?;
        Ok(())
    }

    /// Provider return path: sign-in failed, fail the session
    pub async fn fail(&self, qr_session_id: &str, provider: &str, message: &str) -> Result<()> {
        require("qrSessionId", qr_session_id)?;
        require("error", message)?;

        self.authenticating_via(qr_session_id, provider).await?;
        self.store
            .fail_session(qr_session_id, SessionKind::Qr, message)
            .await?;
        warn!("QR session {} failed: {}", qr_session_id, message);
        Ok(())
    }

    async fn authenticating_via(
        &self,
        qr_session_id: &str,
        provider: &str,
    ) -> Result<SessionRecord> {
        let record = load_live(self.store.as_ref(), qr_session_id, SessionKind::Qr).await?;
        let provider = provider.trim().to_lowercase();
        if record.status != SessionStatus::Authenticating
            || record.provider.as_deref() != Some(provider.as_str())
        {
            return Err(Error::conflict(
                "Session is not authenticating with this provider",
            ));
        }
        Ok(record)
    }

    /// Poll a session. Tokens appear only while complete and unexpired.
    pub async fn check_status(&self, qr_session_id: &str) -> Result<QrStatus> {
        require("qrSessionId", qr_session_id)?;

        let record = self
            .store
            .get_session(qr_session_id, SessionKind::Qr)
            .await?
            .ok_or_else(Error::session_not_found)?;

        let status = record.observed_status();
        Ok(QrStatus {
            qr_session_id: record.session_id,
            status,
            expires_at: record.expires_at,
            tokens: record.tokens.filter(|_| status == ObservedStatus::Complete),
            error: record.error.filter(|_| status == ObservedStatus::Failed),
        })
    }
}
