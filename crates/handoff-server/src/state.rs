//! Shared application state

use crate::bearer::bearer_token;
use axum::http::HeaderMap;
use handoff_auth::{
    FileStorage, FileUserDirectory, PairingSessionManager, QrSessionManager, SessionStore,
    TokenIssuer, TokenStore, User, UserDirectory,
};
use handoff_core::{Config, Error, Result};
use std::sync::Arc;

/// Shared application state
pub struct AppState {
    /// Configuration
    pub config: Config,
    /// Pairing flow
    pub pairing: PairingSessionManager,
    /// QR flow
    pub qr: QrSessionManager,
    /// Token minting and resolution
    pub tokens: Arc<TokenIssuer>,
}

impl AppState {
    /// Create a new application state over the given backends
    pub fn new(
        config: Config,
        sessions: Arc<dyn SessionStore>,
        token_store: Arc<dyn TokenStore>,
        users: Arc<dyn UserDirectory>,
    ) -> Self {
        let tokens = Arc::new(TokenIssuer::new(token_store, users.clone()));
        let pairing = PairingSessionManager::new(
            sessions.clone(),
            tokens.clone(),
            users,
            config.pairing_ttl(),
        );
        let qr = QrSessionManager::new(
            sessions,
            tokens.clone(),
            config.providers.clone(),
            config.public_url.clone(),
            config.qr_ttl(),
        );

        Self {
            config,
            pairing,
            qr,
            tokens,
        }
    }

    /// State backed by a single [`FileStorage`] for sessions and tokens
    pub fn with_storage(
        config: Config,
        storage: Arc<FileStorage>,
        users: Arc<FileUserDirectory>,
    ) -> Self {
        Self::new(config, storage.clone(), storage, users)
    }

    /// Identify the caller from its bearer token
    ///
    /// A missing header or a token that resolves to nobody is `Unauthorized`;
    /// a malformed header is a `Validation` error.
    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<User> {
        let token = bearer_token(headers)?
            .ok_or_else(|| Error::Unauthorized("missing bearer token".to_string()))?;
        self.tokens
            .resolve(token)
            .await?
            .ok_or_else(|| Error::Unauthorized("invalid or revoked token".to_string()))
    }
}
