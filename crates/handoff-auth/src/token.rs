//! Mobile session tokens
//!
//! Tokens are 32 random bytes, URL-safe base64 encoded. Only their SHA-256
//! hash is stored, bound to the user and the session scope they were minted
//! for. A token stays valid until revoked; session expiry does not affect it.

use crate::session::{TokenPayload, UserSnapshot};
use crate::storage::{TokenBinding, TokenStore};
use crate::user::{User, UserDirectory};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use handoff_core::{Error, Result};
use rand::Rng;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info};

/// Attempts before giving up on a colliding token
const MINT_ATTEMPTS: usize = 3;

/// A freshly minted token. The plaintext exists only here.
#[derive(Debug, Clone)]
pub struct MintedToken {
    pub token: String,
    pub issued_at: DateTime<Utc>,
}

/// Mints bearer tokens and resolves them back to users
pub struct TokenIssuer {
    store: Arc<dyn TokenStore>,
    users: Arc<dyn UserDirectory>,
}

impl TokenIssuer {
    pub fn new(store: Arc<dyn TokenStore>, users: Arc<dyn UserDirectory>) -> Self {
        Self { store, users }
    }

    /// Mint an opaque token bound to `user_id` and `scope`
    pub async fn mint(&self, user_id: &str, scope: &str) -> Result<MintedToken> {
        if user_id.is_empty() || scope.is_empty() {
            return Err(Error::validation("user id and scope are required to mint a token"));
        }

        for _ in 0..MINT_ATTEMPTS {
            let token = generate_token();
            let issued_at = Utc::now();
            let binding = TokenBinding {
                user_id: user_id.to_string(),
                scope: scope.to_string(),
                issued_at,
                revoked_at: None,
            };
            match self.store.insert_token(&hash_token(&token), binding).await {
                Ok(()) => {
                    debug!("Minted token for user {} (scope {})", user_id, scope);
                    return Ok(MintedToken { token, issued_at });
                }
                Err(Error::Conflict(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(Error::Upstream("could not allocate a unique token".to_string()))
    }

    /// Mint a token and wrap it with a value copy of the user's current fields
    pub async fn issue_payload(&self, user: &User, session_id: &str) -> Result<TokenPayload> {
        let minted = self.mint(&user.id, session_id).await?;
        Ok(TokenPayload {
            mobile_session_token: minted.token,
            issued_at: minted.issued_at,
            session_id: session_id.to_string(),
            user: UserSnapshot::from(user),
        })
    }

    /// Resolve a token to its user's live record
    ///
    /// Unknown, revoked, or orphaned tokens resolve to `Ok(None)`; only
    /// backend failures are errors.
    pub async fn resolve(&self, token: &str) -> Result<Option<User>> {
        let Some(binding) = self.store.get_token(&hash_token(token)).await? else {
            return Ok(None);
        };
        if binding.is_revoked() {
            debug!("Rejected revoked token for user {}", binding.user_id);
            return Ok(None);
        }
        self.users.get_user(&binding.user_id).await
    }

    /// Revoke a token. Returns `false` if it was unknown or already revoked.
    pub async fn revoke(&self, token: &str) -> Result<bool> {
        let revoked = self.store.revoke_token(&hash_token(token)).await?;
        if revoked {
            info!("Revoked a mobile session token");
        }
        Ok(revoked)
    }
}

/// Generate a secure random token
fn generate_token() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 32] = rng.gen();
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Hash a token for storage
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}
