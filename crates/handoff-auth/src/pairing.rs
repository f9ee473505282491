//! Pairing sessions
//!
//! Implements the no-code handoff:
//! 1. The requesting device registers and receives a session id
//! 2. The id reaches the approving device out of band
//! 3. The approving device, signed in, approves the session
//! 4. The requesting device's next poll returns the mobile session token
//! 5. Later refreshes rotate the token and re-read the user's live flags

use crate::guard::{complete_for, load_live, require};
use crate::session::{SessionKind, SessionStatus, TokenPayload, UserSnapshot};
use crate::storage::SessionStore;
use crate::token::TokenIssuer;
use crate::user::{User, UserDirectory};
use chrono::{DateTime, Utc};
use handoff_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Response to a pairing registration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingRegistration {
    pub session_id: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub expires_at: DateTime<Utc>,
}

/// What a polling requesting device sees
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum PairingStatus {
    Pending,
    Expired,
    Complete { tokens: TokenPayload },
    Failed { error: String },
}

/// A rotated token and the user's current record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshedToken {
    pub mobile_session_token: String,
    pub user: UserSnapshot,
}

/// Orchestrates the pairing flow
pub struct PairingSessionManager {
    store: Arc<dyn SessionStore>,
    tokens: Arc<TokenIssuer>,
    users: Arc<dyn UserDirectory>,
    ttl: Duration,
}

impl PairingSessionManager {
    pub fn new(
        store: Arc<dyn SessionStore>,
        tokens: Arc<TokenIssuer>,
        users: Arc<dyn UserDirectory>,
        ttl: Duration,
    ) -> Self {
        Self {
            store,
            tokens,
            users,
            ttl,
        }
    }

    /// Start a new pairing session for a requesting device
    pub async fn register(&self, client_id: &str) -> Result<PairingRegistration> {
        let record = self.store.create_pairing_session(client_id, self.ttl).await?;
        info!(
            "Registered pairing session {} for client {}",
            record.session_id, record.client_id
        );
        Ok(PairingRegistration {
            session_id: record.session_id,
            expires_at: record.expires_at,
        })
    }

    /// Poll a session. Unknown sessions read as expired.
    pub async fn check_status(&self, session_id: &str) -> Result<PairingStatus> {
        require("sessionId", session_id)?;

        let Some(record) = self.store.get_session(session_id, SessionKind::Pairing).await? else {
            return Ok(PairingStatus::Expired);
        };
        if record.is_expired() {
            return Ok(PairingStatus::Expired);
        }

        Ok(match (record.status, record.tokens, record.error) {
            (SessionStatus::Complete, Some(tokens), _) => PairingStatus::Complete { tokens },
            (SessionStatus::Failed, _, error) => PairingStatus::Failed {
                error: error.unwrap_or_else(|| "Pairing failed".to_string()),
            },
            _ => PairingStatus::Pending,
        })
    }

    /// Complete a pending session on behalf of a signed-in approver
    pub async fn approve(&self, session_id: &str, approver: &User) -> Result<()> {
        require("sessionId", session_id)?;

        let record = load_live(self.store.as_ref(), session_id, SessionKind::Pairing).await?;
        if record.status != SessionStatus::Pending {
            warn!("Rejected approval of non-pending pairing session {}", session_id);
            return Err(Error::conflict("Session is no longer pending"));
        }

        complete_for(self.store.as_ref(), &self.tokens, &record, approver).await?;
        Ok(())
    }

    /// Rotate the token of a completed session
    ///
    /// Ownership is checked before anything else, so a foreign client learns
    /// nothing about the session. The user is re-read from the directory so
    /// approval and admin changes take effect without a new handoff. The swap
    /// only succeeds against the token read here; the replaced token is revoked.
    pub async fn refresh(&self, client_id: &str, session_id: &str) -> Result<RefreshedToken> {
        require("clientId", client_id)?;
        require("sessionId", session_id)?;

        let record = self
            .store
            .get_session(session_id, SessionKind::Pairing)
            .await?
            .ok_or_else(Error::session_not_found)?;
        if record.client_id != client_id {
            warn!("Refresh of session {} from a different client", session_id);
            return Err(Error::Forbidden(
                "Session belongs to another device".to_string(),
            ));
        }
        if record.is_expired() {
            return Err(Error::session_expired());
        }
        let current = match (record.status, record.tokens.as_ref()) {
            (SessionStatus::Complete, Some(tokens)) => tokens,
            _ => return Err(Error::conflict("Session has not been approved yet")),
        };

        let user = self
            .users
            .get_user(&current.user.id)
            .await?
            .ok_or_else(|| Error::NotFound("User no longer exists".to_string()))?;

        let payload = self.tokens.issue_payload(&user, &record.session_id).await?;
        let token = payload.mobile_session_token.clone();
        let snapshot = payload.user.clone();

        let previous = match self
            .store
            .replace_tokens(
                &record.session_id,
                SessionKind::Pairing,
                &current.mobile_session_token,
                payload,
            )
            .await
        {
            Ok(previous) => previous,
            Err(e) => {
                if let Err(revoke_err) = self.tokens.revoke(&token).await {
                    warn!("Failed to revoke unused token: {}", revoke_err);
                }
                return Err(e);
            }
        };
        if let Err(e) = self.tokens.revoke(&previous.mobile_session_token).await {
            warn!("Failed to revoke superseded token: {}", e);
        }

        info!("Refreshed token for pairing session {}", session_id);
        Ok(RefreshedToken {
            mobile_session_token: token,
            user: snapshot,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FileStorage;
    use crate::user::FileUserDirectory;

    struct Harness {
        manager: PairingSessionManager,
        tokens: Arc<TokenIssuer>,
        users: Arc<FileUserDirectory>,
        storage: Arc<FileStorage>,
    }

    async fn create_test_manager(ttl: Duration) -> Harness {
        let storage = Arc::new(FileStorage::in_memory());
        let users = Arc::new(FileUserDirectory::in_memory());
        users
            .upsert(User::new("u1", "a@b.com").with_name("Ada"))
            .await
            .unwrap();
        let tokens = Arc::new(TokenIssuer::new(storage.clone(), users.clone()));
        let manager =
            PairingSessionManager::new(storage.clone(), tokens.clone(), users.clone(), ttl);
        Harness {
            manager,
            tokens,
            users,
            storage,
        }
    }

    fn approver() -> User {
        User::new("u1", "a@b.com")
    }

    async fn complete_token(harness: &Harness, session_id: &str) -> TokenPayload {
        match harness.manager.check_status(session_id).await.unwrap() {
            PairingStatus::Complete { tokens } => tokens,
            other => panic!("expected complete, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_pairing_flow() {
        let harness = create_test_manager(Duration::from_secs(300)).await;

        let registration = harness.manager.register("tv-123").await.unwrap();
        let lifetime = registration.expires_at - Utc::now();
        assert!(lifetime <= chrono::Duration::seconds(300));
        assert!(lifetime > chrono::Duration::seconds(290));

        assert_eq!(
            harness.manager.check_status(&registration.session_id).await.unwrap(),
            PairingStatus::Pending
        );

        harness
            .manager
            .approve(&registration.session_id, &approver())
            .await
            .unwrap();

        let t1 = complete_token(&harness, &registration.session_id).await;
        assert_eq!(t1.user.id, "u1");
        assert_eq!(t1.session_id, registration.session_id);

        let refreshed = harness
            .manager
            .refresh("tv-123", &registration.session_id)
            .await
            .unwrap();
        assert_ne!(refreshed.mobile_session_token, t1.mobile_session_token);

        let t2 = complete_token(&harness, &registration.session_id).await;
        assert_eq!(t2.mobile_session_token, refreshed.mobile_session_token);
        assert_eq!(t2.session_id, registration.session_id);
    }

    #[tokio::test]
    async fn test_pending_status_has_no_tokens() {
        let harness = create_test_manager(Duration::from_secs(300)).await;
        let registration = harness.manager.register("tv-1").await.unwrap();

        let json = serde_json::to_value(
            harness.manager.check_status(&registration.session_id).await.unwrap(),
        )
        .unwrap();
        assert_eq!(json, serde_json::json!({ "status": "pending" }));
    }

    #[tokio::test]
    async fn test_unknown_session_reads_expired() {
        let harness = create_test_manager(Duration::from_secs(300)).await;
        assert_eq!(
            harness.manager.check_status("nope").await.unwrap(),
            PairingStatus::Expired
        );
        assert!(matches!(
            harness.manager.check_status("").await,
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_register_requires_client_id() {
        let harness = create_test_manager(Duration::from_secs(300)).await;
        assert!(matches!(
            harness.manager.register("").await,
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_expired_session_cannot_be_approved() {
        let harness = create_test_manager(Duration::from_millis(20)).await;
        let registration = harness.manager.register("tv-1").await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        assert!(matches!(
            harness
                .manager
                .approve(&registration.session_id, &approver())
                .await,
            Err(Error::Expired(_))
        ));
        assert_eq!(
            harness.manager.check_status(&registration.session_id).await.unwrap(),
            PairingStatus::Expired
        );
        let stored = harness
            .storage
            .get_session(&registration.session_id, SessionKind::Pairing)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, SessionStatus::Pending);
    }

    #[tokio::test]
    async fn test_second_approval_conflicts() {
        let harness = create_test_manager(Duration::from_secs(300)).await;
        let registration = harness.manager.register("tv-1").await.unwrap();

        harness
            .manager
            .approve(&registration.session_id, &approver())
            .await
            .unwrap();
        let first = complete_token(&harness, &registration.session_id).await;

        assert!(matches!(
            harness
                .manager
                .approve(&registration.session_id, &approver())
                .await,
            Err(Error::Conflict(_))
        ));
        let after = complete_token(&harness, &registration.session_id).await;
        assert_eq!(first.mobile_session_token, after.mobile_session_token);
    }

    #[tokio::test]
    async fn test_refresh_with_other_client_is_forbidden() {
        let harness = create_test_manager(Duration::from_secs(300)).await;
        let registration = harness.manager.register("tv-123").await.unwrap();
        harness
            .manager
            .approve(&registration.session_id, &approver())
            .await
            .unwrap();
        let before = complete_token(&harness, &registration.session_id).await;

        assert!(matches!(
            harness
                .manager
                .refresh("tv-999", &registration.session_id)
                .await,
            Err(Error::Forbidden(_))
        ));

        // Nothing minted, nothing rotated
        let after = complete_token(&harness, &registration.session_id).await;
        assert_eq!(before.mobile_session_token, after.mobile_session_token);
        assert!(harness
            .tokens
            .resolve(&before.mobile_session_token)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_refresh_with_other_client_is_forbidden_in_any_state() {
        let harness = create_test_manager(Duration::from_millis(50)).await;
        let pending = harness.manager.register("tv-123").await.unwrap();
        assert!(matches!(
            harness.manager.refresh("tv-999", &pending.session_id).await,
            Err(Error::Forbidden(_))
        ));

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(matches!(
            harness.manager.refresh("tv-999", &pending.session_id).await,
            Err(Error::Forbidden(_))
        ));
        assert!(matches!(
            harness.manager.refresh("tv-123", &pending.session_id).await,
            Err(Error::Expired(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_refreshes_leave_one_live_token() {
        let harness = Arc::new(create_test_manager(Duration::from_secs(300)).await);

        for _ in 0..20 {
            let registration = harness.manager.register("tv-1").await.unwrap();
            harness
                .manager
                .approve(&registration.session_id, &approver())
                .await
                .unwrap();

            let refreshes = (0..4).map(|_| {
                let harness = harness.clone();
                let session_id = registration.session_id.clone();
                tokio::spawn(async move { harness.manager.refresh("tv-1", &session_id).await })
            });
            let results: Vec<_> = futures::future::join_all(refreshes)
                .await
                .into_iter()
                .map(|r| r.unwrap())
                .collect();

            let mut issued = Vec::new();
            for result in results {
                match result {
                    Ok(refreshed) => issued.push(refreshed.mobile_session_token),
                    Err(Error::Conflict(_)) => {}
                    Err(e) => panic!("unexpected error: {e}"),
                }
            }
            assert!(!issued.is_empty());

            let installed = complete_token(&harness, &registration.session_id).await;
            assert!(issued.contains(&installed.mobile_session_token));

            let mut live = 0;
            for token in &issued {
                if harness.tokens.resolve(token).await.unwrap().is_some() {
                    assert_eq!(token, &installed.mobile_session_token);
                    live += 1;
                }
            }
            assert_eq!(live, 1);
        }
    }

    #[tokio::test]
    async fn test_refresh_errors() {
        let harness = create_test_manager(Duration::from_secs(300)).await;
        let registration = harness.manager.register("tv-1").await.unwrap();

        assert!(matches!(
            harness.manager.refresh("", &registration.session_id).await,
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            harness.manager.refresh("tv-1", "unknown").await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            harness.manager.refresh("tv-1", &registration.session_id).await,
            Err(Error::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_refresh_revokes_old_token_and_reads_live_user() {
        let harness = create_test_manager(Duration::from_secs(300)).await;
        let registration = harness.manager.register("tv-1").await.unwrap();
        harness
            .manager
            .approve(&registration.session_id, &approver())
            .await
            .unwrap();
        let t1 = complete_token(&harness, &registration.session_id).await;
        assert!(!t1.user.admin);

        harness.users.set_flags("u1", true, true).await.unwrap();
        let refreshed = harness
            .manager
            .refresh("tv-1", &registration.session_id)
            .await
            .unwrap();

        assert!(refreshed.user.admin);
        assert!(harness
            .tokens
            .resolve(&t1.mobile_session_token)
            .await
            .unwrap()
            .is_none());
        assert!(harness
            .tokens
            .resolve(&refreshed.mobile_session_token)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_refresh_for_vanished_user() {
        let harness = create_test_manager(Duration::from_secs(300)).await;
        let registration = harness.manager.register("tv-1").await.unwrap();
        harness
            .manager
            .approve(&registration.session_id, &approver())
            .await
            .unwrap();

        harness.users.remove("u1").await.unwrap();
        assert!(matches!(
            harness.manager.refresh("tv-1", &registration.session_id).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_expired_session_cannot_be_refreshed() {
        let harness = create_test_manager(Duration::from_millis(50)).await;
        let registration = harness.manager.register("tv-1").await.unwrap();
        harness
            .manager
            .approve(&registration.session_id, &approver())
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;

        assert!(matches!(
            harness.manager.refresh("tv-1", &registration.session_id).await,
            Err(Error::Expired(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_approvals_single_token() {
        let harness = Arc::new(create_test_manager(Duration::from_secs(300)).await);
        harness
            .users
            .upsert(User::new("u2", "b@c.com"))
            .await
            .unwrap();
        let registration = harness.manager.register("tv-1").await.unwrap();

        let approvals = ["u1", "u2"].into_iter().map(|id| {
            let harness = harness.clone();
            let session_id = registration.session_id.clone();
            tokio::spawn(async move {
                let user = User::new(id, format!("{id}@example.com"));
                harness.manager.approve(&session_id, &user).await
            })
        });
        let results: Vec<_> = futures::future::join_all(approvals)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(Error::Conflict(_)))));

        let winner = complete_token(&harness, &registration.session_id).await;
        assert!(harness
            .tokens
            .resolve(&winner.mobile_session_token)
            .await
            .unwrap()
            .is_some());
    }
}
