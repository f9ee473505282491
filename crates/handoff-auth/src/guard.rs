//! Input and expiry checks shared by both session flows

use crate::session::{SessionKind, SessionRecord};
use crate::storage::SessionStore;
use crate::token::TokenIssuer;
use crate::user::User;
use handoff_core::{Error, Result};
use tracing::{info, warn};

/// Reject blank required fields
pub(crate) fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::validation(format!("{} is required", field)));
    }
    Ok(())
}

/// Load a session that exists and has not expired
pub(crate) async fn load_live(
    store: &dyn SessionStore,
    session_id: &str,
    kind: SessionKind,
) -> Result<SessionRecord> {
    let record = store
        .get_session(session_id, kind)
        .await?
        .ok_or_else(Error::session_not_found)?;
    if record.is_expired() {
        return Err(Error::session_expired());
    }
    Ok(record)
}

/// Mint a token for `user` and complete the session with it
///
/// Completion only succeeds while the stored status still equals the status
/// in `record`, the one the caller checked. A token minted for a losing
/// completion is revoked.
pub(crate) async fn complete_for(
    store: &dyn SessionStore,
    tokens: &TokenIssuer,
    record: &SessionRecord,
    user: &User,
) -> Result<SessionRecord> {
    let payload = tokens.issue_payload(user, &record.session_id).await?;
    let token = payload.mobile_session_token.clone();

    match store
        .complete_session_from(&record.session_id, record.kind, record.status, payload)
        .await
    {
        Ok(completed) => {
            info!(
                "{} session {} completed for user {}",
                record.kind, record.session_id, user.id
            );
            Ok(completed)
        }
        Err(e) => {
            if let Err(revoke_err) = tokens.revoke(&token).await {
                warn!("Failed to revoke unused token: {}", revoke_err);
            }
            Err(e)
        }
    }
}
