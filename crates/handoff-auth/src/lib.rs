//! Handoff Auth - Cross-device session handoff
//!
//! Lets a limited-input device (a TV) obtain a mobile session token by having
//! a second, signed-in device vouch for it. Two entry points exist:
//!
//! - [`PairingSessionManager`]: the session id is exchanged out of band
//! - [`QrSessionManager`]: the session id is shown as a QR code, optionally
//!   routed through a federated identity provider
//!
//! Both persist through an injected [`SessionStore`] and mint credentials
//! through [`TokenIssuer`].
//!
//! # Example
//!
//! ```no_run
//! use handoff_auth::{FileStorage, FileUserDirectory, PairingSessionManager, TokenIssuer, User};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! async fn example() -> handoff_core::Result<()> {
//!     let storage = Arc::new(FileStorage::in_memory());
//!     let users = Arc::new(FileUserDirectory::in_memory());
//!     let tokens = Arc::new(TokenIssuer::new(storage.clone(), users.clone()));
//!     let pairing = PairingSessionManager::new(storage, tokens, users, Duration::from_secs(300));
//!
//!     // On the TV
//!     let registration = pairing.register("tv-123").await?;
//!
//!     // On the phone, once signed in
//!     pairing.approve(&registration.session_id, &User::new("u1", "a@b.com")).await?;
//!
//!     // Back on the TV
//!     let status = pairing.check_status(&registration.session_id).await?;
//!     println!("{:?}", status);
//!     Ok(())
//! }
//! ```

mod guard;
pub mod pairing;
pub mod qr;
pub mod session;
pub mod storage;
pub mod token;
pub mod user;

pub use pairing::{PairingRegistration, PairingSessionManager, PairingStatus, RefreshedToken};
pub use qr::{AuthRedirect, QrRegistration, QrSessionInfo, QrSessionManager, QrStatus};
pub use session::{
    DeviceInfo, ObservedStatus, SessionKind, SessionRecord, SessionStatus, TokenPayload,
    UserSnapshot,
};
pub use storage::{FileStorage, SessionStore, TokenBinding, TokenStore};
pub use token::{hash_token, MintedToken, TokenIssuer};
pub use user::{FileUserDirectory, User, UserDirectory};
