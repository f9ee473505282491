//! Handoff Server - Axum-based HTTP API
//!
//! Exposes the pairing and QR handoff flows plus bearer-token resolution for
//! the rest of the application.

pub mod bearer;
pub mod error;
pub mod http;
pub mod requests;
pub mod state;

pub use error::ApiError;
pub use http::create_router;
pub use state::AppState;
