//! HTTP request handlers
//!
//! Pairing and QR handoff endpoints plus token resolution.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use handoff_auth::{
    AuthRedirect, PairingRegistration, PairingStatus, QrRegistration, QrSessionInfo, QrStatus,
    User, UserSnapshot,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::debug;

use crate::bearer::bearer_token;
use crate::error::ApiError;
use crate::requests::{
    BeginAuthenticationRequest, PairingSessionRequest, ProviderCallbackRequest,
    RefreshPairingRequest, RegisterPairingRequest, RegisterQrRequest, ValidJson,
};
use crate::state::AppState;

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Create the main application router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Pairing API
        .route("/api/pair/register", post(pair_register_handler))
        .route("/api/pair/check", post(pair_check_handler))
        .route("/api/pair/approve", post(pair_approve_handler))
        .route("/api/pair/refresh", post(pair_refresh_handler))
        // QR API
        .route("/api/qr/register", post(qr_register_handler))
        .route("/api/qr/:id", get(qr_info_handler))
        .route("/api/qr/:id/authenticate", post(qr_authenticate_handler))
        .route("/api/qr/:id/approve", post(qr_approve_handler))
        .route("/api/qr/:id/callback", post(qr_callback_handler))
        .route("/api/qr/:id/status", get(qr_status_handler))
        // Token resolution
        .route("/api/auth/session", get(auth_session_handler))
        .route("/api/auth/signout", post(auth_signout_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Generic `{success, message}` acknowledgement
#[derive(Debug, Serialize)]
pub struct Ack {
    pub success: bool,
    pub message: String,
}

impl Ack {
    fn ok(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            success: true,
            message: message.into(),
        })
    }
}

// ============================================================================
// Pairing API Handlers
// ============================================================================

/// Register a pairing session for a requesting device
async fn pair_register_handler(
    State(state): State<Arc<AppState>>,
    ValidJson(request): ValidJson<RegisterPairingRequest>,
) -> ApiResult<PairingRegistration> {
    Ok(Json(state.pairing.register(&request.client_id).await?))
}

/// Poll a pairing session
async fn pair_check_handler(
    State(state): State<Arc<AppState>>,
    ValidJson(request): ValidJson<PairingSessionRequest>,
) -> ApiResult<PairingStatus> {
    Ok(Json(state.pairing.check_status(&request.session_id).await?))
}

/// Approve a pairing session as the signed-in caller
async fn pair_approve_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ValidJson(request): ValidJson<PairingSessionRequest>,
) -> ApiResult<Ack> {
    let approver = state.authenticate(&headers).await?;
    state.pairing.approve(&request.session_id, &approver).await?;
    Ok(Ack::ok("Session approved"))
}

/// Response for a successful refresh
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub success: bool,
    pub mobile_session_token: String,
    pub user: UserSnapshot,
}

/// Rotate the token of a completed pairing session
async fn pair_refresh_handler(
    State(state): State<Arc<AppState>>,
    ValidJson(request): ValidJson<RefreshPairingRequest>,
) -> ApiResult<RefreshResponse> {
    let refreshed = state
        .pairing
        .refresh(&request.client_id, &request.session_id)
        .await?;
    Ok(Json(RefreshResponse {
        success: true,
        mobile_session_token: refreshed.mobile_session_token,
        user: refreshed.user,
    }))
}

// ============================================================================
// QR API Handlers
// ============================================================================

/// Register a QR session for a requesting device
async fn qr_register_handler(
    State(state): State<Arc<AppState>>,
    ValidJson(request): ValidJson<RegisterQrRequest>,
) -> ApiResult<QrRegistration> {
    let registration = state
        .qr
        .register(&request.client_id, &request.device_type, request.device_info)
        .await?;
    Ok(Json(registration))
}

/// Unauthenticated session details for the scanning device
async fn qr_info_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<QrSessionInfo> {
    Ok(Json(state.qr.info(&id).await?))
}

/// Choose an identity provider for a QR session
async fn qr_authenticate_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ValidJson(request): ValidJson<BeginAuthenticationRequest>,
) -> ApiResult<AuthRedirect> {
    Ok(Json(
        state.qr.begin_authenticating(&id, &request.provider).await?,
    ))
}

/// Approve a QR session as the signed-in caller
async fn qr_approve_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Ack> {
    let approver = state.authenticate(&headers).await?;
    state.qr.approve(&id, &approver).await?;
    Ok(Ack::ok("Session approved"))
}

/// Provider return path: complete or fail an authenticating session
///
/// Both outcomes require a signed-in caller.
async fn qr_callback_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    ValidJson(request): ValidJson<ProviderCallbackRequest>,
) -> ApiResult<Ack> {
    let user = state.authenticate(&headers).await?;

    if let Some(error) = &request.error {
        state.qr.fail(&id, &request.provider, error).await?;
        return Ok(Ack::ok("Session marked as failed"));
    }

    state
        .qr
        .complete_with_provider(&id, &request.provider, &user)
        .await?;
    Ok(Ack::ok("Session approved"))
}

/// Poll a QR session
async fn qr_status_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<QrStatus> {
    Ok(Json(state.qr.check_status(&id).await?))
}

// ============================================================================
// Token Resolution
// ============================================================================

/// Response for a bearer token lookup
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_expired: Option<bool>,
}

/// Resolve the caller's bearer token to a user
async fn auth_session_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let user = match bearer_token(&headers)? {
        Some(token) => state.tokens.resolve(token).await?,
        None => None,
    };

    Ok(match user {
        Some(user) => Json(SessionResponse {
            authenticated: true,
            user: Some(user),
            session_expired: None,
        })
        .into_response(),
        None => {
            debug!("Bearer token did not resolve to a user");
            (
                StatusCode::UNAUTHORIZED,
                Json(SessionResponse {
                    authenticated: false,
                    user: None,
                    session_expired: Some(true),
                }),
            )
                .into_response()
        }
    })
}

/// Response for sign-out
#[derive(Debug, Serialize)]
pub struct SignOutResponse {
    pub success: bool,
    pub revoked: bool,
}

/// Revoke the caller's bearer token
async fn auth_signout_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<SignOutResponse> {
    let token = bearer_token(&headers)?
        .ok_or_else(|| handoff_core::Error::Unauthorized("missing bearer token".to_string()))?;
    let revoked = state.tokens.revoke(token).await?;
    Ok(Json(SignOutResponse {
        success: true,
        revoked,
    }))
}

// ============================================================================
// Health
// ============================================================================

/// Liveness response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
