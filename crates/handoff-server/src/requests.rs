//! Typed request bodies, validated before they reach a manager

use crate::error::ApiError;
use axum::extract::{FromRequest, Request};
use axum::{async_trait, Json};
use handoff_auth::DeviceInfo;
use handoff_core::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;

/// Boundary validation for a request body
pub trait Validate {
    fn validate(&self) -> Result<()>;
}

fn required(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::validation(format!("{} is required", field)));
    }
    Ok(())
}

/// JSON body that has been deserialized and validated
///
/// Any rejection (bad content type, malformed JSON, failed validation)
/// becomes a `Validation` error.
pub struct ValidJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ValidJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> std::result::Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| Error::validation(rejection.body_text()))?;
        value.validate()?;
        Ok(Self(value))
    }
}

/// `POST /api/pair/register`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPairingRequest {
    #[serde(default)]
    pub client_id: String,
}

impl Validate for RegisterPairingRequest {
    fn validate(&self) -> Result<()> {
        required("clientId", &self.client_id)
    }
}

/// `POST /api/pair/check` and `POST /api/pair/approve`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingSessionRequest {
    #[serde(default)]
    pub session_id: String,
}

impl Validate for PairingSessionRequest {
    fn validate(&self) -> Result<()> {
        required("sessionId", &self.session_id)
    }
}

/// `POST /api/pair/refresh`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshPairingRequest {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub session_id: String,
}

impl Validate for RefreshPairingRequest {
    fn validate(&self) -> Result<()> {
        required("clientId", &self.client_id)?;
        required("sessionId", &self.session_id)
    }
}

/// `POST /api/qr/register`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterQrRequest {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub device_type: String,
    #[serde(default)]
    pub device_info: Option<DeviceInfo>,
}

impl Validate for RegisterQrRequest {
    fn validate(&self) -> Result<()> {
        required("clientId", &self.client_id)?;
        required("deviceType", &self.device_type)
    }
}

/// `POST /api/qr/:id/authenticate`
#[derive(Debug, Deserialize)]
pub struct BeginAuthenticationRequest {
    #[serde(default)]
    pub provider: String,
}

impl Validate for BeginAuthenticationRequest {
    fn validate(&self) -> Result<()> {
        required("provider", &self.provider)
    }
}

/// `POST /api/qr/:id/callback`
///
/// Sent by the provider return path. `error` set means sign-in failed.
#[derive(Debug, Deserialize)]
pub struct ProviderCallbackRequest {
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub error: Option<String>,
}

impl Validate for ProviderCallbackRequest {
    fn validate(&self) -> Result<()> {
        required("provider", &self.provider)?;
        if let Some(error) = &self.error {
            required("error", error)?;
        }
        Ok(())
    }
}
