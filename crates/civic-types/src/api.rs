use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::flow::FlowStage;
use crate::models::{IdNumber, Theme};

// -- Session claims --

/// Claims carried by the signed session token. The session row is the
/// source of truth for email and stage; the token only names it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sid: Uuid,
    pub exp: usize,
}

// -- Registration --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub email: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub email: String,
    /// Delivered out of band in a real deployment; returned directly here.
    pub verification_link: String,
    /// Session parked at `awaiting_verification`; it moves on by itself once
    /// the link is followed.
    pub session_token: String,
    pub stage: FlowStage,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyQuery {
    pub email: String,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
}

/// Returned by both verification and login.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    pub session_token: String,
    pub email: String,
    pub verified: bool,
    pub stage: FlowStage,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionStatus {
    pub email: String,
    pub verified: bool,
    pub stage: FlowStage,
}

// -- Citizens --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateCitizenRequest {
    pub full_name: String,
    pub date_of_birth: NaiveDate,
    #[serde(default)]
    pub theme: Theme,
    /// Base64-encoded JPEG or PNG. Composited in memory, never stored.
    #[serde(default)]
    pub photo: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateCitizenResponse {
    pub id_number: IdNumber,
    /// Base64-encoded card image. Absent when rendering failed after the ID
    /// was issued; `POST /citizen/card` produces it again.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CitizenResponse {
    pub email: String,
    pub full_name: String,
    pub date_of_birth: NaiveDate,
    pub id_number: IdNumber,
    pub theme: Theme,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RenderCardRequest {
    #[serde(default)]
    pub photo: Option<String>,
}

// -- Errors --

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}
