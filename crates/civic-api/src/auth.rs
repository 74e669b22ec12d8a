use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use axum_extra::extract::WithRejection;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::{error, info, warn};
use url::Url;

use civic_card::CardRenderer;
use civic_db::Database;
use civic_types::api::{
    LoginRequest, RegisterRequest, RegisterResponse, SessionClaims, SessionResponse,
    SessionStatus, VerifyQuery,
};
use civic_types::{FlowStage, Session, validation};

use crate::error::ApiError;

/// Bytes of randomness in a verification token.
const TOKEN_BYTES: usize = 32;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub renderer: CardRenderer,
    pub session_secret: String,
    pub session_ttl: chrono::Duration,
    /// Base for the verification links handed back by `/register`.
    pub public_url: Url,
}

/// POST /register issues a verification token for an email.
pub async fn register(
    State(state): State<AppState>,
    WithRejection(Json(req), _): WithRejection<Json<RegisterRequest>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let email = validation::email(&req.email)?.to_string();
    let token = generate_token();

    let (email, token, session) = crate::blocking(&state, move |s| {
        s.db.register_pending(&email, &token)?;
        let session =
            s.db.create_session(&email, FlowStage::AwaitingVerification, s.session_ttl)?;
        Ok((email, token, session))
    })
    .await?;

    let verification_link = verification_link(&state.public_url, &email, &token)?;
    // Stands in for sending the email.
    info!("Verification link for {}: {}", email, verification_link);

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            email,
            verification_link,
            session_token: create_token(&state, &session)?,
            stage: session.stage,
        }),
    ))
}

/// GET /verify?email=..&token=.. is the link target. It consumes the token and
/// opens a session at the profile stage.
pub async fn verify(
    State(state): State<AppState>,
    WithRejection(Query(query), _): WithRejection<Query<VerifyQuery>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let session = crate::blocking(&state, move |s| {
        if !s.db.consume_token(&query.email, &query.token)? {
            warn!("Verification rejected for {}", query.email);
            return Err(ApiError::InvalidToken);
        }
        info!("Email verified: {}", query.email);
        Ok(s.db.create_session(&query.email, FlowStage::Profile, s.session_ttl)?)
    })
    .await?;

    Ok(Json(session_response(&state, session)?))
}

/// POST /login resumes the flow for an already verified email.
pub async fn login(
    State(state): State<AppState>,
    WithRejection(Json(req), _): WithRejection<Json<LoginRequest>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let email = validation::email(&req.email)?.to_string();

    let session = crate::blocking(&state, move |s| {
        let stage = s.db.login_stage(&email)?;
        Ok(s.db.create_session(&email, stage, s.session_ttl)?)
    })
    .await?;

    Ok(Json(session_response(&state, session)?))
}

/// GET /session
pub async fn session_status(Extension(session): Extension<Session>) -> Json<SessionStatus> {
    Json(SessionStatus {
        verified: session.verified(),
        email: session.email,
        stage: session.stage,
    })
}

/// POST /logout
pub async fn logout(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Result<StatusCode, ApiError> {
    crate::blocking(&state, move |s| Ok(s.db.delete_session(session.id)?)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Opaque, URL-safe verification token.
pub fn generate_token() -> String {
    let bytes: [u8; TOKEN_BYTES] = rand::random();
    URL_SAFE_NO_PAD.encode(bytes)
}

pub fn verification_link(base: &Url, email: &str, token: &str) -> Result<String, ApiError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| {
            error!("Public URL {} cannot carry a path", base);
            ApiError::Internal
        })?
        .pop_if_empty()
        .push("verify");
    url.query_pairs_mut()
        .append_pair("email", email)
        .append_pair("token", token);
    Ok(url.into())
}

fn session_response(state: &AppStateInner, session: Session) -> Result<SessionResponse, ApiError> {
    Ok(SessionResponse {
        session_token: create_token(state, &session)?,
        verified: session.verified(),
        email: session.email,
        stage: session.stage,
    })
}

/// The JWT expires together with the session row it points at.
fn create_token(state: &AppStateInner, session: &Session) -> Result<String, ApiError> {
    let claims = SessionClaims {
        sid: session.id,
        exp: session.expires_at.timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(state.session_secret.as_bytes()),
    )
    .map_err(|e| {
        error!("Failed to sign session token: {}", e);
        ApiError::Internal
    })
}
