use axum::{
    Extension, Json,
    extract::State,
    http::{HeaderName, HeaderValue, StatusCode, header},
    response::IntoResponse,
};
use axum_extra::extract::WithRejection;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use chrono::{NaiveDate, Utc};
use tracing::{error, info, warn};

use civic_card::{CardError, CardFields, CardWarning, RenderedCard};
use civic_db::citizens::NewCitizen;
use civic_types::api::{CitizenResponse, CreateCitizenRequest, CreateCitizenResponse, RenderCardRequest};
use civic_types::{Citizen, FlowEvent, FlowStage, IdNumber, Session, validation};

use crate::auth::AppState;
use crate::error::ApiError;

/// POST /citizen completes the profile. It mints the ID number and returns the
/// first rendering of the card.
pub async fn create_citizen(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    WithRejection(Json(req), _): WithRejection<Json<CreateCitizenRequest>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    session.require(FlowStage::Profile)?;

    let today = Utc::now().date_naive();
    let full_name = validation::full_name(&req.full_name)?.to_string();
    let date_of_birth = validation::date_of_birth(req.date_of_birth, today)?;
    let theme = req.theme;
    let (photo, warnings) = decode_photo_field(req.photo.as_deref());

    let (id_number, card) = crate::blocking(&state, move |s| {
        let id_number = s.db.register_citizen(NewCitizen {
            email: &session.email,
            full_name: &full_name,
            date_of_birth,
            theme,
        })?;
        s.db.advance_session(session.id, FlowEvent::CitizenRegistered)?;

        // The citizen is committed from here on; a render failure must not
        // turn into an error response.
        let card = s.renderer.render_card(
            &CardFields {
                full_name: &full_name,
                date_of_birth,
                id_number,
                issued: today,
                theme,
            },
            photo.as_deref(),
        );
        Ok((id_number, card))
    })
    .await?;

    Ok((StatusCode::CREATED, Json(issued_response(id_number, card, warnings))))
}

/// Response for a freshly issued ID. If the card could not be rendered the
/// ID still stands and the client is told to fetch the card separately.
fn issued_response(
    id_number: IdNumber,
    card: Result<RenderedCard, CardError>,
    mut warnings: Vec<String>,
) -> CreateCitizenResponse {
    match card {
        Ok(card) => {
            warnings.extend(card.warnings.iter().map(ToString::to_string));
            CreateCitizenResponse {
                id_number,
                content_type: Some(card.content_type().to_string()),
                file_name: Some(card.file_name()),
                card: Some(B64.encode(&card.bytes)),
                warnings,
            }
        }
        Err(e) => {
            error!("ID {} was issued but its card failed to render: {}", id_number, e);
            warnings.push(format!(
                "ID {id_number} was issued, but the card could not be rendered. \
                 Request it again from POST /citizen/card."
            ));
            CreateCitizenResponse {
                id_number,
                card: None,
                content_type: None,
                file_name: None,
                warnings,
            }
        }
    }
}

/// GET /citizen returns the stored profile for the session's email.
pub async fn get_citizen(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Result<impl IntoResponse, ApiError> {
    let citizen = load_citizen(&state, session).await?;

    Ok(Json(CitizenResponse {
        email: citizen.email,
        full_name: citizen.full_name,
        date_of_birth: citizen.date_of_birth,
        id_number: citizen.id_number,
        theme: citizen.theme,
    }))
}

/// POST /citizen/card re-renders the card from stored data and returns the
/// image as a download.
pub async fn render_card(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    WithRejection(Json(req), _): WithRejection<Json<RenderCardRequest>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    session.require(FlowStage::IdCard)?;
    let citizen = load_citizen(&state, session).await?;
    let (photo, mut warnings) = decode_photo_field(req.photo.as_deref());
    let issued: NaiveDate = Utc::now().date_naive();

    let card = crate::blocking(&state, move |s| {
        Ok(s.renderer.render_card(
            &CardFields {
                full_name: &citizen.full_name,
                date_of_birth: citizen.date_of_birth,
                id_number: citizen.id_number,
                issued,
                theme: citizen.theme,
            },
            photo.as_deref(),
        )?)
    })
    .await?;

    info!("Re-rendered card ({} bytes)", card.bytes.len());
    warnings.extend(card.warnings.iter().map(ToString::to_string));

    let disposition = format!("attachment; filename=\"{}\"", card.file_name());
    let mut headers = vec![
        (header::CONTENT_TYPE, HeaderValue::from_static(card.content_type())),
        (
            header::CONTENT_DISPOSITION,
            HeaderValue::from_str(&disposition).map_err(|_| ApiError::Internal)?,
        ),
    ];
    if let Some(value) = warning_header(&warnings) {
        headers.push((HeaderName::from_static("x-card-warning"), value));
    }

    let mut response = card.bytes.into_response();
    for (name, value) in headers {
        response.headers_mut().insert(name, value);
    }
    Ok(response)
}

async fn load_citizen(state: &AppState, session: Session) -> Result<Citizen, ApiError> {
    if !session.verified() {
        return Err(ApiError::Flow(civic_types::FlowError::WrongStage {
            expected: FlowStage::IdCard,
            actual: session.stage,
        }));
    }
    crate::blocking(state, move |s| Ok(s.db.get_citizen(&session.email)?))
        .await?
        .ok_or_else(|| ApiError::NotFound("User profile not found.".to_string()))
}

/// Photos travel as base64. Anything that cannot be decoded is a warning and
/// the card is produced without a photo.
fn decode_photo_field(photo: Option<&str>) -> (Option<Vec<u8>>, Vec<String>) {
    match photo.map(|p| B64.decode(p.trim())) {
        None => (None, Vec::new()),
        Some(Ok(bytes)) => (Some(bytes), Vec::new()),
        Some(Err(e)) => {
            warn!("Photo field is not valid base64: {}", e);
            let warning = CardWarning::PhotoDecode(format!("invalid base64: {e}"));
            (None, vec![warning.to_string()])
        }
    }
}

fn warning_header(warnings: &[String]) -> Option<HeaderValue> {
    if warnings.is_empty() {
        return None;
    }
    HeaderValue::from_str(&warnings.join("; ")).ok()
}
