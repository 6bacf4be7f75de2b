//! Check-in transport endpoints.
//!
//! - `POST /api/checkin/message`: one inbound patient message
//! - `POST /api/checkin/help`: patient asks to speak with a clinician
//!
//! A chat bridge posts here with either the patient's id or their chat id.

use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::{parse_id, ApiContext};
use crate::checkin::{questions, CheckinReply};
use crate::core_state::CoreState;
use crate::db;
use crate::models::enums::AlertType;
use crate::pipeline::{AlertAction, PipelineError};

/// Who sent the message: exactly one of `patient_id` or `chat_id`.
fn resolve_sender(
    core: &CoreState,
    patient_id: Option<&str>,
    chat_id: Option<i64>,
) -> Result<Uuid, ApiError> {
    match (patient_id, chat_id) {
        (Some(id), None) => parse_id(id, "patient"),
        (None, Some(chat_id)) => core
            .with_db(|conn| db::get_patient_by_chat_id(conn, chat_id))?
            .map(|p| p.id)
            .ok_or_else(|| ApiError::NotFound(format!("No patient for chat id {chat_id}"))),
        _ => Err(ApiError::BadRequest(
            "Provide exactly one of patient_id or chat_id".into(),
        )),
    }
}

#[derive(Deserialize)]
pub struct MessageRequest {
    pub patient_id: Option<String>,
    pub chat_id: Option<i64>,
    pub text: String,
    /// Defaults to the time the request arrives.
    pub received_at: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub patient_id: Uuid,
    pub reply: CheckinReply,
}

/// `POST /api/checkin/message`
pub async fn message(
    State(ctx): State<ApiContext>,
    Json(req): Json<MessageRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    if req.text.trim().is_empty() {
        return Err(ApiError::BadRequest("Message text is required".into()));
    }
    let received_at = req.received_at.unwrap_or_else(Utc::now);

    let (patient_id, reply) = tokio::task::spawn_blocking(move || {
        let patient_id = resolve_sender(&ctx.core, req.patient_id.as_deref(), req.chat_id)?;
        let reply = ctx
            .core
            .orchestrator()
            .handle_message(patient_id, req.text.trim(), received_at)?;
        Ok::<_, ApiError>((patient_id, reply))
    })
    .await??;

    Ok(Json(MessageResponse { patient_id, reply }))
}

#[derive(Deserialize)]
pub struct HelpRequest {
    pub patient_id: Option<String>,
    pub chat_id: Option<i64>,
}

#[derive(Serialize)]
pub struct HelpResponse {
    pub patient_id: Uuid,
    pub alert_type: AlertType,
    #[serde(flatten)]
    pub action: AlertAction,
    pub text: &'static str,
}

/// `POST /api/checkin/help`
///
/// With no assigned clinician the request is `rejected` and the patient is
/// pointed at emergency services instead.
pub async fn help(
    State(ctx): State<ApiContext>,
    Json(req): Json<HelpRequest>,
) -> Result<Json<HelpResponse>, ApiError> {
    let (patient_id, action, text) = tokio::task::spawn_blocking(move || {
        let patient_id = resolve_sender(&ctx.core, req.patient_id.as_deref(), req.chat_id)?;
        match ctx.core.orchestrator().request_help(patient_id, Utc::now()) {
            Ok(action) => Ok((patient_id, action, questions::HELP_REQUESTED)),
            Err(PipelineError::UnknownPatient { .. }) => {
                tracing::warn!(patient_id = %patient_id, "Help requested but no clinician assigned");
                Ok((patient_id, AlertAction::Rejected, questions::HELP_UNAVAILABLE))
            }
            Err(e) => Err(ApiError::from(e)),
        }
    })
    .await??;

    Ok(Json(HelpResponse {
        patient_id,
        alert_type: AlertType::ProfessionalHelp,
        action,
        text,
    }))
}
