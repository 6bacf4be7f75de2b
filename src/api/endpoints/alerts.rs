//! Alert endpoints.
//!
//! - `GET /api/doctors/:id/alerts`: pending alerts for a clinician's patients
//! - `GET /api/patients/:id/alerts`: full alert history for one patient
//! - `POST /api/alerts/:id/resolve`: the dashboard's one write

use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::{parse_id, ApiContext};
use crate::db;
use crate::models::{Alert, PendingAlertView, ResolveOutcome};

#[derive(Serialize)]
pub struct PendingAlertsResponse {
    pub doctor_id: Uuid,
    pub alerts: Vec<PendingAlertView>,
}

/// `GET /api/doctors/:id/alerts`
pub async fn pending_for_doctor(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
) -> Result<Json<PendingAlertsResponse>, ApiError> {
    let doctor_id = parse_id(&id, "clinician")?;

    let alerts = tokio::task::spawn_blocking(move || {
        ctx.core.ensure_clinician(&doctor_id)?;
        ctx.core
            .with_db(|conn| db::list_pending_alerts_for_doctor(conn, &doctor_id))
    })
    .await??;

    Ok(Json(PendingAlertsResponse { doctor_id, alerts }))
}

#[derive(Serialize)]
pub struct PatientAlertsResponse {
    pub patient_id: Uuid,
    pub alerts: Vec<Alert>,
}

/// `GET /api/patients/:id/alerts`
pub async fn history_for_patient(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
) -> Result<Json<PatientAlertsResponse>, ApiError> {
    let patient_id = parse_id(&id, "patient")?;

    let alerts = tokio::task::spawn_blocking(move || {
        ctx.core.ensure_patient(&patient_id)?;
        ctx.core
            .with_db(|conn| db::list_alerts_for_patient(conn, &patient_id))
    })
    .await??;

    Ok(Json(PatientAlertsResponse { patient_id, alerts }))
}

#[derive(Serialize)]
pub struct ResolveResponse {
    pub alert_id: Uuid,
    pub outcome: ResolveOutcome,
    pub alert: Alert,
}

/// `POST /api/alerts/:id/resolve`: resolving twice reports `already_resolved`.
pub async fn resolve(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
) -> Result<Json<ResolveResponse>, ApiError> {
    let alert_id = parse_id(&id, "alert")?;

    let (outcome, alert) = tokio::task::spawn_blocking(move || {
        let outcome = ctx.core.resolve_alert(&alert_id, Utc::now())?;
        let alert = ctx.core.with_db(|conn| db::get_alert(conn, &alert_id))?;
        Ok::<_, ApiError>((outcome, alert))
    })
    .await??;

    let alert = alert.ok_or_else(|| ApiError::NotFound(format!("Alert not found: {alert_id}")))?;
    Ok(Json(ResolveResponse {
        alert_id,
        outcome,
        alert,
    }))
}
