//! Patient endpoints for the clinician dashboard.
//!
//! Reads:
//! - `GET /api/doctors/:id/patients`
//! - `GET /api/doctors/:id/missed-checkins?days=N`
//! - `GET /api/doctors/:id/declining?threshold=T`
//! - `GET /api/patients/:id/sessions`
//! - `GET /api/sessions/:id/messages`
//!
//! Writes:
//! - `PUT /api/patients/:id/schedule`: prompt time and timezone
//! - `POST /api/patients/:id/recompute`: rebuild the trend from history

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{Days, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::{parse_id, ApiContext};
use crate::db;
use crate::models::{AssignedPatient, SessionScore, StoredMessage, TrendTriple};

/// Longest look-back accepted by `missed-checkins`.
const MAX_MISSED_DAYS: u32 = 90;

#[derive(Serialize)]
pub struct PatientListResponse {
    pub doctor_id: Uuid,
    pub patients: Vec<AssignedPatient>,
}

/// `GET /api/doctors/:id/patients`: assigned patients with their trend.
pub async fn list_for_doctor(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
) -> Result<Json<PatientListResponse>, ApiError> {
    let doctor_id = parse_id(&id, "clinician")?;

    let patients = tokio::task::spawn_blocking(move || {
        ctx.core.ensure_clinician(&doctor_id)?;
        ctx.core
            .with_db(|conn| db::list_patients_for_doctor(conn, &doctor_id))
    })
    .await??;

    Ok(Json(PatientListResponse { doctor_id, patients }))
}

#[derive(Deserialize)]
pub struct MissedQuery {
    pub days: Option<u32>,
}

#[derive(Serialize)]
pub struct MissedResponse {
    pub doctor_id: Uuid,
    pub days: u32,
    pub patients: Vec<AssignedPatient>,
}

/// `GET /api/doctors/:id/missed-checkins`: no session in the last `days` days
/// (default 1, i.e. nothing today).
pub async fn missed_checkins(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
    Query(query): Query<MissedQuery>,
) -> Result<Json<MissedResponse>, ApiError> {
    let doctor_id = parse_id(&id, "clinician")?;
    let days = query.days.unwrap_or(1);
    if days == 0 || days > MAX_MISSED_DAYS {
        return Err(ApiError::BadRequest(format!(
            "days must be between 1 and {MAX_MISSED_DAYS}"
        )));
    }
    let since = Utc::now()
        .date_naive()
        .checked_sub_days(Days::new(u64::from(days - 1)))
        .ok_or_else(|| ApiError::BadRequest("days out of range".into()))?;

    let patients = tokio::task::spawn_blocking(move || {
        ctx.core.ensure_clinician(&doctor_id)?;
        ctx.core
            .with_db(|conn| db::list_patients_missing_checkins(conn, &doctor_id, since))
    })
    .await??;

    Ok(Json(MissedResponse {
        doctor_id,
        days,
        patients,
    }))
}

#[derive(Deserialize)]
pub struct DecliningQuery {
    pub threshold: Option<f64>,
}

#[derive(Serialize)]
pub struct DecliningResponse {
    pub doctor_id: Uuid,
    pub threshold: f64,
    pub patients: Vec<AssignedPatient>,
}

/// `GET /api/doctors/:id/declining`: three-day change below `threshold`
/// (default: minus the rapid-decline delta).
pub async fn declining(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
    Query(query): Query<DecliningQuery>,
) -> Result<Json<DecliningResponse>, ApiError> {
    let doctor_id = parse_id(&id, "clinician")?;
    let threshold = query
        .threshold
        .unwrap_or(-ctx.core.config().rapid_decline_delta);
    if !(-100.0..=100.0).contains(&threshold) {
        return Err(ApiError::BadRequest(
            "threshold must be between -100 and 100".into(),
        ));
    }

    let patients = tokio::task::spawn_blocking(move || {
        ctx.core.ensure_clinician(&doctor_id)?;
        ctx.core
            .with_db(|conn| db::list_declining_patients(conn, &doctor_id, threshold))
    })
    .await??;

    Ok(Json(DecliningResponse {
        doctor_id,
        threshold,
        patients,
    }))
}

#[derive(Serialize)]
pub struct SessionHistoryResponse {
    pub patient_id: Uuid,
    pub trend: TrendTriple,
    pub sessions: Vec<SessionScore>,
}

/// `GET /api/patients/:id/sessions`: score history, oldest first.
pub async fn sessions(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
) -> Result<Json<SessionHistoryResponse>, ApiError> {
    let patient_id = parse_id(&id, "patient")?;

    let (patient, sessions) = tokio::task::spawn_blocking(move || {
        let patient = ctx.core.ensure_patient(&patient_id)?;
        let sessions = ctx
            .core
            .with_db(|conn| db::get_session_history(conn, &patient_id))?;
        Ok::<_, ApiError>((patient, sessions))
    })
    .await??;

    Ok(Json(SessionHistoryResponse {
        patient_id,
        trend: patient.trend,
        sessions,
    }))
}

#[derive(Serialize)]
pub struct SessionMessagesResponse {
    pub session_id: Uuid,
    pub messages: Vec<StoredMessage>,
}

/// `GET /api/sessions/:id/messages`: the question/answer pairs of one session.
pub async fn session_messages(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
) -> Result<Json<SessionMessagesResponse>, ApiError> {
    let session_id = parse_id(&id, "session")?;

    let messages = tokio::task::spawn_blocking(move || {
        ctx.core
            .with_db(|conn| db::list_session_messages(conn, &session_id))
    })
    .await??;

    if messages.is_empty() {
        return Err(ApiError::NotFound(format!("Session not found: {session_id}")));
    }
    Ok(Json(SessionMessagesResponse {
        session_id,
        messages,
    }))
}

#[derive(Deserialize)]
pub struct ScheduleRequest {
    pub timezone: String,
    pub chat_time: String,
}

#[derive(Serialize)]
pub struct ScheduleResponse {
    pub patient_id: Uuid,
    pub timezone: String,
    pub chat_time: String,
}

/// `PUT /api/patients/:id/schedule`
pub async fn update_schedule(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
    Json(req): Json<ScheduleRequest>,
) -> Result<Json<ScheduleResponse>, ApiError> {
    let patient_id = parse_id(&id, "patient")?;
    let timezone = req.timezone.trim().to_string();
    if timezone.parse::<Tz>().is_err() {
        return Err(ApiError::BadRequest(format!("Unknown timezone: {timezone}")));
    }
    let chat_time = NaiveTime::parse_from_str(req.chat_time.trim(), "%H:%M")
        .map_err(|_| ApiError::BadRequest("chat_time must be HH:MM".into()))?
        .format("%H:%M")
        .to_string();

    let (tz, time) = (timezone.clone(), chat_time.clone());
    tokio::task::spawn_blocking(move || {
        ctx.core
            .with_db(|conn| db::update_patient_schedule(conn, &patient_id, &tz, &time))
    })
    .await??;

    tracing::info!(patient_id = %patient_id, %timezone, %chat_time, "Patient schedule updated");
    Ok(Json(ScheduleResponse {
        patient_id,
        timezone,
        chat_time,
    }))
}

#[derive(Serialize)]
pub struct RecomputeResponse {
    pub patient_id: Uuid,
    pub trend: TrendTriple,
}

/// `POST /api/patients/:id/recompute`: alerts are not re-evaluated.
pub async fn recompute(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
) -> Result<Json<RecomputeResponse>, ApiError> {
    let patient_id = parse_id(&id, "patient")?;

    let trend = tokio::task::spawn_blocking(move || {
        ctx.core
            .orchestrator()
            .recompute_trend(patient_id, Utc::now())
    })
    .await??;

    Ok(Json(RecomputeResponse { patient_id, trend }))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{seeded, send, Seeded};
    use axum::http::StatusCode;
    use chrono::{Days, Utc};
    use serde_json::json;
    use uuid::Uuid;

    use crate::db::{self, NewMessage};
    use crate::models::SessionScore;

    /// Store a session `days_ago` days back with the given 0-100 score.
    fn add_session(s: &Seeded, days_ago: u64, score: f64) -> Uuid {
        let patient = s.patient;
        let at = Utc::now() - chrono::Duration::days(days_ago as i64);
        let date = Utc::now().date_naive().checked_sub_days(Days::new(days_ago)).unwrap();
        s.core
            .with_db(|conn| {
                db::upsert_session_score(
                    conn,
                    &SessionScore {
                        id: Uuid::new_v4(),
                        patient_id: patient,
                        date,
                        timestamp: at,
                        sentiment_score: score,
                    },
                    &[NewMessage {
                        question: "How are you feeling today?".into(),
                        response: "fine".into(),
                        sentiment_score: score,
                        answered_at: at,
                    }],
                )
            })
            .unwrap()
    }

    #[tokio::test]
    async fn lists_assigned_patients() {
        let s = seeded(vec![]);
        let uri = format!("/api/doctors/{}/patients", s.doctor);
        let (status, json) = send(s.app(), "GET", &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        let patients = json["patients"].as_array().unwrap();
        assert_eq!(patients.len(), 1);
        assert_eq!(patients[0]["name"], "Grace Hopper");
        assert_eq!(patients[0]["start_date"], "2025-01-01");
    }

    #[tokio::test]
    async fn missed_checkins_respects_window() {
        let s = seeded(vec![]);
        add_session(&s, 2, 70.0);

        let uri = format!("/api/doctors/{}/missed-checkins", s.doctor);
        let (status, json) = send(s.app(), "GET", &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["days"], 1);
        assert_eq!(json["patients"].as_array().unwrap().len(), 1);

        let uri = format!("/api/doctors/{}/missed-checkins?days=3", s.doctor);
        let (_, json) = send(s.app(), "GET", &uri, None).await;
        assert!(json["patients"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missed_checkins_rejects_zero_days() {
        let s = seeded(vec![]);
        let uri = format!("/api/doctors/{}/missed-checkins?days=0", s.doctor);
        let (status, _) = send(s.app(), "GET", &uri, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn declining_uses_three_day_change() {
        let s = seeded(vec![]);
        add_session(&s, 2, 80.0);
        add_session(&s, 1, 80.0);
        add_session(&s, 0, 40.0);

        let recompute = format!("/api/patients/{}/recompute", s.patient);
        let (status, json) = send(s.app(), "POST", &recompute, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["trend"]["three_day"], -40.0);

        let uri = format!("/api/doctors/{}/declining", s.doctor);
        let (_, json) = send(s.app(), "GET", &uri, None).await;
        assert_eq!(json["threshold"], -20.0);
        assert_eq!(json["patients"].as_array().unwrap().len(), 1);

        let uri = format!("/api/doctors/{}/declining?threshold=-50", s.doctor);
        let (_, json) = send(s.app(), "GET", &uri, None).await;
        assert!(json["patients"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn recompute_without_history_is_404() {
        let s = seeded(vec![]);
        let uri = format!("/api/patients/{}/recompute", s.patient);
        let (status, _) = send(s.app(), "POST", &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn recompute_unknown_patient_is_404() {
        let s = seeded(vec![]);
        let uri = format!("/api/patients/{}/recompute", Uuid::new_v4());
        let (status, _) = send(s.app(), "POST", &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn sessions_and_messages() {
        let s = seeded(vec![]);
        let session_id = add_session(&s, 0, 64.0);

        let uri = format!("/api/patients/{}/sessions", s.patient);
        let (status, json) = send(s.app(), "GET", &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["sessions"].as_array().unwrap().len(), 1);
        assert_eq!(json["sessions"][0]["sentiment_score"], 64.0);

        let uri = format!("/api/sessions/{session_id}/messages");
        let (status, json) = send(s.app(), "GET", &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["messages"][0]["response"], "fine");

        let uri = format!("/api/sessions/{}/messages", Uuid::new_v4());
        let (status, _) = send(s.app(), "GET", &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn schedule_update_validates_input() {
        let s = seeded(vec![]);
        let uri = format!("/api/patients/{}/schedule", s.patient);

        let (status, _) = send(
            s.app(),
            "PUT",
            &uri,
            Some(json!({ "timezone": "Mars/Olympus", "chat_time": "09:00" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            s.app(),
            "PUT",
            &uri,
            Some(json!({ "timezone": "Europe/Paris", "chat_time": "9am" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, json) = send(
            s.app(),
            "PUT",
            &uri,
            Some(json!({ "timezone": "Europe/Paris", "chat_time": " 09:05 " })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["chat_time"], "09:05");

        let patient = s.core.ensure_patient(&s.patient).unwrap();
        assert_eq!(patient.timezone, "Europe/Paris");
        assert_eq!(patient.chat_time.as_deref(), Some("09:05"));
    }
}
