//! Session Aggregator: folds one check-in's scored answers into a Session_Score.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::traits::CheckinStore;
use super::PipelineError;
use crate::db::NewMessage;
use crate::models::SessionScore;

/// One answered question. `score` is the scorer output in [0,1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredAnswer {
    pub question: String,
    pub answer: String,
    pub score: f64,
    pub answered_at: DateTime<Utc>,
}

/// Mean of the per-answer scores rescaled to [0,100], plus the message rows.
///
/// Scores are summed in answer order so the result is deterministic.
pub fn aggregate(
    patient_id: Uuid,
    date: NaiveDate,
    answers: &[ScoredAnswer],
    completed_at: DateTime<Utc>,
) -> Result<(SessionScore, Vec<NewMessage>), PipelineError> {
    if answers.is_empty() {
        return Err(PipelineError::EmptySession { patient_id });
    }

    let sum: f64 = answers.iter().map(|a| a.score.clamp(0.0, 1.0)).sum();
    let mean = sum / answers.len() as f64;
    let sentiment_score = (mean * 100.0).clamp(0.0, 100.0);

    let messages = answers
        .iter()
        .map(|a| NewMessage {
            question: a.question.clone(),
            response: a.answer.clone(),
            sentiment_score: (a.score * 100.0).clamp(0.0, 100.0),
            answered_at: a.answered_at,
        })
        .collect();

    Ok((
        SessionScore {
            id: Uuid::new_v4(),
            patient_id,
            date,
            timestamp: completed_at,
            sentiment_score,
        },
        messages,
    ))
}

/// Aggregate and persist. A same-day re-submission replaces the day's row;
/// the returned session carries the stored id.
pub fn record_session(
    store: &dyn CheckinStore,
    patient_id: Uuid,
    date: NaiveDate,
    answers: &[ScoredAnswer],
    completed_at: DateTime<Utc>,
) -> Result<SessionScore, PipelineError> {
    let (mut session, messages) = aggregate(patient_id, date, answers, completed_at)?;
    session.id = store.upsert_session_score(&session, &messages)?;

    tracing::debug!(
        patient_id = %patient_id,
        date = %date,
        answers = answers.len(),
        score = session.sentiment_score,
        "Session aggregated"
    );
    Ok(session)
}
