use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One completed check-in. `sentiment_score` is on the 0-100 scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionScore {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub date: NaiveDate,
    pub timestamp: DateTime<Utc>,
    pub sentiment_score: f64,
}

/// A question/answer pair persisted with its session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: Uuid,
    pub session_id: Uuid,
    pub patient_id: Uuid,
    pub position: u32,
    pub question: String,
    pub response: String,
    /// 0-100 scale.
    pub sentiment_score: f64,
    pub answered_at: DateTime<Utc>,
}
