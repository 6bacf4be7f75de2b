use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{AlertStatus, AlertType, ResolvedBy};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub alert_type: AlertType,
    pub condition: Option<String>,
    pub message: String,
    pub status: AlertStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<ResolvedBy>,
}

impl Alert {
    pub fn is_pending(&self) -> bool {
        self.status == AlertStatus::Pending
    }
}

/// Pending alert joined with the patient's name, for the clinician dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingAlertView {
    pub alert_id: Uuid,
    pub patient_id: Uuid,
    pub patient_name: String,
    pub alert_type: AlertType,
    pub condition: Option<String>,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Result of a resolve request. Resolving twice is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolveOutcome {
    Resolved,
    AlreadyResolved,
}
