//! Storage boundary for the check-in pipeline.
//!
//! Each method is atomic on its own. Consistency across calls (read history,
//! write trend, upsert alerts) comes from the per-patient lease held by the
//! caller, not from the store.

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use super::PipelineError;
use crate::db::{AlertWrite, NewMessage};
use crate::models::enums::{AlertType, ResolvedBy};
use crate::models::*;

pub trait CheckinStore: Send + Sync {
    fn get_patient(&self, patient_id: &Uuid) -> Result<Option<Patient>, PipelineError>;

    /// Patients with both a chat identity and a preferred chat time.
    fn list_schedulable_patients(&self) -> Result<Vec<Patient>, PipelineError>;

    /// Full history, ordered by date ascending.
    fn get_session_history(&self, patient_id: &Uuid) -> Result<Vec<SessionScore>, PipelineError>;

    fn get_session_for_date(
        &self,
        patient_id: &Uuid,
        date: NaiveDate,
    ) -> Result<Option<SessionScore>, PipelineError>;

    /// Insert or replace the (patient, date) row together with its messages.
    /// Returns the stored row id.
    fn upsert_session_score(
        &self,
        session: &SessionScore,
        messages: &[NewMessage],
    ) -> Result<Uuid, PipelineError>;

    fn get_patient_trend(&self, patient_id: &Uuid) -> Result<Option<TrendTriple>, PipelineError>;

    fn set_patient_trend(
        &self,
        patient_id: &Uuid,
        trend: &TrendTriple,
        at: &DateTime<Utc>,
    ) -> Result<(), PipelineError>;

    /// Create a pending alert or refresh the existing pending one, reporting which.
    fn upsert_alert(
        &self,
        patient_id: &Uuid,
        alert_type: AlertType,
        condition: Option<&str>,
        message: &str,
        now: &DateTime<Utc>,
    ) -> Result<AlertWrite, PipelineError>;

    fn resolve_alert(
        &self,
        alert_id: &Uuid,
        resolved_by: ResolvedBy,
        now: &DateTime<Utc>,
    ) -> Result<ResolveOutcome, PipelineError>;

    fn get_pending_alert(
        &self,
        patient_id: &Uuid,
        alert_type: AlertType,
    ) -> Result<Option<Alert>, PipelineError>;

    fn has_assigned_clinician(&self, patient_id: &Uuid) -> Result<bool, PipelineError>;
}
