//! SQLite-backed [`CheckinStore`].

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Connection;
use uuid::Uuid;

use super::traits::CheckinStore;
use super::PipelineError;
use crate::db::{self, AlertWrite, DatabaseError, NewMessage};
use crate::models::enums::{AlertType, ResolvedBy};
use crate::models::*;

/// One connection behind a mutex. Every call holds the lock for a single
/// repository operation only.
pub struct SqliteCheckinStore {
    conn: Mutex<Connection>,
}

impl SqliteCheckinStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        Ok(Self::new(db::open_database(path)?))
    }

    pub fn in_memory() -> Result<Self, DatabaseError> {
        Ok(Self::new(db::open_memory_database()?))
    }

    /// Run a repository function against the shared connection.
    pub fn with_conn<T, F>(&self, f: F) -> Result<T, PipelineError>
    where
        F: FnOnce(&Connection) -> Result<T, DatabaseError>,
    {
        let conn = self.conn.lock().map_err(|_| PipelineError::LockPoisoned)?;
        f(&conn).map_err(PipelineError::from)
    }
}

impl CheckinStore for SqliteCheckinStore {
    fn get_patient(&self, patient_id: &Uuid) -> Result<Option<Patient>, PipelineError> {
        self.with_conn(|conn| db::get_patient(conn, patient_id))
    }

    fn list_schedulable_patients(&self) -> Result<Vec<Patient>, PipelineError> {
        self.with_conn(db::list_schedulable_patients)
    }

    fn get_session_history(&self, patient_id: &Uuid) -> Result<Vec<SessionScore>, PipelineError> {
        self.with_conn(|conn| db::get_session_history(conn, patient_id))
    }

    fn get_session_for_date(
        &self,
        patient_id: &Uuid,
        date: NaiveDate,
    ) -> Result<Option<SessionScore>, PipelineError> {
        self.with_conn(|conn| db::get_session_for_date(conn, patient_id, date))
    }

    fn upsert_session_score(
        &self,
        session: &SessionScore,
        messages: &[NewMessage],
    ) -> Result<Uuid, PipelineError> {
        self.with_conn(|conn| db::upsert_session_score(conn, session, messages))
    }

    fn get_patient_trend(&self, patient_id: &Uuid) -> Result<Option<TrendTriple>, PipelineError> {
        self.with_conn(|conn| db::get_patient_trend(conn, patient_id))
    }

    fn set_patient_trend(
        &self,
        patient_id: &Uuid,
        trend: &TrendTriple,
        at: &DateTime<Utc>,
    ) -> Result<(), PipelineError> {
        self.with_conn(|conn| db::set_patient_trend(conn, patient_id, trend, at))
    }

    fn upsert_alert(
        &self,
        patient_id: &Uuid,
        alert_type: AlertType,
        condition: Option<&str>,
        message: &str,
        now: &DateTime<Utc>,
    ) -> Result<AlertWrite, PipelineError> {
        self.with_conn(|conn| db::upsert_alert(conn, patient_id, alert_type, condition, message, now))
    }

    fn resolve_alert(
        &self,
        alert_id: &Uuid,
        resolved_by: ResolvedBy,
        now: &DateTime<Utc>,
    ) -> Result<ResolveOutcome, PipelineError> {
        self.with_conn(|conn| db::resolve_alert(conn, alert_id, resolved_by, now))
    }

    fn get_pending_alert(
        &self,
        patient_id: &Uuid,
        alert_type: AlertType,
    ) -> Result<Option<Alert>, PipelineError> {
        self.with_conn(|conn| db::get_pending_alert(conn, patient_id, alert_type))
    }

    fn has_assigned_clinician(&self, patient_id: &Uuid) -> Result<bool, PipelineError> {
        self.with_conn(|conn| db::has_assigned_clinician(conn, patient_id))
    }
}
