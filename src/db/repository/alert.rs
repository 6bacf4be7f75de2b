use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::db::{format_timestamp, parse_timestamp, parse_uuid, DatabaseError};
use crate::models::enums::*;
use crate::models::*;

const ALERT_COLUMNS: &str = "id, patient_id, alert_type, condition, message, status,
     created_at, updated_at, resolved_at, resolved_by";

type AlertRow = (
    String,
    String,
    String,
    Option<String>,
    String,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
);

fn read_alert_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AlertRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
    ))
}

fn alert_from_row(row: AlertRow) -> Result<Alert, DatabaseError> {
    let (id, patient_id, alert_type, condition, message, status, created, updated, resolved_at, resolved_by) =
        row;
    Ok(Alert {
        id: parse_uuid(&id)?,
        patient_id: parse_uuid(&patient_id)?,
        alert_type: AlertType::from_str(&alert_type)?,
        condition,
        message,
        status: AlertStatus::from_str(&status)?,
        created_at: parse_timestamp(&created)?,
        updated_at: parse_timestamp(&updated)?,
        resolved_at: resolved_at.as_deref().map(parse_timestamp).transpose()?,
        resolved_by: resolved_by.as_deref().map(ResolvedBy::from_str).transpose()?,
    })
}

/// What [`upsert_alert`] did to the pending row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertWrite {
    Inserted(Uuid),
    Refreshed(Uuid),
}

impl AlertWrite {
    pub fn id(self) -> Uuid {
        match self {
            Self::Inserted(id) | Self::Refreshed(id) => id,
        }
    }
}

/// Opens an alert, or refreshes the pending one of the same type.
///
/// Refreshing rewrites `message`, `condition` and `updated_at`; `created_at`
/// and the id are kept. The lookup and the write share one transaction.
pub fn upsert_alert(
    conn: &Connection,
    patient_id: &Uuid,
    alert_type: AlertType,
    condition: Option<&str>,
    message: &str,
    now: &DateTime<Utc>,
) -> Result<AlertWrite, DatabaseError> {
    let tx = conn.unchecked_transaction()?;
    let ts = format_timestamp(now);

    let existing: Option<String> = tx
        .query_row(
            "SELECT id FROM alerts
             WHERE patient_id = ?1 AND alert_type = ?2 AND status = 'pending'",
            params![patient_id.to_string(), alert_type.as_str()],
            |row| row.get(0),
        )
        .optional()?;

    let write = match existing {
        Some(id) => {
            tx.execute(
                "UPDATE alerts SET message = ?1, condition = ?2, updated_at = ?3 WHERE id = ?4",
                params![message, condition, ts, id],
            )?;
            AlertWrite::Refreshed(parse_uuid(&id)?)
        }
        None => {
            let id = Uuid::new_v4();
            tx.execute(
                "INSERT INTO alerts
                 (id, patient_id, alert_type, condition, message, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 'pending', ?6, ?6)",
                params![
                    id.to_string(),
                    patient_id.to_string(),
                    alert_type.as_str(),
                    condition,
                    message,
                    ts,
                ],
            )?;
            AlertWrite::Inserted(id)
        }
    };

    tx.commit()?;
    Ok(write)
}

pub fn get_alert(conn: &Connection, id: &Uuid) -> Result<Option<Alert>, DatabaseError> {
    let sql = format!("SELECT {ALERT_COLUMNS} FROM alerts WHERE id = ?1");
    let row = conn
        .query_row(&sql, params![id.to_string()], read_alert_row)
        .optional()?;
    row.map(alert_from_row).transpose()
}

pub fn get_pending_alert(
    conn: &Connection,
    patient_id: &Uuid,
    alert_type: AlertType,
) -> Result<Option<Alert>, DatabaseError> {
    let sql = format!(
        "SELECT {ALERT_COLUMNS} FROM alerts
         WHERE patient_id = ?1 AND alert_type = ?2 AND status = 'pending'"
    );
    let row = conn
        .query_row(
            &sql,
            params![patient_id.to_string(), alert_type.as_str()],
            read_alert_row,
        )
        .optional()?;
    row.map(alert_from_row).transpose()
}

/// Marks an alert resolved. A second call reports `AlreadyResolved` and leaves
/// the original `resolved_at` untouched.
pub fn resolve_alert(
    conn: &Connection,
    id: &Uuid,
    resolved_by: ResolvedBy,
    now: &DateTime<Utc>,
) -> Result<ResolveOutcome, DatabaseError> {
    let ts = format_timestamp(now);
    let updated = conn.execute(
        "UPDATE alerts
         SET status = 'resolved', resolved_at = ?1, resolved_by = ?2, updated_at = ?1
         WHERE id = ?3 AND status = 'pending'",
        params![ts, resolved_by.as_str(), id.to_string()],
    )?;
    if updated > 0 {
        return Ok(ResolveOutcome::Resolved);
    }

    let exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM alerts WHERE id = ?1",
        params![id.to_string()],
        |row| row.get(0),
    )?;
    if exists {
        Ok(ResolveOutcome::AlreadyResolved)
    } else {
        Err(DatabaseError::NotFound {
            entity_type: "Alert".into(),
            id: id.to_string(),
        })
    }
}

/// Pending alerts for every patient assigned to `doctor_id`, newest first.
pub fn list_pending_alerts_for_doctor(
    conn: &Connection,
    doctor_id: &Uuid,
) -> Result<Vec<PendingAlertView>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT a.id, a.patient_id, u.name, a.alert_type, a.condition, a.message,
                a.created_at, a.updated_at
         FROM alerts a
         JOIN doctor_patient dp ON dp.patient_id = a.patient_id
         JOIN users u ON u.id = a.patient_id
         WHERE dp.doctor_id = ?1 AND a.status = 'pending'
         ORDER BY a.updated_at DESC, u.name ASC",
    )?;

    let rows = stmt.query_map(params![doctor_id.to_string()], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, Option<String>>(4)?,
            row.get::<_, String>(5)?,
            row.get::<_, String>(6)?,
            row.get::<_, String>(7)?,
        ))
    })?;

    let mut alerts = Vec::new();
    for row in rows {
        let (id, patient_id, name, alert_type, condition, message, created, updated) = row?;
        alerts.push(PendingAlertView {
            alert_id: parse_uuid(&id)?,
            patient_id: parse_uuid(&patient_id)?,
            patient_name: name,
            alert_type: AlertType::from_str(&alert_type)?,
            condition,
            message,
            created_at: parse_timestamp(&created)?,
            updated_at: parse_timestamp(&updated)?,
        });
    }
    Ok(alerts)
}

/// Every alert ever raised for a patient, oldest first.
pub fn list_alerts_for_patient(
    conn: &Connection,
    patient_id: &Uuid,
) -> Result<Vec<Alert>, DatabaseError> {
    let sql = format!(
        "SELECT {ALERT_COLUMNS} FROM alerts WHERE patient_id = ?1 ORDER BY created_at ASC, rowid ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![patient_id.to_string()], read_alert_row)?;

    let mut alerts = Vec::new();
    for row in rows {
        alerts.push(alert_from_row(row?)?);
    }
    Ok(alerts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::clinician::{assign_patient, insert_clinician, NewClinician};
    use crate::db::repository::patient::{insert_patient, NewPatient};
    use crate::db::sqlite::open_memory_database;
    use chrono::{Duration, NaiveDate, TimeZone};

    fn setup() -> (Connection, Uuid) {
        let conn = open_memory_database().unwrap();
        let id = insert_patient(
            &conn,
            &NewPatient {
                name: "Alert Tester".into(),
                email: "alerts@example.org".into(),
                chat_id: None,
                condition: Some("depression".into()),
                timezone: "UTC".into(),
                chat_time: None,
            },
        )
        .unwrap();
        (conn, id)
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 4, 1, 10, 0, 0).unwrap()
    }

    #[test]
    fn upsert_refreshes_pending_instead_of_duplicating() {
        let (conn, pid) = setup();
        let first = upsert_alert(&conn, &pid, AlertType::LowSentiment, Some("depression"), "low", &t0())
            .unwrap();
        let later = t0() + Duration::days(1);
        let second = upsert_alert(&conn, &pid, AlertType::LowSentiment, Some("depression"), "still low", &later)
            .unwrap();
        assert!(matches!(first, AlertWrite::Inserted(_)));
        assert_eq!(second, AlertWrite::Refreshed(first.id()));

        let all = list_alerts_for_patient(&conn, &pid).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].message, "still low");
        assert_eq!(all[0].created_at, t0());
        assert_eq!(all[0].updated_at, later);
    }

    #[test]
    fn different_types_coexist() {
        let (conn, pid) = setup();
        upsert_alert(&conn, &pid, AlertType::LowSentiment, None, "low", &t0()).unwrap();
        upsert_alert(&conn, &pid, AlertType::RapidDecline, None, "drop", &t0()).unwrap();
        assert!(get_pending_alert(&conn, &pid, AlertType::LowSentiment).unwrap().is_some());
        assert!(get_pending_alert(&conn, &pid, AlertType::RapidDecline).unwrap().is_some());
        assert!(get_pending_alert(&conn, &pid, AlertType::ProfessionalHelp).unwrap().is_none());
    }

    #[test]
    fn resolve_is_idempotent_and_keeps_first_timestamp() {
        let (conn, pid) = setup();
        let id = upsert_alert(&conn, &pid, AlertType::LowSentiment, None, "low", &t0()).unwrap().id();
        let resolved_at = t0() + Duration::hours(2);

        assert_eq!(
            resolve_alert(&conn, &id, ResolvedBy::Clinician, &resolved_at).unwrap(),
            ResolveOutcome::Resolved
        );
        let again = resolved_at + Duration::hours(5);
        assert_eq!(
            resolve_alert(&conn, &id, ResolvedBy::Automatic, &again).unwrap(),
            ResolveOutcome::AlreadyResolved
        );

        let alert = get_alert(&conn, &id).unwrap().unwrap();
        assert!(!alert.is_pending());
        assert_eq!(alert.resolved_at, Some(resolved_at));
        assert_eq!(alert.resolved_by, Some(ResolvedBy::Clinician));
    }

    #[test]
    fn resolve_unknown_alert_is_not_found() {
        let (conn, _) = setup();
        let result = resolve_alert(&conn, &Uuid::new_v4(), ResolvedBy::Clinician, &t0());
        assert!(matches!(result, Err(DatabaseError::NotFound { .. })));
    }

    #[test]
    fn new_alert_after_resolution_is_a_new_row() {
        let (conn, pid) = setup();
        let first = upsert_alert(&conn, &pid, AlertType::RapidDecline, None, "drop", &t0()).unwrap().id();
        resolve_alert(&conn, &first, ResolvedBy::Automatic, &t0()).unwrap();
        let second = upsert_alert(&conn, &pid, AlertType::RapidDecline, None, "drop again", &t0())
            .unwrap();
        let AlertWrite::Inserted(second) = second else {
            panic!("expected a fresh row, got {second:?}");
        };
        assert_ne!(first, second);
        assert_eq!(list_alerts_for_patient(&conn, &pid).unwrap().len(), 2);
    }

    #[test]
    fn partial_index_rejects_second_pending_row() {
        let (conn, pid) = setup();
        upsert_alert(&conn, &pid, AlertType::LowSentiment, None, "low", &t0()).unwrap();
        let raw = conn.execute(
            "INSERT INTO alerts (id, patient_id, alert_type, message, status, created_at, updated_at)
             VALUES (?1, ?2, 'low_sentiment', 'dup', 'pending', 'x', 'x')",
            params![Uuid::new_v4().to_string(), pid.to_string()],
        );
        assert!(raw.is_err());
    }

    #[test]
    fn doctor_dashboard_lists_only_assigned_pending() {
        let (conn, pid) = setup();
        let doc = insert_clinician(
            &conn,
            &NewClinician {
                name: "Dr Who".into(),
                email: "who@clinic.org".into(),
                role: Role::Doctor,
                chat_id: None,
                specialty: None,
                license_number: "TARDIS".into(),
                institution: "Gallifrey".into(),
            },
        )
        .unwrap();
        let open = upsert_alert(&conn, &pid, AlertType::LowSentiment, None, "low", &t0()).unwrap().id();
        let closed = upsert_alert(&conn, &pid, AlertType::RapidDecline, None, "drop", &t0()).unwrap().id();
        resolve_alert(&conn, &closed, ResolvedBy::Clinician, &t0()).unwrap();

        assert!(list_pending_alerts_for_doctor(&conn, &doc).unwrap().is_empty());

        assign_patient(&conn, &doc, &pid, NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()).unwrap();
        let pending = list_pending_alerts_for_doctor(&conn, &doc).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].alert_id, open);
        assert_eq!(pending[0].patient_name, "Alert Tester");
    }
}
