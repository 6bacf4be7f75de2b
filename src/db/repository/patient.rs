use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::db::{format_timestamp, parse_date, parse_timestamp, parse_uuid, DatabaseError};
use crate::models::enums::Role;
use crate::models::*;

/// Input for creating a patient account (user row + patient extension).
#[derive(Debug, Clone)]
pub struct NewPatient {
    pub name: String,
    pub email: String,
    pub chat_id: Option<i64>,
    pub condition: Option<String>,
    pub timezone: String,
    pub chat_time: Option<String>,
}

pub fn insert_user(
    conn: &Connection,
    name: &str,
    email: &str,
    role: Role,
    chat_id: Option<i64>,
) -> Result<Uuid, DatabaseError> {
    let id = Uuid::new_v4();
    conn.execute(
        "INSERT INTO users (id, name, email, role, chat_id, is_first_login, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6)",
        params![
            id.to_string(),
            name,
            email,
            role.as_str(),
            chat_id,
            format_timestamp(&Utc::now()),
        ],
    )?;
    Ok(id)
}

pub fn get_user(conn: &Connection, id: &Uuid) -> Result<Option<User>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, name, email, role, chat_id, is_first_login, created_at
             FROM users WHERE id = ?1",
            params![id.to_string()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<i64>>(4)?,
                    row.get::<_, i32>(5)?,
                    row.get::<_, String>(6)?,
                ))
            },
        )
        .optional()?;

    match row {
        None => Ok(None),
        Some((id, name, email, role, chat_id, first_login, created_at)) => Ok(Some(User {
            id: parse_uuid(&id)?,
            name,
            email,
            role: Role::from_str(&role)?,
            chat_id,
            is_first_login: first_login != 0,
            created_at: parse_timestamp(&created_at)?,
        })),
    }
}

/// Creates the user row and its patient extension in one transaction.
pub fn insert_patient(conn: &Connection, patient: &NewPatient) -> Result<Uuid, DatabaseError> {
    let tx = conn.unchecked_transaction()?;
    let id = insert_user(&tx, &patient.name, &patient.email, Role::Patient, patient.chat_id)?;
    tx.execute(
        "INSERT INTO patients (id, condition, timezone, chat_time)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            id.to_string(),
            patient.condition,
            patient.timezone,
            patient.chat_time,
        ],
    )?;
    tx.commit()?;
    Ok(id)
}

const PATIENT_COLUMNS: &str = "p.id, u.name, u.chat_id, p.condition, p.timezone, p.chat_time,
     p.cumulative_score, p.day_on_day_score, p.three_day_score, p.trend_updated_at";

type PatientRow = (
    String,
    String,
    Option<i64>,
    Option<String>,
    String,
    Option<String>,
    f64,
    f64,
    f64,
    Option<String>,
);

fn read_patient_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PatientRow> {
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

fn patient_from_row(row: PatientRow) -> Result<Patient, DatabaseError> {
    let (id, name, chat_id, condition, timezone, chat_time, cumulative, day_on_day, three_day, updated) =
        row;
    Ok(Patient {
        id: parse_uuid(&id)?,
        name,
        chat_id,
        condition,
        timezone,
        chat_time,
        trend: TrendTriple {
            cumulative,
            day_on_day,
            three_day,
        },
        trend_updated_at: updated.as_deref().map(parse_timestamp).transpose()?,
    })
}

pub fn get_patient(conn: &Connection, id: &Uuid) -> Result<Option<Patient>, DatabaseError> {
    let sql = format!(
        "SELECT {PATIENT_COLUMNS} FROM patients p JOIN users u ON u.id = p.id WHERE p.id = ?1"
    );
    let row = conn
        .query_row(&sql, params![id.to_string()], read_patient_row)
        .optional()?;
    row.map(patient_from_row).transpose()
}

pub fn get_patient_by_chat_id(
    conn: &Connection,
    chat_id: i64,
) -> Result<Option<Patient>, DatabaseError> {
    let sql = format!(
        "SELECT {PATIENT_COLUMNS} FROM patients p JOIN users u ON u.id = p.id WHERE u.chat_id = ?1"
    );
    let row = conn
        .query_row(&sql, params![chat_id], read_patient_row)
        .optional()?;
    row.map(patient_from_row).transpose()
}

/// All patients with a preferred chat time and a chat identity.
pub fn list_schedulable_patients(conn: &Connection) -> Result<Vec<Patient>, DatabaseError> {
    let sql = format!(
        "SELECT {PATIENT_COLUMNS} FROM patients p JOIN users u ON u.id = p.id
         WHERE u.chat_id IS NOT NULL AND p.chat_time IS NOT NULL
         ORDER BY u.name"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], read_patient_row)?;

    let mut patients = Vec::new();
    for row in rows {
        patients.push(patient_from_row(row?)?);
    }
    Ok(patients)
}

pub fn update_patient_schedule(
    conn: &Connection,
    id: &Uuid,
    timezone: &str,
    chat_time: &str,
) -> Result<(), DatabaseError> {
    let updated = conn.execute(
        "UPDATE patients SET timezone = ?1, chat_time = ?2 WHERE id = ?3",
        params![timezone, chat_time, id.to_string()],
    )?;
    if updated == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Patient".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

pub fn get_patient_trend(
    conn: &Connection,
    id: &Uuid,
) -> Result<Option<TrendTriple>, DatabaseError> {
    let trend = conn
        .query_row(
            "SELECT cumulative_score, day_on_day_score, three_day_score
             FROM patients WHERE id = ?1",
            params![id.to_string()],
            |row| {
                Ok(TrendTriple {
                    cumulative: row.get(0)?,
                    day_on_day: row.get(1)?,
                    three_day: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(trend)
}

/// Overwrites the cached trend triple. Only the trend engine calls this.
pub fn set_patient_trend(
    conn: &Connection,
    id: &Uuid,
    trend: &TrendTriple,
    at: &DateTime<Utc>,
) -> Result<(), DatabaseError> {
    let updated = conn.execute(
        "UPDATE patients
         SET cumulative_score = ?1, day_on_day_score = ?2, three_day_score = ?3,
             trend_updated_at = ?4
         WHERE id = ?5",
        params![
            trend.cumulative,
            trend.day_on_day,
            trend.three_day,
            format_timestamp(at),
            id.to_string(),
        ],
    )?;
    if updated == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Patient".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

/// Patients (with chat identity) that have no session on or after `since`.
pub fn list_patients_missing_checkins(
    conn: &Connection,
    doctor_id: &Uuid,
    since: NaiveDate,
) -> Result<Vec<AssignedPatient>, DatabaseError> {
    let all = list_patients_for_doctor(conn, doctor_id)?;
    Ok(all
        .into_iter()
        .filter(|p| p.last_checkin.map_or(true, |d| d < since))
        .collect())
}

/// Patients assigned to `doctor_id` whose three-day score is below `threshold`.
pub fn list_declining_patients(
    conn: &Connection,
    doctor_id: &Uuid,
    threshold: f64,
) -> Result<Vec<AssignedPatient>, DatabaseError> {
    let all = list_patients_for_doctor(conn, doctor_id)?;
    Ok(all
        .into_iter()
        .filter(|p| p.trend.three_day < threshold)
        .collect())
}

pub fn list_patients_for_doctor(
    conn: &Connection,
    doctor_id: &Uuid,
) -> Result<Vec<AssignedPatient>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT p.id, u.name, p.condition, dp.start_date,
                p.cumulative_score, p.day_on_day_score, p.three_day_score,
                (SELECT MAX(s.date) FROM session_scores s WHERE s.patient_id = p.id)
         FROM doctor_patient dp
         JOIN patients p ON p.id = dp.patient_id
         JOIN users u ON u.id = p.id
         WHERE dp.doctor_id = ?1
         ORDER BY u.name",
    )?;

    let rows = stmt.query_map(params![doctor_id.to_string()], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, Option<String>>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, f64>(4)?,
            row.get::<_, f64>(5)?,
            row.get::<_, f64>(6)?,
            row.get::<_, Option<String>>(7)?,
        ))
    })?;

    let mut patients = Vec::new();
    for row in rows {
        let (id, name, condition, start_date, cumulative, day_on_day, three_day, last) = row?;
        patients.push(AssignedPatient {
            patient_id: parse_uuid(&id)?,
            name,
            condition,
            start_date: parse_date(&start_date)?,
            trend: TrendTriple {
                cumulative,
                day_on_day,
                three_day,
            },
            last_checkin: last.as_deref().map(parse_date).transpose()?,
        });
    }
    Ok(patients)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;

    fn test_db() -> Connection {
        open_memory_database().expect("in-memory DB")
    }

    fn make_patient(name: &str, chat_id: Option<i64>) -> NewPatient {
        NewPatient {
            name: name.into(),
            email: format!("{}@example.org", name.to_lowercase().replace(' ', ".")),
            chat_id,
            condition: Some("anxiety".into()),
            timezone: "Europe/Paris".into(),
            chat_time: Some("08:00".into()),
        }
    }

    #[test]
    fn insert_and_get_patient() {
        let conn = test_db();
        let id = insert_patient(&conn, &make_patient("Grace Hopper", Some(7))).unwrap();

        let patient = get_patient(&conn, &id).unwrap().unwrap();
        assert_eq!(patient.name, "Grace Hopper");
        assert_eq!(patient.timezone, "Europe/Paris");
        assert_eq!(patient.trend, TrendTriple::default());
        assert!(patient.trend_updated_at.is_none());

        let user = get_user(&conn, &id).unwrap().unwrap();
        assert_eq!(user.role, Role::Patient);
        assert!(user.is_first_login);
    }

    #[test]
    fn get_missing_patient_returns_none() {
        let conn = test_db();
        assert!(get_patient(&conn, &Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn lookup_by_chat_id() {
        let conn = test_db();
        let id = insert_patient(&conn, &make_patient("Alan Turing", Some(99))).unwrap();
        let found = get_patient_by_chat_id(&conn, 99).unwrap().unwrap();
        assert_eq!(found.id, id);
        assert!(get_patient_by_chat_id(&conn, 100).unwrap().is_none());
    }

    #[test]
    fn duplicate_chat_id_is_rejected() {
        let conn = test_db();
        insert_patient(&conn, &make_patient("First One", Some(5))).unwrap();
        let mut second = make_patient("Second One", Some(5));
        second.email = "other@example.org".into();
        assert!(insert_patient(&conn, &second).is_err());
    }

    #[test]
    fn trend_round_trip() {
        let conn = test_db();
        let id = insert_patient(&conn, &make_patient("Ada King", None)).unwrap();
        let trend = TrendTriple {
            cumulative: 61.5,
            day_on_day: -12.25,
            three_day: 4.0,
        };
        set_patient_trend(&conn, &id, &trend, &Utc::now()).unwrap();
        assert_eq!(get_patient_trend(&conn, &id).unwrap(), Some(trend));
    }

    #[test]
    fn set_trend_on_unknown_patient_is_not_found() {
        let conn = test_db();
        let result = set_patient_trend(&conn, &Uuid::new_v4(), &TrendTriple::default(), &Utc::now());
        assert!(matches!(result, Err(DatabaseError::NotFound { .. })));
    }

    #[test]
    fn schedulable_requires_chat_id_and_time() {
        let conn = test_db();
        insert_patient(&conn, &make_patient("With Chat", Some(1))).unwrap();
        insert_patient(&conn, &make_patient("No Chat", None)).unwrap();
        let mut no_time = make_patient("No Time", Some(2));
        no_time.chat_time = None;
        insert_patient(&conn, &no_time).unwrap();

        let due = list_schedulable_patients(&conn).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].name, "With Chat");
    }

    #[test]
    fn update_schedule_changes_timezone() {
        let conn = test_db();
        let id = insert_patient(&conn, &make_patient("Mover", Some(3))).unwrap();
        update_patient_schedule(&conn, &id, "America/Chicago", "19:15").unwrap();
        let p = get_patient(&conn, &id).unwrap().unwrap();
        assert_eq!(p.timezone, "America/Chicago");
        assert_eq!(p.chat_time.as_deref(), Some("19:15"));
    }
}
