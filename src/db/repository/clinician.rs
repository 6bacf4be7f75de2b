use chrono::NaiveDate;
use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::db::{DatabaseError, DATE_FORMAT};
use crate::models::enums::Role;

use super::patient::insert_user;

#[derive(Debug, Clone)]
pub struct NewClinician {
    pub name: String,
    pub email: String,
    pub role: Role,
    pub chat_id: Option<i64>,
    pub specialty: Option<String>,
    pub license_number: String,
    pub institution: String,
}

pub fn insert_clinician(conn: &Connection, clinician: &NewClinician) -> Result<Uuid, DatabaseError> {
    if clinician.role == Role::Patient {
        return Err(DatabaseError::ConstraintViolation(
            "clinician role must be doctor or nurse".into(),
        ));
    }

    let tx = conn.unchecked_transaction()?;
    let id = insert_user(
        &tx,
        &clinician.name,
        &clinician.email,
        clinician.role,
        clinician.chat_id,
    )?;
    tx.execute(
        "INSERT INTO clinicians (id, specialty, license_number, institution)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            id.to_string(),
            clinician.specialty,
            clinician.license_number,
            clinician.institution,
        ],
    )?;
    tx.commit()?;
    Ok(id)
}

/// Assigns a patient to a clinician. Re-assigning keeps the original start date.
pub fn assign_patient(
    conn: &Connection,
    doctor_id: &Uuid,
    patient_id: &Uuid,
    start_date: NaiveDate,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR IGNORE INTO doctor_patient (doctor_id, patient_id, start_date)
         VALUES (?1, ?2, ?3)",
        params![
            doctor_id.to_string(),
            patient_id.to_string(),
            start_date.format(DATE_FORMAT).to_string(),
        ],
    )?;
    Ok(())
}

pub fn unassign_patient(
    conn: &Connection,
    doctor_id: &Uuid,
    patient_id: &Uuid,
) -> Result<(), DatabaseError> {
    conn.execute(
        "DELETE FROM doctor_patient WHERE doctor_id = ?1 AND patient_id = ?2",
        params![doctor_id.to_string(), patient_id.to_string()],
    )?;
    Ok(())
}

pub fn has_assigned_clinician(conn: &Connection, patient_id: &Uuid) -> Result<bool, DatabaseError> {
    let assigned: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM doctor_patient WHERE patient_id = ?1",
        params![patient_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(assigned)
}

pub fn is_assigned(
    conn: &Connection,
    doctor_id: &Uuid,
    patient_id: &Uuid,
) -> Result<bool, DatabaseError> {
    let assigned: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM doctor_patient WHERE doctor_id = ?1 AND patient_id = ?2",
        params![doctor_id.to_string(), patient_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(assigned)
}
