use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::db::{format_timestamp, parse_date, parse_timestamp, parse_uuid, DatabaseError, DATE_FORMAT};
use crate::models::*;

/// A question/answer pair to store alongside a session row.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub question: String,
    pub response: String,
    /// 0-100 scale.
    pub sentiment_score: f64,
    pub answered_at: chrono::DateTime<chrono::Utc>,
}

/// Writes the session for `(patient_id, date)`, replacing any earlier one for the same day.
///
/// The row id is stable across replacements; the returned id is whatever the
/// table holds after the write. Messages of a replaced session are dropped and
/// rewritten in the same transaction.
pub fn upsert_session_score(
    conn: &Connection,
    session: &SessionScore,
    messages: &[NewMessage],
) -> Result<Uuid, DatabaseError> {
    if !(0.0..=100.0).contains(&session.sentiment_score) {
        return Err(DatabaseError::ConstraintViolation(format!(
            "session score {} outside 0-100",
            session.sentiment_score
        )));
    }

    let tx = conn.unchecked_transaction()?;
    let date = session.date.format(DATE_FORMAT).to_string();

    tx.execute(
        "INSERT INTO session_scores (id, patient_id, date, timestamp, sentiment_score)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(patient_id, date) DO UPDATE SET
            timestamp = excluded.timestamp,
            sentiment_score = excluded.sentiment_score",
        params![
            session.id.to_string(),
            session.patient_id.to_string(),
            date,
            format_timestamp(&session.timestamp),
            session.sentiment_score,
        ],
    )?;

    let stored_id: String = tx.query_row(
        "SELECT id FROM session_scores WHERE patient_id = ?1 AND date = ?2",
        params![session.patient_id.to_string(), date],
        |row| row.get(0),
    )?;

    tx.execute(
        "DELETE FROM messages WHERE session_id = ?1",
        params![stored_id],
    )?;
    for (position, message) in messages.iter().enumerate() {
        tx.execute(
            "INSERT INTO messages
             (id, session_id, patient_id, position, question, response, sentiment_score, answered_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                Uuid::new_v4().to_string(),
                stored_id,
                session.patient_id.to_string(),
                position as i64,
                message.question,
                message.response,
                message.sentiment_score,
                format_timestamp(&message.answered_at),
            ],
        )?;
    }

    tx.commit()?;
    parse_uuid(&stored_id)
}

/// Full session history for a patient, oldest first.
pub fn get_session_history(
    conn: &Connection,
    patient_id: &Uuid,
) -> Result<Vec<SessionScore>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, patient_id, date, timestamp, sentiment_score
         FROM session_scores WHERE patient_id = ?1
         ORDER BY date ASC",
    )?;

    let rows = stmt.query_map(params![patient_id.to_string()], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, f64>(4)?,
        ))
    })?;

    let mut sessions = Vec::new();
    for row in rows {
        let (id, patient, date, timestamp, score) = row?;
        sessions.push(SessionScore {
            id: parse_uuid(&id)?,
            patient_id: parse_uuid(&patient)?,
            date: parse_date(&date)?,
            timestamp: parse_timestamp(&timestamp)?,
            sentiment_score: score,
        });
    }
    Ok(sessions)
}

pub fn get_session_for_date(
    conn: &Connection,
    patient_id: &Uuid,
    date: NaiveDate,
) -> Result<Option<SessionScore>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, timestamp, sentiment_score FROM session_scores
             WHERE patient_id = ?1 AND date = ?2",
            params![patient_id.to_string(), date.format(DATE_FORMAT).to_string()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, f64>(2)?,
                ))
            },
        )
        .optional()?;

    match row {
        None => Ok(None),
        Some((id, timestamp, score)) => Ok(Some(SessionScore {
            id: parse_uuid(&id)?,
            patient_id: *patient_id,
            date,
            timestamp: parse_timestamp(&timestamp)?,
            sentiment_score: score,
        })),
    }
}

pub fn list_session_messages(
    conn: &Connection,
    session_id: &Uuid,
) -> Result<Vec<StoredMessage>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, session_id, patient_id, position, question, response, sentiment_score, answered_at
         FROM messages WHERE session_id = ?1
         ORDER BY position ASC",
    )?;

    let rows = stmt.query_map(params![session_id.to_string()], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, i64>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, String>(5)?,
            row.get::<_, f64>(6)?,
            row.get::<_, String>(7)?,
        ))
    })?;

    let mut messages = Vec::new();
    for row in rows {
        let (id, session, patient, position, question, response, score, answered_at) = row?;
        messages.push(StoredMessage {
            id: parse_uuid(&id)?,
            session_id: parse_uuid(&session)?,
            patient_id: parse_uuid(&patient)?,
            position: position as u32,
            question,
            response,
            sentiment_score: score,
            answered_at: parse_timestamp(&answered_at)?,
        });
    }
    Ok(messages)
}
