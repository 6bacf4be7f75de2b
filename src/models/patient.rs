use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::Role;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub chat_id: Option<i64>,
    pub is_first_login: bool,
    pub created_at: DateTime<Utc>,
}

/// The derived trend metrics cached on a patient row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TrendTriple {
    pub cumulative: f64,
    pub day_on_day: f64,
    pub three_day: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    pub id: Uuid,
    pub name: String,
    pub chat_id: Option<i64>,
    pub condition: Option<String>,
    /// IANA zone name, e.g. `Europe/London`.
    pub timezone: String,
    /// Local `HH:MM` at which the daily prompt is offered.
    pub chat_time: Option<String>,
    pub trend: TrendTriple,
    pub trend_updated_at: Option<DateTime<Utc>>,
}

impl Patient {
    pub fn first_name(&self) -> &str {
        self.name.split_whitespace().next().unwrap_or("there")
    }

    /// Resolved timezone. Unknown zone names fall back to UTC.
    pub fn tz(&self) -> Tz {
        match self.timezone.parse::<Tz>() {
            Ok(tz) => tz,
            Err(_) => {
                tracing::warn!(
                    patient_id = %self.id,
                    timezone = %self.timezone,
                    "Unknown patient timezone, using UTC"
                );
                Tz::UTC
            }
        }
    }

    /// Calendar day of `at` in the patient's own timezone.
    pub fn local_date(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.tz()).date_naive()
    }

    pub fn local_time(&self, at: DateTime<Utc>) -> NaiveTime {
        at.with_timezone(&self.tz()).time()
    }

    pub fn parsed_chat_time(&self) -> Option<NaiveTime> {
        self.chat_time
            .as_deref()
            .and_then(|t| NaiveTime::parse_from_str(t.trim(), "%H:%M").ok())
    }

    /// `chat_time` when `at` is still before it on the patient's local day.
    pub fn opens_later(&self, at: DateTime<Utc>) -> Option<NaiveTime> {
        self.parsed_chat_time()
            .filter(|opens_at| self.local_time(at) < *opens_at)
    }
}

/// Patient row as shown on a clinician's dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignedPatient {
    pub patient_id: Uuid,
    pub name: String,
    pub condition: Option<String>,
    pub start_date: NaiveDate,
    pub trend: TrendTriple,
    pub last_checkin: Option<NaiveDate>,
}
