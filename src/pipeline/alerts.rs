//! Alert Engine: opens, refreshes and auto-resolves alerts from a fresh trend.
//!
//! Each alert type is evaluated on its own: a concern opens or refreshes the
//! pending alert, recovery resolves it, anything else leaves it alone.
//! `professional_help` is raised only on patient request and is never
//! resolved here.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::traits::CheckinStore;
use super::PipelineError;
use crate::db::AlertWrite;
use crate::models::enums::{AlertType, ResolvedBy};
use crate::models::{Patient, TrendTriple};

/// What happened to one alert type during an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "action", content = "alert_id")]
pub enum AlertAction {
    Opened(Uuid),
    Refreshed(Uuid),
    Resolved(Uuid),
    /// A concern was found but the patient has no assigned clinician.
    Rejected,
    Unchanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AlertOutcome {
    pub alert_type: AlertType,
    #[serde(flatten)]
    pub action: AlertAction,
}

enum Verdict {
    Concern(String),
    Recovered,
}

#[derive(Debug, Clone, Copy)]
pub struct AlertEngine {
    low_sentiment_threshold: f64,
    rapid_decline_delta: f64,
}

impl AlertEngine {
    pub fn new(low_sentiment_threshold: f64, rapid_decline_delta: f64) -> Self {
        Self {
            low_sentiment_threshold,
            rapid_decline_delta,
        }
    }

    /// Evaluate both score-driven alert types for `patient`.
    ///
    /// `latest_score` is the session the trend was derived from. An alert that
    /// cannot be opened for lack of a clinician is logged and reported as
    /// `Rejected`; evaluation of the other type still runs.
    pub fn evaluate(
        &self,
        store: &dyn CheckinStore,
        patient: &Patient,
        trend: &TrendTriple,
        latest_score: f64,
        now: DateTime<Utc>,
    ) -> Result<Vec<AlertOutcome>, PipelineError> {
        let verdicts = [
            (AlertType::LowSentiment, self.low_sentiment(trend, latest_score)),
            (AlertType::RapidDecline, self.rapid_decline(trend)),
        ];

        let mut outcomes = Vec::with_capacity(verdicts.len());
        for (alert_type, verdict) in verdicts {
            let action = match verdict {
                Verdict::Concern(message) => {
                    match ensure_alert(store, patient, alert_type, &message, now) {
                        Ok(action) => action,
                        Err(PipelineError::UnknownPatient { patient_id }) => {
                            tracing::warn!(
                                patient_id = %patient_id,
                                alert_type = %alert_type,
                                "Alert rejected: patient has no assigned clinician"
                            );
                            AlertAction::Rejected
                        }
                        Err(e) => return Err(e),
                    }
                }
                Verdict::Recovered => auto_resolve(store, &patient.id, alert_type, now)?,
            };
            outcomes.push(AlertOutcome { alert_type, action });
        }
        Ok(outcomes)
    }

    fn low_sentiment(&self, trend: &TrendTriple, latest_score: f64) -> Verdict {
        let threshold = self.low_sentiment_threshold;
        if trend.cumulative < threshold || latest_score < threshold {
            Verdict::Concern(format!(
                "Low sentiment: today's check-in scored {latest_score:.1}, \
                 overall average {:.1} (threshold {threshold:.0})",
                trend.cumulative
            ))
        } else {
            Verdict::Recovered
        }
    }

    fn rapid_decline(&self, trend: &TrendTriple) -> Verdict {
        if trend.three_day < -self.rapid_decline_delta {
            Verdict::Concern(format!(
                "Rapid decline: {:.1} points below the recent average \
                 (day-on-day {:+.1}, limit {:.0})",
                -trend.three_day, trend.day_on_day, self.rapid_decline_delta
            ))
        } else {
            Verdict::Recovered
        }
    }
}

impl Default for AlertEngine {
    fn default() -> Self {
        Self::new(40.0, 20.0)
    }
}

/// Open or refresh the pending alert of `alert_type`.
///
/// Fails with `UnknownPatient` when nobody would see the alert.
pub fn ensure_alert(
    store: &dyn CheckinStore,
    patient: &Patient,
    alert_type: AlertType,
    message: &str,
    now: DateTime<Utc>,
) -> Result<AlertAction, PipelineError> {
    if !store.has_assigned_clinician(&patient.id)? {
        return Err(PipelineError::UnknownPatient {
            patient_id: patient.id,
        });
    }

    let message = match &patient.condition {
        Some(condition) => format!("{message} [condition: {condition}]"),
        None => message.to_string(),
    };
    let write = store.upsert_alert(
        &patient.id,
        alert_type,
        patient.condition.as_deref(),
        &message,
        &now,
    )?;

    match write {
        AlertWrite::Refreshed(id) => {
            tracing::debug!(patient_id = %patient.id, alert_type = %alert_type, alert_id = %id, "Alert refreshed");
            Ok(AlertAction::Refreshed(id))
        }
        AlertWrite::Inserted(id) => {
            tracing::info!(patient_id = %patient.id, alert_type = %alert_type, alert_id = %id, "Alert opened");
            Ok(AlertAction::Opened(id))
        }
    }
}

fn auto_resolve(
    store: &dyn CheckinStore,
    patient_id: &Uuid,
    alert_type: AlertType,
    now: DateTime<Utc>,
) -> Result<AlertAction, PipelineError> {
    let Some(pending) = store.get_pending_alert(patient_id, alert_type)? else {
        return Ok(AlertAction::Unchanged);
    };
    store.resolve_alert(&pending.id, ResolvedBy::Automatic, &now)?;
    tracing::info!(patient_id = %patient_id, alert_type = %alert_type, alert_id = %pending.id, "Alert auto-resolved");
    Ok(AlertAction::Resolved(pending.id))
}

/// Patient-initiated request to talk to a clinician.
pub fn request_professional_help(
    store: &dyn CheckinStore,
    patient_id: Uuid,
    now: DateTime<Utc>,
) -> Result<AlertAction, PipelineError> {
    let patient = store
        .get_patient(&patient_id)?
        .ok_or(PipelineError::UnknownPatientRecord { patient_id })?;
    let message = format!("{} has requested to speak with a professional", patient.name);
    ensure_alert(store, &patient, AlertType::ProfessionalHelp, &message, now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{self, NewClinician, NewMessage, NewPatient};
    use crate::models::enums::Role;
    use crate::models::{Alert, ResolveOutcome, SessionScore};
    use crate::pipeline::store::SqliteCheckinStore;
    use chrono::NaiveDate;

    struct Fixture {
        store: SqliteCheckinStore,
        patient: Patient,
    }

    fn fixture(assigned: bool) -> Fixture {
        let store = SqliteCheckinStore::in_memory().unwrap();
        let patient_id = store
            .with_conn(|conn| {
                let pid = db::insert_patient(
                    conn,
                    &NewPatient {
                        name: "Rosa Parks".into(),
                        email: "rosa@example.org".into(),
                        chat_id: None,
                        condition: Some("depression".into()),
                        timezone: "UTC".into(),
                        chat_time: None,
                    },
                )?;
                if assigned {
                    let doc = db::insert_clinician(
                        conn,
                        &NewClinician {
                            name: "Dr Lee".into(),
                            email: "lee@clinic.org".into(),
                            role: Role::Doctor,
                            chat_id: None,
                            specialty: None,
                            license_number: "L".into(),
                            institution: "I".into(),
                        },
                    )?;
                    db::assign_patient(conn, &doc, &pid, NaiveDate::from_ymd_opt(2025, 1, 1).unwrap())?;
                }
                Ok(pid)
            })
            .unwrap();
        let patient = store.get_patient(&patient_id).unwrap().unwrap();
        Fixture { store, patient }
    }

    fn trend(cumulative: f64, day_on_day: f64, three_day: f64) -> TrendTriple {
        TrendTriple {
            cumulative,
            day_on_day,
            three_day,
        }
    }

    fn action_for(outcomes: &[AlertOutcome], alert_type: AlertType) -> AlertAction {
        outcomes
            .iter()
            .find(|o| o.alert_type == alert_type)
            .map(|o| o.action)
            .unwrap()
    }

    #[test]
    fn healthy_trend_changes_nothing() {
        let f = fixture(true);
        let outcomes = AlertEngine::default()
            .evaluate(&f.store, &f.patient, &trend(70.0, 0.0, 0.0), 70.0, Utc::now())
            .unwrap();
        assert!(outcomes.iter().all(|o| o.action == AlertAction::Unchanged));
    }

    #[test]
    fn low_daily_score_opens_then_refreshes() {
        let f = fixture(true);
        let engine = AlertEngine::default();
        let first = engine
            .evaluate(&f.store, &f.patient, &trend(50.0, -40.0, -40.0), 30.0, Utc::now())
            .unwrap();
        let AlertAction::Opened(id) = action_for(&first, AlertType::LowSentiment) else {
            panic!("expected opened");
        };
        assert!(matches!(action_for(&first, AlertType::RapidDecline), AlertAction::Opened(_)));

        let second = engine
            .evaluate(&f.store, &f.patient, &trend(45.0, -5.0, -10.0), 25.0, Utc::now())
            .unwrap();
        assert_eq!(action_for(&second, AlertType::LowSentiment), AlertAction::Refreshed(id));
        assert!(matches!(action_for(&second, AlertType::RapidDecline), AlertAction::Resolved(_)));

        let pending = f
            .store
            .get_pending_alert(&f.patient.id, AlertType::LowSentiment)
            .unwrap()
            .unwrap();
        assert_eq!(pending.condition.as_deref(), Some("depression"));
        assert!(pending.message.contains("25.0"));
    }

    #[test]
    fn recovery_resolves_automatically() {
        let f = fixture(true);
        let engine = AlertEngine::default();
        engine
            .evaluate(&f.store, &f.patient, &trend(35.0, 0.0, 0.0), 35.0, Utc::now())
            .unwrap();
        let outcomes = engine
            .evaluate(&f.store, &f.patient, &trend(61.0, 55.0, 35.0), 85.0, Utc::now())
            .unwrap();
        let AlertAction::Resolved(id) = action_for(&outcomes, AlertType::LowSentiment) else {
            panic!("expected resolved");
        };
        let alert = f.store.with_conn(|conn| db::get_alert(conn, &id)).unwrap().unwrap();
        assert_eq!(alert.resolved_by, Some(ResolvedBy::Automatic));
        assert!(alert.resolved_at.is_some());
    }

    #[test]
    fn drop_at_exactly_the_delta_does_not_fire() {
        let f = fixture(true);
        let outcomes = AlertEngine::default()
            .evaluate(&f.store, &f.patient, &trend(60.0, -20.0, -20.0), 50.0, Utc::now())
            .unwrap();
        assert_eq!(action_for(&outcomes, AlertType::RapidDecline), AlertAction::Unchanged);
    }

    #[test]
    fn unassigned_patient_is_rejected_not_created() {
        let f = fixture(false);
        let outcomes = AlertEngine::default()
            .evaluate(&f.store, &f.patient, &trend(20.0, -50.0, -50.0), 20.0, Utc::now())
            .unwrap();
        assert!(outcomes.iter().all(|o| o.action == AlertAction::Rejected));
        assert!(f
            .store
            .get_pending_alert(&f.patient.id, AlertType::LowSentiment)
            .unwrap()
            .is_none());
    }

    #[test]
    fn professional_help_is_never_auto_resolved() {
        let f = fixture(true);
        let action = request_professional_help(&f.store, f.patient.id, Utc::now()).unwrap();
        assert!(matches!(action, AlertAction::Opened(_)));

        AlertEngine::default()
            .evaluate(&f.store, &f.patient, &trend(90.0, 10.0, 10.0), 90.0, Utc::now())
            .unwrap();
        assert!(f
            .store
            .get_pending_alert(&f.patient.id, AlertType::ProfessionalHelp)
            .unwrap()
            .is_some());
    }

    #[test]
    fn professional_help_for_unknown_patient() {
        let f = fixture(true);
        let result = request_professional_help(&f.store, Uuid::new_v4(), Utc::now());
        assert!(matches!(result, Err(PipelineError::UnknownPatientRecord { .. })));

        let lonely = fixture(false);
        let result = request_professional_help(&lonely.store, lonely.patient.id, Utc::now());
        assert!(matches!(result, Err(PipelineError::UnknownPatient { .. })));
    }

    /// Reports a pending alert that a clinician has since resolved.
    struct StalePendingStore<'a> {
        inner: &'a SqliteCheckinStore,
        stale: Alert,
    }

    impl CheckinStore for StalePendingStore<'_> {
        fn get_patient(&self, patient_id: &Uuid) -> Result<Option<Patient>, PipelineError> {
            self.inner.get_patient(patient_id)
        }
        fn list_schedulable_patients(&self) -> Result<Vec<Patient>, PipelineError> {
            self.inner.list_schedulable_patients()
        }
        fn get_session_history(&self, patient_id: &Uuid) -> Result<Vec<SessionScore>, PipelineError> {
            self.inner.get_session_history(patient_id)
        }
        fn get_session_for_date(
            &self,
            patient_id: &Uuid,
            date: NaiveDate,
        ) -> Result<Option<SessionScore>, PipelineError> {
            self.inner.get_session_for_date(patient_id, date)
        }
        fn upsert_session_score(
            &self,
            session: &SessionScore,
            messages: &[NewMessage],
        ) -> Result<Uuid, PipelineError> {
            self.inner.upsert_session_score(session, messages)
        }
        fn get_patient_trend(&self, patient_id: &Uuid) -> Result<Option<TrendTriple>, PipelineError> {
            self.inner.get_patient_trend(patient_id)
        }
        fn set_patient_trend(
            &self,
            patient_id: &Uuid,
            trend: &TrendTriple,
            at: &DateTime<Utc>,
        ) -> Result<(), PipelineError> {
            self.inner.set_patient_trend(patient_id, trend, at)
        }
        fn upsert_alert(
            &self,
            patient_id: &Uuid,
            alert_type: AlertType,
            condition: Option<&str>,
            message: &str,
            now: &DateTime<Utc>,
        ) -> Result<AlertWrite, PipelineError> {
            self.inner.upsert_alert(patient_id, alert_type, condition, message, now)
        }
        fn resolve_alert(
            &self,
            alert_id: &Uuid,
            resolved_by: ResolvedBy,
            now: &DateTime<Utc>,
        ) -> Result<ResolveOutcome, PipelineError> {
            self.inner.resolve_alert(alert_id, resolved_by, now)
        }
        fn get_pending_alert(
            &self,
            _patient_id: &Uuid,
            _alert_type: AlertType,
        ) -> Result<Option<Alert>, PipelineError> {
            Ok(Some(self.stale.clone()))
        }
        fn has_assigned_clinician(&self, patient_id: &Uuid) -> Result<bool, PipelineError> {
            self.inner.has_assigned_clinician(patient_id)
        }
    }

    #[test]
    fn alert_resolved_under_us_is_reported_as_opened() {
        let f = fixture(true);
        let first = request_professional_help(&f.store, f.patient.id, Utc::now()).unwrap();
        let AlertAction::Opened(old_id) = first else {
            panic!("expected opened");
        };
        let stale = f
            .store
            .get_pending_alert(&f.patient.id, AlertType::ProfessionalHelp)
            .unwrap()
            .unwrap();
        f.store
            .resolve_alert(&old_id, ResolvedBy::Clinician, &Utc::now())
            .unwrap();

        let racing = StalePendingStore {
            inner: &f.store,
            stale,
        };
        let action = request_professional_help(&racing, f.patient.id, Utc::now()).unwrap();
        let AlertAction::Opened(new_id) = action else {
            panic!("expected a new alert, got {action:?}");
        };
        assert_ne!(new_id, old_id);
    }

    #[test]
    fn outcome_serializes_flat() {
        let outcome = AlertOutcome {
            alert_type: AlertType::RapidDecline,
            action: AlertAction::Unchanged,
        };
        let json = serde_json::to_value(outcome).unwrap();
        assert_eq!(json["alert_type"], "rapid_decline");
        assert_eq!(json["action"], "unchanged");
    }
}
