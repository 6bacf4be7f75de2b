//! Check-in Orchestrator: one conversational state machine per patient per day.
//!
//! Every entry point takes the patient's lease first, so duplicate deliveries
//! and dashboard-triggered recomputes for the same patient run one at a time.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::questions::{self, QuestionBank};
use super::state::{CheckinSession, CheckinState};
use crate::config::EngineConfig;
use crate::models::enums::SameDayPolicy;
use crate::models::{Patient, TrendTriple};
use crate::pipeline::alerts::{self, AlertAction, AlertOutcome};
use crate::pipeline::{
    CheckinStore, PatientLease, PatientLeases, PipelineError, PipelineRunner, ScoredAnswer,
};
use crate::scoring::SentimentScorer;

/// What the transport should send back to the patient.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CheckinReply {
    Prompt {
        text: String,
        question_index: usize,
        total: usize,
    },
    Completed {
        text: String,
        session_score: f64,
        trend: Option<TrendTriple>,
        alerts: Vec<AlertOutcome>,
    },
    AlreadyCompleted {
        text: String,
    },
    NotYetOpen {
        text: String,
    },
    TryAgain {
        text: String,
    },
}

impl CheckinReply {
    pub fn text(&self) -> &str {
        match self {
            Self::Prompt { text, .. }
            | Self::Completed { text, .. }
            | Self::AlreadyCompleted { text }
            | Self::NotYetOpen { text }
            | Self::TryAgain { text } => text,
        }
    }

    fn try_again() -> Self {
        Self::TryAgain {
            text: questions::TRY_AGAIN.to_string(),
        }
    }
}

pub struct CheckinOrchestrator {
    runner: PipelineRunner,
    scorer: Arc<dyn SentimentScorer>,
    questions: QuestionBank,
    leases: PatientLeases,
    sessions: Mutex<HashMap<(Uuid, NaiveDate), CheckinSession>>,
    config: EngineConfig,
}

impl CheckinOrchestrator {
    pub fn new(
        store: Arc<dyn CheckinStore>,
        scorer: Arc<dyn SentimentScorer>,
        config: EngineConfig,
    ) -> Self {
        Self::with_questions(store, scorer, config, QuestionBank::default())
    }

    /// An empty bank is replaced by the default questions.
    pub fn with_questions(
        store: Arc<dyn CheckinStore>,
        scorer: Arc<dyn SentimentScorer>,
        config: EngineConfig,
        questions: QuestionBank,
    ) -> Self {
        let questions = if questions.is_empty() {
            QuestionBank::default()
        } else {
            questions
        };
        Self {
            runner: PipelineRunner::new(store, &config),
            scorer,
            questions,
            leases: PatientLeases::new(),
            sessions: Mutex::new(HashMap::new()),
            config,
        }
    }

    pub fn store(&self) -> &dyn CheckinStore {
        self.runner.store()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn scorer_name(&self) -> &'static str {
        self.scorer.name()
    }

    // ── Entry points ────────────────────────────────────────

    /// Handle one inbound patient message.
    ///
    /// Lease contention past the retry budget is not an error: the patient is
    /// asked to try again.
    pub fn handle_message(
        &self,
        patient_id: Uuid,
        text: &str,
        received_at: DateTime<Utc>,
    ) -> Result<CheckinReply, PipelineError> {
        let _lease = match self.lease(patient_id) {
            Ok(lease) => lease,
            Err(PipelineError::ConcurrencyConflict { .. }) => return Ok(CheckinReply::try_again()),
            Err(e) => return Err(e),
        };

        let patient = self
            .store()
            .get_patient(&patient_id)?
            .ok_or(PipelineError::UnknownPatientRecord { patient_id })?;
        let date = patient.local_date(received_at);

        let mut session = self.load_session(&patient, date)?;
        let reply = self.advance(&patient, &mut session, text, received_at);
        self.save_session(session)?;
        Ok(reply)
    }

    /// Mark today's check-in as offered and return the opening prompt.
    ///
    /// `None` when today's check-in was already offered or completed, or when
    /// the patient's `chat_time` has not been reached yet.
    pub fn open_checkin(
        &self,
        patient: &Patient,
        now: DateTime<Utc>,
    ) -> Result<Option<String>, PipelineError> {
        if let Some(opens_at) = patient.opens_later(now) {
            tracing::debug!(patient_id = %patient.id, opens_at = %opens_at, "Check-in not open yet");
            return Ok(None);
        }
        let _lease = self.lease(patient.id)?;
        let date = patient.local_date(now);
        let mut session = self.load_session(patient, date)?;

        let prompt = if session.state == CheckinState::NotStarted && !session.prompted {
            session.prompted = true;
            Some(self.questions.opening_prompt(patient.first_name()))
        } else {
            None
        };
        self.save_session(session)?;
        Ok(prompt)
    }

    /// Patient asked to speak with a clinician.
    pub fn request_help(&self, patient_id: Uuid, now: DateTime<Utc>) -> Result<AlertAction, PipelineError> {
        let _lease = self.lease(patient_id)?;
        alerts::request_professional_help(self.store(), patient_id, now)
    }

    /// Re-derive the trend triple from history (repair/backfill).
    pub fn recompute_trend(&self, patient_id: Uuid, now: DateTime<Utc>) -> Result<TrendTriple, PipelineError> {
        let _lease = self.lease(patient_id)?;
        self.runner.recompute_trend(patient_id, now)
    }

    /// Snapshot of the in-memory state for a patient's day, if any.
    pub fn session_snapshot(&self, patient_id: Uuid, date: NaiveDate) -> Option<CheckinSession> {
        self.sessions.lock().ok()?.get(&(patient_id, date)).cloned()
    }

    // ── State machine ───────────────────────────────────────

    fn advance(
        &self,
        patient: &Patient,
        session: &mut CheckinSession,
        text: &str,
        received_at: DateTime<Utc>,
    ) -> CheckinReply {
        match session.state {
            CheckinState::Completed => match self.config.same_day_policy {
                SameDayPolicy::Reject => CheckinReply::AlreadyCompleted {
                    text: questions::ALREADY_COMPLETED.to_string(),
                },
                SameDayPolicy::Replace => {
                    tracing::info!(patient_id = %patient.id, date = %session.date, "Reopening completed check-in");
                    session.reopen();
                    self.prompt(0, self.questions.amendment_prompt(patient.first_name()))
                }
            },
            CheckinState::NotStarted if !session.prompted => {
                if let Some(opens_at) = patient.opens_later(received_at) {
                    return CheckinReply::NotYetOpen {
                        text: self.questions.not_yet_open(&opens_at.format("%H:%M").to_string()),
                    };
                }
                session.prompted = true;
                self.prompt(0, self.questions.opening_prompt(patient.first_name()))
            }
            CheckinState::NotStarted | CheckinState::InProgress => {
                self.answer(patient, session, text, received_at)
            }
        }
    }

    fn answer(
        &self,
        patient: &Patient,
        session: &mut CheckinSession,
        text: &str,
        received_at: DateTime<Utc>,
    ) -> CheckinReply {
        let index = session.next_index();
        let question = self.questions.get(index).unwrap_or_default().to_string();
        let score = self.scorer.score(text);
        tracing::debug!(patient_id = %patient.id, question = index, score, "Answer scored");

        session.record_answer(ScoredAnswer {
            question,
            answer: text.to_string(),
            score,
            answered_at: received_at,
        });

        if !session.is_fully_answered(self.questions.len()) {
            let next = index + 1;
            let text = self.questions.get(next).unwrap_or_default().to_string();
            return self.prompt(next, text);
        }

        match self
            .runner
            .complete(patient, session.date, &session.answers, received_at)
        {
            Ok(outcome) => {
                session.mark_completed(received_at);
                CheckinReply::Completed {
                    text: questions::COMPLETION_ACK.to_string(),
                    session_score: outcome.session.sentiment_score,
                    trend: outcome.trend,
                    alerts: outcome.alerts,
                }
            }
            Err(e) => {
                tracing::warn!(patient_id = %patient.id, error = %e, "Check-in completion failed, awaiting retry");
                session.retract_last();
                CheckinReply::try_again()
            }
        }
    }

    fn prompt(&self, question_index: usize, text: String) -> CheckinReply {
        CheckinReply::Prompt {
            text,
            question_index,
            total: self.questions.len(),
        }
    }

    // ── Plumbing ────────────────────────────────────────────

    fn lease(&self, patient_id: Uuid) -> Result<PatientLease<'_>, PipelineError> {
        self.leases.acquire_with_retry(
            patient_id,
            Duration::from_millis(self.config.lease_wait_ms),
            self.config.max_lease_attempts,
        )
    }

    /// Take the day's record out of the map, or build it from storage.
    fn load_session(&self, patient: &Patient, date: NaiveDate) -> Result<CheckinSession, PipelineError> {
        let existing = self
            .sessions
            .lock()
            .map_err(|_| PipelineError::LockPoisoned)?
            .remove(&(patient.id, date));
        if let Some(session) = existing {
            return Ok(session);
        }

        Ok(match self.store().get_session_for_date(&patient.id, date)? {
            Some(stored) => CheckinSession::completed(patient.id, date, stored.timestamp),
            None => CheckinSession::new(patient.id, date),
        })
    }

    /// Put the record back, dropping the patient's records for earlier days.
    fn save_session(&self, session: CheckinSession) -> Result<(), PipelineError> {
        let mut sessions = self.sessions.lock().map_err(|_| PipelineError::LockPoisoned)?;
        let (patient_id, date) = (session.patient_id, session.date);
        sessions.retain(|(pid, d), _| *pid != patient_id || *d >= date);
        sessions.insert((patient_id, date), session);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{self, NewClinician, NewPatient};
    use crate::models::enums::{AlertType, Role};
    use crate::pipeline::SqliteCheckinStore;
    use crate::scoring::ScriptedScorer;
    use chrono::TimeZone;

    fn setup(chat_time: Option<&str>, scores: Vec<f64>, policy: SameDayPolicy) -> (Arc<SqliteCheckinStore>, CheckinOrchestrator, Uuid) {
        let store = Arc::new(SqliteCheckinStore::in_memory().unwrap());
        let pid = store
            .with_conn(|conn| {
                let pid = db::insert_patient(
                    conn,
                    &NewPatient {
                        name: "Mary Seacole".into(),
                        email: "mary@example.org".into(),
                        chat_id: Some(7),
                        condition: Some("anxiety".into()),
                        timezone: "UTC".into(),
                        chat_time: chat_time.map(Into::into),
                    },
                )?;
                let doc = db::insert_clinician(
                    conn,
                    &NewClinician {
                        name: "Dr Snow".into(),
                        email: "snow@clinic.org".into(),
                        role: Role::Doctor,
                        chat_id: None,
                        specialty: None,
                        license_number: "S".into(),
                        institution: "Soho".into(),
                    },
                )?;
                db::assign_patient(conn, &doc, &pid, NaiveDate::from_ymd_opt(2025, 1, 1).unwrap())?;
                Ok(pid)
            })
            .unwrap();

        let config = EngineConfig {
            same_day_policy: policy,
            lease_wait_ms: 20,
            ..EngineConfig::default()
        };
        let questions = QuestionBank::new(vec!["How are you?".into(), "Sleep ok?".into()]);
        let orchestrator = CheckinOrchestrator::with_questions(
            store.clone(),
            Arc::new(ScriptedScorer::new(scores)),
            config,
            questions,
        );
        (store, orchestrator, pid)
    }

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, h, m, 0).unwrap()
    }

    #[test]
    fn message_before_chat_time_is_not_yet_open() {
        let (_, orch, pid) = setup(Some("09:00"), vec![], SameDayPolicy::Replace);
        let reply = orch.handle_message(pid, "hi", at(8, 30)).unwrap();
        assert!(matches!(reply, CheckinReply::NotYetOpen { .. }));
        assert!(reply.text().contains("09:00"));
    }

    #[test]
    fn full_conversation_completes_and_persists() {
        let (store, orch, pid) = setup(Some("09:00"), vec![0.8, 0.6], SameDayPolicy::Replace);

        let opening = orch.handle_message(pid, "hello", at(9, 0)).unwrap();
        assert!(opening.text().starts_with("👋 Hey, Mary!"));

        let second = orch.handle_message(pid, "good", at(9, 1)).unwrap();
        assert!(matches!(second, CheckinReply::Prompt { question_index: 1, total: 2, .. }));
        let day = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        assert_eq!(orch.session_snapshot(pid, day).unwrap().state, CheckinState::InProgress);

        let done = orch.handle_message(pid, "yes", at(9, 2)).unwrap();
        let CheckinReply::Completed { session_score, .. } = &done else {
            panic!("expected completion, got {done:?}");
        };
        assert!((*session_score - 70.0).abs() < 1e-9);
        assert_eq!(store.get_session_history(&pid).unwrap().len(), 1);
        assert_eq!(orch.session_snapshot(pid, day).unwrap().state, CheckinState::Completed);
    }

    #[test]
    fn reject_policy_refuses_second_checkin() {
        let (_, orch, pid) = setup(None, vec![0.5, 0.5], SameDayPolicy::Reject);
        orch.handle_message(pid, "start", at(10, 0)).unwrap();
        orch.handle_message(pid, "a", at(10, 1)).unwrap();
        orch.handle_message(pid, "b", at(10, 2)).unwrap();

        let reply = orch.handle_message(pid, "again", at(11, 0)).unwrap();
        assert!(matches!(reply, CheckinReply::AlreadyCompleted { .. }));
    }

    #[test]
    fn replace_policy_reopens_and_overwrites_the_day() {
        let (store, orch, pid) = setup(None, vec![0.2, 0.2, 0.9, 0.9], SameDayPolicy::Replace);
        orch.handle_message(pid, "start", at(10, 0)).unwrap();
        orch.handle_message(pid, "bad", at(10, 1)).unwrap();
        orch.handle_message(pid, "bad", at(10, 2)).unwrap();

        let reopened = orch.handle_message(pid, "actually", at(18, 0)).unwrap();
        assert!(matches!(reopened, CheckinReply::Prompt { question_index: 0, .. }));
        orch.handle_message(pid, "great", at(18, 1)).unwrap();
        orch.handle_message(pid, "great", at(18, 2)).unwrap();

        let history = store.get_session_history(&pid).unwrap();
        assert_eq!(history.len(), 1);
        assert!((history[0].sentiment_score - 90.0).abs() < 1e-9);
    }

    #[test]
    fn completed_day_survives_restart() {
        let (store, orch, pid) = setup(None, vec![0.5, 0.5], SameDayPolicy::Reject);
        orch.handle_message(pid, "start", at(10, 0)).unwrap();
        orch.handle_message(pid, "a", at(10, 1)).unwrap();
        orch.handle_message(pid, "b", at(10, 2)).unwrap();

        let fresh = CheckinOrchestrator::new(
            store.clone(),
            Arc::new(ScriptedScorer::new([])),
            EngineConfig {
                same_day_policy: SameDayPolicy::Reject,
                ..EngineConfig::default()
            },
        );
        let reply = fresh.handle_message(pid, "hello again", at(12, 0)).unwrap();
        assert!(matches!(reply, CheckinReply::AlreadyCompleted { .. }));
    }

    #[test]
    fn busy_lease_yields_try_again() {
        let (_, orch, pid) = setup(None, vec![], SameDayPolicy::Replace);
        let _held = orch.leases.try_acquire(pid).unwrap();
        let reply = orch.handle_message(pid, "hello", at(10, 0)).unwrap();
        assert!(matches!(reply, CheckinReply::TryAgain { .. }));
    }

    #[test]
    fn unknown_patient_is_an_error() {
        let (_, orch, _) = setup(None, vec![], SameDayPolicy::Replace);
        let result = orch.handle_message(Uuid::new_v4(), "hello", at(10, 0));
        assert!(matches!(result, Err(PipelineError::UnknownPatientRecord { .. })));
    }

    #[test]
    fn open_checkin_prompts_once_per_day() {
        let (store, orch, pid) = setup(Some("09:00"), vec![0.4], SameDayPolicy::Replace);
        let patient = store.get_patient(&pid).unwrap().unwrap();

        let first = orch.open_checkin(&patient, at(9, 0)).unwrap();
        assert!(first.is_some());
        assert!(orch.open_checkin(&patient, at(9, 1)).unwrap().is_none());

        // the next message answers question one instead of re-greeting
        let reply = orch.handle_message(pid, "fine", at(9, 3)).unwrap();
        assert!(matches!(reply, CheckinReply::Prompt { question_index: 1, .. }));
    }

    #[test]
    fn open_checkin_waits_for_chat_time() {
        let (store, orch, pid) = setup(Some("09:00"), vec![0.4], SameDayPolicy::Replace);
        let patient = store.get_patient(&pid).unwrap().unwrap();

        assert!(orch.open_checkin(&patient, at(8, 59)).unwrap().is_none());
        let day = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        assert!(orch.session_snapshot(pid, day).is_none());

        // a refused offer leaves the gate closed for early messages
        let reply = orch.handle_message(pid, "I feel great", at(8, 59)).unwrap();
        assert!(matches!(reply, CheckinReply::NotYetOpen { .. }));
        assert!(store.get_session_history(&pid).unwrap().is_empty());

        assert!(orch.open_checkin(&patient, at(9, 0)).unwrap().is_some());
    }

    #[test]
    fn help_request_opens_pending_alert() {
        let (store, orch, pid) = setup(None, vec![], SameDayPolicy::Replace);
        let action = orch.request_help(pid, at(10, 0)).unwrap();
        assert!(matches!(action, AlertAction::Opened(_)));
        assert!(store
            .get_pending_alert(&pid, AlertType::ProfessionalHelp)
            .unwrap()
            .is_some());
    }

    #[test]
    fn reply_serializes_with_kind_tag() {
        let reply = CheckinReply::NotYetOpen { text: "later".into() };
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["kind"], "not_yet_open");
        assert_eq!(json["text"], "later");
    }
}
