//! Conversational state for one (patient, local date) check-in.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::pipeline::ScoredAnswer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckinState {
    NotStarted,
    InProgress,
    Completed,
}

/// Explicit per-day record. Handed to the aggregator on completion.
#[derive(Debug, Clone, Serialize)]
pub struct CheckinSession {
    pub patient_id: Uuid,
    pub date: NaiveDate,
    pub state: CheckinState,
    /// The opening prompt has been delivered, so the next message answers it.
    pub prompted: bool,
    pub answers: Vec<ScoredAnswer>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl CheckinSession {
    pub fn new(patient_id: Uuid, date: NaiveDate) -> Self {
        Self {
            patient_id,
            date,
            state: CheckinState::NotStarted,
            prompted: false,
            answers: Vec::new(),
            started_at: None,
            completed_at: None,
        }
    }

    /// A day whose session row already exists in storage.
    pub fn completed(patient_id: Uuid, date: NaiveDate, at: DateTime<Utc>) -> Self {
        Self {
            state: CheckinState::Completed,
            completed_at: Some(at),
            ..Self::new(patient_id, date)
        }
    }

    /// Index of the question the next message answers.
    pub fn next_index(&self) -> usize {
        self.answers.len()
    }

    pub fn record_answer(&mut self, answer: ScoredAnswer) {
        if self.state == CheckinState::NotStarted {
            self.state = CheckinState::InProgress;
            self.started_at = Some(answer.answered_at);
        }
        self.answers.push(answer);
    }

    /// Undo the most recent answer after a failed completion.
    pub fn retract_last(&mut self) -> Option<ScoredAnswer> {
        let answer = self.answers.pop();
        if self.answers.is_empty() {
            self.state = CheckinState::NotStarted;
            self.started_at = None;
        }
        answer
    }

    pub fn is_fully_answered(&self, question_count: usize) -> bool {
        self.answers.len() >= question_count
    }

    pub fn mark_completed(&mut self, at: DateTime<Utc>) {
        self.state = CheckinState::Completed;
        self.completed_at = Some(at);
    }

    /// Reopen a completed day with a clean answer set.
    pub fn reopen(&mut self) {
        self.state = CheckinState::NotStarted;
        self.prompted = true;
        self.answers.clear();
        self.started_at = None;
        self.completed_at = None;
    }
}
