//! Runs Aggregator → Trend Engine → Alert Engine for one completed check-in.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::aggregator::{record_session, ScoredAnswer};
use super::alerts::{AlertEngine, AlertOutcome};
use super::traits::CheckinStore;
use super::trend::TrendEngine;
use super::PipelineError;
use crate::config::EngineConfig;
use crate::models::{Patient, SessionScore, TrendTriple};

#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutcome {
    pub session: SessionScore,
    /// `None` when recomputation failed; the session row still stands.
    pub trend: Option<TrendTriple>,
    pub alerts: Vec<AlertOutcome>,
}

pub struct PipelineRunner {
    store: Arc<dyn CheckinStore>,
    trend: TrendEngine,
    alerts: AlertEngine,
}

impl PipelineRunner {
    pub fn new(store: Arc<dyn CheckinStore>, config: &EngineConfig) -> Self {
        Self {
            store,
            trend: TrendEngine::new(config.trend_window_days),
            alerts: AlertEngine::new(config.low_sentiment_threshold, config.rapid_decline_delta),
        }
    }

    pub fn store(&self) -> &dyn CheckinStore {
        self.store.as_ref()
    }

    /// Persist the session, then update trend and alerts.
    ///
    /// Only the aggregation step can fail the call. Trend and alert failures
    /// after a successful write are logged and picked up on the next check-in.
    /// The caller must hold the patient's lease.
    pub fn complete(
        &self,
        patient: &Patient,
        date: NaiveDate,
        answers: &[ScoredAnswer],
        completed_at: DateTime<Utc>,
    ) -> Result<PipelineOutcome, PipelineError> {
        let store = self.store.as_ref();
        let session = record_session(store, patient.id, date, answers, completed_at)?;

        let trend = match self.trend.recompute(store, patient.id, completed_at) {
            Ok(trend) => Some(trend),
            Err(e) => {
                tracing::warn!(patient_id = %patient.id, error = %e, "Trend recomputation skipped");
                None
            }
        };

        let alerts = match &trend {
            Some(trend) => {
                match self
                    .alerts
                    .evaluate(store, patient, trend, session.sentiment_score, completed_at)
                {
                    Ok(outcomes) => outcomes,
                    Err(e) => {
                        tracing::warn!(patient_id = %patient.id, error = %e, "Alert evaluation failed");
                        Vec::new()
                    }
                }
            }
            None => Vec::new(),
        };

        tracing::info!(
            patient_id = %patient.id,
            date = %date,
            score = session.sentiment_score,
            alerts = alerts.len(),
            "Check-in pipeline completed"
        );

        Ok(PipelineOutcome {
            session,
            trend,
            alerts,
        })
    }

    /// Re-derive the trend triple from history alone. Alerts are untouched.
    pub fn recompute_trend(&self, patient_id: Uuid, now: DateTime<Utc>) -> Result<TrendTriple, PipelineError> {
        if self.store.get_patient(&patient_id)?.is_none() {
            return Err(PipelineError::UnknownPatientRecord { patient_id });
        }
        self.trend.recompute(self.store.as_ref(), patient_id, now)
    }
}
