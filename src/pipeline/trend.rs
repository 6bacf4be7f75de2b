//! Trend Engine: recomputes the trend triple from a patient's session history.
//!
//! The triple on the patient row is a cache. It is always re-derivable from
//! `session_scores` alone, and recomputing on unchanged history writes the
//! same bits.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::traits::CheckinStore;
use super::PipelineError;
use crate::models::{SessionScore, TrendTriple};

#[derive(Debug, Clone, Copy)]
pub struct TrendEngine {
    window: usize,
}

impl TrendEngine {
    /// `window` is the number of prior sessions averaged for the three-day
    /// score. Zero is treated as one.
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Compute the triple for a date-ordered history.
    pub fn compute(&self, patient_id: Uuid, history: &[SessionScore]) -> Result<TrendTriple, PipelineError> {
        let Some((latest, prior)) = history.split_last() else {
            return Err(PipelineError::NoHistory { patient_id });
        };
        let latest = latest.sentiment_score;

        let scores = history.iter().map(|s| s.sentiment_score);
        let min = scores.clone().fold(f64::INFINITY, f64::min);
        let max = scores.clone().fold(f64::NEG_INFINITY, f64::max);
        let cumulative = (scores.sum::<f64>() / history.len() as f64).clamp(min, max);

        let day_on_day = match prior.last() {
            Some(previous) => latest - previous.sentiment_score,
            None => 0.0,
        };

        let window = &prior[prior.len().saturating_sub(self.window)..];
        let three_day = if window.is_empty() {
            0.0
        } else {
            let window_mean =
                window.iter().map(|s| s.sentiment_score).sum::<f64>() / window.len() as f64;
            latest - window_mean
        };

        Ok(TrendTriple {
            cumulative,
            day_on_day,
            three_day,
        })
    }

    /// Read the history, compute, write the triple back. `NoHistory` writes nothing.
    pub fn recompute(
        &self,
        store: &dyn CheckinStore,
        patient_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<TrendTriple, PipelineError> {
        let mut history = store.get_session_history(&patient_id)?;
        history.sort_by_key(|s| s.date);

        let trend = self.compute(patient_id, &history)?;
        store.set_patient_trend(&patient_id, &trend, &now)?;

        tracing::debug!(
            patient_id = %patient_id,
            sessions = history.len(),
            cumulative = trend.cumulative,
            day_on_day = trend.day_on_day,
            three_day = trend.three_day,
            "Trend recomputed"
        );
        Ok(trend)
    }
}

impl Default for TrendEngine {
    fn default() -> Self {
        Self::new(3)
    }
}
