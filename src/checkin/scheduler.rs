//! Daily prompt scheduler.
//!
//! Once a minute, finds patients whose local wall-clock time has reached their
//! `chat_time` within the last minute and hands the opening prompt to a
//! [`PromptSink`]. The window never reaches back across midnight. The
//! orchestrator remembers who was prompted, so repeated ticks inside the
//! window send nothing twice.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, NaiveTime, Timelike, Utc};
use thiserror::Error;
use uuid::Uuid;

use super::orchestrator::CheckinOrchestrator;
use crate::models::Patient;

/// Tick interval.
const CHECK_INTERVAL_SECS: u64 = 60;

/// Sleep granularity for shutdown responsiveness.
const SLEEP_GRANULARITY_MS: u64 = 500;

/// Minutes after `chat_time` that still count as due.
const WINDOW_MINUTES: i64 = 1;

#[derive(Debug, Error)]
#[error("Prompt delivery failed: {0}")]
pub struct DeliveryError(pub String);

/// Outbound seam to the chat transport.
pub trait PromptSink: Send + Sync {
    fn deliver(&self, patient: &Patient, text: &str) -> Result<(), DeliveryError>;
}

/// Sink used when no transport is wired in: logs the prompt.
pub struct LogPromptSink;

impl PromptSink for LogPromptSink {
    fn deliver(&self, patient: &Patient, text: &str) -> Result<(), DeliveryError> {
        tracing::info!(patient_id = %patient.id, chat_id = ?patient.chat_id, prompt = %text, "Check-in prompt due");
        Ok(())
    }
}

/// Collects prompts in memory. Useful for tests and dry runs.
#[derive(Default)]
pub struct RecordingPromptSink {
    sent: Mutex<Vec<(Uuid, String)>>,
}

impl RecordingPromptSink {
    pub fn sent(&self) -> Vec<(Uuid, String)> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl PromptSink for RecordingPromptSink {
    fn deliver(&self, patient: &Patient, text: &str) -> Result<(), DeliveryError> {
        self.sent
            .lock()
            .map_err(|_| DeliveryError("recording sink poisoned".into()))?
            .push((patient.id, text.to_string()));
        Ok(())
    }
}

fn minute_of_day(t: NaiveTime) -> i64 {
    i64::from(t.hour() * 60 + t.minute())
}

/// Whether `now` falls in the patient's prompt window: from `chat_time` to
/// `WINDOW_MINUTES` after it, on the same local day.
pub fn is_due(patient: &Patient, now: DateTime<Utc>) -> bool {
    let Some(chat_time) = patient.parsed_chat_time() else {
        return false;
    };
    let elapsed = minute_of_day(patient.local_time(now)) - minute_of_day(chat_time);
    (0..=WINDOW_MINUTES).contains(&elapsed)
}

pub struct CheckinScheduler {
    orchestrator: Arc<CheckinOrchestrator>,
    sink: Arc<dyn PromptSink>,
}

impl CheckinScheduler {
    pub fn new(orchestrator: Arc<CheckinOrchestrator>, sink: Arc<dyn PromptSink>) -> Self {
        Self { orchestrator, sink }
    }

    /// One scheduling pass. Returns the number of prompts delivered.
    ///
    /// Failures for one patient are logged and do not stop the pass.
    pub fn tick(&self, now: DateTime<Utc>) -> usize {
        let patients = match self.orchestrator.store().list_schedulable_patients() {
            Ok(patients) => patients,
            Err(e) => {
                tracing::warn!(error = %e, "Scheduler could not list patients");
                return 0;
            }
        };

        let mut delivered = 0;
        for patient in patients.iter().filter(|p| is_due(p, now)) {
            match self.orchestrator.open_checkin(patient, now) {
                Ok(Some(prompt)) => match self.sink.deliver(patient, &prompt) {
                    Ok(()) => delivered += 1,
                    Err(e) => tracing::warn!(patient_id = %patient.id, error = %e, "Prompt not delivered"),
                },
                Ok(None) => {}
                Err(e) => tracing::warn!(patient_id = %patient.id, error = %e, "Could not open check-in"),
            }
        }

        if delivered > 0 {
            tracing::info!(delivered, "Check-in prompts sent");
        }
        delivered
    }
}

// ═══════════════════════════════════════════════════════════
// Background thread
// ═══════════════════════════════════════════════════════════

/// Handle for the background scheduler thread. Dropping it stops the thread.
pub struct SchedulerHandle {
    shutdown: Arc<AtomicBool>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Request shutdown. A pass in flight completes first.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.shutdown();
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

pub fn start_scheduler(scheduler: CheckinScheduler) -> SchedulerHandle {
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = shutdown.clone();

    let handle = std::thread::spawn(move || {
        tracing::info!("Check-in scheduler started (every {}s)", CHECK_INTERVAL_SECS);
        while !flag.load(Ordering::Relaxed) {
            scheduler.tick(Utc::now());
            for _ in 0..(CHECK_INTERVAL_SECS * 1000 / SLEEP_GRANULARITY_MS) {
                if flag.load(Ordering::Relaxed) {
                    break;
                }
                std::thread::sleep(Duration::from_millis(SLEEP_GRANULARITY_MS));
            }
        }
        tracing::info!("Check-in scheduler shutting down");
    });

    SchedulerHandle {
        shutdown,
        handle: Some(handle),
    }
}
