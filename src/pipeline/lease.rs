//! Per-patient exclusive lease.
//!
//! At most one pipeline run per patient at a time; different patients never
//! wait on each other. Acquisition is bounded: a waiter gives up after the
//! configured wait and gets `ConcurrencyConflict`.

use std::collections::HashSet;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use uuid::Uuid;

use super::PipelineError;

// ═══════════════════════════════════════════════════════════
// PatientLeases
// ═══════════════════════════════════════════════════════════

#[derive(Default)]
pub struct PatientLeases {
    held: Mutex<HashSet<Uuid>>,
    released: Condvar,
}

impl PatientLeases {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block up to `wait` for the lease on `patient_id`.
    pub fn acquire(&self, patient_id: Uuid, wait: Duration) -> Result<PatientLease<'_>, PipelineError> {
        let deadline = Instant::now() + wait;
        let mut held = self.held.lock().map_err(|_| PipelineError::LockPoisoned)?;

        while held.contains(&patient_id) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(PipelineError::ConcurrencyConflict { patient_id });
            }
            let (guard, _timeout) = self
                .released
                .wait_timeout(held, remaining)
                .map_err(|_| PipelineError::LockPoisoned)?;
            held = guard;
        }

        held.insert(patient_id);
        Ok(PatientLease {
            leases: self,
            patient_id,
        })
    }

    /// Acquire without waiting. `None` when another run holds the lease.
    pub fn try_acquire(&self, patient_id: Uuid) -> Option<PatientLease<'_>> {
        let mut held = self.held.lock().ok()?;
        if !held.insert(patient_id) {
            return None;
        }
        Some(PatientLease {
            leases: self,
            patient_id,
        })
    }

    /// Acquire with up to `attempts` bounded waits.
    pub fn acquire_with_retry(
        &self,
        patient_id: Uuid,
        wait: Duration,
        attempts: u32,
    ) -> Result<PatientLease<'_>, PipelineError> {
        let attempts = attempts.max(1);
        let mut last_err = PipelineError::ConcurrencyConflict { patient_id };
        for attempt in 1..=attempts {
            match self.acquire(patient_id, wait) {
                Ok(lease) => return Ok(lease),
                Err(e @ PipelineError::ConcurrencyConflict { .. }) => {
                    tracing::debug!(patient_id = %patient_id, attempt, "Patient lease busy");
                    last_err = e;
                }
                Err(e) => return Err(e),
            }
        }
        tracing::warn!(patient_id = %patient_id, attempts, "Patient lease not acquired");
        Err(last_err)
    }

    pub fn is_held(&self, patient_id: &Uuid) -> bool {
        self.held
            .lock()
            .map(|held| held.contains(patient_id))
            .unwrap_or(false)
    }

    fn release(&self, patient_id: &Uuid) {
        if let Ok(mut held) = self.held.lock() {
            held.remove(patient_id);
        }
        self.released.notify_all();
    }
}

// ═══════════════════════════════════════════════════════════
// PatientLease: RAII token
// ═══════════════════════════════════════════════════════════

/// Dropping the lease releases it and wakes waiters.
pub struct PatientLease<'a> {
    leases: &'a PatientLeases,
    patient_id: Uuid,
}

impl PatientLease<'_> {
    pub fn patient_id(&self) -> Uuid {
        self.patient_id
    }
}

impl Drop for PatientLease<'_> {
    fn drop(&mut self) {
        self.leases.release(&self.patient_id);
    }
}
