//! Scoring → aggregation → trend → alert pipeline.
//!
//! Everything here is synchronous and storage-agnostic: components talk to
//! persistence only through [`traits::CheckinStore`]. Async callers hop onto
//! a blocking thread before entering.

pub mod aggregator;
pub mod alerts;
pub mod lease;
pub mod runner;
pub mod store;
pub mod traits;
pub mod trend;

use thiserror::Error;
use uuid::Uuid;

use crate::db::DatabaseError;

pub use aggregator::{aggregate, record_session, ScoredAnswer};
pub use alerts::{AlertAction, AlertEngine, AlertOutcome};
pub use lease::{PatientLease, PatientLeases};
pub use runner::{PipelineOutcome, PipelineRunner};
pub use store::SqliteCheckinStore;
pub use traits::CheckinStore;
pub use trend::TrendEngine;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Check-in for patient {patient_id} has no answers")]
    EmptySession { patient_id: Uuid },

    #[error("Patient {patient_id} has no session history")]
    NoHistory { patient_id: Uuid },

    #[error("Patient {patient_id} has no assigned clinician")]
    UnknownPatient { patient_id: Uuid },

    #[error("Another check-in update is running for patient {patient_id}")]
    ConcurrencyConflict { patient_id: Uuid },

    #[error("No patient record for {patient_id}")]
    UnknownPatientRecord { patient_id: Uuid },

    #[error("Internal lock error")]
    LockPoisoned,

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

impl PipelineError {
    /// Transient failures the caller may retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ConcurrencyConflict { .. } | Self::LockPoisoned | Self::Database(_)
        )
    }
}
