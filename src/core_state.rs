//! Transport-agnostic application state.
//!
//! `CoreState` is shared by the dashboard API and the scheduler. It owns the
//! store, the orchestrator (which owns the per-patient leases) and the
//! dashboard server handle.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use uuid::Uuid;

use crate::api::DashboardServer;
use crate::checkin::CheckinOrchestrator;
use crate::config::{EngineConfig, ScorerBackend};
use crate::db::{self, DatabaseError};
use crate::models::enums::{ResolvedBy, Role};
use crate::models::{Patient, ResolveOutcome};
use crate::pipeline::{PipelineError, SqliteCheckinStore};
use crate::scoring::{LexiconScorer, OllamaClient, OllamaScorer, ScoringError, SentimentScorer};

/// Timeout for a single sentiment request to Ollama.
const SCORER_TIMEOUT_SECS: u64 = 30;

// ═══════════════════════════════════════════════════════════
// CoreState
// ═══════════════════════════════════════════════════════════

pub struct CoreState {
    store: Arc<SqliteCheckinStore>,
    orchestrator: Arc<CheckinOrchestrator>,
    /// `None` for in-memory databases.
    pub db_path: Option<PathBuf>,
    /// Dashboard API server handle. Uses tokio Mutex for async.
    pub api_server: tokio::sync::Mutex<Option<DashboardServer>>,
}

impl CoreState {
    pub fn new(
        store: Arc<SqliteCheckinStore>,
        scorer: Arc<dyn SentimentScorer>,
        config: EngineConfig,
        db_path: Option<PathBuf>,
    ) -> Self {
        let orchestrator = Arc::new(CheckinOrchestrator::new(store.clone(), scorer, config));
        Self {
            store,
            orchestrator,
            db_path,
            api_server: tokio::sync::Mutex::new(None),
        }
    }

    /// Open (and migrate) the database at `path` and build the configured scorer.
    ///
    /// Blocking: call from a blocking context when inside a runtime.
    pub fn open(path: &Path, config: EngineConfig) -> Result<Self, CoreError> {
        let store = Arc::new(SqliteCheckinStore::open(path)?);
        let scorer = build_scorer(&config.scorer)?;
        tracing::info!(path = %path.display(), scorer = scorer.name(), "Core state ready");
        Ok(Self::new(store, scorer, config, Some(path.to_path_buf())))
    }

    /// In-memory database with the given scorer (tests, demos).
    pub fn in_memory(scorer: Arc<dyn SentimentScorer>, config: EngineConfig) -> Result<Self, CoreError> {
        let store = Arc::new(SqliteCheckinStore::in_memory()?);
        Ok(Self::new(store, scorer, config, None))
    }

    pub fn store(&self) -> &Arc<SqliteCheckinStore> {
        &self.store
    }

    pub fn orchestrator(&self) -> &Arc<CheckinOrchestrator> {
        &self.orchestrator
    }

    pub fn config(&self) -> &EngineConfig {
        self.orchestrator.config()
    }

    /// Run a repository function against the shared connection.
    pub fn with_db<T, F>(&self, f: F) -> Result<T, CoreError>
    where
        F: FnOnce(&Connection) -> Result<T, DatabaseError>,
    {
        self.store.with_conn(f).map_err(CoreError::from)
    }

    /// Dashboard reads are scoped to a clinician; unknown ids and patient
    /// accounts are both `NotFound`.
    pub fn ensure_clinician(&self, doctor_id: &Uuid) -> Result<(), CoreError> {
        let user = self.with_db(|conn| db::get_user(conn, doctor_id))?;
        match user {
            Some(user) if user.role != Role::Patient => Ok(()),
            _ => Err(CoreError::Database(DatabaseError::NotFound {
                entity_type: "Clinician".into(),
                id: doctor_id.to_string(),
            })),
        }
    }

    pub fn ensure_patient(&self, patient_id: &Uuid) -> Result<Patient, CoreError> {
        self.with_db(|conn| db::get_patient(conn, patient_id))?
            .ok_or_else(|| {
                CoreError::Database(DatabaseError::NotFound {
                    entity_type: "Patient".into(),
                    id: patient_id.to_string(),
                })
            })
    }

    /// Clinician-initiated resolve. Idempotent; races with auto-resolve are benign.
    pub fn resolve_alert(&self, alert_id: &Uuid, now: DateTime<Utc>) -> Result<ResolveOutcome, CoreError> {
        let outcome = self.with_db(|conn| db::resolve_alert(conn, alert_id, ResolvedBy::Clinician, &now))?;
        tracing::info!(alert_id = %alert_id, outcome = ?outcome, "Alert resolved by clinician");
        Ok(outcome)
    }
}

/// Build the sentiment scorer selected by configuration.
pub fn build_scorer(backend: &ScorerBackend) -> Result<Arc<dyn SentimentScorer>, ScoringError> {
    match backend {
        ScorerBackend::Lexicon => Ok(Arc::new(LexiconScorer::new())),
        ScorerBackend::Ollama { host, model } => {
            let client = OllamaClient::new(host, SCORER_TIMEOUT_SECS)?;
            Ok(Arc::new(OllamaScorer::new(Box::new(client), model)))
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Errors
// ═══════════════════════════════════════════════════════════

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Internal lock error")]
    LockPoisoned,
    #[error("Database error: {0}")]
    Database(DatabaseError),
    #[error("Pipeline error: {0}")]
    Pipeline(PipelineError),
    #[error("Scorer setup failed: {0}")]
    Scorer(#[from] ScoringError),
}

impl From<DatabaseError> for CoreError {
    fn from(err: DatabaseError) -> Self {
        CoreError::Database(err)
    }
}

impl From<PipelineError> for CoreError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::LockPoisoned => CoreError::LockPoisoned,
            PipelineError::Database(e) => CoreError::Database(e),
            other => CoreError::Pipeline(other),
        }
    }
}
