use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use serde::Serialize;

use crate::models::enums::SameDayPolicy;

/// Application-level constants
pub const APP_NAME: &str = "EchoMind";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Dashboard API bind address when `ECHOMIND_BIND` is unset.
pub const DEFAULT_BIND: &str = "127.0.0.1:8600";

/// Default Ollama endpoint for the model-backed scorer.
pub const DEFAULT_OLLAMA_HOST: &str = "http://localhost:11434";
pub const DEFAULT_SCORER_MODEL: &str = "llama3";

/// Log filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    if cfg!(debug_assertions) {
        "echomind=debug,echomind_lib=debug,info"
    } else {
        "echomind=info,echomind_lib=info,warn"
    }
}

/// Get the application data directory
/// ~/EchoMind/ on all platforms. Falls back to the working directory
/// when no home directory can be determined.
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Database file: `ECHOMIND_DB_PATH` or `~/EchoMind/echomind.db`.
pub fn database_path() -> PathBuf {
    std::env::var("ECHOMIND_DB_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| app_data_dir().join("echomind.db"))
}

/// Dashboard bind address: `ECHOMIND_BIND` or [`DEFAULT_BIND`].
pub fn bind_address() -> SocketAddr {
    let fallback: SocketAddr = ([127, 0, 0, 1], 8600).into();
    match std::env::var("ECHOMIND_BIND") {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(value = %raw, "Invalid ECHOMIND_BIND, using {DEFAULT_BIND}");
            fallback
        }),
        Err(_) => fallback,
    }
}

// ═══════════════════════════════════════════════════════════
// Engine configuration
// ═══════════════════════════════════════════════════════════

/// Which sentiment scorer backs the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ScorerBackend {
    Lexicon,
    Ollama { host: String, model: String },
}

/// Deployment-wide thresholds and concurrency knobs. Never per patient.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineConfig {
    /// Cumulative or daily score below this opens a `low_sentiment` alert.
    pub low_sentiment_threshold: f64,
    /// A three-day drop larger than this opens a `rapid_decline` alert.
    pub rapid_decline_delta: f64,
    /// Number of prior sessions averaged for the three-day score.
    pub trend_window_days: usize,
    pub same_day_policy: SameDayPolicy,
    /// Bounded wait for the per-patient lease, per attempt.
    pub lease_wait_ms: u64,
    pub max_lease_attempts: u32,
    pub scorer: ScorerBackend,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            low_sentiment_threshold: 40.0,
            rapid_decline_delta: 20.0,
            trend_window_days: 3,
            same_day_policy: SameDayPolicy::Replace,
            lease_wait_ms: 2000,
            max_lease_attempts: 3,
            scorer: ScorerBackend::Lexicon,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `ECHOMIND_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Invalid values keep the default.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let low_sentiment_threshold = parse_or(
            &lookup,
            "ECHOMIND_LOW_SENTIMENT_THRESHOLD",
            defaults.low_sentiment_threshold,
            |v: &f64| (0.0..=100.0).contains(v),
        );
        let rapid_decline_delta = parse_or(
            &lookup,
            "ECHOMIND_RAPID_DECLINE_DELTA",
            defaults.rapid_decline_delta,
            |v: &f64| (0.0..=100.0).contains(v),
        );
        let trend_window_days = parse_or(
            &lookup,
            "ECHOMIND_TREND_WINDOW_DAYS",
            defaults.trend_window_days,
            |v: &usize| *v >= 1,
        );
        let same_day_policy = parse_or(
            &lookup,
            "ECHOMIND_SAME_DAY_POLICY",
            defaults.same_day_policy,
            |_| true,
        );
        let lease_wait_ms = parse_or(&lookup, "ECHOMIND_LEASE_WAIT_MS", defaults.lease_wait_ms, |_| true);
        let max_lease_attempts = parse_or(
            &lookup,
            "ECHOMIND_MAX_LEASE_ATTEMPTS",
            defaults.max_lease_attempts,
            |v: &u32| *v >= 1,
        );

        let scorer = match lookup("ECHOMIND_SCORER").as_deref() {
            None | Some("lexicon") => ScorerBackend::Lexicon,
            Some("ollama") => ScorerBackend::Ollama {
                host: lookup("OLLAMA_HOST").unwrap_or_else(|| DEFAULT_OLLAMA_HOST.to_string()),
                model: lookup("ECHOMIND_SCORER_MODEL")
                    .unwrap_or_else(|| DEFAULT_SCORER_MODEL.to_string()),
            },
            Some(other) => {
                tracing::warn!(value = %other, "Unknown ECHOMIND_SCORER, using lexicon");
                ScorerBackend::Lexicon
            }
        };

        Self {
            low_sentiment_threshold,
            rapid_decline_delta,
            trend_window_days,
            same_day_policy,
            lease_wait_ms,
            max_lease_attempts,
            scorer,
        }
    }
}

fn parse_or<T, F, V>(lookup: &F, key: &str, default: T, valid: V) -> T
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
    V: Fn(&T) -> bool,
{
    let Some(raw) = lookup(key) else {
        return default;
    };
    match raw.trim().parse::<T>() {
        Ok(value) if valid(&value) => value,
        _ => {
            tracing::warn!(key, value = %raw, "Invalid configuration value, using default");
            default
        }
    }
}
