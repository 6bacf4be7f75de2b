//! Conversational check-in: question flow, per-day state and scheduling.

pub mod orchestrator;
pub mod questions;
pub mod scheduler;
pub mod state;

pub use orchestrator::{CheckinOrchestrator, CheckinReply};
pub use questions::QuestionBank;
pub use scheduler::{
    start_scheduler, CheckinScheduler, LogPromptSink, PromptSink, RecordingPromptSink,
    SchedulerHandle,
};
pub use state::{CheckinSession, CheckinState};
