//! Repository layer: entity-scoped database operations.
//!
//! Every function takes a borrowed `Connection` so callers decide the
//! connection lifetime and locking. All public items are re-exported here.

mod alert;
mod clinician;
mod patient;
mod session_score;

pub use alert::*;
pub use clinician::*;
pub use patient::*;
pub use session_score::*;
