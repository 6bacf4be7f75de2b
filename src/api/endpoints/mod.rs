//! API endpoint handlers.
//!
//! Dashboard reads, the one clinician write (resolve), and the check-in
//! transport. Database and pipeline work runs on the blocking pool.

pub mod alerts;
pub mod checkin;
pub mod health;
pub mod patients;
