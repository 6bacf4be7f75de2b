//! API middleware stack.
//!
//! The dashboard sits behind the host's own access control, so the only
//! layer is the access logger.

pub mod audit;
