//! Rule-based physiological state classification.
//!
//! Pure domain logic: sample parsing, the threshold table, the
//! first-to-quorum classifier, and the consecutive-anomaly tracker.
//! Nothing in this crate performs I/O; the agent feeds it one parsed
//! sample at a time.

pub mod classifier;
pub mod error;
pub mod escalation;
pub mod field_names;
pub mod sample;
pub mod thresholds;
