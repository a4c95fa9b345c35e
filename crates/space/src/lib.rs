//! Escalation to a hosted Hugging Face Space.
//!
//! [`sink::EscalationSink`] is the seam the monitor escalates through.
//! [`escalation::escalate`] drives it: poll readiness on a fixed
//! interval, then activate once. [`sink::SpaceSink`] is the production
//! implementation backed by the Hub REST API and the system URL opener.

pub mod api;
pub mod escalation;
pub mod opener;
pub mod readiness;
pub mod sink;
