//! Inactivity monitoring: overdue evaluation, status transitions, check-in and the
//! periodic check cycles.

pub mod checkin;
pub mod checks;
pub mod overdue;
pub mod status;

pub use checkin::check_in;
pub use checks::{CheckReport, NotifyRequest, ProcessedEvent, run_inactivity_check, run_notify};
pub use overdue::{Evaluation, OverduePolicy, Urgency};
pub use status::StatusAction;
