//! Database entities.
//!
//! Events and contacts are owned by a user (`owner_id` is the authenticated subject) and
//! are only ever soft-deleted. Notification and activity logs are write-once audit rows.

pub mod activity_log;
pub mod contact;
pub mod event;
pub mod event_contact;
pub mod notification_log;
pub mod user_profile;
