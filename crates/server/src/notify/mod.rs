//! Outbound notifications.
//!
//! - `sender` - the channel-agnostic sender trait, delivery policy and registry
//! - `email`, `sms`, `push` - provider implementations
//! - `dispatch` - logged fan-out to contacts and owners
//! - `templates` - message bodies

pub mod dispatch;
pub mod email;
pub mod http;
pub mod push;
pub mod sender;
pub mod sms;
pub mod templates;

pub use dispatch::{
    DispatchReport, alert_contacts, dispatch_contact_alerts, dispatch_owner_notification,
    resolve_contacts,
};
pub use sender::{NotificationSender, OutgoingMessage, SenderRegistry};
