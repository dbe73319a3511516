//! Plain-text message bodies for every notification category.

use time::OffsetDateTime;
use time::macros::format_description;

use crate::entity::event;
use crate::monitor::overdue::Evaluation;

/// Subject and body for one notification. SMS ignores the subject; push uses it as the title.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderedMessage {
    pub subject: String,
    pub body: String,
}

pub fn format_timestamp(at: OffsetDateTime) -> String {
    let format = format_description!("[year]-[month]-[day] [hour]:[minute] UTC");
    at.to_offset(time::UtcOffset::UTC)
        .format(&format)
        .unwrap_or_else(|_| at.to_string())
}

fn custom_content(event: &event::Model) -> Option<&str> {
    event
        .notification_content
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
}

/// Alert sent to an emergency contact when the owner missed their check-in.
pub fn contact_alert(event: &event::Model, contact_name: &str) -> RenderedMessage {
    let subject = format!("StayConnected alert: {} missed a check-in", event.name);
    let body = match custom_content(event) {
        Some(content) => content.to_string(),
        None => format!(
            "Hello {contact_name},\n\n\
             You are listed as an emergency contact for \"{}\". The expected check-in \
             was missed; the last check-in was at {}.\n\n\
             Please try to reach them.\n\n\
             StayConnected",
            event.name,
            format_timestamp(event.last_check_in),
        ),
    };
    RenderedMessage { subject, body }
}

/// Reminder to the owner while the deadline is approaching.
pub fn owner_reminder(event: &event::Model, evaluation: &Evaluation) -> RenderedMessage {
    RenderedMessage {
        subject: format!("Reminder: check in for {}", event.name),
        body: format!(
            "Your check-in for \"{}\" is due soon ({}). Check in now to keep your \
             contacts from being alerted.",
            event.name,
            evaluation.display(),
        ),
    }
}

/// Tells the owner that their contacts have been alerted.
pub fn owner_trigger(event: &event::Model, contacts_notified: usize) -> RenderedMessage {
    let who = match contacts_notified {
        0 => "No contacts could be reached".to_string(),
        1 => "1 contact has been alerted".to_string(),
        n => format!("{n} contacts have been alerted"),
    };
    RenderedMessage {
        subject: format!("{} was triggered", event.name),
        body: format!(
            "You missed your check-in for \"{}\" (last check-in {}). {who}. \
             Check in to reset the timer.",
            event.name,
            format_timestamp(event.last_check_in),
        ),
    }
}

pub fn test_message(contact_name: &str) -> RenderedMessage {
    RenderedMessage {
        subject: "StayConnected test notification".to_string(),
        body: format!(
            "Hello {contact_name}, this is a test message from StayConnected. \
             No action is needed."
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::event::EventStatus;
    use crate::monitor::overdue::OverduePolicy;
    use time::Duration;
    use time::macros::datetime;

    fn event(content: Option<&str>) -> event::Model {
        let at = datetime!(2026-03-01 08:30 UTC);
        event::Model {
            id: "e1".into(),
            owner_id: "u1".into(),
            name: "Morning walk".into(),
            memo: None,
            check_in_frequency: "1 day".into(),
            missed_checkin_threshold: 1,
            last_check_in: at,
            status: EventStatus::Running,
            last_trigger_time: None,
            last_reminder_at: None,
            muted: false,
            notification_content: content.map(str::to_string),
            deleted: false,
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn default_contact_alert_names_event_and_time() {
        let msg = contact_alert(&event(None), "Bob");
        assert!(msg.subject.contains("Morning walk"));
        assert!(msg.body.starts_with("Hello Bob"));
        assert!(msg.body.contains("2026-03-01 08:30 UTC"));
    }

    #[test]
    fn custom_content_replaces_default_body() {
        let msg = contact_alert(&event(Some("Call my sister first.")), "Bob");
        assert_eq!(msg.body, "Call my sister first.");
        let blank = contact_alert(&event(Some("   ")), "Bob");
        assert!(blank.body.starts_with("Hello Bob"));
    }

    #[test]
    fn reminder_includes_remaining_time() {
        let e = event(None);
        let eval = OverduePolicy::for_event(&e)
            .evaluate(e.last_check_in, e.last_check_in + Duration::hours(21));
        let msg = owner_reminder(&e, &eval);
        assert!(msg.body.contains("3 hours left"), "{}", msg.body);
    }

    #[test]
    fn trigger_message_counts_contacts() {
        assert!(owner_trigger(&event(None), 2).body.contains("2 contacts have been alerted"));
        assert!(owner_trigger(&event(None), 1).body.contains("1 contact has been alerted"));
        assert!(owner_trigger(&event(None), 0).body.contains("No contacts"));
    }
}
