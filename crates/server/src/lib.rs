//! StayConnected: a dead-man's-switch check-in service.
//!
//! Owners define recurring check-in events. When an owner misses the configured
//! window, the event's emergency contacts are alerted by email or SMS. The library
//! holds the overdue evaluation, the event status machine, notification dispatch and
//! the HTTP API; the binary wires them to a database and a listener.

use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::config::AppConfig;
use crate::domain_events::DomainEventBus;
use crate::notify::SenderRegistry;
use crate::notify::http::HttpClient;

pub mod activity;
pub mod api;
pub mod config;
pub mod domain_events;
pub mod entity;
pub mod error;
pub mod interval;
pub mod monitor;
pub mod notify;

/// Process-wide dependencies, created once in `main` and handed to every component.
#[derive(Clone, Debug)]
pub struct AppResources {
    pub db: Arc<DatabaseConnection>,
    pub senders: Arc<SenderRegistry>,
    pub http: HttpClient,
    pub config: Arc<AppConfig>,
    pub bus: DomainEventBus,
}
