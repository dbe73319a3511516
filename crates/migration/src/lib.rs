pub use sea_orm_migration::prelude::*;

mod m20260301_000001_create_event_and_contact;
mod m20260301_000002_create_log_tables;
mod m20260301_000003_create_user_profile;
mod m20260310_000000_add_last_reminder_at;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260301_000001_create_event_and_contact::Migration),
            Box::new(m20260301_000002_create_log_tables::Migration),
            Box::new(m20260301_000003_create_user_profile::Migration),
            Box::new(m20260310_000000_add_last_reminder_at::Migration),
        ]
    }
}
