use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

/// Track the owner reminder of the current overdue episode so it goes out only once
#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .alter_table(
                Table::alter()
                    .table(Event::Table)
                    .add_column_if_not_exists(timestamp_with_time_zone_null(Event::LastReminderAt))
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .alter_table(
                Table::alter()
                    .table(Event::Table)
                    .drop_column(Event::LastReminderAt)
                    .to_owned(),
            )
            .await
    }
}

#[derive(Iden)]
enum Event {
    Table,
    LastReminderAt,
}
