use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

/// Write-once audit tables: one row per notification attempt and one per action
#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(NotificationLog::Table)
                    .if_not_exists()
                    .col(pk_auto(NotificationLog::Id))
                    .col(string(NotificationLog::EventId))
                    .col(
                        ColumnDef::new(NotificationLog::ContactId)
                            .string()
                            .null()
                            .comment("Empty for notifications to the event owner"),
                    )
                    .col(string(NotificationLog::Channel).comment("email, sms or push"))
                    .col(string(NotificationLog::Recipient))
                    .col(text(NotificationLog::Content))
                    .col(
                        string(NotificationLog::Category)
                            .comment("user_reminder, contact_alert or event_trigger"),
                    )
                    .col(
                        string(NotificationLog::Status)
                            .default("pending")
                            .comment("pending, sent, failed or cancelled"),
                    )
                    .col(text_null(NotificationLog::ErrorMessage))
                    .col(timestamp_with_time_zone_null(NotificationLog::SentAt))
                    .col(
                        timestamp_with_time_zone(NotificationLog::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("idx_notification_log_event_id")
                    .table(NotificationLog::Table)
                    .col(NotificationLog::EventId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ActivityLog::Table)
                    .if_not_exists()
                    .col(pk_auto(ActivityLog::Id))
                    .col(
                        ColumnDef::new(ActivityLog::OwnerId)
                            .string()
                            .null()
                            .comment("Empty for system actions"),
                    )
                    .col(string_null(ActivityLog::EventId))
                    .col(string_null(ActivityLog::ContactId))
                    .col(string(ActivityLog::Action))
                    .col(text_null(ActivityLog::Details).comment("JSON object of string values"))
                    .col(
                        timestamp_with_time_zone(ActivityLog::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("idx_activity_log_owner_created")
                    .table(ActivityLog::Table)
                    .col(ActivityLog::OwnerId)
                    .col(ActivityLog::CreatedAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ActivityLog::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(NotificationLog::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum NotificationLog {
    Table,
    Id,
    EventId,
    ContactId,
    Channel,
    Recipient,
    Content,
    Category,
    Status,
    ErrorMessage,
    SentAt,
    CreatedAt,
}

#[derive(Iden)]
enum ActivityLog {
    Table,
    Id,
    OwnerId,
    EventId,
    ContactId,
    Action,
    Details,
    CreatedAt,
}
