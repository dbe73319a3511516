use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

/// Events, contacts and the link table between them
#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Event::Table)
                    .if_not_exists()
                    .col(string(Event::Id).primary_key())
                    .col(string(Event::OwnerId))
                    .col(string(Event::Name))
                    .col(text_null(Event::Memo))
                    .col(
                        ColumnDef::new(Event::CheckInFrequency)
                            .string()
                            .not_null()
                            .comment("Interval such as '1 day' or '12 hours'"),
                    )
                    .col(integer(Event::MissedCheckinThreshold).default(1))
                    .col(timestamp_with_time_zone(Event::LastCheckIn))
                    .col(
                        string(Event::Status)
                            .default("running")
                            .comment("running, triggered, paused or deleted"),
                    )
                    .col(timestamp_with_time_zone_null(Event::LastTriggerTime))
                    .col(boolean(Event::Muted).default(false))
                    .col(text_null(Event::NotificationContent))
                    .col(boolean(Event::Deleted).default(false))
                    .col(
                        timestamp_with_time_zone(Event::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(Event::UpdatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("idx_event_owner_id")
                    .table(Event::Table)
                    .col(Event::OwnerId)
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("idx_event_monitored")
                    .table(Event::Table)
                    .col(Event::Status)
                    .col(Event::Deleted)
                    .col(Event::Muted)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Contact::Table)
                    .if_not_exists()
                    .col(string(Contact::Id).primary_key())
                    .col(string(Contact::OwnerId))
                    .col(string(Contact::Name))
                    .col(string_null(Contact::Email))
                    .col(string_null(Contact::Phone))
                    .col(
                        string(Contact::NotificationPreference)
                            .default("email")
                            .comment("email, sms or both"),
                    )
                    .col(boolean(Contact::Deleted).default(false))
                    .col(
                        timestamp_with_time_zone(Contact::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(Contact::UpdatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("idx_contact_owner_id")
                    .table(Contact::Table)
                    .col(Contact::OwnerId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(EventContact::Table)
                    .if_not_exists()
                    .col(string(EventContact::EventId))
                    .col(string(EventContact::ContactId))
                    .col(
                        timestamp_with_time_zone(EventContact::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .primary_key(
                        Index::create()
                            .col(EventContact::EventId)
                            .col(EventContact::ContactId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_event_contact_event")
                            .from(EventContact::Table, EventContact::EventId)
                            .to(Event::Table, Event::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_event_contact_contact")
                            .from(EventContact::Table, EventContact::ContactId)
                            .to(Contact::Table, Contact::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(EventContact::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Contact::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Event::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum Event {
    Table,
    Id,
    OwnerId,
    Name,
    Memo,
    CheckInFrequency,
    MissedCheckinThreshold,
    LastCheckIn,
    Status,
    LastTriggerTime,
    Muted,
    NotificationContent,
    Deleted,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
pub enum Contact {
    Table,
    Id,
    OwnerId,
    Name,
    Email,
    Phone,
    NotificationPreference,
    Deleted,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum EventContact {
    Table,
    EventId,
    ContactId,
    CreatedAt,
}
