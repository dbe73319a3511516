use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(UserProfile::Table)
                    .if_not_exists()
                    .col(string(UserProfile::OwnerId).primary_key())
                    .col(string_null(UserProfile::Email))
                    .col(string_null(UserProfile::Phone))
                    .col(string_null(UserProfile::PushToken))
                    .col(string_null(UserProfile::EmailFrom))
                    .col(string_null(UserProfile::SmsAccountSid))
                    .col(string_null(UserProfile::SmsAuthToken))
                    .col(string_null(UserProfile::SmsFromNumber))
                    .col(
                        timestamp_with_time_zone(UserProfile::UpdatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(UserProfile::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum UserProfile {
    Table,
    OwnerId,
    Email,
    Phone,
    PushToken,
    EmailFrom,
    SmsAccountSid,
    SmsAuthToken,
    SmsFromNumber,
    UpdatedAt,
}
