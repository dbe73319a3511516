//! Owner profile: where the owner's own reminders go, plus optional per-user
//! provider credentials used by the test-notification endpoint.

use sea_orm::entity::prelude::*;
use serde::Serialize;
use time::OffsetDateTime;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "user_profile")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub owner_id: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub push_token: Option<String>,
    pub email_from: Option<String>,
    pub sms_account_sid: Option<String>,
    #[serde(skip_serializing)]
    pub sms_auth_token: Option<String>,
    pub sms_from_number: Option<String>,
    pub updated_at: OffsetDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
