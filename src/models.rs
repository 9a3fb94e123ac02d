use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use utoipa::ToSchema;

pub type Id = uuid::Uuid;

pub const DEFAULT_ROLE: &str = "user";
pub const DEFAULT_REMARK: &str = "-";

/// Stored user record. Carries the password hash, so it never leaves the
/// server as-is; handlers respond with [`UserProfile`].
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Id,
    pub username: String,
    pub password: String,
    pub firstname: String,
    pub lastname: String,
    pub role: String,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
    pub firstname: String,
    pub lastname: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct UserProfile {
    pub id: Id,
    pub username: String,
    pub firstname: String,
    pub lastname: String,
    pub role: String,
}

impl From<User> for UserProfile {
    fn from(u: User) -> Self {
        Self { id: u.id, username: u.username, firstname: u.firstname, lastname: u.lastname, role: u.role }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Transaction {
    pub id: Id,
    #[sqlx(rename = "user_id")]
    pub user: Option<Id>,
    pub amount: Option<f64>,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub kind: Option<String>,
    pub remark: String,
    #[serde(default, deserialize_with = "flexible_date::deserialize_opt")]
    pub date: Option<DateTime<Utc>>,
}

/// Body of `POST /transactions`. Every field is optional; the record is stored as sent.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct NewTransaction {
    #[serde(default)]
    pub user: Option<Id>,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub remark: Option<String>,
    #[serde(default, deserialize_with = "flexible_date::deserialize_opt")]
    #[schema(value_type = Option<String>, example = "2024-01-01")]
    pub date: Option<DateTime<Utc>>,
}

impl NewTransaction {
    pub fn into_transaction(self, id: Id) -> Transaction {
        Transaction {
            id,
            user: self.user,
            amount: self.amount,
            kind: self.kind,
            remark: self.remark.unwrap_or_else(|| DEFAULT_REMARK.to_string()),
            date: self.date,
        }
    }
}

/// Body of `PUT /transactions/{id}`. Absent fields keep their stored value;
/// an explicit `null` clears the field (`remark` falls back to `"-"`).
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct TransactionPatch {
    #[serde(default, deserialize_with = "present")]
    #[schema(value_type = Option<String>, format = Uuid)]
    pub user: Option<Option<Id>>,
    #[serde(default, deserialize_with = "present")]
    #[schema(value_type = Option<f64>)]
    pub amount: Option<Option<f64>>,
    #[serde(default, rename = "type", deserialize_with = "present")]
    #[schema(value_type = Option<String>)]
    pub kind: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    #[schema(value_type = Option<String>)]
    pub remark: Option<Option<String>>,
    #[serde(default, deserialize_with = "flexible_date::deserialize_present")]
    #[schema(value_type = Option<String>, example = "2024-01-31")]
    pub date: Option<Option<DateTime<Utc>>>,
}

impl TransactionPatch {
    pub fn apply_to(self, tx: &mut Transaction) {
        if let Some(user) = self.user { tx.user = user; }
        if let Some(amount) = self.amount { tx.amount = amount; }
        if let Some(kind) = self.kind { tx.kind = kind; }
        if let Some(remark) = self.remark {
            tx.remark = remark.unwrap_or_else(|| DEFAULT_REMARK.to_string());
        }
        if let Some(date) = self.date { tx.date = date; }
    }
}

// Only called for keys present in the body, so `null` becomes `Some(None)`
// while a missing key stays at the `None` default.
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Parses either a calendar date (`2024-01-01`, taken as midnight UTC) or an
/// RFC 3339 timestamp.
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return d.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
    }
    DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.with_timezone(&Utc))
}

mod flexible_date {
    use super::*;

    pub fn deserialize_opt<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(s) => parse_date(s)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid date '{s}'"))),
        }
    }

    pub fn deserialize_present<'de, D>(deserializer: D) -> Result<Option<Option<DateTime<Utc>>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserialize_opt(deserializer).map(Some)
    }
}
