//! Registration form persistence
//!
//! Independent of the event log: one flat form submission becomes one row in
//! the `registrations` table. HTML forms post numbers as strings, so the two
//! numeric columns accept either form.

use crate::event_store::{SqliteStore, StoreError};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::types::Value as SqlValue;
use rusqlite::params_from_iter;
use serde::{Deserialize, Deserializer};

/// Column order used for the insert; must match [`RegistrationForm::values`].
pub const REGISTRATION_COLUMNS: [&str; 18] = [
    "full_name",
    "email",
    "phone",
    "dob",
    "gender",
    "coverage_level",
    "dependents",
    "dependents_names",
    "total_amount",
    "payment_status",
    "payment_reference",
    "payment_date",
    "occupation",
    "emergency_name",
    "emergency_phone",
    "street",
    "city",
    "state",
];

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RegistrationForm {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub dob: Option<String>,
    pub gender: Option<String>,
    pub coverage_level: Option<String>,
    #[serde(deserialize_with = "lenient_i64")]
    pub dependents: Option<i64>,
    #[serde(deserialize_with = "names_list")]
    pub dependents_names: Option<String>,
    #[serde(deserialize_with = "lenient_f64")]
    pub total_amount: Option<f64>,
    pub payment_status: Option<String>,
    pub payment_reference: Option<String>,
    pub payment_date: Option<String>,
    pub occupation: Option<String>,
    pub emergency_name: Option<String>,
    pub emergency_phone: Option<String>,
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
}

impl RegistrationForm {
    /// Column values in [`REGISTRATION_COLUMNS`] order.
    pub fn values(&self) -> Vec<SqlValue> {
        let text = |v: &Option<String>| v.clone().map_or(SqlValue::Null, SqlValue::Text);

        vec![
            text(&self.full_name),
            text(&self.email),
            text(&self.phone),
            text(&self.dob),
            text(&self.gender),
            text(&self.coverage_level),
            self.dependents.map_or(SqlValue::Null, SqlValue::Integer),
            text(&self.dependents_names),
            self.total_amount.map_or(SqlValue::Null, SqlValue::Real),
            text(&self.payment_status),
            text(&self.payment_reference),
            text(&self.payment_date),
            text(&self.occupation),
            text(&self.emergency_name),
            text(&self.emergency_phone),
            text(&self.street),
            text(&self.city),
            text(&self.state),
        ]
    }
}

fn insert_sql() -> String {
    let placeholders: Vec<String> = (1..=REGISTRATION_COLUMNS.len() + 1)
        .map(|i| format!("?{}", i))
        .collect();
    format!(
        "INSERT INTO registrations ({}, created_at) VALUES ({})",
        REGISTRATION_COLUMNS.join(", "),
        placeholders.join(", ")
    )
}

/// Destination for registration submissions
#[async_trait]
pub trait RegistrationStore: Send + Sync {
    /// Append one registration row; returns its id.
    async fn save_registration(&self, form: RegistrationForm) -> Result<i64, StoreError>;
}

#[async_trait]
impl RegistrationStore for SqliteStore {
    async fn save_registration(&self, form: RegistrationForm) -> Result<i64, StoreError> {
        let sql = insert_sql();
        let mut values = form.values();
        values.push(SqlValue::Integer(Utc::now().timestamp_millis()));

        let id = self
            .with_write("save registration", move |conn| {
                conn.execute(&sql, params_from_iter(values.iter()))?;
                Ok(conn.last_insert_rowid())
            })
            .await?;

        log::info!("📝 Saved registration id={}", id);
        Ok(id)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrText {
    Int(i64),
    Float(f64),
    Text(String),
}

fn lenient_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    match Option::<NumberOrText>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumberOrText::Int(n)) => Ok(Some(n)),
        Some(NumberOrText::Float(f)) if f.fract() == 0.0 => Ok(Some(f as i64)),
        Some(NumberOrText::Float(f)) => Err(serde::de::Error::custom(format!("expected a whole number, got {}", f))),
        Some(NumberOrText::Text(s)) if s.trim().is_empty() => Ok(None),
        Some(NumberOrText::Text(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("expected a whole number, got '{}'", s))),
    }
}

fn lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    match Option::<NumberOrText>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumberOrText::Int(n)) => Ok(Some(n as f64)),
        Some(NumberOrText::Float(f)) => Ok(Some(f)),
        Some(NumberOrText::Text(s)) if s.trim().is_empty() => Ok(None),
        Some(NumberOrText::Text(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("expected a number, got '{}'", s))),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NameList {
    One(String),
    Many(Vec<String>),
}

fn names_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<NameList>::deserialize(deserializer)? {
        None => None,
        Some(NameList::One(name)) => Some(name),
        Some(NameList::Many(names)) => Some(names.join(", ")),
    })
}
