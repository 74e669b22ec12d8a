//! Database row types. These map directly to SQLite rows and stay distinct
//! from the civic-types domain models.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use civic_types::{Citizen, Session};

use crate::StoreError;

pub const DATE_FORMAT: &str = "%Y-%m-%d";
/// Matches what SQLite's `datetime()` produces, so stored values compare as text.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone)]
pub struct UserRow {
    pub email: String,
    pub verified: bool,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct PendingRow {
    pub email: String,
    pub token: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct CitizenRow {
    pub id: i64,
    pub email: String,
    pub full_name: String,
    pub date_of_birth: String,
    pub id_number: String,
    pub theme: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct SessionRow {
    pub id: String,
    pub email: String,
    pub stage: String,
    pub created_at: String,
    pub updated_at: String,
    pub expires_at: String,
}

impl TryFrom<CitizenRow> for Citizen {
    type Error = StoreError;

    fn try_from(row: CitizenRow) -> Result<Self, Self::Error> {
        let corrupt = |field: &str, value: &str| {
            StoreError::Corrupt(format!("citizen {} has bad {}: '{}'", row.id, field, value))
        };

        Ok(Citizen {
            date_of_birth: NaiveDate::parse_from_str(&row.date_of_birth, DATE_FORMAT)
                .map_err(|_| corrupt("date_of_birth", &row.date_of_birth))?,
            id_number: row
                .id_number
                .parse()
                .map_err(|_| corrupt("id_number", &row.id_number))?,
            theme: row.theme.parse().map_err(|_| corrupt("theme", &row.theme))?,
            created_at: parse_timestamp(&row.created_at)
                .ok_or_else(|| corrupt("created_at", &row.created_at))?,
            email: row.email,
            full_name: row.full_name,
        })
    }
}

impl TryFrom<SessionRow> for Session {
    type Error = StoreError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        Ok(Session {
            id: row
                .id
                .parse()
                .map_err(|_| StoreError::Corrupt(format!("bad session id '{}'", row.id)))?,
            stage: row.stage.parse()?,
            expires_at: parse_timestamp(&row.expires_at).ok_or_else(|| {
                StoreError::Corrupt(format!("session {} has bad expires_at '{}'", row.id, row.expires_at))
            })?,
            email: row.email,
        })
    }
}

/// SQLite stores `datetime('now')` as "YYYY-MM-DD HH:MM:SS" without timezone.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    raw.parse::<DateTime<Utc>>()
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
                .ok()
                .map(|ndt| ndt.and_utc())
        })
}
