use chrono::NaiveDate;
use civic_types::{Citizen, IdNumber, Theme};
use rusqlite::{Connection, OptionalExtension};
use tracing::{info, warn};

use crate::counter::IdAllocator;
use crate::models::{CitizenRow, DATE_FORMAT};
use crate::{Database, Result, StoreError};

/// Profile fields supplied at registration. Callers validate them first.
#[derive(Debug, Clone, Copy)]
pub struct NewCitizen<'a> {
    pub email: &'a str,
    pub full_name: &'a str,
    pub date_of_birth: NaiveDate,
    pub theme: Theme,
}

impl Database {
    pub fn register_citizen(&self, citizen: NewCitizen<'_>) -> Result<IdNumber> {
        self.register_citizen_with(self, citizen)
    }

    /// Mint an ID number from `allocator` and store the citizen.
    ///
    /// A second registration for the same email fails with `CitizenExists`.
    /// The eligibility check runs before allocation so ordinary duplicates
    /// cost no number; a racing duplicate that only trips the UNIQUE index
    /// leaves its allocated number unused. Gaps are acceptable, repeats are not.
    pub fn register_citizen_with(
        &self,
        allocator: &impl IdAllocator,
        citizen: NewCitizen<'_>,
    ) -> Result<IdNumber> {
        self.with_conn(|conn| check_eligible(conn, citizen.email))?;

        let id_number = allocator.next_id()?;

        self.with_conn(|conn| insert_citizen(conn, &citizen, id_number))
            .map_err(|e| {
                if e.is_unique_violation("citizens.email") {
                    warn!(
                        "Duplicate citizen insert for {}; id {} left unused",
                        citizen.email, id_number
                    );
                    StoreError::CitizenExists
                } else {
                    e
                }
            })?;

        info!("Issued citizen id {} to {}", id_number, citizen.email);
        Ok(id_number)
    }

    pub fn get_citizen(&self, email: &str) -> Result<Option<Citizen>> {
        let row = self.with_conn(|conn| query_citizen(conn, email))?;
        row.map(Citizen::try_from).transpose()
    }
}

fn check_eligible(conn: &Connection, email: &str) -> Result<()> {
    let verified: Option<bool> = conn
        .query_row("SELECT verified FROM users WHERE email = ?1", [email], |row| row.get(0))
        .optional()?;

    match verified {
        None => return Err(StoreError::NotRegistered),
        Some(false) => return Err(StoreError::NotVerified),
        Some(true) => {}
    }

    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM citizens WHERE email = ?1)",
        [email],
        |row| row.get(0),
    )?;
    if exists {
        return Err(StoreError::CitizenExists);
    }
    Ok(())
}

fn insert_citizen(conn: &Connection, citizen: &NewCitizen<'_>, id_number: IdNumber) -> Result<()> {
    conn.execute(
        "INSERT INTO citizens (email, full_name, date_of_birth, id_number, theme)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        (
            citizen.email,
            citizen.full_name,
            citizen.date_of_birth.format(DATE_FORMAT).to_string(),
            id_number.to_string(),
            citizen.theme.as_str(),
        ),
    )?;
    Ok(())
}

fn query_citizen(conn: &Connection, email: &str) -> Result<Option<CitizenRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, email, full_name, date_of_birth, id_number, theme, created_at
         FROM citizens WHERE email = ?1",
    )?;

    let row = stmt
        .query_row([email], |row| {
            Ok(CitizenRow {
                id: row.get(0)?,
                email: row.get(1)?,
                full_name: row.get(2)?,
                date_of_birth: row.get(3)?,
                id_number: row.get(4)?,
                theme: row.get(5)?,
                created_at: row.get(6)?,
            })
        })
        .optional()?;

    Ok(row)
}
