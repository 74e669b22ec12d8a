use std::thread;
use std::time::Duration;

use civic_types::IdNumber;
use rusqlite::{Connection, TransactionBehavior};
use tracing::warn;

use crate::{Database, Result, StoreError};

const RETRY_BACKOFF: Duration = Duration::from_millis(50);

/// Source of fresh citizen ID numbers. Every call returns a number no other
/// call has returned or will return.
pub trait IdAllocator {
    fn next_id(&self) -> Result<IdNumber>;
}

impl IdAllocator for Database {
    fn next_id(&self) -> Result<IdNumber> {
        self.allocate_next_id()
    }
}

impl Database {
    /// Bump the counter row and return the new value.
    ///
    /// The read and the write share one `BEGIN IMMEDIATE` transaction, so the
    /// SQLite write lock serializes callers across handles and processes.
    /// BUSY failures roll back and are retried with a linear backoff.
    pub fn allocate_next_id(&self) -> Result<IdNumber> {
        let mut attempt = 1;
        loop {
            match self.with_conn_mut(bump_counter) {
                Err(e) if e.is_busy() => {
                    if attempt >= self.alloc_attempts {
                        return Err(StoreError::Busy { attempts: attempt });
                    }
                    warn!("ID allocation attempt {} hit a busy database: {}", attempt, e);
                    thread::sleep(RETRY_BACKOFF * attempt);
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    /// Highest number handed out so far (0 when none).
    pub fn last_issued_id(&self) -> Result<u64> {
        self.with_conn(|conn| {
            let last: i64 =
                conn.query_row("SELECT last_id FROM id_counter WHERE id = 1", [], |r| r.get(0))?;
            u64::try_from(last).map_err(|_| StoreError::Corrupt(format!("negative counter {last}")))
        })
    }
}

fn bump_counter(conn: &mut Connection) -> Result<IdNumber> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let last: i64 = tx.query_row("SELECT last_id FROM id_counter WHERE id = 1", [], |r| r.get(0))?;

    // Dropping `tx` on the error path rolls back.
    let next = u64::try_from(last)
        .ok()
        .and_then(|last| last.checked_add(1))
        .and_then(IdNumber::new)
        .ok_or(StoreError::IdSpaceExhausted)?;

    tx.execute(
        "UPDATE id_counter SET last_id = ?1 WHERE id = 1",
        [next.value() as i64],
    )?;
    tx.commit()?;

    Ok(next)
}
