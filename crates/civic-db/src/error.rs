use civic_types::FlowError;
use rusqlite::ErrorCode;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("This email is already registered and verified.")]
    AlreadyVerified,

    #[error("Email not registered.")]
    NotRegistered,

    #[error("Email not verified.")]
    NotVerified,

    #[error("A citizen profile already exists for this email.")]
    CitizenExists,

    #[error("ID number space exhausted")]
    IdSpaceExhausted,

    #[error("database still busy after {attempts} attempts")]
    Busy { attempts: u32 },

    #[error("session not found")]
    SessionNotFound,

    #[error(transparent)]
    Flow(#[from] FlowError),

    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("database lock poisoned")]
    LockPoisoned,

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

impl StoreError {
    /// Transient lock contention that a retry may clear.
    pub fn is_busy(&self) -> bool {
        match self {
            Self::Sqlite(e) => matches!(
                e.sqlite_error_code(),
                Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
            ),
            Self::Busy { .. } => true,
            _ => false,
        }
    }

    /// True for a UNIQUE violation on `{table}.{column}`.
    pub(crate) fn is_unique_violation(&self, target: &str) -> bool {
        match self {
            Self::Sqlite(rusqlite::Error::SqliteFailure(err, msg)) => {
                err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    && msg.as_deref().is_some_and(|m| m.contains(target))
            }
            _ => false,
        }
    }
}
