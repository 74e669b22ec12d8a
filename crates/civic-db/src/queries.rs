use chrono::{SubsecRound, TimeDelta, Utc};
use civic_types::{FlowEvent, FlowStage, Session};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior};
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::{PendingRow, SessionRow, TIMESTAMP_FORMAT, UserRow};
use crate::{Database, Result, StoreError};

impl Database {
    // -- Users --

    pub fn get_user(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, email))
    }

    // -- Registration --

    /// Issue `token` for `email`, replacing any earlier pending token, and make
    /// sure a user row exists. Rejects emails that are already verified.
    pub fn register_pending(&self, email: &str, token: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            if query_user(&tx, email)?.is_some_and(|u| u.verified) {
                return Err(StoreError::AlreadyVerified);
            }

            tx.execute(
                "INSERT INTO pending_registrations (email, token) VALUES (?1, ?2)
                 ON CONFLICT(email) DO UPDATE
                    SET token = excluded.token, created_at = datetime('now')",
                (email, token),
            )?;
            tx.execute("INSERT OR IGNORE INTO users (email) VALUES (?1)", [email])?;

            tx.commit()?;
            Ok(())
        })
    }

    pub fn get_pending(&self, email: &str) -> Result<Option<PendingRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT email, token, created_at FROM pending_registrations WHERE email = ?1",
                    [email],
                    |row| {
                        Ok(PendingRow {
                            email: row.get(0)?,
                            token: row.get(1)?,
                            created_at: row.get(2)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
    }

    /// Consume a verification token. Returns `false` when there is no pending
    /// record or the token differs; the two cases are deliberately not
    /// distinguishable to the caller.
    ///
    /// On success the user is marked verified and the pending row is deleted.
    /// Sessions still waiting on this email are dropped rather than upgraded:
    /// whoever opened them never had to prove they hold the token, so the only
    /// verified session is the one the caller opens next.
    pub fn consume_token(&self, email: &str, token: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let stored: Option<String> = tx
                .query_row(
                    "SELECT token FROM pending_registrations WHERE email = ?1",
                    [email],
                    |row| row.get(0),
                )
                .optional()?;

            if stored.as_deref() != Some(token) {
                return Ok(false);
            }

            tx.execute("UPDATE users SET verified = 1 WHERE email = ?1", [email])?;
            tx.execute("DELETE FROM pending_registrations WHERE email = ?1", [email])?;

            let dropped = tx.execute(
                "DELETE FROM sessions WHERE email = ?1 AND stage = ?2",
                (email, FlowStage::AwaitingVerification.as_str()),
            )?;

            tx.commit()?;
            debug!("Verified {} ({} waiting sessions dropped)", email, dropped);
            Ok(true)
        })
    }

    /// Looks up whether `email` may log in and which stage it resumes at.
    pub fn login_stage(&self, email: &str) -> Result<FlowStage> {
        self.with_conn(|conn| {
            let user = query_user(conn, email)?.ok_or(StoreError::NotRegistered)?;
            if !user.verified {
                return Err(StoreError::NotVerified);
            }
            let has_citizen: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM citizens WHERE email = ?1)",
                [email],
                |row| row.get(0),
            )?;
            Ok(FlowStage::after_login(has_citizen))
        })
    }

    // -- Sessions --

    /// Open a session that stops resolving after `ttl`. Expired rows are
    /// purged first, so the table only grows with live sessions.
    pub fn create_session(
        &self,
        email: &str,
        stage: FlowStage,
        ttl: TimeDelta,
    ) -> Result<Session> {
        let id = Uuid::new_v4();
        let expires_at = (Utc::now() + ttl).trunc_subsecs(0);

        let purged = self.with_conn(|conn| {
            let purged = delete_expired_sessions(conn)?;
            conn.execute(
                "INSERT INTO sessions (id, email, stage, expires_at) VALUES (?1, ?2, ?3, ?4)",
                (
                    id.to_string(),
                    email,
                    stage.as_str(),
                    expires_at.format(TIMESTAMP_FORMAT).to_string(),
                ),
            )?;
            Ok(purged)
        })?;

        if purged > 0 {
            debug!("Purged {} expired sessions", purged);
        }
        info!("Session {} opened for {} at stage {}", id, email, stage);
        Ok(Session {
            id,
            email: email.to_string(),
            stage,
            expires_at,
        })
    }

    pub fn purge_expired_sessions(&self) -> Result<usize> {
        self.with_conn(delete_expired_sessions)
    }

    pub fn get_session(&self, id: Uuid) -> Result<Option<Session>> {
        let row = self.with_conn(|conn| query_session(conn, id))?;
        row.map(Session::try_from).transpose()
    }

    /// Apply `event` to the session's stage machine and persist the result.
    pub fn advance_session(&self, id: Uuid, event: FlowEvent) -> Result<Session> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let mut session = query_session(&tx, id)?
                .map(Session::try_from)
                .transpose()?
                .ok_or(StoreError::SessionNotFound)?;

            session.stage = session.stage.advance(event)?;
            tx.execute(
                "UPDATE sessions SET stage = ?2, updated_at = datetime('now') WHERE id = ?1",
                (id.to_string(), session.stage.as_str()),
            )?;

            tx.commit()?;
            Ok(session)
        })
    }

    pub fn delete_session(&self, id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute("DELETE FROM sessions WHERE id = ?1", [id.to_string()])?;
            Ok(n > 0)
        })
    }
}

fn query_user(conn: &Connection, email: &str) -> Result<Option<UserRow>> {
    let mut stmt =
        conn.prepare("SELECT email, verified, created_at FROM users WHERE email = ?1")?;

    let row = stmt
        .query_row([email], |row| {
            Ok(UserRow {
                email: row.get(0)?,
                verified: row.get(1)?,
                created_at: row.get(2)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn delete_expired_sessions(conn: &Connection) -> Result<usize> {
    Ok(conn.execute("DELETE FROM sessions WHERE expires_at <= datetime('now')", [])?)
}

/// Expired sessions read as missing.
fn query_session(conn: &Connection, id: Uuid) -> Result<Option<SessionRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, email, stage, created_at, updated_at, expires_at
         FROM sessions WHERE id = ?1 AND expires_at > datetime('now')",
    )?;

    let row = stmt
        .query_row([id.to_string()], |row| {
            Ok(SessionRow {
                id: row.get(0)?,
                email: row.get(1)?,
                stage: row.get(2)?,
                created_at: row.get(3)?,
                updated_at: row.get(4)?,
                expires_at: row.get(5)?,
            })
        })
        .optional()?;

    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ttl() -> TimeDelta {
        TimeDelta::hours(1)
    }

    fn verified_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.register_pending("a@x.com", "T").unwrap();
        db.consume_token("a@x.com", "T").unwrap();
        db
    }

    fn session_rows(db: &Database) -> i64 {
        db.with_conn(|conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM sessions", [], |r| r.get(0))?)
        })
        .unwrap()
    }

    #[test]
    fn register_then_verify_scenario() {
        let db = Database::open_in_memory().unwrap();

        db.register_pending("a@x.com", "T").unwrap();
        assert!(!db.get_user("a@x.com").unwrap().unwrap().verified);
        assert_eq!(db.get_pending("a@x.com").unwrap().unwrap().token, "T");

        assert!(!db.consume_token("a@x.com", "bad").unwrap());
        assert!(!db.get_user("a@x.com").unwrap().unwrap().verified);
        assert!(db.get_pending("a@x.com").unwrap().is_some());

        assert!(db.consume_token("a@x.com", "T").unwrap());
        assert!(db.get_user("a@x.com").unwrap().unwrap().verified);
        assert!(db.get_pending("a@x.com").unwrap().is_none());
    }

    #[test]
    fn token_is_single_use() {
        let db = Database::open_in_memory().unwrap();
        db.register_pending("a@x.com", "T").unwrap();

        assert!(db.consume_token("a@x.com", "T").unwrap());
        assert!(!db.consume_token("a@x.com", "T").unwrap());
    }

    #[test]
    fn unknown_email_fails_like_wrong_token() {
        let db = Database::open_in_memory().unwrap();
        assert!(!db.consume_token("ghost@x.com", "T").unwrap());
        assert!(db.get_user("ghost@x.com").unwrap().is_none());
    }

    #[test]
    fn reregistering_replaces_the_token() {
        let db = Database::open_in_memory().unwrap();
        db.register_pending("a@x.com", "first").unwrap();
        db.register_pending("a@x.com", "second").unwrap();

        assert!(!db.consume_token("a@x.com", "first").unwrap());
        assert!(db.consume_token("a@x.com", "second").unwrap());
    }

    #[test]
    fn verified_email_cannot_register_again() {
        let db = Database::open_in_memory().unwrap();
        db.register_pending("a@x.com", "T").unwrap();
        db.consume_token("a@x.com", "T").unwrap();

        let err = db.register_pending("a@x.com", "U").unwrap_err();
        assert!(matches!(err, StoreError::AlreadyVerified));
        assert!(db.get_pending("a@x.com").unwrap().is_none());
    }

    #[test]
    fn verification_drops_sessions_opened_at_registration() {
        let db = Database::open_in_memory().unwrap();

        // Anyone can register an address and keep the waiting session.
        db.register_pending("victim@x.com", "T1").unwrap();
        let squatter = db
            .create_session("victim@x.com", FlowStage::AwaitingVerification, ttl())
            .unwrap();
        db.register_pending("victim@x.com", "T2").unwrap();
        let owner = db
            .create_session("victim@x.com", FlowStage::AwaitingVerification, ttl())
            .unwrap();

        assert!(db.consume_token("victim@x.com", "T2").unwrap());

        assert!(db.get_session(squatter.id).unwrap().is_none());
        assert!(db.get_session(owner.id).unwrap().is_none());
        assert_eq!(session_rows(&db), 0);
    }

    #[test]
    fn expired_sessions_are_hidden_then_purged() {
        let db = verified_db();

        let stale = db
            .create_session("a@x.com", FlowStage::Profile, TimeDelta::seconds(-60))
            .unwrap();
        assert!(db.get_session(stale.id).unwrap().is_none());
        assert!(matches!(
            db.advance_session(stale.id, FlowEvent::CitizenRegistered),
            Err(StoreError::SessionNotFound)
        ));
        assert_eq!(session_rows(&db), 1);

        let fresh = db.create_session("a@x.com", FlowStage::Profile, ttl()).unwrap();
        assert_eq!(session_rows(&db), 1);

        let loaded = db.get_session(fresh.id).unwrap().unwrap();
        assert_eq!(loaded, fresh);
        assert_eq!(db.purge_expired_sessions().unwrap(), 0);
    }

    #[test]
    fn login_requires_verified_user() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(
            db.login_stage("a@x.com"),
            Err(StoreError::NotRegistered)
        ));

        db.register_pending("a@x.com", "T").unwrap();
        assert!(matches!(db.login_stage("a@x.com"), Err(StoreError::NotVerified)));

        db.consume_token("a@x.com", "T").unwrap();
        assert_eq!(db.login_stage("a@x.com").unwrap(), FlowStage::Profile);
    }

    #[test]
    fn session_lifecycle() {
        let db = verified_db();

        let session = db.create_session("a@x.com", FlowStage::Profile, ttl()).unwrap();
        let advanced = db
            .advance_session(session.id, FlowEvent::CitizenRegistered)
            .unwrap();
        assert_eq!(advanced.stage, FlowStage::IdCard);

        let err = db
            .advance_session(session.id, FlowEvent::CitizenRegistered)
            .unwrap_err();
        assert!(matches!(err, StoreError::Flow(_)));

        assert!(db.delete_session(session.id).unwrap());
        assert!(db.get_session(session.id).unwrap().is_none());
        assert!(matches!(
            db.advance_session(session.id, FlowEvent::EmailVerified),
            Err(StoreError::SessionNotFound)
        ));
    }
}
