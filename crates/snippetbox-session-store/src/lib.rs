//! Redb-backed session persistence for `tower-sessions`.
//!
//! Session records live in the same redb file as the rest of the application
//! data, keyed by the session id. The client only ever holds the opaque id in
//! a cookie; everything else stays server-side.
//!
//! ```ignore
//! let db = Arc::new(redb_bincode::Database::create("snippetbox.redb")?);
//! let store = RedbSessionStore::new(db)?;
//! let layer = tower_sessions::SessionManagerLayer::new(store);
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use bincode::{Decode, Encode};
use redb_bincode::TableDefinition;
use snafu::{ResultExt as _, Snafu};
use time::OffsetDateTime;
use tower_sessions_core::session::{Id, Record};
use tower_sessions_core::session_store::{self, SessionStore};
use tracing::debug;

const LOG_TARGET: &str = "snippetbox::session-store";

/// Session record as persisted.
///
/// `Record` itself is not bincode-friendly, so the data map is kept as JSON
/// bytes and the expiry as unix seconds.
#[derive(Debug, Clone, Encode, Decode)]
struct StoredSession {
    data: Vec<u8>,
    expiry_unix: i64,
}

impl StoredSession {
    fn from_record(record: &Record) -> session_store::Result<Self> {
        Ok(Self {
            data: serde_json::to_vec(&record.data).backend()?,
            expiry_unix: record.expiry_date.unix_timestamp(),
        })
    }

    fn into_record(self, id: Id) -> session_store::Result<Record> {
        Ok(Record {
            id,
            data: serde_json::from_slice(&self.data).backend()?,
            expiry_date: OffsetDateTime::from_unix_timestamp(self.expiry_unix).backend()?,
        })
    }

    fn is_expired_at(&self, now_unix: i64) -> bool {
        self.expiry_unix < now_unix
    }
}

const SESSIONS_TABLE: TableDefinition<i128, StoredSession> =
    TableDefinition::new("snippetbox_sessions");

#[derive(Debug, Snafu)]
pub enum SessionStoreError {
    #[snafu(display("Failed to open transaction"))]
    Transaction { source: redb::TransactionError },
    #[snafu(display("Failed to open sessions table"))]
    Table { source: redb::TableError },
    #[snafu(display("Failed to commit"))]
    Commit { source: redb::CommitError },
}

pub type SessionStoreResult<T> = std::result::Result<T, SessionStoreError>;

trait BackendExt<T> {
    fn backend(self) -> session_store::Result<T>;
}

impl<T, E> BackendExt<T> for std::result::Result<T, E>
where
    E: std::fmt::Display,
{
    fn backend(self) -> session_store::Result<T> {
        self.map_err(|e| session_store::Error::Backend(e.to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct RedbSessionStore {
    db: Arc<redb_bincode::Database>,
}

impl RedbSessionStore {
    /// Wrap a shared database, creating the sessions table if needed.
    ///
    /// Blocking; call before the runtime starts serving or from a blocking
    /// context.
    pub fn new(db: Arc<redb_bincode::Database>) -> SessionStoreResult<Self> {
        let write_txn = db.begin_write().context(TransactionSnafu)?;
        write_txn.open_table(&SESSIONS_TABLE).context(TableSnafu)?;
        write_txn.commit().context(CommitSnafu)?;

        Ok(Self { db })
    }

    /// Remove every session whose expiry has passed. Returns the number of
    /// records removed.
    pub async fn delete_expired(&self) -> session_store::Result<usize> {
        let db = self.db.clone();
        let deleted = tokio::task::spawn_blocking(move || {
            let now = OffsetDateTime::now_utc().unix_timestamp();
            let write_txn = db.begin_write().backend()?;
            let deleted = {
                let mut table = write_txn.open_table(&SESSIONS_TABLE).backend()?;
                let mut expired = vec![];
                for entry in table.range(..).backend()? {
                    let (k, v) = entry.backend()?;
                    if v.value().is_expired_at(now) {
                        expired.push(k.value());
                    }
                }
                for id in &expired {
                    table.remove(id).backend()?;
                }
                expired.len()
            };
            write_txn.commit().backend()?;
            Ok::<_, session_store::Error>(deleted)
        })
        .await
        .backend()??;

        debug!(target: LOG_TARGET, deleted, "Expired sessions removed");
        Ok(deleted)
    }

    fn insert_blocking(
        db: &redb_bincode::Database,
        id: i128,
        stored: &StoredSession,
        only_if_vacant: bool,
    ) -> session_store::Result<bool> {
        let write_txn = db.begin_write().backend()?;
        {
            let mut table = write_txn.open_table(&SESSIONS_TABLE).backend()?;
            if only_if_vacant && table.get(&id).backend()?.is_some() {
                return Ok(false);
            }
            table.insert(&id, stored).backend()?;
        }
        write_txn.commit().backend()?;
        Ok(true)
    }
}

#[async_trait]
impl SessionStore for RedbSessionStore {
    async fn create(&self, record: &mut Record) -> session_store::Result<()> {
        let stored = StoredSession::from_record(record)?;
        let db = self.db.clone();

        // A freshly generated id colliding with a live one is astronomically
        // unlikely, but overwriting someone else's session must never happen.
        loop {
            let id = record.id.0;
            let db = db.clone();
            let stored = stored.clone();
            let inserted =
                tokio::task::spawn_blocking(move || Self::insert_blocking(&db, id, &stored, true))
                    .await
                    .backend()??;
            if inserted {
                return Ok(());
            }
            record.id = Id::default();
        }
    }

    async fn save(&self, record: &Record) -> session_store::Result<()> {
        let stored = StoredSession::from_record(record)?;
        let id = record.id.0;
        let db = self.db.clone();

        tokio::task::spawn_blocking(move || Self::insert_blocking(&db, id, &stored, false))
            .await
            .backend()??;
        Ok(())
    }

    async fn load(&self, session_id: &Id) -> session_store::Result<Option<Record>> {
        let session_id = *session_id;
        let db = self.db.clone();

        tokio::task::spawn_blocking(move || {
            let read_txn = db.begin_read().backend()?;
            let table = read_txn.open_table(&SESSIONS_TABLE).backend()?;

            let Some(stored) = table.get(&session_id.0).backend()?.map(|g| g.value()) else {
                return Ok(None);
            };

            if stored.is_expired_at(OffsetDateTime::now_utc().unix_timestamp()) {
                return Ok(None);
            }

            stored.into_record(session_id).map(Some)
        })
        .await
        .backend()?
    }

    async fn delete(&self, session_id: &Id) -> session_store::Result<()> {
        let id = session_id.0;
        let db = self.db.clone();

        tokio::task::spawn_blocking(move || {
            let write_txn = db.begin_write().backend()?;
            {
                let mut table = write_txn.open_table(&SESSIONS_TABLE).backend()?;
                table.remove(&id).backend()?;
            }
            write_txn.commit().backend()
        })
        .await
        .backend()?
    }
}
