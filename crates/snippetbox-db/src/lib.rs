mod models;
mod snippet_ops;
mod tables;
mod user_ops;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::{io, result};

use redb_bincode::{ReadTransaction, WriteTransaction};
use snafu::{Location, ResultExt as _, Snafu};
use tokio::task::JoinError;
use tracing::{debug, instrument};

pub use self::models::{Snippet, SnippetRepository, UserRepository};
pub use self::tables::*;

const LOG_TARGET: &str = "snippetbox::db";

/// How many snippets [`SnippetRepository::latest_snippets`] returns.
pub const LATEST_SNIPPETS_LIMIT: usize = 10;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum DbError {
    Database {
        source: redb::DatabaseError,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(transparent)]
    Table {
        source: redb::TableError,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(transparent)]
    Storage {
        source: redb::StorageError,
        #[snafu(implicit)]
        location: Location,
    },
    Transaction {
        source: redb::TransactionError,
        #[snafu(implicit)]
        location: Location,
    },
    Commit {
        source: redb::CommitError,
        #[snafu(implicit)]
        location: Location,
    },
    Join {
        source: JoinError,
        #[snafu(implicit)]
        location: Location,
    },
    Io {
        source: io::Error,
        #[snafu(implicit)]
        location: Location,
    },
    PasswordHash {
        source: argon2::password_hash::Error,
        #[snafu(implicit)]
        location: Location,
    },
    InvalidTimestamp {
        source: time::error::ComponentRange,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("No matching record found"))]
    NoRecord,
    #[snafu(display("Invalid credentials"))]
    InvalidCredentials,
    #[snafu(display("Duplicate email"))]
    DuplicateEmail,
    Overflow,
}
pub type DbResult<T> = result::Result<T, DbError>;

/// Application storage: snippets and user accounts.
///
/// The underlying redb handle is shared, so the session store can live in
/// the same file (see [`Database::shared`]).
#[derive(Debug, Clone)]
pub struct Database {
    inner: Arc<redb_bincode::Database>,
}

impl Database {
    pub async fn mk_db_path(data_dir: &Path) -> result::Result<PathBuf, io::Error> {
        tokio::fs::create_dir_all(&data_dir).await?;
        Ok(data_dir.join("snippetbox.redb"))
    }

    #[instrument(skip_all)]
    pub async fn open(path: impl Into<PathBuf>) -> DbResult<Database> {
        let path = path.into();
        debug!(target: LOG_TARGET, path = %path.display(), "Opening database");
        let inner = tokio::task::spawn_blocking(move || redb_bincode::Database::create(path))
            .await
            .context(JoinSnafu)?
            .context(DatabaseSnafu)?;

        let s = Self {
            inner: Arc::new(inner),
        };
        s.write_with(Self::init_tables_tx).await?;

        Ok(s)
    }

    pub fn shared(&self) -> Arc<redb_bincode::Database> {
        self.inner.clone()
    }

    fn init_tables_tx(tx: &WriteTransaction) -> DbResult<()> {
        tx.open_table(&snippets::TABLE)?;
        tx.open_table(&users::TABLE)?;
        tx.open_table(&users_by_email::TABLE)?;
        Ok(())
    }

    pub async fn write_with<T>(
        &self,
        f: impl FnOnce(&'_ WriteTransaction) -> DbResult<T>,
    ) -> DbResult<T> {
        tokio::task::block_in_place(|| {
            let dbtx = self.inner.begin_write().context(TransactionSnafu)?;
            let res = f(&dbtx)?;

            dbtx.commit().context(CommitSnafu)?;

            Ok(res)
        })
    }

    pub async fn read_with<T>(
        &self,
        f: impl FnOnce(&'_ ReadTransaction) -> DbResult<T>,
    ) -> DbResult<T> {
        tokio::task::block_in_place(|| {
            let dbtx = self.inner.begin_read().context(TransactionSnafu)?;

            f(&dbtx)
        })
    }
}
