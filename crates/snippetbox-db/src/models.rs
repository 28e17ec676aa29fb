use async_trait::async_trait;
use serde::Serialize;
use snafu::ResultExt as _;
use time::OffsetDateTime;

use crate::tables::SnippetRecord;
use crate::{DbResult, InvalidTimestampSnafu};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snippet {
    pub id: u64,
    pub title: String,
    pub content: String,
    #[serde(with = "time::serde::timestamp")]
    pub created: OffsetDateTime,
    #[serde(with = "time::serde::timestamp")]
    pub expires: OffsetDateTime,
}

impl Snippet {
    pub(crate) fn from_record(id: u64, record: SnippetRecord) -> DbResult<Self> {
        Ok(Self {
            id,
            title: record.title,
            content: record.content,
            created: OffsetDateTime::from_unix_timestamp(record.created)
                .context(InvalidTimestampSnafu)?,
            expires: OffsetDateTime::from_unix_timestamp(record.expires)
                .context(InvalidTimestampSnafu)?,
        })
    }
}

/// Snippet storage as seen by the web layer.
#[async_trait]
pub trait SnippetRepository: Send + Sync + 'static {
    /// Store a new snippet expiring `expires_days` from now; returns its id.
    async fn insert_snippet(&self, title: &str, content: &str, expires_days: u32) -> DbResult<u64>;

    /// Fails with [`crate::DbError::NoRecord`] for unknown or expired ids.
    async fn get_snippet(&self, id: u64) -> DbResult<Snippet>;

    /// Newest unexpired snippets first, at most
    /// [`crate::LATEST_SNIPPETS_LIMIT`].
    async fn latest_snippets(&self) -> DbResult<Vec<Snippet>>;
}

/// User account storage as seen by the web layer.
#[async_trait]
pub trait UserRepository: Send + Sync + 'static {
    /// Fails with [`crate::DbError::DuplicateEmail`] if the email is taken.
    async fn insert_user(&self, name: &str, email: &str, password: &str) -> DbResult<u64>;

    /// Fails with [`crate::DbError::InvalidCredentials`] on unknown email or
    /// wrong password.
    async fn authenticate_user(&self, email: &str, password: &str) -> DbResult<u64>;

    async fn user_exists(&self, id: u64) -> DbResult<bool>;
}
