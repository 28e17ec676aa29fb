use async_trait::async_trait;
use redb_bincode::ReadableTable as _;
use snafu::OptionExt as _;
use time::{Duration, OffsetDateTime};
use tracing::debug;

use crate::tables::SnippetRecord;
use crate::{
    Database, DbResult, LATEST_SNIPPETS_LIMIT, LOG_TARGET, NoRecordSnafu, OverflowSnafu, Snippet,
    SnippetRepository, snippets,
};

impl Database {
    pub fn insert_snippet_tx(
        record: &SnippetRecord,
        snippets_table: &mut snippets::Table,
    ) -> DbResult<u64> {
        let id = snippets_table
            .last()?
            .map(|(k, _)| k.value())
            .unwrap_or_default()
            .checked_add(1)
            .context(OverflowSnafu)?;
        snippets_table.insert(&id, record)?;
        Ok(id)
    }

    pub fn get_snippet_tx(
        id: u64,
        now: i64,
        snippets_table: &impl redb_bincode::ReadableTable<u64, SnippetRecord>,
    ) -> DbResult<Option<Snippet>> {
        let Some(record) = snippets_table.get(&id)?.map(|g| g.value()) else {
            return Ok(None);
        };
        if record.expires <= now {
            return Ok(None);
        }
        Snippet::from_record(id, record).map(Some)
    }
}

#[async_trait]
impl SnippetRepository for Database {
    async fn insert_snippet(&self, title: &str, content: &str, expires_days: u32) -> DbResult<u64> {
        let now = OffsetDateTime::now_utc();
        let record = SnippetRecord {
            title: title.to_owned(),
            content: content.to_owned(),
            created: now.unix_timestamp(),
            expires: (now + Duration::days(i64::from(expires_days))).unix_timestamp(),
        };

        let id = self
            .write_with(|tx| {
                let mut snippets_table = tx.open_table(&snippets::TABLE)?;
                Self::insert_snippet_tx(&record, &mut snippets_table)
            })
            .await?;

        debug!(target: LOG_TARGET, id, expires_days, "Snippet inserted");
        Ok(id)
    }

    async fn get_snippet(&self, id: u64) -> DbResult<Snippet> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        self.read_with(|tx| {
            let snippets_table = tx.open_table(&snippets::TABLE)?;
            Self::get_snippet_tx(id, now, &snippets_table)
        })
        .await?
        .context(NoRecordSnafu)
    }

    async fn latest_snippets(&self) -> DbResult<Vec<Snippet>> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        self.read_with(|tx| {
            let snippets_table = tx.open_table(&snippets::TABLE)?;

            let mut ret = vec![];
            for entry in snippets_table.range(..)?.rev() {
                if LATEST_SNIPPETS_LIMIT <= ret.len() {
                    break;
                }
                let (k, v) = entry?;
                let record = v.value();
                if record.expires <= now {
                    continue;
                }
                ret.push(Snippet::from_record(k.value(), record)?);
            }
            Ok(ret)
        })
        .await
    }
}
