//! User accounts and password credentials.
//!
//! Passwords are stored as Argon2id hashes in PHC string format, which
//! carries the salt and the algorithm parameters alongside the hash.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{self, SaltString};
use argon2::{Algorithm, Argon2, Params, PasswordHash, PasswordHasher as _, PasswordVerifier as _, Version};
use async_trait::async_trait;
use redb_bincode::ReadableTable as _;
use snafu::{OptionExt as _, ResultExt as _};
use time::OffsetDateTime;
use tracing::{debug, instrument};

use crate::tables::UserRecord;
use crate::{
    Database, DbResult, DuplicateEmailSnafu, InvalidCredentialsSnafu, JoinSnafu,
    LOG_TARGET, OverflowSnafu, PasswordHashSnafu, UserRepository, users, users_by_email,
};

/// Verified against when the email is unknown, so that a login attempt
/// costs the same whether or not the account exists.
const DUMMY_PASSWORD_HASH: &str = "$argon2id$v=19$m=15000,t=2,p=1$\
    gZiV/M1gPc22ElAH/Jh1Hw$\
    CWOrkoo7oJBQ/iyh7uJ0LO2aLEfrHwTWllSAxT0zRno";

fn hasher() -> Argon2<'static> {
    Argon2::new(
        Algorithm::Argon2id,
        Version::V0x13,
        Params::new(15000, 2, 1, None).expect("Valid argon2 params"),
    )
}

fn compute_password_hash(password: &str) -> DbResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(hasher()
        .hash_password(password.as_bytes(), &salt)
        .context(PasswordHashSnafu)?
        .to_string())
}

fn verify_password_hash(expected_hash: &str, password_candidate: &str) -> DbResult<()> {
    let expected_hash = PasswordHash::new(expected_hash).context(PasswordHashSnafu)?;

    match hasher().verify_password(password_candidate.as_bytes(), &expected_hash) {
        Ok(()) => Ok(()),
        Err(password_hash::Error::Password) => InvalidCredentialsSnafu.fail(),
        Err(source) => Err(source).context(PasswordHashSnafu),
    }
}

impl Database {
    pub fn insert_user_tx(
        record: &UserRecord,
        users_table: &mut users::Table,
        users_by_email_table: &mut users_by_email::Table,
    ) -> DbResult<u64> {
        if users_by_email_table.get(&record.email)?.is_some() {
            return DuplicateEmailSnafu.fail();
        }

        let id = users_table
            .last()?
            .map(|(k, _)| k.value())
            .unwrap_or_default()
            .checked_add(1)
            .context(OverflowSnafu)?;

        users_table.insert(&id, record)?;
        users_by_email_table.insert(&record.email, &id)?;
        Ok(id)
    }
}

#[async_trait]
impl UserRepository for Database {
    #[instrument(skip_all)]
    async fn insert_user(&self, name: &str, email: &str, password: &str) -> DbResult<u64> {
        let password = password.to_owned();
        let hashed_password = tokio::task::spawn_blocking(move || compute_password_hash(&password))
            .await
            .context(JoinSnafu)??;

        let record = UserRecord {
            name: name.to_owned(),
            email: email.to_owned(),
            hashed_password,
            created: OffsetDateTime::now_utc().unix_timestamp(),
        };

        let id = self
            .write_with(|tx| {
                let mut users_table = tx.open_table(&users::TABLE)?;
                let mut users_by_email_table = tx.open_table(&users_by_email::TABLE)?;
                Self::insert_user_tx(&record, &mut users_table, &mut users_by_email_table)
            })
            .await?;

        debug!(target: LOG_TARGET, id, "User created");
        Ok(id)
    }

    #[instrument(skip_all)]
    async fn authenticate_user(&self, email: &str, password: &str) -> DbResult<u64> {
        let email = email.to_owned();
        let stored = self
            .read_with(|tx| {
                let users_by_email_table = tx.open_table(&users_by_email::TABLE)?;
                let users_table = tx.open_table(&users::TABLE)?;

                let Some(id) = users_by_email_table.get(&email)?.map(|g| g.value()) else {
                    return Ok(None);
                };
                Ok(users_table
                    .get(&id)?
                    .map(|g| (id, g.value().hashed_password)))
            })
            .await?;

        let (user_id, expected_hash) = match stored {
            Some((id, hash)) => (Some(id), hash),
            None => (None, DUMMY_PASSWORD_HASH.to_owned()),
        };

        let password = password.to_owned();
        tokio::task::spawn_blocking(move || verify_password_hash(&expected_hash, &password))
            .await
            .context(JoinSnafu)??;

        user_id.context(InvalidCredentialsSnafu)
    }

    async fn user_exists(&self, id: u64) -> DbResult<bool> {
        self.read_with(|tx| {
            let users_table = tx.open_table(&users::TABLE)?;
            Ok(users_table.get(&id)?.is_some())
        })
        .await
    }
}
