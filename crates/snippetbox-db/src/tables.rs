use bincode::{Decode, Encode};

#[macro_export]
macro_rules! def_table {
    ($(#[$outer:meta])*
        $name:ident : $k:ty => $v:ty) => {
        #[allow(unused)]
        $(#[$outer])*
        pub mod $name {
            use super::*;
            pub type Key = $k;
            pub type Value = $v;
            pub type Definition<'a> = redb_bincode::TableDefinition<'a, Key, Value>;
            pub type Table<'a> = redb_bincode::Table<'a, Key, Value>;
            pub const TABLE: Definition = redb_bincode::TableDefinition::new(stringify!($name));
        }
    };
}

def_table! {
    /// Snippets by id. Ids are assigned sequentially, so key order is
    /// creation order.
    snippets: u64 => SnippetRecord
}

def_table! {
    /// User accounts by id
    users: u64 => UserRecord
}

def_table! {
    /// Unique index: email address to user id
    users_by_email: String => u64
}

#[derive(Debug, Encode, Decode, Clone)]
pub struct SnippetRecord {
    pub title: String,
    pub content: String,
    /// Unix seconds
    pub created: i64,
    /// Unix seconds
    pub expires: i64,
}

#[derive(Debug, Encode, Decode, Clone)]
pub struct UserRecord {
    pub name: String,
    pub email: String,
    /// Argon2id hash in PHC string format
    pub hashed_password: String,
    pub created: i64,
}
