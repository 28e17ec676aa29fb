//! Form validation: an error accumulator plus reusable predicates.
//!
//! Forms embed a [`Validator`] and expose it through [`Validates`], so
//! handlers can run checks directly on the form and ask whether it is valid.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

pub static EMAIL_RX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$",
    )
    .expect("Valid regex")
});

/// Accumulated validation errors.
///
/// Holds at most one message per field (the first one recorded) and an
/// ordered list of errors not tied to any field.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct Validator {
    field_errors: BTreeMap<String, String>,
    non_field_errors: Vec<String>,
}

impl Validator {
    pub fn valid(&self) -> bool {
        self.field_errors.is_empty() && self.non_field_errors.is_empty()
    }

    /// Record `message` for `key`, unless `key` already has one.
    pub fn add_field_error(&mut self, key: impl Into<String>, message: impl Into<String>) {
        self.field_errors
            .entry(key.into())
            .or_insert_with(|| message.into());
    }

    pub fn add_non_field_error(&mut self, message: impl Into<String>) {
        self.non_field_errors.push(message.into());
    }

    pub fn check_field(&mut self, ok: bool, key: &str, message: &str) {
        if !ok {
            self.add_field_error(key, message);
        }
    }

    pub fn field_error(&self, key: &str) -> Option<&str> {
        self.field_errors.get(key).map(String::as_str)
    }

    pub fn field_errors(&self) -> &BTreeMap<String, String> {
        &self.field_errors
    }

    pub fn non_field_errors(&self) -> &[String] {
        &self.non_field_errors
    }
}

/// Implemented by anything that carries a [`Validator`].
pub trait Validates {
    fn validator(&self) -> &Validator;
    fn validator_mut(&mut self) -> &mut Validator;

    fn check_field(&mut self, ok: bool, key: &str, message: &str) {
        self.validator_mut().check_field(ok, key, message);
    }

    fn add_non_field_error(&mut self, message: &str) {
        self.validator_mut().add_non_field_error(message);
    }

    fn add_field_error(&mut self, key: &str, message: &str) {
        self.validator_mut().add_field_error(key, message);
    }

    fn valid(&self) -> bool {
        self.validator().valid()
    }
}

impl Validates for Validator {
    fn validator(&self) -> &Validator {
        self
    }

    fn validator_mut(&mut self) -> &mut Validator {
        self
    }
}

/// True if `value` contains anything besides whitespace.
pub fn not_blank(value: &str) -> bool {
    !value.trim().is_empty()
}

/// True if `value` has no more than `n` characters (not bytes).
pub fn max_chars(value: &str, n: usize) -> bool {
    value.chars().count() <= n
}

/// True if `value` has at least `n` characters (not bytes).
pub fn min_chars(value: &str, n: usize) -> bool {
    n <= value.chars().count()
}

pub fn permitted_value<T: PartialEq>(value: &T, permitted: &[T]) -> bool {
    permitted.contains(value)
}

pub fn matches(value: &str, rx: &Regex) -> bool {
    rx.is_match(value)
}
