//! Decoding of `application/x-www-form-urlencoded` submissions into typed
//! form structs.
//!
//! Each form type declares a [`FormBinder`]: a table mapping submitted field
//! names to the struct fields they populate. The table is built once per
//! type and reused for every request.

use std::collections::HashMap;
use std::num::ParseIntError;

use axum::extract::rejection::BytesRejection;
use axum::extract::{FromRequest, Request};
use bytes::Bytes;
use snafu::{ResultExt as _, Snafu};

use crate::error::{DecodeSnafu, RequestError};

#[derive(Debug, Snafu)]
pub enum FormDecodeError {
    #[snafu(display("Field `{field}` is not a valid integer: {value:?}"))]
    InvalidInteger {
        field: &'static str,
        value: String,
        source: ParseIntError,
    },
    #[snafu(display("Could not read form body"))]
    Body { source: BytesRejection },
}
pub type FormDecodeResult<T> = std::result::Result<T, FormDecodeError>;

/// Submitted key/value pairs. A key may repeat.
#[derive(Debug, Default, Clone)]
pub struct FormValues(HashMap<String, Vec<String>>);

impl FormValues {
    pub fn parse(body: &[u8]) -> Self {
        let mut values: HashMap<String, Vec<String>> = HashMap::new();
        for (k, v) in url::form_urlencoded::parse(body).into_owned() {
            values.entry(k).or_default().push(v);
        }
        Self(values)
    }

    pub fn first(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .and_then(|v| v.first())
            .map(String::as_str)
    }

    pub fn all(&self, key: &str) -> &[String] {
        self.0.get(key).map(Vec::as_slice).unwrap_or_default()
    }
}

type Assign<F> = Box<dyn Fn(&mut F, &str) -> FormDecodeResult<()> + Send + Sync>;

pub struct FormBinder<F> {
    bindings: Vec<(&'static str, Assign<F>)>,
}

impl<F> Default for FormBinder<F>
where
    F: Default + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<F> FormBinder<F>
where
    F: Default + 'static,
{
    pub fn new() -> Self {
        Self { bindings: vec![] }
    }

    pub fn text(self, name: &'static str, field: fn(&mut F) -> &mut String) -> Self {
        self.bind(
            name,
            Box::new(move |form: &mut F, raw: &str| {
                *field(form) = raw.to_owned();
                Ok(())
            }),
        )
    }

    /// Bind an integer field. An empty submitted value leaves the default in
    /// place; anything else that does not parse is a decode error.
    pub fn int(self, name: &'static str, field: fn(&mut F) -> &mut i64) -> Self {
        self.bind(
            name,
            Box::new(move |form: &mut F, raw: &str| {
                let raw = raw.trim();
                if raw.is_empty() {
                    return Ok(());
                }
                *field(form) = raw.parse().context(InvalidIntegerSnafu {
                    field: name,
                    value: raw,
                })?;
                Ok(())
            }),
        )
    }

    fn bind(mut self, name: &'static str, assign: Assign<F>) -> Self {
        // Two bindings for one name is a wiring bug, not bad input.
        assert!(
            !self.bindings.iter().any(|(existing, _)| *existing == name),
            "Form field `{name}` bound more than once"
        );
        self.bindings.push((name, assign));
        self
    }

    /// Build a form from submitted values. Unknown keys are ignored, missing
    /// keys keep their default, and only the first value of a repeated key
    /// is used.
    pub fn decode(&self, values: &FormValues) -> FormDecodeResult<F> {
        let mut form = F::default();
        for (name, assign) in &self.bindings {
            if let Some(raw) = values.first(name) {
                assign(&mut form, raw)?;
            }
        }
        Ok(form)
    }
}

/// A form type with a binding table.
pub trait DecodeForm: Default + Send + Sized + 'static {
    fn binder() -> &'static FormBinder<Self>;
}

/// Extractor decoding the request body into `F`.
///
/// Decode failures are rejected as client errors (400).
pub struct PostForm<F>(pub F);

impl<S, F> FromRequest<S> for PostForm<F>
where
    S: Send + Sync,
    F: DecodeForm,
{
    type Rejection = RequestError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let body = Bytes::from_request(req, state)
            .await
            .context(BodySnafu)
            .context(DecodeSnafu)?;

        let values = FormValues::parse(&body);
        Ok(Self(F::binder().decode(&values).context(DecodeSnafu)?))
    }
}
