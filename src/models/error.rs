//! Decode error types for order-ingest models
//!
//! A `DecodeError` describes why one message payload could not become an
//! `OrderCreatedEvent`. It is a property of the message content, so the
//! pipeline never retries it.

use serde_json::error::Category;
use std::fmt;
use thiserror::Error;

/// Error returned by the record decoder
#[derive(Error, Debug, Clone)]
pub struct DecodeError {
    /// The kind of decode failure
    pub kind: DecodeErrorKind,
    /// The offending field, when one can be identified
    pub field: Option<String>,
    /// Optional additional context
    pub context: Option<String>,
}

impl DecodeError {
    /// Create a new decode error
    pub fn new(kind: DecodeErrorKind) -> Self {
        Self {
            kind,
            field: None,
            context: None,
        }
    }

    /// Create a decode error for a specific field
    pub fn for_field(kind: DecodeErrorKind, field: impl Into<String>) -> Self {
        Self {
            kind,
            field: Some(field.into()),
            context: None,
        }
    }

    /// Add context to an existing error
    pub fn add_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field {
            Some(field) => write!(f, "{} (field '{}')", self.kind, field)?,
            None => write!(f, "{}", self.kind)?,
        }
        if let Some(ctx) = &self.context {
            write!(f, ": {}", ctx)?;
        }
        Ok(())
    }
}

/// Specific decode failure categories
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeErrorKind {
    /// Message carried no bytes
    #[error("Empty payload")]
    EmptyPayload,

    /// Payload is not valid JSON
    #[error("Malformed payload")]
    Malformed,

    /// Payload ended before the object was complete
    #[error("Truncated payload")]
    Truncated,

    /// A required field is absent
    #[error("Required field is missing")]
    MissingField,

    /// A field has the wrong JSON type
    #[error("Field has the wrong type")]
    InvalidType,

    /// Total is negative or not a finite number
    #[error("Amount must be a non-negative number")]
    NegativeAmount,
}

impl From<serde_json::Error> for DecodeError {
    fn from(err: serde_json::Error) -> Self {
        let message = err.to_string();
        match err.classify() {
            Category::Eof => DecodeError::new(DecodeErrorKind::Truncated).add_context(message),
            Category::Syntax | Category::Io => {
                DecodeError::new(DecodeErrorKind::Malformed).add_context(message)
            },
            Category::Data => match missing_field_name(&message) {
                Some(field) => DecodeError::for_field(DecodeErrorKind::MissingField, field)
                    .add_context(message),
                None => DecodeError::new(DecodeErrorKind::InvalidType).add_context(message),
            },
        }
    }
}

impl From<validator::ValidationErrors> for DecodeError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let field = errors.field_errors().keys().next().map(|name| name.to_string());
        let mut error = DecodeError::new(DecodeErrorKind::NegativeAmount).add_context(errors.to_string());
        error.field = field;
        error
    }
}

/// serde_json reports missing fields as "missing field `name` at line .."
fn missing_field_name(message: &str) -> Option<String> {
    let rest = message.strip_prefix("missing field `")?;
    let end = rest.find('`')?;
    Some(rest[..end].to_string())
}
