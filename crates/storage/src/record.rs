//! Stored objects

use uuid::Uuid;

/// An object held by the in-memory engine, keyed by `id`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Record {
    /// Primary key
    pub id: String,
    /// Payload
    pub text: String,
}

impl Record {
    /// Create a record with an explicit id
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }

    /// Create a record with a random id
    pub fn with_text(text: impl Into<String>) -> Self {
        Self::new(Uuid::new_v4().to_string(), text)
    }
}
