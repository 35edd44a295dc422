//! File records: the unit of data flowing between pipeline nodes.
//!
//! A [`FileRecord`] carries a filename, an optional [`Content`] payload, and an
//! open bag of named fields that stages may read or set. Records are plain
//! values: a node hands each child its own copy, so a child mutating a record
//! never affects the sender or the sender's cache.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Payload of a [`FileRecord`].
///
/// `Text` and `Bytes` are content-addressable. `Value` holds structured data the
/// fingerprint function cannot meaningfully compare, so it never hits a cache.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Content {
    Text(String),
    Bytes(Vec<u8>),
    Value(Value),
}

impl Content {
    /// Text view, if the payload is UTF-8 text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Content::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Raw bytes for `Text` and `Bytes`; `None` for structured values.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Content::Text(s) => Some(s.as_bytes()),
            Content::Bytes(b) => Some(b),
            Content::Value(_) => None,
        }
    }

    /// Payload size in bytes (serialized size for structured values).
    pub fn len(&self) -> usize {
        match self {
            Content::Text(s) => s.len(),
            Content::Bytes(b) => b.len(),
            Content::Value(v) => v.to_string().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<&str> for Content {
    fn from(s: &str) -> Self {
        Content::Text(s.to_string())
    }
}

impl From<String> for Content {
    fn from(s: String) -> Self {
        Content::Text(s)
    }
}

impl From<Vec<u8>> for Content {
    fn from(b: Vec<u8>) -> Self {
        Content::Bytes(b)
    }
}

impl From<Value> for Content {
    fn from(v: Value) -> Self {
        Content::Value(v)
    }
}

/// A file-like record. Filenames need not be unique within a batch; duplicates
/// represent fan-out.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub filename: String,
    pub content: Option<Content>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub fields: Map<String, Value>,
}

impl FileRecord {
    /// A record with no content.
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            content: None,
            fields: Map::new(),
        }
    }

    /// Shorthand for a record with content.
    pub fn with_content(filename: impl Into<String>, content: impl Into<Content>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::new(filename)
        }
    }

    /// Replace the content, builder style.
    #[must_use]
    pub fn content(mut self, content: impl Into<Content>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Set a named field, builder style.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn get_field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn set_field(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(name.into(), value.into())
    }

    /// Text content, if any.
    pub fn text(&self) -> Option<&str> {
        self.content.as_ref().and_then(Content::as_text)
    }
}
