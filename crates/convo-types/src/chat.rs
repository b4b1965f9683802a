//! Session, message, and document types for Convo.
//!
//! A conversation lives in a single partition of the document store: one
//! `Session` root document plus any number of `Message` documents, all
//! sharing the same `sessionId` partition key. Documents are exchanged with
//! the store as the tagged union [`Document`], whose `type` discriminator
//! (`"Session"` | `"Message"`) is part of the stored JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;
use std::str::FromStr;

/// Display name given to a session until its first exchange is summarized.
pub const DEFAULT_SESSION_NAME: &str = "New Chat";

/// Partition key of a conversation: the session identifier.
///
/// Every document belonging to one conversation carries the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartitionKey(pub String);

impl PartitionKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PartitionKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for PartitionKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for PartitionKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Assistant,
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sender::User => write!(f, "user"),
            Sender::Assistant => write!(f, "assistant"),
        }
    }
}

impl FromStr for Sender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Sender::User),
            "assistant" => Ok(Sender::Assistant),
            other => Err(format!("invalid sender: '{other}'")),
        }
    }
}

/// Discriminator of a stored document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentType {
    Session,
    Message,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Session => "Session",
            DocumentType::Message => "Message",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Session" => Ok(DocumentType::Session),
            "Message" => Ok(DocumentType::Message),
            other => Err(format!("invalid document type: '{other}'")),
        }
    }
}

/// Root document of a conversation.
///
/// `id` always equals `session_id`. `tokens_used` is the running total of
/// tokens across the session's messages and only ever grows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub session_id: String,
    pub tokens_used: u32,
    pub name: String,
    /// Concurrency token assigned by the store on every write.
    #[serde(rename = "_etag", default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
}

impl Session {
    /// Create a new session with a fresh time-ordered identifier.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_id(Uuid::now_v7().to_string(), name)
    }

    /// Create a session with an explicit identifier (`id == session_id`).
    pub fn with_id(id: impl Into<String>, name: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            session_id: id.clone(),
            id,
            tokens_used: 0,
            name: name.into(),
            etag: None,
        }
    }

    pub fn partition_key(&self) -> PartitionKey {
        PartitionKey(self.session_id.clone())
    }
}

/// A single message within a session.
///
/// `id` and `timestamp` are assigned by the conversation store when the
/// message is persisted; whatever a caller puts there beforehand is replaced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub session_id: String,
    #[serde(with = "fixed_timestamp")]
    pub timestamp: DateTime<Utc>,
    pub sender: Sender,
    pub text: String,
    pub tokens: u32,
    #[serde(rename = "_etag", default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
}

impl Message {
    /// Build an unpersisted message. Identity is left empty for the store to fill.
    pub fn new(
        session_id: impl Into<String>,
        sender: Sender,
        text: impl Into<String>,
        tokens: u32,
    ) -> Self {
        Self {
            id: String::new(),
            session_id: session_id.into(),
            timestamp: Utc::now(),
            sender,
            text: text.into(),
            tokens,
            etag: None,
        }
    }

    /// Return a copy of this message carrying the given identity.
    pub fn with_identity(self, id: String, timestamp: DateTime<Utc>) -> Self {
        Self {
            id,
            timestamp,
            etag: None,
            ..self
        }
    }

    pub fn partition_key(&self) -> PartitionKey {
        PartitionKey(self.session_id.clone())
    }
}

/// A document as stored in the partitioned store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Document {
    Session(Session),
    Message(Message),
}

impl Document {
    pub fn id(&self) -> &str {
        match self {
            Document::Session(s) => &s.id,
            Document::Message(m) => &m.id,
        }
    }

    pub fn partition_key(&self) -> PartitionKey {
        match self {
            Document::Session(s) => s.partition_key(),
            Document::Message(m) => m.partition_key(),
        }
    }

    pub fn doc_type(&self) -> DocumentType {
        match self {
            Document::Session(_) => DocumentType::Session,
            Document::Message(_) => DocumentType::Message,
        }
    }

    pub fn etag(&self) -> Option<&str> {
        match self {
            Document::Session(s) => s.etag.as_deref(),
            Document::Message(m) => m.etag.as_deref(),
        }
    }

    /// Replace the concurrency token, returning the updated document.
    pub fn with_etag(self, etag: Option<String>) -> Self {
        match self {
            Document::Session(s) => Document::Session(Session { etag, ..s }),
            Document::Message(m) => Document::Message(Message { etag, ..m }),
        }
    }

    pub fn into_session(self) -> Option<Session> {
        match self {
            Document::Session(s) => Some(s),
            Document::Message(_) => None,
        }
    }

    pub fn into_message(self) -> Option<Message> {
        match self {
            Document::Message(m) => Some(m),
            Document::Session(_) => None,
        }
    }
}

impl From<Session> for Document {
    fn from(session: Session) -> Self {
        Document::Session(session)
    }
}

impl From<Message> for Document {
    fn from(message: Message) -> Self {
        Document::Message(message)
    }
}

/// Fixed-width RFC 3339 timestamps (microseconds, `Z` suffix).
///
/// Fixed width keeps lexical order identical to chronological order, which
/// the store relies on when sorting messages by their JSON `timestamp`.
pub mod fixed_timestamp {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn format(dt: &DateTime<Utc>) -> String {
        dt.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    pub fn serialize<S: Serializer>(dt: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(dt))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let s = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}
