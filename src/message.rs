//! Message protocol definitions
//!
//! One message shape is used in both directions. The `type` field selects
//! the kind; every other field is optional and omitted from the wire when
//! absent.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Protocol version stamped on every message built by this crate
pub const PROTOCOL_VERSION: &str = "1.0";

/// Sender name used for system notices
pub const SYSTEM_SENDER: &str = "SERVER";

/// Message kinds
///
/// The first four are sent by clients; the server reuses `TextMessage` and
/// `PrivateMessage` for delivery and adds the three `*Response` kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    LoginRequest,
    JoinRoomRequest,
    TextMessage,
    PrivateMessage,
    LoginResponse,
    JoinRoomResponse,
    ErrorResponse,
}

impl MessageType {
    /// Wire name of this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::LoginRequest => "LOGIN_REQUEST",
            MessageType::JoinRoomRequest => "JOIN_ROOM_REQUEST",
            MessageType::TextMessage => "TEXT_MESSAGE",
            MessageType::PrivateMessage => "PRIVATE_MESSAGE",
            MessageType::LoginResponse => "LOGIN_RESPONSE",
            MessageType::JoinRoomResponse => "JOIN_ROOM_RESPONSE",
            MessageType::ErrorResponse => "ERROR_RESPONSE",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single protocol message
///
/// Immutable once built: the `with_*` methods consume and return the value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    kind: MessageType,
    #[serde(default = "default_version")]
    version: String,
    #[serde(default = "now_millis")]
    timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    recipient: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    room: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,
}

fn default_version() -> String {
    PROTOCOL_VERSION.to_string()
}

/// Milliseconds since the Unix epoch
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

impl Message {
    /// Create a message of the given kind stamped with the current time
    pub fn new(kind: MessageType) -> Self {
        Self {
            kind,
            version: default_version(),
            timestamp: now_millis(),
            sender: None,
            recipient: None,
            room: None,
            content: None,
        }
    }

    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    pub fn with_recipient(mut self, recipient: impl Into<String>) -> Self {
        self.recipient = Some(recipient.into());
        self
    }

    pub fn with_room(mut self, room: impl Into<String>) -> Self {
        self.room = Some(room.into());
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Set content from an optional value, keeping absence as absence
    pub fn with_optional_content(mut self, content: Option<String>) -> Self {
        self.content = content;
        self
    }

    pub fn kind(&self) -> MessageType {
        self.kind
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn sender(&self) -> Option<&str> {
        self.sender.as_deref()
    }

    pub fn recipient(&self) -> Option<&str> {
        self.recipient.as_deref()
    }

    pub fn room(&self) -> Option<&str> {
        self.room.as_deref()
    }

    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }

    /// System notice broadcast to a room
    pub fn notice(room: &str, content: impl Into<String>) -> Self {
        Message::new(MessageType::TextMessage)
            .with_sender(SYSTEM_SENDER)
            .with_room(room)
            .with_content(content)
    }
}

/// Convert AppError to the reply message the client should see
///
/// Login and join rejections answer with the matching response kind and an
/// `ERROR: ` prefix; everything else is an `ERROR_RESPONSE`.
impl From<AppError> for Message {
    fn from(err: AppError) -> Self {
        let (kind, content) = match &err {
            AppError::EmptyUsername
            | AppError::UsernameTaken(_)
            | AppError::AlreadyLoggedIn(_) => {
                (MessageType::LoginResponse, format!("ERROR: {}", err))
            }
            AppError::EmptyRoomName => {
                (MessageType::JoinRoomResponse, format!("ERROR: {}", err))
            }
            AppError::NotLoggedIn(_)
            | AppError::MissingRecipient
            | AppError::UnsupportedType(_)
            | AppError::UnknownRecipient(_)
            | AppError::MessageTooLarge(_)
            | AppError::Malformed(_)
            | AppError::Json(_) => (MessageType::ErrorResponse, err.to_string()),
            // Fatal errors are not typically converted (connection closes)
            _ => (MessageType::ErrorResponse, "Internal error".to_string()),
        };
        Message::new(kind).with_content(content)
    }
}
