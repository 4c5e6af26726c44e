//! Error types for the chat relay
//!
//! Defines connection-level errors, protocol rejections and delivery errors.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

use crate::message::MessageType;

/// Application-level errors
///
/// Covers both fatal errors (connection termination) and
/// recoverable rejections (reply message sent to the client).
#[derive(Debug, Error)]
pub enum AppError {
    /// Framing error: bad length prefix or unusable payload (fatal)
    #[error("Malformed message: {0}")]
    Malformed(String),

    /// Payload is not a valid message object (fatal)
    #[error("Malformed message: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error on the session's own stream (fatal)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The session's own outbound queue is gone (fatal - writer task ended)
    #[error("Outbound channel closed")]
    ChannelSend,

    /// Message other than login sent before logging in
    #[error("You must LOGIN before {0}.")]
    NotLoggedIn(&'static str),

    /// Login attempted on a connection that already has a username
    #[error("already logged in as '{0}'")]
    AlreadyLoggedIn(String),

    /// Login request without a username
    #[error("username cannot be empty")]
    EmptyUsername,

    /// Join request without a room name
    #[error("room name cannot be empty")]
    EmptyRoomName,

    /// Private message without a recipient
    #[error("Missing recipient for private message.")]
    MissingRecipient,

    /// Client sent a kind only the server may send
    #[error("Unsupported message type: {0}")]
    UnsupportedType(MessageType),

    /// Username is held by another live session
    #[error("username already in use")]
    UsernameTaken(String),

    /// Outgoing message would not fit in one frame
    #[error("Message too large: {0} bytes exceeds the frame limit")]
    MessageTooLarge(usize),

    /// Private message recipient is not connected
    #[error("User '{0}' is not online.")]
    UnknownRecipient(String),

    /// Invalid startup configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Certificate or key could not be loaded
    #[error("TLS error: {0}")]
    Tls(String),
}

impl AppError {
    /// Whether this error comes from framing or payload decoding
    pub fn is_malformed(&self) -> bool {
        matches!(self, AppError::Malformed(_) | AppError::Json(_))
    }
}

/// Message delivery errors
///
/// Occurs when a message cannot be queued for another session.
#[derive(Debug, Error)]
pub enum SendError {
    /// The receiving end of the channel has been closed
    #[error("Channel closed")]
    ChannelClosed,

    /// The recipient's outbound queue is full
    #[error("Outbound queue full")]
    Full,
}

impl From<SendError> for AppError {
    fn from(_: SendError) -> Self {
        AppError::ChannelSend
    }
}
