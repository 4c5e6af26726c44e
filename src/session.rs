//! Session definitions
//!
//! `Session` is the state owned by one connection's worker task.
//! `SessionRef` is the lightweight handle other workers use to deliver to it:
//! the session's id plus the sending side of its outbound queue.

use std::hash::{Hash, Hasher};

use tokio::sync::mpsc;

use crate::error::SendError;
use crate::message::Message;
use crate::types::SessionId;

/// Capacity of each session's outbound queue
pub const OUTBOUND_BUFFER: usize = 256;

/// Delivery handle for a connected session
///
/// Cloning is cheap. Equality and hashing only look at the id.
#[derive(Debug, Clone)]
pub struct SessionRef {
    id: SessionId,
    sender: mpsc::Sender<Message>,
}

impl SessionRef {
    pub fn new(id: SessionId, sender: mpsc::Sender<Message>) -> Self {
        Self { id, sender }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Queue a message, waiting for space
    ///
    /// Used for replies to the session that sent the request.
    pub async fn send(&self, msg: Message) -> Result<(), SendError> {
        self.sender
            .send(msg)
            .await
            .map_err(|_| SendError::ChannelClosed)
    }

    /// Queue a message without waiting
    ///
    /// Used when delivering on behalf of another session, so a stalled
    /// recipient never blocks the sender.
    pub fn try_deliver(&self, msg: Message) -> Result<(), SendError> {
        self.sender.try_send(msg).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => SendError::Full,
            mpsc::error::TrySendError::Closed(_) => SendError::ChannelClosed,
        })
    }
}

impl PartialEq for SessionRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for SessionRef {}

impl Hash for SessionRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Per-connection state
///
/// Holds the authenticated username (set once) and the current room.
#[derive(Debug)]
pub struct Session {
    handle: SessionRef,
    username: Option<String>,
    current_room: Option<String>,
}

impl Session {
    /// Create an unauthenticated session delivering into `sender`
    pub fn new(sender: mpsc::Sender<Message>) -> Self {
        Self {
            handle: SessionRef::new(SessionId::new(), sender),
            username: None,
            current_room: None,
        }
    }

    pub fn id(&self) -> SessionId {
        self.handle.id
    }

    pub fn handle(&self) -> &SessionRef {
        &self.handle
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn current_room(&self) -> Option<&str> {
        self.current_room.as_deref()
    }

    pub fn is_logged_in(&self) -> bool {
        self.username.is_some()
    }

    /// Get the display name for this session
    ///
    /// Returns the username if set, otherwise the session id.
    pub fn display_name(&self) -> String {
        match &self.username {
            Some(name) => name.clone(),
            None => self.handle.id.to_string(),
        }
    }

    pub(crate) fn set_username(&mut self, username: String) {
        self.username = Some(username);
    }

    pub(crate) fn set_current_room(&mut self, room: Option<String>) {
        self.current_room = room;
    }

    pub(crate) fn take_username(&mut self) -> Option<String> {
        self.username.take()
    }

    pub(crate) fn take_current_room(&mut self) -> Option<String> {
        self.current_room.take()
    }
}
