//! Message routing
//!
//! Interprets each inbound message against the session's state and the
//! shared registry, and returns what must be sent where. The router never
//! performs delivery itself; the connection handler executes the returned
//! directives in order.

use std::sync::Arc;

use tracing::{debug, info};

use crate::codec;
use crate::error::AppError;
use crate::message::{Message, MessageType};
use crate::registry::Registry;
use crate::session::{Session, SessionRef};

/// Room that new logins join and roomless senders fall back to
pub const DEFAULT_ROOM: &str = "lobby";

/// Delivery directive produced by the router
#[derive(Debug)]
pub enum Outbound {
    /// Send to the session that issued the request
    Reply(Message),
    /// Send to one other session
    Direct(SessionRef, Message),
    /// Send to every member of a room snapshot
    Broadcast(Vec<SessionRef>, Message),
}

/// Trimmed name, or `None` when absent or blank
fn normalized(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Routes inbound messages for all sessions
#[derive(Debug)]
pub struct Router {
    registry: Arc<Registry>,
    default_room: String,
}

impl Router {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self::with_default_room(registry, DEFAULT_ROOM)
    }

    pub fn with_default_room(registry: Arc<Registry>, default_room: impl Into<String>) -> Self {
        Self {
            registry,
            default_room: default_room.into(),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn default_room(&self) -> &str {
        &self.default_room
    }

    /// Handle one inbound message
    ///
    /// Rejections become replies to the sender; the session state is left
    /// unchanged when a request is rejected.
    pub async fn handle(&self, session: &mut Session, msg: Message) -> Vec<Outbound> {
        let result = match msg.kind() {
            MessageType::LoginRequest => self.handle_login(session, msg).await,
            MessageType::JoinRoomRequest => self.handle_join_room(session, msg).await,
            MessageType::TextMessage => self.handle_text(session, msg).await,
            MessageType::PrivateMessage => self.handle_private(session, msg).await,
            kind => Err(AppError::UnsupportedType(kind)),
        };

        result.unwrap_or_else(|err| {
            debug!("Rejected request from {}: {}", session.display_name(), err);
            vec![Outbound::Reply(err.into())]
        })
    }

    /// Remove a closing session from the registry
    ///
    /// Returns the leave notice for the session's last room, if it had
    /// logged in.
    pub async fn disconnect(&self, session: &mut Session) -> Vec<Outbound> {
        let room = session.take_current_room();
        if let Some(room) = &room {
            self.registry.leave_room(room, session.id()).await;
        }

        let Some(username) = session.take_username() else {
            return Vec::new();
        };

        self.registry.unregister_user(&username, session.id()).await;
        info!("User logged out: {}", username);

        let room = room.unwrap_or_else(|| self.default_room.clone());
        let notice = Message::notice(&room, format!("{} left the chat", username));
        let members = self.registry.snapshot_room_members(&room).await;
        vec![Outbound::Broadcast(members, notice)]
    }

    async fn handle_login(&self, session: &mut Session, msg: Message) -> Result<Vec<Outbound>, AppError> {
        if let Some(current) = session.username() {
            return Err(AppError::AlreadyLoggedIn(current.to_string()));
        }

        let Some(username) = normalized(msg.content()) else {
            return Err(AppError::EmptyUsername);
        };

        let room = self.default_room.clone();
        let notice = Message::notice(
            &room,
            format!("{} joined the chat (room: {})", username, room),
        );
        codec::ensure_fits(&notice)?;

        self.registry
            .register_user(username, session.handle().clone())
            .await?;
        session.set_username(username.to_string());
        info!("User logged in: {} (session {})", username, session.id());

        self.registry
            .switch_room(session.current_room(), &room, session.handle().clone())
            .await;
        session.set_current_room(Some(room.clone()));

        let reply = Message::new(MessageType::LoginResponse).with_content("OK");
        let members = self.registry.snapshot_room_members(&room).await;

        Ok(vec![
            Outbound::Reply(reply),
            Outbound::Broadcast(members, notice),
        ])
    }

    async fn handle_join_room(&self, session: &mut Session, msg: Message) -> Result<Vec<Outbound>, AppError> {
        let Some(username) = session.username().map(str::to_string) else {
            return Err(AppError::NotLoggedIn("joining rooms"));
        };

        let Some(room) = normalized(msg.room()) else {
            return Err(AppError::EmptyRoomName);
        };

        let reply = Message::new(MessageType::JoinRoomResponse)
            .with_room(room)
            .with_content("OK");
        let notice = Message::notice(room, format!("{} joined the room", username));
        codec::ensure_fits(&notice)?;

        self.registry
            .switch_room(session.current_room(), room, session.handle().clone())
            .await;
        session.set_current_room(Some(room.to_string()));
        info!("User {} joined room: {}", username, room);

        let members = self.registry.snapshot_room_members(room).await;

        Ok(vec![
            Outbound::Reply(reply),
            Outbound::Broadcast(members, notice),
        ])
    }

    async fn handle_text(&self, session: &mut Session, msg: Message) -> Result<Vec<Outbound>, AppError> {
        let Some(username) = session.username().map(str::to_string) else {
            return Err(AppError::NotLoggedIn("sending messages"));
        };

        let (room, auto_join) = match normalized(msg.room()).or(session.current_room()) {
            Some(room) => (room.to_string(), false),
            None => (self.default_room.clone(), true),
        };

        let out = Message::new(MessageType::TextMessage)
            .with_sender(username.as_str())
            .with_room(&room)
            .with_optional_content(msg.content().map(str::to_string));
        codec::ensure_fits(&out)?;

        if auto_join {
            self.registry
                .join_room(&room, session.handle().clone())
                .await;
            session.set_current_room(Some(room.clone()));
        }

        debug!("[{}][{}]: {}", room, username, msg.content().unwrap_or_default());

        let members = self.registry.snapshot_room_members(&room).await;

        Ok(vec![Outbound::Broadcast(members, out)])
    }

    async fn handle_private(&self, session: &mut Session, msg: Message) -> Result<Vec<Outbound>, AppError> {
        let Some(username) = session.username().map(str::to_string) else {
            return Err(AppError::NotLoggedIn("sending private messages"));
        };

        let Some(recipient) = normalized(msg.recipient()) else {
            return Err(AppError::MissingRecipient);
        };

        let Some(target) = self.registry.lookup_user(recipient).await else {
            return Err(AppError::UnknownRecipient(recipient.to_string()));
        };

        let out = Message::new(MessageType::PrivateMessage)
            .with_sender(username)
            .with_recipient(recipient)
            .with_optional_content(msg.content().map(str::to_string));
        codec::ensure_fits(&out)?;

        // The echo lets the sender's client render its own outgoing message.
        if target.id() == session.id() {
            return Ok(vec![Outbound::Reply(out)]);
        }
        Ok(vec![
            Outbound::Direct(target, out.clone()),
            Outbound::Reply(out),
        ])
    }
}
