//! Room struct definition
//!
//! Represents a named chat room and the sessions currently in it.

use std::collections::HashMap;

use crate::session::SessionRef;
use crate::types::SessionId;

/// Chat room
///
/// Rooms are ephemeral: the registry creates one on first join and drops
/// it when the last member leaves.
#[derive(Debug)]
pub struct Room {
    /// Room name as given by clients
    pub name: String,
    /// Current members keyed by session id
    members: HashMap<SessionId, SessionRef>,
}

impl Room {
    /// Create a new empty room with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: HashMap::new(),
        }
    }

    /// Add a member, replacing any previous handle with the same id
    pub fn add_member(&mut self, member: SessionRef) {
        self.members.insert(member.id(), member);
    }

    /// Remove a member
    ///
    /// Returns true if the room should be deleted (no members left).
    pub fn remove_member(&mut self, id: SessionId) -> bool {
        self.members.remove(&id);
        self.members.is_empty()
    }

    /// Check if a session is in this room
    pub fn contains(&self, id: SessionId) -> bool {
        self.members.contains_key(&id)
    }

    /// Get the number of members in the room
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Copy of the current member handles
    pub fn snapshot(&self) -> Vec<SessionRef> {
        self.members.values().cloned().collect()
    }
}
