//! Shared session and room registry
//!
//! The single source of truth for who is connected and who is in which room.
//! Both maps live behind one mutex so every operation is atomic with respect
//! to the others, including a room switch. The lock is never held across
//! delivery I/O: callers take a snapshot and send after it is released.

use std::collections::HashMap;

use tokio::sync::Mutex;
use tracing::debug;

use crate::error::AppError;
use crate::room::Room;
use crate::session::SessionRef;
use crate::types::SessionId;

#[derive(Debug, Default)]
struct RegistryState {
    /// Logged-in sessions: username -> handle
    users: HashMap<String, SessionRef>,
    /// Occupied rooms: room name -> Room
    rooms: HashMap<String, Room>,
}

impl RegistryState {
    fn join(&mut self, room: &str, session: SessionRef) {
        let entry = self
            .rooms
            .entry(room.to_string())
            .or_insert_with(|| Room::new(room));
        entry.add_member(session);
        debug!("Room {} now has {} members", entry.name, entry.member_count());
    }

    fn leave(&mut self, room: &str, id: SessionId) {
        let Some(entry) = self.rooms.get_mut(room) else {
            return;
        };

        if entry.remove_member(id) {
            self.rooms.remove(room);
            debug!("Room {} deleted (empty)", room);
        }
    }
}

/// Process-wide registry shared by all connection workers
#[derive(Debug, Default)]
pub struct Registry {
    state: Mutex<RegistryState>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a username for a session
    ///
    /// Fails with `UsernameTaken` if another live session holds the name.
    pub async fn register_user(&self, username: &str, session: SessionRef) -> Result<(), AppError> {
        let mut state = self.state.lock().await;
        if state.users.contains_key(username) {
            return Err(AppError::UsernameTaken(username.to_string()));
        }
        state.users.insert(username.to_string(), session);
        debug!("Total users: {}", state.users.len());
        Ok(())
    }

    /// Release a username
    ///
    /// Idempotent. The entry is only removed while it still belongs to `id`.
    pub async fn unregister_user(&self, username: &str, id: SessionId) -> bool {
        let mut state = self.state.lock().await;
        match state.users.get(username) {
            Some(existing) if existing.id() == id => {
                state.users.remove(username);
                true
            }
            _ => false,
        }
    }

    /// Add a session to a room, creating the room if absent
    pub async fn join_room(&self, room: &str, session: SessionRef) {
        self.state.lock().await.join(room, session);
    }

    /// Remove a session from a room, deleting the room once empty
    pub async fn leave_room(&self, room: &str, id: SessionId) {
        self.state.lock().await.leave(room, id);
    }

    /// Move a session from `from` (if any) to `to` in one step
    ///
    /// No other caller can observe the session in neither room or in both.
    pub async fn switch_room(&self, from: Option<&str>, to: &str, session: SessionRef) {
        let mut state = self.state.lock().await;
        if let Some(from) = from {
            state.leave(from, session.id());
        }
        state.join(to, session);
    }

    pub async fn lookup_user(&self, username: &str) -> Option<SessionRef> {
        self.state.lock().await.users.get(username).cloned()
    }

    /// Point-in-time copy of a room's members (empty if the room does not exist)
    pub async fn snapshot_room_members(&self, room: &str) -> Vec<SessionRef> {
        self.state
            .lock()
            .await
            .rooms
            .get(room)
            .map(Room::snapshot)
            .unwrap_or_default()
    }

    pub async fn room_exists(&self, room: &str) -> bool {
        self.state.lock().await.rooms.contains_key(room)
    }

    pub async fn is_member(&self, room: &str, id: SessionId) -> bool {
        self.state
            .lock()
            .await
            .rooms
            .get(room)
            .is_some_and(|r| r.contains(id))
    }

    /// Names of every room the session is in
    pub async fn rooms_of(&self, id: SessionId) -> Vec<String> {
        self.state
            .lock()
            .await
            .rooms
            .values()
            .filter(|r| r.contains(id))
            .map(|r| r.name.clone())
            .collect()
    }

    pub async fn user_count(&self) -> usize {
        self.state.lock().await.users.len()
    }

    pub async fn room_count(&self) -> usize {
        self.state.lock().await.rooms.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use tokio::sync::mpsc;

    fn handle() -> SessionRef {
        let (tx, _rx) = mpsc::channel(1);
        SessionRef::new(SessionId::new(), tx)
    }

    #[tokio::test]
    async fn test_register_rejects_duplicate_usernames() {
        let registry = Registry::new();
        let alice = handle();

        registry.register_user("alice", alice.clone()).await.unwrap();
        let result = registry.register_user("alice", handle()).await;

        assert!(matches!(result, Err(AppError::UsernameTaken(name)) if name == "alice"));
        assert_eq!(registry.lookup_user("alice").await, Some(alice));
        assert_eq!(registry.user_count().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_registration_has_one_winner() {
        let registry = Arc::new(Registry::new());

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let registry = Arc::clone(&registry);
            tasks.push(tokio::spawn(async move {
                registry.register_user("alice", handle()).await.is_ok()
            }));
        }

        let mut winners = 0;
        for task in tasks {
            if task.await.unwrap() {
                winners += 1;
            }
        }

        assert_eq!(winners, 1);
        assert_eq!(registry.user_count().await, 1);
    }

    #[tokio::test]
    async fn test_unregister_is_idempotent_and_owner_checked() {
        let registry = Registry::new();
        let alice = handle();
        registry.register_user("alice", alice.clone()).await.unwrap();

        assert!(!registry.unregister_user("alice", SessionId::new()).await);
        assert!(registry.lookup_user("alice").await.is_some());

        assert!(registry.unregister_user("alice", alice.id()).await);
        assert!(!registry.unregister_user("alice", alice.id()).await);
        assert!(registry.lookup_user("alice").await.is_none());
    }

    #[tokio::test]
    async fn test_last_leave_deletes_room() {
        let registry = Registry::new();
        let alice = handle();
        let bob = handle();

        registry.join_room("team", alice.clone()).await;
        registry.join_room("team", bob.clone()).await;
        registry.leave_room("team", alice.id()).await;
        assert!(registry.room_exists("team").await);

        registry.leave_room("team", bob.id()).await;
        assert!(!registry.room_exists("team").await);
        assert_eq!(registry.room_count().await, 0);

        // Leaving a room that no longer exists is a no-op
        registry.leave_room("team", bob.id()).await;
    }

    #[tokio::test]
    async fn test_switch_room_moves_membership() {
        let registry = Registry::new();
        let alice = handle();

        registry.switch_room(None, "lobby", alice.clone()).await;
        assert_eq!(registry.rooms_of(alice.id()).await, vec!["lobby".to_string()]);

        registry.switch_room(Some("lobby"), "team", alice.clone()).await;
        assert_eq!(registry.rooms_of(alice.id()).await, vec!["team".to_string()]);
        assert!(!registry.room_exists("lobby").await);
    }

    #[tokio::test]
    async fn test_switch_to_same_room_keeps_membership() {
        let registry = Registry::new();
        let alice = handle();

        registry.join_room("team", alice.clone()).await;
        registry.switch_room(Some("team"), "team", alice.clone()).await;

        assert!(registry.is_member("team", alice.id()).await);
        assert_eq!(registry.snapshot_room_members("team").await.len(), 1);
    }

    #[tokio::test]
    async fn test_snapshot_is_point_in_time() {
        let registry = Registry::new();
        let alice = handle();
        let bob = handle();

        registry.join_room("lobby", alice.clone()).await;
        let snapshot = registry.snapshot_room_members("lobby").await;
        registry.join_room("lobby", bob.clone()).await;

        assert_eq!(snapshot, vec![alice]);
        assert_eq!(registry.snapshot_room_members("lobby").await.len(), 2);
        assert!(registry.snapshot_room_members("nowhere").await.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_switches_never_double_book() {
        let registry = Arc::new(Registry::new());
        let alice = handle();
        registry.join_room("lobby", alice.clone()).await;

        let mover = {
            let registry = Arc::clone(&registry);
            let alice = alice.clone();
            tokio::spawn(async move {
                let mut current = "lobby".to_string();
                for i in 0..200 {
                    let next = if i % 2 == 0 { "team" } else { "lobby" };
                    registry
                        .switch_room(Some(&current), next, alice.clone())
                        .await;
                    current = next.to_string();
                }
            })
        };

        for _ in 0..200 {
            assert_eq!(registry.rooms_of(alice.id()).await.len(), 1);
            tokio::task::yield_now().await;
        }

        mover.await.unwrap();
        assert_eq!(registry.rooms_of(alice.id()).await, vec!["lobby".to_string()]);
    }
}
