//! The room manager: code and owner indices, allocation, teardown.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::RwLock;

use crate::UserId;

use super::{codes, Room, RoomConfig};

/// A room behind its own reader/writer lock, as handed out by the manager.
pub type SharedRoom = Arc<RwLock<Room>>;

#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub code_length: usize,
    pub allocation_retry_limit: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            code_length: 9,
            allocation_retry_limit: 3,
        }
    }
}

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("could not allocate a new room code")]
    AllocationFailed,
}

#[derive(Default)]
struct Indices {
    rooms: HashMap<String, SharedRoom>,
    code_by_owner: HashMap<UserId, String>,
}

/// Allocates and looks up rooms. The manager's lock protects the indices
/// only and is always taken before any room lock.
pub struct Manager {
    config: ManagerConfig,
    indices: RwLock<Indices>,
}

impl Manager {
    pub fn new(config: ManagerConfig) -> Self {
        Self {
            config,
            indices: RwLock::new(Indices::default()),
        }
    }

    /// Allocate a room under a fresh code, bound to `owner`. A returning
    /// owner gets a fresh room; the previous one stays reachable by code
    /// until closed.
    pub async fn allocate(
        &self,
        owner: &str,
        config: RoomConfig,
    ) -> Result<SharedRoom, ManagerError> {
        let mut indices = self.indices.write().await;

        for _ in 0..self.config.allocation_retry_limit {
            let code = codes::generate_room_code(self.config.code_length);
            if indices.rooms.contains_key(&code) {
                continue;
            }

            let room = Arc::new(RwLock::new(Room::new(code.clone(), owner, config)));
            indices.rooms.insert(code.clone(), Arc::clone(&room));
            indices.code_by_owner.insert(owner.to_string(), code);
            return Ok(room);
        }

        tracing::warn!(owner, "room code allocation exhausted its retries");
        Err(ManagerError::AllocationFailed)
    }

    pub async fn room(&self, code: &str) -> Option<SharedRoom> {
        self.indices.read().await.rooms.get(code).cloned()
    }

    pub async fn by_owner(&self, owner: &str) -> Option<SharedRoom> {
        let indices = self.indices.read().await;
        let code = indices.code_by_owner.get(owner)?;
        indices.rooms.get(code).cloned()
    }

    pub async fn owns_room(&self, user: &str, code: &str) -> bool {
        self.indices
            .read()
            .await
            .code_by_owner
            .get(user)
            .is_some_and(|owned| owned == code)
    }

    /// Stop the room's engine, unbind the owner if still pointing here, and
    /// drop the code entry. Returns whether the room existed.
    pub async fn close(&self, code: &str) -> bool {
        let mut indices = self.indices.write().await;
        let Some(room) = indices.rooms.remove(code) else {
            return false;
        };

        let owner = {
            let mut room = room.write().await;
            room.teardown();
            room.owner().to_string()
        };

        if indices
            .code_by_owner
            .get(&owner)
            .is_some_and(|owned| owned == code)
        {
            indices.code_by_owner.remove(&owner);
        }

        tracing::info!(%code, "room closed");
        true
    }

    pub async fn room_count(&self) -> usize {
        self.indices.read().await.rooms.len()
    }
}
