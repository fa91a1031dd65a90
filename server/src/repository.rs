//! In-memory game repository. No persistence, no eviction; sessions live
//! here from creation until termination removes them.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use uuid::Uuid;

use crate::session::{Session, SessionStatus};

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("game not found: {0}")]
    NotFound(Uuid),
}

#[derive(Default)]
pub struct InMemoryRepository {
    games: RwLock<HashMap<Uuid, Arc<Session>>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn save(&self, session: Arc<Session>) {
        self.games.write().unwrap().insert(session.id(), session);
    }

    pub fn get(&self, id: Uuid) -> Result<Arc<Session>, RepositoryError> {
        self.games
            .read()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(RepositoryError::NotFound(id))
    }

    /// Sessions that have not completed yet (pending or active). Used for
    /// connection-close cleanup, which must catch games the engine or the
    /// client has not moved in yet.
    pub fn list_active(&self) -> Vec<Arc<Session>> {
        self.games
            .read()
            .unwrap()
            .values()
            .filter(|s| s.status() != SessionStatus::Completed)
            .cloned()
            .collect()
    }

    pub fn remove(&self, id: Uuid) {
        self.games.write().unwrap().remove(&id);
    }
}
