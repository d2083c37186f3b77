use std::sync::Arc;

use parley_core::chat::ChatEngine;
use parley_core::session::SessionManager;
use parley_core::users::UserDirectory;
use parley_db::Database;
use parley_gateway::registry::Registry;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub sessions: SessionManager,
    pub chats: ChatEngine,
    pub users: UserDirectory,
    pub registry: Registry,
    /// The distinguished administrative account. Always exists, never
    /// deletable.
    pub first_user: String,
}

impl AppStateInner {
    pub fn new(db: Arc<Database>, registry: Registry, first_user: String) -> AppState {
        Arc::new(Self {
            sessions: SessionManager::new(db.clone()),
            chats: ChatEngine::new(db.clone()),
            users: UserDirectory::new(db),
            registry,
            first_user,
        })
    }
}
