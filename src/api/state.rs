use std::sync::{Arc, RwLock};

use crate::core::AppContext;

pub type SharedState = Arc<RwLock<AppState>>;

pub struct AppState {
    pub context: Arc<AppContext>,
}

impl AppState {
    pub fn new(context: Arc<AppContext>) -> Self {
        Self { context }
    }
}

/// Clones the context out of the shared state so no lock is held
/// across an await.
pub fn context(state: &SharedState) -> Arc<AppContext> {
    match state.read() {
        Ok(state) => Arc::clone(&state.context),
        Err(poisoned) => Arc::clone(&poisoned.into_inner().context),
    }
}
