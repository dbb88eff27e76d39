use std::sync::Arc;

use service::StateStore;

use crate::errors::StatusPolicy;

/// Shared handler state: the store client plus the error-status policy.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn StateStore>,
    pub policy: StatusPolicy,
}

impl AppState {
    pub fn new(store: Arc<dyn StateStore>, policy: StatusPolicy) -> Self {
        Self { store, policy }
    }
}
