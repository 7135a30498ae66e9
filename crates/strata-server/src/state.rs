//! Server state management.

use std::sync::Arc;

use strata_core::{BackgroundRuntime, TieringEngine};
use tokio::sync::RwLock;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<TieringEngine>,
    runtime: Arc<RwLock<Option<BackgroundRuntime>>>,
}

impl AppState {
    /// State without background maintenance (tests, embedded use).
    pub fn new(engine: Arc<TieringEngine>) -> Self {
        Self {
            engine,
            runtime: Arc::new(RwLock::new(None)),
        }
    }

    /// State owning a started background runtime.
    pub fn new_with_runtime(engine: Arc<TieringEngine>, runtime: BackgroundRuntime) -> Self {
        Self {
            engine,
            runtime: Arc::new(RwLock::new(Some(runtime))),
        }
    }

    pub async fn has_runtime(&self) -> bool {
        self.runtime.read().await.is_some()
    }

    /// Take the runtime out for shutdown; later calls return `None`.
    pub async fn take_runtime(&self) -> Option<BackgroundRuntime> {
        self.runtime.write().await.take()
    }
}
