use std::sync::Arc;

use crate::config::Config;
use crate::lifecycle::registry::LifecycleRegistry;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// One lifecycle per subject record, created on first use.
    pub lifecycles: Arc<LifecycleRegistry>,
    pub config: Config,
}
