use std::sync::Arc;
use std::time::Instant;

use audiomill_core::{Config, Orchestrator};

use crate::api::middleware::RateLimiters;

/// Shared application state.
pub struct AppState {
    config: Config,
    orchestrator: Arc<Orchestrator>,
    rate_limiters: RateLimiters,
    started_at: Instant,
}

impl AppState {
    pub fn new(config: Config, orchestrator: Arc<Orchestrator>) -> Self {
        let rate_limiters = RateLimiters::new(&config.limits);
        Self {
            config,
            orchestrator,
            rate_limiters,
            started_at: Instant::now(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    pub fn rate_limiters(&self) -> &RateLimiters {
        &self.rate_limiters
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
