use crate::registry::ExecutionRegistry;
use chrono::{DateTime, Utc};

#[derive(Clone)]
pub struct AppState {
    pub registry: ExecutionRegistry,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(registry: ExecutionRegistry) -> Self {
        Self {
            registry,
            started_at: Utc::now(),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        Utc::now()
            .signed_duration_since(self.started_at)
            .num_seconds()
            .max(0) as u64
    }
}
