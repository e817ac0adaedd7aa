use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use serde::Serialize;
use std::time::Instant;
use tokio::sync::RwLock;
use utoipa::ToSchema;

#[derive(Clone, Debug, PartialEq, Serialize, ToSchema)]
pub enum PollOutcome {
    Pending,
    Success,
    Failed,
}

/// Bookkeeping of the poll loop, shown by the health endpoint.
#[derive(Clone)]
pub struct AppStatus {
    pub start_time: Instant,
    pub last_outcome: PollOutcome,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
    pub polls: u64,
}

impl AppStatus {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            last_outcome: PollOutcome::Pending,
            last_success: None,
            last_error: None,
            consecutive_failures: 0,
            polls: 0,
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn record_success(&mut self, at: DateTime<Utc>) {
        self.polls += 1;
        self.last_outcome = PollOutcome::Success;
        self.last_success = Some(at);
        self.last_error = None;
        self.consecutive_failures = 0;
    }

    pub fn record_failure(&mut self, error: String) {
        self.polls += 1;
        self.last_outcome = PollOutcome::Failed;
        self.last_error = Some(error);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
    }

    pub fn is_healthy(&self) -> bool {
        self.last_outcome == PollOutcome::Success
    }
}

lazy_static! {
    pub static ref APP_STATUS: RwLock<AppStatus> = RwLock::new(AppStatus::new());
}

pub async fn get_app_status() -> AppStatus {
    APP_STATUS.read().await.clone()
}
