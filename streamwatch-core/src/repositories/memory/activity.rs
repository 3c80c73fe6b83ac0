use std::collections::VecDeque;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::Error;
use streamwatch_common::models::Activity;
use streamwatch_common::traits::repository_traits::{ActivityRepository, ACTIVITY_LOG_CAP};

/// Bounded ring of activity records; oldest entries evicted once the cap
/// is exceeded.
pub struct MemoryActivityRepository {
    entries: Mutex<VecDeque<Activity>>,
    cap: usize,
}

impl MemoryActivityRepository {
    pub fn new() -> Self {
        Self::with_cap(ACTIVITY_LOG_CAP)
    }

    pub fn with_cap(cap: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(cap.min(1024))),
            cap,
        }
    }
}

impl Default for MemoryActivityRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ActivityRepository for MemoryActivityRepository {
    async fn append(&self, activity: &Activity) -> Result<(), Error> {
        let mut entries = self.entries.lock().await;
        entries.push_back(activity.clone());
        while entries.len() > self.cap {
            entries.pop_front();
        }
        Ok(())
    }

    async fn recent(&self, limit: i64) -> Result<Vec<Activity>, Error> {
        let entries = self.entries.lock().await;
        Ok(entries
            .iter()
            .rev()
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}
