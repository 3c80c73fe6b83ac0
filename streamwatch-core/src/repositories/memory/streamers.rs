use async_trait::async_trait;
use dashmap::DashMap;

use crate::Error;
use streamwatch_common::models::Streamer;
use streamwatch_common::traits::repository_traits::StreamerRepository;

#[derive(Default)]
pub struct MemoryStreamerRepository {
    records: DashMap<String, Streamer>,
}

impl MemoryStreamerRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StreamerRepository for MemoryStreamerRepository {
    async fn get(&self, discord_user_id: &str) -> Result<Option<Streamer>, Error> {
        Ok(self
            .records
            .get(discord_user_id)
            .map(|r| r.value().clone()))
    }

    async fn upsert(&self, streamer: &Streamer) -> Result<(), Error> {
        // DashMap entry insert keeps the per-member write atomic.
        self.records
            .insert(streamer.discord_user_id.clone(), streamer.clone());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Streamer>, Error> {
        let mut out: Vec<Streamer> = self.records.iter().map(|r| r.value().clone()).collect();
        out.sort_by(|a, b| a.discord_username.cmp(&b.discord_username));
        Ok(out)
    }

    async fn delete(&self, discord_user_id: &str) -> Result<bool, Error> {
        Ok(self.records.remove(discord_user_id).is_some())
    }
}
