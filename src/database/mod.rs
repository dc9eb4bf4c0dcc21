//! Persistence of stories, judged matches and committed generations.

pub mod db;
pub mod db_structs;
pub mod memory;

use async_trait::async_trait;
use db_structs::{GenerationSummary, MatchRecord, Story};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Corrupt record: {0}")]
    CorruptRecord(String)
}

/// Durable state of an evolution run. A generation only counts as committed once
/// `commit_generation` has returned successfully.
#[async_trait]
pub trait StoryStore: Send + Sync {
    /// Highest committed generation, if any
    async fn latest_generation(&self) -> Result<Option<i32>, StoreError>;

    /// Stories currently belonging to `generation`
    async fn load_generation(&self, generation: i32) -> Result<Vec<Story>, StoreError>;

    async fn load_matches(&self, generation: i32) -> Result<Vec<MatchRecord>, StoreError>;

    async fn generations(&self) -> Result<Vec<GenerationSummary>, StoreError>;

    /// Writes a judged generation atomically: its stories (upserted by id), its
    /// matches and the marker row that makes it the latest committed generation.
    async fn commit_generation(
        &self,
        generation: i32,
        stories: &[Story],
        matches: &[MatchRecord]
    ) -> Result<GenerationSummary, StoreError>;

    /// Removes every story, match and generation
    async fn wipe(&self) -> Result<(), StoreError>;
}
