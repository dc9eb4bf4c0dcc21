use super::{
    db_structs::{GenerationSummary, MatchRecord, Story},
    StoreError, StoryStore
};
use async_trait::async_trait;
use chrono::Utc;
use indexmap::IndexMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct MemoryState {
    stories: IndexMap<Uuid, Story>,
    matches: Vec<MatchRecord>,
    generations: IndexMap<i32, GenerationSummary>,
    next_match_id: i64
}

/// In-process [StoryStore] for tests and dry runs. Nothing survives the process.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
    unavailable: AtomicBool
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }

    /// While set, every operation fails with [StoreError::Unavailable]
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store switched off".to_string()));
        }

        Ok(())
    }
}

#[async_trait]
impl StoryStore for MemoryStore {
    async fn latest_generation(&self) -> Result<Option<i32>, StoreError> {
        self.check_available()?;

        Ok(self.state.read().await.generations.keys().max().copied())
    }

    async fn load_generation(&self, generation: i32) -> Result<Vec<Story>, StoreError> {
        self.check_available()?;

        Ok(self
            .state
            .read()
            .await
            .stories
            .values()
            .filter(|s| s.generation == generation)
            .cloned()
            .collect())
    }

    async fn load_matches(&self, generation: i32) -> Result<Vec<MatchRecord>, StoreError> {
        self.check_available()?;

        Ok(self
            .state
            .read()
            .await
            .matches
            .iter()
            .filter(|m| m.generation == generation)
            .cloned()
            .collect())
    }

    async fn generations(&self) -> Result<Vec<GenerationSummary>, StoreError> {
        self.check_available()?;

        let state = self.state.read().await;
        let mut generations: Vec<GenerationSummary> = state.generations.values().cloned().collect();
        generations.sort_by_key(|g| g.generation);

        Ok(generations)
    }

    async fn commit_generation(
        &self,
        generation: i32,
        stories: &[Story],
        matches: &[MatchRecord]
    ) -> Result<GenerationSummary, StoreError> {
        self.check_available()?;

        let mut state = self.state.write().await;
        for story in stories {
            state.stories.insert(
                story.id,
                Story {
                    generation,
                    ..story.clone()
                }
            );
        }

        for record in matches {
            state.next_match_id += 1;
            let id = state.next_match_id;
            state.matches.push(MatchRecord {
                id,
                generation,
                ..record.clone()
            });
        }

        let summary = GenerationSummary {
            generation,
            story_count: stories.len() as i32,
            match_count: matches.len() as i32,
            completed_at: Utc::now()
        };
        state.generations.insert(generation, summary.clone());

        Ok(summary)
    }

    async fn wipe(&self) -> Result<(), StoreError> {
        self.check_available()?;

        *self.state.write().await = MemoryState::default();

        Ok(())
    }
}
