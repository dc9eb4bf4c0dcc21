use super::{
    db_structs::{GenerationSummary, MatchRecord, Story},
    StoreError, StoryStore
};
use crate::model::structures::generation_type::GenerationType;
use async_trait::async_trait;
use chrono::Utc;
use postgres_types::ToSql;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_postgres::{Client, NoTls, Row};
use tracing::{error, info};

const SCHEMA: &str = include_str!("schema.sql");

const STORY_COLUMNS: &str = "id, generation, text, prompt, model, rating, rd, volatility, matches_played, \
    wins, losses, previous_period_rating, parent_id, generation_type, created_at";

const MATCH_COLUMNS: &str = "id, generation, story_a, story_b, winner, story_a_rating_before, \
    story_b_rating_before, story_a_rating_after, story_b_rating_after, rationale, timestamp";

#[derive(Clone)]
pub struct DbClient {
    client: Arc<Mutex<Client>>
}

impl DbClient {
    // Connect to the database and return a DbClient instance
    pub async fn connect(connection_str: &str) -> Result<Self, StoreError> {
        let (client, connection) = tokio_postgres::connect(connection_str, NoTls).await?;

        // Spawn the connection object to run in the background
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!("connection error: {}", e);
            }
        });

        Ok(DbClient {
            client: Arc::new(Mutex::new(client))
        })
    }

    /// Creates the tables if they do not exist yet
    pub async fn create_schema(&self) -> Result<(), StoreError> {
        self.client.lock().await.batch_execute(SCHEMA).await?;
        info!("Database schema ready");

        Ok(())
    }

    fn story_from_row(row: &Row) -> Result<Story, StoreError> {
        let generation_type: i32 = row.try_get("generation_type")?;
        let generation_type = GenerationType::try_from(generation_type)
            .map_err(|_| StoreError::CorruptRecord(format!("unknown generation type {}", generation_type)))?;

        Ok(Story {
            id: row.try_get("id")?,
            generation: row.try_get("generation")?,
            text: row.try_get("text")?,
            prompt: row.try_get("prompt")?,
            model: row.try_get("model")?,
            rating: row.try_get("rating")?,
            rd: row.try_get("rd")?,
            volatility: row.try_get("volatility")?,
            matches_played: row.try_get("matches_played")?,
            wins: row.try_get("wins")?,
            losses: row.try_get("losses")?,
            previous_period_rating: row.try_get("previous_period_rating")?,
            parent_id: row.try_get("parent_id")?,
            generation_type,
            created_at: row.try_get("created_at")?
        })
    }

    fn match_from_row(row: &Row) -> Result<MatchRecord, StoreError> {
        Ok(MatchRecord {
            id: row.try_get("id")?,
            generation: row.try_get("generation")?,
            story_a: row.try_get("story_a")?,
            story_b: row.try_get("story_b")?,
            winner: row.try_get("winner")?,
            story_a_rating_before: row.try_get("story_a_rating_before")?,
            story_b_rating_before: row.try_get("story_b_rating_before")?,
            story_a_rating_after: row.try_get("story_a_rating_after")?,
            story_b_rating_after: row.try_get("story_b_rating_after")?,
            rationale: row.try_get("rationale")?,
            timestamp: row.try_get("timestamp")?
        })
    }

    fn generation_from_row(row: &Row) -> Result<GenerationSummary, StoreError> {
        Ok(GenerationSummary {
            generation: row.try_get("generation")?,
            story_count: row.try_get("story_count")?,
            match_count: row.try_get("match_count")?,
            completed_at: row.try_get("completed_at")?
        })
    }
}

#[async_trait]
impl StoryStore for DbClient {
    async fn latest_generation(&self) -> Result<Option<i32>, StoreError> {
        let row = self
            .client
            .lock()
            .await
            .query_one("SELECT MAX(generation) AS generation FROM generations", &[])
            .await?;

        Ok(row.try_get("generation")?)
    }

    async fn load_generation(&self, generation: i32) -> Result<Vec<Story>, StoreError> {
        let query = format!(
            "SELECT {} FROM stories WHERE generation = $1 ORDER BY created_at, id",
            STORY_COLUMNS
        );
        let rows = self.client.lock().await.query(query.as_str(), &[&generation]).await?;

        info!(generation, stories = rows.len(), "Loaded generation");
        rows.iter().map(Self::story_from_row).collect()
    }

    async fn load_matches(&self, generation: i32) -> Result<Vec<MatchRecord>, StoreError> {
        let query = format!(
            "SELECT {} FROM matches WHERE generation = $1 ORDER BY id",
            MATCH_COLUMNS
        );
        let rows = self.client.lock().await.query(query.as_str(), &[&generation]).await?;

        rows.iter().map(Self::match_from_row).collect()
    }

    async fn generations(&self) -> Result<Vec<GenerationSummary>, StoreError> {
        let rows = self
            .client
            .lock()
            .await
            .query(
                "SELECT generation, story_count, match_count, completed_at FROM generations ORDER BY generation",
                &[]
            )
            .await?;

        rows.iter().map(Self::generation_from_row).collect()
    }

    async fn commit_generation(
        &self,
        generation: i32,
        stories: &[Story],
        matches: &[MatchRecord]
    ) -> Result<GenerationSummary, StoreError> {
        let mut client = self.client.lock().await;
        let transaction = client.transaction().await?;

        let upsert_story = transaction
            .prepare(
                "INSERT INTO stories (id, generation, text, prompt, model, rating, rd, volatility, \
                matches_played, wins, losses, previous_period_rating, parent_id, generation_type, created_at) \
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15) \
                ON CONFLICT (id) DO UPDATE SET generation = EXCLUDED.generation, rating = EXCLUDED.rating, \
                rd = EXCLUDED.rd, volatility = EXCLUDED.volatility, matches_played = EXCLUDED.matches_played, \
                wins = EXCLUDED.wins, losses = EXCLUDED.losses, \
                previous_period_rating = EXCLUDED.previous_period_rating, \
                generation_type = EXCLUDED.generation_type"
            )
            .await?;

        for story in stories {
            let generation_type = story.generation_type as i32;
            let params: [&(dyn ToSql + Sync); 15] = [
                &story.id,
                &generation,
                &story.text,
                &story.prompt,
                &story.model,
                &story.rating,
                &story.rd,
                &story.volatility,
                &story.matches_played,
                &story.wins,
                &story.losses,
                &story.previous_period_rating,
                &story.parent_id,
                &generation_type,
                &story.created_at,
            ];
            transaction.execute(&upsert_story, &params).await?;
        }

        let insert_match = transaction
            .prepare(
                "INSERT INTO matches (generation, story_a, story_b, winner, story_a_rating_before, \
                story_b_rating_before, story_a_rating_after, story_b_rating_after, rationale, timestamp) \
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"
            )
            .await?;

        for record in matches {
            let params: [&(dyn ToSql + Sync); 10] = [
                &generation,
                &record.story_a,
                &record.story_b,
                &record.winner,
                &record.story_a_rating_before,
                &record.story_b_rating_before,
                &record.story_a_rating_after,
                &record.story_b_rating_after,
                &record.rationale,
                &record.timestamp,
            ];
            transaction.execute(&insert_match, &params).await?;
        }

        let summary = GenerationSummary {
            generation,
            story_count: stories.len() as i32,
            match_count: matches.len() as i32,
            completed_at: Utc::now()
        };

        transaction
            .execute(
                "INSERT INTO generations (generation, story_count, match_count, completed_at) \
                VALUES ($1, $2, $3, $4) \
                ON CONFLICT (generation) DO UPDATE SET story_count = EXCLUDED.story_count, \
                match_count = EXCLUDED.match_count, completed_at = EXCLUDED.completed_at",
                &[
                    &summary.generation,
                    &summary.story_count,
                    &summary.match_count,
                    &summary.completed_at,
                ]
            )
            .await?;

        transaction.commit().await?;

        info!(
            generation,
            stories = summary.story_count,
            matches = summary.match_count,
            "Committed generation"
        );

        Ok(summary)
    }

    async fn wipe(&self) -> Result<(), StoreError> {
        self.client
            .lock()
            .await
            .batch_execute("TRUNCATE TABLE matches, generations, stories RESTART IDENTITY")
            .await?;

        info!("Truncated stories, matches and generations");

        Ok(())
    }
}
