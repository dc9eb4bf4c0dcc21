use crate::{
    config::RatingConfig,
    model::{glicko2::GlickoRating, structures::generation_type::GenerationType}
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Story {
    pub id: Uuid,
    pub generation: i32,
    pub text: String,
    /// The story description this piece was written for
    pub prompt: String,
    /// Producing model
    pub model: String,
    pub rating: f64,
    pub rd: f64,
    pub volatility: f64,
    pub matches_played: i32,
    pub wins: i32,
    pub losses: i32,
    /// Rating at the end of the previous generation (promoted) or the parent's
    /// rating (variants). Drift correction measures against this value.
    pub previous_period_rating: Option<f64>,
    pub parent_id: Option<Uuid>,
    pub generation_type: GenerationType,
    pub created_at: DateTime<Utc>
}

impl Story {
    /// A fresh member of generation 0
    pub fn new(text: String, prompt: String, model: String, defaults: &RatingConfig) -> Story {
        Story {
            id: Uuid::new_v4(),
            generation: 0,
            text,
            prompt,
            model,
            rating: defaults.default_rating,
            rd: defaults.default_rd,
            volatility: defaults.default_volatility,
            matches_played: 0,
            wins: 0,
            losses: 0,
            previous_period_rating: None,
            parent_id: None,
            generation_type: GenerationType::Initial,
            created_at: Utc::now()
        }
    }

    pub fn glicko(&self) -> GlickoRating {
        GlickoRating::new(self.rating, self.rd, self.volatility)
    }

    pub fn set_glicko(&mut self, rating: GlickoRating) {
        self.rating = rating.rating;
        self.rd = rating.rd;
        self.volatility = rating.volatility;
    }

    pub fn win_rate(&self) -> f64 {
        if self.matches_played == 0 {
            return 0.0;
        }

        self.wins as f64 / self.matches_played as f64
    }

    /// First 8 characters of the id, for log lines
    pub fn short_id(&self) -> String {
        self.id.simple().to_string()[..8].to_string()
    }
}

/// A judged match. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    /// Unknown until insertion
    pub id: i64,
    pub generation: i32,
    pub story_a: Uuid,
    pub story_b: Uuid,
    pub winner: Uuid,
    pub story_a_rating_before: f64,
    pub story_b_rating_before: f64,
    pub story_a_rating_after: f64,
    pub story_b_rating_after: f64,
    pub rationale: String,
    pub timestamp: DateTime<Utc>
}

impl MatchRecord {
    pub fn loser(&self) -> Uuid {
        if self.winner == self.story_a {
            self.story_b
        } else {
            self.story_a
        }
    }
}

/// Marker row written when a generation has been fully judged and committed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationSummary {
    pub generation: i32,
    pub story_count: i32,
    pub match_count: i32,
    pub completed_at: DateTime<Utc>
}
