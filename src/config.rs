use crate::model::constants::{
    BATCH_TIMEOUT_SECS, DEFAULT_RATING, DEFAULT_RD, DEFAULT_VOLATILITY, GENERATION_TIMEOUT_SECS, MATCH_TIMEOUT_SECS,
    RD_FLOOR, TAU
};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, time::Duration};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String)
}

/// Pipeline configuration. Built once at startup and passed by reference.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub rating: RatingConfig,
    pub tournament: TournamentConfig,
    pub evolution: EvolutionConfig,
    /// Story description handed to the generator and used as judge context
    pub prompt: String,
    /// Judging rubric
    pub rubric: String
}

/// Glicko-2 system constants and defaults for new stories
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RatingConfig {
    /// Volatility change constraint
    pub tau: f64,
    pub default_rating: f64,
    pub default_rd: f64,
    pub default_volatility: f64,
    /// Lower bound for any rating deviation
    pub rd_floor: f64
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TournamentConfig {
    pub rounds_per_period: usize,
    /// 0 runs every pairing in a single batch
    pub max_concurrent_matches: usize,
    pub match_timeout_secs: u64,
    pub batch_timeout_secs: u64,
    /// Seeds pairing and position randomisation. Random when absent.
    pub seed: Option<u64>
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvolutionConfig {
    /// Number of stories generated for generation 0
    pub population_size: usize,
    pub initial_model: String,
    pub variant_model: String,
    pub top_k: usize,
    pub variants_per_story: usize,
    /// Carry the selected stories into the next generation
    pub include_original_stories: bool,
    pub variant_temperature: f64,
    /// Upper bound on a single generator call, initial or variant
    pub generation_timeout_secs: u64
}

impl Default for RatingConfig {
    fn default() -> Self {
        Self {
            tau: TAU,
            default_rating: DEFAULT_RATING,
            default_rd: DEFAULT_RD,
            default_volatility: DEFAULT_VOLATILITY,
            rd_floor: RD_FLOOR
        }
    }
}

impl Default for TournamentConfig {
    fn default() -> Self {
        Self {
            rounds_per_period: 10,
            max_concurrent_matches: 5,
            match_timeout_secs: MATCH_TIMEOUT_SECS,
            batch_timeout_secs: BATCH_TIMEOUT_SECS,
            seed: None
        }
    }
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            population_size: 10,
            initial_model: "gpt-4o".to_string(),
            variant_model: "gpt-4o".to_string(),
            top_k: 5,
            variants_per_story: 2,
            include_original_stories: true,
            variant_temperature: 1.2,
            generation_timeout_secs: GENERATION_TIMEOUT_SECS
        }
    }
}

impl TournamentConfig {
    pub fn match_timeout(&self) -> Duration {
        Duration::from_secs(self.match_timeout_secs)
    }

    pub fn batch_timeout(&self) -> Duration {
        Duration::from_secs(self.batch_timeout_secs)
    }

    /// Size of each concurrent batch for `n_pairings` matches
    pub fn batch_size(&self, n_pairings: usize) -> usize {
        if self.max_concurrent_matches > 0 {
            self.max_concurrent_matches
        } else {
            n_pairings.max(1)
        }
    }
}

impl EvolutionConfig {
    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }
}

impl PipelineConfig {
    /// Loads and validates a JSON configuration file. Missing keys take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: PipelineConfig = serde_json::from_str(&contents)?;
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let rating = &self.rating;
        if !(rating.tau > 0.0) {
            return Err(ConfigError::Invalid(format!("tau must be positive, got {}", rating.tau)));
        }
        if !(rating.default_rd > 0.0) || !(rating.default_volatility > 0.0) {
            return Err(ConfigError::Invalid(
                "default rd and volatility must be positive".to_string()
            ));
        }
        if !rating.default_rating.is_finite() {
            return Err(ConfigError::Invalid("default rating must be finite".to_string()));
        }
        if !(rating.rd_floor > 0.0) || rating.rd_floor > rating.default_rd {
            return Err(ConfigError::Invalid(format!(
                "rd floor must be in (0, {}], got {}",
                rating.default_rd, rating.rd_floor
            )));
        }

        let tournament = &self.tournament;
        if tournament.match_timeout_secs == 0 || tournament.batch_timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeouts must be non-zero".to_string()));
        }

        let evolution = &self.evolution;
        if evolution.population_size == 0 {
            return Err(ConfigError::Invalid("population size must be non-zero".to_string()));
        }
        if evolution.generation_timeout_secs == 0 {
            return Err(ConfigError::Invalid("generation timeout must be non-zero".to_string()));
        }
        if evolution.top_k == 0 {
            return Err(ConfigError::Invalid("top_k must be non-zero".to_string()));
        }
        if !(0.0..=2.0).contains(&evolution.variant_temperature) {
            return Err(ConfigError::Invalid(format!(
                "variant temperature must be within [0, 2], got {}",
                evolution.variant_temperature
            )));
        }

        Ok(())
    }
}
