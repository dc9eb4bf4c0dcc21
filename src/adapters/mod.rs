//! Seams to the collaborators that live outside this crate: the pairwise judge
//! and the piece generator.

pub mod command;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use command::{CommandGenerator, CommandJudge};

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("Adapter call timed out")]
    Timeout,

    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Malformed adapter response: {0}")]
    Malformed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to (de)serialize adapter payload: {0}")]
    Json(#[from] serde_json::Error)
}

/// Physical slot a text was shown in. Says nothing about which story it was.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    A,
    B
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Judgement {
    pub winner: Position,
    pub rationale: String
}

/// Resolves a winner between two texts.
#[async_trait]
pub trait Judge: Send + Sync {
    async fn judge(
        &self,
        text_a: &str,
        text_b: &str,
        rubric: &str,
        context: Option<&str>
    ) -> Result<Judgement, AdapterError>;
}

/// Produces new pieces for the population.
#[async_trait]
pub trait PieceGenerator: Send + Sync {
    async fn generate_initial(&self, prompt: &str, model: &str) -> Result<String, AdapterError>;

    async fn generate_variant(
        &self,
        parent_text: &str,
        parent_prompt: &str,
        model: &str,
        temperature: f64
    ) -> Result<String, AdapterError>;
}
