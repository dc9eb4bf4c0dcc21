use crate::{
    adapters::{AdapterError, Judge, Judgement, PieceGenerator, Position},
    config::RatingConfig,
    database::db_structs::Story,
    model::structures::generation_type::GenerationType
};
use async_trait::async_trait;
use chrono::Utc;
use std::{
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration
};
use uuid::Uuid;

pub fn generate_story(rating: f64, rd: f64, volatility: f64) -> Story {
    Story {
        id: Uuid::new_v4(),
        generation: 0,
        text: "Once upon a time".to_string(),
        prompt: "A short fable".to_string(),
        model: "model-a".to_string(),
        rating,
        rd,
        volatility,
        matches_played: 0,
        wins: 0,
        losses: 0,
        previous_period_rating: None,
        parent_id: None,
        generation_type: GenerationType::Initial,
        created_at: Utc::now()
    }
}

/// `n` default-rated stories with distinct texts ("story 0", "story 1", ...)
pub fn generate_stories(n: usize) -> Vec<Story> {
    let defaults = RatingConfig::default();

    (0..n)
        .map(|i| {
            let mut story = generate_story(defaults.default_rating, defaults.default_rd, defaults.default_volatility);
            story.text = format!("story {}", i);
            story.model = if i % 2 == 0 { "model-a" } else { "model-b" }.to_string();
            story
        })
        .collect()
}

#[derive(Debug, Clone)]
enum Preference {
    Fixed(Position),
    Containing(String),
    Longest
}

/// Deterministic judge for tests. Texts containing a failure marker make the call
/// fail; texts containing a slow marker make it sleep first.
pub struct ScriptedJudge {
    preference: Preference,
    fail_marker: Option<String>,
    slow_marker: Option<(String, Duration)>,
    calls: AtomicUsize
}

impl ScriptedJudge {
    fn with_preference(preference: Preference) -> ScriptedJudge {
        ScriptedJudge {
            preference,
            fail_marker: None,
            slow_marker: None,
            calls: AtomicUsize::new(0)
        }
    }

    pub fn always(position: Position) -> ScriptedJudge {
        Self::with_preference(Preference::Fixed(position))
    }

    /// Picks the text containing `needle`, falling back to position A
    pub fn preferring(needle: &str) -> ScriptedJudge {
        Self::with_preference(Preference::Containing(needle.to_string()))
    }

    /// Picks the longer text, position A on ties
    pub fn longest() -> ScriptedJudge {
        Self::with_preference(Preference::Longest)
    }

    pub fn failing_on(mut self, marker: &str) -> ScriptedJudge {
        self.fail_marker = Some(marker.to_string());
        self
    }

    pub fn sleeping_on(mut self, marker: &str, delay: Duration) -> ScriptedJudge {
        self.slow_marker = Some((marker.to_string(), delay));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Judge for ScriptedJudge {
    async fn judge(
        &self,
        text_a: &str,
        text_b: &str,
        _rubric: &str,
        _context: Option<&str>
    ) -> Result<Judgement, AdapterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some((marker, delay)) = &self.slow_marker {
            if text_a.contains(marker.as_str()) || text_b.contains(marker.as_str()) {
                tokio::time::sleep(*delay).await;
            }
        }

        if let Some(marker) = &self.fail_marker {
            if text_a.contains(marker.as_str()) || text_b.contains(marker.as_str()) {
                return Err(AdapterError::Transport("scripted failure".to_string()));
            }
        }

        let winner = match &self.preference {
            Preference::Fixed(position) => *position,
            Preference::Containing(needle) => {
                if !text_a.contains(needle.as_str()) && text_b.contains(needle.as_str()) {
                    Position::B
                } else {
                    Position::A
                }
            }
            Preference::Longest => {
                if text_b.len() > text_a.len() {
                    Position::B
                } else {
                    Position::A
                }
            }
        };

        Ok(Judgement {
            winner,
            rationale: "scripted".to_string()
        })
    }
}

/// Deterministic generator for tests. Initial pieces are numbered; a variant
/// appends " (revised)" to its parent's text.
#[derive(Default)]
pub struct ScriptedGenerator {
    fail_initial: bool,
    fail_variants: bool,
    initial_calls: AtomicUsize,
    variant_calls: AtomicUsize
}

impl ScriptedGenerator {
    pub fn new() -> ScriptedGenerator {
        ScriptedGenerator::default()
    }

    pub fn failing_initial(mut self) -> ScriptedGenerator {
        self.fail_initial = true;
        self
    }

    pub fn failing_variants(mut self) -> ScriptedGenerator {
        self.fail_variants = true;
        self
    }

    pub fn initial_calls(&self) -> usize {
        self.initial_calls.load(Ordering::SeqCst)
    }

    pub fn variant_calls(&self) -> usize {
        self.variant_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PieceGenerator for ScriptedGenerator {
    async fn generate_initial(&self, prompt: &str, model: &str) -> Result<String, AdapterError> {
        let n = self.initial_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_initial {
            return Err(AdapterError::Transport("scripted failure".to_string()));
        }

        Ok(format!("{} #{} by {}", prompt, n, model))
    }

    async fn generate_variant(
        &self,
        parent_text: &str,
        _parent_prompt: &str,
        _model: &str,
        _temperature: f64
    ) -> Result<String, AdapterError> {
        self.variant_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_variants {
            return Err(AdapterError::Transport("scripted failure".to_string()));
        }

        Ok(format!("{} (revised)", parent_text))
    }
}
