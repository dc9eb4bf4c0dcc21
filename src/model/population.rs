use crate::{
    adapters::PieceGenerator,
    config::{EvolutionConfig, RatingConfig},
    database::db_structs::Story,
    model::{leaderboard::ranked, structures::generation_type::GenerationType},
    utils::progress_utils::progress_bar
};
use chrono::Utc;
use futures::future::join_all;
use tracing::{info, warn};
use uuid::Uuid;

/// The `k` highest rated stories, best first. Returns everything when the
/// population is smaller than `k`.
pub fn select_top(stories: &[Story], k: usize) -> Vec<Story> {
    ranked(stories).into_iter().take(k).cloned().collect()
}

/// Carries a selected story into `next_generation` under the same id. Its rating
/// becomes the drift baseline; RD and volatility start over so the story is
/// re-measured against the new field. Counters stay cumulative.
pub fn promote(story: &Story, next_generation: i32, defaults: &RatingConfig) -> Story {
    Story {
        generation: next_generation,
        rd: defaults.default_rd,
        volatility: defaults.default_volatility,
        previous_period_rating: Some(story.rating),
        generation_type: GenerationType::Promoted,
        ..story.clone()
    }
}

/// A new story derived from `parent`. It starts at the parent's rating with fresh
/// uncertainty.
pub fn variant_of(parent: &Story, text: String, model: &str, next_generation: i32, defaults: &RatingConfig) -> Story {
    Story {
        id: Uuid::new_v4(),
        generation: next_generation,
        text,
        prompt: parent.prompt.clone(),
        model: model.to_string(),
        rating: parent.rating,
        rd: defaults.default_rd,
        volatility: defaults.default_volatility,
        matches_played: 0,
        wins: 0,
        losses: 0,
        previous_period_rating: Some(parent.rating),
        parent_id: Some(parent.id),
        generation_type: GenerationType::Variant,
        created_at: Utc::now()
    }
}

/// Promoted stories (optionally) followed by the variants
pub fn assemble_next_generation(
    selected: &[Story],
    variants: Vec<Story>,
    include_original_stories: bool,
    next_generation: i32,
    defaults: &RatingConfig
) -> Vec<Story> {
    let mut population = Vec::with_capacity(selected.len() + variants.len());
    if include_original_stories {
        population.extend(selected.iter().map(|s| promote(s, next_generation, defaults)));
    }
    population.extend(variants);

    population
}

/// Generates generation 0. Failed pieces are skipped with a warning.
pub async fn generate_initial_population(
    generator: &dyn PieceGenerator,
    prompt: &str,
    evolution: &EvolutionConfig,
    defaults: &RatingConfig
) -> Vec<Story> {
    let bar = progress_bar(evolution.population_size as u64, "Generating initial stories".to_string());

    let progress = &bar;

    let requests = (0..evolution.population_size).map(move |_| async move {
        let result = generator.generate_initial(prompt, &evolution.initial_model).await;
        progress.inc(1);
        result
    });

    let mut stories = Vec::with_capacity(evolution.population_size);
    for (i, result) in join_all(requests).await.into_iter().enumerate() {
        match result {
            Ok(text) => stories.push(Story::new(
                text,
                prompt.to_string(),
                evolution.initial_model.clone(),
                defaults
            )),
            Err(e) => warn!(index = i, error = %e, "Failed to generate initial story")
        }
    }
    bar.finish_and_clear();

    info!(
        requested = evolution.population_size,
        generated = stories.len(),
        "Generated initial population"
    );

    stories
}

/// Generates `variants_per_story` variants for each parent. Failed pieces are
/// skipped with a warning.
pub async fn generate_variants(
    generator: &dyn PieceGenerator,
    parents: &[Story],
    next_generation: i32,
    evolution: &EvolutionConfig,
    defaults: &RatingConfig
) -> Vec<Story> {
    let total = parents.len() * evolution.variants_per_story;
    let bar = progress_bar(total as u64, "Generating variants".to_string());

    let progress = &bar;

    let requests = parents.iter().flat_map(move |parent| {
        (0..evolution.variants_per_story).map(move |_| async move {
            let result = generator
                .generate_variant(
                    &parent.text,
                    &parent.prompt,
                    &evolution.variant_model,
                    evolution.variant_temperature
                )
                .await;
            progress.inc(1);
            (parent, result)
        })
    });

    let mut variants = Vec::with_capacity(total);
    for (parent, result) in join_all(requests).await {
        match result {
            Ok(text) => variants.push(variant_of(
                parent,
                text,
                &evolution.variant_model,
                next_generation,
                defaults
            )),
            Err(e) => warn!(parent = %parent.short_id(), error = %e, "Failed to generate variant")
        }
    }
    bar.finish_and_clear();

    info!(requested = total, generated = variants.len(), "Generated variants");

    variants
}
