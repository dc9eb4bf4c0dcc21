#![allow(dead_code)]

use std::sync::Once;
use story_evolver::config::PipelineConfig;

static INIT: Once = Once::new();

/// Initialize test environment with RUST_LOG=WARN
pub fn init_test_env() {
    INIT.call_once(|| {
        std::env::set_var("RUST_LOG", "warn");
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });
}

/// Small, seeded configuration: `population_size` initial stories, top 3 survive,
/// two variants each
pub fn test_config(population_size: usize, seed: u64) -> PipelineConfig {
    let mut config = PipelineConfig {
        prompt: "A fable about a lighthouse keeper".to_string(),
        rubric: "Prefer the more complete story".to_string(),
        ..Default::default()
    };

    config.tournament.rounds_per_period = 4;
    config.tournament.max_concurrent_matches = 3;
    config.tournament.match_timeout_secs = 5;
    config.tournament.batch_timeout_secs = 30;
    config.tournament.seed = Some(seed);
    config.evolution.population_size = population_size;
    config.evolution.top_k = 3;
    config.evolution.variants_per_story = 2;

    config
}
