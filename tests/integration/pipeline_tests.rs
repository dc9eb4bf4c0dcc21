use approx::assert_abs_diff_eq;
use story_evolver::{
    database::{memory::MemoryStore, StoreError, StoryStore},
    model::{
        drift::mean_drift,
        structures::{generation_type::GenerationType, pipeline_state::PipelineState}
    },
    pipeline::{Pipeline, PipelineError},
    utils::test_utils::{ScriptedGenerator, ScriptedJudge}
};

use crate::common::{init_test_env, test_config};

#[tokio::test]
async fn test_full_run() {
    init_test_env();
    let config = test_config(6, 7);
    let store = MemoryStore::new();
    let judge = ScriptedJudge::longest();
    let generator = ScriptedGenerator::new();

    let mut pipeline = Pipeline::new(&config, &store, &judge, &generator).unwrap();
    let summary = pipeline.run(2).await.unwrap();

    assert_eq!(pipeline.state(), PipelineState::ExportTop);
    assert_eq!(summary.final_generation, 2);
    assert_eq!(store.latest_generation().await.unwrap(), Some(2));
    assert_eq!(store.generations().await.unwrap().len(), 3);

    // 6 initial stories, then 3 survivors x 2 variants per cycle
    assert_eq!(summary.stats.cycles_completed, 2);
    assert_eq!(summary.stats.stories_generated, 18);
    assert_eq!(summary.stats.generation_failures, 0);
    assert_eq!(summary.stats.cycle_durations_secs.len(), 2);

    let final_generation = store.load_generation(2).await.unwrap();
    assert_eq!(final_generation.len(), 9);
    assert_eq!(summary.leaderboard.len(), 9);
    assert_eq!(summary.top.len(), 3);
    assert_eq!(summary.top[0].entry.rank, 1);
    assert!(summary.top[0].entry.rating >= summary.top[1].entry.rating);

    for story in &final_generation {
        assert!(story.rd >= config.rating.rd_floor);
        assert!(story.volatility > 0.0);
        assert!(story.wins + story.losses <= story.matches_played);
    }
}

#[tokio::test]
async fn test_generation_zero_is_judged_and_committed() {
    init_test_env();
    let config = test_config(6, 11);
    let store = MemoryStore::new();
    let judge = ScriptedJudge::longest();
    let generator = ScriptedGenerator::new();

    let mut pipeline = Pipeline::new(&config, &store, &judge, &generator).unwrap();
    let summary = pipeline.run(0).await.unwrap();

    assert_eq!(summary.final_generation, 0);
    let stories = store.load_generation(0).await.unwrap();
    let matches = store.load_matches(0).await.unwrap();

    // 4 rounds of 3 pairings
    assert_eq!(matches.len(), 12);
    assert_eq!(summary.stats.matches_played, 12);
    assert!(stories.iter().all(|s| s.generation_type == GenerationType::Initial));
    assert_eq!(stories.iter().map(|s| s.matches_played).sum::<i32>(), 24);
}

#[tokio::test]
async fn test_drift_is_corrected_for_promoted_stories() {
    init_test_env();
    let config = test_config(6, 3);
    let store = MemoryStore::new();
    let judge = ScriptedJudge::longest();
    let generator = ScriptedGenerator::new();

    let mut pipeline = Pipeline::new(&config, &store, &judge, &generator).unwrap();
    let summary = pipeline.run(1).await.unwrap();

    let generation_1 = store.load_generation(1).await.unwrap();
    let promoted = generation_1
        .iter()
        .filter(|s| s.generation_type == GenerationType::Promoted)
        .count();

    assert_eq!(promoted, 3);
    assert_abs_diff_eq!(mean_drift(&generation_1).unwrap(), 0.0, epsilon = 1e-6);
    assert!(summary.stats.generations[1].drift.is_some());
    assert!(summary.stats.generations[0].drift.is_none());
}

#[tokio::test]
async fn test_without_original_stories() {
    init_test_env();
    let mut config = test_config(6, 5);
    config.evolution.include_original_stories = false;
    let store = MemoryStore::new();
    let judge = ScriptedJudge::longest();
    let generator = ScriptedGenerator::new();

    let mut pipeline = Pipeline::new(&config, &store, &judge, &generator).unwrap();
    let summary = pipeline.run(1).await.unwrap();

    let generation_1 = store.load_generation(1).await.unwrap();
    assert_eq!(generation_1.len(), 6);
    assert!(generation_1
        .iter()
        .all(|s| s.generation_type == GenerationType::Variant && s.parent_id.is_some()));
    // Nothing promoted, nothing to correct
    assert!(summary.stats.generations[1].drift.is_none());
}

#[tokio::test]
async fn test_resume_from_last_committed_generation() {
    init_test_env();
    let config = test_config(6, 13);
    let store = MemoryStore::new();
    let judge = ScriptedJudge::longest();
    let generator = ScriptedGenerator::new();

    Pipeline::new(&config, &store, &judge, &generator)
        .unwrap()
        .run(1)
        .await
        .unwrap();

    let mut resumed = Pipeline::new(&config, &store, &judge, &generator).unwrap();
    let summary = resumed.run(1).await.unwrap();

    assert_eq!(summary.final_generation, 2);
    assert_eq!(store.latest_generation().await.unwrap(), Some(2));
    // Generation 0 was only generated by the first run
    assert_eq!(generator.initial_calls(), 6);
    assert_eq!(summary.stats.stories_generated, 6);
}

#[tokio::test]
async fn test_fresh_start_after_wipe() {
    init_test_env();
    let config = test_config(4, 17);
    let store = MemoryStore::new();
    let judge = ScriptedJudge::longest();
    let generator = ScriptedGenerator::new();

    Pipeline::new(&config, &store, &judge, &generator)
        .unwrap()
        .run(2)
        .await
        .unwrap();
    store.wipe().await.unwrap();

    let summary = Pipeline::new(&config, &store, &judge, &generator)
        .unwrap()
        .run(1)
        .await
        .unwrap();

    assert_eq!(summary.final_generation, 1);
    assert_eq!(generator.initial_calls(), 8);
}

#[tokio::test]
async fn test_failed_matches_are_not_recorded() {
    init_test_env();
    let mut config = test_config(5, 23);
    config.tournament.rounds_per_period = 3;
    config.tournament.max_concurrent_matches = 0;
    let store = MemoryStore::new();
    // Initial pieces are numbered, so this marker hits exactly one story
    let judge = ScriptedJudge::longest().failing_on("#0 by");
    let generator = ScriptedGenerator::new();

    let mut pipeline = Pipeline::new(&config, &store, &judge, &generator).unwrap();
    let summary = pipeline.run(0).await.unwrap();

    let report = &summary.stats.generations[0];
    assert_eq!(report.matches_played + report.matches_dropped, 6);

    let stories = store.load_generation(0).await.unwrap();
    let unlucky = stories.iter().find(|s| s.text.contains("#0 by")).unwrap();
    assert_eq!(unlucky.matches_played, 0);
    assert_eq!(unlucky.rating, config.rating.default_rating);

    let matches = store.load_matches(0).await.unwrap();
    assert_eq!(matches.len(), report.matches_played);
    assert!(matches
        .iter()
        .all(|m| m.story_a != unlucky.id && m.story_b != unlucky.id));
}

#[tokio::test]
async fn test_single_story_skips_tournament_but_grows_rd() {
    init_test_env();
    let config = test_config(1, 29);
    let store = MemoryStore::new();
    let judge = ScriptedJudge::longest();
    let generator = ScriptedGenerator::new();

    let mut pipeline = Pipeline::new(&config, &store, &judge, &generator).unwrap();
    let summary = pipeline.run(0).await.unwrap();

    assert_eq!(judge.calls(), 0);
    assert_eq!(summary.leaderboard.len(), 1);
    assert_eq!(summary.leaderboard[0].matches_played, 0);
    assert_eq!(summary.leaderboard[0].rating, config.rating.default_rating);
    // 350 on the public scale is phi ~ 2.0148; sqrt(phi^2 + 0.06^2) maps back to ~350.16
    assert!(summary.leaderboard[0].rd > config.rating.default_rd);
    assert_abs_diff_eq!(summary.leaderboard[0].rd, 350.16, epsilon = 0.05);
    assert!(store.load_matches(0).await.unwrap().is_empty());
    assert_eq!(store.latest_generation().await.unwrap(), Some(0));
}

#[tokio::test]
async fn test_empty_initial_population_aborts() {
    init_test_env();
    let config = test_config(4, 31);
    let store = MemoryStore::new();
    let judge = ScriptedJudge::longest();
    let generator = ScriptedGenerator::new().failing_initial();

    let mut pipeline = Pipeline::new(&config, &store, &judge, &generator).unwrap();
    let result = pipeline.run(1).await;

    assert!(matches!(result, Err(PipelineError::EmptyPopulation(0))));
    assert_eq!(store.latest_generation().await.unwrap(), None);
}

#[tokio::test]
async fn test_store_failure_keeps_committed_generations() {
    init_test_env();
    let config = test_config(4, 37);
    let store = MemoryStore::new();
    let judge = ScriptedJudge::longest();
    let generator = ScriptedGenerator::new();

    Pipeline::new(&config, &store, &judge, &generator)
        .unwrap()
        .run(1)
        .await
        .unwrap();

    store.set_unavailable(true);
    let result = Pipeline::new(&config, &store, &judge, &generator)
        .unwrap()
        .run(1)
        .await;
    assert!(matches!(result, Err(PipelineError::Store(StoreError::Unavailable(_)))));

    store.set_unavailable(false);
    assert_eq!(store.latest_generation().await.unwrap(), Some(1));
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let mut config = test_config(4, 41);
    config.rating.tau = -1.0;
    let store = MemoryStore::new();
    let judge = ScriptedJudge::longest();
    let generator = ScriptedGenerator::new();

    let result = Pipeline::new(&config, &store, &judge, &generator);

    assert!(matches!(result, Err(PipelineError::Config(_))));
}

#[tokio::test]
async fn test_seeded_runs_are_reproducible() {
    init_test_env();
    let config = test_config(6, 43);
    let judge = ScriptedJudge::longest();

    let mut runs = Vec::new();
    for _ in 0..2 {
        let store = MemoryStore::new();
        let generator = ScriptedGenerator::new();
        Pipeline::new(&config, &store, &judge, &generator)
            .unwrap()
            .run(0)
            .await
            .unwrap();

        let mut stories = store.load_generation(0).await.unwrap();
        stories.sort_by(|a, b| a.text.cmp(&b.text));
        runs.push(stories);
    }

    assert_eq!(runs[0].len(), runs[1].len());
    for (first, second) in runs[0].iter().zip(runs[1].iter()) {
        assert_eq!(first.text, second.text);
        assert_eq!(first.matches_played, second.matches_played);
        assert_eq!(first.wins, second.wins);
        assert_abs_diff_eq!(first.rating, second.rating, epsilon = 1e-9);
        assert_abs_diff_eq!(first.rd, second.rd, epsilon = 1e-9);
    }
}
