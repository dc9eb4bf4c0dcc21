use chrono::{DurationRound, TimeDelta, Utc};
use serial_test::serial;
use story_evolver::{
    database::{
        db_structs::{MatchRecord, Story},
        StoreError, StoryStore
    },
    model::structures::generation_type::GenerationType,
    utils::test_utils::generate_stories
};

use super::test_helpers::TestDatabase;
use crate::common::init_test_env;

/// Postgres keeps microseconds, so fixtures are truncated to make them comparable
fn stories(n: usize) -> Vec<Story> {
    generate_stories(n)
        .into_iter()
        .map(|mut story| {
            story.created_at = story
                .created_at
                .duration_trunc(TimeDelta::microseconds(1))
                .unwrap();
            story
        })
        .collect()
}

fn record(generation: i32, a: &Story, b: &Story) -> MatchRecord {
    MatchRecord {
        id: 0,
        generation,
        story_a: a.id,
        story_b: b.id,
        winner: b.id,
        story_a_rating_before: a.rating,
        story_b_rating_before: b.rating,
        story_a_rating_after: a.rating - 120.0,
        story_b_rating_after: b.rating + 120.0,
        rationale: "stronger ending".to_string(),
        timestamp: Utc::now().duration_trunc(TimeDelta::microseconds(1)).unwrap()
    }
}

#[tokio::test]
#[serial]
#[ignore = "requires a docker daemon"]
async fn test_empty_database() {
    init_test_env();
    let test_db = TestDatabase::new().await.expect("Failed to create test database");
    let db_client = test_db.db_client().await.expect("Failed to connect");

    assert_eq!(db_client.latest_generation().await.unwrap(), None);
    assert!(db_client.load_generation(0).await.unwrap().is_empty());
    assert!(db_client.generations().await.unwrap().is_empty());
}

#[tokio::test]
#[serial]
#[ignore = "requires a docker daemon"]
async fn test_story_round_trip() {
    init_test_env();
    let test_db = TestDatabase::new().await.expect("Failed to create test database");
    let db_client = test_db.db_client().await.expect("Failed to connect");

    let mut stories = stories(3);
    stories[1].rating = 1612.375;
    stories[1].rd = 87.25;
    stories[1].volatility = 0.0598;
    stories[1].matches_played = 7;
    stories[1].wins = 5;
    stories[1].losses = 2;
    stories[2].previous_period_rating = Some(1580.5);
    stories[2].parent_id = Some(stories[0].id);
    stories[2].generation_type = GenerationType::Variant;

    db_client.commit_generation(0, &stories, &[]).await.unwrap();
    let mut loaded = db_client.load_generation(0).await.unwrap();

    loaded.sort_by_key(|s| stories.iter().position(|o| o.id == s.id));
    assert_eq!(loaded, stories);
}

#[tokio::test]
#[serial]
#[ignore = "requires a docker daemon"]
async fn test_matches_round_trip() {
    init_test_env();
    let test_db = TestDatabase::new().await.expect("Failed to create test database");
    let db_client = test_db.db_client().await.expect("Failed to connect");

    let stories = stories(3);
    let matches = vec![record(0, &stories[0], &stories[1]), record(0, &stories[2], &stories[1])];

    let summary = db_client.commit_generation(0, &stories, &matches).await.unwrap();
    let loaded = db_client.load_matches(0).await.unwrap();

    assert_eq!(summary.story_count, 3);
    assert_eq!(summary.match_count, 2);
    assert_eq!(loaded.len(), 2);
    assert!(loaded[0].id > 0);
    assert_eq!(loaded[0].winner, stories[1].id);
    assert_eq!(loaded[0].loser(), stories[0].id);
    assert_eq!(loaded[1].story_a, stories[2].id);
    assert_eq!(loaded[1].rationale, "stronger ending");
    assert!(db_client.load_matches(1).await.unwrap().is_empty());
}

#[tokio::test]
#[serial]
#[ignore = "requires a docker daemon"]
async fn test_promoted_story_moves_to_next_generation() {
    init_test_env();
    let test_db = TestDatabase::new().await.expect("Failed to create test database");
    let db_client = test_db.db_client().await.expect("Failed to connect");

    let stories = stories(2);
    db_client.commit_generation(0, &stories, &[]).await.unwrap();

    let mut promoted = stories[0].clone();
    promoted.generation = 1;
    promoted.previous_period_rating = Some(promoted.rating);
    promoted.rating = 1550.0;
    promoted.generation_type = GenerationType::Promoted;
    db_client.commit_generation(1, &[promoted.clone()], &[]).await.unwrap();

    assert_eq!(db_client.latest_generation().await.unwrap(), Some(1));
    assert_eq!(db_client.load_generation(0).await.unwrap().len(), 1);

    let generation_1 = db_client.load_generation(1).await.unwrap();
    assert_eq!(generation_1, vec![promoted]);

    let generations = db_client.generations().await.unwrap();
    assert_eq!(generations.iter().map(|g| g.generation).collect::<Vec<_>>(), vec![0, 1]);
}

#[tokio::test]
#[serial]
#[ignore = "requires a docker daemon"]
async fn test_failed_commit_leaves_nothing_behind() {
    init_test_env();
    let test_db = TestDatabase::new().await.expect("Failed to create test database");
    let db_client = test_db.db_client().await.expect("Failed to connect");

    let mut stories = stories(3);
    // Postgres rejects NUL bytes in text columns
    stories[2].text = "broken\0text".to_string();
    let matches = vec![record(0, &stories[0], &stories[1])];

    let result = db_client.commit_generation(0, &stories, &matches).await;

    assert!(result.is_err());
    assert_eq!(db_client.latest_generation().await.unwrap(), None);
    assert_eq!(test_db.count("stories").await.unwrap(), 0);
    assert_eq!(test_db.count("matches").await.unwrap(), 0);
}

#[tokio::test]
#[serial]
#[ignore = "requires a docker daemon"]
async fn test_wipe() {
    init_test_env();
    let test_db = TestDatabase::new().await.expect("Failed to create test database");
    let db_client = test_db.db_client().await.expect("Failed to connect");

    let stories = stories(2);
    db_client
        .commit_generation(0, &stories, &[record(0, &stories[0], &stories[1])])
        .await
        .unwrap();

    db_client.wipe().await.unwrap();

    assert_eq!(db_client.latest_generation().await.unwrap(), None);
    assert_eq!(test_db.count("stories").await.unwrap(), 0);
    assert_eq!(test_db.count("matches").await.unwrap(), 0);
    assert_eq!(test_db.count("generations").await.unwrap(), 0);
}

#[tokio::test]
#[serial]
#[ignore = "requires a docker daemon"]
async fn test_corrupt_generation_type() {
    init_test_env();
    let test_db = TestDatabase::new().await.expect("Failed to create test database");
    let db_client = test_db.db_client().await.expect("Failed to connect");

    db_client.commit_generation(0, &stories(1), &[]).await.unwrap();
    test_db
        .get_client()
        .await
        .unwrap()
        .execute("UPDATE stories SET generation_type = 9", &[])
        .await
        .unwrap();

    let result = db_client.load_generation(0).await;

    assert!(matches!(result, Err(StoreError::CorruptRecord(_))));
}
