use crate::database::db_structs::Story;
use indexmap::IndexMap;
use itertools::Itertools;
use serde::Serialize;
use std::cmp::Ordering;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub percentile: f64,
    pub story_id: Uuid,
    pub generation: i32,
    pub model: String,
    pub rating: f64,
    pub rd: f64,
    pub volatility: f64,
    pub matches_played: i32,
    pub wins: i32,
    pub losses: i32,
    pub win_rate: f64
}

/// Mean performance of every story a model produced
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelPerformance {
    pub model: String,
    pub stories: usize,
    pub mean_rating: f64,
    pub best_rating: f64,
    pub win_rate: f64
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RatingChange {
    pub story_id: Uuid,
    pub model: String,
    pub previous_rating: f64,
    pub rating: f64,
    pub change: f64
}

/// A story as exported at the end of a run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportedStory {
    #[serde(flatten)]
    pub entry: LeaderboardEntry,
    pub parent_id: Option<Uuid>,
    pub prompt: String,
    pub text: String
}

/// Highest rating first. Ties go to the more certain story, then to the id so the
/// order is total.
pub fn rating_order(a: &Story, b: &Story) -> Ordering {
    b.rating
        .total_cmp(&a.rating)
        .then(a.rd.total_cmp(&b.rd))
        .then(a.id.cmp(&b.id))
}

pub fn ranked(stories: &[Story]) -> Vec<&Story> {
    stories.iter().sorted_by(|a, b| rating_order(a, b)).collect()
}

pub fn leaderboard(stories: &[Story]) -> Vec<LeaderboardEntry> {
    let total = stories.len();

    ranked(stories)
        .into_iter()
        .enumerate()
        .map(|(i, story)| {
            let rank = i + 1;
            LeaderboardEntry {
                rank,
                percentile: percentile(rank, total),
                story_id: story.id,
                generation: story.generation,
                model: story.model.clone(),
                rating: story.rating,
                rd: story.rd,
                volatility: story.volatility,
                matches_played: story.matches_played,
                wins: story.wins,
                losses: story.losses,
                win_rate: story.win_rate()
            }
        })
        .collect()
}

/// Groups stories by producing model, best mean rating first.
pub fn model_performance(stories: &[Story]) -> Vec<ModelPerformance> {
    let mut by_model: IndexMap<&str, Vec<&Story>> = IndexMap::new();
    for story in stories {
        by_model.entry(story.model.as_str()).or_default().push(story);
    }

    by_model
        .into_iter()
        .map(|(model, group)| {
            let n = group.len() as f64;
            let matches: i32 = group.iter().map(|s| s.matches_played).sum();
            let wins: i32 = group.iter().map(|s| s.wins).sum();

            ModelPerformance {
                model: model.to_string(),
                stories: group.len(),
                mean_rating: group.iter().map(|s| s.rating).sum::<f64>() / n,
                best_rating: group.iter().map(|s| s.rating).fold(f64::MIN, f64::max),
                win_rate: if matches > 0 {
                    wins as f64 / matches as f64
                } else {
                    0.0
                }
            }
        })
        .sorted_by(|a, b| b.mean_rating.total_cmp(&a.mean_rating))
        .collect()
}

/// The `n` largest absolute moves away from each story's previous-period rating.
/// Stories without a baseline are skipped.
pub fn biggest_changes(stories: &[Story], n: usize) -> Vec<RatingChange> {
    stories
        .iter()
        .filter_map(|s| {
            s.previous_period_rating.map(|previous| RatingChange {
                story_id: s.id,
                model: s.model.clone(),
                previous_rating: previous,
                rating: s.rating,
                change: s.rating - previous
            })
        })
        .sorted_by(|a, b| b.change.abs().total_cmp(&a.change.abs()))
        .take(n)
        .collect()
}

/// The top `k` stories with their texts, in leaderboard order
pub fn export_top(stories: &[Story], k: usize) -> Vec<ExportedStory> {
    let entries = leaderboard(stories);
    let by_id: IndexMap<Uuid, &Story> = stories.iter().map(|s| (s.id, s)).collect();

    entries
        .into_iter()
        .take(k)
        .filter_map(|entry| {
            let story = by_id.get(&entry.story_id)?;
            Some(ExportedStory {
                parent_id: story.parent_id,
                prompt: story.prompt.clone(),
                text: story.text.clone(),
                entry
            })
        })
        .collect()
}

/// `P = (n/N) * 100`, where n is the number of stories ranked below
fn percentile(rank: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }

    (total - rank) as f64 / total as f64 * 100.0
}
