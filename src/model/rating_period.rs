use crate::{
    database::db_structs::{MatchRecord, Story},
    model::{
        glicko2::{Glicko2, GlickoRating, PeriodResult, RatingError},
        scheduler::MatchOutcome
    }
};
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

/// Applies one rating period's outcomes to a population.
pub struct RatingPeriod<'a> {
    engine: &'a Glicko2,
    generation: i32
}

impl<'a> RatingPeriod<'a> {
    pub fn new(engine: &'a Glicko2, generation: i32) -> RatingPeriod<'a> {
        RatingPeriod { engine, generation }
    }

    /// # Rating period update
    ///
    /// Every story is rated exactly once against the ratings everyone held when the
    /// period started:
    ///
    /// 1. Snapshot each story's rating, RD and volatility.
    /// 2. Collect each story's results as (opponent, score) pairs.
    /// 3. Rate every story from the snapshot alone. Stories without results only
    ///    gain uncertainty.
    /// 4. Write all new ratings back and bump the win/loss counters.
    ///
    /// Results are sorted per story before rating, so the output does not depend on
    /// the order of `outcomes`. Nothing is written if any story fails to rate.
    ///
    /// Returns one [MatchRecord] per outcome carrying the before and after ratings.
    pub fn apply(&self, stories: &mut [Story], outcomes: &[MatchOutcome]) -> Result<Vec<MatchRecord>, RatingError> {
        let snapshot: HashMap<Uuid, GlickoRating> = stories.iter().map(|s| (s.id, s.glicko())).collect();

        let mut results: HashMap<Uuid, Vec<(Uuid, f64)>> = HashMap::new();
        for outcome in outcomes {
            for id in [outcome.story_a, outcome.story_b, outcome.winner] {
                if !snapshot.contains_key(&id) {
                    return Err(RatingError::UnknownStory(id));
                }
            }

            let loser = outcome.loser();
            if outcome.winner != outcome.story_a && outcome.winner != outcome.story_b {
                return Err(RatingError::UnknownStory(outcome.winner));
            }

            results.entry(outcome.winner).or_default().push((loser, 1.0));
            results.entry(loser).or_default().push((outcome.winner, 0.0));
        }

        let mut updated = HashMap::with_capacity(stories.len());
        for story in stories.iter() {
            let mut story_results = results.remove(&story.id).unwrap_or_default();
            story_results.sort_by(|x, y| x.0.cmp(&y.0).then(x.1.total_cmp(&y.1)));

            let period_results: Vec<PeriodResult> = story_results
                .iter()
                .filter_map(|(opponent, score)| {
                    snapshot.get(opponent).map(|rating| PeriodResult {
                        opponent: *rating,
                        score: *score
                    })
                })
                .collect();

            let wins = story_results.iter().filter(|(_, score)| *score == 1.0).count() as i32;
            let games = story_results.len() as i32;
            let new_rating = self.engine.rate(&story.glicko(), &period_results)?;

            updated.insert(story.id, (new_rating, games, wins));
        }

        for story in stories.iter_mut() {
            if let Some((rating, games, wins)) = updated.get(&story.id) {
                debug!(
                    story = %story.short_id(),
                    before = story.rating,
                    after = rating.rating,
                    rd = rating.rd,
                    games,
                    "Rated story"
                );

                story.set_glicko(*rating);
                story.matches_played += games;
                story.wins += wins;
                story.losses += games - wins;
            }
        }

        let records = outcomes
            .iter()
            .filter_map(|outcome| {
                let before_a = snapshot.get(&outcome.story_a)?;
                let before_b = snapshot.get(&outcome.story_b)?;
                let (after_a, _, _) = updated.get(&outcome.story_a)?;
                let (after_b, _, _) = updated.get(&outcome.story_b)?;

                Some(MatchRecord {
                    id: 0,
                    generation: self.generation,
                    story_a: outcome.story_a,
                    story_b: outcome.story_b,
                    winner: outcome.winner,
                    story_a_rating_before: before_a.rating,
                    story_b_rating_before: before_b.rating,
                    story_a_rating_after: after_a.rating,
                    story_b_rating_after: after_b.rating,
                    rationale: outcome.rationale.clone(),
                    timestamp: outcome.timestamp
                })
            })
            .collect();

        Ok(records)
    }
}
