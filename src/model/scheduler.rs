use crate::{
    adapters::{AdapterError, Judge, Position},
    config::TournamentConfig,
    database::db_structs::Story,
    utils::progress_utils::progress_bar
};
use chrono::{DateTime, Utc};
use futures::{stream::FuturesUnordered, StreamExt};
use rand::{seq::SliceRandom, Rng};
use std::{collections::HashMap, fmt};
use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

/// An unordered pair of stories to be judged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pairing {
    pub story_a: Uuid,
    pub story_b: Uuid
}

/// A pairing together with the side `story_a` is shown on.
/// When `swapped`, `story_b`'s text is presented in position A.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledMatch {
    pub pairing: Pairing,
    pub swapped: bool
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchOutcome {
    pub story_a: Uuid,
    pub story_b: Uuid,
    pub winner: Uuid,
    pub rationale: String,
    pub timestamp: DateTime<Utc>
}

impl MatchOutcome {
    pub fn loser(&self) -> Uuid {
        if self.winner == self.story_a {
            self.story_b
        } else {
            self.story_a
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DropReason {
    /// The judge did not answer within the per-match timeout
    Timeout,
    /// The judge answered with an error
    JudgeFailed(String),
    /// Still outstanding when the batch deadline passed, or never issued
    BatchTimeout,
    /// The pairing names a story that is not in the population
    UnknownStory(Uuid)
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::Timeout => write!(f, "judge timed out"),
            DropReason::JudgeFailed(reason) => write!(f, "judge failed: {}", reason),
            DropReason::BatchTimeout => write!(f, "batch timed out"),
            DropReason::UnknownStory(id) => write!(f, "unknown story {}", id)
        }
    }
}

/// Result of executing one scheduled match
#[derive(Debug, Clone, PartialEq)]
pub enum MatchResolution {
    Resolved(MatchOutcome),
    Dropped { pairing: Pairing, reason: DropReason }
}

/// Everything that happened while judging one rating period
#[derive(Debug, Clone, Default)]
pub struct TournamentReport {
    pub pairings_scheduled: usize,
    pub batches_run: usize,
    /// Set when a batch deadline passed and later batches were not issued
    pub halted: bool,
    pub outcomes: Vec<MatchOutcome>,
    pub dropped: Vec<(Pairing, DropReason)>
}

impl TournamentReport {
    pub fn matches_played(&self) -> usize {
        self.outcomes.len()
    }

    pub fn matches_dropped(&self) -> usize {
        self.dropped.len()
    }
}

/// Random pairing for a rating period: every round shuffles the population and
/// pairs neighbours, leaving the odd one out. Opponents may repeat across rounds
/// and rating proximity is ignored.
pub fn generate_pairings<R: Rng + ?Sized>(stories: &[Story], rounds: usize, rng: &mut R) -> Vec<Pairing> {
    if stories.len() < 2 {
        return Vec::new();
    }

    let mut pairings = Vec::with_capacity(rounds * (stories.len() / 2));
    let mut ids: Vec<Uuid> = stories.iter().map(|s| s.id).collect();

    for _ in 0..rounds {
        ids.shuffle(rng);
        for pair in ids.chunks_exact(2) {
            pairings.push(Pairing {
                story_a: pair[0],
                story_b: pair[1]
            });
        }
    }

    pairings
}

pub struct MatchScheduler<'a> {
    judge: &'a dyn Judge,
    config: &'a TournamentConfig,
    rubric: &'a str,
    context: Option<&'a str>
}

impl<'a> MatchScheduler<'a> {
    pub fn new(
        judge: &'a dyn Judge,
        config: &'a TournamentConfig,
        rubric: &'a str,
        context: Option<&'a str>
    ) -> MatchScheduler<'a> {
        MatchScheduler {
            judge,
            config,
            rubric,
            context
        }
    }

    /// Generates this period's pairings and decides, per pairing, which story is
    /// shown first. All randomness happens here so judging itself stays deterministic.
    pub fn schedule<R: Rng + ?Sized>(&self, stories: &[Story], rng: &mut R) -> Vec<ScheduledMatch> {
        generate_pairings(stories, self.config.rounds_per_period, rng)
            .into_iter()
            .map(|pairing| ScheduledMatch {
                pairing,
                swapped: rng.random_bool(0.5)
            })
            .collect()
    }

    /// Judges `matches` in batches of `max_concurrent_matches`. Failed or timed out
    /// matches are dropped, never retried. If a batch misses its deadline, the
    /// remaining batches are not issued.
    pub async fn run_matches(&self, stories: &[Story], matches: &[ScheduledMatch]) -> TournamentReport {
        let mut report = TournamentReport {
            pairings_scheduled: matches.len(),
            ..Default::default()
        };

        if matches.is_empty() {
            return report;
        }

        let lookup: HashMap<Uuid, &Story> = stories.iter().map(|s| (s.id, s)).collect();
        let batch_size = self.config.batch_size(matches.len());
        let total_batches = matches.len().div_ceil(batch_size);
        let bar = progress_bar(matches.len() as u64, "Judging matches".to_string());

        for (i, batch) in matches.chunks(batch_size).enumerate() {
            let batch_number = i + 1;
            info!(
                batch = batch_number,
                total_batches,
                matches = batch.len(),
                "Running match batch"
            );

            let deadline = Instant::now() + self.config.batch_timeout();
            // Keyed by batch position, a pairing can repeat within one batch
            let mut outstanding: Vec<Option<Pairing>> = vec![None; batch.len()];
            let mut in_flight = FuturesUnordered::new();

            for (slot, scheduled) in batch.iter().enumerate() {
                let pairing = scheduled.pairing;
                match (lookup.get(&pairing.story_a), lookup.get(&pairing.story_b)) {
                    (Some(a), Some(b)) => {
                        outstanding[slot] = Some(pairing);
                        in_flight.push(self.conduct_match(slot, a, b, *scheduled));
                    }
                    (None, _) => report.dropped.push((pairing, DropReason::UnknownStory(pairing.story_a))),
                    (_, None) => report.dropped.push((pairing, DropReason::UnknownStory(pairing.story_b)))
                }
            }

            report.batches_run += 1;
            let mut successful = 0;

            loop {
                match tokio::time::timeout_at(deadline, in_flight.next()).await {
                    Ok(Some((slot, resolution))) => {
                        outstanding[slot] = None;
                        match resolution {
                            MatchResolution::Resolved(outcome) => {
                                report.outcomes.push(outcome);
                                successful += 1;
                            }
                            MatchResolution::Dropped { pairing, reason } => report.dropped.push((pairing, reason))
                        }

                        bar.inc(1);
                    }
                    Ok(None) => break,
                    Err(_) => {
                        warn!(
                            batch = batch_number,
                            outstanding = outstanding.iter().flatten().count(),
                            "Match batch timed out, no further batches will be issued for this period"
                        );
                        report.halted = true;
                        break;
                    }
                }
            }

            info!(
                batch = batch_number,
                "Batch summary: {}/{} matches successful",
                successful,
                batch.len()
            );

            if report.halted {
                report
                    .dropped
                    .extend(outstanding.into_iter().flatten().map(|pairing| (pairing, DropReason::BatchTimeout)));

                let issued = batch_number * batch_size;
                for scheduled in matches.iter().skip(issued) {
                    report.dropped.push((scheduled.pairing, DropReason::BatchTimeout));
                }
                break;
            }
        }

        bar.finish_and_clear();

        info!(
            played = report.matches_played(),
            dropped = report.matches_dropped(),
            scheduled = report.pairings_scheduled,
            "Rating period judged"
        );

        report
    }

    /// Runs a single match. The judge sees the texts in the scheduled order and
    /// answers with a position, which is mapped back to a story id here. `slot` is
    /// handed back untouched so the caller knows which batch entry finished.
    async fn conduct_match(
        &self,
        slot: usize,
        a: &Story,
        b: &Story,
        scheduled: ScheduledMatch
    ) -> (usize, MatchResolution) {
        let (first, second) = if scheduled.swapped { (b, a) } else { (a, b) };

        let judged = tokio::time::timeout(
            self.config.match_timeout(),
            self.judge.judge(&first.text, &second.text, self.rubric, self.context)
        )
        .await;

        let reason = match judged {
            Ok(Ok(judgement)) => {
                let winner = match judgement.winner {
                    Position::A => first.id,
                    Position::B => second.id
                };

                return (
                    slot,
                    MatchResolution::Resolved(MatchOutcome {
                        story_a: a.id,
                        story_b: b.id,
                        winner,
                        rationale: judgement.rationale,
                        timestamp: Utc::now()
                    })
                );
            }
            Ok(Err(AdapterError::Timeout)) | Err(_) => DropReason::Timeout,
            Ok(Err(e)) => DropReason::JudgeFailed(e.to_string())
        };

        warn!(
            story_a = %a.short_id(),
            story_b = %b.short_id(),
            %reason,
            "Dropping match"
        );

        (
            slot,
            MatchResolution::Dropped {
                pairing: scheduled.pairing,
                reason
            }
        )
    }
}
