use crate::{
    adapters::{Judge, PieceGenerator},
    config::{ConfigError, PipelineConfig},
    database::{
        db_structs::{MatchRecord, Story},
        StoreError, StoryStore
    },
    model::{
        drift::correct_drift,
        glicko2::{Glicko2, RatingError},
        leaderboard::{
            biggest_changes, export_top, leaderboard, model_performance, ExportedStory, LeaderboardEntry,
            ModelPerformance, RatingChange
        },
        population::{assemble_next_generation, generate_initial_population, generate_variants, select_top},
        rating_period::RatingPeriod,
        scheduler::MatchScheduler,
        structures::pipeline_state::PipelineState
    }
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use std::time::Instant;
use thiserror::Error;
use tracing::{error, info, warn};

/// Number of entries in the biggest rating changes report
const REPORTED_CHANGES: usize = 5;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Generation {0} has no stories")]
    EmptyPopulation(i32),

    #[error("Selection from generation {0} produced no survivors")]
    NoSurvivors(i32),

    #[error("Rating failure: {0}")]
    Rating(#[from] RatingError),

    #[error("Persistence failure: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError)
}

/// What happened to one judged generation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationReport {
    pub generation: i32,
    pub stories: usize,
    pub matches_played: usize,
    pub matches_dropped: usize,
    /// A batch deadline cut the tournament short
    pub halted: bool,
    /// Offset subtracted by drift correction, if any was applied
    pub drift: Option<f64>
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PipelineStats {
    pub cycles_completed: u32,
    pub stories_generated: usize,
    pub generation_failures: usize,
    pub matches_played: usize,
    pub matches_dropped: usize,
    pub cycle_durations_secs: Vec<f64>,
    pub generations: Vec<GenerationReport>
}

/// Final state of a run
#[derive(Debug, Clone, Serialize)]
pub struct PipelineSummary {
    pub final_generation: i32,
    pub stats: PipelineStats,
    pub leaderboard: Vec<LeaderboardEntry>,
    pub model_performance: Vec<ModelPerformance>,
    pub biggest_changes: Vec<RatingChange>,
    pub top: Vec<ExportedStory>
}

/// Drives generation, judging and selection across cycles.
///
/// `EMPTY -> JUDGED(0) -> [SELECT -> GENERATE_VARIANTS -> JUDGE -> DRIFT_CORRECT -> JUDGED(g)]* -> EXPORT_TOP`
///
/// Every JUDGED state is committed to the store before the next step starts, so a
/// later run resumes from the last fully judged generation.
pub struct Pipeline<'a> {
    config: &'a PipelineConfig,
    store: &'a dyn StoryStore,
    judge: &'a dyn Judge,
    generator: &'a dyn PieceGenerator,
    engine: Glicko2,
    rng: ChaCha8Rng,
    state: PipelineState,
    stats: PipelineStats
}

impl<'a> Pipeline<'a> {
    /// Validates `config` and prepares a pipeline in the EMPTY state
    pub fn new(
        config: &'a PipelineConfig,
        store: &'a dyn StoryStore,
        judge: &'a dyn Judge,
        generator: &'a dyn PieceGenerator
    ) -> Result<Pipeline<'a>, PipelineError> {
        config.validate()?;

        let rng = match config.tournament.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::seed_from_u64(rand::random())
        };

        Ok(Pipeline {
            config,
            store,
            judge,
            generator,
            engine: Glicko2::new(config.rating.tau, config.rating.rd_floor),
            rng,
            state: PipelineState::Empty,
            stats: PipelineStats::default()
        })
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    /// Runs `cycles` evolution cycles on top of the last committed generation
    /// (or a freshly generated and judged generation 0 when the store is empty).
    pub async fn run(&mut self, cycles: u32) -> Result<PipelineSummary, PipelineError> {
        let result = self.run_cycles(cycles).await;
        if let Err(e) = &result {
            error!(
                state = %self.state,
                generation = ?self.state.generation(),
                error = %e,
                "Pipeline halted"
            );
        }

        result
    }

    async fn run_cycles(&mut self, cycles: u32) -> Result<PipelineSummary, PipelineError> {
        let (mut generation, mut population) = self.bootstrap().await?;

        for cycle in 1..=cycles {
            let started = Instant::now();
            info!(cycle, cycles, generation, "Starting evolution cycle");

            population = self.evolve(generation, &population).await?;
            generation += 1;

            let elapsed = started.elapsed().as_secs_f64();
            self.stats.cycles_completed += 1;
            self.stats.cycle_durations_secs.push(elapsed);
            info!(cycle, generation, elapsed_secs = elapsed, "Completed evolution cycle");
        }

        self.transition(PipelineState::ExportTop);

        Ok(self.summarize(generation, &population))
    }

    /// Loads the last committed generation, or creates and judges generation 0.
    async fn bootstrap(&mut self) -> Result<(i32, Vec<Story>), PipelineError> {
        if let Some(generation) = self.store.latest_generation().await? {
            let population = self.store.load_generation(generation).await?;
            info!(generation, stories = population.len(), "Resuming from committed generation");
            self.transition(PipelineState::Judged(generation));

            return Ok((generation, population));
        }

        let config = self.config;
        let mut population =
            generate_initial_population(self.generator, &config.prompt, &config.evolution, &config.rating).await;

        self.stats.stories_generated += population.len();
        self.stats.generation_failures += config.evolution.population_size - population.len();

        if population.is_empty() {
            return Err(PipelineError::EmptyPopulation(0));
        }

        self.transition(PipelineState::Judge(0));
        let records = self.judge_generation(0, &mut population).await?;

        self.store.commit_generation(0, &population, &records).await?;
        self.transition(PipelineState::Judged(0));

        Ok((0, population))
    }

    /// One cycle: select survivors of `generation`, breed and judge `generation + 1`,
    /// correct drift and commit.
    async fn evolve(&mut self, generation: i32, population: &[Story]) -> Result<Vec<Story>, PipelineError> {
        let config = self.config;

        self.transition(PipelineState::Select(generation));
        let selected = select_top(population, config.evolution.top_k);
        if selected.is_empty() {
            return Err(PipelineError::NoSurvivors(generation));
        }
        info!(
            generation,
            selected = selected.len(),
            best_rating = selected[0].rating,
            "Selected survivors"
        );

        let next = generation + 1;
        self.transition(PipelineState::GenerateVariants(next));
        let variants = generate_variants(
            self.generator,
            &selected,
            next,
            &config.evolution,
            &config.rating
        )
        .await;

        self.stats.stories_generated += variants.len();
        self.stats.generation_failures += selected.len() * config.evolution.variants_per_story - variants.len();

        let mut next_population = assemble_next_generation(
            &selected,
            variants,
            config.evolution.include_original_stories,
            next,
            &config.rating
        );
        if next_population.is_empty() {
            return Err(PipelineError::EmptyPopulation(next));
        }

        self.transition(PipelineState::Judge(next));
        let records = self.judge_generation(next, &mut next_population).await?;

        self.transition(PipelineState::DriftCorrect(next));
        let drift = correct_drift(&mut next_population);
        if let Some(report) = self.stats.generations.last_mut() {
            report.drift = drift;
        }

        self.store.commit_generation(next, &next_population, &records).await?;
        self.transition(PipelineState::Judged(next));

        Ok(next_population)
    }

    /// Runs one rating period over `stories`. With fewer than two stories no
    /// matches are played, but the period still passes: every story's RD grows.
    async fn judge_generation(&mut self, generation: i32, stories: &mut [Story]) -> Result<Vec<MatchRecord>, PipelineError> {
        let config = self.config;

        if stories.len() < 2 {
            warn!(
                generation,
                stories = stories.len(),
                "Fewer than two stories, skipping tournament"
            );
            let records = RatingPeriod::new(&self.engine, generation).apply(stories, &[])?;
            self.stats.generations.push(GenerationReport {
                generation,
                stories: stories.len(),
                matches_played: 0,
                matches_dropped: 0,
                halted: false,
                drift: None
            });

            return Ok(records);
        }

        let context = Some(config.prompt.as_str()).filter(|prompt| !prompt.is_empty());
        let scheduler = MatchScheduler::new(self.judge, &config.tournament, &config.rubric, context);
        let scheduled = scheduler.schedule(stories, &mut self.rng);
        let report = scheduler.run_matches(stories, &scheduled).await;

        let records = RatingPeriod::new(&self.engine, generation).apply(stories, &report.outcomes)?;

        self.stats.matches_played += report.matches_played();
        self.stats.matches_dropped += report.matches_dropped();
        self.stats.generations.push(GenerationReport {
            generation,
            stories: stories.len(),
            matches_played: report.matches_played(),
            matches_dropped: report.matches_dropped(),
            halted: report.halted,
            drift: None
        });

        Ok(records)
    }

    fn summarize(&self, generation: i32, population: &[Story]) -> PipelineSummary {
        let summary = PipelineSummary {
            final_generation: generation,
            stats: self.stats.clone(),
            leaderboard: leaderboard(population),
            model_performance: model_performance(population),
            biggest_changes: biggest_changes(population, REPORTED_CHANGES),
            top: export_top(population, self.config.evolution.top_k)
        };

        info!(
            final_generation = generation,
            cycles = self.stats.cycles_completed,
            stories_generated = self.stats.stories_generated,
            generation_failures = self.stats.generation_failures,
            matches_played = self.stats.matches_played,
            matches_dropped = self.stats.matches_dropped,
            "Pipeline finished"
        );

        summary
    }

    fn transition(&mut self, state: PipelineState) {
        info!(from = %self.state, to = %state, "Pipeline state change");
        self.state = state;
    }
}
