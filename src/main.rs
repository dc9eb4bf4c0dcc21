use clap::Parser;
use std::{error::Error, fs, process};
use story_evolver::{
    adapters::{command::CommandSpec, CommandGenerator, CommandJudge},
    args::Args,
    config::PipelineConfig,
    database::{db::DbClient, StoryStore},
    pipeline::Pipeline
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&args.log_level))
        .with_writer(std::io::stderr)
        .init();

    let client = match DbClient::connect(&args.connection_string).await {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to connect to database: {}", e);
            error!("Application cannot start without a valid database connection");
            process::exit(1);
        }
    };

    if let Err(e) = run(&args, &client).await {
        error!("{}", e);
        process::exit(1);
    }
}

async fn run(args: &Args, client: &DbClient) -> Result<(), Box<dyn Error>> {
    let config = match &args.config {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::default()
    };

    client.create_schema().await?;
    if args.fresh {
        info!("Fresh run requested, wiping persisted state");
        client.wipe().await?;
    }

    let judge = CommandJudge::new(CommandSpec::parse(
        &args.judge_command,
        config.tournament.match_timeout()
    )?);
    let generator = CommandGenerator::new(CommandSpec::parse(
        &args.generator_command,
        config.evolution.generation_timeout()
    )?);

    let mut pipeline = Pipeline::new(&config, client, &judge, &generator)?;
    let summary = pipeline.run(args.cycles).await?;

    for entry in &summary.leaderboard {
        info!(
            rank = entry.rank,
            story = %entry.story_id,
            model = %entry.model,
            rating = entry.rating,
            rd = entry.rd,
            matches = entry.matches_played,
            win_rate = entry.win_rate,
            "Leaderboard"
        );
    }
    for performance in &summary.model_performance {
        info!(
            model = %performance.model,
            stories = performance.stories,
            mean_rating = performance.mean_rating,
            win_rate = performance.win_rate,
            "Model performance"
        );
    }

    let exported = serde_json::to_string_pretty(&summary)?;
    match &args.export {
        Some(path) => {
            fs::write(path, exported)?;
            info!(path = %path.display(), stories = summary.top.len(), "Exported top stories");
        }
        None => println!("{}", exported)
    }

    Ok(())
}
