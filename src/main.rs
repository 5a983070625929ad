// src/main.rs
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use env_logger::Env;
use hackernews_flow_lib::fetch::{HackerNewsClient, ItemSource};
use hackernews_flow_lib::pipeline::{
    build_default_graph, AssetKey, Executor, JsonLinesSink, LogSink, RunReport, Scheduler,
};
use hackernews_flow_lib::utils::config::{print_env_config_example, FlowConfig};
use hackernews_flow_lib::utils::env::load_env;
use hackernews_flow_lib::utils::get_memory_usage;
use log::info;
use std::sync::Arc;
use std::time::Instant;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print ops in dependency order with their inputs and outputs
    List,
    /// Materialize assets now (all of them unless --select is given)
    Run {
        /// Asset keys to materialize, e.g. comments_model
        #[arg(long, num_args = 1..)]
        select: Vec<AssetKey>,
    },
    /// Run scheduled ops on their cron ticks until Ctrl-C
    Schedule {
        /// Materialize every asset once before waiting for the first tick
        #[arg(long)]
        initial_run: bool,
    },
    /// Print every supported environment variable with its default
    EnvExample,
}

fn build_executor(config: &FlowConfig) -> Result<Executor> {
    let client = HackerNewsClient::new(&config.fetch).context("Failed to build HTTP client")?;
    let source: Arc<dyn ItemSource> = Arc::new(client);
    let graph = build_default_graph(config, source)?;

    let mut executor = Executor::new(graph).with_sink(Box::new(LogSink));
    if let Some(path) = &config.report.metadata_path {
        executor = executor.with_sink(Box::new(JsonLinesSink::new(path)));
    }
    Ok(executor)
}

fn print_summary(executor: &Executor, report: &RunReport, config: &FlowConfig) {
    println!("\n========== Run {} ==========", report.run_id);
    println!("Ops: {}", report.ops.join(" -> "));
    for asset in &report.materialized {
        println!(
            "  {:<36} {:<10} ({:.2?})",
            asset.key.to_string(),
            executor.status(asset.key).to_string(),
            asset.duration
        );
    }

    let store = executor.store();
    if let Some(score) = store.score() {
        println!("Test set R²: {:.4}", score);
    }
    if let Some(predictions) = store.predictions() {
        println!("Predictions for latest stories: {}", predictions.len());
        let mut rows: Vec<usize> = (0..predictions.len()).collect();
        rows.sort_by(|&a, &b| predictions.values[b].total_cmp(&predictions.values[a]));
        for &i in rows.iter().take(5) {
            println!(
                "  {:>8.1}  #{} {}",
                predictions.values[i], predictions.story_ids[i], predictions.titles[i]
            );
        }
    }
    if config.progress.should_show_memory() {
        println!("Memory usage: {} MB", get_memory_usage());
    }
    println!("Total time: {:.2?}", report.duration);
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    load_env();

    let cli = Cli::parse();
    if let Command::EnvExample = cli.command {
        print_env_config_example();
        return Ok(());
    }

    let config = FlowConfig::from_env().context("Failed to load configuration")?;
    config.log_config();
    let start = Instant::now();

    match cli.command {
        Command::List => {
            let executor = build_executor(&config)?;
            for op in executor.graph().ops_in_order() {
                let inputs: Vec<String> = op.inputs().iter().map(ToString::to_string).collect();
                let outputs: Vec<String> = op.outputs().iter().map(ToString::to_string).collect();
                let trigger = op
                    .schedule()
                    .map(|s| format!(" [cron: {}]", s))
                    .unwrap_or_default();
                println!(
                    "{}{}\n    inputs:  {}\n    outputs: {}",
                    op.name(),
                    trigger,
                    if inputs.is_empty() { "-".to_string() } else { inputs.join(", ") },
                    outputs.join(", ")
                );
            }
        }
        Command::Run { select } => {
            let mut executor = build_executor(&config)?;
            let report = executor.run_now(&select).await?;
            print_summary(&executor, &report, &config);
        }
        Command::Schedule { initial_run } => {
            let scheduler = Scheduler::new(build_executor(&config)?);
            if initial_run {
                let report = scheduler.run_now(&[]).await?;
                let executor = scheduler.executor();
                print_summary(&*executor.lock().await, &report, &config);
            }
            info!("⏰ Scheduler started; press Ctrl-C to stop");
            scheduler.run_forever().await?;
        }
        Command::EnvExample => {}
    }

    info!("Finished in {:.2?}", start.elapsed());
    Ok(())
}
