// src/pipeline/mod.rs
pub mod asset;
pub mod executor;
pub mod graph;
pub mod metadata;
pub mod ops;
pub mod schedule;

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::fetch::ItemSource;
use crate::utils::config::FlowConfig;

pub use asset::{AssetKey, AssetStatus, AssetValue, Materialization};
pub use executor::{Executor, MaterializationStore, RunKind, RunReport};
pub use graph::{AssetGraph, AssetOp, OpInputs, OpOutput};
pub use metadata::{JsonLinesSink, LogSink, MaterializationEvent, MetadataSink, MetadataValue};
pub use schedule::{CronSchedule, Scheduler};

use ops::{
    CommentsModelOp, CommentsModelTestSetRSquaredOp, HackernewsStoriesOp,
    LatestStoryCommentPredictionsOp, TrainingTestDataOp, TransformedTestDataOp,
    TransformedTrainDataOp, WindowFetch,
};

/// The comment-count flow: fetch, split, vectorize, train, score, predict.
/// Both fetching ops share `source`.
pub fn build_default_graph(config: &FlowConfig, source: Arc<dyn ItemSource>) -> Result<AssetGraph> {
    let training_cron = CronSchedule::parse(&config.schedule.training_cron)
        .context("Failed to parse the training schedule")?;

    let window = |offsets| WindowFetch {
        source: Arc::clone(&source),
        offsets,
        concurrency: config.fetch.concurrency,
        progress: config.progress.clone(),
    };

    let ops: Vec<Box<dyn AssetOp>> = vec![
        Box::new(HackernewsStoriesOp::new(window(config.fetch.training_window))),
        Box::new(TrainingTestDataOp::new(config.split.clone())),
        Box::new(TransformedTrainDataOp::new(config.vectorizer)),
        Box::new(TransformedTestDataOp),
        Box::new(CommentsModelOp::new(config.model, Some(training_cron))),
        Box::new(CommentsModelTestSetRSquaredOp),
        Box::new(LatestStoryCommentPredictionsOp::new(window(
            config.fetch.inference_window,
        ))),
    ];

    Ok(AssetGraph::new(ops)?)
}
