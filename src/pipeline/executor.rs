// src/pipeline/executor.rs
//! Runs planned ops in dependency order and keeps the in-memory store of
//! materialized assets and their status.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::models::PredictionVector;
use crate::pipeline::asset::{AssetKey, AssetStatus, AssetValue, Materialization};
use crate::pipeline::graph::{AssetGraph, AssetOp, OpInputs};
use crate::pipeline::metadata::{MaterializationEvent, Metadata, MetadataSink};
use crate::utils::error::PipelineError;

/// Latest materialization and status per asset. Lives as long as the process.
#[derive(Debug, Default)]
pub struct MaterializationStore {
    entries: HashMap<AssetKey, Materialization>,
    status: HashMap<AssetKey, AssetStatus>,
}

impl MaterializationStore {
    pub fn status(&self, key: AssetKey) -> AssetStatus {
        self.status.get(&key).cloned().unwrap_or(AssetStatus::Missing)
    }

    pub fn is_fresh(&self, key: AssetKey) -> bool {
        self.status(key) == AssetStatus::Fresh
    }

    pub fn get(&self, key: AssetKey) -> Option<&Materialization> {
        self.entries.get(&key)
    }

    /// Last good value, even if it has since gone stale or a rerun failed.
    pub fn value(&self, key: AssetKey) -> Option<&AssetValue> {
        self.entries.get(&key).map(|m| &m.value)
    }

    pub fn score(&self) -> Option<f64> {
        match self.value(AssetKey::CommentsModelTestSetRSquared)? {
            AssetValue::Score(score) => Some(*score),
            _ => None,
        }
    }

    pub fn predictions(&self) -> Option<Arc<PredictionVector>> {
        match self.value(AssetKey::LatestStoryCommentPredictions)? {
            AssetValue::Predictions(p) => Some(Arc::clone(p)),
            _ => None,
        }
    }

    fn insert(&mut self, key: AssetKey, materialization: Materialization) -> Option<Materialization> {
        self.status.insert(key, AssetStatus::Fresh);
        self.entries.insert(key, materialization)
    }

    fn mark_failed(&mut self, key: AssetKey, reason: String) {
        self.status.insert(key, AssetStatus::Failed(reason));
    }

    fn mark_stale(&mut self, key: AssetKey) -> bool {
        match self.status.get_mut(&key) {
            Some(status) if *status == AssetStatus::Fresh => {
                *status = AssetStatus::Stale;
                true
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunKind {
    Manual,
    Scheduled { op: &'static str },
}

impl std::fmt::Display for RunKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunKind::Manual => write!(f, "manual"),
            RunKind::Scheduled { op } => write!(f, "scheduled ({})", op),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MaterializedAsset {
    pub key: AssetKey,
    pub op: &'static str,
    pub duration: Duration,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub kind: RunKind,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    pub ops: Vec<&'static str>,
    pub materialized: Vec<MaterializedAsset>,
}

impl RunReport {
    pub fn contains(&self, key: AssetKey) -> bool {
        self.materialized.iter().any(|m| m.key == key)
    }
}

/// One graph, one store, any number of metadata sinks.
pub struct Executor {
    graph: AssetGraph,
    store: MaterializationStore,
    sinks: Vec<Box<dyn MetadataSink>>,
}

impl Executor {
    pub fn new(graph: AssetGraph) -> Self {
        Self {
            graph,
            store: MaterializationStore::default(),
            sinks: Vec::new(),
        }
    }

    pub fn with_sink(mut self, sink: Box<dyn MetadataSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn graph(&self) -> &AssetGraph {
        &self.graph
    }

    pub fn store(&self) -> &MaterializationStore {
        &self.store
    }

    pub fn status(&self, key: AssetKey) -> AssetStatus {
        self.store.status(key)
    }

    /// Materializes `selection` (everything when empty), pulling in any
    /// upstream op whose outputs are not fresh.
    pub async fn run_now(&mut self, selection: &[AssetKey]) -> Result<RunReport> {
        let store = &self.store;
        let plan = self.graph.plan(selection, |key| store.is_fresh(key))?;
        let plan: Vec<&'static str> = plan.iter().map(|op| op.name()).collect();
        self.execute(&plan, RunKind::Manual).await
    }

    /// Runs only the producers of `selection` against whatever is in the
    /// store. Inputs that were never materialized fail the run.
    pub async fn run_isolated(&mut self, selection: &[AssetKey]) -> Result<RunReport> {
        let mut names: BTreeSet<&'static str> = BTreeSet::new();
        for &key in selection {
            let op = self
                .graph
                .producer_of(key)
                .ok_or_else(|| PipelineError::UnknownAsset(key.to_string()))?;
            names.insert(op.name());
        }
        let plan: Vec<&'static str> = self
            .graph
            .ops_in_order()
            .map(|op| op.name())
            .filter(|name| names.contains(name))
            .collect();
        self.execute(&plan, RunKind::Manual).await
    }

    /// Entry point for the scheduler: the op's outputs plus stale ancestors.
    pub async fn run_scheduled(&mut self, op_name: &'static str) -> Result<RunReport> {
        let outputs: Vec<AssetKey> = self
            .graph
            .ops_in_order()
            .find(|op| op.name() == op_name)
            .map(|op| op.outputs().to_vec())
            .ok_or_else(|| PipelineError::UnknownAsset(op_name.to_string()))?;

        let store = &self.store;
        let plan = self.graph.plan(&outputs, |key| store.is_fresh(key))?;
        let plan: Vec<&'static str> = plan.iter().map(|op| op.name()).collect();
        self.execute(&plan, RunKind::Scheduled { op: op_name }).await
    }

    async fn execute(&mut self, plan: &[&'static str], kind: RunKind) -> Result<RunReport> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let start = Instant::now();
        info!(
            "🚀 Starting {} run {} with {} op(s): {}",
            kind,
            run_id,
            plan.len(),
            plan.join(" -> ")
        );

        let mut report = RunReport {
            run_id,
            kind,
            started_at,
            duration: Duration::ZERO,
            ops: plan.to_vec(),
            materialized: Vec::new(),
        };

        for &name in plan {
            let op = self
                .graph
                .ops_in_order()
                .find(|op| op.name() == name)
                .ok_or_else(|| PipelineError::UnknownAsset(name.to_string()))?;

            let op_start = Instant::now();
            let result = run_op(op, &self.store).await;
            let assets = match result {
                Ok(assets) => assets,
                Err(e) => {
                    let reason = format!("{:#}", e);
                    for &key in op.outputs() {
                        self.store.mark_failed(key, reason.clone());
                    }
                    error!("❌ Op '{}' failed in run {}: {}", name, run_id, reason);
                    return Err(e.context(format!("Run {} failed at op '{}'", run_id, name)));
                }
            };
            let op_duration = op_start.elapsed();
            debug!("Op '{}' finished in {:.2?}", name, op_duration);

            for (key, value, metadata) in assets {
                let data_version = value.data_version();
                let materialized_at = Utc::now();
                let event = MaterializationEvent {
                    run_id,
                    asset: key,
                    op: name,
                    materialized_at,
                    data_version: data_version.clone(),
                    metadata: metadata.clone(),
                };
                let previous = self.store.insert(
                    key,
                    Materialization {
                        value,
                        run_id,
                        materialized_at,
                        data_version: data_version.clone(),
                        metadata,
                    },
                );

                let unchanged = data_version.is_some()
                    && previous.and_then(|p| p.data_version) == data_version;
                if unchanged {
                    debug!("{} unchanged; downstream assets stay fresh", key);
                } else {
                    for downstream in self.graph.descendants(key) {
                        if self.store.mark_stale(downstream) {
                            debug!("{} is now stale (upstream {} changed)", downstream, key);
                        }
                    }
                }

                for sink in &self.sinks {
                    if let Err(e) = sink.record(&event) {
                        warn!("Metadata sink failed for {}: {:#}", key, e);
                    }
                }

                report.materialized.push(MaterializedAsset {
                    key,
                    op: name,
                    duration: op_duration,
                });
            }
        }

        report.duration = start.elapsed();
        info!(
            "✅ Run {} finished: {} asset(s) in {:.2?}",
            run_id,
            report.materialized.len(),
            report.duration
        );
        Ok(report)
    }
}

/// Gathers the op's inputs, invokes it and checks it returned exactly the
/// assets it declares.
async fn run_op(
    op: &dyn AssetOp,
    store: &MaterializationStore,
) -> Result<Vec<(AssetKey, AssetValue, Metadata)>> {
    let mut inputs = OpInputs::new();
    for &key in op.inputs() {
        let value = store
            .value(key)
            .ok_or(PipelineError::NotMaterialized(key))?;
        if !store.is_fresh(key) {
            debug!("Op '{}' reads {} with status {}", op.name(), key, store.status(key));
        }
        inputs.insert(key, value.clone());
    }

    let output = op
        .materialize(&inputs)
        .await
        .with_context(|| format!("Op '{}' failed to materialize", op.name()))?;

    let declared: BTreeSet<AssetKey> = op.outputs().iter().copied().collect();
    let returned: BTreeSet<AssetKey> = output.keys().collect();
    if let Some(&key) = declared.symmetric_difference(&returned).next() {
        return Err(PipelineError::OutputMismatch { op: op.name(), key }.into());
    }
    Ok(output.into_assets())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::test_support::synthetic_window;
    use crate::fetch::ItemSource;
    use crate::ml::BoostingParams;
    use crate::models::WindowOffsets;
    use crate::pipeline::build_default_graph;
    use crate::pipeline::graph::tests::DummyOp;
    use crate::pipeline::graph::OpOutput;
    use crate::pipeline::metadata::JsonLinesSink;
    use crate::utils::config::FlowConfig;
    use crate::utils::progress_config::ProgressConfig;
    use AssetKey::*;

    fn test_config() -> FlowConfig {
        let mut config = FlowConfig::default();
        config.fetch.training_window = WindowOffsets::new(10, 0);
        config.fetch.inference_window = WindowOffsets::new(10, 0);
        config.fetch.concurrency = 4;
        config.split.seed = Some(42);
        config.model = BoostingParams {
            n_estimators: 5,
            max_depth: 3,
            ..BoostingParams::default()
        };
        config.progress = ProgressConfig::disabled();
        config
    }

    fn executor_for(source: impl ItemSource + 'static) -> Executor {
        let graph = build_default_graph(&test_config(), Arc::new(source)).unwrap();
        Executor::new(graph)
    }

    #[tokio::test]
    async fn test_end_to_end_on_synthetic_window() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("events.jsonl");
        let mut executor =
            executor_for(synthetic_window(1_000)).with_sink(Box::new(JsonLinesSink::new(&log_path)));

        let report = executor.run_now(&[]).await.unwrap();
        assert_eq!(report.materialized.len(), AssetKey::ALL.len());
        for key in AssetKey::ALL {
            assert_eq!(executor.status(key), AssetStatus::Fresh, "{}", key);
        }

        let store = executor.store();
        match store.value(HackernewsStories) {
            Some(AssetValue::Stories(corpus)) => assert_eq!(corpus.len(), 8),
            other => panic!("unexpected stories value {:?}", other),
        }
        match (store.value(TrainingData), store.value(TestData)) {
            (Some(AssetValue::Labeled(train)), Some(AssetValue::Labeled(test))) => {
                assert_eq!(train.len(), 6);
                assert_eq!(test.len(), 2);
            }
            other => panic!("unexpected split {:?}", other),
        }
        match store.value(TfidfVectorizer) {
            Some(AssetValue::Vectorizer(v)) => assert!(v.n_features() > 0),
            other => panic!("unexpected vectorizer {:?}", other),
        }
        assert!(store.score().unwrap().is_finite());
        let predictions = store.predictions().unwrap();
        assert_eq!(predictions.len(), 8);
        assert!(predictions.values.iter().all(|v| v.is_finite()));

        let events = std::fs::read_to_string(&log_path).unwrap();
        assert_eq!(events.lines().count(), AssetKey::ALL.len());
    }

    #[tokio::test]
    async fn test_refetching_identical_window_keeps_downstream_fresh() {
        let mut executor = executor_for(synthetic_window(1_000));
        executor.run_now(&[]).await.unwrap();

        let report = executor.run_now(&[HackernewsStories]).await.unwrap();
        assert_eq!(report.ops, vec!["hackernews_stories"]);
        assert_eq!(executor.status(TrainingData), AssetStatus::Fresh);
        assert_eq!(executor.status(CommentsModel), AssetStatus::Fresh);
    }

    #[tokio::test]
    async fn test_fetch_failure_marks_asset_failed() {
        let mut executor = executor_for(synthetic_window(1_000).failing_on(995));
        let err = executor.run_now(&[CommentsModel]).await.unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to fetch item 995"));
        assert!(matches!(executor.status(HackernewsStories), AssetStatus::Failed(_)));
        assert_eq!(executor.status(TrainingData), AssetStatus::Missing);
    }

    #[tokio::test]
    async fn test_isolated_run_without_upstream_is_not_fitted() {
        let mut executor = executor_for(synthetic_window(1_000));
        let err = executor
            .run_isolated(&[LatestStoryCommentPredictions])
            .await
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<PipelineError>(),
            Some(&PipelineError::NotMaterialized(CommentsModel))
        );
        assert!(format!("{:#}", err).contains("comments_model is not fitted"));
    }

    #[tokio::test]
    async fn test_scheduled_run_materializes_model_and_ancestors() {
        let mut executor = executor_for(synthetic_window(1_000));
        let report = executor.run_scheduled("comments_model").await.unwrap();
        assert_eq!(report.kind, RunKind::Scheduled { op: "comments_model" });
        assert!(report.contains(CommentsModel));
        assert!(!report.contains(LatestStoryCommentPredictions));
        assert_eq!(executor.status(CommentsModelTestSetRSquared), AssetStatus::Missing);
    }

    fn dummy(name: &'static str, inputs: &[AssetKey], outputs: &[AssetKey]) -> Box<dyn AssetOp> {
        Box::new(DummyOp {
            name,
            inputs: inputs.to_vec(),
            outputs: outputs.to_vec(),
        })
    }

    #[tokio::test]
    async fn test_changed_upstream_marks_downstream_stale() {
        let graph = AssetGraph::new(vec![
            dummy("stories", &[], &[HackernewsStories]),
            dummy("split", &[HackernewsStories], &[TrainingData, TestData]),
            dummy(
                "train_features",
                &[TrainingData],
                &[TfidfVectorizer, TransformedTrainingData],
            ),
        ])
        .unwrap();
        let mut executor = Executor::new(graph);
        executor.run_now(&[]).await.unwrap();

        executor.run_now(&[TrainingData]).await.unwrap();
        assert_eq!(executor.status(TrainingData), AssetStatus::Fresh);
        assert_eq!(executor.status(TfidfVectorizer), AssetStatus::Stale);
        assert_eq!(executor.status(HackernewsStories), AssetStatus::Fresh);

        let report = executor.run_now(&[TransformedTrainingData]).await.unwrap();
        assert_eq!(report.ops, vec!["train_features"]);
        assert_eq!(executor.status(TfidfVectorizer), AssetStatus::Fresh);
    }

    #[tokio::test]
    async fn test_undeclared_output_is_rejected() {
        struct Liar;

        #[async_trait::async_trait]
        impl AssetOp for Liar {
            fn name(&self) -> &'static str {
                "liar"
            }
            fn inputs(&self) -> &[AssetKey] {
                &[]
            }
            fn outputs(&self) -> &[AssetKey] {
                &[HackernewsStories]
            }
            async fn materialize(&self, _inputs: &OpInputs) -> Result<OpOutput> {
                Ok(OpOutput::new())
            }
        }

        let mut executor = Executor::new(AssetGraph::new(vec![Box::new(Liar) as Box<dyn AssetOp>]).unwrap());
        let err = executor.run_now(&[]).await.unwrap_err();
        assert_eq!(
            err.downcast_ref::<PipelineError>(),
            Some(&PipelineError::OutputMismatch {
                op: "liar",
                key: HackernewsStories
            })
        );
    }
}
