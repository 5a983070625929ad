// src/pipeline/graph.rs
//! Ops, the assets they declare, and the dependency graph between them.

use anyhow::Result;
use async_trait::async_trait;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::Arc;

use crate::ml::{FittedBoostedModel, FittedTfidf};
use crate::models::{LabeledTitles, StoryCorpus, TransformedSet};
use crate::pipeline::asset::{AssetKey, AssetValue};
use crate::pipeline::metadata::{Metadata, MetadataValue};
use crate::pipeline::schedule::CronSchedule;
use crate::utils::error::PipelineError;

/// A unit of work that materializes one or more assets from its inputs.
#[async_trait]
pub trait AssetOp: Send + Sync {
    fn name(&self) -> &'static str;

    fn inputs(&self) -> &[AssetKey];

    fn outputs(&self) -> &[AssetKey];

    /// Recurring trigger, if the op should run on its own.
    fn schedule(&self) -> Option<&CronSchedule> {
        None
    }

    async fn materialize(&self, inputs: &OpInputs) -> Result<OpOutput>;
}

/// The materialized values an op declared as inputs.
#[derive(Debug, Default)]
pub struct OpInputs {
    values: HashMap<AssetKey, AssetValue>,
}

impl OpInputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: AssetKey, value: AssetValue) {
        self.values.insert(key, value);
    }

    pub fn get(&self, key: AssetKey) -> Result<&AssetValue, PipelineError> {
        self.values
            .get(&key)
            .ok_or(PipelineError::NotMaterialized(key))
    }

    pub fn stories(&self, key: AssetKey) -> Result<Arc<StoryCorpus>, PipelineError> {
        match self.get(key)? {
            AssetValue::Stories(v) => Ok(Arc::clone(v)),
            _ => Err(unexpected(key, "a story corpus")),
        }
    }

    pub fn labeled(&self, key: AssetKey) -> Result<Arc<LabeledTitles>, PipelineError> {
        match self.get(key)? {
            AssetValue::Labeled(v) => Ok(Arc::clone(v)),
            _ => Err(unexpected(key, "labeled titles")),
        }
    }

    pub fn vectorizer(&self, key: AssetKey) -> Result<Arc<FittedTfidf>, PipelineError> {
        match self.get(key)? {
            AssetValue::Vectorizer(v) => Ok(Arc::clone(v)),
            _ => Err(unexpected(key, "a fitted vectorizer")),
        }
    }

    pub fn transformed(&self, key: AssetKey) -> Result<Arc<TransformedSet>, PipelineError> {
        match self.get(key)? {
            AssetValue::Transformed(v) => Ok(Arc::clone(v)),
            _ => Err(unexpected(key, "a transformed data set")),
        }
    }

    pub fn model(&self, key: AssetKey) -> Result<Arc<FittedBoostedModel>, PipelineError> {
        match self.get(key)? {
            AssetValue::Model(v) => Ok(Arc::clone(v)),
            _ => Err(unexpected(key, "a fitted model")),
        }
    }
}

fn unexpected(key: AssetKey, expected: &'static str) -> PipelineError {
    PipelineError::UnexpectedValue { key, expected }
}

/// Values (and their metadata) returned by one op invocation.
#[derive(Debug, Default)]
pub struct OpOutput {
    values: BTreeMap<AssetKey, AssetValue>,
    metadata: BTreeMap<AssetKey, Metadata>,
}

impl OpOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_asset(mut self, key: AssetKey, value: AssetValue) -> Self {
        self.values.insert(key, value);
        self
    }

    pub fn with_metadata(
        mut self,
        key: AssetKey,
        name: impl Into<String>,
        value: MetadataValue,
    ) -> Self {
        self.metadata
            .entry(key)
            .or_default()
            .insert(name.into(), value);
        self
    }

    pub fn keys(&self) -> impl Iterator<Item = AssetKey> + '_ {
        self.values.keys().copied()
    }

    /// Splits into `(key, value, metadata)` triples in key order.
    pub fn into_assets(mut self) -> Vec<(AssetKey, AssetValue, Metadata)> {
        self.values
            .into_iter()
            .map(|(key, value)| {
                let metadata = self.metadata.remove(&key).unwrap_or_default();
                (key, value, metadata)
            })
            .collect()
    }
}

/// Validated op graph. Node weights are indices into `ops`; each edge carries
/// the asset that flows along it.
pub struct AssetGraph {
    ops: Vec<Box<dyn AssetOp>>,
    graph: DiGraph<usize, AssetKey>,
    order: Vec<usize>,
    producers: HashMap<AssetKey, usize>,
}

impl std::fmt::Debug for AssetGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetGraph")
            .field(
                "ops",
                &self.order.iter().map(|&i| self.ops[i].name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl AssetGraph {
    /// Checks that every asset has exactly one producer, every input is
    /// produced by some op and the ops form a DAG.
    pub fn new(ops: Vec<Box<dyn AssetOp>>) -> Result<Self, PipelineError> {
        let mut producers: HashMap<AssetKey, usize> = HashMap::new();
        for (i, op) in ops.iter().enumerate() {
            for &key in op.outputs() {
                if producers.insert(key, i).is_some() {
                    return Err(PipelineError::DuplicateProducer(key));
                }
            }
        }

        let mut graph: DiGraph<usize, AssetKey> = DiGraph::with_capacity(ops.len(), ops.len());
        let nodes: Vec<NodeIndex> = (0..ops.len()).map(|i| graph.add_node(i)).collect();

        for (i, op) in ops.iter().enumerate() {
            for &input in op.inputs() {
                let producer = producers
                    .get(&input)
                    .copied()
                    .ok_or(PipelineError::MissingProducer {
                        op: op.name(),
                        input,
                    })?;
                graph.add_edge(nodes[producer], nodes[i], input);
            }
        }

        let order = toposort(&graph, None)
            .map_err(|cycle| PipelineError::Cycle(ops[graph[cycle.node_id()]].name()))?
            .into_iter()
            .map(|node| graph[node])
            .collect();

        Ok(Self {
            ops,
            graph,
            order,
            producers,
        })
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Ops in dependency order.
    pub fn ops_in_order(&self) -> impl Iterator<Item = &dyn AssetOp> + '_ {
        self.order.iter().map(move |&i| self.ops[i].as_ref())
    }

    /// Every asset, grouped by producing op in dependency order.
    pub fn assets(&self) -> Vec<AssetKey> {
        self.ops_in_order()
            .flat_map(|op| op.outputs().iter().copied())
            .collect()
    }

    pub fn producer_of(&self, key: AssetKey) -> Option<&dyn AssetOp> {
        self.producers.get(&key).map(|&i| self.ops[i].as_ref())
    }

    /// Ops needed to materialize `selection` (every asset when empty): the
    /// producers of the selected assets plus every ancestor op with at least
    /// one output for which `is_fresh` is false. Returned in dependency order.
    pub fn plan<F>(&self, selection: &[AssetKey], is_fresh: F) -> Result<Vec<&dyn AssetOp>, PipelineError>
    where
        F: Fn(AssetKey) -> bool,
    {
        let selected: Vec<AssetKey> = if selection.is_empty() {
            self.assets()
        } else {
            selection.to_vec()
        };

        let mut included: BTreeSet<usize> = BTreeSet::new();
        let mut queue: VecDeque<usize> = VecDeque::new();
        for key in selected {
            let op = *self
                .producers
                .get(&key)
                .ok_or_else(|| PipelineError::UnknownAsset(key.to_string()))?;
            if included.insert(op) {
                queue.push_back(op);
            }
        }

        while let Some(op) = queue.pop_front() {
            for edge in self
                .graph
                .edges_directed(NodeIndex::new(op), Direction::Incoming)
            {
                let upstream = self.graph[edge.source()];
                if included.contains(&upstream) {
                    continue;
                }
                let up_to_date = self.ops[upstream]
                    .outputs()
                    .iter()
                    .all(|&key| is_fresh(key));
                if !up_to_date {
                    included.insert(upstream);
                    queue.push_back(upstream);
                }
            }
        }

        Ok(self
            .order
            .iter()
            .filter(|i| included.contains(i))
            .map(|&i| self.ops[i].as_ref())
            .collect())
    }

    /// Assets that transitively depend on `key`, excluding `key` itself.
    pub fn descendants(&self, key: AssetKey) -> Vec<AssetKey> {
        let Some(&producer) = self.producers.get(&key) else {
            return Vec::new();
        };

        let mut seen: BTreeSet<usize> = BTreeSet::new();
        let mut queue: VecDeque<usize> = self
            .graph
            .edges_directed(NodeIndex::new(producer), Direction::Outgoing)
            .filter(|edge| *edge.weight() == key)
            .map(|edge| self.graph[edge.target()])
            .collect();

        while let Some(op) = queue.pop_front() {
            if !seen.insert(op) {
                continue;
            }
            queue.extend(
                self.graph
                    .neighbors_directed(NodeIndex::new(op), Direction::Outgoing)
                    .map(|n| self.graph[n]),
            );
        }

        self.order
            .iter()
            .filter(|i| seen.contains(i))
            .flat_map(|&i| self.ops[i].outputs().iter().copied())
            .filter(|&k| k != key)
            .collect()
    }

    /// Ops that carry their own cron trigger.
    pub fn scheduled_ops(&self) -> Vec<(&dyn AssetOp, &CronSchedule)> {
        self.ops_in_order()
            .filter_map(|op| op.schedule().map(|schedule| (op, schedule)))
            .collect()
    }
}
