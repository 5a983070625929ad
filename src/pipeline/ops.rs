// src/pipeline/ops.rs
//! The ops of the comment-count flow, one per row of the asset catalogue.

use anyhow::Result;
use async_trait::async_trait;
use log::info;
use std::sync::Arc;

use crate::fetch::{fetch_stories, ItemSource};
use crate::ml::boosting::MAE;
use crate::ml::plot::metric_plot_markdown;
use crate::ml::{split_train_test, BoostingParams, GradientBoostedRegressor, TfidfVectorizer};
use crate::models::{impute_missing_labels, PredictionVector, TransformedSet, WindowOffsets};
use crate::pipeline::asset::{AssetKey, AssetValue};
use crate::pipeline::graph::{AssetOp, OpInputs, OpOutput};
use crate::pipeline::metadata::MetadataValue;
use crate::pipeline::schedule::CronSchedule;
use crate::utils::config::SplitConfig;
use crate::utils::progress_config::ProgressConfig;

/// Where and how a window of items is fetched.
#[derive(Clone)]
pub struct WindowFetch {
    pub source: Arc<dyn ItemSource>,
    pub offsets: WindowOffsets,
    pub concurrency: usize,
    pub progress: ProgressConfig,
}

impl WindowFetch {
    async fn fetch(&self) -> Result<crate::models::StoryCorpus> {
        fetch_stories(
            self.source.as_ref(),
            self.offsets,
            self.concurrency,
            &self.progress,
        )
        .await
    }
}

fn count(n: usize) -> MetadataValue {
    MetadataValue::Int(n as i64)
}

pub struct HackernewsStoriesOp {
    fetch: WindowFetch,
}

impl HackernewsStoriesOp {
    pub fn new(fetch: WindowFetch) -> Self {
        Self { fetch }
    }
}

#[async_trait]
impl AssetOp for HackernewsStoriesOp {
    fn name(&self) -> &'static str {
        "hackernews_stories"
    }

    fn inputs(&self) -> &[AssetKey] {
        &[]
    }

    fn outputs(&self) -> &[AssetKey] {
        &[AssetKey::HackernewsStories]
    }

    async fn materialize(&self, _inputs: &OpInputs) -> Result<OpOutput> {
        let corpus = self.fetch.fetch().await?;
        let key = AssetKey::HackernewsStories;
        Ok(OpOutput::new()
            .with_metadata(key, "num_stories", count(corpus.len()))
            .with_metadata(key, "window", MetadataValue::Text(corpus.window.to_string()))
            .with_metadata(key, "max_item_id", MetadataValue::Int(corpus.max_item_id as i64))
            .with_asset(key, AssetValue::Stories(Arc::new(corpus))))
    }
}

pub struct TrainingTestDataOp {
    split: SplitConfig,
}

impl TrainingTestDataOp {
    pub fn new(split: SplitConfig) -> Self {
        Self { split }
    }
}

#[async_trait]
impl AssetOp for TrainingTestDataOp {
    fn name(&self) -> &'static str {
        "training_test_data"
    }

    fn inputs(&self) -> &[AssetKey] {
        &[AssetKey::HackernewsStories]
    }

    fn outputs(&self) -> &[AssetKey] {
        &[AssetKey::TrainingData, AssetKey::TestData]
    }

    async fn materialize(&self, inputs: &OpInputs) -> Result<OpOutput> {
        let corpus = inputs.stories(AssetKey::HackernewsStories)?;
        let labeled = corpus.labeled_titles();
        let split = split_train_test(&labeled, self.split.test_fraction, self.split.seed);
        info!(
            "Split {} stories into {} training and {} test rows",
            labeled.len(),
            split.train.len(),
            split.test.len()
        );

        Ok(OpOutput::new()
            .with_metadata(AssetKey::TrainingData, "num_rows", count(split.train.len()))
            .with_metadata(
                AssetKey::TrainingData,
                "missing_labels",
                count(split.train.missing_label_count()),
            )
            .with_metadata(AssetKey::TestData, "num_rows", count(split.test.len()))
            .with_metadata(
                AssetKey::TestData,
                "missing_labels",
                count(split.test.missing_label_count()),
            )
            .with_asset(AssetKey::TrainingData, AssetValue::Labeled(Arc::new(split.train)))
            .with_asset(AssetKey::TestData, AssetValue::Labeled(Arc::new(split.test))))
    }
}

/// Fits the vectorizer on training titles and transforms them in one pass.
pub struct TransformedTrainDataOp {
    vectorizer: TfidfVectorizer,
}

impl TransformedTrainDataOp {
    pub fn new(vectorizer: TfidfVectorizer) -> Self {
        Self { vectorizer }
    }
}

#[async_trait]
impl AssetOp for TransformedTrainDataOp {
    fn name(&self) -> &'static str {
        "transformed_train_data"
    }

    fn inputs(&self) -> &[AssetKey] {
        &[AssetKey::TrainingData]
    }

    fn outputs(&self) -> &[AssetKey] {
        &[AssetKey::TfidfVectorizer, AssetKey::TransformedTrainingData]
    }

    async fn materialize(&self, inputs: &OpInputs) -> Result<OpOutput> {
        let train = inputs.labeled(AssetKey::TrainingData)?;
        let (fitted, features) = self.vectorizer.fit_transform(&train.titles);
        let transformed = TransformedSet::new(features, impute_missing_labels(&train.labels));

        Ok(OpOutput::new()
            .with_metadata(
                AssetKey::TfidfVectorizer,
                "vocabulary_size",
                count(fitted.n_features()),
            )
            .with_metadata(
                AssetKey::TransformedTrainingData,
                "shape",
                MetadataValue::Text(format!(
                    "{} x {}",
                    transformed.n_samples(),
                    transformed.n_features()
                )),
            )
            .with_asset(AssetKey::TfidfVectorizer, AssetValue::Vectorizer(Arc::new(fitted)))
            .with_asset(
                AssetKey::TransformedTrainingData,
                AssetValue::Transformed(Arc::new(transformed)),
            ))
    }
}

pub struct TransformedTestDataOp;

#[async_trait]
impl AssetOp for TransformedTestDataOp {
    fn name(&self) -> &'static str {
        "transformed_test_data"
    }

    fn inputs(&self) -> &[AssetKey] {
        &[AssetKey::TestData, AssetKey::TfidfVectorizer]
    }

    fn outputs(&self) -> &[AssetKey] {
        &[AssetKey::TransformedTestData]
    }

    async fn materialize(&self, inputs: &OpInputs) -> Result<OpOutput> {
        let test = inputs.labeled(AssetKey::TestData)?;
        let vectorizer = inputs.vectorizer(AssetKey::TfidfVectorizer)?;
        let transformed = TransformedSet::new(
            vectorizer.transform(&test.titles),
            impute_missing_labels(&test.labels),
        );

        let key = AssetKey::TransformedTestData;
        Ok(OpOutput::new()
            .with_metadata(
                key,
                "shape",
                MetadataValue::Text(format!(
                    "{} x {}",
                    transformed.n_samples(),
                    transformed.n_features()
                )),
            )
            .with_asset(key, AssetValue::Transformed(Arc::new(transformed))))
    }
}

/// Trains the boosted ensemble. Carries the flow's only cron trigger.
pub struct CommentsModelOp {
    params: BoostingParams,
    schedule: Option<CronSchedule>,
}

impl CommentsModelOp {
    pub fn new(params: BoostingParams, schedule: Option<CronSchedule>) -> Self {
        Self { params, schedule }
    }
}

#[async_trait]
impl AssetOp for CommentsModelOp {
    fn name(&self) -> &'static str {
        "comments_model"
    }

    fn inputs(&self) -> &[AssetKey] {
        &[AssetKey::TransformedTrainingData, AssetKey::TransformedTestData]
    }

    fn outputs(&self) -> &[AssetKey] {
        &[AssetKey::CommentsModel]
    }

    fn schedule(&self) -> Option<&CronSchedule> {
        self.schedule.as_ref()
    }

    async fn materialize(&self, inputs: &OpInputs) -> Result<OpOutput> {
        let train = inputs.transformed(AssetKey::TransformedTrainingData)?;
        let test = inputs.transformed(AssetKey::TransformedTestData)?;
        let model = GradientBoostedRegressor::new(self.params).fit(&train, &test)?;

        let key = AssetKey::CommentsModel;
        let mut output = OpOutput::new();
        for (metric, curve) in model.history().curves() {
            output = output.with_metadata(
                key,
                format!("{} plot", metric),
                MetadataValue::Markdown(metric_plot_markdown(metric, curve)),
            );
        }
        let score = model.history().last(MAE).unwrap_or(f64::NAN);

        Ok(output
            .with_metadata(key, format!("score ({})", MAE), MetadataValue::Float(score))
            .with_metadata(key, "num_trees", count(model.n_trees()))
            .with_asset(key, AssetValue::Model(Arc::new(model))))
    }
}

pub struct CommentsModelTestSetRSquaredOp;

#[async_trait]
impl AssetOp for CommentsModelTestSetRSquaredOp {
    fn name(&self) -> &'static str {
        "comments_model_test_set_r_squared"
    }

    fn inputs(&self) -> &[AssetKey] {
        &[AssetKey::TransformedTestData, AssetKey::CommentsModel]
    }

    fn outputs(&self) -> &[AssetKey] {
        &[AssetKey::CommentsModelTestSetRSquared]
    }

    async fn materialize(&self, inputs: &OpInputs) -> Result<OpOutput> {
        let test = inputs.transformed(AssetKey::TransformedTestData)?;
        let model = inputs.model(AssetKey::CommentsModel)?;
        let r_squared = model.score(&test)?;
        info!("Test set R² = {:.4} over {} rows", r_squared, test.n_samples());

        let key = AssetKey::CommentsModelTestSetRSquared;
        Ok(OpOutput::new()
            .with_metadata(key, "r_squared", MetadataValue::Float(r_squared))
            .with_asset(key, AssetValue::Score(r_squared)))
    }
}

/// Scores the newest window with the already fitted vectorizer and model.
pub struct LatestStoryCommentPredictionsOp {
    fetch: WindowFetch,
}

impl LatestStoryCommentPredictionsOp {
    pub fn new(fetch: WindowFetch) -> Self {
        Self { fetch }
    }
}

#[async_trait]
impl AssetOp for LatestStoryCommentPredictionsOp {
    fn name(&self) -> &'static str {
        "latest_story_comment_predictions"
    }

    fn inputs(&self) -> &[AssetKey] {
        &[AssetKey::CommentsModel, AssetKey::TfidfVectorizer]
    }

    fn outputs(&self) -> &[AssetKey] {
        &[AssetKey::LatestStoryCommentPredictions]
    }

    async fn materialize(&self, inputs: &OpInputs) -> Result<OpOutput> {
        let model = inputs.model(AssetKey::CommentsModel)?;
        let vectorizer = inputs.vectorizer(AssetKey::TfidfVectorizer)?;

        let corpus = self.fetch.fetch().await?;
        let latest = corpus.labeled_titles();
        let features = vectorizer.transform(&latest.titles);
        let values = model.predict(&features)?;

        let predictions = PredictionVector {
            story_ids: latest.ids,
            titles: latest.titles,
            values: values.to_vec(),
        };

        let key = AssetKey::LatestStoryCommentPredictions;
        let mut output = OpOutput::new()
            .with_metadata(key, "num_predictions", count(predictions.len()))
            .with_metadata(key, "window", MetadataValue::Text(corpus.window.to_string()));
        if let Some(mean) = predictions.mean() {
            output = output.with_metadata(key, "mean_prediction", MetadataValue::Float(mean));
        }
        Ok(output.with_asset(key, AssetValue::Predictions(Arc::new(predictions))))
    }
}
