// src/pipeline/asset.rs
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

use crate::ml::{FittedBoostedModel, FittedTfidf};
use crate::models::{LabeledTitles, PredictionVector, StoryCorpus, TransformedSet};
use crate::pipeline::metadata::Metadata;
use crate::utils::error::PipelineError;

/// Every named value the flow can materialize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKey {
    HackernewsStories,
    TrainingData,
    TestData,
    TfidfVectorizer,
    TransformedTrainingData,
    TransformedTestData,
    CommentsModel,
    CommentsModelTestSetRSquared,
    LatestStoryCommentPredictions,
}

impl AssetKey {
    pub const ALL: [AssetKey; 9] = [
        AssetKey::HackernewsStories,
        AssetKey::TrainingData,
        AssetKey::TestData,
        AssetKey::TfidfVectorizer,
        AssetKey::TransformedTrainingData,
        AssetKey::TransformedTestData,
        AssetKey::CommentsModel,
        AssetKey::CommentsModelTestSetRSquared,
        AssetKey::LatestStoryCommentPredictions,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AssetKey::HackernewsStories => "hackernews_stories",
            AssetKey::TrainingData => "training_data",
            AssetKey::TestData => "test_data",
            AssetKey::TfidfVectorizer => "tfidf_vectorizer",
            AssetKey::TransformedTrainingData => "transformed_training_data",
            AssetKey::TransformedTestData => "transformed_test_data",
            AssetKey::CommentsModel => "comments_model",
            AssetKey::CommentsModelTestSetRSquared => "comments_model_test_set_r_squared",
            AssetKey::LatestStoryCommentPredictions => "latest_story_comment_predictions",
        }
    }

    /// Assets holding fit-derived state that downstream ops reuse unchanged.
    pub fn is_fitted_state(&self) -> bool {
        matches!(self, AssetKey::TfidfVectorizer | AssetKey::CommentsModel)
    }
}

impl fmt::Display for AssetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssetKey {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AssetKey::ALL
            .iter()
            .copied()
            .find(|key| key.as_str() == s.trim())
            .ok_or_else(|| PipelineError::UnknownAsset(s.to_string()))
    }
}

/// A materialized value. Values are immutable once produced and shared
/// between ops by reference count.
#[derive(Debug, Clone)]
pub enum AssetValue {
    Stories(Arc<StoryCorpus>),
    Labeled(Arc<LabeledTitles>),
    Vectorizer(Arc<FittedTfidf>),
    Transformed(Arc<TransformedSet>),
    Model(Arc<FittedBoostedModel>),
    Score(f64),
    Predictions(Arc<PredictionVector>),
}

impl AssetValue {
    pub fn kind(&self) -> &'static str {
        match self {
            AssetValue::Stories(_) => "a story corpus",
            AssetValue::Labeled(_) => "labeled titles",
            AssetValue::Vectorizer(_) => "a fitted vectorizer",
            AssetValue::Transformed(_) => "a transformed data set",
            AssetValue::Model(_) => "a fitted model",
            AssetValue::Score(_) => "a score",
            AssetValue::Predictions(_) => "predictions",
        }
    }

    /// Content hash for values whose identity is cheap to establish. Fitted
    /// state and derived numbers return None and always count as changed.
    pub fn data_version(&self) -> Option<String> {
        match self {
            AssetValue::Stories(corpus) => Some(corpus.data_version()),
            AssetValue::Labeled(labeled) => Some(labeled.data_version()),
            _ => None,
        }
    }
}

/// Where an asset stands in the in-memory store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetStatus {
    Missing,
    Fresh,
    /// An upstream asset changed after this one was materialized.
    Stale,
    Failed(String),
}

impl fmt::Display for AssetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetStatus::Missing => write!(f, "missing"),
            AssetStatus::Fresh => write!(f, "fresh"),
            AssetStatus::Stale => write!(f, "stale"),
            AssetStatus::Failed(reason) => write!(f, "failed ({})", reason),
        }
    }
}

/// One successful materialization of an asset.
#[derive(Debug, Clone)]
pub struct Materialization {
    pub value: AssetValue,
    pub run_id: Uuid,
    pub materialized_at: DateTime<Utc>,
    pub data_version: Option<String>,
    pub metadata: Metadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for key in AssetKey::ALL {
            assert_eq!(key.as_str().parse::<AssetKey>().unwrap(), key);
            assert_eq!(
                serde_json::to_string(&key).unwrap(),
                format!("\"{}\"", key.as_str())
            );
        }
    }

    #[test]
    fn test_unknown_name() {
        assert_eq!(
            "xgboost".parse::<AssetKey>(),
            Err(PipelineError::UnknownAsset("xgboost".to_string()))
        );
    }

    #[test]
    fn test_only_corpus_values_are_versioned() {
        assert!(AssetValue::Score(0.5).data_version().is_none());
        let labeled = AssetValue::Labeled(Arc::new(LabeledTitles::default()));
        assert!(labeled.data_version().is_some());
    }
}
