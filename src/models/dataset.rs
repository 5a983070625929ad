// src/models/dataset.rs
use ndarray::{Array1, Array2};
use serde::Serialize;

/// Parallel title/label columns keyed by story id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabeledTitles {
    pub ids: Vec<u64>,
    pub titles: Vec<String>,
    pub labels: Vec<Option<u32>>,
}

impl LabeledTitles {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Rows at `indices`, in the order given.
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            ids: indices.iter().map(|&i| self.ids[i]).collect(),
            titles: indices.iter().map(|&i| self.titles[i].clone()).collect(),
            labels: indices.iter().map(|&i| self.labels[i]).collect(),
        }
    }

    pub fn missing_label_count(&self) -> usize {
        self.labels.iter().filter(|l| l.is_none()).count()
    }

    pub fn data_version(&self) -> String {
        let rows: Vec<Vec<u8>> = self
            .ids
            .iter()
            .zip(&self.titles)
            .zip(&self.labels)
            .map(|((id, title), label)| {
                let mut row = id.to_le_bytes().to_vec();
                row.extend_from_slice(title.as_bytes());
                row.extend_from_slice(&label.map_or(-1_i64, i64::from).to_le_bytes());
                row
            })
            .collect();
        super::data_version(rows.iter().map(|r| r.as_slice()))
    }
}

/// Missing comment counts are imputed to zero, never dropped: a story the API
/// reports without `descendants` stays in the data as a zero-comment story.
pub fn impute_missing_labels(labels: &[Option<u32>]) -> Array1<f64> {
    labels.iter().map(|l| l.map_or(0.0, f64::from)).collect()
}

/// Held-out partition of a labeled corpus.
#[derive(Debug, Clone)]
pub struct Split {
    pub train: LabeledTitles,
    pub test: LabeledTitles,
}

/// Vectorized features and imputed labels, row-aligned.
#[derive(Debug, Clone)]
pub struct TransformedSet {
    pub features: Array2<f64>,
    pub labels: Array1<f64>,
}

impl TransformedSet {
    pub fn new(features: Array2<f64>, labels: Array1<f64>) -> Self {
        debug_assert_eq!(features.nrows(), labels.len());
        Self { features, labels }
    }

    pub fn n_samples(&self) -> usize {
        self.features.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.features.ncols()
    }
}

/// Point predictions for the newest stories.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PredictionVector {
    pub story_ids: Vec<u64>,
    pub titles: Vec<String>,
    pub values: Vec<f64>,
}

impl PredictionVector {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn mean(&self) -> Option<f64> {
        if self.values.is_empty() {
            None
        } else {
            Some(self.values.iter().sum::<f64>() / self.values.len() as f64)
        }
    }
}
