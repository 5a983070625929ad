// src/ml/boosting.rs
//! Gradient-boosted regression trees for comment-count prediction.
//!
//! Squared-error boosting: start from the mean label, fit a smartcore
//! regression tree to the current residuals each round, and add its output
//! scaled by the learning rate. After every round the ensemble is scored on
//! the held-out evaluation set so the metric curves can be reported.

use anyhow::{anyhow, bail, Result};
use log::{debug, info, warn};
use ndarray::{Array1, Array2};
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::tree::decision_tree_regressor::{
    DecisionTreeRegressor, DecisionTreeRegressorParameters,
};
use std::collections::BTreeMap;

use crate::ml::metrics::{mean_absolute_error, r2_score, root_mean_squared_error};
use crate::models::TransformedSet;

pub const MAE: &str = "mean_absolute_error";
pub const RMSE: &str = "root_mean_squared_error";

type RegressionTree = DecisionTreeRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoostingParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: u16,
    pub min_samples_leaf: usize,
}

impl Default for BoostingParams {
    fn default() -> Self {
        Self {
            n_estimators: 20,
            learning_rate: 0.3,
            max_depth: 6,
            min_samples_leaf: 1,
        }
    }
}

/// Per-round evaluation metrics, keyed by metric name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvalHistory {
    curves: BTreeMap<String, Vec<f64>>,
}

impl EvalHistory {
    fn record(&mut self, y_true: &Array1<f64>, y_pred: &Array1<f64>) {
        self.curves
            .entry(MAE.to_string())
            .or_default()
            .push(mean_absolute_error(y_true, y_pred));
        self.curves
            .entry(RMSE.to_string())
            .or_default()
            .push(root_mean_squared_error(y_true, y_pred));
    }

    pub fn curves(&self) -> &BTreeMap<String, Vec<f64>> {
        &self.curves
    }

    pub fn curve(&self, metric: &str) -> Option<&[f64]> {
        self.curves.get(metric).map(Vec::as_slice)
    }

    pub fn last(&self, metric: &str) -> Option<f64> {
        self.curve(metric).and_then(|c| c.last().copied())
    }

    pub fn rounds(&self) -> usize {
        self.curves.values().map(Vec::len).max().unwrap_or(0)
    }
}

fn to_dense(features: &Array2<f64>) -> DenseMatrix<f64> {
    let (rows, cols) = features.dim();
    DenseMatrix::new(rows, cols, features.iter().copied().collect(), false)
}

#[derive(Debug, Clone, Default)]
pub struct GradientBoostedRegressor {
    pub params: BoostingParams,
}

impl GradientBoostedRegressor {
    pub fn new(params: BoostingParams) -> Self {
        Self { params }
    }

    /// Fits on `train`, evaluating against `eval_set` after every round.
    ///
    /// With no training rows or no feature columns the result is a constant
    /// model predicting the mean label (zero for an empty set).
    pub fn fit(&self, train: &TransformedSet, eval_set: &TransformedSet) -> Result<FittedBoostedModel> {
        let n_features = train.n_features();
        if eval_set.n_features() != n_features {
            bail!(
                "Evaluation set has {} features but training set has {}",
                eval_set.n_features(),
                n_features
            );
        }

        let base_score = train.labels.mean().unwrap_or(0.0);
        let lr = self.params.learning_rate;
        let mut train_pred = Array1::from_elem(train.n_samples(), base_score);
        let mut eval_pred = Array1::from_elem(eval_set.n_samples(), base_score);
        let mut history = EvalHistory::default();
        let mut trees: Vec<RegressionTree> = Vec::with_capacity(self.params.n_estimators);

        if train.n_samples() == 0 || n_features == 0 {
            warn!(
                "Training set has {} rows and {} features; fitting a constant model",
                train.n_samples(),
                n_features
            );
            history.record(&eval_set.labels, &eval_pred);
            return Ok(FittedBoostedModel {
                base_score,
                learning_rate: lr,
                n_features,
                trees,
                history,
            });
        }

        let rounds = self.params.n_estimators;
        let tree_params = DecisionTreeRegressorParameters::default()
            .with_max_depth(self.params.max_depth)
            .with_min_samples_leaf(self.params.min_samples_leaf);
        let x_train = to_dense(&train.features);
        let x_eval = (eval_set.n_samples() > 0).then(|| to_dense(&eval_set.features));

        for round in 1..=rounds {
            let residuals: Vec<f64> = (&train.labels - &train_pred).to_vec();
            let tree = RegressionTree::fit(&x_train, &residuals, tree_params.clone())
                .map_err(|e| anyhow!("Boosting round {} failed to fit a tree: {}", round, e))?;

            let step = tree
                .predict(&x_train)
                .map_err(|e| anyhow!("Boosting round {} failed to predict: {}", round, e))?;
            train_pred.scaled_add(lr, &Array1::from(step));

            if let Some(x_eval) = &x_eval {
                let step = tree
                    .predict(x_eval)
                    .map_err(|e| anyhow!("Boosting round {} failed on eval set: {}", round, e))?;
                eval_pred.scaled_add(lr, &Array1::from(step));
            }
            history.record(&eval_set.labels, &eval_pred);
            debug!(
                "Round {}/{}: eval {} = {:.4}",
                round,
                rounds,
                MAE,
                history.last(MAE).unwrap_or(f64::NAN)
            );

            trees.push(tree);
        }

        info!(
            "Fitted {} trees on {} rows x {} features; final eval {} = {:.4}",
            trees.len(),
            train.n_samples(),
            n_features,
            MAE,
            history.last(MAE).unwrap_or(f64::NAN)
        );

        Ok(FittedBoostedModel {
            base_score,
            learning_rate: lr,
            n_features,
            trees,
            history,
        })
    }
}

/// Frozen ensemble. Only used for prediction and scoring after fitting.
#[derive(Debug)]
pub struct FittedBoostedModel {
    base_score: f64,
    learning_rate: f64,
    n_features: usize,
    trees: Vec<RegressionTree>,
    history: EvalHistory,
}

impl FittedBoostedModel {
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn base_score(&self) -> f64 {
        self.base_score
    }

    pub fn history(&self) -> &EvalHistory {
        &self.history
    }

    pub fn predict(&self, features: &Array2<f64>) -> Result<Array1<f64>> {
        if features.ncols() != self.n_features {
            bail!(
                "Model expects {} features but got {}",
                self.n_features,
                features.ncols()
            );
        }
        let mut prediction = Array1::from_elem(features.nrows(), self.base_score);
        if features.nrows() == 0 || self.trees.is_empty() {
            return Ok(prediction);
        }

        let x = to_dense(features);
        for (i, tree) in self.trees.iter().enumerate() {
            let step = tree
                .predict(&x)
                .map_err(|e| anyhow!("Tree {} failed to predict: {}", i, e))?;
            prediction.scaled_add(self.learning_rate, &Array1::from(step));
        }
        Ok(prediction)
    }

    /// R² of the model on `data`.
    pub fn score(&self, data: &TransformedSet) -> Result<f64> {
        let prediction = self.predict(&data.features)?;
        Ok(r2_score(&data.labels, &prediction))
    }
}
