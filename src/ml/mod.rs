// src/ml/mod.rs
pub mod boosting;
pub mod metrics;
pub mod plot;
pub mod splitter;
pub mod vectorizer;

pub use boosting::{BoostingParams, EvalHistory, FittedBoostedModel, GradientBoostedRegressor};
pub use splitter::split_train_test;
pub use vectorizer::{FittedTfidf, TfidfVectorizer};
