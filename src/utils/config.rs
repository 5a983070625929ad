// src/utils/config.rs
//! Environment-driven configuration for every stage of the flow.
//! Each section reads its own variables with defaults that reproduce the
//! behaviour of an unconfigured run.

use anyhow::{Context, Result};
use log::{info, warn};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

use crate::ml::boosting::BoostingParams;
use crate::ml::vectorizer::TfidfVectorizer;
use crate::models::window::WindowOffsets;
use crate::utils::progress_config::ProgressConfig;

pub const DEFAULT_API_BASE_URL: &str = "https://hacker-news.firebaseio.com/v0/";
pub const DEFAULT_TRAINING_CRON: &str = "0 9 * * *";

fn parsed<T: FromStr>(raw: Option<String>) -> Option<T> {
    raw.and_then(|s| s.trim().parse::<T>().ok())
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    parsed(env::var(key).ok()).unwrap_or(default)
}

fn env_opt<T: FromStr>(key: &str) -> Option<T> {
    parsed(env::var(key).ok())
}

/// Parses the API base URL and makes sure relative joins land under it.
pub fn parse_base_url(raw: &str) -> Result<Url> {
    let normalized = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{}/", raw)
    };
    Url::parse(&normalized).with_context(|| format!("Invalid API base URL '{}'", raw))
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub base_url: Url,
    pub training_window: WindowOffsets,
    pub inference_window: WindowOffsets,
    /// Maximum number of item requests in flight.
    pub concurrency: usize,
    /// None keeps requests unbounded in time.
    pub request_timeout: Option<Duration>,
    /// Zero keeps requests unguarded: the first failure aborts the window.
    pub max_retries: u32,
    pub retry_backoff: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse(DEFAULT_API_BASE_URL).expect("default base URL is valid"),
            training_window: WindowOffsets::TRAINING,
            inference_window: WindowOffsets::INFERENCE,
            concurrency: num_cpus::get(),
            request_timeout: None,
            max_retries: 0,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

impl FetchConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let base_url = match env::var("HN_API_BASE_URL") {
            Ok(raw) => parse_base_url(&raw)?,
            Err(_) => defaults.base_url,
        };

        Ok(Self {
            base_url,
            training_window: WindowOffsets::new(
                env_or("HN_TRAINING_WINDOW_FROM_MAX", WindowOffsets::TRAINING.from_max),
                env_or("HN_TRAINING_WINDOW_TO_MAX", WindowOffsets::TRAINING.to_max),
            ),
            inference_window: WindowOffsets::new(
                env_or("HN_INFERENCE_WINDOW_FROM_MAX", WindowOffsets::INFERENCE.from_max),
                env_or("HN_INFERENCE_WINDOW_TO_MAX", WindowOffsets::INFERENCE.to_max),
            ),
            concurrency: env_or("HN_FETCH_CONCURRENCY", defaults.concurrency).max(1),
            request_timeout: env_opt::<u64>("HN_REQUEST_TIMEOUT_SECS").map(Duration::from_secs),
            max_retries: env_or("HN_FETCH_MAX_RETRIES", 0),
            retry_backoff: Duration::from_millis(env_or("HN_FETCH_RETRY_BACKOFF_MS", 500)),
        })
    }
}

#[derive(Debug, Clone)]
pub struct SplitConfig {
    pub test_fraction: f64,
    /// None draws a fresh split every run.
    pub seed: Option<u64>,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            test_fraction: 0.2,
            seed: None,
        }
    }
}

impl SplitConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Reads `SPLIT_TEST_FRACTION` and `SPLIT_SEED` through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            test_fraction: parsed(lookup("SPLIT_TEST_FRACTION"))
                .unwrap_or(0.2_f64)
                .clamp(0.0, 1.0),
            seed: parsed(lookup("SPLIT_SEED")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    pub training_cron: String,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            training_cron: DEFAULT_TRAINING_CRON.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReportConfig {
    /// Append one JSON line per materialization to this file.
    pub metadata_path: Option<PathBuf>,
}

/// Everything the flow needs, gathered once at startup.
#[derive(Debug, Clone, Default)]
pub struct FlowConfig {
    pub fetch: FetchConfig,
    pub split: SplitConfig,
    pub vectorizer: TfidfVectorizer,
    pub model: BoostingParams,
    pub schedule: ScheduleConfig,
    pub report: ReportConfig,
    pub progress: ProgressConfig,
}

impl FlowConfig {
    pub fn from_env() -> Result<Self> {
        let model_defaults = BoostingParams::default();
        Ok(Self {
            fetch: FetchConfig::from_env().context("Failed to read fetch configuration")?,
            split: SplitConfig::from_env(),
            vectorizer: TfidfVectorizer {
                sublinear_tf: env_or("TFIDF_SUBLINEAR_TF", false),
                ..TfidfVectorizer::default()
            },
            model: BoostingParams {
                n_estimators: env_or("MODEL_N_ESTIMATORS", model_defaults.n_estimators),
                learning_rate: env_or("MODEL_LEARNING_RATE", model_defaults.learning_rate),
                max_depth: env_or("MODEL_MAX_DEPTH", model_defaults.max_depth),
                min_samples_leaf: env_or("MODEL_MIN_SAMPLES_LEAF", model_defaults.min_samples_leaf),
            },
            schedule: ScheduleConfig {
                training_cron: env::var("MODEL_TRAINING_CRON")
                    .unwrap_or_else(|_| DEFAULT_TRAINING_CRON.to_string()),
            },
            report: ReportConfig {
                metadata_path: env::var("METADATA_LOG_PATH").ok().map(PathBuf::from),
            },
            progress: ProgressConfig::from_env(),
        })
    }

    /// Log the current configuration
    pub fn log_config(&self) {
        info!("🌐 API base URL: {}", self.fetch.base_url);
        info!(
            "   Training window: max-{}..max-{}, inference window: max-{}..max-{}",
            self.fetch.training_window.from_max,
            self.fetch.training_window.to_max,
            self.fetch.inference_window.from_max,
            self.fetch.inference_window.to_max
        );
        info!("   Fetch concurrency: {}", self.fetch.concurrency);
        match self.fetch.request_timeout {
            Some(timeout) => info!("   Request timeout: {:?}", timeout),
            None => warn!("   No request timeout configured; a stalled request blocks the run"),
        }
        if self.fetch.max_retries > 0 {
            info!(
                "   Retries: up to {} with {:?} base backoff",
                self.fetch.max_retries, self.fetch.retry_backoff
            );
        }
        match self.split.seed {
            Some(seed) => info!("🎲 Train/test split seeded with {}", seed),
            None => info!("🎲 Train/test split unseeded; splits differ between runs"),
        }
        info!(
            "🌲 Model: {} estimators, learning rate {}, max depth {}",
            self.model.n_estimators, self.model.learning_rate, self.model.max_depth
        );
        info!("⏰ Training schedule: '{}' (UTC)", self.schedule.training_cron);
        if let Some(path) = &self.report.metadata_path {
            info!("📝 Metadata log: {}", path.display());
        }
    }
}

/// Environment variable configuration example
pub fn print_env_config_example() {
    println!("# Hacker News flow configuration");
    println!("export HN_API_BASE_URL={}", DEFAULT_API_BASE_URL);
    println!("export HN_TRAINING_WINDOW_FROM_MAX=1100");
    println!("export HN_TRAINING_WINDOW_TO_MAX=100");
    println!("export HN_INFERENCE_WINDOW_FROM_MAX=100");
    println!("export HN_INFERENCE_WINDOW_TO_MAX=0");
    println!("# Defaults to the number of CPU cores");
    println!("export HN_FETCH_CONCURRENCY={}", num_cpus::get());
    println!("# Unset by default: requests may block indefinitely");
    println!("# export HN_REQUEST_TIMEOUT_SECS=30");
    println!("export HN_FETCH_MAX_RETRIES=0");
    println!("export HN_FETCH_RETRY_BACKOFF_MS=500");
    println!();
    println!("export SPLIT_TEST_FRACTION=0.2");
    println!("# Unset by default: every run draws a new split");
    println!("# export SPLIT_SEED=42");
    println!("export TFIDF_SUBLINEAR_TF=false");
    println!();
    println!("export MODEL_N_ESTIMATORS=20");
    println!("export MODEL_LEARNING_RATE=0.3");
    println!("export MODEL_MAX_DEPTH=6");
    println!("export MODEL_MIN_SAMPLES_LEAF=1");
    println!("export MODEL_TRAINING_CRON=\"{}\"", DEFAULT_TRAINING_CRON);
    println!();
    println!("# export METADATA_LOG_PATH=materializations.jsonl");
    println!("export PROGRESS_ENABLED=true");
    println!("export PROGRESS_SHOW_MEMORY=true");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_base_url_gets_trailing_slash() {
        let url = parse_base_url("http://localhost:8080/v0").unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/v0/");
        assert_eq!(
            url.join("maxitem.json").unwrap().as_str(),
            "http://localhost:8080/v0/maxitem.json"
        );
    }

    #[test]
    fn test_invalid_base_url_is_rejected() {
        assert!(parse_base_url("not a url").is_err());
    }

    #[test]
    fn test_split_config_from_lookup() {
        let vars: HashMap<&str, &str> =
            [("SPLIT_TEST_FRACTION", " 0.25 "), ("SPLIT_SEED", "7")].into_iter().collect();
        let config = SplitConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string()));
        assert_eq!(config.test_fraction, 0.25);
        assert_eq!(config.seed, Some(7));

        let config = SplitConfig::from_lookup(|_| None);
        assert_eq!(config.test_fraction, 0.2);
        assert_eq!(config.seed, None);

        let config = SplitConfig::from_lookup(|key| match key {
            "SPLIT_TEST_FRACTION" => Some("1.5".to_string()),
            _ => Some("not a seed".to_string()),
        });
        assert_eq!(config.test_fraction, 1.0);
        assert_eq!(config.seed, None);
    }

    #[test]
    fn test_fetch_defaults_are_unguarded() {
        let config = FetchConfig::default();
        assert_eq!(config.request_timeout, None);
        assert_eq!(config.max_retries, 0);
        assert_eq!(config.training_window, WindowOffsets::TRAINING);
        assert_eq!(config.inference_window, WindowOffsets::INFERENCE);
        assert!(config.concurrency >= 1);
    }
}
