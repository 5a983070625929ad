// src/utils/progress_config.rs

use indicatif::{ProgressBar, ProgressStyle};
use std::env;

/// Configuration for progress output during window fetches
#[derive(Debug, Clone)]
pub struct ProgressConfig {
    /// Whether to show progress bars at all
    pub enabled: bool,
    /// Whether to show memory usage in the run summary
    pub show_memory: bool,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            show_memory: true,
        }
    }
}

impl ProgressConfig {
    /// Create progress configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            enabled: env::var("PROGRESS_ENABLED")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
            show_memory: env::var("PROGRESS_SHOW_MEMORY")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
        }
    }

    /// No bars, no memory readout. Used by tests and non-interactive runs.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            show_memory: false,
        }
    }

    /// A bar for `len` steps, hidden when progress is disabled so callers can
    /// call `inc` unconditionally.
    pub fn create_progress_bar(&self, len: u64, message: &str) -> ProgressBar {
        if !self.enabled {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len);
        if let Ok(style) = ProgressStyle::default_bar().template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
        ) {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb.set_message(message.to_string());
        pb
    }

    /// Check if memory usage should be shown
    pub fn should_show_memory(&self) -> bool {
        self.enabled && self.show_memory
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_bar_is_hidden() {
        let config = ProgressConfig::disabled();
        let pb = config.create_progress_bar(10, "noop");
        assert!(pb.is_hidden());
        assert!(!config.should_show_memory());
    }
}
