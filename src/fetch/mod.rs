// src/fetch/mod.rs
pub mod client;
pub mod stories;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::RawItem;

pub use client::HackerNewsClient;
pub use stories::{fetch_stories, fetch_window, filter_stories, records_from_items};

/// Read-only source of Hacker News items.
#[async_trait]
pub trait ItemSource: Send + Sync {
    /// Current largest item id.
    async fn max_item_id(&self) -> Result<u64>;

    /// One item; `Ok(None)` when the API answers `null` for the id.
    async fn fetch_item(&self, id: u64) -> Result<Option<RawItem>>;
}
