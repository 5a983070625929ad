// src/fetch/stories.rs
use anyhow::{Context, Result};
use futures::stream::{self, StreamExt, TryStreamExt};
use log::{debug, info};

use super::ItemSource;
use crate::models::{IdWindow, RawItem, StoryCorpus, StoryRecord, WindowOffsets};
use crate::utils::progress_config::ProgressConfig;

/// Fetches every id in `window` with at most `concurrency` requests in flight.
/// Results keep window order. The first failed request aborts the window and
/// its error (with the item id attached) is returned.
pub async fn fetch_window<S: ItemSource + ?Sized>(
    source: &S,
    window: IdWindow,
    concurrency: usize,
    progress: &ProgressConfig,
) -> Result<Vec<Option<RawItem>>> {
    let pb = progress.create_progress_bar(window.len() as u64, &format!("Fetching {}", window));

    let items = stream::iter(window.ids())
        .map(|id| {
            let pb = pb.clone();
            async move {
                let item = source
                    .fetch_item(id)
                    .await
                    .with_context(|| format!("Failed to fetch item {}", id));
                pb.inc(1);
                item
            }
        })
        .buffered(concurrency.max(1))
        .try_collect::<Vec<_>>()
        .await;

    match items {
        Ok(items) => {
            pb.finish_with_message(format!("Fetched {} items", items.len()));
            Ok(items)
        }
        Err(e) => {
            pb.abandon_with_message("Fetch aborted");
            Err(e)
        }
    }
}

/// Converts raw API answers into records. `null` answers and items without
/// an id are dropped here.
pub fn records_from_items(items: Vec<Option<RawItem>>) -> Vec<StoryRecord> {
    items
        .into_iter()
        .flatten()
        .filter_map(StoryRecord::from_raw)
        .collect()
}

/// Keeps only `story` records that carry a title. Empty input yields empty output.
pub fn filter_stories(records: Vec<StoryRecord>) -> Vec<StoryRecord> {
    records.into_iter().filter(StoryRecord::is_valid_story).collect()
}

/// Resolves `offsets` against the current max id, fetches the window and
/// filters it down to titled stories.
pub async fn fetch_stories<S: ItemSource + ?Sized>(
    source: &S,
    offsets: WindowOffsets,
    concurrency: usize,
    progress: &ProgressConfig,
) -> Result<StoryCorpus> {
    let max_item_id = source
        .max_item_id()
        .await
        .context("Failed to fetch the current max item id")?;
    let window = offsets.resolve(max_item_id);
    info!(
        "Fetching {} items in window {} (max item id {}, concurrency {})",
        window.len(),
        window,
        max_item_id,
        concurrency
    );

    let items = fetch_window(source, window, concurrency, progress).await?;
    let records = records_from_items(items);
    let fetched = records.len();
    let stories = filter_stories(records);
    debug!(
        "Window {}: {} records, {} valid stories",
        window,
        fetched,
        stories.len()
    );
    info!("Collected {} stories from window {}", stories.len(), window);

    Ok(StoryCorpus {
        window,
        max_item_id,
        stories,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::test_support::{comment, story, synthetic_window, InMemorySource};

    #[tokio::test]
    async fn test_synthetic_window_filters_to_titled_stories() {
        let source = synthetic_window(1_000);
        let corpus = fetch_stories(
            &source,
            WindowOffsets::new(10, 0),
            4,
            &ProgressConfig::disabled(),
        )
        .await
        .unwrap();

        assert_eq!(source.request_count(), 10);
        assert_eq!(corpus.len(), 8);
        assert!(corpus.stories.iter().all(StoryRecord::is_valid_story));
        assert_eq!(corpus.window, IdWindow { start: 990, end: 1_000 });
        // order follows item ids
        let ids: Vec<u64> = corpus.stories.iter().map(|s| s.id).collect();
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        assert_eq!(ids, sorted);
    }

    #[test]
    fn test_filter_never_grows_input() {
        let items = vec![
            Some(story(1, Some("kept"), Some(2))),
            Some(comment(2)),
            None,
            Some(story(4, None, Some(1))),
            Some(RawItem {
                id: None,
                kind: Some("story".to_string()),
                title: Some("no id".to_string()),
                ..RawItem::default()
            }),
        ];
        let records = records_from_items(items);
        let input_len = records.len();
        let stories = filter_stories(records);

        assert!(stories.len() <= input_len);
        assert_eq!(stories.len(), 1);
        assert_eq!(stories[0].title.as_deref(), Some("kept"));
    }

    #[test]
    fn test_filter_tolerates_empty_input() {
        assert!(filter_stories(Vec::new()).is_empty());
        assert!(records_from_items(Vec::new()).is_empty());
    }

    #[tokio::test]
    async fn test_window_with_only_nulls_yields_empty_corpus() {
        let source = InMemorySource::new(500, Vec::new());
        let corpus = fetch_stories(
            &source,
            WindowOffsets::new(20, 0),
            2,
            &ProgressConfig::disabled(),
        )
        .await
        .unwrap();
        assert!(corpus.is_empty());
        assert!(corpus.labeled_titles().is_empty());
    }

    #[tokio::test]
    async fn test_single_failure_aborts_window() {
        let source = synthetic_window(1_000).failing_on(995);
        let err = fetch_stories(
            &source,
            WindowOffsets::new(10, 0),
            1,
            &ProgressConfig::disabled(),
        )
        .await
        .unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to fetch item 995"));
    }
}
