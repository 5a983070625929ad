// src/models/story.rs
use serde::{Deserialize, Serialize};

use super::dataset::LabeledTitles;
use super::window::IdWindow;

pub const STORY_KIND: &str = "story";

/// An item as returned by `item/{id}.json`. Every field is optional on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawItem {
    pub id: Option<u64>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub title: Option<String>,
    pub descendants: Option<i64>,
    pub by: Option<String>,
    pub time: Option<i64>,
    pub score: Option<i64>,
    pub url: Option<String>,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub dead: bool,
}

/// Typed view of an item. `title` and `descendants` stay optional until the
/// explicit filtering and imputation steps deal with them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoryRecord {
    pub id: u64,
    pub kind: String,
    pub title: Option<String>,
    /// Comment count; absent on stories the API never counted.
    pub descendants: Option<u32>,
}

impl StoryRecord {
    /// Items without an id cannot be placed in a window and are dropped.
    pub fn from_raw(raw: RawItem) -> Option<Self> {
        let id = raw.id?;
        Some(Self {
            id,
            kind: raw.kind.unwrap_or_default(),
            title: raw.title,
            descendants: raw.descendants.and_then(|d| u32::try_from(d).ok()),
        })
    }

    pub fn is_valid_story(&self) -> bool {
        self.kind == STORY_KIND && self.title.is_some()
    }
}

/// Filtered stories from one fetch window, ordered by item id.
#[derive(Debug, Clone)]
pub struct StoryCorpus {
    pub window: IdWindow,
    pub max_item_id: u64,
    pub stories: Vec<StoryRecord>,
}

impl StoryCorpus {
    pub fn len(&self) -> usize {
        self.stories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stories.is_empty()
    }

    /// Title/label columns for the model. Records without a title are skipped,
    /// which only matters if the corpus was built without filtering.
    pub fn labeled_titles(&self) -> LabeledTitles {
        let mut labeled = LabeledTitles::default();
        for story in &self.stories {
            if let Some(title) = &story.title {
                labeled.ids.push(story.id);
                labeled.titles.push(title.clone());
                labeled.labels.push(story.descendants);
            }
        }
        labeled
    }

    pub fn data_version(&self) -> String {
        self.labeled_titles().data_version()
    }
}
