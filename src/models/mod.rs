pub mod dataset;
pub mod story;
pub mod window;

pub use dataset::{impute_missing_labels, LabeledTitles, PredictionVector, Split, TransformedSet};
pub use story::{RawItem, StoryCorpus, StoryRecord, STORY_KIND};
pub use window::{IdWindow, WindowOffsets};

use sha2::{Digest, Sha256};

/// Content hash used as an asset data version. Identical inputs give
/// identical versions, which lets the executor skip staleness propagation.
pub(crate) fn data_version<'a, I>(parts: I) -> String
where
    I: IntoIterator<Item = &'a [u8]>,
{
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update((part.len() as u64).to_le_bytes());
        hasher.update(part);
    }
    hex::encode(hasher.finalize())
}
