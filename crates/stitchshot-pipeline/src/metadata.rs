//! Immutable image metadata snapshots and the reader capability.
//!
//! Metadata is read once per file into a [`MetadataSnapshot`], a plain
//! tag-name to value map. Snapshots are never edited in place:
//! [`MetadataSnapshot::with_tag`] returns a modified copy.
//!
//! Where the snapshot comes from is behind the [`MetadataReader`] trait so
//! the pairing logic can run against fake metadata in tests. The EXIF
//! implementation lives in `stitchshot-batch`.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Tag values read from one image.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataSnapshot(BTreeMap<String, String>);

impl MetadataSnapshot {
    /// Value of a tag, if present.
    #[must_use]
    pub fn get(&self, tag: &str) -> Option<&str> {
        self.0.get(tag).map(String::as_str)
    }

    /// A copy of this snapshot with `tag` set to `value`.
    #[must_use]
    pub fn with_tag(&self, tag: impl Into<String>, value: impl Into<String>) -> Self {
        let mut tags = self.0.clone();
        tags.insert(tag.into(), value.into());
        Self(tags)
    }

    /// Number of tags.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if no tags were read.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MetadataSnapshot {
    /// Later duplicates of a tag are ignored.
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut tags = BTreeMap::new();
        for (tag, value) in iter {
            tags.entry(tag.into()).or_insert_with(|| value.into());
        }
        Self(tags)
    }
}

/// Source of per-file metadata.
///
/// Implementations return `None` when the file has no readable metadata.
/// That is not an error: the image is simply unpairable.
pub trait MetadataReader {
    /// Read the metadata of the file at `path`.
    fn read(&self, path: &Path) -> Option<MetadataSnapshot>;
}

impl<R: MetadataReader + ?Sized> MetadataReader for &R {
    fn read(&self, path: &Path) -> Option<MetadataSnapshot> {
        (**self).read(path)
    }
}
