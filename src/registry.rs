//! Image registry for auxiliary images.
//!
//! Settings and operators that refer to a second image by path (`-fill
//! pattern.png`, `-tile`, `-remap palette.gif`) load it through this cache so
//! a pipeline that names the same file many times reads it once.
//!
//! ## Cache keys
//!
//! Entries are keyed `cache:<path>`, the path exactly as written on the
//! command line. `-write <path>` evicts `cache:<path>` so a later reference
//! sees the freshly written file instead of the stale copy.
//!
//! The registry belongs to one wand. Two wands never share entries.

use crate::image::Image;
use std::collections::HashMap;

const KEY_PREFIX: &str = "cache:";

fn cache_key(path: &str) -> String {
    format!("{KEY_PREFIX}{path}")
}

#[derive(Debug, Default)]
pub struct ImageRegistry {
    entries: HashMap<String, Image>,
}

impl ImageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached image for `path`, reading it with `read` on a miss.
    ///
    /// Only successful reads are stored; a failed read is retried the next
    /// time the path is used. Multi-frame files cache their first frame.
    pub fn get_or_read<E>(
        &mut self,
        path: &str,
        read: impl FnOnce(&str) -> Result<Vec<Image>, E>,
    ) -> Result<Option<Image>, E> {
        let key = cache_key(path);
        if let Some(image) = self.entries.get(&key) {
            tracing::debug!(%key, "image registry hit");
            return Ok(Some(image.clone()));
        }
        let Some(image) = read(path)?.into_iter().next() else {
            return Ok(None);
        };
        tracing::debug!(%key, "image registry store");
        self.entries.insert(key, image.clone());
        Ok(Some(image))
    }

    /// Drop `cache:<path>`. Returns whether an entry existed.
    pub fn evict(&mut self, path: &str) -> bool {
        self.entries.remove(&cache_key(path)).is_some()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(&cache_key(path))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
