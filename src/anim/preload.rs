//! Preload table: frame rate and frame count of animations not yet loaded

use serde::{Deserialize, Serialize};

/// One preloaded animation record
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnimRecord {
    pub basename: String,
    pub base_frame_rate: f64,
    pub num_frames: usize,
}

/// Sorted table of animation basenames with their frame data.
///
/// A part bundle consults this to decide whether an animation can be bound
/// asynchronously, and to set up frame state before the file is loaded.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AnimPreloadTable {
    /// Sorted by basename
    anims: Vec<AnimRecord>,
}

impl AnimPreloadTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.anims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anims.is_empty()
    }

    /// Index of the record with this basename
    pub fn find_anim(&self, basename: &str) -> Option<usize> {
        self.anims
            .binary_search_by(|r| r.basename.as_str().cmp(basename))
            .ok()
    }

    pub fn get(&self, index: usize) -> Option<&AnimRecord> {
        self.anims.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AnimRecord> {
        self.anims.iter()
    }

    /// Add or replace a record
    pub fn add_anim(&mut self, basename: impl Into<String>, base_frame_rate: f64, num_frames: usize) {
        let record = AnimRecord {
            basename: basename.into(),
            base_frame_rate,
            num_frames,
        };
        match self
            .anims
            .binary_search_by(|r| r.basename.cmp(&record.basename))
        {
            Ok(i) => self.anims[i] = record,
            Err(i) => self.anims.insert(i, record),
        }
    }

    /// Remove a record by index
    pub fn remove_anim(&mut self, index: usize) -> Option<AnimRecord> {
        (index < self.anims.len()).then(|| self.anims.remove(index))
    }

    /// Copy every record of `other` into this table
    pub fn add_anims_from(&mut self, other: &AnimPreloadTable) {
        for record in &other.anims {
            self.add_anim(record.basename.clone(), record.base_frame_rate, record.num_frames);
        }
    }
}
