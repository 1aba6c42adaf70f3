//! Scalar slider channel backed by a frame table

use super::channel::{check_table_len, table_has_changed, table_value, AnimChannel, ChannelValue, ValueKind};
use crate::core::Error;

/// A scalar channel with 0 (zero), 1 (constant) or N (per-frame) entries
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScalarTable {
    table: Vec<f32>,
}

impl ScalarTable {
    pub fn new(table: Vec<f32>) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &[f32] {
        &self.table
    }

    pub fn set_table(&mut self, table: Vec<f32>) {
        self.table = table;
    }
}

impl AnimChannel for ScalarTable {
    fn kind(&self) -> ValueKind {
        ValueKind::Scalar
    }

    fn value(&self, frame: usize) -> ChannelValue {
        ChannelValue::Scalar(table_value(&self.table, frame, 0.0))
    }

    fn has_changed(&self, last_frame: usize, last_frac: f64, this_frame: usize, this_frac: f64) -> bool {
        table_has_changed(&self.table, last_frame, last_frac, this_frame, this_frac)
    }

    fn check_frame_count(&self, num_frames: usize) -> Result<(), Error> {
        check_table_len("scalar", self.table.len(), num_frames)
    }
}
