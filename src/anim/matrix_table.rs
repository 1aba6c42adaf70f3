//! Transform channel stored as twelve per-component tables

use glam::{Mat4, Vec3};

use super::channel::{check_table_len, table_has_changed, table_value, AnimChannel, ChannelValue, ValueKind};
use crate::core::Error;
use crate::math::{hpr_from_quat, Components};

/// Component letters in table order: scale `ijk`, shear `abc`,
/// heading/pitch/roll `hpr` (degrees), translation `xyz`.
pub const MATRIX_COMPONENTS: [char; 12] = ['i', 'j', 'k', 'a', 'b', 'c', 'h', 'p', 'r', 'x', 'y', 'z'];

const DEFAULTS: [f32; 12] = [1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0];

/// Index of a component letter
pub fn component_index(letter: char) -> Option<usize> {
    MATRIX_COMPONENTS.iter().position(|&c| c == letter)
}

/// A matrix channel whose components each have their own table.
///
/// Each table may hold 0 entries (component default), 1 entry (constant), or
/// one entry per frame of the owning bundle.
#[derive(Clone, Debug, Default)]
pub struct MatrixTable {
    tables: [Vec<f32>; 12],
}

impl MatrixTable {
    /// All tables empty: the identity transform
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from one matrix per frame. Components that never vary are
    /// stored as a single entry, and those equal to their default as none.
    pub fn from_matrices(frames: &[Mat4]) -> Self {
        let components: Vec<Components> = frames.iter().map(Components::from_matrix).collect();
        Self::from_components(&components)
    }

    /// Build from one component set per frame
    pub fn from_components(frames: &[Components]) -> Self {
        let mut table = Self::new();
        for (i, slot) in table.tables.iter_mut().enumerate() {
            let values: Vec<f32> = frames.iter().map(|c| component_of(c, i)).collect();
            *slot = compact(values, DEFAULTS[i]);
        }
        table
    }

    /// Replace one component table
    pub fn set_table(&mut self, letter: char, values: Vec<f32>) -> Result<(), Error> {
        let index = component_index(letter).ok_or_else(|| {
            Error::Runtime(format!("unknown matrix component '{letter}'"))
        })?;
        self.tables[index] = values;
        Ok(())
    }

    /// Builder form of [`set_table`](Self::set_table)
    pub fn with_table(mut self, letter: char, values: Vec<f32>) -> Result<Self, Error> {
        self.set_table(letter, values)?;
        Ok(self)
    }

    /// One component table
    pub fn table(&self, letter: char) -> Option<&[f32]> {
        component_index(letter).map(|i| self.tables[i].as_slice())
    }

    /// Longest table length
    pub fn num_frames(&self) -> usize {
        self.tables.iter().map(Vec::len).max().unwrap_or(0)
    }

    fn component(&self, index: usize, frame: usize) -> f32 {
        table_value(&self.tables[index], frame, DEFAULTS[index])
    }

    fn vec3(&self, first: usize, frame: usize) -> Vec3 {
        Vec3::new(
            self.component(first, frame),
            self.component(first + 1, frame),
            self.component(first + 2, frame),
        )
    }
}

fn component_of(c: &Components, index: usize) -> f32 {
    let hpr = hpr_from_quat(c.rotation);
    let all = [
        c.scale.x, c.scale.y, c.scale.z,
        c.shear.x, c.shear.y, c.shear.z,
        hpr.x, hpr.y, hpr.z,
        c.translation.x, c.translation.y, c.translation.z,
    ];
    all[index]
}

fn compact(values: Vec<f32>, default: f32) -> Vec<f32> {
    let Some(&first) = values.first() else {
        return values;
    };
    if values.iter().all(|&v| v == first) {
        if first == default { Vec::new() } else { vec![first] }
    } else {
        values
    }
}

impl AnimChannel for MatrixTable {
    fn kind(&self) -> ValueKind {
        ValueKind::Matrix
    }

    fn value(&self, frame: usize) -> ChannelValue {
        let c = self.components(frame).unwrap_or_default();
        ChannelValue::Matrix(c.to_matrix())
    }

    fn components(&self, frame: usize) -> Option<Components> {
        Some(Components::from_hpr(
            self.vec3(0, frame),
            self.vec3(3, frame),
            self.vec3(6, frame),
            self.vec3(9, frame),
        ))
    }

    fn has_changed(&self, last_frame: usize, last_frac: f64, this_frame: usize, this_frac: f64) -> bool {
        self.tables
            .iter()
            .any(|t| table_has_changed(t, last_frame, last_frac, this_frame, this_frac))
    }

    fn check_frame_count(&self, num_frames: usize) -> Result<(), Error> {
        for (letter, table) in MATRIX_COMPONENTS.iter().zip(&self.tables) {
            check_table_len(&letter.to_string(), table.len(), num_frames)?;
        }
        Ok(())
    }
}
