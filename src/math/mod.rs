//! Mathematical utilities

pub mod transform;

pub use transform::{compose, decompose, hpr_from_quat, quat_from_hpr, Components};
