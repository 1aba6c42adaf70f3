//! Core engine types and utilities

pub mod error;
pub mod logging;
pub mod clock;
pub mod config;
pub mod bit_array;
pub mod glob;

pub use error::Error;
pub use clock::AnimClock;
pub use config::ChanConfig;
pub use bit_array::BitArray;
pub use glob::GlobPattern;
