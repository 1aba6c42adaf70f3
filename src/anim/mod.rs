//! Animation data: channel trees shared read-only across characters

pub mod channel;
pub mod matrix_table;
pub mod scalar_table;
pub mod bundle;
pub mod preload;

pub use channel::{AnimChannel, ChannelValue, DynamicChannel, DynamicValue, FixedChannel, ValueKind};
pub use matrix_table::{MatrixTable, MATRIX_COMPONENTS};
pub use scalar_table::ScalarTable;
pub use bundle::{AnimBundle, AnimIndex, AnimNode};
pub use preload::{AnimPreloadTable, AnimRecord};
