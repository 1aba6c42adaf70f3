//! Model loading, async binds and auto-binding

pub mod model;
pub mod source;
#[allow(clippy::module_inception)]
pub mod loader;
pub mod auto_bind;

pub use model::{ModelContent, ModelNode};
pub use source::{AnimFile, AnimNodeDesc, AnimSource, JsonAnimSource};
pub use loader::Loader;
pub use auto_bind::auto_bind;
