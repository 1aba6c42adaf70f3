//! Binding animations to skeletons

pub mod hierarchy;
pub mod binder;
pub mod request;

pub use hierarchy::{check_hierarchy, HierarchyMatchFlags};
pub use binder::{bind_hierarchy, find_bound_joints, pick_channel_index, BindError};
pub use request::BindAnimRequest;
