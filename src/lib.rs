//! Chanbind - skeletal animation binding and blending
//!
//! Animations ([`AnimBundle`]) are trees of per-frame channels shared
//! between characters. A character's skeleton ([`PartBundle`]) binds an
//! animation into a channel slot on each joint and hands back an
//! [`AnimControl`] to play it. Each update blends every active control's
//! channels into the joint values.

pub mod core;
pub mod math;
pub mod anim;
pub mod part;
pub mod control;
pub mod bind;
pub mod loader;

pub use anim::{AnimBundle, AnimChannel, ChannelValue, MatrixTable, ScalarTable};
pub use bind::{BindError, HierarchyMatchFlags};
pub use control::{AnimControl, AnimControlCollection, BindStatus, PlayMode};
pub use crate::core::{AnimClock, ChanConfig, Error};
pub use loader::{auto_bind, JsonAnimSource, Loader, ModelNode};
pub use part::{BlendType, PartBundle, PartSubset, PartTree};
