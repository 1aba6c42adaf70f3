//! Controls: the handles that play bound animations

pub mod interface;
pub mod anim_control;
pub mod collection;

pub use interface::{AnimInterface, PlayMode};
pub use anim_control::{AnimControl, BindStatus, ControlFrame, ControlId, FrameMark, PendingBind};
pub(crate) use anim_control::ControlShared;
pub use collection::AnimControlCollection;
