//! Skeletons: part trees, moving parts and the bundle that blends them

pub mod blend;
pub mod cycler;
pub mod subset;
pub mod moving_part;
pub mod tree;
pub mod bundle;

pub use blend::{blend_values, BlendType, Contribution};
pub use cycler::{CycleGuard, CycleWriter, Cycler};
pub use subset::PartSubset;
pub use moving_part::{EffectiveChannel, MovingPart};
pub use tree::{PartIndex, PartNode, PartTree};
pub use bundle::{BundleStage, JointPose, PartBundle, Pose};
