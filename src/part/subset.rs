//! Include/exclude joint filters for partial binds

use std::fmt;

use crate::core::GlobPattern;

/// Restricts a bind to part of the skeleton.
///
/// Walking down the tree, a node matching an include pattern turns binding
/// on for itself and its descendants; a node matching an exclude pattern
/// turns it off. The deepest match wins. With no include patterns the walk
/// starts out included.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PartSubset {
    include_joints: Vec<GlobPattern>,
    exclude_joints: Vec<GlobPattern>,
}

impl PartSubset {
    /// An empty subset: bind everything
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a joint name pattern to include
    pub fn add_include_joint(&mut self, name: impl Into<GlobPattern>) {
        self.include_joints.push(name.into());
    }

    /// Add a joint name pattern to exclude
    pub fn add_exclude_joint(&mut self, name: impl Into<GlobPattern>) {
        self.exclude_joints.push(name.into());
    }

    /// Builder form of [`add_include_joint`](Self::add_include_joint)
    pub fn include(mut self, name: impl Into<GlobPattern>) -> Self {
        self.add_include_joint(name);
        self
    }

    /// Builder form of [`add_exclude_joint`](Self::add_exclude_joint)
    pub fn exclude(mut self, name: impl Into<GlobPattern>) -> Self {
        self.add_exclude_joint(name);
        self
    }

    /// Append the patterns of another subset
    pub fn append(&mut self, other: &PartSubset) {
        self.include_joints.extend(other.include_joints.iter().cloned());
        self.exclude_joints.extend(other.exclude_joints.iter().cloned());
    }

    pub fn is_include_empty(&self) -> bool {
        self.include_joints.is_empty()
    }

    pub fn matches_include(&self, joint_name: &str) -> bool {
        self.include_joints.iter().any(|p| p.matches(joint_name))
    }

    pub fn matches_exclude(&self, joint_name: &str) -> bool {
        self.exclude_joints.iter().any(|p| p.matches(joint_name))
    }

    /// Inclusion state of a node given its parent's state
    pub fn resolve(&self, joint_name: &str, parent_included: bool) -> bool {
        if self.matches_include(joint_name) {
            true
        } else if self.matches_exclude(joint_name) {
            false
        } else {
            parent_included
        }
    }
}

impl fmt::Display for PartSubset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PartSubset(include: [")?;
        for (i, p) in self.include_joints.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", p.pattern())?;
        }
        write!(f, "], exclude: [")?;
        for (i, p) in self.exclude_joints.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", p.pattern())?;
        }
        write!(f, "])")
    }
}
