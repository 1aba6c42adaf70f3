//! Animation tree: an arena of groups and channels rooted at an AnimBundle

use std::fmt;
use std::sync::Arc;

use super::channel::{AnimChannel, ValueKind};
use crate::core::Error;

/// Index of a node in an [`AnimBundle`] arena
pub type AnimIndex = usize;

/// A node of the animation tree: a plain group, or a group carrying a channel
pub struct AnimNode {
    name: String,
    parent: Option<AnimIndex>,
    /// Kept sorted by child name
    children: Vec<AnimIndex>,
    channel: Option<Arc<dyn AnimChannel>>,
}

impl AnimNode {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<AnimIndex> {
        self.parent
    }

    pub fn children(&self) -> &[AnimIndex] {
        &self.children
    }

    pub fn channel(&self) -> Option<&Arc<dyn AnimChannel>> {
        self.channel.as_ref()
    }

    /// Value type of the channel, `None` for plain groups
    pub fn value_kind(&self) -> Option<ValueKind> {
        self.channel.as_ref().map(|c| c.kind())
    }
}

impl fmt::Debug for AnimNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnimNode")
            .field("name", &self.name)
            .field("parent", &self.parent)
            .field("children", &self.children)
            .field("kind", &self.value_kind())
            .finish()
    }
}

/// Root of an animation tree.
///
/// Holds the frame rate and frame count shared by every channel beneath it.
/// Built once, then shared read-only (`Arc<AnimBundle>`) by every character
/// it is bound to. Node 0 is the bundle itself.
#[derive(Debug)]
pub struct AnimBundle {
    nodes: Vec<AnimNode>,
    base_frame_rate: f64,
    num_frames: usize,
}

impl AnimBundle {
    /// Root node index
    pub const ROOT: AnimIndex = 0;

    /// Create an empty bundle
    pub fn new(name: impl Into<String>, base_frame_rate: f64, num_frames: usize) -> Self {
        Self {
            nodes: vec![AnimNode {
                name: name.into(),
                parent: None,
                children: Vec::new(),
                channel: None,
            }],
            base_frame_rate,
            num_frames,
        }
    }

    pub fn name(&self) -> &str {
        &self.nodes[Self::ROOT].name
    }

    pub fn base_frame_rate(&self) -> f64 {
        self.base_frame_rate
    }

    pub fn num_frames(&self) -> usize {
        self.num_frames
    }

    /// Number of nodes including the root
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    /// Get a node by index
    pub fn node(&self, index: AnimIndex) -> Option<&AnimNode> {
        self.nodes.get(index)
    }

    /// Children of a node, sorted by name
    pub fn children(&self, index: AnimIndex) -> &[AnimIndex] {
        self.nodes.get(index).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    /// Add a plain group under `parent`
    pub fn add_group(&mut self, parent: AnimIndex, name: impl Into<String>) -> Result<AnimIndex, Error> {
        self.insert(parent, name.into(), None)
    }

    /// Add a channel under `parent`.
    ///
    /// Every table in the channel must hold 0, 1 or exactly
    /// [`num_frames`](Self::num_frames) entries.
    pub fn add_channel<C: AnimChannel + 'static>(
        &mut self,
        parent: AnimIndex,
        name: impl Into<String>,
        channel: C,
    ) -> Result<AnimIndex, Error> {
        self.add_shared_channel(parent, name, Arc::new(channel))
    }

    /// Add an already shared channel under `parent`
    pub fn add_shared_channel(
        &mut self,
        parent: AnimIndex,
        name: impl Into<String>,
        channel: Arc<dyn AnimChannel>,
    ) -> Result<AnimIndex, Error> {
        let name = name.into();
        channel.check_frame_count(self.num_frames).map_err(|e| match e {
            Error::FrameCount { len, expected, channel: component } => Error::FrameCount {
                channel: format!("{name}.{component}"),
                len,
                expected,
            },
            other => other,
        })?;
        self.insert(parent, name, Some(channel))
    }

    fn insert(
        &mut self,
        parent: AnimIndex,
        name: String,
        channel: Option<Arc<dyn AnimChannel>>,
    ) -> Result<AnimIndex, Error> {
        if parent >= self.nodes.len() {
            return Err(Error::InvalidParent(parent));
        }
        let siblings = &self.nodes[parent].children;
        let pos = match siblings.binary_search_by(|&c| self.nodes[c].name.as_str().cmp(&name)) {
            Ok(_) => return Err(Error::DuplicateName(name)),
            Err(pos) => pos,
        };

        let index = self.nodes.len();
        self.nodes.push(AnimNode {
            name,
            parent: Some(parent),
            children: Vec::new(),
            channel,
        });
        self.nodes[parent].children.insert(pos, index);
        Ok(index)
    }

    /// Find a descendant by name (preorder, root included)
    pub fn find_child(&self, name: &str) -> Option<AnimIndex> {
        self.preorder().find(|&i| self.nodes[i].name == name)
    }

    /// Node indices in preorder, children in name order
    pub fn preorder(&self) -> impl Iterator<Item = AnimIndex> + '_ {
        let mut stack = vec![Self::ROOT];
        std::iter::from_fn(move || {
            let index = stack.pop()?;
            stack.extend(self.nodes[index].children.iter().rev());
            Some(index)
        })
    }

    fn write_node(&self, f: &mut fmt::Formatter<'_>, index: AnimIndex, indent: usize) -> fmt::Result {
        let node = &self.nodes[index];
        match node.value_kind() {
            Some(kind) => writeln!(f, "{:indent$}{} {}", "", kind, node.name)?,
            None => writeln!(f, "{:indent$}group {}", "", node.name)?,
        }
        for &child in &node.children {
            self.write_node(f, child, indent + 2)?;
        }
        Ok(())
    }
}

impl fmt::Display for AnimBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "AnimBundle {} ({} frames at {} fps)",
            self.name(),
            self.num_frames,
            self.base_frame_rate
        )?;
        for &child in &self.nodes[Self::ROOT].children {
            self.write_node(f, child, 2)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anim::{FixedChannel, MatrixTable, ScalarTable};

    #[test]
    fn test_children_stay_sorted() {
        let mut bundle = AnimBundle::new("actor", 24.0, 10);
        let skel = bundle.add_group(AnimBundle::ROOT, "<skeleton>").unwrap();
        bundle.add_channel(skel, "spine", MatrixTable::new()).unwrap();
        bundle.add_channel(skel, "hips", MatrixTable::new()).unwrap();
        bundle.add_channel(skel, "neck", MatrixTable::new()).unwrap();

        let names: Vec<&str> = bundle
            .children(skel)
            .iter()
            .map(|&c| bundle.node(c).unwrap().name())
            .collect();
        assert_eq!(names, vec!["hips", "neck", "spine"]);
    }

    #[test]
    fn test_duplicate_and_invalid_parent() {
        let mut bundle = AnimBundle::new("actor", 24.0, 10);
        bundle.add_group(AnimBundle::ROOT, "a").unwrap();
        assert!(matches!(
            bundle.add_group(AnimBundle::ROOT, "a"),
            Err(Error::DuplicateName(_))
        ));
        assert!(matches!(
            bundle.add_group(42, "b"),
            Err(Error::InvalidParent(42))
        ));
    }

    #[test]
    fn test_frame_count_enforced_on_add() {
        let mut bundle = AnimBundle::new("actor", 24.0, 10);
        let err = bundle
            .add_channel(AnimBundle::ROOT, "blink", ScalarTable::new(vec![0.0; 7]))
            .unwrap_err();
        assert!(matches!(err, Error::FrameCount { len: 7, expected: 10, .. }));
        assert!(bundle
            .add_channel(AnimBundle::ROOT, "blink", ScalarTable::new(vec![0.0; 10]))
            .is_ok());
        assert!(bundle
            .add_channel(AnimBundle::ROOT, "smile", ScalarTable::new(vec![0.5]))
            .is_ok());
    }

    #[test]
    fn test_find_child_and_kind() {
        let mut bundle = AnimBundle::new("actor", 24.0, 1);
        let g = bundle.add_group(AnimBundle::ROOT, "morphs").unwrap();
        let s = bundle.add_channel(g, "smile", FixedChannel::scalar(1.0)).unwrap();
        assert_eq!(bundle.find_child("smile"), Some(s));
        assert_eq!(bundle.node(s).unwrap().value_kind(), Some(ValueKind::Scalar));
        assert_eq!(bundle.node(g).unwrap().value_kind(), None);
        assert_eq!(bundle.find_child("missing"), None);
        assert!(bundle.to_string().contains("scalar smile"));
    }
}
