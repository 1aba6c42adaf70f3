//! Skeleton arena: groups, joints and sliders under one root

use std::collections::BTreeSet;
use std::fmt;

use glam::Mat4;

use super::moving_part::MovingPart;
use crate::anim::ValueKind;
use crate::core::Error;

/// Index of a node in a [`PartTree`] arena
pub type PartIndex = usize;

/// A node of the skeleton: a plain group, or a group carrying a moving part
#[derive(Clone, Debug)]
pub struct PartNode {
    name: String,
    parent: Option<PartIndex>,
    /// Kept sorted by child name
    children: Vec<PartIndex>,
    part: Option<MovingPart>,
    /// Preorder position among moving parts
    joint_index: Option<usize>,
}

impl PartNode {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<PartIndex> {
        self.parent
    }

    pub fn children(&self) -> &[PartIndex] {
        &self.children
    }

    pub fn part(&self) -> Option<&MovingPart> {
        self.part.as_ref()
    }

    pub(crate) fn part_mut(&mut self) -> Option<&mut MovingPart> {
        self.part.as_mut()
    }

    /// Index of this joint in bound-joint bit arrays
    pub fn joint_index(&self) -> Option<usize> {
        self.joint_index
    }

    /// Value type of the moving part, `None` for plain groups
    pub fn value_kind(&self) -> Option<ValueKind> {
        self.part.as_ref().map(|p| p.kind())
    }
}

/// The mutable skeleton of one character. Node 0 is the root.
#[derive(Clone, Debug)]
pub struct PartTree {
    nodes: Vec<PartNode>,
    /// Node index of each moving part, by joint index
    joints: Vec<PartIndex>,
    /// Channel slots owned by bound controls, whether or not any joint
    /// carries a channel there
    claimed_slots: BTreeSet<usize>,
}

impl PartTree {
    /// Root node index
    pub const ROOT: PartIndex = 0;

    pub fn new(name: impl Into<String>) -> Self {
        Self {
            nodes: vec![PartNode {
                name: name.into(),
                parent: None,
                children: Vec::new(),
                part: None,
                joint_index: None,
            }],
            joints: Vec::new(),
            claimed_slots: BTreeSet::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.nodes[Self::ROOT].name
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    pub fn node(&self, index: PartIndex) -> Option<&PartNode> {
        self.nodes.get(index)
    }

    pub(crate) fn node_mut(&mut self, index: PartIndex) -> Option<&mut PartNode> {
        self.nodes.get_mut(index)
    }

    pub fn children(&self, index: PartIndex) -> &[PartIndex] {
        self.nodes.get(index).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    /// Number of moving parts
    pub fn num_joints(&self) -> usize {
        self.joints.len()
    }

    /// Node index of the moving part with this joint index
    pub fn joint_node(&self, joint_index: usize) -> Option<PartIndex> {
        self.joints.get(joint_index).copied()
    }

    pub fn add_group(&mut self, parent: PartIndex, name: impl Into<String>) -> Result<PartIndex, Error> {
        self.insert(parent, name.into(), None)
    }

    /// Add a matrix joint with its rest transform
    pub fn add_joint(
        &mut self,
        parent: PartIndex,
        name: impl Into<String>,
        default_value: Mat4,
    ) -> Result<PartIndex, Error> {
        self.insert(parent, name.into(), Some(MovingPart::joint(default_value)))
    }

    /// Add a scalar slider
    pub fn add_slider(
        &mut self,
        parent: PartIndex,
        name: impl Into<String>,
        default_value: f32,
    ) -> Result<PartIndex, Error> {
        self.insert(parent, name.into(), Some(MovingPart::slider(default_value)))
    }

    fn insert(
        &mut self,
        parent: PartIndex,
        name: String,
        part: Option<MovingPart>,
    ) -> Result<PartIndex, Error> {
        if parent >= self.nodes.len() {
            return Err(Error::InvalidParent(parent));
        }
        let siblings = &self.nodes[parent].children;
        let pos = match siblings.binary_search_by(|&c| self.nodes[c].name.as_str().cmp(&name)) {
            Ok(_) => return Err(Error::DuplicateName(name)),
            Err(pos) => pos,
        };

        let index = self.nodes.len();
        self.nodes.push(PartNode {
            name,
            parent: Some(parent),
            children: Vec::new(),
            part,
            joint_index: None,
        });
        self.nodes[parent].children.insert(pos, index);
        self.renumber_joints();
        Ok(index)
    }

    fn renumber_joints(&mut self) {
        let order: Vec<PartIndex> = self.preorder().collect();
        self.joints.clear();
        for index in order {
            if self.nodes[index].part.is_some() {
                self.nodes[index].joint_index = Some(self.joints.len());
                self.joints.push(index);
            }
        }
    }

    /// Find a descendant by name (preorder, root included)
    pub fn find_child(&self, name: &str) -> Option<PartIndex> {
        self.preorder().find(|&i| self.nodes[i].name == name)
    }

    /// Node indices in preorder, children in name order
    pub fn preorder(&self) -> impl Iterator<Item = PartIndex> + '_ {
        let mut stack = vec![Self::ROOT];
        std::iter::from_fn(move || {
            let index = stack.pop()?;
            stack.extend(self.nodes[index].children.iter().rev());
            Some(index)
        })
    }

    /// Moving parts in joint-index order
    pub fn parts(&self) -> impl Iterator<Item = (PartIndex, &MovingPart)> + '_ {
        self.joints
            .iter()
            .filter_map(|&i| self.nodes[i].part.as_ref().map(|p| (i, p)))
    }

    pub(crate) fn parts_mut(&mut self) -> impl Iterator<Item = &mut MovingPart> + '_ {
        self.nodes.iter_mut().filter_map(|n| n.part.as_mut())
    }

    /// Same skeleton and defaults, with no channel bindings or overrides
    pub fn unbound_copy(&self) -> Self {
        let nodes = self
            .nodes
            .iter()
            .map(|n| PartNode {
                part: n.part.as_ref().map(MovingPart::unbound_copy),
                ..n.clone()
            })
            .collect();
        Self {
            nodes,
            joints: self.joints.clone(),
            claimed_slots: BTreeSet::new(),
        }
    }

    pub fn is_slot_claimed(&self, slot: usize) -> bool {
        self.claimed_slots.contains(&slot)
    }

    pub(crate) fn claim_slot(&mut self, slot: usize) {
        let fresh = self.claimed_slots.insert(slot);
        debug_assert!(fresh, "channel slot {slot} claimed twice");
    }

    /// Give up a slot and vacate it in every moving part
    pub(crate) fn release_slot(&mut self, slot: usize) {
        self.claimed_slots.remove(&slot);
        for part in self.parts_mut() {
            part.unbind_slot(slot);
        }
    }

    fn write_node(&self, f: &mut fmt::Formatter<'_>, index: PartIndex, indent: usize) -> fmt::Result {
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

impl fmt::Display for PartTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "PartBundle {}", self.name())?;
        for &child in &self.nodes[Self::ROOT].children {
            self.write_node(f, child, 2)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_joint_indices_are_preorder_over_parts() {
        let mut tree = PartTree::new("actor");
        let skel = tree.add_group(PartTree::ROOT, "<skeleton>").unwrap();
        let spine = tree.add_joint(skel, "spine", Mat4::IDENTITY).unwrap();
        tree.add_joint(spine, "head", Mat4::IDENTITY).unwrap();
        let hips = tree.add_joint(skel, "hips", Mat4::IDENTITY).unwrap();
        tree.add_slider(PartTree::ROOT, "blink", 0.0).unwrap();

        // root, <skeleton>, hips, spine, head, blink
        let names: Vec<&str> = tree
            .parts()
            .map(|(i, _)| tree.node(i).unwrap().name())
            .collect();
        assert_eq!(names, vec!["hips", "spine", "head", "blink"]);
        assert_eq!(tree.node(hips).unwrap().joint_index(), Some(0));
        assert_eq!(tree.node(skel).unwrap().joint_index(), None);
        assert_eq!(tree.num_joints(), 4);
        assert_eq!(tree.joint_node(1), Some(spine));
    }

    #[test]
    fn test_duplicates_rejected() {
        let mut tree = PartTree::new("actor");
        tree.add_joint(PartTree::ROOT, "a", Mat4::IDENTITY).unwrap();
        assert!(matches!(
            tree.add_slider(PartTree::ROOT, "a", 0.0),
            Err(Error::DuplicateName(_))
        ));
        assert!(matches!(tree.add_group(9, "b"), Err(Error::InvalidParent(9))));
    }

    #[test]
    fn test_unbound_copy_keeps_structure() {
        let mut tree = PartTree::new("actor");
        let j = tree.add_joint(PartTree::ROOT, "a", Mat4::IDENTITY).unwrap();
        tree.node_mut(j)
            .unwrap()
            .part_mut()
            .unwrap()
            .bind_slot(0, std::sync::Arc::new(crate::anim::FixedChannel::matrix(Mat4::ZERO)));

        let copy = tree.unbound_copy();
        assert_eq!(copy.find_child("a"), Some(j));
        assert_eq!(copy.node(j).unwrap().part().unwrap().num_slots(), 0);
        assert!(copy.to_string().contains("matrix a"));
    }
}
