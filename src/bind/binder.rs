//! Binding an animation tree onto a skeleton at a channel slot

use std::cmp::Ordering;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use super::hierarchy::{check_hierarchy, HierarchyMatchFlags};
use crate::anim::{AnimBundle, AnimIndex};
use crate::control::AnimControl;
use crate::core::{BitArray, Error};
use crate::part::{PartBundle, PartIndex, PartSubset, PartTree};

/// Why a bind was refused. A refused bind leaves the skeleton untouched.
#[derive(Debug, Error)]
pub enum BindError {
    #[error("root name of part ({part}) does not match that of anim ({anim})")]
    RootNameMismatch { part: String, anim: String },

    #[error("hierarchy mismatch: {0}")]
    HierarchyMismatch(String),

    #[error("could not load animation: {0}")]
    Load(#[from] Error),

    #[error("no anim bundle in {0}")]
    NoAnimBundle(PathBuf),
}

/// Lowest channel slot that is vacant in every moving part and not owned
/// by a bound control
pub fn pick_channel_index(parts: &PartTree) -> usize {
    let mut holes = Vec::new();
    let mut next = 0;
    for (_, part) in parts.parts() {
        part.pick_channel_index(&mut holes, &mut next);
    }
    holes
        .into_iter()
        .chain(next..)
        .find(|&slot| !parts.is_slot_claimed(slot))
        .unwrap_or(next)
}

/// Attach the channels of `anim` to `parts` at `slot`, honouring `subset`.
/// Returns the joints bound.
///
/// The slot is claimed even when `subset` selects no joint at all. The
/// caller must have checked the hierarchy first.
pub fn bind_hierarchy(anim: &AnimBundle, parts: &mut PartTree, slot: usize, subset: &PartSubset) -> BitArray {
    parts.claim_slot(slot);
    let mut bound_joints = if subset.is_include_empty() {
        BitArray::all_on()
    } else {
        BitArray::new()
    };
    bind_node(
        anim,
        Some(AnimBundle::ROOT),
        parts,
        PartTree::ROOT,
        slot,
        subset,
        subset.is_include_empty(),
        &mut bound_joints,
    );
    bound_joints
}

#[allow(clippy::too_many_arguments)]
fn bind_node(
    anim: &AnimBundle,
    anim_index: Option<AnimIndex>,
    parts: &mut PartTree,
    part_index: PartIndex,
    slot: usize,
    subset: &PartSubset,
    parent_included: bool,
    bound_joints: &mut BitArray,
) {
    let Some(node) = parts.node_mut(part_index) else {
        return;
    };
    let included = subset.resolve(node.name(), parent_included);
    let joint_index = node.joint_index();

    if let (Some(part), Some(joint)) = (node.part_mut(), joint_index) {
        part.reserve_slot(slot);
        if included {
            let channel = anim_index
                .and_then(|a| anim.node(a))
                .and_then(|n| n.channel())
                .cloned()
                .unwrap_or_else(|| part.make_default_channel());
            part.bind_slot(slot, channel);
            bound_joints.set_bit(joint);
        } else {
            bound_joints.clear_bit(joint);
        }
    }

    let part_children = parts.children(part_index).to_vec();
    let anim_children = anim_index.map_or(&[][..], |a| anim.children(a));
    let anim_name = |i: AnimIndex| anim.node(i).map_or("", |n| n.name());

    let mut j = 0;
    for child in part_children {
        let name = parts.node(child).map_or(String::new(), |n| n.name().to_string());
        // Skip anim children the skeleton lacks
        while j < anim_children.len() && anim_name(anim_children[j]) < name.as_str() {
            j += 1;
        }
        let matched = match anim_children.get(j) {
            Some(&ac) if anim_name(ac).cmp(&name) == Ordering::Equal => {
                j += 1;
                Some(ac)
            }
            _ => None,
        };
        bind_node(anim, matched, parts, child, slot, subset, included, bound_joints);
    }
}

/// The joints a bind with `subset` would drive, without binding anything
pub fn find_bound_joints(parts: &PartTree, subset: &PartSubset) -> BitArray {
    let mut bound_joints = BitArray::new();
    find_node(parts, PartTree::ROOT, subset, subset.is_include_empty(), &mut bound_joints);
    bound_joints
}

fn find_node(parts: &PartTree, index: PartIndex, subset: &PartSubset, parent_included: bool, bound: &mut BitArray) {
    let Some(node) = parts.node(index) else {
        return;
    };
    let included = subset.resolve(node.name(), parent_included);
    if let Some(joint) = node.joint_index() {
        bound.set_bit_to(joint, included);
    }
    for &child in node.children() {
        find_node(parts, child, subset, included, bound);
    }
}

impl PartBundle {
    /// Bind `anim` to this skeleton and return a control for it.
    ///
    /// The control starts stopped with no effect; start it playing (or set
    /// its effect) to see the animation.
    pub fn bind_anim(
        &self,
        anim: Arc<AnimBundle>,
        flags: HierarchyMatchFlags,
        subset: &PartSubset,
    ) -> Result<AnimControl, BindError> {
        let control = AnimControl::new(
            self.next_control_id(),
            anim.name(),
            self,
            anim.base_frame_rate(),
            anim.num_frames(),
            BitArray::all_on(),
        );
        self.do_bind_anim(&control, anim, flags, subset)?;
        Ok(control)
    }

    /// Bind `anim` on behalf of an existing pending control
    pub(crate) fn do_bind_anim(
        &self,
        control: &AnimControl,
        anim: Arc<AnimBundle>,
        flags: HierarchyMatchFlags,
        subset: &PartSubset,
    ) -> Result<(), BindError> {
        let mut stage = self.begin_write();
        let (slot, bound_joints) = {
            let mut parts = self.parts_lock().write();
            if !flags.contains(HierarchyMatchFlags::OK_WRONG_ROOT_NAME) && parts.name() != anim.name() {
                log::error!(
                    "Root name of part ({}) does not match that of anim ({})",
                    parts.name(),
                    anim.name()
                );
                return Err(BindError::RootNameMismatch {
                    part: parts.name().to_string(),
                    anim: anim.name().to_string(),
                });
            }
            check_hierarchy(&anim, &parts, flags)?;

            let slot = pick_channel_index(&parts);
            let bound_joints = bind_hierarchy(&anim, &mut parts, slot, subset);
            (slot, bound_joints)
        };
        log::debug!("Bound {} to {} at slot {slot}", anim.name(), self.name());

        control.setup_anim(anim, slot, bound_joints);
        stage.mark_anim_changed();
        self.determine_effective_channels(&stage);
        Ok(())
    }
}
