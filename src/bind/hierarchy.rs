//! Shape check between an animation tree and a skeleton

use std::cmp::Ordering;

use bitflags::bitflags;

use super::binder::BindError;
use crate::anim::{AnimBundle, AnimIndex};
use crate::part::{PartIndex, PartTree};

bitflags! {
    /// Mismatches a bind tolerates
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct HierarchyMatchFlags: u32 {
        /// The skeleton may have joints the animation lacks
        const OK_PART_EXTRA = 0x01;
        /// The animation may have channels the skeleton lacks
        const OK_ANIM_EXTRA = 0x02;
        /// The root names may differ
        const OK_WRONG_ROOT_NAME = 0x04;
    }
}

/// Check that `anim` can be bound to `parts`.
///
/// Children are paired by name. Extra children on either side are allowed
/// only under the matching flag; paired nodes must carry the same value type
/// (or both be plain groups). The root names are not compared here.
pub fn check_hierarchy(
    anim: &AnimBundle,
    parts: &PartTree,
    flags: HierarchyMatchFlags,
) -> Result<(), BindError> {
    check_node(anim, AnimBundle::ROOT, parts, PartTree::ROOT, flags)
}

fn check_node(
    anim: &AnimBundle,
    anim_index: AnimIndex,
    parts: &PartTree,
    part_index: PartIndex,
    flags: HierarchyMatchFlags,
) -> Result<(), BindError> {
    let (Some(anim_node), Some(part_node)) = (anim.node(anim_index), parts.node(part_index)) else {
        return Err(BindError::HierarchyMismatch(format!(
            "dangling node index {anim_index}/{part_index}"
        )));
    };

    if anim_node.value_kind() != part_node.value_kind() {
        let kind_name = |k: Option<crate::anim::ValueKind>| k.map_or("group".to_string(), |k| k.to_string());
        log::error!(
            "Part {} expects type {} while matching anim node has type {}.",
            part_node.name(),
            kind_name(part_node.value_kind()),
            kind_name(anim_node.value_kind())
        );
        return Err(BindError::HierarchyMismatch(format!(
            "{} has type {}, anim has {}",
            part_node.name(),
            kind_name(part_node.value_kind()),
            kind_name(anim_node.value_kind())
        )));
    }

    let part_children = part_node.children();
    let anim_children = anim_node.children();
    let child_name = |i: PartIndex| parts.node(i).map_or("", |n| n.name());
    let anim_name = |i: AnimIndex| anim.node(i).map_or("", |n| n.name());

    let mismatch = |what: &str, name: &str| {
        log::info!(
            "{} {} in {}. Part children: [{}] Anim children: [{}]",
            what,
            name,
            part_node.name(),
            part_children.iter().map(|&i| child_name(i)).collect::<Vec<_>>().join(" "),
            anim_children.iter().map(|&i| anim_name(i)).collect::<Vec<_>>().join(" ")
        );
        BindError::HierarchyMismatch(format!("{what} {name} under {}", part_node.name()))
    };

    let (mut i, mut j) = (0, 0);
    while i < part_children.len() || j < anim_children.len() {
        let order = match (part_children.get(i), anim_children.get(j)) {
            (Some(&pc), Some(&ac)) => child_name(pc).cmp(anim_name(ac)),
            (Some(_), None) => Ordering::Less,
            _ => Ordering::Greater,
        };
        match order {
            Ordering::Less => {
                if !flags.contains(HierarchyMatchFlags::OK_PART_EXTRA) {
                    return Err(mismatch("Anim lacks joint", child_name(part_children[i])));
                }
                i += 1;
            }
            Ordering::Greater => {
                if !flags.contains(HierarchyMatchFlags::OK_ANIM_EXTRA) {
                    return Err(mismatch("Part lacks channel", anim_name(anim_children[j])));
                }
                j += 1;
            }
            Ordering::Equal => {
                check_node(anim, anim_children[j], parts, part_children[i], flags)?;
                i += 1;
                j += 1;
            }
        }
    }
    Ok(())
}
