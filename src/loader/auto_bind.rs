//! Bind every animation under a model to the matching skeletons

use std::collections::BTreeMap;
use std::sync::Arc;

use super::model::ModelNode;
use crate::anim::AnimBundle;
use crate::bind::HierarchyMatchFlags;
use crate::control::AnimControlCollection;
use crate::part::{PartBundle, PartSubset};

/// Bind each animation found under `root` to every skeleton of the same
/// bundle name. Controls are named after the node holding the animation;
/// repeated names get `.1`, `.2`, ... appended.
pub fn auto_bind(root: &ModelNode, flags: HierarchyMatchFlags) -> AnimControlCollection {
    let (mut anims, mut parts) = (Vec::new(), Vec::new());
    root.collect_bundles(&mut anims, &mut parts);

    let mut anims_by_name: BTreeMap<String, Vec<(String, Arc<AnimBundle>)>> = BTreeMap::new();
    for (node_name, anim) in anims {
        anims_by_name
            .entry(anim.name().to_string())
            .or_default()
            .push((node_name, anim));
    }
    let mut parts_by_name: BTreeMap<String, Vec<PartBundle>> = BTreeMap::new();
    for part in parts {
        parts_by_name.entry(part.name()).or_default().push(part);
    }

    let mut controls = AnimControlCollection::new();
    for (bundle_name, anim_list) in &anims_by_name {
        let Some(part_list) = parts_by_name.get(bundle_name) else {
            continue;
        };
        for part in part_list {
            for (node_name, anim) in anim_list {
                match part.bind_anim(Arc::clone(anim), flags, &PartSubset::new()) {
                    Ok(control) => {
                        let base = if node_name.is_empty() { anim.name() } else { node_name.as_str() };
                        let name = unique_name(&controls, base);
                        log::debug!("Bound {name} to {bundle_name}");
                        controls.store_anim(control, name);
                    }
                    Err(e) => log::warn!("Could not bind {node_name} to {bundle_name}: {e}"),
                }
            }
        }
    }

    let unbound_anims: Vec<&str> = anims_by_name
        .keys()
        .filter(|name| !parts_by_name.contains_key(*name))
        .map(String::as_str)
        .collect();
    if !unbound_anims.is_empty() {
        log::info!("Unbound anims: {}", unbound_anims.join(" "));
    }
    let unbound_parts: Vec<&str> = parts_by_name
        .keys()
        .filter(|name| !anims_by_name.contains_key(*name))
        .map(String::as_str)
        .collect();
    if !unbound_parts.is_empty() {
        log::info!("Unbound parts: {}", unbound_parts.join(" "));
    }

    controls
}

fn unique_name(controls: &AnimControlCollection, base: &str) -> String {
    if controls.find_anim(base).is_none() {
        return base.to_string();
    }
    (1..)
        .map(|index| format!("{base}.{index}"))
        .find(|candidate| controls.find_anim(candidate).is_none())
        .unwrap_or_else(|| base.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anim::MatrixTable;
    use crate::core::{AnimClock, ChanConfig};
    use crate::part::PartTree;
    use glam::Mat4;

    fn character(name: &str) -> PartBundle {
        let mut tree = PartTree::new(name);
        tree.add_joint(PartTree::ROOT, "root", Mat4::IDENTITY).unwrap();
        PartBundle::new(tree, &ChanConfig::default(), AnimClock::manual())
    }

    fn anim(name: &str) -> Arc<AnimBundle> {
        let mut anim = AnimBundle::new(name, 24.0, 1);
        anim.add_channel(AnimBundle::ROOT, "root", MatrixTable::new()).unwrap();
        Arc::new(anim)
    }

    #[test]
    fn test_binds_by_bundle_name() {
        crate::core::logging::init_for_tests();
        let mut root = ModelNode::with_part("scene", character("actor"));
        root.add_child(ModelNode::with_anim("walk", anim("actor")));
        root.add_child(ModelNode::with_anim("run", anim("actor")));
        root.add_child(ModelNode::with_anim("fly", anim("bird")));
        root.add_child(ModelNode::with_part("tree", character("oak")));

        let controls = auto_bind(&root, HierarchyMatchFlags::empty());
        assert_eq!(controls.num_anims(), 2);
        assert!(controls.find_anim("walk").is_some());
        assert!(controls.find_anim("run").is_some());
        assert!(controls.find_anim("fly").is_none());
    }

    #[test]
    fn test_duplicate_names_get_suffix() {
        let mut root = ModelNode::new("scene");
        root.add_child(ModelNode::with_part("a", character("actor")));
        root.add_child(ModelNode::with_part("b", character("actor")));
        root.add_child(ModelNode::with_anim("walk", anim("actor")));

        let controls = auto_bind(&root, HierarchyMatchFlags::empty());
        assert_eq!(controls.num_anims(), 2);
        let first = controls.find_anim("walk").unwrap();
        let second = controls.find_anim("walk.1").unwrap();
        assert_ne!(first.part().unwrap(), second.part().unwrap());
    }

    #[test]
    fn test_mismatched_hierarchy_is_skipped() {
        let mut root = ModelNode::with_part("scene", character("actor"));
        let mut wrong = AnimBundle::new("actor", 24.0, 1);
        wrong.add_channel(AnimBundle::ROOT, "pelvis", MatrixTable::new()).unwrap();
        root.add_child(ModelNode::with_anim("bad", Arc::new(wrong)));

        assert!(auto_bind(&root, HierarchyMatchFlags::empty()).is_empty());
    }
}
