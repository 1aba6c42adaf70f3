//! Deferred binds: load an animation file off-thread and bind it to a
//! control that was handed out up front

use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use super::binder::{find_bound_joints, BindError};
use super::hierarchy::HierarchyMatchFlags;
use crate::control::{AnimControl, ControlShared};
use crate::core::BitArray;
use crate::loader::{AnimSource, Loader};
use crate::part::{PartBundle, PartSubset};

/// A queued load-and-bind on behalf of a pending control.
///
/// The request only holds a weak reference to the control; if every handle
/// is dropped before the loader gets to it, the load is skipped.
pub struct BindAnimRequest {
    name: String,
    filename: PathBuf,
    control: Weak<ControlShared>,
    flags: HierarchyMatchFlags,
    subset: PartSubset,
    priority: i32,
}

impl BindAnimRequest {
    pub(crate) fn new(
        filename: &Path,
        control: &AnimControl,
        flags: HierarchyMatchFlags,
        subset: PartSubset,
        priority: i32,
    ) -> Self {
        Self {
            name: format!("bind:{}", filename.display()),
            filename: filename.to_path_buf(),
            control: control.downgrade(),
            flags,
            subset,
            priority,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn filename(&self) -> &Path {
        &self.filename
    }

    /// Higher runs first
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// The control is still wanted by someone
    pub fn is_wanted(&self) -> bool {
        self.control.strong_count() > 0
    }

    /// Load the file and bind it. Any failure marks the control failed.
    pub(crate) fn run(self, source: &dyn AnimSource) {
        let Some(shared) = self.control.upgrade() else {
            log::debug!("{}: control released, skipping load", self.name);
            return;
        };
        let control = AnimControl::from_shared(shared);
        let Some(part) = control.part() else {
            control.fail_anim();
            return;
        };

        let model = match source.load(&self.filename) {
            Ok(model) => Arc::new(model),
            Err(e) => {
                log::error!("Unable to load {}: {e}", self.filename.display());
                control.fail_anim();
                return;
            }
        };
        control.set_anim_model(Arc::clone(&model));

        let Some(anim) = model.find_anim_bundle() else {
            log::error!("No anim bundle in {}", self.filename.display());
            control.fail_anim();
            return;
        };
        if let Err(e) = part.do_bind_anim(&control, anim, self.flags, &self.subset) {
            log::warn!("{}: {e}", self.name);
            control.fail_anim();
        }
    }

    /// Resolve the control as failed without loading anything
    pub(crate) fn fail(self) {
        if let Some(shared) = self.control.upgrade() {
            AnimControl::from_shared(shared).fail_anim();
        }
    }
}

impl std::fmt::Debug for BindAnimRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindAnimRequest")
            .field("filename", &self.filename)
            .field("priority", &self.priority)
            .field("wanted", &self.is_wanted())
            .finish()
    }
}

impl PartBundle {
    /// Load an animation file and bind it.
    ///
    /// When `allow_async` is set and the file's basename is in this bundle's
    /// preload table, the returned control is pending: it already knows its
    /// frame rate and frame count and can be played, and the load and bind
    /// happen on the loader. Otherwise the file is loaded and bound before
    /// returning.
    pub fn load_bind_anim(
        &self,
        loader: &Loader,
        filename: impl AsRef<Path>,
        flags: HierarchyMatchFlags,
        subset: &PartSubset,
        allow_async: bool,
    ) -> Result<AnimControl, BindError> {
        let filename = filename.as_ref();
        let basename = filename
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        let record = if allow_async {
            let table = self.anim_preload();
            table.find_anim(&basename).and_then(|i| table.get(i).cloned())
        } else {
            None
        };

        let Some(record) = record else {
            let model = loader.load_sync(filename)?;
            let anim = model
                .find_anim_bundle()
                .ok_or_else(|| BindError::NoAnimBundle(filename.to_path_buf()))?;
            let control = self.bind_anim(anim, flags, subset)?;
            control.set_anim_model(model);
            return Ok(control);
        };

        let control = AnimControl::new(
            self.next_control_id(),
            basename,
            self,
            record.base_frame_rate,
            record.num_frames,
            BitArray::all_on(),
        );
        if !subset.is_include_empty() {
            // Predict the joints so exclusive eviction is right while pending
            control.set_bound_joints(find_bound_joints(&self.parts(), subset));
        }
        log::debug!("Queueing async bind of {} to {}", filename.display(), self.name());
        loader.load_async(BindAnimRequest::new(
            filename,
            &control,
            flags,
            subset.clone(),
            self.config().async_bind_priority,
        ));
        Ok(control)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anim::{AnimPreloadTable, MatrixTable};
    use crate::control::BindStatus;
    use crate::core::{AnimClock, ChanConfig, Error};
    use crate::loader::{AnimFile, AnimNodeDesc, JsonAnimSource, ModelNode};
    use glam::Mat4;
    use std::collections::BTreeMap;
    use std::fs;
    use tempfile::TempDir;

    fn skeleton() -> crate::part::PartTree {
        let mut tree = crate::part::PartTree::new("actor");
        let root = tree.add_joint(crate::part::PartTree::ROOT, "root", Mat4::IDENTITY).unwrap();
        tree.add_joint(root, "head", Mat4::IDENTITY).unwrap();
        tree
    }

    fn write_walk(dir: &Path, root_name: &str) {
        let ramp: Vec<f32> = (0..4).map(|f| f as f32).collect();
        let file = AnimFile {
            name: root_name.to_string(),
            frame_rate: 4.0,
            num_frames: 4,
            children: vec![AnimNodeDesc::Matrix {
                name: "root".to_string(),
                tables: BTreeMap::from([("x".to_string(), ramp)]),
                children: vec![AnimNodeDesc::Matrix {
                    name: "head".to_string(),
                    tables: BTreeMap::new(),
                    children: Vec::new(),
                }],
            }],
        };
        fs::write(dir.join("walk.json"), file.to_json_string().unwrap()).unwrap();
    }

    fn preload(part: &PartBundle) {
        let mut table = AnimPreloadTable::new();
        table.add_anim("walk", 4.0, 4);
        part.set_anim_preload(table);
    }

    #[test]
    fn test_sync_when_not_preloaded() {
        let dir = TempDir::new().unwrap();
        write_walk(dir.path(), "actor");
        let loader = Loader::new(JsonAnimSource::new().with_search_dir(dir.path()), &ChanConfig::default()).unwrap();
        let part = PartBundle::new(skeleton(), &ChanConfig::default(), AnimClock::manual());

        let control = part
            .load_bind_anim(&loader, "walk.json", HierarchyMatchFlags::empty(), &PartSubset::new(), true)
            .unwrap();
        assert_eq!(control.status(), BindStatus::Bound);
        assert_eq!(control.name(), "actor");
        assert!(control.anim_model().is_some());
    }

    #[test]
    fn test_sync_errors() {
        let dir = TempDir::new().unwrap();
        write_walk(dir.path(), "someone_else");
        let loader = Loader::new(JsonAnimSource::new().with_search_dir(dir.path()), &ChanConfig::default()).unwrap();
        let part = PartBundle::new(skeleton(), &ChanConfig::default(), AnimClock::manual());

        assert!(matches!(
            part.load_bind_anim(&loader, "nope.json", HierarchyMatchFlags::empty(), &PartSubset::new(), false),
            Err(BindError::Load(Error::NotFound(_)))
        ));
        assert!(matches!(
            part.load_bind_anim(&loader, "walk.json", HierarchyMatchFlags::empty(), &PartSubset::new(), false),
            Err(BindError::RootNameMismatch { .. })
        ));
    }

    #[test]
    fn test_async_bind_resolves() {
        crate::core::logging::init_for_tests();
        let dir = TempDir::new().unwrap();
        write_walk(dir.path(), "actor");
        let loader = Loader::new(JsonAnimSource::new().with_search_dir(dir.path()), &ChanConfig::default()).unwrap();
        let clock = AnimClock::manual();
        let part = PartBundle::new(skeleton(), &ChanConfig::default(), clock.clone());
        preload(&part);

        let control = part
            .load_bind_anim(&loader, "walk.json", HierarchyMatchFlags::empty(), &PartSubset::new(), true)
            .unwrap();
        assert_eq!(control.name(), "walk");
        assert_eq!(control.num_frames(), 4);
        control.pose(2.0);

        assert_eq!(control.wait_pending(), BindStatus::Bound);
        assert_eq!(control.channel_index(), Some(0));
        part.force_update();
        assert_eq!(part.joint_value("root").unwrap().as_matrix().unwrap().w_axis.x, 2.0);
    }

    #[test]
    fn test_async_bind_failure_marks_control() {
        crate::core::logging::init_for_tests();
        let dir = TempDir::new().unwrap();
        write_walk(dir.path(), "someone_else");
        let loader = Loader::new(JsonAnimSource::new().with_search_dir(dir.path()), &ChanConfig::default()).unwrap();
        let part = PartBundle::new(skeleton(), &ChanConfig::default(), AnimClock::manual());
        preload(&part);

        let control = part
            .load_bind_anim(&loader, "walk.json", HierarchyMatchFlags::empty(), &PartSubset::new(), true)
            .unwrap();
        assert_eq!(control.wait_pending(), BindStatus::Failed);
        assert!(!control.has_anim());
        assert_eq!(part.parts().node(1).unwrap().part().unwrap().num_slots(), 0);
    }

    #[test]
    fn test_subset_prediction_for_pending() {
        let dir = TempDir::new().unwrap();
        write_walk(dir.path(), "actor");
        let loader = Loader::new(JsonAnimSource::new().with_search_dir(dir.path()), &ChanConfig::default()).unwrap();
        let part = PartBundle::new(skeleton(), &ChanConfig::default(), AnimClock::manual());
        preload(&part);

        let subset = PartSubset::new().include("head");
        let control = part
            .load_bind_anim(&loader, "walk.json", HierarchyMatchFlags::empty(), &subset, true)
            .unwrap();
        let predicted = control.bound_joints();
        assert_eq!(control.wait_pending(), BindStatus::Bound);
        let actual = control.bound_joints();
        for joint in 0..2 {
            assert_eq!(predicted.get_bit(joint), actual.get_bit(joint), "joint {joint}");
        }
        assert!(!actual.get_bit(0) && actual.get_bit(1));
    }

    #[derive(Default)]
    struct Counting(std::sync::atomic::AtomicUsize);

    impl AnimSource for Counting {
        fn load(&self, _path: &Path) -> Result<ModelNode, Error> {
            self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            let mut anim = crate::anim::AnimBundle::new("actor", 1.0, 1);
            anim.add_channel(crate::anim::AnimBundle::ROOT, "root", MatrixTable::new())?;
            Ok(ModelNode::with_anim("actor", Arc::new(anim)))
        }
    }

    #[test]
    fn test_released_control_skips_load() {
        let source = Counting::default();
        let part = PartBundle::new(skeleton(), &ChanConfig::default(), AnimClock::manual());
        let control = AnimControl::new(part.next_control_id(), "walk", &part, 1.0, 1, BitArray::all_on());
        let request = BindAnimRequest::new(
            Path::new("walk.json"),
            &control,
            HierarchyMatchFlags::OK_PART_EXTRA,
            PartSubset::new(),
            0,
        );
        control.release();
        assert!(!request.is_wanted());
        request.run(&source);
        assert_eq!(source.0.load(std::sync::atomic::Ordering::SeqCst), 0);
    }
}
