//! The root of a character's skeleton: blend map, flags and per-tick update

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use glam::{Mat4, Vec3};
use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use tokio::sync::mpsc::UnboundedSender;

use super::blend::BlendType;
use super::cycler::{CycleGuard, CycleWriter, Cycler};
use super::moving_part::UpdateContext;
use super::tree::{PartIndex, PartTree};
use crate::anim::{AnimChannel, AnimPreloadTable, ChannelValue, DynamicChannel, DynamicValue, FixedChannel, ValueKind};
use crate::control::{AnimControl, ControlFrame, ControlId, ControlShared};
use crate::core::{AnimClock, ChanConfig};
use crate::math::Components;

/// One control's weight in the blend map
#[derive(Clone)]
struct BlendEntry {
    control: Weak<ControlShared>,
    effect: f32,
}

/// Evaluated value of one moving part
#[derive(Clone, Debug, PartialEq)]
pub struct JointPose {
    pub name: String,
    pub value: ChannelValue,
    pub net_transform: Mat4,
}

/// Every moving part's value after an update, by joint index
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Pose {
    joints: Vec<JointPose>,
}

impl Pose {
    fn capture(tree: &PartTree) -> Self {
        let joints = tree
            .parts()
            .map(|(index, part)| JointPose {
                name: tree.node(index).map_or("", |n| n.name()).to_string(),
                value: part.value(),
                net_transform: part.net_transform(),
            })
            .collect();
        Self { joints }
    }

    pub fn len(&self) -> usize {
        self.joints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joints.is_empty()
    }

    pub fn get(&self, joint_index: usize) -> Option<&JointPose> {
        self.joints.get(joint_index)
    }

    pub fn find(&self, name: &str) -> Option<&JointPose> {
        self.joints.iter().find(|j| j.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &JointPose> {
        self.joints.iter()
    }
}

/// The double-buffered state of a bundle for one pipeline stage
#[derive(Clone)]
pub struct BundleStage {
    blend_type: BlendType,
    anim_blend_flag: bool,
    frame_blend_flag: bool,
    restore_initial_pose: bool,
    root_xform: Mat4,
    blend: BTreeMap<ControlId, BlendEntry>,
    net_blend: f32,
    last_control_set: Option<ControlId>,
    anim_changed: bool,
    last_update: f64,
    update_delay: f64,
    pose: Arc<Pose>,
}

impl BundleStage {
    fn from_config(config: &ChanConfig) -> Self {
        Self {
            blend_type: config.blend_type,
            anim_blend_flag: config.anim_blend_flag,
            frame_blend_flag: config.interpolate_frames,
            restore_initial_pose: config.restore_initial_pose,
            root_xform: Mat4::IDENTITY,
            blend: BTreeMap::new(),
            net_blend: 0.0,
            last_control_set: None,
            anim_changed: true,
            last_update: 0.0,
            update_delay: config.update_delay,
            pose: Arc::new(Pose::default()),
        }
    }

    pub fn blend_type(&self) -> BlendType {
        self.blend_type
    }

    pub fn anim_blend_flag(&self) -> bool {
        self.anim_blend_flag
    }

    pub fn frame_blend_flag(&self) -> bool {
        self.frame_blend_flag
    }

    pub fn restore_initial_pose(&self) -> bool {
        self.restore_initial_pose
    }

    pub fn root_xform(&self) -> Mat4 {
        self.root_xform
    }

    /// Sum of all control effects
    pub fn net_blend(&self) -> f32 {
        self.net_blend
    }

    /// `(control, effect)` for every control in the blend map
    pub fn control_effects(&self) -> impl Iterator<Item = (ControlId, f32)> + '_ {
        self.blend.iter().map(|(&id, e)| (id, e.effect))
    }

    pub fn num_active(&self) -> usize {
        self.blend.len()
    }

    pub fn last_control_set(&self) -> Option<ControlId> {
        self.last_control_set
    }

    pub fn anim_changed(&self) -> bool {
        self.anim_changed
    }

    pub fn last_update(&self) -> f64 {
        self.last_update
    }

    pub fn update_delay(&self) -> f64 {
        self.update_delay
    }

    /// Pose evaluated by the last update that reached this stage
    pub fn pose(&self) -> &Arc<Pose> {
        &self.pose
    }

    pub(crate) fn mark_anim_changed(&mut self) {
        self.anim_changed = true;
    }

    fn recompute_net_blend(&mut self) {
        self.net_blend = self.blend.values().map(|e| e.effect).sum();
    }

    /// Live controls in the blend map with their effects
    fn live_controls(&self) -> Vec<(AnimControl, f32)> {
        self.blend
            .values()
            .filter_map(|e| e.control.upgrade().map(|c| (AnimControl::from_shared(c), e.effect)))
            .collect()
    }
}

impl fmt::Debug for BundleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BundleStage")
            .field("blend_type", &self.blend_type)
            .field("anim_blend_flag", &self.anim_blend_flag)
            .field("frame_blend_flag", &self.frame_blend_flag)
            .field("blend", &self.control_effects().collect::<Vec<_>>())
            .field("net_blend", &self.net_blend)
            .field("anim_changed", &self.anim_changed)
            .finish()
    }
}

pub(crate) struct BundleInner {
    parts: RwLock<PartTree>,
    stage: Cycler<BundleStage>,
    /// Controls whose last handle went away, with their slot
    removed: Mutex<Vec<(ControlId, Option<usize>)>>,
    clock: AnimClock,
    config: ChanConfig,
    preload: RwLock<AnimPreloadTable>,
    events: Mutex<Option<UnboundedSender<String>>>,
    next_control_id: AtomicU64,
}

impl BundleInner {
    pub(crate) fn control_released(&self, id: ControlId, slot: Option<usize>) {
        self.removed.lock().push((id, slot));
    }

    pub(crate) fn throw_event(&self, event: String) {
        match &*self.events.lock() {
            Some(tx) => {
                if tx.send(event).is_err() {
                    log::warn!("Event receiver for {} is gone", self.name());
                }
            }
            None => log::debug!("No event sender on {}, dropping {event}", self.name()),
        }
    }

    fn name(&self) -> String {
        self.parts.read().name().to_string()
    }
}

/// The root of one character's skeleton.
///
/// Owns the part tree and the blend state. Cheap to clone; clones share the
/// same bundle. Mutations go to the stage under construction and become
/// visible to [`committed`](Self::committed) readers at [`cycle`](Self::cycle).
///
/// Locks are always taken stage first, then a control's state, then the
/// part tree.
#[derive(Clone)]
pub struct PartBundle {
    inner: Arc<BundleInner>,
}

impl PartBundle {
    pub fn new(tree: PartTree, config: &ChanConfig, clock: AnimClock) -> Self {
        Self {
            inner: Arc::new(BundleInner {
                parts: RwLock::new(tree),
                stage: Cycler::new(BundleStage::from_config(config)),
                removed: Mutex::new(Vec::new()),
                clock,
                config: config.clone(),
                preload: RwLock::new(AnimPreloadTable::new()),
                events: Mutex::new(None),
                next_control_id: AtomicU64::new(1),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<BundleInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<BundleInner> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn next_control_id(&self) -> ControlId {
        self.inner.next_control_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn name(&self) -> String {
        self.inner.parts.read().name().to_string()
    }

    pub fn clock(&self) -> &AnimClock {
        &self.inner.clock
    }

    pub fn config(&self) -> &ChanConfig {
        &self.inner.config
    }

    /// Read access to the skeleton
    pub fn parts(&self) -> RwLockReadGuard<'_, PartTree> {
        self.inner.parts.read()
    }

    pub(crate) fn parts_lock(&self) -> &RwLock<PartTree> {
        &self.inner.parts
    }

    /// Writer on the pending stage, with released controls cleaned out
    pub(crate) fn begin_write(&self) -> CycleWriter<'_, BundleStage> {
        let mut stage = self.inner.stage.begin_write();
        self.drain_removed(&mut stage);
        stage
    }

    /// Read the pending stage without cleaning out released controls. Still
    /// waits for a writer on the simulation thread; render-side readers
    /// should use [`committed`](Self::committed).
    fn read_stage<R>(&self, f: impl FnOnce(&BundleStage) -> R) -> R {
        self.inner.stage.read_pending(f)
    }

    fn drain_removed(&self, stage: &mut BundleStage) {
        let removed = std::mem::take(&mut *self.inner.removed.lock());
        if removed.is_empty() {
            return;
        }
        {
            let mut parts = self.inner.parts.write();
            for slot in removed.iter().filter_map(|&(_, slot)| slot) {
                parts.release_slot(slot);
            }
        }
        for &(id, slot) in &removed {
            log::debug!("Dropping released control {id} (slot {slot:?})");
            if stage.blend.remove(&id).is_some() {
                stage.anim_changed = true;
            }
            if stage.last_control_set == Some(id) {
                stage.last_control_set = None;
            }
        }
        stage.recompute_net_blend();
        self.determine_effective_channels(stage);
    }

    /// Refresh every joint's effective-channel cache from the blend map
    pub(crate) fn determine_effective_channels(&self, stage: &BundleStage) {
        let active: Vec<(ControlId, usize)> = stage
            .live_controls()
            .iter()
            .filter_map(|(c, _)| c.channel_index().map(|slot| (c.id(), slot)))
            .collect();
        let mut parts = self.inner.parts.write();
        for part in parts.parts_mut() {
            part.determine_effective_channel(&active);
        }
    }

    // -- blend map ---------------------------------------------------------

    /// Set how much `control` contributes. Zero removes it from the blend.
    pub fn set_control_effect(&self, control: &AnimControl, effect: f32) {
        let mut stage = self.begin_write();
        self.do_set_control_effect(control, effect, &mut stage);
    }

    pub(crate) fn do_set_control_effect(&self, control: &AnimControl, effect: f32, stage: &mut BundleStage) {
        let id = control.id();
        if effect == 0.0 {
            if stage.blend.remove(&id).is_some() {
                stage.anim_changed = true;
            }
            if stage.last_control_set == Some(id) {
                stage.last_control_set = None;
            }
        } else {
            if !stage.anim_blend_flag {
                self.clear_and_stop_intersecting(control, stage);
            }
            let entry = stage.blend.entry(id).or_insert_with(|| BlendEntry {
                control: control.downgrade(),
                effect: 0.0,
            });
            if entry.effect != effect {
                entry.effect = effect;
                stage.anim_changed = true;
            }
            stage.last_control_set = Some(id);
        }
        stage.recompute_net_blend();
        self.determine_effective_channels(stage);
    }

    /// Stop and evict every other control sharing a joint with `control`
    fn clear_and_stop_intersecting(&self, control: &AnimControl, stage: &mut BundleStage) {
        let bound = control.bound_joints();
        let mut evicted = Vec::new();
        stage.blend.retain(|&id, entry| {
            if id == control.id() {
                return true;
            }
            let Some(other) = entry.control.upgrade() else {
                return false;
            };
            let other = AnimControl::from_shared(other);
            if other.bound_joints().has_bits_in_common(&bound) {
                other.stop();
                evicted.push(other);
                false
            } else {
                true
            }
        });
        if !evicted.is_empty() {
            log::debug!("{} evicted {} intersecting control(s)", control.name(), evicted.len());
            stage.anim_changed = true;
            if stage.last_control_set.is_some_and(|id| evicted.iter().any(|c| c.id() == id)) {
                stage.last_control_set = None;
            }
        }
    }

    /// Called when a control starts playing
    pub(crate) fn control_activated(&self, control: &AnimControl) {
        let mut stage = self.begin_write();
        if !stage.anim_blend_flag {
            self.do_set_control_effect(control, 1.0, &mut stage);
        }
    }

    /// Current effect of `control`, 0.0 if not in the blend
    pub fn control_effect(&self, control: &AnimControl) -> f32 {
        self.read_stage(|stage| stage.blend.get(&control.id()).map_or(0.0, |e| e.effect))
    }

    /// Remove every control from the blend
    pub fn clear_control_effects(&self) {
        let mut stage = self.begin_write();
        if !stage.blend.is_empty() {
            stage.blend.clear();
            stage.net_blend = 0.0;
            stage.last_control_set = None;
            stage.anim_changed = true;
            self.determine_effective_channels(&stage);
        }
    }

    /// Sum of all effects. Drops released controls from the blend first, so
    /// this takes the writer lock like any mutation.
    pub fn net_blend(&self) -> f32 {
        self.begin_write().net_blend
    }

    /// Controls currently in the blend map. Takes the writer lock, like
    /// [`net_blend`](Self::net_blend).
    pub fn active_controls(&self) -> Vec<AnimControl> {
        self.begin_write()
            .live_controls()
            .into_iter()
            .map(|(c, _)| c)
            .collect()
    }

    // -- flags ---------------------------------------------------------------

    pub fn blend_type(&self) -> BlendType {
        self.read_stage(|stage| stage.blend_type)
    }

    pub fn set_blend_type(&self, blend_type: BlendType) {
        let mut stage = self.begin_write();
        if stage.blend_type != blend_type {
            stage.blend_type = blend_type;
            stage.anim_changed = true;
        }
    }

    pub fn anim_blend_flag(&self) -> bool {
        self.read_stage(|stage| stage.anim_blend_flag)
    }

    /// Allow several animations to drive the same joints at once. Turning
    /// this off keeps only the control set last and stops the ones it
    /// overlaps.
    pub fn set_anim_blend_flag(&self, anim_blend_flag: bool) {
        let mut stage = self.begin_write();
        if stage.anim_blend_flag == anim_blend_flag {
            return;
        }
        stage.anim_blend_flag = anim_blend_flag;
        if !anim_blend_flag && stage.blend.len() > 1 {
            let last = stage
                .last_control_set
                .and_then(|id| stage.blend.get(&id))
                .and_then(|e| e.control.upgrade())
                .map(AnimControl::from_shared);
            if let Some(last) = last {
                self.clear_and_stop_intersecting(&last, &mut stage);
            }
        }
        stage.anim_changed = true;
        stage.recompute_net_blend();
        self.determine_effective_channels(&stage);
    }

    pub fn frame_blend_flag(&self) -> bool {
        self.read_stage(|stage| stage.frame_blend_flag)
    }

    /// Interpolate between consecutive frames
    pub fn set_frame_blend_flag(&self, frame_blend_flag: bool) {
        let mut stage = self.begin_write();
        if stage.frame_blend_flag != frame_blend_flag {
            stage.frame_blend_flag = frame_blend_flag;
            stage.anim_changed = true;
        }
    }

    pub fn restore_initial_pose(&self) -> bool {
        self.read_stage(|stage| stage.restore_initial_pose)
    }

    pub fn set_restore_initial_pose(&self, restore: bool) {
        let mut stage = self.begin_write();
        stage.restore_initial_pose = restore;
        stage.anim_changed = true;
    }

    pub fn root_xform(&self) -> Mat4 {
        self.read_stage(|stage| stage.root_xform)
    }

    /// Transform applied above every top-level joint
    pub fn set_root_xform(&self, root_xform: Mat4) {
        let mut stage = self.begin_write();
        stage.root_xform = root_xform;
        stage.anim_changed = true;
    }

    /// Apply `mat` after the current root transform
    pub fn xform(&self, mat: Mat4) {
        let mut stage = self.begin_write();
        stage.root_xform = mat * stage.root_xform;
        stage.anim_changed = true;
    }

    pub fn update_delay(&self) -> f64 {
        self.read_stage(|stage| stage.update_delay)
    }

    /// Minimum seconds between two non-forced updates
    pub fn set_update_delay(&self, delay: f64) {
        self.begin_write().update_delay = delay;
    }

    // -- joint overrides -----------------------------------------------------

    fn set_forced(&self, joint_name: &str, channel: Option<Arc<dyn AnimChannel>>) -> bool {
        let mut stage = self.begin_write();
        let applied = {
            let mut parts = self.inner.parts.write();
            let Some(index) = parts.find_child(joint_name) else {
                return false;
            };
            match parts.node_mut(index).and_then(|n| n.part_mut()) {
                Some(part) => part.set_forced_channel(channel),
                None => false,
            }
        };
        if applied {
            stage.anim_changed = true;
        }
        applied
    }

    /// Hold a joint at a fixed transform, ignoring every animation
    pub fn freeze_joint(&self, joint_name: &str, transform: Mat4) -> bool {
        self.set_forced(joint_name, Some(Arc::new(FixedChannel::matrix(transform))))
    }

    /// Hold a joint at a transform given as position, hpr (degrees) and scale
    pub fn freeze_joint_components(&self, joint_name: &str, pos: Vec3, hpr: Vec3, scale: Vec3) -> bool {
        let components = Components::from_hpr(scale, Vec3::ZERO, hpr, pos);
        self.set_forced(joint_name, Some(Arc::new(FixedChannel::from_components(components))))
    }

    /// Hold a slider at a fixed value
    pub fn freeze_joint_scalar(&self, joint_name: &str, value: f32) -> bool {
        self.set_forced(joint_name, Some(Arc::new(FixedChannel::scalar(value))))
    }

    /// Drive a joint from a value pushed by external code
    pub fn control_joint(&self, joint_name: &str, value: &DynamicValue) -> bool {
        self.set_forced(joint_name, Some(Arc::new(DynamicChannel::new(value.clone()))))
    }

    /// Undo `freeze_joint` or `control_joint`
    pub fn release_joint(&self, joint_name: &str) -> bool {
        self.set_forced(joint_name, None)
    }

    // -- evaluation ----------------------------------------------------------

    /// Evaluate the skeleton if anything changed or the update delay has
    /// passed. Returns true if any joint changed.
    pub fn update(&self) -> bool {
        let mut stage = self.begin_write();
        let now = self.inner.clock.frame_time();
        if stage.anim_changed || now > stage.last_update + stage.update_delay {
            self.do_update(&mut stage, now, false)
        } else {
            false
        }
    }

    /// Evaluate every joint regardless of what changed
    pub fn force_update(&self) -> bool {
        let mut stage = self.begin_write();
        let now = self.inner.clock.frame_time();
        self.do_update(&mut stage, now, true)
    }

    fn do_update(&self, stage: &mut BundleStage, now: f64, force: bool) -> bool {
        let live = stage.live_controls();
        let frames: Vec<ControlFrame> = live.iter().map(|(c, effect)| c.frame_snapshot(*effect)).collect();
        let ctx = UpdateContext {
            controls: &frames,
            anim_changed: force || stage.anim_changed,
            frame_blend: stage.frame_blend_flag,
            blend_type: stage.blend_type,
            restore_initial_pose: stage.restore_initial_pose,
        };

        let any_changed = {
            let mut parts = self.inner.parts.write();
            let changed = update_node(&mut parts, PartTree::ROOT, force, stage.root_xform, &ctx);
            if changed {
                stage.pose = Arc::new(Pose::capture(&parts));
            }
            changed
        };

        for (control, _) in &live {
            control.mark_channels(stage.frame_blend_flag);
        }
        stage.anim_changed = false;
        stage.last_update = now;
        any_changed
    }

    /// Pose from the last update, in the stage under construction
    pub fn pose(&self) -> Arc<Pose> {
        self.read_stage(|stage| Arc::clone(&stage.pose))
    }

    /// Current value of a named joint or slider
    pub fn joint_value(&self, joint_name: &str) -> Option<ChannelValue> {
        let parts = self.inner.parts.read();
        let index = parts.find_child(joint_name)?;
        parts.node(index)?.part().map(|p| p.value())
    }

    /// World transform of a named joint
    pub fn net_transform(&self, joint_name: &str) -> Option<Mat4> {
        let parts = self.inner.parts.read();
        let index = parts.find_child(joint_name)?;
        let part = parts.node(index)?.part()?;
        (part.kind() == ValueKind::Matrix).then(|| part.net_transform())
    }

    // -- pipeline ------------------------------------------------------------

    /// Publish the stage under construction. Returns the new generation.
    pub fn cycle(&self) -> u64 {
        self.inner.stage.commit()
    }

    /// The last published stage, readable without blocking the simulation
    pub fn committed(&self) -> CycleGuard<BundleStage> {
        self.inner.stage.read()
    }

    pub fn committed_pose(&self) -> Arc<Pose> {
        Arc::clone(&self.inner.stage.read().pose)
    }

    // -- misc ----------------------------------------------------------------

    /// Block until every pending control with a nonzero effect has resolved
    pub fn wait_pending(&self) {
        // The async binder needs the stage, so collect and release it first.
        let controls: Vec<AnimControl> = self
            .begin_write()
            .live_controls()
            .into_iter()
            .filter(|(_, effect)| *effect != 0.0)
            .map(|(c, _)| c)
            .collect();
        for control in controls {
            control.wait_pending();
        }
    }

    /// A new bundle with the same skeleton, flags and preload table, and no
    /// bound animations
    pub fn copy_subgraph(&self) -> PartBundle {
        let tree = self.inner.parts.read().unbound_copy();
        let copy = PartBundle::new(tree, &self.inner.config, self.inner.clock.clone());
        {
            let src = self.begin_write();
            let mut dst = copy.inner.stage.begin_write();
            dst.blend_type = src.blend_type;
            dst.anim_blend_flag = src.anim_blend_flag;
            dst.frame_blend_flag = src.frame_blend_flag;
            dst.restore_initial_pose = src.restore_initial_pose;
            dst.root_xform = src.root_xform;
            dst.update_delay = src.update_delay;
        }
        *copy.inner.preload.write() = self.inner.preload.read().clone();
        copy
    }

    pub fn anim_preload(&self) -> AnimPreloadTable {
        self.inner.preload.read().clone()
    }

    pub fn set_anim_preload(&self, table: AnimPreloadTable) {
        *self.inner.preload.write() = table;
    }

    /// Add every preload record of `other` to this bundle's table
    pub fn merge_anim_preloads(&self, other: &PartBundle) {
        if Arc::ptr_eq(&self.inner, &other.inner) {
            return;
        }
        let theirs = other.inner.preload.read().clone();
        self.inner.preload.write().add_anims_from(&theirs);
    }

    /// Where pending-done events go
    pub fn set_event_sender(&self, sender: Option<UnboundedSender<String>>) {
        *self.inner.events.lock() = sender;
    }
}

/// Preorder update of one node and its subtree
fn update_node(
    tree: &mut PartTree,
    index: PartIndex,
    parent_changed: bool,
    parent_net: Mat4,
    ctx: &UpdateContext<'_>,
) -> bool {
    let mut any_changed = false;
    let mut net = parent_net;
    let mut changed = parent_changed;

    if let Some(part) = tree.node_mut(index).and_then(|n| n.part_mut()) {
        let needs_update = part.needs_update(ctx);
        if needs_update {
            part.update_value(ctx);
        }
        changed = parent_changed || needs_update;
        if changed {
            net = part.update_internals(parent_net);
            any_changed = true;
        } else if part.kind() == ValueKind::Matrix {
            net = part.net_transform();
        }
    }

    let num_children = tree.children(index).len();
    for i in 0..num_children {
        let child = tree.children(index)[i];
        any_changed |= update_node(tree, child, changed, net, ctx);
    }
    any_changed
}

impl PartialEq for PartBundle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for PartBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartBundle")
            .field("name", &self.name())
            .field("joints", &self.inner.parts.read().num_joints())
            .finish()
    }
}

impl fmt::Display for PartBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", *self.inner.parts.read())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anim::{AnimBundle, MatrixTable};
    use crate::bind::HierarchyMatchFlags;
    use crate::part::PartSubset;

    fn skeleton() -> PartTree {
        let mut tree = PartTree::new("actor");
        let root = tree.add_joint(PartTree::ROOT, "root", Mat4::IDENTITY).unwrap();
        let spine = tree.add_joint(root, "spine", Mat4::IDENTITY).unwrap();
        tree.add_joint(spine, "head", Mat4::IDENTITY).unwrap();
        tree.add_slider(PartTree::ROOT, "smile", 0.0).unwrap();
        tree
    }

    /// Every joint translated along x by `scale * frame`
    fn x_anim(scale: f32) -> Arc<AnimBundle> {
        let table = || {
            let xs = (0..10).map(|f| f as f32 * scale).collect();
            MatrixTable::new().with_table('x', xs).unwrap()
        };
        let mut anim = AnimBundle::new("actor", 10.0, 10);
        let root = anim.add_channel(AnimBundle::ROOT, "root", table()).unwrap();
        let spine = anim.add_channel(root, "spine", table()).unwrap();
        anim.add_channel(spine, "head", table()).unwrap();
        Arc::new(anim)
    }

    fn bundle() -> (PartBundle, AnimClock) {
        let clock = AnimClock::manual();
        (PartBundle::new(skeleton(), &ChanConfig::default(), clock.clone()), clock)
    }

    fn bind(part: &PartBundle, anim: Arc<AnimBundle>, subset: &PartSubset) -> AnimControl {
        part.bind_anim(anim, HierarchyMatchFlags::OK_PART_EXTRA, subset).unwrap()
    }

    fn x_of(part: &PartBundle, joint: &str) -> f32 {
        part.joint_value(joint).unwrap().as_matrix().unwrap().w_axis.x
    }

    #[test]
    fn test_exclusive_evicts_only_intersecting() {
        let (part, _) = bundle();
        let head_only = bind(&part, x_anim(1.0), &PartSubset::new().include("head"));
        let root_only = bind(&part, x_anim(1.0), &PartSubset::new().include("root").exclude("spine"));
        let full = bind(&part, x_anim(1.0), &PartSubset::new());

        head_only.loop_anim(true);
        root_only.loop_anim(true);
        assert_eq!(part.control_effect(&head_only), 1.0);
        assert_eq!(part.control_effect(&root_only), 1.0);
        assert_eq!(part.net_blend(), 2.0);

        full.play();
        assert_eq!(part.active_controls(), vec![full.clone()]);
        assert!(!head_only.is_playing());
        assert!(!root_only.is_playing());
        assert!(full.is_playing());
        assert_eq!(part.net_blend(), 1.0);
    }

    #[test]
    fn test_disabling_blend_keeps_last_set() {
        let (part, _) = bundle();
        part.set_anim_blend_flag(true);
        let a = bind(&part, x_anim(1.0), &PartSubset::new());
        let b = bind(&part, x_anim(2.0), &PartSubset::new());
        part.set_control_effect(&a, 0.3);
        part.set_control_effect(&b, 0.7);
        assert_eq!(part.active_controls().len(), 2);

        part.set_anim_blend_flag(false);
        assert_eq!(part.control_effect(&a), 0.0);
        assert_eq!(part.control_effect(&b), 0.7);
        assert!((part.net_blend() - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_single_control_is_exact_sample() {
        let (part, _) = bundle();
        part.set_anim_blend_flag(true);
        let mut anim = AnimBundle::new("actor", 10.0, 4);
        let table = MatrixTable::new()
            .with_table('h', vec![0.0, 30.0, 60.0, 90.0])
            .unwrap()
            .with_table('i', vec![1.0, 1.5, 2.0, 2.5])
            .unwrap()
            .with_table('y', vec![0.0, 0.1, 0.2, 0.3])
            .unwrap();
        anim.add_channel(AnimBundle::ROOT, "root", table).unwrap();
        let anim = Arc::new(anim);
        let sample = anim.node(anim.find_child("root").unwrap()).unwrap().channel().unwrap().value(2);

        let control = bind(&part, anim, &PartSubset::new());
        part.set_control_effect(&control, 0.3);
        control.pose(2.0);
        part.force_update();
        assert_eq!(part.joint_value("root").unwrap(), sample);
    }

    #[test]
    fn test_normalized_weights() {
        let (part, _) = bundle();
        part.set_anim_blend_flag(true);
        let still = bind(&part, x_anim(0.0), &PartSubset::new());
        let moving = bind(&part, x_anim(10.0), &PartSubset::new());
        part.set_control_effect(&still, 0.3);
        part.set_control_effect(&moving, 0.7);
        still.pose(1.0);
        moving.pose(1.0);
        part.force_update();
        assert!((x_of(&part, "root") - 7.0).abs() < 1e-4);

        // Effects are normalized by their sum
        part.set_control_effect(&still, 0.6);
        part.set_control_effect(&moving, 1.4);
        part.update();
        assert!((x_of(&part, "root") - 7.0).abs() < 1e-4);
    }

    #[test]
    fn test_no_contributions_restores_default() {
        let (part, _) = bundle();
        let control = bind(&part, x_anim(1.0), &PartSubset::new());
        control.pose(4.0);
        part.update();
        assert_eq!(x_of(&part, "head"), 4.0);

        part.set_control_effect(&control, 0.0);
        part.update();
        assert_eq!(x_of(&part, "head"), 0.0);

        part.set_restore_initial_pose(false);
        control.pose(6.0);
        part.update();
        part.set_control_effect(&control, 0.0);
        part.update();
        assert_eq!(x_of(&part, "head"), 6.0);
    }

    #[test]
    fn test_freeze_and_release() {
        let (part, _) = bundle();
        let control = bind(&part, x_anim(1.0), &PartSubset::new());
        control.pose(3.0);

        assert!(part.freeze_joint("spine", Mat4::from_translation(Vec3::new(-1.0, 0.0, 0.0))));
        assert!(!part.freeze_joint("tail", Mat4::IDENTITY));
        assert!(!part.freeze_joint_scalar("spine", 1.0));
        assert!(part.freeze_joint_scalar("smile", 0.5));
        part.update();
        assert_eq!(x_of(&part, "spine"), -1.0);
        assert_eq!(x_of(&part, "head"), 3.0);
        assert_eq!(part.net_transform("head").unwrap().w_axis.x, 5.0);
        assert_eq!(part.joint_value("smile"), Some(ChannelValue::Scalar(0.5)));

        assert!(part.release_joint("spine"));
        part.update();
        assert_eq!(x_of(&part, "spine"), 3.0);
        assert_eq!(part.net_transform("head").unwrap().w_axis.x, 9.0);
    }

    #[test]
    fn test_control_joint_follows_value() {
        let (part, clock) = bundle();
        let value = DynamicValue::matrix(Mat4::from_translation(Vec3::X));
        assert!(part.control_joint("root", &value));
        part.update();
        assert_eq!(x_of(&part, "root"), 1.0);

        value.set(ChannelValue::Matrix(Mat4::from_translation(Vec3::X * 2.0)));
        clock.advance(0.1);
        assert!(part.update());
        assert_eq!(x_of(&part, "root"), 2.0);
    }

    #[test]
    fn test_update_delay_throttles() {
        let (part, clock) = bundle();
        part.set_update_delay(1.0);
        let control = bind(&part, x_anim(1.0), &PartSubset::new());
        control.play();
        assert!(part.update());

        clock.advance(0.5);
        assert!(!part.update());
        assert_eq!(x_of(&part, "root"), 0.0);

        clock.advance(1.0);
        assert!(part.update());
        assert!(x_of(&part, "root") > 0.0);

        // Forced updates ignore the delay
        clock.advance(0.1);
        assert!(part.force_update());
    }

    #[test]
    fn test_root_xform_reaches_net_transforms() {
        let (part, _) = bundle();
        part.set_root_xform(Mat4::from_translation(Vec3::Y));
        part.xform(Mat4::from_scale(Vec3::splat(2.0)));
        part.force_update();
        let net = part.net_transform("head").unwrap();
        assert_eq!(net.w_axis.y, 2.0);
        assert_eq!(part.joint_value("head").unwrap().as_matrix().unwrap(), Mat4::IDENTITY);
        assert!(part.net_transform("smile").is_none());
    }

    #[test]
    fn test_cycle_publishes_stage() {
        let (part, clock) = bundle();
        let control = bind(&part, x_anim(1.0), &PartSubset::new());
        control.pose(2.0);
        part.update();

        assert!(part.committed_pose().is_empty());
        assert_eq!(part.committed().num_active(), 0);
        let generation = part.cycle();
        assert_eq!(part.committed_pose(), part.pose());
        assert_eq!(part.committed_pose().find("head").unwrap().value.as_matrix().unwrap().w_axis.x, 2.0);
        assert_eq!(part.committed().num_active(), 1);

        control.pose(5.0);
        clock.advance(0.1);
        part.update();
        assert_eq!(part.committed_pose().find("head").unwrap().value.as_matrix().unwrap().w_axis.x, 2.0);
        assert!(part.cycle() > generation);
        assert_eq!(part.committed_pose().find("head").unwrap().value.as_matrix().unwrap().w_axis.x, 5.0);
    }

    #[test]
    fn test_dropped_control_leaves_blend() {
        let (part, _) = bundle();
        let control = bind(&part, x_anim(1.0), &PartSubset::new());
        control.pose(4.0);
        part.update();
        assert_eq!(x_of(&part, "root"), 4.0);

        drop(control);
        assert_eq!(part.net_blend(), 0.0);
        assert!(part.active_controls().is_empty());
        part.update();
        assert_eq!(x_of(&part, "root"), 0.0);
        assert!(part.parts().parts().all(|(_, p)| p.channel(0).is_none()));
    }

    #[test]
    fn test_flag_reads_leave_released_controls_queued() {
        let (part, _) = bundle();
        let control = bind(&part, x_anim(1.0), &PartSubset::new());
        control.pose(4.0);
        part.update();
        drop(control);

        assert_eq!(part.blend_type(), BlendType::NormalizedLinear);
        assert_eq!(part.root_xform(), Mat4::IDENTITY);
        assert_eq!(part.pose().find("root").unwrap().value.as_matrix().unwrap().w_axis.x, 4.0);
        assert!(part.parts().parts().all(|(_, p)| p.channel(0).is_some()));

        assert_eq!(part.net_blend(), 0.0);
        assert!(part.parts().parts().all(|(_, p)| p.channel(0).is_none()));
    }

    #[test]
    fn test_copy_subgraph_is_unbound() {
        let (part, _) = bundle();
        part.set_blend_type(BlendType::ComponentwiseQuat);
        let mut table = AnimPreloadTable::new();
        table.add_anim("walk", 24.0, 10);
        part.set_anim_preload(table);
        let _control = bind(&part, x_anim(1.0), &PartSubset::new());

        let copy = part.copy_subgraph();
        assert_ne!(copy, part);
        assert_eq!(copy.blend_type(), BlendType::ComponentwiseQuat);
        assert_eq!(copy.anim_preload().len(), 1);
        assert_eq!(copy.parts().num_joints(), 4);
        assert!(copy.parts().parts().all(|(_, p)| p.num_slots() == 0));
        assert!(copy.active_controls().is_empty());
    }

    #[test]
    fn test_merge_preloads() {
        let (a, _) = bundle();
        let (b, _) = bundle();
        let mut table = AnimPreloadTable::new();
        table.add_anim("walk", 24.0, 10);
        a.set_anim_preload(table);
        let mut table = AnimPreloadTable::new();
        table.add_anim("run", 24.0, 8);
        b.set_anim_preload(table);

        a.merge_anim_preloads(&b);
        a.merge_anim_preloads(&a);
        let merged = a.anim_preload();
        assert_eq!(merged.len(), 2);
        assert!(merged.find_anim("run").is_some());
    }

    #[test]
    fn test_display_dumps_tree() {
        let (part, _) = bundle();
        let dump = part.to_string();
        assert!(dump.contains("head"));
        assert!(format!("{part:?}").contains("actor"));
    }
}
