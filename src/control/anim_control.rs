//! The handle binding one animation to one part bundle

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll, Waker};

use parking_lot::{Condvar, Mutex};

use super::interface::{AnimInterface, PlayMode};
use crate::anim::{AnimBundle, AnimChannel};
use crate::core::BitArray;
use crate::loader::ModelNode;
use crate::part::bundle::{BundleInner, PartBundle};

/// Identifies a control within its bundle's blend map
pub type ControlId = u64;

/// Lifecycle of a bind
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BindStatus {
    /// Waiting on an async load
    Pending,
    /// Bound to its animation
    Bound,
    /// The load or the bind failed; the control will never animate
    Failed,
}

/// Frame position recorded after an update
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameMark {
    pub frame: usize,
    pub frac: f64,
}

/// A control's frame state and weight, sampled once per update
#[derive(Clone, Debug)]
pub struct ControlFrame {
    pub id: ControlId,
    pub slot: Option<usize>,
    pub effect: f32,
    pub frame: usize,
    pub next_frame: usize,
    pub frac: f64,
    /// Position at the previous update, `None` before the first
    pub mark: Option<FrameMark>,
}

impl ControlFrame {
    /// True if `channel` may sample differently now than at the mark
    pub fn channel_has_changed(&self, channel: &dyn AnimChannel, frame_blend: bool) -> bool {
        let Some(mark) = self.mark else {
            return true;
        };
        let this_frac = if frame_blend { self.frac } else { 0.0 };
        channel.has_changed(mark.frame, mark.frac, self.frame, this_frac)
    }
}

struct ControlState {
    status: BindStatus,
    anim: Option<Arc<AnimBundle>>,
    anim_model: Option<Arc<ModelNode>>,
    channel_index: Option<usize>,
    bound_joints: BitArray,
    pending_done_event: Option<String>,
    wakers: Vec<Waker>,
    marked: Option<FrameMark>,
    interface: AnimInterface,
}

pub(crate) struct ControlShared {
    id: ControlId,
    name: String,
    bundle: Weak<BundleInner>,
    state: Mutex<ControlState>,
    bind_done: Condvar,
}

impl Drop for ControlShared {
    fn drop(&mut self) {
        let slot = self.state.get_mut().channel_index;
        if let Some(bundle) = self.bundle.upgrade() {
            bundle.control_released(self.id, slot);
        }
    }
}

/// Binds one [`AnimBundle`] to one [`PartBundle`] at one channel slot and
/// carries its playback state.
///
/// Cheap to clone; all clones drive the same control. When the last handle
/// goes away ([`release`](Self::release) or drop), the bundle drops the
/// control from its blend map and vacates its channel slot before the next
/// update, and its joints stop reading it.
#[derive(Clone)]
pub struct AnimControl {
    shared: Arc<ControlShared>,
}

impl AnimControl {
    pub(crate) fn new(
        id: ControlId,
        name: impl Into<String>,
        bundle: &PartBundle,
        frame_rate: f64,
        num_frames: usize,
        bound_joints: BitArray,
    ) -> Self {
        let state = ControlState {
            status: BindStatus::Pending,
            anim: None,
            anim_model: None,
            channel_index: None,
            bound_joints,
            pending_done_event: None,
            wakers: Vec::new(),
            marked: None,
            interface: AnimInterface::new(bundle.clock().clone(), frame_rate, num_frames),
        };
        Self {
            shared: Arc::new(ControlShared {
                id,
                name: name.into(),
                bundle: bundle.downgrade(),
                state: Mutex::new(state),
                bind_done: Condvar::new(),
            }),
        }
    }

    pub(crate) fn from_shared(shared: Arc<ControlShared>) -> Self {
        Self { shared }
    }

    pub(crate) fn downgrade(&self) -> Weak<ControlShared> {
        Arc::downgrade(&self.shared)
    }

    pub fn id(&self) -> ControlId {
        self.shared.id
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// The bundle this control animates, if it still exists
    pub fn part(&self) -> Option<PartBundle> {
        self.shared.bundle.upgrade().map(PartBundle::from_inner)
    }

    pub fn status(&self) -> BindStatus {
        self.shared.state.lock().status
    }

    pub fn is_pending(&self) -> bool {
        self.status() == BindStatus::Pending
    }

    /// True once bound to an animation
    pub fn has_anim(&self) -> bool {
        self.shared.state.lock().anim.is_some()
    }

    pub fn anim(&self) -> Option<Arc<AnimBundle>> {
        self.shared.state.lock().anim.clone()
    }

    /// Model the animation was loaded from, kept alive with the control
    pub fn anim_model(&self) -> Option<Arc<ModelNode>> {
        self.shared.state.lock().anim_model.clone()
    }

    pub(crate) fn set_anim_model(&self, model: Arc<ModelNode>) {
        self.shared.state.lock().anim_model = Some(model);
    }

    /// Channel slot, `None` until bound
    pub fn channel_index(&self) -> Option<usize> {
        self.shared.state.lock().channel_index
    }

    /// Joints this control drives, by joint index
    pub fn bound_joints(&self) -> BitArray {
        self.shared.state.lock().bound_joints.clone()
    }

    pub(crate) fn set_bound_joints(&self, bound_joints: BitArray) {
        self.shared.state.lock().bound_joints = bound_joints;
    }

    /// Finish a bind: record the animation, wake waiters and fire the
    /// pending-done event.
    ///
    /// # Panics
    /// If the control was already bound or failed.
    pub(crate) fn setup_anim(&self, anim: Arc<AnimBundle>, channel_index: usize, bound_joints: BitArray) {
        let (wakers, event) = {
            let mut st = self.shared.state.lock();
            assert!(
                st.status == BindStatus::Pending && st.anim.is_none(),
                "control {} already set up",
                self.shared.name
            );
            st.interface.set_frame_rate(anim.base_frame_rate());
            st.interface.set_num_frames(anim.num_frames());
            st.anim = Some(anim);
            st.channel_index = Some(channel_index);
            st.bound_joints = bound_joints;
            st.status = BindStatus::Bound;
            (std::mem::take(&mut st.wakers), st.pending_done_event.clone())
        };
        self.finish_pending(wakers, event);
    }

    /// Give up on a pending bind
    pub(crate) fn fail_anim(&self) {
        let (wakers, event) = {
            let mut st = self.shared.state.lock();
            if st.status != BindStatus::Pending {
                return;
            }
            st.status = BindStatus::Failed;
            (std::mem::take(&mut st.wakers), st.pending_done_event.clone())
        };
        log::debug!("Bind of {} failed", self.shared.name);
        self.finish_pending(wakers, event);
    }

    fn finish_pending(&self, wakers: Vec<Waker>, event: Option<String>) {
        self.shared.bind_done.notify_all();
        for waker in wakers {
            waker.wake();
        }
        if let Some(event) = event {
            self.throw_event(event);
        }
    }

    fn throw_event(&self, event: String) {
        if let Some(bundle) = self.shared.bundle.upgrade() {
            bundle.throw_event(event);
        }
    }

    /// Event sent through the bundle's event channel when the bind
    /// resolves. Sent at once if it already has.
    pub fn set_pending_done_event(&self, event: impl Into<String>) {
        let event = event.into();
        let resolved = {
            let mut st = self.shared.state.lock();
            st.pending_done_event = Some(event.clone());
            st.status != BindStatus::Pending
        };
        if resolved {
            self.throw_event(event);
        }
    }

    pub fn pending_done_event(&self) -> Option<String> {
        self.shared.state.lock().pending_done_event.clone()
    }

    /// Block until the bind resolves
    pub fn wait_pending(&self) -> BindStatus {
        let mut st = self.shared.state.lock();
        if st.status == BindStatus::Pending {
            log::info!("Blocking until {} is bound", self.shared.name);
            while st.status == BindStatus::Pending {
                self.shared.bind_done.wait(&mut st);
            }
        }
        st.status
    }

    /// Future resolving to the terminal bind status. Holds a handle on the
    /// control until it resolves.
    pub fn pending_bind(&self) -> PendingBind {
        PendingBind {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Drop this handle. The control goes away with its last handle.
    pub fn release(self) {}

    /// Number of live handles on this control
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.shared)
    }

    pub(crate) fn frame_snapshot(&self, effect: f32) -> ControlFrame {
        let st = self.shared.state.lock();
        ControlFrame {
            id: self.shared.id,
            slot: st.channel_index,
            effect,
            frame: st.interface.frame(),
            next_frame: st.interface.next_frame(),
            frac: st.interface.frac(),
            mark: st.marked,
        }
    }

    /// Remember the current frame for the next `has_changed` check
    pub(crate) fn mark_channels(&self, frame_blend: bool) {
        let mut st = self.shared.state.lock();
        let frame = st.interface.frame();
        let frac = if frame_blend { st.interface.frac() } else { 0.0 };
        st.marked = Some(FrameMark { frame, frac });
    }

    fn with_interface<R>(&self, f: impl FnOnce(&mut AnimInterface) -> R) -> R {
        f(&mut self.shared.state.lock().interface)
    }

    fn read_interface<R>(&self, f: impl FnOnce(&AnimInterface) -> R) -> R {
        f(&self.shared.state.lock().interface)
    }

    fn activated(&self) {
        if let Some(bundle) = self.part() {
            bundle.control_activated(self);
        }
    }

    /// Play once from the first frame to the last
    pub fn play(&self) {
        self.with_interface(|i| i.play());
        self.activated();
    }

    pub fn play_range(&self, from: f64, to: f64) {
        self.with_interface(|i| i.play_range(from, to));
        self.activated();
    }

    /// Loop the animation; without `restart` the current frame is kept
    pub fn loop_anim(&self, restart: bool) {
        self.with_interface(|i| i.loop_anim(restart));
        self.activated();
    }

    pub fn loop_range(&self, restart: bool, from: f64, to: f64) {
        self.with_interface(|i| i.loop_range(restart, from, to));
        self.activated();
    }

    pub fn pingpong(&self, restart: bool) {
        self.with_interface(|i| i.pingpong(restart));
        self.activated();
    }

    pub fn pingpong_range(&self, restart: bool, from: f64, to: f64) {
        self.with_interface(|i| i.pingpong_range(restart, from, to));
        self.activated();
    }

    /// Hold at `frame`
    pub fn pose(&self, frame: f64) {
        self.with_interface(|i| i.pose(frame));
        self.activated();
    }

    /// Hold at the current frame. Does not change the control's effect.
    pub fn stop(&self) {
        self.with_interface(|i| i.stop());
    }

    pub fn set_play_rate(&self, play_rate: f64) {
        self.with_interface(|i| i.set_play_rate(play_rate));
    }

    pub fn play_rate(&self) -> f64 {
        self.read_interface(|i| i.play_rate())
    }

    pub fn frame_rate(&self) -> f64 {
        self.read_interface(|i| i.frame_rate())
    }

    pub fn num_frames(&self) -> usize {
        self.read_interface(|i| i.num_frames())
    }

    pub fn frame(&self) -> usize {
        self.read_interface(|i| i.frame())
    }

    pub fn next_frame(&self) -> usize {
        self.read_interface(|i| i.next_frame())
    }

    pub fn frac(&self) -> f64 {
        self.read_interface(|i| i.frac())
    }

    pub fn full_frame(&self) -> i64 {
        self.read_interface(|i| i.full_frame())
    }

    pub fn full_fframe(&self) -> f64 {
        self.read_interface(|i| i.full_fframe())
    }

    pub fn is_playing(&self) -> bool {
        self.read_interface(|i| i.is_playing())
    }

    pub fn play_mode(&self) -> PlayMode {
        self.read_interface(|i| i.play_mode())
    }
}

impl PartialEq for AnimControl {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl Eq for AnimControl {}

impl fmt::Debug for AnimControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let st = self.shared.state.lock();
        f.debug_struct("AnimControl")
            .field("id", &self.shared.id)
            .field("name", &self.shared.name)
            .field("status", &st.status)
            .field("channel_index", &st.channel_index)
            .field("interface", &st.interface)
            .finish()
    }
}

impl fmt::Display for AnimControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let st = self.shared.state.lock();
        write!(f, "AnimControl({}", self.shared.name)?;
        match st.status {
            BindStatus::Pending => write!(f, ", pending")?,
            BindStatus::Failed => write!(f, ", failed")?,
            BindStatus::Bound => {}
        }
        write!(f, ", {:?} frame {}/{})", st.interface.play_mode(), st.interface.frame(), st.interface.num_frames())
    }
}

/// Resolves when a pending bind finishes, bound or failed
pub struct PendingBind {
    shared: Arc<ControlShared>,
}

impl Future for PendingBind {
    type Output = BindStatus;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<BindStatus> {
        let mut st = self.shared.state.lock();
        if st.status != BindStatus::Pending {
            return Poll::Ready(st.status);
        }
        if !st.wakers.iter().any(|w| w.will_wake(cx.waker())) {
            st.wakers.push(cx.waker().clone());
        }
        Poll::Pending
    }
}
