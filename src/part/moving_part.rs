//! Animatable joints and sliders

use std::sync::Arc;

use glam::Mat4;

use super::blend::{blend_values, BlendType, Contribution};
use crate::anim::{AnimChannel, ChannelValue, FixedChannel, ValueKind};
use crate::control::{ControlFrame, ControlId};

/// The one channel driving a joint when exactly one bound control reaches it
#[derive(Clone, Debug)]
pub struct EffectiveChannel {
    pub control: ControlId,
    pub channel: Arc<dyn AnimChannel>,
}

/// Per-update inputs shared by every joint
pub(crate) struct UpdateContext<'a> {
    pub controls: &'a [ControlFrame],
    pub anim_changed: bool,
    pub frame_blend: bool,
    pub blend_type: BlendType,
    pub restore_initial_pose: bool,
}

/// A joint (matrix) or slider (scalar) with its per-slot channel bindings
#[derive(Clone, Debug)]
pub struct MovingPart {
    value: ChannelValue,
    default_value: ChannelValue,
    /// World transform for joints; identity for sliders
    net_transform: Mat4,
    /// Indexed by channel slot; `None` entries are holes
    channels: Vec<Option<Arc<dyn AnimChannel>>>,
    forced_channel: Option<Arc<dyn AnimChannel>>,
    effective: Option<EffectiveChannel>,
}

impl MovingPart {
    pub fn new(default_value: ChannelValue) -> Self {
        Self {
            value: default_value,
            default_value,
            net_transform: Mat4::IDENTITY,
            channels: Vec::new(),
            forced_channel: None,
            effective: None,
        }
    }

    pub fn joint(default_value: Mat4) -> Self {
        Self::new(ChannelValue::Matrix(default_value))
    }

    pub fn slider(default_value: f32) -> Self {
        Self::new(ChannelValue::Scalar(default_value))
    }

    pub fn kind(&self) -> ValueKind {
        self.default_value.kind()
    }

    /// Value resolved by the last update
    pub fn value(&self) -> ChannelValue {
        self.value
    }

    pub fn default_value(&self) -> ChannelValue {
        self.default_value
    }

    /// World transform: parent net times local value
    pub fn net_transform(&self) -> Mat4 {
        self.net_transform
    }

    /// Number of slots in the channel table, holes included
    pub fn num_slots(&self) -> usize {
        self.channels.len()
    }

    /// Channel bound at `slot`, if any
    pub fn channel(&self, slot: usize) -> Option<&Arc<dyn AnimChannel>> {
        self.channels.get(slot).and_then(|c| c.as_ref())
    }

    pub fn forced_channel(&self) -> Option<&Arc<dyn AnimChannel>> {
        self.forced_channel.as_ref()
    }

    pub fn effective_channel(&self) -> Option<&EffectiveChannel> {
        self.effective.as_ref()
    }

    /// A channel replaying this part's own default value
    pub fn make_default_channel(&self) -> Arc<dyn AnimChannel> {
        Arc::new(FixedChannel::new(self.default_value))
    }

    /// Grow the table to cover `slot` and check it is vacant.
    ///
    /// # Panics
    /// If the slot is already bound; slots are chosen free across the tree.
    pub(crate) fn reserve_slot(&mut self, slot: usize) {
        if self.channels.len() <= slot {
            self.channels.resize(slot + 1, None);
        }
        assert!(self.channels[slot].is_none(), "channel slot {slot} already bound");
    }

    pub(crate) fn bind_slot(&mut self, slot: usize, channel: Arc<dyn AnimChannel>) {
        self.reserve_slot(slot);
        debug_assert_eq!(channel.kind(), self.kind());
        self.channels[slot] = Some(channel);
    }

    /// Vacate a slot, leaving a hole
    pub(crate) fn unbind_slot(&mut self, slot: usize) -> Option<Arc<dyn AnimChannel>> {
        self.channels.get_mut(slot).and_then(Option::take)
    }

    /// Narrow the free-slot candidates to slots vacant here too
    pub(crate) fn pick_channel_index(&self, holes: &mut Vec<usize>, next: &mut usize) {
        holes.retain(|&h| self.channels.get(h).is_none_or(|c| c.is_none()));
        if *next < self.channels.len() {
            holes.extend((*next..self.channels.len()).filter(|&i| self.channels[i].is_none()));
            *next = self.channels.len();
        }
    }

    /// Replace the forced channel. A channel of the wrong kind is refused.
    pub(crate) fn set_forced_channel(&mut self, channel: Option<Arc<dyn AnimChannel>>) -> bool {
        if let Some(ch) = &channel
            && ch.kind() != self.kind()
        {
            return false;
        }
        self.forced_channel = channel;
        true
    }

    /// Cache the channel in effect when exactly one active control reaches
    /// this part
    pub(crate) fn determine_effective_channel(&mut self, active: &[(ControlId, usize)]) {
        let mut found: Option<EffectiveChannel> = None;
        for &(control, slot) in active {
            if let Some(channel) = self.channel(slot) {
                if found.is_some() {
                    self.effective = None;
                    return;
                }
                found = Some(EffectiveChannel {
                    control,
                    channel: Arc::clone(channel),
                });
            }
        }
        self.effective = found;
    }

    /// True if this part must be re-evaluated this tick
    pub(crate) fn needs_update(&self, ctx: &UpdateContext<'_>) -> bool {
        if ctx.anim_changed {
            return true;
        }
        if let Some(forced) = &self.forced_channel {
            return forced.has_changed(0, 0.0, 0, 0.0);
        }
        if let Some(eff) = &self.effective {
            return match ctx.controls.iter().find(|c| c.id == eff.control) {
                Some(frame) => frame.channel_has_changed(eff.channel.as_ref(), ctx.frame_blend),
                None => true,
            };
        }
        ctx.controls.iter().any(|frame| {
            frame
                .slot
                .and_then(|slot| self.channel(slot))
                .is_some_and(|ch| frame.channel_has_changed(ch.as_ref(), ctx.frame_blend))
        })
    }

    /// Resolve the value from the forced channel or the blend of every
    /// contributing control
    pub(crate) fn update_value(&mut self, ctx: &UpdateContext<'_>) {
        if let Some(forced) = &self.forced_channel {
            self.value = forced.value(0);
            return;
        }

        if ctx.controls.is_empty() {
            if ctx.restore_initial_pose {
                self.value = self.default_value;
            }
            return;
        }

        if let Some(eff) = &self.effective
            && !ctx.frame_blend
            && let Some(frame) = ctx.controls.iter().find(|c| c.id == eff.control)
        {
            self.value = eff.channel.value(frame.frame);
            return;
        }

        let blended = self.blend_controls(ctx, ctx.controls);
        match blended {
            Some(value) => self.value = value,
            None => {
                if ctx.restore_initial_pose {
                    self.value = self.default_value;
                }
            }
        }
    }

    /// Weighted blend over `controls`, ignoring the effective-channel cache
    pub(crate) fn blend_controls(
        &self,
        ctx: &UpdateContext<'_>,
        controls: &[ControlFrame],
    ) -> Option<ChannelValue> {
        let mut contributions: Vec<Contribution<'_>> = Vec::with_capacity(controls.len() * 2);
        let mut net = 0.0f32;
        for frame in controls {
            let Some(channel) = frame.slot.and_then(|slot| self.channel(slot)) else {
                continue;
            };
            if ctx.frame_blend {
                let frac = frame.frac as f32;
                let w0 = frame.effect * (1.0 - frac);
                let w1 = frame.effect * frac;
                if w0 != 0.0 {
                    contributions.push(Contribution { channel, frame: frame.frame, weight: w0 });
                }
                if w1 != 0.0 {
                    contributions.push(Contribution { channel, frame: frame.next_frame, weight: w1 });
                }
            } else {
                contributions.push(Contribution {
                    channel,
                    frame: frame.frame,
                    weight: frame.effect,
                });
            }
            net += frame.effect;
        }
        blend_values(self.kind(), ctx.blend_type, &contributions, net)
    }

    /// Refresh derived state from the parent's world transform. Returns the
    /// transform children should use as their parent.
    pub(crate) fn update_internals(&mut self, parent_net: Mat4) -> Mat4 {
        match self.value {
            ChannelValue::Matrix(local) => {
                self.net_transform = parent_net * local;
                self.net_transform
            }
            ChannelValue::Scalar(_) => parent_net,
        }
    }

    /// Copy of the structure: same defaults, no bindings or overrides
    pub(crate) fn unbound_copy(&self) -> Self {
        Self::new(self.default_value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anim::ScalarTable;
    use crate::control::FrameMark;

    fn frame(id: ControlId, slot: usize, effect: f32, f: usize) -> ControlFrame {
        ControlFrame {
            id,
            slot: Some(slot),
            effect,
            frame: f,
            next_frame: f + 1,
            frac: 0.0,
            mark: None,
        }
    }

    fn ctx(controls: &[ControlFrame]) -> UpdateContext<'_> {
        UpdateContext {
            controls,
            anim_changed: false,
            frame_blend: false,
            blend_type: BlendType::NormalizedLinear,
            restore_initial_pose: true,
        }
    }

    #[test]
    fn test_pick_channel_index_reuses_holes() {
        let ch: Arc<dyn AnimChannel> = Arc::new(FixedChannel::scalar(1.0));
        let mut a = MovingPart::slider(0.0);
        let mut b = MovingPart::slider(0.0);
        a.bind_slot(0, Arc::clone(&ch));
        a.bind_slot(2, Arc::clone(&ch));
        b.bind_slot(0, Arc::clone(&ch));
        b.bind_slot(1, Arc::clone(&ch));

        let (mut holes, mut next) = (Vec::new(), 0);
        a.pick_channel_index(&mut holes, &mut next);
        assert_eq!((holes.clone(), next), (vec![1], 3));
        b.pick_channel_index(&mut holes, &mut next);
        assert!(holes.is_empty());
        assert_eq!(next, 3);

        b.unbind_slot(1);
        a.unbind_slot(2);
        let (mut holes, mut next) = (Vec::new(), 0);
        a.pick_channel_index(&mut holes, &mut next);
        b.pick_channel_index(&mut holes, &mut next);
        assert_eq!(holes.first(), Some(&1));
    }

    #[test]
    #[should_panic(expected = "already bound")]
    fn test_double_bind_panics() {
        let mut part = MovingPart::slider(0.0);
        part.bind_slot(0, Arc::new(FixedChannel::scalar(1.0)));
        part.bind_slot(0, Arc::new(FixedChannel::scalar(2.0)));
    }

    #[test]
    fn test_effective_channel_only_for_single_control() {
        let mut part = MovingPart::slider(0.0);
        part.bind_slot(0, Arc::new(FixedChannel::scalar(1.0)));
        part.bind_slot(1, Arc::new(FixedChannel::scalar(2.0)));

        part.determine_effective_channel(&[(7, 0)]);
        assert_eq!(part.effective_channel().map(|e| e.control), Some(7));
        part.determine_effective_channel(&[(7, 0), (8, 1)]);
        assert!(part.effective_channel().is_none());
        part.determine_effective_channel(&[(7, 0), (8, 5)]);
        assert_eq!(part.effective_channel().map(|e| e.control), Some(7));
        part.determine_effective_channel(&[]);
        assert!(part.effective_channel().is_none());
    }

    #[test]
    fn test_forced_channel_wins() {
        let mut part = MovingPart::slider(0.0);
        part.bind_slot(0, Arc::new(FixedChannel::scalar(1.0)));
        assert!(!part.set_forced_channel(Some(Arc::new(FixedChannel::matrix(Mat4::IDENTITY)))));
        assert!(part.set_forced_channel(Some(Arc::new(FixedChannel::scalar(9.0)))));
        let controls = [frame(1, 0, 1.0, 0)];
        part.update_value(&ctx(&controls));
        assert_eq!(part.value(), ChannelValue::Scalar(9.0));
    }

    #[test]
    fn test_restore_initial_pose() {
        let mut part = MovingPart::slider(0.25);
        part.bind_slot(0, Arc::new(FixedChannel::scalar(1.0)));
        part.determine_effective_channel(&[(1, 0)]);
        part.update_value(&ctx(&[frame(1, 0, 1.0, 0)]));
        assert_eq!(part.value(), ChannelValue::Scalar(1.0));

        part.determine_effective_channel(&[]);
        let mut c = ctx(&[]);
        c.restore_initial_pose = false;
        part.update_value(&c);
        assert_eq!(part.value(), ChannelValue::Scalar(1.0));
        part.update_value(&ctx(&[]));
        assert_eq!(part.value(), ChannelValue::Scalar(0.25));
    }

    #[test]
    fn test_frame_interpolation() {
        let mut part = MovingPart::slider(0.0);
        part.bind_slot(0, Arc::new(ScalarTable::new(vec![0.0, 10.0, 20.0])));
        let mut f = frame(1, 0, 1.0, 1);
        f.frac = 0.25;
        f.next_frame = 2;
        let controls = [f];
        let mut c = ctx(&controls);
        c.frame_blend = true;
        part.update_value(&c);
        assert!((part.value().as_scalar().unwrap() - 12.5).abs() < 1e-5);
    }

    #[test]
    fn test_needs_update_follows_marks() {
        let mut part = MovingPart::slider(0.0);
        part.bind_slot(0, Arc::new(ScalarTable::new(vec![0.0, 1.0])));
        part.determine_effective_channel(&[(1, 0)]);

        let mut f = frame(1, 0, 1.0, 1);
        assert!(part.needs_update(&ctx(&[f.clone()])));
        f.mark = Some(FrameMark { frame: 1, frac: 0.0 });
        assert!(!part.needs_update(&ctx(&[f.clone()])));
        f.mark = Some(FrameMark { frame: 0, frac: 0.0 });
        assert!(part.needs_update(&ctx(&[f])));
    }

    #[test]
    fn test_net_transform() {
        let mut part = MovingPart::joint(Mat4::from_translation(glam::Vec3::X));
        let net = part.update_internals(Mat4::from_translation(glam::Vec3::Y));
        assert_eq!(net, Mat4::from_translation(glam::Vec3::new(1.0, 1.0, 0.0)));
        assert_eq!(part.net_transform(), net);
    }
}
