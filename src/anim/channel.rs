//! Per-frame value sources attached to joints

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use glam::Mat4;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::core::Error;
use crate::math::Components;

/// The value type carried by a channel or moving part
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    /// A 4x4 joint transform
    Matrix,
    /// A scalar slider (e.g. a morph weight)
    Scalar,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueKind::Matrix => write!(f, "matrix"),
            ValueKind::Scalar => write!(f, "scalar"),
        }
    }
}

/// A sampled channel or joint value
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ChannelValue {
    Matrix(Mat4),
    Scalar(f32),
}

impl ChannelValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            ChannelValue::Matrix(_) => ValueKind::Matrix,
            ChannelValue::Scalar(_) => ValueKind::Scalar,
        }
    }

    pub fn as_matrix(&self) -> Option<Mat4> {
        match self {
            ChannelValue::Matrix(m) => Some(*m),
            ChannelValue::Scalar(_) => None,
        }
    }

    pub fn as_scalar(&self) -> Option<f32> {
        match self {
            ChannelValue::Scalar(v) => Some(*v),
            ChannelValue::Matrix(_) => None,
        }
    }

    /// The neutral value of a kind: identity or zero
    pub fn identity(kind: ValueKind) -> Self {
        match kind {
            ValueKind::Matrix => ChannelValue::Matrix(Mat4::IDENTITY),
            ValueKind::Scalar => ChannelValue::Scalar(0.0),
        }
    }
}

/// A per-frame value source for one joint of one animation.
///
/// Channels are immutable once attached to an anim bundle (dynamic channels
/// read a shared handle) and are shared between every part bundle the
/// animation is bound to.
pub trait AnimChannel: Send + Sync + fmt::Debug {
    fn kind(&self) -> ValueKind;

    /// Sample the channel at an integer frame
    fn value(&self, frame: usize) -> ChannelValue;

    /// Sample as scale/shear/rotation/translation. `None` for scalars.
    fn components(&self, frame: usize) -> Option<Components> {
        self.value(frame).as_matrix().map(|m| Components::from_matrix(&m))
    }

    /// True if sampling at `(this_frame, this_frac)` may give a different
    /// result than `(last_frame, last_frac)`.
    fn has_changed(&self, last_frame: usize, last_frac: f64, this_frame: usize, this_frac: f64) -> bool;

    /// Validate table lengths against the owning bundle's frame count
    fn check_frame_count(&self, _num_frames: usize) -> Result<(), Error> {
        Ok(())
    }
}

/// Index a 0/1/N table. Empty tables yield `default`.
pub(crate) fn table_value<T: Copy>(table: &[T], frame: usize, default: T) -> T {
    match table.len() {
        0 => default,
        1 => table[0],
        n => table[frame % n],
    }
}

/// `has_changed` for one table under the 0/1/N rules
pub(crate) fn table_has_changed<T: PartialEq>(
    table: &[T],
    last_frame: usize,
    last_frac: f64,
    this_frame: usize,
    this_frac: f64,
) -> bool {
    let n = table.len();
    if n <= 1 {
        return false;
    }
    if last_frame != this_frame && table[last_frame % n] != table[this_frame % n] {
        return true;
    }
    // With a fractional change we blend toward the following frame, so that
    // one matters too.
    last_frac != this_frac && table[last_frame % n] != table[(this_frame + 1) % n]
}

/// Check a table length against a bundle frame count
pub(crate) fn check_table_len(name: &str, len: usize, num_frames: usize) -> Result<(), Error> {
    if len <= 1 || len == num_frames {
        Ok(())
    } else {
        Err(Error::FrameCount {
            channel: name.to_string(),
            len,
            expected: num_frames,
        })
    }
}

/// A constant channel. Also stands in for joints the animation lacks,
/// replaying the joint's own default value.
#[derive(Clone, Debug)]
pub struct FixedChannel {
    value: ChannelValue,
    components: Option<Components>,
}

impl FixedChannel {
    pub fn new(value: ChannelValue) -> Self {
        let components = value.as_matrix().map(|m| Components::from_matrix(&m));
        Self { value, components }
    }

    pub fn matrix(m: Mat4) -> Self {
        Self::new(ChannelValue::Matrix(m))
    }

    pub fn scalar(v: f32) -> Self {
        Self::new(ChannelValue::Scalar(v))
    }

    /// A fixed matrix from components
    pub fn from_components(c: Components) -> Self {
        Self {
            value: ChannelValue::Matrix(c.to_matrix()),
            components: Some(c),
        }
    }
}

impl AnimChannel for FixedChannel {
    fn kind(&self) -> ValueKind {
        self.value.kind()
    }

    fn value(&self, _frame: usize) -> ChannelValue {
        self.value
    }

    fn components(&self, _frame: usize) -> Option<Components> {
        self.components
    }

    fn has_changed(&self, _: usize, _: f64, _: usize, _: f64) -> bool {
        false
    }
}

#[derive(Debug)]
struct DynamicInner {
    value: RwLock<ChannelValue>,
    version: AtomicU64,
}

/// A value pushed by external code, read by a [`DynamicChannel`].
///
/// Clones share the same slot; the kind is fixed by the first value.
#[derive(Clone, Debug)]
pub struct DynamicValue {
    inner: Arc<DynamicInner>,
}

impl DynamicValue {
    pub fn new(value: ChannelValue) -> Self {
        Self {
            inner: Arc::new(DynamicInner {
                value: RwLock::new(value),
                version: AtomicU64::new(0),
            }),
        }
    }

    pub fn matrix(m: Mat4) -> Self {
        Self::new(ChannelValue::Matrix(m))
    }

    pub fn scalar(v: f32) -> Self {
        Self::new(ChannelValue::Scalar(v))
    }

    pub fn kind(&self) -> ValueKind {
        self.inner.value.read().kind()
    }

    pub fn get(&self) -> ChannelValue {
        *self.inner.value.read()
    }

    /// Push a new value. A value of the wrong kind is ignored with a warning.
    pub fn set(&self, value: ChannelValue) {
        let mut slot = self.inner.value.write();
        if slot.kind() != value.kind() {
            log::warn!("Ignoring {} value pushed to a {} dynamic channel", value.kind(), slot.kind());
            return;
        }
        if *slot != value {
            *slot = value;
            self.inner.version.fetch_add(1, Ordering::AcqRel);
        }
    }

    fn version(&self) -> u64 {
        self.inner.version.load(Ordering::Acquire)
    }
}

/// A channel whose value is supplied each tick by external code
#[derive(Debug)]
pub struct DynamicChannel {
    source: DynamicValue,
    last_seen: AtomicU64,
}

impl DynamicChannel {
    pub fn new(source: DynamicValue) -> Self {
        let last_seen = AtomicU64::new(source.version());
        Self { source, last_seen }
    }

    pub fn source(&self) -> &DynamicValue {
        &self.source
    }
}

impl AnimChannel for DynamicChannel {
    fn kind(&self) -> ValueKind {
        self.source.kind()
    }

    fn value(&self, _frame: usize) -> ChannelValue {
        self.source.get()
    }

    fn has_changed(&self, _: usize, _: f64, _: usize, _: f64) -> bool {
        let version = self.source.version();
        self.last_seen.swap(version, Ordering::AcqRel) != version
    }
}
