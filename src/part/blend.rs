//! Blend modes and the weighted blend of channel samples

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use glam::{Mat4, Quat, Vec3, Vec4};
use serde::{Deserialize, Serialize};

use crate::anim::{AnimChannel, ChannelValue, ValueKind};
use crate::math::{compose, decompose, quat_from_hpr, Components};

/// How matrix joints combine contributions from several animations (or two
/// neighbouring frames)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendType {
    /// Plain weighted sum of matrices
    Linear,
    /// Rotation and translation summed, scale and shear blended apart,
    /// result re-orthonormalized
    #[default]
    NormalizedLinear,
    /// Scale, shear, hpr and translation blended independently
    Componentwise,
    /// Like `Componentwise`, rotation blended as a quaternion
    ComponentwiseQuat,
}

impl fmt::Display for BlendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BlendType::Linear => "linear",
            BlendType::NormalizedLinear => "normalized_linear",
            BlendType::Componentwise => "componentwise",
            BlendType::ComponentwiseQuat => "componentwise_quat",
        };
        f.write_str(name)
    }
}

impl FromStr for BlendType {
    type Err = std::convert::Infallible;

    /// Case-insensitive. Unknown words log an error and give `Linear`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let blend = match s.to_ascii_lowercase().as_str() {
            "linear" => BlendType::Linear,
            "normalized_linear" => BlendType::NormalizedLinear,
            "componentwise" => BlendType::Componentwise,
            "componentwise_quat" => BlendType::ComponentwiseQuat,
            _ => {
                log::error!("Invalid BlendType value: {s}");
                BlendType::Linear
            }
        };
        Ok(blend)
    }
}

/// One weighted sample in a blend
#[derive(Clone, Copy)]
pub struct Contribution<'a> {
    pub channel: &'a Arc<dyn AnimChannel>,
    pub frame: usize,
    pub weight: f32,
}

impl fmt::Debug for Contribution<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Contribution")
            .field("frame", &self.frame)
            .field("weight", &self.weight)
            .finish()
    }
}

impl Contribution<'_> {
    fn value(&self) -> ChannelValue {
        self.channel.value(self.frame)
    }

    fn components(&self) -> Components {
        self.channel
            .components(self.frame)
            .or_else(|| self.value().as_matrix().map(|m| decompose(&m)))
            .unwrap_or(Components::IDENTITY)
    }
}

/// Blend `contributions` whose weights sum to `net`.
///
/// Returns `None` when nothing contributes or `net` is zero. A single
/// contribution is returned exactly as sampled, whatever the mode.
pub fn blend_values(
    kind: ValueKind,
    blend_type: BlendType,
    contributions: &[Contribution<'_>],
    net: f32,
) -> Option<ChannelValue> {
    if contributions.is_empty() || net == 0.0 {
        return None;
    }
    if let [only] = contributions {
        return Some(only.value());
    }

    let value = match kind {
        ValueKind::Scalar => {
            let sum: f32 = contributions
                .iter()
                .map(|c| c.value().as_scalar().unwrap_or(0.0) * c.weight)
                .sum();
            ChannelValue::Scalar(sum / net)
        }
        ValueKind::Matrix => ChannelValue::Matrix(match blend_type {
            BlendType::Linear => blend_linear(contributions, net),
            BlendType::NormalizedLinear => blend_normalized_linear(contributions, net),
            BlendType::Componentwise => blend_componentwise(contributions, net),
            BlendType::ComponentwiseQuat => blend_componentwise_quat(contributions, net),
        }),
    };
    Some(value)
}

fn blend_linear(contributions: &[Contribution<'_>], net: f32) -> Mat4 {
    let sum = contributions.iter().fold(Mat4::ZERO, |acc, c| {
        let m = c.value().as_matrix().unwrap_or(Mat4::IDENTITY);
        acc + m.mul_scalar(c.weight)
    });
    sum.mul_scalar(1.0 / net)
}

fn blend_normalized_linear(contributions: &[Contribution<'_>], net: f32) -> Mat4 {
    let mut rot_pos = Mat4::ZERO;
    let mut scale = Vec3::ZERO;
    let mut shear = Vec3::ZERO;
    for c in contributions {
        let parts = c.components();
        rot_pos = rot_pos + parts.to_matrix_no_scale_shear().mul_scalar(c.weight);
        scale += parts.scale * c.weight;
        shear += parts.shear * c.weight;
    }
    let inv = 1.0 / net;
    let rot_pos = rot_pos.mul_scalar(inv);

    // The summed rotation has picked up scale and shear of its own; keep only
    // its orthonormal part.
    let blended = decompose(&rot_pos);
    compose(scale * inv, shear * inv, blended.rotation, blended.translation)
}

fn blend_componentwise(contributions: &[Contribution<'_>], net: f32) -> Mat4 {
    let mut scale = Vec3::ZERO;
    let mut shear = Vec3::ZERO;
    let mut hpr = Vec3::ZERO;
    let mut pos = Vec3::ZERO;
    for c in contributions {
        let parts = c.components();
        scale += parts.scale * c.weight;
        shear += parts.shear * c.weight;
        hpr += parts.hpr() * c.weight;
        pos += parts.translation * c.weight;
    }
    let inv = 1.0 / net;
    compose(scale * inv, shear * inv, quat_from_hpr(hpr * inv), pos * inv)
}

fn blend_componentwise_quat(contributions: &[Contribution<'_>], net: f32) -> Mat4 {
    let mut scale = Vec3::ZERO;
    let mut shear = Vec3::ZERO;
    let mut quat = Vec4::ZERO;
    let mut pos = Vec3::ZERO;
    let mut reference: Option<Quat> = None;
    for c in contributions {
        let parts = c.components();
        let q = parts.rotation;
        // q and -q are the same rotation; sum in one hemisphere.
        let q = match reference {
            Some(r) if r.dot(q) < 0.0 => -q,
            Some(_) => q,
            None => {
                reference = Some(q);
                q
            }
        };
        scale += parts.scale * c.weight;
        shear += parts.shear * c.weight;
        quat += Vec4::from(q) * c.weight;
        pos += parts.translation * c.weight;
    }
    let inv = 1.0 / net;
    let rotation = if quat.length_squared() > f32::EPSILON {
        Quat::from_vec4(quat).normalize()
    } else {
        Quat::IDENTITY
    };
    compose(scale * inv, shear * inv, rotation, pos * inv)
}
