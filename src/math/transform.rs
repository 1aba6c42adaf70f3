//! Joint transform decomposition: scale, shear, rotation, translation
//!
//! Matrices are column-major (glam convention) and compose as
//! `T * R * Sh * S`, where `Sh` is the upper-triangular shear with factors
//! `(xy, xz, yz)`. Heading/pitch/roll are degrees about Z, X and Y.

use glam::{EulerRot, Mat3, Mat4, Quat, Vec3};

const EPSILON: f32 = 1.0e-8;

/// A matrix split into its blendable components
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Components {
    pub scale: Vec3,
    pub shear: Vec3,
    pub rotation: Quat,
    pub translation: Vec3,
}

impl Components {
    pub const IDENTITY: Self = Self {
        scale: Vec3::ONE,
        shear: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        translation: Vec3::ZERO,
    };

    /// Build from heading/pitch/roll in degrees
    pub fn from_hpr(scale: Vec3, shear: Vec3, hpr: Vec3, translation: Vec3) -> Self {
        Self {
            scale,
            shear,
            rotation: quat_from_hpr(hpr),
            translation,
        }
    }

    /// Rotation as heading/pitch/roll in degrees
    pub fn hpr(&self) -> Vec3 {
        hpr_from_quat(self.rotation)
    }

    /// Recompose into a matrix
    pub fn to_matrix(&self) -> Mat4 {
        compose(self.scale, self.shear, self.rotation, self.translation)
    }

    /// The rotation and translation only
    pub fn to_matrix_no_scale_shear(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.rotation, self.translation)
    }

    /// Decompose a matrix
    pub fn from_matrix(m: &Mat4) -> Self {
        decompose(m)
    }
}

impl Default for Components {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Heading/pitch/roll (degrees) to quaternion
pub fn quat_from_hpr(hpr: Vec3) -> Quat {
    Quat::from_euler(
        EulerRot::ZXY,
        hpr.x.to_radians(),
        hpr.y.to_radians(),
        hpr.z.to_radians(),
    )
}

/// Quaternion to heading/pitch/roll (degrees)
pub fn hpr_from_quat(q: Quat) -> Vec3 {
    let (h, p, r) = q.to_euler(EulerRot::ZXY);
    Vec3::new(h.to_degrees(), p.to_degrees(), r.to_degrees())
}

fn scale_shear_matrix(scale: Vec3, shear: Vec3) -> Mat3 {
    Mat3::from_cols(
        Vec3::new(scale.x, 0.0, 0.0),
        Vec3::new(shear.x * scale.y, scale.y, 0.0),
        Vec3::new(shear.y * scale.z, shear.z * scale.z, scale.z),
    )
}

/// Compose `T * R * Sh * S`
pub fn compose(scale: Vec3, shear: Vec3, rotation: Quat, translation: Vec3) -> Mat4 {
    let upper = Mat3::from_quat(rotation) * scale_shear_matrix(scale, shear);
    let mut m = Mat4::from_mat3(upper);
    m.w_axis = translation.extend(1.0);
    m
}

/// Split a matrix into scale, shear, rotation and translation.
///
/// The upper 3x3 is factored as `R * U` by Gram-Schmidt on its columns. A
/// reflection is folded into a negative z scale so `R` stays a rotation.
pub fn decompose(m: &Mat4) -> Components {
    let a0 = m.x_axis.truncate();
    let a1 = m.y_axis.truncate();
    let a2 = m.z_axis.truncate();
    let translation = m.w_axis.truncate();

    let sx = a0.length();
    let r0 = if sx > EPSILON { a0 / sx } else { Vec3::X };

    let d01 = a1.dot(r0);
    let u1 = a1 - r0 * d01;
    let sy = u1.length();
    let r1 = if sy > EPSILON {
        u1 / sy
    } else {
        any_orthogonal(r0)
    };

    let d02 = a2.dot(r0);
    let d12 = a2.dot(r1);
    let u2 = a2 - r0 * d02 - r1 * d12;
    let mut sz = u2.length();
    let mut r2 = if sz > EPSILON { u2 / sz } else { r0.cross(r1) };

    if r0.cross(r1).dot(r2) < 0.0 {
        r2 = -r2;
        sz = -sz;
    }

    let shear = Vec3::new(
        if sy.abs() > EPSILON { d01 / sy } else { 0.0 },
        if sz.abs() > EPSILON { d02 / sz } else { 0.0 },
        if sz.abs() > EPSILON { d12 / sz } else { 0.0 },
    );

    let rotation = Quat::from_mat3(&Mat3::from_cols(r0, r1, r2)).normalize();

    Components {
        scale: Vec3::new(sx, sy, sz),
        shear,
        rotation,
        translation,
    }
}

fn any_orthogonal(v: Vec3) -> Vec3 {
    let other = if v.x.abs() < 0.9 { Vec3::X } else { Vec3::Y };
    v.cross(other).normalize()
}
