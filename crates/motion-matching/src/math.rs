//! Scalar and quaternion helpers that glam does not provide directly.

use glam::{Mat3, Quat, Vec3};
use std::f32::consts::{FRAC_PI_2, LN_2, PI};

/// Rational approximation of `exp(-x)`, accurate for `x >= 0`.
#[inline]
pub fn fast_negexp(x: f32) -> f32 {
    1.0 / (1.0 + x + 0.48 * x * x + 0.235 * x * x * x)
}

#[inline]
pub fn halflife_to_damping(halflife: f32) -> f32 {
    (4.0 * LN_2) / (halflife + 1e-5)
}

#[inline]
pub fn damping_to_halflife(damping: f32) -> f32 {
    (4.0 * LN_2) / (damping + 1e-5)
}

#[inline]
pub fn frequency_to_stiffness(frequency: f32) -> f32 {
    let omega = 2.0 * PI * frequency;
    omega * omega
}

#[inline]
pub fn stiffness_to_frequency(stiffness: f32) -> f32 {
    stiffness.sqrt() / (2.0 * PI)
}

/// Pick the hemisphere with a non-negative scalar part
#[inline]
pub fn quat_abs(q: Quat) -> Quat {
    if q.w < 0.0 { -q } else { q }
}

/// Quaternion logarithm (half the scaled-axis rotation)
pub fn quat_log(q: Quat) -> Vec3 {
    let [x, y, z, w] = q.to_array();
    let v = Vec3::new(x, y, z);
    let length = v.length();
    if length < 1e-8 {
        v
    } else {
        let halfangle = w.clamp(-1.0, 1.0).acos();
        v * (halfangle / length)
    }
}

/// Quaternion exponential, inverse of [`quat_log`]
pub fn quat_exp(v: Vec3) -> Quat {
    let halfangle = v.length();
    if halfangle < 1e-8 {
        Quat::from_xyzw(v.x, v.y, v.z, 1.0).normalize()
    } else {
        let c = halfangle.cos();
        let s = halfangle.sin() / halfangle;
        Quat::from_xyzw(s * v.x, s * v.y, s * v.z, c)
    }
}

/// Rotation as axis scaled by angle in radians
#[inline]
pub fn quat_to_scaled_axis(q: Quat) -> Vec3 {
    2.0 * quat_log(q)
}

#[inline]
pub fn quat_from_scaled_axis(v: Vec3) -> Quat {
    quat_exp(v * 0.5)
}

/// Rotation whose matrix has `x` and `y` as its first two columns.
///
/// The third column is rebuilt as `x × y`, then `y` is re-orthogonalized.
pub fn quat_from_xform_xy(x: Vec3, y: Vec3) -> Quat {
    let c2 = x.cross(y).normalize();
    let c1 = c2.cross(x).normalize();
    let c0 = x.normalize();
    Quat::from_mat3(&Mat3::from_cols(c0, c1, c2)).normalize()
}

/// Change of basis from a right-handed Y-up frame to a right-handed Z-up frame
pub fn y_up_to_z_up() -> Quat {
    Quat::from_rotation_x(FRAC_PI_2)
}

/// Yaw-only rotation about +Y
#[inline]
pub fn yaw(angle: f32) -> Quat {
    Quat::from_axis_angle(Vec3::Y, angle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quat_close(a: Quat, b: Quat) -> bool {
        a.dot(b).abs() > 1.0 - 1e-5
    }

    #[test]
    fn test_fast_negexp_tracks_exp() {
        for i in 0..10 {
            let x = i as f32 * 0.1;
            assert!((fast_negexp(x) - (-x).exp()).abs() < 0.01, "x = {x}");
        }
        assert_eq!(fast_negexp(0.0), 1.0);
    }

    #[test]
    fn test_scaled_axis_roundtrip() {
        let q = Quat::from_axis_angle(Vec3::new(1.0, 2.0, -0.5).normalize(), 1.3);
        let v = quat_to_scaled_axis(q);
        assert!((v.length() - 1.3).abs() < 1e-4);
        assert!(quat_close(quat_from_scaled_axis(v), q));
    }

    #[test]
    fn test_quat_abs_flips_negative_w() {
        let q = Quat::from_xyzw(0.0, 0.6, 0.0, -0.8);
        assert_eq!(quat_abs(q).to_array(), [0.0, -0.6, 0.0, 0.8]);
    }

    #[test]
    fn test_from_xform_xy_recovers_rotation() {
        let q = Quat::from_euler(glam::EulerRot::YXZ, 0.4, -0.7, 1.1);
        let r = quat_from_xform_xy(q * Vec3::X, q * Vec3::Y);
        assert!(quat_close(q, r));
    }

    #[test]
    fn test_y_up_to_z_up_maps_up_axis() {
        let up = y_up_to_z_up() * Vec3::Y;
        assert!((up - Vec3::Z).length() < 1e-6);
    }

    #[test]
    fn test_halflife_damping_inverse() {
        let d = halflife_to_damping(0.27);
        assert!((damping_to_halflife(d) - 0.27).abs() < 1e-3);
        let k = frequency_to_stiffness(2.0);
        assert!((stiffness_to_frequency(k) - 2.0).abs() < 1e-5);
    }
}
