//! Critically damped springs and dampers in closed form.
//!
//! Every primitive is parameterized by a half-life: the time it takes to
//! cover half of the remaining distance to the goal. All of them are exact
//! for any `dt`, so the fixed-step simulation and the trajectory predictor
//! can share them with very different step sizes.

use glam::{Quat, Vec3};
use std::f32::consts::LN_2;

use crate::math::{
    fast_negexp, halflife_to_damping, quat_abs, quat_from_scaled_axis, quat_to_scaled_axis,
};

#[inline]
fn damper_alpha(halflife: f32, dt: f32) -> f32 {
    1.0 - fast_negexp((LN_2 * dt) / (halflife + 1e-5))
}

/// Exponentially move `x` toward `goal`
pub fn damper_exact(x: f32, goal: f32, halflife: f32, dt: f32) -> f32 {
    x + (goal - x) * damper_alpha(halflife, dt)
}

pub fn damper_exact_vec3(x: Vec3, goal: Vec3, halflife: f32, dt: f32) -> Vec3 {
    x.lerp(goal, damper_alpha(halflife, dt))
}

pub fn damper_exact_quat(x: Quat, goal: Quat, halflife: f32, dt: f32) -> Quat {
    x.slerp(goal, damper_alpha(halflife, dt))
}

/// Portion of `goal` to apply this step when damping an adjustment
pub fn damp_adjustment_exact(goal: f32, halflife: f32, dt: f32) -> f32 {
    goal * damper_alpha(halflife, dt)
}

pub fn damp_adjustment_exact_vec3(goal: Vec3, halflife: f32, dt: f32) -> Vec3 {
    goal * damper_alpha(halflife, dt)
}

pub fn damp_adjustment_exact_quat(goal: Quat, halflife: f32, dt: f32) -> Quat {
    Quat::IDENTITY.slerp(goal, damper_alpha(halflife, dt))
}

/// Spring `x` (with velocity `v`) toward `goal`
pub fn simple_spring_damper_exact(x: &mut f32, v: &mut f32, goal: f32, halflife: f32, dt: f32) {
    let y = halflife_to_damping(halflife) / 2.0;
    let j0 = *x - goal;
    let j1 = *v + j0 * y;
    let eydt = fast_negexp(y * dt);

    *x = eydt * (j0 + j1 * dt) + goal;
    *v = eydt * (*v - j1 * y * dt);
}

pub fn simple_spring_damper_exact_vec3(
    x: &mut Vec3,
    v: &mut Vec3,
    goal: Vec3,
    halflife: f32,
    dt: f32,
) {
    let y = halflife_to_damping(halflife) / 2.0;
    let j0 = *x - goal;
    let j1 = *v + j0 * y;
    let eydt = fast_negexp(y * dt);

    *x = eydt * (j0 + j1 * dt) + goal;
    *v = eydt * (*v - j1 * y * dt);
}

/// Spring a rotation toward `goal`; `v` is an angular velocity
pub fn simple_spring_damper_exact_quat(
    x: &mut Quat,
    v: &mut Vec3,
    goal: Quat,
    halflife: f32,
    dt: f32,
) {
    let y = halflife_to_damping(halflife) / 2.0;
    let j0 = quat_to_scaled_axis(quat_abs(*x * goal.inverse()));
    let j1 = *v + j0 * y;
    let eydt = fast_negexp(y * dt);

    *x = quat_from_scaled_axis(eydt * (j0 + j1 * dt)) * goal;
    *v = eydt * (*v - j1 * y * dt);
}

/// Spring toward zero
pub fn decay_spring_damper_exact(x: &mut f32, v: &mut f32, halflife: f32, dt: f32) {
    let y = halflife_to_damping(halflife) / 2.0;
    let j1 = *v + *x * y;
    let eydt = fast_negexp(y * dt);

    *x = eydt * (*x + j1 * dt);
    *v = eydt * (*v - j1 * y * dt);
}

pub fn decay_spring_damper_exact_vec3(x: &mut Vec3, v: &mut Vec3, halflife: f32, dt: f32) {
    let y = halflife_to_damping(halflife) / 2.0;
    let j1 = *v + *x * y;
    let eydt = fast_negexp(y * dt);

    *x = eydt * (*x + j1 * dt);
    *v = eydt * (*v - j1 * y * dt);
}

/// Spring a rotation toward identity
pub fn decay_spring_damper_exact_quat(x: &mut Quat, v: &mut Vec3, halflife: f32, dt: f32) {
    let y = halflife_to_damping(halflife) / 2.0;
    let j0 = quat_to_scaled_axis(*x);
    let j1 = *v + j0 * y;
    let eydt = fast_negexp(y * dt);

    *x = quat_from_scaled_axis(eydt * (j0 + j1 * dt));
    *v = eydt * (*v - j1 * y * dt);
}

/// Velocity spring state after `dt`, integrating position alongside it.
///
/// `v` and `a` spring toward `v_goal`; `x` receives the exact integral of the
/// velocity over the step.
pub fn simulation_positions_update(
    x: &mut Vec3,
    v: &mut Vec3,
    a: &mut Vec3,
    v_goal: Vec3,
    halflife: f32,
    dt: f32,
) {
    let y = halflife_to_damping(halflife) / 2.0;
    let j0 = *v - v_goal;
    let j1 = *a + j0 * y;
    let eydt = fast_negexp(y * dt);

    *x = eydt * (((-j1) / (y * y)) + ((-j0 - j1 * dt) / y))
        + (j1 / (y * y))
        + j0 / y
        + v_goal * dt
        + *x;
    *v = eydt * (j0 + j1 * dt) + v_goal;
    *a = eydt * (*a - j1 * y * dt);
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(0.05, 1.0 / 60.0 ; "short halflife")]
    #[test_case(0.27, 1.0 / 60.0 ; "simulation halflife")]
    #[test_case(0.27, 20.0 / 60.0 ; "trajectory step")]
    fn test_spring_toward_current_position_decays_velocity(halflife: f32, dt: f32) {
        let mut x = 2.5;
        let mut v = 3.0;
        let mut previous = v;
        for _ in 0..100 {
            let goal = x;
            simple_spring_damper_exact(&mut x, &mut v, goal, halflife, dt);
            assert!(v.abs() <= previous.abs() + 1e-6);
            previous = v;
        }
        assert!(v.abs() < 1e-3);
    }

    #[test]
    fn test_spring_goal_equal_current_decays_velocity() {
        let mut x = Vec3::new(1.0, 2.0, 3.0);
        let mut v = Vec3::new(0.5, -1.0, 0.0);
        let goal = x;
        simple_spring_damper_exact_vec3(&mut x, &mut v, goal, 0.1, 0.0);
        assert_eq!(x, goal);
        assert_eq!(v, Vec3::new(0.5, -1.0, 0.0));

        let mut x = goal;
        let mut v = Vec3::ZERO;
        simple_spring_damper_exact_vec3(&mut x, &mut v, goal, 0.1, 1.0 / 60.0);
        assert!((x - goal).length() < 1e-6);
        assert_eq!(v, Vec3::ZERO);
    }

    #[test_case(0.1 ; "inertialization halflife")]
    #[test_case(0.27 ; "simulation halflife")]
    fn test_decay_reaches_zero(halflife: f32) {
        let mut x = Vec3::new(1.0, -2.0, 0.5);
        let mut v = Vec3::new(0.0, 4.0, 0.0);
        for _ in 0..((halflife * 10.0 * 60.0) as usize) {
            decay_spring_damper_exact_vec3(&mut x, &mut v, halflife, 1.0 / 60.0);
        }
        assert!(x.length() < 0.01, "{x:?}");
    }

    #[test]
    fn test_quat_decay_reaches_identity() {
        let mut q = Quat::from_rotation_y(1.2);
        let mut w = Vec3::new(0.0, 2.0, 0.0);
        for _ in 0..60 {
            decay_spring_damper_exact_quat(&mut q, &mut w, 0.1, 1.0 / 60.0);
        }
        assert!(q.angle_between(Quat::IDENTITY) < 0.01);
    }

    #[test]
    fn test_velocity_spring_converges_to_goal() {
        let mut x = Vec3::ZERO;
        let mut v = Vec3::ZERO;
        let mut a = Vec3::ZERO;
        let goal = Vec3::new(0.0, 0.0, 4.0);
        for _ in 0..120 {
            simulation_positions_update(&mut x, &mut v, &mut a, goal, 0.27, 1.0 / 60.0);
        }
        assert!((v - goal).length() < 0.04);
        assert!(x.z > 0.0 && x.z < 8.0);
    }

    #[test]
    fn test_vector_and_rotation_dampers_agree_with_scalar() {
        let alpha = damper_exact(0.0, 1.0, 0.2, 0.05);

        let v = damper_exact_vec3(Vec3::ZERO, Vec3::new(2.0, 0.0, -2.0), 0.2, 0.05);
        assert!((v - Vec3::new(2.0, 0.0, -2.0) * alpha).length() < 1e-6);
        let adj = damp_adjustment_exact_vec3(Vec3::X, 0.2, 0.05);
        assert!((adj.x - alpha).abs() < 1e-6);

        let goal = Quat::from_rotation_y(1.0);
        let q = damper_exact_quat(Quat::IDENTITY, goal, 0.2, 0.05);
        assert!((q.angle_between(Quat::IDENTITY) - alpha).abs() < 1e-4);
        let adj = damp_adjustment_exact_quat(goal, 0.2, 0.05);
        assert!(adj.dot(q).abs() > 1.0 - 1e-6);
    }

    #[test]
    fn test_scalar_decay_matches_vector_decay() {
        let (mut x, mut v) = (1.5, -0.5);
        let (mut xv, mut vv) = (Vec3::splat(1.5), Vec3::splat(-0.5));
        for _ in 0..30 {
            decay_spring_damper_exact(&mut x, &mut v, 0.1, 1.0 / 60.0);
            decay_spring_damper_exact_vec3(&mut xv, &mut vv, 0.1, 1.0 / 60.0);
        }
        assert!((xv.x - x).abs() < 1e-6);
        assert!((vv.y - v).abs() < 1e-6);
    }

    #[test]
    fn test_damper_exact_moves_halfway_in_one_halflife() {
        let x = damper_exact(0.0, 1.0, 0.5, 0.5);
        assert!((x - 0.5).abs() < 0.01);
        let adj = damp_adjustment_exact(1.0, 0.5, 0.5);
        assert!((adj - x).abs() < 1e-6);
    }
}
