use glam::{Vec2, Vec3};
use sph_core::forces::interaction_acceleration;
use sph_core::params::{InteractionInput, StepUniforms};
use sph_core::space::{Dim2, Dim3};
use sph_core::SimulationSettings;

// ---------------------------------------------------------------------------
// Helper
// ---------------------------------------------------------------------------

/// Uniforms for a 2D scene: gravity (0, -10), interaction radius 2,
/// strength 5 and the pointer at `point`.
fn make_uniforms(point: Vec2, pull: bool, push: bool) -> StepUniforms<Dim2> {
    let mut settings = SimulationSettings::<Dim2>::default();
    settings.gravity = Vec2::new(0.0, -10.0);
    settings.interaction_radius = 2.0;
    settings.interaction_strength = 5.0;
    let input = InteractionInput { point, pull, push };
    StepUniforms::marshal(&settings, &input, 1.0 / 120.0, 1)
}

// ---------------------------------------------------------------------------
// 1. No input: gravity only
// ---------------------------------------------------------------------------

#[test]
fn test_idle_pointer_is_gravity() {
    let u = make_uniforms(Vec2::ZERO, false, false);
    let acc = interaction_acceleration(Vec2::new(0.5, 0.0), Vec2::new(3.0, 1.0), &u);
    assert_eq!(acc, Vec2::new(0.0, -10.0));
}

// ---------------------------------------------------------------------------
// 2. Outside the radius: gravity only
// ---------------------------------------------------------------------------

#[test]
fn test_outside_radius_is_gravity() {
    let u = make_uniforms(Vec2::ZERO, true, false);
    let acc = interaction_acceleration(Vec2::new(2.5, 0.0), Vec2::ZERO, &u);
    assert_eq!(acc, Vec2::new(0.0, -10.0));
}

// ---------------------------------------------------------------------------
// 3. Pull attracts, push repels
// ---------------------------------------------------------------------------

#[test]
fn test_pull_attracts_toward_point() {
    let u = make_uniforms(Vec2::new(1.0, 0.0), true, false);
    let acc = interaction_acceleration(Vec2::ZERO, Vec2::ZERO, &u);
    // centre_t = 0.5: pull 0.5 * 5 along +x, gravity weighted by 1 - 0.5 * 0.5
    assert!((acc.x - 2.5).abs() < 1e-5, "pull acc.x = {}", acc.x);
    assert!((acc.y + 7.5).abs() < 1e-5, "gravity weight, acc.y = {}", acc.y);
}

#[test]
fn test_push_repels_from_point() {
    let u = make_uniforms(Vec2::new(1.0, 0.0), false, true);
    let acc = interaction_acceleration(Vec2::ZERO, Vec2::ZERO, &u);
    assert!(acc.x < 0.0, "push should point away, got {}", acc.x);
    // Negative strength saturates to 0: full gravity.
    assert!((acc.y + 10.0).abs() < 1e-5);
}

#[test]
fn test_push_wins_when_both_held() {
    let both = make_uniforms(Vec2::new(1.0, 0.0), true, true);
    let push = make_uniforms(Vec2::new(1.0, 0.0), false, true);
    assert_eq!(both.interaction_strength, push.interaction_strength);
    assert!(both.interaction_strength < 0.0);
}

// ---------------------------------------------------------------------------
// 4. Velocity is damped near the pointer
// ---------------------------------------------------------------------------

#[test]
fn test_velocity_damping_near_pointer() {
    let u = make_uniforms(Vec2::new(1.0, 0.0), true, false);
    let still = interaction_acceleration(Vec2::ZERO, Vec2::ZERO, &u);
    let moving = interaction_acceleration(Vec2::ZERO, Vec2::new(0.0, 4.0), &u);
    // centre_t = 0.5, so 4 * 0.5 is subtracted from y
    assert!((still.y - moving.y - 2.0).abs() < 1e-5);
}

// ---------------------------------------------------------------------------
// 5. Exactly at the pointer: no NaN
// ---------------------------------------------------------------------------

#[test]
fn test_at_pointer_centre_no_nan() {
    let u = make_uniforms(Vec2::new(1.0, 1.0), true, false);
    let acc = interaction_acceleration(Vec2::new(1.0, 1.0), Vec2::ZERO, &u);
    assert!(acc.is_finite(), "acc = {:?}", acc);
}

#[test]
fn test_volumetric_pull() {
    let mut settings = SimulationSettings::<Dim3>::default();
    settings.interaction_strength = 20.0;
    let input = InteractionInput {
        point: Vec3::new(0.0, 0.0, 1.0),
        pull: true,
        push: false,
    };
    let u = StepUniforms::marshal(&settings, &input, 1.0 / 120.0, 1);
    let acc = interaction_acceleration(Vec3::ZERO, Vec3::ZERO, &u);
    assert!(acc.z > 0.0);
    // strength 20 saturates, so gravity is scaled by 1 - centre_t
    assert!((acc.y + 5.0).abs() < 1e-4, "acc.y = {}", acc.y);
}
