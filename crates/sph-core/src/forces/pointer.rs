use crate::params::StepUniforms;
use crate::space::{SimVector, Space};

/// Maps interaction strength to how much gravity is suppressed at the
/// interaction centre.
const GRAVITY_SUPPRESSION_STRENGTH: f32 = 10.0;

/// Acceleration from gravity and the pointer force field.
///
/// Inside the interaction radius, with `centre_t = 1 - dst / radius`:
///   - gravity is weighted by `1 - centre_t * saturate(strength / 10)`
///   - `dir_to_point * centre_t * strength` pulls (or pushes, when negative)
///   - `velocity * centre_t` is subtracted, calming particles near the pointer
///
/// Outside the radius, or with zero strength, only gravity applies.
pub fn interaction_acceleration<S: Space>(
    position: S::Vector,
    velocity: S::Vector,
    uniforms: &StepUniforms<S>,
) -> S::Vector {
    let gravity = uniforms.gravity;
    let strength = uniforms.interaction_strength;
    if strength == 0.0 {
        return gravity;
    }

    let radius = uniforms.interaction_radius;
    let offset = uniforms.interaction_point - position;
    let dst_sq = offset.length_squared();
    if dst_sq >= radius * radius {
        return gravity;
    }

    let dst = dst_sq.sqrt();
    let centre_t = 1.0 - dst / radius;
    let dir_to_centre = if dst > 0.0 { offset / dst } else { S::Vector::ZERO };
    let gravity_weight =
        1.0 - centre_t * (strength / GRAVITY_SUPPRESSION_STRENGTH).clamp(0.0, 1.0);

    gravity * gravity_weight + dir_to_centre * (centre_t * strength) - velocity * centre_t
}
