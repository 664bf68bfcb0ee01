//! Parameter marshaling: the per-frame snapshot of settings and input that
//! every stage reads.

use crate::config::{BoxObstacle, SimulationSettings};
use crate::kernels::KernelFactors;
use crate::space::{SimVector, Space};

/// Pointer state for the interaction force, sampled once per frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct InteractionInput<S: Space> {
    pub point: S::Vector,
    pub pull: bool,
    pub push: bool,
}

impl<S: Space> InteractionInput<S> {
    pub fn idle() -> Self {
        Self {
            point: S::Vector::ZERO,
            pull: false,
            push: false,
        }
    }

    /// Signed strength: push repels, pull attracts, push wins if both.
    pub fn signed_strength(&self, strength: f32) -> f32 {
        if self.push {
            -strength
        } else if self.pull {
            strength
        } else {
            0.0
        }
    }
}

/// Immutable uniforms for every substep of one frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StepUniforms<S: Space> {
    pub delta_time: f32,
    pub gravity: S::Vector,
    pub collision_damping: f32,

    pub kernel_radius: f32,
    pub kernel_radius_sq: f32,
    pub kernel: KernelFactors,
    pub target_density: f32,
    pub pressure_scale: f32,
    pub near_pressure_scale: f32,
    pub viscosity_scale: f32,

    pub bounds_size: S::Vector,
    pub bounds_centre: S::Vector,
    pub box_obstacle: Option<BoxObstacle<S>>,
    /// Clearance kept between a resolved particle and an obstacle surface.
    pub collision_margin: f32,

    pub interaction_point: S::Vector,
    pub interaction_radius: f32,
    pub interaction_strength: f32,

    pub velocity_smoothing: f32,
    pub settle_damping: f32,
    pub min_move_distance: f32,

    pub num_particles: u32,
    pub table_size: u32,
}

impl<S: Space> StepUniforms<S> {
    /// Snapshot `settings` for substeps of length `delta_time`. Settings are
    /// sanitized first, so the kernel radius is never below the minimum.
    pub fn marshal(
        settings: &SimulationSettings<S>,
        input: &InteractionInput<S>,
        delta_time: f32,
        num_particles: usize,
    ) -> Self {
        let s = settings.sanitized();
        let radius = s.kernel_radius;
        Self {
            delta_time,
            gravity: s.gravity,
            collision_damping: s.collision_damping,
            kernel_radius: radius,
            kernel_radius_sq: radius * radius,
            kernel: S::kernel_factors(radius),
            target_density: s.target_density,
            pressure_scale: s.pressure_scale,
            near_pressure_scale: s.near_pressure_scale,
            viscosity_scale: s.viscosity_scale,
            bounds_size: s.boundary.size,
            bounds_centre: s.boundary.centre,
            box_obstacle: s.boundary.obstacle,
            collision_margin: radius * 0.01,
            interaction_point: input.point,
            interaction_radius: s.interaction_radius,
            interaction_strength: input.signed_strength(s.interaction_strength),
            velocity_smoothing: s.velocity_smoothing,
            settle_damping: s.settle_damping,
            min_move_distance: radius * 0.1,
            num_particles: num_particles as u32,
            table_size: s.table_size(num_particles),
        }
    }
}

/// A uniform slot on the device. Every write bumps the generation so stages
/// can tell which marshaling pass produced what they read.
#[derive(Debug)]
pub struct UniformBuffer<T> {
    value: T,
    generation: u64,
}

impl<T: Copy> UniformBuffer<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            generation: 0,
        }
    }

    pub fn write(&mut self, value: T) {
        self.value = value;
        self.generation += 1;
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}
