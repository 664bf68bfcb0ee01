//! The six compute stages of one substep. Each function is one or more
//! dispatches over all particles; the caller runs them in order.

use std::mem;

use glam::Vec2;

use crate::config::BoxObstacle;
use crate::device::{Device, DeviceError};
use crate::forces::interaction_acceleration;
use crate::grid::{hash_position, NeighborTable, SpatialEntry};
use crate::kernels::{
    density_derivative, density_kernel, near_density_derivative, near_density_kernel,
    viscosity_kernel,
};
use crate::obstacle::ObstacleSet;
use crate::params::StepUniforms;
use crate::particle::ParticleBuffers;
use crate::space::{SimVector, Space};

/// Floor for densities used as divisors.
const MIN_DENSITY: f32 = 1e-6;

/// Stage 1: gravity and the interaction force into velocity, then the
/// predicted position.
pub fn external_forces<S: Space>(
    device: &mut Device,
    b: &mut ParticleBuffers<S>,
    u: &StepUniforms<S>,
) -> Result<(), DeviceError> {
    let n = b.num_particles();
    let position = b.position.as_slice();
    let dt = u.delta_time;
    device.dispatch_pair(
        "external forces",
        n,
        &mut b.velocity,
        &mut b.predicted,
        |i, velocity, predicted| {
            let acc = interaction_acceleration(position[i], *velocity, u);
            *velocity += acc * dt;
            *predicted = position[i] + *velocity * dt;
        },
    )
}

/// Stage 2: one table row per particle, keyed by its predicted cell.
pub fn spatial_hash<S: Space>(
    device: &mut Device,
    b: &mut ParticleBuffers<S>,
    u: &StepUniforms<S>,
) -> Result<(), DeviceError> {
    let n = b.num_particles();
    let predicted = b.predicted.as_slice();
    let table_size = b.offsets.len() as u32;
    let radius = u.kernel_radius;
    device.dispatch("spatial hash", n, &mut b.spatial, |i, entry| {
        *entry = SpatialEntry::new(i as u32, hash_position::<S>(predicted[i], radius), table_size);
    })
}

/// Stage 3: sort the table and build bucket offsets.
pub fn sort_and_offsets<S: Space>(
    device: &mut Device,
    b: &mut ParticleBuffers<S>,
) -> Result<(), DeviceError> {
    b.sorter
        .sort_and_compute_offsets(device, &mut b.spatial, &mut b.offsets)
}

/// Stage 4: density and near density from every neighbour, self included.
pub fn density<S: Space>(
    device: &mut Device,
    b: &mut ParticleBuffers<S>,
    u: &StepUniforms<S>,
) -> Result<(), DeviceError> {
    let n = b.num_particles();
    let predicted = b.predicted.as_slice();
    let table = NeighborTable::new(b.spatial.as_slice(), b.offsets.as_slice());
    let radius = u.kernel_radius;
    let k = &u.kernel;
    device.dispatch("density", n, &mut b.density, |i, out| {
        let mut density = 0.0;
        let mut near_density = 0.0;
        table.for_each_neighbor::<S, _>(predicted[i], radius, predicted, |_, _, dst| {
            density += density_kernel(dst, radius, k);
            near_density += near_density_kernel(dst, radius, k);
        });
        *out = Vec2::new(density, near_density);
    })
}

/// Stage 5a: pressure force from the deviation against the target density.
pub fn pressure<S: Space>(
    device: &mut Device,
    b: &mut ParticleBuffers<S>,
    u: &StepUniforms<S>,
) -> Result<(), DeviceError> {
    let n = b.num_particles();
    let predicted = b.predicted.as_slice();
    let velocity = b.velocity.as_slice();
    let densities = b.density.as_slice();
    let table = NeighborTable::new(b.spatial.as_slice(), b.offsets.as_slice());
    let radius = u.kernel_radius;
    let k = &u.kernel;
    let pressure_of = |d: Vec2| {
        (
            (d.x - u.target_density) * u.pressure_scale,
            d.y * u.near_pressure_scale,
        )
    };

    device.dispatch("pressure", n, &mut b.velocity_scratch, |i, out| {
        let own = densities[i];
        let (pressure, near_pressure) = pressure_of(own);
        let mut force = S::Vector::ZERO;

        table.for_each_neighbor::<S, _>(predicted[i], radius, predicted, |j, offset, dst| {
            if j == i {
                return;
            }
            let dir = if dst > 0.0 {
                offset / dst
            } else {
                S::fallback_direction()
            };
            let other = densities[j];
            let (other_pressure, other_near) = pressure_of(other);
            let shared = (pressure + other_pressure) * 0.5;
            let shared_near = (near_pressure + other_near) * 0.5;

            force += dir * (density_derivative(dst, radius, k) * shared / other.x.max(MIN_DENSITY));
            let near_slope = near_density_derivative(dst, radius, k);
            force += dir * (near_slope * shared_near / other.y.max(MIN_DENSITY));
        });

        *out = velocity[i] + force / own.x.max(MIN_DENSITY) * u.delta_time;
    })?;
    mem::swap(&mut b.velocity, &mut b.velocity_scratch);
    Ok(())
}

/// Stage 5b: pull each velocity towards its neighbours'.
pub fn viscosity<S: Space>(
    device: &mut Device,
    b: &mut ParticleBuffers<S>,
    u: &StepUniforms<S>,
) -> Result<(), DeviceError> {
    let n = b.num_particles();
    let predicted = b.predicted.as_slice();
    let velocity = b.velocity.as_slice();
    let table = NeighborTable::new(b.spatial.as_slice(), b.offsets.as_slice());
    let radius = u.kernel_radius;
    let k = &u.kernel;

    device.dispatch("viscosity", n, &mut b.velocity_scratch, |i, out| {
        let own = velocity[i];
        let mut force = S::Vector::ZERO;
        table.for_each_neighbor::<S, _>(predicted[i], radius, predicted, |j, _, dst| {
            if j != i {
                force += (velocity[j] - own) * viscosity_kernel(dst, radius, k);
            }
        });
        *out = own + force * (u.viscosity_scale * u.delta_time);
    })?;
    mem::swap(&mut b.velocity, &mut b.velocity_scratch);
    Ok(())
}

/// Stage 6: integrate, resolve collisions and shift the histories.
pub fn update_positions<S: Space>(
    device: &mut Device,
    b: &mut ParticleBuffers<S>,
    u: &StepUniforms<S>,
    obstacle: Option<&ObstacleSet<S>>,
) -> Result<(), DeviceError> {
    let n = b.num_particles();

    {
        let position = b.position.as_slice();
        device.dispatch_pair(
            "position history",
            n,
            &mut b.previous_previous_position,
            &mut b.previous_position,
            |i, previous_previous, previous| {
                *previous_previous = *previous;
                *previous = position[i];
            },
        )?;
    }

    {
        let previous_velocity = b.previous_velocity.as_slice();
        let previous_previous_velocity = b.previous_previous_velocity.as_slice();
        let previous_previous_position = b.previous_previous_position.as_slice();
        device.dispatch_triple(
            "update positions",
            n,
            &mut b.position,
            &mut b.velocity,
            &mut b.collision_flag,
            |i, position, velocity, flag| {
                let mut v = *velocity;
                if u.velocity_smoothing > 0.0 {
                    let average = (v + previous_velocity[i] + previous_previous_velocity[i]) / 3.0;
                    v += (average - v) * u.velocity_smoothing;
                }

                let start = *position;
                let mut end = start + v * u.delta_time;
                *flag = 0;

                if let Some(obstacle) = obstacle {
                    if let Some(hit) = obstacle.sweep(start, end, u.collision_margin) {
                        end = hit.position;
                        let normal_speed = v.dot(hit.normal);
                        if normal_speed < 0.0 {
                            v -= hit.normal * (normal_speed * (1.0 + u.collision_damping));
                        }
                        *flag = 1;
                    }
                }

                resolve_bounds::<S>(&mut end, &mut v, u);
                if let Some(box_obstacle) = &u.box_obstacle {
                    resolve_box_obstacle::<S>(&mut end, &mut v, box_obstacle, u.collision_damping);
                }

                if u.settle_damping > 0.0
                    && (end - previous_previous_position[i]).length() < u.min_move_distance
                {
                    v *= 1.0 - u.settle_damping;
                }

                *position = end;
                *velocity = v;
            },
        )?;
    }

    let velocity = b.velocity.as_slice();
    device.dispatch_pair(
        "velocity history",
        n,
        &mut b.previous_previous_velocity,
        &mut b.previous_velocity,
        |i, previous_previous, previous| {
            *previous_previous = *previous;
            *previous = velocity[i];
        },
    )
}

/// Keep a particle inside the boundary box, bouncing it off the walls.
fn resolve_bounds<S: Space>(
    position: &mut S::Vector,
    velocity: &mut S::Vector,
    u: &StepUniforms<S>,
) {
    for a in 0..<S::Vector as SimVector>::DIMS {
        let half = u.bounds_size.axis(a) * 0.5;
        let local = position.axis(a) - u.bounds_centre.axis(a);
        if local.abs() >= half {
            let wall = u.bounds_centre.axis(a) + half * local.signum();
            *position = position.with_axis(a, wall);
            *velocity = velocity.with_axis(a, -velocity.axis(a) * u.collision_damping);
        }
    }
}

/// Push a particle out of the box obstacle through its nearest face.
fn resolve_box_obstacle<S: Space>(
    position: &mut S::Vector,
    velocity: &mut S::Vector,
    obstacle: &BoxObstacle<S>,
    damping: f32,
) {
    let dims = <S::Vector as SimVector>::DIMS;
    let mut nearest: Option<(usize, f32)> = None;
    for a in 0..dims {
        let half = obstacle.size.axis(a) * 0.5;
        let edge_dst = half - (position.axis(a) - obstacle.centre.axis(a)).abs();
        if edge_dst < 0.0 {
            return;
        }
        if nearest.map_or(true, |(_, d)| edge_dst < d) {
            nearest = Some((a, edge_dst));
        }
    }
    let Some((a, _)) = nearest else {
        return;
    };
    let half = obstacle.size.axis(a) * 0.5;
    let side = if position.axis(a) >= obstacle.centre.axis(a) { 1.0 } else { -1.0 };
    *position = position.with_axis(a, obstacle.centre.axis(a) + half * side);
    *velocity = velocity.with_axis(a, -velocity.axis(a) * damping);
}
