//! Obstacle preprocessing: one AABB per triangle for broad-phase pruning,
//! plus the swept-particle collision pass the update stage runs against it.

use log::debug;

use crate::device::{Device, DeviceBuffer, DeviceError, Idle};
use crate::error::SimError;
use crate::space::{SimVector, Space};

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Aabb<V> {
    pub min: V,
    pub max: V,
}

impl<V: SimVector> Aabb<V> {
    #[inline]
    pub fn from_triangle([a, b, c]: [V; 3]) -> Self {
        Self {
            min: a.min(b).min(c),
            max: a.max(b).max(c),
        }
    }

    #[inline]
    pub fn contains(&self, p: V) -> bool {
        (0..V::DIMS).all(|a| self.min.axis(a) <= p.axis(a) && p.axis(a) <= self.max.axis(a))
    }

    #[inline]
    pub fn overlaps(&self, other: &Self) -> bool {
        (0..V::DIMS).all(|a| {
            self.min.axis(a) <= other.max.axis(a) && other.min.axis(a) <= self.max.axis(a)
        })
    }

    #[inline]
    pub fn expanded(&self, margin: f32) -> Self {
        Self {
            min: self.min - V::splat(margin),
            max: self.max + V::splat(margin),
        }
    }
}

/// Result of a narrow-phase test against one triangle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TriangleHit<V> {
    /// How far along the path (3D) or how deep inside (2D) the contact is;
    /// the smallest one wins when several triangles are hit.
    pub distance: f32,
    /// Resolved particle position, just outside the surface.
    pub position: V,
    /// Unit surface normal facing the particle.
    pub normal: V,
}

/// A world-space triangle mesh.
#[derive(Clone, Debug, PartialEq)]
pub struct ObstacleMesh<S: Space> {
    vertices: Vec<S::Vector>,
    triangle_indices: Vec<u32>,
}

impl<S: Space> ObstacleMesh<S> {
    pub fn new(vertices: Vec<S::Vector>, triangle_indices: Vec<u32>) -> Result<Self, SimError> {
        if triangle_indices.len() % 3 != 0 {
            return Err(SimError::InvalidObstacle(format!(
                "index count {} is not a multiple of 3",
                triangle_indices.len()
            )));
        }
        if let Some(&bad) = triangle_indices
            .iter()
            .find(|&&i| i as usize >= vertices.len())
        {
            return Err(SimError::InvalidObstacle(format!(
                "index {} out of range for {} vertices",
                bad,
                vertices.len()
            )));
        }
        Ok(Self {
            vertices,
            triangle_indices,
        })
    }

    /// The same mesh with every vertex mapped through `transform`
    /// (local to world).
    pub fn transformed(&self, transform: impl Fn(S::Vector) -> S::Vector) -> Self {
        Self {
            vertices: self.vertices.iter().map(|&v| transform(v)).collect(),
            triangle_indices: self.triangle_indices.clone(),
        }
    }

    pub fn vertices(&self) -> &[S::Vector] {
        &self.vertices
    }

    pub fn triangle_indices(&self) -> &[u32] {
        &self.triangle_indices
    }

    pub fn triangle_count(&self) -> usize {
        self.triangle_indices.len() / 3
    }

    pub fn is_empty(&self) -> bool {
        self.triangle_indices.is_empty()
    }
}

#[inline]
fn triangle<V: Copy>(vertices: &[V], indices: &[u32], t: usize) -> [V; 3] {
    [
        vertices[indices[3 * t] as usize],
        vertices[indices[3 * t + 1] as usize],
        vertices[indices[3 * t + 2] as usize],
    ]
}

/// One dispatch over triangles: `out[t]` = componentwise min/max of
/// triangle `t`'s three vertices.
pub fn build_aabbs<V: SimVector>(
    device: &mut Device,
    vertices: &[V],
    triangle_indices: &[u32],
    out: &mut DeviceBuffer<Aabb<V>>,
) -> Result<(), DeviceError> {
    let triangles = triangle_indices.len() / 3;
    device.dispatch("obstacle: aabbs", triangles, out, |t, aabb| {
        *aabb = Aabb::from_triangle(triangle(vertices, triangle_indices, t));
    })
}

/// Device-side obstacle: vertices, indices and the per-triangle AABBs.
pub struct ObstacleSet<S: Space> {
    vertices: DeviceBuffer<S::Vector>,
    triangle_indices: DeviceBuffer<u32>,
    aabbs: DeviceBuffer<Aabb<S::Vector>>,
    dirty: bool,
    rebuilds: u64,
}

impl<S: Space> ObstacleSet<S> {
    /// Upload `mesh`. AABBs are built on the first [`ObstacleSet::refresh`].
    pub fn new(device: &mut Device, mesh: &ObstacleMesh<S>) -> Self {
        Self {
            vertices: device.create_buffer_init("obstacle vertices", mesh.vertices()),
            triangle_indices: device
                .create_buffer_init("obstacle triangles", mesh.triangle_indices()),
            aabbs: device.create_buffer("obstacle aabbs", mesh.triangle_count()),
            dirty: true,
            rebuilds: 0,
        }
    }

    pub fn triangle_count(&self) -> usize {
        self.aabbs.len()
    }

    /// Replace the world-space vertices (the obstacle moved). The topology
    /// is fixed, so the vertex count must not change.
    pub fn set_vertices(&mut self, vertices: &[S::Vector]) -> Result<(), SimError> {
        self.vertices.write(vertices)?;
        self.dirty = true;
        Ok(())
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// How many times the AABBs have been rebuilt.
    pub fn rebuilds(&self) -> u64 {
        self.rebuilds
    }

    /// Rebuild the AABBs if the vertices changed since the last build.
    /// Returns whether a rebuild ran.
    pub fn refresh(&mut self, device: &mut Device) -> Result<bool, DeviceError> {
        if !self.dirty {
            return Ok(false);
        }
        build_aabbs(
            device,
            self.vertices.as_slice(),
            self.triangle_indices.as_slice(),
            &mut self.aabbs,
        )?;
        self.dirty = false;
        self.rebuilds += 1;
        debug!("rebuilt {} obstacle aabbs", self.aabbs.len());
        Ok(true)
    }

    pub fn aabbs(&self) -> &[Aabb<S::Vector>] {
        self.aabbs.as_slice()
    }

    /// Nearest contact of a particle moving `start -> end`, skipping every
    /// triangle whose AABB misses the swept path.
    pub fn sweep(
        &self,
        start: S::Vector,
        end: S::Vector,
        margin: f32,
    ) -> Option<TriangleHit<S::Vector>> {
        let path = Aabb::from_triangle([start, end, end]).expanded(margin);
        let vertices = self.vertices.as_slice();
        let indices = self.triangle_indices.as_slice();

        let mut best: Option<TriangleHit<S::Vector>> = None;
        for (t, aabb) in self.aabbs.as_slice().iter().enumerate() {
            if !aabb.overlaps(&path) {
                continue;
            }
            let hit = S::collide_triangle(start, end, triangle(vertices, indices, t), margin);
            if let Some(hit) = hit {
                if best.map_or(true, |b| hit.distance < b.distance) {
                    best = Some(hit);
                }
            }
        }
        best
    }

    pub fn release(self, idle: &mut Idle<'_>) {
        idle.release(self.vertices);
        idle.release(self.triangle_indices);
        idle.release(self.aabbs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::space::{Dim2, Dim3};
    use glam::{Vec2, Vec3};

    #[test]
    fn test_mesh_rejects_partial_triangle() {
        let err = ObstacleMesh::<Dim2>::new(vec![Vec2::ZERO; 3], vec![0, 1]).unwrap_err();
        assert!(matches!(err, SimError::InvalidObstacle(_)));
    }

    #[test]
    fn test_mesh_rejects_out_of_range_index() {
        let err = ObstacleMesh::<Dim3>::new(vec![Vec3::ZERO; 3], vec![0, 1, 3]).unwrap_err();
        assert!(matches!(err, SimError::InvalidObstacle(_)));
    }

    #[test]
    fn test_aabb_overlap_touching_edges() {
        let a = Aabb { min: Vec2::ZERO, max: Vec2::ONE };
        let b = Aabb { min: Vec2::ONE, max: Vec2::splat(2.0) };
        let c = Aabb { min: Vec2::splat(1.1), max: Vec2::splat(2.0) };
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
    }
}
