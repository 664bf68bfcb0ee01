use std::fmt;
use std::ops::{Add, AddAssign, Div, Mul, MulAssign, Neg, Sub, SubAssign};

use bytemuck::Pod;
use glam::{IVec2, IVec3, Vec2, Vec3};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::kernels::KernelFactors;
use crate::obstacle::TriangleHit;

/// Per-axis primes for the cell hash. Cell coordinates are reinterpreted as
/// unsigned and combined with wrapping arithmetic.
const HASH_K1: u32 = 15823;
const HASH_K2: u32 = 9_737_333;
const HASH_K3: u32 = 440_817_757;

/// Vector operations the pipeline needs from `Vec2` / `Vec3`.
pub trait SimVector:
    Pod
    + Default
    + PartialEq
    + fmt::Debug
    + Send
    + Sync
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<f32, Output = Self>
    + Div<f32, Output = Self>
    + Neg<Output = Self>
    + AddAssign
    + SubAssign
    + MulAssign<f32>
    + Serialize
    + DeserializeOwned
{
    const DIMS: usize;
    const ZERO: Self;

    fn splat(value: f32) -> Self;
    fn dot(self, other: Self) -> f32;
    fn min(self, other: Self) -> Self;
    fn max(self, other: Self) -> Self;
    fn axis(self, axis: usize) -> f32;
    fn with_axis(self, axis: usize, value: f32) -> Self;

    #[inline]
    fn length_squared(self) -> f32 {
        self.dot(self)
    }

    #[inline]
    fn length(self) -> f32 {
        self.length_squared().sqrt()
    }
}

macro_rules! impl_sim_vector {
    ($ty:ty, $dims:expr) => {
        impl SimVector for $ty {
            const DIMS: usize = $dims;
            const ZERO: Self = <$ty>::ZERO;

            #[inline]
            fn splat(value: f32) -> Self {
                <$ty>::splat(value)
            }

            #[inline]
            fn dot(self, other: Self) -> f32 {
                <$ty>::dot(self, other)
            }

            #[inline]
            fn min(self, other: Self) -> Self {
                <$ty>::min(self, other)
            }

            #[inline]
            fn max(self, other: Self) -> Self {
                <$ty>::max(self, other)
            }

            #[inline]
            fn axis(self, axis: usize) -> f32 {
                self[axis]
            }

            #[inline]
            fn with_axis(mut self, axis: usize, value: f32) -> Self {
                self[axis] = value;
                self
            }
        }
    };
}

impl_sim_vector!(Vec2, 2);
impl_sim_vector!(Vec3, 3);

/// Dimensionality of a simulation.
///
/// Everything that differs between the 2D and 3D variants lives behind this
/// trait: the vector type, the grid cell layout and hash, the smoothing
/// kernel normalisation and the narrow-phase triangle test. The pipeline,
/// sorter, obstacle preprocessor and control logic are written once against it.
pub trait Space: Copy + Default + PartialEq + fmt::Debug + Send + Sync + 'static {
    type Vector: SimVector;
    type Cell: Copy + PartialEq + fmt::Debug + Send + Sync;

    const NAME: &'static str;
    /// Size of the cell neighbourhood walked by neighbour queries (3^DIMS).
    const NEIGHBOR_CELLS: usize;

    fn cell_of(position: Self::Vector, cell_size: f32) -> Self::Cell;

    /// The `n`-th cell of the neighbourhood around `cell`, `n < NEIGHBOR_CELLS`.
    fn neighbor_cell(cell: Self::Cell, n: usize) -> Self::Cell;

    fn hash_cell(cell: Self::Cell) -> u32;

    fn kernel_factors(radius: f32) -> KernelFactors;

    /// Direction used when two particles sit on exactly the same point.
    fn fallback_direction() -> Self::Vector;

    /// Narrow-phase test of a particle moving `start -> end` against one
    /// obstacle triangle.
    fn collide_triangle(
        start: Self::Vector,
        end: Self::Vector,
        triangle: [Self::Vector; 3],
        margin: f32,
    ) -> Option<TriangleHit<Self::Vector>>;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Dim2;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Dim3;

impl Space for Dim2 {
    type Vector = Vec2;
    type Cell = IVec2;

    const NAME: &'static str = "2d";
    const NEIGHBOR_CELLS: usize = 9;

    #[inline]
    fn cell_of(position: Vec2, cell_size: f32) -> IVec2 {
        let inv = 1.0 / cell_size;
        IVec2::new(
            (position.x * inv).floor() as i32,
            (position.y * inv).floor() as i32,
        )
    }

    #[inline]
    fn neighbor_cell(cell: IVec2, n: usize) -> IVec2 {
        // Saturated cells at the i32 edges wrap, like the hash does.
        cell.wrapping_add(IVec2::new((n % 3) as i32 - 1, (n / 3) as i32 - 1))
    }

    #[inline]
    fn hash_cell(cell: IVec2) -> u32 {
        (cell.x as u32)
            .wrapping_mul(HASH_K1)
            .wrapping_add((cell.y as u32).wrapping_mul(HASH_K2))
    }

    fn kernel_factors(radius: f32) -> KernelFactors {
        KernelFactors::planar(radius)
    }

    fn fallback_direction() -> Vec2 {
        Vec2::Y
    }

    fn collide_triangle(
        _start: Vec2,
        end: Vec2,
        triangle: [Vec2; 3],
        margin: f32,
    ) -> Option<TriangleHit<Vec2>> {
        if !point_in_triangle(end, triangle) {
            return None;
        }

        // Push out through the nearest edge.
        let mut best: Option<TriangleHit<Vec2>> = None;
        for e in 0..3 {
            let a = triangle[e];
            let b = triangle[(e + 1) % 3];
            let opposite = triangle[(e + 2) % 3];
            let edge = b - a;
            let len_sq = edge.length_squared();
            if len_sq <= f32::EPSILON {
                continue;
            }
            let t = ((end - a).dot(edge) / len_sq).clamp(0.0, 1.0);
            let closest = a + edge * t;
            let depth = (end - closest).length();

            let mut normal = Vec2::new(edge.y, -edge.x).normalize_or_zero();
            if normal.dot(opposite - a) > 0.0 {
                normal = -normal;
            }

            if best.map_or(true, |hit| depth < hit.distance) {
                best = Some(TriangleHit {
                    distance: depth,
                    position: closest + normal * margin,
                    normal,
                });
            }
        }
        best
    }
}

impl Space for Dim3 {
    type Vector = Vec3;
    type Cell = IVec3;

    const NAME: &'static str = "3d";
    const NEIGHBOR_CELLS: usize = 27;

    #[inline]
    fn cell_of(position: Vec3, cell_size: f32) -> IVec3 {
        let inv = 1.0 / cell_size;
        IVec3::new(
            (position.x * inv).floor() as i32,
            (position.y * inv).floor() as i32,
            (position.z * inv).floor() as i32,
        )
    }

    #[inline]
    fn neighbor_cell(cell: IVec3, n: usize) -> IVec3 {
        cell.wrapping_add(IVec3::new(
            (n % 3) as i32 - 1,
            ((n / 3) % 3) as i32 - 1,
            (n / 9) as i32 - 1,
        ))
    }

    #[inline]
    fn hash_cell(cell: IVec3) -> u32 {
        (cell.x as u32)
            .wrapping_mul(HASH_K1)
            .wrapping_add((cell.y as u32).wrapping_mul(HASH_K2))
            .wrapping_add((cell.z as u32).wrapping_mul(HASH_K3))
    }

    fn kernel_factors(radius: f32) -> KernelFactors {
        KernelFactors::volumetric(radius)
    }

    fn fallback_direction() -> Vec3 {
        Vec3::Y
    }

    /// Swept segment vs triangle (Moller-Trumbore).
    fn collide_triangle(
        start: Vec3,
        end: Vec3,
        triangle: [Vec3; 3],
        margin: f32,
    ) -> Option<TriangleHit<Vec3>> {
        let [a, b, c] = triangle;
        let dir = end - start;
        let e1 = b - a;
        let e2 = c - a;

        let p = dir.cross(e2);
        let det = e1.dot(p);
        if det.abs() < 1e-10 {
            return None;
        }
        let inv_det = 1.0 / det;

        let s = start - a;
        let u = s.dot(p) * inv_det;
        if !(0.0..=1.0).contains(&u) {
            return None;
        }
        let q = s.cross(e1);
        let v = dir.dot(q) * inv_det;
        if v < 0.0 || u + v > 1.0 {
            return None;
        }
        let t = e2.dot(q) * inv_det;
        if !(0.0..=1.0).contains(&t) {
            return None;
        }

        // Face the side the particle came from.
        let mut normal = e1.cross(e2).normalize_or_zero();
        if normal.dot(dir) > 0.0 {
            normal = -normal;
        }

        Some(TriangleHit {
            distance: t * dir.length(),
            position: start + dir * t + normal * margin,
            normal,
        })
    }
}

#[inline]
fn cross2(a: Vec2, b: Vec2) -> f32 {
    a.x * b.y - a.y * b.x
}

fn point_in_triangle(p: Vec2, [a, b, c]: [Vec2; 3]) -> bool {
    if cross2(b - a, c - a).abs() <= f32::EPSILON {
        return false;
    }
    let d1 = cross2(b - a, p - a);
    let d2 = cross2(c - b, p - b);
    let d3 = cross2(a - c, p - c);
    let has_neg = d1 < 0.0 || d2 < 0.0 || d3 < 0.0;
    let has_pos = d1 > 0.0 || d2 > 0.0 || d3 > 0.0;
    !(has_neg && has_pos)
}
