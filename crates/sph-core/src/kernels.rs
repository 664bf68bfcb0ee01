//! SPH smoothing kernels.
//!
//! The pipeline treats these as an opaque numeric kernel: stages only pass a
//! distance, the kernel radius and the normalisation factors marshaled for
//! the current substep.

use std::f32::consts::PI;

/// Normalisation constants for the kernel family at a given radius.
///
/// Recomputed whenever the kernel radius changes (once per frame during
/// parameter marshaling), never inside a stage.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct KernelFactors {
    pub poly6: f32,
    pub spiky_pow3: f32,
    pub spiky_pow2: f32,
    pub spiky_pow3_derivative: f32,
    pub spiky_pow2_derivative: f32,
}

impl KernelFactors {
    /// Factors for 2D kernels.
    pub fn planar(radius: f32) -> Self {
        Self {
            poly6: 4.0 / (PI * radius.powi(8)),
            spiky_pow3: 10.0 / (PI * radius.powi(5)),
            spiky_pow2: 6.0 / (PI * radius.powi(4)),
            spiky_pow3_derivative: 30.0 / (radius.powi(5) * PI),
            spiky_pow2_derivative: 12.0 / (radius.powi(4) * PI),
        }
    }

    /// Factors for 3D kernels.
    pub fn volumetric(radius: f32) -> Self {
        Self {
            poly6: 315.0 / (64.0 * PI * radius.powi(9)),
            spiky_pow3: 15.0 / (PI * radius.powi(6)),
            spiky_pow2: 15.0 / (2.0 * PI * radius.powi(5)),
            spiky_pow3_derivative: 45.0 / (radius.powi(6) * PI),
            spiky_pow2_derivative: 15.0 / (radius.powi(5) * PI),
        }
    }
}

/// Poly6 kernel: `(h^2 - r^2)^3 * poly6` inside the radius, `0.0` outside.
/// Used to weight neighbour velocities for viscosity.
#[inline]
pub fn smoothing_kernel_poly6(dst: f32, radius: f32, k: &KernelFactors) -> f32 {
    if dst >= radius {
        return 0.0;
    }
    let v = radius * radius - dst * dst;
    v * v * v * k.poly6
}

#[inline]
pub fn spiky_kernel_pow3(dst: f32, radius: f32, k: &KernelFactors) -> f32 {
    if dst >= radius {
        return 0.0;
    }
    let v = radius - dst;
    v * v * v * k.spiky_pow3
}

#[inline]
pub fn spiky_kernel_pow2(dst: f32, radius: f32, k: &KernelFactors) -> f32 {
    if dst >= radius {
        return 0.0;
    }
    let v = radius - dst;
    v * v * k.spiky_pow2
}

#[inline]
pub fn derivative_spiky_pow3(dst: f32, radius: f32, k: &KernelFactors) -> f32 {
    if dst > radius {
        return 0.0;
    }
    let v = radius - dst;
    -v * v * k.spiky_pow3_derivative
}

#[inline]
pub fn derivative_spiky_pow2(dst: f32, radius: f32, k: &KernelFactors) -> f32 {
    if dst > radius {
        return 0.0;
    }
    let v = radius - dst;
    -v * k.spiky_pow2_derivative
}

#[inline]
pub fn density_kernel(dst: f32, radius: f32, k: &KernelFactors) -> f32 {
    spiky_kernel_pow2(dst, radius, k)
}

#[inline]
pub fn near_density_kernel(dst: f32, radius: f32, k: &KernelFactors) -> f32 {
    spiky_kernel_pow3(dst, radius, k)
}

#[inline]
pub fn density_derivative(dst: f32, radius: f32, k: &KernelFactors) -> f32 {
    derivative_spiky_pow2(dst, radius, k)
}

#[inline]
pub fn near_density_derivative(dst: f32, radius: f32, k: &KernelFactors) -> f32 {
    derivative_spiky_pow3(dst, radius, k)
}

#[inline]
pub fn viscosity_kernel(dst: f32, radius: f32, k: &KernelFactors) -> f32 {
    smoothing_kernel_poly6(dst, radius, k)
}
