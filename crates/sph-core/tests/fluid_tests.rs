use std::f32::consts::PI;

use sph_core::kernels::*;

type Kernel = fn(f32, f32, &KernelFactors) -> f32;

/// Integrate `kernel` over a disk (2D) or ball (3D) of radius `h`.
fn integrate(kernel: Kernel, h: f32, k: &KernelFactors, dims: u32) -> f32 {
    let steps = 4_000;
    let dr = h / steps as f32;
    let total: f64 = (0..steps)
        .map(|s| {
            let r = (s as f32 + 0.5) * dr;
            let shell = if dims == 2 { 2.0 * PI * r } else { 4.0 * PI * r * r };
            (kernel(r, h, k) * shell * dr) as f64
        })
        .sum();
    total as f32
}

#[test]
fn test_poly6_kernel_zero_distance() {
    let h = 0.1_f32;
    let k = KernelFactors::volumetric(h);
    let result = smoothing_kernel_poly6(0.0, h, &k);
    // At r=0 the (h^2 - r^2)^3 term equals h^6, so peak = coeff * h^6
    let peak = 315.0 / (64.0 * PI * h.powi(9)) * h.powi(6);
    assert!(
        (result - peak).abs() < peak * 1e-5,
        "poly6(0, {h}) = {result}, expected {peak}"
    );
}

#[test]
fn test_kernels_vanish_at_and_beyond_radius() {
    let h = 0.35_f32;
    let k = KernelFactors::planar(h);
    for kernel in [smoothing_kernel_poly6 as Kernel, spiky_kernel_pow2, spiky_kernel_pow3] {
        assert_eq!(kernel(h, h, &k), 0.0);
        assert_eq!(kernel(h + 0.01, h, &k), 0.0);
    }
    assert_eq!(derivative_spiky_pow2(h + 0.01, h, &k), 0.0);
    assert_eq!(derivative_spiky_pow3(h + 0.01, h, &k), 0.0);
}

#[test]
fn test_planar_kernels_are_normalised() {
    let h = 0.35;
    let k = KernelFactors::planar(h);
    for (name, kernel) in [
        ("poly6", smoothing_kernel_poly6 as Kernel),
        ("spiky pow2", spiky_kernel_pow2),
        ("spiky pow3", spiky_kernel_pow3),
    ] {
        let total = integrate(kernel, h, &k, 2);
        assert!((total - 1.0).abs() < 1e-3, "2D {} integrates to {}", name, total);
    }
}

#[test]
fn test_volumetric_kernels_are_normalised() {
    let h = 0.2;
    let k = KernelFactors::volumetric(h);
    for (name, kernel) in [
        ("poly6", smoothing_kernel_poly6 as Kernel),
        ("spiky pow2", spiky_kernel_pow2),
        ("spiky pow3", spiky_kernel_pow3),
    ] {
        let total = integrate(kernel, h, &k, 3);
        assert!((total - 1.0).abs() < 1e-3, "3D {} integrates to {}", name, total);
    }
}

#[test]
fn test_derivatives_match_finite_differences() {
    let h = 0.5_f32;
    for k in [KernelFactors::planar(h), KernelFactors::volumetric(h)] {
        for r in [0.05_f32, 0.2, 0.4] {
            let eps = 1e-3;
            let central = |f: Kernel| (f(r + eps, h, &k) - f(r - eps, h, &k)) / (2.0 * eps);
            let fd2 = central(spiky_kernel_pow2);
            let fd3 = central(spiky_kernel_pow3);
            let d2 = derivative_spiky_pow2(r, h, &k);
            let d3 = derivative_spiky_pow3(r, h, &k);
            assert!((fd2 - d2).abs() < d2.abs() * 1e-2, "pow2 at {}: {} vs {}", r, d2, fd2);
            assert!((fd3 - d3).abs() < d3.abs() * 1e-2, "pow3 at {}: {} vs {}", r, d3, fd3);
        }
    }
}

#[test]
fn test_density_kernels_peak_at_centre_and_derivatives_are_negative() {
    let h = 0.35;
    let k = KernelFactors::planar(h);
    assert!(density_kernel(0.0, h, &k) > density_kernel(0.1, h, &k));
    assert!(near_density_kernel(0.0, h, &k) > near_density_kernel(0.1, h, &k));
    assert!(density_derivative(0.1, h, &k) < 0.0);
    assert!(near_density_derivative(0.1, h, &k) < 0.0);
    assert!(viscosity_kernel(0.1, h, &k) > 0.0);
}
