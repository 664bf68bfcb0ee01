use std::fmt;
use std::path::Path;

use glam::{Vec2, Vec3};
use log::warn;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::space::{Dim2, Dim3, SimVector, Space};

/// Smallest kernel radius the pipeline accepts; kernel factors divide by
/// powers of the radius.
pub const MIN_KERNEL_RADIUS: f32 = 1e-4;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("settings file: {0}")]
    Io(#[from] std::io::Error),
    #[error("settings json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Axis-aligned box obstacle inside the boundary (2D scenes).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct BoxObstacle<S: Space> {
    pub size: S::Vector,
    pub centre: S::Vector,
}

/// The simulation bounds. Particles are kept inside `size` around `centre`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct BoundarySettings<S: Space> {
    pub size: S::Vector,
    pub centre: S::Vector,
    #[serde(default)]
    pub obstacle: Option<BoxObstacle<S>>,
}

/// Every tunable of a simulation. Read once per frame by parameter
/// marshaling; changes take effect at the next frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct SimulationSettings<S: Space> {
    pub time_scale: f32,
    /// Use `fixed_delta_time` instead of the measured frame time.
    pub fixed_time_step: bool,
    #[serde(default = "default_fixed_delta_time")]
    pub fixed_delta_time: f32,
    pub iterations_per_frame: u32,

    pub gravity: S::Vector,
    pub collision_damping: f32,
    pub kernel_radius: f32,
    pub target_density: f32,
    pub pressure_scale: f32,
    pub near_pressure_scale: f32,
    pub viscosity_scale: f32,
    pub boundary: BoundarySettings<S>,

    pub interaction_radius: f32,
    pub interaction_strength: f32,

    /// Blend of the current velocity towards its average with the two
    /// previous substeps, 0..1.
    #[serde(default)]
    pub velocity_smoothing: f32,
    /// Velocity damping for particles that barely moved over the last two
    /// substeps, 0..1.
    #[serde(default)]
    pub settle_damping: f32,
    /// Bucket count of the spatial hash table. `None` uses the particle count.
    #[serde(default)]
    pub hash_table_size: Option<u32>,
    #[serde(default = "default_warmup_frames")]
    pub warmup_frames: u64,
    #[serde(default)]
    pub start_paused: bool,
}

fn default_fixed_delta_time() -> f32 {
    1.0 / 120.0
}

fn default_warmup_frames() -> u64 {
    10
}

impl Default for SimulationSettings<Dim2> {
    fn default() -> Self {
        Self {
            time_scale: 1.0,
            fixed_time_step: false,
            fixed_delta_time: default_fixed_delta_time(),
            iterations_per_frame: 3,
            gravity: Vec2::new(0.0, -12.0),
            collision_damping: 0.95,
            kernel_radius: 0.35,
            target_density: 55.0,
            pressure_scale: 500.0,
            near_pressure_scale: 18.0,
            viscosity_scale: 0.06,
            boundary: BoundarySettings {
                size: Vec2::new(17.1, 9.3),
                centre: Vec2::ZERO,
                obstacle: None,
            },
            interaction_radius: 2.0,
            interaction_strength: 90.0,
            velocity_smoothing: 0.0,
            settle_damping: 0.0,
            hash_table_size: None,
            warmup_frames: default_warmup_frames(),
            start_paused: false,
        }
    }
}

impl Default for SimulationSettings<Dim3> {
    fn default() -> Self {
        Self {
            time_scale: 1.0,
            fixed_time_step: false,
            fixed_delta_time: default_fixed_delta_time(),
            iterations_per_frame: 3,
            gravity: Vec3::new(0.0, -10.0, 0.0),
            collision_damping: 0.05,
            kernel_radius: 0.2,
            target_density: 630.0,
            pressure_scale: 288.0,
            near_pressure_scale: 2.15,
            viscosity_scale: 0.001,
            boundary: BoundarySettings {
                size: Vec3::splat(10.0),
                centre: Vec3::ZERO,
                obstacle: None,
            },
            interaction_radius: 2.0,
            interaction_strength: 0.0,
            velocity_smoothing: 0.0,
            settle_damping: 0.0,
            hash_table_size: None,
            warmup_frames: default_warmup_frames(),
            start_paused: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum SettingsWarning {
    KernelRadiusTooSmall(f32),
    NoIterations,
    OutOfUnitRange { field: &'static str, value: f32 },
    NonPositiveTargetDensity(f32),
    EmptyBoundary,
    EmptyHashTable,
}

impl fmt::Display for SettingsWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KernelRadiusTooSmall(r) => {
                write!(f, "kernel radius {} below minimum {}", r, MIN_KERNEL_RADIUS)
            }
            Self::NoIterations => write!(f, "iterations per frame is 0"),
            Self::OutOfUnitRange { field, value } => {
                write!(f, "{} = {} outside 0..1", field, value)
            }
            Self::NonPositiveTargetDensity(d) => write!(f, "target density {} is not positive", d),
            Self::EmptyBoundary => write!(f, "boundary box has a non-positive extent"),
            Self::EmptyHashTable => write!(f, "hash table size is 0"),
        }
    }
}

fn unit_range(value: f32) -> bool {
    (0.0..=1.0).contains(&value)
}

impl<S: Space> SimulationSettings<S> {
    pub fn load_json(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    pub fn save_json(&self, path: &Path) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Everything [`SimulationSettings::sanitized`] would have to correct,
    /// plus values that are legal but almost certainly a mistake.
    pub fn validate(&self) -> Vec<SettingsWarning> {
        let mut warnings = Vec::new();
        if !(self.kernel_radius >= MIN_KERNEL_RADIUS) {
            warnings.push(SettingsWarning::KernelRadiusTooSmall(self.kernel_radius));
        }
        if self.iterations_per_frame == 0 {
            warnings.push(SettingsWarning::NoIterations);
        }
        for (field, value) in [
            ("collision_damping", self.collision_damping),
            ("velocity_smoothing", self.velocity_smoothing),
            ("settle_damping", self.settle_damping),
        ] {
            if !unit_range(value) {
                warnings.push(SettingsWarning::OutOfUnitRange { field, value });
            }
        }
        if !(self.target_density > 0.0) {
            warnings.push(SettingsWarning::NonPositiveTargetDensity(self.target_density));
        }
        if (0..<S::Vector as SimVector>::DIMS).any(|a| !(self.boundary.size.axis(a) > 0.0)) {
            warnings.push(SettingsWarning::EmptyBoundary);
        }
        if self.hash_table_size == Some(0) {
            warnings.push(SettingsWarning::EmptyHashTable);
        }
        warnings
    }

    /// A copy with every value the pipeline cannot run with clamped into
    /// range.
    pub fn sanitized(&self) -> Self {
        let mut s = self.clone();
        if !(s.kernel_radius >= MIN_KERNEL_RADIUS) {
            warn!(
                "kernel radius {} clamped to {}",
                s.kernel_radius, MIN_KERNEL_RADIUS
            );
            s.kernel_radius = MIN_KERNEL_RADIUS;
        }
        if s.iterations_per_frame == 0 {
            warn!("iterations per frame clamped to 1");
            s.iterations_per_frame = 1;
        }
        for (field, value) in [
            ("collision_damping", &mut s.collision_damping),
            ("velocity_smoothing", &mut s.velocity_smoothing),
            ("settle_damping", &mut s.settle_damping),
        ] {
            if !unit_range(*value) {
                let clamped = if value.is_nan() { 0.0 } else { (*value).clamp(0.0, 1.0) };
                warn!("{} {} clamped to {}", field, value, clamped);
                *value = clamped;
            }
        }
        if s.hash_table_size == Some(0) {
            warn!("hash table size clamped to 1");
            s.hash_table_size = Some(1);
        }
        s
    }

    /// Bucket count for `num_particles` particles.
    pub fn table_size(&self, num_particles: usize) -> u32 {
        self.hash_table_size
            .unwrap_or(num_particles as u32)
            .max(1)
    }
}
