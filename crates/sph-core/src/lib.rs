pub mod config;
pub mod control;
pub mod device;
pub mod error;
pub mod forces;
pub mod grid;
pub mod kernels;
pub mod math;
pub mod obstacle;
pub mod params;
pub mod particle;
pub mod pipeline;
pub mod sort;
pub mod space;
pub mod spawner;
pub mod stages;

pub use config::{BoundarySettings, BoxObstacle, ConfigError, SimulationSettings};
pub use control::{Command, ControlState, ControlStateMachine, FrameGate, SkipReason};
pub use device::{Device, DeviceBuffer, DeviceError};
pub use error::SimError;
pub use obstacle::{Aabb, ObstacleMesh, ObstacleSet};
pub use params::{InteractionInput, StepUniforms};
pub use pipeline::{DisplayView, FrameReport, Pipeline, Pipeline2D, Pipeline3D, StepCompleted};
pub use space::{Dim2, Dim3, SimVector, Space};
pub use spawner::{BoxSpawner, SpawnData, Spawner};
