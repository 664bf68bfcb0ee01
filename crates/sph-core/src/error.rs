use thiserror::Error;

use crate::config::ConfigError;
use crate::device::DeviceError;

#[derive(Error, Debug)]
pub enum SimError {
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error("invalid spawn data: {0}")]
    InvalidSpawn(String),
    #[error("invalid obstacle mesh: {0}")]
    InvalidObstacle(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
