use glam::Vec2;
use log::debug;

use crate::device::{Device, DeviceBuffer, DeviceError};
use crate::grid::SpatialEntry;
use crate::sort::SpatialHashSorter;
use crate::space::Space;
use crate::spawner::SpawnData;

/// SoA particle storage on the device, plus the spatial hash table built
/// from it every substep. Owned as one arena and torn down in one place.
pub struct ParticleBuffers<S: Space> {
    pub position: DeviceBuffer<S::Vector>,
    /// Position advanced by one substep; only used within that substep.
    pub predicted: DeviceBuffer<S::Vector>,
    pub velocity: DeviceBuffer<S::Vector>,
    /// Write target of the double-buffered velocity stages.
    pub velocity_scratch: DeviceBuffer<S::Vector>,
    pub previous_velocity: DeviceBuffer<S::Vector>,
    pub previous_previous_velocity: DeviceBuffer<S::Vector>,
    pub previous_position: DeviceBuffer<S::Vector>,
    pub previous_previous_position: DeviceBuffer<S::Vector>,
    /// (density, near density)
    pub density: DeviceBuffer<Vec2>,
    /// 1 when the particle hit the obstacle mesh this substep.
    pub collision_flag: DeviceBuffer<u32>,

    pub spatial: DeviceBuffer<SpatialEntry>,
    pub offsets: DeviceBuffer<u32>,
    pub sorter: SpatialHashSorter,
}

impl<S: Space> ParticleBuffers<S> {
    pub fn allocate(device: &mut Device, num_particles: usize, table_size: u32) -> Self {
        let n = num_particles;
        debug!(
            "allocating {} particle buffers: {} particles, {} buckets",
            S::NAME,
            n,
            table_size
        );
        let mut offsets = device.create_buffer("spatial offsets", table_size as usize);
        offsets.fill(n as u32);
        Self {
            position: device.create_buffer("position", n),
            predicted: device.create_buffer("predicted position", n),
            velocity: device.create_buffer("velocity", n),
            velocity_scratch: device.create_buffer("velocity scratch", n),
            previous_velocity: device.create_buffer("previous velocity", n),
            previous_previous_velocity: device.create_buffer("previous previous velocity", n),
            previous_position: device.create_buffer("previous position", n),
            previous_previous_position: device.create_buffer("previous previous position", n),
            density: device.create_buffer("density", n),
            collision_flag: device.create_buffer("collision flag", n),
            spatial: device.create_buffer("spatial entries", n),
            offsets,
            sorter: SpatialHashSorter::new(device, n),
        }
    }

    pub fn num_particles(&self) -> usize {
        self.position.len()
    }

    pub fn table_size(&self) -> u32 {
        self.offsets.len() as u32
    }

    /// Upload spawn state into every per-particle state buffer. Histories
    /// start at the spawn state. Densities are left as they are.
    pub fn seed(&mut self, spawn: &SpawnData<S>) -> Result<(), DeviceError> {
        self.position.write(spawn.positions())?;
        self.predicted.write(spawn.positions())?;
        self.previous_position.write(spawn.positions())?;
        self.previous_previous_position.write(spawn.positions())?;
        self.velocity.write(spawn.velocities())?;
        self.velocity_scratch.write(spawn.velocities())?;
        self.previous_velocity.write(spawn.velocities())?;
        self.previous_previous_velocity.write(spawn.velocities())?;
        self.collision_flag.fill(0);
        Ok(())
    }

    /// Drain the device, then release every buffer.
    pub fn release(self, device: &mut Device) {
        let mut idle = device.drain();
        idle.release(self.position);
        idle.release(self.predicted);
        idle.release(self.velocity);
        idle.release(self.velocity_scratch);
        idle.release(self.previous_velocity);
        idle.release(self.previous_previous_velocity);
        idle.release(self.previous_position);
        idle.release(self.previous_previous_position);
        idle.release(self.density);
        idle.release(self.collision_flag);
        idle.release(self.spatial);
        idle.release(self.offsets);
        self.sorter.release(&mut idle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::space::Dim2;

    #[test]
    fn test_seed_rejects_wrong_particle_count() {
        let mut device = Device::new();
        let mut buffers = ParticleBuffers::<Dim2>::allocate(&mut device, 4, 4);
        let spawn = SpawnData::<Dim2>::new(vec![Vec2::ZERO; 3], vec![Vec2::ZERO; 3]).unwrap();
        assert!(matches!(buffers.seed(&spawn), Err(DeviceError::SizeMismatch { .. })));
        buffers.release(&mut device);
        assert_eq!(device.live_buffers(), 0);
        assert_eq!(device.live_bytes(), 0);
    }
}
