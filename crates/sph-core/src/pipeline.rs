//! Simulation step pipeline.
//!
//! Owns the device, every particle buffer and the obstacle, and is driven by
//! an external loop through [`Pipeline::tick`]. A substep runs the stages in
//! a fixed order, each a full barrier for the next:
//!
//! 1. external forces (velocity, predicted position)
//! 2. spatial hash
//! 3. sort + bucket offsets
//! 4. density
//! 5. pressure, then viscosity
//! 6. position update with boundary and obstacle collisions
//!
//! Substep counters and step notifications only advance after all six
//! stages succeeded.

use std::mem;
use std::sync::mpsc;

use glam::Vec2;
use log::{error, info, warn};

use crate::config::SimulationSettings;
use crate::control::{Command, ControlState, ControlStateMachine, FrameGate, SkipReason};
use crate::device::Device;
use crate::error::SimError;
use crate::obstacle::{ObstacleMesh, ObstacleSet};
use crate::params::{InteractionInput, StepUniforms, UniformBuffer};
use crate::particle::ParticleBuffers;
use crate::space::{Dim2, Dim3, Space};
use crate::spawner::SpawnData;
use crate::stages;

pub type Pipeline2D = Pipeline<Dim2>;
pub type Pipeline3D = Pipeline<Dim3>;

/// Fired once per completed substep.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StepCompleted;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameReport {
    pub gate: FrameGate,
    pub ran: bool,
    /// Substeps run this frame.
    pub substeps: u32,
    pub delta_time: f32,
    /// Substeps run since creation, resets excluded.
    pub total_substeps: u64,
}

/// Read-only particle state for a renderer.
pub struct DisplayView<'a, S: Space> {
    pub positions: &'a [S::Vector],
    pub velocities: &'a [S::Vector],
    pub num_particles: usize,
}

impl<S: Space> DisplayView<'_, S> {
    pub fn position_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(self.positions)
    }

    pub fn velocity_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(self.velocities)
    }
}

pub struct Pipeline<S: Space> {
    device: Device,
    settings: SimulationSettings<S>,
    /// Set by [`Pipeline::settings_mut`]; the next frame re-sanitizes.
    settings_dirty: bool,
    input: InteractionInput<S>,
    spawn: SpawnData<S>,
    buffers: ParticleBuffers<S>,
    obstacle: Option<ObstacleSet<S>>,
    uniforms: UniformBuffer<StepUniforms<S>>,
    control: ControlStateMachine,
    frame_count: u64,
    total_substeps: u64,
    subscribers: Vec<mpsc::Sender<StepCompleted>>,
}

impl<S: Space> Pipeline<S> {
    pub fn new(
        mut device: Device,
        settings: SimulationSettings<S>,
        spawn: SpawnData<S>,
        obstacle: Option<&ObstacleMesh<S>>,
    ) -> Result<Self, SimError> {
        let settings = checked(settings);
        let n = spawn.len();
        let mut buffers = ParticleBuffers::allocate(&mut device, n, settings.table_size(n));
        buffers.seed(&spawn)?;
        let obstacle = obstacle
            .filter(|mesh| !mesh.is_empty())
            .map(|mesh| ObstacleSet::new(&mut device, mesh));
        let input = InteractionInput::idle();
        let uniforms = UniformBuffer::new(StepUniforms::marshal(&settings, &input, 0.0, n));
        let control = ControlStateMachine::new(settings.start_paused);

        info!(
            "{} pipeline: {} particles, {} obstacle triangles",
            S::NAME,
            n,
            obstacle.as_ref().map_or(0, |o| o.triangle_count())
        );

        Ok(Self {
            device,
            settings,
            settings_dirty: false,
            input,
            spawn,
            buffers,
            obstacle,
            uniforms,
            control,
            frame_count: 0,
            total_substeps: 0,
            subscribers: Vec::new(),
        })
    }

    /// Advance one frame of `frame_time` seconds (ignored in fixed time step
    /// mode). Runs `iterations_per_frame` substeps, or one after a single-step
    /// command, unless the control gate skips the frame.
    pub fn tick(&mut self, frame_time: f32) -> Result<FrameReport, SimError> {
        self.frame_count += 1;
        self.apply_settings();
        let fixed = self.settings.fixed_time_step;

        if self.settings.table_size(self.spawn.len()) != self.buffers.table_size() {
            warn!("hash table size changed, reallocating through reset");
            self.reset()?;
        }

        let gate = self.control.begin_frame(self.frame_count, fixed, self.settings.warmup_frames);
        let FrameGate::Run { substeps } = gate else {
            return Ok(self.report(gate, 0, 0.0));
        };

        let frame_time = if fixed {
            self.settings.fixed_delta_time
        } else {
            frame_time
        };
        let iterations = self.settings.iterations_per_frame.max(1);
        let delta_time = frame_time / iterations as f32 * self.settings.time_scale;
        let count = substeps.unwrap_or(iterations);

        self.marshal(delta_time);
        for _ in 0..count {
            if let Err(e) = self.step_marshaled() {
                error!("frame {} abandoned: {}", self.frame_count, e);
                return Err(e);
            }
        }
        self.control.end_frame(true);
        Ok(self.report(gate, count, delta_time))
    }

    /// Advance exactly one substep of `delta_time`, ignoring the control gate.
    pub fn run_step(&mut self, delta_time: f32) -> Result<(), SimError> {
        self.apply_settings();
        self.marshal(delta_time);
        self.step_marshaled()
    }

    /// Pause, then re-seed from the spawn data, run one step so derived
    /// fields (densities) are populated, and re-seed again. Reallocates when
    /// the particle count or hash table size no longer matches.
    pub fn reset(&mut self) -> Result<(), SimError> {
        self.control.reset();
        self.apply_settings();
        let n = self.spawn.len();
        let table_size = self.settings.table_size(n);
        if n != self.buffers.num_particles() || table_size != self.buffers.table_size() {
            let fresh = ParticleBuffers::allocate(&mut self.device, n, table_size);
            let stale = mem::replace(&mut self.buffers, fresh);
            stale.release(&mut self.device);
        }

        self.buffers.seed(&self.spawn)?;
        let iterations = self.settings.iterations_per_frame.max(1);
        let delta_time = self.settings.fixed_delta_time / iterations as f32;
        self.marshal(delta_time * self.settings.time_scale);
        let stepped = self.run_stages();
        self.buffers.seed(&self.spawn)?;
        stepped?;

        info!("{} pipeline reset: {} particles", S::NAME, n);
        Ok(())
    }

    /// Replace the spawn data and reset.
    pub fn respawn(&mut self, spawn: SpawnData<S>) -> Result<(), SimError> {
        self.spawn = spawn;
        self.reset()
    }

    pub fn command(&mut self, command: Command) -> Result<(), SimError> {
        if self.control.apply(command) {
            self.reset()?;
        }
        Ok(())
    }

    pub fn settings(&self) -> &SimulationSettings<S> {
        &self.settings
    }

    /// Changes are sanitized and take effect at the start of the next
    /// frame, step or reset.
    pub fn settings_mut(&mut self) -> &mut SimulationSettings<S> {
        self.settings_dirty = true;
        &mut self.settings
    }

    pub fn set_settings(&mut self, settings: SimulationSettings<S>) {
        self.settings = checked(settings);
        self.settings_dirty = false;
    }

    pub fn set_interaction(&mut self, input: InteractionInput<S>) {
        self.input = input;
    }

    /// Replace the obstacle mesh, or remove it with `None`.
    pub fn set_obstacle(&mut self, mesh: Option<&ObstacleMesh<S>>) {
        let fresh = mesh
            .filter(|mesh| !mesh.is_empty())
            .map(|mesh| ObstacleSet::new(&mut self.device, mesh));
        if let Some(stale) = mem::replace(&mut self.obstacle, fresh) {
            let mut idle = self.device.drain();
            stale.release(&mut idle);
        }
    }

    /// New world-space vertices for the obstacle (same topology). The AABBs
    /// are rebuilt before the next substep.
    pub fn move_obstacle(&mut self, vertices: &[S::Vector]) -> Result<(), SimError> {
        match self.obstacle.as_mut() {
            Some(obstacle) => obstacle.set_vertices(vertices),
            None => Err(SimError::InvalidObstacle("no obstacle to move".into())),
        }
    }

    pub fn obstacle(&self) -> Option<&ObstacleSet<S>> {
        self.obstacle.as_ref()
    }

    pub fn display(&mut self) -> DisplayView<'_, S> {
        self.device.wait_idle();
        DisplayView {
            positions: self.buffers.position.as_slice(),
            velocities: self.buffers.velocity.as_slice(),
            num_particles: self.buffers.num_particles(),
        }
    }

    pub fn densities(&mut self) -> &[Vec2] {
        self.device.wait_idle();
        self.buffers.density.as_slice()
    }

    pub fn collision_flags(&mut self) -> &[u32] {
        self.device.wait_idle();
        self.buffers.collision_flag.as_slice()
    }

    /// A receiver that gets one [`StepCompleted`] per substep. Dropped
    /// receivers are pruned on the next notification.
    pub fn subscribe(&mut self) -> mpsc::Receiver<StepCompleted> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn num_particles(&self) -> usize {
        self.buffers.num_particles()
    }

    pub fn control_state(&self) -> ControlState {
        self.control.state()
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn total_substeps(&self) -> u64 {
        self.total_substeps
    }

    pub fn uniforms(&self) -> &StepUniforms<S> {
        self.uniforms.get()
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut Device {
        &mut self.device
    }

    /// Drain outstanding work, release every buffer and hand the device back.
    pub fn shutdown(mut self) -> Device {
        if self.device.is_lost() {
            warn!("{} pipeline shutting down on a lost device", S::NAME);
        }
        if let Some(obstacle) = self.obstacle.take() {
            let mut idle = self.device.drain();
            obstacle.release(&mut idle);
        }
        self.buffers.release(&mut self.device);
        info!("{} pipeline shut down after {} substeps", S::NAME, self.total_substeps);
        self.device
    }

    fn apply_settings(&mut self) {
        if mem::take(&mut self.settings_dirty) {
            self.settings = checked(self.settings.clone());
        }
    }

    fn marshal(&mut self, delta_time: f32) {
        let uniforms = StepUniforms::marshal(
            &self.settings,
            &self.input,
            delta_time,
            self.buffers.num_particles(),
        );
        self.uniforms.write(uniforms);
    }

    fn step_marshaled(&mut self) -> Result<(), SimError> {
        self.run_stages()?;
        self.total_substeps += 1;
        self.subscribers.retain(|tx| tx.send(StepCompleted).is_ok());
        Ok(())
    }

    fn run_stages(&mut self) -> Result<(), SimError> {
        if self.buffers.num_particles() == 0 {
            return Ok(());
        }
        let u = *self.uniforms.get();
        let device = &mut self.device;
        let b = &mut self.buffers;

        if let Some(obstacle) = self.obstacle.as_mut() {
            obstacle.refresh(device)?;
        }
        stages::external_forces(device, b, &u)?;
        stages::spatial_hash(device, b, &u)?;
        stages::sort_and_offsets(device, b)?;
        stages::density(device, b, &u)?;
        stages::pressure(device, b, &u)?;
        stages::viscosity(device, b, &u)?;
        stages::update_positions(device, b, &u, self.obstacle.as_ref())?;
        Ok(())
    }

    fn report(&self, gate: FrameGate, substeps: u32, delta_time: f32) -> FrameReport {
        FrameReport {
            gate,
            ran: gate.runs(),
            substeps,
            delta_time,
            total_substeps: self.total_substeps,
        }
    }
}

impl FrameReport {
    pub fn skipped_because(&self) -> Option<SkipReason> {
        match self.gate {
            FrameGate::Skip(reason) => Some(reason),
            FrameGate::Run { .. } => None,
        }
    }
}

/// Sanitize settings and log whatever sanitizing could not fix.
fn checked<S: Space>(settings: SimulationSettings<S>) -> SimulationSettings<S> {
    let settings = settings.sanitized();
    for warning in settings.validate() {
        warn!("settings: {}", warning);
    }
    settings
}
