use glam::Vec2;
use sph_core::{
    BoxObstacle, BoxSpawner, Command, ControlState, Device, Dim2, InteractionInput, Pipeline2D,
    SimulationSettings, Spawner,
};
use wasm_bindgen::prelude::*;

/// GPU-compatible particle struct: 16 bytes, matches the WGSL vertex layout
#[repr(C)]
#[derive(Clone, Copy, Default, bytemuck::Pod, bytemuck::Zeroable)]
struct GpuParticle {
    position: [f32; 2], // 8 bytes
    velocity: [f32; 2], // 8 bytes
}

fn log(message: &str) {
    web_sys::console::log_1(&message.into());
}

#[wasm_bindgen]
pub struct FluidWorld {
    pipeline: Pipeline2D,
    gpu_buffer: Vec<GpuParticle>,
}

#[wasm_bindgen]
impl FluidWorld {
    #[wasm_bindgen(constructor)]
    pub fn new(
        particle_count: usize,
        spawn_width: f32,
        spawn_height: f32,
    ) -> Result<FluidWorld, JsError> {
        let spawn_size = Vec2::new(spawn_width, spawn_height);
        let spawn = BoxSpawner::<Dim2>::new(Vec2::ZERO, spawn_size, particle_count)
            .with_jitter(0.02)
            .spawn_data();
        let pipeline = Pipeline2D::new(Device::new(), SimulationSettings::default(), spawn, None)?;
        log(&format!("WASM FluidWorld created: {} particles", particle_count));

        let mut world = FluidWorld {
            pipeline,
            gpu_buffer: vec![GpuParticle::default(); particle_count],
        };
        world.write_gpu_output();
        Ok(world)
    }

    /// Advance one frame. Returns the wall time spent in milliseconds.
    #[wasm_bindgen]
    pub fn step(&mut self, frame_time: f32) -> Result<f32, JsError> {
        let start = js_sys::Date::now();
        let report = self.pipeline.tick(frame_time)?;
        if report.ran {
            self.write_gpu_output();
        }
        Ok((js_sys::Date::now() - start) as f32)
    }

    #[wasm_bindgen]
    pub fn get_gpu_buffer_ptr(&self) -> *const f32 {
        self.gpu_buffer.as_ptr() as *const f32
    }

    #[wasm_bindgen]
    pub fn get_gpu_buffer_byte_length(&self) -> usize {
        bytemuck::cast_slice::<GpuParticle, u8>(&self.gpu_buffer).len()
    }

    #[wasm_bindgen]
    pub fn particle_count(&self) -> usize {
        self.pipeline.num_particles()
    }

    #[wasm_bindgen]
    pub fn is_paused(&self) -> bool {
        self.pipeline.control_state() == ControlState::Paused
    }

    #[wasm_bindgen]
    pub fn toggle_pause(&mut self) -> Result<(), JsError> {
        Ok(self.pipeline.command(Command::TogglePause)?)
    }

    #[wasm_bindgen]
    pub fn single_step(&mut self) -> Result<(), JsError> {
        Ok(self.pipeline.command(Command::SingleStep)?)
    }

    #[wasm_bindgen]
    pub fn reset(&mut self) -> Result<(), JsError> {
        self.pipeline.command(Command::Reset)?;
        self.write_gpu_output();
        Ok(())
    }

    #[wasm_bindgen]
    pub fn set_pointer(&mut self, x: f32, y: f32, pull: bool, push: bool) {
        self.pipeline.set_interaction(InteractionInput {
            point: Vec2::new(x, y),
            pull,
            push,
        });
    }

    #[wasm_bindgen]
    pub fn set_fluid_config(
        &mut self,
        target_density: f32,
        pressure_scale: f32,
        near_pressure_scale: f32,
        viscosity_scale: f32,
        kernel_radius: f32,
    ) {
        let settings = self.pipeline.settings_mut();
        settings.target_density = target_density;
        settings.pressure_scale = pressure_scale;
        settings.near_pressure_scale = near_pressure_scale;
        settings.viscosity_scale = viscosity_scale;
        settings.kernel_radius = kernel_radius;
    }

    #[wasm_bindgen]
    pub fn set_time_config(&mut self, time_scale: f32, iterations_per_frame: u32, gravity: f32) {
        let settings = self.pipeline.settings_mut();
        settings.time_scale = time_scale;
        settings.iterations_per_frame = iterations_per_frame;
        settings.gravity = Vec2::new(0.0, gravity);
    }

    #[wasm_bindgen]
    pub fn set_bounds(&mut self, width: f32, height: f32, collision_damping: f32) {
        let settings = self.pipeline.settings_mut();
        settings.boundary.size = Vec2::new(width, height);
        settings.collision_damping = collision_damping;
    }

    /// A zero-sized box removes the obstacle.
    #[wasm_bindgen]
    pub fn set_box_obstacle(&mut self, x: f32, y: f32, width: f32, height: f32) {
        let size = Vec2::new(width, height);
        let obstacle = BoxObstacle {
            size,
            centre: Vec2::new(x, y),
        };
        let obstacle = (size.min_element() > 0.0).then_some(obstacle);
        self.pipeline.settings_mut().boundary.obstacle = obstacle;
    }

    #[wasm_bindgen]
    pub fn set_interaction(&mut self, radius: f32, strength: f32) {
        let settings = self.pipeline.settings_mut();
        settings.interaction_radius = radius;
        settings.interaction_strength = strength;
    }

    #[wasm_bindgen]
    pub fn load_settings_json(&mut self, json: &str) -> Result<(), JsError> {
        let settings: SimulationSettings<Dim2> = serde_json::from_str(json)?;
        self.pipeline.set_settings(settings);
        Ok(())
    }
}

impl FluidWorld {
    fn write_gpu_output(&mut self) {
        let view = self.pipeline.display();
        for ((out, pos), vel) in self
            .gpu_buffer
            .iter_mut()
            .zip(view.positions)
            .zip(view.velocities)
        {
            *out = GpuParticle {
                position: pos.to_array(),
                velocity: vel.to_array(),
            };
        }
    }
}
