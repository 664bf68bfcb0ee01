use crate::error::SimError;
use crate::math::signed_hash11;
use crate::space::{SimVector, Space};

/// Initial particle state. N is `positions.len()`.
#[derive(Clone, Debug, PartialEq)]
pub struct SpawnData<S: Space> {
    positions: Vec<S::Vector>,
    velocities: Vec<S::Vector>,
}

impl<S: Space> SpawnData<S> {
    pub fn new(positions: Vec<S::Vector>, velocities: Vec<S::Vector>) -> Result<Self, SimError> {
        if positions.len() != velocities.len() {
            return Err(SimError::InvalidSpawn(format!(
                "{} positions but {} velocities",
                positions.len(),
                velocities.len()
            )));
        }
        let finite =
            |v: &S::Vector| (0..<S::Vector as SimVector>::DIMS).all(|a| v.axis(a).is_finite());
        if let Some(i) = positions
            .iter()
            .zip(&velocities)
            .position(|(p, v)| !finite(p) || !finite(v))
        {
            return Err(SimError::InvalidSpawn(format!("particle {} is not finite", i)));
        }
        Ok(Self {
            positions,
            velocities,
        })
    }

    pub fn empty() -> Self {
        Self {
            positions: Vec::new(),
            velocities: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn positions(&self) -> &[S::Vector] {
        &self.positions
    }

    pub fn velocities(&self) -> &[S::Vector] {
        &self.velocities
    }
}

pub trait Spawner<S: Space> {
    fn spawn_data(&self) -> SpawnData<S>;
}

/// Fills a box with a lattice of particles, each nudged by a deterministic
/// jitter, all starting with the same velocity.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoxSpawner<S: Space> {
    pub centre: S::Vector,
    pub size: S::Vector,
    pub count: usize,
    pub initial_velocity: S::Vector,
    /// Maximum jitter per axis, in world units.
    pub jitter: f32,
}

impl<S: Space> BoxSpawner<S> {
    pub fn new(centre: S::Vector, size: S::Vector, count: usize) -> Self {
        Self {
            centre,
            size,
            count,
            initial_velocity: S::Vector::ZERO,
            jitter: 0.0,
        }
    }

    pub fn with_velocity(mut self, velocity: S::Vector) -> Self {
        self.initial_velocity = velocity;
        self
    }

    pub fn with_jitter(mut self, jitter: f32) -> Self {
        self.jitter = jitter;
        self
    }

    /// Lattice points per axis: the smallest `k` with `k^DIMS >= count`.
    fn per_axis(&self) -> usize {
        let dims = <S::Vector as SimVector>::DIMS as u32;
        let mut k = (self.count as f64).powf(1.0 / dims as f64).floor().max(1.0) as usize;
        while k.pow(dims) < self.count {
            k += 1;
        }
        k
    }
}

impl<S: Space> Spawner<S> for BoxSpawner<S> {
    fn spawn_data(&self) -> SpawnData<S> {
        let dims = <S::Vector as SimVector>::DIMS;
        let per_axis = self.per_axis();
        let min = self.centre - self.size * 0.5;

        let positions = (0..self.count)
            .map(|i| {
                let mut cell = i;
                let mut p = S::Vector::ZERO;
                for a in 0..dims {
                    let t = ((cell % per_axis) as f32 + 0.5) / per_axis as f32;
                    cell /= per_axis;
                    let jitter = signed_hash11((i * dims + a) as f32) * self.jitter;
                    p = p.with_axis(a, min.axis(a) + self.size.axis(a) * t + jitter);
                }
                p
            })
            .collect();

        SpawnData {
            positions,
            velocities: vec![self.initial_velocity; self.count],
        }
    }
}
