pub mod pointer;

pub use pointer::interaction_acceleration;
