//! Geometry utilities: NED frame conventions and vector helpers.

pub mod ned;

pub use ned::{
    NedPosition, NedVelocity, bearing, clamp_norm, horizontal, horizontal_distance, ned,
};
