pub mod config;
pub mod control;
pub mod error;
pub mod geometry;
pub mod io;
pub mod profile;
pub mod system;
pub mod vision;
#[cfg(feature = "viz")]
pub mod viz;
