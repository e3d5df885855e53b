//! Control side: turns target estimates into vehicle velocity commands.

pub mod capabilities;
pub mod follow_loop;
pub mod simulated;

pub use capabilities::{CommandSink, PositionSource, VelocityCommand};
pub use follow_loop::{
    ActiveProfile, ControlConfig, FollowController, FollowStats, HoverReason, TickOutcome,
};
pub use simulated::SimulatedVehicle;
