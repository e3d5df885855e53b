//! Following profiles: where to hold station relative to the target and how
//! fast to get there.

pub mod distance_profile;
pub mod presets;

pub use distance_profile::DistanceProfile;
pub use presets::{PresetParams, ProfilePreset, get_profile};
