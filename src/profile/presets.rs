//! Named stand-off presets and the distance → preset selector.

use std::fmt;

use super::distance_profile::DistanceProfile;

/// The four stock following configurations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProfilePreset {
    Close,
    Medium,
    Far,
    VeryFar,
}

/// Numeric parameters behind a preset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PresetParams {
    pub target_distance: f64,
    pub altitude: Option<f64>,
    pub horizontal_offset: f64,
    pub distance_tolerance: f64,
    pub max_speed: f64,
}

const fn params(target_distance: f64, altitude: f64, tolerance: f64, max_speed: f64) -> PresetParams {
    PresetParams {
        target_distance,
        altitude: Some(altitude),
        horizontal_offset: 0.0,
        distance_tolerance: tolerance,
        max_speed,
    }
}

const CLOSE: PresetParams = params(3.0, 2.5, 0.3, 1.5);
const MEDIUM: PresetParams = params(5.0, 3.0, 0.5, 2.0);
const FAR: PresetParams = params(10.0, 4.0, 1.0, 3.0);
const VERY_FAR: PresetParams = params(20.0, 8.0, 2.0, 5.0);

impl ProfilePreset {
    pub const ALL: [ProfilePreset; 4] = [
        ProfilePreset::Close,
        ProfilePreset::Medium,
        ProfilePreset::Far,
        ProfilePreset::VeryFar,
    ];

    /// Pick the preset for a requested stand-off distance.
    ///
    /// Thresholds are inclusive on the closer preset: 3 m is still `Close`,
    /// anything past 10 m is `VeryFar`.
    pub fn for_distance(distance: f64) -> Self {
        if distance <= 3.0 {
            ProfilePreset::Close
        } else if distance <= 5.0 {
            ProfilePreset::Medium
        } else if distance <= 10.0 {
            ProfilePreset::Far
        } else {
            ProfilePreset::VeryFar
        }
    }

    pub fn params(self) -> PresetParams {
        match self {
            ProfilePreset::Close => CLOSE,
            ProfilePreset::Medium => MEDIUM,
            ProfilePreset::Far => FAR,
            ProfilePreset::VeryFar => VERY_FAR,
        }
    }

    pub fn profile(self) -> DistanceProfile {
        DistanceProfile::from_preset(self.params())
    }

    pub fn name(self) -> &'static str {
        match self {
            ProfilePreset::Close => "close",
            ProfilePreset::Medium => "medium",
            ProfilePreset::Far => "far",
            ProfilePreset::VeryFar => "very-far",
        }
    }
}

impl fmt::Display for ProfilePreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Preset profile for a requested stand-off distance.
pub fn get_profile(distance: f64) -> DistanceProfile {
    ProfilePreset::for_distance(distance).profile()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_thresholds() {
        assert_eq!(ProfilePreset::for_distance(3.0), ProfilePreset::Close);
        assert_eq!(ProfilePreset::for_distance(3.01), ProfilePreset::Medium);
        assert_eq!(ProfilePreset::for_distance(5.0), ProfilePreset::Medium);
        assert_eq!(ProfilePreset::for_distance(10.0), ProfilePreset::Far);
        assert_eq!(ProfilePreset::for_distance(10.01), ProfilePreset::VeryFar);
    }

    #[test]
    fn test_selector_extremes() {
        assert_eq!(ProfilePreset::for_distance(0.0), ProfilePreset::Close);
        assert_eq!(ProfilePreset::for_distance(-4.0), ProfilePreset::Close);
        assert_eq!(ProfilePreset::for_distance(500.0), ProfilePreset::VeryFar);
    }

    #[test]
    fn test_selector_is_monotonic() {
        let mut last = ProfilePreset::for_distance(0.0).params().target_distance;
        for step in 0..300 {
            let d = step as f64 * 0.1;
            let current = get_profile(d).target_distance();
            assert!(current >= last);
            last = current;
        }
    }

    #[test]
    fn test_presets_are_valid() {
        for preset in ProfilePreset::ALL {
            let profile = preset.profile();
            assert!(profile.max_speed() > 0.0);
            assert!(profile.distance_tolerance() >= 0.0);
            let p = preset.params();
            let validated = DistanceProfile::new(
                p.target_distance,
                p.altitude,
                p.horizontal_offset,
                p.distance_tolerance,
                p.max_speed,
            );
            assert_eq!(validated, Ok(profile));
        }
    }

    #[test]
    fn test_get_profile_medium_values() {
        let profile = get_profile(4.2);
        assert_eq!(profile.target_distance(), 5.0);
        assert_eq!(profile.altitude(), Some(3.0));
        assert_eq!(profile.distance_tolerance(), 0.5);
        assert_eq!(profile.max_speed(), 2.0);
    }

    #[test]
    fn test_preset_display() {
        assert_eq!(ProfilePreset::VeryFar.to_string(), "very-far");
    }
}
