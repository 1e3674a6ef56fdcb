//! Lighting presets: a colour and brightness applied together

use serde::{Deserialize, Serialize};

use crate::core::bluetooth::commands::Rgb;

const WARM: Rgb = Rgb::new(255, 204, 153);
const NIGHT: Rgb = Rgb::new(255, 107, 107);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preset {
    pub name: String,
    pub color: Rgb,
    /// Brightness percentage, 0..=100
    pub brightness: u8,
}

impl Preset {
    pub fn new(name: &str, color: Rgb, brightness: u8) -> Self {
        Self {
            name: name.to_string(),
            color,
            brightness,
        }
    }
}

/// The built-in presets
pub fn default_presets() -> Vec<Preset> {
    vec![
        Preset::new("bright", Rgb::WHITE, 100),
        Preset::new("warm", WARM, 70),
        Preset::new("night", NIGHT, 30),
        Preset::new("morning", Rgb::WHITE, 100),
        Preset::new("evening", WARM, 40),
    ]
}

/// Case-insensitive lookup by name
pub fn find_preset<'a>(presets: &'a [Preset], name: &str) -> Option<&'a Preset> {
    presets.iter().find(|p| p.name.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_presets() {
        let presets = default_presets();
        let night = find_preset(&presets, "Night").unwrap();
        assert_eq!(night.color, Rgb::new(255, 107, 107));
        assert_eq!(night.brightness, 30);
        assert_eq!(find_preset(&presets, "evening").unwrap().brightness, 40);
        assert!(find_preset(&presets, "disco").is_none());
    }
}
