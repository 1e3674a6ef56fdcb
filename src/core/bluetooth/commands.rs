//! Lamp command encoding
//! This module maps colour and brightness intents to the lamp's wire frames.
//!
//! ```text
//! Colour:     [0x56, R, G, B, 0xAA]   R,G,B in 0..=255
//! Brightness: [0x56, 0x01, L, 0xAA]   L in 0..=100
//! ```
//!
//! One characteristic write carries exactly one frame; there is no checksum
//! or acknowledgement.

use std::fmt;
use std::ops::Deref;

use serde::{Deserialize, Serialize};

use crate::core::bluetooth::constants::{
    BRIGHTNESS_SELECTOR, FRAME_END, FRAME_START, MAX_BRIGHTNESS,
};
use crate::core::error::LampError;

/// An RGB colour as sent to the lamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const WHITE: Rgb = Rgb::new(255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Extracts the colour from a packed `0xAARRGGBB` value, ignoring alpha
    pub fn from_packed(color: u32) -> Self {
        Self {
            r: ((color >> 16) & 0xFF) as u8,
            g: ((color >> 8) & 0xFF) as u8,
            b: (color & 0xFF) as u8,
        }
    }
}

/// The two independent command channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    Color,
    Brightness,
}

/// An encoded command frame, immutable once built
#[derive(Clone, PartialEq, Eq)]
pub struct Frame(Box<[u8]>);

impl Frame {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl Deref for Frame {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frame({:02X?})", &self.0)
    }
}

/// Lamp commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LampCommand {
    /// Set the RGB colour
    Color(Rgb),
    /// Set the brightness level (0..=100)
    Brightness(u8),
}

impl LampCommand {
    /// The channel this command coalesces on
    pub fn channel(&self) -> Channel {
        match self {
            Self::Color(_) => Channel::Color,
            Self::Brightness(_) => Channel::Brightness,
        }
    }

    /// Convert the command to its frame
    pub fn to_frame(&self) -> Result<Frame, LampError> {
        match *self {
            Self::Color(Rgb { r, g, b }) => encode_color(r.into(), g.into(), b.into()),
            Self::Brightness(level) => encode_brightness(level.into()),
        }
    }
}

/// Encodes a colour frame. Components must lie in `0..=255`.
pub fn encode_color(r: i32, g: i32, b: i32) -> Result<Frame, LampError> {
    let r = color_component("red", r)?;
    let g = color_component("green", g)?;
    let b = color_component("blue", b)?;
    Ok(Frame(Box::new([FRAME_START, r, g, b, FRAME_END])))
}

/// Encodes a brightness frame. `level` must lie in `0..=100`.
pub fn encode_brightness(level: i32) -> Result<Frame, LampError> {
    if !(0..=MAX_BRIGHTNESS).contains(&level) {
        return Err(LampError::InvalidArgument(format!(
            "brightness {} outside 0..={}",
            level, MAX_BRIGHTNESS
        )));
    }
    Ok(Frame(Box::new([
        FRAME_START,
        BRIGHTNESS_SELECTOR,
        level as u8,
        FRAME_END,
    ])))
}

fn color_component(name: &str, value: i32) -> Result<u8, LampError> {
    u8::try_from(value).map_err(|_| {
        LampError::InvalidArgument(format!("{} component {} outside 0..=255", name, value))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::bluetooth::constants::{BRIGHTNESS_FRAME_LEN, COLOR_FRAME_LEN};

    #[test]
    fn test_color_frame_layout() {
        assert_eq!(
            encode_color(255, 107, 107).unwrap().as_bytes(),
            &[0x56, 255, 107, 107, 0xAA]
        );
        assert_eq!(encode_color(0, 0, 0).unwrap().as_bytes(), &[0x56, 0, 0, 0, 0xAA]);
        assert_eq!(encode_color(1, 2, 3).unwrap().len(), COLOR_FRAME_LEN);
        assert_eq!(encode_brightness(50).unwrap().len(), BRIGHTNESS_FRAME_LEN);
    }

    #[test]
    fn test_color_frame_exhaustive_per_component() {
        for v in 0..=255 {
            let frame = encode_color(v, 255 - v, v / 2).unwrap();
            assert_eq!(
                frame.as_bytes(),
                &[0x56, v as u8, (255 - v) as u8, (v / 2) as u8, 0xAA]
            );
        }
    }

    #[test]
    fn test_color_out_of_range_is_rejected() {
        for (r, g, b) in [(-1, 0, 0), (0, 256, 0), (0, 0, 1000), (i32::MIN, 0, 0)] {
            assert!(matches!(
                encode_color(r, g, b),
                Err(LampError::InvalidArgument(_))
            ));
        }
    }

    #[test]
    fn test_brightness_frame_layout() {
        for level in 0..=100 {
            assert_eq!(
                encode_brightness(level).unwrap().as_bytes(),
                &[0x56, 0x01, level as u8, 0xAA]
            );
        }
    }

    #[test]
    fn test_brightness_out_of_range_is_rejected() {
        assert!(matches!(encode_brightness(101), Err(LampError::InvalidArgument(_))));
        assert!(matches!(encode_brightness(-1), Err(LampError::InvalidArgument(_))));
        assert!(matches!(
            LampCommand::Brightness(200).to_frame(),
            Err(LampError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_from_packed() {
        assert_eq!(Rgb::from_packed(0xFFFF6B6B), Rgb::new(255, 107, 107));
        assert_eq!(Rgb::from_packed(0x00FFCC99), Rgb::new(255, 204, 153));
        assert_eq!(Rgb::from_packed(0xFFFFFFFF), Rgb::WHITE);
    }

    #[test]
    fn test_command_channel() {
        assert_eq!(LampCommand::Color(Rgb::WHITE).channel(), Channel::Color);
        assert_eq!(LampCommand::Brightness(3).channel(), Channel::Brightness);
    }
}
