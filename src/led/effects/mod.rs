use std::sync::atomic::{AtomicU8, Ordering};

use opccomm::Pixel;

use crate::pixel::PixelBuffer;

pub mod mixer;
pub mod pulse;
pub mod spark;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnimationMode {
  Idle,
  SolidFill,
  Spark,
  ColorMixSweep,
  Pulse,
}

impl AnimationMode {
  /// Modes that run a timed loop rather than a single frame.
  pub fn is_loop(self) -> bool {
    matches!(
      self,
      AnimationMode::Spark | AnimationMode::ColorMixSweep | AnimationMode::Pulse
    )
  }

  fn to_u8(self) -> u8 {
    match self {
      AnimationMode::Idle => 0,
      AnimationMode::SolidFill => 1,
      AnimationMode::Spark => 2,
      AnimationMode::ColorMixSweep => 3,
      AnimationMode::Pulse => 4,
    }
  }

  fn from_u8(value: u8) -> Self {
    match value {
      1 => AnimationMode::SolidFill,
      2 => AnimationMode::Spark,
      3 => AnimationMode::ColorMixSweep,
      4 => AnimationMode::Pulse,
      _ => AnimationMode::Idle,
    }
  }
}

/// The active mode, published by the LED manager for readers on other tasks.
#[derive(Debug)]
pub struct ModeCell(AtomicU8);

impl ModeCell {
  pub fn new() -> Self {
    Self(AtomicU8::new(AnimationMode::Idle.to_u8()))
  }

  pub fn get(&self) -> AnimationMode {
    AnimationMode::from_u8(self.0.load(Ordering::Acquire))
  }

  pub(crate) fn set(&self, mode: AnimationMode) {
    let previous = AnimationMode::from_u8(self.0.swap(mode.to_u8(), Ordering::AcqRel));
    if previous != mode {
      tracing::debug!(?previous, ?mode, "animation mode changed");
    }
  }
}

impl Default for ModeCell {
  fn default() -> Self {
    Self::new()
  }
}

pub fn solid_fill(buffer: &mut PixelBuffer, color: Pixel) {
  buffer.fill(color);
}

/// White point for a 0-100 warmth slider: yellow at 0, pure white at 100.
pub fn temperature_color(percent: u8) -> Pixel {
  let blue = u16::from(percent.min(100)) * 255 / 100;
  [255, 255, blue as u8]
}
