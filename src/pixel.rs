use std::{ops::Deref, sync::Arc};

use opccomm::{BLACK, Pixel};

pub const MIN_LEDS: usize = 1;
pub const MAX_LEDS: usize = 512;

/// The in-memory image of one physical strip.
///
/// The length is fixed at construction; a different led count needs a new buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
  pixels: Box<[Pixel]>,
}

impl PixelBuffer {
  pub fn new(len: usize) -> Self {
    Self {
      pixels: vec![BLACK; len].into_boxed_slice(),
    }
  }

  pub fn len(&self) -> usize {
    self.pixels.len()
  }

  pub fn is_empty(&self) -> bool {
    self.pixels.is_empty()
  }

  /// Out-of-range writes are ignored.
  pub fn set(&mut self, index: usize, color: Pixel) {
    if let Some(pixel) = self.pixels.get_mut(index) {
      *pixel = color;
    }
  }

  pub fn get(&self, index: usize) -> Option<Pixel> {
    self.pixels.get(index).copied()
  }

  pub fn fill(&mut self, color: Pixel) {
    self.pixels.fill(color);
  }

  pub fn clear(&mut self) {
    self.fill(BLACK);
  }

  pub fn is_black(&self) -> bool {
    self.pixels.iter().all(|pixel| *pixel == BLACK)
  }

  pub fn snapshot(&self) -> Snapshot {
    Snapshot(Arc::from(&self.pixels[..]))
  }
}

/// Immutable copy of a buffer, handed to the transport once per frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot(Arc<[Pixel]>);

impl Deref for Snapshot {
  type Target = [Pixel];

  fn deref(&self) -> &Self::Target {
    &self.0
  }
}

impl AsRef<[Pixel]> for Snapshot {
  fn as_ref(&self) -> &[Pixel] {
    &self.0
  }
}
