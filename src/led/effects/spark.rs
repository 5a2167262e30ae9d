//! A comet of full color with a black tail cut, moving one pixel per frame.

use std::time::Duration;

use opccomm::{BLACK, Pixel};

use crate::pixel::PixelBuffer;

const FASTEST_INTERVAL_MS: u64 = 5;

/// Frame interval in milliseconds for a 0-100 speed; higher speed means a shorter interval.
pub fn convert_speed(speed: u8) -> u64 {
  if speed >= 100 {
    FASTEST_INTERVAL_MS
  } else {
    100 - u64::from(speed)
  }
}

pub fn frame_interval(speed: u8) -> Duration {
  Duration::from_millis(convert_speed(speed))
}

/// Number of lit pixels for a strip of `led_count` and a 0-100 span; never less than one.
pub fn trail_len(led_count: usize, span: u8) -> usize {
  (led_count * usize::from(span) / 100).max(1)
}

/// `len` pixels of full color followed by one black pixel.
pub fn build_trail(color: Pixel, len: usize) -> Vec<Pixel> {
  let mut trail = vec![color; len + 1];
  trail[len] = BLACK;
  trail
}

#[derive(Debug, Clone)]
pub struct Spark {
  trail: Vec<Pixel>,
  head: usize,
}

impl Spark {
  pub fn new(color: Pixel, led_count: usize, span: u8) -> Self {
    Self {
      trail: build_trail(color, trail_len(led_count, span)),
      head: 0,
    }
  }

  pub fn trail(&self) -> &[Pixel] {
    &self.trail
  }

  /// Position the next frame will be drawn at.
  pub fn head(&self) -> usize {
    self.head
  }

  /// Replaces the trail in place; the head keeps its position.
  pub fn rebuild(&mut self, color: Pixel, led_count: usize, span: u8) {
    self.trail = build_trail(color, trail_len(led_count, span));
  }

  /// Draws the trail at the head and advances it by one pixel.
  pub fn draw(&mut self, buffer: &mut PixelBuffer) {
    let len = buffer.len();
    if len == 0 {
      return;
    }

    let head = self.head % len;
    self.paint(buffer, head);
    self.head = (head + 1) % len;
  }

  /// Paints the trail again where the last frame was drawn, without moving.
  pub fn repaint(&self, buffer: &mut PixelBuffer) {
    let len = buffer.len();
    if len == 0 {
      return;
    }

    let last = (self.head % len + len - 1) % len;
    self.paint(buffer, last);
  }

  fn paint(&self, buffer: &mut PixelBuffer, head: usize) {
    let len = buffer.len();
    for (offset, color) in self.trail.iter().enumerate() {
      buffer.set(behind(head, offset, len), *color);
    }
  }
}

fn behind(position: usize, steps: usize, len: usize) -> usize {
  (position + len - steps % len) % len
}
