use std::{
  sync::atomic::{AtomicBool, AtomicU8, AtomicU32, AtomicUsize, Ordering},
  time::Duration,
};

use opccomm::Pixel;

use crate::config::{AnimationDefaults, ConfigError, validate_led_count};

/// A change marker shared between parameter writers and the render loop.
///
/// Any writer may mark it; only the loop that applies the change takes it.
#[derive(Debug, Default)]
pub struct DirtyFlag(AtomicBool);

impl DirtyFlag {
  pub fn mark(&self) {
    self.0.store(true, Ordering::Release);
  }

  /// Clears the flag, returning whether it was set.
  pub fn take(&self) -> bool {
    self.0.swap(false, Ordering::AcqRel)
  }

  pub fn is_set(&self) -> bool {
    self.0.load(Ordering::Acquire)
  }
}

/// Live animation parameters.
///
/// Every field is independent: writers store the value before marking the matching flag, the loop takes the flag
/// before reading the value.
#[derive(Debug)]
pub struct AnimationParameters {
  color: AtomicU32,
  brightness: AtomicU8,
  speed: AtomicU8,
  span: AtomicU8,
  mixer_delay_ms: AtomicU32,
  pulse_delay_ms: AtomicU32,
  pulse_pause_ms: AtomicU32,
  led_count: AtomicUsize,

  brightness_changed: DirtyFlag,
  span_changed: DirtyFlag,
  color_changed: DirtyFlag,
}

impl AnimationParameters {
  pub fn new(led_count: usize, defaults: &AnimationDefaults) -> Result<Self, ConfigError> {
    validate_led_count(led_count)?;

    Ok(Self {
      color: AtomicU32::new(pack(defaults.color)),
      brightness: AtomicU8::new(defaults.brightness.min(100)),
      speed: AtomicU8::new(defaults.speed.min(100)),
      span: AtomicU8::new(defaults.span.min(100)),
      mixer_delay_ms: AtomicU32::new(defaults.mixer_delay_ms),
      pulse_delay_ms: AtomicU32::new(defaults.pulse_delay_ms),
      pulse_pause_ms: AtomicU32::new(defaults.pulse_pause_ms),
      led_count: AtomicUsize::new(led_count),

      brightness_changed: DirtyFlag::default(),
      span_changed: DirtyFlag::default(),
      color_changed: DirtyFlag::default(),
    })
  }

  pub fn color(&self) -> Pixel {
    unpack(self.color.load(Ordering::Acquire))
  }

  pub fn set_color(&self, color: Pixel) {
    self.color.store(pack(color), Ordering::Release);
    self.color_changed.mark();
  }

  pub fn brightness(&self) -> u8 {
    self.brightness.load(Ordering::Acquire)
  }

  pub fn set_brightness(&self, percent: u8) {
    self.brightness.store(percent.min(100), Ordering::Release);
    self.brightness_changed.mark();
  }

  pub fn speed(&self) -> u8 {
    self.speed.load(Ordering::Acquire)
  }

  pub fn set_speed(&self, speed: u8) {
    self.speed.store(speed.min(100), Ordering::Release);
  }

  pub fn span(&self) -> u8 {
    self.span.load(Ordering::Acquire)
  }

  pub fn set_span(&self, span: u8) {
    self.span.store(span.min(100), Ordering::Release);
    self.span_changed.mark();
  }

  pub fn mixer_delay(&self) -> Duration {
    Duration::from_millis(self.mixer_delay_ms.load(Ordering::Acquire).into())
  }

  pub fn set_mixer_delay(&self, ms: u32) {
    self.mixer_delay_ms.store(ms, Ordering::Release);
  }

  pub fn pulse_delay(&self) -> Duration {
    Duration::from_millis(self.pulse_delay_ms.load(Ordering::Acquire).into())
  }

  pub fn set_pulse_delay(&self, ms: u32) {
    self.pulse_delay_ms.store(ms, Ordering::Release);
  }

  pub fn pulse_pause(&self) -> Duration {
    Duration::from_millis(self.pulse_pause_ms.load(Ordering::Acquire).into())
  }

  pub fn set_pulse_pause(&self, ms: u32) {
    self.pulse_pause_ms.store(ms, Ordering::Release);
  }

  pub fn led_count(&self) -> usize {
    self.led_count.load(Ordering::Acquire)
  }

  /// Rejects counts outside 1..=512 and keeps the previous value.
  pub fn set_led_count(&self, led_count: usize) -> Result<(), ConfigError> {
    validate_led_count(led_count)?;
    self.led_count.store(led_count, Ordering::Release);
    Ok(())
  }

  pub fn brightness_changed(&self) -> &DirtyFlag {
    &self.brightness_changed
  }

  pub fn span_changed(&self) -> &DirtyFlag {
    &self.span_changed
  }

  pub fn color_changed(&self) -> &DirtyFlag {
    &self.color_changed
  }

  /// Drops pending changes; used when a loop starts from the current values anyway.
  pub(crate) fn settle(&self) {
    self.brightness_changed.take();
    self.span_changed.take();
    self.color_changed.take();
  }
}

fn pack(color: Pixel) -> u32 {
  u32::from_be_bytes([0, color[0], color[1], color[2]])
}

fn unpack(packed: u32) -> Pixel {
  let [_, r, g, b] = packed.to_be_bytes();
  [r, g, b]
}
