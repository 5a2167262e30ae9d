//! Uniform hue sweep: six phases, each ramping one channel while the other two stay at an endpoint.

use opccomm::Pixel;

pub const STEPS_PER_PHASE: usize = 255;
pub const PHASE_COUNT: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Phase {
  pub channel: usize,
  pub descending: bool,
  pub held: Pixel,
}

impl Phase {
  const fn new(channel: usize, descending: bool, held: Pixel) -> Self {
    Self {
      channel,
      descending,
      held,
    }
  }

  pub fn color(&self, step: usize) -> Pixel {
    let step = step.min(STEPS_PER_PHASE - 1) as u8;
    let mut color = self.held;
    color[self.channel] = if self.descending { 255 - step } else { step };
    color
  }

  /// The color this phase ramps towards.
  pub fn target(&self) -> Pixel {
    let mut color = self.held;
    color[self.channel] = if self.descending { 0 } else { 255 };
    color
  }
}

pub const PHASES: [Phase; PHASE_COUNT] = [
  Phase::new(1, true, [255, 0, 0]),
  Phase::new(2, false, [255, 0, 0]),
  Phase::new(0, true, [0, 0, 255]),
  Phase::new(1, false, [0, 0, 255]),
  Phase::new(2, true, [0, 255, 0]),
  Phase::new(0, false, [0, 255, 0]),
];

#[derive(Debug, Clone, Default)]
pub struct ColorMix {
  phase: usize,
  step: usize,
}

impl ColorMix {
  pub fn phase(&self) -> usize {
    self.phase
  }

  pub fn step(&self) -> usize {
    self.step
  }

  pub fn next_color(&mut self) -> Pixel {
    let color = PHASES[self.phase].color(self.step);

    self.step += 1;
    if self.step == STEPS_PER_PHASE {
      self.step = 0;
      self.phase = (self.phase + 1) % PHASE_COUNT;
    }

    color
  }
}
