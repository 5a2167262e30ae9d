//! Breathing brightness: the strip holds one color while the correction ramps up and back down.

pub const RAMP_STEPS: u8 = 10;
pub const STEP_PERCENT: u8 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
  /// `pulse_delay` between ramp steps.
  Step,
  /// Send and continue straight away.
  None,
  /// `pulse_pause` before the next breath.
  Cycle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PulseStep {
  pub brightness: u8,
  pub wait: Wait,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ramp {
  Up,
  Down,
}

impl Ramp {
  pub fn levels(self) -> impl Iterator<Item = u8> {
    (0..RAMP_STEPS).map(move |step| match self {
      Ramp::Up => step * STEP_PERCENT,
      Ramp::Down => 100 - step * STEP_PERCENT,
    })
  }

  /// Level the ramp lands on once its steps are done.
  pub fn settle(self) -> u8 {
    match self {
      Ramp::Up => 100,
      Ramp::Down => 0,
    }
  }
}

/// One breath: ten rising steps, full brightness, ten falling steps, off.
pub fn breath() -> impl Iterator<Item = PulseStep> {
  ramp(Ramp::Up, Wait::None).chain(ramp(Ramp::Down, Wait::Cycle))
}

fn ramp(ramp: Ramp, then: Wait) -> impl Iterator<Item = PulseStep> {
  ramp
    .levels()
    .map(|brightness| PulseStep {
      brightness,
      wait: Wait::Step,
    })
    .chain(std::iter::once(PulseStep {
      brightness: ramp.settle(),
      wait: then,
    }))
}
