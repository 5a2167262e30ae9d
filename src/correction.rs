use opccomm::CorrectionBody;

pub const DEFAULT_GAMMA: f32 = 2.5;

/// Gamma and per-channel scale applied by the controller at send time.
///
/// Brightness lives here rather than in the pixel buffer, so changing it never touches the rendered colors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorCorrection {
  gamma: f32,
  red: f32,
  green: f32,
  blue: f32,
}

impl ColorCorrection {
  pub fn new(gamma: f32) -> Self {
    Self {
      gamma,
      red: 1.0,
      green: 1.0,
      blue: 1.0,
    }
  }

  /// Uniform scale for all three channels from a 0-100 percentage.
  pub fn brightness(gamma: f32, percent: u8) -> Self {
    let scale = brightness_scale(percent);
    Self {
      gamma,
      red: scale,
      green: scale,
      blue: scale,
    }
  }

  pub fn apply(&mut self, gamma: f32, red: f32, green: f32, blue: f32) {
    self.gamma = gamma;
    self.red = red.clamp(0.0, 1.0);
    self.green = green.clamp(0.0, 1.0);
    self.blue = blue.clamp(0.0, 1.0);
  }

  pub fn set_brightness(&mut self, percent: u8) {
    let scale = brightness_scale(percent);
    self.apply(self.gamma, scale, scale, scale);
  }

  pub fn gamma(&self) -> f32 {
    self.gamma
  }

  pub fn scales(&self) -> [f32; 3] {
    [self.red, self.green, self.blue]
  }

  pub fn body(&self) -> CorrectionBody {
    CorrectionBody {
      gamma: self.gamma,
      whitepoint: self.scales(),
    }
  }
}

impl Default for ColorCorrection {
  fn default() -> Self {
    Self::new(DEFAULT_GAMMA)
  }
}

fn brightness_scale(percent: u8) -> f32 {
  f32::from(percent.min(100)) / 100.0
}
