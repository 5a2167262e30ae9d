//! The timed render loops. Each loop owns the transport and the strip while it runs and hands both back on exit.

use std::{sync::Arc, time::Duration};

use tokio::time;
use tokio_util::sync::CancellationToken;

use super::effects::{
  AnimationMode,
  mixer::ColorMix,
  pulse::{self, Wait},
  solid_fill,
  spark::{self, Spark},
};
use crate::{
  correction::ColorCorrection,
  params::AnimationParameters,
  pixel::PixelBuffer,
  transport::{Transport, TransportError},
};

/// The buffer and the correction it is sent with. Exactly one task holds it at a time.
#[derive(Debug, Clone)]
pub struct Strip {
  pub buffer: PixelBuffer,
  pub correction: ColorCorrection,
}

impl Strip {
  pub fn new(led_count: usize, gamma: f32) -> Self {
    Self {
      buffer: PixelBuffer::new(led_count),
      correction: ColorCorrection::new(gamma),
    }
  }
}

#[derive(Debug)]
pub enum Outcome {
  /// Cancelled between frames.
  Stopped,
  Failed(TransportError),
}

pub struct LoopExit<T> {
  pub transport: T,
  pub strip: Strip,
  pub outcome: Outcome,
}

pub struct Animation<T> {
  transport: T,
  strip: Strip,
  params: Arc<AnimationParameters>,
  cancel: CancellationToken,
}

impl<T: Transport> Animation<T> {
  pub fn new(transport: T, strip: Strip, params: Arc<AnimationParameters>, cancel: CancellationToken) -> Self {
    Self {
      transport,
      strip,
      params,
      cancel,
    }
  }

  #[tracing::instrument(level = "debug", skip(self))]
  pub async fn run(mut self, mode: AnimationMode) -> LoopExit<T> {
    tracing::debug!(leds = self.strip.buffer.len(), "animation loop started");

    let result = match mode {
      AnimationMode::Spark => self.spark().await,
      AnimationMode::ColorMixSweep => self.mixer().await,
      AnimationMode::Pulse => self.pulse().await,
      AnimationMode::Idle | AnimationMode::SolidFill => {
        tracing::warn!("{mode:?} is not a looping mode; nothing to run");
        Ok(())
      }
    };

    let outcome = match result {
      Ok(()) => Outcome::Stopped,
      Err(err) => {
        tracing::error!("animation loop aborted: {err}");
        Outcome::Failed(err)
      }
    };

    LoopExit {
      transport: self.transport,
      strip: self.strip,
      outcome,
    }
  }

  async fn spark(&mut self) -> Result<(), TransportError> {
    let params = Arc::clone(&self.params);
    params.settle();
    self.strip.correction.set_brightness(params.brightness());

    let led_count = self.strip.buffer.len();
    let mut spark = Spark::new(params.color(), led_count, params.span());

    while !self.cancel.is_cancelled() {
      spark.draw(&mut self.strip.buffer);

      if params.brightness_changed().take() {
        self.strip.correction.set_brightness(params.brightness());
      }

      let span_changed = params.span_changed().take();
      let color_changed = params.color_changed().take();
      if span_changed {
        // a shorter trail would leave stale pixels behind
        self.strip.buffer.clear();
      }
      if span_changed || color_changed {
        spark.rebuild(params.color(), led_count, params.span());
        spark.repaint(&mut self.strip.buffer);
      }

      self.send().await?;

      if !pause(&self.cancel, spark::frame_interval(params.speed())).await {
        break;
      }
    }

    Ok(())
  }

  async fn mixer(&mut self) -> Result<(), TransportError> {
    let params = Arc::clone(&self.params);
    params.settle();
    self.strip.correction.set_brightness(params.brightness());

    let mut mix = ColorMix::default();

    while !self.cancel.is_cancelled() {
      solid_fill(&mut self.strip.buffer, mix.next_color());

      if params.brightness_changed().take() {
        self.strip.correction.set_brightness(params.brightness());
      }

      self.send().await?;

      if !pause(&self.cancel, params.mixer_delay()).await {
        break;
      }
    }

    Ok(())
  }

  async fn pulse(&mut self) -> Result<(), TransportError> {
    let params = Arc::clone(&self.params);
    params.settle();

    let mut color = params.color();
    solid_fill(&mut self.strip.buffer, color);
    self.strip.correction.set_brightness(0);
    self.send().await?;

    while !self.cancel.is_cancelled() {
      for step in pulse::breath() {
        if params.color_changed().take() {
          color = params.color();
          solid_fill(&mut self.strip.buffer, color);
        }

        self.strip.correction.set_brightness(step.brightness);
        self.send().await?;

        let wait = match step.wait {
          Wait::Step => params.pulse_delay(),
          Wait::Cycle => params.pulse_pause(),
          Wait::None => continue,
        };

        if !pause(&self.cancel, wait).await {
          return Ok(());
        }
      }
    }

    Ok(())
  }

  async fn send(&mut self) -> Result<(), TransportError> {
    let frame = self.strip.buffer.snapshot();
    self.transport.send(&frame, &self.strip.correction).await
  }
}

/// Sleeps between frames; returns `false` once the loop has been asked to stop.
///
/// Takes the token rather than the animation: transports are `Send` but not necessarily `Sync`.
async fn pause(cancel: &CancellationToken, duration: Duration) -> bool {
  if duration.is_zero() {
    tokio::task::yield_now().await;
    return !cancel.is_cancelled();
  }

  tokio::select! {
    _ = cancel.cancelled() => false,
    _ = time::sleep(duration) => true,
  }
}
