use std::sync::Arc;

use opccomm::Pixel;
use tokio::{sync::oneshot, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::{
  config::{Config, ConfigError},
  led::{
    Command, CommandTx, Content, LedError, LedManager, Refresh,
    effects::{AnimationMode, ModeCell, temperature_color},
  },
  params::AnimationParameters,
  pixel::Snapshot,
  supervisor::{ConnectionState, ConnectionSupervisor, Listener, ListenerId},
  transport::Connector,
};

/// Handle to a running LED manager.
///
/// Cheap to clone. Parameter setters write straight into the shared parameters and only message the manager when a
/// frame has to be produced outside of a running loop.
#[derive(Clone)]
pub struct Engine {
  tx: CommandTx,
  params: Arc<AnimationParameters>,
  supervisor: Arc<ConnectionSupervisor>,
  mode: Arc<ModeCell>,
  cancel: CancellationToken,
}

impl Engine {
  pub fn spawn<C: Connector>(
    config: &Config,
    connector: C,
    cancel: CancellationToken,
  ) -> Result<(Self, JoinHandle<()>), ConfigError> {
    config.validate()?;

    let params = Arc::new(AnimationParameters::new(config.led_count, &config.animation)?);
    let supervisor = Arc::new(ConnectionSupervisor::new());
    let mode = Arc::new(ModeCell::new());
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

    let manager = LedManager::init(
      rx,
      connector,
      config.gamma,
      Arc::clone(&params),
      Arc::clone(&supervisor),
      Arc::clone(&mode),
      cancel.child_token(),
    );
    let handle = manager.spawn();

    Ok((
      Self {
        tx,
        params,
        supervisor,
        mode,
        cancel,
      },
      handle,
    ))
  }

  pub async fn connect(&self) -> Result<(), EngineError> {
    self.request(Command::Connect).await
  }

  pub async fn reconnect(&self) -> Result<(), EngineError> {
    self.request(Command::Reconnect).await
  }

  pub async fn disconnect(&self) -> Result<(), EngineError> {
    self.request(Command::Disconnect).await
  }

  pub fn state(&self) -> ConnectionState {
    self.supervisor.state()
  }

  pub fn mode(&self) -> AnimationMode {
    self.mode.get()
  }

  pub fn params(&self) -> &AnimationParameters {
    &self.params
  }

  /// Stores `color` and paints the whole strip with it once.
  pub fn fill(&self, color: Pixel) {
    self.params.set_color(color);
    self.refresh(Refresh::content(Content::Color(color)));
  }

  pub fn clear(&self) {
    self.refresh(Refresh::content(Content::Clear));
  }

  /// Paints a white point without changing the stored color.
  pub fn set_temperature(&self, percent: u8) {
    self.refresh(Refresh::content(Content::Temperature(temperature_color(percent))));
  }

  pub async fn spark(&self, color: Pixel) -> Result<(), EngineError> {
    self.params.set_color(color);
    self.start(AnimationMode::Spark).await
  }

  pub async fn mixer(&self) -> Result<(), EngineError> {
    self.start(AnimationMode::ColorMixSweep).await
  }

  pub async fn pulse(&self, color: Pixel) -> Result<(), EngineError> {
    self.params.set_color(color);
    self.start(AnimationMode::Pulse).await
  }

  /// Switches modes; returns once the previous loop has exited and the new one is running.
  pub async fn start(&self, mode: AnimationMode) -> Result<(), EngineError> {
    self.request(|reply| Command::Start(mode, reply)).await
  }

  pub async fn stop(&self) -> Result<(), EngineError> {
    self.request(Command::Stop).await
  }

  /// Buffer contents as last rendered, or `None` while a loop holds the buffer.
  pub async fn snapshot(&self) -> Result<Option<Snapshot>, EngineError> {
    let (reply, rx) = oneshot::channel();
    self.tx.send(Command::Snapshot(reply)).map_err(|_| EngineError::Shutdown)?;
    rx.await.map_err(|_| EngineError::Shutdown)
  }

  pub fn set_color(&self, color: Pixel) {
    self.params.set_color(color);
    self.refresh(Refresh::recolor());
  }

  pub fn set_brightness(&self, percent: u8) {
    self.params.set_brightness(percent);
    self.refresh(Refresh::brightness());
  }

  pub fn set_span(&self, span: u8) {
    self.params.set_span(span);
  }

  pub fn set_speed(&self, speed: u8) {
    self.params.set_speed(speed);
  }

  pub fn set_mixer_delay(&self, ms: u32) {
    self.params.set_mixer_delay(ms);
  }

  pub fn set_pulse_delay(&self, ms: u32) {
    self.params.set_pulse_delay(ms);
  }

  pub fn set_pulse_pause(&self, ms: u32) {
    self.params.set_pulse_pause(ms);
  }

  /// Rejects counts outside 1..=512; otherwise rebuilds the strip and replays the running mode.
  pub fn set_led_count(&self, led_count: usize) -> Result<(), EngineError> {
    if led_count == self.params.led_count() {
      return Ok(());
    }

    self.params.set_led_count(led_count)?;
    self.tx.send(Command::Resize).map_err(|_| EngineError::Shutdown)
  }

  pub fn add_listener(&self, listener: Arc<dyn Listener>) -> ListenerId {
    self.supervisor.add_listener(listener)
  }

  pub fn remove_listener(&self, id: ListenerId) -> bool {
    self.supervisor.remove_listener(id)
  }

  pub fn supervisor(&self) -> &ConnectionSupervisor {
    &self.supervisor
  }

  /// Stops the loop and closes the connection; await the join handle from [`Engine::spawn`] to wait for it.
  pub fn shutdown(&self) {
    tracing::info!("shutting down LED engine");
    self.cancel.cancel();
  }

  fn refresh(&self, refresh: Refresh) {
    if self.tx.send(Command::Refresh(refresh)).is_err() {
      tracing::warn!("LED manager is gone; dropping refresh");
    }
  }

  async fn request(&self, command: impl FnOnce(crate::led::Reply) -> Command) -> Result<(), EngineError> {
    let (reply, rx) = oneshot::channel();
    self.tx.send(command(reply)).map_err(|_| EngineError::Shutdown)?;
    rx.await.map_err(|_| EngineError::Shutdown)??;
    Ok(())
  }
}

#[derive(thiserror::Error, Debug)]
pub enum EngineError {
  #[error(transparent)]
  Led(#[from] LedError),
  #[error("invalid configuration: {0}")]
  Config(#[from] ConfigError),
  #[error("LED manager has shut down")]
  Shutdown,
}
