use std::sync::Arc;

use opccomm::Pixel;
use tokio::{
  sync::{mpsc, oneshot},
  task::{JoinError, JoinHandle},
};
use tokio_util::sync::CancellationToken;

pub type CommandTx = mpsc::UnboundedSender<Command>;
pub type CommandRx = mpsc::UnboundedReceiver<Command>;
pub type Reply = oneshot::Sender<Result<(), LedError>>;

pub mod animation;
pub mod effects;

use self::{
  animation::{Animation, LoopExit, Outcome, Strip},
  effects::{AnimationMode, ModeCell, solid_fill},
};
use crate::{
  params::AnimationParameters,
  pixel::Snapshot,
  supervisor::{ConnectionState, ConnectionSupervisor},
  transport::{Connector, LinkEvent, LinkEventKind, LinkEventRx, LinkEventTx, LinkEvents, LinkId, Transport, TransportError},
};

#[derive(Debug)]
pub enum Command {
  Connect(Reply),
  /// Tears down whatever is open and connects again; the only way out of `Failed`.
  Reconnect(Reply),
  Disconnect(Reply),
  Start(AnimationMode, Reply),
  Stop(Reply),
  Refresh(Refresh),
  /// The led count parameter changed.
  Resize,
  Snapshot(oneshot::Sender<Option<Snapshot>>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Content {
  Clear,
  Color(Pixel),
  Temperature(Pixel),
}

/// A single-shot frame request. Bursts are merged before anything is sent.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Refresh {
  pub content: Option<Content>,
  /// Repaint a solid fill with the current color parameter.
  pub recolor: bool,
  pub brightness: bool,
}

impl Refresh {
  pub fn content(content: Content) -> Self {
    Self {
      content: Some(content),
      ..Self::default()
    }
  }

  pub fn recolor() -> Self {
    Self {
      recolor: true,
      ..Self::default()
    }
  }

  pub fn brightness() -> Self {
    Self {
      brightness: true,
      ..Self::default()
    }
  }

  /// Folds a later request into this one.
  fn merge(&mut self, later: Refresh) {
    if later.content.is_some() {
      // new content replaces an earlier recolor of the old content
      self.content = later.content;
      self.recolor = later.recolor;
    } else {
      self.recolor |= later.recolor;
    }
    self.brightness |= later.brightness;
  }
}

struct Running<T> {
  handle: JoinHandle<LoopExit<T>>,
  cancel: CancellationToken,
  mode: AnimationMode,
  link: LinkId,
}

pub struct LedManager<C: Connector> {
  rx: CommandRx,
  deferred: Option<Command>,
  link_tx: LinkEventTx,
  link_rx: LinkEventRx,

  cancel: CancellationToken,
  connector: C,
  next_link: LinkId,
  link: Option<LinkId>,
  transport: Option<C::Transport>,
  strip: Option<Strip>,
  running: Option<Running<C::Transport>>,
  gamma: f32,

  params: Arc<AnimationParameters>,
  supervisor: Arc<ConnectionSupervisor>,
  mode: Arc<ModeCell>,
}

impl<C: Connector> LedManager<C> {
  pub fn init(
    rx: CommandRx,
    connector: C,
    gamma: f32,
    params: Arc<AnimationParameters>,
    supervisor: Arc<ConnectionSupervisor>,
    mode: Arc<ModeCell>,
    cancel: CancellationToken,
  ) -> Self {
    let (link_tx, link_rx) = mpsc::unbounded_channel();

    let mut strip = Strip::new(params.led_count(), gamma);
    strip.correction.set_brightness(params.brightness());

    Self {
      rx,
      deferred: None,
      link_tx,
      link_rx,
      cancel,
      connector,
      next_link: LinkId::first(),
      link: None,
      transport: None,
      strip: Some(strip),
      running: None,
      gamma,
      params,
      supervisor,
      mode,
    }
  }

  async fn run(mut self) {
    tracing::info!("starting LED manager run loop");

    loop {
      if let Some(command) = self.deferred.take() {
        self.handle_command(command).await;
        continue;
      }

      tokio::select! {
        cmd = self.rx.recv() => {
          match cmd {
            Some(command) => self.handle_command(command).await,
            None => {
              tracing::debug!("LED command channel closed; exiting run loop");
              break;
            }
          }
        }
        Some(event) = self.link_rx.recv() => self.handle_link_event(event).await,
        joined = wait_for_exit(&mut self.running) => {
          if let Some(running) = self.running.take() {
            tracing::debug!(mode = ?running.mode, "animation loop ended on its own");
            self.absorb(running.link, joined).await;
            self.mode.set(AnimationMode::Idle);
          }
        }
        _ = self.cancel.cancelled() => {
          tracing::debug!("LED manager received cancellation signal; exiting run loop");
          break;
        }
      }
    }

    tracing::info!("LED manager run loop exited, closing connection...");
    self.stop_running().await;
    self.mode.set(AnimationMode::Idle);
    self.close_link().await;

    tracing::info!("LED manager shut down");
  }

  pub fn spawn(self) -> JoinHandle<()> {
    tokio::spawn(async move { self.run().await })
  }

  async fn handle_command(&mut self, command: Command) {
    tracing::trace!(?command, "LED manager received command");

    match command {
      Command::Connect(reply) => {
        let result = self.connect().await;
        respond(reply, result);
      }
      Command::Reconnect(reply) => {
        let result = self.reconnect().await;
        respond(reply, result);
      }
      Command::Disconnect(reply) => {
        self.stop_loop().await;
        self.close_link().await;
        respond(reply, Ok(()));
      }
      Command::Start(mode, reply) => {
        let result = self.start(mode).await;
        respond(reply, result);
      }
      Command::Stop(reply) => {
        let result = self.stop().await;
        respond(reply, result);
      }
      Command::Refresh(refresh) => {
        if let Err(err) = self.refresh(refresh).await {
          tracing::error!("failed to refresh LED strip: {}", err);
        }
      }
      Command::Resize => {
        if let Err(err) = self.resize().await {
          tracing::error!("failed to rebuild LED strip: {}", err);
        }
      }
      Command::Snapshot(reply) => {
        let snapshot = self.strip.as_ref().map(|strip| strip.buffer.snapshot());
        if reply.send(snapshot).is_err() {
          tracing::debug!("snapshot requester went away");
        }
      }
    }
  }

  async fn connect(&mut self) -> Result<(), LedError> {
    if self.link.is_some() {
      tracing::debug!("already connected");
      return Ok(());
    }

    if self.supervisor.state() == ConnectionState::Failed {
      return Err(LedError::Failed);
    }

    self.open().await?;
    self.resend_fill().await
  }

  async fn reconnect(&mut self) -> Result<(), LedError> {
    let replay = self.stop_running().await;
    self.reopen().await?;

    match replay {
      Some(mode) => self.launch(mode),
      None if self.mode.get().is_loop() => {
        self.mode.set(AnimationMode::Idle);
        Ok(())
      }
      None => self.resend_fill().await,
    }
  }

  /// Closes whatever is open and connects again. A loop mode left published by a stopped loop drops to `Idle` when
  /// the new connection cannot be made.
  async fn reopen(&mut self) -> Result<(), LedError> {
    self.close_link().await;

    if let Err(err) = self.open().await {
      if self.mode.get().is_loop() {
        self.mode.set(AnimationMode::Idle);
      }
      return Err(err);
    }

    Ok(())
  }

  /// Puts a solid fill painted while disconnected onto the new link.
  async fn resend_fill(&mut self) -> Result<(), LedError> {
    let painted = self.strip.as_ref().is_some_and(|strip| !strip.buffer.is_black());
    if self.mode.get() != AnimationMode::SolidFill || !painted {
      return Ok(());
    }

    tracing::debug!("sending solid fill painted while disconnected");
    self.send_frame().await
  }

  async fn open(&mut self) -> Result<(), LedError> {
    self.supervisor.connecting();

    let link = self.next_link;
    self.next_link = link.next();

    match self.connector.connect(LinkEvents::new(link, self.link_tx.clone())).await {
      Ok(transport) => {
        self.transport = Some(transport);
        self.link = Some(link);
        self.supervisor.connected();
        Ok(())
      }
      Err(err) => {
        self.supervisor.fail(&err);
        Err(err.into())
      }
    }
  }

  /// Explicit teardown; listeners are not told about it.
  async fn close_link(&mut self) {
    self.link = None;
    if let Some(transport) = self.transport.take() {
      transport.close().await;
    }
    if self.supervisor.state() != ConnectionState::Failed {
      self.supervisor.disconnected();
    }
  }

  async fn start(&mut self, mode: AnimationMode) -> Result<(), LedError> {
    if self.running.as_ref().is_some_and(|running| running.mode == mode) {
      tracing::debug!(?mode, "mode already running");
      return Ok(());
    }

    match mode {
      AnimationMode::Idle => self.refresh(Refresh::content(Content::Clear)).await,
      AnimationMode::SolidFill => {
        self
          .refresh(Refresh::content(Content::Color(self.params.color())))
          .await
      }
      mode => {
        self.stop_loop().await;
        self.launch(mode)
      }
    }
  }

  async fn stop(&mut self) -> Result<(), LedError> {
    let stopped = self.stop_loop().await;

    if stopped == Some(AnimationMode::Pulse) {
      // the breath leaves the correction wherever it was cancelled
      let brightness = self.params.brightness();
      self.params.brightness_changed().take();
      self.strip_mut().correction.set_brightness(brightness);
      self.send_frame().await?;
    }

    Ok(())
  }

  /// Hands the transport and the strip to a new loop task.
  fn launch(&mut self, mode: AnimationMode) -> Result<(), LedError> {
    let (Some(link), Some(transport)) = (self.link, self.transport.take()) else {
      self.mode.set(AnimationMode::Idle);
      return Err(LedError::NotConnected);
    };

    let strip = self.take_strip();
    let cancel = self.cancel.child_token();
    let animation = Animation::new(transport, strip, Arc::clone(&self.params), cancel.clone());

    tracing::info!(?mode, "launching animation loop");
    self.running = Some(Running {
      handle: tokio::spawn(animation.run(mode)),
      cancel,
      mode,
      link,
    });
    self.mode.set(mode);

    Ok(())
  }

  /// Stops the loop and publishes `Idle`; returns the mode that was stopped cleanly.
  async fn stop_loop(&mut self) -> Option<AnimationMode> {
    let stopped = self.stop_running().await;
    if self.mode.get().is_loop() {
      self.mode.set(AnimationMode::Idle);
    }
    stopped
  }

  /// Asks the running loop to stop and waits for it to exit.
  ///
  /// Returns the mode that was running when the loop stopped cleanly on a link that is still open.
  async fn stop_running(&mut self) -> Option<AnimationMode> {
    let running = self.running.take()?;

    tracing::trace!(mode = ?running.mode, "stopping animation loop");
    running.cancel.cancel();
    let joined = running.handle.await;

    self.absorb(running.link, joined).await.then_some(running.mode)
  }

  /// Takes back what a finished loop held. Returns whether the transport is usable again.
  async fn absorb(&mut self, link: LinkId, joined: Result<LoopExit<C::Transport>, JoinError>) -> bool {
    let current = self.link == Some(link);

    match joined {
      Ok(LoopExit {
        transport,
        strip,
        outcome,
      }) => {
        self.strip = Some(strip);

        match outcome {
          Outcome::Stopped if current => {
            self.transport = Some(transport);
            true
          }
          Outcome::Stopped => {
            tracing::debug!("loop stopped after its link went away; closing transport");
            transport.close().await;
            false
          }
          Outcome::Failed(err) => {
            if current {
              self.link = None;
              self.supervisor.fail(&err);
            }
            false
          }
        }
      }
      Err(err) => {
        tracing::error!("animation task ended abnormally: {}", err);
        self.strip = Some(Strip::new(self.params.led_count(), self.gamma));
        if current {
          self.link = None;
          self.supervisor.fail(&err);
        }
        false
      }
    }
  }

  async fn refresh(&mut self, mut refresh: Refresh) -> Result<(), LedError> {
    while let Ok(next) = self.rx.try_recv() {
      match next {
        Command::Refresh(later) => refresh.merge(later),
        other => {
          self.deferred = Some(other);
          break;
        }
      }
    }

    if let Some(content) = refresh.content {
      self.stop_loop().await;

      let strip = self.strip_mut();
      match content {
        Content::Clear => {
          strip.buffer.clear();
          self.mode.set(AnimationMode::Idle);
        }
        Content::Color(color) | Content::Temperature(color) => {
          solid_fill(&mut strip.buffer, color);
          self.mode.set(AnimationMode::SolidFill);
        }
      }
    } else if self.running.is_some() {
      // the loop picks the dirty flags up on its next frame
      return Ok(());
    }

    if refresh.recolor && self.mode.get() == AnimationMode::SolidFill {
      self.params.color_changed().take();
      let color = self.params.color();
      solid_fill(&mut self.strip_mut().buffer, color);
    }

    self.params.brightness_changed().take();
    let brightness = self.params.brightness();
    self.strip_mut().correction.set_brightness(brightness);

    if self.transport.is_none() {
      tracing::debug!("not connected; frame goes out on the next connect");
      return Ok(());
    }

    self.send_frame().await
  }

  async fn resize(&mut self) -> Result<(), LedError> {
    let led_count = self.params.led_count();
    let replay = self.stop_running().await;

    tracing::info!(led_count, "rebuilding LED strip");
    let mut strip = Strip::new(led_count, self.gamma);
    strip.correction.set_brightness(self.params.brightness());
    self.strip = Some(strip);

    if self.link.is_none() {
      if self.mode.get().is_loop() {
        self.mode.set(AnimationMode::Idle);
      }
      return Ok(());
    }

    self.reopen().await?;

    match replay {
      Some(mode) => self.launch(mode),
      None if self.mode.get() == AnimationMode::SolidFill => {
        let color = self.params.color();
        solid_fill(&mut self.strip_mut().buffer, color);
        self.send_frame().await
      }
      None => {
        if self.mode.get().is_loop() {
          self.mode.set(AnimationMode::Idle);
        }
        Ok(())
      }
    }
  }

  async fn handle_link_event(&mut self, event: LinkEvent) {
    if self.link != Some(event.link) {
      tracing::trace!(?event, "ignoring event from a stale link");
      return;
    }

    self.link = None;
    match event.kind {
      LinkEventKind::Closed => {
        self.supervisor.closed_by_peer();
      }
      LinkEventKind::Failed(err) => {
        self.supervisor.fail(&err);
      }
    }

    if let Some(running) = &self.running {
      running.cancel.cancel();
    } else if let Some(transport) = self.transport.take() {
      transport.close().await;
    }
  }

  /// Sends the idle strip as a single frame.
  async fn send_frame(&mut self) -> Result<(), LedError> {
    self.strip_mut();

    let result = match (self.transport.as_mut(), self.strip.as_ref()) {
      (Some(transport), Some(strip)) => transport.send(&strip.buffer.snapshot(), &strip.correction).await,
      _ => return Err(LedError::NotConnected),
    };

    if let Err(err) = result {
      self.transport = None;
      self.link = None;
      self.supervisor.fail(&err);
      self.mode.set(AnimationMode::Idle);
      return Err(err.into());
    }

    Ok(())
  }

  fn take_strip(&mut self) -> Strip {
    let (led_count, gamma) = (self.params.led_count(), self.gamma);
    self.strip.take().unwrap_or_else(|| Strip::new(led_count, gamma))
  }

  fn strip_mut(&mut self) -> &mut Strip {
    let (led_count, gamma) = (self.params.led_count(), self.gamma);
    self.strip.get_or_insert_with(|| Strip::new(led_count, gamma))
  }
}

async fn wait_for_exit<T>(running: &mut Option<Running<T>>) -> Result<LoopExit<T>, JoinError> {
  match running {
    Some(running) => (&mut running.handle).await,
    None => std::future::pending().await,
  }
}

fn respond(reply: Reply, result: Result<(), LedError>) {
  if let Err(err) = &result {
    tracing::error!("LED command failed: {}", err);
  }

  if reply.send(result).is_err() {
    tracing::debug!("LED command requester went away before the reply");
  }
}

#[derive(thiserror::Error, Debug)]
pub enum LedError {
  #[error("transport error: {0}")]
  Transport(#[from] TransportError),
  #[error("not connected to an OPC controller")]
  NotConnected,
  #[error("connection failed; reconnect first")]
  Failed,
}
