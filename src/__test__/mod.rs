use std::{
  io,
  sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
  },
  time::Duration,
};

use futures::StreamExt;
use opccomm::{BLACK, Pixel, codec::OpcCodec};
use tokio::{
  net::TcpListener,
  sync::mpsc,
  task::JoinHandle,
  time::{self, timeout},
};
use tokio_util::{codec::FramedRead, sync::CancellationToken};

use crate::{
  config::{Config, ConfigError},
  correction::ColorCorrection,
  discovery,
  engine::{Engine, EngineError},
  led::{LedError, effects::AnimationMode, effects::spark::Spark},
  pixel::PixelBuffer,
  supervisor::{ConnectionState, Listener},
  transport::{Connector, LinkEventKind, LinkEvents, LinkId, OpcConnector, Transport, TransportError},
};

const TIMEOUT: Duration = Duration::from_secs(2);
const QUIET: Duration = Duration::from_millis(500);

const RED: Pixel = [255, 0, 0];
const GREEN: Pixel = [0, 255, 0];
const BLUE: Pixel = [0, 0, 255];

#[derive(Debug, Clone, PartialEq)]
struct Sent {
  pixels: Vec<Pixel>,
  scales: [f32; 3],
}

struct Recorder {
  frames: mpsc::UnboundedSender<Sent>,
  attempts: AtomicUsize,
  /// 1-based send attempt that fails; 0 never fails.
  fail_on: AtomicUsize,
  connects: AtomicUsize,
  closes: AtomicUsize,
  refuse: AtomicBool,
  links: Mutex<Vec<LinkEvents>>,
}

impl Recorder {
  fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Sent>) {
    let (frames, rx) = mpsc::unbounded_channel();
    let recorder = Self {
      frames,
      attempts: AtomicUsize::new(0),
      fail_on: AtomicUsize::new(0),
      connects: AtomicUsize::new(0),
      closes: AtomicUsize::new(0),
      refuse: AtomicBool::new(false),
      links: Mutex::new(Vec::new()),
    };
    (Arc::new(recorder), rx)
  }

  fn last_link(&self) -> LinkEvents {
    self
      .links
      .lock()
      .expect("link list poisoned")
      .last()
      .cloned()
      .expect("no link was opened")
  }
}

struct MockConnector(Arc<Recorder>);

impl Connector for MockConnector {
  type Transport = MockTransport;

  async fn connect(&self, events: LinkEvents) -> Result<MockTransport, TransportError> {
    self.0.connects.fetch_add(1, Ordering::SeqCst);

    if self.0.refuse.load(Ordering::SeqCst) {
      return Err(TransportError::Connect {
        addr: "mock".to_string(),
        source: io::Error::from(io::ErrorKind::ConnectionRefused),
      });
    }

    self.0.links.lock().expect("link list poisoned").push(events);
    Ok(MockTransport(Arc::clone(&self.0)))
  }
}

struct MockTransport(Arc<Recorder>);

impl Transport for MockTransport {
  async fn send(&mut self, frame: &crate::pixel::Snapshot, correction: &ColorCorrection) -> Result<(), TransportError> {
    let attempt = self.0.attempts.fetch_add(1, Ordering::SeqCst) + 1;
    if self.0.fail_on.load(Ordering::SeqCst) == attempt {
      return Err(TransportError::Closed);
    }

    let sent = Sent {
      pixels: frame.to_vec(),
      scales: correction.scales(),
    };
    if self.0.frames.send(sent).is_err() {
      return Err(TransportError::Closed);
    }

    Ok(())
  }

  async fn close(self) {
    self.0.closes.fetch_add(1, Ordering::SeqCst);
  }
}

#[derive(Default)]
struct Counter {
  failures: AtomicUsize,
  successes: AtomicUsize,
  closed: AtomicUsize,
  devices: AtomicUsize,
}

impl Listener for Counter {
  fn on_connection_failure(&self) {
    self.failures.fetch_add(1, Ordering::SeqCst);
  }

  fn on_connection_success(&self) {
    self.successes.fetch_add(1, Ordering::SeqCst);
  }

  fn on_connection_closed(&self) {
    self.closed.fetch_add(1, Ordering::SeqCst);
  }

  fn on_connected_device_count_changed(&self, count: usize) {
    self.devices.store(count, Ordering::SeqCst);
  }
}

struct Harness {
  engine: Engine,
  handle: JoinHandle<()>,
  recorder: Arc<Recorder>,
  frames: mpsc::UnboundedReceiver<Sent>,
  listener: Arc<Counter>,
}

impl Harness {
  fn spawn(config: Config) -> Self {
    crate::monitoring::init_logger();

    let (recorder, frames) = Recorder::new();
    let (engine, handle) = Engine::spawn(&config, MockConnector(Arc::clone(&recorder)), CancellationToken::new())
      .expect("could not spawn engine");
    let listener = Arc::new(Counter::default());
    engine.add_listener(listener.clone());

    Self {
      engine,
      handle,
      recorder,
      frames,
      listener,
    }
  }

  async fn connected(led_count: usize) -> Self {
    let harness = Self::spawn(config(led_count));
    harness.engine.connect().await.expect("mock connect failed");
    harness
  }

  async fn next_frame(&mut self) -> Sent {
    timeout(TIMEOUT, self.frames.recv())
      .await
      .expect("timed out waiting for a frame")
      .expect("recorder dropped")
  }

  async fn assert_quiet(&mut self) {
    if let Ok(frame) = timeout(QUIET, self.frames.recv()).await {
      panic!("unexpected frame: {frame:?}");
    }
  }

  fn drain(&mut self) -> Vec<Sent> {
    let mut frames = Vec::new();
    while let Ok(frame) = self.frames.try_recv() {
      frames.push(frame);
    }
    frames
  }

  async fn shutdown(self) {
    self.engine.shutdown();
    timeout(TIMEOUT, self.handle)
      .await
      .expect("timed out waiting for LED manager shutdown")
      .expect("LED manager task panicked");
  }
}

fn config(led_count: usize) -> Config {
  Config {
    led_count,
    ..Config::default()
  }
}

async fn settle_until(what: &str, condition: impl Fn() -> bool) {
  timeout(TIMEOUT, async {
    while !condition() {
      time::sleep(Duration::from_millis(1)).await;
    }
  })
  .await
  .unwrap_or_else(|_| panic!("timed out waiting for {what}"));
}

fn uniform(frame: &Sent) -> Option<Pixel> {
  let first = *frame.pixels.first()?;
  frame.pixels.iter().all(|pixel| *pixel == first).then_some(first)
}

fn scale(percent: u8) -> [f32; 3] {
  ColorCorrection::brightness(crate::correction::DEFAULT_GAMMA, percent).scales()
}

#[tokio::test(start_paused = true)]
async fn solid_fill_sends_a_single_frame() {
  for led_count in [1, 64, 512] {
    let mut harness = Harness::connected(led_count).await;

    harness.engine.fill([12, 34, 56]);
    let frame = harness.next_frame().await;

    assert_eq!(frame.pixels.len(), led_count);
    assert_eq!(uniform(&frame), Some([12, 34, 56]));
    assert_eq!(frame.scales, [1.0; 3]);
    assert_eq!(harness.engine.mode(), AnimationMode::SolidFill);

    harness.assert_quiet().await;
    harness.shutdown().await;
  }
}

#[tokio::test(start_paused = true)]
async fn spark_stops_on_third_frame_failure() {
  let mut harness = Harness::connected(16).await;
  harness.recorder.fail_on.store(3, Ordering::SeqCst);

  harness.engine.spark(RED).await.expect("spark did not start");
  harness.next_frame().await;
  harness.next_frame().await;

  let engine = harness.engine.clone();
  settle_until("connection failure", || engine.state() == ConnectionState::Failed).await;
  harness.assert_quiet().await;

  assert_eq!(harness.listener.failures.load(Ordering::SeqCst), 1);
  assert_eq!(harness.recorder.attempts.load(Ordering::SeqCst), 3);
  assert_eq!(harness.engine.mode(), AnimationMode::Idle);

  let mut expected = PixelBuffer::new(16);
  let mut spark = Spark::new(RED, 16, 5);
  for _ in 0..3 {
    spark.draw(&mut expected);
  }
  let snapshot = harness
    .engine
    .snapshot()
    .await
    .expect("engine gone")
    .expect("strip should be back with the manager");
  assert_eq!(snapshot, expected.snapshot());

  harness.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn mode_switch_joins_previous_loop() {
  let mut harness = Harness::connected(16).await;

  harness.engine.spark(RED).await.expect("spark did not start");
  harness.next_frame().await;
  harness.next_frame().await;

  harness.engine.mixer().await.expect("mixer did not start");
  assert_eq!(harness.engine.mode(), AnimationMode::ColorMixSweep);

  let mut first_mix = None;
  for _ in 0..50 {
    let frame = harness.next_frame().await;
    if uniform(&frame).is_some() {
      first_mix = Some(frame);
      break;
    }
    assert_eq!(frame.pixels.iter().filter(|pixel| **pixel == RED).count(), 1);
  }

  let first_mix = first_mix.expect("mixer never rendered");
  assert_eq!(uniform(&first_mix), Some([255, 255, 0]));
  for green in [254, 253, 252, 251] {
    let frame = harness.next_frame().await;
    assert_eq!(uniform(&frame), Some([255, green, 0]), "spark frame after mixer started");
  }

  harness.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn brightness_change_applies_once_mid_loop() {
  let mut harness = Harness::connected(8).await;

  harness.engine.spark(GREEN).await.expect("spark did not start");
  assert_eq!(harness.next_frame().await.scales, scale(100));

  harness.engine.set_brightness(40);

  let mut previous = scale(100);
  let mut transitions = 0;
  for _ in 0..6 {
    let frame = harness.next_frame().await;
    if frame.scales != previous {
      transitions += 1;
      previous = frame.scales;
    }
  }

  assert_eq!(transitions, 1);
  assert_eq!(previous, scale(40));
  assert!(!harness.engine.params().brightness_changed().is_set());

  harness.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn span_change_keeps_spark_position() {
  let mut harness = Harness::connected(20).await;

  harness.engine.spark(RED).await.expect("spark did not start");
  let before = harness.next_frame().await;
  let head = before.pixels.iter().position(|pixel| *pixel == RED).expect("no lit pixel");

  harness.engine.set_span(20);
  let after = harness.next_frame().await;

  // four lit pixels ending where the next head would have been, nothing else
  let lit: Vec<usize> = (0..20).filter(|&index| after.pixels[index] == RED).collect();
  assert_eq!(lit.len(), 4);
  assert!(lit.contains(&((head + 1) % 20)));
  assert_eq!(after.pixels.iter().filter(|pixel| **pixel == BLACK).count(), 16);

  harness.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn color_change_recolors_spark_in_place() {
  let mut harness = Harness::connected(20).await;

  harness.engine.spark(RED).await.expect("spark did not start");
  let before = harness.next_frame().await;
  let head = before.pixels.iter().position(|pixel| *pixel == RED).expect("no lit pixel");

  harness.engine.set_color(GREEN);
  let after = harness.next_frame().await;

  assert!(!after.pixels.contains(&RED), "old color left behind: {after:?}");
  let lit: Vec<usize> = (0..20).filter(|&index| after.pixels[index] == GREEN).collect();
  assert_eq!(lit, vec![(head + 1) % 20]);

  let next = harness.next_frame().await;
  assert_eq!(next.pixels[(head + 2) % 20], GREEN);
  assert!(!harness.engine.params().color_changed().is_set());

  harness.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn color_change_takes_the_next_pulse_step() {
  let mut harness = Harness::connected(4).await;

  harness.engine.pulse(BLUE).await.expect("pulse did not start");
  for percent in [0, 0, 10] {
    let frame = harness.next_frame().await;
    assert_eq!(uniform(&frame), Some(BLUE));
    assert_eq!(frame.scales, scale(percent));
  }

  harness.engine.set_color(GREEN);

  let frame = harness.next_frame().await;
  assert_eq!(uniform(&frame), Some(GREEN));
  assert_eq!(frame.scales, scale(20));
  assert_eq!(uniform(&harness.next_frame().await), Some(GREEN));

  harness.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn pulse_ramps_brightness_up_and_down() {
  let mut harness = Harness::connected(4).await;

  harness.engine.pulse(BLUE).await.expect("pulse did not start");

  let mut expected = vec![0];
  expected.extend((0..10).map(|step| step * 10));
  expected.push(100);
  expected.extend((1..=10).rev().map(|step| step * 10));
  expected.push(0);

  for percent in expected {
    let frame = harness.next_frame().await;
    assert_eq!(uniform(&frame), Some(BLUE));
    assert_eq!(frame.scales, scale(percent), "at {percent}%");
  }

  harness.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn pulse_failure_aborts_the_ramp() {
  let mut harness = Harness::connected(4).await;
  harness.recorder.fail_on.store(5, Ordering::SeqCst);

  harness.engine.pulse(BLUE).await.expect("pulse did not start");

  let engine = harness.engine.clone();
  settle_until("connection failure", || engine.state() == ConnectionState::Failed).await;

  assert_eq!(harness.drain().len(), 4);
  harness.assert_quiet().await;
  assert_eq!(harness.recorder.attempts.load(Ordering::SeqCst), 5);
  assert_eq!(harness.listener.failures.load(Ordering::SeqCst), 1);

  harness.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn stopping_pulse_restores_brightness() {
  let mut harness = Harness::connected(4).await;
  harness.engine.set_brightness(70);
  harness.next_frame().await;

  harness.engine.pulse(BLUE).await.expect("pulse did not start");
  for _ in 0..3 {
    harness.next_frame().await;
  }

  harness.engine.stop().await.expect("stop failed");

  let last = harness.drain().pop().expect("no restore frame");
  assert_eq!(uniform(&last), Some(BLUE));
  assert_eq!(last.scales, scale(70));
  assert_eq!(harness.engine.mode(), AnimationMode::Idle);

  harness.assert_quiet().await;
  harness.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn led_count_change_replays_running_mode() {
  let mut harness = Harness::connected(16).await;

  harness.engine.spark(RED).await.expect("spark did not start");
  assert_eq!(harness.next_frame().await.pixels.len(), 16);

  harness.engine.set_led_count(32).expect("valid led count rejected");

  let mut resized = false;
  for _ in 0..100 {
    if harness.next_frame().await.pixels.len() == 32 {
      resized = true;
      break;
    }
  }

  assert!(resized, "never saw a 32 pixel frame");
  assert_eq!(harness.engine.mode(), AnimationMode::Spark);
  assert_eq!(harness.recorder.connects.load(Ordering::SeqCst), 2);
  assert_eq!(harness.recorder.closes.load(Ordering::SeqCst), 1);
  assert_eq!(harness.next_frame().await.pixels.len(), 32);

  harness.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn failed_reopen_after_resize_leaves_idle() {
  let mut harness = Harness::connected(16).await;

  harness.engine.spark(RED).await.expect("spark did not start");
  harness.next_frame().await;

  harness.recorder.refuse.store(true, Ordering::SeqCst);
  harness.engine.set_led_count(32).expect("valid led count rejected");

  let engine = harness.engine.clone();
  settle_until("reopen to fail", || engine.state() == ConnectionState::Failed).await;

  assert_eq!(harness.engine.mode(), AnimationMode::Idle);
  assert_eq!(harness.listener.failures.load(Ordering::SeqCst), 1);
  harness.drain();
  harness.assert_quiet().await;

  harness.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn failed_reconnect_stops_running_pulse() {
  let mut harness = Harness::connected(4).await;

  harness.engine.pulse(BLUE).await.expect("pulse did not start");
  harness.next_frame().await;

  harness.recorder.refuse.store(true, Ordering::SeqCst);
  let err = harness.engine.reconnect().await.expect_err("refused reconnect succeeded");
  assert!(matches!(
    err,
    EngineError::Led(LedError::Transport(TransportError::Connect { .. }))
  ));

  assert_eq!(harness.engine.state(), ConnectionState::Failed);
  assert_eq!(harness.engine.mode(), AnimationMode::Idle);
  harness.drain();
  harness.assert_quiet().await;

  harness.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn invalid_led_count_keeps_previous_value() {
  let harness = Harness::connected(16).await;

  for led_count in [0, 513] {
    let err = harness.engine.set_led_count(led_count).expect_err("led count accepted");
    assert!(matches!(err, EngineError::Config(ConfigError::LedCount(n)) if n == led_count));
  }
  assert_eq!(harness.engine.params().led_count(), 16);

  harness.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn failed_connection_needs_reconnect() {
  let harness = Harness::spawn(config(8));
  harness.recorder.refuse.store(true, Ordering::SeqCst);

  let err = harness.engine.connect().await.expect_err("refused connect succeeded");
  assert!(matches!(
    err,
    EngineError::Led(LedError::Transport(TransportError::Connect { .. }))
  ));
  assert_eq!(harness.engine.state(), ConnectionState::Failed);
  assert_eq!(harness.listener.failures.load(Ordering::SeqCst), 1);

  harness.recorder.refuse.store(false, Ordering::SeqCst);
  let err = harness.engine.connect().await.expect_err("connect left Failed");
  assert!(matches!(err, EngineError::Led(LedError::Failed)));

  harness.engine.reconnect().await.expect("reconnect failed");
  assert_eq!(harness.engine.state(), ConnectionState::Connected);
  assert_eq!(harness.listener.successes.load(Ordering::SeqCst), 1);

  harness.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn starting_a_loop_requires_a_connection() {
  let harness = Harness::spawn(config(8));

  let err = harness.engine.spark(RED).await.expect_err("spark started without a link");
  assert!(matches!(err, EngineError::Led(LedError::NotConnected)));
  assert_eq!(harness.engine.mode(), AnimationMode::Idle);

  harness.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn bursts_of_single_shot_requests_are_merged() {
  let mut harness = Harness::connected(8).await;

  harness.engine.fill(RED);
  harness.engine.set_color(GREEN);
  harness.engine.set_brightness(50);
  harness.engine.set_color(BLUE);

  let frame = harness.next_frame().await;
  assert_eq!(uniform(&frame), Some(BLUE));
  assert_eq!(frame.scales, scale(50));

  harness.assert_quiet().await;
  assert_eq!(harness.recorder.attempts.load(Ordering::SeqCst), 1);

  harness.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn later_fill_wins_over_earlier_recolor() {
  let mut harness = Harness::connected(8).await;

  harness.engine.set_color(GREEN);
  harness.engine.fill(RED);

  assert_eq!(uniform(&harness.next_frame().await), Some(RED));
  harness.assert_quiet().await;

  harness.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn fill_painted_offline_goes_out_on_connect() {
  let mut harness = Harness::spawn(config(8));

  harness.engine.fill(RED);
  harness.engine.connect().await.expect("mock connect failed");

  let frame = harness.next_frame().await;
  assert_eq!(uniform(&frame), Some(RED));
  assert_eq!(harness.engine.mode(), AnimationMode::SolidFill);
  harness.assert_quiet().await;

  harness.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn temperature_paints_without_storing_color() {
  let mut harness = Harness::connected(8).await;
  harness.engine.set_color(GREEN);
  harness.next_frame().await;

  harness.engine.set_temperature(0);
  assert_eq!(uniform(&harness.next_frame().await), Some([255, 255, 0]));
  assert_eq!(harness.engine.params().color(), GREEN);
  assert_eq!(harness.engine.mode(), AnimationMode::SolidFill);

  harness.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn peer_close_stops_the_loop() {
  let mut harness = Harness::connected(8).await;

  harness.engine.spark(RED).await.expect("spark did not start");
  harness.next_frame().await;

  harness.recorder.last_link().closed();

  let engine = harness.engine.clone();
  settle_until("loop to stop", || engine.mode() == AnimationMode::Idle).await;

  assert_eq!(harness.engine.state(), ConnectionState::Disconnected);
  assert_eq!(harness.listener.closed.load(Ordering::SeqCst), 1);
  assert_eq!(harness.listener.failures.load(Ordering::SeqCst), 0);
  assert_eq!(harness.recorder.closes.load(Ordering::SeqCst), 1);

  let err = harness.engine.mixer().await.expect_err("mixer started on a closed link");
  assert!(matches!(err, EngineError::Led(LedError::NotConnected)));

  harness.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn discovery_updates_device_count() {
  let harness = Harness::spawn(config(8));

  let count = discovery::handle_message(
    r#"{"type":"connected_devices_changed","devices":[{"id":1},{"id":2}]}"#,
    harness.engine.supervisor(),
  );
  assert_eq!(count, Some(2));
  assert_eq!(harness.listener.devices.load(Ordering::SeqCst), 2);

  assert_eq!(discovery::handle_message("{not json", harness.engine.supervisor()), None);
  assert_eq!(harness.listener.devices.load(Ordering::SeqCst), 2);

  harness.shutdown().await;
}

async fn local_server() -> (TcpListener, Config) {
  let listener = TcpListener::bind("127.0.0.1:0").await.expect("could not bind test server");
  let port = listener.local_addr().expect("no local address").port();
  let config = Config {
    host: "127.0.0.1".to_string(),
    port,
    close_timeout_ms: 100,
    ..Config::default()
  };
  (listener, config)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn opc_transport_streams_to_a_tcp_server() {
  crate::monitoring::init_logger();

  let (listener, config) = local_server().await;
  let server = tokio::spawn(async move {
    let (socket, _) = listener.accept().await.expect("accept failed");
    let mut framed = FramedRead::new(socket, OpcCodec);
    let mut messages = Vec::new();
    while let Some(message) = framed.next().await {
      messages.push(message.expect("bad OPC message"));
    }
    messages
  });

  let (link_tx, _link_rx) = mpsc::unbounded_channel();
  let connector = OpcConnector::new(&config);
  let mut transport = connector
    .connect(LinkEvents::new(LinkId::first(), link_tx))
    .await
    .expect("could not connect to test server");

  let mut buffer = PixelBuffer::new(3);
  buffer.fill(RED);
  let mut correction = ColorCorrection::default();

  transport.send(&buffer.snapshot(), &correction).await.expect("send failed");
  buffer.set(1, BLUE);
  transport.send(&buffer.snapshot(), &correction).await.expect("send failed");
  correction.set_brightness(50);
  transport.send(&buffer.snapshot(), &correction).await.expect("send failed");

  timeout(TIMEOUT, transport.close()).await.expect("close hung");

  let messages = timeout(TIMEOUT, server)
    .await
    .expect("server hung")
    .expect("server panicked");
  assert_eq!(messages.len(), 5);

  let first = messages[0].color_correction().expect("correction should lead");
  assert_eq!(first.gamma, 2.5);
  assert_eq!(first.whitepoint, [1.0; 3]);
  assert_eq!(messages[1].pixels(), Some(vec![RED; 3]));
  assert_eq!(messages[2].pixels(), Some(vec![RED, BLUE, RED]));
  assert_eq!(
    messages[3].color_correction().map(|body| body.whitepoint),
    Some([0.5; 3])
  );
  assert_eq!(messages[4].pixels(), Some(vec![RED, BLUE, RED]));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn peer_close_reports_link_event() {
  crate::monitoring::init_logger();

  let (listener, config) = local_server().await;
  let server = tokio::spawn(async move {
    let (socket, _) = listener.accept().await.expect("accept failed");
    drop(socket);
  });

  let (link_tx, mut link_rx) = mpsc::unbounded_channel();
  let link = LinkId::first().next();
  let transport = OpcConnector::new(&config)
    .connect(LinkEvents::new(link, link_tx))
    .await
    .expect("could not connect to test server");
  server.await.expect("server panicked");

  let event = timeout(TIMEOUT, link_rx.recv())
    .await
    .expect("no link event")
    .expect("link channel closed");
  assert_eq!(event.link, link);
  assert!(matches!(event.kind, LinkEventKind::Closed));

  drop(transport);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn close_gives_up_on_a_silent_peer() {
  crate::monitoring::init_logger();

  let (listener, config) = local_server().await;
  let (hold_tx, hold_rx) = tokio::sync::oneshot::channel::<()>();
  let server = tokio::spawn(async move {
    let (socket, _) = listener.accept().await.expect("accept failed");
    // never reads and never closes until the test is done
    let _ = hold_rx.await;
    drop(socket);
  });

  let (link_tx, _link_rx) = mpsc::unbounded_channel();
  let transport = OpcConnector::new(&config)
    .connect(LinkEvents::new(LinkId::first(), link_tx))
    .await
    .expect("could not connect to test server");

  let started = time::Instant::now();
  timeout(TIMEOUT, transport.close()).await.expect("close ignored its timeout");
  let elapsed = started.elapsed();
  assert!(elapsed >= Duration::from_millis(100), "closed after {elapsed:?}");

  let _ = hold_tx.send(());
  server.await.expect("server panicked");
}

#[tokio::test]
async fn refused_connect_is_a_connect_error() {
  let (listener, config) = local_server().await;
  drop(listener);

  let (link_tx, _link_rx) = mpsc::unbounded_channel();
  let result = OpcConnector::new(&config)
    .connect(LinkEvents::new(LinkId::first(), link_tx))
    .await;

  match result {
    Err(err) => assert!(err.is_connect(), "unexpected error: {err}"),
    Ok(_) => panic!("connected to a closed port"),
  }
}
