use std::sync::Arc;

use opcled::{AnimationMode, Config, Engine, Listener, OpcConnector, monitoring};

struct LogListener;

impl Listener for LogListener {
  fn on_connection_failure(&self) {
    tracing::error!("lost the OPC controller; restart to reconnect");
  }

  fn on_connection_success(&self) {
    tracing::info!("OPC controller connected");
  }

  fn on_connection_closed(&self) {
    tracing::warn!("OPC controller closed the connection");
  }

  fn on_connected_device_count_changed(&self, count: usize) {
    tracing::info!(count, "connected devices changed");
  }
}

#[tokio::main]
async fn main() {
  monitoring::init_logger();
  tracing::info!("starting opcled");

  let mode = match std::env::args().nth(1).as_deref() {
    None | Some("fill") => AnimationMode::SolidFill,
    Some("spark") => AnimationMode::Spark,
    Some("mixer") => AnimationMode::ColorMixSweep,
    Some("pulse") => AnimationMode::Pulse,
    Some("clear") => AnimationMode::Idle,
    Some(other) => {
      eprintln!("unknown mode {other:?}; expected one of fill, spark, mixer, pulse, clear");
      std::process::exit(2);
    }
  };

  let config = Config::load().expect("could not load configuration");
  let connector = OpcConnector::new(&config);
  let addr = connector.addr().to_string();
  tracing::info!("streaming to OPC server at {addr}");
  let cancel_token = tokio_util::sync::CancellationToken::new();

  let (engine, engine_handle) =
    Engine::spawn(&config, connector, cancel_token.clone()).expect("could not initialize LED engine");
  engine.add_listener(Arc::new(LogListener));

  match engine.connect().await {
    Ok(()) => {
      if let Err(err) = engine.start(mode).await {
        tracing::error!("could not start {mode:?}: {err}");
      }
    }
    Err(err) => tracing::error!("could not connect to {addr}: {err}"),
  }

  tracing::info!("running until a shutdown signal arrives");
  monitoring::wait_for_signal().await;
  tracing::info!("shutdown signal received, stopping...");

  engine.shutdown();
  engine_handle.await.expect("LED manager task panicked");

  tracing::info!("exiting");
}
