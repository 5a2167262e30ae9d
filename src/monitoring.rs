use tracing::metadata::LevelFilter;
use tracing_subscriber::{
  EnvFilter, Layer,
  fmt::{self, format::FmtSpan},
  prelude::__tracing_subscriber_SubscriberExt,
  util::SubscriberInitExt,
};

#[cfg(debug_assertions)]
const DEFAULT_LEVEL: LevelFilter = LevelFilter::TRACE;
#[cfg(debug_assertions)]
const DEFAULT_DIRECTIVES: &str = "opcled=debug,opccomm=debug";

#[cfg(not(debug_assertions))]
const DEFAULT_LEVEL: LevelFilter = LevelFilter::INFO;
#[cfg(not(debug_assertions))]
const DEFAULT_DIRECTIVES: &str = "opcled=info,opccomm=warn";

/// Installs the fmt subscriber; `RUST_LOG` replaces the crate directives. Safe to call more than once.
pub fn init_logger() {
  let directives = std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_DIRECTIVES.to_string());
  let filter = EnvFilter::builder()
    .with_default_directive(DEFAULT_LEVEL.into())
    .parse_lossy(directives);

  let layer = fmt::layer().with_span_events(FmtSpan::CLOSE).with_filter(filter);
  if let Err(err) = tracing_subscriber::registry().with(layer).try_init() {
    tracing::debug!("logger already installed: {err}");
  }
}

/// Resolves on Ctrl-C, or on SIGTERM where the platform has it.
pub async fn wait_for_signal() {
  #[cfg(unix)]
  {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
      Ok(mut terminate) => {
        tokio::select! {
          _ = tokio::signal::ctrl_c() => {}
          _ = terminate.recv() => {}
        }
        return;
      }
      Err(err) => tracing::warn!("could not listen for SIGTERM: {err}"),
    }
  }

  if let Err(err) = tokio::signal::ctrl_c().await {
    tracing::error!("could not listen for Ctrl-C: {err}");
    std::future::pending::<()>().await;
  }
}
