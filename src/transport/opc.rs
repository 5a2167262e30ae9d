use std::{io, time::Duration};

use futures::SinkExt;
use opccomm::{Message, codec::OpcCodec};
use tokio::{
  io::AsyncReadExt,
  net::{
    TcpStream,
    tcp::{OwnedReadHalf, OwnedWriteHalf},
  },
  task::JoinHandle,
  time,
};
use tokio_util::codec::FramedWrite;

use super::{Connector, LinkEvents, Transport, TransportError};
use crate::{config::Config, correction::ColorCorrection, pixel::Snapshot};

const RX_BUFFER_LEN: usize = 512;

/// Opens TCP connections to an OPC server.
#[derive(Debug, Clone)]
pub struct OpcConnector {
  addr: String,
  channel: u8,
  connect_timeout: Duration,
  close_timeout: Duration,
}

impl OpcConnector {
  pub fn new(config: &Config) -> Self {
    Self {
      addr: config.addr(),
      channel: config.channel,
      connect_timeout: config.connect_timeout(),
      close_timeout: config.close_timeout(),
    }
  }

  pub fn addr(&self) -> &str {
    &self.addr
  }
}

impl Connector for OpcConnector {
  type Transport = OpcTransport;

  async fn connect(&self, events: LinkEvents) -> Result<OpcTransport, TransportError> {
    tracing::debug!(addr = %self.addr, link = ?events.link(), "connecting to OPC server");

    let stream = match time::timeout(self.connect_timeout, TcpStream::connect(&self.addr)).await {
      Ok(Ok(stream)) => stream,
      Ok(Err(source)) => {
        return Err(TransportError::Connect {
          addr: self.addr.clone(),
          source,
        });
      }
      Err(_) => {
        return Err(TransportError::ConnectTimeout {
          addr: self.addr.clone(),
          timeout: self.connect_timeout,
        });
      }
    };

    if let Err(err) = stream.set_nodelay(true) {
      tracing::warn!("failed to disable Nagle on OPC socket: {err}");
    }

    let (reader, writer) = stream.into_split();
    let watcher = spawn_close_watcher(reader, events);

    tracing::info!("connected to OPC server at {}", self.addr);

    Ok(OpcTransport {
      sink: FramedWrite::new(writer, OpcCodec),
      watcher,
      channel: self.channel,
      delivered: None,
      close_timeout: self.close_timeout,
    })
  }
}

pub struct OpcTransport {
  sink: FramedWrite<OwnedWriteHalf, OpcCodec>,
  watcher: JoinHandle<()>,
  channel: u8,
  delivered: Option<ColorCorrection>,
  close_timeout: Duration,
}

impl Transport for OpcTransport {
  #[tracing::instrument(level = "trace", skip_all)]
  async fn send(&mut self, frame: &Snapshot, correction: &ColorCorrection) -> Result<(), TransportError> {
    if self.delivered.as_ref() != Some(correction) {
      tracing::trace!(?correction, "sending color correction");
      self.sink.feed(Message::ColorCorrection(correction.body())).await?;
      self.delivered = Some(*correction);
    }

    self
      .sink
      .send(Message::SetPixels {
        channel: self.channel,
        pixels: &frame[..],
      })
      .await?;

    Ok(())
  }

  async fn close(mut self) {
    if let Err(err) = self.sink.close().await {
      tracing::warn!("failed to shut down OPC socket cleanly: {err}");
    }

    // the peer acknowledges by closing its side, which ends the watcher
    match time::timeout(self.close_timeout, &mut self.watcher).await {
      Ok(_) => tracing::debug!("OPC server acknowledged close"),
      Err(_) => {
        tracing::warn!(
          "OPC server did not acknowledge close within {:?}; proceeding",
          self.close_timeout
        );
        self.watcher.abort();
      }
    }
  }
}

impl Drop for OpcTransport {
  fn drop(&mut self) {
    self.watcher.abort();
  }
}

fn spawn_close_watcher(mut reader: OwnedReadHalf, events: LinkEvents) -> JoinHandle<()> {
  tokio::spawn(async move {
    let mut buf = [0u8; RX_BUFFER_LEN];

    loop {
      match reader.read(&mut buf).await {
        Ok(0) => {
          tracing::debug!(link = ?events.link(), "OPC server closed its side of the connection");
          events.closed();
          break;
        }
        Ok(n) => tracing::trace!("discarding {n} unexpected bytes from OPC server"),
        Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
        Err(err) => {
          tracing::error!("OPC socket read error: {err}");
          events.failed(err);
          break;
        }
      }
    }
  })
}
