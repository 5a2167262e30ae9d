use std::{future::Future, io, time::Duration};

use tokio::sync::mpsc;

use crate::{correction::ColorCorrection, pixel::Snapshot};

pub mod opc;

pub use self::opc::{OpcConnector, OpcTransport};

/// An open connection to a pixel controller.
pub trait Transport: Send + 'static {
  /// Delivers one full-strip frame with the correction the controller should apply to it.
  fn send(
    &mut self,
    frame: &Snapshot,
    correction: &ColorCorrection,
  ) -> impl Future<Output = Result<(), TransportError>> + Send;

  /// Releases the connection. Consuming `self` makes a second close impossible.
  fn close(self) -> impl Future<Output = ()> + Send;
}

/// Opens transports; the LED manager calls it on connect, reconnect, and led count changes.
pub trait Connector: Send + Sync + 'static {
  type Transport: Transport;

  fn connect(&self, events: LinkEvents) -> impl Future<Output = Result<Self::Transport, TransportError>> + Send;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkId(u64);

impl LinkId {
  pub(crate) fn first() -> Self {
    Self(0)
  }

  pub(crate) fn next(self) -> Self {
    Self(self.0.wrapping_add(1))
  }
}

#[derive(Debug)]
pub enum LinkEventKind {
  /// The peer closed its side without being asked to.
  Closed,
  Failed(io::Error),
}

#[derive(Debug)]
pub struct LinkEvent {
  pub link: LinkId,
  pub kind: LinkEventKind,
}

pub type LinkEventTx = mpsc::UnboundedSender<LinkEvent>;
pub type LinkEventRx = mpsc::UnboundedReceiver<LinkEvent>;

/// Reports connection-level events that happen outside of a send, tagged with the link they belong to.
#[derive(Debug, Clone)]
pub struct LinkEvents {
  link: LinkId,
  tx: LinkEventTx,
}

impl LinkEvents {
  pub(crate) fn new(link: LinkId, tx: LinkEventTx) -> Self {
    Self { link, tx }
  }

  pub fn link(&self) -> LinkId {
    self.link
  }

  pub fn closed(&self) {
    self.emit(LinkEventKind::Closed);
  }

  pub fn failed(&self, err: io::Error) {
    self.emit(LinkEventKind::Failed(err));
  }

  fn emit(&self, kind: LinkEventKind) {
    if let Err(err) = self.tx.send(LinkEvent { link: self.link, kind }) {
      tracing::debug!("link event dropped, LED manager is gone: {:?}", err.0.kind);
    }
  }
}

#[derive(thiserror::Error, Debug)]
pub enum TransportError {
  #[error("failed to connect to {addr}: {source}")]
  Connect {
    addr: String,
    #[source]
    source: io::Error,
  },
  #[error("timed out connecting to {addr} after {timeout:?}")]
  ConnectTimeout { addr: String, timeout: Duration },
  #[error("failed to send frame: {0}")]
  Send(#[from] opccomm::codec::Error),
  #[error("connection closed")]
  Closed,
}

impl TransportError {
  pub fn is_connect(&self) -> bool {
    matches!(
      self,
      TransportError::Connect { .. } | TransportError::ConnectTimeout { .. }
    )
  }
}
