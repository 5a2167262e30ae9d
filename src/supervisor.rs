use std::{
  fmt,
  sync::{
    Arc, Mutex, PoisonError, RwLock,
    atomic::{AtomicU64, AtomicUsize, Ordering},
  },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
  Disconnected,
  Connecting,
  Connected,
  Failed,
}

/// Callbacks for connection and discovery events.
///
/// Invoked on whichever task observed the event; implementations must not assume a particular thread.
pub trait Listener: Send + Sync {
  fn on_connection_failure(&self) {}
  fn on_connection_success(&self) {}
  fn on_connection_closed(&self) {}
  fn on_connected_device_count_changed(&self, _count: usize) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Owns the connection state machine and fans transitions out to registered listeners.
pub struct ConnectionSupervisor {
  state: Mutex<ConnectionState>,
  listeners: RwLock<Vec<(ListenerId, Arc<dyn Listener>)>>,
  next_id: AtomicU64,
  device_count: AtomicUsize,
}

impl ConnectionSupervisor {
  pub fn new() -> Self {
    Self {
      state: Mutex::new(ConnectionState::Disconnected),
      listeners: RwLock::new(Vec::new()),
      next_id: AtomicU64::new(0),
      device_count: AtomicUsize::new(0),
    }
  }

  pub fn state(&self) -> ConnectionState {
    *self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  pub fn add_listener(&self, listener: Arc<dyn Listener>) -> ListenerId {
    let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
    self
      .listeners
      .write()
      .unwrap_or_else(PoisonError::into_inner)
      .push((id, listener));
    id
  }

  pub fn remove_listener(&self, id: ListenerId) -> bool {
    let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
    let before = listeners.len();
    listeners.retain(|(existing, _)| *existing != id);
    listeners.len() != before
  }

  pub(crate) fn connecting(&self) -> bool {
    self.transition(
      &[ConnectionState::Disconnected, ConnectionState::Failed],
      ConnectionState::Connecting,
    )
  }

  pub(crate) fn connected(&self) -> bool {
    let changed = self.transition(&[ConnectionState::Connecting], ConnectionState::Connected);
    if changed {
      tracing::info!("connected to OPC controller");
      self.notify(|listener| listener.on_connection_success());
    }
    changed
  }

  /// Reports a failure once per connection attempt; repeated reports are only logged.
  pub(crate) fn fail(&self, reason: &dyn fmt::Display) -> bool {
    let changed = self.transition(
      &[ConnectionState::Connecting, ConnectionState::Connected],
      ConnectionState::Failed,
    );
    if changed {
      tracing::error!("OPC connection failed: {reason}");
      self.notify(|listener| listener.on_connection_failure());
    } else {
      tracing::debug!("ignoring failure outside an active connection: {reason}");
    }
    changed
  }

  /// The controller closed the connection without being asked to.
  pub(crate) fn closed_by_peer(&self) -> bool {
    let changed = self.transition(&[ConnectionState::Connected], ConnectionState::Disconnected);
    if changed {
      tracing::warn!("OPC controller closed the connection");
      self.notify(|listener| listener.on_connection_closed());
    }
    changed
  }

  /// Explicit teardown requested by the owner; listeners are not told about their own request.
  pub(crate) fn disconnected(&self) {
    let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
    if *state != ConnectionState::Disconnected {
      tracing::debug!(from = ?*state, "connection state -> Disconnected");
      *state = ConnectionState::Disconnected;
    }
  }

  pub fn connected_device_count(&self) -> usize {
    self.device_count.load(Ordering::Acquire)
  }

  pub fn set_connected_device_count(&self, count: usize) {
    self.device_count.store(count, Ordering::Release);
    tracing::debug!(count, "connected device count changed");
    self.notify(|listener| listener.on_connected_device_count_changed(count));
  }

  fn transition(&self, from: &[ConnectionState], to: ConnectionState) -> bool {
    let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
    if !from.contains(&state) {
      return false;
    }

    tracing::debug!(from = ?*state, ?to, "connection state transition");
    *state = to;
    true
  }

  fn notify(&self, event: impl Fn(&dyn Listener)) {
    let listeners: Vec<Arc<dyn Listener>> = self
      .listeners
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .iter()
      .map(|(_, listener)| Arc::clone(listener))
      .collect();

    for listener in listeners {
      event(listener.as_ref());
    }
  }
}

impl Default for ConnectionSupervisor {
  fn default() -> Self {
    Self::new()
  }
}
