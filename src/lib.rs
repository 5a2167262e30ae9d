//! Streams animated frames to an Open Pixel Control LED controller.
//!
//! [`Engine`] is the entry point: it owns the connection supervisor, the live animation parameters, and the LED
//! manager task that runs at most one animation loop at a time.

pub mod config;
pub mod correction;
pub mod discovery;
pub mod engine;
pub mod led;
pub mod monitoring;
pub mod params;
pub mod pixel;
pub mod supervisor;
pub mod transport;

#[cfg(test)]
mod __test__;

pub use self::{
  config::Config,
  engine::{Engine, EngineError},
  led::effects::AnimationMode,
  supervisor::{ConnectionState, Listener},
  transport::{OpcConnector, OpcTransport},
};
