//! Open Pixel Control wire vocabulary.
//!
//! Every OPC message is a four byte header followed by a payload:
//! - channel (0 broadcasts to every strip)
//! - command
//! - big-endian payload length
//!
//! Only the two commands needed to drive a pixel controller are modelled: a full strip of 8-bit RGB values and the
//! Fadecandy system-exclusive message that sets global color correction.

use serde::{Deserialize, Serialize};

pub mod codec;

pub const HEADER_LEN: usize = 4;
pub const BYTES_PER_LED: usize = 3;
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize;
pub const MAX_PIXELS: usize = MAX_PAYLOAD_LEN / BYTES_PER_LED;

pub const BROADCAST_CHANNEL: u8 = 0;
pub const CMD_SET_PIXELS: u8 = 0x00;
pub const CMD_SYSTEM_EXCLUSIVE: u8 = 0xFF;

pub const SYSTEM_ID_FADECANDY: u16 = 0x0001;
pub const FADECANDY_SET_COLOR_CORRECTION: u16 = 0x0001;
pub const SYSEX_HEADER_LEN: usize = 4;

pub const DEFAULT_PORT: u16 = 7890;

pub type Pixel = [u8; BYTES_PER_LED];

pub const BLACK: Pixel = [0, 0, 0];

/// Body of the Fadecandy color correction message, sent as JSON.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CorrectionBody {
  pub gamma: f32,
  pub whitepoint: [f32; 3],
}

#[derive(Debug, Clone, Copy)]
pub enum Message<'a> {
  SetPixels { channel: u8, pixels: &'a [Pixel] },
  ColorCorrection(CorrectionBody),
}

/// A decoded message with its payload left uninterpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
  pub channel: u8,
  pub command: u8,
  pub data: Vec<u8>,
}

impl RawMessage {
  pub fn pixels(&self) -> Option<Vec<Pixel>> {
    if self.command != CMD_SET_PIXELS {
      return None;
    }

    Some(
      self
        .data
        .chunks_exact(BYTES_PER_LED)
        .map(|chunk| [chunk[0], chunk[1], chunk[2]])
        .collect(),
    )
  }

  pub fn color_correction(&self) -> Option<CorrectionBody> {
    if self.command != CMD_SYSTEM_EXCLUSIVE || self.data.len() < SYSEX_HEADER_LEN {
      return None;
    }

    let system_id = u16::from_be_bytes([self.data[0], self.data[1]]);
    let command = u16::from_be_bytes([self.data[2], self.data[3]]);
    if system_id != SYSTEM_ID_FADECANDY || command != FADECANDY_SET_COLOR_CORRECTION {
      return None;
    }

    serde_json::from_slice(&self.data[SYSEX_HEADER_LEN..]).ok()
  }
}
