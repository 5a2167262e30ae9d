use std::io;

use tokio_util::bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::{
  BROADCAST_CHANNEL, BYTES_PER_LED, CMD_SET_PIXELS, CMD_SYSTEM_EXCLUSIVE, FADECANDY_SET_COLOR_CORRECTION, HEADER_LEN,
  MAX_PAYLOAD_LEN, Message, RawMessage, SYSEX_HEADER_LEN, SYSTEM_ID_FADECANDY,
};

pub struct OpcCodec;

impl Encoder<Message<'_>> for OpcCodec {
  type Error = Error;

  fn encode(&mut self, item: Message<'_>, dst: &mut BytesMut) -> Result<(), Self::Error> {
    match item {
      Message::SetPixels { channel, pixels } => {
        let len = pixels.len() * BYTES_PER_LED;
        if len > MAX_PAYLOAD_LEN {
          return Err(Error::MessageTooLarge(len));
        }

        dst.reserve(HEADER_LEN + len);
        dst.put_u8(channel);
        dst.put_u8(CMD_SET_PIXELS);
        dst.put_u16(len as u16);
        for pixel in pixels {
          dst.put_slice(pixel);
        }

        tracing::trace!(target: "opccomm::encoder", channel, "encoded {} pixel bytes", len);
      }
      Message::ColorCorrection(body) => {
        let json = serde_json::to_vec(&body)?;
        let len = SYSEX_HEADER_LEN + json.len();
        if len > MAX_PAYLOAD_LEN {
          return Err(Error::MessageTooLarge(len));
        }

        dst.reserve(HEADER_LEN + len);
        dst.put_u8(BROADCAST_CHANNEL);
        dst.put_u8(CMD_SYSTEM_EXCLUSIVE);
        dst.put_u16(len as u16);
        dst.put_u16(SYSTEM_ID_FADECANDY);
        dst.put_u16(FADECANDY_SET_COLOR_CORRECTION);
        dst.put_slice(&json);

        tracing::trace!(target: "opccomm::encoder", "encoded color correction: {}", String::from_utf8_lossy(&json));
      }
    }

    Ok(())
  }
}

impl Decoder for OpcCodec {
  type Item = RawMessage;
  type Error = Error;

  fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
    if src.len() < HEADER_LEN {
      return Ok(None);
    }

    let len = u16::from_be_bytes([src[2], src[3]]) as usize;
    if src.len() < HEADER_LEN + len {
      src.reserve(HEADER_LEN + len - src.len());
      return Ok(None);
    }

    let channel = src[0];
    let command = src[1];
    let data = src[HEADER_LEN..HEADER_LEN + len].to_vec();
    src.advance(HEADER_LEN + len);

    tracing::trace!(target: "opccomm::decoder", channel, command, "decoded {} bytes", len);

    Ok(Some(RawMessage { channel, command, data }))
  }

  fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
    match self.decode(src)? {
      Some(item) => Ok(Some(item)),
      None if src.is_empty() => Ok(None),
      None => Err(Error::Truncated(src.len())),
    }
  }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
  #[error(transparent)]
  Io(#[from] io::Error),
  #[error("OPC payload of {0} bytes exceeds the 16-bit length field")]
  MessageTooLarge(usize),
  #[error("failed to serialize color correction: {0}")]
  Serialize(#[from] serde_json::Error),
  #[error("stream ended with {0} bytes of an incomplete message")]
  Truncated(usize),
}
