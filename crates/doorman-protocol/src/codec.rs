//! Tokio codec for newline-delimited serial traffic.
//!
//! The device writes human-readable lines terminated by `\n` (optionally
//! `\r\n`); the host answers with the compact command bytes from
//! [`HostCommand::encode`]. The decoder tolerates the noise a freshly reset
//! board puts on the wire: invalid UTF-8 is replaced lossily and blank lines
//! are skipped instead of surfacing as events.

use crate::command::HostCommand;
use crate::event::{DeviceEvent, parse_line};
use bytes::{BufMut, BytesMut};
use doorman_core::{Error, Result};
use tokio_util::codec::{Decoder, Encoder};

/// Maximum accepted line length in bytes before the stream is considered
/// corrupt (a wedged device streaming without newlines).
pub const DEFAULT_MAX_LINE_LENGTH: usize = 1024;

/// Framing codec: decodes device lines into [`DeviceEvent`]s and encodes
/// [`HostCommand`]s.
#[derive(Debug, Clone)]
pub struct LineCodec {
    max_line_length: usize,
}

impl LineCodec {
    /// Create a codec with the default line limit.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }

    /// Create a codec with a custom line limit.
    #[must_use]
    pub fn with_max_line_length(max_line_length: usize) -> Self {
        Self { max_line_length }
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LineCodec {
    type Item = DeviceEvent;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        loop {
            let Some(pos) = src.iter().position(|&b| b == b'\n') else {
                if src.len() > self.max_line_length {
                    return Err(Error::LineTooLong {
                        len: src.len(),
                        max: self.max_line_length,
                    });
                }
                return Ok(None);
            };

            if pos > self.max_line_length {
                return Err(Error::LineTooLong {
                    len: pos,
                    max: self.max_line_length,
                });
            }

            let line = src.split_to(pos + 1);
            let text = String::from_utf8_lossy(&line[..pos]);
            let trimmed = text.trim();
            if trimmed.is_empty() {
                continue;
            }
            return Ok(Some(parse_line(trimmed)));
        }
    }
}

impl Encoder<HostCommand> for LineCodec {
    type Error = Error;

    fn encode(&mut self, item: HostCommand, dst: &mut BytesMut) -> Result<()> {
        let bytes = item.encode();
        dst.reserve(bytes.len());
        dst.put_slice(&bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use doorman_core::Uid;

    fn decode_all(codec: &mut LineCodec, buf: &mut BytesMut) -> Vec<DeviceEvent> {
        let mut events = Vec::new();
        while let Ok(Some(event)) = codec.decode(buf) {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_decode_waits_for_newline() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from("UID: EB-EE-C0-01");

        assert_eq!(codec.decode(&mut buf).unwrap(), None);

        buf.put_slice(b"\n");
        let event = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(
            event,
            DeviceEvent::UidReported(Uid::new("EB-EE-C0-01").unwrap())
        );
    }

    #[test]
    fn test_decode_multiple_lines_in_one_read() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from("UID: 11-22-33-44\nPONG:doorman-fw-1.2\n");

        let events = decode_all(&mut codec, &mut buf);
        assert_eq!(
            events,
            vec![
                DeviceEvent::UidReported(Uid::new("11-22-33-44").unwrap()),
                DeviceEvent::Pong("doorman-fw-1.2".to_string()),
            ]
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_handles_crlf() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from("UID: 0A0B0C0D\r\n");

        let event = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(event, DeviceEvent::UidReported(Uid::new("0A0B0C0D").unwrap()));
    }

    #[test]
    fn test_decode_skips_blank_lines() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from("\n\r\n   \nUID: AB-CD\n");

        let event = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(event, DeviceEvent::UidReported(Uid::new("AB-CD").unwrap()));
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_decode_boot_garbage_is_unrecognized() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&[0xFF, 0xFE, 0x01, b'x', b'\n'][..]);

        let event = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(event, DeviceEvent::Unrecognized);
    }

    #[test]
    fn test_decode_rejects_oversized_line() {
        let mut codec = LineCodec::with_max_line_length(16);
        let mut buf = BytesMut::new();
        buf.put_slice(&[b'A'; 32]);

        let err = codec.decode(&mut buf).unwrap_err();
        assert!(matches!(err, Error::LineTooLong { len: 32, max: 16 }));
    }

    #[test]
    fn test_decode_rejects_oversized_terminated_line() {
        let mut codec = LineCodec::with_max_line_length(8);
        let mut buf = BytesMut::from("AAAAAAAAAAAAAAAA\n");

        assert!(codec.decode(&mut buf).is_err());
    }

    #[test]
    fn test_decode_line_at_limit_passes() {
        let mut codec = LineCodec::with_max_line_length(8);
        let mut buf = BytesMut::from("UID:ABC\n");

        let event = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(event, DeviceEvent::UidReported(Uid::new("ABC").unwrap()));
    }

    #[test]
    fn test_encode_commands() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::new();

        codec.encode(HostCommand::Granted, &mut buf).unwrap();
        codec
            .encode(HostCommand::confirm_with_name("Ana"), &mut buf)
            .unwrap();

        assert_eq!(&buf[..], b"1\nK:Ana\n");
    }

    #[test]
    fn test_encode_then_decode_is_not_an_event() {
        // Host commands share the wire with device lines on loopback rigs;
        // they must never be mistaken for UID reports.
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(HostCommand::AccessMode, &mut buf).unwrap();

        let event = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(event, DeviceEvent::Unrecognized);
    }
}
