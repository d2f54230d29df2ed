//! Connectivity probe: ping the device and wait for its pong.
//!
//! The firmware answers `P` with a `PONG:<tag>` line, which is how the host
//! tells a reader board apart from whatever else enumerated as a serial
//! port. The probe opens the port itself and releases it before returning,
//! so it can run against ports the station has not claimed yet.

use crate::error::{LinkError, Result};
use doorman_protocol::{DeviceEvent, HostCommand, parse_line};
use serialport::{DataBits, Parity, StopBits};
use std::io::{Read, Write};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Read timeout for each poll slice while waiting for the pong.
const PROBE_READ_SLICE: Duration = Duration::from_millis(200);

/// Ping `port_name` and return the firmware tag from its pong.
///
/// Lines other than a pong (boot chatter, UID reports from a tag already on
/// the antenna) are ignored while waiting.
///
/// # Errors
/// [`LinkError::PortUnavailable`] when the port cannot be opened,
/// [`LinkError::ProbeTimeout`] when nothing pongs within `timeout`.
pub fn probe(port_name: &str, baud_rate: u32, timeout: Duration) -> Result<String> {
    debug!(port = port_name, baud = baud_rate, "Probing for station firmware");

    let mut port = serialport::new(port_name, baud_rate)
        .data_bits(DataBits::Eight)
        .stop_bits(StopBits::One)
        .parity(Parity::None)
        .timeout(PROBE_READ_SLICE)
        .open()
        .map_err(|e| LinkError::unavailable(port_name, &e))?;

    port.write_all(&HostCommand::Ping.encode())
        .and_then(|_| port.flush())
        .map_err(|e| LinkError::write_failed(port_name, e))?;

    let deadline = Instant::now() + timeout;
    let mut pending: Vec<u8> = Vec::with_capacity(64);
    let mut buf = [0u8; 64];

    while Instant::now() < deadline {
        match port.read(&mut buf) {
            Ok(0) => {}
            Ok(n) => {
                for &byte in &buf[..n] {
                    if byte != b'\n' {
                        pending.push(byte);
                        continue;
                    }
                    let text = String::from_utf8_lossy(&pending).into_owned();
                    pending.clear();
                    trace!(port = port_name, line = %text.trim(), "Probe read line");
                    if let DeviceEvent::Pong(tag) = parse_line(&text) {
                        debug!(port = port_name, %tag, "Pong received");
                        return Ok(tag);
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {}
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(LinkError::Io(e)),
        }
    }

    Err(LinkError::ProbeTimeout {
        port: port_name.to_string(),
        timeout_ms: timeout.as_millis() as u64,
    })
}

/// Probe and additionally require a specific firmware tag.
///
/// # Errors
/// Everything [`probe`] returns, plus [`LinkError::ProtocolMismatch`] when
/// the pong names a different firmware.
pub fn probe_expecting(
    port_name: &str,
    baud_rate: u32,
    timeout: Duration,
    expected: &str,
) -> Result<String> {
    let tag = probe(port_name, baud_rate, timeout)?;
    if tag.eq_ignore_ascii_case(expected) {
        Ok(tag)
    } else {
        Err(LinkError::ProtocolMismatch {
            port: port_name.to_string(),
            expected: expected.to_string(),
            got: tag,
        })
    }
}
