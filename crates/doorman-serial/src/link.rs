//! Serial link to the reader/servo firmware.
//!
//! This module owns the one physical connection a station has: a USB serial
//! port to the board that carries the NFC antenna and the lock servo. Lines
//! from the device are pushed into a caller-supplied callback; replies go
//! back through [`CommandSink::send`].
//!
//! # Architecture
//!
//! ```text
//! AccessEngine
//!     ▲ on_line("UID: ..")          │ CommandSink::send(Granted)
//!     │                             ▼
//!  reader thread               writer (Mutex)
//!     └──────── SerialLink ─────────┘
//!                      │
//!                 serialport, 115200 8N1
//! ```
//!
//! # Example Usage
//!
//! ```no_run
//! use doorman_serial::{CommandSink, LinkConfig, SerialLink};
//! use doorman_protocol::HostCommand;
//!
//! # fn example() -> doorman_serial::Result<()> {
//! let config = LinkConfig {
//!     port_name: "/dev/ttyUSB0".to_string(),
//!     ..LinkConfig::default()
//! };
//!
//! let link = SerialLink::open(config, |line| {
//!     println!("device said: {line}");
//! })?;
//!
//! link.send(HostCommand::Ping)?;
//! link.close();
//! # Ok(())
//! # }
//! ```
//!
//! # Design Principles
//!
//! - **Callback on the reader thread**: the tag-to-verdict latency budget is
//!   human-perceptible, so lines are delivered synchronously instead of
//!   hopping through a queue. Callbacks must reply fast and push slow work
//!   elsewhere.
//! - **Writes to a dead link warn, not fail**: enrollment timers and
//!   background jobs keep running while a cable is out; their commands are
//!   dropped with a warning rather than poisoning the station with errors.
//! - **Idempotent close**: `close()` and `Drop` may race; both are safe to
//!   call any number of times.

use crate::error::{LinkError, Result};
use crate::traits::CommandSink;
use doorman_core::constants::DEFAULT_BAUD_RATE;
use doorman_protocol::HostCommand;
use serialport::{DataBits, Parity, SerialPort, StopBits};
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// Longest partial line buffered before the link declares the stream wedged
/// and drops the fragment.
const MAX_PENDING_LINE: usize = 4096;

/// Configuration for a serial link.
///
/// The line discipline is fixed at 8 data bits, 1 stop bit, no parity; only
/// the port, speed and timing are configurable.
///
/// # Example
///
/// ```
/// use doorman_serial::LinkConfig;
///
/// let config = LinkConfig {
///     port_name: "COM3".to_string(),
///     ..LinkConfig::default()
/// };
/// assert_eq!(config.baud_rate, 115_200);
/// ```
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// OS device name of the port.
    pub port_name: String,

    /// Line speed; the stock firmware runs at 115200.
    pub baud_rate: u32,

    /// Poll slice for blocking reads. Bounds how long `close()` waits for
    /// the reader thread to notice the shutdown flag.
    pub read_timeout: Duration,

    /// When set, connection probes require the pong to carry this tag.
    pub expected_firmware: Option<String>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            port_name: "/dev/ttyUSB0".to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout: Duration::from_millis(500),
            expected_firmware: None,
        }
    }
}

/// An open serial connection to the reader board.
///
/// # Connection Lifecycle
///
/// 1. Open with [`SerialLink::open`], handing over the line callback
/// 2. Reply through [`CommandSink::send`]
/// 3. Shut down with [`SerialLink::close`] (or just drop it)
///
/// # Thread Safety
///
/// The link is `Send + Sync`; the writer handle lives behind a mutex so any
/// thread or task may send. The callback runs on the dedicated reader
/// thread only.
pub struct SerialLink {
    port_name: String,
    writer: Mutex<Box<dyn SerialPort>>,
    running: Arc<AtomicBool>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl SerialLink {
    /// Open the port and start the reader thread.
    ///
    /// `on_line` receives every non-empty line from the device, already
    /// trimmed, on the reader thread.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::PortUnavailable`] when the port cannot be
    /// opened or its write handle cannot be cloned.
    pub fn open<F>(config: LinkConfig, on_line: F) -> Result<Self>
    where
        F: FnMut(&str) + Send + 'static,
    {
        info!(port = %config.port_name, baud = config.baud_rate, "Opening serial link");

        let port = serialport::new(&config.port_name, config.baud_rate)
            .data_bits(DataBits::Eight)
            .stop_bits(StopBits::One)
            .parity(Parity::None)
            .timeout(config.read_timeout)
            .open()
            .map_err(|e| LinkError::unavailable(&config.port_name, &e))?;

        let writer = port
            .try_clone()
            .map_err(|e| LinkError::unavailable(&config.port_name, &e))?;

        let running = Arc::new(AtomicBool::new(true));
        let reader_running = Arc::clone(&running);
        let reader_port = config.port_name.clone();
        let handle = thread::Builder::new()
            .name("doorman-serial-rx".to_string())
            .spawn(move || read_loop(port, reader_running, reader_port, on_line))?;

        debug!(port = %config.port_name, "Serial link ready");

        Ok(Self {
            port_name: config.port_name,
            writer: Mutex::new(writer),
            running,
            reader: Mutex::new(Some(handle)),
        })
    }

    /// Device name this link is bound to.
    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// Whether the reader thread is still being kept alive.
    pub fn is_open(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop the reader thread and release the port.
    ///
    /// Idempotent; later calls return immediately.
    pub fn close(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        info!(port = %self.port_name, "Closing serial link");

        let handle = self
            .reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        // Joining from inside the callback would deadlock the reader thread.
        if let Some(handle) = handle
            && handle.thread().id() != thread::current().id()
        {
            let _ = handle.join();
        }
        debug!(port = %self.port_name, "Serial link closed");
    }
}

impl CommandSink for SerialLink {
    fn send(&self, command: HostCommand) -> Result<()> {
        if !self.running.load(Ordering::SeqCst) {
            warn!(port = %self.port_name, ?command, "Link is closed, dropping command");
            return Ok(());
        }

        let bytes = command.encode();
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writer
            .write_all(&bytes)
            .and_then(|_| writer.flush())
            .map_err(|e| LinkError::write_failed(&self.port_name, e))?;

        trace!(port = %self.port_name, ?command, "Command sent");
        Ok(())
    }
}

impl Drop for SerialLink {
    fn drop(&mut self) {
        if self.is_open() {
            debug!(port = %self.port_name, "SerialLink dropped while open - closing");
            self.close();
        }
    }
}

/// Reader thread body: accumulate bytes, hand complete lines to the
/// callback, exit when the shutdown flag drops or the port dies.
fn read_loop<F>(mut port: Box<dyn SerialPort>, running: Arc<AtomicBool>, port_name: String, mut on_line: F)
where
    F: FnMut(&str) + Send + 'static,
{
    debug!(port = %port_name, "Reader thread started");

    let mut buf = [0u8; 256];
    let mut pending: Vec<u8> = Vec::with_capacity(256);

    while running.load(Ordering::SeqCst) {
        match port.read(&mut buf) {
            Ok(0) => {
                warn!(port = %port_name, "Port closed by peer");
                break;
            }
            Ok(n) => {
                for &byte in &buf[..n] {
                    if byte == b'\n' {
                        {
                            let text = String::from_utf8_lossy(&pending);
                            let line = text.trim();
                            if !line.is_empty() {
                                trace!(port = %port_name, line, "Device line");
                                on_line(line);
                            }
                        }
                        pending.clear();
                    } else {
                        if pending.len() >= MAX_PENDING_LINE {
                            warn!(port = %port_name, "Discarding oversized partial line");
                            pending.clear();
                        }
                        pending.push(byte);
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {}
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => {
                error!(port = %port_name, error = %e, "Read failed, stopping reader");
                break;
            }
        }
    }

    running.store(false, Ordering::SeqCst);
    debug!(port = %port_name, "Reader thread stopped");
}
