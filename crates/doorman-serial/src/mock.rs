//! In-memory link double for exercising the station without hardware.
//!
//! [`mock_link`] returns a connected pair: the [`MockLink`] goes wherever a
//! [`CommandSink`] is expected, and the [`MockLinkHandle`] lets the test
//! observe every command the code under test tried to put on the wire.

use crate::error::Result;
use crate::traits::CommandSink;
use doorman_protocol::HostCommand;
use tokio::sync::mpsc;
use tracing::warn;

/// Commands buffered before the mock starts dropping, mirroring how a real
/// serial line would backpressure.
const MOCK_CHANNEL_CAPACITY: usize = 32;

/// Create a connected mock link and its observation handle.
pub fn mock_link() -> (MockLink, MockLinkHandle) {
    let (tx, rx) = mpsc::channel(MOCK_CHANNEL_CAPACITY);
    (MockLink { tx }, MockLinkHandle { rx })
}

/// The device-facing half: accepts commands and records them.
#[derive(Debug, Clone)]
pub struct MockLink {
    tx: mpsc::Sender<HostCommand>,
}

impl CommandSink for MockLink {
    fn send(&self, command: HostCommand) -> Result<()> {
        if let Err(e) = self.tx.try_send(command) {
            warn!("Mock link dropped command: {e}");
        }
        Ok(())
    }
}

/// The test-facing half: yields commands in the order they were sent.
#[derive(Debug)]
pub struct MockLinkHandle {
    rx: mpsc::Receiver<HostCommand>,
}

impl MockLinkHandle {
    /// Await the next command; `None` once every [`MockLink`] clone is gone.
    pub async fn next_command(&mut self) -> Option<HostCommand> {
        self.rx.recv().await
    }

    /// Pop the next command without waiting.
    pub fn try_next(&mut self) -> Option<HostCommand> {
        self.rx.try_recv().ok()
    }

    /// Drain everything sent so far.
    pub fn drain(&mut self) -> Vec<HostCommand> {
        let mut out = Vec::new();
        while let Ok(command) = self.rx.try_recv() {
            out.push(command);
        }
        out
    }
}
