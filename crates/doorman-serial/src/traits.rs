//! Transport seams shared by the real link and the test doubles.

use crate::error::Result;
use doorman_protocol::HostCommand;

/// Anything that can deliver a host command to the device end.
///
/// The decision path replies through this seam, so it can run against
/// [`crate::MockLink`] on machines with no reader attached.
pub trait CommandSink: Send + Sync {
    /// Deliver one command frame to the device.
    fn send(&self, command: HostCommand) -> Result<()>;
}
