//! Serial transport layer for the access station.
//!
//! This crate owns everything that touches the physical port: discovery,
//! the connectivity probe, the line-oriented link itself, and an in-memory
//! double for tests.
//!
//! # Components
//!
//! - **SerialLink**: reader thread plus shared writer over one serial port
//! - **CommandSink**: the seam the decision path replies through
//! - **probe / find_station**: ping candidate ports and identify firmware
//! - **MockLink**: records commands for hardware-free tests
//!
//! # Example
//!
//! ```no_run
//! use doorman_serial::{LinkConfig, SerialLink};
//!
//! # fn example() -> doorman_serial::Result<()> {
//! let link = SerialLink::open(LinkConfig::default(), |line| {
//!     println!("device said: {line}");
//! })?;
//! link.close();
//! # Ok(())
//! # }
//! ```

mod error;
mod link;
mod mock;
mod probe;
mod scanner;
mod traits;

pub use error::{LinkError, Result};
pub use link::{LinkConfig, SerialLink};
pub use mock::{MockLink, MockLinkHandle, mock_link};
pub use probe::{probe, probe_expecting};
pub use scanner::{PortInfo, find_station, list_ports, port_exists};
pub use traits::CommandSink;
