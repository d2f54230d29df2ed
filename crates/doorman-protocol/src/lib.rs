//! Wire protocol between the station host and the reader firmware.
//!
//! Device lines are parsed into [`DeviceEvent`]s, host replies are encoded
//! from [`HostCommand`]s, and [`LineCodec`] frames both directions for use
//! with `tokio_util` streams.

pub mod codec;
pub mod command;
pub mod event;

pub use codec::{DEFAULT_MAX_LINE_LENGTH, LineCodec};
pub use command::HostCommand;
pub use event::{DeviceEvent, parse_line};
