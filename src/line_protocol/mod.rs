//! Line Command Protocol.
//!
//! Single request, single reply text exchanges with the C layer and with the OS-level helper.
//! Each call opens its own socket, writes one command line, reads one reply line and closes.
//! Replies have the form `<status> <payload>`; status `0` is success.

pub mod c_layer;
pub mod client;
pub mod reply;

pub use c_layer::CLayer;
pub use client::LineCommandClient;
pub use reply::{FromReply, LineReply, TemperatureReading, Timestamp};
