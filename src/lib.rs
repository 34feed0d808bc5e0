//! # Liric instrument control front end
//!
//! This crate receives high level instrument commands (CONFIG, MULTRUN, BIAS, DARK, ABORT,
//! GET_STATUS, REBOOT, ...) from the telescope control system, translates each into simple
//! line commands for the hardware-controlling C layer, and relays FITS metadata and focus
//! requests through the ISS.
//!
//! ## Crate Structure
//!
//! - **`app`**: The [`app::Liric`] coordinator: settings, command registry, shared status,
//!   reinitialisation and the deferred process exit used by REBOOT.
//! - **`network`**: The upstream side. `server_actor` accepts connections, `session` runs one
//!   command per connection, `relay` forwards sub-requests to the ISS, `protocol` defines the
//!   JSON messages.
//! - **`line_protocol`**: The downstream side. One command line out, one reply line back, plus
//!   typed wrappers for every C layer command.
//! - **`handlers`**: One [`handlers::CommandHandler`] per command type, built from shared
//!   capabilities (fold move, FITS header assembly, exposure reply parsing).
//! - **`registry`**: Maps command types to handlers from the configured identifier list.
//! - **`status`** and **`abort`**: Process-wide command state and per-command abort flags.
//! - **`config`**, **`error`**, **`logging`**: Settings, the error type and error code table,
//!   and tracing setup.

pub mod abort;
pub mod app;
pub mod config;
pub mod error;
pub mod handlers;
pub mod line_protocol;
pub mod logging;
pub mod network;
pub mod registry;
pub mod status;
