//! Integration test suite modules
//!
//! Every test here runs the real command server on a loopback port against a fake C layer and a
//! fake ISS, covering dispatch, acknowledgement relaying, abort races, REBOOT and settings.

mod abort_race_test;
mod command_dispatch_test;
mod reboot_test;
mod settings_override_test;
mod support;
