// Environment overrides on top of the settings file.
//
// Other suites load settings concurrently, so only keys none of them assert on are overridden.

use super::support::{settings_text, ALL_HANDLERS};
use liric::app::Liric;
use liric::network::protocol::CommandKind;
use serial_test::serial;

#[test]
#[serial]
fn environment_overrides_file_values() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("liric.toml");
    std::fs::write(&path, settings_text(8367, 7383, "", ALL_HANDLERS)).unwrap();

    std::env::set_var("LIRIC_LOGGING__FORMAT", "json");
    std::env::set_var("LIRIC_SERVER_CONNECTION__COMMAND_READ_TIMEOUT_MS", "5000");
    let loaded = Liric::load(&path);
    std::env::remove_var("LIRIC_LOGGING__FORMAT");
    std::env::remove_var("LIRIC_SERVER_CONNECTION__COMMAND_READ_TIMEOUT_MS");

    let (liric, _exit) = loaded.unwrap();
    let settings = liric.settings();
    assert_eq!(settings.logging.format, "json");
    assert_eq!(settings.server_connection.command_read_timeout_ms, Some(5000));
    assert_eq!(settings.c_layer.port_number, 8367);
    assert!(liric.registry().is_registered(CommandKind::Multrun));
}

#[test]
#[serial]
fn missing_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(Liric::load(&dir.path().join("absent.toml")).is_err());
}
