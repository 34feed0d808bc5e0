// REBOOT levels end to end: disabled levels, REDATUM reloading settings, SOFTWARE exiting.

use super::support::{acknowledgements, completion, settings_text, FakeCLayer, Harness, ALL_HANDLERS};
use std::time::Duration;

#[tokio::test]
async fn disabled_level_succeeds_and_keeps_serving() {
    let c_layer = FakeCLayer::start(vec![]).await;
    let mut harness = Harness::start(&settings_text(c_layer.port, 1, "", ALL_HANDLERS)).await;

    let replies = harness
        .send(r#"{"id":"r1","command":{"type":"REBOOT","level":3}}"#)
        .await;

    assert_eq!(acknowledgements(&replies), vec![300_000]);
    assert!(completion(&replies).successful);
    assert!(c_layer.received().is_empty());
    assert!(!harness.liric.is_closed());
    assert!(harness.exit.try_recv().is_err());
}

#[tokio::test]
async fn illegal_level_is_rejected() {
    let c_layer = FakeCLayer::start(vec![]).await;
    let harness = Harness::start(&settings_text(c_layer.port, 1, "", ALL_HANDLERS)).await;

    let replies = harness
        .send(r#"{"id":"r2","command":{"type":"REBOOT","level":9}}"#)
        .await;

    let done = completion(&replies);
    assert_eq!(done.error_num, 1_901_400);
    assert_eq!(done.error_string, "Illegal level:9");
}

#[tokio::test]
async fn redatum_reloads_settings_from_file() {
    let c_layer = FakeCLayer::start(vec![]).await;
    let tables = format!("[reboot.enable]\nredatum = true\n{ALL_HANDLERS}");
    let harness = Harness::start(&settings_text(c_layer.port, 1, "", &tables)).await;
    assert_eq!(harness.liric.settings().instrument.name, "Liric");

    let reloaded = format!("[instrument]\nname = \"Raptor\"\n\n{tables}");
    std::fs::write(
        &harness.config_path,
        settings_text(c_layer.port, 1, "", &reloaded),
    )
    .unwrap();

    let replies = harness
        .send(r#"{"id":"r3","command":{"type":"REBOOT","level":1}}"#)
        .await;

    assert!(completion(&replies).successful);
    assert_eq!(harness.liric.settings().instrument.name, "Raptor");
    assert!(!harness.liric.is_closed());
}

#[tokio::test]
async fn software_reboot_exits_with_restart_code_after_reply() {
    let c_layer = FakeCLayer::start(vec![]).await;
    let tables = format!(
        "[reboot.enable]\nsoftware = true\n\n[reboot.acknowledge_time]\nsoftware = \"5000\"\n{ALL_HANDLERS}"
    );
    let mut harness = Harness::start(&settings_text(c_layer.port, 1, "", &tables)).await;

    let replies = harness
        .send(r#"{"id":"r4","command":{"type":"REBOOT","level":2}}"#)
        .await;

    assert_eq!(acknowledgements(&replies), vec![5_000]);
    assert!(completion(&replies).successful);
    assert_eq!(c_layer.received(), vec!["shutdown".to_string()]);
    assert!(harness.liric.is_closed());

    let code = tokio::time::timeout(Duration::from_secs(2), harness.exit.recv())
        .await
        .unwrap();
    assert_eq!(code, Some(0));
}
