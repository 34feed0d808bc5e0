// ABORT arriving on a second connection while a MULTRUN waits on the ISS.

use super::support::{
    acknowledgements, completion, send_line, settings_text, FakeCLayer, FakeIss, Harness,
    IssStep, ALL_HANDLERS,
};

const OVERHEADS: &str = r#"
[coadd]
readout_overhead = "20"

[nudgematic]
overhead = "1500"
"#;

#[tokio::test]
async fn abort_releases_multrun_stalled_on_fold_move() {
    let c_layer = FakeCLayer::start(vec![]).await;
    let iss = FakeIss::start(vec![IssStep::Stall]).await;
    let harness = Harness::start(&settings_text(
        c_layer.port,
        iss.port,
        r#"mirror_fold_position = "1""#,
        &format!("{OVERHEADS}{ALL_HANDLERS}"),
    ))
    .await;

    let addr = harness.addr;
    let multrun = tokio::spawn(async move {
        send_line(
            addr,
            r#"{"id":"m1","command":{"type":"MULTRUN","exposure_time":10000,"number_exposures":5}}"#,
        )
        .await
    });
    iss.next_request().await;
    assert_eq!(
        harness.liric.status().current_command().map(|c| c.id),
        Some("m1".to_string())
    );

    let abort_replies = harness.send(r#"{"id":"a1","command":{"type":"ABORT"}}"#).await;
    assert_eq!(acknowledgements(&abort_replies), vec![60_000]);
    let abort_done = completion(&abort_replies);
    assert!(abort_done.successful, "{}", abort_done.error_string);

    let multrun_replies = multrun.await.unwrap();
    let multrun_done = completion(&multrun_replies);
    assert!(!multrun_done.successful);
    assert_eq!(multrun_done.error_num, 1_901_202);
    assert!(
        multrun_done.error_string.contains("Aborted"),
        "{}",
        multrun_done.error_string
    );

    assert_eq!(c_layer.received(), vec!["abort".to_string()]);
    assert!(harness.liric.status().current_command().is_none());
}

#[tokio::test]
async fn abort_with_nothing_running_still_stops_detector() {
    let c_layer = FakeCLayer::start(vec![]).await;
    let harness = Harness::start(&settings_text(c_layer.port, 1, "", ALL_HANDLERS)).await;

    let replies = harness.send(r#"{"id":"a2","command":{"type":"ABORT"}}"#).await;

    assert!(completion(&replies).successful);
    assert_eq!(c_layer.received(), vec!["abort".to_string()]);
}

#[tokio::test]
async fn refused_abort_leaves_running_command_alone() {
    let c_layer = FakeCLayer::start(vec![("abort", "1 nothing to abort")]).await;
    let iss = FakeIss::start(vec![IssStep::Stall]).await;
    let harness = Harness::start(&settings_text(c_layer.port, iss.port, "", ALL_HANDLERS)).await;

    let addr = harness.addr;
    let bias = tokio::spawn(async move {
        send_line(addr, r#"{"id":"b1","command":{"type":"BIAS"}}"#).await
    });
    iss.next_request().await;

    let abort_replies = harness.send(r#"{"id":"a3","command":{"type":"ABORT"}}"#).await;
    let abort_done = completion(&abort_replies);
    assert_eq!(abort_done.error_num, 1_902_400);

    let running = harness.liric.status().current_command();
    assert_eq!(running.map(|c| c.id), Some("b1".to_string()));
    bias.abort();
}
