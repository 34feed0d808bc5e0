// Command dispatch over a real socket.
//
// Each test starts a command server on a loopback port, points it at a fake C layer and a fake
// ISS, and checks the reply stream a client sees: acknowledgements first, exactly one DONE last.

use super::support::{
    acknowledgements, completion, done, iss_ok, settings_text, FakeCLayer, FakeIss, Harness,
    IssStep, ALL_HANDLERS,
};
use liric::network::protocol::{
    Acknowledgement, CommandResult, Completion, Reply,
};

const OVERHEADS: &str = r#"
[coadd]
readout_overhead = "20"

[nudgematic]
overhead = "1500"
"#;

#[tokio::test]
async fn bias_is_acknowledged_before_completion() {
    let c_layer = FakeCLayer::start(vec![("multbias", "0 1 4 c_e_20240101_4_1_1_0.fits")]).await;
    let iss = FakeIss::start(vec![iss_ok()]).await;
    let harness = Harness::start(&settings_text(c_layer.port, iss.port, "", ALL_HANDLERS)).await;

    let replies = harness.send(r#"{"id":"b1","command":{"type":"BIAS"}}"#).await;

    assert!(matches!(
        replies.first(),
        Some(Reply::Acknowledge {
            acknowledgement: Acknowledgement {
                time_to_complete: 61_000
            },
            ..
        })
    ));
    assert!(replies.iter().all(|reply| reply.id() == "b1"));
    let done = completion(&replies);
    assert!(done.successful, "{}", done.error_string);
    assert_eq!(
        done.result,
        Some(CommandResult::Calibration {
            filename: "c_e_20240101_4_1_1_0.fits".to_string()
        })
    );
    assert_eq!(c_layer.received().last().unwrap(), "multbias 1");
}

#[tokio::test]
async fn multrun_relays_iss_acknowledgements() {
    let c_layer = FakeCLayer::start(vec![("multrun", "0 2 15 h_e_20240101_15_2_1_0.fits")]).await;
    let iss = FakeIss::start(vec![
        IssStep::Reply(vec![
            Reply::Acknowledge {
                id: "iss".to_string(),
                acknowledgement: Acknowledgement {
                    time_to_complete: 5_000,
                },
            },
            done("iss", Completion::success(None)),
        ]),
        iss_ok(),
    ])
    .await;
    let harness = Harness::start(&settings_text(
        c_layer.port,
        iss.port,
        r#"mirror_fold_position = "2""#,
        &format!("{OVERHEADS}{ALL_HANDLERS}"),
    ))
    .await;

    let replies = harness
        .send(r#"{"id":"m1","command":{"type":"MULTRUN","exposure_time":1000,"number_exposures":2}}"#)
        .await;

    // 2000 exposing, 20 coadds of the default 100 ms at 20 ms each, two nudgematic moves.
    let acks = acknowledgements(&replies);
    assert_eq!(acks[0], 65_400);
    assert!(acks.contains(&5_000), "ISS acknowledge not relayed: {acks:?}");
    assert_eq!(*acks.last().unwrap(), 65_400);
    assert!(replies.iter().all(|reply| reply.id() == "m1"));

    let done = completion(&replies);
    assert!(done.successful, "{}", done.error_string);
    let Some(CommandResult::Multrun(result)) = &done.result else {
        panic!("expected a multrun result, got {:?}", done.result);
    };
    assert_eq!(result.filename, "h_e_20240101_15_2_1_0.fits");

    let requests = iss.requests();
    assert_eq!(requests[0]["command"]["type"], "MOVE_FOLD");
    assert_eq!(requests[0]["command"]["mirror_position"], 2);
    assert_eq!(requests[1]["command"]["type"], "GET_FITS");
    assert_eq!(c_layer.received().last().unwrap(), "multrun 1000 2 false");
}

#[tokio::test]
async fn largest_multrun_still_acknowledges_and_completes_once() {
    let c_layer = FakeCLayer::start(vec![("multrun", "0 1 16 h_e_20240101_16_1_1_0.fits")]).await;
    let iss = FakeIss::start(vec![iss_ok(), iss_ok()]).await;
    let harness = Harness::start(&settings_text(
        c_layer.port,
        iss.port,
        r#"mirror_fold_position = "2""#,
        &format!("{OVERHEADS}{ALL_HANDLERS}"),
    ))
    .await;

    let replies = harness
        .send(
            r#"{"id":"m2","command":{"type":"MULTRUN","exposure_time":4294967295,"number_exposures":4294967295}}"#,
        )
        .await;

    let acks = acknowledgements(&replies);
    assert_eq!(acks.first(), Some(&u64::MAX));
    let done = completion(&replies);
    assert!(done.successful, "{}", done.error_string);
    assert_eq!(
        c_layer.received().last().unwrap(),
        "multrun 4294967295 4294967295 false"
    );
}

#[tokio::test]
async fn unknown_type_gets_minimum_acknowledge_and_failure() {
    let c_layer = FakeCLayer::start(vec![]).await;
    let harness = Harness::start(&settings_text(c_layer.port, 1, "", ALL_HANDLERS)).await;

    let replies = harness
        .send(r#"{"id":"u1","command":{"type":"TWILIGHT_CALIBRATE"}}"#)
        .await;

    assert_eq!(acknowledgements(&replies), vec![30_000]);
    let done = completion(&replies);
    assert!(!done.successful);
    assert_eq!(done.error_num, 1_900_400);
    assert_eq!(done.error_string, "Unknown Command:TWILIGHT_CALIBRATE");
    assert!(c_layer.received().is_empty());
}

#[tokio::test]
async fn unregistered_type_falls_back_to_unknown_handler() {
    let c_layer = FakeCLayer::start(vec![]).await;
    let harness = Harness::start(&settings_text(
        c_layer.port,
        1,
        "",
        r#"
        [command.implementation]
        0 = "liric::handlers::abort::AbortHandler"
        "#,
    ))
    .await;

    let replies = harness.send(r#"{"id":"b2","command":{"type":"BIAS"}}"#).await;

    let done = completion(&replies);
    assert_eq!(done.error_num, 1_900_400);
    assert_eq!(done.error_string, "Unknown Command:BIAS");
}

#[tokio::test]
async fn malformed_line_is_rejected_with_unknown_id() {
    let c_layer = FakeCLayer::start(vec![]).await;
    let harness = Harness::start(&settings_text(c_layer.port, 1, "", ALL_HANDLERS)).await;

    let replies = harness.send("MULTRUN 1000 2").await;

    assert_eq!(acknowledgements(&replies), vec![30_000]);
    assert!(replies.iter().all(|reply| reply.id() == "unknown"));
    let done = completion(&replies);
    assert_eq!(done.error_num, 1_900_101);
}

#[tokio::test]
async fn null_command_keeps_request_id() {
    let c_layer = FakeCLayer::start(vec![]).await;
    let harness = Harness::start(&settings_text(c_layer.port, 1, "", ALL_HANDLERS)).await;

    let replies = harness.send(r#"{"id":"n1","command":null}"#).await;

    let done = completion(&replies);
    assert_eq!(done.error_num, 1_900_100);
    assert!(replies.iter().all(|reply| reply.id() == "n1"));
}

#[tokio::test]
async fn downstream_failure_completes_with_handler_code() {
    let c_layer = FakeCLayer::start(vec![("multdark", "3 detector not cooled")]).await;
    let iss = FakeIss::start(vec![iss_ok()]).await;
    let harness = Harness::start(&settings_text(c_layer.port, iss.port, "", ALL_HANDLERS)).await;

    let replies = harness
        .send(r#"{"id":"d1","command":{"type":"MULTDARK","exposure_time":2000,"number_exposures":3}}"#)
        .await;

    assert_eq!(acknowledgements(&replies)[0], 66_000);
    let done = completion(&replies);
    assert!(!done.successful);
    assert_eq!(done.error_num, 1_902_700);
    assert!(done.error_string.contains("detector not cooled"));
}
