//! Volume and snapshot client tests: status polling, deletion waits,
//! attribute merging on create

use serde_json::json;
use std::time::Duration;
use stackprobe::clients::{SnapshotsClient, VolumesClient};
use stackprobe::error::HarnessError;
use stackprobe::wire::WireFormat;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const INTERVAL: Duration = Duration::from_millis(10);
const TIMEOUT: Duration = Duration::from_millis(300);

fn volumes(server: &MockServer, format: WireFormat) -> VolumesClient {
    VolumesClient::new(&server.uri(), "test-token", format, INTERVAL, TIMEOUT).unwrap()
}

fn snapshots(server: &MockServer) -> SnapshotsClient {
    SnapshotsClient::new(
        &server.uri(),
        "test-token",
        WireFormat::Json,
        INTERVAL,
        TIMEOUT,
    )
    .unwrap()
}

#[tokio::test]
async fn create_volume_merges_extra_attributes() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/volumes"))
        .and(body_string_contains("\"size\":1"))
        .and(body_string_contains("\"display_name\":\"vol-given\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "volume": {"id": "v1", "display_name": "vol-given", "size": 1, "status": "creating"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let extra = json!({"display_name": "vol-given"}).as_object().unwrap().clone();
    let volume = volumes(&server, WireFormat::Json)
        .create_volume(1, extra)
        .await
        .unwrap();
    assert_eq!(volume["id"], "v1");
    assert_eq!(volume["size"], 1);
}

#[tokio::test]
async fn create_volume_defaults_display_name() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/volumes"))
        .and(body_string_contains("\"display_name\":\"volume-"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "volume": {"id": "v1", "size": 1, "status": "creating"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    volumes(&server, WireFormat::Json)
        .create_volume(1, serde_json::Map::new())
        .await
        .unwrap();
}

#[tokio::test]
async fn volume_becomes_available_after_polling() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/volumes/v1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "volume": {"id": "v1", "status": "creating"}
        })))
        .up_to_n_times(2)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/volumes/v1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "volume": {"id": "v1", "status": "available"}
        })))
        .mount(&server)
        .await;

    let state = volumes(&server, WireFormat::Json)
        .wait_for_volume_status("v1", "available")
        .await
        .unwrap();
    assert_eq!(state["status"], "available");
}

#[tokio::test]
async fn volume_error_state_short_circuits() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/volumes/v1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "volume": {"id": "v1", "status": "error"}
        })))
        .mount(&server)
        .await;

    let start = std::time::Instant::now();
    let err = volumes(&server, WireFormat::Json)
        .wait_for_volume_status("v1", "available")
        .await
        .unwrap_err();

    match err {
        HarnessError::UnexpectedStatus { status, .. } => assert_eq!(status, "error"),
        other => panic!("expected UnexpectedStatus, got {:?}", other),
    }
    // did not wait out the build timeout
    assert!(start.elapsed() < TIMEOUT);
}

#[tokio::test]
async fn volume_deletion_wait_tolerates_trailing_reads() {
    let server = MockServer::start().await;

    // the service keeps answering for a short while after DELETE
    Mock::given(method("GET"))
        .and(path("/volumes/v1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "volume": {"id": "v1", "status": "deleting"}
        })))
        .up_to_n_times(2)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/volumes/v1"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    volumes(&server, WireFormat::Json)
        .wait_for_deletion("v1")
        .await
        .unwrap();
}

#[tokio::test]
async fn snapshot_create_references_volume() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/snapshots"))
        .and(body_string_contains("\"volume_id\":\"v1\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "snapshot": {"id": "snap1", "volume_id": "v1", "status": "creating"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let snapshot = snapshots(&server)
        .create_snapshot("v1", serde_json::Map::new())
        .await
        .unwrap();
    assert_eq!(snapshot["id"], "snap1");
    assert_eq!(snapshot["volume_id"], "v1");
}

#[tokio::test]
async fn snapshot_error_deleting_state_short_circuits() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/snapshots/snap1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "snapshot": {"id": "snap1", "status": "error_deleting"}
        })))
        .mount(&server)
        .await;

    let err = snapshots(&server)
        .wait_for_snapshot_status("snap1", "available")
        .await
        .unwrap_err();
    assert!(matches!(err, HarnessError::UnexpectedStatus { .. }));
}

#[tokio::test]
async fn volume_listing_with_status_filter() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/volumes/detail"))
        .and(wiremock::matchers::query_param("status", "available"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "volumes": [{"id": "v1", "status": "available", "size": 1}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let listed = volumes(&server, WireFormat::Json)
        .list_volumes_detail(&[("status", "available")])
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["size"], 1);
}
