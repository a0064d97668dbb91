//! Fixture lifecycle tests: precheck failures, resource tracking, and the
//! best-effort teardown guarantees
//!
//! All service endpoints are mocked on one server; the fixture only sees
//! base URLs, so identity, compute, volume and network traffic share it.

use serde_json::json;
use stackprobe::config::Config;
use stackprobe::error::HarnessError;
use stackprobe::fixture::{Fixture, ResourceKind};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(uri: &str) -> Config {
    let mut config = Config::default();
    config.identity.auth_url = uri.to_string();
    config.compute.base_url = uri.to_string();
    config.volume.base_url = uri.to_string();
    config.network.base_url = uri.to_string();
    for (interval, timeout) in [
        (
            &mut config.compute.build_interval_secs,
            &mut config.compute.build_timeout_secs,
        ),
        (
            &mut config.volume.build_interval_secs,
            &mut config.volume.build_timeout_secs,
        ),
        (
            &mut config.network.build_interval_secs,
            &mut config.network.build_timeout_secs,
        ),
    ] {
        *interval = 1;
        *timeout = 1;
    }
    config
}

async fn mount_auth(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/tokens"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access": {
                "token": {"id": "test-token", "tenant": {"id": "tenant-1"}}
            }
        })))
        .mount(server)
        .await;
}

async fn mount_image(server: &MockServer, image_ref: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/images/{}", image_ref)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "image": {"id": image_ref, "status": "ACTIVE"}
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn setup_fails_fast_when_service_unavailable() {
    let mut config = test_config("http://127.0.0.1:1");
    config.volume.available = false;

    let err = Fixture::setup(config).await.unwrap_err();
    match err {
        HarnessError::Precheck(msg) => assert!(msg.contains("volume")),
        other => panic!("expected Precheck, got {:?}", other),
    }
}

#[tokio::test]
async fn setup_fails_fast_when_image_missing() {
    let server = MockServer::start().await;
    mount_auth(&server).await;

    Mock::given(method("GET"))
        .and(path("/images/cirros-0.3.1-x86_64"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = Fixture::setup(test_config(&server.uri())).await.unwrap_err();
    match err {
        HarnessError::Precheck(msg) => assert!(msg.contains("cirros-0.3.1-x86_64")),
        other => panic!("expected Precheck, got {:?}", other),
    }
}

#[tokio::test]
async fn missing_alternate_image_degrades_to_primary() {
    let server = MockServer::start().await;
    mount_auth(&server).await;
    mount_image(&server, "cirros-0.3.1-x86_64").await;

    Mock::given(method("GET"))
        .and(path("/images/alt-image"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let mut config = test_config(&server.uri());
    config.compute.image_ref_alt = Some("alt-image".to_string());

    let fixture = Fixture::setup(config).await.unwrap();
    assert_eq!(fixture.image_ref_alt, fixture.image_ref);
}

#[tokio::test]
async fn present_alternate_image_is_kept() {
    let server = MockServer::start().await;
    mount_auth(&server).await;
    mount_image(&server, "cirros-0.3.1-x86_64").await;
    mount_image(&server, "alt-image").await;

    let mut config = test_config(&server.uri());
    config.compute.image_ref_alt = Some("alt-image".to_string());

    let fixture = Fixture::setup(config).await.unwrap();
    assert_eq!(fixture.image_ref_alt, "alt-image");
}

#[tokio::test]
async fn fixture_tracks_created_resources_in_order() {
    let server = MockServer::start().await;
    mount_auth(&server).await;
    mount_image(&server, "cirros-0.3.1-x86_64").await;

    Mock::given(method("POST"))
        .and(path("/v2.0/networks"))
        .respond_with(ResponseTemplate::new(201)
            .set_body_json(json!({"network": {"id": "n1", "name": "net"}})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v2.0/subnets"))
        .respond_with(ResponseTemplate::new(201)
            .set_body_json(json!({"subnet": {"id": "sub1", "cidr": "10.0.0.0/24"}})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v2.0/ports"))
        .respond_with(ResponseTemplate::new(201)
            .set_body_json(json!({"port": {"id": "p1"}})))
        .mount(&server)
        .await;

    let mut fixture = Fixture::setup(test_config(&server.uri())).await.unwrap();
    fixture.create_network(Some("net")).await.unwrap();
    fixture.create_subnet("n1", "10.0.0.0/24").await.unwrap();
    fixture.create_port("n1").await.unwrap();

    let kinds: Vec<_> = fixture.tracked().iter().map(|h| h.kind).collect();
    assert_eq!(
        kinds,
        vec![ResourceKind::Network, ResourceKind::Subnet, ResourceKind::Port]
    );
}

#[tokio::test]
async fn teardown_attempts_every_delete_despite_failures() {
    let server = MockServer::start().await;
    mount_auth(&server).await;
    mount_image(&server, "cirros-0.3.1-x86_64").await;

    // three networks created in sequence
    for id in ["n1", "n2", "n3"] {
        Mock::given(method("POST"))
            .and(path("/v2.0/networks"))
            .respond_with(ResponseTemplate::new(201)
                .set_body_json(json!({"network": {"id": id, "name": id}})))
            .up_to_n_times(1)
            .mount(&server)
            .await;
    }

    // teardown runs newest-first, so n3 fails before n2/n1 are attempted
    Mock::given(method("DELETE"))
        .and(path("/v2.0/networks/n3"))
        .respond_with(ResponseTemplate::new(500).set_body_string("cannot delete"))
        .expect(1)
        .mount(&server)
        .await;
    for id in ["n1", "n2"] {
        Mock::given(method("DELETE"))
            .and(path(format!("/v2.0/networks/{}", id)))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
    }

    // n3 never disappears; the others are gone on the first poll
    Mock::given(method("GET"))
        .and(path("/v2.0/networks/n3"))
        .respond_with(ResponseTemplate::new(200)
            .set_body_json(json!({"network": {"id": "n3", "status": "ACTIVE"}})))
        .mount(&server)
        .await;
    for id in ["n1", "n2"] {
        Mock::given(method("GET"))
            .and(path(format!("/v2.0/networks/{}", id)))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
    }

    let mut fixture = Fixture::setup(test_config(&server.uri())).await.unwrap();
    for name in ["n1", "n2", "n3"] {
        fixture.create_network(Some(name)).await.unwrap();
    }
    assert_eq!(fixture.tracked().len(), 3);

    fixture.teardown().await;

    // every tracked resource saw a delete attempt, and tracking is drained
    let requests = server.received_requests().await.unwrap();
    let delete_count = requests
        .iter()
        .filter(|r| r.method.to_string() == "DELETE")
        .count();
    assert_eq!(delete_count, 3);
    assert!(fixture.tracked().is_empty());
}

#[tokio::test]
async fn teardown_is_idempotent_on_already_deleted_resources() {
    let server = MockServer::start().await;
    mount_auth(&server).await;
    mount_image(&server, "cirros-0.3.1-x86_64").await;

    Mock::given(method("POST"))
        .and(path("/v2.0/networks"))
        .respond_with(ResponseTemplate::new(201)
            .set_body_json(json!({"network": {"id": "n1", "name": "net"}})))
        .mount(&server)
        .await;

    // the resource vanished before teardown ran
    Mock::given(method("DELETE"))
        .and(path("/v2.0/networks/n1"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2.0/networks/n1"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let mut fixture = Fixture::setup(test_config(&server.uri())).await.unwrap();
    fixture.create_network(Some("net")).await.unwrap();
    fixture.teardown().await;
    assert!(fixture.tracked().is_empty());
}

#[tokio::test]
async fn fixture_create_server_waits_for_active() {
    let server = MockServer::start().await;
    mount_auth(&server).await;
    mount_image(&server, "cirros-0.3.1-x86_64").await;

    Mock::given(method("POST"))
        .and(path("/servers"))
        .respond_with(ResponseTemplate::new(202)
            .set_body_json(json!({"server": {"id": "s1", "status": "BUILD"}})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/servers/s1"))
        .respond_with(ResponseTemplate::new(200)
            .set_body_json(json!({"server": {"id": "s1", "status": "BUILD"}})))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/servers/s1"))
        .respond_with(ResponseTemplate::new(200)
            .set_body_json(json!({"server": {"id": "s1", "status": "ACTIVE"}})))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/servers/s1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/servers/s1"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let mut fixture = Fixture::setup(test_config(&server.uri())).await.unwrap();
    let active = fixture.create_server(None, None, None).await.unwrap();
    assert_eq!(active["status"], "ACTIVE");
    assert_eq!(fixture.tracked()[0].kind, ResourceKind::Server);

    fixture.teardown().await;
    assert!(fixture.tracked().is_empty());
}

#[tokio::test]
async fn isolated_credentials_are_provisioned_and_released_once() {
    let server = MockServer::start().await;
    mount_auth(&server).await;
    mount_image(&server, "cirros-0.3.1-x86_64").await;

    Mock::given(method("POST"))
        .and(path("/tenants"))
        .respond_with(ResponseTemplate::new(200)
            .set_body_json(json!({"tenant": {"id": "tid-1", "enabled": true}})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/users"))
        .respond_with(ResponseTemplate::new(200)
            .set_body_json(json!({"user": {"id": "uid-1", "enabled": true}})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/users/uid-1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/tenants/tid-1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = test_config(&server.uri());
    config.allow_tenant_isolation = true;
    config.identity.admin_username = Some("admin".to_string());
    config.identity.admin_password = Some("password".to_string());

    let mut fixture = Fixture::setup(config).await.unwrap();
    assert!(fixture.credentials.username.starts_with("stackprobe-user-"));

    // no tracked resources; teardown only releases the tenant
    fixture.teardown().await;

    // a second teardown must not release again (expect(1) above would fail)
    fixture.teardown().await;
}

#[tokio::test]
async fn release_attempts_tenant_delete_when_user_delete_fails() {
    let server = MockServer::start().await;
    mount_auth(&server).await;
    mount_image(&server, "cirros-0.3.1-x86_64").await;

    Mock::given(method("POST"))
        .and(path("/tenants"))
        .respond_with(ResponseTemplate::new(200)
            .set_body_json(json!({"tenant": {"id": "tid-1", "enabled": true}})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/users"))
        .respond_with(ResponseTemplate::new(200)
            .set_body_json(json!({"user": {"id": "uid-1", "enabled": true}})))
        .expect(1)
        .mount(&server)
        .await;

    // the user delete fails; the tenant delete must still be attempted
    Mock::given(method("DELETE"))
        .and(path("/users/uid-1"))
        .respond_with(ResponseTemplate::new(500).set_body_string("cannot delete user"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/tenants/tid-1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = test_config(&server.uri());
    config.allow_tenant_isolation = true;
    config.identity.admin_username = Some("admin".to_string());
    config.identity.admin_password = Some("password".to_string());

    let mut fixture = Fixture::setup(config).await.unwrap();
    // teardown logs the failed user delete; the tenant DELETE expect(1)
    // above verifies it was not skipped
    fixture.teardown().await;
}
