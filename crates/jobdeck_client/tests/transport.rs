use std::time::Duration;

use jobdeck_client::{
    fetch_job_logs, fetch_job_profile, fetch_job_status, pause_job, ReqwestTransport, Transport,
    TransportSettings,
};
use jobdeck_core::{ApiError, JobStatus, ListParams, TransportFailure};
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn transport_for(server: &MockServer) -> ReqwestTransport {
    ReqwestTransport::new(TransportSettings {
        base_url: format!("{}/api/admin", server.uri()),
        token: Some("Bearer t0k".to_string()),
        request_timeout: Duration::from_millis(300),
        ..TransportSettings::default()
    })
    .unwrap()
}

fn envelope(data: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "code": 0, "msg": "ok", "data": data }))
}

#[tokio::test]
async fn get_unwraps_data_and_sends_the_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/admin/job/list"))
        .and(query_param("page", "1"))
        .and(header("authorization", "Bearer t0k"))
        .respond_with(envelope(json!({ "list": [], "total": 0 })))
        .expect(1)
        .mount(&server)
        .await;

    let query = ListParams::from([("page".to_string(), "1".to_string())]);
    let data = transport_for(&server).get("/job/list", &query).await.unwrap();
    assert_eq!(data, json!({ "list": [], "total": 0 }));
}

#[tokio::test]
async fn non_zero_code_is_a_protocol_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/admin/job/x/status"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "code": 40301, "msg": "forbidden", "data": null })),
        )
        .mount(&server)
        .await;

    let err = fetch_job_status(&transport_for(&server), "x").await.unwrap_err();
    assert_eq!(err, ApiError::protocol("40301", "forbidden"));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn http_error_status_is_a_transport_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let err = fetch_job_status(&transport_for(&server), "x").await.unwrap_err();
    assert!(matches!(
        err,
        ApiError::Transport {
            kind: TransportFailure::HttpStatus(502),
            ..
        }
    ));
}

#[tokio::test]
async fn slow_response_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(envelope(json!({})).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let err = transport_for(&server)
        .get("/job/list", &ListParams::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ApiError::Transport {
            kind: TransportFailure::Timeout,
            ..
        }
    ));
}

#[tokio::test]
async fn post_sends_json_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/admin/job/create"))
        .and(wiremock::matchers::body_json(json!({ "kind": "import" })))
        .respond_with(envelope(json!({ "job_id": "j1" })))
        .expect(1)
        .mount(&server)
        .await;

    let data = transport_for(&server)
        .post("/job/create", &json!({ "kind": "import" }))
        .await
        .unwrap();
    assert_eq!(data["job_id"], "j1");
}

#[tokio::test]
async fn status_and_pause_use_job_paths() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/admin/job/j1/status"))
        .respond_with(envelope(json!({ "status": "running", "percent": 0.25 })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/admin/job/j1/pause"))
        .and(query_param("force", "1"))
        .respond_with(envelope(json!(null)))
        .expect(1)
        .mount(&server)
        .await;

    let transport = transport_for(&server);
    let snapshot = fetch_job_status(&transport, "j1").await.unwrap();
    assert_eq!(snapshot.id, "j1");
    assert_eq!(snapshot.status, JobStatus::Running);
    assert_eq!(snapshot.percent, 0.25);

    pause_job(&transport, "j1").await.unwrap();
}

#[tokio::test]
async fn logs_skip_lines_that_are_not_json() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/admin/job/j1/logs"))
        .and(query_param("page", "1"))
        .and(query_param("page_size", "50"))
        .respond_with(envelope(json!({
            "list": [
                { "id": "l1", "content": "{\"level\":\"info\",\"text\":\"start\"}", "created": "2026-10-01 10:00:00" },
                { "id": "l2", "content": "garbled", "created": "2026-10-01 10:00:01" }
            ],
            "page": 1,
            "page_size": 50,
            "total": 2
        })))
        .mount(&server)
        .await;

    let logs = fetch_job_logs(&transport_for(&server), "j1", 1, 50).await.unwrap();
    assert_eq!(logs.data_source.len(), 1);
    assert_eq!(logs.data_source[0].id, "l1");
    assert_eq!(logs.data_source[0].fields["text"], "start");
    assert_eq!(logs.total, 2);
    assert!(logs.no_more);
}

#[tokio::test]
async fn profile_decodes_output_lines() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/admin/job/j1"))
        .respond_with(envelope(json!({
            "desc": "Import photos",
            "status": "finished",
            "lines": ["{\"step\":1}", "", "{\"step\":2}"],
            "created": "2026-10-01 10:00:00"
        })))
        .mount(&server)
        .await;

    let profile = fetch_job_profile(&transport_for(&server), "j1").await.unwrap();
    assert_eq!(profile.desc, "Import photos");
    assert_eq!(profile.status, JobStatus::Finished);
    assert_eq!(profile.content, vec![json!({ "step": 1 }), json!({ "step": 2 })]);
}
