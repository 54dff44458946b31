//! HTTP client tests against a mock upload service.

use maestro_upload::client::{ApiClient, ApiError, BackendTarget};
use maestro_upload::model::{FlowStatus, UploadRequest};
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn request() -> UploadRequest {
    UploadRequest {
        benchmark_name: Some("Nightly".into()),
        branch: Some("main".into()),
        agent: "github".into(),
        include_tags: vec!["smoke".into()],
        ..Default::default()
    }
}

fn workspace_zip() -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let zip = dir.path().join("workspace.zip");
    std::fs::write(&zip, b"PK fake zip").unwrap();
    (dir, zip)
}

#[tokio::test]
async fn test_cloud_upload() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v2/upload"))
        .and(header("Authorization", "Bearer secret"))
        .and(body_string_contains("name=\"request\""))
        .and(body_string_contains("name=\"workspace\""))
        .and(body_string_contains("\"benchmarkName\":\"Nightly\""))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"uploadId":"up_1","teamId":"team_1","appBinaryId":"bin_1"}"#,
        ))
        .expect(1)
        .mount(&mock_server)
        .await;

    let (_dir, zip) = workspace_zip();
    let client = ApiClient::new("secret", mock_server.uri(), BackendTarget::cloud()).unwrap();

    let job = client
        .upload(&request(), None, Some(zip.as_path()), None)
        .await
        .unwrap();

    assert_eq!(job.upload_id, "up_1");
    assert_eq!(job.app_binary_id, "bin_1");
    assert_eq!(
        job.console_url,
        "https://console.mobile.dev/uploads/up_1?teamId=team_1&appId=bin_1"
    );
}

#[tokio::test]
async fn test_project_upload() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/runMaestroTest"))
        .and(header("Authorization", "Bearer secret"))
        .and(body_string_contains("\"projectId\":\"proj_1\""))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"uploadId":"up_2","orgId":"org_1","appId":"app_1","appBinaryId":"bin_2"}"#,
        ))
        .expect(1)
        .mount(&mock_server)
        .await;

    let (_dir, zip) = workspace_zip();
    let client =
        ApiClient::new("secret", mock_server.uri(), BackendTarget::project("proj_1")).unwrap();

    let job = client
        .upload(&request(), None, Some(zip.as_path()), None)
        .await
        .unwrap();

    assert_eq!(job.upload_id, "up_2");
    assert_eq!(
        job.console_url,
        "https://copilot.mobile.dev/project/proj_1/maestro-test/app/app_1/upload/up_2"
    );
}

#[tokio::test]
async fn test_upload_rejected() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v2/upload"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let (_dir, zip) = workspace_zip();
    let client = ApiClient::new("secret", mock_server.uri(), BackendTarget::cloud()).unwrap();

    let err = client
        .upload(&request(), None, Some(zip.as_path()), None)
        .await
        .unwrap_err();

    match err {
        ApiError::Transport { status, body, .. } => {
            assert_eq!(status, 500);
            assert_eq!(body, "boom");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_missing_file_sends_nothing() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let client = ApiClient::new("secret", mock_server.uri(), BackendTarget::cloud()).unwrap();

    let err = client
        .upload(&request(), Some(dir.path().join("missing.apk").as_path()), None, None)
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::ReadFile { .. }));
}

#[tokio::test]
async fn test_status_snapshot() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v2/upload/up_1/status"))
        .and(query_param("includeErrors", "true"))
        .and(header("Authorization", "Bearer secret"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{
                "uploadId": "up_1",
                "status": "RUNNING",
                "completed": false,
                "flows": [
                    {"name": "login", "status": "SUCCESS"},
                    {"name": "checkout", "status": "ERROR", "errors": ["Element not found"]},
                    {"name": "search", "status": "CANCELED", "cancellationReason": "INFRA_ERROR"}
                ]
            }"#,
        ))
        .mount(&mock_server)
        .await;

    let client = ApiClient::new("secret", mock_server.uri(), BackendTarget::cloud()).unwrap();
    let snapshot = client.get_status("up_1").await.unwrap();

    assert_eq!(snapshot.status, FlowStatus::Running);
    assert!(!snapshot.completed);
    assert_eq!(snapshot.flows.len(), 3);
    assert_eq!(snapshot.flows[1].first_error(), Some("Element not found"));
}

#[tokio::test]
async fn test_project_status_path() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/upload/up_2"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"uploadId":"up_2","status":"STOPPED","completed":true,"flows":[]}"#,
        ))
        .mount(&mock_server)
        .await;

    let client =
        ApiClient::new("secret", mock_server.uri(), BackendTarget::project("proj_1")).unwrap();
    let snapshot = client.get_status("up_2").await.unwrap();

    assert_eq!(snapshot.status, FlowStatus::Stopped);
    assert!(snapshot.completed);
}

#[tokio::test]
async fn test_status_rate_limited() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v2/upload/up_1/status"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .mount(&mock_server)
        .await;

    let client = ApiClient::new("secret", mock_server.uri(), BackendTarget::cloud()).unwrap();
    let err = client.get_status("up_1").await.unwrap_err();

    assert!(matches!(err, ApiError::StatusQuery { status: 429, .. }));
}
