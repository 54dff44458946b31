//! CLI behaviour: input validation, then full runs against a mock service.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Nothing listens here, so any network attempt would fail differently.
const UNREACHABLE: &str = "http://127.0.0.1:9";

const CLOUD_UPLOAD: &str = r#"{"uploadId":"up_1","teamId":"team_1","appBinaryId":"bin_1"}"#;

const RUNNING: &str = r#"{"uploadId":"up_1","status":"RUNNING","completed":false,"flows":[]}"#;

fn command(dir: &TempDir, api_url: &str) -> Command {
    let mut cmd = cargo_bin_cmd!("maestro-upload");
    cmd.current_dir(dir.path())
        .env_clear()
        .env("MAESTRO_API_KEY", "test-key")
        .arg("--api-url")
        .arg(api_url)
        .arg("--branch")
        .arg("main");
    cmd
}

fn upload(dir: &TempDir) -> Command {
    command(dir, UNREACHABLE)
}

/// A run against `server` that polls every second and gives up after
/// `timeout_minutes`.
fn upload_to(dir: &TempDir, server: &MockServer, timeout_minutes: f64) -> Command {
    let config = dir.path().join("maestro-upload.toml");
    std::fs::write(
        &config,
        format!("[polling]\ninterval_secs = 1\ntimeout_minutes = {timeout_minutes}\n"),
    )
    .unwrap();

    let mut cmd = command(dir, &server.uri());
    cmd.arg("--app-binary-id").arg("bin_1").arg("--config").arg(config);
    cmd
}

async fn cloud_service(status: ResponseTemplate) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/upload"))
        .respond_with(ResponseTemplate::new(200).set_body_string(CLOUD_UPLOAD))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/upload/up_1/status"))
        .respond_with(status)
        .mount(&server)
        .await;
    server
}

fn failed_completion() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_string(
        r#"{
            "uploadId": "up_1",
            "status": "ERROR",
            "completed": true,
            "flows": [
                {"name": "login", "status": "SUCCESS"},
                {"name": "checkout", "status": "ERROR", "errors": ["Element not found"]},
                {"name": "search", "status": "SUCCESS"}
            ]
        }"#,
    )
}

fn passed_completion(upload_id: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_string(format!(
        r#"{{"uploadId":"{upload_id}","status":"SUCCESS","completed":true,"flows":[{{"name":"login","status":"SUCCESS"}}]}}"#
    ))
}

fn stdout_of(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn with_workspace() -> TempDir {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir(dir.path().join(".maestro")).unwrap();
    std::fs::write(dir.path().join(".maestro/flow.yaml"), "appId: com.example").unwrap();
    dir
}

#[test]
fn test_help() {
    cargo_bin_cmd!("maestro-upload")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--app-file"))
        .stdout(predicate::str::contains("--async"));
}

#[test]
fn test_missing_api_key() {
    let dir = with_workspace();
    cargo_bin_cmd!("maestro-upload")
        .current_dir(dir.path())
        .env_clear()
        .assert()
        .failure()
        .stderr(predicate::str::contains("--api-key"));
}

#[test]
fn test_invalid_env() {
    let dir = with_workspace();
    upload(&dir)
        .arg("--app-binary-id")
        .arg("bin_1")
        .arg("--env")
        .arg("NOVALUE")
        .assert()
        .failure()
        .stdout(predicate::str::contains("Invalid env parameter: NOVALUE"));
}

#[test]
fn test_invalid_tags() {
    let dir = with_workspace();
    upload(&dir)
        .arg("--app-binary-id")
        .arg("bin_1")
        .arg("--include-tags")
        .arg("smoke,,login")
        .assert()
        .failure()
        .stdout(predicate::str::contains("Invalid tag list"));
}

#[test]
fn test_missing_app_file() {
    let dir = with_workspace();
    upload(&dir)
        .arg("--app-file")
        .arg("missing.apk")
        .assert()
        .failure()
        .stdout(predicate::str::contains("File does not exist"));
}

#[test]
fn test_unsupported_app_file() {
    let dir = with_workspace();
    std::fs::write(dir.path().join("notes.txt"), "not an app").unwrap();
    upload(&dir)
        .arg("--app-file")
        .arg("notes.txt")
        .assert()
        .failure()
        .stdout(predicate::str::contains("Unsupported file format"));
}

#[test]
fn test_app_required() {
    let dir = with_workspace();
    upload(&dir)
        .assert()
        .failure()
        .stdout(predicate::str::contains(
            "Either an app file or an app binary id is required",
        ));
}

#[test]
fn test_missing_default_workspace() {
    let dir = TempDir::new().unwrap();
    upload(&dir)
        .arg("--app-binary-id")
        .arg("bin_1")
        .assert()
        .failure()
        .stdout(predicate::str::contains(
            "Default workspace directory does not exist: .maestro/",
        ));
}

#[test]
fn test_error_command_on_actions() {
    let dir = with_workspace();
    upload(&dir)
        .env("GITHUB_ACTIONS", "true")
        .arg("--app-binary-id")
        .arg("bin_1")
        .arg("--env")
        .arg("NOVALUE")
        .assert()
        .failure()
        .stdout(predicate::str::contains("::error::Error running Maestro Cloud Upload Action"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_failed_upload_exits_nonzero() {
    let server = cloud_service(failed_completion()).await;
    let dir = with_workspace();

    let output = upload_to(&dir, &server, 1.0).assert().code(1).get_output().clone();

    let stdout = stdout_of(&output);
    assert!(stdout.contains("[Failed] checkout (Element not found)"), "{}", stdout);
    assert_eq!(stdout.matches("1/3 Flows Failed").count(), 1, "{}", stdout);
    assert!(!stdout.contains("::error::"), "{}", stdout);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_failed_upload_annotates_on_actions() {
    let server = cloud_service(failed_completion()).await;
    let dir = with_workspace();

    upload_to(&dir, &server, 1.0)
        .env("GITHUB_ACTIONS", "true")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("::error::1/3 Flows Failed"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_server_errors_fail_the_run() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/upload"))
        .respond_with(ResponseTemplate::new(200).set_body_string(CLOUD_UPLOAD))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/upload/up_1/status"))
        .respond_with(ResponseTemplate::new(500).set_body_string("maintenance"))
        .expect(4)
        .mount(&server)
        .await;
    let dir = with_workspace();

    let output = upload_to(&dir, &server, 1.0).assert().code(1).get_output().clone();

    let stdout = stdout_of(&output);
    assert!(
        stdout.contains("Request to get status information failed with status code 500: maintenance"),
        "{}",
        stdout
    );
    assert!(
        !stdout.contains("Error running Maestro Cloud Upload Action"),
        "{}",
        stdout
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_timeout_exits_zero() {
    let server = cloud_service(ResponseTemplate::new(200).set_body_string(RUNNING)).await;
    let dir = with_workspace();

    // 0.05 minutes is three seconds
    upload_to(&dir, &server, 0.05)
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Timed out waiting for Upload to complete",
        ));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cloud_outputs_written() {
    let server = cloud_service(passed_completion("up_1")).await;
    let dir = with_workspace();
    let output_file = dir.path().join("github_output");

    upload_to(&dir, &server, 1.0)
        .env("GITHUB_OUTPUT", &output_file)
        .assert()
        .success()
        .stdout(predicate::str::contains("1/1 Flow Passed"));

    let outputs = std::fs::read_to_string(&output_file).unwrap();
    assert!(outputs.contains("MAESTRO_CLOUD_CONSOLE_URL<<"), "{}", outputs);
    assert!(
        outputs.contains("MAESTRO_CLOUD_APP_BINARY_ID<<MAESTRO_UPLOAD_EOF\nbin_1\n"),
        "{}",
        outputs
    );
    assert!(
        outputs.contains("MAESTRO_CLOUD_UPLOAD_STATUS<<MAESTRO_UPLOAD_EOF\nSUCCESS\n"),
        "{}",
        outputs
    );
    assert!(outputs.contains("MAESTRO_CLOUD_FLOW_RESULTS<<"), "{}", outputs);
    assert!(outputs.contains(r#""name":"login""#), "{}", outputs);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_project_outputs_written() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/runMaestroTest"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"uploadId":"up_2","orgId":"org_1","appId":"app_1","appBinaryId":"bin_2"}"#,
        ))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/upload/up_2"))
        .respond_with(passed_completion("up_2"))
        .mount(&server)
        .await;
    let dir = with_workspace();
    let output_file = dir.path().join("github_output");

    upload_to(&dir, &server, 1.0)
        .arg("--project-id")
        .arg("proj_1")
        .env("GITHUB_OUTPUT", &output_file)
        .assert()
        .success();

    let outputs = std::fs::read_to_string(&output_file).unwrap();
    assert!(
        outputs.contains(
            "ROBIN_CONSOLE_URL<<MAESTRO_UPLOAD_EOF\n\
             https://copilot.mobile.dev/project/proj_1/maestro-test/app/app_1/upload/up_2\n"
        ),
        "{}",
        outputs
    );
    assert!(
        outputs.contains("ROBIN_APP_BINARY_ID<<MAESTRO_UPLOAD_EOF\nbin_2\n"),
        "{}",
        outputs
    );
    assert!(!outputs.contains("MAESTRO_CLOUD_CONSOLE_URL"), "{}", outputs);
    assert!(
        outputs.contains("MAESTRO_CLOUD_UPLOAD_STATUS<<MAESTRO_UPLOAD_EOF\nSUCCESS\n"),
        "{}",
        outputs
    );
}
