mod common;

use std::fs;
use std::process::Command;
use tempfile::TempDir;
use wiremock::MockServer;

/// Run `pdfrag` with `OLLAMA_BASE_URL` set; returns (stdout, stderr, success).
fn run_pdfrag(ollama_url: &str, args: &[&str]) -> (String, String, bool) {
    let output = Command::new(env!("CARGO_BIN_EXE_pdfrag"))
        .args(args)
        .env("OLLAMA_BASE_URL", ollama_url)
        .env_remove("OLLAMA_URL")
        .env("RUST_LOG", "warn")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run pdfrag: {}", e));
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

async fn run_async(ollama_url: String, args: Vec<String>) -> (String, String, bool) {
    tokio::task::spawn_blocking(move || {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        run_pdfrag(&ollama_url, &args)
    })
    .await
    .unwrap()
}

#[test]
fn test_help_lists_commands() {
    let (stdout, _, success) = run_pdfrag("http://127.0.0.1:1", &["--help"]);
    assert!(success);
    for cmd in ["health", "models", "pull", "ask", "chat", "repl", "serve"] {
        assert!(stdout.contains(cmd), "missing {} in help: {}", cmd, stdout);
    }
}

#[test]
fn test_health_unreachable_fails() {
    let (stdout, stderr, success) = run_pdfrag("http://127.0.0.1:1", &["health"]);
    assert!(!success);
    assert!(stdout.contains("disconnected"), "stdout: {}", stdout);
    assert!(stderr.contains("not reachable"), "stderr: {}", stderr);
}

#[test]
fn test_invalid_config_is_reported() {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("pdfrag.toml");
    fs::write(&config_path, "[chunking]\nchunk_size = 200\noverlap = 500\n").unwrap();

    let (_, stderr, success) = run_pdfrag(
        "http://127.0.0.1:1",
        &["--config", config_path.to_str().unwrap(), "health"],
    );
    assert!(!success);
    assert!(stderr.contains("overlap"), "stderr: {}", stderr);
}

#[test]
fn test_ask_rejects_zero_k() {
    let tmp = TempDir::new().unwrap();
    let pdf = tmp.path().join("doc.pdf");
    fs::write(&pdf, common::pdf_with_pages(&[&["Some text"]])).unwrap();

    let (_, stderr, success) = run_pdfrag(
        "http://127.0.0.1:1",
        &["ask", "--pdf", pdf.to_str().unwrap(), "-k", "0", "What is this?"],
    );
    assert!(!success);
    assert!(stderr.contains("invalid value"), "stderr: {}", stderr);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_health_connected() {
    let ollama = MockServer::start().await;
    common::mount_tags(&ollama, &["llama2:latest"]).await;

    let (stdout, stderr, success) = run_async(ollama.uri(), vec!["health".into()]).await;
    assert!(success, "stderr: {}", stderr);
    assert!(stdout.contains("connected"));
    assert!(stdout.contains(&ollama.uri()));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_models_strips_latest_tag() {
    let ollama = MockServer::start().await;
    common::mount_tags(&ollama, &["llama2:latest", "mistral:7b"]).await;

    let (stdout, stderr, success) = run_async(ollama.uri(), vec!["models".into()]).await;
    assert!(success, "stderr: {}", stderr);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines, vec!["llama2", "mistral:7b"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_pull_already_installed() {
    let ollama = MockServer::start().await;
    common::mount_tags(&ollama, &["llama2:latest"]).await;

    let (stdout, stderr, success) =
        run_async(ollama.uri(), vec!["pull".into(), "llama2".into()]).await;
    assert!(success, "stderr: {}", stderr);
    assert!(stdout.contains("already installed"));
}
