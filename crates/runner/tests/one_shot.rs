//! End-to-end tests for the one-shot runner against small shell stand-ins
//! for the real agent CLIs.

#![cfg(unix)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use progress::{ExecutionRequest, ProgressBus, ProgressEvent};
use providers::{ProviderKind, ProviderSettings, Settings};
use runner::ProcessRunner;

fn fake_cli(dir: &tempfile::TempDir, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.path().join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn settings_for(kind: ProviderKind, script: &PathBuf, timeout: Option<u64>) -> Settings {
    let mut settings = Settings::default();
    settings.providers.insert(
        kind,
        ProviderSettings {
            custom_command: Some(script.display().to_string()),
            timeout_secs: timeout,
            ..Default::default()
        },
    );
    settings
}

#[tokio::test]
async fn exit_zero_resolves_with_parsed_stdout() {
    let dir = tempfile::tempdir().unwrap();
    let script = fake_cli(&dir, "fake-claude", r#"printf 'ok'"#);
    let settings = settings_for(ProviderKind::Claude, &script, None);

    let runner = ProcessRunner::new();
    let request = ExecutionRequest::new(ProviderKind::Claude, "hello");
    let response = runner.execute(&request, &settings, &ProgressBus::new()).await;

    assert_eq!(response.error, None);
    assert_eq!(response.content, "ok");
    assert_eq!(response.provider, ProviderKind::Claude);
}

#[tokio::test]
async fn non_zero_exit_reports_the_code_and_stderr() {
    let dir = tempfile::tempdir().unwrap();
    let script = fake_cli(&dir, "fake-claude", "echo 'boom' >&2\nexit 2");
    let settings = settings_for(ProviderKind::Claude, &script, None);

    let runner = ProcessRunner::new();
    let request = ExecutionRequest::new(ProviderKind::Claude, "hello");
    let response = runner.execute(&request, &settings, &ProgressBus::new()).await;

    let error = response.error.expect("non-zero exit must be an error");
    assert!(error.contains("exit code 2"), "got: {error}");
    assert!(error.contains("boom"), "stderr should be embedded: {error}");
    assert!(response.content.is_empty());
}

#[tokio::test]
async fn spawn_failure_is_distinguished_from_command_failure() {
    let mut settings = Settings::default();
    settings.providers.insert(
        ProviderKind::Claude,
        ProviderSettings {
            custom_command: Some("/nonexistent/bin/agent-xyz".into()),
            ..Default::default()
        },
    );

    let runner = ProcessRunner::new();
    let request = ExecutionRequest::new(ProviderKind::Claude, "hello");
    let response = runner.execute(&request, &settings, &ProgressBus::new()).await;

    let error = response.error.expect("spawn failure must be an error");
    assert!(error.contains("failed to spawn"), "got: {error}");
}

#[tokio::test]
async fn disabled_provider_fails_before_spawning() {
    let mut settings = Settings::default();
    settings.providers.insert(
        ProviderKind::Codex,
        ProviderSettings {
            enabled: false,
            ..Default::default()
        },
    );

    let runner = ProcessRunner::new();
    let request = ExecutionRequest::new(ProviderKind::Codex, "hello");
    let response = runner.execute(&request, &settings, &ProgressBus::new()).await;

    assert!(response.error.unwrap().contains("disabled"));
}

#[tokio::test]
async fn stdin_providers_receive_the_prompt_on_standard_input() {
    let dir = tempfile::tempdir().unwrap();
    // Echo stdin back so the prompt round-trips as (unparseable) content.
    let script = fake_cli(&dir, "fake-gemini", "cat");
    let settings = settings_for(ProviderKind::Gemini, &script, None);

    let runner = ProcessRunner::new();
    let request = ExecutionRequest::new(ProviderKind::Gemini, "prompt over stdin");
    let response = runner.execute(&request, &settings, &ProgressBus::new()).await;

    assert_eq!(response.error, None);
    assert_eq!(response.content, "prompt over stdin");
}

#[tokio::test]
async fn positional_providers_receive_the_prompt_as_the_last_argument() {
    let dir = tempfile::tempdir().unwrap();
    // Print the last argument as a codex text item.
    let script = fake_cli(
        &dir,
        "fake-codex",
        r#"for last in "$@"; do :; done
printf '{"type":"item.completed","item":{"type":"text","text":"%s"}}\n' "$last""#,
    );
    let settings = settings_for(ProviderKind::Codex, &script, None);

    let runner = ProcessRunner::new();
    let request = ExecutionRequest::new(ProviderKind::Codex, "positional prompt");
    let response = runner.execute(&request, &settings, &ProgressBus::new()).await;

    assert_eq!(response.error, None);
    assert_eq!(response.content, "positional prompt");
}

#[tokio::test]
async fn timeout_kills_the_process_and_rejects_promptly() {
    let dir = tempfile::tempdir().unwrap();
    let script = fake_cli(&dir, "fake-claude", "sleep 30");
    let settings = settings_for(ProviderKind::Claude, &script, Some(1));

    let runner = ProcessRunner::new();
    let request = ExecutionRequest::new(ProviderKind::Claude, "hello");
    let started = Instant::now();
    let response = runner.execute(&request, &settings, &ProgressBus::new()).await;

    assert!(response.error.unwrap().contains("timed out after 1 seconds"));
    assert!(
        started.elapsed() < Duration::from_secs(5),
        "timeout must fire promptly, took {:?}",
        started.elapsed()
    );
}

#[tokio::test]
async fn cancel_terminates_the_in_flight_request() {
    let dir = tempfile::tempdir().unwrap();
    let script = fake_cli(&dir, "fake-claude", "sleep 30");
    let settings = settings_for(ProviderKind::Claude, &script, None);

    let runner = std::sync::Arc::new(ProcessRunner::new());
    let request = ExecutionRequest::new(ProviderKind::Claude, "hello");

    let task = {
        let runner = runner.clone();
        let settings = settings.clone();
        tokio::spawn(async move {
            runner
                .execute(&request, &settings, &ProgressBus::new())
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(300)).await;
    runner.cancel();

    let response = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("cancel must settle the pending execution")
        .unwrap();
    assert!(response.error.unwrap().contains("cancelled"));
}

#[tokio::test]
async fn line_oriented_output_streams_cumulative_partial_content() {
    let dir = tempfile::tempdir().unwrap();
    let script = fake_cli(
        &dir,
        "fake-codex",
        r#"printf '{"type":"item.completed","item":{"type":"text","text":"Hello "}}\n'
sleep 0.2
printf '{"type":"item.completed","item":{"type":"text","text":"world"}}\n'"#,
    );
    let settings = settings_for(ProviderKind::Codex, &script, None);

    let bus = ProgressBus::new();
    let mut events = bus.subscribe();
    let runner = ProcessRunner::new();
    let request = ExecutionRequest::new(ProviderKind::Codex, "hi");
    let response = runner.execute(&request, &settings, &bus).await;

    assert_eq!(response.error, None);
    assert_eq!(response.content, "Hello world");

    let mut texts = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let ProgressEvent::Text { content } = event {
            texts.push(content);
        }
    }
    assert_eq!(texts, vec!["Hello ".to_string(), "Hello world".to_string()]);
}

#[tokio::test]
async fn working_directory_is_applied() {
    let dir = tempfile::tempdir().unwrap();
    let script = fake_cli(&dir, "fake-claude", "pwd | tr -d '\\n'");
    let settings = settings_for(ProviderKind::Claude, &script, None);

    let workdir = tempfile::tempdir().unwrap();
    let runner = ProcessRunner::new();
    let request = ExecutionRequest::new(ProviderKind::Claude, "hello")
        .cwd(workdir.path().to_path_buf());
    let response = runner.execute(&request, &settings, &ProgressBus::new()).await;

    assert_eq!(response.error, None);
    let reported = std::fs::canonicalize(response.content.trim()).unwrap();
    let expected = std::fs::canonicalize(workdir.path()).unwrap();
    assert_eq!(reported, expected);
}
