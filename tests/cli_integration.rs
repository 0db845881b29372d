use serde_json::Value;
use std::fs;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener};
use std::path::Path;
use std::process::{Command, Output};
use std::thread::{self, JoinHandle};

const PROXY_VARS: &[&str] = &[
    "HTTP_PROXY",
    "http_proxy",
    "HTTPS_PROXY",
    "https_proxy",
    "ALL_PROXY",
    "all_proxy",
];

/// Serves exactly one HTTP response and hands back the raw request it saw.
fn spawn_mock_api(status_line: &'static str, body: String) -> (SocketAddr, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind should succeed");
    let addr = listener.local_addr().expect("address should be available");

    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept should succeed");
        let request = read_request(&mut stream);
        let response = format!(
            "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        stream
            .write_all(response.as_bytes())
            .expect("response should be written");
        request
    });

    (addr, handle)
}

fn read_request(stream: &mut impl Read) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let read = stream.read(&mut chunk).expect("request should be readable");
        if read == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..read]);

        let text = String::from_utf8_lossy(&buf);
        if let Some(header_end) = text.find("\r\n\r\n") {
            let content_length = text[..header_end]
                .lines()
                .filter_map(|line| line.split_once(':'))
                .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
                .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= header_end + 4 + content_length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

fn agentcc(home: &Path, context_file: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_agentcc"));
    cmd.env("HOME", home)
        .env("AGENTCC_CONTEXT_FILE", context_file)
        .env("NO_PROXY", "127.0.0.1")
        .env_remove("ANTHROPIC_API_KEY")
        .env_remove("ANTHROPIC_BASE_URL")
        .env_remove("LOG_OUTPUT")
        .env_remove("LOG_FILE_PATH")
        .env_remove("RUST_LOG");
    for var in PROXY_VARS {
        cmd.env_remove(var);
    }
    cmd
}

fn run(cmd: &mut Command) -> Output {
    cmd.output().expect("failed to run agentcc binary")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn no_arguments_prints_usage_and_touches_no_files() {
    let home = tempfile::tempdir().expect("tempdir should be created");
    let context_file = home.path().join("context.json");
    fs::write(&context_file, "[]").expect("fixture should be written");
    let log_path = home.path().join("logs/agentcc.log");

    let output = run(agentcc(home.path(), &context_file)
        .env("LOG_OUTPUT", "file")
        .env("LOG_FILE_PATH", &log_path));

    assert_eq!(output.status.code(), Some(1));
    assert_eq!(
        stdout(&output),
        "Usage: agentcc \"PROMPT_MSG\"\n       agentcc \"/clear\"\n"
    );
    assert_eq!(fs::read_to_string(&context_file).expect("context should remain"), "[]");
    assert!(!log_path.parent().expect("log dir").exists());
}

#[test]
fn clear_deletes_context_and_reports_success() {
    let home = tempfile::tempdir().expect("tempdir should be created");
    let context_file = home.path().join("context.json");
    fs::write(&context_file, r#"[{"role":"user","content":"old"}]"#)
        .expect("fixture should be written");

    let output = run(agentcc(home.path(), &context_file).arg("/clear"));
    assert!(output.status.success(), "clear should succeed");
    assert_eq!(stdout(&output), "Context cleared.\n");
    assert!(!context_file.exists());

    let again = run(agentcc(home.path(), &context_file).arg("/clear"));
    assert!(again.status.success(), "clearing an absent context should succeed");
}

#[test]
fn missing_credential_fails_and_leaves_context_untouched() {
    let home = tempfile::tempdir().expect("tempdir should be created");
    let context_file = home.path().join("context.json");
    let original = "[{\"role\":\"user\",\"content\":\"old\"},\n{\"role\":\"assistant\",\"content\":\"reply\"}]";
    fs::write(&context_file, original).expect("fixture should be written");

    let output = run(agentcc(home.path(), &context_file).arg("hello"));

    assert_eq!(output.status.code(), Some(1));
    assert_eq!(
        stdout(&output),
        "Error: ANTHROPIC_API_KEY environment variable not set.\n"
    );
    assert_eq!(
        fs::read_to_string(&context_file).expect("context should remain"),
        original
    );
}

#[test]
fn successful_turn_prints_reply_and_persists_both_turns() {
    let home = tempfile::tempdir().expect("tempdir should be created");
    let context_file = home.path().join("context.json");
    let (addr, server) = spawn_mock_api(
        "200 OK",
        r#"{"id":"msg_1","type":"message","role":"assistant","content":[{"type":"text","text":"hi there"}]}"#
            .to_string(),
    );

    let output = run(agentcc(home.path(), &context_file)
        .arg("hello")
        .env("ANTHROPIC_API_KEY", "sk-test")
        .env("ANTHROPIC_BASE_URL", format!("http://{addr}")));

    assert!(
        output.status.success(),
        "send should succeed, stdout:\n{}\nstderr:\n{}",
        stdout(&output),
        String::from_utf8_lossy(&output.stderr)
    );
    assert_eq!(stdout(&output), "hi there\n");
    assert_eq!(
        fs::read_to_string(&context_file).expect("context should be written"),
        r#"[{"role":"user","content":"hello"},{"role":"assistant","content":"hi there"}]"#
    );

    let request = server.join().expect("server thread should join");
    let (head, body) = request
        .split_once("\r\n\r\n")
        .expect("request should have a body");
    assert!(head.starts_with("POST /v1/messages "), "unexpected request:\n{head}");
    let head = head.to_ascii_lowercase();
    assert!(head.contains("x-api-key: sk-test"), "unexpected headers:\n{head}");
    assert!(head.contains("anthropic-version: 2023-06-01"), "unexpected headers:\n{head}");

    let body: Value = serde_json::from_str(body).expect("request body should be JSON");
    assert_eq!(body["model"], "claude-3-5-sonnet-20241022");
    assert_eq!(body["max_tokens"], 8096);
    assert_eq!(
        body["messages"],
        serde_json::json!([{"role": "user", "content": "hello"}])
    );
}

#[test]
fn corrupt_context_is_ignored_and_overwritten() {
    let home = tempfile::tempdir().expect("tempdir should be created");
    let context_file = home.path().join("context.json");
    fs::write(&context_file, "not json at all").expect("fixture should be written");
    let (addr, server) = spawn_mock_api(
        "200 OK",
        r#"{"content":[{"type":"text","text":"fresh"}]}"#.to_string(),
    );

    let output = run(agentcc(home.path(), &context_file)
        .arg("hello")
        .env("ANTHROPIC_API_KEY", "sk-test")
        .env("ANTHROPIC_BASE_URL", format!("http://{addr}")));

    assert!(output.status.success(), "send should succeed");
    assert_eq!(stdout(&output), "fresh\n");
    assert_eq!(
        fs::read_to_string(&context_file).expect("context should be written"),
        r#"[{"role":"user","content":"hello"},{"role":"assistant","content":"fresh"}]"#
    );
    server.join().expect("server thread should join");
}

#[test]
fn api_error_is_reported_and_context_not_saved() {
    let home = tempfile::tempdir().expect("tempdir should be created");
    let context_file = home.path().join("context.json");
    let original = r#"[{"role":"user","content":"old"},{"role":"assistant","content":"reply"}]"#;
    fs::write(&context_file, original).expect("fixture should be written");
    let (addr, server) = spawn_mock_api(
        "401 Unauthorized",
        r#"{"type":"error","error":{"type":"authentication_error","message":"invalid x-api-key"}}"#
            .to_string(),
    );

    let output = run(agentcc(home.path(), &context_file)
        .arg("hello")
        .env("ANTHROPIC_API_KEY", "sk-wrong")
        .env("ANTHROPIC_BASE_URL", format!("http://{addr}")));

    assert_eq!(output.status.code(), Some(1));
    let out = stdout(&output);
    assert!(out.starts_with("Error: "), "unexpected stdout:\n{out}");
    assert!(out.contains("invalid x-api-key"), "unexpected stdout:\n{out}");
    assert_eq!(
        fs::read_to_string(&context_file).expect("context should remain"),
        original
    );

    let request = server.join().expect("server thread should join");
    let body: Value = serde_json::from_str(
        request
            .split_once("\r\n\r\n")
            .map(|(_, body)| body)
            .expect("request should have a body"),
    )
    .expect("request body should be JSON");
    assert_eq!(
        body["messages"]
            .as_array()
            .expect("messages should be an array")
            .len(),
        3
    );
}
