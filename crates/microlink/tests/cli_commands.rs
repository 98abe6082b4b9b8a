#![cfg(all(unix, feature = "cli"))]

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = PathBuf::from(format!(
        "/tmp/mlcli-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

fn wait_for_socket(path: &Path, timeout: Duration) {
    let start = Instant::now();
    while !path.exists() {
        if start.elapsed() >= timeout {
            panic!("socket never appeared at {}", path.display());
        }
        thread::sleep(Duration::from_millis(25));
    }
}

fn microlink() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_microlink"));
    cmd.arg("--log-level").arg("error");
    cmd
}

#[test]
fn encode_raw_writes_wire_bytes() {
    let output = microlink()
        .arg("--format")
        .arg("raw")
        .arg("encode")
        .arg("--hex")
        .arg("aa ff 01")
        .output()
        .expect("encode should run");

    assert!(output.status.success());
    assert_eq!(
        output.stdout,
        vec![0xFE, 0xFF, 0xFD, 0x03, 0x00, 0x00, 0x00, 0xAA, 0xFF, 0xFF, 0x01, 0x72, 0x50]
    );
}

#[test]
fn encode_json_reports_sizes() {
    let output = microlink()
        .arg("--format")
        .arg("json")
        .arg("encode")
        .output()
        .expect("encode should run");

    assert!(output.status.success());
    let value: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("encode should emit json");
    assert_eq!(value["payload_size"], 0);
    assert_eq!(value["wire_size"], 9);
    assert_eq!(value["wire"], "fe ff fd 00 00 00 00 83 44");
}

#[test]
fn decode_reads_stdin_and_parses_session_header() {
    let encoded = microlink()
        .arg("--format")
        .arg("raw")
        .arg("encode")
        .arg("--data")
        .arg("hello")
        .arg("--session-id")
        .arg("0x4221")
        .arg("--packet-type")
        .arg("log-message")
        .output()
        .expect("encode should run");
    assert!(encoded.status.success());

    let mut child = microlink()
        .arg("--format")
        .arg("json")
        .arg("decode")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .expect("decode should start");
    child
        .stdin
        .take()
        .expect("stdin should be piped")
        .write_all(&encoded.stdout)
        .expect("capture should be written");
    let output = child.wait_with_output().expect("decode should finish");

    assert!(output.status.success());
    let value: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("decode should emit json");
    assert_eq!(value["checksum_failures"], 0);
    assert_eq!(value["packets"][0]["packet_type"], "log_message");
    assert_eq!(value["packets"][0]["session_id"], "0x4221");
    assert_eq!(value["packets"][0]["payload"], "hello");
}

#[test]
fn decode_strict_fails_on_corrupt_capture() {
    let dir = unique_temp_dir("decode-strict");
    let capture = dir.join("capture.bin");
    // Checksum bytes of the empty packet are 83 44; corrupt the last one.
    std::fs::write(&capture, [0xFE, 0xFF, 0xFD, 0x00, 0x00, 0x00, 0x00, 0x83, 0x45])
        .expect("capture should be writable");

    let output = microlink()
        .arg("--format")
        .arg("json")
        .arg("decode")
        .arg("--file")
        .arg(&capture)
        .arg("--strict")
        .output()
        .expect("decode should run");

    assert_eq!(output.status.code(), Some(30));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"checksum_failures\":1"));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn send_against_emulator_echoes_payload() {
    let dir = unique_temp_dir("emulate");
    let sock_path = dir.join("target.sock");

    let mut emulator = microlink()
        .arg("--format")
        .arg("json")
        .arg("emulate")
        .arg(&sock_path)
        .arg("--count")
        .arg("1")
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("emulate should start");

    wait_for_socket(&sock_path, Duration::from_secs(3));

    let output = microlink()
        .arg("--format")
        .arg("json")
        .arg("send")
        .arg(&sock_path)
        .arg("--data")
        .arg("ping")
        .arg("--wait")
        .arg("--wait-timeout")
        .arg("3s")
        .output()
        .expect("send should run");

    assert!(
        output.status.success(),
        "send failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let reply: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("send should emit json");
    assert_eq!(reply["packet_type"], "normal_traffic");
    assert_eq!(reply["payload"], "ping");

    let emulated = emulator.wait_with_output().expect("emulator should exit");
    assert!(emulated.status.success());
    let received: serde_json::Value =
        serde_json::from_slice(&emulated.stdout).expect("emulator should emit json");
    assert_eq!(received["payload"], "ping");
    assert_eq!(received["session_id"], reply["session_id"]);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn send_to_missing_socket_is_a_transport_error() {
    let missing = PathBuf::from(format!(
        "/tmp/mlcli-missing-{}-{}.sock",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));

    let output = microlink()
        .arg("send")
        .arg(&missing)
        .arg("--data")
        .arg("x")
        .output()
        .expect("send should run");

    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn version_prints_package_version() {
    let output = microlink()
        .arg("version")
        .output()
        .expect("version should run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(
        stdout.trim(),
        format!("microlink {}", env!("CARGO_PKG_VERSION"))
    );
}
