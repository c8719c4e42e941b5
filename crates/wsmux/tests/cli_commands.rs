#![cfg(feature = "cli")]

use std::net::{TcpListener, TcpStream};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .and_then(|listener| listener.local_addr())
        .expect("ephemeral port should be available")
        .port()
}

fn wait_for_connect(address: &str, timeout: Duration) {
    let start = Instant::now();
    loop {
        if TcpStream::connect(address).is_ok() {
            return;
        }
        if start.elapsed() >= timeout {
            panic!("connect timeout");
        }
        thread::sleep(Duration::from_millis(25));
    }
}

fn spawn_server(address: &str) -> Child {
    let child = Command::new(env!("CARGO_BIN_EXE_wsmux"))
        .arg("--log-level")
        .arg("error")
        .arg("serve")
        .arg(address)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("serve command should start");
    wait_for_connect(address, Duration::from_secs(5));
    child
}

#[test]
fn send_against_echo_server_prints_replies() {
    let address = format!("127.0.0.1:{}", free_port());
    let mut server = spawn_server(&address);

    let output = Command::new(env!("CARGO_BIN_EXE_wsmux"))
        .arg("--log-level")
        .arg("error")
        .arg("--format")
        .arg("json")
        .arg("send")
        .arg(format!("ws://{address}/echo"))
        .arg("--data")
        .arg("hi")
        .arg("--streams")
        .arg("2")
        .arg("--wait")
        .output()
        .expect("send should run");

    let _ = server.kill();
    let _ = server.wait();

    assert!(output.status.success(), "send failed: {output:?}");
    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 2);
    for line in lines {
        assert!(line.contains("\"mode\":\"mux\""));
        assert!(line.contains("\"path\":\"/echo\""));
        assert!(line.contains("\"payload\":\"hi\""));
    }
}

#[test]
fn send_without_server_fails() {
    let address = format!("127.0.0.1:{}", free_port());
    let output = Command::new(env!("CARGO_BIN_EXE_wsmux"))
        .arg("send")
        .arg(format!("ws://{address}/"))
        .arg("--data")
        .arg("hi")
        .output()
        .expect("send should run");

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("connect failed"));
}

#[test]
fn send_with_invalid_json_is_usage_error() {
    let output = Command::new(env!("CARGO_BIN_EXE_wsmux"))
        .arg("send")
        .arg("ws://127.0.0.1:1/")
        .arg("--json")
        .arg("{not json")
        .output()
        .expect("send should run");

    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn version_reports_mux_version() {
    let output = Command::new(env!("CARGO_BIN_EXE_wsmux"))
        .arg("version")
        .arg("--extended")
        .output()
        .expect("version should run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("name: wsmux"));
    assert!(stdout.contains("mux_version: 1.0"));
}
