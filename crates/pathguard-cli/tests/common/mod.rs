//! Shared E2E test helpers for `pathguard` binary tests.

use assert_cmd::cargo::cargo_bin_cmd;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Default timeout for CLI tests.
pub const TIMEOUT_BASIC: Duration = Duration::from_secs(10);

/// Port 1 on loopback: connection refused without waiting.
pub const UNREACHABLE_URL: &str = "http://127.0.0.1:1";

/// Configuration variables that would leak the developer's setup into tests.
const PATHGUARD_VARS: &[&str] = &[
    "PATHGUARD_AGENT_ID",
    "PATHGUARD_AGENT_URL",
    "PATHGUARD_ADMIN_URL",
    "PATHGUARD_CASE_SENSITIVE",
    "PATHGUARD_UNKNOWN_OPERATION",
    "PATHGUARD_SYNC_TIMEOUT_MS",
    "PATHGUARD_CACHE_DIR",
    "PATHGUARD_AUDIT_CAPACITY",
    "RUST_LOG",
    "HTTP_PROXY",
    "HTTPS_PROXY",
    "ALL_PROXY",
    "http_proxy",
    "https_proxy",
    "all_proxy",
];

/// Build a Command isolated in `home`: no global config, no inherited
/// `PATHGUARD_*` variables, project root and cache inside `home`.
pub fn pathguard_cmd(home: &std::path::Path) -> assert_cmd::Command {
    let mut cmd: assert_cmd::Command = cargo_bin_cmd!("pathguard");
    cmd.timeout(TIMEOUT_BASIC);
    for var in PATHGUARD_VARS {
        cmd.env_remove(var);
    }
    cmd.env("HOME", home);
    cmd.current_dir(home);
    cmd.args([
        "--config",
        home.join("global.toml").to_str().expect("valid utf8"),
        "--cache-dir",
        home.join("cache").to_str().expect("valid utf8"),
    ]);
    cmd
}

/// Loopback HTTP server answering every request with one scripted
/// response, recording request targets.
pub struct MockServer {
    base_url: String,
    targets: Arc<Mutex<Vec<String>>>,
}

impl MockServer {
    pub fn always(status: u16, body: &'static [u8]) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock HTTP server");
        let port = listener.local_addr().expect("get mock port").port();
        let targets = Arc::new(Mutex::new(Vec::new()));

        let recorded = Arc::clone(&targets);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let mut stream = match stream {
                    Ok(s) => s,
                    Err(_) => break,
                };
                let Some(target) = read_target(&mut stream) else {
                    continue;
                };
                recorded.lock().expect("targets lock").push(target);

                let head = format!(
                    "HTTP/1.1 {status} Mock\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    body.len()
                );
                let _ = stream.write_all(head.as_bytes());
                let _ = stream.write_all(body);
                let _ = stream.flush();
            }
        });

        Self {
            base_url: format!("http://127.0.0.1:{port}"),
            targets,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Request targets (path and query) received so far.
    pub fn targets(&self) -> Vec<String> {
        self.targets.lock().expect("targets lock").clone()
    }
}

/// Reads one full request and returns its target.
fn read_target(stream: &mut std::net::TcpStream) -> Option<String> {
    let mut raw = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = stream.read(&mut buf).ok()?;
        if n == 0 {
            return None;
        }
        raw.extend_from_slice(&buf[..n]);
        let text = String::from_utf8_lossy(&raw);
        let Some(header_end) = text.find("\r\n\r\n") else {
            continue;
        };
        let headers = &text[..header_end];
        let content_length: usize = headers
            .lines()
            .find(|l| l.to_lowercase().starts_with("content-length:"))
            .and_then(|l| l.split(':').nth(1))
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0);
        if raw.len() < header_end + 4 + content_length {
            continue;
        }
        return headers
            .lines()
            .next()?
            .split(' ')
            .nth(1)
            .map(str::to_string);
    }
}
