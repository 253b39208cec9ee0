//! Loopback HTTP server for adapter tests.
//!
//! Answers each connection with the next scripted response (the last one
//! repeats) and records what the client sent.

use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::thread;

/// One request as received by [`MockServer`].
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    /// Path plus query string, as sent on the request line.
    pub target: String,
    pub body: Vec<u8>,
}

impl Recorded {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("request body is JSON")
    }
}

pub struct MockServer {
    base_url: String,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl MockServer {
    /// Starts a server answering with `responses` as `(status, body)` pairs.
    pub fn start(responses: Vec<(u16, Vec<u8>)>) -> Self {
        assert!(!responses.is_empty(), "script at least one response");
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock HTTP server");
        let port = listener.local_addr().expect("get mock port").port();
        let requests = Arc::new(Mutex::new(Vec::new()));

        let recorded = Arc::clone(&requests);
        thread::spawn(move || {
            for (n, stream) in listener.incoming().enumerate() {
                let mut stream = match stream {
                    Ok(s) => s,
                    Err(_) => break,
                };
                let Some(request) = read_request(&mut stream) else {
                    continue;
                };
                recorded.lock().expect("requests lock").push(request);

                let (status, body) = &responses[n.min(responses.len() - 1)];
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
            requests,
        }
    }

    /// Starts a server that always answers `status` with a JSON `body`.
    pub fn always(status: u16, body: &str) -> Self {
        Self::start(vec![(status, body.as_bytes().to_vec())])
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().expect("requests lock").clone()
    }
}

fn read_request(stream: &mut std::net::TcpStream) -> Option<Recorded> {
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
        let body_start = header_end + 4;
        if raw.len() < body_start + content_length {
            continue;
        }

        let mut request_line = headers.lines().next()?.split(' ');
        return Some(Recorded {
            method: request_line.next()?.to_string(),
            target: request_line.next()?.to_string(),
            body: raw[body_start..body_start + content_length].to_vec(),
        });
    }
}
