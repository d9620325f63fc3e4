//! In-process stub of the detection service HTTP API.
//!
//! Serves canned JSON from shared mutable state so tests can script status
//! transitions, failure modes, and response delays, and records every
//! request for assertions.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub csrf_token: Option<String>,
}

#[derive(Debug)]
pub struct StubState {
    pub status: String,
    pub suitable: u64,
    pub unsuitable: u64,
    /// When true, the counts endpoint answers 500.
    pub fail_counts: bool,
    /// When set, control endpoints answer the application error shape.
    pub control_error: Option<String>,
    /// Delay applied to every control reply.
    pub control_delay: Duration,
    /// Delay applied to the next counts reply only.
    pub delay_next_counts: Option<Duration>,
    pub requests: Vec<RecordedRequest>,
}

impl Default for StubState {
    fn default() -> Self {
        Self {
            status: "stopped".to_string(),
            suitable: 0,
            unsuitable: 0,
            fail_counts: false,
            control_error: None,
            control_delay: Duration::ZERO,
            delay_next_counts: None,
            requests: Vec::new(),
        }
    }
}

pub struct StubService {
    pub addr: SocketAddr,
    state: Arc<Mutex<StubState>>,
    handle: tokio::task::JoinHandle<()>,
}

impl StubService {
    pub async fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind stub listener");
        let addr = listener.local_addr().expect("stub listener addr");
        let state = Arc::new(Mutex::new(StubState::default()));
        let accept_state = state.clone();
        let handle = tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                let state = accept_state.clone();
                tokio::spawn(async move {
                    let _ = handle_conn(&mut socket, &state).await;
                });
            }
        });
        Self {
            addr,
            state,
            handle,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StubState> {
        self.state.lock().expect("stub state")
    }

    pub fn set_status(&self, status: &str, suitable: u64, unsuitable: u64) {
        let mut st = self.lock();
        st.status = status.to_string();
        st.suitable = suitable;
        st.unsuitable = unsuitable;
    }

    pub fn set_control_error(&self, message: &str) {
        self.lock().control_error = Some(message.to_string());
    }

    pub fn set_control_delay(&self, delay: Duration) {
        self.lock().control_delay = delay;
    }

    pub fn set_counts_failure(&self) {
        self.lock().fail_counts = true;
    }

    pub fn delay_next_counts(&self, delay: Duration) {
        self.lock().delay_next_counts = Some(delay);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.lock().requests.clone()
    }

    pub fn request_count(&self) -> usize {
        self.lock().requests.len()
    }

    pub fn count_requests_to(&self, path: &str) -> usize {
        self.lock()
            .requests
            .iter()
            .filter(|r| r.path == path)
            .count()
    }
}

impl Drop for StubService {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn handle_conn(
    socket: &mut TcpStream,
    state: &Arc<Mutex<StubState>>,
) -> std::io::Result<()> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
        if buf.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
        if buf.len() > 16 * 1024 {
            return Ok(());
        }
    }

    let head = String::from_utf8_lossy(&buf);
    let mut lines = head.lines();
    let request_line = lines.next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let path = parts.next().unwrap_or_default().to_string();
    let mut csrf_token = None;
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            if name.eq_ignore_ascii_case("x-csrftoken") {
                csrf_token = Some(value.trim().to_string());
            }
        }
    }

    // The reply body is decided under the lock at arrival time; only the
    // sleep happens outside it.
    let (delay, status_line, body) = {
        let mut st = state.lock().expect("stub state");
        st.requests.push(RecordedRequest {
            method: method.clone(),
            path: path.clone(),
            csrf_token,
        });
        respond(&mut st, &method, &path)
    };
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let response = format!(
        "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    socket.write_all(response.as_bytes()).await?;
    socket.shutdown().await?;
    Ok(())
}

fn respond(st: &mut StubState, method: &str, path: &str) -> (Duration, &'static str, String) {
    match (method, path) {
        ("GET", "/api/detection/get_counts/") => {
            let delay = st.delay_next_counts.take().unwrap_or(Duration::ZERO);
            if st.fail_counts {
                (delay, "500 Internal Server Error", r#"{"detail":"boom"}"#.to_string())
            } else {
                (
                    delay,
                    "200 OK",
                    format!(
                        r#"{{"status":"{}","suitable_count":{},"unsuitable_count":{}}}"#,
                        st.status, st.suitable, st.unsuitable
                    ),
                )
            }
        }
        ("POST", path) => {
            let ack = match path {
                "/api/detection/start/" => "started",
                "/api/detection/pause/" => "paused",
                "/api/detection/resume/" => "resumed",
                "/api/detection/stop/" => "stopped",
                _ => {
                    return (
                        Duration::ZERO,
                        "404 Not Found",
                        r#"{"status":"error","message":"no such endpoint"}"#.to_string(),
                    )
                }
            };
            let body = match &st.control_error {
                Some(message) => format!(r#"{{"status":"error","message":"{message}"}}"#),
                None => format!(r#"{{"status":"{ack}"}}"#),
            };
            (st.control_delay, "200 OK", body)
        }
        _ => (Duration::ZERO, "404 Not Found", "{}".to_string()),
    }
}
