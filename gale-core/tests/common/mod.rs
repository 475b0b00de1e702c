//! Minimal in-process HTTP server for integration tests
//!
//! Serves every request on its own thread with a canned status/body, an
//! optional artificial delay, and `Connection: close` so each request is an
//! independent exchange.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct StubBehavior {
    pub status: u16,
    pub body: String,
    pub delay: Duration,
}

impl StubBehavior {
    pub fn ok() -> Self {
        Self {
            status: 200,
            body: "{\"ok\":true}".to_string(),
            delay: Duration::ZERO,
        }
    }

    pub fn status(status: u16, body: &str) -> Self {
        Self {
            status,
            body: body.to_string(),
            delay: Duration::ZERO,
        }
    }

    pub fn delayed(delay: Duration) -> Self {
        Self {
            status: 200,
            body: "slow".to_string(),
            delay,
        }
    }
}

pub struct StubServer {
    addr: SocketAddr,
    stop: Arc<AtomicBool>,
    requests: Arc<AtomicU64>,
}

impl StubServer {
    pub fn start(behavior: StubBehavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind stub server");
        let addr = listener.local_addr().unwrap();
        listener.set_nonblocking(true).unwrap();

        let stop = Arc::new(AtomicBool::new(false));
        let requests = Arc::new(AtomicU64::new(0));

        let accept_stop = stop.clone();
        let accept_requests = requests.clone();
        std::thread::spawn(move || {
            while !accept_stop.load(Ordering::Acquire) {
                match listener.accept() {
                    Ok((stream, _)) => {
                        let behavior = behavior.clone();
                        let requests = accept_requests.clone();
                        std::thread::spawn(move || {
                            requests.fetch_add(1, Ordering::Relaxed);
                            let _ = serve_one(stream, &behavior);
                        });
                    }
                    Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                        std::thread::sleep(Duration::from_millis(2));
                    }
                    Err(_) => break,
                }
            }
        });

        Self {
            addr,
            stop,
            requests,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn request_count(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
    }
}

fn serve_one(mut stream: TcpStream, behavior: &StubBehavior) -> std::io::Result<()> {
    stream.set_read_timeout(Some(Duration::from_secs(60)))?;

    // Read until the end of the header block, then any announced body
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let read = stream.read(&mut chunk)?;
        if read == 0 {
            return Ok(());
        }
        buffer.extend_from_slice(&chunk[..read]);
        if let Some(pos) = find_header_end(&buffer) {
            break pos;
        }
        if buffer.len() > 1 << 20 {
            return Ok(());
        }
    };

    let headers = String::from_utf8_lossy(&buffer[..header_end]).to_string();
    let content_length = headers
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.trim()
                .eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())?
        })
        .unwrap_or(0);

    let mut body_bytes = buffer.len() - header_end - 4;
    while body_bytes < content_length {
        let read = stream.read(&mut chunk)?;
        if read == 0 {
            break;
        }
        body_bytes += read;
    }

    if !behavior.delay.is_zero() {
        std::thread::sleep(behavior.delay);
    }

    let reason = match behavior.status {
        200 => "OK",
        404 => "Not Found",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Status",
    };
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        behavior.status,
        reason,
        behavior.body.len(),
        behavior.body
    );
    stream.write_all(response.as_bytes())?;
    stream.flush()
}

fn find_header_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(4).position(|window| window == b"\r\n\r\n")
}
