/*!
Stub network endpoints for hermetic probe tests

Local stand-ins for the targets NetWatch probes, so tests never depend on
external network access:
- `StubHttpServer`: answers every request with a fixed status, optional delay
- `StubTcpListener`: accepts and counts TCP connections
- `StalledTcpListener`: a port whose accept queue is full, so connects hang
- `closed_port()`: a loopback port with nothing listening

Like a mock client, every endpoint records what it received so tests can
assert on it.
*/

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
}

/// Minimal HTTP/1.1 server replying with one fixed status code
pub struct StubHttpServer {
    addr: SocketAddr,
    status: u16,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    delay: Arc<Mutex<Duration>>,
    task: JoinHandle<()>,
}

impl StubHttpServer {
    /// Bind on an ephemeral loopback port and start serving
    pub async fn start(status: u16) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let requests = Arc::new(Mutex::new(Vec::new()));
        let delay = Arc::new(Mutex::new(Duration::ZERO));

        let task = {
            let requests = requests.clone();
            let delay = delay.clone();
            tokio::spawn(async move {
                loop {
                    let Ok((stream, _)) = listener.accept().await else { break };
                    let requests = requests.clone();
                    let delay = *delay.lock().unwrap();
                    tokio::spawn(async move {
                        if let Err(e) = serve_one(stream, status, delay, requests).await {
                            log::debug!("[STUB] connection error: {}", e);
                        }
                    });
                }
            })
        };

        log::info!("🧪 [STUB] HTTP {} listening on {}", status, addr);
        Ok(Self { addr, status, requests, delay, task })
    }

    /// Delay every response (for timeout tests)
    pub fn with_delay(self, delay: Duration) -> Self {
        *self.delay.lock().unwrap() = delay;
        self
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    /// Requests received so far (for assertions)
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn clear(&self) {
        self.requests.lock().unwrap().clear();
    }
}

impl Drop for StubHttpServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve_one(
    mut stream: TcpStream,
    status: u16,
    delay: Duration,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
) -> Result<()> {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];

    // Read the request head only; the probes never send a body
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut chunk).await?;
        if n == 0 || buf.len() > 16 * 1024 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let head = String::from_utf8_lossy(&buf);
    let mut request_line = head.lines().next().unwrap_or_default().split_whitespace();
    let request = RecordedRequest {
        method: request_line.next().unwrap_or_default().to_string(),
        path: request_line.next().unwrap_or_default().to_string(),
    };
    log::info!("📨 [STUB] {} {}", request.method, request.path);
    requests.lock().unwrap().push(request);

    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let body = format!("stub {}\n", status);
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        reason_phrase(status),
        body.len(),
        body
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await?;
    Ok(())
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        301 => "Moved Permanently",
        404 => "Not Found",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Stub",
    }
}

/// TCP listener that accepts, counts and immediately drops connections
pub struct StubTcpListener {
    port: u16,
    connections: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl StubTcpListener {
    pub async fn start() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        let connections = Arc::new(AtomicUsize::new(0));

        let task = {
            let connections = connections.clone();
            tokio::spawn(async move {
                while let Ok((stream, peer)) = listener.accept().await {
                    connections.fetch_add(1, Ordering::SeqCst);
                    log::info!("🔌 [STUB] TCP connection from {}", peer);
                    drop(stream);
                }
            })
        };

        Ok(Self { port, connections, task })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Poll until at least `count` connections were accepted or `timeout` elapses
    pub async fn wait_for_connections(&self, count: usize, timeout: Duration) -> bool {
        let start = std::time::Instant::now();

        while start.elapsed() < timeout {
            if self.connection_count() >= count {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        log::warn!("⏰ Timeout waiting for {} TCP connections", count);
        false
    }
}

impl Drop for StubTcpListener {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Listener that never accepts and whose accept queue is already full.
///
/// New connection attempts get no SYN-ACK and hang until the caller's own
/// timeout fires (Linux drops SYNs while the accept queue is full).
pub struct StalledTcpListener {
    port: u16,
    _listener: TcpListener,
    _queued: Vec<TcpStream>,
}

impl StalledTcpListener {
    pub async fn start() -> Result<Self> {
        let socket = TcpSocket::new_v4()?;
        socket.bind(SocketAddr::from(([127, 0, 0, 1], 0)))?;
        let listener = socket.listen(1)?;
        let port = listener.local_addr()?.port();

        let mut queued = Vec::new();
        for _ in 0..16 {
            let attempt = TcpStream::connect(("127.0.0.1", port));
            match tokio::time::timeout(Duration::from_millis(200), attempt).await {
                Ok(stream) => queued.push(stream?),
                Err(_) => {
                    log::info!("🧪 [STUB] TCP :{} stalled after {} queued connections", port, queued.len());
                    return Ok(Self { port, _listener: listener, _queued: queued });
                }
            }
        }

        anyhow::bail!("accept queue of port {} never filled", port)
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

/// A loopback port with nothing listening on it
pub async fn closed_port() -> Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();
    drop(listener);
    Ok(port)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stub_http_records_requests() {
        let server = StubHttpServer::start(404).await.unwrap();

        let response = reqwest::get(server.url("/missing")).await.unwrap();
        assert_eq!(response.status().as_u16(), 404);
        assert_eq!(response.text().await.unwrap(), "stub 404\n");

        assert_eq!(
            server.requests(),
            vec![RecordedRequest { method: "GET".into(), path: "/missing".into() }]
        );

        server.clear();
        assert_eq!(server.request_count(), 0);
    }

    #[tokio::test]
    async fn test_stub_tcp_counts_connections() {
        let listener = StubTcpListener::start().await.unwrap();

        for _ in 0..2 {
            let stream = TcpStream::connect(("127.0.0.1", listener.port())).await.unwrap();
            drop(stream);
        }

        assert!(listener.wait_for_connections(2, Duration::from_secs(2)).await);
        assert_eq!(listener.connection_count(), 2);
    }

    #[tokio::test]
    async fn test_stalled_listener_hangs_connects() {
        let listener = StalledTcpListener::start().await.unwrap();

        let attempt = TcpStream::connect(("127.0.0.1", listener.port()));
        assert!(tokio::time::timeout(Duration::from_millis(300), attempt).await.is_err());
    }

    #[tokio::test]
    async fn test_closed_port_refuses() {
        let port = closed_port().await.unwrap();
        let err = TcpStream::connect(("127.0.0.1", port)).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::ConnectionRefused);
    }
}
