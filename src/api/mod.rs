//! HTTP API: live counts, per-source details, MJPEG streams and liveness.
//!
//! Plain HTTP/1.1 over `std::net`, one thread per accepted connection so that
//! long-lived streams never block the stats endpoints. Every response closes
//! the connection.

pub mod stream;

use anyhow::{anyhow, Result};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use url::form_urlencoded;

use crate::lot::LotCounts;
use crate::registry::{SourceRegistry, SourceStatus};
use stream::{StreamGenerator, BOUNDARY, DEFAULT_STREAM_INTERVAL};

const MAX_REQUEST_BYTES: usize = 8192;
const DEFAULT_SOURCE_PARAM: &str = "1";
const STREAM_WRITE_TIMEOUT: Duration = Duration::from_secs(5);
const INVALID_SOURCE_MESSAGE: &str = "Invalid lot number";

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub addr: String,
    /// Pause between MJPEG chunks for each viewer.
    pub stream_interval: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:5000".to_string(),
            stream_interval: DEFAULT_STREAM_INTERVAL,
        }
    }
}

#[derive(Debug)]
pub struct ApiHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ApiHandle {
    /// Stop accepting connections and end all open streams.
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("api server thread panicked"))?;
        }
        Ok(())
    }
}

pub struct ApiServer {
    cfg: ApiConfig,
    registry: Arc<SourceRegistry>,
}

impl ApiServer {
    pub fn new(cfg: ApiConfig, registry: Arc<SourceRegistry>) -> Self {
        Self { cfg, registry }
    }

    pub fn spawn(self) -> Result<ApiHandle> {
        let configured_addr: SocketAddr = self.cfg.addr.parse()?;
        let listener = TcpListener::bind(configured_addr)?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let cfg = self.cfg.clone();
        let registry = self.registry.clone();
        let join = std::thread::Builder::new()
            .name("api-accept".to_string())
            .spawn(move || {
                if let Err(err) = run_api(listener, cfg, registry, shutdown_thread) {
                    log::error!("api stopped: {}", err);
                }
            })?;

        Ok(ApiHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

fn run_api(
    listener: TcpListener,
    cfg: ApiConfig,
    registry: Arc<SourceRegistry>,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, peer)) => {
                let cfg = cfg.clone();
                let registry = registry.clone();
                let shutdown = shutdown.clone();
                let spawned = std::thread::Builder::new()
                    .name("api-conn".to_string())
                    .spawn(move || {
                        if let Err(err) = handle_connection(stream, &cfg, &registry, shutdown) {
                            log::warn!("api request from {} failed: {}", peer, err);
                        }
                    });
                if let Err(err) = spawned {
                    log::error!("api could not spawn connection thread: {}", err);
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct SourceListing<'a> {
    id: &'a str,
    status: SourceStatus,
    total: usize,
    frames_published: u64,
}

fn handle_connection(
    mut stream: TcpStream,
    cfg: &ApiConfig,
    registry: &SourceRegistry,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    stream.set_nonblocking(false)?;
    let request = read_request(&mut stream)?;
    if request.method != "GET" {
        write_json_response(&mut stream, 405, r#"{"error":"method_not_allowed"}"#)?;
        return Ok(());
    }

    match request.path.as_str() {
        "/health" => write_json_response(&mut stream, 200, r#"{"status":"healthy"}"#),
        "/api/parking-data" => {
            let counts: BTreeMap<String, LotCounts> = registry
                .entries()
                .map(|entry| (format!("lot{}", entry.id()), entry.lot().counts()))
                .collect();
            let payload = serde_json::to_vec(&counts)?;
            write_response(&mut stream, 200, "application/json", &payload)
        }
        "/api/parking-details" => {
            let id = request.query_param("lot").unwrap_or(DEFAULT_SOURCE_PARAM);
            match registry.get(id) {
                Some(entry) => {
                    let payload = serde_json::to_vec(&entry.lot().snapshot())?;
                    write_response(&mut stream, 200, "application/json", &payload)
                }
                None => {
                    let payload = serde_json::to_vec(&serde_json::json!({
                        "error": INVALID_SOURCE_MESSAGE
                    }))?;
                    write_response(&mut stream, 400, "application/json", &payload)
                }
            }
        }
        "/api/video-stream" => {
            let id = request.query_param("lot").unwrap_or(DEFAULT_SOURCE_PARAM);
            let Some(entry) = registry.get(id) else {
                return write_response(
                    &mut stream,
                    400,
                    "text/plain; charset=utf-8",
                    INVALID_SOURCE_MESSAGE.as_bytes(),
                );
            };
            let generator = StreamGenerator::new(entry, cfg.stream_interval, shutdown)?;
            stream.set_write_timeout(Some(STREAM_WRITE_TIMEOUT))?;
            write_stream_header(&mut stream)?;
            log::info!("viewer {} attached to source {}", stream.peer_addr()?, id);
            let sent = generator.run(&mut stream);
            log::info!("viewer detached from source {} after {} frames", id, sent);
            Ok(())
        }
        "/api/sources" => {
            let listing: Vec<SourceListing<'_>> = registry
                .entries()
                .map(|entry| SourceListing {
                    id: entry.id(),
                    status: entry.status(),
                    total: entry.lot().capacity(),
                    frames_published: entry.frames().published_count(),
                })
                .collect();
            let payload = serde_json::to_vec(&listing)?;
            write_response(&mut stream, 200, "application/json", &payload)
        }
        _ => write_json_response(&mut stream, 404, r#"{"error":"not_found"}"#),
    }
}

fn read_request(stream: &mut TcpStream) -> Result<HttpRequest> {
    stream.set_read_timeout(Some(Duration::from_secs(2)))?;
    let mut buf = [0u8; 1024];
    let mut data = Vec::new();
    loop {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);
        if data.len() > MAX_REQUEST_BYTES {
            return Err(anyhow!("request too large"));
        }
        if data.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }
    let text = String::from_utf8_lossy(&data);
    let mut lines = text.split("\r\n");
    let request_line = lines.next().ok_or_else(|| anyhow!("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or_else(|| anyhow!("missing method"))?;
    let raw_path = parts.next().ok_or_else(|| anyhow!("missing path"))?;
    let (path, query) = match raw_path.split_once('?') {
        Some((path, query)) => (path, query),
        None => (raw_path, ""),
    };
    Ok(HttpRequest {
        method: method.to_string(),
        path: path.to_string(),
        query: parse_query(query),
    })
}

/// Decodes `%XX` escapes and `+` in keys and values. A repeated key keeps its last value.
fn parse_query(query: &str) -> HashMap<String, String> {
    form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect()
}

fn write_json_response(stream: &mut TcpStream, status: u16, body: &str) -> Result<()> {
    write_response(stream, status, "application/json", body.as_bytes())
}

fn write_response(
    stream: &mut TcpStream,
    status: u16,
    content_type: &str,
    body: &[u8],
) -> Result<()> {
    let status_line = match status {
        200 => "HTTP/1.1 200 OK",
        400 => "HTTP/1.1 400 Bad Request",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let header = format!(
        "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\nCache-Control: no-store\r\nAccess-Control-Allow-Origin: *\r\nConnection: close\r\n\r\n",
        status_line = status_line,
        content_type = content_type,
        len = body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)?;
    Ok(())
}

fn write_stream_header(stream: &mut TcpStream) -> Result<()> {
    let header = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: multipart/x-mixed-replace; boundary={BOUNDARY}\r\nCache-Control: no-cache, no-store, must-revalidate\r\nPragma: no-cache\r\nAccess-Control-Allow-Origin: *\r\nConnection: close\r\n\r\n"
    );
    stream.write_all(header.as_bytes())?;
    Ok(())
}

#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
    query: HashMap<String, String>,
}

impl HttpRequest {
    fn query_param(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_values_are_percent_decoded() {
        let query = parse_query("lot=%31&name=north+gate&raw=a%2Fb");
        assert_eq!(query.get("lot").map(String::as_str), Some("1"));
        assert_eq!(query.get("name").map(String::as_str), Some("north gate"));
        assert_eq!(query.get("raw").map(String::as_str), Some("a/b"));
    }

    #[test]
    fn malformed_escapes_are_kept_literally() {
        let query = parse_query("lot=%zz&%6Cot2=2");
        assert_eq!(query.get("lot").map(String::as_str), Some("%zz"));
        assert_eq!(query.get("lot2").map(String::as_str), Some("2"));
        assert!(parse_query("").is_empty());
    }
}
