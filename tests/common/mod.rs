//! Minimal HTTP/1.1 fixtures on a raw `TcpListener`.

#![allow(dead_code)]

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// A request as seen by the fake server.
#[derive(Debug, Clone)]
pub struct Request {
    pub head: String,
    pub body: Vec<u8>,
}

impl Request {
    pub fn request_line(&self) -> &str {
        self.head.lines().next().unwrap_or_default()
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.head.lines().skip(1).find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim()
                .eq_ignore_ascii_case(name)
                .then(|| value.trim())
        })
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("request body is JSON")
    }
}

pub async fn bind() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Should be able to bind to ephemeral port");
    let base = format!("http://{}", listener.local_addr().unwrap());
    (listener, base)
}

/// Read one request, including a `Content-Length` body.
pub async fn read_request(socket: &mut TcpStream) -> Request {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let head_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        let n = socket.read(&mut chunk).await.unwrap();
        assert!(n > 0, "client closed before sending headers");
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let mut request = Request {
        head,
        body: buf[head_end..].to_vec(),
    };

    let length: usize = request
        .header("content-length")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    while request.body.len() < length {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        request.body.extend_from_slice(&chunk[..n]);
    }
    request
}

/// Status line plus headers for an event stream that ends when the socket closes.
pub async fn write_sse_head(socket: &mut TcpStream) {
    socket
        .write_all(
            b"HTTP/1.1 200 OK\r\n\
              Content-Type: text/event-stream\r\n\
              Cache-Control: no-cache\r\n\
              Connection: close\r\n\r\n",
        )
        .await
        .unwrap();
}

pub async fn write_status(socket: &mut TcpStream, status: u16, reason: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        reason,
        body.len(),
        body
    );
    socket.write_all(response.as_bytes()).await.unwrap();
    socket.shutdown().await.ok();
}

/// One `data:` frame carrying a channel publication for `station`.
pub fn publication_frame(station: &str, title: &str, artist: &str) -> String {
    let data = serde_json::json!({
        "channel": format!("station:{}", station),
        "pub": { "data": { "np": now_playing(title, artist) } }
    });
    format!("data: {}\n\n", data)
}

/// The initial `connect` frame replaying the last publication.
pub fn connect_frame(station: &str, title: &str, artist: &str) -> String {
    let mut subs = serde_json::Map::new();
    subs.insert(
        format!("station:{}", station),
        serde_json::json!({
            "publications": [
                { "data": { "np": now_playing(title, artist) } }
            ]
        }),
    );
    let data = serde_json::json!({
        "connect": { "client": "abc", "subs": subs }
    });
    format!("data: {}\n\n", data)
}

pub fn now_playing(title: &str, artist: &str) -> serde_json::Value {
    serde_json::json!({
        "live": { "is_live": false, "streamer_name": "" },
        "now_playing": {
            "elapsed": 12,
            "duration": 225,
            "played_at": 1704110400,
            "song": {
                "title": title,
                "artist": artist,
                "album": "Album",
                "art": "https://spiral.radio/art.jpg"
            }
        }
    })
}

pub const SHORT: Duration = Duration::from_millis(50);
