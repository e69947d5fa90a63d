#![allow(dead_code)]

use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use flate2::Compression;
use flate2::write::DeflateEncoder;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Builds small ZIP archives in memory.
#[derive(Default)]
pub struct ZipBuilder {
    data: Vec<u8>,
    central: Vec<u8>,
    count: u16,
}

impl ZipBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stored(self, name: &str, content: &[u8]) -> Self {
        self.add(name, content, 0)
    }

    pub fn deflated(self, name: &str, content: &[u8]) -> Self {
        self.add(name, content, 8)
    }

    /// Entry whose method field is `method` but whose bytes are stored.
    pub fn with_method(self, name: &str, content: &[u8], method: u16) -> Self {
        self.add(name, content, method)
    }

    fn add(mut self, name: &str, content: &[u8], method: u16) -> Self {
        let crc = crc32fast::hash(content);
        let payload = if method == 8 {
            let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(content).unwrap();
            encoder.finish().unwrap()
        } else {
            content.to_vec()
        };
        let offset = self.data.len() as u32;
        // 1980-01-01 00:00
        let (time, date) = (0u16, 0x21u16);

        let lfh = &mut self.data;
        lfh.extend_from_slice(b"PK\x03\x04");
        lfh.extend_from_slice(&20u16.to_le_bytes());
        lfh.extend_from_slice(&0u16.to_le_bytes());
        lfh.extend_from_slice(&method.to_le_bytes());
        lfh.extend_from_slice(&time.to_le_bytes());
        lfh.extend_from_slice(&date.to_le_bytes());
        lfh.extend_from_slice(&crc.to_le_bytes());
        lfh.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        lfh.extend_from_slice(&(content.len() as u32).to_le_bytes());
        lfh.extend_from_slice(&(name.len() as u16).to_le_bytes());
        lfh.extend_from_slice(&0u16.to_le_bytes());
        lfh.extend_from_slice(name.as_bytes());
        lfh.extend_from_slice(&payload);

        let cd = &mut self.central;
        cd.extend_from_slice(b"PK\x01\x02");
        cd.extend_from_slice(&20u16.to_le_bytes());
        cd.extend_from_slice(&20u16.to_le_bytes());
        cd.extend_from_slice(&0u16.to_le_bytes());
        cd.extend_from_slice(&method.to_le_bytes());
        cd.extend_from_slice(&time.to_le_bytes());
        cd.extend_from_slice(&date.to_le_bytes());
        cd.extend_from_slice(&crc.to_le_bytes());
        cd.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        cd.extend_from_slice(&(content.len() as u32).to_le_bytes());
        cd.extend_from_slice(&(name.len() as u16).to_le_bytes());
        cd.extend_from_slice(&0u16.to_le_bytes());
        cd.extend_from_slice(&0u16.to_le_bytes());
        cd.extend_from_slice(&0u16.to_le_bytes());
        cd.extend_from_slice(&0u16.to_le_bytes());
        cd.extend_from_slice(&0u32.to_le_bytes());
        cd.extend_from_slice(&offset.to_le_bytes());
        cd.extend_from_slice(name.as_bytes());

        self.count += 1;
        self
    }

    pub fn finish(self) -> Vec<u8> {
        let cd_offset = self.data.len() as u32;
        let cd_size = self.central.len() as u32;

        let mut out = self.data;
        out.extend_from_slice(&self.central);
        out.extend_from_slice(b"PK\x05\x06");
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&self.count.to_le_bytes());
        out.extend_from_slice(&self.count.to_le_bytes());
        out.extend_from_slice(&cd_size.to_le_bytes());
        out.extend_from_slice(&cd_offset.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out
    }
}

/// The two-entry fixture: `A.txt` = "hello", `B.txt` = "world".
pub fn hello_world_zip() -> Vec<u8> {
    ZipBuilder::new()
        .stored("A.txt", b"hello")
        .deflated("B.txt", b"world")
        .finish()
}

/// How the test server misbehaves.
#[derive(Clone, Default)]
pub struct ServerOptions {
    /// Answer `HEAD` with `Accept-Ranges: bytes`.
    pub head_ranges: bool,
    /// Ignore `Range` and send the full body with `200`.
    pub ignore_ranges: bool,
    /// Drop this many bytes from the end of every ranged response.
    pub short_by: usize,
    /// Accept connections but never answer.
    pub stall: bool,
    /// Answer every request with this status and no body.
    pub status: Option<u16>,
}

pub struct TestServer {
    pub url: String,
    pub requests: Arc<AtomicUsize>,
}

impl TestServer {
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

/// Minimal HTTP/1.1 server over `body`, one request per connection.
pub async fn spawn_server(body: Vec<u8>, options: ServerOptions) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let body = Arc::new(body);
    let requests = Arc::new(AtomicUsize::new(0));

    let counter = requests.clone();
    tokio::spawn(async move {
        while let Ok((sock, _)) = listener.accept().await {
            let body = body.clone();
            let options = options.clone();
            let counter = counter.clone();
            tokio::spawn(async move {
                let _ = handle(sock, &body, &options, &counter).await;
            });
        }
    });

    TestServer {
        url: format!("http://{addr}/firmware.ipsw"),
        requests,
    }
}

async fn handle(
    mut sock: TcpStream,
    body: &[u8],
    options: &ServerOptions,
    counter: &AtomicUsize,
) -> std::io::Result<()> {
    let mut head: Vec<u8> = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = sock.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        head.extend_from_slice(&buf[..n]);
    }
    counter.fetch_add(1, Ordering::SeqCst);

    if options.stall {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        return Ok(());
    }

    let text = String::from_utf8_lossy(&head);
    let mut lines = text.split("\r\n");
    let method = lines
        .next()
        .and_then(|l| l.split_whitespace().next())
        .unwrap_or("")
        .to_string();
    let range = lines.find_map(|line| {
        let (name, value) = line.split_once(':')?;
        name.trim()
            .eq_ignore_ascii_case("range")
            .then(|| value.trim().to_string())
    });

    let total = body.len();
    let (status, extra, payload): (u16, String, &[u8]) = if let Some(code) = options.status {
        (code, String::new(), &[][..])
    } else if method == "HEAD" {
        let accept = if options.head_ranges {
            "Accept-Ranges: bytes\r\n"
        } else {
            ""
        };
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {total}\r\n{accept}Connection: close\r\n\r\n"
        );
        sock.write_all(response.as_bytes()).await?;
        return sock.shutdown().await;
    } else {
        match range.as_deref().and_then(parse_range) {
            Some((start, end)) if !options.ignore_ranges => {
                if start >= total {
                    (416, format!("Content-Range: bytes */{total}\r\n"), &[][..])
                } else {
                    let end = end.min(total - 1);
                    let mut slice = &body[start..=end];
                    let cut = options.short_by.min(slice.len() - 1);
                    slice = &slice[..slice.len() - cut];
                    (
                        206,
                        format!(
                            "Content-Range: bytes {start}-{}/{total}\r\n",
                            start + slice.len() - 1
                        ),
                        slice,
                    )
                }
            }
            _ => (200, String::new(), body),
        }
    };

    let reason = match status {
        200 => "OK",
        206 => "Partial Content",
        404 => "Not Found",
        416 => "Range Not Satisfiable",
        _ => "Error",
    };
    let response = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Length: {}\r\n{extra}Connection: close\r\n\r\n",
        payload.len()
    );
    sock.write_all(response.as_bytes()).await?;
    sock.write_all(payload).await?;
    sock.shutdown().await
}

fn parse_range(value: &str) -> Option<(usize, usize)> {
    let spec = value.strip_prefix("bytes=")?;
    let (start, end) = spec.split_once('-')?;
    Some((start.parse().ok()?, end.parse().ok()?))
}
