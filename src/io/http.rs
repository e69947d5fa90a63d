use async_trait::async_trait;
use reqwest::header::{ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE, HeaderMap, RANGE};
use reqwest::{Client, StatusCode};
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{ByteRange, Connector, ReadAt, TransferStats};
use crate::config::FetchConfig;
use crate::error::{Error, Result, TransportError};

/// HTTP Range reader over one remote resource.
///
/// Every [`read_at`](ReadAt::read_at) is exactly one ranged `GET`. The
/// resource length is probed once and cached for the reader's lifetime.
/// Meant for a single extraction flow; share it across tasks only if you
/// add your own synchronization.
pub struct HttpRangeReader {
    client: Client,
    url: String,
    length: OnceCell<u64>,
    cancel: CancellationToken,
    stats: TransferStats,
}

impl HttpRangeReader {
    /// Create a reader. No request is sent until the length is needed.
    pub fn new(
        client: Client,
        url: String,
        cancel: CancellationToken,
        stats: TransferStats,
    ) -> Self {
        Self {
            client,
            url,
            length: OnceCell::new(),
            cancel,
            stats,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Race `fut` against the cancellation token.
    async fn cancellable<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(TransportError::Cancelled.into()),
            res = fut => res,
        }
    }

    /// Find the resource size.
    ///
    /// A `HEAD` advertising `Accept-Ranges: bytes` with a `Content-Length` is
    /// enough. Otherwise a one-byte ranged `GET` must answer `206` with the
    /// total in its `Content-Range`.
    async fn discover_length(&self) -> Result<u64> {
        let resp = self.client.head(&self.url).send().await?;

        if resp.status().is_success() {
            let headers = resp.headers();
            if accepts_byte_ranges(headers) {
                if let Some(size) = header_u64(headers, CONTENT_LENGTH) {
                    debug!(url = %self.url, size, "length from HEAD");
                    return Ok(size);
                }
            }
        }

        let resp = self
            .client
            .get(&self.url)
            .header(RANGE, "bytes=0-0")
            .send()
            .await?;
        let status = resp.status();
        let content_range = resp
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(ContentRange::parse);

        match status {
            StatusCode::PARTIAL_CONTENT | StatusCode::RANGE_NOT_SATISFIABLE => {
                let size = content_range.and_then(|cr| cr.total).ok_or_else(|| {
                    Error::Protocol("range probe did not report the resource length".into())
                })?;
                debug!(url = %self.url, size, "length from range probe");
                Ok(size)
            }
            s if s.is_success() => Err(Error::Protocol(
                "Remote server does not support Range requests".into(),
            )),
            s => Err(TransportError::Status(s.as_u16()).into()),
        }
    }

    async fn fetch(&self, range: ByteRange) -> Result<Vec<u8>> {
        debug!(url = %self.url, start = range.start, end = range.end, "range request");

        let mut resp = self
            .client
            .get(&self.url)
            .header(RANGE, range.header_value())
            .send()
            .await?;

        match resp.status() {
            StatusCode::PARTIAL_CONTENT => {}
            StatusCode::OK => {
                return Err(Error::Protocol(
                    "server ignored the Range header and sent the whole resource".into(),
                ));
            }
            s => return Err(TransportError::Status(s.as_u16()).into()),
        }

        if let Some(cr) = resp
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(ContentRange::parse)
        {
            if let Some((start, _)) = cr.span {
                if start != range.start {
                    return Err(Error::Protocol(format!(
                        "asked for bytes from {} but server answered from {}",
                        range.start, start
                    )));
                }
            }
        }

        let expected = range.len() as usize;
        let mut buf = Vec::with_capacity(expected);

        while let Some(chunk) = resp.chunk().await? {
            let take = chunk.len().min(expected - buf.len());
            buf.extend_from_slice(&chunk[..take]);
            self.stats.add(take as u64);
            if buf.len() == expected {
                break;
            }
        }

        if buf.len() < expected {
            return Err(Error::ShortRead {
                offset: range.start,
                expected: expected as u64,
                received: buf.len() as u64,
            });
        }

        Ok(buf)
    }
}

#[async_trait]
impl ReadAt for HttpRangeReader {
    async fn length(&self) -> Result<u64> {
        self.length
            .get_or_try_init(|| self.cancellable(self.discover_length()))
            .await
            .copied()
    }

    async fn read_at(&self, offset: u64, len: u64) -> Result<Vec<u8>> {
        let total = self.length().await?;
        match ByteRange::for_read(offset, len, total)? {
            Some(range) => self.cancellable(self.fetch(range)).await,
            None => Ok(Vec::new()),
        }
    }
}

/// Hands out a fresh [`HttpRangeReader`] per open attempt, all sharing one
/// client, cancellation token, and transfer counter.
pub struct HttpConnector {
    client: Client,
    url: String,
    cancel: CancellationToken,
    stats: TransferStats,
}

impl HttpConnector {
    pub fn new(
        url: impl Into<String>,
        config: &FetchConfig,
        cancel: CancellationToken,
        stats: TransferStats,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            client,
            url: url.into(),
            cancel,
            stats,
        })
    }
}

#[async_trait]
impl Connector for HttpConnector {
    type Source = HttpRangeReader;

    async fn connect(&self) -> Result<HttpRangeReader> {
        if self.cancel.is_cancelled() {
            return Err(TransportError::Cancelled.into());
        }
        Ok(HttpRangeReader::new(
            self.client.clone(),
            self.url.clone(),
            self.cancel.clone(),
            self.stats.clone(),
        ))
    }
}

fn accepts_byte_ranges(headers: &HeaderMap) -> bool {
    headers
        .get(ACCEPT_RANGES)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("bytes"))
}

fn header_u64(headers: &HeaderMap, name: reqwest::header::HeaderName) -> Option<u64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse().ok())
}

/// Parsed `Content-Range: bytes <first>-<last>/<total>` value.
#[derive(Debug, PartialEq, Eq)]
struct ContentRange {
    span: Option<(u64, u64)>,
    total: Option<u64>,
}

impl ContentRange {
    fn parse(value: &str) -> Option<Self> {
        let rest = value.trim().strip_prefix("bytes")?.trim_start();
        let (span, total) = rest.split_once('/')?;

        let total = match total.trim() {
            "*" => None,
            t => Some(t.parse().ok()?),
        };
        let span = match span.trim() {
            "*" => None,
            s => {
                let (first, last) = s.split_once('-')?;
                Some((first.trim().parse().ok()?, last.trim().parse().ok()?))
            }
        };

        Some(Self { span, total })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_content_range() {
        assert_eq!(
            ContentRange::parse("bytes 0-0/12345"),
            Some(ContentRange {
                span: Some((0, 0)),
                total: Some(12345)
            })
        );
        assert_eq!(
            ContentRange::parse("bytes */4096"),
            Some(ContentRange {
                span: None,
                total: Some(4096)
            })
        );
        assert_eq!(
            ContentRange::parse("bytes 10-19/*"),
            Some(ContentRange {
                span: Some((10, 19)),
                total: None
            })
        );
    }

    #[test]
    fn rejects_malformed_content_range() {
        assert_eq!(ContentRange::parse("items 0-1/2"), None);
        assert_eq!(ContentRange::parse("bytes 0-1"), None);
        assert_eq!(ContentRange::parse("bytes a-b/10"), None);
    }

    #[test]
    fn accept_ranges_detection() {
        let mut headers = HeaderMap::new();
        assert!(!accepts_byte_ranges(&headers));
        headers.insert(ACCEPT_RANGES, "none".parse().unwrap());
        assert!(!accepts_byte_ranges(&headers));
        headers.insert(ACCEPT_RANGES, "bytes".parse().unwrap());
        assert!(accepts_byte_ranges(&headers));
    }

    #[tokio::test]
    async fn cancelled_connector_refuses_to_connect() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let connector = HttpConnector::new(
            "http://127.0.0.1:9/fw.zip",
            &FetchConfig::default(),
            cancel,
            TransferStats::new(),
        )
        .unwrap();

        let err = connector.connect().await.err().unwrap();
        assert!(err.is_cancelled());
    }
}
