//! Image inputs and decoding

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use crate::config::FetchConfig;
use bytes::{Bytes, BytesMut};
use geolens_core::{Error, Result};
use image::DynamicImage;
use std::path::PathBuf;
use std::time::Duration;

/// Where an image comes from
#[derive(Debug, Clone)]
pub enum ImageSource {
    /// Local file
    Path(PathBuf),
    /// Encoded image bytes (PNG, JPEG, ...)
    Bytes(Bytes),
    /// `http(s)://`, `file://` or base64 `data:` URL
    Url(String),
}

impl ImageSource {
    /// Parse user input: URLs by scheme, anything else as a path
    pub fn parse(input: &str) -> Self {
        let lower = input.to_ascii_lowercase();
        if ["http://", "https://", "file://", "data:"]
            .iter()
            .any(|scheme| lower.starts_with(scheme))
        {
            Self::Url(input.to_string())
        } else {
            Self::Path(PathBuf::from(input))
        }
    }

    /// Fetch the encoded bytes
    pub async fn fetch(&self, fetcher: &Fetcher) -> Result<Bytes> {
        match self {
            Self::Path(path) => read_file(path).await,
            Self::Bytes(bytes) => Ok(bytes.clone()),
            Self::Url(url) => fetcher.fetch_url(url).await,
        }
    }

    /// Fetch and decode into pixels
    pub async fn decode(&self, fetcher: &Fetcher) -> Result<DynamicImage> {
        let bytes = self.fetch(fetcher).await?;
        if bytes.is_empty() {
            return Err(Error::decode("empty image"));
        }
        tokio::task::spawn_blocking(move || {
            image::load_from_memory(&bytes).map_err(|e| Error::decode(e.to_string()))
        })
        .await
        .map_err(|e| Error::decode(format!("decode task failed: {}", e)))?
    }
}

impl From<PathBuf> for ImageSource {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl From<Bytes> for ImageSource {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<Vec<u8>> for ImageSource {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(bytes))
    }
}

async fn read_file(path: &std::path::Path) -> Result<Bytes> {
    tokio::fs::read(path)
        .await
        .map(Bytes::from)
        .map_err(|e| Error::decode(format!("{}: {}", path.display(), e)))
}

/// Shared HTTP client for URL sources, bounded in time and size
///
/// Every failure, including an oversized body or a missed deadline, is an
/// [`Error::ImageDecode`].
#[derive(Clone)]
pub struct Fetcher {
    client: std::result::Result<reqwest::Client, String>,
    timeout: Duration,
    max_bytes: usize,
}

impl Fetcher {
    pub fn new(config: &FetchConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| e.to_string());
        if let Err(e) = &client {
            tracing::warn!(error = %e, "HTTP client unavailable, URL images will be rejected");
        }
        Self {
            client,
            timeout: config.timeout(),
            max_bytes: config.max_bytes,
        }
    }

    /// Use a preconfigured client; the deadline and size cap still apply
    pub fn with_client(client: reqwest::Client, config: &FetchConfig) -> Self {
        Self {
            client: Ok(client),
            timeout: config.timeout(),
            max_bytes: config.max_bytes,
        }
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    async fn fetch_url(&self, url: &str) -> Result<Bytes> {
        if let Some(rest) = strip_prefix_ignore_case(url, "data:") {
            return decode_data_url(rest);
        }
        if let Some(rest) = strip_prefix_ignore_case(url, "file://") {
            return read_file(std::path::Path::new(rest)).await;
        }

        match tokio::time::timeout(self.timeout, self.fetch_http(url)).await {
            Ok(result) => result,
            Err(_) => Err(Error::decode(format!(
                "fetching {} timed out after {:?}",
                url, self.timeout
            ))),
        }
    }

    async fn fetch_http(&self, url: &str) -> Result<Bytes> {
        let client = self
            .client
            .as_ref()
            .map_err(|e| Error::decode(format!("http client unavailable: {}", e)))?;

        let mut response = client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::decode(format!("failed to fetch {}: {}", url, e)))?;

        let declared = response.content_length();
        if let Some(len) = declared {
            if len > self.max_bytes as u64 {
                return Err(self.too_large(url));
            }
        }

        let capacity = declared.map_or(0, |len| len as usize);
        let mut body = BytesMut::with_capacity(capacity);
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| Error::decode(format!("failed to read {}: {}", url, e)))?
        {
            if body.len() + chunk.len() > self.max_bytes {
                return Err(self.too_large(url));
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body.freeze())
    }

    fn too_large(&self, url: &str) -> Error {
        Error::decode(format!(
            "{} exceeds the {} byte image limit",
            url, self.max_bytes
        ))
    }
}

impl Default for Fetcher {
    fn default() -> Self {
        Self::new(&FetchConfig::default())
    }
}

impl std::fmt::Debug for Fetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fetcher")
            .field("timeout", &self.timeout)
            .field("max_bytes", &self.max_bytes)
            .field("client", &self.client.is_ok())
            .finish()
    }
}

/// Decode the part of a data URL after `data:`
fn decode_data_url(rest: &str) -> Result<Bytes> {
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| Error::decode("malformed data URL"))?;
    if !meta.ends_with(";base64") {
        return Err(Error::decode("data URL must be base64 encoded"));
    }
    decode_base64(payload)
}

/// Decode a base64 payload or a full `data:` URL
pub fn decode_base64(input: &str) -> Result<Bytes> {
    let input = input.trim();
    if let Some(rest) = strip_prefix_ignore_case(input, "data:") {
        return decode_data_url(rest);
    }
    STANDARD
        .decode(input)
        .map(Bytes::from)
        .map_err(|e| Error::decode(format!("invalid base64: {}", e)))
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    s.get(..prefix.len())
        .filter(|head| head.eq_ignore_ascii_case(prefix))
        .map(|_| &s[prefix.len()..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn png() -> Vec<u8> {
        let img = RgbImage::from_pixel(8, 8, Rgb([150, 90, 50]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    fn fetcher(timeout_ms: u64, max_bytes: usize) -> Fetcher {
        let client = reqwest::Client::builder().no_proxy().build().unwrap();
        Fetcher::with_client(client, &FetchConfig { timeout_ms, max_bytes })
    }

    /// Serve one raw HTTP response, after `delay`
    async fn serve_once(response: Vec<u8>, delay: Duration) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 2048];
            let _ = stream.read(&mut request).await;
            tokio::time::sleep(delay).await;
            let _ = stream.write_all(&response).await;
            let _ = stream.shutdown().await;
        });
        format!("http://{}/photo.png", addr)
    }

    fn http_response(headers: &str, body: &[u8]) -> Vec<u8> {
        let mut response = format!("HTTP/1.1 200 OK\r\n{}\r\n", headers).into_bytes();
        response.extend_from_slice(body);
        response
    }

    #[test]
    fn test_parse() {
        assert!(matches!(ImageSource::parse("https://x/y.jpg"), ImageSource::Url(_)));
        assert!(matches!(ImageSource::parse("DATA:image/png;base64,AA=="), ImageSource::Url(_)));
        assert!(matches!(ImageSource::parse("photos/a.jpg"), ImageSource::Path(_)));
    }

    #[tokio::test]
    async fn test_decode_bytes() {
        let img = ImageSource::from(png()).decode(&Fetcher::default()).await.unwrap();
        assert_eq!((img.width(), img.height()), (8, 8));
    }

    #[tokio::test]
    async fn test_decode_data_url() {
        let url = format!("data:image/png;base64,{}", STANDARD.encode(png()));
        let img = ImageSource::Url(url).decode(&Fetcher::default()).await.unwrap();
        assert_eq!(img.width(), 8);
    }

    #[tokio::test]
    async fn test_decode_file_url() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("a.png");
        std::fs::write(&path, png()).unwrap();

        let img = ImageSource::Url(format!("file://{}", path.display()))
            .decode(&Fetcher::default())
            .await
            .unwrap();
        assert_eq!(img.height(), 8);
    }

    #[tokio::test]
    async fn test_garbage_is_decode_error() {
        let fetcher = Fetcher::default();
        let err = ImageSource::from(b"not an image".to_vec())
            .decode(&fetcher)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ImageDecode(_)));

        let err = ImageSource::Bytes(Bytes::new()).decode(&fetcher).await.unwrap_err();
        assert!(matches!(err, Error::ImageDecode(_)));

        let err = ImageSource::Path(PathBuf::from("/nonexistent/a.png"))
            .decode(&fetcher)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ImageDecode(_)));
    }

    #[test]
    fn test_decode_base64_variants() {
        assert_eq!(decode_base64("aGk=").unwrap(), Bytes::from_static(b"hi"));
        assert_eq!(
            decode_base64("data:text/plain;base64,aGk=").unwrap(),
            Bytes::from_static(b"hi")
        );
        assert!(decode_base64("data:text/plain,hi").is_err());
        assert!(decode_base64("!!!").is_err());
    }

    #[tokio::test]
    async fn test_http_image_within_limit() {
        let body = png();
        let headers = format!("Content-Length: {}\r\nConnection: close\r\n", body.len());
        let url = serve_once(http_response(&headers, &body), Duration::ZERO).await;

        let img = ImageSource::Url(url)
            .decode(&fetcher(2_000, 64 * 1024))
            .await
            .unwrap();
        assert_eq!(img.width(), 8);
    }

    #[tokio::test]
    async fn test_declared_oversized_body_is_rejected() {
        let body = vec![0u8; 4096];
        let url = serve_once(
            http_response("Content-Length: 4096\r\nConnection: close\r\n", &body),
            Duration::ZERO,
        )
        .await;

        let err = ImageSource::Url(url)
            .fetch(&fetcher(2_000, 1024))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ImageDecode(_)));
        assert!(err.to_string().contains("1024 byte image limit"));
    }

    #[tokio::test]
    async fn test_undeclared_oversized_body_is_capped() {
        // no Content-Length: body runs until the connection closes
        let body = vec![0u8; 8192];
        let url = serve_once(http_response("Connection: close\r\n", &body), Duration::ZERO).await;

        let err = ImageSource::Url(url)
            .fetch(&fetcher(2_000, 1024))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ImageDecode(_)));
        assert!(err.to_string().contains("image limit"));
    }

    #[tokio::test]
    async fn test_slow_host_times_out() {
        let body = png();
        let headers = format!("Content-Length: {}\r\nConnection: close\r\n", body.len());
        let url = serve_once(http_response(&headers, &body), Duration::from_secs(5)).await;

        let started = std::time::Instant::now();
        let err = ImageSource::Url(url)
            .decode(&fetcher(100, 64 * 1024))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ImageDecode(_)));
        assert!(started.elapsed() < Duration::from_secs(4));
    }
}
