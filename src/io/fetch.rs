use anyhow::{Context, Result, anyhow};
use futures::StreamExt;
use reqwest::Client;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use url::Url;

use super::uri::SourceUri;
use crate::config::FETCH_CONNECT_TIMEOUT;

/// Downloads a source file to local disk.
///
/// The body is written to `<dest>.part` and renamed over `dest` only once the
/// whole payload is on disk, so `dest` never holds a partial download. The
/// bytes are saved exactly as served; no decompression happens here.
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(FETCH_CONNECT_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self::with_client(client))
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Fetch `source` into `dest`, replacing any existing file. Returns the
    /// number of bytes written.
    pub async fn fetch(&self, source: &SourceUri, dest: &Path) -> Result<u64> {
        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let part = part_path(dest);
        info!(source = %source, dest = %dest.display(), "fetching source file");

        match self.fetch_to(source, &part, dest).await {
            Ok(bytes) => {
                info!(dest = %dest.display(), bytes, "fetch complete");
                Ok(bytes)
            }
            Err(e) => {
                if let Err(remove_err) = fs::remove_file(&part).await {
                    if remove_err.kind() != std::io::ErrorKind::NotFound {
                        warn!(path = %part.display(), "failed to remove partial download: {}", remove_err);
                    }
                }
                Err(e)
            }
        }
    }

    async fn fetch_to(&self, source: &SourceUri, part: &Path, dest: &Path) -> Result<u64> {
        let bytes = match source {
            SourceUri::Http(url) => self.download(url, part).await?,
            SourceUri::Local(path) => fs::copy(path, part)
                .await
                .with_context(|| format!("Failed to copy {}", path.display()))?,
        };

        fs::rename(part, dest)
            .await
            .with_context(|| format!("Failed to move download into place at {}", dest.display()))?;
        Ok(bytes)
    }

    async fn download(&self, url: &Url, part: &Path) -> Result<u64> {
        let resp = self
            .client
            .get(url.clone())
            .send()
            .await
            .context("HTTP request failed")?
            .error_for_status()?;

        let expected = resp.content_length();
        debug!(url = %url, content_length = ?expected, "response received");

        let mut file = fs::File::create(part)
            .await
            .with_context(|| format!("Failed to create {}", part.display()))?;

        let mut written = 0u64;
        let mut body = resp.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.context("Failed to read response body")?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        file.sync_all().await?;

        if let Some(expected) = expected {
            if written != expected {
                return Err(anyhow!(
                    "Response body truncated: expected {} bytes, received {}",
                    expected,
                    written
                ));
            }
        }

        Ok(written)
    }
}

/// `<dest>.part`, in the same directory as `dest`
fn part_path(dest: &Path) -> PathBuf {
    let mut name = OsString::from(dest.as_os_str());
    name.push(".part");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    /// Serve a single canned HTTP response on a local port
    async fn serve_once(status: &'static str, body: &'static [u8]) -> SourceUri {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 4096];
            let _ = socket.read(&mut request).await;

            let head = format!(
                "HTTP/1.1 {}\r\nContent-Length: {}\r\nContent-Type: application/gzip\r\nConnection: close\r\n\r\n",
                status,
                body.len()
            );
            socket.write_all(head.as_bytes()).await.unwrap();
            socket.write_all(body).await.unwrap();
            let _ = socket.shutdown().await;
        });

        SourceUri::parse(&format!("http://{}/yellow_tripdata.csv.gz", addr)).unwrap()
    }

    fn fetcher() -> Fetcher {
        Fetcher::with_client(Client::builder().no_proxy().build().unwrap())
    }

    #[test]
    fn test_part_path() {
        assert_eq!(
            part_path(Path::new("/tmp/output.csv.gz")),
            PathBuf::from("/tmp/output.csv.gz.part")
        );
    }

    #[tokio::test]
    async fn test_fetch_http_saves_body_verbatim() {
        let body: &'static [u8] = b"\x1f\x8b\x08\x00not-really-gzip";
        let uri = serve_once("200 OK", body).await;
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("output.csv.gz");

        let bytes = fetcher().fetch(&uri, &dest).await.unwrap();

        assert_eq!(bytes, body.len() as u64);
        assert_eq!(std::fs::read(&dest).unwrap(), body);
        assert!(!part_path(&dest).exists());
    }

    #[tokio::test]
    async fn test_fetch_http_error_leaves_no_file() {
        let uri = serve_once("404 Not Found", b"missing").await;
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("output.csv.gz");

        let err = fetcher().fetch(&uri, &dest).await.unwrap_err();

        assert!(format!("{:#}", err).contains("404"));
        assert!(!dest.exists());
        assert!(!part_path(&dest).exists());
    }

    #[tokio::test]
    async fn test_fetch_http_error_keeps_previous_file() {
        let uri = serve_once("500 Internal Server Error", b"").await;
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("output.csv.gz");
        std::fs::write(&dest, b"previous run").unwrap();

        assert!(fetcher().fetch(&uri, &dest).await.is_err());
        assert_eq!(std::fs::read(&dest).unwrap(), b"previous run");
    }

    #[tokio::test]
    async fn test_fetch_local_overwrites_destination() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("source.csv");
        let dest = dir.path().join("nested").join("output.csv.gz");
        std::fs::write(&src, b"a,b\n1,2\n").unwrap();
        std::fs::create_dir_all(dest.parent().unwrap()).unwrap();
        std::fs::write(&dest, b"stale contents from an earlier run").unwrap();

        let bytes = fetcher()
            .fetch(&SourceUri::Local(src.clone()), &dest)
            .await
            .unwrap();

        assert_eq!(bytes, 8);
        assert_eq!(std::fs::read(&dest).unwrap(), b"a,b\n1,2\n");
    }

    #[tokio::test]
    async fn test_fetch_missing_local_file() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("output.csv.gz");

        let result = fetcher()
            .fetch(&SourceUri::Local(dir.path().join("nope.csv")), &dest)
            .await;

        assert!(result.is_err());
        assert!(!dest.exists());
    }
}
