//! Streaming HTTP download into a local file.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use crate::TransferError;

const USER_AGENT: &str = concat!("patchdoc/", env!("CARGO_PKG_VERSION"));
const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Bytes transferred so far, and the total when the server announced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress {
    pub transferred: u64,
    pub total: Option<u64>,
}

impl TransferProgress {
    /// `floor(transferred / total * 100)`, or `None` when the length is unknown.
    pub fn percent(&self) -> Option<u8> {
        match self.total {
            Some(0) => Some(100),
            Some(total) => Some(((self.transferred.min(total) * 100) / total) as u8),
            None => None,
        }
    }
}

/// Downloads one URL into one file.
///
/// The repair manager only talks to this trait, so tests can substitute
/// slow or failing transfers without a network.
pub trait Downloader: Send + Sync {
    /// Downloads `url` into `dest`, returning the number of bytes written.
    ///
    /// On failure or cancellation the partial `dest` is removed.
    fn download<'a>(
        &'a self,
        url: &'a str,
        dest: &'a Path,
        cancel: &'a CancellationToken,
        on_progress: &'a (dyn Fn(TransferProgress) + Send + Sync),
    ) -> Pin<Box<dyn Future<Output = Result<u64, TransferError>> + Send + 'a>>;
}

/// [`Downloader`] backed by `reqwest`.
pub struct HttpDownloader {
    http: reqwest::Client,
    timeout: Duration,
}

impl HttpDownloader {
    /// Creates a downloader whose requests each time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, TransferError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self { http, timeout })
    }

    async fn fetch(
        &self,
        url: &str,
        dest: &Path,
        cancel: &CancellationToken,
        on_progress: &(dyn Fn(TransferProgress) + Send + Sync),
    ) -> Result<u64, TransferError> {
        if cancel.is_cancelled() {
            return Err(TransferError::Cancelled);
        }

        let resp = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransferError::Cancelled),
            resp = self.http.get(url).timeout(self.timeout).send() => resp?,
        };

        let status = resp.status();
        if !status.is_success() {
            return Err(TransferError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let total = resp.content_length();
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let result = stream_to_file(resp, dest, total, cancel, on_progress).await;
        if result.is_err() {
            if let Err(e) = tokio::fs::remove_file(dest).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::debug!(path = %dest.display(), error = %e, "failed to remove partial download");
                }
            }
        }
        result
    }
}

impl Downloader for HttpDownloader {
    fn download<'a>(
        &'a self,
        url: &'a str,
        dest: &'a Path,
        cancel: &'a CancellationToken,
        on_progress: &'a (dyn Fn(TransferProgress) + Send + Sync),
    ) -> Pin<Box<dyn Future<Output = Result<u64, TransferError>> + Send + 'a>> {
        Box::pin(self.fetch(url, dest, cancel, on_progress))
    }
}

async fn stream_to_file(
    resp: reqwest::Response,
    dest: &Path,
    total: Option<u64>,
    cancel: &CancellationToken,
    on_progress: &(dyn Fn(TransferProgress) + Send + Sync),
) -> Result<u64, TransferError> {
    let mut file = tokio::fs::File::create(dest).await?;
    let mut stream = resp.bytes_stream();
    let mut transferred = 0u64;

    on_progress(TransferProgress { transferred, total });

    loop {
        let chunk = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransferError::Cancelled),
            chunk = stream.next() => chunk,
        };
        let Some(chunk) = chunk else { break };
        let bytes = chunk?;

        file.write_all(&bytes).await?;
        transferred += bytes.len() as u64;
        on_progress(TransferProgress { transferred, total });
    }

    file.flush().await?;
    Ok(transferred)
}

/// Joins a web root and a relative file name with exactly one `/`.
pub fn join_url(base: &str, file: &str) -> String {
    let file = file.replace('\\', "/");
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        file.trim_start_matches("./").trim_start_matches('/')
    )
}
