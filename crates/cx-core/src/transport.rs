//! Fetch transport consumed by the loaders

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{DatasetError, Result};
use crate::load::CancelToken;

/// A decoded image as 8-bit RGBA pixels
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

/// Progress of a streamed numeric array
#[derive(Debug, Clone)]
pub struct ArrayChunk {
    /// Number of complete frames available so far
    pub available: usize,
    /// Every sample received so far, frames laid out back to back
    pub data: Arc<[f32]>,
}

/// A streamed array of shape `[frames, ...]`
pub struct ArrayStream {
    pub shape: Vec<usize>,
    pub chunks: mpsc::Receiver<anyhow::Result<ArrayChunk>>,
}

impl ArrayStream {
    /// Samples per frame
    pub fn frame_len(&self) -> usize {
        self.shape.iter().skip(1).product()
    }
}

/// Network or file transport
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch and decode one image
    async fn fetch_image(&self, url: &str) -> anyhow::Result<DecodedImage>;

    /// Open a progressively delivered numeric array
    async fn stream_array(&self, url: &str) -> anyhow::Result<ArrayStream>;
}

/// Everything a source needs to run its load
#[derive(Clone)]
pub struct LoadContext {
    pub fetcher: Arc<dyn Fetcher>,
    pub cancel: CancelToken,
    pub fetch_timeout: Option<Duration>,
}

impl LoadContext {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            fetcher,
            cancel: CancelToken::new(),
            fetch_timeout: None,
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Fail with a load error if the load was cancelled
    pub fn check_cancelled(&self, source: &str) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(DatasetError::load_failure(source, "cancelled"))
        } else {
            Ok(())
        }
    }

    pub async fn fetch_image(&self, source: &str, url: &str) -> Result<DecodedImage> {
        self.check_cancelled(source)?;
        let image = self.bounded(source, url, self.fetcher.fetch_image(url)).await?;
        self.check_cancelled(source)?;
        Ok(image)
    }

    pub async fn stream_array(&self, source: &str, url: &str) -> Result<ArrayStream> {
        self.check_cancelled(source)?;
        self.bounded(source, url, self.fetcher.stream_array(url)).await
    }

    /// Wait for the next chunk; `None` once the stream is complete
    pub async fn next_chunk(
        &self,
        source: &str,
        stream: &mut ArrayStream,
    ) -> Result<Option<ArrayChunk>> {
        self.check_cancelled(source)?;
        let chunk = match self.fetch_timeout {
            Some(limit) => tokio::time::timeout(limit, stream.chunks.recv())
                .await
                .map_err(|_| DatasetError::load_failure(source, "timed out waiting for data"))?,
            None => stream.chunks.recv().await,
        };
        self.check_cancelled(source)?;
        chunk
            .transpose()
            .map_err(|e| DatasetError::load_failure(source, format!("{:#}", e)))
    }

    async fn bounded<T>(
        &self,
        source: &str,
        url: &str,
        fut: impl std::future::Future<Output = anyhow::Result<T>>,
    ) -> Result<T> {
        let result = match self.fetch_timeout {
            Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| {
                DatasetError::load_failure(source, format!("timed out fetching {}", url))
            })?,
            None => fut.await,
        };
        result.map_err(|e| DatasetError::load_failure(source, format!("{}: {:#}", url, e)))
    }
}
