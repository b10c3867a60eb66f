//! In-memory transport for tests

use std::sync::Arc;

use ahash::AHashMap;
use anyhow::anyhow;
use async_trait::async_trait;
use cx_core::{ArrayChunk, ArrayStream, DecodedImage, Fetcher};
use parking_lot::Mutex;
use tokio::sync::{mpsc, Semaphore};

enum ScriptedImage {
    Ready(DecodedImage),
    Broken(String),
}

struct ScriptedArray {
    shape: Vec<usize>,
    data: Arc<[f32]>,
    /// Frames reported by each chunk, in send order
    schedule: Vec<usize>,
    fail_after: Option<usize>,
}

/// A fetcher serving canned images and arrays.
///
/// With a gate attached, every image and every array chunk waits for one
/// semaphore permit, so tests can release frames one at a time.
#[derive(Default)]
pub struct ScriptedFetcher {
    images: AHashMap<String, ScriptedImage>,
    arrays: AHashMap<String, ScriptedArray>,
    gate: Option<Arc<Semaphore>>,
    requests: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn image(mut self, url: &str, image: DecodedImage) -> Self {
        self.images.insert(url.to_string(), ScriptedImage::Ready(image));
        self
    }

    pub fn broken_image(mut self, url: &str, reason: &str) -> Self {
        self.images.insert(url.to_string(), ScriptedImage::Broken(reason.to_string()));
        self
    }

    /// Serve `data` (shape `[frames, ...]`) in chunks of `frames_per_chunk` frames
    pub fn array(self, url: &str, shape: Vec<usize>, data: Vec<f32>, frames_per_chunk: usize) -> Self {
        let frames = shape.first().copied().unwrap_or(0);
        let step = frames_per_chunk.max(1);
        let schedule = (1..=frames.div_ceil(step))
            .map(|chunk| (chunk * step).min(frames))
            .collect();
        self.chunked_array(url, shape, data, schedule)
    }

    /// Serve `data` with one chunk per entry of `schedule`, each reporting that many frames
    pub fn chunked_array(mut self, url: &str, shape: Vec<usize>, data: Vec<f32>, schedule: Vec<usize>) -> Self {
        self.arrays.insert(
            url.to_string(),
            ScriptedArray {
                shape,
                data: data.into(),
                schedule,
                fail_after: None,
            },
        );
        self
    }

    /// Like [`ScriptedFetcher::array`], but the stream errors after `chunks` chunks
    pub fn failing_array(mut self, url: &str, shape: Vec<usize>, data: Vec<f32>, chunks: usize) -> Self {
        self = self.array(url, shape, data, 1);
        if let Some(array) = self.arrays.get_mut(url) {
            array.fail_after = Some(chunks);
        }
        self
    }

    /// URLs requested so far, in order
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch_image(&self, url: &str) -> anyhow::Result<DecodedImage> {
        self.requests.lock().push(url.to_string());
        if let Some(gate) = &self.gate {
            gate.acquire().await?.forget();
        }
        match self.images.get(url) {
            Some(ScriptedImage::Ready(image)) => Ok(image.clone()),
            Some(ScriptedImage::Broken(reason)) => Err(anyhow!("{}", reason)),
            None => Err(anyhow!("404 not found")),
        }
    }

    async fn stream_array(&self, url: &str) -> anyhow::Result<ArrayStream> {
        self.requests.lock().push(url.to_string());
        let array = self.arrays.get(url).ok_or_else(|| anyhow!("404 not found"))?;

        let frame_len: usize = array.shape.iter().skip(1).product();
        let schedule = array.schedule.clone();
        let fail_after = array.fail_after;
        let data = array.data.clone();
        let gate = self.gate.clone();
        let (tx, rx) = mpsc::channel(4);

        tokio::spawn(async move {
            for (sent, available) in schedule.into_iter().enumerate() {
                if let Some(gate) = &gate {
                    match gate.acquire().await {
                        Ok(permit) => permit.forget(),
                        Err(_) => return,
                    }
                }
                if fail_after == Some(sent) {
                    let _ = tx.send(Err(anyhow!("connection reset"))).await;
                    return;
                }
                let end = (available * frame_len).min(data.len());
                let prefix: Arc<[f32]> = Arc::from(&data[..end]);
                if tx.send(Ok(ArrayChunk { available, data: prefix })).await.is_err() {
                    return;
                }
            }
        });

        Ok(ArrayStream {
            shape: array.shape.clone(),
            chunks: rx,
        })
    }
}

/// A solid RGBA image
pub fn solid_image(width: u32, height: u32, value: u8) -> DecodedImage {
    DecodedImage {
        width,
        height,
        rgba: vec![value; (width * height * 4) as usize],
    }
}

/// An image whose RGBA bytes encode one `f32` per pixel
pub fn float_image(width: u32, height: u32, value: f32) -> DecodedImage {
    let rgba = (0..width * height)
        .flat_map(|_| value.to_ne_bytes())
        .collect();
    DecodedImage { width, height, rgba }
}
