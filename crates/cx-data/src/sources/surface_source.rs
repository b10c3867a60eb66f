//! Per-vertex time series source

use std::sync::Arc;

use async_trait::async_trait;
use cx_core::{
    next_frame, AttributeUpdate, DataSource, DatasetError, FilterMode, LoadContext, LoadState,
    LoadTracker, Result, SourceInfo, SourceKind, SurfaceFrame, UniformBag, VertexBuffer,
};
use glam::Mat4;
use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::volume_source::failure_reason;
use crate::config::SurfaceDescriptor;

/// Items per vertex for quantized RGBA samples
const RAW_STRIDE: usize = 4;

/// A surface movie delivered as one progressively streamed array.
///
/// Chunks are assumed to arrive in time order; a chunk reporting fewer frames
/// than already received is ignored.
pub struct SurfaceSource {
    info: SourceInfo,
    split: usize,
    url: String,
    frames: RwLock<Vec<SurfaceFrame>>,
    tracker: LoadTracker,
}

impl SurfaceSource {
    pub fn new(descriptor: &SurfaceDescriptor, urls: &[String]) -> Result<Self> {
        let url = urls.first().cloned().ok_or_else(|| {
            DatasetError::config(format!("surface '{}' lists no array", descriptor.name))
        })?;
        if descriptor.frames == 0 {
            return Err(DatasetError::config(format!(
                "surface '{}' declares no frames",
                descriptor.name
            )));
        }

        Ok(Self {
            info: descriptor.info(),
            split: descriptor.split,
            url,
            frames: RwLock::new(Vec::new()),
            tracker: LoadTracker::new(descriptor.name.clone()),
        })
    }

    /// First element of the right hemisphere
    pub fn split(&self) -> usize {
        self.split
    }

    pub fn stride(&self) -> usize {
        if self.info.raw {
            RAW_STRIDE
        } else {
            1
        }
    }

    pub fn frames_loaded(&self) -> usize {
        self.frames.read().len()
    }

    pub fn frame(&self, index: usize) -> Option<SurfaceFrame> {
        self.frames.read().get(index).cloned()
    }

    fn split_frame(&self, block: &[f32]) -> SurfaceFrame {
        let stride = self.stride();
        SurfaceFrame {
            left: VertexBuffer {
                stride,
                data: Arc::from(&block[..self.split]),
            },
            right: VertexBuffer {
                stride,
                data: Arc::from(&block[self.split..]),
            },
        }
    }

    /// Append every frame between those already held and `available`
    fn append_frames(&self, available: usize, data: &[f32], frame_len: usize) -> Result<Option<usize>> {
        let mut frames = self.frames.write();
        let start = frames.len();
        if available <= start {
            if available < start {
                warn!(
                    "{}: ignoring chunk with {} frame(s), {} already received",
                    self.info.name, available, start
                );
            }
            return Ok(None);
        }

        for idx in start..available {
            let block = data
                .get(idx * frame_len..(idx + 1) * frame_len)
                .ok_or_else(|| {
                    DatasetError::load_failure(
                        &self.info.name,
                        format!(
                            "chunk reports {} frame(s) but holds only {} samples",
                            available,
                            data.len()
                        ),
                    )
                })?;
            frames.push(self.split_frame(block));
        }
        Ok(Some(frames.len()))
    }

    async fn stream_frames(&self, ctx: &LoadContext) -> Result<()> {
        let name = self.info.name.as_str();
        let total = self.info.frame_count;
        let mut stream = ctx.stream_array(name, &self.url).await?;

        if stream.shape.is_empty() {
            return Err(DatasetError::load_failure(name, "array has no frame axis"));
        }
        let frame_len = stream.frame_len();
        if self.split > frame_len {
            return Err(DatasetError::load_failure(
                name,
                format!("split index {} exceeds frame length {}", self.split, frame_len),
            ));
        }

        while let Some(chunk) = ctx.next_chunk(name, &mut stream).await? {
            if chunk.available > total {
                return Err(DatasetError::load_failure(
                    name,
                    format!(
                        "stream delivered {} frame(s), {} declared",
                        chunk.available, total
                    ),
                ));
            }
            if let Some(ready) = self.append_frames(chunk.available, &chunk.data, frame_len)? {
                debug!("{}: received {} of {} frame(s)", name, ready, total);
                self.tracker.progress(ready);
            }
        }

        let received = self.frames_loaded();
        if received < total {
            return Err(DatasetError::load_failure(
                name,
                format!("stream ended after {} of {} frame(s)", received, total),
            ));
        }
        self.tracker.ready(received);
        Ok(())
    }
}

#[async_trait]
impl DataSource for SurfaceSource {
    fn info(&self) -> &SourceInfo {
        &self.info
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Surface
    }

    fn load_state(&self) -> LoadState {
        self.tracker.state()
    }

    fn watch_load(&self) -> watch::Receiver<LoadState> {
        self.tracker.subscribe()
    }

    async fn load(&self, ctx: LoadContext) -> Result<()> {
        info!(
            "Streaming surface '{}' ({} frame(s), split at {})",
            self.info.name, self.info.frame_count, self.split
        );
        let result = self.stream_frames(&ctx).await;
        if let Err(error) = &result {
            self.tracker.fail(failure_reason(error));
        }
        result
    }

    fn init(&self, _uniforms: &mut UniformBag, _slot: usize, _transform: &Mat4, _filter: FilterMode) {}

    fn sample_frame(
        &self,
        _uniforms: &mut UniformBag,
        slot: usize,
        frame: usize,
        emit: &mut dyn FnMut(AttributeUpdate),
    ) -> Result<()> {
        let next = next_frame(frame, self.info.frame_count);
        let (current, following) = {
            let frames = self.frames.read();
            let current = frames.get(frame).cloned().ok_or_else(|| {
                DatasetError::state(format!(
                    "surface '{}' frame {} is not loaded ({} of {} ready)",
                    self.info.name,
                    frame,
                    frames.len(),
                    self.info.frame_count
                ))
            })?;
            (current, frames.get(next).cloned())
        };

        emit(AttributeUpdate {
            name: format!("data{}", 2 * slot),
            frame,
            value: current,
        });
        // The blend partner is pushed once it has streamed in
        if let Some(following) = following {
            emit(AttributeUpdate {
                name: format!("data{}", 2 * slot + 1),
                frame: next,
                value: following,
            });
        }
        Ok(())
    }

    fn set_filter(&self, _filter: FilterMode) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedFetcher;
    use tokio::sync::Semaphore;

    const VERTS: usize = 6;
    const SPLIT: usize = 4;

    fn descriptor(frames: usize, raw: bool) -> SurfaceDescriptor {
        SurfaceDescriptor {
            name: "ret".to_string(),
            subject: None,
            raw,
            min: -1.0,
            max: 1.0,
            split: SPLIT,
            frames,
        }
    }

    /// Sample value encodes `frame * 100 + vertex`
    fn series(frames: usize) -> Vec<f32> {
        (0..frames)
            .flat_map(|f| (0..VERTS).map(move |v| (f * 100 + v) as f32))
            .collect()
    }

    fn urls() -> Vec<String> {
        vec!["ret.npy".to_string()]
    }

    #[tokio::test]
    async fn test_streams_and_splits_hemispheres() {
        let fetcher = Arc::new(ScriptedFetcher::new().array("ret.npy", vec![3, VERTS], series(3), 1));
        let source = SurfaceSource::new(&descriptor(3, false), &urls()).unwrap();
        source.load(LoadContext::new(fetcher)).await.unwrap();

        assert!(source.load_state().is_ready());
        let frame = source.frame(1).unwrap();
        assert_eq!(&*frame.left.data, &[100.0, 101.0, 102.0, 103.0]);
        assert_eq!(&*frame.right.data, &[104.0, 105.0]);
        assert_eq!(frame.left.stride, 1);
    }

    #[tokio::test]
    async fn test_multi_frame_chunks_stay_contiguous() {
        let fetcher = Arc::new(ScriptedFetcher::new().array("ret.npy", vec![5, VERTS], series(5), 2));
        let source = SurfaceSource::new(&descriptor(5, false), &urls()).unwrap();
        source.load(LoadContext::new(fetcher)).await.unwrap();

        assert_eq!(source.frames_loaded(), 5);
        for idx in 0..5 {
            assert_eq!(source.frame(idx).unwrap().left.data[0], (idx * 100) as f32);
        }
    }

    #[tokio::test]
    async fn test_progress_follows_chunks() {
        let gate = Arc::new(Semaphore::new(0));
        let fetcher = Arc::new(
            ScriptedFetcher::new()
                .array("ret.npy", vec![2, VERTS], series(2), 1)
                .with_gate(gate.clone()),
        );
        let source = Arc::new(SurfaceSource::new(&descriptor(2, false), &urls()).unwrap());
        let mut rx = source.watch_load();
        let task = tokio::spawn({
            let source = source.clone();
            async move { source.load(LoadContext::new(fetcher)).await }
        });

        gate.add_permits(1);
        let state = rx.wait_for(|s| s.frames_ready == 1).await.unwrap().clone();
        assert!(!state.is_settled());

        gate.add_permits(1);
        rx.wait_for(|s| s.is_ready()).await.unwrap();
        task.await.unwrap().unwrap();
        assert_eq!(source.frames_loaded(), 2);
    }

    #[tokio::test]
    async fn test_raw_series_uses_rgba_stride() {
        let fetcher = Arc::new(ScriptedFetcher::new().array("ret.npy", vec![1, VERTS], series(1), 1));
        let source = SurfaceSource::new(&descriptor(1, true), &urls()).unwrap();
        source.load(LoadContext::new(fetcher)).await.unwrap();
        assert_eq!(source.frame(0).unwrap().right.stride, 4);
    }

    #[tokio::test]
    async fn test_stream_error_fails_source() {
        let fetcher = Arc::new(ScriptedFetcher::new().failing_array("ret.npy", vec![3, VERTS], series(3), 1));
        let source = SurfaceSource::new(&descriptor(3, false), &urls()).unwrap();
        let err = source.load(LoadContext::new(fetcher)).await.unwrap_err();

        assert!(matches!(err, DatasetError::LoadFailure { .. }));
        let state = source.load_state();
        assert_eq!(state.frames_ready, 1);
        assert!(state.failure_reason().unwrap().contains("connection reset"));
    }

    #[tokio::test]
    async fn test_short_stream_is_a_failure() {
        let fetcher = Arc::new(ScriptedFetcher::new().array("ret.npy", vec![2, VERTS], series(2), 1));
        let source = SurfaceSource::new(&descriptor(4, false), &urls()).unwrap();
        assert!(source.load(LoadContext::new(fetcher)).await.is_err());
        assert!(source.load_state().is_failed());
    }

    #[tokio::test]
    async fn test_sample_frame_emits_slot_attributes() {
        let fetcher = Arc::new(ScriptedFetcher::new().array("ret.npy", vec![3, VERTS], series(3), 3));
        let source = SurfaceSource::new(&descriptor(3, false), &urls()).unwrap();
        source.load(LoadContext::new(fetcher)).await.unwrap();

        let mut updates = Vec::new();
        let mut bag = UniformBag::default();
        source
            .sample_frame(&mut bag, 1, 2, &mut |update| updates.push(update))
            .unwrap();

        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].name, "data2");
        assert_eq!(updates[0].frame, 2);
        assert_eq!(updates[1].name, "data3");
        assert_eq!(updates[1].frame, 0);
        assert_eq!(updates[1].value.left.data[0], 0.0);
    }

    #[tokio::test]
    async fn test_sampling_while_next_frame_streams_emits_current_only() {
        let gate = Arc::new(Semaphore::new(0));
        let fetcher = Arc::new(
            ScriptedFetcher::new()
                .array("ret.npy", vec![3, VERTS], series(3), 1)
                .with_gate(gate.clone()),
        );
        let source = Arc::new(SurfaceSource::new(&descriptor(3, false), &urls()).unwrap());
        let mut rx = source.watch_load();
        let task = tokio::spawn({
            let source = source.clone();
            async move { source.load(LoadContext::new(fetcher)).await }
        });

        gate.add_permits(1);
        rx.wait_for(|s| s.frames_ready == 1).await.unwrap();

        let mut updates = Vec::new();
        let mut bag = UniformBag::default();
        source
            .sample_frame(&mut bag, 0, 0, &mut |update| updates.push(update))
            .unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].name, "data0");
        assert_eq!(updates[0].frame, 0);

        gate.add_permits(2);
        task.await.unwrap().unwrap();
        updates.clear();
        source
            .sample_frame(&mut bag, 0, 0, &mut |update| updates.push(update))
            .unwrap();
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[1].name, "data1");
        assert_eq!(updates[1].value.left.data[0], 100.0);
    }

    #[tokio::test]
    async fn test_shrinking_chunk_keeps_loaded_frames() {
        let fetcher = Arc::new(ScriptedFetcher::new().chunked_array(
            "ret.npy",
            vec![2, VERTS],
            series(2),
            vec![2, 1],
        ));
        let source = SurfaceSource::new(&descriptor(2, false), &urls()).unwrap();
        source.load(LoadContext::new(fetcher)).await.unwrap();

        assert_eq!(source.frames_loaded(), 2);
        let state = source.load_state();
        assert!(state.is_ready());
        assert_eq!(state.frames_ready, 2);

        let mut updates = Vec::new();
        let mut bag = UniformBag::default();
        source
            .sample_frame(&mut bag, 0, 1, &mut |update| updates.push(update))
            .unwrap();
        assert_eq!(updates[0].value.left.data[0], 100.0);
    }

    #[test]
    fn test_sampling_before_load_fails_fast() {
        let source = SurfaceSource::new(&descriptor(3, false), &urls()).unwrap();
        let mut emitted = 0;
        let err = source
            .sample_frame(&mut UniformBag::default(), 0, 0, &mut |_| emitted += 1)
            .unwrap_err();
        assert!(matches!(err, DatasetError::State(_)));
        assert_eq!(emitted, 0);
    }

    #[test]
    fn test_rejects_missing_array() {
        assert!(SurfaceSource::new(&descriptor(3, false), &[]).is_err());
        assert!(SurfaceSource::new(&descriptor(0, false), &urls()).is_err());
    }
}
