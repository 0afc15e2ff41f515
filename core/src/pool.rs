//! Pooled video frames. A fixed-capacity free list that lazily grows from `min`
//! to `max` buffers, hands buffers out via [`BufferPool::acquire`], and
//! takes them back via `Drop`.
//!
//! A callback-based buffer-release notification is replaced here with a
//! channel/condvar pair: [`BufferPool::set_release_notify`] takes a
//! `crossbeam_channel::Sender`, and a decoder stage holds the matching
//! `Receiver` to time its resubmit wait.
//!
//! `user_data` reset-on-release falls out of the ownership
//! model for free: a released `VideoBuffer` is dropped, its `user_data`
//! with it, and `acquire` always constructs a fresh `VideoBuffer` with
//! `user_data: None`. There is no in-place slot to remember to clear.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};

use bytes::Bytes;
use crossbeam_channel::Sender;

use crate::error::{ExternalError, PoolInitError};
use crate::external::{AllocType, FrameAlloc};
use crate::prediction::PredictionTree;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(non_camel_case_types)]
pub enum PixelFormat {
    Nv12,
    Nv12_10Bit,
    I420,
    Rgb,
    Bgr,
    Gray8,
    Gray10Le32,
}

#[derive(Debug, Clone)]
pub struct Plane {
    pub stride: u32,
    pub elevation: u32,
    pub data: Bytes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub alignment: u32,
}

#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub info: VideoInfo,
    pub planes: Vec<Plane>,
}

impl VideoFrame {
    pub fn n_planes(&self) -> usize {
        self.planes.len()
    }

    pub fn width(&self) -> u32 {
        self.info.width
    }

    pub fn height(&self) -> u32 {
        self.info.height
    }
}

/// What a [`VideoBuffer`] carries in its `user_data` slot: either the
/// detection tree attached to a main buffer, or — on a
/// level-2 crop buffer — which level-1 node in that tree it was cropped
/// from, so the classifier cascade can write attributes
/// back onto the right node without a side table.
#[derive(Debug, Clone)]
pub enum UserData {
    PredictionTree(PredictionTree),
    CropSourceNode(usize),
}

impl UserData {
    pub fn as_tree(&self) -> Option<&PredictionTree> {
        match self {
            UserData::PredictionTree(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_tree_mut(&mut self) -> Option<&mut PredictionTree> {
        match self {
            UserData::PredictionTree(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_crop_source_node(&self) -> Option<usize> {
        match self {
            UserData::CropSourceNode(idx) => Some(*idx),
            _ => None,
        }
    }
}

struct PoolState {
    free: VecDeque<VideoFrame>,
    total_allocated: usize,
    in_flight: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct BufferPoolConfig {
    pub min: usize,
    pub max: usize,
    pub video_info: VideoInfo,
    pub memory_bank: u32,
    pub block_on_empty: bool,
}

/// A fixed-capacity free list of [`VideoBuffer`]s. Shared
/// via `Arc` between the stage that owns it and every `VideoBuffer` it
/// hands out, so the last owner of a buffer — wherever in the pipeline
/// that ends up being — can always return it.
pub struct BufferPool {
    config: BufferPoolConfig,
    allocator: Arc<dyn FrameAlloc>,
    state: Mutex<PoolState>,
    available: Condvar,
    release_notify: Mutex<Vec<Sender<()>>>,
}

impl BufferPool {
    pub fn new(
        config: BufferPoolConfig,
        allocator: Arc<dyn FrameAlloc>,
    ) -> Result<Arc<Self>, PoolInitError> {
        let mut free = VecDeque::with_capacity(config.min);
        for index in 0..config.min {
            let frame = allocator
                .alloc(AllocType::Cma, 0, config.memory_bank, config.video_info)
                .map_err(|source| PoolInitError::Prefill {
                    index,
                    min: config.min,
                    source,
                })?;
            free.push_back(frame);
        }
        Ok(Arc::new(Self {
            state: Mutex::new(PoolState {
                total_allocated: config.min,
                free,
                in_flight: 0,
            }),
            available: Condvar::new(),
            release_notify: Mutex::new(Vec::new()),
            allocator,
            config,
        }))
    }

    /// Registers a channel to be pinged (best-effort — a full or
    /// disconnected receiver is silently ignored) every time a buffer is
    /// returned to this pool. The decoder stage uses this
    /// to wait out a `SEND_AGAIN` resubmit instead of busy-polling.
    pub fn set_release_notify(&self, sender: Sender<()>) {
        self.release_notify.lock().unwrap().push(sender);
    }

    /// Hands out a buffer. Blocks if the pool is empty and at `max` and
    /// `block_on_empty` is set; otherwise returns `None` immediately in
    /// that case.
    pub fn acquire(self: &Arc<Self>) -> Option<VideoBuffer> {
        let mut state = self.state.lock().unwrap();
        loop {
            if let Some(frame) = state.free.pop_front() {
                state.in_flight += 1;
                return Some(VideoBuffer::new(frame, Arc::clone(self)));
            }
            if state.total_allocated < self.config.max {
                let frame = match self.allocator.alloc(
                    AllocType::Cma,
                    0,
                    self.config.memory_bank,
                    self.config.video_info,
                ) {
                    Ok(frame) => frame,
                    Err(_) => return None,
                };
                state.total_allocated += 1;
                state.in_flight += 1;
                return Some(VideoBuffer::new(frame, Arc::clone(self)));
            }
            if !self.config.block_on_empty {
                return None;
            }
            state = self.available.wait(state).unwrap();
        }
    }

    /// `sum(free) + sum(in_flight) == total_allocated <= max`, exposed for tests and diagnostics.
    pub fn counts(&self) -> (usize, usize, usize) {
        let state = self.state.lock().unwrap();
        (state.free.len(), state.in_flight, state.total_allocated)
    }

    fn release(&self, frame: VideoFrame) {
        {
            let mut state = self.state.lock().unwrap();
            state.free.push_back(frame);
            state.in_flight -= 1;
        }
        // Notify under no pool lock, on the releasing thread: both `available` and the release-notify channels are
        // signaled only after the state mutex above has been dropped.
        self.available.notify_one();
        for sender in self.release_notify.lock().unwrap().iter() {
            let _ = sender.try_send(());
        }
    }
}

/// A `VideoFrame` plus a pool back-reference and a `user_data` slot
///. Returning it to its pool is handled by `Drop`, so
/// `release(buffer)` is just `drop(buffer)` spelled out —
/// named explicitly because a bare `drop(buf)` at a stage boundary reads
/// like an oversight rather than an intentional pool return.
pub struct VideoBuffer {
    frame: Option<VideoFrame>,
    pub user_data: Option<UserData>,
    pool: Arc<BufferPool>,
}

impl VideoBuffer {
    fn new(frame: VideoFrame, pool: Arc<BufferPool>) -> Self {
        Self {
            frame: Some(frame),
            user_data: None,
            pool,
        }
    }

    pub fn frame(&self) -> &VideoFrame {
        self.frame.as_ref().expect("VideoBuffer frame taken before drop")
    }

    pub fn frame_mut(&mut self) -> &mut VideoFrame {
        self.frame.as_mut().expect("VideoBuffer frame taken before drop")
    }

    pub fn release(self) {
        drop(self)
    }
}

impl std::fmt::Debug for VideoBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoBuffer")
            .field("frame", &self.frame)
            .field("has_user_data", &self.user_data.is_some())
            .finish()
    }
}

impl Drop for VideoBuffer {
    fn drop(&mut self) {
        if let Some(frame) = self.frame.take() {
            self.pool.release(frame);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedAlloc;

    impl FrameAlloc for FixedAlloc {
        fn alloc(
            &self,
            _alloc_type: AllocType,
            _alloc_flag: u32,
            _mem_bank: u32,
            info: VideoInfo,
        ) -> Result<VideoFrame, ExternalError> {
            Ok(VideoFrame {
                info,
                planes: vec![Plane {
                    stride: info.width,
                    elevation: info.height,
                    data: Bytes::new(),
                }],
            })
        }
    }

    fn test_info() -> VideoInfo {
        VideoInfo {
            width: 64,
            height: 64,
            format: PixelFormat::Nv12,
            alignment: 1,
        }
    }

    #[test]
    fn prefill_allocates_min_buffers_up_front() {
        let pool = BufferPool::new(
            BufferPoolConfig {
                min: 2,
                max: 4,
                video_info: test_info(),
                memory_bank: 0,
                block_on_empty: false,
            },
            Arc::new(FixedAlloc),
        )
        .unwrap();
        assert_eq!(pool.counts(), (2, 0, 2));
    }

    #[test]
    fn acquire_grows_lazily_up_to_max_then_returns_none() {
        let pool = BufferPool::new(
            BufferPoolConfig {
                min: 0,
                max: 2,
                video_info: test_info(),
                memory_bank: 0,
                block_on_empty: false,
            },
            Arc::new(FixedAlloc),
        )
        .unwrap();
        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        assert!(pool.acquire().is_none());
        assert_eq!(pool.counts(), (0, 2, 2));
        drop(a);
        assert_eq!(pool.counts(), (1, 1, 2));
        drop(b);
        assert_eq!(pool.counts(), (2, 0, 2));
    }

    #[test]
    fn release_notify_fires_after_buffer_is_back_on_free_list() {
        let pool = BufferPool::new(
            BufferPoolConfig {
                min: 1,
                max: 1,
                video_info: test_info(),
                memory_bank: 0,
                block_on_empty: false,
            },
            Arc::new(FixedAlloc),
        )
        .unwrap();
        let (tx, rx) = crossbeam_channel::bounded(1);
        pool.set_release_notify(tx);
        let buf = pool.acquire().unwrap();
        assert!(rx.try_recv().is_err());
        drop(buf);
        assert!(rx.try_recv().is_ok());
        assert_eq!(pool.counts(), (1, 0, 1));
    }

    #[test]
    fn user_data_starts_none_on_every_fresh_acquire() {
        let pool = BufferPool::new(
            BufferPoolConfig {
                min: 1,
                max: 1,
                video_info: test_info(),
                memory_bank: 0,
                block_on_empty: false,
            },
            Arc::new(FixedAlloc),
        )
        .unwrap();
        let mut buf = pool.acquire().unwrap();
        buf.user_data = Some(UserData::CropSourceNode(3));
        drop(buf);
        let buf2 = pool.acquire().unwrap();
        assert!(buf2.user_data.is_none());
    }
}
