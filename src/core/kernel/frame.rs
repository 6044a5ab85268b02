use std::ops::{Deref, DerefMut};
use std::sync::{Mutex, PoisonError};

/// Frames kept per connection; a connection only ever has one reader.
const MAX_POOLED_FRAMES: usize = 4;
/// Buffers that grew past this are dropped instead of pooled.
const MAX_POOLED_CAPACITY: usize = 1 << 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameKind {
    #[default]
    Data,
    Ping,
    Pong,
    Close,
}

/// One transport message: a control flag plus the payload bytes.
///
/// The payload buffer is reused across reads, so bytes must be copied out
/// before the frame is reset or returned to its pool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    kind: FrameKind,
    payload: Vec<u8>,
}

impl Frame {
    pub fn new(kind: FrameKind, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            kind,
            payload: payload.into(),
        }
    }

    pub fn data(payload: impl Into<Vec<u8>>) -> Self {
        Self::new(FrameKind::Data, payload)
    }

    pub fn ping(payload: impl Into<Vec<u8>>) -> Self {
        Self::new(FrameKind::Ping, payload)
    }

    pub fn close() -> Self {
        Self::new(FrameKind::Close, Vec::new())
    }

    pub fn kind(&self) -> FrameKind {
        self.kind
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn is_ping(&self) -> bool {
        self.kind == FrameKind::Ping
    }

    pub fn is_pong(&self) -> bool {
        self.kind == FrameKind::Pong
    }

    /// Turn a received ping into its reply. The payload is kept so the pong echoes it.
    pub fn set_pong(&mut self) {
        self.kind = FrameKind::Pong;
    }

    /// Overwrite the frame, reusing the existing allocation.
    pub fn set(&mut self, kind: FrameKind, payload: &[u8]) {
        self.kind = kind;
        self.payload.clear();
        self.payload.extend_from_slice(payload);
    }

    pub fn reset(&mut self) {
        self.kind = FrameKind::Data;
        self.payload.clear();
    }
}

/// Free list of frames owned by one connection.
#[derive(Debug, Default)]
pub struct FramePool {
    frames: Mutex<Vec<Frame>>,
}

impl FramePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a reset frame; it goes back to the pool when the guard drops.
    pub fn acquire(&self) -> PooledFrame<'_> {
        let frame = self
            .frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
            .unwrap_or_default();
        PooledFrame { pool: self, frame }
    }

    pub fn idle(&self) -> usize {
        self.frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn release(&self, mut frame: Frame) {
        if frame.payload.capacity() > MAX_POOLED_CAPACITY {
            return;
        }
        frame.reset();
        let mut frames = self.frames.lock().unwrap_or_else(PoisonError::into_inner);
        if frames.len() < MAX_POOLED_FRAMES {
            frames.push(frame);
        }
    }
}

pub struct PooledFrame<'a> {
    pool: &'a FramePool,
    frame: Frame,
}

impl Deref for PooledFrame<'_> {
    type Target = Frame;

    fn deref(&self) -> &Frame {
        &self.frame
    }
}

impl DerefMut for PooledFrame<'_> {
    fn deref_mut(&mut self) -> &mut Frame {
        &mut self.frame
    }
}

impl Drop for PooledFrame<'_> {
    fn drop(&mut self) {
        self.pool.release(std::mem::take(&mut self.frame));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_released_and_reused() {
        let pool = FramePool::new();
        {
            let mut frame = pool.acquire();
            frame.set(FrameKind::Data, b"{\"e\":\"trade\"}");
            assert_eq!(pool.idle(), 0);
        }
        assert_eq!(pool.idle(), 1);

        let frame = pool.acquire();
        assert_eq!(frame.kind(), FrameKind::Data);
        assert!(frame.payload().is_empty());
        assert!(frame.payload.capacity() >= 13);
    }

    #[test]
    fn test_pong_echoes_ping_payload() {
        let mut frame = Frame::ping(b"keepalive".to_vec());
        assert!(frame.is_ping());
        frame.set_pong();
        assert!(frame.is_pong());
        assert_eq!(frame.payload(), b"keepalive");
    }

    #[test]
    fn test_pool_is_bounded() {
        let pool = FramePool::new();
        let guards: Vec<_> = (0..MAX_POOLED_FRAMES + 2).map(|_| pool.acquire()).collect();
        drop(guards);
        assert_eq!(pool.idle(), MAX_POOLED_FRAMES);
    }
}
