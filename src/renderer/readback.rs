//! Asynchronous pixel readback.
//!
//! [`Renderer::read_pixels_async`](super::Renderer::read_pixels_async)
//! submits a copy and returns a [`PixelReadback`]. The fence is checked
//! once immediately, then with exponential backoff measured in frames
//! (1, 2, 4, … capped by [`ReadbackSettings::max_backoff_frames`]). After
//! [`ReadbackSettings::max_attempts`] checks the readback resolves with
//! [`KilnError::ReadbackTimeout`].
//!
//! The handle is a [`Future`] woken whenever the renderer finishes a
//! frame. Dropping it abandons interest only; the device completes the copy
//! and the bytes are discarded.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll, Waker};

use parking_lot::Mutex;

use super::Renderer;
use super::core::device::{FenceStatus, GpuDevice, ReadbackFence};
use super::settings::ReadbackSettings;
use crate::errors::{KilnError, Result};

/// Frame counter and device-loss epoch shared with pending readbacks.
#[derive(Debug, Default)]
pub(crate) struct FrameClock {
    frame: AtomicU64,
    epoch: AtomicU64,
    wakers: Mutex<Vec<Waker>>,
}

impl FrameClock {
    pub(crate) fn frame(&self) -> u64 {
        self.frame.load(Ordering::Acquire)
    }

    pub(crate) fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    pub(crate) fn advance(&self) {
        self.frame.fetch_add(1, Ordering::AcqRel);
        self.wake_all();
    }

    /// Marks every pending readback as abandoned.
    pub(crate) fn device_lost(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        self.wake_all();
    }

    fn register(&self, waker: &Waker) {
        let mut wakers = self.wakers.lock();
        if !wakers.iter().any(|w| w.will_wake(waker)) {
            wakers.push(waker.clone());
        }
    }

    fn wake_all(&self) {
        let wakers = std::mem::take(&mut *self.wakers.lock());
        for waker in wakers {
            waker.wake();
        }
    }
}

enum Pending {
    Fence(Arc<dyn ReadbackFence>),
    /// The copy could not be submitted.
    Rejected(String),
    Resolved,
}

/// Pending pixel readback. Resolves to tightly packed RGBA8 rows.
pub struct PixelReadback {
    pending: Pending,
    clock: Arc<FrameClock>,
    epoch: u64,
    settings: ReadbackSettings,
    attempts: u32,
    next_frame: u64,
    backoff: u32,
}

impl std::fmt::Debug for PixelReadback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PixelReadback")
            .field("attempts", &self.attempts)
            .field("next_frame", &self.next_frame)
            .finish_non_exhaustive()
    }
}

impl PixelReadback {
    pub(crate) fn new(
        submitted: std::result::Result<Arc<dyn ReadbackFence>, String>,
        clock: Arc<FrameClock>,
        settings: ReadbackSettings,
    ) -> Self {
        let pending = match submitted {
            Ok(fence) => Pending::Fence(fence),
            Err(message) => Pending::Rejected(message),
        };
        Self {
            pending,
            epoch: clock.epoch(),
            next_frame: clock.frame(),
            clock,
            settings,
            attempts: 0,
            backoff: 1,
        }
    }

    /// Fence checks performed so far.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Polls the device, then checks the fence if the schedule allows.
    pub fn poll_ready<D: GpuDevice>(&mut self, renderer: &mut Renderer<D>) -> Poll<Result<Vec<u8>>> {
        renderer.poll_device();
        self.check()
    }

    /// Blocks until the readback resolves, advancing the renderer's frame
    /// clock between checks.
    pub fn wait<D: GpuDevice>(mut self, renderer: &mut Renderer<D>) -> Result<Vec<u8>> {
        loop {
            if let Poll::Ready(result) = self.poll_ready(renderer) {
                return result;
            }
            renderer.clock.advance();
        }
    }

    fn check(&mut self) -> Poll<Result<Vec<u8>>> {
        let fence = match std::mem::replace(&mut self.pending, Pending::Resolved) {
            Pending::Fence(fence) => fence,
            Pending::Rejected(message) => return Poll::Ready(Err(KilnError::ReadbackFailed(message))),
            Pending::Resolved => {
                return Poll::Ready(Err(KilnError::ReadbackFailed(
                    "readback polled after it resolved".to_owned(),
                )));
            }
        };
        if self.clock.epoch() != self.epoch {
            return Poll::Ready(Err(KilnError::ReadbackAbandoned));
        }
        let frame = self.clock.frame();
        if frame < self.next_frame {
            self.pending = Pending::Fence(fence);
            return Poll::Pending;
        }

        self.attempts += 1;
        match fence.poll() {
            FenceStatus::Ready(bytes) => Poll::Ready(Ok(bytes)),
            FenceStatus::Failed(message) => Poll::Ready(Err(KilnError::ReadbackFailed(message))),
            FenceStatus::Pending if self.attempts >= self.settings.max_attempts => {
                log::warn!("Pixel readback timed out after {} polls", self.attempts);
                Poll::Ready(Err(KilnError::ReadbackTimeout {
                    attempts: self.attempts,
                }))
            }
            FenceStatus::Pending => {
                self.next_frame = frame + u64::from(self.backoff);
                self.backoff = (self.backoff * 2).min(self.settings.max_backoff_frames.max(1));
                self.pending = Pending::Fence(fence);
                Poll::Pending
            }
        }
    }
}

impl Future for PixelReadback {
    type Output = Result<Vec<u8>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match this.check() {
            Poll::Pending => {
                this.clock.register(cx.waker());
                Poll::Pending
            }
            ready => ready,
        }
    }
}
