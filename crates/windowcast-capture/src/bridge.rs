//! Producer side of a capture stream: the delegate a native session calls
//! on its delivery thread.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, warn};
use windowcast_core::{
    CaptureError, ErrorCallback, Frame, FrameCallback, FrameEncoder, OverflowPolicy, StreamConfig,
};

use crate::buffer::{FrameBuffer, PushOutcome};
use crate::native::{PixelBuffer, SessionDelegate};
use crate::stats::StatsRecorder;

/// Log the first drop, then every Nth.
const DROP_LOG_EVERY: u64 = 100;

/// State shared by a stream, its consumers and its current bridge.
pub(crate) struct StreamShared {
    pub(crate) buffer: FrameBuffer,
    pub(crate) stats: StatsRecorder,
    /// Next sequence number; lives as long as the stream.
    pub(crate) sequence: AtomicU64,
    pub(crate) active: AtomicBool,
}

impl StreamShared {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            buffer: FrameBuffer::new(capacity),
            stats: StatsRecorder::new(),
            sequence: AtomicU64::new(0),
            active: AtomicBool::new(false),
        }
    }
}

/// Delegate for one native session. A new bridge is built on every start,
/// freezing the encoder, policy and callbacks for that session.
pub(crate) struct FrameBridge {
    window_id: u32,
    encoder: FrameEncoder,
    policy: OverflowPolicy,
    frame_callback: Option<FrameCallback>,
    error_callback: Option<ErrorCallback>,
    shared: Arc<StreamShared>,
    attached: AtomicBool,
}

impl FrameBridge {
    pub(crate) fn new(window_id: u32, config: &StreamConfig, shared: Arc<StreamShared>) -> Self {
        Self {
            window_id,
            encoder: FrameEncoder::from_config(config),
            policy: config.overflow_policy,
            frame_callback: config.frame_callback.clone(),
            error_callback: config.error_callback.clone(),
            shared,
            attached: AtomicBool::new(true),
        }
    }

    /// Stop accepting callbacks from the native session.
    pub(crate) fn detach(&self) {
        self.attached.store(false, Ordering::SeqCst);
    }

    fn is_attached(&self) -> bool {
        self.attached.load(Ordering::SeqCst)
    }

    fn build_frame(&self, pixels: &dyn PixelBuffer) -> Result<Frame, CaptureError> {
        let captured_at = Instant::now();
        let (width, height, stride) = (pixels.width(), pixels.height(), pixels.bytes_per_row());

        // Copy out under the lock; compress after it is released.
        let mut drawn = None;
        pixels.with_locked_bytes(&mut |bytes: &[u8]| {
            drawn = Some(self.encoder.draw(bytes, width, height, stride));
        })?;
        let bitmap = drawn.ok_or_else(|| CaptureError::EncodeFailed {
            reason: "pixel buffer yielded no bytes".into(),
        })??;
        let image = self.encoder.encode(bitmap)?;

        let sequence = self.shared.sequence.fetch_add(1, Ordering::SeqCst);
        Ok(Frame::new(image, sequence, captured_at, pixels.is_gpu_backed()))
    }

    fn run_frame_callback(&self, frame: &Frame) {
        let Some(callback) = &self.frame_callback else { return };
        if catch_unwind(AssertUnwindSafe(|| callback(frame))).is_err() {
            warn!(
                "Stream[{}] frame callback panicked on frame {}",
                self.window_id,
                frame.sequence_number()
            );
        }
    }
}

impl SessionDelegate for FrameBridge {
    fn on_frame(&self, pixels: &dyn PixelBuffer) {
        if !self.is_attached() {
            return;
        }

        let frame = match self.build_frame(pixels) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Stream[{}] dropped native frame: {}", self.window_id, e);
                return;
            }
        };

        self.run_frame_callback(&frame);

        let bytes = frame.memory_footprint_bytes();
        match self.shared.buffer.push(frame, self.policy) {
            PushOutcome::Stored { depth, evicted } => {
                self.shared.stats.record_delivery(bytes, depth);
                if evicted > 0 {
                    let total = self.shared.stats.record_drops(evicted);
                    if total == evicted as u64 || total % DROP_LOG_EVERY == 0 {
                        warn!(
                            "Stream[{}] buffer full, dropped oldest frame ({} dropped so far)",
                            self.window_id, total
                        );
                    }
                }
            }
            PushOutcome::Interrupted => {
                debug!("Stream[{}] frame discarded, stream stopping", self.window_id);
            }
        }
    }

    fn on_stopped_with_error(&self, error: CaptureError) {
        if !self.is_attached() {
            return;
        }
        self.detach();
        if self.shared.active.swap(false, Ordering::SeqCst) {
            self.shared.stats.mark_stopped();
        }
        error!("Stream[{}] {}", self.window_id, error);
        if let Some(callback) = &self.error_callback {
            if catch_unwind(AssertUnwindSafe(|| callback(&error))).is_err() {
                warn!("Stream[{}] error callback panicked", self.window_id);
            }
        }
    }
}
