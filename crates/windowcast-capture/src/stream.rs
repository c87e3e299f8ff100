//! One continuous capture session against one window.
//!
//! ```text
//! stopped ──start()──► active ──stop()──► stopped
//!    ▲                   │
//!    └── native error ───┘  (error_callback, no auto-restart)
//! ```
//!
//! Lifecycle calls serialise on an internal mutex; frame retrieval never
//! touches it, so a consumer blocked in [`get_frame`](CaptureStream::get_frame)
//! does not hold up `stop()`, and `stop()` wakes it. User callbacks and
//! native stops never run while that mutex is held.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, info, warn};
use windowcast_core::{CaptureError, ErrorCallback, Frame, StreamConfig, StreamStats, WindowInfo};

use crate::bridge::{FrameBridge, StreamShared};
use crate::native::{CaptureBackend, NativeSession, SessionParams, WindowSource};

/// Default bounded wait for native start / stop confirmation.
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(2);

struct Lifecycle {
    config: StreamConfig,
    /// Window resolved by the most recent successful start.
    window: Option<WindowInfo>,
    session: Option<Box<dyn NativeSession>>,
    bridge: Option<Arc<FrameBridge>>,
    /// Bumped by every successful start.
    generation: u64,
}

pub struct CaptureStream {
    window_id: u32,
    backend: Arc<dyn CaptureBackend>,
    windows: Arc<dyn WindowSource>,
    start_timeout: Duration,
    stop_timeout: Duration,
    shared: Arc<StreamShared>,
    lifecycle: Mutex<Lifecycle>,
}

impl CaptureStream {
    /// Stream against the platform's default backend and window source.
    /// Created stopped; call [`start`](Self::start).
    pub fn new(window_id: u32, config: StreamConfig) -> Self {
        Self::with_backend(
            window_id,
            config,
            crate::default_backend(),
            crate::default_window_source(),
        )
    }

    pub fn with_backend(
        window_id: u32,
        config: StreamConfig,
        backend: Arc<dyn CaptureBackend>,
        windows: Arc<dyn WindowSource>,
    ) -> Self {
        Self {
            window_id,
            backend,
            windows,
            start_timeout: DEFAULT_SESSION_TIMEOUT,
            stop_timeout: DEFAULT_SESSION_TIMEOUT,
            shared: Arc::new(StreamShared::new(config.max_buffer_size)),
            lifecycle: Mutex::new(Lifecycle {
                config,
                window: None,
                session: None,
                bridge: None,
                generation: 0,
            }),
        }
    }

    pub fn with_timeouts(mut self, start: Duration, stop: Duration) -> Self {
        self.start_timeout = start;
        self.stop_timeout = stop;
        self
    }

    fn lock(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // MARK: - Lifecycle

    /// Open the native session. No-op when already active.
    ///
    /// On failure the error callback runs after the lifecycle lock is
    /// released, so it may call back into the stream.
    pub fn start(&self) -> Result<(), CaptureError> {
        let mut life = self.lock();
        loop {
            if self.is_active() {
                return Ok(());
            }
            // Left behind by an asynchronous interruption.
            let (stale, _) = self.detach_session(&mut life);
            let Some(stale) = stale else { break };
            drop(life);
            self.close_session(stale);
            life = self.lock();
        }

        let result = self.start_locked(&mut life);
        let callback = life.config.error_callback.clone();
        drop(life);

        if let Err(e) = &result {
            self.report_start_failure(callback.as_ref(), e);
        }
        result
    }

    /// Close the native session and discard buffered frames. Never fails;
    /// a native stop that does not confirm in time is logged.
    ///
    /// The native session is closed outside the lifecycle lock: an error
    /// callback still running on a backend thread may re-enter the stream.
    pub fn stop(&self) {
        let (session, generation, was_active, mut discarded) = {
            let mut life = self.lock();
            let was_active = self.shared.active.swap(false, Ordering::SeqCst);
            if was_active {
                self.shared.stats.mark_stopped();
            }
            let (session, discarded) = self.detach_session(&mut life);
            (session, life.generation, was_active, discarded)
        };

        if let Some(session) = session {
            self.close_session(session);
            // Frames pushed while the session wound down, unless a new
            // session started in the meantime.
            let life = self.lock();
            if life.generation == generation {
                discarded += self.shared.buffer.interrupt();
            }
        }
        if was_active {
            info!("Stream[{}] stopped ({} buffered frames discarded)", self.window_id, discarded);
        }
    }

    pub fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::SeqCst)
    }

    /// Swap the configuration. An active stream is stopped and restarted,
    /// since native sessions cannot change parameters in place.
    pub fn update_config(&self, config: StreamConfig) -> Result<(), CaptureError> {
        config.validate()?;
        let was_active = self.is_active();
        if was_active {
            self.stop();
        }
        {
            let mut life = self.lock();
            life.config = config;
            self.shared.buffer.set_capacity(life.config.max_buffer_size);
        }
        if was_active {
            info!("Stream[{}] restarting with new configuration", self.window_id);
            self.start()?;
        }
        Ok(())
    }

    fn start_locked(&self, life: &mut Lifecycle) -> Result<(), CaptureError> {
        match self.open_session(life) {
            Ok(()) => {
                self.shared.active.store(true, Ordering::SeqCst);
                self.shared.stats.mark_started();
                info!(
                    "Stream[{}] started ({} backend, {} @{}fps)",
                    self.window_id,
                    self.backend.name(),
                    life.config.output_format,
                    life.config.effective_fps()
                );
                Ok(())
            }
            Err(e) => {
                warn!("Stream[{}] start failed: {}", self.window_id, e);
                Err(e)
            }
        }
    }

    fn report_start_failure(&self, callback: Option<&ErrorCallback>, error: &CaptureError) {
        let Some(callback) = callback else { return };
        if catch_unwind(AssertUnwindSafe(|| callback(error))).is_err() {
            warn!("Stream[{}] error callback panicked", self.window_id);
        }
    }

    /// Resolve the window, open and start a session. Leaves nothing behind
    /// on failure.
    fn open_session(&self, life: &mut Lifecycle) -> Result<(), CaptureError> {
        life.config.validate()?;
        let window = self.resolve_window()?;
        let params = SessionParams::new(&window, &life.config);

        self.shared.buffer.set_capacity(life.config.max_buffer_size);
        let bridge = Arc::new(FrameBridge::new(self.window_id, &life.config, Arc::clone(&self.shared)));
        let mut session = self.backend.open_session(params, bridge.clone())?;

        // A session that never started has no thread that could call back in.
        if let Err(e) = session.start(self.start_timeout) {
            bridge.detach();
            self.shared.buffer.interrupt();
            if !session.stop(self.stop_timeout) {
                warn!("Stream[{}] native stop unconfirmed after failed start", self.window_id);
            }
            self.shared.buffer.interrupt();
            return Err(e);
        }

        life.generation += 1;
        life.window = Some(window);
        life.session = Some(session);
        life.bridge = Some(bridge);
        Ok(())
    }

    /// Look the window up, re-enumerating once before giving up.
    fn resolve_window(&self) -> Result<WindowInfo, CaptureError> {
        if let Some(window) = self.windows.find_window(self.window_id)? {
            return Ok(window);
        }
        debug!("Stream[{}] window not listed, refreshing window list", self.window_id);
        self.windows.refresh();
        self.windows
            .find_window(self.window_id)?
            .ok_or_else(|| CaptureError::window_not_found(format!("window id {}", self.window_id)))
    }

    /// Detach the delegate, release all waiters and hand back the session
    /// for closing. Returns it with the number of frames discarded.
    fn detach_session(&self, life: &mut Lifecycle) -> (Option<Box<dyn NativeSession>>, usize) {
        if let Some(bridge) = life.bridge.take() {
            bridge.detach();
        }
        let discarded = self.shared.buffer.interrupt();
        (life.session.take(), discarded)
    }

    /// Bounded native stop. Must not be called with the lifecycle lock held.
    fn close_session(&self, mut session: Box<dyn NativeSession>) {
        if !session.stop(self.stop_timeout) {
            warn!(
                "Stream[{}] native stop not confirmed within {:?}, continuing",
                self.window_id, self.stop_timeout
            );
        }
    }

    // MARK: - Retrieval

    /// Oldest buffered frame, waiting up to `timeout`. `None` on timeout or
    /// when the stream is stopped during the wait.
    pub fn get_frame(&self, timeout: Duration) -> Option<Frame> {
        self.shared.buffer.pop_timeout(timeout).map(|f| self.consumed(f))
    }

    pub fn try_get_frame(&self) -> Option<Frame> {
        self.shared.buffer.try_pop().map(|f| self.consumed(f))
    }

    /// Most recent unconsumed frame, left in the buffer.
    pub fn peek_latest(&self) -> Option<Frame> {
        self.shared.buffer.peek_latest()
    }

    /// Every buffered frame, oldest first.
    pub fn drain_all(&self) -> Vec<Frame> {
        self.shared.buffer.drain().into_iter().map(|f| self.consumed(f)).collect()
    }

    fn consumed(&self, frame: Frame) -> Frame {
        self.shared.stats.record_latency(frame.capture_latency());
        frame
    }

    // MARK: - Introspection

    pub fn stats(&self) -> StreamStats {
        self.shared.stats.snapshot(self.shared.buffer.len(), self.is_active())
    }

    pub fn reset_stats(&self) {
        self.shared.stats.reset();
    }

    /// Cumulative payload bytes produced.
    pub fn bytes_processed(&self) -> u64 {
        self.shared.stats.bytes_processed()
    }

    /// Payload bytes currently sitting in the buffer.
    pub fn buffered_bytes(&self) -> usize {
        self.shared.buffer.buffered_bytes()
    }

    pub fn config(&self) -> StreamConfig {
        self.lock().config.clone()
    }

    pub fn window_id(&self) -> u32 {
        self.window_id
    }

    /// Fresh lookup of the captured window.
    pub fn window_info(&self) -> Result<WindowInfo, CaptureError> {
        self.windows
            .find_window(self.window_id)?
            .ok_or_else(|| CaptureError::window_not_found(format!("window id {}", self.window_id)))
    }

    /// Window as resolved by the last successful start.
    pub fn session_window(&self) -> Option<WindowInfo> {
        self.lock().window.clone()
    }
}

impl Drop for CaptureStream {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Display for CaptureStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<CaptureStream window_id={} active={}>", self.window_id, self.is_active())
    }
}
