//! Test doubles for the native layer.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use windowcast_capture::{
    CaptureBackend, CaptureError, CaptureStream, NativeSession, PixelBuffer, SessionDelegate,
    SessionParams, StreamConfig, WindowInfo, WindowSource,
};

pub const WIDTH: u32 = 4;
pub const HEIGHT: u32 = 4;

// ── Pixel buffer ──────────────────────────────────────────────────────────────

pub struct FakePixelBuffer {
    width: u32,
    height: u32,
    stride: usize,
    bytes: Vec<u8>,
}

impl FakePixelBuffer {
    /// Rows carry 8 bytes of padding to exercise stride handling.
    pub fn new(width: u32, height: u32, shade: u8) -> Self {
        let stride = width as usize * 4 + 8;
        Self { width, height, stride, bytes: vec![shade; stride * height as usize] }
    }
}

impl PixelBuffer for FakePixelBuffer {
    fn width(&self) -> u32 {
        self.width
    }
    fn height(&self) -> u32 {
        self.height
    }
    fn bytes_per_row(&self) -> usize {
        self.stride
    }
    fn is_gpu_backed(&self) -> bool {
        false
    }
    fn with_locked_bytes(&self, f: &mut dyn FnMut(&[u8])) -> Result<(), CaptureError> {
        f(&self.bytes);
        Ok(())
    }
}

// ── Backend ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub enum Emission {
    /// Frames are pushed from the test thread through [`SessionHandle::emit`].
    Manual,
    /// A producer thread emits `frames` frames, one every `interval`.
    Paced { frames: usize, interval: Duration },
}

/// Test-side view of the most recently opened session.
#[derive(Clone)]
pub struct SessionHandle {
    delegate: Arc<dyn SessionDelegate>,
    running: Arc<AtomicBool>,
    /// Threads reporting interruptions; joined by `stop` like a bus watch.
    notifiers: Arc<Mutex<Vec<JoinHandle<()>>>>,
    pub params: SessionParams,
}

impl SessionHandle {
    /// Deliver `n` frames synchronously on the calling thread.
    pub fn emit(&self, n: usize) {
        for i in 0..n {
            if !self.running.load(Ordering::SeqCst) {
                return;
            }
            let pixels = FakePixelBuffer::new(
                self.params.resolution.width,
                self.params.resolution.height,
                i as u8,
            );
            self.delegate.on_frame(&pixels);
        }
    }

    /// Simulate the native layer dying on its own.
    pub fn interrupt(&self, reason: &str) {
        self.running.store(false, Ordering::SeqCst);
        self.delegate.on_stopped_with_error(CaptureError::interrupted(reason));
    }

    /// Report the interruption from a native thread, as a bus watch does.
    pub fn interrupt_async(&self, reason: &str) {
        self.running.store(false, Ordering::SeqCst);
        let delegate = Arc::clone(&self.delegate);
        let reason = reason.to_string();
        let notifier = thread::spawn(move || {
            delegate.on_stopped_with_error(CaptureError::interrupted(reason));
        });
        self.notifiers.lock().unwrap().push(notifier);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct Counters {
    pub opens: AtomicUsize,
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
}

pub struct FakeBackend {
    counters: Arc<Counters>,
    fail_start: AtomicBool,
    emission: Mutex<Emission>,
    sessions: Mutex<Vec<SessionHandle>>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Self::with_emission(Emission::Manual)
    }

    pub fn with_emission(emission: Emission) -> Arc<Self> {
        Arc::new(Self {
            counters: Arc::new(Counters::default()),
            fail_start: AtomicBool::new(false),
            emission: Mutex::new(emission),
            sessions: Mutex::new(Vec::new()),
        })
    }

    /// Make every subsequent `start` fail (or succeed again).
    pub fn fail_starts(&self, fail: bool) {
        self.fail_start.store(fail, Ordering::SeqCst);
    }

    pub fn set_emission(&self, emission: Emission) {
        *self.emission.lock().unwrap() = emission;
    }

    pub fn opens(&self) -> usize {
        self.counters.opens.load(Ordering::SeqCst)
    }

    pub fn starts(&self) -> usize {
        self.counters.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.counters.stops.load(Ordering::SeqCst)
    }

    /// Handle for the most recently opened session.
    pub fn session(&self) -> SessionHandle {
        self.sessions.lock().unwrap().last().cloned().expect("no session opened")
    }

    /// Handle for the most recent session opened for `window_id`.
    pub fn session_for(&self, window_id: u32) -> SessionHandle {
        self.sessions
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|s| s.params.window.window_id == window_id)
            .cloned()
            .expect("no session for window")
    }
}

impl CaptureBackend for FakeBackend {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn open_session(
        &self,
        params: SessionParams,
        delegate: Arc<dyn SessionDelegate>,
    ) -> Result<Box<dyn NativeSession>, CaptureError> {
        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        let handle = SessionHandle {
            delegate,
            running: Arc::new(AtomicBool::new(false)),
            notifiers: Arc::new(Mutex::new(Vec::new())),
            params,
        };
        self.sessions.lock().unwrap().push(handle.clone());
        Ok(Box::new(FakeSession {
            handle,
            emission: *self.emission.lock().unwrap(),
            fail_start: self.fail_start.load(Ordering::SeqCst),
            counters: Arc::clone(&self.counters),
            producer: None,
        }))
    }
}

struct FakeSession {
    handle: SessionHandle,
    emission: Emission,
    fail_start: bool,
    counters: Arc<Counters>,
    producer: Option<JoinHandle<()>>,
}

impl NativeSession for FakeSession {
    fn start(&mut self, _timeout: Duration) -> Result<(), CaptureError> {
        self.counters.starts.fetch_add(1, Ordering::SeqCst);
        if self.fail_start {
            return Err(CaptureError::start_failed("permission denied"));
        }
        self.handle.running.store(true, Ordering::SeqCst);

        if let Emission::Paced { frames, interval } = self.emission {
            let handle = self.handle.clone();
            self.producer = Some(thread::spawn(move || {
                let origin = Instant::now();
                for i in 0..frames {
                    // Absolute deadlines so emission time does not accumulate drift.
                    let deadline = origin + interval * (i as u32 + 1);
                    let now = Instant::now();
                    if deadline > now {
                        thread::sleep(deadline - now);
                    }
                    if !handle.is_running() {
                        return;
                    }
                    handle.emit(1);
                }
            }));
        }
        Ok(())
    }

    fn stop(&mut self, _timeout: Duration) -> bool {
        self.handle.running.store(false, Ordering::SeqCst);
        if let Some(producer) = self.producer.take() {
            let _ = producer.join();
        }
        let notifiers = std::mem::take(&mut *self.handle.notifiers.lock().unwrap());
        for notifier in notifiers {
            // The error callback may stop the stream from the notifier itself.
            if notifier.thread().id() != thread::current().id() {
                let _ = notifier.join();
            }
        }
        self.counters.stops.fetch_add(1, Ordering::SeqCst);
        true
    }
}

// ── Window source ─────────────────────────────────────────────────────────────

pub struct FakeWindows {
    windows: Mutex<Vec<WindowInfo>>,
    /// Windows that appear on the next `refresh`.
    on_refresh: Mutex<Vec<WindowInfo>>,
    pub lists: AtomicUsize,
    pub refreshes: AtomicUsize,
}

impl FakeWindows {
    pub fn new(windows: Vec<WindowInfo>) -> Arc<Self> {
        Arc::new(Self {
            windows: Mutex::new(windows),
            on_refresh: Mutex::new(Vec::new()),
            lists: AtomicUsize::new(0),
            refreshes: AtomicUsize::new(0),
        })
    }

    /// A single 4x4 window per id, app "App".
    pub fn with_ids(ids: &[u32]) -> Arc<Self> {
        Self::new(ids.iter().map(|id| window(*id, "App", "Main")).collect())
    }

    pub fn appear_on_refresh(&self, window: WindowInfo) {
        self.on_refresh.lock().unwrap().push(window);
    }

    pub fn remove(&self, window_id: u32) {
        self.windows.lock().unwrap().retain(|w| w.window_id != window_id);
    }

    pub fn refreshes(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }
}

impl WindowSource for FakeWindows {
    fn list_windows(&self) -> Result<Vec<WindowInfo>, CaptureError> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        Ok(self.windows.lock().unwrap().clone())
    }

    fn refresh(&self) {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        let arrived = std::mem::take(&mut *self.on_refresh.lock().unwrap());
        self.windows.lock().unwrap().extend(arrived);
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

pub fn window(window_id: u32, app: &str, title: &str) -> WindowInfo {
    WindowInfo::new(window_id, app, title).with_geometry(0, 0, WIDTH, HEIGHT)
}

pub fn stream(
    window_id: u32,
    config: StreamConfig,
    backend: &Arc<FakeBackend>,
    windows: &Arc<FakeWindows>,
) -> CaptureStream {
    CaptureStream::with_backend(window_id, config, backend.clone(), windows.clone())
}

/// Poll `cond` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    cond()
}
