//! X11 window capture via GStreamer `ximagesrc`.
//!
//! # Pipeline
//! ```text
//! ximagesrc xid=<window> → videoscale → videorate → videoconvert
//!     → video/x-raw,format=BGRx,width=W,height=H,framerate=F/1 → appsink
//! ```
//! The appsink streaming thread is the delivery thread; `map_readable()` on
//! the sample buffer is the pixel lock. A bus-watch thread reports errors
//! and end-of-stream as interruptions.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app::{AppSink, AppSinkCallbacks};
use gstreamer_video::VideoInfo;
use tracing::{debug, info, warn};
use windowcast_core::CaptureError;

use crate::native::{CaptureBackend, NativeSession, PixelBuffer, SessionDelegate, SessionParams};

/// Elements the pipeline cannot be built without.
static REQUIRED_ELEMENTS: &[&str] = &["ximagesrc", "videoscale", "videorate", "videoconvert", "appsink"];

const BUS_POLL: Duration = Duration::from_millis(100);

// ── Backend ───────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct GstBackend;

impl GstBackend {
    pub fn new() -> Self {
        Self
    }
}

impl CaptureBackend for GstBackend {
    fn name(&self) -> &'static str {
        "gstreamer-ximagesrc"
    }

    fn is_available(&self) -> bool {
        if std::env::var_os("DISPLAY").is_none() {
            debug!("No DISPLAY set, X11 capture unavailable");
            return false;
        }
        if gst::init().is_err() {
            return false;
        }
        REQUIRED_ELEMENTS.iter().all(|element| {
            let found = gst::ElementFactory::find(element).is_some();
            if !found {
                warn!("GStreamer element '{}' not found", element);
            }
            found
        })
    }

    fn open_session(
        &self,
        params: SessionParams,
        delegate: Arc<dyn SessionDelegate>,
    ) -> Result<Box<dyn NativeSession>, CaptureError> {
        gst::init().map_err(|e| CaptureError::start_failed(format!("GStreamer init: {}", e)))?;
        let window_id = params.window.window_id;
        let pipeline = build_pipeline(&params, Arc::clone(&delegate))?;
        Ok(Box::new(GstSession {
            window_id,
            pipeline,
            delegate,
            stop_flag: Arc::new(AtomicBool::new(false)),
            bus_thread: None,
            running: false,
        }))
    }
}

fn build_pipeline(
    params: &SessionParams,
    delegate: Arc<dyn SessionDelegate>,
) -> Result<gst::Pipeline, CaptureError> {
    let xid = params.window.window_id;
    let (w, h) = (params.resolution.width, params.resolution.height);
    let fps = params.fps.max(1);
    let cursor = params.show_cursor;

    let desc = format!(
        "ximagesrc xid={xid} show-pointer={cursor} use-damage=false \
         ! videoscale \
         ! videorate \
         ! videoconvert \
         ! video/x-raw,format=BGRx,width={w},height={h},framerate={fps}/1 \
         ! appsink name=sink sync=false max-buffers=1 drop=false emit-signals=false"
    );
    debug!("Stream[{}] GStreamer pipeline: {}", xid, desc);

    let pipeline = gst::parse::launch(&desc)
        .map_err(|e| CaptureError::start_failed(format!("pipeline parse: {}", e)))?
        .downcast::<gst::Pipeline>()
        .map_err(|_| CaptureError::start_failed("not a pipeline"))?;

    let appsink = pipeline
        .by_name("sink")
        .and_then(|element| element.downcast::<AppSink>().ok())
        .ok_or_else(|| CaptureError::start_failed("no appsink"))?;

    appsink.set_callbacks(
        AppSinkCallbacks::builder()
            .new_sample(move |sink| {
                let sample = sink.pull_sample().map_err(|_| gst::FlowError::Eos)?;
                let caps = sample.caps().ok_or(gst::FlowError::NotNegotiated)?;
                let info = VideoInfo::from_caps(caps).map_err(|_| gst::FlowError::NotNegotiated)?;
                let buffer = sample.buffer().ok_or(gst::FlowError::Error)?;

                let pixels = GstPixelBuffer {
                    buffer,
                    width: info.width(),
                    height: info.height(),
                    stride: info.stride().first().map_or(0, |s| (*s).max(0) as usize),
                };
                delegate.on_frame(&pixels);
                Ok(gst::FlowSuccess::Ok)
            })
            .build(),
    );

    Ok(pipeline)
}

// ── Pixel buffer ──────────────────────────────────────────────────────────────

struct GstPixelBuffer<'a> {
    buffer: &'a gst::BufferRef,
    width: u32,
    height: u32,
    stride: usize,
}

impl PixelBuffer for GstPixelBuffer<'_> {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn bytes_per_row(&self) -> usize {
        self.stride
    }

    /// XShm path; pixels are always in system memory.
    fn is_gpu_backed(&self) -> bool {
        false
    }

    fn with_locked_bytes(&self, f: &mut dyn FnMut(&[u8])) -> Result<(), CaptureError> {
        let map = self
            .buffer
            .map_readable()
            .map_err(|e| CaptureError::EncodeFailed { reason: format!("buffer map: {}", e) })?;
        f(map.as_slice());
        Ok(())
    }
}

// ── Session ───────────────────────────────────────────────────────────────────

struct GstSession {
    window_id: u32,
    pipeline: gst::Pipeline,
    delegate: Arc<dyn SessionDelegate>,
    stop_flag: Arc<AtomicBool>,
    bus_thread: Option<BusWatch>,
    running: bool,
}

/// Bus-watch thread plus a channel that disconnects when it exits.
struct BusWatch {
    handle: JoinHandle<()>,
    done: mpsc::Receiver<()>,
}

impl GstSession {
    /// First error message waiting on the bus, if any.
    fn pending_error(&self) -> Option<String> {
        let bus = self.pipeline.bus()?;
        let msg = bus.pop_filtered(&[gst::MessageType::Error])?;
        match msg.view() {
            gst::MessageView::Error(e) => Some(e.error().to_string()),
            _ => None,
        }
    }

    fn fail_start(&mut self, reason: String) -> CaptureError {
        let _ = self.pipeline.set_state(gst::State::Null);
        CaptureError::start_failed(reason)
    }

    fn spawn_bus_watch(&self) -> Result<BusWatch, CaptureError> {
        let bus = self
            .pipeline
            .bus()
            .ok_or_else(|| CaptureError::start_failed("pipeline has no bus"))?;
        let delegate = Arc::clone(&self.delegate);
        let stop_flag = Arc::clone(&self.stop_flag);
        let window_id = self.window_id;
        let (done_tx, done) = mpsc::channel::<()>();

        let handle = thread::Builder::new()
            .name(format!("windowcast-bus-{}", window_id))
            .spawn(move || {
                let _done = done_tx;
                let poll = gst::ClockTime::from_mseconds(BUS_POLL.as_millis() as u64);
                while !stop_flag.load(Ordering::SeqCst) {
                    let Some(msg) = bus.timed_pop(poll) else { continue };
                    let reason = match msg.view() {
                        gst::MessageView::Error(e) => match e.debug() {
                            Some(dbg) => format!("{} ({})", e.error(), dbg),
                            None => e.error().to_string(),
                        },
                        gst::MessageView::Eos(_) => "window capture reached end of stream".to_string(),
                        _ => continue,
                    };
                    if !stop_flag.load(Ordering::SeqCst) {
                        delegate.on_stopped_with_error(CaptureError::interrupted(reason));
                    }
                    break;
                }
                debug!("Stream[{}] bus watch exited", window_id);
            })
            .map_err(|e| CaptureError::start_failed(format!("bus watch thread: {}", e)))?;
        Ok(BusWatch { handle, done })
    }

    /// Joins the bus watch if it exits before `deadline`, detaches it otherwise.
    fn finish_bus_watch(&mut self, deadline: Instant) -> bool {
        let Some(watch) = self.bus_thread.take() else { return true };
        // An error callback may stop the stream from the bus thread itself.
        if watch.handle.thread().id() == thread::current().id() {
            return true;
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        match watch.done.recv_timeout(remaining) {
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    "Stream[{}] bus watch still busy after stop timeout, detaching it",
                    self.window_id
                );
                false
            }
            _ => {
                let _ = watch.handle.join();
                true
            }
        }
    }
}

impl NativeSession for GstSession {
    fn start(&mut self, timeout: Duration) -> Result<(), CaptureError> {
        if self.running {
            return Ok(());
        }
        self.stop_flag.store(false, Ordering::SeqCst);

        if self.pipeline.set_state(gst::State::Playing).is_err() {
            let reason = self.pending_error().unwrap_or_else(|| "failed to start pipeline".into());
            return Err(self.fail_start(reason));
        }

        let wait = gst::ClockTime::from_mseconds(timeout.as_millis() as u64);
        let (result, current, _pending) = self.pipeline.state(wait);
        if result.is_err() || current != gst::State::Playing {
            let reason = self.pending_error().unwrap_or_else(|| {
                format!("pipeline not playing after {:?} (state {:?})", timeout, current)
            });
            return Err(self.fail_start(reason));
        }

        match self.spawn_bus_watch() {
            Ok(watch) => self.bus_thread = Some(watch),
            Err(e) => {
                let _ = self.pipeline.set_state(gst::State::Null);
                return Err(e);
            }
        }
        self.running = true;
        info!("Stream[{}] ximagesrc pipeline playing", self.window_id);
        Ok(())
    }

    fn stop(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        self.stop_flag.store(true, Ordering::SeqCst);
        self.running = false;

        let confirmed = match self.pipeline.set_state(gst::State::Null) {
            Ok(_) => {
                let wait = gst::ClockTime::from_mseconds(timeout.as_millis() as u64);
                let (result, current, _) = self.pipeline.state(wait);
                result.is_ok() && current == gst::State::Null
            }
            Err(_) => false,
        };

        let joined = self.finish_bus_watch(deadline);
        confirmed && joined
    }
}

impl Drop for GstSession {
    fn drop(&mut self) {
        if self.running || self.bus_thread.is_some() {
            self.stop(Duration::from_secs(2));
        } else {
            let _ = self.pipeline.set_state(gst::State::Null);
        }
    }
}
