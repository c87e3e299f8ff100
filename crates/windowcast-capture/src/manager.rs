//! Registry of concurrent capture streams.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};
use windowcast_core::{CaptureError, Frame, ManagerConfig, StreamConfig, StreamStats};

use crate::native::{CaptureBackend, WindowSource};
use crate::stream::CaptureStream;

pub const DEFAULT_MAX_CONCURRENT_STREAMS: usize = 10;

// MARK: - StreamId

/// Opaque stream identifier. Allocated in increasing order starting at 1
/// and never reused by the manager that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StreamId(u64);

impl StreamId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "stream-{}", self.0)
    }
}

impl FromStr for StreamId {
    type Err = CaptureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.strip_prefix("stream-")
            .and_then(|n| n.parse().ok())
            .map(StreamId)
            .ok_or_else(|| CaptureError::UnknownStream { id: s.to_string() })
    }
}

// MARK: - StreamManager

#[derive(Default)]
struct StreamTable {
    streams: BTreeMap<StreamId, Arc<CaptureStream>>,
    /// Slots reserved by creations whose start is still in flight.
    pending: usize,
}

pub struct StreamManager {
    backend: Arc<dyn CaptureBackend>,
    windows: Arc<dyn WindowSource>,
    config: ManagerConfig,
    max_streams: AtomicUsize,
    next_id: AtomicU64,
    table: Mutex<StreamTable>,
}

impl StreamManager {
    pub fn new() -> Self {
        Self::with_config(ManagerConfig::default())
    }

    pub fn with_config(config: ManagerConfig) -> Self {
        Self::with_backend(crate::default_backend(), crate::default_window_source(), config)
    }

    pub fn with_backend(
        backend: Arc<dyn CaptureBackend>,
        windows: Arc<dyn WindowSource>,
        config: ManagerConfig,
    ) -> Self {
        Self {
            backend,
            windows,
            max_streams: AtomicUsize::new(config.max_concurrent_streams),
            next_id: AtomicU64::new(1),
            config,
            table: Mutex::new(StreamTable::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StreamTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stream configuration used when callers do not supply one.
    pub fn default_stream_config(&self) -> StreamConfig {
        self.config.default_stream.clone()
    }

    // MARK: - Creation / destruction

    /// Create and start a stream for `window_id`. Nothing is registered
    /// unless the start succeeds.
    pub fn create_stream(
        &self,
        window_id: u32,
        config: Option<StreamConfig>,
    ) -> Result<StreamId, CaptureError> {
        let config = config.unwrap_or_else(|| self.default_stream_config());
        config.validate()?;

        {
            let mut table = self.lock();
            let max = self.max_concurrent_streams();
            if table.streams.len() + table.pending >= max {
                warn!("StreamManager at capacity ({}), refusing window {}", max, window_id);
                return Err(CaptureError::CapacityExceeded { max });
            }
            table.pending += 1;
        }

        let stream = CaptureStream::with_backend(
            window_id,
            config,
            Arc::clone(&self.backend),
            Arc::clone(&self.windows),
        )
        .with_timeouts(self.config.start_timeout(), self.config.stop_timeout());
        let started = stream.start();

        let mut table = self.lock();
        table.pending -= 1;
        started?;

        let id = StreamId(self.next_id.fetch_add(1, Ordering::SeqCst));
        table.streams.insert(id, Arc::new(stream));
        info!("StreamManager created {} for window {} ({} total)", id, window_id, table.streams.len());
        Ok(id)
    }

    /// Resolve a window by application name and optional title filter, then
    /// create a stream for it. Both matches are case-insensitive substrings.
    pub fn create_stream_by_query(
        &self,
        app_name: &str,
        window_title: Option<&str>,
        config: Option<StreamConfig>,
    ) -> Result<StreamId, CaptureError> {
        if app_name.is_empty() {
            return Err(CaptureError::invalid_config("app name must not be empty"));
        }
        let title = window_title.unwrap_or("");
        let windows = self.windows.list_windows()?;
        let window = self
            .config
            .match_policy
            .select(&windows, app_name, title)
            .ok_or_else(|| CaptureError::window_not_found(describe_query(app_name, title)))?;
        debug!("StreamManager query '{}' resolved to {}", describe_query(app_name, title), window);
        self.create_stream(window.window_id, config)
    }

    /// Stop and remove a stream. Unknown ids are ignored.
    pub fn destroy_stream(&self, id: StreamId) {
        let removed = self.lock().streams.remove(&id);
        if let Some(stream) = removed {
            stream.stop();
            info!("StreamManager destroyed {}", id);
        }
    }

    pub fn destroy_all_streams(&self) {
        let streams = std::mem::take(&mut self.lock().streams);
        let count = streams.len();
        for stream in streams.values() {
            stream.stop();
        }
        if count > 0 {
            info!("StreamManager destroyed {} streams", count);
        }
    }

    /// Stop and restart a stream under a new configuration.
    pub fn update_stream_config(&self, id: StreamId, config: StreamConfig) -> Result<(), CaptureError> {
        self.stream(id)
            .ok_or_else(|| CaptureError::UnknownStream { id: id.to_string() })?
            .update_config(config)
    }

    // MARK: - Frames

    /// Next frame from one stream. `None` for unknown ids, on timeout, or
    /// when the stream is stopped during the wait.
    pub fn get_frame(&self, id: StreamId, timeout: Duration) -> Option<Frame> {
        self.stream(id)?.get_frame(timeout)
    }

    /// One frame from every active stream, waited for concurrently. Streams
    /// that produce nothing within `timeout` are omitted.
    pub fn get_all_frames(&self, timeout: Duration) -> BTreeMap<StreamId, Frame> {
        let active: Vec<_> = self.snapshot().into_iter().filter(|(_, s)| s.is_active()).collect();
        thread::scope(|scope| {
            let waits: Vec<_> = active
                .iter()
                .map(|(id, stream)| (*id, scope.spawn(move || stream.get_frame(timeout))))
                .collect();
            waits
                .into_iter()
                .filter_map(|(id, wait)| wait.join().ok().flatten().map(|frame| (id, frame)))
                .collect()
        })
    }

    // MARK: - Introspection

    pub fn stream(&self, id: StreamId) -> Option<Arc<CaptureStream>> {
        self.lock().streams.get(&id).cloned()
    }

    fn snapshot(&self) -> Vec<(StreamId, Arc<CaptureStream>)> {
        self.lock().streams.iter().map(|(id, s)| (*id, Arc::clone(s))).collect()
    }

    /// Ids of streams currently capturing.
    pub fn get_active_stream_ids(&self) -> Vec<StreamId> {
        self.snapshot().into_iter().filter(|(_, s)| s.is_active()).map(|(id, _)| id).collect()
    }

    /// Every registered id, including streams stopped by an interruption.
    pub fn stream_ids(&self) -> Vec<StreamId> {
        self.lock().streams.keys().copied().collect()
    }

    pub fn get_stream_stats(&self, id: StreamId) -> Option<StreamStats> {
        self.stream(id).map(|s| s.stats())
    }

    pub fn get_all_stats(&self) -> BTreeMap<StreamId, StreamStats> {
        self.snapshot().into_iter().map(|(id, s)| (id, s.stats())).collect()
    }

    pub fn active_stream_count(&self) -> usize {
        self.snapshot().iter().filter(|(_, s)| s.is_active()).count()
    }

    pub fn stream_count(&self) -> usize {
        self.lock().streams.len()
    }

    /// Cumulative payload bytes processed by all registered streams.
    pub fn get_total_memory_usage(&self) -> u64 {
        self.snapshot().iter().map(|(_, s)| s.bytes_processed()).sum()
    }

    /// Payload bytes currently buffered across all registered streams.
    pub fn buffered_bytes(&self) -> usize {
        self.snapshot().iter().map(|(_, s)| s.buffered_bytes()).sum()
    }

    /// Applies to future creations only; existing streams are kept.
    pub fn set_max_concurrent_streams(&self, max: usize) {
        self.max_streams.store(max, Ordering::SeqCst);
        let current = self.stream_count();
        if current > max {
            warn!("StreamManager limit lowered to {} with {} streams registered", max, current);
        }
    }

    pub fn max_concurrent_streams(&self) -> usize {
        self.max_streams.load(Ordering::SeqCst)
    }

    pub fn is_capture_available(&self) -> bool {
        self.backend.is_available()
    }
}

impl Default for StreamManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for StreamManager {
    fn drop(&mut self) {
        self.destroy_all_streams();
    }
}

impl std::fmt::Display for StreamManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<StreamManager active_streams={}>", self.active_stream_count())
    }
}

fn describe_query(app_name: &str, title: &str) -> String {
    if title.is_empty() {
        format!("app '{}'", app_name)
    } else {
        format!("app '{}' title '{}'", app_name, title)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_id_display_round_trips() {
        let id = StreamId(7);
        assert_eq!(id.to_string(), "stream-7");
        assert_eq!("stream-7".parse::<StreamId>().unwrap(), id);
    }

    #[test]
    fn stream_id_rejects_garbage() {
        assert!(matches!(
            "7".parse::<StreamId>(),
            Err(CaptureError::UnknownStream { .. })
        ));
        assert!("stream-x".parse::<StreamId>().is_err());
    }

    #[test]
    fn stream_ids_order_by_allocation() {
        assert!(StreamId(2) < StreamId(10));
    }
}
