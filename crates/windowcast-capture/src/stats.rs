//! Per-stream counters shared between the delivery thread and readers.
//!
//! Counters are atomics so the producer never waits on a reader; the
//! latency ring and uptime clock sit behind short-lived mutexes that only
//! guard a copy.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant, SystemTime};

use windowcast_core::StreamStats;

/// Number of recent latency samples kept per stream.
pub const LATENCY_WINDOW: usize = 1000;

/// Bounded FIFO of recent per-frame latencies.
#[derive(Debug, Clone)]
pub struct LatencyWindow {
    samples: VecDeque<Duration>,
    capacity: usize,
}

impl LatencyWindow {
    pub fn new(capacity: usize) -> Self {
        Self { samples: VecDeque::with_capacity(capacity.min(LATENCY_WINDOW)), capacity: capacity.max(1) }
    }

    pub fn record(&mut self, latency: Duration) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(latency);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// `(avg, min, max)`, or `None` with no samples.
    pub fn summary(&self) -> Option<(Duration, Duration, Duration)> {
        let min = *self.samples.iter().min()?;
        let max = *self.samples.iter().max()?;
        let total: Duration = self.samples.iter().sum();
        Some((total / self.samples.len() as u32, min, max))
    }
}

#[derive(Debug, Default)]
struct UptimeClock {
    accumulated: Duration,
    running_since: Option<Instant>,
    started_at: Option<SystemTime>,
}

impl UptimeClock {
    fn uptime(&self) -> Duration {
        self.accumulated + self.running_since.map(|t| t.elapsed()).unwrap_or_default()
    }
}

pub struct StatsRecorder {
    delivered: AtomicU64,
    dropped: AtomicU64,
    bytes_processed: AtomicU64,
    peak_depth: AtomicUsize,
    latencies: Mutex<LatencyWindow>,
    clock: Mutex<UptimeClock>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Default for StatsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsRecorder {
    pub fn new() -> Self {
        Self {
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            bytes_processed: AtomicU64::new(0),
            peak_depth: AtomicUsize::new(0),
            latencies: Mutex::new(LatencyWindow::new(LATENCY_WINDOW)),
            clock: Mutex::new(UptimeClock::default()),
        }
    }

    pub fn record_delivery(&self, bytes: usize, depth: usize) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
        self.bytes_processed.fetch_add(bytes as u64, Ordering::Relaxed);
        self.peak_depth.fetch_max(depth, Ordering::Relaxed);
    }

    /// Returns the new dropped total.
    pub fn record_drops(&self, count: usize) -> u64 {
        self.dropped.fetch_add(count as u64, Ordering::Relaxed) + count as u64
    }

    pub fn record_latency(&self, latency: Duration) {
        lock(&self.latencies).record(latency);
    }

    pub fn mark_started(&self) {
        let mut clock = lock(&self.clock);
        if clock.running_since.is_none() {
            clock.running_since = Some(Instant::now());
        }
        clock.started_at = Some(SystemTime::now());
    }

    pub fn mark_stopped(&self) {
        let mut clock = lock(&self.clock);
        if let Some(since) = clock.running_since.take() {
            clock.accumulated += since.elapsed();
        }
    }

    pub fn bytes_processed(&self) -> u64 {
        self.bytes_processed.load(Ordering::Relaxed)
    }

    /// Zero every counter. The uptime clock restarts now if it was running.
    pub fn reset(&self) {
        self.delivered.store(0, Ordering::Relaxed);
        self.dropped.store(0, Ordering::Relaxed);
        self.bytes_processed.store(0, Ordering::Relaxed);
        self.peak_depth.store(0, Ordering::Relaxed);
        lock(&self.latencies).clear();
        let mut clock = lock(&self.clock);
        clock.accumulated = Duration::ZERO;
        if clock.running_since.is_some() {
            clock.running_since = Some(Instant::now());
        }
    }

    pub fn snapshot(&self, current_depth: usize, is_active: bool) -> StreamStats {
        let delivered = self.delivered.load(Ordering::Relaxed);
        let (uptime, started_at) = {
            let clock = lock(&self.clock);
            (clock.uptime(), clock.started_at)
        };
        let (latency, samples) = {
            let window = lock(&self.latencies);
            (window.summary(), window.len())
        };
        let ms = |d: Duration| d.as_secs_f64() * 1000.0;
        let (avg, min, max) = latency.map(|(a, lo, hi)| (ms(a), ms(lo), ms(hi))).unwrap_or_default();
        let uptime_secs = uptime.as_secs_f64();

        StreamStats {
            total_frames_delivered: delivered,
            total_frames_dropped: self.dropped.load(Ordering::Relaxed),
            current_buffer_depth: current_depth,
            peak_buffer_depth: self.peak_depth.load(Ordering::Relaxed),
            bytes_processed_total: self.bytes_processed(),
            actual_fps: if uptime_secs > 0.0 { delivered as f64 / uptime_secs } else { 0.0 },
            avg_latency_ms: avg,
            min_latency_ms: min,
            max_latency_ms: max,
            latency_samples: samples,
            stream_started_at: started_at,
            uptime_secs,
            is_active,
        }
    }
}
