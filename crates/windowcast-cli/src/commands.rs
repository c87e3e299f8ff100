use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use tracing::{info, warn};
use windowcast_capture::{
    default_backend, default_window_source, estimate_memory_usage, recommended_fps, Frame,
    ManagerConfig, PixelFormat, StreamConfig, StreamId, StreamManager,
};
use windowcast_core::Resolution;

use crate::cli::CaptureArgs;

/// How long one aggregate pull waits before re-checking for Ctrl-C.
const POLL: Duration = Duration::from_millis(200);

// ── windows ───────────────────────────────────────────────────────────────────

pub fn list_windows(app: Option<&str>) -> Result<()> {
    let windows = default_window_source()
        .list_windows()
        .context("Enumerating windows")?;

    let mut shown = 0;
    for window in windows.iter().filter(|w| app.map_or(true, |a| w.matches(a, ""))) {
        let hidden = if window.is_visible { "" } else { " (minimized)" };
        println!("{}{}", window, hidden);
        shown += 1;
    }
    info!("{} of {} windows shown", shown, windows.len());
    Ok(())
}

// ── probe ─────────────────────────────────────────────────────────────────────

pub fn probe() -> Result<()> {
    let backend = default_backend();
    println!("backend:   {}", backend.name());
    println!("available: {}", backend.is_available());

    let config = StreamConfig::default();
    for (label, res) in [("720p", Resolution::HD), ("1080p", Resolution::FHD), ("4K", Resolution::UHD)] {
        let buffer = estimate_memory_usage(&config, res.width, res.height)
            .map(|bytes| format!("{:.1} MiB", bytes as f64 / (1024.0 * 1024.0)))
            .unwrap_or_else(|| "unbounded".into());
        println!(
            "{:>6} {:>11}: recommended {} fps (gpu) / {} fps (cpu), raw buffer {}",
            label,
            res.to_string(),
            recommended_fps(res.width, res.height, true),
            recommended_fps(res.width, res.height, false),
            buffer
        );
    }
    Ok(())
}

// ── capture ───────────────────────────────────────────────────────────────────

pub async fn capture(args: CaptureArgs) -> Result<()> {
    if !args.has_targets() {
        bail!("Nothing to capture: pass --window <id> or --app <name>");
    }

    let stop = Arc::new(AtomicBool::new(false));
    let mut worker = tokio::task::spawn_blocking({
        let stop = Arc::clone(&stop);
        move || run_capture(args, &stop)
    });

    tokio::select! {
        joined = &mut worker => joined.context("Capture worker panicked")?,
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received, stopping streams");
            stop.store(true, Ordering::SeqCst);
            worker.await.context("Capture worker panicked")?
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<ManagerConfig> {
    match path {
        Some(path) => ManagerConfig::load(path)
            .with_context(|| format!("Loading config {}", path.display())),
        None => Ok(ManagerConfig::default().with_env_overrides()),
    }
}

fn run_capture(args: CaptureArgs, stop: &AtomicBool) -> Result<()> {
    let manager_config = load_config(args.config.as_deref())?;
    let manager = StreamManager::with_config(manager_config);
    if !manager.is_capture_available() {
        warn!("Capture backend reports unavailable; stream creation will likely fail");
    }

    let mut stream_config = manager.default_stream_config();
    stream_config.output_format = args.format;
    if let Some(fps) = args.fps {
        stream_config.target_fps = fps;
    }

    let mut ids = Vec::new();
    for window_id in &args.windows {
        let id = manager
            .create_stream(*window_id, Some(stream_config.clone()))
            .with_context(|| format!("Starting capture of window {}", window_id))?;
        ids.push(id);
    }
    for app in &args.apps {
        let id = manager
            .create_stream_by_query(app, args.title.as_deref(), Some(stream_config.clone()))
            .with_context(|| format!("Starting capture of app '{}'", app))?;
        ids.push(id);
    }

    let dirs = ids
        .iter()
        .map(|id| {
            let dir = args.out.join(id.to_string());
            fs::create_dir_all(&dir).with_context(|| format!("Creating {}", dir.display()))?;
            Ok((*id, dir))
        })
        .collect::<Result<BTreeMap<StreamId, PathBuf>>>()?;

    let written = pull_frames(&manager, &dirs, &args, stop)?;

    let report: BTreeMap<String, _> = manager
        .get_all_stats()
        .into_iter()
        .map(|(id, stats)| (id.to_string(), stats))
        .collect();
    manager.destroy_all_streams();

    for (id, count) in &written {
        info!("{}: wrote {} frames to {}", id, count, dirs[id].display());
    }
    println!("{}", serde_json::to_string_pretty(&report).context("Serialising stats")?);
    Ok(())
}

/// Pull from every stream until each has written `args.frames`, went idle
/// for `idle_timeout_ms`, stopped, or Ctrl-C arrived.
fn pull_frames(
    manager: &StreamManager,
    dirs: &BTreeMap<StreamId, PathBuf>,
    args: &CaptureArgs,
    stop: &AtomicBool,
) -> Result<BTreeMap<StreamId, usize>> {
    let idle_timeout = Duration::from_millis(args.idle_timeout_ms);
    let mut written: BTreeMap<StreamId, usize> = dirs.keys().map(|id| (*id, 0)).collect();
    let mut last_frame: BTreeMap<StreamId, Instant> = dirs.keys().map(|id| (*id, Instant::now())).collect();

    while !stop.load(Ordering::SeqCst) {
        for (id, frame) in manager.get_all_frames(POLL) {
            let Some(dir) = dirs.get(&id) else { continue };
            if written[&id] >= args.frames {
                continue;
            }
            write_frame(dir, &frame)?;
            *written.entry(id).or_default() += 1;
            last_frame.insert(id, Instant::now());
        }

        let mut pending = 0;
        for id in manager.get_active_stream_ids() {
            if written.get(&id).map_or(true, |n| *n >= args.frames) {
                continue;
            }
            if last_frame[&id].elapsed() > idle_timeout {
                warn!("{} produced no frame for {:?}, stopping it", id, idle_timeout);
                if let Some(stream) = manager.stream(id) {
                    stream.stop();
                }
                continue;
            }
            pending += 1;
        }
        if pending == 0 {
            break;
        }
    }
    Ok(written)
}

fn write_frame(dir: &Path, frame: &Frame) -> Result<()> {
    let name = |ext: &str| dir.join(format!("{:06}.{}", frame.sequence_number(), ext));
    match frame.pixel_format() {
        PixelFormat::Raw => {
            let path = name("png");
            frame
                .to_rgba_image()?
                .save(&path)
                .with_context(|| format!("Writing {}", path.display()))?;
        }
        format => {
            let path = name(format.file_extension());
            fs::write(&path, frame.payload()).with_context(|| format!("Writing {}", path.display()))?;
        }
    }
    Ok(())
}
