//! Aggregate progress rendering for the NDJSON pull stream.
//!
//! Decoding lives in the runner client; this module only owns the rendering
//! policy: per-layer bookkeeping, a single aggregate bar line throttled to
//! one render per 100 ms (except at completion), and the sorted
//! `<id>: Pull complete` snapshot printed when the stream ends.

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::runner::{reference, ProgressMessage};

const DEFAULT_TERMINAL_WIDTH: u16 = 80;
const MIN_BAR_WIDTH: usize = 10;
const RENDER_INTERVAL: Duration = Duration::from_millis(100);

const SIZE_UNITS: &[&str] = &["B", "kB", "MB", "GB", "TB", "PB", "EB"];

/// Formats a byte count with base-1000 units, two decimals.
pub fn human_size(size: f64) -> String {
    let mut size = size;
    let mut unit = 0;
    while size >= 1000.0 && unit < SIZE_UNITS.len() - 1 {
        size /= 1000.0;
        unit += 1;
    }
    format!("{:.2}{}", size, SIZE_UNITS[unit])
}

fn human_size_pad(size: f64, width: usize) -> String {
    format!("{:>width$}", human_size(size))
}

fn human_time_pad(seconds: u64, width: usize) -> String {
    let s = if seconds < 60 {
        format!("{seconds}s")
    } else if seconds < 3600 {
        format!("{}m {:02}s", seconds / 60, seconds % 60)
    } else {
        format!(
            "{}h {:02}m {:02}s",
            seconds / 3600,
            (seconds % 3600) / 60,
            seconds % 60
        )
    };
    format!("{s:>width$}")
}

/// Terminal width for bar sizing; 80 when the query fails (including
/// non-interactive output).
fn terminal_width() -> usize {
    match crossterm::terminal::size() {
        Ok((cols, _)) if cols > 0 => cols as usize,
        _ => DEFAULT_TERMINAL_WIDTH as usize,
    }
}

/// Builds the filled portion of the bar for the available width.
fn fmt_bar(percent: f64, term_width: usize, prefix: &str, suffix: &str) -> String {
    let bar_width = term_width
        .saturating_sub(prefix.len())
        .saturating_sub(suffix.len())
        .saturating_sub(4)
        .max(MIN_BAR_WIDTH);

    let mut filled = (percent / 100.0 * bar_width as f64) as usize;
    if filled > bar_width {
        filled = bar_width;
    }

    let mut bar = "█".repeat(filled);
    bar.push_str(&" ".repeat(bar_width - filled));
    bar
}

#[derive(Debug, Clone)]
struct LayerState {
    size: u64,
    current: u64,
}

struct Inner {
    /// Keyed by display ID so the final snapshot iterates in sorted order.
    layers: BTreeMap<String, LayerState>,
    total: u64,
    start: Option<Instant>,
    last_render: Option<Instant>,
    rendered: bool,
    out: Box<dyn Write + Send>,
}

/// Tracks layer progress across a pull run and renders the aggregate bar.
pub struct PullProgress {
    inner: Mutex<Inner>,
}

impl Default for PullProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl PullProgress {
    pub fn new() -> Self {
        Self::with_writer(Box::new(std::io::stdout()))
    }

    pub fn with_writer(out: Box<dyn Write + Send>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                layers: BTreeMap::new(),
                total: 0,
                start: None,
                last_render: None,
                rendered: false,
                out,
            }),
        }
    }

    /// Consumes one decoded `progress` message: records the layer's current
    /// byte count and re-renders the aggregate line if the throttle allows.
    pub fn handle(&self, msg: &ProgressMessage) {
        let mut inner = self.inner.lock().expect("progress state poisoned");

        if msg.layer.id.is_empty() {
            // No layer detail: print the raw message on the progress line.
            let _ = write!(inner.out, "\r\x1b[K{}", msg.message);
            let _ = inner.out.flush();
            inner.rendered = true;
            return;
        }

        let display_id = reference::short_id(&msg.layer.id).to_string();
        inner.layers.insert(
            display_id,
            LayerState {
                size: msg.layer.size,
                current: msg.layer.current,
            },
        );
        inner.total = msg.total;

        let now = Instant::now();
        let start = *inner.start.get_or_insert(now);
        let current: u64 = inner.layers.values().map(|l| l.current).sum();
        let total = inner.total;

        let due = match inner.last_render {
            Some(last) => now.duration_since(last) >= RENDER_INTERVAL,
            None => true,
        };
        if !due && current != total {
            return;
        }
        inner.last_render = Some(now);

        let percent = if total > 0 {
            current as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        let elapsed = now.duration_since(start).as_secs_f64();
        let speed = if elapsed > 0.0 {
            current as f64 / elapsed
        } else {
            0.0
        };
        let eta = if speed > 0.0 {
            (total.saturating_sub(current) as f64 / speed) as u64
        } else {
            0
        };

        let prefix = format!("{percent:3.0}% |");
        let suffix = format!(
            "{}/{}  {}/s  {}",
            human_size_pad(current as f64, 10),
            human_size(total as f64),
            human_size_pad(speed, 10),
            human_time_pad(eta, 16),
        );
        let bar = fmt_bar(percent, terminal_width(), &prefix, &suffix);

        let _ = write!(inner.out, "\r\x1b[K{prefix}{bar}| {suffix}");
        let _ = inner.out.flush();
        inner.rendered = true;
    }

    /// Ends the run: clears the progress line and prints the sorted
    /// per-layer completion snapshot, or just a newline when no layer was
    /// ever observed.
    pub fn stop(&self) {
        let mut inner = self.inner.lock().expect("progress state poisoned");
        if inner.layers.is_empty() {
            let _ = writeln!(inner.out);
            let _ = inner.out.flush();
            return;
        }
        let ids: Vec<String> = inner.layers.keys().cloned().collect();
        let _ = write!(inner.out, "\r\x1b[K");
        for id in ids {
            let _ = writeln!(inner.out, "{id}: Pull complete");
        }
        let _ = inner.out.flush();
    }

    /// True when at least one layer was observed.
    pub fn has_layers(&self) -> bool {
        !self
            .inner
            .lock()
            .expect("progress state poisoned")
            .layers
            .is_empty()
    }

    /// True when anything was written to the progress line.
    pub fn progress_shown(&self) -> bool {
        self.inner.lock().expect("progress state poisoned").rendered
    }
}

/// Single-line progress for streams without layer detail (push).
pub fn line_progress(message: &str) {
    print!("\r\x1b[K{message}");
    let _ = std::io::stdout().flush();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::ProgressLayer;
    use std::sync::{Arc, Mutex as StdMutex};

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<StdMutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    fn progress_msg(id: &str, size: u64, current: u64, total: u64) -> ProgressMessage {
        ProgressMessage {
            kind: "progress".to_string(),
            message: String::new(),
            total,
            layer: ProgressLayer {
                id: id.to_string(),
                size,
                current,
            },
        }
    }

    #[test]
    fn renders_aggregate_percentage() {
        let buf = SharedBuf::default();
        let progress = PullProgress::with_writer(Box::new(buf.clone()));
        progress.handle(&progress_msg("sha256:aaaaaaaaaaaaaaaaaaaa", 1000, 500, 1000));
        let out = buf.contents();
        assert!(out.contains("50% |"), "missing percent in {out:?}");
        assert!(out.contains("500.00B"), "missing current size in {out:?}");
    }

    #[test]
    fn throttles_renders_between_updates() {
        let buf = SharedBuf::default();
        let progress = PullProgress::with_writer(Box::new(buf.clone()));
        progress.handle(&progress_msg("sha256:aaaaaaaaaaaaaaaaaaaa", 1000, 100, 1000));
        let after_first = buf.contents().len();
        // Immediately following update, still short of the total: throttled.
        progress.handle(&progress_msg("sha256:aaaaaaaaaaaaaaaaaaaa", 1000, 200, 1000));
        assert_eq!(buf.contents().len(), after_first);
        // Reaching the total bypasses the throttle.
        progress.handle(&progress_msg("sha256:aaaaaaaaaaaaaaaaaaaa", 1000, 1000, 1000));
        assert!(buf.contents().len() > after_first);
    }

    #[test]
    fn stop_prints_sorted_completion_lines() {
        let buf = SharedBuf::default();
        let progress = PullProgress::with_writer(Box::new(buf.clone()));
        progress.handle(&progress_msg("sha256:bbbbbbbbbbbbbbbbbbbb", 10, 10, 20));
        progress.handle(&progress_msg("sha256:aaaaaaaaaaaaaaaaaaaa", 10, 10, 20));
        progress.stop();
        let out = buf.contents();
        let a = out.find("aaaaaaaaaaaa: Pull complete").unwrap();
        let b = out.find("bbbbbbbbbbbb: Pull complete").unwrap();
        assert!(a < b, "layers not sorted in {out:?}");
    }

    #[test]
    fn stop_without_layers_prints_newline() {
        let buf = SharedBuf::default();
        let progress = PullProgress::with_writer(Box::new(buf.clone()));
        progress.stop();
        assert_eq!(buf.contents(), "\n");
        assert!(!progress.has_layers());
    }

    #[test]
    fn aggregate_sums_across_layers() {
        let buf = SharedBuf::default();
        let progress = PullProgress::with_writer(Box::new(buf.clone()));
        progress.handle(&progress_msg("sha256:aaaaaaaaaaaaaaaaaaaa", 500, 500, 1000));
        std::thread::sleep(Duration::from_millis(110));
        progress.handle(&progress_msg("sha256:bbbbbbbbbbbbbbbbbbbb", 500, 500, 1000));
        let out = buf.contents();
        assert!(out.contains("100% |"), "missing aggregate in {out:?}");
    }

    #[test]
    fn human_sizes_use_base_1000() {
        assert_eq!(human_size(0.0), "0.00B");
        assert_eq!(human_size(999.0), "999.00B");
        assert_eq!(human_size(1000.0), "1.00kB");
        assert_eq!(human_size(1_500_000.0), "1.50MB");
        assert_eq!(human_size(2_000_000_000.0), "2.00GB");
    }

    #[test]
    fn human_times_split_into_units() {
        assert_eq!(human_time_pad(5, 0), "5s");
        assert_eq!(human_time_pad(65, 0), "1m 05s");
        assert_eq!(human_time_pad(3665, 0), "1h 01m 05s");
    }

    #[test]
    fn bar_width_clamps_to_minimum() {
        let bar = fmt_bar(50.0, 14, "100% |", "long suffix here");
        assert_eq!(bar.chars().count(), MIN_BAR_WIDTH);
    }

    #[test]
    fn bar_fill_tracks_percent() {
        let bar = fmt_bar(50.0, 100, "", "");
        let filled = bar.chars().filter(|&c| c == '█').count();
        assert_eq!(filled, 48); // (100 - 4) / 2
    }
}
