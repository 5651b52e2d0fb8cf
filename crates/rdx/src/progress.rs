//! Terminal progress display for a running reindex: an indicatif bar over a
//! comfy-table of throughput figures, fed from handle snapshots.
//!
//! Rates come from a 5 second sliding window so short bursts do not whip the
//! displayed numbers around.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::NOTHING};
use indicatif::{ProgressBar, ProgressStyle};

const RATE_WINDOW: Duration = Duration::from_secs(5);

/// Comma-grouped integer formatting for the table.
fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result
}

fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}

struct Rates {
    read_per_sec: f64,
    written_per_sec: f64,
}

/// Tracks read/written document totals against an expected total (0 when the
/// source count is unknown, remote sources mostly) and renders the display.
pub struct ProgressMetrics {
    job_name: String,
    expected_docs: u64,
    read: u64,
    written: u64,
    failed: u64,
    progress_bar: ProgressBar,
    // (timestamp, read, written) samples inside the rate window
    rate_samples: VecDeque<(Instant, u64, u64)>,
    start_time: Instant,
}

impl std::fmt::Debug for ProgressMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // ProgressBar does not derive Debug
        f.debug_struct("ProgressMetrics")
            .field("job_name", &self.job_name)
            .field("expected_docs", &self.expected_docs)
            .field("read", &self.read)
            .field("written", &self.written)
            .field("failed", &self.failed)
            .finish()
    }
}

impl ProgressMetrics {
    pub fn new(job_name: String, expected_docs: u64) -> Self {
        let progress_bar = ProgressBar::new(expected_docs);
        progress_bar.set_style(
            ProgressStyle::default_bar()
                .template("{msg}\n| [{bar:40.cyan/blue}]")
                .expect("hardcoded progress template")
                .progress_chars("=>-"),
        );

        let start_time = Instant::now();
        let mut rate_samples = VecDeque::new();
        rate_samples.push_back((start_time, 0u64, 0u64));

        Self {
            job_name,
            expected_docs,
            read: 0,
            written: 0,
            failed: 0,
            progress_bar,
            rate_samples,
            start_time,
        }
    }

    /// Feeds the display with the latest handle counters. Totals are
    /// cumulative, so callers pass snapshots, not deltas.
    pub fn update(&mut self, read: u64, written: u64, failed: u64) {
        self.read = read;
        self.written = written;
        self.failed = failed;

        let rates = self.calculate_rates();
        self.render(rates);
        self.progress_bar.set_position(self.written);
    }

    pub fn finish(&self) {
        self.progress_bar.finish();
    }

    fn calculate_rates(&mut self) -> Rates {
        let now = Instant::now();
        while let Some(&(timestamp, _, _)) = self.rate_samples.front() {
            if now.duration_since(timestamp) > RATE_WINDOW {
                self.rate_samples.pop_front();
            } else {
                break;
            }
        }
        self.rate_samples.push_back((now, self.read, self.written));

        if let Some(&(oldest_time, oldest_read, oldest_written)) = self.rate_samples.front() {
            let elapsed = now.duration_since(oldest_time).as_secs_f64();
            if elapsed > 0.0 {
                return Rates {
                    read_per_sec: self.read.saturating_sub(oldest_read) as f64 / elapsed,
                    written_per_sec: self.written.saturating_sub(oldest_written) as f64 / elapsed,
                };
            }
        }
        Rates {
            read_per_sec: 0.0,
            written_per_sec: 0.0,
        }
    }

    fn render(&self, rates: Rates) {
        let percent = if self.expected_docs > 0 {
            (self.written as f64 / self.expected_docs as f64) * 100.0
        } else {
            0.0
        };

        let elapsed = self.start_time.elapsed();
        let remaining = if percent > 0.0 {
            // Linear extrapolation from progress so far.
            let total_estimated = elapsed.as_secs_f64() / (percent / 100.0);
            let remaining_secs = total_estimated - elapsed.as_secs_f64();
            if remaining_secs > 0.0 {
                format_duration(Duration::from_secs_f64(remaining_secs))
            } else {
                "--:--".to_string()
            }
        } else {
            "--:--".to_string()
        };

        let written_progress = if self.expected_docs > 0 {
            format!(
                "{} / {}",
                format_number(self.written),
                format_number(self.expected_docs)
            )
        } else {
            format!("{} written", format_number(self.written))
        };

        let mut table = Table::new();
        table.load_preset(NOTHING);
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.add_row(vec![
            Cell::new(format!("{} read/s", format_number(rates.read_per_sec as u64)))
                .set_alignment(CellAlignment::Right),
            Cell::new(format!("{} read", format_number(self.read)))
                .set_alignment(CellAlignment::Right),
        ]);
        table.add_row(vec![
            Cell::new(format!(
                "{} written/s",
                format_number(rates.written_per_sec as u64)
            ))
            .set_alignment(CellAlignment::Right),
            Cell::new(written_progress).set_alignment(CellAlignment::Right),
        ]);
        table.add_row(vec![
            Cell::new(format!("{} failed", format_number(self.failed)))
                .set_alignment(CellAlignment::Right),
            Cell::new(format!("{:.2}%", percent)).set_alignment(CellAlignment::Right),
        ]);
        table.add_row(vec![
            Cell::new(format!("{} elapsed", format_duration(elapsed)))
                .set_alignment(CellAlignment::Right),
            Cell::new(format!("{} remaining", remaining)).set_alignment(CellAlignment::Right),
        ]);

        self.progress_bar
            .set_message(format!("reindex: {}\n{}", self.job_name, table));
    }
}
