//! Progress accounting for the two-pass conversion.
//!
//! ffmpeg reports progress as log text; [`ProgressParser`] turns those lines
//! into a completion ratio. [`ProgressTracker`] maps per-pass ratios onto a
//! single 0–100 percentage: the palette pass covers 0–50 and the encode pass
//! 50–100.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

use crate::models::ConversionPass;

/// Parses an ffmpeg timestamp (`HH:MM:SS.ms`) into seconds.
pub fn parse_timestamp(ts: &str) -> Option<f64> {
    let mut parts = ts.trim().split(':');
    let hours: f64 = parts.next()?.parse().ok()?;
    let minutes: f64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || hours < 0.0 || minutes < 0.0 || seconds < 0.0 {
        return None;
    }
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

/// Extracts the input duration from a `Duration: 00:00:05.00, start: ...` line.
pub fn parse_duration_line(line: &str) -> Option<f64> {
    let rest = line.trim_start().strip_prefix("Duration:")?;
    let ts = rest.split(',').next()?;
    parse_timestamp(ts)
}

/// Extracts the position from a `frame=... time=00:00:01.20 bitrate=...` line.
pub fn parse_time_field(line: &str) -> Option<f64> {
    let (_, rest) = line.split_once("time=")?;
    let ts = rest.split_whitespace().next()?;
    parse_timestamp(ts)
}

/// Derives a completion ratio from the log lines of one ffmpeg command.
#[derive(Debug, Default)]
pub struct ProgressParser {
    duration: Option<f64>,
}

impl ProgressParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one log line; returns a ratio when the line carries a position.
    ///
    /// With several inputs the longest duration wins, so a still image input
    /// (such as the palette) does not make the video look finished.
    pub fn feed(&mut self, line: &str) -> Option<f64> {
        if let Some(duration) = parse_duration_line(line) {
            if duration > 0.0 && self.duration.is_none_or(|d| duration > d) {
                self.duration = Some(duration);
            }
            return None;
        }

        let position = parse_time_field(line)?;
        let duration = self.duration?;
        Some((position / duration).clamp(0.0, 1.0))
    }
}

/// Percentage shown for `ratio` within `pass`.
pub fn pass_percent(pass: ConversionPass, ratio: f64) -> u8 {
    let ratio = if ratio.is_finite() {
        ratio.clamp(0.0, 1.0)
    } else {
        0.0
    };
    let half = (ratio * 100.0 / 2.0).floor() as u8;
    match pass {
        ConversionPass::Palette => half,
        ConversionPass::Encode => 50 + half,
    }
}

/// Combined progress of one conversion at a time.
///
/// Each pass gets a fresh token; ticks carrying an older token are dropped,
/// so the switch to the encode pass is a hard cutover. Within a run the
/// published value never decreases.
pub struct ProgressTracker {
    tx: watch::Sender<Option<u8>>,
    current_token: AtomicU64,
}

impl ProgressTracker {
    pub fn new() -> Arc<Self> {
        let (tx, _) = watch::channel(None);
        Arc::new(Self {
            tx,
            current_token: AtomicU64::new(0),
        })
    }

    pub fn get(&self) -> Option<u8> {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<u8>> {
        self.tx.subscribe()
    }

    /// Clears the value at the start of a run and invalidates any reporter
    /// still held by a previous pass.
    pub fn reset(&self) {
        self.current_token.fetch_add(1, Ordering::SeqCst);
        self.tx.send_replace(None);
    }

    pub fn begin_pass(self: &Arc<Self>, pass: ConversionPass) -> PassReporter {
        let token = self.current_token.fetch_add(1, Ordering::SeqCst) + 1;
        PassReporter {
            tracker: self.clone(),
            token,
            pass,
        }
    }

    /// Marks the run finished at exactly 100.
    pub fn complete(&self) {
        self.current_token.fetch_add(1, Ordering::SeqCst);
        self.tx.send_replace(Some(100));
    }

    fn publish(&self, token: u64, percent: u8) {
        self.tx.send_if_modified(|value| {
            if self.current_token.load(Ordering::SeqCst) != token {
                return false;
            }
            match *value {
                Some(current) if current >= percent => false,
                _ => {
                    *value = Some(percent);
                    true
                }
            }
        });
    }
}

/// Handle given to the service's progress callback for one pass.
#[derive(Clone)]
pub struct PassReporter {
    tracker: Arc<ProgressTracker>,
    token: u64,
    pass: ConversionPass,
}

impl PassReporter {
    pub fn pass(&self) -> ConversionPass {
        self.pass
    }

    pub fn report(&self, ratio: f64) {
        self.tracker.publish(self.token, pass_percent(self.pass, ratio));
    }
}
