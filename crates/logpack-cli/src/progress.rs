//! Progress display for pack loads
//!
//! Renders the engine's [`ProgressEvent`]s on stderr: a byte bar while the
//! archive downloads, then a percentage bar per stage.

use indicatif::{ProgressBar, ProgressStyle};
use logpack_common::types::{ProgressEvent, Stage};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

const BYTES_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} {msg}";
const PERCENT_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos:>3}% {prefix:.bold} {msg}";

fn style(template: &str) -> ProgressStyle {
    ProgressStyle::default_bar()
        .template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-")
}

/// Create a spinner for indeterminate operations
pub fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Format bytes into human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", size as u64, UNITS[unit_idx])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}

#[derive(Debug)]
struct Display {
    bar: ProgressBar,
    stage: Option<Stage>,
    byte_mode: bool,
}

/// Progress bar fed by load events; cheap to clone into callbacks
#[derive(Debug, Clone)]
pub struct LoadProgress {
    inner: Arc<Mutex<Display>>,
}

impl Default for LoadProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadProgress {
    pub fn new() -> Self {
        Self::with_bar(ProgressBar::new(100))
    }

    /// Progress that draws nothing, for non-interactive runs
    pub fn hidden() -> Self {
        Self::with_bar(ProgressBar::hidden())
    }

    fn with_bar(bar: ProgressBar) -> Self {
        bar.set_style(style(PERCENT_TEMPLATE));
        bar.enable_steady_tick(Duration::from_millis(100));
        Self {
            inner: Arc::new(Mutex::new(Display {
                bar,
                stage: None,
                byte_mode: false,
            })),
        }
    }

    /// Apply one progress event
    pub fn update(&self, event: &ProgressEvent) {
        let mut display = self.inner.lock().unwrap_or_else(PoisonError::into_inner);

        if display.stage != Some(event.stage) {
            display.stage = Some(event.stage);
            display.bar.set_prefix(event.stage.to_string());
        }

        // Downloads with a known size are shown in bytes.
        match (event.stage, event.loaded_bytes, event.total_bytes) {
            (Stage::Download, Some(loaded), Some(total)) if total > 0 => {
                if !display.byte_mode {
                    display.byte_mode = true;
                    display.bar.set_style(style(BYTES_TEMPLATE));
                }
                display.bar.set_length(total);
                display.bar.set_position(loaded);
            },
            _ => {
                if display.byte_mode {
                    display.byte_mode = false;
                    display.bar.set_style(style(PERCENT_TEMPLATE));
                    display.bar.set_length(100);
                }
                if let Some(percent) = event.percent {
                    display.bar.set_position(u64::from(percent));
                }
            },
        }

        if let Some(ref message) = event.message {
            display.bar.set_message(message.clone());
        }
    }

    pub fn position(&self) -> u64 {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).bar.position()
    }

    pub fn stage(&self) -> Option<Stage> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).stage
    }

    /// Clear the bar once the load is done
    pub fn finish(&self) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .bar
            .finish_and_clear();
    }

    /// Leave the bar where it stopped, for failed loads
    pub fn abandon(&self) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .bar
            .abandon();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(1048576), "1.00 MB");
    }

    #[test]
    fn test_download_bytes_then_percent() {
        let progress = LoadProgress::hidden();
        progress.update(&ProgressEvent::new(Stage::Download).bytes(512, Some(2048)));
        assert_eq!(progress.position(), 512);
        assert_eq!(progress.stage(), Some(Stage::Download));

        progress.update(&ProgressEvent::new(Stage::Extract).percent(25).message("Parsing tar"));
        assert_eq!(progress.position(), 25);
        assert_eq!(progress.stage(), Some(Stage::Extract));
        progress.finish();
    }

    #[test]
    fn test_event_without_percent_keeps_position() {
        let progress = LoadProgress::hidden();
        progress.update(&ProgressEvent::new(Stage::Ingest).percent(35));
        progress.update(&ProgressEvent::new(Stage::Ingest).message("still going"));
        assert_eq!(progress.position(), 35);
    }

    #[test]
    fn test_create_spinner() {
        let pb = create_spinner("Loading pack");
        assert!(!pb.is_finished());
        pb.finish();
    }
}
