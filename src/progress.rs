//! Progress reporting utilities using indicatif.
//!
//! [`Progress`] implements [`ProgressCallback`] with one bar per pipeline
//! phase (`fingerprint` and `compare`). In streaming mode both bars are
//! live at the same time.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

/// Phase name used by the fingerprint stage.
pub const PHASE_FINGERPRINT: &str = "fingerprint";
/// Phase name used by the pairwise comparison stage.
pub const PHASE_COMPARE: &str = "compare";

/// Progress callback for pipeline phases.
///
/// Implementations must tolerate calls from several worker threads at once.
pub trait ProgressCallback: Send + Sync {
    /// Called when a phase starts.
    ///
    /// # Arguments
    ///
    /// * `phase` - Name of the phase ([`PHASE_FINGERPRINT`] or [`PHASE_COMPARE`])
    /// * `total` - Total number of units in the phase
    fn on_phase_start(&self, phase: &str, total: usize);

    /// Called once per finished unit.
    ///
    /// # Arguments
    ///
    /// * `phase` - Phase the unit belongs to
    /// * `label` - Path (or pair) that was processed
    fn on_progress(&self, phase: &str, label: &str);

    /// Called when a phase completes.
    fn on_phase_end(&self, phase: &str);

    /// Called when the expected total of a running phase changes.
    ///
    /// The streaming pipeline lowers the compare total as paths fail to
    /// load. The default ignores the update.
    fn on_total_changed(&self, _phase: &str, _total: usize) {}
}

/// Progress reporter using indicatif.
pub struct Progress {
    multi: MultiProgress,
    fingerprint: Mutex<Option<ProgressBar>>,
    compare: Mutex<Option<ProgressBar>>,
    done: [AtomicU64; 2],
    quiet: bool,
}

impl Progress {
    /// Create a new progress reporter.
    ///
    /// # Arguments
    ///
    /// * `quiet` - If true, no progress bars will be displayed.
    ///
    /// # Examples
    ///
    /// ```
    /// use chunksim::progress::Progress;
    ///
    /// let progress = Progress::new(false);
    /// ```
    #[must_use]
    pub fn new(quiet: bool) -> Self {
        Self {
            multi: MultiProgress::new(),
            fingerprint: Mutex::new(None),
            compare: Mutex::new(None),
            done: [AtomicU64::new(0), AtomicU64::new(0)],
            quiet,
        }
    }

    fn style(phase: &str) -> ProgressStyle {
        let template = if phase == PHASE_COMPARE {
            "[{elapsed_precise}] [{bar:40.green/blue}] {pos}/{len} ({percent}%) {msg} {per_sec}"
        } else {
            "[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg} (ETA: {eta})"
        };
        ProgressStyle::with_template(template)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█>-")
    }

    fn slot(&self, phase: &str) -> Option<(&Mutex<Option<ProgressBar>>, &AtomicU64)> {
        match phase {
            PHASE_FINGERPRINT => Some((&self.fingerprint, &self.done[0])),
            PHASE_COMPARE => Some((&self.compare, &self.done[1])),
            _ => None,
        }
    }
}

impl ProgressCallback for Progress {
    fn on_phase_start(&self, phase: &str, total: usize) {
        if self.quiet {
            return;
        }
        let Some((bar, done)) = self.slot(phase) else {
            return;
        };

        let pb = self.multi.add(ProgressBar::new(total as u64));
        pb.set_style(Self::style(phase));
        pb.set_message(if phase == PHASE_COMPARE {
            "Comparing"
        } else {
            "Fingerprinting"
        });
        done.store(0, Ordering::Relaxed);
        if let Ok(mut slot) = bar.lock() {
            *slot = Some(pb);
        }
    }

    fn on_progress(&self, phase: &str, label: &str) {
        if self.quiet {
            return;
        }
        let Some((bar, done)) = self.slot(phase) else {
            return;
        };

        let position = done.fetch_add(1, Ordering::Relaxed) + 1;
        if let Ok(slot) = bar.lock() {
            if let Some(ref pb) = *slot {
                // Streaming mode grows the compare phase as pairs become ready.
                if pb.length().is_some_and(|len| position > len) {
                    pb.set_length(position);
                }
                pb.set_position(position);
                pb.set_message(truncate_path(label, 30));
            }
        }
    }

    fn on_total_changed(&self, phase: &str, total: usize) {
        if self.quiet {
            return;
        }
        let Some((bar, _)) = self.slot(phase) else {
            return;
        };

        if let Ok(slot) = bar.lock() {
            if let Some(ref pb) = *slot {
                pb.set_length((total as u64).max(pb.position()));
            }
        }
    }

    fn on_phase_end(&self, phase: &str) {
        if self.quiet {
            return;
        }
        let Some((bar, _)) = self.slot(phase) else {
            return;
        };

        if let Some(pb) = bar.lock().ok().and_then(|mut slot| slot.take()) {
            pb.finish_with_message(if phase == PHASE_COMPARE {
                "Comparison complete"
            } else {
                "Fingerprinting complete"
            });
        }
    }
}

/// Truncate a path for display in the progress bar.
fn truncate_path(path: &str, max_len: usize) -> String {
    if path.chars().count() <= max_len {
        return path.to_string();
    }

    let file_name = std::path::Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let name_len = file_name.chars().count();
    if name_len >= max_len {
        let tail: String = file_name.chars().skip(name_len - max_len + 3).collect();
        return format!("...{tail}");
    }

    format!(".../{file_name}")
}
