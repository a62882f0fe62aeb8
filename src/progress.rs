// ABOUTME: Progress reporting for export runs
// ABOUTME: Observer trait, weighted per-table progress tracking and the terminal progress bar

use indicatif::{ProgressBar, ProgressStyle};

/// Rows between interim progress updates within a table
pub const PROGRESS_ROW_INTERVAL: u64 = 50;

const BAR_STEPS: u64 = 1000;

/// Receives progress updates from an export run
///
/// `fraction` is the overall run progress in `[0, 1]`; it does not go backwards
/// except that the same value may be reported more than once. `message` is a
/// human readable status line. Updates arrive on the task running the export,
/// so a UI must hand them over to its own render loop.
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, fraction: f64, message: &str);
}

impl<F> ProgressObserver for F
where
    F: Fn(f64, &str) + Send + Sync,
{
    fn on_progress(&self, fraction: f64, message: &str) {
        self(fraction, message)
    }
}

/// Progress bar on the terminal
pub struct TerminalProgress {
    bar: ProgressBar,
}

impl TerminalProgress {
    pub fn new() -> Self {
        let bar = ProgressBar::new(BAR_STEPS);
        let style =
            ProgressStyle::with_template("[{elapsed_precise}] {bar:40.cyan/blue} {percent:>3}% {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("##-");
        bar.set_style(style);
        Self { bar }
    }

    /// Leave the bar on screen at its final position
    pub fn finish(&self) {
        self.bar.abandon();
    }
}

impl Default for TerminalProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressObserver for TerminalProgress {
    fn on_progress(&self, fraction: f64, message: &str) {
        let position = (fraction.clamp(0.0, 1.0) * BAR_STEPS as f64).round() as u64;
        self.bar.set_position(position);
        self.bar.set_message(message.to_string());
        tracing::debug!("progress {:.3}: {}", fraction, message);
    }
}

/// Maps per-table row counts onto the overall fraction
///
/// Every table gets the same share of the bar, whatever its size.
pub(crate) struct ProgressTracker<'a> {
    observer: &'a dyn ProgressObserver,
    weight: f64,
    last_fraction: f64,
}

impl<'a> ProgressTracker<'a> {
    pub fn new(observer: &'a dyn ProgressObserver, table_count: usize) -> Self {
        let weight = if table_count == 0 {
            1.0
        } else {
            1.0 / table_count as f64
        };
        Self {
            observer,
            weight,
            last_fraction: 0.0,
        }
    }

    pub fn emit(&mut self, fraction: f64, message: &str) {
        let fraction = fraction.clamp(0.0, 1.0);
        self.last_fraction = fraction;
        self.observer.on_progress(fraction, message);
    }

    pub fn last_fraction(&self) -> f64 {
        self.last_fraction
    }

    fn offset(&self, index: usize) -> f64 {
        self.weight * index as f64
    }

    fn table_end(&self, index: usize) -> f64 {
        self.offset(index) + self.weight
    }

    pub fn table_empty(&mut self, index: usize, table: &str) {
        self.emit(self.table_end(index), &format!("{} (0 rows)", table));
    }

    pub fn table_skipped(&mut self, index: usize, table: &str, reason: &str) {
        self.emit(
            self.table_end(index),
            &format!("{} skipped ({})", table, reason),
        );
    }

    /// Report rows `before + 1 ..= after` of a table with `total` rows
    ///
    /// Emits one update per multiple of [`PROGRESS_ROW_INTERVAL`] in that range.
    /// Returns true when an update reached the end of the table's band.
    pub fn rows_written(
        &mut self,
        index: usize,
        table: &str,
        before: u64,
        after: u64,
        total: u64,
    ) -> bool {
        let mut reached_end = false;
        let first = before / PROGRESS_ROW_INTERVAL + 1;
        let last = after / PROGRESS_ROW_INTERVAL;

        for step in first..=last {
            let rows = step * PROGRESS_ROW_INTERVAL;
            let ratio = (rows as f64 / total as f64).min(1.0);
            reached_end = ratio >= 1.0;
            self.emit(
                self.offset(index) + self.weight * ratio,
                &format!(
                    "{}: {}/{} rows ({:.1}%)",
                    table,
                    rows,
                    total,
                    ratio * 100.0
                ),
            );
        }

        reached_end
    }

    /// Close the table's band at `offset + weight` unless already there
    pub fn table_finished(
        &mut self,
        index: usize,
        table: &str,
        written: u64,
        total: Option<u64>,
        end_reported: bool,
    ) {
        if end_reported {
            return;
        }
        let message = match total {
            Some(total) => format!(
                "{}: {}/{} rows ({:.1}%)",
                table,
                written,
                total,
                (written as f64 / total.max(1) as f64).min(1.0) * 100.0
            ),
            None => format!("{} ({} rows)", table, written),
        };
        self.emit(self.table_end(index), &message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        updates: Mutex<Vec<(f64, String)>>,
    }

    impl ProgressObserver for Recorder {
        fn on_progress(&self, fraction: f64, message: &str) {
            self.updates
                .lock()
                .unwrap()
                .push((fraction, message.to_string()));
        }
    }

    impl Recorder {
        fn take(&self) -> Vec<(f64, String)> {
            std::mem::take(&mut *self.updates.lock().unwrap())
        }
    }

    #[test]
    fn test_closures_are_observers() {
        let seen = Mutex::new(Vec::new());
        let observer = |fraction: f64, message: &str| {
            seen.lock().unwrap().push((fraction, message.to_string()));
        };
        observer.on_progress(0.5, "half");
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_empty_table_is_one_update_at_band_end() {
        let recorder = Recorder::default();
        let mut tracker = ProgressTracker::new(&recorder, 4);

        tracker.table_empty(1, "contacts");

        let updates = recorder.take();
        assert_eq!(updates, vec![(0.5, "contacts (0 rows)".to_string())]);
    }

    #[test]
    fn test_rows_written_emits_every_fifty_rows_across_pages() {
        let recorder = Recorder::default();
        let mut tracker = ProgressTracker::new(&recorder, 1);

        // pages of 30 rows: 0..30, 30..60, 60..90, 90..120
        assert!(!tracker.rows_written(0, "t", 0, 30, 120));
        assert!(!tracker.rows_written(0, "t", 30, 60, 120));
        assert!(!tracker.rows_written(0, "t", 60, 90, 120));
        assert!(!tracker.rows_written(0, "t", 90, 120, 120));

        let updates = recorder.take();
        let fractions: Vec<f64> = updates.iter().map(|(f, _)| *f).collect();
        assert_eq!(fractions, vec![50.0 / 120.0, 100.0 / 120.0]);
        assert_eq!(updates[0].1, "t: 50/120 rows (41.7%)");
    }

    #[test]
    fn test_exact_multiple_reaches_band_end() {
        let recorder = Recorder::default();
        let mut tracker = ProgressTracker::new(&recorder, 2);

        let reached = tracker.rows_written(1, "t", 0, 100, 100);
        assert!(reached);
        tracker.table_finished(1, "t", 100, Some(100), reached);

        let updates = recorder.take();
        assert_eq!(updates.len(), 2);
        assert_eq!(updates.last().unwrap().0, 1.0);
    }

    #[test]
    fn test_finish_closes_band_when_throttle_missed_it() {
        let recorder = Recorder::default();
        let mut tracker = ProgressTracker::new(&recorder, 2);

        let reached = tracker.rows_written(0, "t", 0, 73, 73);
        assert!(!reached);
        tracker.table_finished(0, "t", 73, Some(73), reached);

        let updates = recorder.take();
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[1], (0.5, "t: 73/73 rows (100.0%)".to_string()));
    }

    #[test]
    fn test_unknown_total_reports_once() {
        let recorder = Recorder::default();
        let mut tracker = ProgressTracker::new(&recorder, 1);

        tracker.table_finished(0, "t", 12, None, false);

        assert_eq!(recorder.take(), vec![(1.0, "t (12 rows)".to_string())]);
    }

    #[test]
    fn test_more_rows_than_counted_is_clamped() {
        let recorder = Recorder::default();
        let mut tracker = ProgressTracker::new(&recorder, 1);

        assert!(tracker.rows_written(0, "t", 0, 150, 60));
        assert!(recorder.take().iter().all(|(f, _)| *f <= 1.0));
        assert_eq!(tracker.last_fraction(), 1.0);
    }
}
