//! # Output Watcher
//!
//! Polls a directory for kube-bench result files and hands back the first one
//! that is fully written and parseable.
//!
//! ## Readiness
//!
//! There is no notification from the writer, so a file is treated as complete
//! when its size is non-zero and unchanged across a short stability window.
//! A complete-looking file that still fails to parse is logged and polling
//! continues; only the deadline ends the watch.
//!
//! ```text
//! POLLING ──(candidate stable + parse ok)──► DONE
//!    │
//!    └──────────(deadline reached)─────────► TIMEOUT
//! ```
//!
//! Only the most recently modified candidate is ever considered. The watcher
//! never writes into the directory.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use crate::document::ScanDocument;
use crate::parser;

/// Delay between polls when no complete file is found
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Window over which a candidate's size must stay unchanged
pub const DEFAULT_STABILITY_WINDOW: Duration = Duration::from_secs(3);

/// Default upper bound on a watch
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(300);

/// Extension that marks a file as a scan result
pub const DEFAULT_EXTENSION: &str = "json";

// ============================================================================
// Configuration and outcome
// ============================================================================

/// Timing and matching parameters for a watch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchConfig {
    pub max_wait: Duration,
    pub poll_interval: Duration,
    pub stability_window: Duration,
    /// Candidate extension, compared case-insensitively and without the dot
    pub extension: String,
}

impl WatchConfig {
    pub fn new(max_wait: Duration) -> Self {
        Self {
            max_wait,
            ..Self::default()
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_stability_window(mut self, stability_window: Duration) -> Self {
        self.stability_window = stability_window;
        self
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into().trim_start_matches('.').to_string();
        self
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            max_wait: DEFAULT_MAX_WAIT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            stability_window: DEFAULT_STABILITY_WINDOW,
            extension: DEFAULT_EXTENSION.to_string(),
        }
    }
}

/// Result of [`OutputWatcher::wait_for_result`]
///
/// A timeout is an expected outcome, distinct from a report with zero
/// findings.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchOutcome {
    /// A complete, parseable result was found
    Ready { path: PathBuf, document: ScanDocument },
    /// The deadline passed without a usable result
    TimedOut { waited: Duration },
}

impl WatchOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, WatchOutcome::Ready { .. })
    }

    pub fn into_document(self) -> Option<ScanDocument> {
        match self {
            WatchOutcome::Ready { document, .. } => Some(document),
            WatchOutcome::TimedOut { .. } => None,
        }
    }
}

/// Loop-local state, dropped when the watch returns
struct WatchState {
    deadline: Instant,
    last_seen: Option<PathBuf>,
}

// ============================================================================
// Watcher
// ============================================================================

/// Watches one directory for scan results
#[derive(Debug, Clone)]
pub struct OutputWatcher {
    directory: PathBuf,
    config: WatchConfig,
}

impl OutputWatcher {
    pub fn new(directory: impl Into<PathBuf>, config: WatchConfig) -> Self {
        Self {
            directory: directory.into(),
            config,
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    /// Block until a complete result is parsed or `max_wait` elapses
    ///
    /// Returns no earlier than `max_wait` on timeout, and no later than
    /// `max_wait + poll_interval + stability_window`.
    pub fn wait_for_result(&self) -> WatchOutcome {
        log::info!(
            "Monitoring kube-bench output directory: {}",
            self.directory.display()
        );

        let start = Instant::now();
        let mut state = WatchState {
            deadline: start + self.config.max_wait,
            last_seen: None,
        };

        while Instant::now() < state.deadline {
            if let Some(path) = self.latest_candidate() {
                if state.last_seen.as_ref() != Some(&path) {
                    log::info!("Found kube-bench output file: {}", path.display());
                    state.last_seen = Some(path.clone());
                }

                if self.is_file_complete(&path) {
                    log::info!("File appears complete, attempting to parse");
                    match parser::parse(&path) {
                        Ok(document) => {
                            log::info!("Kube-bench output processed: {}", path.display());
                            return WatchOutcome::Ready { path, document };
                        }
                        Err(e) => {
                            log::warn!("Result file not usable yet ({}), continuing to wait", e);
                        }
                    }
                } else {
                    log::debug!("{} still being written", path.display());
                }
            }

            let remaining = state.deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            thread::sleep(self.config.poll_interval.min(remaining));
        }

        let waited = start.elapsed();
        log::warn!(
            "No complete kube-bench output found after {} seconds",
            waited.as_secs()
        );
        WatchOutcome::TimedOut { waited }
    }

    /// Parse whatever the newest candidate holds right now
    ///
    /// No waiting and no stability check.
    pub fn peek_latest(&self) -> Option<ScanDocument> {
        let Some(path) = self.latest_candidate() else {
            log::info!("No kube-bench output files found");
            return None;
        };

        match parser::parse(&path) {
            Ok(document) => {
                log::info!("Retrieved latest kube-bench output from {}", path.display());
                Some(document)
            }
            Err(e) => {
                log::error!("Error processing latest kube-bench output: {}", e);
                None
            }
        }
    }

    /// Whether at least one candidate file exists
    pub fn is_output_available(&self) -> bool {
        !self.candidates().is_empty()
    }

    /// The single most recently modified candidate
    ///
    /// Equal modification times fall back to the greater path so the choice
    /// is deterministic.
    pub fn latest_candidate(&self) -> Option<PathBuf> {
        self.candidates()
            .into_iter()
            .max_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)))
            .map(|(path, _)| path)
    }

    /// Candidate files with their modification times (non-recursive)
    fn candidates(&self) -> Vec<(PathBuf, SystemTime)> {
        let entries = match fs::read_dir(&self.directory) {
            Ok(entries) => entries,
            Err(e) => {
                log::debug!(
                    "Cannot read output directory {}: {}",
                    self.directory.display(),
                    e
                );
                return Vec::new();
            }
        };

        let mut candidates = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if !self.matches_extension(&path) {
                continue;
            }
            let Ok(metadata) = entry.metadata() else {
                continue;
            };
            if !metadata.is_file() {
                continue;
            }
            let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            candidates.push((path, modified));
        }

        candidates
    }

    fn matches_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(&self.config.extension))
    }

    /// Size-stability check; sleeps for the stability window
    fn is_file_complete(&self, path: &Path) -> bool {
        let initial = match fs::metadata(path) {
            Ok(m) => m.len(),
            Err(e) => {
                log::warn!("Error checking file completion: {}", e);
                return false;
            }
        };

        thread::sleep(self.config.stability_window);

        match fs::metadata(path) {
            Ok(m) => initial == m.len() && m.len() > 0,
            Err(e) => {
                log::warn!("Error checking file completion: {}", e);
                false
            }
        }
    }
}

// ============================================================================
// Convenience functions
// ============================================================================

/// Watch `directory` with default intervals for up to `max_wait_seconds`
pub fn wait_for_result<P: AsRef<Path>>(directory: P, max_wait_seconds: u64) -> WatchOutcome {
    OutputWatcher::new(
        directory.as_ref(),
        WatchConfig::new(Duration::from_secs(max_wait_seconds)),
    )
    .wait_for_result()
}

/// Non-blocking read of the newest candidate in `directory`
pub fn peek_latest<P: AsRef<Path>>(directory: P) -> Option<ScanDocument> {
    OutputWatcher::new(directory.as_ref(), WatchConfig::default()).peek_latest()
}

// ============================================================================
// Tests
// ============================================================================

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::OpenOptions;
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    const POLL: Duration = Duration::from_millis(50);
    const STABILITY: Duration = Duration::from_millis(250);

    fn fast_config(max_wait: Duration) -> WatchConfig {
        WatchConfig::new(max_wait)
            .with_poll_interval(POLL)
            .with_stability_window(STABILITY)
    }

    fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_empty_directory_times_out_within_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let max_wait = Duration::from_millis(400);
        let watcher = OutputWatcher::new(dir.path(), fast_config(max_wait));

        let start = Instant::now();
        let outcome = watcher.wait_for_result();
        let elapsed = start.elapsed();

        assert!(matches!(outcome, WatchOutcome::TimedOut { .. }));
        assert!(elapsed >= max_wait);
        // generous slack for slow CI schedulers
        assert!(elapsed <= max_wait + POLL + STABILITY + Duration::from_millis(500));
    }

    #[test]
    fn test_missing_directory_times_out() {
        let watcher = OutputWatcher::new(
            "/nonexistent/kube-bench-results",
            fast_config(Duration::from_millis(100)),
        );
        assert!(!watcher.wait_for_result().is_ready());
        assert!(!watcher.is_output_available());
    }

    #[test]
    fn test_complete_file_is_returned() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "results.json", r#"{"Controls": []}"#);
        let watcher = OutputWatcher::new(dir.path(), fast_config(Duration::from_secs(5)));

        match watcher.wait_for_result() {
            WatchOutcome::Ready {
                path: found,
                document,
            } => {
                assert_eq!(found, path);
                assert!(document.has_controls());
            }
            other => panic!("expected a result, got {:?}", other),
        }
    }

    #[test]
    fn test_unparseable_file_keeps_polling_until_timeout() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "results.json", "{ not json");
        let max_wait = Duration::from_millis(600);
        let watcher = OutputWatcher::new(dir.path(), fast_config(max_wait));

        let start = Instant::now();
        let outcome = watcher.wait_for_result();

        assert!(!outcome.is_ready());
        assert!(start.elapsed() >= max_wait);
    }

    #[test]
    fn test_empty_file_is_never_complete() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "results.json", "");
        let watcher = OutputWatcher::new(dir.path(), fast_config(Duration::from_millis(400)));

        assert!(!watcher.wait_for_result().is_ready());
    }

    #[test]
    fn test_gradually_written_file_waits_for_stability() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");
        let finished_at: Arc<Mutex<Option<Instant>>> = Arc::new(Mutex::new(None));

        let writer_path = path.clone();
        let writer_finished = Arc::clone(&finished_at);
        let writer = thread::spawn(move || {
            let chunks = [
                r#"{"Controls": ["#,
                r#"{"id": "1", "text": "Control Plane", "#,
                r#""total_pass": 2, "total_fail": 1}"#,
                r#"], "Totals": {"total_pass": 2, "#,
                r#""total_fail": 1}}"#,
            ];
            for chunk in chunks {
                let mut file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&writer_path)
                    .unwrap();
                file.write_all(chunk.as_bytes()).unwrap();
                file.sync_all().unwrap();
                *writer_finished.lock().unwrap() = Some(Instant::now());
                thread::sleep(Duration::from_millis(100));
            }
        });

        let watcher = OutputWatcher::new(dir.path(), fast_config(Duration::from_secs(10)));
        let outcome = watcher.wait_for_result();
        let returned_at = Instant::now();
        writer.join().unwrap();

        let last_write = finished_at.lock().unwrap().unwrap();
        assert!(outcome.is_ready());
        assert!(returned_at >= last_write + STABILITY);
    }

    #[test]
    fn test_latest_candidate_wins_and_others_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "old.json", r#"{"Totals": {"total_fail": 1}}"#);
        thread::sleep(Duration::from_millis(50));
        let newest = write_file(dir.path(), "new.json", r#"{"Totals": {"total_fail": 7}}"#);
        write_file(dir.path(), "notes.txt", "not a result");

        let watcher = OutputWatcher::new(dir.path(), fast_config(Duration::from_secs(1)));
        assert_eq!(watcher.latest_candidate(), Some(newest));

        let doc = watcher.peek_latest().unwrap();
        assert_eq!(doc.totals().get("total_fail").count(), 7);
    }

    #[test]
    fn test_peek_latest_without_candidates() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "readme.md", "# nothing here");

        assert!(peek_latest(dir.path()).is_none());
        assert!(!OutputWatcher::new(dir.path(), WatchConfig::default()).is_output_available());
    }

    #[test]
    fn test_peek_latest_unparseable_is_none() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "results.json", "{ truncated");
        assert!(peek_latest(dir.path()).is_none());
    }

    #[test]
    fn test_extension_match_is_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "RESULTS.JSON", "{}");
        let watcher = OutputWatcher::new(
            dir.path(),
            WatchConfig::default().with_extension(".json"),
        );

        assert_eq!(watcher.latest_candidate(), Some(path));
    }
}
