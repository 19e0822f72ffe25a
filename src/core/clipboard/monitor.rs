use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::history::HistoryStore;
use super::state::MonitorState;
use crate::shared::errors::{AppError, AppResult};
use crate::shared::types::{ClipboardEntry, EntryId};
use crate::system::clipboard::ClipboardAccess;

/// Read failures are logged on the first occurrence and then every Nth
const READ_ERROR_LOG_EVERY: u32 = 10;

/// What a single detection cycle decided
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Change-count unchanged since the last cycle
    Unchanged,
    /// Clipboard changed while monitoring was paused
    Paused,
    /// Clipboard changed to empty or non-text content
    Ignored,
    /// Same text as the most recent entry
    Duplicate,
    Captured(EntryId),
}

struct MonitorInner {
    clipboard: Arc<dyn ClipboardAccess>,
    history: HistoryStore,
    state: Mutex<MonitorState>,
    paused: AtomicBool,
}

impl MonitorInner {
    fn lock_state(&self) -> MutexGuard<'_, MonitorState> {
        // A panicking cycle leaves at worst a stale change-count, which the
        // next cycle overwrites
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn run_cycle(&self) -> AppResult<CycleOutcome> {
        let mut state = self.lock_state();

        let count = match self.clipboard.change_count() {
            Ok(count) => count,
            Err(e) => return Err(read_failed(&mut state, e)),
        };
        if state.last_change_count == Some(count) {
            return Ok(CycleOutcome::Unchanged);
        }

        if self.paused.load(Ordering::SeqCst) {
            state.last_change_count = Some(count);
            debug!(count, "clipboard changed while paused");
            return Ok(CycleOutcome::Paused);
        }

        let text = match self.clipboard.read_text() {
            Ok(text) => text,
            Err(e) => return Err(read_failed(&mut state, e)),
        };
        if let Some(streak) = state.record_read_success() {
            info!(failures = streak, "clipboard readable again");
        }

        // The change is consumed from here on, even if storing it fails
        state.last_change_count = Some(count);

        let Some(text) = text.filter(|t| !t.is_empty()) else {
            debug!(count, "ignoring empty or non-text clipboard content");
            return Ok(CycleOutcome::Ignored);
        };

        let latest = self.history.most_recent()?;
        if latest.as_ref().map(ClipboardEntry::content) == Some(text.as_str()) {
            debug!(count, "clipboard matches most recent entry");
            return Ok(CycleOutcome::Duplicate);
        }

        let timestamp = capture_timestamp(latest.as_ref(), Utc::now());
        let id = self.history.insert(text, timestamp)?;
        info!(%id, count, "captured clipboard entry");
        Ok(CycleOutcome::Captured(id))
    }

    /// One timer tick: run a cycle and contain whatever goes wrong
    fn tick(&self) {
        match self.run_cycle() {
            Ok(_) => {}
            Err(e @ AppError::ClipboardRead(_)) => {
                let streak = self.lock_state().consecutive_read_errors();
                if streak == 1 || streak % READ_ERROR_LOG_EVERY == 0 {
                    warn!(error = %e, consecutive = streak, "failed to read clipboard, retrying next tick");
                }
            }
            Err(e) => {
                error!(error = %e, "clipboard capture lost");
            }
        }
    }
}

fn read_failed(state: &mut MonitorState, err: AppError) -> AppError {
    state.record_read_failure();
    err
}

/// Capture time, nudged past the newest stored entry if the wall clock went
/// backwards
fn capture_timestamp(latest: Option<&ClipboardEntry>, now: DateTime<Utc>) -> DateTime<Utc> {
    match latest {
        Some(entry) if entry.timestamp() >= now => {
            entry.timestamp() + chrono::Duration::microseconds(1)
        }
        _ => now,
    }
}

async fn run_loop(inner: Arc<MonitorInner>, period: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = time::interval(period);
    // A tick that fires during a slow cycle is dropped, not queued
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(interval_ms = period.as_millis() as u64, "clipboard monitoring started");

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {}
        }

        // Awaited to completion: a stop request lands at the next tick boundary
        let worker = Arc::clone(&inner);
        if let Err(e) = tokio::task::spawn_blocking(move || worker.tick()).await {
            error!(error = %e, "clipboard cycle panicked");
        }
    }

    info!("clipboard monitoring stopped");
}

struct RunningTask {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Clipboard monitor that polls for changes
pub struct ClipboardMonitor {
    inner: Arc<MonitorInner>,
    poll_interval: Duration,
    task: Mutex<Option<RunningTask>>,
}

impl ClipboardMonitor {
    pub fn new(
        clipboard: Arc<dyn ClipboardAccess>,
        history: HistoryStore,
        poll_interval: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(MonitorInner {
                clipboard,
                history,
                state: Mutex::new(MonitorState::new()),
                paused: AtomicBool::new(false),
            }),
            poll_interval,
            task: Mutex::new(None),
        }
    }

    pub fn history(&self) -> &HistoryStore {
        &self.inner.history
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    fn lock_task(&self) -> MutexGuard<'_, Option<RunningTask>> {
        self.task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run exactly one detection cycle on the calling thread
    pub fn poll_once(&self) -> AppResult<CycleOutcome> {
        self.inner.run_cycle()
    }

    /// Start the polling loop on the current tokio runtime.
    ///
    /// Returns `Ok(false)` when a loop is already running.
    pub fn start_monitoring(&self) -> AppResult<bool> {
        if self.poll_interval.is_zero() {
            return Err(AppError::Configuration(
                "Clipboard poll interval must be greater than zero".to_string(),
            ));
        }

        let mut task = self.lock_task();
        if let Some(running) = task.as_ref() {
            if !running.handle.is_finished() {
                debug!("clipboard monitor already running");
                return Ok(false);
            }
        }

        let runtime = Handle::try_current().map_err(|e| {
            AppError::Configuration(format!("Clipboard monitor needs a tokio runtime: {}", e))
        })?;
        let (shutdown, rx) = watch::channel(false);
        let handle = runtime.spawn(run_loop(Arc::clone(&self.inner), self.poll_interval, rx));

        *task = Some(RunningTask { shutdown, handle });
        Ok(true)
    }

    /// Ask the loop to exit at the next tick boundary.
    ///
    /// Returns whether a loop was running.
    pub fn stop_monitoring(&self) -> bool {
        match self.lock_task().take() {
            Some(running) => {
                let _ = running.shutdown.send(true);
                !running.handle.is_finished()
            }
            None => false,
        }
    }

    /// Stop and wait for the in-flight cycle to finish
    pub async fn shutdown(&self) {
        let running = self.lock_task().take();
        if let Some(running) = running {
            let _ = running.shutdown.send(true);
            if let Err(e) = running.handle.await {
                error!(error = %e, "clipboard monitor task failed");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.lock_task()
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
    }

    /// Stop recording; clipboard changes seen while paused are skipped for good
    pub fn pause(&self) {
        self.inner.paused.store(true, Ordering::SeqCst);
        info!("clipboard monitor paused");
    }

    pub fn resume(&self) {
        self.inner.paused.store(false, Ordering::SeqCst);
        info!("clipboard monitor resumed");
    }

    pub fn is_paused(&self) -> bool {
        self.inner.paused.load(Ordering::SeqCst)
    }

    /// Toggle pause; returns true when recording is active afterwards
    pub fn toggle(&self) -> bool {
        let was_paused = self.inner.paused.fetch_xor(true, Ordering::SeqCst);
        info!(active = was_paused, "clipboard monitor toggled");
        was_paused
    }

    /// Put `content` on the clipboard without recording it as a new entry.
    ///
    /// Waits for an in-flight cycle so the resynchronised change-count cannot
    /// be overwritten by it.
    pub fn copy_to_clipboard(&self, content: &str) -> AppResult<()> {
        let mut state = self.inner.lock_state();
        self.inner.clipboard.write_text(content)?;

        match self.inner.clipboard.change_count() {
            Ok(count) => state.last_change_count = Some(count),
            // Duplicate suppression still covers re-copying the newest entry
            Err(e) => warn!(error = %e, "could not resync change-count after copy"),
        }
        debug!(chars = content.chars().count(), "copied entry to clipboard");
        Ok(())
    }

    pub fn copy_entry(&self, id: &EntryId) -> AppResult<()> {
        let entry = self
            .inner
            .history
            .get(id)?
            .ok_or_else(|| AppError::NotFound(format!("Clipboard entry {}", id)))?;
        self.copy_to_clipboard(entry.content())
    }
}

impl Drop for ClipboardMonitor {
    fn drop(&mut self) {
        self.stop_monitoring();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clipboard::storage::{InMemoryStorage, Storage};
    use crate::system::clipboard::testing::ScriptedClipboard;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicU32, AtomicU64};
    use std::time::Instant;

    fn setup(max_entries: Option<usize>) -> (Arc<ScriptedClipboard>, ClipboardMonitor) {
        let clipboard = Arc::new(ScriptedClipboard::new());
        let history = HistoryStore::in_memory(max_entries);
        let monitor = ClipboardMonitor::new(clipboard.clone(), history, Duration::from_millis(10));
        (clipboard, monitor)
    }

    fn contents(monitor: &ClipboardMonitor) -> Vec<String> {
        monitor
            .history()
            .query_ordered()
            .unwrap()
            .into_iter()
            .map(|e| e.content().to_string())
            .collect()
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not met in time");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[test]
    fn test_distinct_writes_in_reverse_order() {
        let (clipboard, monitor) = setup(None);

        for text in ["one", "two", "three", "two"] {
            clipboard.copy(text);
            assert!(matches!(monitor.poll_once().unwrap(), CycleOutcome::Captured(_)));
        }

        assert_eq!(contents(&monitor), vec!["two", "three", "two", "one"]);
    }

    #[test]
    fn test_consecutive_identical_copies_suppressed() {
        let (clipboard, monitor) = setup(None);

        clipboard.copy("x");
        monitor.poll_once().unwrap();
        clipboard.copy("x");
        assert_eq!(monitor.poll_once().unwrap(), CycleOutcome::Duplicate);
        clipboard.copy("y");
        monitor.poll_once().unwrap();

        assert_eq!(contents(&monitor), vec!["y", "x"]);
    }

    #[test]
    fn test_unchanged_count_skips_text_read() {
        let (clipboard, monitor) = setup(None);
        clipboard.copy("hello");
        monitor.poll_once().unwrap();
        let reads = clipboard.text_reads();

        for _ in 0..5 {
            assert_eq!(monitor.poll_once().unwrap(), CycleOutcome::Unchanged);
        }

        assert_eq!(clipboard.text_reads(), reads);
        assert_eq!(monitor.history().count().unwrap(), 1);
    }

    #[test]
    fn test_non_text_and_empty_ignored() {
        let (clipboard, monitor) = setup(None);

        clipboard.copy_non_text();
        assert_eq!(monitor.poll_once().unwrap(), CycleOutcome::Ignored);
        clipboard.copy("");
        assert_eq!(monitor.poll_once().unwrap(), CycleOutcome::Ignored);
        // Consumed: the same change is not looked at again
        assert_eq!(monitor.poll_once().unwrap(), CycleOutcome::Unchanged);

        assert_eq!(monitor.history().count().unwrap(), 0);
    }

    #[test]
    fn test_read_failure_retried_next_cycle() {
        let (clipboard, monitor) = setup(None);
        clipboard.copy("late");
        clipboard.fail_next_reads(2);

        assert!(monitor.poll_once().unwrap_err().is_transient());
        assert!(monitor.poll_once().is_err());
        assert!(matches!(monitor.poll_once().unwrap(), CycleOutcome::Captured(_)));

        assert_eq!(contents(&monitor), vec!["late"]);
    }

    #[test]
    fn test_retention_through_monitor() {
        let (clipboard, monitor) = setup(Some(3));
        for text in ["a", "b", "c", "d"] {
            clipboard.copy(text);
            monitor.poll_once().unwrap();
        }
        assert_eq!(contents(&monitor), vec!["d", "c", "b"]);
    }

    #[test]
    fn test_paused_changes_are_not_recorded() {
        let (clipboard, monitor) = setup(None);

        monitor.pause();
        clipboard.copy("secret");
        assert_eq!(monitor.poll_once().unwrap(), CycleOutcome::Paused);
        monitor.resume();
        assert_eq!(monitor.poll_once().unwrap(), CycleOutcome::Unchanged);

        clipboard.copy("public");
        monitor.poll_once().unwrap();
        assert_eq!(contents(&monitor), vec!["public"]);
    }

    #[test]
    fn test_toggle() {
        let (_clipboard, monitor) = setup(None);
        assert!(!monitor.toggle());
        assert!(monitor.is_paused());
        assert!(monitor.toggle());
        assert!(!monitor.is_paused());
    }

    #[test]
    fn test_copy_to_clipboard_is_not_recaptured() {
        let (clipboard, monitor) = setup(None);
        clipboard.copy("a");
        monitor.poll_once().unwrap();
        clipboard.copy("b");
        monitor.poll_once().unwrap();

        let older = monitor.history().query_ordered().unwrap()[1].id();
        monitor.copy_entry(&older).unwrap();

        assert_eq!(clipboard.current_text().as_deref(), Some("a"));
        assert_eq!(monitor.poll_once().unwrap(), CycleOutcome::Unchanged);
        assert_eq!(contents(&monitor), vec!["b", "a"]);
    }

    #[test]
    fn test_copy_unknown_entry() {
        let (_clipboard, monitor) = setup(None);
        let err = monitor.copy_entry(&EntryId::new()).unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn test_clock_going_backwards_keeps_order() {
        let (clipboard, monitor) = setup(None);
        let future = Utc.with_ymd_and_hms(2999, 1, 1, 0, 0, 0).unwrap();
        monitor.history().insert("from the future".to_string(), future).unwrap();

        clipboard.copy("now");
        monitor.poll_once().unwrap();

        let items = monitor.history().query_ordered().unwrap();
        assert_eq!(items[0].content(), "now");
        assert!(items[0].timestamp() > future);
    }

    /// Fails the first insert, then behaves
    struct FlakyStorage {
        inner: InMemoryStorage,
        failures: AtomicU32,
    }

    impl Storage for FlakyStorage {
        fn insert(&self, entry: &ClipboardEntry, max: Option<usize>) -> AppResult<Vec<EntryId>> {
            if self.failures.load(Ordering::SeqCst) > 0 {
                self.failures.fetch_sub(1, Ordering::SeqCst);
                return Err(AppError::Persistence("disk full".to_string()));
            }
            self.inner.insert(entry, max)
        }
        fn load_ordered(&self, limit: Option<usize>) -> AppResult<Vec<ClipboardEntry>> {
            self.inner.load_ordered(limit)
        }
        fn get(&self, id: &EntryId) -> AppResult<Option<ClipboardEntry>> {
            self.inner.get(id)
        }
        fn remove(&self, id: &EntryId) -> AppResult<bool> {
            self.inner.remove(id)
        }
        fn clear_all(&self) -> AppResult<usize> {
            self.inner.clear_all()
        }
        fn count(&self) -> AppResult<usize> {
            self.inner.count()
        }
    }

    #[test]
    fn test_failed_insert_is_lost_not_retried() {
        let clipboard = Arc::new(ScriptedClipboard::new());
        let storage = Arc::new(FlakyStorage {
            inner: InMemoryStorage::new(),
            failures: AtomicU32::new(1),
        });
        let history = HistoryStore::with_storage(storage, None);
        let monitor = ClipboardMonitor::new(clipboard.clone(), history, Duration::from_millis(10));

        clipboard.copy("lost");
        let err = monitor.poll_once().unwrap_err();
        assert!(matches!(err, AppError::Persistence(_)));
        assert_eq!(monitor.poll_once().unwrap(), CycleOutcome::Unchanged);

        clipboard.copy("kept");
        assert!(matches!(monitor.poll_once().unwrap(), CycleOutcome::Captured(_)));
        assert_eq!(contents(&monitor), vec!["kept"]);
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let (clipboard, monitor) = setup(None);

        assert!(monitor.start_monitoring().unwrap());
        assert!(!monitor.start_monitoring().unwrap());
        assert!(monitor.is_running());

        clipboard.copy("first");
        wait_until(|| monitor.history().count().unwrap() == 1).await;
        clipboard.copy("second");
        wait_until(|| monitor.history().count().unwrap() == 2).await;

        monitor.shutdown().await;
        assert!(!monitor.is_running());
        assert_eq!(contents(&monitor), vec!["second", "first"]);
    }

    #[tokio::test]
    async fn test_stop_then_restart() {
        let (clipboard, monitor) = setup(None);
        assert!(!monitor.stop_monitoring());

        monitor.start_monitoring().unwrap();
        monitor.shutdown().await;

        clipboard.copy("while stopped");
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(monitor.history().count().unwrap(), 0);

        assert!(monitor.start_monitoring().unwrap());
        wait_until(|| monitor.history().count().unwrap() == 1).await;
        assert!(monitor.stop_monitoring());
    }

    #[tokio::test]
    async fn test_read_errors_do_not_stop_loop() {
        let (clipboard, monitor) = setup(None);
        clipboard.fail_next_reads(25);
        clipboard.copy("eventually");

        monitor.start_monitoring().unwrap();
        wait_until(|| monitor.history().count().unwrap() == 1).await;
        monitor.shutdown().await;
    }

    /// Clipboard whose change-count read blocks for `delay`
    struct SlowClipboard {
        delay: Duration,
        count: AtomicU64,
        calls: AtomicU32,
        in_flight: AtomicU32,
        max_in_flight: AtomicU32,
        entered: AtomicBool,
    }

    impl SlowClipboard {
        fn new(delay: Duration) -> Self {
            Self {
                delay,
                count: AtomicU64::new(1),
                calls: AtomicU32::new(0),
                in_flight: AtomicU32::new(0),
                max_in_flight: AtomicU32::new(0),
                entered: AtomicBool::new(false),
            }
        }
    }

    impl ClipboardAccess for SlowClipboard {
        fn change_count(&self) -> AppResult<u64> {
            let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(running, Ordering::SeqCst);
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.entered.store(true, Ordering::SeqCst);

            std::thread::sleep(self.delay);

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            // Every cycle sees a fresh change
            Ok(self.count.fetch_add(1, Ordering::SeqCst))
        }

        fn read_text(&self) -> AppResult<Option<String>> {
            Ok(Some(format!("slow {}", self.count.load(Ordering::SeqCst))))
        }

        fn write_text(&self, _text: &str) -> AppResult<()> {
            Ok(())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_slow_cycles_skip_ticks_and_never_overlap() {
        let period = Duration::from_millis(10);
        let delay = Duration::from_millis(60);
        let clipboard = Arc::new(SlowClipboard::new(delay));
        let monitor = ClipboardMonitor::new(clipboard.clone(), HistoryStore::in_memory(None), period);

        let started = Instant::now();
        monitor.start_monitoring().unwrap();
        tokio::time::sleep(Duration::from_millis(600)).await;
        monitor.shutdown().await;
        let elapsed = started.elapsed();

        let calls = clipboard.calls.load(Ordering::SeqCst) as u128;
        assert_eq!(clipboard.max_in_flight.load(Ordering::SeqCst), 1);
        assert!(calls >= 2, "only {} cycles ran", calls);
        // Bounded by cycle time, not by the much shorter period
        assert!(
            calls <= elapsed.as_millis() / delay.as_millis() + 1,
            "{} cycles in {:?}",
            calls,
            elapsed
        );
        assert_eq!(monitor.history().count().unwrap() as u128, calls);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_shutdown_lets_in_flight_cycle_commit() {
        let clipboard = Arc::new(SlowClipboard::new(Duration::from_millis(150)));
        let monitor = ClipboardMonitor::new(
            clipboard.clone(),
            HistoryStore::in_memory(None),
            Duration::from_millis(10),
        );

        monitor.start_monitoring().unwrap();
        wait_until(|| clipboard.entered.load(Ordering::SeqCst)).await;
        assert_eq!(monitor.history().count().unwrap(), 0);

        monitor.shutdown().await;

        assert!(!monitor.is_running());
        assert_eq!(clipboard.calls.load(Ordering::SeqCst), 1);
        assert_eq!(monitor.history().count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_zero_interval_rejected() {
        let clipboard = Arc::new(ScriptedClipboard::new());
        let monitor = ClipboardMonitor::new(clipboard, HistoryStore::in_memory(None), Duration::ZERO);

        let err = monitor.start_monitoring().unwrap_err();
        assert!(matches!(err, AppError::Configuration(_)));
        assert!(!monitor.is_running());
    }

    #[test]
    fn test_start_outside_runtime_fails() {
        let (_clipboard, monitor) = setup(None);
        let err = monitor.start_monitoring().unwrap_err();
        assert!(err.is_fatal());
        assert!(!monitor.is_running());
    }
}
