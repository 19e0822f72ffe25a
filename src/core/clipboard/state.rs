/// Detection state owned by a single monitor
///
/// Guarded by one mutex so a detection cycle and a clipboard write from the
/// presentation layer never interleave their change-count updates.
#[derive(Debug, Default)]
pub struct MonitorState {
    /// Change-count consumed by the last completed cycle; `None` until the
    /// first successful read
    pub last_change_count: Option<u64>,
    consecutive_read_errors: u32,
}

impl MonitorState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one more failed read and return the running total
    pub fn record_read_failure(&mut self) -> u32 {
        self.consecutive_read_errors = self.consecutive_read_errors.saturating_add(1);
        self.consecutive_read_errors
    }

    /// Returns the length of the failure streak that just ended, if any
    pub fn record_read_success(&mut self) -> Option<u32> {
        let streak = std::mem::take(&mut self.consecutive_read_errors);
        (streak > 0).then_some(streak)
    }

    pub fn consecutive_read_errors(&self) -> u32 {
        self.consecutive_read_errors
    }
}
