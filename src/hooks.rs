//! Collaborator hooks injected into the engine and the orchestrators.
//!
//! Nothing here is process-global: every component receives its sink and
//! cancellation flag at construction time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Level-less message sink for user-facing run messages.
pub trait LogSink: Send + Sync {
    fn log(&self, message: &str);
}

impl<F> LogSink for F
where
    F: Fn(&str) + Send + Sync,
{
    fn log(&self, message: &str) {
        self(message)
    }
}

/// Forwards messages to the `log` facade at info level.
#[derive(Clone, Copy, Debug, Default)]
pub struct FacadeSink;

impl LogSink for FacadeSink {
    fn log(&self, message: &str) {
        log::info!("{message}");
    }
}

/// Collects messages in memory. Useful for tests and for GUIs that poll.
#[derive(Debug, Default)]
pub struct MemorySink {
    messages: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every message logged so far.
    pub fn messages(&self) -> Vec<String> {
        match self.messages.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Returns true if any logged message contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.messages().iter().any(|m| m.contains(needle))
    }
}

impl LogSink for MemorySink {
    fn log(&self, message: &str) {
        let mut guard = match self.messages.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.push(message.to_string());
    }
}

/// Shared handle to a log sink.
pub type SharedSink = Arc<dyn LogSink>;

/// Returns the default sink (the `log` facade).
pub fn default_sink() -> SharedSink {
    Arc::new(FacadeSink)
}

/// Progress observer for verification stages: `(current, total, percent)`.
pub trait ProgressSink: Send + Sync {
    fn progress(&self, current: usize, total: usize, percent: u8);
}

impl<F> ProgressSink for F
where
    F: Fn(usize, usize, u8) + Send + Sync,
{
    fn progress(&self, current: usize, total: usize, percent: u8) {
        self(current, total, percent)
    }
}

/// Ignores progress updates.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn progress(&self, _current: usize, _total: usize, _percent: u8) {}
}

/// Cooperative cancellation token.
///
/// Orchestrators check it before dispatching each unit of work. Units that
/// are already running always finish and are folded into the result.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// `floor(completed / total * 100)`, with an empty run counting as done.
pub fn percent(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((completed.min(total) * 100) / total) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_floors() {
        assert_eq!(percent(0, 3), 0);
        assert_eq!(percent(1, 3), 33);
        assert_eq!(percent(2, 3), 66);
        assert_eq!(percent(3, 3), 100);
        assert_eq!(percent(0, 0), 100);
    }

    #[test]
    fn test_memory_sink_collects() {
        let sink = MemorySink::new();
        sink.log("first");
        sink.log("second message");
        assert_eq!(sink.messages(), vec!["first", "second message"]);
        assert!(sink.contains("second"));
        assert!(!sink.contains("third"));
    }

    #[test]
    fn test_closure_is_a_sink() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::clone(&seen);
        let sink: SharedSink = Arc::new(move |m: &str| captured.lock().unwrap().push(m.len()));
        sink.log("abc");
        assert_eq!(*seen.lock().unwrap(), vec![3]);
    }

    #[test]
    fn test_cancel_flag_is_shared() {
        let flag = CancelFlag::new();
        let clone = flag.clone();
        assert!(!clone.is_cancelled());
        flag.cancel();
        assert!(clone.is_cancelled());
    }
}
