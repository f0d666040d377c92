//! Coarse percentage progress reporting

/// Progress callback type
pub type ProgressFn = Box<dyn FnMut(u8) + Send>;

/// Progress counter with an optional callback
///
/// Long flash operations report 0 at start, 100 at completion and
/// proportional values in between.
#[derive(Default)]
pub struct Progress {
    percent: u8,
    callback: Option<ProgressFn>,
}

impl Progress {
    /// Create a counter without a callback
    pub fn new() -> Self {
        Self::default()
    }

    /// Install or replace the callback
    pub fn set_callback(&mut self, callback: ProgressFn) {
        self.callback = Some(callback);
    }

    /// Last reported percentage
    pub fn percent(&self) -> u8 {
        self.percent
    }

    /// Record a new percentage and notify the callback
    pub fn report(&mut self, percent: u8) {
        self.percent = percent.min(100);
        if let Some(cb) = self.callback.as_mut() {
            cb(self.percent);
        }
    }

    /// Report `done` out of `total` steps
    pub fn report_fraction(&mut self, done: usize, total: usize) {
        let percent = if total == 0 { 100 } else { done * 100 / total };
        self.report(percent as u8);
    }
}

impl core::fmt::Debug for Progress {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Progress")
            .field("percent", &self.percent)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_callback_sees_reports() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mut progress = Progress::new();
        progress.set_callback(Box::new(move |p| sink.lock().unwrap().push(p)));
        progress.report(0);
        progress.report_fraction(1, 4);
        progress.report(150);
        assert_eq!(*seen.lock().unwrap(), vec![0, 25, 100]);
        assert_eq!(progress.percent(), 100);
    }
}
