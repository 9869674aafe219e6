//! Cancellation/diagnostic timers (spec.md §5): polled every 1000 inner
//! evaluations, firing a pure side effect (printing, saving a snapshot)
//! that never mutates integration state.

pub struct Timer {
    pub label: String,
    period: u64,
    action: Box<dyn Fn(usize, u64) + Send + Sync>,
}

impl Timer {
    pub fn new(
        label: impl Into<String>,
        period: u64,
        action: impl Fn(usize, u64) + Send + Sync + 'static,
    ) -> Self {
        Timer {
            label: label.into(),
            period: period.max(1),
            action: Box::new(action),
        }
    }

    fn maybe_fire(&self, iteration: usize, step: u64) {
        if step % self.period == 0 {
            (self.action)(iteration, step);
        }
    }
}

/// Polled once every 1000 inner steps; hard cancellation (if any) is only
/// ever observed at that boundary (spec.md §5).
#[derive(Default)]
pub struct TimerList {
    timers: Vec<Timer>,
}

pub const POLL_PERIOD: u64 = 1000;

impl TimerList {
    pub fn new() -> Self {
        TimerList { timers: Vec::new() }
    }

    pub fn add(&mut self, timer: Timer) {
        self.timers.push(timer);
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    pub fn poll(&self, iteration: usize, step: u64) {
        if self.timers.is_empty() || step % POLL_PERIOD != 0 {
            return;
        }
        for t in &self.timers {
            t.maybe_fire(iteration, step);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn timer_fires_only_on_its_own_period() {
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        let mut timers = TimerList::new();
        timers.add(Timer::new("probe", 2000, move |_iter, _step| {
            count2.fetch_add(1, Ordering::SeqCst);
        }));
        for step in 0..5000u64 {
            timers.poll(0, step);
        }
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn empty_list_never_polls_action() {
        let timers = TimerList::new();
        timers.poll(0, 1000);
        assert!(timers.is_empty());
    }
}
