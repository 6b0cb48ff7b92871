use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

use tokio::sync::mpsc;

use crate::env::{NavigationTiming, PerformanceEntry, PerformanceHost};

struct Observer {
    entry_type: String,
    tx: mpsc::UnboundedSender<PerformanceEntry>,
}

/// Performance timeline fed by the page host.
///
/// Once [`seal`](Self::seal)ed, no more entries are expected: observers drain
/// what is buffered and then end.
pub struct MemoryPerformance {
    origin: Instant,
    navigation: Mutex<Option<NavigationTiming>>,
    entries: Mutex<Vec<PerformanceEntry>>,
    observers: Mutex<Vec<Observer>>,
    sealed: AtomicBool,
}

impl Default for MemoryPerformance {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl MemoryPerformance {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            navigation: Mutex::new(None),
            entries: Mutex::new(Vec::new()),
            observers: Mutex::new(Vec::new()),
            sealed: AtomicBool::new(false),
        }
    }

    pub fn set_navigation(&self, timing: NavigationTiming) {
        *lock(&self.navigation) = Some(timing);
    }

    /// Add an entry to the timeline and hand it to live observers.
    pub fn record(&self, entry: PerformanceEntry) {
        let mut observers = lock(&self.observers);
        lock(&self.entries).push(entry.clone());
        observers.retain(|o| o.entry_type != entry.entry_type || o.tx.send(entry.clone()).is_ok());
    }

    /// Observers still registered for future entries.
    pub fn observer_count(&self) -> usize {
        lock(&self.observers).len()
    }

    /// Declare the timeline complete.
    pub fn seal(&self) {
        self.sealed.store(true, Ordering::SeqCst);
        lock(&self.observers).clear();
    }
}

impl PerformanceHost for MemoryPerformance {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }

    fn navigation(&self) -> Option<NavigationTiming> {
        lock(&self.navigation).clone()
    }

    fn entries(&self) -> Vec<PerformanceEntry> {
        lock(&self.entries).clone()
    }

    fn observe(&self, entry_type: &str) -> mpsc::UnboundedReceiver<PerformanceEntry> {
        let (tx, rx) = mpsc::unbounded_channel();
        // Hold the observer list so no entry lands between replay and registration.
        let mut observers = lock(&self.observers);
        for entry in lock(&self.entries).iter().filter(|e| e.entry_type == entry_type) {
            let _ = tx.send(entry.clone());
        }
        if !self.sealed.load(Ordering::SeqCst) {
            observers.retain(|o| !o.tx.is_closed());
            observers.push(Observer {
                entry_type: entry_type.to_string(),
                tx,
            });
        }
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_observer_replays_then_follows() {
        let perf = MemoryPerformance::new();
        perf.record(PerformanceEntry::new("first-contentful-paint", "paint", 120.0, 0.0));
        let mut rx = perf.observe("paint");
        perf.record(PerformanceEntry::new("/x.js", "resource", 10.0, 5.0));
        perf.record(PerformanceEntry::new("first-paint", "paint", 100.0, 0.0));

        assert_eq!(rx.recv().await.unwrap().name, "first-contentful-paint");
        assert_eq!(rx.recv().await.unwrap().name, "first-paint");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_sealed_observer_ends() {
        let perf = MemoryPerformance::new();
        perf.record(PerformanceEntry::new("", "layout-shift", 50.0, 0.0).with("value", 0.05));
        let mut live = perf.observe("layout-shift");
        perf.seal();

        assert!(live.recv().await.is_some());
        assert!(live.recv().await.is_none());

        let mut late = perf.observe("layout-shift");
        assert!(late.recv().await.is_some());
        assert!(late.recv().await.is_none());
    }

    #[test]
    fn test_dropped_observers_are_released() {
        let perf = MemoryPerformance::new();
        for _ in 0..10 {
            drop(perf.observe("longtask"));
        }
        let _live = perf.observe("longtask");
        assert_eq!(perf.observer_count(), 1);

        perf.seal();
        assert_eq!(perf.observer_count(), 0);
    }

    #[test]
    fn test_entries_by_type() {
        let perf = MemoryPerformance::new();
        perf.record(PerformanceEntry::new("/a.css", "resource", 1.0, 2.0));
        perf.record(PerformanceEntry::new("mark", "mark", 3.0, 0.0));
        assert_eq!(perf.entries().len(), 2);
        assert_eq!(perf.entries_by_type("resource").len(), 1);
        assert!(perf.now() >= 0.0);
    }
}
