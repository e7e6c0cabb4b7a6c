//! Time-sliced sample aggregation.
//!
//! Samples are grouped into fixed, non-overlapping windows aligned to
//! multiples of the slice interval since the Unix epoch. Exactly one window is
//! open at a time; it closes the moment a sample arrives at or after its end,
//! and closed windows wait in arrival order until the rollup task extracts them.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::ingest::sample::{CompositeKey, Sample};

/// One time slice: every series' raw values received during
/// `[start_time, start_time + interval)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Window {
    /// Window start in seconds since the Unix epoch, aligned to the interval.
    pub start_time: i64,
    /// Raw values per series, in insertion order.
    pub sets: HashMap<CompositeKey, Vec<i64>>,
}

impl Window {
    fn new(start_time: i64) -> Self {
        Self {
            start_time,
            sets: HashMap::with_capacity(16),
        }
    }

    /// Number of distinct series in the window.
    pub fn series(&self) -> usize {
        self.sets.len()
    }

    /// Total number of samples across all series.
    pub fn samples(&self) -> usize {
        self.sets.values().map(Vec::len).sum()
    }
}

#[derive(Default)]
struct Slices {
    open: Option<Window>,
    closed: VecDeque<Window>,
    /// Earliest start a new window may take; the end of the last closed window.
    floor: Option<i64>,
}

impl Slices {
    fn close_open(&mut self, interval: i64) -> Option<i64> {
        let window = self.open.take()?;
        let start = window.start_time;
        self.floor = Some(start + interval);
        self.closed.push_back(window);
        Some(start)
    }

    fn open_or_create(&mut self, aligned_start: i64) -> &mut Window {
        let start = match self.floor {
            Some(floor) => aligned_start.max(floor),
            None => aligned_start,
        };
        self.open.get_or_insert_with(|| Window::new(start))
    }
}

/// Thread-safe store of open and closed windows.
///
/// `add` and `extract_closed` share a single lock, so a sample is either in a
/// window before extraction or in a newer window after it, never both.
pub struct SliceStore {
    interval: i64,
    max_pending: usize,
    inner: Mutex<Slices>,
}

impl SliceStore {
    /// Creates a store with the given slice interval.
    ///
    /// `max_pending` is the closed-window backlog above which a warning is
    /// logged on every rollover.
    pub fn new(interval: Duration, max_pending: usize) -> Self {
        let interval = i64::try_from(interval.as_secs()).unwrap_or(i64::MAX).max(1);
        Self {
            interval,
            max_pending,
            inner: Mutex::new(Slices::default()),
        }
    }

    /// Adds a sample to the window covering its arrival time, rolling the
    /// open window over first if the sample arrived after its end.
    pub fn add(&self, sample: Sample) {
        let at = epoch_secs(sample.received_at);
        let aligned = window_start(at, self.interval);
        let key = sample.key();
        let interval = self.interval;

        let mut guard = self.inner.lock();
        let slices = &mut *guard;

        let expired = slices
            .open
            .as_ref()
            .is_some_and(|open| at >= open.start_time + interval);
        let rolled = if expired {
            slices.close_open(interval)
        } else {
            None
        };

        let window = slices.open_or_create(aligned);
        window.sets.entry(key).or_default().push(sample.value);
        let open_start = window.start_time;

        if let Some(closed_start) = rolled {
            let pending = slices.closed.len();
            drop(guard);

            debug!(closed = closed_start, opened = open_start, pending, "slice rolled over");
            if pending > self.max_pending {
                warn!(
                    pending,
                    max_pending = self.max_pending,
                    "closed slices are piling up, rollups are falling behind"
                );
            }
        }
    }

    /// Removes and returns every closed window, oldest first.
    ///
    /// With `include_open` the open window is force-closed and returned last.
    /// Samples arriving afterwards start a new window no earlier than the end
    /// of the force-closed one, so windows stay disjoint.
    pub fn extract_closed(&self, include_open: bool) -> Vec<Window> {
        let mut slices = self.inner.lock();
        if include_open {
            slices.close_open(self.interval);
        }
        slices.closed.drain(..).collect()
    }

    /// Number of windows held, open one included.
    pub fn len(&self) -> usize {
        let slices = self.inner.lock();
        slices.closed.len() + usize::from(slices.open.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of samples held across all windows, open one included.
    pub fn samples(&self) -> usize {
        let slices = self.inner.lock();
        slices.closed.iter().map(Window::samples).sum::<usize>()
            + slices.open.as_ref().map_or(0, Window::samples)
    }

    /// Start of the open window, if any.
    pub fn open_start(&self) -> Option<i64> {
        self.inner.lock().open.as_ref().map(|w| w.start_time)
    }
}

/// Aligns an epoch timestamp down to its window boundary.
pub fn window_start(epoch_secs: i64, interval: i64) -> i64 {
    epoch_secs.div_euclid(interval) * interval
}

/// Whole seconds since the Unix epoch; times before the epoch map to 0.
pub fn epoch_secs(t: SystemTime) -> i64 {
    let secs = t
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs();
    i64::try_from(secs).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    const BASE: u64 = 1_700_000_000;

    fn at(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
    }

    fn store() -> SliceStore {
        SliceStore::new(Duration::from_secs(10), 64)
    }

    fn sample(metric: &str, value: i64, secs: u64) -> Sample {
        Sample::new("web01", metric, value, at(secs))
    }

    fn cpu() -> CompositeKey {
        CompositeKey::new("web01", "cpu")
    }

    #[test]
    fn test_window_start_alignment() {
        assert_eq!(window_start(1_700_000_003, 10), 1_700_000_000);
        assert_eq!(window_start(1_700_000_010, 10), 1_700_000_010);
        assert_eq!(window_start(59, 60), 0);
        assert_eq!(window_start(61, 60), 60);
    }

    #[test]
    fn test_samples_within_window_keep_arrival_order() {
        let store = store();
        for (i, v) in [5, 3, 9, 1].into_iter().enumerate() {
            store.add(sample("cpu", v, BASE + i as u64));
        }

        assert_eq!(store.len(), 1);
        let windows = store.extract_closed(true);
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].start_time, BASE as i64);
        assert_eq!(windows[0].sets[&cpu()], vec![5, 3, 9, 1]);
    }

    #[test]
    fn test_first_window_is_aligned() {
        let store = store();
        store.add(sample("cpu", 1, BASE + 7));
        assert_eq!(store.open_start(), Some(BASE as i64));
    }

    #[test]
    fn test_sample_after_end_rolls_over_once() {
        let store = store();
        store.add(sample("cpu", 1, BASE + 1));
        store.add(sample("cpu", 2, BASE + 9));
        store.add(sample("cpu", 3, BASE + 10));
        store.add(sample("cpu", 4, BASE + 12));

        assert_eq!(store.len(), 2);

        let closed = store.extract_closed(false);
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].start_time, BASE as i64);
        assert_eq!(closed[0].sets[&cpu()], vec![1, 2]);

        let open = store.extract_closed(true);
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].start_time, BASE as i64 + 10);
        assert_eq!(open[0].sets[&cpu()], vec![3, 4]);
    }

    #[test]
    fn test_gap_opens_window_at_sample_boundary() {
        let store = store();
        store.add(sample("cpu", 1, BASE));
        store.add(sample("cpu", 2, BASE + 95));

        // No empty windows are materialized for the quiet period.
        assert_eq!(store.len(), 2);
        assert_eq!(store.open_start(), Some(BASE as i64 + 90));
    }

    #[test]
    fn test_extract_closed_never_returns_open_window() {
        let store = store();
        store.add(sample("cpu", 1, BASE));

        assert!(store.extract_closed(false).is_empty());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_extract_closed_returns_each_window_once() {
        let store = store();
        store.add(sample("cpu", 1, BASE));
        store.add(sample("cpu", 2, BASE + 10));
        store.add(sample("cpu", 3, BASE + 20));

        let first = store.extract_closed(false);
        assert_eq!(
            first.iter().map(|w| w.start_time).collect::<Vec<_>>(),
            vec![BASE as i64, BASE as i64 + 10]
        );
        assert!(store.extract_closed(false).is_empty());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_forced_close_keeps_windows_disjoint() {
        let store = store();
        store.add(sample("cpu", 1, BASE + 2));

        let forced = store.extract_closed(true);
        assert_eq!(forced.len(), 1);
        assert!(store.is_empty());

        // Same aligned interval as the force-closed window: must not reuse it.
        store.add(sample("cpu", 2, BASE + 4));
        assert_eq!(store.open_start(), Some(BASE as i64 + 10));
    }

    #[test]
    fn test_clock_step_backwards_stays_in_open_window() {
        let store = store();
        store.add(sample("cpu", 1, BASE + 20));
        store.add(sample("cpu", 2, BASE + 3));

        let windows = store.extract_closed(true);
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].start_time, BASE as i64 + 20);
        assert_eq!(windows[0].sets[&cpu()], vec![1, 2]);
    }

    #[test]
    fn test_series_are_separated_by_host_and_metric() {
        let store = store();
        store.add(Sample::new("web01", "cpu", 1, at(BASE)));
        store.add(Sample::new("web02", "cpu", 2, at(BASE)));
        store.add(Sample::new("web01", "mem", 3, at(BASE)));

        let windows = store.extract_closed(true);
        assert_eq!(windows[0].series(), 3);
        assert_eq!(windows[0].samples(), 3);
    }

    #[test]
    fn test_concurrent_add_and_extract_loses_nothing() {
        let store = Arc::new(store());
        let mut handles = Vec::new();

        for t in 0..4u64 {
            let store = Arc::clone(&store);
            handles.push(thread::spawn(move || {
                for i in 0..1000u64 {
                    store.add(Sample::new(
                        format!("host{t}"),
                        "cpu",
                        1,
                        at(BASE + i / 10),
                    ));
                }
            }));
        }

        let harvester = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                let mut windows = Vec::new();
                for _ in 0..200 {
                    windows.extend(store.extract_closed(false));
                    thread::yield_now();
                }
                windows
            })
        };

        for h in handles {
            h.join().expect("producer panicked");
        }
        let mut windows = harvester.join().expect("harvester panicked");
        windows.extend(store.extract_closed(true));

        let total: usize = windows.iter().map(Window::samples).sum();
        assert_eq!(total, 4000);

        let mut starts: Vec<i64> = windows.iter().map(|w| w.start_time).collect();
        let before = starts.len();
        starts.sort_unstable();
        starts.dedup();
        assert_eq!(starts.len(), before, "a window was returned twice");
    }
}
