//! Fixed-capacity temperature history.

use heapless::Deque;

use crate::consts::LOG_CAPACITY;

/// One logged temperature reading.
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TempLogEntry {
    /// Seconds since the Unix epoch, as reported by the clock
    pub timestamp: u64,
    /// Degrees Celsius
    pub temperature: f32,
}

/// Ring buffer of the most recent [`LOG_CAPACITY`] readings, oldest first.
#[derive(Debug, Default)]
pub struct TemperatureLog {
    entries: Deque<TempLogEntry, LOG_CAPACITY>,
}

impl TemperatureLog {
    /// Creates an empty log.
    pub const fn new() -> Self {
        Self {
            entries: Deque::new(),
        }
    }

    /// Appends a reading, evicting the oldest one when full.
    pub fn push(&mut self, timestamp: u64, temperature: f32) {
        if self.entries.is_full() {
            self.entries.pop_front();
        }
        // cannot fail, a slot was freed above
        let _ = self.entries.push_back(TempLogEntry {
            timestamp,
            temperature,
        });
    }

    /// Entries with `start <= timestamp <= end`, oldest first, at most `max` of them.
    pub fn query(&self, start: u64, end: u64, max: usize) -> impl Iterator<Item = &TempLogEntry> {
        self.entries
            .iter()
            .filter(move |e| (start..=end).contains(&e.timestamp))
            .take(max)
    }

    /// All entries, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &TempLogEntry> {
        self.entries.iter()
    }

    /// Most recent entry.
    pub fn latest(&self) -> Option<&TempLogEntry> {
        self.entries.back()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overflow_keeps_newest() {
        let mut log = TemperatureLog::new();
        for i in 0..150u64 {
            log.push(i, i as f32);
        }
        assert_eq!(log.len(), LOG_CAPACITY);
        let stamps: Vec<u64> = log.query(0, u64::MAX, usize::MAX).map(|e| e.timestamp).collect();
        assert_eq!(stamps, (50..150).collect::<Vec<_>>());
        assert_eq!(log.latest().map(|e| e.timestamp), Some(149));
    }

    #[test]
    fn test_query_range_is_inclusive() {
        let mut log = TemperatureLog::new();
        for ts in [10, 20, 30, 40] {
            log.push(ts, 1.0);
        }
        let stamps: Vec<u64> = log.query(20, 30, 10).map(|e| e.timestamp).collect();
        assert_eq!(stamps, vec![20, 30]);
    }

    #[test]
    fn test_query_caps_at_max() {
        let mut log = TemperatureLog::new();
        for ts in 0..10 {
            log.push(ts, 0.5);
        }
        let stamps: Vec<u64> = log.query(0, 100, 3).map(|e| e.timestamp).collect();
        assert_eq!(stamps, vec![0, 1, 2]);
    }

    #[test]
    fn test_clear() {
        let mut log = TemperatureLog::new();
        log.push(1, 2.0);
        assert!(!log.is_empty());
        log.clear();
        assert!(log.is_empty());
        assert_eq!(log.iter().count(), 0);
    }
}
