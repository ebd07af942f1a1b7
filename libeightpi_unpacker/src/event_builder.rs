use std::collections::BTreeMap;
use std::ops::Bound::{Excluded, Unbounded};

use super::config::Settings;
use super::event::{BuiltEvent, Hit};

/// The pending-hit collection and the coincidence extraction algorithm.
///
/// Hits arrive in decode order but are kept ordered by their corrected ULM
/// clock (the detector families are interleaved in the input stream, so
/// arrival order and physical time order differ). Duplicate clocks are
/// allowed; equal-clock hits are always coincident and leave together.
///
/// The orchestrator wraps this in a mutex; nothing here locks.
#[derive(Debug)]
pub struct EventBuilder {
    pending: BTreeMap<u64, Vec<Hit>>,
    nof_hits: usize,
    capacity: usize,
    growth_step: usize,
    max_capacity: usize,
    nof_grows: u32,
}

impl EventBuilder {
    pub fn new(capacity: usize, max_capacity: usize) -> Self {
        Self {
            pending: BTreeMap::new(),
            nof_hits: 0,
            capacity,
            growth_step: capacity,
            max_capacity,
            nof_grows: 0,
        }
    }

    pub fn insert(&mut self, hit: Hit) {
        self.pending.entry(hit.clock()).or_default().push(hit);
        self.nof_hits += 1;
    }

    pub fn len(&self) -> usize {
        self.nof_hits
    }

    pub fn is_empty(&self) -> bool {
        self.nof_hits == 0
    }

    pub fn is_full(&self) -> bool {
        self.nof_hits >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn nof_grows(&self) -> u32 {
        self.nof_grows
    }

    /// Grow by the initial capacity, up to the configured maximum.
    /// Returns false when the maximum is reached.
    pub fn try_grow(&mut self) -> bool {
        if self.capacity + self.growth_step > self.max_capacity {
            return false;
        }
        self.capacity += self.growth_step;
        self.nof_grows += 1;
        true
    }

    /// Extract the next maximal coincident group, or None when the oldest
    /// pending hit is still inside the waiting window (more coincident hits
    /// may yet arrive). While flushing the waiting window no longer applies.
    pub fn next_event(&mut self, settings: &Settings, flushing: bool) -> Option<BuiltEvent> {
        let (&oldest, _) = self.pending.iter().next()?;
        // capture the newest bound once per extraction, not per comparison
        let (&newest, _) = self.pending.iter().next_back()?;
        if !flushing && settings.in_waiting_window(oldest, newest) {
            return None;
        }

        // the anchor bucket leaves whole: equal clocks are always coincident
        let mut hits = self.pending.remove(&oldest).unwrap_or_default();

        // the set is ordered, so the scan stops at the first clock outside
        // the coincidence window of the anchor
        let followers: Vec<u64> = self
            .pending
            .range((Excluded(oldest), Unbounded))
            .map(|(&clock, _)| clock)
            .take_while(|&clock| settings.is_coincident(oldest, clock))
            .collect();
        for clock in followers {
            if let Some(mut bucket) = self.pending.remove(&clock) {
                hits.append(&mut bucket);
            }
        }

        self.nof_hits -= hits.len();
        Some(BuiltEvent::new(hits))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{DetectorType, Ulm};

    fn hit_at(clock: u64) -> Hit {
        let mut ulm = Ulm::default();
        ulm.clock = clock;
        Hit::new(0, 0, DetectorType::Germanium, 0, 100, ulm)
    }

    fn settings(waiting: u64, coincidence: u64) -> Settings {
        let mut settings = Settings::default();
        settings.waiting_window = waiting;
        settings.coincidence_window = coincidence;
        settings
    }

    #[test]
    fn test_coincidence_grouping() {
        let settings = settings(100, 10);
        let mut builder = EventBuilder::new(64, 64);
        for clock in [0u64, 1, 2, 500, 501] {
            builder.insert(hit_at(clock));
        }

        // span 501 exceeds the waiting window, so the oldest group settles
        let event = builder.next_event(&settings, false).unwrap();
        let clocks: Vec<u64> = event.hits().iter().map(|h| h.clock()).collect();
        assert_eq!(clocks, vec![0, 1, 2]);

        // the remaining span of 1 is inside the waiting window
        assert!(builder.next_event(&settings, false).is_none());
        assert_eq!(builder.len(), 2);

        // a newer hit settles the second group
        builder.insert(hit_at(5000));
        let event = builder.next_event(&settings, false).unwrap();
        let clocks: Vec<u64> = event.hits().iter().map(|h| h.clock()).collect();
        assert_eq!(clocks, vec![500, 501]);
    }

    #[test]
    fn test_flush_ignores_waiting_window() {
        let settings = settings(100, 10);
        let mut builder = EventBuilder::new(64, 64);
        builder.insert(hit_at(500));
        builder.insert(hit_at(501));

        assert!(builder.next_event(&settings, false).is_none());
        let event = builder.next_event(&settings, true).unwrap();
        assert_eq!(event.nof_hits(), 2);
        assert!(builder.is_empty());
        assert!(builder.next_event(&settings, true).is_none());
    }

    #[test]
    fn test_equal_clocks_leave_together() {
        let settings = settings(10, 1);
        let mut builder = EventBuilder::new(64, 64);
        builder.insert(hit_at(42));
        builder.insert(hit_at(42));
        builder.insert(hit_at(42));
        builder.insert(hit_at(100));

        let event = builder.next_event(&settings, false).unwrap();
        assert_eq!(event.nof_hits(), 3);
        assert!(event.hits().iter().all(|h| h.clock() == 42));
        assert_eq!(builder.len(), 1);
    }

    #[test]
    fn test_no_hit_lost_or_duplicated() {
        let settings = settings(50, 5);
        let mut builder = EventBuilder::new(4, 1024);
        let total = 200usize;
        for i in 0..total {
            builder.insert(hit_at((i * 3) as u64));
            while builder.is_full() {
                assert!(builder.try_grow());
            }
        }
        let mut drained = 0usize;
        while let Some(event) = builder.next_event(&settings, true) {
            drained += event.nof_hits();
        }
        assert_eq!(drained, total);
        assert!(builder.is_empty());
    }

    #[test]
    fn test_growth_capped_at_maximum() {
        let mut builder = EventBuilder::new(8, 16);
        assert!(builder.try_grow());
        assert!(!builder.try_grow());
        assert_eq!(builder.capacity(), 16);
        assert_eq!(builder.nof_grows(), 1);
    }
}
