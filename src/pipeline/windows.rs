//! Rolling window buffer for a single resource
//!
//! Entries are kept in arrival order. Within a partition `observed_at` is
//! normally non-decreasing, so eviction pops from the front. A late entry
//! flips the buffer into a slower retain-based eviction until it is back
//! in order.

use super::types::{FieldCount, WindowEntry};
use std::collections::{HashMap, VecDeque};

#[derive(Debug, Clone)]
pub struct WindowBuffer {
    entries: VecDeque<WindowEntry>,
    span_ms: i64,
    newest: i64,
    out_of_order: bool,
}

impl WindowBuffer {
    pub fn new(span_ms: i64) -> Self {
        Self {
            entries: VecDeque::with_capacity(64),
            span_ms,
            newest: i64::MIN,
            out_of_order: false,
        }
    }

    /// Append an observation
    pub fn insert(&mut self, entry: WindowEntry) {
        if entry.observed_at < self.newest {
            self.out_of_order = true;
        } else {
            self.newest = entry.observed_at;
        }
        self.entries.push_back(entry);
    }

    /// Remove every entry with `now - observed_at > span`
    ///
    /// Returns the number of evicted entries.
    pub fn evict_expired(&mut self, now: i64) -> usize {
        let cutoff = now.saturating_sub(self.span_ms);
        let before = self.entries.len();

        if self.out_of_order {
            self.entries.retain(|e| e.observed_at >= cutoff);
            self.out_of_order = !self.is_sorted();
        } else {
            while self
                .entries
                .front()
                .map_or(false, |e| e.observed_at < cutoff)
            {
                self.entries.pop_front();
            }
        }

        if self.entries.is_empty() {
            self.newest = i64::MIN;
            self.out_of_order = false;
        }

        before - self.entries.len()
    }

    /// Tally retained entries by field, most frequent first
    ///
    /// Equal counts keep the order in which fields were first seen among
    /// the retained entries.
    pub fn rank(&self) -> Vec<FieldCount> {
        let mut tallies: Vec<(&str, u64)> = Vec::new();
        let mut index: HashMap<&str, usize> = HashMap::new();

        for entry in &self.entries {
            match index.get(entry.field.as_str()) {
                Some(&i) => tallies[i].1 += 1,
                None => {
                    index.insert(entry.field.as_str(), tallies.len());
                    tallies.push((entry.field.as_str(), 1));
                }
            }
        }

        // sort_by is stable, which preserves first-seen order on ties
        tallies.sort_by(|a, b| b.1.cmp(&a.1));

        tallies
            .into_iter()
            .map(|(field, count)| FieldCount::new(field, count))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> impl Iterator<Item = &WindowEntry> {
        self.entries.iter()
    }

    fn is_sorted(&self) -> bool {
        self.entries
            .iter()
            .zip(self.entries.iter().skip(1))
            .all(|(a, b)| a.observed_at <= b.observed_at)
    }
}
