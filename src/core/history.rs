//! A bounded history of recent input patterns, keyed by learning iteration.
//!
//! The classifier learns by associating patterns seen a few iterations ago with the
//! bucket observed now, so it must retain the last `max(steps) + 1` patterns together
//! with the iteration at which each arrived. This is a fixed-capacity ring buffer with
//! an explicit logical size: pushing a new entry overwrites the oldest slot once the
//! buffer is full, so no per-push allocation or shifting occurs.
//!
//! Entries are iterated newest to oldest, matching the order in which they are
//! persisted.

/// One retained input pattern and the learning iteration at which it was recorded.
#[derive(Debug, Clone, Default)]
struct HistoryEntry {
    iteration: u32,
    pattern: Vec<usize>,
}

/// Fixed-capacity ring buffer of `(iteration, pattern)` entries, newest at the front.
#[derive(Debug, Clone)]
pub struct PatternHistory {
    /// Slot storage; `entries.len()` is the fixed capacity.
    entries: Vec<HistoryEntry>,

    /// Slot index of the newest entry.
    head: usize,

    /// Number of slots currently holding live entries.
    len: usize,
}

impl PatternHistory {
    /// Creates an empty history able to retain `capacity` entries. `capacity` must be
    /// at least 1.
    #[inline]
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "pattern history capacity must be at least 1");
        Self {
            entries: vec![HistoryEntry::default(); capacity],
            head: 0,
            len: 0,
        }
    }

    /// Rebuilds a history from entries listed newest-first, as read back from a
    /// persisted snapshot. Panics if more entries are supplied than fit.
    pub fn from_entries(capacity: usize, newest_first: Vec<(u32, Vec<usize>)>) -> Self {
        let mut history = Self::with_capacity(capacity);
        assert!(
            newest_first.len() <= capacity,
            "persisted history of {} entries exceeds capacity {}",
            newest_first.len(),
            capacity
        );

        history.len = newest_first.len();
        for (i, (iteration, pattern)) in newest_first.into_iter().enumerate() {
            history.entries[i] = HistoryEntry { iteration, pattern };
        }
        history
    }

    /// Pushes a new entry to the front, evicting the oldest entry once full.
    pub fn record(&mut self, iteration: u32, pattern: Vec<usize>) {
        let capacity = self.entries.len();
        self.head = (self.head + capacity - 1) % capacity;
        self.entries[self.head] = HistoryEntry { iteration, pattern };
        if self.len < capacity {
            self.len += 1;
        }
    }

    /// Number of retained entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether no entries are retained yet.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Iterates retained entries newest to oldest as `(iteration, pattern)` pairs.
    #[inline]
    pub fn iter<'a>(&'a self) -> impl Iterator<Item = (u32, &'a [usize])> + 'a {
        let capacity = self.entries.len();
        (0..self.len).map(move |i| {
            let entry = &self.entries[(self.head + i) % capacity];
            (entry.iteration, entry.pattern.as_slice())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(history: &PatternHistory) -> Vec<(u32, Vec<usize>)> {
        history.iter().map(|(i, p)| (i, p.to_vec())).collect()
    }

    #[test]
    fn newest_first_iteration_order() {
        let mut history = PatternHistory::with_capacity(3);
        history.record(0, vec![1]);
        history.record(1, vec![2]);
        assert_eq!(collect(&history), vec![(1, vec![2]), (0, vec![1])]);
    }

    #[test]
    fn evicts_oldest_once_full() {
        let mut history = PatternHistory::with_capacity(2);
        history.record(0, vec![1]);
        history.record(1, vec![2]);
        history.record(2, vec![3]);
        assert_eq!(history.len(), 2);
        assert_eq!(collect(&history), vec![(2, vec![3]), (1, vec![2])]);
    }

    #[test]
    fn rebuilds_from_persisted_order() {
        let entries = vec![(7, vec![4, 9]), (6, vec![1])];
        let history = PatternHistory::from_entries(3, entries.clone());
        assert_eq!(collect(&history), entries);

        // A rebuilt history keeps accepting new entries in ring order.
        let mut history = history;
        history.record(8, vec![5]);
        assert_eq!(history.iter().next().unwrap().0, 8);
    }
}
