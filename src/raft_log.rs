// Copyright 2020 TiKV Project Authors. Licensed under Apache-2.0.

use slog::Logger;

use crate::message::{Entry, EntryPayload, Index, Term};

/// The in-memory replicated log of a single replica.
///
/// `entries[i]` has log position `prev_index + 1 + i`. The pair
/// `(prev_index, prev_term)` is the virtual entry just before the first
/// physically stored one; it starts at `(0, 0)` and advances when the log
/// prefix is subsumed by a snapshot.
pub struct RaftLog {
    entries: Vec<Entry>,
    prev_index: Index,
    prev_term: Term,

    /// The highest log position that is known to be committed on a quorum
    /// of active members.
    pub committed: Index,

    /// The highest log position the driver has been instructed to apply to
    /// its state machine.
    ///
    /// Invariant: applied <= committed
    pub applied: Index,

    pub(crate) logger: Logger,
}

impl std::fmt::Display for RaftLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "committed={}, applied={}, prev_index={}, entries.len()={}",
            self.committed,
            self.applied,
            self.prev_index,
            self.entries.len()
        )
    }
}

impl RaftLog {
    /// Creates an empty log rooted at the virtual entry `(0, 0)`.
    pub fn new(logger: Logger) -> RaftLog {
        RaftLog {
            entries: Vec::new(),
            prev_index: 0,
            prev_term: 0,
            committed: 0,
            applied: 0,
            logger,
        }
    }

    /// The index of the virtual entry before the first stored one.
    #[inline]
    pub fn prev_log_index(&self) -> Index {
        self.prev_index
    }

    /// The term of the virtual entry before the first stored one.
    #[inline]
    pub fn prev_log_term(&self) -> Term {
        self.prev_term
    }

    /// The index of the last entry.
    #[inline]
    pub fn last_index(&self) -> Index {
        self.prev_index + self.entries.len() as u64
    }

    /// The term of the last entry.
    #[inline]
    pub fn last_term(&self) -> Term {
        match self.entries.last() {
            Some(e) => e.term,
            None => self.prev_term,
        }
    }

    /// For a given index, finds the term associated with it. Defined for
    /// `prev_log_index` and every stored entry; `None` otherwise.
    pub fn term(&self, idx: Index) -> Option<Term> {
        if idx == self.prev_index {
            return Some(self.prev_term);
        }
        if idx < self.prev_index || idx > self.last_index() {
            return None;
        }
        Some(self.entries[(idx - self.prev_index - 1) as usize].term)
    }

    /// Answers the question: Does this index belong to this term?
    pub fn match_term(&self, idx: Index, term: Term) -> bool {
        self.term(idx).map(|t| t == term).unwrap_or(false)
    }

    /// The entry stored at `idx`, if any.
    pub fn get(&self, idx: Index) -> Option<&Entry> {
        if idx <= self.prev_index || idx > self.last_index() {
            return None;
        }
        Some(&self.entries[(idx - self.prev_index - 1) as usize])
    }

    /// Determines if the given `(last_index, term)` log is at least as
    /// up-to-date as this one, comparing `(term, index)` lexicographically.
    pub fn is_up_to_date(&self, last_index: Index, term: Term) -> bool {
        term > self.last_term() || (term == self.last_term() && last_index >= self.last_index())
    }

    /// Appends one entry at the next index and returns that index.
    pub fn append(&mut self, term: Term, payload: EntryPayload) -> Index {
        let index = self.last_index() + 1;
        self.entries.push(Entry::new(term, index, payload));
        index
    }

    /// Merges a batch of incoming entries, resolving conflicts.
    ///
    /// Existing entries that agree on index and term are preserved. At the
    /// first index where the terms differ the log is truncated (at and
    /// including that index) and the remaining incoming entries are
    /// installed. Entries already covered by the snapshot are skipped.
    ///
    /// Returns the index of the first conflict detected, if any, so the
    /// membership tracker can revert a truncated joint entry.
    ///
    /// # Panics
    ///
    /// Panics if a conflict is found below the committed index, or if the
    /// batch would leave a gap after the last index.
    pub fn append_entries(&mut self, ents: &[Entry]) -> Option<Index> {
        let first_new = match ents.iter().position(|e| e.index > self.prev_index) {
            Some(pos) => pos,
            None => return None,
        };
        let ents = &ents[first_new..];

        let mut conflict = None;
        let mut start = None;
        for (i, e) in ents.iter().enumerate() {
            match self.term(e.index) {
                Some(t) if t == e.term => continue,
                Some(existing) => {
                    info!(
                        self.logger,
                        "found conflict at index {index}",
                        index = e.index;
                        "existing term" => existing,
                        "conflicting term" => e.term,
                    );
                    conflict = Some(e.index);
                    start = Some(i);
                    break;
                }
                None => {
                    start = Some(i);
                    break;
                }
            }
        }

        let start = match start {
            Some(s) => s,
            // Everything was already present.
            None => return None,
        };
        let from = ents[start].index;
        if let Some(c) = conflict {
            if c <= self.committed {
                fatal!(
                    self.logger,
                    "entry {} conflicts with committed entry {}",
                    c,
                    self.committed
                )
            }
        }
        if from > self.last_index() + 1 {
            fatal!(
                self.logger,
                "appending from {} would leave a gap after {}",
                from,
                self.last_index()
            )
        }
        self.entries.truncate((from - self.prev_index - 1) as usize);
        self.entries.extend_from_slice(&ents[start..]);
        conflict
    }

    /// Returns the entries in the inclusive range `[lo, hi]`, clamped to
    /// what the log physically stores. Bad ranges produce empty results.
    pub fn range(&self, lo: Index, hi: Index) -> Vec<Entry> {
        let lo = std::cmp::max(lo, self.prev_index + 1);
        let hi = std::cmp::min(hi, self.last_index());
        if lo > hi {
            return Vec::new();
        }
        let l = (lo - self.prev_index - 1) as usize;
        let h = (hi - self.prev_index) as usize;
        self.entries[l..h].to_vec()
    }

    /// Returns all entries from `idx` through the end of the log.
    pub fn entries_from(&self, idx: Index) -> Vec<Entry> {
        self.range(idx, self.last_index())
    }

    /// Sets the last committed value to the passed in value.
    ///
    /// # Panics
    ///
    /// Panics if the index goes past the last index.
    pub fn commit_to(&mut self, to_commit: Index) {
        // never decrease commit
        if self.committed >= to_commit {
            return;
        }
        if self.last_index() < to_commit {
            fatal!(
                self.logger,
                "to_commit {} is out of range [last_index {}]",
                to_commit,
                self.last_index()
            )
        }
        self.committed = to_commit;
    }

    /// Advances the applied index.
    ///
    /// # Panics
    ///
    /// Panics if the value is not within `[applied, committed]`.
    pub fn applied_to(&mut self, idx: Index) {
        if idx == 0 {
            return;
        }
        if self.committed < idx || idx < self.applied {
            fatal!(
                self.logger,
                "applied({}) is out of range [prev_applied({}), committed({})]",
                idx,
                self.applied,
                self.committed
            )
        }
        self.applied = idx;
    }

    /// Discards all entries with index `<= last_index` after a snapshot was
    /// taken at `(last_index, last_term)`; the suffix is preserved.
    ///
    /// # Panics
    ///
    /// Panics if the log does not contain `(last_index, last_term)`.
    pub fn compact(&mut self, last_index: Index, last_term: Term) {
        if last_index <= self.prev_index {
            return;
        }
        if !self.match_term(last_index, last_term) {
            fatal!(
                self.logger,
                "compact to ({}, {}) which is not in the log",
                last_index,
                last_term
            )
        }
        self.entries.drain(..(last_index - self.prev_index) as usize);
        self.prev_index = last_index;
        self.prev_term = last_term;
    }

    /// Replaces the log wholesale with the empty log rooted at a snapshot's
    /// `(last_index, last_term)`.
    pub fn restore(&mut self, last_index: Index, last_term: Term) {
        info!(
            self.logger,
            "log [{}] starts to restore snapshot [index: {index}, term: {term}]",
            self.to_string(),
            index = last_index,
            term = last_term;
        );
        self.entries.clear();
        self.prev_index = last_index;
        self.prev_term = last_term;
        self.committed = last_index;
        self.applied = last_index;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::EntryPayload;

    fn new_log() -> RaftLog {
        RaftLog::new(crate::default_logger())
    }

    fn new_entry(term: Term, index: Index) -> Entry {
        Entry::new(term, index, EntryPayload::Nop)
    }

    #[test]
    fn test_append_assigns_contiguous_indices() {
        let mut log = new_log();
        assert_eq!(log.last_index(), 0);
        assert_eq!(log.last_term(), 0);
        assert_eq!(log.append(1, EntryPayload::Nop), 1);
        assert_eq!(log.append(1, EntryPayload::Op(b"x".to_vec())), 2);
        assert_eq!(log.append(2, EntryPayload::Nop), 3);
        assert_eq!(log.last_index(), 3);
        assert_eq!(log.last_term(), 2);
    }

    #[test]
    fn test_term_lookup() {
        let mut log = new_log();
        log.append(1, EntryPayload::Nop);
        log.append(2, EntryPayload::Nop);
        // The sentinel before the log.
        assert_eq!(log.term(0), Some(0));
        assert_eq!(log.term(1), Some(1));
        assert_eq!(log.term(2), Some(2));
        assert_eq!(log.term(3), None);
        assert!(log.match_term(2, 2));
        assert!(!log.match_term(2, 1));
    }

    #[test]
    fn test_append_entries_conflict_truncates() {
        // existing entries, incoming entries, conflict, resulting terms
        let tests = vec![
            // No conflict, everything already present.
            (
                vec![new_entry(1, 1), new_entry(1, 2)],
                vec![new_entry(1, 1), new_entry(1, 2)],
                None,
                vec![1, 1],
            ),
            // No conflict, new entries appended.
            (
                vec![new_entry(1, 1)],
                vec![new_entry(1, 1), new_entry(1, 2)],
                None,
                vec![1, 1],
            ),
            // Conflict at index 2: truncate and install.
            (
                vec![new_entry(1, 1), new_entry(1, 2), new_entry(1, 3)],
                vec![new_entry(2, 2)],
                Some(2),
                vec![1, 2],
            ),
            // Conflict at index 1.
            (
                vec![new_entry(1, 1), new_entry(1, 2)],
                vec![new_entry(3, 1), new_entry(3, 2), new_entry(3, 3)],
                Some(1),
                vec![3, 3, 3],
            ),
        ];
        for (i, (existing, incoming, wconflict, wterms)) in tests.into_iter().enumerate() {
            let mut log = new_log();
            log.append_entries(&existing);
            let conflict = log.append_entries(&incoming);
            assert_eq!(conflict, wconflict, "#{}: conflict", i);
            let terms: Vec<Term> = (1..=log.last_index()).map(|x| log.term(x).unwrap()).collect();
            assert_eq!(terms, wterms, "#{}: terms", i);
        }
    }

    #[test]
    fn test_append_entries_skips_snapshotted_prefix() {
        let mut log = new_log();
        for _ in 0..5 {
            log.append(1, EntryPayload::Nop);
        }
        log.commit_to(5);
        log.applied_to(5);
        log.compact(3, 1);
        // Entries at or below the snapshot sentinel are ignored.
        let conflict = log.append_entries(&[new_entry(1, 2), new_entry(1, 3), new_entry(1, 4)]);
        assert_eq!(conflict, None);
        assert_eq!(log.last_index(), 5);
        assert_eq!(log.prev_log_index(), 3);
    }

    #[test]
    fn test_range() {
        let mut log = new_log();
        for _ in 0..5 {
            log.append(1, EntryPayload::Nop);
        }
        assert_eq!(log.range(1, 5).len(), 5);
        assert_eq!(log.range(4, 5).len(), 2);
        assert_eq!(log.range(5, 5).len(), 1);
        // Bad and out-of-bounds ranges are empty.
        assert_eq!(log.range(5, 4).len(), 0);
        assert_eq!(log.range(6, 9).len(), 0);
    }

    #[test]
    fn test_compact_preserves_suffix() {
        let mut log = new_log();
        for _ in 0..5 {
            log.append(2, EntryPayload::Nop);
        }
        log.commit_to(4);
        log.applied_to(4);
        log.compact(4, 2);
        assert_eq!(log.prev_log_index(), 4);
        assert_eq!(log.prev_log_term(), 2);
        assert_eq!(log.last_index(), 5);
        assert_eq!(log.term(4), Some(2));
        assert_eq!(log.term(3), None);
        // Compacting below the sentinel is a no-op.
        log.compact(2, 2);
        assert_eq!(log.prev_log_index(), 4);
    }

    #[test]
    fn test_restore() {
        let mut log = new_log();
        log.append(1, EntryPayload::Nop);
        log.restore(10, 4);
        assert_eq!(log.last_index(), 10);
        assert_eq!(log.last_term(), 4);
        assert_eq!(log.committed, 10);
        assert_eq!(log.applied, 10);
        assert_eq!(log.term(10), Some(4));
        assert_eq!(log.term(1), None);
    }

    #[test]
    fn test_is_up_to_date() {
        let mut log = new_log();
        log.append(1, EntryPayload::Nop);
        log.append(2, EntryPayload::Nop);
        // Higher term wins regardless of index.
        assert!(log.is_up_to_date(1, 3));
        // Same term needs at least our index.
        assert!(log.is_up_to_date(2, 2));
        assert!(log.is_up_to_date(3, 2));
        assert!(!log.is_up_to_date(1, 2));
        // Lower term always loses.
        assert!(!log.is_up_to_date(9, 1));
    }
}
