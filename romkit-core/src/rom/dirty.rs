//! Dirty-extent tracking.
//!
//! A set of half-open byte ranges, kept merged so that overlapping and touching
//! extents collapse into one.

use std::collections::BTreeMap;
use std::ops::Range;

/// Merged set of half-open ranges.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirtySet {
    // start -> end
    extents: BTreeMap<usize, usize>,
}

impl DirtySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `[start, end)`; empty ranges are ignored.
    pub fn insert(&mut self, range: Range<usize>) {
        if range.start >= range.end {
            return;
        }
        let mut start: usize = range.start;
        let mut end: usize = range.end;

        // Absorb a predecessor that reaches into or touches the new extent.
        if let Some((&prev_start, &prev_end)) = self.extents.range(..=start).next_back() {
            if prev_end >= start {
                start = prev_start;
                end = end.max(prev_end);
                self.extents.remove(&prev_start);
            }
        }

        // Absorb every successor that starts inside or right after it.
        let followers: Vec<(usize, usize)> = self
            .extents
            .range(start..=end)
            .map(|(&s, &e)| (s, e))
            .collect();
        for (s, e) in followers {
            end = end.max(e);
            self.extents.remove(&s);
        }

        self.extents.insert(start, end);
    }

    /// Whether any byte of `range` is dirty.
    pub fn intersects(&self, range: Range<usize>) -> bool {
        if range.start >= range.end {
            return false;
        }
        if let Some((_, &end)) = self.extents.range(..=range.start).next_back() {
            if end > range.start {
                return true;
            }
        }
        self.extents.range(range.start..range.end).next().is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = Range<usize>> + '_ {
        self.extents.iter().map(|(&s, &e)| s..e)
    }

    pub fn len(&self) -> usize {
        self.extents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extents.is_empty()
    }

    /// Total number of bytes covered.
    pub fn byte_count(&self) -> usize {
        self.extents.iter().map(|(s, e)| e - s).sum()
    }

    pub fn clear(&mut self) {
        self.extents.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_overlapping() {
        let mut set = DirtySet::new();
        set.insert(10..20);
        set.insert(15..30);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![10..30]);
    }

    #[test]
    fn test_merge_touching_and_bridging() {
        let mut set = DirtySet::new();
        set.insert(0..4);
        set.insert(8..12);
        set.insert(4..8);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![0..12]);
        assert_eq!(set.byte_count(), 12);
    }

    #[test]
    fn test_disjoint_extents_stay_apart() {
        let mut set = DirtySet::new();
        set.insert(100..110);
        set.insert(0..5);
        assert_eq!(set.len(), 2);
        assert!(set.intersects(3..4));
        assert!(!set.intersects(5..100));
        assert!(set.intersects(90..101));
    }

    #[test]
    fn test_empty_range_ignored() {
        let mut set = DirtySet::new();
        set.insert(5..5);
        assert!(set.is_empty());
    }
}
