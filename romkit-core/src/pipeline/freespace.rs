//! Free-space map for payload relocation.

use log::debug;
use std::collections::BTreeMap;
use std::ops::Range;

/// Unused byte ranges of an image, as merged logical-offset intervals.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FreeSpaceMap {
    /// start -> end (exclusive)
    gaps: BTreeMap<usize, usize>,
}

impl FreeSpaceMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_regions(regions: impl IntoIterator<Item = Range<usize>>) -> Self {
        let mut map: FreeSpaceMap = Self::new();
        for region in regions {
            map.release(region);
        }
        map
    }

    /// Mark `range` free, merging with touching gaps.
    pub fn release(&mut self, range: Range<usize>) {
        if range.is_empty() {
            return;
        }
        let mut start: usize = range.start;
        let mut end: usize = range.end;
        if let Some((&s, &e)) = self.gaps.range(..=start).next_back() {
            if e >= start {
                start = s;
                end = end.max(e);
            }
        }
        let absorbed: Vec<usize> = self.gaps.range(start..=end).map(|(&s, _)| s).collect();
        for s in absorbed {
            if let Some(e) = self.gaps.remove(&s) {
                end = end.max(e);
            }
        }
        self.gaps.insert(start, end);
    }

    /// Mark `range` used, splitting any gap it overlaps.
    pub fn reserve(&mut self, range: Range<usize>) {
        if range.is_empty() {
            return;
        }
        let overlapping: Vec<(usize, usize)> = self
            .gaps
            .range(..range.end)
            .filter(|(_, &e)| e > range.start)
            .map(|(&s, &e)| (s, e))
            .collect();
        for (s, e) in overlapping {
            self.gaps.remove(&s);
            if s < range.start {
                self.gaps.insert(s, range.start);
            }
            if e > range.end {
                self.gaps.insert(range.end, e);
            }
        }
    }

    /// Take `len` bytes from the smallest gap that holds them, optionally restricted to
    /// `within`. Returns the start offset.
    pub fn allocate(&mut self, len: usize, within: Option<Range<usize>>) -> Option<usize> {
        if len == 0 {
            return None;
        }
        let bounds: Range<usize> = within.unwrap_or(0..usize::MAX);
        let (start, _) = self
            .gaps
            .iter()
            .map(|(&s, &e)| (s.max(bounds.start), e.min(bounds.end)))
            .filter(|&(s, e)| e > s && e - s >= len)
            .min_by_key(|&(s, e)| (e - s, s))?;
        self.reserve(start..start + len);
        debug!("Allocated {} bytes at 0x{:06X}", len, start);
        Some(start)
    }

    pub fn largest_gap(&self) -> usize {
        self.gaps.iter().map(|(s, e)| e - s).max().unwrap_or(0)
    }

    /// Largest gap inside `within`.
    pub fn largest_gap_within(&self, within: &Range<usize>) -> usize {
        self.gaps
            .iter()
            .map(|(&s, &e)| (s.max(within.start), e.min(within.end)))
            .filter(|&(s, e)| e > s)
            .map(|(s, e)| e - s)
            .max()
            .unwrap_or(0)
    }

    pub fn total_free(&self) -> usize {
        self.gaps.iter().map(|(s, e)| e - s).sum()
    }

    pub fn contains(&self, offset: usize) -> bool {
        self.gaps
            .range(..=offset)
            .next_back()
            .map_or(false, |(_, &e)| offset < e)
    }

    pub fn iter(&self) -> impl Iterator<Item = Range<usize>> + '_ {
        self.gaps.iter().map(|(&s, &e)| s..e)
    }

    pub fn is_empty(&self) -> bool {
        self.gaps.is_empty()
    }
}
