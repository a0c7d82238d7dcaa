use kernel::FileRange;

/// Allocated extents of a sparse file.
///
/// Extents are half-open, sorted, disjoint and never adjacent: writing next
/// to an extent grows it instead of adding a neighbour.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeSet {
    extents: Vec<(u64, u64)>,
}

impl RangeSet {
    pub fn from_ranges<I: IntoIterator<Item = FileRange>>(ranges: I) -> Self {
        let mut set = Self::default();
        for range in ranges {
            set.insert(range.start, range.end + 1);
        }
        set
    }

    /// Marks `[start, end)` as allocated.
    pub fn insert(&mut self, start: u64, end: u64) {
        if start >= end {
            return;
        }
        let (mut start, mut end) = (start, end);
        let mut merged = Vec::with_capacity(self.extents.len() + 1);
        let mut placed = false;
        for &(s, e) in &self.extents {
            if e < start {
                merged.push((s, e));
            } else if s > end {
                if !placed {
                    merged.push((start, end));
                    placed = true;
                }
                merged.push((s, e));
            } else {
                start = start.min(s);
                end = end.max(e);
            }
        }
        if !placed {
            merged.push((start, end));
        }
        self.extents = merged;
    }

    /// Marks `[start, end)` as unallocated, splitting extents that straddle it.
    pub fn remove(&mut self, start: u64, end: u64) {
        if start >= end {
            return;
        }
        let mut kept = Vec::with_capacity(self.extents.len() + 1);
        for &(s, e) in &self.extents {
            if e <= start || s >= end {
                kept.push((s, e));
                continue;
            }
            if s < start {
                kept.push((s, start));
            }
            if e > end {
                kept.push((end, e));
            }
        }
        self.extents = kept;
    }

    /// Half-open extents in ascending order.
    pub fn extents(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.extents.iter().copied()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.extents.is_empty()
    }

    #[must_use]
    pub fn to_ranges(&self) -> Vec<FileRange> {
        self.extents
            .iter()
            .map(|&(s, e)| FileRange::new(s, e - 1))
            .collect()
    }
}
