//! Splice records and the splice merger.
//!
//! A [`Splice`] describes one array edit: at `index`, the elements in
//! `removed` were replaced by `added_count` new elements. [`merge_splice`]
//! folds a new splice (expressed against the array *after* all previously
//! merged splices) into a list of merged splices (expressed against the
//! array *before* the batch), keeping the list sorted by index with no two
//! entries touching.
//!
//! # Invariants
//!
//! For splices `s1..sn` applied in order to `previous` producing `current`:
//!
//! 1. `apply_splices(previous, current, merge_splices(s1..sn)) == current`.
//! 2. Merged splices are in strictly ascending, non-adjacent index order.
//! 3. `merge_splices(s).len() <= s.len()`.

/// One array edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Splice<T = decor_core::Value> {
    pub index: usize,
    pub removed: Vec<T>,
    pub added_count: usize,
}

impl<T> Default for Splice<T> {
    fn default() -> Self {
        Self {
            index: 0,
            removed: Vec::new(),
            added_count: 0,
        }
    }
}

impl<T> Splice<T> {
    #[must_use]
    pub fn new(index: usize, removed: Vec<T>, added_count: usize) -> Self {
        Self {
            index,
            removed,
            added_count,
        }
    }

    /// Neither removes nor adds anything.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.removed.is_empty() && self.added_count == 0
    }

    /// Net change in array length.
    #[must_use]
    pub fn delta(&self) -> isize {
        self.added_count as isize - self.removed.len() as isize
    }

    /// End of the range this splice occupies in the array after it.
    #[must_use]
    pub fn added_end(&self) -> usize {
        self.index + self.added_count
    }

    /// End of the range this splice occupied in the array before it.
    #[must_use]
    pub fn removed_end(&self) -> usize {
        self.index + self.removed.len()
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Splice<U> {
        Splice {
            index: self.index,
            removed: self.removed.into_iter().map(f).collect(),
            added_count: self.added_count,
        }
    }
}

/// Signed overlap of `[start1, end1)` and `[start2, end2)`: `-1` when the
/// ranges are apart, `0` when they touch, otherwise the overlap length.
#[must_use]
pub fn intersect(start1: usize, end1: usize, start2: usize, end2: usize) -> isize {
    if end1 < start2 || end2 < start1 {
        return -1;
    }
    if end1 == start2 || end2 == start1 {
        return 0;
    }
    (end1.min(end2) - start1.max(start2)) as isize
}

fn shift(index: usize, by: isize) -> usize {
    index.saturating_add_signed(by)
}

/// Fold `incoming` into `merged`.
pub fn merge_splice<T: Clone>(merged: &mut Vec<Splice<T>>, mut incoming: Splice<T>) {
    if incoming.is_noop() {
        return;
    }
    let mut inserted = false;
    let mut offset: isize = 0;
    let mut i = 0;

    while i < merged.len() {
        merged[i].index = shift(merged[i].index, offset);
        if inserted {
            i += 1;
            continue;
        }

        let current = &merged[i];
        let overlap = intersect(
            current.index,
            current.added_end(),
            incoming.index,
            incoming.removed_end(),
        );

        if overlap >= 0 {
            let current = merged.remove(i);
            let overlap = overlap as usize;
            offset -= current.delta();

            incoming.added_count = incoming.added_count + current.added_count - overlap;
            let deleted = incoming.removed.len() + current.removed.len() - overlap;

            if incoming.added_count == 0 && deleted == 0 {
                // The two edits cancel out.
                inserted = true;
            } else {
                let (current_index, current_end) = (current.index, current.added_end());
                let mut removed = current.removed;
                if incoming.index < current_index {
                    let mut prefix = incoming.removed[..current_index - incoming.index].to_vec();
                    prefix.append(&mut removed);
                    removed = prefix;
                }
                if incoming.removed_end() > current_end {
                    removed.extend_from_slice(&incoming.removed[current_end - incoming.index..]);
                }
                incoming.removed = removed;
                incoming.index = incoming.index.min(current_index);
            }
        } else if incoming.index < current.index {
            let delta = incoming.delta();
            merged[i].index = shift(merged[i].index, delta);
            offset += delta;
            merged.insert(i, std::mem::take(&mut incoming));
            inserted = true;
            i += 2;
        } else {
            i += 1;
        }
    }

    if !inserted {
        merged.push(incoming);
    }
}

/// Merge a batch of splices, applied in order, into the minimal equivalent
/// list.
pub fn merge_splices<T: Clone>(splices: impl IntoIterator<Item = Splice<T>>) -> Vec<Splice<T>> {
    let mut merged = Vec::new();
    for splice in splices {
        merge_splice(&mut merged, splice);
    }
    merged
}

/// Replay merged `splices` against `previous`, taking added elements from
/// `current`. Returns `None` when the splices do not fit the arrays.
#[must_use]
pub fn apply_splices<T: Clone + PartialEq>(
    previous: &[T],
    current: &[T],
    splices: &[Splice<T>],
) -> Option<Vec<T>> {
    let mut out = previous.to_vec();
    // Indices of later splices already account for earlier ones.
    for splice in splices {
        let end = splice.removed_end();
        if end > out.len() || out[splice.index..end] != splice.removed[..] {
            return None;
        }
        let added = current.get(splice.index..splice.added_end())?;
        out.splice(splice.index..end, added.iter().cloned());
    }
    Some(out)
}
