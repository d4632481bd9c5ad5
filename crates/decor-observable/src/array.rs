//! Observable arrays.
//!
//! Every structural edit emits a `splice` record. Length changes also emit an
//! `update` of `length`, but from inside a `splice` transaction, so observers
//! that accept `splice` see only the splice while plain observers see only
//! the length update.
//!
//! [`ObservableArray::observe_splices`] folds everything an array emitted
//! during a tick into the minimal sorted list of [`Splice`]s.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use decor_core::{CallbackOutcome, DecorError, Result, Value};

use crate::change::{AcceptList, Change, ChangeRecord, ChangeType, PropertyKey};
use crate::notifier::{ChangeCallback, Notifier, ObservationHandle};
use crate::observable::Observable;
use crate::splice::{Splice, merge_splices};

/// Accept list used by splice observers.
pub const SPLICE_ACCEPT: [ChangeType; 4] = [
    ChangeType::Add,
    ChangeType::Update,
    ChangeType::Delete,
    ChangeType::Splice,
];

struct ArrayInner {
    notifier: Notifier,
    items: RefCell<Vec<Value>>,
}

/// A list that emits `splice` and indexed `update` records.
///
/// Cloning an `ObservableArray` creates a new handle to the **same** array.
#[derive(Clone)]
pub struct ObservableArray {
    inner: Rc<ArrayInner>,
}

impl fmt::Debug for ObservableArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservableArray")
            .field("id", &self.inner.notifier.id())
            .field("items", &self.inner.items.borrow())
            .finish()
    }
}

impl Default for ObservableArray {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Into<Value>> FromIterator<V> for ObservableArray {
    fn from_iter<I: IntoIterator<Item = V>>(iter: I) -> Self {
        Self::from_vec(iter.into_iter().map(Into::into).collect())
    }
}

impl Observable for ObservableArray {
    fn notifier(&self) -> &Notifier {
        &self.inner.notifier
    }
}

impl ObservableArray {
    #[must_use]
    pub fn new() -> Self {
        Self::from_vec(Vec::new())
    }

    /// An array of `len` holes.
    #[must_use]
    pub fn with_len(len: usize) -> Self {
        Self::from_vec(vec![Value::Undefined; len])
    }

    fn from_vec(items: Vec<Value>) -> Self {
        Self {
            inner: Rc::new(ArrayInner {
                notifier: Notifier::new(),
                items: RefCell::new(items),
            }),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.items.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.items.borrow().is_empty()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<Value> {
        self.inner.items.borrow().get(index).cloned()
    }

    #[must_use]
    pub fn to_vec(&self) -> Vec<Value> {
        self.inner.items.borrow().clone()
    }

    /// Replace `remove` elements at `index` with `items` and return the
    /// removed elements.
    ///
    /// `index` is clamped to the length and `remove` to what follows it. An
    /// edit that neither removes nor inserts emits nothing.
    pub fn splice<I, V>(&self, index: usize, remove: usize, items: I) -> Vec<Value>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let added: Vec<Value> = items.into_iter().map(Into::into).collect();
        let added_count = added.len();
        let (index, old_len, new_len, removed) = {
            let mut vec = self.inner.items.borrow_mut();
            let old_len = vec.len();
            let index = index.min(old_len);
            let end = index + remove.min(old_len - index);
            let removed: Vec<Value> = vec.splice(index..end, added).collect();
            (index, old_len, vec.len(), removed)
        };
        if removed.is_empty() && added_count == 0 {
            return removed;
        }

        let notifier = &self.inner.notifier;
        let record = Splice::new(index, removed.clone(), added_count);
        notifier.perform_change(ChangeType::Splice, || {
            if old_len != new_len {
                notifier.notify(Change::Update {
                    name: PropertyKey::from("length"),
                    old_value: Value::from(old_len),
                });
            }
            Some(Change::Splice(record))
        });
        removed
    }

    /// Append `items`; returns the new length.
    pub fn push<I, V>(&self, items: I) -> usize
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.splice(self.len(), 0, items);
        self.len()
    }

    pub fn pop(&self) -> Option<Value> {
        let len = self.len();
        if len == 0 {
            return None;
        }
        self.splice(len - 1, 1, std::iter::empty::<Value>()).pop()
    }

    pub fn shift(&self) -> Option<Value> {
        if self.is_empty() {
            return None;
        }
        self.splice(0, 1, std::iter::empty::<Value>()).pop()
    }

    /// Prepend `items`; returns the new length.
    pub fn unshift<I, V>(&self, items: I) -> usize
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.splice(0, 0, items);
        self.len()
    }

    /// Remove the element at `index`, reported as a one-element splice.
    pub fn remove(&self, index: usize) -> Result<Value> {
        let length = self.len();
        if index >= length {
            return Err(DecorError::IndexOutOfBounds { index, length });
        }
        self.splice(index, 1, std::iter::empty::<Value>())
            .pop()
            .ok_or(DecorError::IndexOutOfBounds { index, length })
    }

    pub fn reverse(&self) {
        let old = self.to_vec();
        self.inner.items.borrow_mut().reverse();
        self.notify_whole(old);
    }

    /// Sort in natural order: `undefined` last, then by type (null, bools,
    /// numbers, strings, others) and by value within a type.
    pub fn sort(&self) {
        self.sort_by(natural_order);
    }

    pub fn sort_by<F>(&self, compare: F)
    where
        F: FnMut(&Value, &Value) -> Ordering,
    {
        let old = self.to_vec();
        self.inner.items.borrow_mut().sort_by(compare);
        self.notify_whole(old);
    }

    /// Record a rewrite of the entire array.
    fn notify_whole(&self, old: Vec<Value>) {
        let len = self.len();
        if old.is_empty() && len == 0 {
            return;
        }
        self.inner
            .notifier
            .notify(Change::Splice(Splice::new(0, old, len)));
    }

    /// Write `value` at `index`. Writing past the end pads with holes and is
    /// reported as a splice; writing inside reports an indexed `update`.
    pub fn set(&self, index: usize, value: impl Into<Value>) {
        let value = value.into();
        let len = self.len();
        if index >= len {
            let padding = std::iter::repeat_n(Value::Undefined, index - len);
            self.splice(len, 0, padding.chain(std::iter::once(value)));
            return;
        }
        let old = std::mem::replace(&mut self.inner.items.borrow_mut()[index], value.clone());
        if !old.same_value(&value) {
            self.inner.notifier.notify(Change::Update {
                name: PropertyKey::Index(index),
                old_value: old,
            });
        }
    }

    /// Truncate, or extend with holes, to `len`.
    pub fn set_len(&self, len: usize) {
        let current = self.len();
        self.splice(
            current.min(len),
            current.saturating_sub(len),
            std::iter::repeat_n(Value::Undefined, len.saturating_sub(current)),
        );
    }

    /// Register `callback` for raw records; see [`crate::observe`].
    pub fn observe(&self, callback: &ChangeCallback, accept: Option<AcceptList>) -> ObservationHandle {
        crate::observable::observe(self, callback, accept)
    }

    /// Observe this array as merged splices.
    ///
    /// At each delivery the accumulated records are normalized to splices and
    /// merged; `callback` runs only if the merged list is non-empty.
    pub fn observe_splices<F, R>(&self, callback: F) -> ObservationHandle
    where
        F: Fn(&[Splice]) -> R + 'static,
        R: CallbackOutcome,
    {
        let change_callback = ChangeCallback::from_fn(move |records: &[ChangeRecord]| {
            let merged = merge_splices(records.iter().filter_map(normalize));
            if merged.is_empty() {
                return Ok(());
            }
            callback(&merged).into_outcome()
        });
        self.inner
            .notifier
            .observe(&change_callback, AcceptList::from(SPLICE_ACCEPT))
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

/// [`ObservableArray::observe_splices`] as a free function.
pub fn observe_splices<F, R>(array: &ObservableArray, callback: F) -> ObservationHandle
where
    F: Fn(&[Splice]) -> R + 'static,
    R: CallbackOutcome,
{
    array.observe_splices(callback)
}

/// Indexed writes become one-element replacements; named keys are ignored.
fn normalize(record: &ChangeRecord) -> Option<Splice> {
    match &record.change {
        Change::Splice(splice) => Some(splice.clone()),
        Change::Add { name } => {
            let index = name.as_index()?;
            Some(Splice::new(index, vec![Value::Undefined], 1))
        }
        Change::Update { name, old_value } | Change::Delete { name, old_value } => {
            let index = name.as_index()?;
            Some(Splice::new(index, vec![old_value.clone()], 1))
        }
        _ => None,
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::List(_) | Value::Object(_) => 4,
        Value::Undefined => 5,
    }
}

fn natural_order(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => x.total_cmp(y),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn values(items: &[i64]) -> Vec<Value> {
        items.iter().map(|&n| Value::from(n)).collect()
    }

    #[test]
    fn splice_clamps_and_returns_removed() {
        let array: ObservableArray = [1, 2, 3].into_iter().collect();
        assert_eq!(array.splice(2, 10, [9]), values(&[3]));
        assert_eq!(array.to_vec(), values(&[1, 2, 9]));
        assert_eq!(array.splice(10, 0, [4]), Vec::<Value>::new());
        assert_eq!(array.to_vec(), values(&[1, 2, 9, 4]));
    }

    #[test]
    fn stack_and_queue_operations() {
        let array = ObservableArray::new();
        assert_eq!(array.push([1, 2]), 2);
        assert_eq!(array.unshift([0]), 3);
        assert_eq!(array.pop(), Some(Value::from(2)));
        assert_eq!(array.shift(), Some(Value::from(0)));
        assert_eq!(array.to_vec(), values(&[1]));
        array.pop();
        assert_eq!(array.pop(), None);
        assert_eq!(array.shift(), None);
    }

    #[test]
    fn remove_is_bounds_checked() {
        let array: ObservableArray = [1, 2, 3].into_iter().collect();
        assert_eq!(array.remove(1), Ok(Value::from(2)));
        assert_eq!(
            array.remove(2),
            Err(DecorError::IndexOutOfBounds { index: 2, length: 2 })
        );
        assert_eq!(array.to_vec(), values(&[1, 3]));
    }

    #[test]
    fn set_past_end_pads_with_holes() {
        let array = ObservableArray::new();
        array.set(2, "c");
        assert_eq!(
            array.to_vec(),
            vec![Value::Undefined, Value::Undefined, Value::from("c")]
        );
    }

    #[test]
    fn set_len_truncates_and_extends() {
        let array: ObservableArray = [1, 2, 3].into_iter().collect();
        array.set_len(1);
        assert_eq!(array.to_vec(), values(&[1]));
        array.set_len(3);
        assert_eq!(array.to_vec(), vec![Value::from(1), Value::Undefined, Value::Undefined]);
    }

    #[test]
    fn natural_sort() {
        let array: ObservableArray = [
            Value::from(3),
            Value::Undefined,
            Value::from("a"),
            Value::from(-1),
            Value::Null,
        ]
        .into_iter()
        .collect();
        array.sort();
        assert_eq!(
            array.to_vec(),
            vec![
                Value::Null,
                Value::from(-1),
                Value::from(3),
                Value::from("a"),
                Value::Undefined
            ]
        );
    }

    #[test]
    fn normalize_ignores_named_keys() {
        let record = ChangeRecord {
            object: ObservableArray::new().notifier().id(),
            change: Change::Update {
                name: PropertyKey::from("length"),
                old_value: Value::from(0),
            },
        };
        assert_eq!(normalize(&record), None);
    }
}
