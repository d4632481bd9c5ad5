//! Merged splice observation and the merge round trip.

use std::cell::RefCell;
use std::rc::Rc;

use decor_core::{Scheduler, Value};
use decor_observable::{ObservableArray, Splice, apply_splices, merge_splices};
use proptest::prelude::*;

type Log = Rc<RefCell<Vec<Vec<Splice>>>>;

const BASE: [&str; 10] = ["a", "b", "c", "d", "e", "f", "g", "h", "i", "j"];

fn fresh_scheduler() -> (Scheduler, Scheduler) {
    let scheduler = Scheduler::new();
    let previous = Scheduler::install(scheduler.clone());
    (scheduler, previous)
}

fn splice(index: usize, removed: &[&str], added_count: usize) -> Splice {
    Splice::new(
        index,
        removed.iter().map(|s| Value::from(*s)).collect(),
        added_count,
    )
}

/// Apply `edits` to the base array in one tick and return what a splice
/// observer received, checking the round trip along the way.
fn merged_after(edits: &[(usize, usize, &[&str])]) -> Vec<Vec<Splice>> {
    let (scheduler, previous) = fresh_scheduler();
    let array: ObservableArray = BASE.into_iter().collect();
    let before = array.to_vec();
    let log: Log = Rc::default();
    let l = Rc::clone(&log);
    let handle = array.observe_splices(move |splices: &[Splice]| l.borrow_mut().push(splices.to_vec()));

    for (index, remove, items) in edits {
        array.splice(*index, *remove, items.iter().copied());
    }
    scheduler.flush();
    handle.remove();
    Scheduler::install(previous);

    let after = array.to_vec();
    for batch in log.borrow().iter() {
        assert_eq!(apply_splices(&before, &after, batch).as_deref(), Some(&after[..]));
    }
    log.take()
}

#[test]
fn second_right_disjoint() {
    let got = merged_after(&[(3, 4, &["A", "B", "C"]), (7, 2, &["0", "1", "2"])]);
    assert_eq!(
        got,
        vec![vec![splice(3, &["d", "e", "f", "g"], 3), splice(7, &["i", "j"], 3)]]
    );
}

#[test]
fn second_right_adjacent() {
    let got = merged_after(&[(3, 4, &["A", "B", "C"]), (6, 2, &["0", "1", "2"])]);
    assert_eq!(got, vec![vec![splice(3, &["d", "e", "f", "g", "h", "i"], 6)]]);
}

#[test]
fn second_right_intersecting() {
    let got = merged_after(&[(3, 4, &["A", "B", "C"]), (5, 2, &["0", "1", "2"])]);
    assert_eq!(got, vec![vec![splice(3, &["d", "e", "f", "g", "h"], 5)]]);
}

#[test]
fn first_contains_second() {
    let got = merged_after(&[(3, 3, &["A", "B", "C", "D"]), (4, 2, &["0", "1", "2"])]);
    assert_eq!(got, vec![vec![splice(3, &["d", "e", "f"], 5)]]);
}

#[test]
fn second_left_disjoint() {
    let got = merged_after(&[(4, 2, &["A", "B", "C"]), (1, 2, &["0", "1", "2"])]);
    assert_eq!(
        got,
        vec![vec![splice(1, &["b", "c"], 3), splice(5, &["e", "f"], 3)]]
    );
}

#[test]
fn second_left_adjacent() {
    let got = merged_after(&[(4, 2, &["A", "B", "C"]), (2, 2, &["0", "1", "2"])]);
    assert_eq!(got, vec![vec![splice(2, &["c", "d", "e", "f"], 6)]]);
}

#[test]
fn second_left_intersecting() {
    let got = merged_after(&[(4, 2, &["A", "B", "C"]), (3, 2, &["0", "1", "2"])]);
    assert_eq!(got, vec![vec![splice(3, &["d", "e", "f"], 5)]]);
}

#[test]
fn second_contains_first() {
    let got = merged_after(&[(4, 2, &["A", "B", "C"]), (3, 5, &["0", "1", "2"])]);
    assert_eq!(got, vec![vec![splice(3, &["d", "e", "f", "g"], 3)]]);
}

#[test]
fn third_touches_first_only() {
    let got = merged_after(&[
        (3, 3, &["A", "B"]),
        (7, 2, &["0", "1", "2"]),
        (5, 1, &["x", "y"]),
    ]);
    assert_eq!(
        got,
        vec![vec![splice(3, &["d", "e", "f", "g"], 4), splice(8, &["i", "j"], 3)]]
    );
}

#[test]
fn third_touches_second_only() {
    let got = merged_after(&[
        (3, 3, &["A", "B"]),
        (7, 2, &["0", "1", "2"]),
        (6, 1, &["x", "y"]),
    ]);
    assert_eq!(
        got,
        vec![vec![splice(3, &["d", "e", "f"], 2), splice(6, &["h", "i", "j"], 5)]]
    );
}

#[test]
fn third_bridges_first_and_second() {
    let got = merged_after(&[
        (3, 3, &["A", "B"]),
        (7, 2, &["0", "1", "2"]),
        (5, 2, &["x", "y", "z"]),
    ]);
    assert_eq!(
        got,
        vec![vec![splice(3, &["d", "e", "f", "g", "h", "i", "j"], 8)]]
    );
}

#[test]
fn first_contains_second_and_third() {
    let got = merged_after(&[
        (1, 8, &["A", "B", "C", "D", "E", "F", "G"]),
        (2, 2, &["0", "1", "2"]),
        (6, 2, &["x", "y", "z"]),
    ]);
    assert_eq!(
        got,
        vec![vec![splice(1, &["b", "c", "d", "e", "f", "g", "h", "i"], 9)]]
    );
}

#[test]
fn second_contains_first_and_third() {
    let got = merged_after(&[
        (2, 3, &["A", "B"]),
        (1, 7, &["0", "1", "2", "3"]),
        (2, 2, &["x", "y", "z"]),
    ]);
    assert_eq!(
        got,
        vec![vec![splice(1, &["b", "c", "d", "e", "f", "g", "h", "i"], 5)]]
    );
}

#[test]
fn third_contains_first_and_second() {
    let got = merged_after(&[
        (2, 3, &["A", "B"]),
        (5, 2, &["0", "1", "2"]),
        (1, 8, &["x", "y", "z"]),
    ]);
    assert_eq!(
        got,
        vec![vec![splice(1, &["b", "c", "d", "e", "f", "g", "h", "i"], 3)]]
    );
}

#[test]
fn edits_that_cancel_out_are_not_reported() {
    let got = merged_after(&[(2, 0, &["x"]), (2, 1, &[])]);
    assert!(got.is_empty());
}

// ── Non-splice mutators through the merged view ─────────────────────────────

fn observed(array: &ObservableArray) -> (Log, decor_observable::ObservationHandle) {
    let log: Log = Rc::default();
    let l = Rc::clone(&log);
    let handle = array.observe_splices(move |splices: &[Splice]| l.borrow_mut().push(splices.to_vec()));
    (log, handle)
}

#[test]
fn sort_is_one_whole_array_splice() {
    let (scheduler, previous) = fresh_scheduler();
    let array: ObservableArray = BASE.into_iter().collect();
    let (log, _h) = observed(&array);

    array.sort_by(|a, b| b.as_str().cmp(&a.as_str()));
    scheduler.flush();

    assert_eq!(*log.borrow(), vec![vec![splice(0, &BASE, 10)]]);
    assert_eq!(array.get(0), Some(Value::from("j")));
    Scheduler::install(previous);
}

#[test]
fn length_shrink_then_grow_merges() {
    let (scheduler, previous) = fresh_scheduler();
    let array: ObservableArray = BASE.into_iter().collect();
    let (log, _h) = observed(&array);

    array.set_len(7);
    array.set_len(12);
    scheduler.flush();

    assert_eq!(*log.borrow(), vec![vec![splice(7, &["h", "i", "j"], 5)]]);
    Scheduler::install(previous);
}

#[test]
fn sequential_pushes_merge() {
    let (scheduler, previous) = fresh_scheduler();
    let array: ObservableArray = BASE.into_iter().collect();
    let (log, _h) = observed(&array);

    array.push(["k"]);
    array.push(["l"]);
    scheduler.flush();

    assert_eq!(*log.borrow(), vec![vec![splice(10, &[], 2)]]);
    Scheduler::install(previous);
}

#[test]
fn indexed_sets_merge_into_one_insertion() {
    let (scheduler, previous) = fresh_scheduler();
    let array = ObservableArray::new();
    let (log, _h) = observed(&array);

    array.set(0, "a");
    array.set(1, "b");
    array.set(2, "c");
    array.set(1, "B");
    array.set(3, "d");
    scheduler.flush();

    assert_eq!(*log.borrow(), vec![vec![splice(0, &[], 4)]]);
    Scheduler::install(previous);
}

#[test]
fn filling_a_hole_replaces_undefined() {
    let (scheduler, previous) = fresh_scheduler();
    let array = ObservableArray::with_len(3);
    let (log, _h) = observed(&array);

    array.set(1, "b");
    scheduler.flush();

    assert_eq!(
        *log.borrow(),
        vec![vec![Splice::new(1, vec![Value::Undefined], 1)]]
    );
    Scheduler::install(previous);
}

#[test]
fn handle_delivers_synchronously_and_removes() {
    let (scheduler, previous) = fresh_scheduler();
    let array: ObservableArray = BASE.into_iter().collect();
    let (log, handle) = observed(&array);

    array.push(["k"]);
    handle.deliver();
    assert_eq!(*log.borrow(), vec![vec![splice(10, &[], 1)]]);

    handle.remove();
    handle.remove();
    array.push(["l"]);
    scheduler.flush();
    assert_eq!(log.borrow().len(), 1);
    Scheduler::install(previous);
}

// ── Properties ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Edit {
    index: usize,
    remove: usize,
    insert: usize,
}

fn edit_strategy() -> impl Strategy<Value = Edit> {
    (0usize..16, 0usize..5, 0usize..5).prop_map(|(index, remove, insert)| Edit {
        index,
        remove,
        insert,
    })
}

proptest! {
    #[test]
    fn merged_splices_replay_to_the_final_array(
        initial in 0usize..12,
        edits in prop::collection::vec(edit_strategy(), 1..12),
    ) {
        let mut array: Vec<u32> = (0..initial as u32).collect();
        let previous = array.clone();
        let mut next = 1000u32;
        let mut raw = Vec::new();

        for edit in &edits {
            let index = edit.index.min(array.len());
            let end = index + edit.remove.min(array.len() - index);
            let added: Vec<u32> = (0..edit.insert)
                .map(|_| {
                    next += 1;
                    next
                })
                .collect();
            let removed: Vec<u32> = array.splice(index..end, added).collect();
            raw.push(Splice::new(index, removed, edit.insert));
        }

        let merged = merge_splices(raw.iter().cloned());
        prop_assert_eq!(apply_splices(&previous, &array, &merged), Some(array.clone()));
        prop_assert!(merged.len() <= raw.iter().filter(|s| !s.is_noop()).count());
        for pair in merged.windows(2) {
            prop_assert!(pair[0].added_end() < pair[1].index);
        }
    }
}
