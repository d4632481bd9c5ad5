#![no_main]

use std::cell::RefCell;
use std::rc::Rc;

use arbitrary::Arbitrary;
use decor_core::{Scheduler, Value};
use decor_observable::{ObservableArray, Splice, apply_splices};
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
enum Op {
    Splice { index: u8, remove: u8, insert: u8 },
    Push(u8),
    Pop,
    Shift,
    Unshift(u8),
    Set { index: u8, value: u8 },
    SetLen(u8),
    Reverse,
    Sort,
}

fuzz_target!(|ops: Vec<Op>| {
    let scheduler = Scheduler::new();
    let previous_scheduler = Scheduler::install(scheduler.clone());

    let array: ObservableArray = (0..8).collect();
    let before = array.to_vec();
    let seen: Rc<RefCell<Vec<Vec<Splice>>>> = Rc::default();
    let s = Rc::clone(&seen);
    let handle = array.observe_splices(move |splices: &[Splice]| s.borrow_mut().push(splices.to_vec()));

    for op in ops.iter().take(64) {
        match *op {
            Op::Splice { index, remove, insert } => {
                array.splice(
                    usize::from(index % 32),
                    usize::from(remove % 8),
                    (0..insert % 8).map(|n| Value::from(u32::from(n) + 100)),
                );
            }
            Op::Push(n) => {
                array.push([Value::from(u32::from(n))]);
            }
            Op::Pop => {
                array.pop();
            }
            Op::Shift => {
                array.shift();
            }
            Op::Unshift(n) => {
                array.unshift([Value::from(u32::from(n))]);
            }
            Op::Set { index, value } => array.set(usize::from(index % 32), u32::from(value)),
            Op::SetLen(len) => array.set_len(usize::from(len % 32)),
            Op::Reverse => array.reverse(),
            Op::Sort => array.sort(),
        }
    }
    scheduler.flush();
    handle.remove();
    Scheduler::install(previous_scheduler);

    let after = array.to_vec();
    let seen = seen.borrow();
    assert!(seen.len() <= 1);
    if let Some(batch) = seen.first() {
        assert_eq!(apply_splices(&before, &after, batch).as_deref(), Some(&after[..]));
    } else {
        assert_eq!(before, after);
    }
});
