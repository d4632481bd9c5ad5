#![no_main]

use arbitrary::Arbitrary;
use decor_observable::{Splice, apply_splices, merge_splices};
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
struct Edit {
    index: u8,
    remove: u8,
    insert: u8,
}

#[derive(Arbitrary, Debug)]
struct Input {
    initial: u8,
    edits: Vec<Edit>,
}

fuzz_target!(|input: Input| {
    let mut array: Vec<u32> = (0..u32::from(input.initial)).collect();
    let previous = array.clone();
    let mut next = 1 << 16;
    let mut raw = Vec::new();

    for edit in input.edits.iter().take(64) {
        let index = usize::from(edit.index).min(array.len());
        let end = index + usize::from(edit.remove % 8).min(array.len() - index);
        let insert = usize::from(edit.insert % 8);
        let added: Vec<u32> = (0..insert)
            .map(|_| {
                next += 1;
                next
            })
            .collect();
        let removed: Vec<u32> = array.splice(index..end, added).collect();
        raw.push(Splice::new(index, removed, insert));
    }

    let merged = merge_splices(raw);
    assert_eq!(apply_splices(&previous, &array, &merged), Some(array.clone()));
    for pair in merged.windows(2) {
        assert!(pair[0].added_end() < pair[1].index);
    }
});
