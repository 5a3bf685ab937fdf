#![no_main]

use bfs_skiplist::SkipList;
use libfuzzer_sys::fuzz_target;

// Every 9-byte chunk is one operation: the first byte picks insert or remove,
// the rest is the key (inserts) or the handle to remove (removes). Entropy is
// taken from the same bytes, so structured inputs exercise skewed levels too.
fuzz_target!(|data: &[u8]| {
    let values: Vec<usize> = (0..data.len() / 9 + 1).collect();
    let mut list = SkipList::new();
    let mut handles = Vec::new();

    for (chunk, value) in data.chunks_exact(9).zip(values.iter()) {
        let mut word = [0u8; 8];
        word.copy_from_slice(&chunk[1..]);
        let word = u64::from_le_bytes(word);

        if chunk[0] % 4 == 0 && !handles.is_empty() {
            let handle = handles.swap_remove(word as usize % handles.len());
            list.remove(handle).unwrap();
        } else {
            handles.push(list.insert(word % 256, value, word.rotate_left(chunk[0] as u32)));
        }

        if let Err(violation) = list.check_invariants() {
            panic!("{}", violation);
        }
    }

    assert_eq!(list.len(), handles.len());
});
