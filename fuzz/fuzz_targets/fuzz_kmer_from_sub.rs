//! Fuzz target for `PackedKmer::encode`.
//!
//! Tests that encoding arbitrary byte input never panics: either it
//! succeeds, or it reports the index of the first byte that isn't one
//! of `{A,C,G,T}` (case-insensitive).

#![no_main]

use kbinner::kmer::{KmerLength, PackedKmer};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.is_empty() || data.len() > KmerLength::MAX {
        return;
    }
    let k = KmerLength::new(data.len()).unwrap();

    match PackedKmer::encode(data, k) {
        Ok(kmer) => {
            for &byte in &kmer.unpack() {
                assert!(matches!(byte, b'A' | b'C' | b'G' | b'T'));
            }
        }
        Err(position) => {
            assert!(position < data.len());
            let byte = data[position];
            assert!(
                !matches!(byte, b'A' | b'C' | b'G' | b'T' | b'a' | b'c' | b'g' | b't'),
                "reported position {position} holds a valid base"
            );
        }
    }
});
