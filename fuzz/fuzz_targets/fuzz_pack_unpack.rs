//! Fuzz target for pack/unpack roundtrip.
//!
//! Tests that packing and unpacking is the identity operation
//! for valid DNA sequences, folded to uppercase.

#![no_main]

use kbinner::kmer::{KmerLength, PackedKmer};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.is_empty() || data.len() > KmerLength::MAX {
        return;
    }
    for &byte in data {
        if !matches!(byte, b'A' | b'C' | b'G' | b'T' | b'a' | b'c' | b'g' | b't') {
            return;
        }
    }

    let k = KmerLength::new(data.len()).unwrap();
    let kmer = PackedKmer::encode(data, k).unwrap();
    let unpacked = kmer.unpack();

    let normalized: Vec<u8> = data.iter().map(u8::to_ascii_uppercase).collect();
    assert_eq!(unpacked, normalized, "pack/unpack roundtrip failed");
});
