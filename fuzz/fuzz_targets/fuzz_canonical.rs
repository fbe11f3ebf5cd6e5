//! Fuzz target for canonical k-mer computation.
//!
//! Tests that canonical form has the expected properties:
//! 1. Is idempotent
//! 2. k-mer and reverse complement have the same canonical form
//! 3. Canonical form is lexicographically smallest

#![no_main]

use kbinner::kmer::{KmerLength, PackedKmer};
use libfuzzer_sys::fuzz_target;

fn reverse_complement(seq: &[u8]) -> Vec<u8> {
    seq.iter()
        .rev()
        .map(|&b| match b {
            b'A' => b'T',
            b'T' => b'A',
            b'C' => b'G',
            b'G' => b'C',
            _ => unreachable!(),
        })
        .collect()
}

fuzz_target!(|data: &[u8]| {
    if data.is_empty() || data.len() > KmerLength::MAX {
        return;
    }
    for &byte in data {
        if !matches!(byte, b'A' | b'C' | b'G' | b'T') {
            return;
        }
    }

    let k = KmerLength::new(data.len()).unwrap();
    let kmer = PackedKmer::encode(data, k).unwrap();
    let (canonical, _) = kmer.canonical();

    let (canonical2, _) = canonical.canonical();
    assert_eq!(canonical.bits(), canonical2.bits(), "canonical is not idempotent");

    let rc = reverse_complement(data);
    let rc_kmer = PackedKmer::encode(&rc, k).unwrap();
    let (rc_canonical, _) = rc_kmer.canonical();
    assert_eq!(
        canonical.bits(),
        rc_canonical.bits(),
        "k-mer and its reverse complement have different canonical forms"
    );

    assert!(canonical.bits() <= kmer.bits(), "canonical is larger than original");
    assert!(canonical.bits() <= rc_kmer.bits(), "canonical is larger than reverse complement");
});
