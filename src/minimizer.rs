//! Minimizer computation and super-mer splitting.
//!
//! The minimizer of a k-mer is the lexicographically-minimum length-m
//! substring under a fixed total order (not plain lexicographic order —
//! that would make `AAA...A` the minimizer of almost every homopolymer
//! run and badly imbalance bins). The order here is a deterministic
//! splitmix64-style hash of the packed m-mer bits, which scatters
//! `AAA...A` to an arbitrary rank instead of always ranking it lowest.
//!
//! The sliding-window minimizer over a read is computed with a monotone
//! deque so each base's contribution is amortized O(1), following the
//! standard minimizer-scheme algorithm.

use std::collections::VecDeque;

/// Scatters the 2-bit-packed m-mer `bits` to a pseudo-random rank. Two
/// distinct m-mers essentially never tie; ties (including self-ties) are
/// broken by comparing `bits` directly, so the order is total.
fn minimizer_rank(bits: u64) -> u64 {
    // splitmix64 finalizer
    let mut z = bits.wrapping_add(0x9E3779B97F4A7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

/// Total order key for an m-mer: `(rank, bits)` so ties are deterministic.
fn order_key(bits: u64) -> (u64, u64) {
    (minimizer_rank(bits), bits)
}

/// Packs every length-m substring of `seq` (ASCII-encoded, already
/// validated/uppercased bases) into its 2-bit representation. Returns
/// `None` at any position containing a non-ACGT byte — the caller uses
/// this to know where a super-mer must end.
fn m_mer_codes(seq: &[u8], m: usize) -> Vec<Option<u64>> {
    if seq.len() < m {
        return Vec::new();
    }
    let mut codes = Vec::with_capacity(seq.len() - m + 1);
    'windows: for start in 0..=(seq.len() - m) {
        let mut bits = 0u64;
        for &byte in &seq[start..start + m] {
            let Some(base) = crate::kmer::Base::from_ascii(byte) else {
                codes.push(None);
                continue 'windows;
            };
            bits = (bits << 2) | base.bits();
        }
        codes.push(Some(bits));
    }
    codes
}

/// The minimizer (as packed m-mer bits) of every k-mer window in `seq`,
/// or `None` where the window contains an invalid base. `window_len` is
/// `k - m + 1`, the number of m-mer positions inside one k-mer.
fn sliding_minimizers(m_mers: &[Option<u64>], window_len: usize) -> Vec<Option<u64>> {
    if m_mers.len() < window_len {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(m_mers.len() - window_len + 1);
    // Monotone deque of candidate indices, increasing order_key front-to-back.
    let mut deque: VecDeque<usize> = VecDeque::new();

    for i in 0..m_mers.len() {
        if let Some(bits) = m_mers[i] {
            let key = order_key(bits);
            while let Some(&back) = deque.back() {
                match m_mers[back] {
                    Some(b) if order_key(b) > key => {
                        deque.pop_back();
                    }
                    _ => break,
                }
            }
            deque.push_back(i);
        } else {
            deque.clear();
        }

        if i + 1 >= window_len {
            let window_start = i + 1 - window_len;
            while let Some(&front) = deque.front() {
                if front < window_start {
                    deque.pop_front();
                } else {
                    break;
                }
            }
            let has_invalid = m_mers[window_start..=i].iter().any(Option::is_none);
            out.push(if has_invalid {
                None
            } else {
                deque.front().and_then(|&idx| m_mers[idx])
            });
        }
    }
    out
}

/// A contiguous run of k-mer positions sharing one minimizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuperMerSpan {
    /// Start offset (inclusive) into the read, in bases.
    pub start: usize,
    /// End offset (exclusive) into the read, in bases. Length is `>= k`.
    pub end: usize,
    /// The packed minimizer bits shared by every k-mer in this span.
    pub minimizer_bits: u64,
}

/// The byte-reverse-complement of `seq`. Bytes outside `ACGTacgt` are left
/// in place — they're invalid either way, and `Base::from_ascii` rejects
/// them regardless of position.
fn reverse_complement_bases(seq: &[u8]) -> Vec<u8> {
    seq.iter()
        .rev()
        .map(|&byte| match crate::kmer::Base::from_ascii(byte) {
            Some(base) => base.complement().to_ascii(),
            None => byte,
        })
        .collect()
}

/// Combines `forward`, the per-position forward-strand minimizer, with the
/// mirrored reverse-complement-strand minimizer so that a k-mer and its
/// reverse complement always resolve to the same value: the k-mer at
/// forward position `i` and the k-mer at reverse-complement position
/// `len - k - i` are reverse complements of each other, so taking
/// whichever of the two minimizers orders lower gives both orientations
/// an identical result.
fn canonical_minimizers(seq: &[u8], k: usize, m: usize, forward: &[Option<u64>]) -> Vec<Option<u64>> {
    let rc_seq = reverse_complement_bases(seq);
    let rc_m_mers = m_mer_codes(&rc_seq, m);
    let window_len = k - m + 1;
    let rc = sliding_minimizers(&rc_m_mers, window_len);
    let len = seq.len();

    forward
        .iter()
        .enumerate()
        .map(|(i, &fwd)| {
            let mirrored = rc.get(len - k - i).copied().flatten();
            match (fwd, mirrored) {
                (Some(f), Some(r)) => Some(if order_key(r) < order_key(f) { r } else { f }),
                (Some(f), None) => Some(f),
                (None, Some(r)) => Some(r),
                (None, None) => None,
            }
        })
        .collect()
}

/// Splits `seq` into maximal super-mer spans. A span boundary occurs
/// whenever the minimizer changes, or at a run of invalid bases (which
/// are skipped entirely — they never start or extend a k-mer window).
///
/// When `normalize` is set, the minimizer at each position is taken over
/// the canonical (lower-ordering) of the forward and reverse-complement
/// k-mer, so a k-mer and its reverse complement always land in the same
/// bin once [`bin_of`] is applied.
pub fn super_mer_spans(seq: &[u8], k: usize, m: usize, normalize: bool) -> Vec<SuperMerSpan> {
    assert!(m <= k, "minimizer length must not exceed k-mer length");
    if seq.len() < k {
        return Vec::new();
    }
    let m_mers = m_mer_codes(seq, m);
    let window_len = k - m + 1;
    let forward = sliding_minimizers(&m_mers, window_len);
    let minimizers = if normalize {
        canonical_minimizers(seq, k, m, &forward)
    } else {
        forward
    };

    let mut spans = Vec::new();
    let mut run_start: Option<usize> = None;
    let mut run_minimizer: Option<u64> = None;

    for (kmer_start, minimizer) in minimizers.into_iter().enumerate() {
        match (minimizer, run_minimizer) {
            (None, _) => {
                if let (Some(start), Some(mz)) = (run_start.take(), run_minimizer.take()) {
                    spans.push(SuperMerSpan {
                        start,
                        end: kmer_start + k - 1,
                        minimizer_bits: mz,
                    });
                }
            }
            (Some(mz), Some(prev)) if mz == prev => {
                // extend current run
            }
            (Some(mz), _) => {
                if let (Some(start), Some(prev_mz)) = (run_start.take(), run_minimizer.take()) {
                    spans.push(SuperMerSpan {
                        start,
                        end: kmer_start + k - 1,
                        minimizer_bits: prev_mz,
                    });
                }
                run_start = Some(kmer_start);
                run_minimizer = Some(mz);
            }
        }
    }
    if let (Some(start), Some(mz)) = (run_start, run_minimizer) {
        spans.push(SuperMerSpan {
            start,
            end: seq.len(),
            minimizer_bits: mz,
        });
    }
    spans
}

/// Assigns a bin id in `[0, num_bins)` to a minimizer. Uses the same
/// scattering hash as the ordering so small changes in the minimizer
/// bits land in well-dispersed bins.
pub fn bin_of(minimizer_bits: u64, num_bins: u32) -> u32 {
    debug_assert!(num_bins > 0);
    (minimizer_rank(minimizer_bits) % u64::from(num_bins)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_span_when_no_minimizer_change() {
        let seq = b"AAAAAAAA";
        let spans = super_mer_spans(seq, 4, 2, false);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].start, 0);
        assert_eq!(spans[0].end, 8);
    }

    #[test]
    fn invalid_base_splits_spans() {
        let seq = b"ACGNACG";
        let spans = super_mer_spans(seq, 3, 2, false);
        for span in &spans {
            assert!(!seq[span.start..span.end].contains(&b'N'));
        }
        // ACG and ACG on either side of N, each of length 3, each a single span.
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].end - spans[0].start, 3);
        assert_eq!(spans[1].end - spans[1].start, 3);
    }

    #[test]
    fn spans_cover_every_valid_kmer_exactly_once() {
        let seq = b"ACGTACGTACGTACGT";
        let k = 5;
        let m = 3;
        let spans = super_mer_spans(seq, k, m, false);
        let total_kmers_covered: usize = spans.iter().map(|s| s.end - s.start - k + 1).sum();
        assert_eq!(total_kmers_covered, seq.len() - k + 1);
    }

    #[test]
    fn normalized_minimizer_agrees_for_reverse_complement_reads() {
        // AAAA and TTTT are reverse complements of each other; with
        // normalize on they must pick the same minimizer everywhere.
        let fwd_spans = super_mer_spans(b"AAAA", 4, 2, true);
        let rc_spans = super_mer_spans(b"TTTT", 4, 2, true);
        assert_eq!(fwd_spans.len(), 1);
        assert_eq!(rc_spans.len(), 1);
        assert_eq!(fwd_spans[0].minimizer_bits, rc_spans[0].minimizer_bits);
    }

    #[test]
    fn normalized_minimizer_still_splits_on_invalid_bases() {
        let spans = super_mer_spans(b"ACGNACG", 3, 2, true);
        for span in &spans {
            assert!(!b"ACGNACG"[span.start..span.end].contains(&b'N'));
        }
        assert_eq!(spans.len(), 2);
    }

    #[test]
    fn bin_of_is_deterministic_and_in_range() {
        for bits in [0u64, 1, 42, u64::MAX] {
            let b = bin_of(bits, 16);
            assert!(b < 16);
            assert_eq!(b, bin_of(bits, 16));
        }
    }

    #[test]
    fn all_a_minimizer_is_not_systematically_preferred() {
        // With plain lexicographic order AAAA would win every window it's in;
        // with the scattering hash its rank should differ from the bit value.
        let aaaa_rank = minimizer_rank(0);
        assert_ne!(aaaa_rank, 0);
    }
}
