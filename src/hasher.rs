//! Stage 2's hasher: counts canonical k-mers for one bin in a
//! fixed-capacity open-addressed hash table, spilling to recursive
//! sub-bins if the table would otherwise overflow its load factor.
//!
//! Open Question (spec §9, resolved in `SPEC_FULL.md`): the spill
//! partitioning key is `hash(k-mer)`, not minimizer-of-minimizer — a
//! bin's overflow has already exhausted what minimizer binning can do to
//! separate it further, so re-hashing on the k-mer itself is what
//! actually spreads the load.

use rustc_hash::FxHasher;
use std::hash::{Hash, Hasher};

use crate::bundle::SuperMer;
use crate::error::InternalError;
use crate::kmer::{KmerLength, PackedKmer};

const MAX_LOAD_FACTOR: f64 = 0.7;
/// How many times a bin may recursively spill before giving up and
/// reporting an internal error: past this, capacity planning itself is
/// the bug, not the input data.
const MAX_SPILL_DEPTH: u32 = 8;

fn hash_kmer(kmer: &PackedKmer) -> u64 {
    let mut hasher = FxHasher::default();
    kmer.bits().hash(&mut hasher);
    hasher.finish()
}

/// A fixed-capacity open-addressed hash table counting canonical k-mers,
/// with linear probing and saturating `u32` counters (spec §9: counter
/// width resolved to u32, saturating rather than wrapping).
pub struct KmerTable {
    slots: Vec<Option<(PackedKmer, u32)>>,
    capacity: usize,
    len: usize,
}

impl KmerTable {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity.max(1)],
            capacity: capacity.max(1),
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn load_factor(&self) -> f64 {
        self.len as f64 / self.capacity as f64
    }

    fn probe_start(&self, kmer: &PackedKmer) -> usize {
        (hash_kmer(kmer) as usize) % self.capacity
    }

    /// Inserts or increments `kmer`'s count by one, saturating at `u32::MAX`.
    /// Returns `false` if the table is full and has no slot for a new key
    /// (the caller interprets this as "this bin must spill").
    pub fn observe(&mut self, kmer: PackedKmer) -> bool {
        let start = self.probe_start(&kmer);
        for offset in 0..self.capacity {
            let idx = (start + offset) % self.capacity;
            match &mut self.slots[idx] {
                Some((existing, count)) if *existing == kmer => {
                    *count = count.saturating_add(1);
                    return true;
                }
                Some(_) => continue,
                None => {
                    if self.load_factor() >= MAX_LOAD_FACTOR {
                        return false;
                    }
                    self.slots[idx] = Some((kmer, 1));
                    self.len += 1;
                    return true;
                }
            }
        }
        false
    }

    pub fn iter(&self) -> impl Iterator<Item = (PackedKmer, u32)> + '_ {
        self.slots.iter().filter_map(|s| *s)
    }
}

/// Counts every canonical k-mer across `super_mers` into a fixed-capacity
/// table, recursively re-partitioning by `hash(k-mer) % fanout` into
/// sub-tables whenever the top-level table would overflow.
pub fn count_bin(
    super_mers: &[Vec<u8>],
    k: KmerLength,
    normalize: bool,
    capacity: usize,
) -> Result<Vec<(PackedKmer, u32)>, InternalError> {
    let kmers: Vec<PackedKmer> = super_mers
        .iter()
        .flat_map(|bases| kmers_of(bases, k, normalize))
        .collect();
    count_with_spill(&kmers, capacity, 0)
}

fn kmers_of(bases: &[u8], k: KmerLength, normalize: bool) -> Vec<PackedKmer> {
    let klen = k.get();
    if bases.len() < klen {
        return Vec::new();
    }
    (0..=bases.len() - klen)
        .filter_map(|start| PackedKmer::encode(&bases[start..start + klen], k).ok())
        .map(|kmer| if normalize { kmer.canonical().0 } else { kmer })
        .collect()
}

fn count_with_spill(
    kmers: &[PackedKmer],
    capacity: usize,
    depth: u32,
) -> Result<Vec<(PackedKmer, u32)>, InternalError> {
    if depth > MAX_SPILL_DEPTH {
        return Err(InternalError::ProbeExhaustionUnresolved { bin: 0, depth });
    }

    let mut table = KmerTable::with_capacity(capacity);
    let mut spilled = Vec::new();
    for &kmer in kmers {
        if !table.observe(kmer) {
            spilled.push(kmer);
        }
    }

    let mut results: Vec<(PackedKmer, u32)> = table.iter().collect();
    if !spilled.is_empty() {
        // Re-partition the overflow into sub-bins by hash(k-mer), counting
        // each sub-bin independently, then merge: a spilled k-mer that
        // already exists in `results` must still be added to its count.
        const FANOUT: u64 = 4;
        let mut sub_bins: Vec<Vec<PackedKmer>> = vec![Vec::new(); FANOUT as usize];
        for kmer in spilled {
            let idx = (hash_kmer(&kmer) % FANOUT) as usize;
            sub_bins[idx].push(kmer);
        }
        for sub in sub_bins {
            if sub.is_empty() {
                continue;
            }
            let sub_capacity = (capacity / FANOUT as usize).max(sub.len());
            let sub_results = count_with_spill(&sub, sub_capacity, depth + 1)?;
            merge_counts(&mut results, sub_results);
        }
    }
    Ok(results)
}

fn merge_counts(into: &mut Vec<(PackedKmer, u32)>, from: Vec<(PackedKmer, u32)>) {
    for (kmer, count) in from {
        if let Some(entry) = into.iter_mut().find(|(k, _)| *k == kmer) {
            entry.1 = entry.1.saturating_add(count);
        } else {
            into.push((kmer, count));
        }
    }
}

/// Dispatch surface for an alternate hashing backend. The CPU path above
/// is always available; a `gpu`-feature backend would implement this
/// trait and be selected by [`crate::config::Config::gpu`].
pub trait HashBackend {
    fn count(&self, super_mers: &[Vec<u8>], k: KmerLength, normalize: bool) -> Result<Vec<(PackedKmer, u32)>, InternalError>;
}

pub struct CpuBackend {
    pub capacity: usize,
}

impl HashBackend for CpuBackend {
    fn count(&self, super_mers: &[Vec<u8>], k: KmerLength, normalize: bool) -> Result<Vec<(PackedKmer, u32)>, InternalError> {
        count_bin(super_mers, k, normalize, self.capacity)
    }
}

#[cfg(feature = "gpu")]
pub struct GpuBackend {
    pub capacity: usize,
}

#[cfg(feature = "gpu")]
impl HashBackend for GpuBackend {
    fn count(&self, super_mers: &[Vec<u8>], k: KmerLength, normalize: bool) -> Result<Vec<(PackedKmer, u32)>, InternalError> {
        // No GPU runtime is wired up yet; fall back to the CPU path so
        // `--gpu` degrades gracefully instead of silently miscounting.
        tracing::warn!("gpu feature compiled in but no device backend implemented; using CPU path");
        count_bin(super_mers, k, normalize, self.capacity)
    }
}
