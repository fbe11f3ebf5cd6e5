//! The bundle types exchanged across the pipeline's bounded swap-queues.
//!
//! A bundle is a fixed-capacity batch; queues swap full bundles for empty
//! recycled ones rather than copying individual records, so steady-state
//! operation allocates nothing (see [`crate::queue`]).

use crate::kmer::PackedKmer;

/// Up to `capacity` bytes of raw input, finalized to a record boundary by
/// whichever reader filled it. The reader never trims to a record
/// boundary itself (spec §4.2) — bytes are pushed verbatim and `finalize`
/// just marks "no more bytes are coming into this bundle".
#[derive(Debug, Clone, Default)]
pub struct FastBundle {
    pub data: Vec<u8>,
    capacity: usize,
    finalized: bool,
}

impl FastBundle {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            capacity,
            finalized: false,
        }
    }

    pub fn is_full(&self) -> bool {
        self.data.len() >= self.capacity
    }

    pub fn remaining(&self) -> usize {
        self.capacity.saturating_sub(self.data.len())
    }

    pub fn finalize(&mut self) {
        self.finalized = true;
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn reset(&mut self) {
        self.data.clear();
        self.finalized = false;
    }
}

/// A single parsed read record: raw bases plus, for FASTQ input, the
/// parallel Phred-encoded quality string used by the error-rate estimator.
#[derive(Debug, Clone)]
pub struct ReadRecord {
    pub sequence: Vec<u8>,
    pub quality: Option<Vec<u8>>,
}

/// A batch of parsed read records.
#[derive(Debug, Clone, Default)]
pub struct ReadBundle {
    pub records: Vec<ReadRecord>,
    capacity: usize,
}

impl ReadBundle {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn is_full(&self) -> bool {
        self.records.len() >= self.capacity
    }

    pub fn reset(&mut self) {
        self.records.clear();
    }
}

/// One super-mer: a maximal substring whose k-mers all share a minimizer,
/// plus the bin id it was routed to.
#[derive(Debug, Clone)]
pub struct SuperMer {
    pub bases: Vec<u8>,
    pub bin: u32,
}

/// A batch of super-mers destined for a single bin.
#[derive(Debug, Clone, Default)]
pub struct SuperBundle {
    pub bin: u32,
    pub super_mers: Vec<SuperMer>,
    capacity: usize,
}

impl SuperBundle {
    pub fn new(bin: u32, capacity: usize) -> Self {
        Self {
            bin,
            super_mers: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn is_full(&self) -> bool {
        self.super_mers.len() >= self.capacity
    }

    /// Total encoded byte size of the pending super-mers, used by the bin
    /// writer's stack-eviction policy (spec §4.5).
    pub fn byte_size(&self) -> usize {
        self.super_mers.iter().map(|s| s.bases.len()).sum()
    }

    pub fn reset(&mut self, bin: u32) {
        self.bin = bin;
        self.super_mers.clear();
    }
}

/// A batch of packed k-mers belonging to one bin, expanded from super-mers
/// inside a hasher.
#[derive(Debug, Clone, Default)]
pub struct KmerBundle {
    pub bin: u32,
    pub kmers: Vec<PackedKmer>,
}

/// A batch of (k-mer, final count) pairs emitted by a hasher.
#[derive(Debug, Clone, Default)]
pub struct KmcBundle {
    pub bin: u32,
    pub counts: Vec<(PackedKmer, u32)>,
}
