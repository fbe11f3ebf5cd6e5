//! The memory planner: a pure function of `(M, B, k, thread counts, BinStat)`
//! that sizes every bounded queue, buffer, and hash table from a single
//! memory budget.
//!
//! Mirrors the two-phase algorithm in Gerbil's `distributeMemory1` /
//! `distributeMemory2`: reserve a fixed base, assign every queue its
//! minimum, abort if the minimums don't fit, then distribute whatever
//! headroom remains proportionally to each queue's min-to-max gap (stage 1
//! additionally reserves half of that headroom for the bin-writer stack;
//! stage 2 grows the hash table first, up to a statistics-derived ceiling,
//! before distributing what's left).

use crate::bin_stat::BinStat;
use crate::error::CapacityError;

const MB: u64 = 1024 * 1024;

// Stage-1 constants, in bytes, following the shape (not the literal
// values) of Gerbil's RUN1_MEMORY_GENERAL_B / MIN_*_SIZE_B constants.
const STAGE1_BASE_B: u64 = 16 * MB;
const FAST_BUNDLE_MIN_B: u64 = 1 * MB;
const FAST_BUNDLE_MAX_B: u64 = 16 * MB;
const READ_BUNDLE_MIN_B: u64 = 1 * MB;
const READ_BUNDLE_MAX_B: u64 = 16 * MB;
const SUPER_BUNDLE_MIN_B: u64 = 1 * MB;
const SUPER_BUNDLE_MAX_B: u64 = 32 * MB;
const SPLITTER_SCRATCH_PER_THREAD_B: u64 = 2 * MB;

// Stage-2 constants.
const STAGE2_BASE_B: u64 = 16 * MB;
const GPU_COPY_BUFFER_B: u64 = 64 * MB;
const HASHER_SCRATCH_PER_THREAD_B: u64 = 4 * MB;
const SUPER_BUNDLE2_MIN_B: u64 = 1 * MB;
const SUPER_BUNDLE2_MAX_B: u64 = 16 * MB;
const KMER_BUNDLE_MIN_B: u64 = 1 * MB;
const KMER_BUNDLE_MAX_B: u64 = 16 * MB;
const KMC_BUNDLE_MIN_B: u64 = 1 * MB;
const KMC_BUNDLE_MAX_B: u64 = 16 * MB;
const HASH_TABLE_MIN_B: u64 = 4 * MB;
/// Fraction of remaining stage-2 memory the hash table is allowed to grow
/// into, mirroring Gerbil's `MEM_KEY_HT`.
const MEM_KEY_HT: f64 = 0.7;

/// One queue's sizing: how many bundles of bundle-capacity `bundle_bytes`
/// it was assigned, derived from `assigned_bytes / bundle_bytes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueuePlan {
    pub bundle_count: usize,
}

fn queue_plan(assigned_bytes: u64, bundle_bytes: u64) -> QueuePlan {
    QueuePlan {
        bundle_count: ((assigned_bytes / bundle_bytes).max(1)) as usize,
    }
}

/// Distributes `available` bytes across queues proportionally to each
/// queue's `(min, max)` gap, never exceeding `max`, following Gerbil's
/// "assure memory" / proportional-fallback pattern: if the full optional
/// demand exceeds what's available, scale every gap down by the same
/// factor instead of satisfying queues in an arbitrary order.
fn distribute_remainder(mins: &[u64], maxes: &[u64], available: u64) -> Vec<u64> {
    let gaps: Vec<u64> = mins.iter().zip(maxes).map(|(&mn, &mx)| mx - mn).collect();
    let total_gap: u64 = gaps.iter().sum();
    if total_gap == 0 {
        return mins.to_vec();
    }
    let scale = if total_gap > available {
        available as f64 / total_gap as f64
    } else {
        1.0
    };
    mins.iter()
        .zip(&gaps)
        .map(|(&mn, &gap)| mn + (gap as f64 * scale) as u64)
        .collect()
}

/// Stage-1 plan: sizes for the three queues plus the bin-writer stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stage1Plan {
    pub fast_bundle_queue: QueuePlan,
    pub read_bundle_queue: QueuePlan,
    pub super_bundle_queue: QueuePlan,
    pub bin_writer_stack_bytes: u64,
}

/// Stage-2 plan: sizes for the three queues plus the per-bin hash table
/// capacity (in number of entries, not bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stage2Plan {
    pub super_bundle_queue: QueuePlan,
    pub kmer_bundle_queue: QueuePlan,
    pub kmc_bundle_queue: QueuePlan,
    pub hash_table_entries: u64,
}

pub struct MemoryPlanner;

impl MemoryPlanner {
    /// `budget_mb` is the single memory input; `splitter_threads` feeds
    /// the fixed per-thread scratch reservation.
    pub fn stage1(budget_mb: u64, splitter_threads: usize) -> Result<Stage1Plan, CapacityError> {
        let budget_b = budget_mb * MB;
        let base = STAGE1_BASE_B + splitter_threads as u64 * SPLITTER_SCRATCH_PER_THREAD_B;

        let mins = [FAST_BUNDLE_MIN_B, READ_BUNDLE_MIN_B, SUPER_BUNDLE_MIN_B];
        let maxes = [FAST_BUNDLE_MAX_B, READ_BUNDLE_MAX_B, SUPER_BUNDLE_MAX_B];
        let min_total: u64 = base + mins.iter().sum::<u64>();

        if min_total > budget_b {
            return Err(CapacityError::Stage1BelowMinimum {
                budget_mb,
                minimum_mb: min_total.div_ceil(MB),
            });
        }

        let remaining = budget_b - min_total;
        // Half of the remainder goes to the queues' optional growth, half
        // is reserved for the bin-writer stack, per spec §4.8.
        let queue_headroom = remaining / 2;
        let sized = distribute_remainder(&mins, &maxes, queue_headroom);

        let min_sum: u64 = mins.iter().sum();
        let queue_headroom_used: u64 = sized.iter().sum::<u64>() - min_sum;
        // The bin-writer stack receives everything not actually claimed by
        // the queues, including any of their half that went unused because
        // a queue was already capped at its max.
        let bin_writer_stack_bytes = remaining - queue_headroom_used;

        Ok(Stage1Plan {
            fast_bundle_queue: queue_plan(sized[0], FAST_BUNDLE_MIN_B),
            read_bundle_queue: queue_plan(sized[1], READ_BUNDLE_MIN_B),
            super_bundle_queue: queue_plan(sized[2], SUPER_BUNDLE_MIN_B),
            bin_writer_stack_bytes: bin_writer_stack_bytes.max(1),
        })
    }

    /// `bytes_per_hash_entry` is `ceil(2k/8) + size_of::<counter>()`.
    pub fn stage2(
        budget_mb: u64,
        hasher_threads: usize,
        gpu_count: usize,
        bytes_per_hash_entry: u64,
        stats: &BinStat,
    ) -> Result<Stage2Plan, CapacityError> {
        let budget_b = budget_mb * MB;
        let base = STAGE2_BASE_B
            + gpu_count as u64 * GPU_COPY_BUFFER_B
            + hasher_threads as u64 * HASHER_SCRATCH_PER_THREAD_B;

        let mins = [SUPER_BUNDLE2_MIN_B, KMER_BUNDLE_MIN_B, KMC_BUNDLE_MIN_B];
        let maxes = [SUPER_BUNDLE2_MAX_B, KMER_BUNDLE_MAX_B, KMC_BUNDLE_MAX_B];
        let min_total: u64 = base + mins.iter().sum::<u64>() + HASH_TABLE_MIN_B;

        if min_total > budget_b {
            return Err(CapacityError::Stage2BelowMinimum {
                budget_mb,
                minimum_mb: min_total.div_ceil(MB),
            });
        }

        let remaining = budget_b - min_total;
        let ht_growth_cap = (remaining as f64 * MEM_KEY_HT) as u64;
        let stats_ceiling_entries = stats.max_unique_kmers().min(stats.avg_plus_2sd_unique());
        let stats_ceiling_bytes = stats_ceiling_entries.saturating_mul(bytes_per_hash_entry);
        let ht_growth = ht_growth_cap.min(stats_ceiling_bytes);

        let remaining_after_ht = remaining - ht_growth;
        let sized = distribute_remainder(&mins, &maxes, remaining_after_ht);

        let hash_table_bytes = HASH_TABLE_MIN_B + ht_growth;
        let hash_table_entries = (hash_table_bytes / bytes_per_hash_entry).max(1);

        Ok(Stage2Plan {
            super_bundle_queue: queue_plan(sized[0], SUPER_BUNDLE2_MIN_B),
            kmer_bundle_queue: queue_plan(sized[1], KMER_BUNDLE_MIN_B),
            kmc_bundle_queue: queue_plan(sized[2], KMC_BUNDLE_MIN_B),
            hash_table_entries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage1_aborts_when_budget_below_minimum() {
        let err = MemoryPlanner::stage1(1, 4).unwrap_err();
        assert!(matches!(err, CapacityError::Stage1BelowMinimum { .. }));
    }

    #[test]
    fn stage1_is_deterministic_for_fixed_inputs() {
        let a = MemoryPlanner::stage1(512, 4).unwrap();
        let b = MemoryPlanner::stage1(512, 4).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn stage1_more_budget_never_shrinks_queues() {
        let small = MemoryPlanner::stage1(256, 4).unwrap();
        let large = MemoryPlanner::stage1(2048, 4).unwrap();
        assert!(large.fast_bundle_queue.bundle_count >= small.fast_bundle_queue.bundle_count);
        assert!(large.bin_writer_stack_bytes >= small.bin_writer_stack_bytes);
    }

    #[test]
    fn stage2_aborts_when_budget_below_minimum() {
        let stats = BinStat::new(0, 0, 0, 0);
        let err = MemoryPlanner::stage2(1, 4, 0, 9, &stats).unwrap_err();
        assert!(matches!(err, CapacityError::Stage2BelowMinimum { .. }));
    }

    #[test]
    fn stage2_grows_hash_table_with_bin_statistics() {
        let small_stats = BinStat::new(0, 1_000, 1_000, 1);
        let large_stats = BinStat::new(0, 10_000_000, 10_000_000, 1);
        let small = MemoryPlanner::stage2(1024, 4, 0, 9, &small_stats).unwrap();
        let large = MemoryPlanner::stage2(1024, 4, 0, 9, &large_stats).unwrap();
        assert!(large.hash_table_entries >= small.hash_table_entries);
    }

    #[test]
    fn stage2_is_deterministic_for_fixed_inputs() {
        let stats = BinStat::new(0, 50_000, 60_000, 3);
        let a = MemoryPlanner::stage2(1024, 8, 1, 9, &stats).unwrap();
        let b = MemoryPlanner::stage2(1024, 8, 1, 9, &stats).unwrap();
        assert_eq!(a, b);
    }
}
