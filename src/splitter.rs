//! Stage 1's splitter: turns each parsed read into super-mer spans,
//! assigns every span to a bin by its minimizer, and routes the
//! resulting [`SuperMer`]s into the per-bin [`BinQueues`] the bin writer
//! drains from.

use crate::bundle::{ReadBundle, SuperBundle, SuperMer};
use crate::queue::BinQueues;

/// Splits every record in `reads` into super-mers and appends each one
/// to the in-flight [`SuperBundle`] for its bin, swapping a bundle out to
/// `queues` whenever it fills. When `normalize` is set, a k-mer and its
/// reverse complement are binned by the same canonical minimizer, so
/// both orientations land in the same bin.
pub fn split_into_bins(reads: &ReadBundle, k: usize, m: usize, normalize: bool, queues: &BinQueues<SuperBundle>, pending: &mut [SuperBundle]) {
    for record in &reads.records {
        for span in crate::minimizer::super_mer_spans(&record.sequence, k, m, normalize) {
            let bin = crate::minimizer::bin_of(span.minimizer_bits, queues.num_bins());
            let bases = record.sequence[span.start..span.end].to_vec();
            let bundle = &mut pending[bin as usize];
            bundle.super_mers.push(SuperMer { bases, bin });
            if bundle.is_full() {
                let bin_cap = bundle.super_mers.capacity();
                let filled = std::mem::replace(bundle, SuperBundle::new(bin, bin_cap));
                let recycled = queues.push(bin, filled);
                *bundle = recycled;
            }
        }
    }
}

/// Flushes every non-empty pending bundle to its bin's queue. Called once
/// at end-of-input, before `queues.finalize_all()`.
pub fn flush_pending(queues: &BinQueues<SuperBundle>, pending: &mut [SuperBundle]) {
    for (bin, bundle) in pending.iter_mut().enumerate() {
        if !bundle.super_mers.is_empty() {
            let bin_cap = bundle.super_mers.capacity().max(1);
            let filled = std::mem::replace(bundle, SuperBundle::new(bin as u32, bin_cap));
            let _ = queues.push(bin as u32, filled);
        }
    }
}
