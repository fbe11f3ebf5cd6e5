//! Top-level orchestration: wires stage 1 (reader -> parser -> splitter
//! -> bin writer) and stage 2 (distributor -> hasher -> output filter)
//! together, honoring `--bin-stats-only` to run either stage alone
//! against a shared `--tmp` directory.

use std::sync::{mpsc, Arc};
use std::thread;

use tracing::info;

use crate::bin_stat::BinStatTable;
use crate::bin_writer::{self, BinWriter};
use crate::bundle::{FastBundle, ReadBundle, SuperBundle};
use crate::config::Config;
use crate::distributor::Distributor;
use crate::error::{InternalError, IoError, PipelineError};
use crate::hasher::{count_bin, CpuBackend, HashBackend};
use crate::memory_planner::MemoryPlanner;
use crate::output::{OutputFilter, OutputWriter};
use crate::parser::{self, Format, Parser};
use crate::progress::ProgressTracker;
use crate::queue::{BinQueues, SwapQueue};
use crate::reliability;
use crate::{reader, splitter};

/// Run summary handed back to `main` for the final stdout report.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub sequences_processed: u64,
    pub bases_processed: u64,
    pub distinct_kmers_emitted: u64,
    pub total_count_emitted: u64,
}

fn detect_format(files: &[std::path::PathBuf]) -> Format {
    let stem_ext = |p: &std::path::Path| -> Option<String> {
        let ext = p.extension()?.to_str()?.to_lowercase();
        if ext == "gz" || ext == "bz2" {
            p.file_stem().map(std::path::Path::new)?.extension()?.to_str().map(str::to_lowercase)
        } else {
            Some(ext)
        }
    };
    match files.first().and_then(|p| stem_ext(p)).as_deref() {
        Some("fq" | "fastq") => Format::Fastq,
        _ => Format::Fasta,
    }
}

/// Runs stage 1: reads input, splits into super-mers, writes bins, and
/// persists `binStatFile.txt`.
pub fn run_stage1(config: &Config, progress: Arc<ProgressTracker>) -> Result<(), PipelineError> {
    let files = reader::resolve_inputs(&config.input)?;
    reader::check_uniform_format(&files)?;
    let format = detect_format(&files);

    let plan = MemoryPlanner::stage1(config.memory_mb, config.splitter_threads)?;
    std::fs::create_dir_all(&config.tmp).map_err(|source| IoError::Write {
        path: config.tmp.clone(),
        source,
    })?;

    let fast_queue: Arc<SwapQueue<FastBundle>> = Arc::new(SwapQueue::new(
        plan.fast_bundle_queue.bundle_count,
        (0..plan.fast_bundle_queue.bundle_count)
            .map(|_| FastBundle::with_capacity(1 << 20))
            .collect(),
    ));
    let read_queue: Arc<SwapQueue<ReadBundle>> = Arc::new(SwapQueue::new(
        plan.read_bundle_queue.bundle_count,
        (0..plan.read_bundle_queue.bundle_count)
            .map(|_| ReadBundle::with_capacity(256))
            .collect(),
    ));
    let super_queues: Arc<BinQueues<SuperBundle>> = Arc::new(BinQueues::new(
        config.num_bins,
        plan.super_bundle_queue.bundle_count,
        |bin| vec![SuperBundle::new(bin, 64), SuperBundle::new(bin, 64)],
    ));

    let reader_handle = {
        let fast_queue = Arc::clone(&fast_queue);
        thread::spawn(move || reader::stream_files(&files, &fast_queue))
    };

    let parser_handle = {
        let fast_queue = Arc::clone(&fast_queue);
        let read_queue = Arc::clone(&read_queue);
        thread::spawn(move || -> Result<f64, PipelineError> {
            let mut parser = Parser::new();
            let mut error_rate_acc = parser::ErrorRateAccumulator::new();
            let mut empty_fast = FastBundle::with_capacity(1 << 20);
            let mut out = ReadBundle::with_capacity(256);
            let mut observed = 0usize;
            while let Some(bundle) = fast_queue.swap_pop(empty_fast) {
                parser.feed(format, &bundle, &mut out)?;
                for record in &out.records[observed..] {
                    if let Some(quality) = &record.quality {
                        error_rate_acc.observe(quality);
                    }
                }
                observed = out.records.len();
                empty_fast = bundle;
                if out.is_full() {
                    out = read_queue.swap_push(out);
                    out.reset();
                    observed = 0;
                }
            }
            read_queue.swap_push(out);
            read_queue.finalize();
            Ok(error_rate_acc.finish())
        })
    };

    let splitter_handle = {
        let read_queue = Arc::clone(&read_queue);
        let super_queues = Arc::clone(&super_queues);
        let k = config.k.get();
        let m = config.m;
        let normalize = config.normalize;
        let num_bins = config.num_bins;
        let progress = Arc::clone(&progress);
        thread::spawn(move || {
            let mut pending: Vec<SuperBundle> = (0..num_bins).map(|b| SuperBundle::new(b, 64)).collect();
            let mut empty = ReadBundle::with_capacity(256);
            while let Some(reads) = read_queue.swap_pop(empty) {
                for record in &reads.records {
                    progress.record_sequence(record.sequence.len() as u64);
                }
                splitter::split_into_bins(&reads, k, m, normalize, &super_queues, &mut pending);
                empty = reads;
            }
            splitter::flush_pending(&super_queues, &mut pending);
            super_queues.finalize_all();
        })
    };

    let mut writer = BinWriter::new(config.num_bins, plan.bin_writer_stack_bytes, config.tmp.clone(), 64);
    bin_writer::run(&super_queues, &mut writer)?;

    reader_handle.join().expect("reader thread panicked")?;
    let estimated_error_rate = parser_handle.join().expect("parser thread panicked")?;
    splitter_handle.join().expect("splitter thread panicked");

    let stats = writer.into_stats();
    stats.save(&config.bin_stat_path())?;
    std::fs::write(config.error_rate_path(), estimated_error_rate.to_string()).map_err(|source| IoError::Write {
        path: config.error_rate_path(),
        source,
    })?;
    info!(bins = config.num_bins, error_rate = %estimated_error_rate, "stage 1 complete");
    Ok(())
}

/// Runs stage 2: reads `binStatFile.txt`, distributes bins to hashers,
/// counts each bin's canonical k-mers, filters by the reliability band
/// and `threshold_min`, and writes the final output file.
pub fn run_stage2(config: &Config) -> Result<RunSummary, PipelineError> {
    let stats = BinStatTable::load(&config.bin_stat_path()).map_err(|e| match e {
        crate::bin_stat::FormatErrorOrIo::Io(io) => PipelineError::Io(io),
        crate::bin_stat::FormatErrorOrIo::Format(fmt) => PipelineError::Format(fmt),
    })?;
    let aggregate = stats.aggregate();
    let bytes_per_entry = (config.k.get().div_ceil(4) + std::mem::size_of::<u32>()) as u64;
    let plan = MemoryPlanner::stage2(
        config.memory_mb,
        config.hasher_threads_cpu,
        usize::from(u8::from(config.gpu)),
        bytes_per_entry,
        &aggregate,
    )?;

    let band = if config.skip_estimate && config.error_rate.is_none() {
        None
    } else {
        let erate = config.error_rate.unwrap_or_else(|| {
            std::fs::read_to_string(config.error_rate_path())
                .ok()
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(0.15)
        });
        Some(reliability::bounds(config.coverage, erate, config.k.get(), config.min_probability))
    };

    let distributor = Arc::new(Distributor::new(&stats));
    let filter = OutputFilter {
        threshold_min: config.threshold_min,
        band,
    };
    // `--histogram` replaces per-kmer output with a count -> frequency
    // summary, so survivors are buffered instead of streamed to a writer.
    let mut writer = if config.histogram {
        None
    } else {
        Some(OutputWriter::create(&config.output, config.format)?)
    };
    let mut histogram_accum: Vec<(crate::kmer::PackedKmer, u32)> = Vec::new();

    // Hasher pool: GPU hashers (if any) and CPU hashers each pull bins from
    // the shared Distributor, largest-first, and emit into one channel the
    // writer drains on the calling thread (spec §4.6's "GPU/CPU hashers
    // share the Distributor and emit into the same MPSC queue").
    let num_hashers = (config.hasher_threads_cpu + config.hasher_threads_gpu).max(1);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(num_hashers)
        .build()
        .map_err(|e| PipelineError::Internal(InternalError::HasherPoolInit(e.to_string())))?;

    let (tx, rx) = mpsc::channel::<Result<Vec<(crate::kmer::PackedKmer, u32)>, PipelineError>>();
    let mut summary = RunSummary::default();
    let mut first_error = None;

    pool.scope(|scope| {
        for _ in 0..num_hashers {
            let distributor = Arc::clone(&distributor);
            let tx = tx.clone();
            let backend = CpuBackend {
                capacity: plan.hash_table_entries as usize,
            };
            scope.spawn(move |_| {
                while let Some(bin) = distributor.claim() {
                    let result = bin_writer::read_bin_file(&config.tmp, bin)
                        .map_err(PipelineError::from)
                        .and_then(|super_mers| {
                            if config.gpu {
                                backend_dispatch(config, &backend, &super_mers)
                            } else {
                                count_bin(&super_mers, config.k, config.normalize, plan.hash_table_entries as usize)
                                    .map_err(PipelineError::Internal)
                            }
                        });
                    let _ = tx.send(result);
                    distributor.finish(bin);
                }
            });
        }
        drop(tx);

        for received in rx {
            match received {
                Ok(counts) => {
                    for (kmer, count) in counts {
                        summary.distinct_kmers_emitted += 1;
                        summary.total_count_emitted += u64::from(count);
                        if filter.keep(count) {
                            if config.histogram {
                                histogram_accum.push((kmer, count));
                            } else if let Some(w) = writer.as_mut() {
                                if let Err(e) = w.write_record(kmer, count) {
                                    first_error.get_or_insert(PipelineError::from(e));
                                }
                            }
                        }
                    }
                }
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
    });

    if let Some(err) = first_error {
        return Err(err);
    }
    if config.histogram {
        let (hist, stats) = crate::output::histogram_of(&histogram_accum);
        crate::output::write_histogram_file(&config.output, &hist, &stats)?;
        info!(distinct = stats.distinct_kmers, total = stats.total_kmers, "histogram written");
    } else if let Some(mut w) = writer {
        w.flush()?;
    }

    if !config.leave_bin_stat {
        let _ = std::fs::remove_file(config.bin_stat_path());
        let _ = std::fs::remove_file(config.error_rate_path());
    }
    info!(bins = distributor.total_bins(), "stage 2 complete");
    Ok(summary)
}

fn backend_dispatch(
    config: &Config,
    cpu: &CpuBackend,
    super_mers: &[Vec<u8>],
) -> Result<Vec<(crate::kmer::PackedKmer, u32)>, PipelineError> {
    #[cfg(feature = "gpu")]
    {
        let gpu = crate::hasher::GpuBackend { capacity: cpu.capacity };
        return gpu.count(super_mers, config.k, config.normalize).map_err(PipelineError::Internal);
    }
    #[cfg(not(feature = "gpu"))]
    {
        tracing::warn!("--gpu requested but the gpu feature was not compiled in; using CPU path");
        cpu.count(super_mers, config.k, config.normalize).map_err(PipelineError::Internal)
    }
}

/// Runs whichever stage(s) `config.bin_stats_only` selects.
pub fn run(config: &Config) -> Result<Option<RunSummary>, PipelineError> {
    let progress = Arc::new(ProgressTracker::new());
    if config.runs_stage1() {
        run_stage1(config, Arc::clone(&progress))?;
    }
    if config.runs_stage2() {
        let mut summary = run_stage2(config)?;
        let snapshot = progress.snapshot();
        summary.sequences_processed = snapshot.sequences_processed;
        summary.bases_processed = snapshot.bases_processed;
        return Ok(Some(summary));
    }
    Ok(None)
}
