//! Validated, immutable runtime configuration.
//!
//! [`Cli`](crate::cli::Cli) is what clap parses; [`Config`] is what every
//! pipeline component actually borrows. Building one validates every
//! cross-field invariant the CLI's per-field `value_parser`s can't check
//! on their own (`m <= k`, `num_bins <= 4^m`), following the split the
//! teacher crate draws between `cli.rs` and `config.rs`.

use std::path::{Path, PathBuf};

use crate::cli::{Cli, OutputFormat, Stage};
use crate::error::ConfigError;
use crate::kmer::KmerLength;

#[derive(Debug, Clone)]
pub struct Config {
    pub k: KmerLength,
    pub m: usize,
    pub threads: usize,
    pub memory_mb: u64,
    pub threshold_min: u64,
    pub output: PathBuf,
    pub input: PathBuf,
    pub tmp: PathBuf,
    pub gpu: bool,
    pub normalize: bool,
    pub coverage: f64,
    pub error_rate: Option<f64>,
    pub min_probability: f64,
    pub skip_estimate: bool,
    pub bin_stats_only: Option<Stage>,
    pub leave_bin_stat: bool,
    pub histogram: bool,
    pub format: OutputFormat,
    pub num_bins: u32,

    // Derived, following Gerbil's `autocompleteParams` proportions.
    pub reader_threads: usize,
    pub splitter_threads: usize,
    pub hasher_threads_cpu: usize,
    pub hasher_threads_gpu: usize,
}

impl Config {
    pub fn build(cli: Cli) -> Result<Self, ConfigError> {
        let k = KmerLength::new(cli.k)?;

        if cli.m == 0 || cli.m > cli.k {
            return Err(ConfigError::MinimizerExceedsK { m: cli.m, k: cli.k });
        }
        let max_bins = 4u64.saturating_pow(cli.m as u32);
        if u64::from(cli.num_bins) > max_bins {
            return Err(ConfigError::TooManyBins {
                bins: cli.num_bins as usize,
                m: cli.m,
                max_bins,
            });
        }
        if cli.threshold_min == 0 {
            return Err(ConfigError::InvalidThreshold(cli.threshold_min));
        }
        if cli.memory_mb == 0 {
            return Err(ConfigError::ZeroMemoryBudget);
        }
        if !(0.0..1.0).contains(&cli.min_probability) {
            return Err(ConfigError::InvalidProbability(cli.min_probability));
        }
        if let Some(c) = cli.coverage {
            if c <= 0.0 {
                return Err(ConfigError::InvalidCoverage(c));
            }
        }
        if let Some(e) = cli.error_rate {
            if !(0.0..1.0).contains(&e) {
                return Err(ConfigError::InvalidErrorRate(e));
            }
        }
        check_input_exists(&cli.input)?;

        let threads = cli.threads.max(4);
        // Gerbil: splitterThreads = threads <= 4 ? 2 : threads - 3.
        let splitter_threads = if threads <= 4 { 2 } else { threads - 3 };
        let gpu_count = usize::from(u8::from(cli.gpu));
        // Gerbil: hasherThreads = numGPUs + 1 + (threads - 1) * 6 / 10.
        let hasher_threads = gpu_count + 1 + (threads - 1) * 6 / 10;
        let hasher_threads_gpu = gpu_count.min(hasher_threads);
        let hasher_threads_cpu = hasher_threads - hasher_threads_gpu;
        let reader_threads = 1; // widened to 2 once the reader observes mixed compression.

        Ok(Self {
            k,
            m: cli.m,
            threads,
            memory_mb: cli.memory_mb,
            threshold_min: cli.threshold_min,
            output: cli.output,
            input: cli.input,
            tmp: cli.tmp,
            gpu: cli.gpu,
            normalize: !cli.no_normalize,
            coverage: cli.coverage.unwrap_or(30.0),
            error_rate: cli.error_rate,
            min_probability: cli.min_probability,
            skip_estimate: cli.skip_estimate,
            bin_stats_only: cli.bin_stats_only,
            leave_bin_stat: cli.leave_bin_stat,
            histogram: cli.histogram,
            format: cli.format,
            num_bins: cli.num_bins,
            reader_threads,
            splitter_threads,
            hasher_threads_cpu,
            hasher_threads_gpu,
        })
    }

    pub fn bin_stat_path(&self) -> PathBuf {
        self.tmp.join("binStatFile.txt")
    }

    /// Where stage 1 persists its FASTQ-quality-derived error-rate
    /// estimate so a separately-run stage 2 (`--bin-stats-only 2`) can
    /// still use it instead of falling back to the 0.15 default.
    pub fn error_rate_path(&self) -> PathBuf {
        self.tmp.join("errorRateEstimate.txt")
    }

    pub fn bin_path(&self, bin: u32) -> PathBuf {
        self.tmp.join(format!("bin_{bin}"))
    }

    pub fn runs_stage1(&self) -> bool {
        self.bin_stats_only != Some(Stage::Two)
    }

    pub fn runs_stage2(&self) -> bool {
        self.bin_stats_only != Some(Stage::One)
    }
}

fn check_input_exists(path: &Path) -> Result<(), ConfigError> {
    if !path.exists() {
        return Err(ConfigError::MissingInput(path.to_path_buf()));
    }
    Ok(())
}
