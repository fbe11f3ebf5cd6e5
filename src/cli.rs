//! Command-line surface.
//!
//! One `Cli` struct maps 1:1 onto the external flag list: `-k -m -t -e -l
//! -o -i --tmp --gpu --no-normalize --coverage --error-rate
//! --min-probability --skip-estimate --bin-stats-only --leave-bin-stat
//! --histogram -f`. Range checks that only depend on a single field live
//! in custom `value_parser`s, mirroring the teacher's `cli.rs::parse_k`;
//! cross-field checks (m <= k, B <= 4^m) happen once both are known, in
//! [`crate::config::Config::build`].

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::kmer::KmerLength;

fn parse_kmer_len(s: &str) -> Result<usize, String> {
    let k: usize = s.parse().map_err(|_| format!("'{s}' is not a number"))?;
    KmerLength::new(k).map_err(|e| e.to_string())?;
    Ok(k)
}

#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Fasta,
    Bin,
}

#[derive(Debug, Parser)]
#[command(name = "kbinner", version, about = "External-memory minimizer-binned k-mer counter")]
pub struct Cli {
    /// k-mer length.
    #[arg(short = 'k', value_parser = parse_kmer_len)]
    pub k: usize,

    /// Minimizer length (m <= k).
    #[arg(short = 'm', default_value_t = 10)]
    pub m: usize,

    /// Worker thread budget (readers + splitters + hashers are derived
    /// from this, following Gerbil's `autocompleteParams`).
    #[arg(short = 't', default_value_t = num_cpus())]
    pub threads: usize,

    /// Memory budget in MB.
    #[arg(short = 'e')]
    pub memory_mb: u64,

    /// Minimum observation count for a k-mer to be emitted at all.
    #[arg(short = 'l', default_value_t = 1)]
    pub threshold_min: u64,

    /// Output file path.
    #[arg(short = 'o')]
    pub output: PathBuf,

    /// Input path: a file, a directory, or a `.txt` manifest of paths.
    #[arg(short = 'i')]
    pub input: PathBuf,

    /// Temp directory for bin files and `binStatFile.txt`.
    #[arg(long, default_value = "tmp")]
    pub tmp: PathBuf,

    /// Enable GPU hashers (feature `gpu`; falls back to CPU-only with a
    /// warning if no GPU feature is compiled in or no device is found).
    #[arg(long)]
    pub gpu: bool,

    /// Disable canonical k-mer normalization.
    #[arg(long)]
    pub no_normalize: bool,

    /// Expected sequencing coverage, for the reliability-band formula.
    #[arg(long)]
    pub coverage: Option<f64>,

    /// Per-base error rate override (skips the estimator).
    #[arg(long = "error-rate")]
    pub error_rate: Option<f64>,

    /// Confidence level the reliability band should capture.
    #[arg(long, default_value_t = 0.95)]
    pub min_probability: f64,

    /// Skip the FASTQ quality-based error-rate estimate and use the
    /// fallback (0.15, or `--error-rate` if given).
    #[arg(long)]
    pub skip_estimate: bool,

    /// Run only stage 1 or only stage 2 against the same `--tmp`.
    #[arg(long, value_name = "STAGE")]
    pub bin_stats_only: Option<Stage>,

    /// Don't delete `binStatFile.txt` after stage 2 completes.
    #[arg(long)]
    pub leave_bin_stat: bool,

    /// Emit a count-frequency histogram instead of per-k-mer counts.
    #[arg(long)]
    pub histogram: bool,

    /// Output record format.
    #[arg(short = 'f', value_enum, default_value_t = OutputFormat::Fasta)]
    pub format: OutputFormat,

    /// Number of on-disk bins (temp files). Power of 4 recommended.
    #[arg(short = 'b', long = "bins", default_value_t = 512)]
    pub num_bins: u32,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum Stage {
    #[value(name = "1")]
    One,
    #[value(name = "2")]
    Two,
}

fn num_cpus() -> usize {
    std::thread::available_parallelism().map_or(4, std::num::NonZeroUsize::get)
}
