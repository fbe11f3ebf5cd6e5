//! Error taxonomy for the pipeline.
//!
//! Every fatal condition surfaced anywhere in the pipeline is folded into
//! [`PipelineError`], which implements [`std::error::Error`] via `thiserror`.
//! The five top-level variants mirror the error categories the pipeline is
//! specified against: configuration, I/O, format, capacity, and internal
//! (bug-class) failures.

use std::path::PathBuf;

use thiserror::Error;

/// The top-level error type returned by every fallible pipeline entry point.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    #[error("format error: {0}")]
    Format(#[from] FormatError),

    #[error("capacity error: {0}")]
    Capacity(#[from] CapacityError),

    #[error("internal error: {0}")]
    Internal(#[from] InternalError),
}

impl PipelineError {
    /// A stable process exit code per error category, distinct from the
    /// generic "some error occurred" convention of exit code 1.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 2,
            Self::Io(_) => 3,
            Self::Format(_) => 4,
            Self::Capacity(_) => 5,
            Self::Internal(_) => 6,
        }
    }
}

/// Invalid, missing, or mutually inconsistent parameters.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("k-mer length {k} out of range: must be in 1..={max}")]
    InvalidKmerLength { k: usize, max: usize },

    #[error("minimizer length {m} must be <= k-mer length {k}")]
    MinimizerExceedsK { m: usize, k: usize },

    #[error("bin count {bins} exceeds 4^{m} ({max_bins}) distinct minimizers of length {m}")]
    TooManyBins { bins: usize, m: usize, max_bins: u64 },

    #[error("threshold_min must be >= 1, got {0}")]
    InvalidThreshold(u64),

    #[error("memory budget must be > 0 MB")]
    ZeroMemoryBudget,

    #[error("input path does not exist: {0}")]
    MissingInput(PathBuf),

    #[error("input path is neither a file, directory, nor manifest: {0}")]
    UnusableInput(PathBuf),

    #[error("no input files resolved from: {0}")]
    NoInputFiles(PathBuf),

    #[error("min-probability must be in (0, 1), got {0}")]
    InvalidProbability(f64),

    #[error("coverage must be > 0, got {0}")]
    InvalidCoverage(f64),

    #[error("error-rate must be in (0, 1), got {0}")]
    InvalidErrorRate(f64),
}

/// Read/write/open failures on input, temp, or output files.
#[derive(Debug, Error)]
pub enum IoError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unexpected end of file reading {path}")]
    UnexpectedEof { path: PathBuf },
}

/// Unrecognized input file extension or mixed input types.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("unsupported file extension '{extension}' for {path}")]
    UnsupportedExtension { path: PathBuf, extension: String },

    #[error("input files are of mixed types: expected {expected:?}, found {found:?} at {path}")]
    MixedInputTypes {
        path: PathBuf,
        expected: &'static str,
        found: &'static str,
    },

    #[error("invalid base '{base}' at position {position} (expected A, C, G, or T)")]
    InvalidBase { base: u8, position: usize },

    #[error("malformed record in {path}: {details}")]
    MalformedRecord { path: PathBuf, details: String },

    #[error("corrupt bin-stat file {path}: {details}")]
    CorruptBinStat { path: PathBuf, details: String },
}

/// Memory budget too small to satisfy minimum requirements.
#[derive(Debug, Error)]
pub enum CapacityError {
    #[error(
        "memory budget {budget_mb} MB is below the stage-1 minimum requirement of {minimum_mb} MB"
    )]
    Stage1BelowMinimum { budget_mb: u64, minimum_mb: u64 },

    #[error(
        "memory budget {budget_mb} MB is below the stage-2 minimum requirement of {minimum_mb} MB"
    )]
    Stage2BelowMinimum { budget_mb: u64, minimum_mb: u64 },

    #[error("hash table for bin {bin} reached its configured capacity ceiling and could not be grown further")]
    HashTableCeiling { bin: u32 },
}

/// Bug-class failures: a spill could not resolve a capacity overflow.
#[derive(Debug, Error)]
pub enum InternalError {
    #[error("bin {bin} exhausted its probe sequence and recursive spill depth {depth} without resolving an insert")]
    ProbeExhaustionUnresolved { bin: u32, depth: u32 },

    #[error("distributor invariant violated: {0}")]
    DistributorInvariant(String),

    #[error("failed to start hasher thread pool: {0}")]
    HasherPoolInit(String),

    #[error("queue finalized twice")]
    DoubleFinalize,
}

pub type Result<T> = std::result::Result<T, PipelineError>;
