//! External-memory, minimizer-binned k-mer counter.
//!
//! The pipeline runs in two disk-mediated stages. Stage 1 reads input
//! sequence files, splits every read into super-mers (maximal runs of
//! k-mers sharing a minimizer), and appends each to an on-disk bin
//! chosen by that minimizer. Stage 2 re-reads the bins, counts exact
//! canonical k-mers per bin in a fixed-capacity hash table, and emits
//! the ones that pass a reliability band and `--threshold-min`.
//!
//! Splitting the run this way bounds peak memory to a configured budget
//! regardless of input size: [`memory_planner`] turns that single budget
//! into concrete sizes for every queue, buffer, and hash table before
//! either stage starts.

pub mod bin_stat;
pub mod bin_writer;
pub mod bundle;
pub mod cli;
pub mod config;
pub mod distributor;
pub mod error;
pub mod hasher;
pub mod histogram;
pub mod kmer;
pub mod memory_planner;
pub mod minimizer;
#[cfg(feature = "mmap")]
pub mod mmap;
pub mod output;
pub mod parser;
pub mod pipeline;
pub mod progress;
pub mod queue;
pub mod reader;
pub mod reliability;
pub mod splitter;

pub use config::Config;
pub use error::{PipelineError, Result};
pub use pipeline::RunSummary;
