//! The output filter and final writer: drops k-mers outside the
//! reliability band `[L, U]`, applies `--threshold-min`, and serializes
//! survivors as FASTA-like text or the packed binary format (spec §6).

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::cli::OutputFormat;
use crate::error::IoError;
use crate::histogram::{compute_histogram_packed, histogram_stats, HistogramStats};
use crate::kmer::PackedKmer;

/// Filters one bin's `(kmer, count)` pairs down to those with
/// `threshold_min <= count` and, if a reliability band is active,
/// `lower <= count <= upper`.
pub struct OutputFilter {
    pub threshold_min: u64,
    pub band: Option<(u64, u64)>,
}

impl OutputFilter {
    pub fn keep(&self, count: u32) -> bool {
        let count = u64::from(count);
        if count < self.threshold_min {
            return false;
        }
        match self.band {
            Some((lower, upper)) => count >= lower && count <= upper,
            None => true,
        }
    }
}

/// Streams filtered `(kmer, count)` pairs to `path` in the requested
/// format. FASTA-like: `>count\nkmer\n` per record. Binary: a 4-byte
/// little-endian count followed by the k-mer's padded packed bytes,
/// back to back with no record separators (spec §6).
pub struct OutputWriter {
    writer: BufWriter<File>,
    format: OutputFormat,
    path: PathBuf,
}

impl OutputWriter {
    pub fn create(path: &Path, format: OutputFormat) -> Result<Self, IoError> {
        let file = File::create(path).map_err(|source| IoError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            writer: BufWriter::new(file),
            format,
            path: path.to_path_buf(),
        })
    }

    pub fn write_record(&mut self, kmer: PackedKmer, count: u32) -> Result<(), IoError> {
        let path = &self.path;
        let err = |source| IoError::Write {
            path: path.clone(),
            source,
        };
        match self.format {
            OutputFormat::Fasta => {
                writeln!(self.writer, ">{count}\n{kmer}").map_err(err)?;
            }
            OutputFormat::Bin => {
                self.writer.write_all(&count.to_le_bytes()).map_err(err)?;
                self.writer.write_all(&kmer.to_padded_bytes()).map_err(err)?;
            }
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), IoError> {
        self.writer.flush().map_err(|source| IoError::Write {
            path: self.path.clone(),
            source,
        })
    }
}

/// Computes the `--histogram` output (count -> number of distinct
/// k-mers with that count) from a bin's already-filtered counts.
pub fn histogram_of(counts: &[(PackedKmer, u32)]) -> (HashMap<u64, u64>, HistogramStats) {
    let packed: HashMap<u64, u64> = counts.iter().map(|(k, c)| (k.bits(), u64::from(*c))).collect();
    let hist = compute_histogram_packed(&packed);
    let stats = histogram_stats(&hist);
    (hist.into_iter().collect(), stats)
}

/// Writes a `--histogram` run's result: one `count\tfrequency` line per
/// occupied count, ascending, with the summary stats as leading comments.
pub fn write_histogram_file(path: &Path, hist: &HashMap<u64, u64>, stats: &HistogramStats) -> Result<(), IoError> {
    let file = File::create(path).map_err(|source| IoError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    let mut writer = BufWriter::new(file);
    let err = |source| IoError::Write {
        path: path.to_path_buf(),
        source,
    };
    writeln!(writer, "# distinct_kmers={} total_kmers={} mode_count={} mean_count={:.3}", stats.distinct_kmers, stats.total_kmers, stats.mode_count, stats.mean_count).map_err(err)?;
    let mut counts: Vec<&u64> = hist.keys().collect();
    counts.sort_unstable();
    for count in counts {
        writeln!(writer, "{count}\t{}", hist[count]).map_err(err)?;
    }
    writer.flush().map_err(err)
}
