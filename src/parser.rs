//! Splits [`FastBundle`] byte streams into [`ReadRecord`]s, carrying a
//! partial record across bundle boundaries since the reader makes no
//! attempt to align bundles on record boundaries (spec §4.2, §4.3).
//!
//! Also estimates the per-base sequencing error rate from FASTQ quality
//! strings when `--error-rate` isn't given and `--skip-estimate` isn't
//! set, following the mean-Phred approach in `original_source`'s
//! `FastReader.cpp` quality-scan pass.

use crate::bundle::{FastBundle, ReadBundle, ReadRecord};
use crate::error::FormatError;

/// Which of the two line-oriented formats a carry buffer is being parsed
/// as. FASTA records start with `>`; FASTQ records start with `@`, have
/// exactly four lines, and carry a quality string on line 4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Fasta,
    Fastq,
}

/// Incremental parser state carried between successive [`FastBundle`]s
/// from the same file.
#[derive(Debug, Default)]
pub struct Parser {
    carry: Vec<u8>,
}

impl Parser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes `bundle`'s bytes, appends them to any carried partial
    /// record, splits out complete records into `out`, and retains
    /// whatever trailing partial record remains for the next call.
    pub fn feed(
        &mut self,
        format: Format,
        bundle: &FastBundle,
        out: &mut ReadBundle,
    ) -> Result<(), FormatError> {
        self.carry.extend_from_slice(&bundle.data);
        self.split_complete_records(format, out, bundle.is_finalized())?;
        Ok(())
    }

    fn split_complete_records(
        &mut self,
        format: Format,
        out: &mut ReadBundle,
        flush: bool,
    ) -> Result<(), FormatError> {
        match format {
            Format::Fasta => self.split_fasta(out, flush),
            Format::Fastq => self.split_fastq(out, flush),
        }
    }

    fn split_fasta(&mut self, out: &mut ReadBundle, flush: bool) -> Result<(), FormatError> {
        loop {
            let text = &self.carry[..];
            let Some(start) = text.iter().position(|&b| b == b'>') else {
                if flush {
                    self.carry.clear();
                }
                return Ok(());
            };
            let after_header = start + text[start..].iter().position(|&b| b == b'\n').map_or(text.len() - start, |p| p + 1);
            let rest = &text[after_header..];
            let next_header = rest.iter().position(|&b| b == b'>');
            let record_end = match next_header {
                Some(offset) => after_header + offset,
                None if flush => text.len(),
                None => {
                    // incomplete trailing record: keep from `start` onward
                    self.carry.drain(..start);
                    return Ok(());
                }
            };
            let sequence: Vec<u8> = text[after_header..record_end]
                .iter()
                .copied()
                .filter(|b| !b.is_ascii_whitespace())
                .collect();
            if !sequence.is_empty() {
                out.records.push(ReadRecord {
                    sequence,
                    quality: None,
                });
            }
            self.carry.drain(..record_end);
            if next_header.is_none() {
                return Ok(());
            }
        }
    }

    fn split_fastq(&mut self, out: &mut ReadBundle, flush: bool) -> Result<(), FormatError> {
        loop {
            let newline_positions: Vec<usize> = self
                .carry
                .iter()
                .enumerate()
                .filter(|&(_, &b)| b == b'\n')
                .map(|(i, _)| i)
                .collect();
            if newline_positions.len() < 4 {
                if flush && !self.carry.is_empty() {
                    return Err(FormatError::MalformedRecord {
                        path: Default::default(),
                        details: "truncated fastq record at end of input".to_string(),
                    });
                }
                return Ok(());
            }
            let l = |i: usize| -> usize { newline_positions[i] };
            if self.carry[0] != b'@' {
                return Err(FormatError::MalformedRecord {
                    path: Default::default(),
                    details: "fastq record does not start with '@'".to_string(),
                });
            }
            let sequence: Vec<u8> = self.carry[l(0) + 1..l(1)].to_vec();
            let plus_line = &self.carry[l(1) + 1..l(2)];
            if plus_line.first() != Some(&b'+') {
                return Err(FormatError::MalformedRecord {
                    path: Default::default(),
                    details: "fastq record missing '+' separator".to_string(),
                });
            }
            let quality: Vec<u8> = self.carry[l(2) + 1..l(3)].to_vec();
            if quality.len() != sequence.len() {
                return Err(FormatError::MalformedRecord {
                    path: Default::default(),
                    details: "fastq sequence/quality length mismatch".to_string(),
                });
            }
            out.records.push(ReadRecord {
                sequence,
                quality: Some(quality),
            });
            self.carry.drain(..=l(3));
        }
    }
}

/// Mean-Phred error-rate estimate from a sample of quality strings:
/// `erate = mean(10^(-Q/10))`, clamped to `[0.001, 0.5]` since both
/// extremes make the reliability-band formula degenerate.
pub fn estimate_error_rate(qualities: &[Vec<u8>]) -> f64 {
    let mut acc = ErrorRateAccumulator::new();
    for q in qualities {
        acc.observe(q);
    }
    acc.finish()
}

/// Running mean-Phred accumulator, so the parser thread can feed it one
/// quality string at a time instead of retaining every read's quality
/// string for a single final pass (spec §4.3: "its result is read once
/// after the parser finishes").
#[derive(Debug, Default)]
pub struct ErrorRateAccumulator {
    sum: f64,
    count: u64,
}

impl ErrorRateAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, quality: &[u8]) {
        for &byte in quality {
            let phred = f64::from(byte.saturating_sub(33));
            self.sum += 10f64.powf(-phred / 10.0);
            self.count += 1;
        }
    }

    pub fn finish(&self) -> f64 {
        if self.count == 0 {
            return 0.15; // Gerbil's documented fallback when no quality data exists.
        }
        (self.sum / self.count as f64).clamp(0.001, 0.5)
    }
}
