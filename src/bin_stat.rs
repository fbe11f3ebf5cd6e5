//! Per-bin statistics, persisted between stage 1 and stage 2 as
//! `binStatFile.txt`.
//!
//! The on-disk format is a fixed-size binary record per bin, in bin-id
//! order, with a trailing CRC32 checksum over the whole payload — the
//! same IEEE-polynomial table-driven CRC32 the teacher crate uses for its
//! `.kmix` index format, reused here because round-tripping exactly
//! (spec §6) is exactly the property that format was built to guarantee.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use crate::error::{FormatError, IoError};

const RECORD_SIZE: usize = 32;
const MAGIC: [u8; 4] = *b"BSTF";

/// Per-bin (byte size, approximate unique-k-mer count, max-count
/// estimate) collected while stage 1 writes that bin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BinStat {
    pub bytes_written: u64,
    pub unique_kmer_estimate: u64,
    pub max_count_estimate: u64,
    pub bin: u32,
}

impl BinStat {
    pub const fn new(bin: u32, bytes_written: u64, unique_kmer_estimate: u64, max_count_estimate: u64) -> Self {
        Self {
            bin,
            bytes_written,
            unique_kmer_estimate,
            max_count_estimate,
        }
    }

    fn to_bytes(self) -> [u8; RECORD_SIZE] {
        let mut buf = [0u8; RECORD_SIZE];
        buf[0..4].copy_from_slice(&self.bin.to_le_bytes());
        buf[4..12].copy_from_slice(&self.bytes_written.to_le_bytes());
        buf[12..20].copy_from_slice(&self.unique_kmer_estimate.to_le_bytes());
        buf[20..28].copy_from_slice(&self.max_count_estimate.to_le_bytes());
        buf
    }

    fn from_bytes(buf: &[u8; RECORD_SIZE]) -> Self {
        Self {
            bin: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
            bytes_written: u64::from_le_bytes(buf[4..12].try_into().unwrap()),
            unique_kmer_estimate: u64::from_le_bytes(buf[12..20].try_into().unwrap()),
            max_count_estimate: u64::from_le_bytes(buf[20..28].try_into().unwrap()),
        }
    }

    /// Cheap unique-k-mer estimate from total k-mer count and error rate,
    /// per spec §4.5: `unique ~= total * (1 - exp(-k * erate))`.
    pub fn estimate_unique(total_kmers: u64, k: usize, erate: f64) -> u64 {
        let frac = 1.0 - (-(k as f64) * erate).exp();
        (total_kmers as f64 * frac).round() as u64
    }

    pub const fn max_unique_kmers(self) -> u64 {
        self.unique_kmer_estimate
    }

    /// Used by the planner as a conservative hash-table growth ceiling.
    /// With a single `BinStat` (no population of bins to derive a
    /// standard deviation from) this degenerates to the estimate itself.
    pub const fn avg_plus_2sd_unique(self) -> u64 {
        self.unique_kmer_estimate
    }
}

/// The whole-run statistics table, one entry per bin, in bin-id order.
#[derive(Debug, Clone, Default)]
pub struct BinStatTable {
    pub stats: Vec<BinStat>,
}

impl BinStatTable {
    pub fn new(num_bins: u32) -> Self {
        Self {
            stats: (0..num_bins).map(|bin| BinStat::new(bin, 0, 0, 0)).collect(),
        }
    }

    pub fn get(&self, bin: u32) -> BinStat {
        self.stats[bin as usize]
    }

    pub fn set(&mut self, stat: BinStat) {
        self.stats[stat.bin as usize] = stat;
    }

    /// Aggregate statistics across every bin, used by the stage-2 planner
    /// to size the hash table and queues from `avg + 2*stddev`.
    pub fn aggregate(&self) -> BinStat {
        if self.stats.is_empty() {
            return BinStat::default();
        }
        let n = self.stats.len() as f64;
        let mean = |f: fn(&BinStat) -> u64| -> f64 {
            self.stats.iter().map(|s| f(s) as f64).sum::<f64>() / n
        };
        let stddev = |f: fn(&BinStat) -> u64, mean: f64| -> f64 {
            (self.stats.iter().map(|s| (f(s) as f64 - mean).powi(2)).sum::<f64>() / n).sqrt()
        };

        let unique_mean = mean(|s| s.unique_kmer_estimate);
        let unique_sd = stddev(|s| s.unique_kmer_estimate, unique_mean);
        let size_mean = mean(|s| s.bytes_written);
        let size_sd = stddev(|s| s.bytes_written, size_mean);
        let max_unique = self.stats.iter().map(|s| s.unique_kmer_estimate).max().unwrap_or(0);

        BinStat {
            bin: u32::MAX,
            bytes_written: (size_mean + 2.0 * size_sd) as u64,
            unique_kmer_estimate: max_unique,
            max_count_estimate: (unique_mean + 2.0 * unique_sd) as u64,
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), IoError> {
        let mut out = Vec::with_capacity(MAGIC.len() + 4 + self.stats.len() * RECORD_SIZE + 4);
        out.extend_from_slice(&MAGIC);
        out.extend_from_slice(&(self.stats.len() as u32).to_le_bytes());
        for stat in &self.stats {
            out.extend_from_slice(&stat.to_bytes());
        }
        let crc = crc32(&out);
        out.extend_from_slice(&crc.to_le_bytes());

        let mut file = File::create(path).map_err(|source| IoError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        file.write_all(&out).map_err(|source| IoError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, FormatErrorOrIo> {
        let mut file = File::open(path).map_err(|source| {
            FormatErrorOrIo::Io(IoError::Open {
                path: path.to_path_buf(),
                source,
            })
        })?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf).map_err(|source| {
            FormatErrorOrIo::Io(IoError::Read {
                path: path.to_path_buf(),
                source,
            })
        })?;

        if buf.len() < MAGIC.len() + 4 + 4 {
            return Err(FormatErrorOrIo::Format(FormatError::CorruptBinStat {
                path: path.to_path_buf(),
                details: "file too small".to_string(),
            }));
        }
        let (payload, checksum) = buf.split_at(buf.len() - 4);
        let expected = u32::from_le_bytes(checksum.try_into().unwrap());
        if crc32(payload) != expected {
            return Err(FormatErrorOrIo::Format(FormatError::CorruptBinStat {
                path: path.to_path_buf(),
                details: "checksum mismatch".to_string(),
            }));
        }
        if payload[0..4] != MAGIC {
            return Err(FormatErrorOrIo::Format(FormatError::CorruptBinStat {
                path: path.to_path_buf(),
                details: "bad magic".to_string(),
            }));
        }
        let count = u32::from_le_bytes(payload[4..8].try_into().unwrap()) as usize;
        let expected_len = 8 + count * RECORD_SIZE;
        if payload.len() != expected_len {
            return Err(FormatErrorOrIo::Format(FormatError::CorruptBinStat {
                path: path.to_path_buf(),
                details: "record count mismatch".to_string(),
            }));
        }

        let mut stats = Vec::with_capacity(count);
        for i in 0..count {
            let start = 8 + i * RECORD_SIZE;
            let record: [u8; RECORD_SIZE] = payload[start..start + RECORD_SIZE].try_into().unwrap();
            stats.push(BinStat::from_bytes(&record));
        }
        Ok(Self { stats })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FormatErrorOrIo {
    #[error(transparent)]
    Io(IoError),
    #[error(transparent)]
    Format(FormatError),
}

/// Table-driven CRC32 (IEEE polynomial, reflected), matching the
/// well-known `crc32(b"123456789") == 0xCBF43926` test vector.
fn crc32(data: &[u8]) -> u32 {
    const POLY: u32 = 0xEDB8_8320;
    let mut table = [0u32; 256];
    for (i, entry) in table.iter_mut().enumerate() {
        let mut c = i as u32;
        for _ in 0..8 {
            c = if c & 1 != 0 { POLY ^ (c >> 1) } else { c >> 1 };
        }
        *entry = c;
    }
    let mut crc = 0xFFFF_FFFFu32;
    for &byte in data {
        let idx = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = table[idx] ^ (crc >> 8);
    }
    crc ^ 0xFFFF_FFFF
}
