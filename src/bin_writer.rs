//! Stage 1's bin writer: drains per-bin [`SuperBundle`]s from the
//! splitter's [`BinQueues`] and appends them to on-disk bin files,
//! keeping an in-memory stack per bin so nearby super-mers batch into
//! fewer, larger writes.
//!
//! When the in-memory stack's total size would exceed its configured
//! budget, the largest bin's stack is flushed first — the same
//! largest-first principle the memory planner and distributor both use,
//! so one hot bin never starves the others of buffering.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::PathBuf;

use crate::bin_stat::{BinStat, BinStatTable};
use crate::bundle::SuperBundle;
use crate::error::IoError;
use crate::queue::BinQueues;

/// An LRU-bounded pool of open file handles, since the OS caps how many
/// a process may hold at once and every bin wants its own append-only
/// file.
struct FileHandlePool {
    tmp_dir: PathBuf,
    max_open: usize,
    open: HashMap<u32, File>,
    lru: Vec<u32>,
}

impl FileHandlePool {
    fn new(tmp_dir: PathBuf, max_open: usize) -> Self {
        Self {
            tmp_dir,
            max_open: max_open.max(1),
            open: HashMap::new(),
            lru: Vec::new(),
        }
    }

    fn get(&mut self, bin: u32) -> Result<&mut File, IoError> {
        if !self.open.contains_key(&bin) {
            if self.open.len() >= self.max_open {
                if let Some(victim) = self.lru.first().copied() {
                    self.lru.remove(0);
                    self.open.remove(&victim);
                }
            }
            let path = self.tmp_dir.join(format!("bin_{bin}"));
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(|source| IoError::Open { path, source })?;
            self.open.insert(bin, file);
        }
        self.lru.retain(|&b| b != bin);
        self.lru.push(bin);
        Ok(self.open.get_mut(&bin).expect("just inserted"))
    }
}

/// The in-memory stack policy: holds filled [`SuperBundle`]s per bin
/// until either the bin's own stack gets large or the global budget is
/// exceeded, in which case the largest stack is flushed.
pub struct BinWriter {
    stacks: Vec<Vec<SuperBundle>>,
    stack_sizes: Vec<usize>,
    budget_bytes: u64,
    total_buffered: u64,
    pool: FileHandlePool,
    stats: BinStatTable,
}

impl BinWriter {
    pub fn new(num_bins: u32, budget_bytes: u64, tmp_dir: PathBuf, max_open_files: usize) -> Self {
        Self {
            stacks: vec![Vec::new(); num_bins as usize],
            stack_sizes: vec![0; num_bins as usize],
            budget_bytes,
            total_buffered: 0,
            pool: FileHandlePool::new(tmp_dir, max_open_files),
            stats: BinStatTable::new(num_bins),
        }
    }

    /// Buffers one bundle, flushing the largest bin's stack whenever the
    /// global buffered total exceeds `budget_bytes`.
    pub fn accept(&mut self, bundle: SuperBundle) -> Result<(), IoError> {
        let bin = bundle.bin as usize;
        let size = bundle.byte_size() as u64;
        self.total_buffered += size;
        self.stack_sizes[bin] += size as usize;
        self.stacks[bin].push(bundle);

        while self.total_buffered > self.budget_bytes {
            let Some((largest_bin, _)) = self
                .stack_sizes
                .iter()
                .enumerate()
                .max_by_key(|&(_, &sz)| sz)
                .filter(|&(_, &sz)| sz > 0)
            else {
                break;
            };
            self.flush_bin(largest_bin as u32)?;
        }
        Ok(())
    }

    fn flush_bin(&mut self, bin: u32) -> Result<(), IoError> {
        let idx = bin as usize;
        let bundles = std::mem::take(&mut self.stacks[idx]);
        let flushed_bytes = self.stack_sizes[idx] as u64;
        self.stack_sizes[idx] = 0;
        self.total_buffered = self.total_buffered.saturating_sub(flushed_bytes);

        if bundles.is_empty() {
            return Ok(());
        }
        let file = self.pool.get(bin)?;
        let mut bytes_written = 0u64;
        for bundle in &bundles {
            for super_mer in &bundle.super_mers {
                // length-prefixed so the bin reader can split super-mers
                // back out without re-scanning for minimizer boundaries.
                let len = super_mer.bases.len() as u32;
                file.write_all(&len.to_le_bytes()).map_err(|source| IoError::Write {
                    path: PathBuf::from(format!("bin_{bin}")),
                    source,
                })?;
                file.write_all(&super_mer.bases).map_err(|source| IoError::Write {
                    path: PathBuf::from(format!("bin_{bin}")),
                    source,
                })?;
                bytes_written += 4 + len as u64;
            }
        }

        let prior = self.stats.get(bin);
        let total_kmers = bundles
            .iter()
            .flat_map(|b| b.super_mers.iter())
            .map(|s| s.bases.len() as u64)
            .sum::<u64>();
        self.stats.set(BinStat::new(
            bin,
            prior.bytes_written + bytes_written,
            prior.unique_kmer_estimate + total_kmers,
            prior.max_count_estimate,
        ));
        Ok(())
    }

    /// Flushes every bin's remaining stack, called once at end-of-input.
    pub fn flush_all(&mut self) -> Result<(), IoError> {
        for bin in 0..self.stacks.len() as u32 {
            self.flush_bin(bin)?;
        }
        Ok(())
    }

    pub fn into_stats(self) -> BinStatTable {
        self.stats
    }
}

/// Reads one bin file back in full, in the length-prefixed super-mer
/// format [`BinWriter::flush_bin`] wrote, for stage 2's hashers.
pub fn read_bin_file(tmp_dir: &std::path::Path, bin: u32) -> Result<Vec<Vec<u8>>, IoError> {
    let path = tmp_dir.join(format!("bin_{bin}"));
    let mut file = File::open(&path).map_err(|source| IoError::Open {
        path: path.clone(),
        source,
    })?;
    let mut data = Vec::new();
    file.read_to_end(&mut data).map_err(|source| IoError::Read {
        path: path.clone(),
        source,
    })?;

    let mut super_mers = Vec::new();
    let mut offset = 0;
    while offset + 4 <= data.len() {
        let len = u32::from_le_bytes(data[offset..offset + 4].try_into().unwrap()) as usize;
        offset += 4;
        if offset + len > data.len() {
            return Err(IoError::UnexpectedEof { path });
        }
        super_mers.push(data[offset..offset + len].to_vec());
        offset += len;
    }
    Ok(super_mers)
}

/// Drains `queues` on a single bin-writer thread until every bin queue is
/// finalized and drained, flushing to disk via `writer`. Round-robins over
/// bins that still have data; when a full pass finds nothing ready, it
/// blocks on `queues`' activity signal instead of re-polling, so an idle
/// bin writer costs no CPU while it waits on the splitter.
pub fn run(queues: &BinQueues<SuperBundle>, writer: &mut BinWriter) -> Result<(), IoError> {
    let num_bins = queues.num_bins();
    let mut empties: Vec<SuperBundle> = (0..num_bins).map(|b| SuperBundle::new(b, 1)).collect();
    let mut done = vec![false; num_bins as usize];
    let mut remaining = num_bins as usize;

    while remaining > 0 {
        let since = queues.generation();
        let mut made_progress = false;

        for bin in 0..num_bins {
            let idx = bin as usize;
            if done[idx] {
                continue;
            }
            if queues.queue(bin).is_empty() {
                if queues.queue(bin).is_finalized() {
                    done[idx] = true;
                    remaining -= 1;
                    made_progress = true;
                }
                continue;
            }
            let empty = std::mem::replace(&mut empties[idx], SuperBundle::new(bin, 1));
            match queues.queue(bin).swap_pop(empty) {
                Some(filled) => {
                    writer.accept(filled)?;
                    made_progress = true;
                }
                None => {
                    done[idx] = true;
                    remaining -= 1;
                    made_progress = true;
                }
            }
        }

        if !made_progress && remaining > 0 {
            queues.wait_for_activity(since);
        }
    }
    writer.flush_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::SuperMer;
    use tempfile::tempdir;

    #[test]
    fn accept_flushes_when_budget_exceeded() {
        let dir = tempdir().unwrap();
        let mut writer = BinWriter::new(2, 10, dir.path().to_path_buf(), 4);
        let mut bundle = SuperBundle::new(0, 4);
        bundle.super_mers.push(SuperMer {
            bases: vec![b'A'; 20],
            bin: 0,
        });
        writer.accept(bundle).unwrap();
        assert_eq!(writer.total_buffered, 0); // flushed immediately, over budget
        let bin_file = dir.path().join("bin_0");
        assert!(bin_file.exists());
        assert!(std::fs::metadata(bin_file).unwrap().len() > 0);
    }

    #[test]
    fn flush_all_writes_every_bin() {
        let dir = tempdir().unwrap();
        let mut writer = BinWriter::new(3, 1_000_000, dir.path().to_path_buf(), 4);
        for bin in 0..3u32 {
            let mut bundle = SuperBundle::new(bin, 4);
            bundle.super_mers.push(SuperMer {
                bases: vec![b'C'; 5],
                bin,
            });
            writer.accept(bundle).unwrap();
        }
        writer.flush_all().unwrap();
        for bin in 0..3u32 {
            assert!(dir.path().join(format!("bin_{bin}")).exists());
        }
        let stats = writer.into_stats();
        assert_eq!(stats.stats.len(), 3);
    }

    #[test]
    fn read_bin_file_round_trips_super_mers() {
        let dir = tempdir().unwrap();
        let mut writer = BinWriter::new(1, 1_000_000, dir.path().to_path_buf(), 4);
        let mut bundle = SuperBundle::new(0, 4);
        bundle.super_mers.push(SuperMer {
            bases: b"ACGT".to_vec(),
            bin: 0,
        });
        bundle.super_mers.push(SuperMer {
            bases: b"TTTTT".to_vec(),
            bin: 0,
        });
        writer.accept(bundle).unwrap();
        writer.flush_all().unwrap();

        let super_mers = read_bin_file(dir.path(), 0).unwrap();
        assert_eq!(super_mers, vec![b"ACGT".to_vec(), b"TTTTT".to_vec()]);
    }
}
