//! Stage 1's reader: resolves the `-i` input (a file, a directory, or a
//! `.txt` manifest) into an ordered list of files, then streams raw bytes
//! into [`FastBundle`]s over a [`SwapQueue`].
//!
//! Grounded in `original_source/src/gerbil/FastReader.cpp`: directories are
//! expanded non-recursively, `.txt` inputs are treated as manifests (one
//! path per line), and files are visited largest-first so a slow last file
//! doesn't leave every other reader thread idle while one thread finishes
//! it alone.

use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use crate::bundle::FastBundle;
use crate::error::{ConfigError, FormatError, IoError};
use crate::queue::SwapQueue;

/// Whether a resolved input file is gzip- or bzip2-compressed, decided
/// purely from its extension, stripping a compression suffix before
/// checking it the same way `detect_format` does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Compression {
    None,
    Gzip,
    Bzip2,
}

fn compression_of(path: &Path) -> Compression {
    match path.extension().and_then(|e| e.to_str()) {
        Some("gz") => Compression::Gzip,
        Some("bz2") => Compression::Bzip2,
        _ => Compression::None,
    }
}

/// Resolves `-i`'s argument into a concrete, ordered list of readable
/// files. A directory is expanded one level deep; a `.txt` file is read
/// as a manifest of paths, one per line, blank lines and `#`-comments
/// skipped; anything else is treated as a single input file.
pub fn resolve_inputs(path: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let mut files = if path.is_dir() {
        fs::read_dir(path)
            .map_err(|_| ConfigError::UnusableInput(path.to_path_buf()))?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|p| p.is_file())
            .collect()
    } else if path.extension().and_then(|e| e.to_str()) == Some("txt") {
        read_manifest(path)?
    } else if path.is_file() {
        vec![path.to_path_buf()]
    } else {
        return Err(ConfigError::UnusableInput(path.to_path_buf()));
    };

    if files.is_empty() {
        return Err(ConfigError::NoInputFiles(path.to_path_buf()));
    }

    // Largest-first: a reader thread that draws the biggest file first
    // never ends up running alone against it while its siblings idle.
    files.sort_by_key(|p| std::cmp::Reverse(fs::metadata(p).map(|m| m.len()).unwrap_or(0)));
    Ok(files)
}

fn read_manifest(path: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let contents =
        fs::read_to_string(path).map_err(|_| ConfigError::UnusableInput(path.to_path_buf()))?;
    let files: Vec<PathBuf> = contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(PathBuf::from)
        .collect();
    Ok(files)
}

/// Number of reader threads to use, following Gerbil's rule: two threads
/// only pay off when decompression work can overlap with I/O, so a second
/// reader is spun up only once any input file is compressed.
pub fn reader_thread_count(files: &[PathBuf]) -> usize {
    if files.iter().any(|f| compression_of(f) != Compression::None) {
        2
    } else {
        1
    }
}

fn open_decoder(path: &Path) -> Result<Box<dyn Read + Send>, IoError> {
    let file = File::open(path).map_err(|source| IoError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let buffered = BufReader::new(file);
    match compression_of(path) {
        Compression::None => Ok(Box::new(buffered)),
        #[cfg(feature = "gzip")]
        Compression::Gzip => Ok(Box::new(flate2::read::MultiGzDecoder::new(buffered))),
        #[cfg(not(feature = "gzip"))]
        Compression::Gzip => Err(IoError::Open {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::Unsupported, "gzip support not compiled in"),
        }),
        #[cfg(feature = "bzip2")]
        Compression::Bzip2 => Ok(Box::new(bzip2::read::MultiBzDecoder::new(buffered))),
        #[cfg(not(feature = "bzip2"))]
        Compression::Bzip2 => Err(IoError::Open {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::Unsupported, "bzip2 support not compiled in"),
        }),
    }
}

/// Streams every resolved input file, in order, into `queue` as a
/// sequence of [`FastBundle`]s. Each bundle is filled to capacity (or to
/// end-of-input) and pushed as-is — record boundaries are the parser's
/// concern, not the reader's (spec §4.2).
///
/// Uncompressed files take the `mmap` feature's zero-syscall-per-chunk
/// path when it's compiled in; compressed files always go through their
/// streaming decoder since a compressed file can't be mapped directly.
pub fn stream_files(files: &[PathBuf], queue: &SwapQueue<FastBundle>) -> Result<(), IoError> {
    let mut empty = FastBundle::default();
    for path in files {
        empty = if compression_of(path) == Compression::None && cfg!(feature = "mmap") {
            stream_uncompressed_mmap(path, queue, empty)?
        } else {
            stream_decoded(path, queue, empty)?
        };
    }
    empty.finalize();
    queue.swap_push(empty);
    queue.finalize();
    Ok(())
}

fn stream_decoded(
    path: &Path,
    queue: &SwapQueue<FastBundle>,
    mut empty: FastBundle,
) -> Result<FastBundle, IoError> {
    let mut decoder = open_decoder(path)?;
    loop {
        empty.reset();
        let mut chunk = vec![0u8; empty.data.capacity().max(1 << 20)];
        let n = decoder.read(&mut chunk).map_err(|source| IoError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        if n == 0 {
            break;
        }
        empty.data.extend_from_slice(&chunk[..n]);
        empty = queue.swap_push(empty);
    }
    Ok(empty)
}

#[cfg(feature = "mmap")]
fn stream_uncompressed_mmap(
    path: &Path,
    queue: &SwapQueue<FastBundle>,
    mut empty: FastBundle,
) -> Result<FastBundle, IoError> {
    let mapped = crate::mmap::MmapFasta::open(path).map_err(|source| IoError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let chunk_size = empty.data.capacity().max(1 << 20);
    for chunk in mapped.chunks(chunk_size) {
        empty.reset();
        empty.data.extend_from_slice(chunk);
        empty = queue.swap_push(empty);
    }
    Ok(empty)
}

#[cfg(not(feature = "mmap"))]
fn stream_uncompressed_mmap(
    path: &Path,
    queue: &SwapQueue<FastBundle>,
    empty: FastBundle,
) -> Result<FastBundle, IoError> {
    stream_decoded(path, queue, empty)
}

/// Validates that every file in a resolved set shares one format, per
/// spec §4.2's "all inputs must be the same type" rule.
pub fn check_uniform_format(files: &[PathBuf]) -> Result<(), FormatError> {
    let is_fastq = |p: &Path| -> bool {
        let stem_ext = if compression_of(p) != Compression::None {
            p.file_stem().map(Path::new).and_then(|s| s.extension())
        } else {
            p.extension()
        };
        matches!(stem_ext.and_then(|e| e.to_str()), Some("fq" | "fastq"))
    };

    let Some(first) = files.first() else {
        return Ok(());
    };
    let expected = is_fastq(first);
    for f in &files[1..] {
        if is_fastq(f) != expected {
            return Err(FormatError::MixedInputTypes {
                path: f.clone(),
                expected: if expected { "fastq" } else { "fasta" },
                found: if expected { "fasta" } else { "fastq" },
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn resolves_single_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("reads.fa");
        fs::write(&path, b">r\nACGT\n").unwrap();
        let files = resolve_inputs(&path).unwrap();
        assert_eq!(files, vec![path]);
    }

    #[test]
    fn resolves_directory_largest_first() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("small.fa"), b">r\nAC\n").unwrap();
        fs::write(dir.path().join("big.fa"), b">r\nACGTACGTACGT\n").unwrap();
        let files = resolve_inputs(dir.path()).unwrap();
        assert_eq!(files[0].file_name().unwrap(), "big.fa");
    }

    #[test]
    fn resolves_manifest_skipping_comments_and_blanks() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.fa");
        let b = dir.path().join("b.fa");
        fs::write(&a, b">r\nAC\n").unwrap();
        fs::write(&b, b">r\nGT\n").unwrap();
        let manifest = dir.path().join("manifest.txt");
        let mut f = File::create(&manifest).unwrap();
        writeln!(f, "# comment").unwrap();
        writeln!(f).unwrap();
        writeln!(f, "{}", a.display()).unwrap();
        writeln!(f, "{}", b.display()).unwrap();
        let files = resolve_inputs(&manifest).unwrap();
        assert_eq!(files, vec![a, b]);
    }

    #[test]
    fn missing_input_is_an_error() {
        assert!(resolve_inputs(Path::new("/no/such/path")).is_err());
    }

    #[test]
    fn empty_directory_has_no_input_files() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            resolve_inputs(dir.path()),
            Err(ConfigError::NoInputFiles(_))
        ));
    }

    #[test]
    fn stream_files_produces_full_bundle_then_finalizes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("reads.fa");
        fs::write(&path, b">r\nACGTACGT\n").unwrap();
        let queue: SwapQueue<FastBundle> = SwapQueue::new(
            2,
            vec![FastBundle::with_capacity(4096), FastBundle::with_capacity(4096)],
        );
        stream_files(&[path], &queue).unwrap();
        assert!(queue.is_finalized());
        let mut total = Vec::new();
        let mut empty = FastBundle::with_capacity(4096);
        while let Some(bundle) = queue.swap_pop(std::mem::take(&mut empty)) {
            total.extend_from_slice(&bundle.data);
            empty = bundle;
        }
        assert_eq!(total, b">r\nACGTACGT\n");
    }

    #[test]
    fn mixed_fasta_and_fastq_inputs_are_rejected() {
        let files = vec![PathBuf::from("a.fa"), PathBuf::from("b.fastq")];
        assert!(check_uniform_format(&files).is_err());
    }

    #[test]
    fn uniform_fasta_inputs_are_accepted() {
        let files = vec![PathBuf::from("a.fa"), PathBuf::from("b.fasta")];
        assert!(check_uniform_format(&files).is_ok());
    }
}
