//! End-to-end pipeline scenarios, run against real temp files and the
//! real two-stage pipeline (no mocked components).

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use kbinner::cli::{Cli, OutputFormat, Stage};
use kbinner::config::Config;
use kbinner::pipeline;

fn base_cli(input: PathBuf, output: PathBuf, tmp: PathBuf) -> Cli {
    Cli {
        k: 21,
        m: 2,
        threads: 4,
        memory_mb: 64,
        threshold_min: 1,
        output,
        input,
        tmp,
        gpu: false,
        no_normalize: false,
        coverage: None,
        error_rate: None,
        min_probability: 0.95,
        skip_estimate: true,
        bin_stats_only: None,
        leave_bin_stat: false,
        histogram: false,
        format: OutputFormat::Fasta,
        num_bins: 4,
    }
}

fn write_fasta(dir: &Path, name: &str, records: &[&str]) -> PathBuf {
    let path = dir.join(name);
    let mut contents = String::new();
    for (i, seq) in records.iter().enumerate() {
        contents.push_str(&format!(">r{i}\n{seq}\n"));
    }
    fs::write(&path, contents).unwrap();
    path
}

fn write_fastq(dir: &Path, name: &str, records: &[(&str, &str)]) -> PathBuf {
    let path = dir.join(name);
    let mut contents = String::new();
    for (i, (seq, qual)) in records.iter().enumerate() {
        contents.push_str(&format!("@r{i}\n{seq}\n+\n{qual}\n"));
    }
    fs::write(&path, contents).unwrap();
    path
}

fn parse_fasta_output(path: &Path) -> HashMap<String, u32> {
    let contents = fs::read_to_string(path).unwrap();
    let mut lines = contents.lines();
    let mut out = HashMap::new();
    while let (Some(count_line), Some(kmer_line)) = (lines.next(), lines.next()) {
        let count: u32 = count_line.trim_start_matches('>').parse().unwrap();
        out.insert(kmer_line.to_string(), count);
    }
    out
}

/// E1: single read, normalization off, no reliability band.
#[test]
fn e1_single_read_raw_counts() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_fasta(dir.path(), "in.fa", &["ACGTACGT"]);
    let output = dir.path().join("out.fa");
    let tmp = dir.path().join("tmp");

    let mut cli = base_cli(input, output.clone(), tmp);
    cli.k = 3;
    cli.m = 2;
    cli.no_normalize = true;
    cli.threshold_min = 1;

    let config = Config::build(cli).unwrap();
    let summary = pipeline::run(&config).unwrap().expect("stage 2 ran");
    assert_eq!(summary.distinct_kmers_emitted, 4);

    let counts = parse_fasta_output(&output);
    assert_eq!(counts.len(), 4);
    assert_eq!(counts.get("ACG"), Some(&2));
    assert_eq!(counts.get("CGT"), Some(&2));
    assert_eq!(counts.get("GTA"), Some(&1));
    assert_eq!(counts.get("TAC"), Some(&1));
}

/// E2: canonicalization merges a read with its reverse complement.
#[test]
fn e2_canonicalization_merges_reverse_complement() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_fasta(dir.path(), "in.fa", &["AAAA", "TTTT"]);
    let output = dir.path().join("out.fa");
    let tmp = dir.path().join("tmp");

    let mut cli = base_cli(input, output.clone(), tmp);
    cli.k = 4;
    cli.m = 2;
    cli.no_normalize = false;
    cli.threshold_min = 1;

    let config = Config::build(cli).unwrap();
    pipeline::run(&config).unwrap();

    let counts = parse_fasta_output(&output);
    assert_eq!(counts.len(), 1);
    assert_eq!(counts.get("AAAA"), Some(&2));
}

/// E3: an N splits a read into two super-mers, each with exactly one k-mer.
#[test]
fn e3_ambiguous_base_splits_read() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_fasta(dir.path(), "in.fa", &["ACGNACG"]);
    let output = dir.path().join("out.fa");
    let tmp = dir.path().join("tmp");

    let mut cli = base_cli(input, output.clone(), tmp);
    cli.k = 3;
    cli.m = 2;
    cli.threshold_min = 1;

    let config = Config::build(cli).unwrap();
    pipeline::run(&config).unwrap();

    let counts = parse_fasta_output(&output);
    assert_eq!(counts.len(), 1);
    assert_eq!(counts.get("ACG"), Some(&2));
}

/// E4: high repeat count, raw (non-canonical) counting, all three windows
/// of "ACGT" survive `threshold_min`.
#[test]
fn e4_repeated_read_all_windows_survive_threshold() {
    let dir = tempfile::tempdir().unwrap();
    let records: Vec<&str> = std::iter::repeat("ACGT").take(1000).collect();
    let input = write_fasta(dir.path(), "in.fa", &records);
    let output = dir.path().join("out.fa");
    let tmp = dir.path().join("tmp");

    let mut cli = base_cli(input, output.clone(), tmp);
    cli.k = 2;
    cli.m = 1;
    cli.no_normalize = true;
    cli.threshold_min = 5;
    cli.skip_estimate = true; // band stays None: threshold_min alone gates output

    let config = Config::build(cli).unwrap();
    pipeline::run(&config).unwrap();

    let counts = parse_fasta_output(&output);
    assert_eq!(counts.get("AC"), Some(&1000));
    assert_eq!(counts.get("CG"), Some(&1000));
    assert_eq!(counts.get("GT"), Some(&1000));
}

/// E5: a FASTQ input's quality scores feed the error-rate estimator, and
/// the resulting reliability band is non-degenerate and actually filters.
#[test]
fn e5_fastq_quality_drives_reliability_band() {
    let dir = tempfile::tempdir().unwrap();
    let seq = "ACGTACGTACGTACGTACGTACGTACGTACGTACGTACGT";
    let qual = "I".repeat(seq.len()); // Phred 40, low error rate
    let input = write_fastq(dir.path(), "in.fastq", &[(seq, &qual)]);
    let output = dir.path().join("out.fa");
    let tmp = dir.path().join("tmp");

    let mut cli = base_cli(input, output.clone(), tmp);
    cli.k = 5;
    cli.m = 2;
    cli.threshold_min = 1;
    cli.coverage = Some(30.0);
    cli.skip_estimate = false;
    cli.error_rate = None;
    cli.leave_bin_stat = true;

    let config = Config::build(cli).unwrap();
    assert!(config.error_rate.is_none());
    let summary = pipeline::run(&config).unwrap().expect("stage 2 ran");
    assert!(summary.distinct_kmers_emitted > 0);

    // Stage 1 persisted its quality-derived estimate; high-quality bases
    // (Phred 40) should clamp to the estimator's floor.
    let estimate: f64 = fs::read_to_string(config.error_rate_path()).unwrap().trim().parse().unwrap();
    assert!((0.001..=0.5).contains(&estimate));

    let band = kbinner::reliability::bounds(config.coverage, estimate, config.k.get(), config.min_probability);
    assert!(band.0 >= 2);
    assert!(band.1 >= band.0);
}

/// E6: running the two stages separately against the same `--tmp` produces
/// the same set of records as a one-shot run.
#[test]
fn e6_split_stage_matches_one_shot() {
    let records: Vec<String> = (0..50)
        .map(|i| format!("ACGTTGCAACGTTGCAACGTTGCA{}", "ACGT".repeat(i % 5 + 1)))
        .collect();
    let record_refs: Vec<&str> = records.iter().map(String::as_str).collect();

    // One-shot run.
    let one_shot_dir = tempfile::tempdir().unwrap();
    let input_a = write_fasta(one_shot_dir.path(), "in.fa", &record_refs);
    let output_a = one_shot_dir.path().join("out.fa");
    let tmp_a = one_shot_dir.path().join("tmp");
    let mut cli_a = base_cli(input_a, output_a.clone(), tmp_a);
    cli_a.k = 11;
    cli_a.m = 4;
    cli_a.num_bins = 8;
    let config_a = Config::build(cli_a).unwrap();
    pipeline::run(&config_a).unwrap();

    // Split-stage run against a fresh tmp/output, same input content.
    let split_dir = tempfile::tempdir().unwrap();
    let input_b = write_fasta(split_dir.path(), "in.fa", &record_refs);
    let output_b = split_dir.path().join("out.fa");
    let tmp_b = split_dir.path().join("tmp");

    let mut stage1_cli = base_cli(input_b.clone(), output_b.clone(), tmp_b.clone());
    stage1_cli.k = 11;
    stage1_cli.m = 4;
    stage1_cli.num_bins = 8;
    stage1_cli.bin_stats_only = Some(Stage::One);
    stage1_cli.leave_bin_stat = true;
    let config_stage1 = Config::build(stage1_cli).unwrap();
    pipeline::run(&config_stage1).unwrap();

    let mut stage2_cli = base_cli(input_b, output_b.clone(), tmp_b);
    stage2_cli.k = 11;
    stage2_cli.m = 4;
    stage2_cli.num_bins = 8;
    stage2_cli.bin_stats_only = Some(Stage::Two);
    let config_stage2 = Config::build(stage2_cli).unwrap();
    pipeline::run(&config_stage2).unwrap();

    let one_shot = parse_fasta_output(&output_a);
    let split = parse_fasta_output(&output_b);
    assert_eq!(one_shot, split);
}
