#![allow(clippy::too_many_lines)]

use std::process;

use clap::Parser;
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use kbinner::cli::Cli;
use kbinner::config::Config;
use kbinner::pipeline;

/// `RUST_LOG=kbinner=debug` enables debug-level tracing.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
}

fn main() {
    init_tracing();

    let cli = Cli::parse();
    let config = match Config::build(cli) {
        Ok(config) => config,
        Err(err) => fail(err.into()),
    };

    print_parameter_summary(&config);

    match pipeline::run(&config) {
        Ok(summary) => {
            if let Some(summary) = summary {
                print_run_summary(&summary);
            }
        }
        Err(err) => fail(err),
    }
}

fn print_parameter_summary(config: &Config) {
    println!(
        "{} k={} m={} bins={} threads={} memory={}MB",
        "kbinner".bold(),
        config.k,
        config.m,
        config.num_bins,
        config.threads,
        config.memory_mb
    );
}

fn print_run_summary(summary: &pipeline::RunSummary) {
    println!(
        "{} {} reads, {} bases, {} distinct k-mers emitted (total count {})",
        "done:".green().bold(),
        summary.sequences_processed,
        summary.bases_processed,
        summary.distinct_kmers_emitted,
        summary.total_count_emitted,
    );
}

fn fail(err: kbinner::PipelineError) -> ! {
    eprintln!("{} {err}", "error:".red().bold());
    process::exit(err.exit_code());
}
