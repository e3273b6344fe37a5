mod b;
mod balance;
mod checkpoint;
mod coordinator;
mod error;
mod formula;
mod p2;
mod pi_table;
mod primes;
mod reduce;
mod status;
mod storage;
mod sweep;

use clap::{Parser, Subcommand};
use rug::Integer;
use std::time::Instant;

use crate::checkpoint::CheckpointStore;
use crate::formula::RunOptions;
use crate::status::Status;

#[derive(Parser)]
#[command(name = "pix")]
#[command(about = "Exact prime-counting sums via chunked parallel sweeps", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "2nd partial sieve function P2(x, y)")]
    P2 {
        #[arg(help = "The large argument x")]
        x: String,
        #[arg(help = "Lower prime bound y")]
        y: u64,
        #[arg(short, long, help = "Number of worker threads")]
        threads: Option<usize>,
        #[arg(short, long, help = "Suppress status output")]
        quiet: bool,
        #[arg(long, help = "Ignore any stored checkpoint and start over")]
        fresh: bool,
        #[arg(long, help = "Pull-based worker pool instead of per-round barriers")]
        pool: bool,
    },
    #[command(about = "Gourdon's B(x, y) partial sum")]
    B {
        #[arg(help = "The large argument x")]
        x: String,
        #[arg(help = "Lower prime bound y")]
        y: u64,
        #[arg(short, long, help = "Number of worker threads")]
        threads: Option<usize>,
        #[arg(short, long, help = "Suppress status output")]
        quiet: bool,
        #[arg(long, help = "Ignore any stored checkpoint and start over")]
        fresh: bool,
        #[arg(long, help = "Pull-based worker pool instead of per-round barriers")]
        pool: bool,
    },
    #[command(about = "Count primes <= limit with the segmented pi table")]
    Pi {
        #[arg(help = "Count primes up to this limit")]
        limit: u64,
        #[arg(short, long, help = "Number of worker threads")]
        threads: Option<usize>,
        #[arg(short, long, help = "Suppress status output")]
        quiet: bool,
    },
}

fn default_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn parse_x(x: &str) -> Integer {
    match Integer::from_str_radix(x, 10) {
        Ok(value) => value,
        Err(e) => {
            eprintln!("Invalid x '{}': {}", x, e);
            std::process::exit(1);
        }
    }
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::P2 {
            x,
            y,
            threads,
            quiet,
            fresh,
            pool,
        } => {
            let x = parse_x(&x);
            let opts = RunOptions {
                threads: threads.unwrap_or_else(default_threads),
                quiet,
                fresh,
                pool,
            };
            let mut store = CheckpointStore::new();
            let start = Instant::now();

            match p2::p2(&x, y, &mut store, &opts) {
                Ok(sum) => {
                    println!("P2({}, {}) = {}", x, y, sum);
                    report_duration(start);
                }
                Err(e) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::B {
            x,
            y,
            threads,
            quiet,
            fresh,
            pool,
        } => {
            let x = parse_x(&x);
            let opts = RunOptions {
                threads: threads.unwrap_or_else(default_threads),
                quiet,
                fresh,
                pool,
            };
            let mut store = CheckpointStore::new();
            let start = Instant::now();

            match b::b(&x, y, &mut store, &opts) {
                Ok(sum) => {
                    println!("B({}, {}) = {}", x, y, sum);
                    report_duration(start);
                }
                Err(e) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Pi {
            limit,
            threads,
            quiet,
        } => {
            let threads = threads.unwrap_or_else(default_threads);
            let start = Instant::now();

            let mut status = Status::new(&Integer::from(limit), !quiet);
            let count = pi_table::count_primes(limit, threads, &mut status);
            status.finish();

            println!("pi({}) = {}", limit, count);
            report_duration(start);

            let seconds = start.elapsed().as_secs_f64();
            if let Err(e) =
                storage::log_execution("pi", &format!("limit={}", limit), &count.to_string(), seconds)
            {
                eprintln!("Warning: Failed to log execution: {}", e);
            }
        }
    }
}

fn report_duration(start: Instant) {
    let duration_us = start.elapsed().as_micros();
    println!(
        "Execution time: {}us ({:.2}ms)",
        duration_us,
        duration_us as f64 / 1000.0
    );
}
