use clap::Parser;
use covsession::CoverageResult;
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about = "A tool to read and summarize coverage session reports.", long_about = None)]
struct Args {
    /// Path to a .cov report, or a directory of reports
    #[arg(required = true)]
    path: PathBuf,
}

fn main() {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let reports = if args.path.is_dir() {
        match covsession::find_reports(&args.path) {
            Ok(reports) => reports,
            Err(e) => {
                eprintln!(
                    "Error: Failed to list reports in '{}': {}",
                    args.path.display(),
                    e
                );
                process::exit(1);
            }
        }
    } else {
        vec![args.path.clone()]
    };

    if reports.is_empty() {
        println!("No reports found in: {}", args.path.display());
        return;
    }

    let mut failed = false;
    for report in &reports {
        match covsession::from_file(report) {
            Ok(result) => print_summary(report, &result),
            Err(e) => {
                eprintln!(
                    "Error: Failed to parse report '{}': {}",
                    report.display(),
                    e
                );
                failed = true;
            }
        }
    }

    if failed {
        process::exit(1);
    }
}

fn print_summary(path: &Path, result: &CoverageResult) {
    println!("=== Coverage Report ===");
    println!("File: {}", path.display());
    println!("Version: {}", result.header.version);
    println!("Session: {}", result.header.session_id);
    println!("Files In Scope: {}", result.files.len());
    println!("Files Executed: {}", result.get_coverage_stats().len());
    println!("Covered Lines: {}", result.lines.len());
    println!("Total Hits: {}", result.total_hits());
    println!();
}
