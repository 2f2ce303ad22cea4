//! certaudit - Certificate Authority Audit for Container Images
//!
//! Command-line front end over the `certaudit` library.
//!
//! # Usage
//!
//! ```bash
//! # Flatten an image and list every certificate in it
//! docker export $(docker create alpine:3.19) > image.tar
//! certaudit export image.tar
//!
//! # Validate against .certaudit.yaml, reading the image from stdin
//! docker export $(docker create alpine:3.19) | certaudit validate -
//! ```
//!
//! Exit codes: 0 pass, 1 policy violations, 2 the scan or policy could not be
//! processed.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use certaudit::config::DEFAULT_CONFIG_PATH;
use certaudit::{CertificateScanner, Config, ParsedCertificates, ScanContext, Validator};
use clap::{ArgAction, Parser, Subcommand};
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "certaudit", version, about = "Audit certificate authorities in container images")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List certificates found in an image as JSON
    Export {
        /// Uncompressed image TAR file, or - for stdin
        image: PathBuf,
    },
    /// Validate certificates found in an image against a policy
    Validate {
        /// Uncompressed image TAR file, or - for stdin
        image: PathBuf,

        /// Policy document
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,

        /// Tolerate certificates not on the allow list
        #[arg(long)]
        permissive: bool,

        /// Do not list violations; only the exit code reports the outcome
        #[arg(short, long)]
        quiet: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli.command) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(err) => {
            eprintln!("✗ {:#}", err);
            ExitCode::from(2)
        }
    }
}

/// Log level used when `RUST_LOG` is unset
fn default_log_level(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    }
}

fn init_tracing(verbose: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_log_level(verbose)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// Returns whether the run passed.
fn run(command: Command) -> Result<bool> {
    match command {
        Command::Export { image } => {
            let parsed = scan_image(&image)?;
            println!("{}", certaudit::export::to_json(&parsed)?);
            Ok(true)
        }
        Command::Validate {
            image,
            config,
            permissive,
            quiet,
        } => {
            // Reject a bad policy before spending time on the scan
            let config = Config::from_file(&config)
                .with_context(|| format!("Failed to load policy {}", config.display()))?;
            let validator = Validator::new(&config, permissive).context("Invalid policy")?;

            let parsed = scan_image(&image)?;
            let result = validator.validate(&parsed.found)?;

            if !quiet {
                println!("Policy: {}", validator.describe_config());
                println!("Found {} certificates", parsed.found.len());
                for found in &result.not_allowed_certificates {
                    println!(
                        "✗ Not allowed: {} ({}) sha256={}",
                        found.location,
                        found.subject().unwrap_or_default(),
                        found.sha256_hex()
                    );
                }
                for forbidden in &result.forbidden_certificates {
                    println!(
                        "✗ Forbidden: {} ({}) sha256={}{}",
                        forbidden.certificate.location,
                        forbidden.certificate.subject().unwrap_or_default(),
                        forbidden.certificate.sha256_hex(),
                        describe_comment(forbidden.entry.comment.as_deref())
                    );
                }
                for absent in &result.required_but_absent {
                    let fingerprint = absent
                        .fingerprints
                        .sha256()
                        .map(|s| format!("sha256={}", s))
                        .or_else(|| absent.fingerprints.sha1().map(|s| format!("sha1={}", s)))
                        .unwrap_or_default();
                    println!(
                        "✗ Required but absent: {}{}",
                        fingerprint,
                        describe_comment(absent.comment.as_deref())
                    );
                }
                if result.is_pass() {
                    println!("✓ Image passed");
                }
            }

            Ok(result.is_pass())
        }
    }
}

fn describe_comment(comment: Option<&str>) -> String {
    comment
        .map(|c| format!(" - {}", c))
        .unwrap_or_default()
}

fn open_image(path: &Path) -> Result<Box<dyn Read>> {
    if path == Path::new("-") {
        return Ok(Box::new(io::stdin().lock()));
    }
    let file = File::open(path)
        .with_context(|| format!("Failed to open image archive {}", path.display()))?;
    Ok(Box::new(BufReader::new(file)))
}

fn scan_image(path: &Path) -> Result<ParsedCertificates> {
    let reader = open_image(path)?;
    let scanner = CertificateScanner::default();

    scanner
        .find_certificates(&ScanContext::new(), reader)
        .map_err(|err| {
            if let Some(partial) = err.partial_results() {
                warn!(
                    found = partial.found.len(),
                    partials = partial.partials.len(),
                    "scan aborted before completion"
                );
                for found in &partial.found {
                    warn!(location = %found.location, sha256 = %found.sha256_hex(), "found before abort");
                }
            }
            err
        })
        .with_context(|| format!("Failed to scan image {}", path.display()))
}
