//! Image archive scanner.
//!
//! Walks an uncompressed TAR stream one header at a time. Each regular file
//! is buffered (see [`crate::spool`]) and handed to every registered parser on
//! its own thread; the scanner waits for all of them before releasing the
//! buffer and moving on, so at most one entry is held at a time.
//!
//! ```text
//! header ─► regular file? ─► EntryBuffer ─┬─► parser A ─┐
//!                                         ├─► parser B ─┼─► channel ─► merge ─► next header
//!                                         └─► parser C ─┘
//! ```
//!
//! Any parser error aborts the scan: certificate presence claims must be
//! complete, so a scan that skipped a file is never reported as successful.

use std::io::Read;
use std::path::{Component, Path};
use std::thread;

use tar::{Archive, EntryType};
use tracing::{debug, info};

use crate::certificate::ParsedCertificates;
use crate::context::ScanContext;
use crate::error::ScanError;
use crate::parser::{default_parsers, CertificateParser};
use crate::spool::{EntryBuffer, SpoolConfig};

/// Scans container image archives for certificates
pub struct CertificateScanner {
    parsers: Vec<Box<dyn CertificateParser>>,
    spool: SpoolConfig,
}

impl Default for CertificateScanner {
    fn default() -> Self {
        Self::new(SpoolConfig::default())
    }
}

impl CertificateScanner {
    /// Create a scanner with the default parsers
    pub fn new(spool: SpoolConfig) -> Self {
        Self::with_parsers(spool, default_parsers())
    }

    /// Create a scanner with an explicit parser list
    pub fn with_parsers(spool: SpoolConfig, parsers: Vec<Box<dyn CertificateParser>>) -> Self {
        Self { parsers, spool }
    }

    /// Add a parser. It runs alongside the existing ones on every entry.
    pub fn register(&mut self, parser: Box<dyn CertificateParser>) {
        self.parsers.push(parser);
    }

    pub fn parser_names(&self) -> Vec<&'static str> {
        self.parsers.iter().map(|parser| parser.name()).collect()
    }

    /// Scan a container image, given as an uncompressed TAR stream, for certificates
    ///
    /// # Arguments
    /// * `ctx` - Cancellation signal, checked after each entry
    /// * `image_tar` - The flattened image filesystem
    ///
    /// # Returns
    /// * `Result<ParsedCertificates, ScanError>` - All findings, in archive order. A parser
    ///   failure returns [`ScanError::Parser`] carrying the findings gathered so far.
    pub fn find_certificates<R: Read>(
        &self,
        ctx: &ScanContext,
        image_tar: R,
    ) -> Result<ParsedCertificates, ScanError> {
        let mut archive = Archive::new(image_tar);
        let mut parsed = ParsedCertificates::default();
        let mut files_scanned = 0usize;

        for entry in archive.entries().map_err(ScanError::Archive)? {
            let entry = entry.map_err(ScanError::Archive)?;

            match entry.header().entry_type() {
                EntryType::Regular => {}
                _ => {
                    // Skip non-regular files
                    continue;
                }
            }

            let entry_path = entry.path().map_err(ScanError::Archive)?.into_owned();
            let location = image_location(&entry_path);
            let size = entry.size();

            let buffer = self
                .spool
                .buffer(&entry_path, size, entry)
                .map_err(|source| ScanError::Spool {
                    location: location.clone(),
                    source,
                })?;
            debug!(location = %location, size, spooled = buffer.is_spooled(), "scanning image file");

            let mut errors = self.run_parsers(ctx, &location, &buffer, &mut parsed);

            if ctx.is_cancelled() {
                return Err(ScanError::Cancelled);
            }

            if let Err(err) = buffer.release() {
                errors.push(format!(
                    "failed to remove temporary file for {}: {}",
                    location, err
                ));
            }

            if !errors.is_empty() {
                return Err(ScanError::Parser {
                    message: errors.join("; "),
                    parsed: Box::new(parsed),
                });
            }
            files_scanned += 1;
        }

        info!(
            files_scanned,
            found = parsed.found.len(),
            partials = parsed.partials.len(),
            "image scan complete"
        );
        Ok(parsed)
    }

    /// Run every parser against one entry and merge their results in
    /// registration order. Returns the error messages of failed parsers.
    fn run_parsers(
        &self,
        ctx: &ScanContext,
        location: &str,
        buffer: &EntryBuffer,
        parsed: &mut ParsedCertificates,
    ) -> Vec<String> {
        let (tx, rx) = crossbeam_channel::unbounded();

        thread::scope(|scope| {
            for (index, parser) in self.parsers.iter().enumerate() {
                let tx = tx.clone();
                scope.spawn(move || {
                    // The receiver outlives the scope, so send cannot fail
                    let _ = tx.send((index, parser.find(ctx, location, buffer)));
                });
            }
        });
        drop(tx);

        let mut outcomes: Vec<_> = rx.iter().collect();
        outcomes.sort_by_key(|(index, _)| *index);

        let mut errors = Vec::new();
        for (index, outcome) in outcomes {
            match outcome {
                Ok(parser_parsed) => parsed.merge(parser_parsed),
                Err(err) => errors.push(format!("{}: {:#}", self.parsers[index].name(), err)),
            }
        }
        errors
    }
}

/// Absolute, cleaned location of an archive entry inside the image:
/// `./etc/ssl/cert.pem` becomes `/etc/ssl/cert.pem`.
pub fn image_location(entry_path: &Path) -> String {
    let mut parts: Vec<String> = Vec::new();
    for component in entry_path.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::ParentDir => {
                parts.pop();
            }
            _ => {}
        }
    }
    format!("/{}", parts.join("/"))
}
