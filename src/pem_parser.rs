//! PEM certificate parser.
//!
//! Scans an entry's bytes for `-----BEGIN CERTIFICATE-----` /
//! `-----END CERTIFICATE-----` blocks and decodes each as X.509; blocks that
//! are framed like a certificate but fail to decode become partials. Other
//! labels (keys, CSRs, CRLs) are ignored.
//!
//! In-memory entries are scanned in place. Spooled entries are read in
//! fixed-size windows, carrying an unfinished block over into the next
//! window, so memory stays bounded however large the entry is.

use std::io::Read;

use anyhow::{Context, Result};
use memchr::memmem;
use openssl::x509::X509;
use tracing::warn;

use crate::certificate::{FoundCertificate, ParsedCertificates, PartialCertificate};
use crate::context::ScanContext;
use crate::parser::CertificateParser;
use crate::spool::EntryBuffer;

pub const PEM_PARSER_NAME: &str = "pem";

const BEGIN_MARKER: &[u8] = b"-----BEGIN ";
const END_CERTIFICATE_MARKER: &[u8] = b"-----END CERTIFICATE-----";
const DASHES: &[u8] = b"-----";
const CERTIFICATE_LABEL: &[u8] = b"CERTIFICATE";

/// How a spooled entry is streamed through the block scanner
#[derive(Debug, Clone, Copy)]
struct Windowing {
    /// Bytes read from the entry per step
    window_len: usize,
    /// An unfinished block older than this is dropped instead of carried over
    max_block_len: usize,
}

const SPOOLED_WINDOWING: Windowing = Windowing {
    window_len: 8 << 20,
    max_block_len: 1 << 20,
};

#[derive(Debug, Default, Clone, Copy)]
pub struct PemParser;

impl CertificateParser for PemParser {
    fn name(&self) -> &'static str {
        PEM_PARSER_NAME
    }

    fn find(
        &self,
        ctx: &ScanContext,
        location: &str,
        entry: &EntryBuffer,
    ) -> Result<ParsedCertificates> {
        let mut parsed = ParsedCertificates::default();

        match entry {
            EntryBuffer::Memory(contents) => {
                scan_window(ctx, location, contents, &mut parsed)?;
            }
            EntryBuffer::Spooled(_) => {
                let reader = entry
                    .open()
                    .with_context(|| format!("failed to open {}", location))?;
                scan_reader(ctx, location, reader, SPOOLED_WINDOWING, &mut parsed)?;
            }
        }

        Ok(parsed)
    }
}

/// Stream `reader` through the block scanner one window at a time.
fn scan_reader<R: Read>(
    ctx: &ScanContext,
    location: &str,
    mut reader: R,
    windowing: Windowing,
    parsed: &mut ParsedCertificates,
) -> Result<()> {
    let mut window = Vec::new();
    loop {
        let read = reader
            .by_ref()
            .take(windowing.window_len as u64)
            .read_to_end(&mut window)
            .with_context(|| format!("failed to read {}", location))?;

        let resume = scan_window(ctx, location, &window, parsed)?;
        if read < windowing.window_len || ctx.is_cancelled() {
            return Ok(());
        }
        let keep_from = carry_over_start(&window, resume, windowing.max_block_len);
        window.drain(..keep_from);
    }
}

/// Offset from which a window is kept for the next step. An unfinished block
/// that started more than `max_block_len` bytes before the end of the window
/// is abandoned.
fn carry_over_start(window: &[u8], resume: usize, max_block_len: usize) -> usize {
    let oldest = window.len().saturating_sub(max_block_len);
    if resume >= oldest {
        return resume;
    }
    memmem::find(&window[oldest..], BEGIN_MARKER)
        .map_or_else(|| partial_marker_start(window.len()), |offset| oldest + offset)
}

/// Earliest offset at which a `BEGIN` marker cut off by the end of the data
/// could start.
fn partial_marker_start(len: usize) -> usize {
    len.saturating_sub(BEGIN_MARKER.len() - 1)
}

/// Decode every complete certificate block in `data`. Returns the offset of
/// the first byte that could still start a block once more data follows.
fn scan_window(
    ctx: &ScanContext,
    location: &str,
    data: &[u8],
    parsed: &mut ParsedCertificates,
) -> Result<usize> {
    let mut blocks = PemBlocks::new(data);
    for raw in blocks.by_ref() {
        if ctx.is_cancelled() {
            break;
        }

        match decode_certificate(raw) {
            Ok(certificate) => {
                let found = FoundCertificate::from_x509(location, PEM_PARSER_NAME, certificate)
                    .with_context(|| format!("failed to fingerprint certificate in {}", location))?;
                parsed.found.push(found);
            }
            Err(reason) => {
                warn!(location, reason = %reason, "partial certificate");
                parsed.partials.push(PartialCertificate {
                    location: location.to_string(),
                    parser: PEM_PARSER_NAME.to_string(),
                    reason,
                });
            }
        }
    }

    Ok(blocks.resume_offset())
}

/// Decode one framed PEM block as an X.509 certificate, returning the
/// human-readable reason on failure.
fn decode_certificate(raw: &[u8]) -> std::result::Result<X509, String> {
    let block = pem::parse(raw).map_err(|e| format!("failed to decode PEM block: {}", e))?;
    let der = block.contents();
    let certificate =
        X509::from_der(der).map_err(|e| format!("failed to parse certificate: {}", e))?;

    // OpenSSL stops at the end of the certificate structure; anything after it
    // means the block was not a single well-formed certificate.
    let encoded_len = certificate
        .to_der()
        .map_err(|e| format!("failed to re-encode certificate: {}", e))?
        .len();
    if encoded_len != der.len() {
        return Err(format!(
            "failed to parse certificate: {} bytes of trailing data",
            der.len() - encoded_len.min(der.len())
        ));
    }

    Ok(certificate)
}

/// Iterator over `CERTIFICATE` blocks (markers included) embedded anywhere in
/// a byte slice. Blocks with a broken header line or no matching `END` marker
/// are skipped.
///
/// Runs in linear time: the position of the next `END` marker is remembered,
/// so a run of unterminated `BEGIN` lines never rescans the remaining data.
struct PemBlocks<'a> {
    data: &'a [u8],
    pos: usize,
    begin: memmem::Finder<'static>,
    end: memmem::Finder<'static>,
    /// Result of the last `END` search: `Some(None)` once no marker remains
    next_end: Option<Option<usize>>,
    /// End of the last block returned
    consumed: usize,
    /// Start of a block that may still be completed by data past the slice
    pending: Option<usize>,
}

impl<'a> PemBlocks<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            begin: memmem::Finder::new(BEGIN_MARKER),
            end: memmem::Finder::new(END_CERTIFICATE_MARKER),
            next_end: None,
            consumed: 0,
            pending: None,
        }
    }

    /// Offset of the first `END CERTIFICATE` marker at or after `from`
    fn certificate_end(&mut self, from: usize) -> Option<usize> {
        match self.next_end {
            Some(Some(end)) if end >= from => return Some(end),
            Some(None) => return None,
            _ => {}
        }
        let found = self.end.find(&self.data[from..]).map(|offset| from + offset);
        self.next_end = Some(found);
        found
    }

    fn resume_offset(&self) -> usize {
        self.pending
            .unwrap_or_else(|| partial_marker_start(self.data.len()))
            .max(self.consumed)
    }
}

impl<'a> Iterator for PemBlocks<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        let data = self.data;
        loop {
            let start = self.pos + self.begin.find(&data[self.pos..])?;
            let label_start = start + BEGIN_MARKER.len();

            let Some(label_len) = memmem::find(&data[label_start..], DASHES) else {
                self.pending = Some(start);
                self.pos = data.len();
                return None;
            };
            if &data[label_start..label_start + label_len] != CERTIFICATE_LABEL {
                self.pos = label_start;
                continue;
            }

            let body_start = label_start + label_len + DASHES.len();
            let Some(end_start) = self.certificate_end(body_start) else {
                // No later block can be terminated either
                self.pending = Some(start);
                self.pos = data.len();
                return None;
            };

            // Another block starts before this one ends: this BEGIN is unterminated
            if self.begin.find(&data[body_start..end_start]).is_some() {
                self.pos = label_start;
                continue;
            }

            let end = end_start + END_CERTIFICATE_MARKER.len();
            self.pos = end;
            self.consumed = end;
            return Some(&data[start..end]);
        }
    }
}
