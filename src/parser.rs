//! Certificate parser capability.
//!
//! A parser looks at one archive entry and reports the certificates it
//! recognises. The scanner runs every registered parser concurrently against
//! the same entry, handing each one the shared [`EntryBuffer`] so it can open
//! its own reader.

use anyhow::Result;

use crate::certificate::ParsedCertificates;
use crate::context::ScanContext;
use crate::pem_parser::PemParser;
use crate::spool::EntryBuffer;

/// Implemented by X.509 certificate parsers.
///
/// Implementations must not keep readers opened from `entry` beyond the call.
/// An error is scoped to the entry being parsed; the scanner decides what it
/// means for the scan as a whole.
pub trait CertificateParser: Send + Sync {
    /// Short identifier recorded on every finding, e.g. `pem`
    fn name(&self) -> &'static str;

    /// Find certificates in one archive entry
    ///
    /// # Arguments
    /// * `ctx` - Cancellation signal for the scan
    /// * `location` - Absolute path of the entry inside the image
    /// * `entry` - Factory for independent readers over the entry's content
    ///
    /// # Returns
    /// * `Result<ParsedCertificates>` - Found and partial certificates in this entry
    fn find(
        &self,
        ctx: &ScanContext,
        location: &str,
        entry: &EntryBuffer,
    ) -> Result<ParsedCertificates>;
}

/// Parsers registered when a scanner is built without an explicit list.
pub fn default_parsers() -> Vec<Box<dyn CertificateParser>> {
    vec![Box::new(PemParser)]
}
