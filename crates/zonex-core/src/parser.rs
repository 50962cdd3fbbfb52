//! Record parsing for accepted delegation lines

use crate::classifier::first_token;
use crate::error::{Error, Result};
use crate::record::CandidateRecord;

/// Nameserver record marker
const NS_DELIMITER: &str = " NS ";

/// Extracts the canonical domain name from a delegation line
#[derive(Debug, Clone)]
pub struct RecordParser {
    tld: String,
}

impl RecordParser {
    /// Create a parser that labels every record with `tld`
    pub fn new(tld: impl Into<String>) -> Self {
        Self { tld: tld.into() }
    }

    /// TLD applied to parsed records
    pub fn tld(&self) -> &str {
        &self.tld
    }

    /// Parse an accepted line
    ///
    /// An empty name means the classifier let through a line it should have
    /// rejected; that is reported as [`Error::InvariantViolation`].
    pub fn parse(&self, line: &str) -> Result<CandidateRecord> {
        let head = line.split(NS_DELIMITER).next().unwrap_or("");
        let label = first_token(head);
        if label.is_empty() {
            return Err(Error::invariant(format!(
                "accepted line parsed to an empty name: {:?}",
                line
            )));
        }
        Ok(CandidateRecord::new(self.tld.clone(), label.to_lowercase()))
    }
}
