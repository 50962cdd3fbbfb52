//! Domain record produced by the parser

use serde::{Deserialize, Serialize};

/// A second-level domain extracted from one delegation line
///
/// `name` is already lower-cased. Records are unique on `(name, tld)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CandidateRecord {
    /// TLD label of the run (e.g. "com")
    pub tld: String,
    /// Lower-cased domain label (e.g. "example")
    pub name: String,
}

impl CandidateRecord {
    /// Create a record
    pub fn new(tld: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            tld: tld.into(),
            name: name.into(),
        }
    }

    /// Unique key used by sinks
    pub fn key(&self) -> (&str, &str) {
        (&self.name, &self.tld)
    }
}
