//! Line classification
//!
//! Zone files interleave delegation lines with SOA/NS glue, comments and
//! directives. Only lines whose first token is a clean label are real
//! second-level delegations.

use crate::config::FilterConfig;

/// Why a line was rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// Zero-length line
    Empty,
    /// Line starts with a reserved prefix
    ReservedPrefix(String),
    /// First token contains a forbidden character
    ForbiddenChar(char),
}

/// Decides whether a raw line is an extractable delegation
#[derive(Debug, Clone)]
pub struct LineFilter {
    leading: Vec<String>,
    forbidden: Vec<char>,
}

impl LineFilter {
    /// Build a filter from explicit tables
    pub fn new(leading: Vec<String>, forbidden: Vec<char>) -> Self {
        Self { leading, forbidden }
    }

    /// Build a filter from configuration
    ///
    /// When the config leaves the leading tokens unset, the built-in set is
    /// used with the zone apex for `tld`.
    pub fn from_config(config: &FilterConfig, tld: &str) -> Self {
        let leading = config
            .forbidden_leading_tokens
            .clone()
            .unwrap_or_else(|| default_leading_tokens(tld));
        Self::new(leading, config.forbidden_substrings.clone())
    }

    /// Check a line, reporting the first reason it is rejected
    pub fn classify(&self, line: &str) -> Result<(), Rejection> {
        if line.is_empty() {
            return Err(Rejection::Empty);
        }

        if let Some(prefix) = self.leading.iter().find(|p| line.starts_with(p.as_str())) {
            return Err(Rejection::ReservedPrefix(prefix.clone()));
        }

        let first = first_token(line);
        if let Some(c) = self.forbidden.iter().find(|c| first.contains(**c)) {
            return Err(Rejection::ForbiddenChar(*c));
        }

        Ok(())
    }

    /// Whether the line is a real delegation record
    pub fn accept(&self, line: &str) -> bool {
        self.classify(line).is_ok()
    }
}

/// Reserved prefixes: leading whitespace, the zone apex, `@`, directives and
/// comments
pub fn default_leading_tokens(tld: &str) -> Vec<String> {
    vec![
        " ".to_string(),
        "\t".to_string(),
        format!("{}. ", tld.to_uppercase()),
        "@".to_string(),
        "$".to_string(),
        ";".to_string(),
    ]
}

/// First whitespace-delimited token of a line
pub(crate) fn first_token(line: &str) -> &str {
    line.split(|c: char| c.is_ascii_whitespace())
        .next()
        .unwrap_or("")
}
