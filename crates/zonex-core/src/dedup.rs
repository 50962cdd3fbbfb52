//! Windowed deduplication of candidate records
//!
//! Three policies are supported:
//!
//! - **Proximity**: a candidate is dropped when it equals its immediate
//!   predecessor. Catches the common run of NS lines for one domain, but not
//!   duplicates separated by other lines.
//! - **BatchSet**: at each drain, only the first occurrence of every name in
//!   the batch is kept, in insertion order.
//! - **SinkEnforced**: nothing is dropped here; the sink's unique constraint
//!   is the authority.
//!
//! Neither pipeline policy is global across a whole file, several shard files
//! or several runs, so the sink's insert-or-ignore contract remains the last
//! line of defence in every mode.
//!
//! A drain before the stream is exhausted always retains the most recent
//! candidate. It is excluded from that drain's dedup pass and becomes the
//! first element of the next window.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::record::CandidateRecord;

/// Dedup strategy applied before records reach the sink
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupPolicy {
    /// Drop a candidate equal to its immediate predecessor
    #[default]
    Proximity,
    /// Keep the first occurrence of each name per window
    BatchSet,
    /// Forward everything; rely on the sink's unique index
    SinkEnforced,
}

/// Insertion-ordered set of names
///
/// First-occurrence dedup must not depend on hash iteration order, so
/// membership and order are tracked separately.
#[derive(Debug, Default)]
pub struct OrderedNameSet {
    seen: HashSet<String>,
    order: Vec<String>,
}

impl OrderedNameSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a name, returning `false` if it was already present
    pub fn insert(&mut self, name: &str) -> bool {
        if self.seen.contains(name) {
            return false;
        }
        self.seen.insert(name.to_string());
        self.order.push(name.to_string());
        true
    }

    /// Whether the name is present
    pub fn contains(&self, name: &str) -> bool {
        self.seen.contains(name)
    }

    /// Number of distinct names
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Names in first-insertion order
    pub fn into_vec(self) -> Vec<String> {
        self.order
    }
}

/// Result of a window drain
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Drained {
    /// Records to forward to the sink, in processing order
    pub records: Vec<CandidateRecord>,
    /// Candidates discarded since the previous drain
    pub duplicates: u64,
}

/// Pending candidates between two drains
#[derive(Debug)]
pub struct DedupWindow {
    policy: DedupPolicy,
    pending: Vec<CandidateRecord>,
    dropped_since_drain: u64,
}

impl DedupWindow {
    /// Create an empty window
    pub fn new(policy: DedupPolicy) -> Self {
        Self {
            policy,
            pending: Vec::new(),
            dropped_since_drain: 0,
        }
    }

    /// Active policy
    pub fn policy(&self) -> DedupPolicy {
        self.policy
    }

    /// Add a candidate from a closed line
    ///
    /// Returns `false` when proximity dedup drops it on entry.
    pub fn push(&mut self, record: CandidateRecord) -> bool {
        if self.policy == DedupPolicy::Proximity
            && self.pending.last().is_some_and(|last| last.name == record.name)
        {
            self.dropped_since_drain += 1;
            return false;
        }
        self.pending.push(record);
        true
    }

    /// Candidates waiting for the next drain, including a retained tail
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Release the window's records
    ///
    /// Unless `stream_exhausted`, the most recent candidate stays behind.
    pub fn drain(&mut self, stream_exhausted: bool) -> Drained {
        let mut batch = std::mem::take(&mut self.pending);
        let retained = if stream_exhausted { None } else { batch.pop() };

        let mut duplicates = std::mem::take(&mut self.dropped_since_drain);
        let records = match self.policy {
            DedupPolicy::BatchSet => {
                let before = batch.len();
                let mut names = OrderedNameSet::new();
                batch.retain(|record| names.insert(&record.name));
                duplicates += (before - batch.len()) as u64;
                batch
            }
            DedupPolicy::Proximity | DedupPolicy::SinkEnforced => batch,
        };

        self.pending.extend(retained);
        Drained {
            records,
            duplicates,
        }
    }
}

/// Drop names equal to their immediate predecessor
pub fn dedup_proximity<S: AsRef<str>>(names: &[S]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(names.len());
    for name in names {
        let name = name.as_ref();
        if out.last().is_some_and(|last| last == name) {
            continue;
        }
        out.push(name.to_string());
    }
    out
}

/// Keep the first occurrence of each name, returning the survivors and the
/// number discarded
pub fn dedup_batch_set<S: AsRef<str>>(names: &[S]) -> (Vec<String>, u64) {
    let mut set = OrderedNameSet::new();
    for name in names {
        set.insert(name.as_ref());
    }
    let discarded = (names.len() - set.len()) as u64;
    (set.into_vec(), discarded)
}
