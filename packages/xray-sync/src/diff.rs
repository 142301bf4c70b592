//! Inventory differ
//!
//! Pairs remote test records with local declarations and derives the work a
//! sync run has to do. A local record carrying a key found in the inventory
//! is paired with that record. Otherwise records are paired by unique
//! identifier when both sides carry one, else by summary. Pure and
//! synchronous.

use crate::config::DuplicateKeyPolicy;
use crate::error::{InventorySide, Result, SyncError};
use crate::model::{OperationKind, TestRecord};
use std::collections::{HashMap, HashSet};

/// Work derived from comparing the remote inventory with local declarations
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InventoryDiff {
    /// Remote records no local declaration matches
    pub to_delete: Vec<TestRecord>,
    /// Local declarations no remote record matches
    pub to_create: Vec<TestRecord>,
    /// Matched remote records carrying the local description and requirements
    pub to_update: Vec<TestRecord>,
}

impl InventoryDiff {
    pub fn is_empty(&self) -> bool {
        self.to_delete.is_empty() && self.to_create.is_empty() && self.to_update.is_empty()
    }
}

/// Every work item of one sync run, grouped by phase
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
    pub marked: Vec<TestRecord>,
    pub obsolete: Vec<TestRecord>,
    pub create: Vec<TestRecord>,
    pub update: Vec<TestRecord>,
}

impl SyncPlan {
    pub fn total(&self) -> usize {
        self.marked.len() + self.obsolete.len() + self.create.len() + self.update.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Records per phase, in dispatch order
    pub fn into_phases(self) -> Vec<(OperationKind, Vec<TestRecord>)> {
        let SyncPlan {
            marked,
            obsolete,
            create,
            update,
        } = self;

        OperationKind::PHASE_ORDER
            .into_iter()
            .zip([marked, obsolete, create, update])
            .collect()
    }
}

/// Compute the sync plan for one run
pub fn plan(
    remote: &[TestRecord],
    local: &[TestRecord],
    policy: DuplicateKeyPolicy,
) -> Result<SyncPlan> {
    let (marked, regular) = split_marked(remote, local);
    let diff = diff_with_policy(remote, &regular, policy)?;

    Ok(SyncPlan {
        marked,
        obsolete: diff.to_delete,
        create: diff.to_create,
        update: diff.to_update,
    })
}

/// Separate local records that reference a remote key missing from the inventory.
///
/// Returns `(marked, regular)`. Marked records get their key upper-cased.
pub fn split_marked(
    remote: &[TestRecord],
    local: &[TestRecord],
) -> (Vec<TestRecord>, Vec<TestRecord>) {
    let remote_keys: HashSet<String> = remote
        .iter()
        .filter_map(|r| r.key.as_deref())
        .map(str::to_uppercase)
        .collect();

    let mut marked = Vec::new();
    let mut regular = Vec::new();
    for record in local {
        if record.is_local_only() {
            regular.push(record.clone());
            continue;
        }
        let key = record.key.as_deref().unwrap_or_default().to_uppercase();
        if remote_keys.contains(&key) {
            regular.push(record.clone());
        } else {
            let mut record = record.clone();
            record.key = Some(key);
            marked.push(record);
        }
    }
    (marked, regular)
}

/// Diff with duplicate matching keys rejected
pub fn diff(remote: &[TestRecord], local: &[TestRecord]) -> Result<InventoryDiff> {
    diff_with_policy(remote, local, DuplicateKeyPolicy::Reject)
}

pub fn diff_with_policy(
    remote: &[TestRecord],
    local: &[TestRecord],
    policy: DuplicateKeyPolicy,
) -> Result<InventoryDiff> {
    let index = RemoteIndex::build(remote, policy)?;
    check_local_duplicates(local, policy)?;

    // claimed[remote index] = local index
    let mut claimed: Vec<Option<usize>> = vec![None; remote.len()];
    let mut to_create = Vec::new();

    for (local_idx, record) in local.iter().enumerate() {
        let candidates = match index.by_key(record) {
            Some(idx) => std::slice::from_ref(idx),
            None => index.candidates(record),
        };
        let remote_idx = match candidates {
            [] => {
                to_create.push(record.clone());
                continue;
            }
            [only] => *only,
            [first, ..] => match policy {
                DuplicateKeyPolicy::Reject => {
                    return Err(SyncError::DuplicateMatchingKey {
                        side: InventorySide::Remote,
                        key: matching_key(record).to_string(),
                    })
                }
                DuplicateKeyPolicy::FirstMatch => *first,
            },
        };

        match (claimed[remote_idx], policy) {
            (None, _) => claimed[remote_idx] = Some(local_idx),
            (Some(_), DuplicateKeyPolicy::FirstMatch) => {}
            (Some(_), DuplicateKeyPolicy::Reject) => {
                return Err(SyncError::DuplicateMatchingKey {
                    side: InventorySide::Local,
                    key: matching_key(record).to_string(),
                })
            }
        }
    }

    let mut to_delete = Vec::new();
    let mut to_update = Vec::new();
    for (remote_record, owner) in remote.iter().zip(claimed) {
        match owner {
            None => to_delete.push(remote_record.clone()),
            Some(local_idx) => {
                let desired = &local[local_idx];
                let renamed = same_key(remote_record, desired)
                    && remote_record.summary != desired.summary;
                if renamed || needs_update(remote_record, desired) {
                    let mut updated = remote_record.clone();
                    if renamed {
                        updated.summary = desired.summary.clone();
                    }
                    updated.description = desired.description.clone();
                    updated.requirement_keys = desired.requirement_keys.clone();
                    to_update.push(updated);
                }
            }
        }
    }

    Ok(InventoryDiff {
        to_delete,
        to_create,
        to_update,
    })
}

fn needs_update(remote: &TestRecord, local: &TestRecord) -> bool {
    remote.description_text() != local.description_text()
        || remote.requirement_keys != local.requirement_keys
}

/// Local record names the remote one by key
fn same_key(remote: &TestRecord, local: &TestRecord) -> bool {
    match (remote.key.as_deref(), local.key.as_deref()) {
        (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
        _ => false,
    }
}

/// The value a record is paired by when the other side has no identifier
fn matching_key(record: &TestRecord) -> &str {
    record.identifier().unwrap_or(&record.summary)
}

struct RemoteIndex<'a> {
    /// Upper-cased remote key
    by_key: HashMap<String, usize>,
    by_identifier: HashMap<&'a str, usize>,
    by_summary: HashMap<&'a str, Vec<usize>>,
    /// Summary lookups for local records whose identifier is unknown remotely
    by_summary_without_identifier: HashMap<&'a str, Vec<usize>>,
}

impl<'a> RemoteIndex<'a> {
    fn build(remote: &'a [TestRecord], policy: DuplicateKeyPolicy) -> Result<Self> {
        let mut index = RemoteIndex {
            by_key: HashMap::with_capacity(remote.len()),
            by_identifier: HashMap::with_capacity(remote.len()),
            by_summary: HashMap::with_capacity(remote.len()),
            by_summary_without_identifier: HashMap::new(),
        };

        for (idx, record) in remote.iter().enumerate() {
            if let Some(key) = record.key.as_deref() {
                index.by_key.entry(key.to_uppercase()).or_insert(idx);
            }
            match record.identifier() {
                Some(id) => {
                    if index.by_identifier.contains_key(id) {
                        if policy == DuplicateKeyPolicy::Reject {
                            return Err(SyncError::DuplicateMatchingKey {
                                side: InventorySide::Remote,
                                key: id.to_string(),
                            });
                        }
                    } else {
                        index.by_identifier.insert(id, idx);
                    }
                }
                None => index
                    .by_summary_without_identifier
                    .entry(record.summary.as_str())
                    .or_default()
                    .push(idx),
            }
            index
                .by_summary
                .entry(record.summary.as_str())
                .or_default()
                .push(idx);
        }
        Ok(index)
    }

    fn by_key(&self, local: &TestRecord) -> Option<&usize> {
        local
            .key
            .as_deref()
            .and_then(|key| self.by_key.get(&key.to_uppercase()))
    }

    fn candidates(&self, local: &TestRecord) -> &[usize] {
        let summary = local.summary.as_str();
        match local.identifier() {
            Some(id) => match self.by_identifier.get_key_value(id) {
                Some((_, idx)) => std::slice::from_ref(idx),
                None => self
                    .by_summary_without_identifier
                    .get(summary)
                    .map(Vec::as_slice)
                    .unwrap_or_default(),
            },
            None => self
                .by_summary
                .get(summary)
                .map(Vec::as_slice)
                .unwrap_or_default(),
        }
    }
}

fn check_local_duplicates(local: &[TestRecord], policy: DuplicateKeyPolicy) -> Result<()> {
    if policy == DuplicateKeyPolicy::FirstMatch {
        return Ok(());
    }

    let mut identifiers = HashSet::new();
    let mut summaries = HashSet::new();
    for record in local {
        let fresh = match record.identifier() {
            Some(id) => identifiers.insert(id),
            None => summaries.insert(record.summary.as_str()),
        };
        if !fresh {
            return Err(SyncError::DuplicateMatchingKey {
                side: InventorySide::Local,
                key: matching_key(record).to_string(),
            });
        }
    }
    Ok(())
}
