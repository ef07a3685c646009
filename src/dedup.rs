use log::{debug, info};
use std::collections::HashSet;

use crate::models::ReferenceEntry;
use crate::utils::normalize_name;

/// HMDB synonyms known to collide with other metabolites in our panels.
/// Matching rows keep their ids but lose the name, so they never join.
pub const SYNONYM_EXCLUSIONS: &[(&str, &str)] = &[
    ("HMDB0003192", "AICAR"),
    ("HMDB0012305", "Uridine 5'-diphosphogalactose"),
];

/// Row counts removed or altered by [`deduplicate`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DedupReport {
    pub exact_duplicates: usize,
    pub excluded_synonyms: usize,
    pub collapsed: usize,
}

/// Drop rows that repeat another row exactly. HMDB often lists the primary
/// name again among the synonyms.
pub fn remove_exact_duplicates(mut entries: Vec<ReferenceEntry>) -> (Vec<ReferenceEntry>, usize) {
    let before = entries.len();
    let keep: Vec<bool> = {
        let mut seen: HashSet<(&str, Option<&str>, Option<&str>)> = HashSet::with_capacity(before);
        entries
            .iter()
            .map(|entry| {
                seen.insert((
                    entry.hmdb_id.as_str(),
                    entry.kegg_id.as_deref(),
                    entry.name.as_deref(),
                ))
            })
            .collect()
    };
    retain_flagged(&mut entries, keep);
    let removed = before - entries.len();
    (entries, removed)
}

/// `retain` visits rows in order, so flags line up with positions
fn retain_flagged(entries: &mut Vec<ReferenceEntry>, keep: Vec<bool>) {
    let mut flags = keep.into_iter();
    entries.retain(|_| flags.next().unwrap_or(true));
}

/// Null out the name of every row listed in `exclusions`
pub fn apply_synonym_exclusions(
    entries: &mut [ReferenceEntry],
    exclusions: &[(&str, &str)],
) -> usize {
    let mut excluded = 0;
    for entry in entries.iter_mut() {
        let hit = exclusions.iter().any(|(hmdb_id, name)| {
            entry.hmdb_id == *hmdb_id && entry.name.as_deref() == Some(*name)
        });
        if hit {
            debug!(
                "Excluding synonym {:?} of {}",
                entry.name.as_deref().unwrap_or(""),
                entry.hmdb_id
            );
            entry.name = None;
            excluded += 1;
        }
    }
    excluded
}

/// Keep the first row per (kegg_id, key) for rows with a KEGG id and per
/// (hmdb_id, key) for rows without. Surviving rows keep their load order.
pub fn collapse_by_source_id(mut entries: Vec<ReferenceEntry>) -> (Vec<ReferenceEntry>, usize) {
    let before = entries.len();
    let keep: Vec<bool> = {
        let mut seen_kegg: HashSet<(&str, Option<String>)> = HashSet::new();
        let mut seen_hmdb: HashSet<(&str, Option<String>)> = HashSet::new();
        entries
            .iter()
            .map(|entry| {
                let key = entry.name.as_deref().map(normalize_name);
                match entry.kegg_id.as_deref() {
                    Some(kegg_id) => seen_kegg.insert((kegg_id, key)),
                    None => seen_hmdb.insert((entry.hmdb_id.as_str(), key)),
                }
            })
            .collect()
    };
    retain_flagged(&mut entries, keep);
    let collapsed = before - entries.len();
    (entries, collapsed)
}

/// Run every reference-table correction in order: exact duplicates, known-bad
/// synonyms, then the per-source-id collapse.
pub fn deduplicate(
    entries: Vec<ReferenceEntry>,
    exclusions: &[(&str, &str)],
) -> (Vec<ReferenceEntry>, DedupReport) {
    let (mut entries, exact_duplicates) = remove_exact_duplicates(entries);
    let excluded_synonyms = apply_synonym_exclusions(&mut entries, exclusions);
    let (entries, collapsed) = collapse_by_source_id(entries);

    let report = DedupReport {
        exact_duplicates,
        excluded_synonyms,
        collapsed,
    };
    info!(
        "Reference dedup: {} exact duplicates, {} excluded synonyms, {} collapsed, {} rows kept",
        report.exact_duplicates,
        report.excluded_synonyms,
        report.collapsed,
        entries.len()
    );
    (entries, report)
}
