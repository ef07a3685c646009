use anyhow::Result;
use log::{debug, info, warn};
use std::collections::{HashMap, HashSet};

use crate::error::MappingError;
use crate::models::{
    Candidate, InputMetabolite, ManualOverride, MappingStats, MatchResult, ReferenceEntry,
    TieBreak,
};
use crate::utils::{normalize_name, time_operation};

/// Joins input names against the reference table and curated overrides
pub struct MatchingService {
    tie_break: TieBreak,
}

impl MatchingService {
    pub fn new() -> Self {
        Self {
            tie_break: TieBreak::default(),
        }
    }

    pub fn with_tie_break(tie_break: TieBreak) -> Self {
        Self { tie_break }
    }

    /// Resolve exactly one identifier row per input metabolite, in input order
    pub fn find_matches(
        &self,
        metabolites: &[InputMetabolite],
        reference: &[ReferenceEntry],
        overrides: &[ManualOverride],
        stats: &mut MappingStats,
    ) -> Result<Vec<MatchResult>> {
        info!(
            "Matching {} metabolites against {} reference rows and {} curated overrides",
            metabolites.len(),
            reference.len(),
            overrides.len()
        );

        let results = time_operation("find_matches", || -> Result<Vec<MatchResult>> {
            let candidates = self.join_candidates(metabolites, reference, overrides);
            self.resolve(metabolites, candidates, stats)
        })?;

        verify_results(metabolites, &results)?;

        info!(
            "Matching complete: {} via reference, {} via curated overrides, {} unmatched",
            stats.matched_reference, stats.matched_manual, stats.unmatched
        );

        Ok(results)
    }

    /// Left join by normalized name plus exact-name curated rows. Curated
    /// candidates come first for each name.
    pub fn join_candidates(
        &self,
        metabolites: &[InputMetabolite],
        reference: &[ReferenceEntry],
        overrides: &[ManualOverride],
    ) -> HashMap<String, Vec<Candidate>> {
        let index = build_reference_index(reference);

        let mut manual: HashMap<&str, Vec<&ManualOverride>> = HashMap::new();
        for entry in overrides {
            manual.entry(entry.name.as_str()).or_default().push(entry);
        }

        let mut candidates = HashMap::with_capacity(metabolites.len());
        for metabolite in metabolites {
            let mut rows: Vec<Candidate> = manual
                .get(metabolite.name.as_str())
                .map(|entries| entries.iter().map(|e| Candidate::from_manual(e)).collect())
                .unwrap_or_default();

            match index.get(&normalize_name(&metabolite.name)) {
                Some(hits) => rows.extend(
                    hits.iter()
                        .map(|entry| Candidate::from_reference(&metabolite.name, entry)),
                ),
                None => rows.push(Candidate::unmatched(&metabolite.name)),
            }

            debug!("{} has {} candidate rows", metabolite.name, rows.len());
            candidates.insert(metabolite.name.clone(), rows);
        }

        candidates
    }

    /// Pick one candidate per name, in input order. Every unresolved or
    /// ambiguous name is reported before failing.
    fn resolve(
        &self,
        metabolites: &[InputMetabolite],
        mut candidates: HashMap<String, Vec<Candidate>>,
        stats: &mut MappingStats,
    ) -> Result<Vec<MatchResult>> {
        let mut results = Vec::with_capacity(metabolites.len());
        let mut unresolved = Vec::new();
        let mut ambiguous = Vec::new();

        for metabolite in metabolites {
            let rows = candidates.remove(&metabolite.name).unwrap_or_default();
            let before = rows.len();
            let mut rows = discard_unresolved_joins(rows);
            stats.candidates_discarded += before - rows.len();

            if rows.len() > 1 {
                match self.tie_break {
                    TieBreak::Fail => {
                        warn!(
                            "{} is ambiguous: {}",
                            metabolite.name,
                            describe_candidates(&rows)
                        );
                        ambiguous.push(metabolite.name.clone());
                        continue;
                    }
                    TieBreak::First => {
                        debug!(
                            "{} is ambiguous, keeping first of: {}",
                            metabolite.name,
                            describe_candidates(&rows)
                        );
                        rows.truncate(1);
                    }
                }
            }

            match rows.pop() {
                Some(chosen) => {
                    stats.add_result(&chosen);
                    let result = chosen.into_result();
                    debug!("Resolved {}", result);
                    results.push(result);
                }
                None => {
                    warn!("{} lost every candidate row", metabolite.name);
                    unresolved.push(metabolite.name.clone());
                }
            }
        }

        if !ambiguous.is_empty() {
            return Err(MappingError::AmbiguousMatch { names: ambiguous }.into());
        }
        if !unresolved.is_empty() {
            return Err(MappingError::JoinIntegrity(format!(
                "no candidate left for: {}",
                unresolved.join(", ")
            ))
            .into());
        }

        Ok(results)
    }
}

impl Default for MatchingService {
    fn default() -> Self {
        Self::new()
    }
}

/// Normalized key -> reference rows carrying that key, in table order.
/// Rows whose name was nulled never join.
fn build_reference_index(reference: &[ReferenceEntry]) -> HashMap<String, Vec<&ReferenceEntry>> {
    let mut index: HashMap<String, Vec<&ReferenceEntry>> = HashMap::new();
    for entry in reference {
        if let Some(name) = &entry.name {
            index.entry(normalize_name(name)).or_default().push(entry);
        }
    }
    index
}

/// With more than one row, drop non-curated rows that carry no KEGG id
pub fn discard_unresolved_joins(rows: Vec<Candidate>) -> Vec<Candidate> {
    if rows.len() <= 1 {
        return rows;
    }
    rows.into_iter()
        .filter(|row| row.kegg_id.is_some() || row.manual)
        .collect()
}

fn describe_candidates(rows: &[Candidate]) -> String {
    rows.iter()
        .map(|row| {
            format!(
                "[kegg={} hmdb={}{}]",
                row.kegg_id.as_deref().unwrap_or("-"),
                row.hmdb_id.as_deref().unwrap_or("-"),
                if row.manual { " manual" } else { "" }
            )
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Output must hold exactly one row per input name and the same name set
pub fn verify_results(
    metabolites: &[InputMetabolite],
    results: &[MatchResult],
) -> Result<(), MappingError> {
    if results.len() != metabolites.len() {
        return Err(MappingError::JoinIntegrity(format!(
            "{} result rows for {} input metabolites",
            results.len(),
            metabolites.len()
        )));
    }

    let expected: HashSet<&str> = metabolites.iter().map(|m| m.name.as_str()).collect();
    let actual: HashSet<&str> = results.iter().map(|r| r.name.as_str()).collect();
    if expected != actual {
        let mut missing: Vec<&str> = expected.difference(&actual).copied().collect();
        missing.sort_unstable();
        return Err(MappingError::JoinIntegrity(format!(
            "result names differ from input names, missing: {}",
            missing.join(", ")
        )));
    }

    Ok(())
}
