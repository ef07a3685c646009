use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};

/// Metabolite name taken from one column header of the results file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputMetabolite {
    pub name: String,
}

impl InputMetabolite {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// One (accession, name-or-synonym) row expanded from an HMDB entry
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReferenceEntry {
    pub hmdb_id: String,
    pub kegg_id: Option<String>,
    /// `None` for excluded synonyms and empty `<synonym/>` elements
    pub name: Option<String>,
}

/// A parsed `<metabolite>` element before expansion into rows
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HmdbMetabolite {
    pub accession: String,
    pub name: String,
    pub kegg_id: Option<String>,
    pub synonyms: Vec<Option<String>>,
}

impl HmdbMetabolite {
    /// One row for the primary name followed by one row per synonym
    pub fn into_entries(self) -> Vec<ReferenceEntry> {
        let mut entries = Vec::with_capacity(1 + self.synonyms.len());
        entries.push(ReferenceEntry {
            hmdb_id: self.accession.clone(),
            kegg_id: self.kegg_id.clone(),
            name: Some(self.name),
        });
        for synonym in self.synonyms {
            entries.push(ReferenceEntry {
                hmdb_id: self.accession.clone(),
                kegg_id: self.kegg_id.clone(),
                name: synonym,
            });
        }
        entries
    }
}

/// Curated row from the manual override table
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ManualOverride {
    pub name: String,
    #[serde(default)]
    pub kegg_id: Option<String>,
    #[serde(default)]
    pub hmdb_id: Option<String>,
}

/// Join row carried through conflict resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub name: String,
    pub kegg_id: Option<String>,
    pub hmdb_id: Option<String>,
    pub manual: bool,
}

impl Candidate {
    /// Placeholder row produced by the left join when nothing matched
    pub fn unmatched(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kegg_id: None,
            hmdb_id: None,
            manual: false,
        }
    }

    pub fn from_reference(name: &str, entry: &ReferenceEntry) -> Self {
        Self {
            name: name.to_string(),
            kegg_id: entry.kegg_id.clone(),
            hmdb_id: Some(entry.hmdb_id.clone()),
            manual: false,
        }
    }

    pub fn from_manual(entry: &ManualOverride) -> Self {
        Self {
            name: entry.name.clone(),
            kegg_id: entry.kegg_id.clone(),
            hmdb_id: entry.hmdb_id.clone(),
            manual: true,
        }
    }

    pub fn into_result(self) -> MatchResult {
        MatchResult {
            name: self.name,
            kegg_id: self.kegg_id,
            hmdb_id: self.hmdb_id,
        }
    }
}

/// Final output row; `None` serializes as an empty CSV field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    pub name: String,
    pub kegg_id: Option<String>,
    pub hmdb_id: Option<String>,
}

impl fmt::Display for MatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Match[name={}, kegg_id={}, hmdb_id={}]",
            self.name,
            self.kegg_id.as_deref().unwrap_or(""),
            self.hmdb_id.as_deref().unwrap_or("")
        )
    }
}

/// What to do when more than one candidate survives conflict resolution
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TieBreak {
    /// Abort with the list of ambiguous names
    #[default]
    Fail,
    /// Keep the first survivor; manual overrides sort ahead of reference rows
    First,
}

impl fmt::Display for TieBreak {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TieBreak::Fail => write!(f, "fail"),
            TieBreak::First => write!(f, "first"),
        }
    }
}

impl FromStr for TieBreak {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fail" => Ok(TieBreak::Fail),
            "first" => Ok(TieBreak::First),
            other => Err(format!("unknown tie-break policy: {}", other)),
        }
    }
}

/// Counters collected across the mapping stages
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingStats {
    pub input_metabolites: usize,
    pub reference_metabolites: usize,
    pub reference_entries: usize,
    pub exact_duplicates_removed: usize,
    pub synonyms_excluded: usize,
    pub entries_after_dedup: usize,
    pub manual_overrides: usize,
    pub candidates_discarded: usize,
    pub matched_reference: usize,
    pub matched_manual: usize,
    pub unmatched: usize,
}

impl MappingStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_result(&mut self, candidate: &Candidate) {
        if candidate.manual {
            self.matched_manual += 1;
        } else if candidate.hmdb_id.is_some() {
            self.matched_reference += 1;
        } else {
            self.unmatched += 1;
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path)
            .with_context(|| format!("Failed to create stats file: {:?}", path))?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }
}

/// Configuration for one mapping run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapperConfig {
    pub hmdb_xml: PathBuf,
    pub curated_csv: PathBuf,
    /// Leading row-label columns in the results header
    pub label_columns: usize,
    /// Trailer stripped from each metabolite header cell
    pub header_suffix: String,
    pub tie_break: TieBreak,
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            hmdb_xml: PathBuf::from("input/hmdb_metabolites.xml"),
            curated_csv: PathBuf::from("resources/curated_metabolites.csv"),
            label_columns: 3,
            header_suffix: " Results".to_string(),
            tie_break: TieBreak::Fail,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_entries_shares_ids() {
        let metabolite = HmdbMetabolite {
            accession: "HMDB0000122".to_string(),
            name: "D-Glucose".to_string(),
            kegg_id: Some("C00031".to_string()),
            synonyms: vec![Some("Glucose".to_string()), None],
        };

        let entries = metabolite.into_entries();
        assert_eq!(entries.len(), 3);
        assert!(entries.iter().all(|e| e.hmdb_id == "HMDB0000122"));
        assert!(entries.iter().all(|e| e.kegg_id.as_deref() == Some("C00031")));
        assert_eq!(entries[0].name.as_deref(), Some("D-Glucose"));
        assert_eq!(entries[2].name, None);
    }

    #[test]
    fn test_tie_break_parse() {
        assert_eq!("FIRST".parse::<TieBreak>().unwrap(), TieBreak::First);
        assert_eq!("fail".parse::<TieBreak>().unwrap(), TieBreak::Fail);
        assert!("random".parse::<TieBreak>().is_err());
    }

    #[test]
    fn test_stats_classify_results() {
        let mut stats = MappingStats::new();
        stats.add_result(&Candidate::unmatched("X"));
        stats.add_result(&Candidate {
            name: "Y".to_string(),
            kegg_id: None,
            hmdb_id: Some("HMDB1".to_string()),
            manual: false,
        });
        stats.add_result(&Candidate::from_manual(&ManualOverride {
            name: "Z".to_string(),
            kegg_id: Some("C1".to_string()),
            hmdb_id: None,
        }));

        assert_eq!(stats.unmatched, 1);
        assert_eq!(stats.matched_reference, 1);
        assert_eq!(stats.matched_manual, 1);
    }

    #[test]
    fn test_match_result_display_blanks_missing_ids() {
        let result = Candidate::unmatched("Unknown987").into_result();
        assert_eq!(
            result.to_string(),
            "Match[name=Unknown987, kegg_id=, hmdb_id=]"
        );
    }
}
