use anyhow::{Context, Result};
use log::info;
use std::path::Path;
use std::time::Instant;

use crate::curated::load_manual_overrides;
use crate::dedup::{deduplicate, SYNONYM_EXCLUSIONS};
use crate::hmdb_engine::HmdbProcessingEngine;
use crate::input_reader::{read_input_metabolites, validate_inputs};
use crate::matching_service::MatchingService;
use crate::models::{MapperConfig, MappingStats, MatchResult};

/// Runs the whole reconciliation: results header, HMDB dump, curated table,
/// dedup, match.
pub struct MappingController {
    config: MapperConfig,
    hmdb_engine: HmdbProcessingEngine,
    matching_service: MatchingService,
}

impl MappingController {
    /// Create a new mapping controller with default configuration
    pub fn new() -> Self {
        Self::with_config(MapperConfig::default())
    }

    /// Create a new mapping controller with custom configuration
    pub fn with_config(config: MapperConfig) -> Self {
        Self {
            matching_service: MatchingService::with_tie_break(config.tie_break),
            hmdb_engine: HmdbProcessingEngine::new(),
            config,
        }
    }

    /// Replace the reference engine, e.g. to attach a progress bar
    pub fn with_hmdb_engine(mut self, hmdb_engine: HmdbProcessingEngine) -> Self {
        self.hmdb_engine = hmdb_engine;
        self
    }

    /// Map every metabolite column of `input_path` to KEGG and HMDB ids
    pub fn execute<P: AsRef<Path>>(
        &self,
        input_path: P,
    ) -> Result<(Vec<MatchResult>, MappingStats)> {
        info!("Starting metabolite mapping");
        let start_time = Instant::now();
        let mut stats = MappingStats::new();

        // 1. Input names, checked for normalization collisions
        let metabolites = read_input_metabolites(
            input_path,
            self.config.label_columns,
            &self.config.header_suffix,
        )?;
        validate_inputs(&metabolites)?;
        stats.input_metabolites = metabolites.len();

        // 2. Reference rows
        let (entries, metabolite_count) = self
            .hmdb_engine
            .load_reference_entries(&self.config.hmdb_xml)
            .with_context(|| {
                format!("Failed to load HMDB reference: {:?}", self.config.hmdb_xml)
            })?;
        stats.reference_metabolites = metabolite_count;
        stats.reference_entries = entries.len();

        // 3. Reference corrections
        let (entries, report) = deduplicate(entries, SYNONYM_EXCLUSIONS);
        stats.exact_duplicates_removed = report.exact_duplicates;
        stats.synonyms_excluded = report.excluded_synonyms;
        stats.entries_after_dedup = entries.len();

        // 4. Curated overrides
        let overrides = load_manual_overrides(&self.config.curated_csv)?;
        stats.manual_overrides = overrides.len();

        // 5. Join and resolve
        let results =
            self.matching_service
                .find_matches(&metabolites, &entries, &overrides, &mut stats)?;

        info!(
            "Mapping complete in {:.2?}: {} metabolites, {} with an HMDB or KEGG id",
            start_time.elapsed(),
            results.len(),
            stats.matched_reference + stats.matched_manual
        );

        Ok((results, stats))
    }
}

impl Default for MappingController {
    fn default() -> Self {
        Self::new()
    }
}
