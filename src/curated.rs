use anyhow::{Context, Result};
use csv::Reader;
use log::{debug, info};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::models::ManualOverride;

/// Load the curated `name,kegg_id,hmdb_id` table. Empty cells become `None`.
pub fn load_manual_overrides<P: AsRef<Path>>(path: P) -> Result<Vec<ManualOverride>> {
    let path = path.as_ref();
    info!("Loading curated overrides from {:?}", path);

    let file = File::open(path)
        .with_context(|| format!("Failed to open curated overrides file: {:?}", path))?;

    let mut reader = Reader::from_reader(BufReader::new(file));
    let mut overrides = Vec::new();

    for result in reader.deserialize() {
        let entry: ManualOverride = result
            .with_context(|| format!("Failed to parse curated record {}", overrides.len() + 1))?;
        debug!(
            "Curated override {} -> kegg={:?} hmdb={:?}",
            entry.name, entry.kegg_id, entry.hmdb_id
        );
        overrides.push(entry);
    }

    info!("Loaded {} curated overrides", overrides.len());
    Ok(overrides)
}
