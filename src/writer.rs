use anyhow::{Context, Result};
use csv::Writer;
use log::info;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::models::MatchResult;

/// Serialize the mapping table as `name,kegg_id,hmdb_id` with a header row.
/// Missing ids become empty fields.
pub fn write_results<W: Write>(writer: W, results: &[MatchResult]) -> Result<()> {
    let mut writer = Writer::from_writer(writer);

    // An empty result set still gets its header
    if results.is_empty() {
        writer.write_record(["name", "kegg_id", "hmdb_id"])?;
    }

    for (count, result) in results.iter().enumerate() {
        writer
            .serialize(result)
            .with_context(|| format!("Failed to serialize record {}", count + 1))?;
    }

    writer.flush()?;
    Ok(())
}

/// Write to `path`, or to stdout when no path is given
pub fn save_results(path: Option<&Path>, results: &[MatchResult]) -> Result<()> {
    match path {
        Some(path) => {
            info!("Saving {} mapping rows to {:?}", results.len(), path);
            let file = File::create(path)
                .with_context(|| format!("Failed to create CSV file: {:?}", path))?;
            write_results(BufWriter::new(file), results)
        }
        None => {
            let stdout = io::stdout();
            write_results(stdout.lock(), results)
        }
    }
}
