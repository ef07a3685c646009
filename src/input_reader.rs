use anyhow::{Context, Result};
use csv::ReaderBuilder;
use log::{debug, info};
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use crate::error::MappingError;
use crate::models::InputMetabolite;
use crate::utils::normalize_name;

/// Read the metabolite names from the header row of a results file.
///
/// The first `label_columns` cells label the data rows and are skipped; every
/// remaining cell loses a trailing `suffix` when it has one.
pub fn read_input_metabolites<P: AsRef<Path>>(
    path: P,
    label_columns: usize,
    suffix: &str,
) -> Result<Vec<InputMetabolite>> {
    let path = path.as_ref();
    info!("Reading metabolite names from {:?}", path);

    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open input file: {:?}", path))?;

    let header = read_header(file)
        .with_context(|| format!("Failed to read header of {:?}", path))?;

    if header.len() < label_columns {
        return Err(MappingError::InputShape {
            path: path.to_path_buf(),
            found: header.len(),
            expected: label_columns,
        }
        .into());
    }

    let metabolites: Vec<InputMetabolite> = header[label_columns..]
        .iter()
        .map(|cell| InputMetabolite::new(cell.strip_suffix(suffix).unwrap_or(cell.as_str())))
        .collect();

    info!("Found {} metabolite columns", metabolites.len());
    Ok(metabolites)
}

fn read_header<R: Read>(reader: R) -> Result<Vec<String>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    match reader.records().next() {
        Some(record) => Ok(record?.iter().map(str::to_string).collect()),
        None => Ok(Vec::new()),
    }
}

/// Fails when two input names are identical or normalize to the same key
pub fn validate_inputs(metabolites: &[InputMetabolite]) -> Result<(), MappingError> {
    let mut seen: HashMap<String, &str> = HashMap::with_capacity(metabolites.len());

    for metabolite in metabolites {
        let key = normalize_name(&metabolite.name);
        if let Some(first) = seen.insert(key.clone(), &metabolite.name) {
            return Err(MappingError::NormalizationCollision {
                key,
                first: first.to_string(),
                second: metabolite.name.clone(),
            });
        }
    }

    debug!("All {} input names normalize uniquely", metabolites.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_input(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    fn names(metabolites: &[InputMetabolite]) -> Vec<&str> {
        metabolites.iter().map(|m| m.name.as_str()).collect()
    }

    #[test]
    fn test_reads_header_and_strips_suffix() {
        let file = write_input("A,B,C,Glucose Results,Lactate Results\n1,2,3,4.5,6.7\n");
        let metabolites = read_input_metabolites(file.path(), 3, " Results").unwrap();
        assert_eq!(names(&metabolites), vec!["Glucose", "Lactate"]);
    }

    #[test]
    fn test_suffix_only_stripped_at_end() {
        let file = write_input("A,B,C,Results Pool,Citrate,\"1,3-Diaminopropane Results\"\n");
        let metabolites = read_input_metabolites(file.path(), 3, " Results").unwrap();
        assert_eq!(
            names(&metabolites),
            vec!["Results Pool", "Citrate", "1,3-Diaminopropane"]
        );
    }

    #[test]
    fn test_label_columns_only() {
        let file = write_input("Sample,Group,Batch\n");
        let metabolites = read_input_metabolites(file.path(), 3, " Results").unwrap();
        assert!(metabolites.is_empty());
    }

    #[test]
    fn test_too_few_columns() {
        let file = write_input("Sample,Group\n");
        let err = read_input_metabolites(file.path(), 3, " Results").unwrap_err();
        match err.downcast_ref::<MappingError>() {
            Some(MappingError::InputShape { found, expected, .. }) => {
                assert_eq!(*found, 2);
                assert_eq!(*expected, 3);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_empty_file_is_input_shape_error() {
        let file = write_input("");
        let err = read_input_metabolites(file.path(), 3, " Results").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MappingError>(),
            Some(MappingError::InputShape { found: 0, .. })
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(read_input_metabolites("/nonexistent/results.csv", 3, " Results").is_err());
    }

    #[test]
    fn test_validate_detects_collision() {
        let metabolites = vec![
            InputMetabolite::new("Uridine 5'-diphosphogalactose"),
            InputMetabolite::new("Lactate"),
            InputMetabolite::new("uridine5diphosphogalactose"),
        ];
        match validate_inputs(&metabolites) {
            Err(MappingError::NormalizationCollision { key, first, second }) => {
                assert_eq!(key, "uridine5diphosphogalactose");
                assert_eq!(first, "Uridine 5'-diphosphogalactose");
                assert_eq!(second, "uridine5diphosphogalactose");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_validate_rejects_exact_duplicates() {
        let metabolites = vec![InputMetabolite::new("Lactate"), InputMetabolite::new("Lactate")];
        assert!(validate_inputs(&metabolites).is_err());
    }

    #[test]
    fn test_validate_accepts_unique() {
        let metabolites = vec![InputMetabolite::new("Glucose"), InputMetabolite::new("Lactate")];
        assert!(validate_inputs(&metabolites).is_ok());
    }
}
