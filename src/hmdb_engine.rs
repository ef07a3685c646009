use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use indicatif::ProgressBar;
use log::{debug, info};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::MappingError;
use crate::models::{HmdbMetabolite, ReferenceEntry};
use crate::utils::{get_filename, time_operation};

const FILE_BUFFER_SIZE: usize = 256 * 1024; // 256KB
const XML_BUFFER_SIZE: usize = 64 * 1024; // 64KB
const PROGRESS_INTERVAL: usize = 1000;

/// Direct-child fields of `<metabolite>` that the mapper extracts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Accession,
    Name,
    KeggId,
    Synonym,
}

/// Locate a field from the element path below the current `<metabolite>`.
/// Deeper elements that reuse these names (pathway names, secondary
/// accessions, ...) do not count.
fn field_at(path: &[Vec<u8>]) -> Option<Field> {
    match path {
        [leaf] => match leaf.as_slice() {
            b"accession" => Some(Field::Accession),
            b"name" => Some(Field::Name),
            b"kegg_id" => Some(Field::KeggId),
            _ => None,
        },
        [parent, leaf] if parent.as_slice() == b"synonyms" && leaf.as_slice() == b"synonym" => {
            Some(Field::Synonym)
        }
        _ => None,
    }
}

/// Fields collected for the `<metabolite>` currently open
#[derive(Debug, Default)]
struct EntryBuilder {
    accession: Option<String>,
    name: Option<String>,
    kegg_id: Option<String>,
    synonyms: Vec<Option<String>>,
}

impl EntryBuilder {
    /// Empty `<accession>` and `<name>` stay `Some("")`; only an absent
    /// element is fatal. Empty KEGG ids and synonyms have no value.
    fn set(&mut self, field: Field, text: &str) {
        let text = text.trim();
        let optional = || {
            if text.is_empty() {
                None
            } else {
                Some(text.to_string())
            }
        };
        match field {
            Field::Accession => self.accession = Some(text.to_string()),
            Field::Name => self.name = Some(text.to_string()),
            Field::KeggId => self.kegg_id = optional(),
            Field::Synonym => self.synonyms.push(optional()),
        }
    }

    fn finish(&mut self, ordinal: usize) -> Result<HmdbMetabolite, MappingError> {
        let entry = std::mem::take(self);
        let accession = entry.accession.ok_or(MappingError::MalformedReference {
            ordinal,
            field: "accession",
        })?;
        let name = entry.name.ok_or(MappingError::MalformedReference {
            ordinal,
            field: "name",
        })?;
        Ok(HmdbMetabolite {
            accession,
            name,
            kegg_id: entry.kegg_id,
            synonyms: entry.synonyms,
        })
    }
}

/// Streaming reader for the HMDB metabolite XML dump
#[derive(Clone, Default)]
pub struct HmdbProcessingEngine {
    progress_bar: Option<ProgressBar>,
}

impl HmdbProcessingEngine {
    pub fn new() -> Self {
        Self { progress_bar: None }
    }

    /// Set a progress bar ticked once per parsed metabolite
    pub fn with_progress_bar(mut self, progress_bar: ProgressBar) -> Self {
        self.progress_bar = Some(progress_bar);
        self
    }

    /// Load the reference table: one row per accession and name or synonym.
    /// Returns the rows together with the number of `<metabolite>` elements seen.
    pub fn load_reference_entries<P: AsRef<Path>>(
        &self,
        path: P,
    ) -> Result<(Vec<ReferenceEntry>, usize)> {
        let path = path.as_ref();
        info!("Loading HMDB reference entries from {:?}", path);

        let mut entries = Vec::new();
        let count = self.process_file(path, |metabolite| {
            entries.extend(metabolite.into_entries());
            Ok(())
        })?;

        info!(
            "Expanded {} HMDB metabolites into {} name rows",
            count,
            entries.len()
        );
        Ok((entries, count))
    }

    /// Stream every `<metabolite>` of a file to `callback`. Paths ending in
    /// `.gz` are decompressed on the fly.
    pub fn process_file<P: AsRef<Path>, F>(&self, path: P, callback: F) -> Result<usize>
    where
        F: FnMut(HmdbMetabolite) -> Result<()>,
    {
        time_operation("process_hmdb_file", || -> Result<usize> {
            let file_path = path.as_ref();
            let filename = get_filename(file_path);

            let file = File::open(file_path)
                .with_context(|| format!("Failed to open file: {:?}", file_path))?;
            let buf_reader = BufReader::with_capacity(FILE_BUFFER_SIZE, file);

            let reader: Box<dyn BufRead> = if filename.to_lowercase().ends_with(".gz") {
                Box::new(BufReader::with_capacity(
                    FILE_BUFFER_SIZE,
                    GzDecoder::new(buf_reader),
                ))
            } else {
                Box::new(buf_reader)
            };

            self.process_xml_stream(reader, &filename, callback)
        })
    }

    /// Pull-parse an HMDB document. Only the fields of the open entry are kept;
    /// they are handed off and reset when its closing tag is read.
    pub fn process_xml_stream<R: BufRead, F>(
        &self,
        reader: R,
        source_name: &str,
        mut callback: F,
    ) -> Result<usize>
    where
        F: FnMut(HmdbMetabolite) -> Result<()>,
    {
        let mut xml_reader = Reader::from_reader(reader);
        xml_reader.trim_text(true);
        xml_reader.expand_empty_elements(true);

        let mut buffer = Vec::with_capacity(XML_BUFFER_SIZE);
        let mut metabolite_count = 0;

        // Element path below the open <metabolite>; None while outside one
        let mut path: Option<Vec<Vec<u8>>> = None;
        let mut entry = EntryBuilder::default();
        let mut text = String::new();

        loop {
            match xml_reader.read_event_into(&mut buffer) {
                Ok(Event::Start(ref e)) => {
                    let local_name = e.local_name();
                    if let Some(open) = path.as_mut() {
                        open.push(local_name.as_ref().to_vec());
                        text.clear();
                    } else if local_name.as_ref() == b"metabolite" {
                        path = Some(Vec::new());
                        metabolite_count += 1;
                    }
                }
                Ok(Event::End(_)) => {
                    if let Some(open) = path.as_mut() {
                        if open.is_empty() {
                            let metabolite = entry.finish(metabolite_count)?;
                            debug!(
                                "Parsed {} with {} synonyms",
                                metabolite.accession,
                                metabolite.synonyms.len()
                            );
                            callback(metabolite)?;
                            path = None;

                            if let Some(pb) = &self.progress_bar {
                                pb.inc(1);
                                if metabolite_count % PROGRESS_INTERVAL == 0 {
                                    pb.set_message(format!("metabolites from {}", source_name));
                                }
                            }
                        } else {
                            if let Some(field) = field_at(open) {
                                entry.set(field, &text);
                            }
                            open.pop();
                            text.clear();
                        }
                    }
                }
                Ok(Event::Text(e)) => {
                    if path.as_deref().and_then(field_at).is_some() {
                        text.push_str(&e.unescape()?);
                    }
                }
                Ok(Event::CData(e)) => {
                    if path.as_deref().and_then(field_at).is_some() {
                        text.push_str(&String::from_utf8_lossy(&e));
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(anyhow::anyhow!(
                        "Error parsing XML at position {}: {}",
                        xml_reader.buffer_position(),
                        e
                    ));
                }
                _ => {}
            }

            // Clear buffer for reuse
            buffer.clear();
        }

        if let Some(pb) = &self.progress_bar {
            pb.finish_with_message(format!("metabolites from {}", source_name));
        }

        debug!(
            "Extracted {} HMDB metabolites from {}",
            metabolite_count, source_name
        );

        Ok(metabolite_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching_service::MatchingService;
    use crate::models::{InputMetabolite, MappingStats};
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<hmdb xmlns="http://www.hmdb.ca">
<metabolite>
  <version>5.0</version>
  <accession>HMDB0000122</accession>
  <secondary_accessions>
    <accession>HMDB00122</accession>
  </secondary_accessions>
  <name>D-Glucose</name>
  <synonyms>
    <synonym>Glucose</synonym>
    <synonym>Dextrose</synonym>
  </synonyms>
  <kegg_id>C00031</kegg_id>
  <biological_properties>
    <pathways>
      <pathway><name>Glycolysis</name><kegg_map_id>map00010</kegg_map_id></pathway>
    </pathways>
  </biological_properties>
</metabolite>
<metabolite>
  <accession>HMDB0012305</accession>
  <name>Uridine 5&apos;-diphosphogalactose</name>
  <synonyms/>
  <kegg_id></kegg_id>
</metabolite>
</hmdb>
"#;

    fn parse(xml: &str) -> Result<Vec<HmdbMetabolite>> {
        let engine = HmdbProcessingEngine::new();
        let mut parsed = Vec::new();
        engine.process_xml_stream(xml.as_bytes(), "sample.xml", |m| {
            parsed.push(m);
            Ok(())
        })?;
        Ok(parsed)
    }

    #[test]
    fn test_parses_direct_children_only() {
        let parsed = parse(SAMPLE).unwrap();
        assert_eq!(parsed.len(), 2);

        let glucose = &parsed[0];
        assert_eq!(glucose.accession, "HMDB0000122");
        assert_eq!(glucose.name, "D-Glucose");
        assert_eq!(glucose.kegg_id.as_deref(), Some("C00031"));
        assert_eq!(
            glucose.synonyms,
            vec![Some("Glucose".to_string()), Some("Dextrose".to_string())]
        );
    }

    #[test]
    fn test_empty_kegg_and_entities() {
        let parsed = parse(SAMPLE).unwrap();
        let udp = &parsed[1];
        assert_eq!(udp.name, "Uridine 5'-diphosphogalactose");
        assert_eq!(udp.kegg_id, None);
        assert!(udp.synonyms.is_empty());
    }

    #[test]
    fn test_empty_name_keeps_entry_and_synonyms_join() {
        let xml = "<hmdb><metabolite><accession>HMDB9</accession><name></name>\
                   <synonyms><synonym>Foo</synonym></synonyms><kegg_id>C9</kegg_id>\
                   </metabolite></hmdb>";
        let parsed = parse(xml).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].name, "");

        let entries: Vec<ReferenceEntry> = parsed
            .into_iter()
            .flat_map(HmdbMetabolite::into_entries)
            .collect();
        assert_eq!(entries.len(), 2);

        let metabolites = vec![InputMetabolite::new("Foo")];
        let mut stats = MappingStats::new();
        let results = MatchingService::new()
            .find_matches(&metabolites, &entries, &[], &mut stats)
            .unwrap();
        assert_eq!(results[0].kegg_id.as_deref(), Some("C9"));
        assert_eq!(results[0].hmdb_id.as_deref(), Some("HMDB9"));
    }

    #[test]
    fn test_empty_accession_is_kept() {
        let xml = "<hmdb><metabolite><accession> </accession><name>X</name></metabolite></hmdb>";
        let parsed = parse(xml).unwrap();
        assert_eq!(parsed[0].accession, "");
    }

    #[test]
    fn test_empty_synonym_element() {
        let xml = "<hmdb><metabolite><accession>HMDB1</accession><name>X</name>\
                   <synonyms><synonym/><synonym>Y</synonym></synonyms></metabolite></hmdb>";
        let parsed = parse(xml).unwrap();
        assert_eq!(parsed[0].synonyms, vec![None, Some("Y".to_string())]);
    }

    #[test]
    fn test_missing_accession_is_fatal() {
        let xml = "<hmdb><metabolite><name>X</name></metabolite></hmdb>";
        let err = parse(xml).unwrap_err();
        match err.downcast_ref::<MappingError>() {
            Some(MappingError::MalformedReference { ordinal, field }) => {
                assert_eq!(*ordinal, 1);
                assert_eq!(*field, "accession");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_malformed_xml() {
        let xml = "<hmdb><metabolite><accession>HMDB1</name></metabolite></hmdb>";
        assert!(parse(xml).is_err());
    }

    #[test]
    fn test_load_reference_entries_expands_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hmdb_metabolites.xml");
        std::fs::write(&path, SAMPLE).unwrap();

        let (entries, count) = HmdbProcessingEngine::new()
            .load_reference_entries(&path)
            .unwrap();
        assert_eq!(count, 2);
        // 1 + 2 synonyms, then 1 + 0 synonyms
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[3].hmdb_id, "HMDB0012305");
        assert_eq!(entries[3].kegg_id, None);
    }

    #[test]
    fn test_load_gzipped_reference() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hmdb_metabolites.xml.gz");
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(SAMPLE.as_bytes()).unwrap();
        std::fs::write(&path, encoder.finish().unwrap()).unwrap();

        let (entries, count) = HmdbProcessingEngine::new()
            .load_reference_entries(&path)
            .unwrap();
        assert_eq!(count, 2);
        assert_eq!(entries.len(), 4);
    }
}
