//! Maps metabolite names from an experimental results file to KEGG and HMDB
//! identifiers by joining them, on a normalized name, against the HMDB
//! metabolite dump and a curated override table.

pub mod curated;
pub mod dedup;
pub mod error;
pub mod hmdb_engine;
pub mod input_reader;
pub mod mapping_controller;
pub mod matching_service;
pub mod models;
pub mod utils;
pub mod writer;

pub use error::MappingError;
pub use mapping_controller::MappingController;
pub use models::{MapperConfig, MappingStats, MatchResult, TieBreak};
