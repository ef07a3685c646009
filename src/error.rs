use std::path::PathBuf;
use thiserror::Error;

/// Fatal data-quality failures. None of these are retried; each one means the
/// input, the reference dump or the curated table needs a human fix.
#[derive(Debug, Error)]
pub enum MappingError {
    #[error("input file {path:?} has {found} header columns, expected at least {expected}")]
    InputShape {
        path: PathBuf,
        found: usize,
        expected: usize,
    },

    #[error("name normalization collision: {first:?} and {second:?} both normalize to {key:?}")]
    NormalizationCollision {
        key: String,
        first: String,
        second: String,
    },

    #[error("reference entry #{ordinal} has no <{field}> element")]
    MalformedReference { ordinal: usize, field: &'static str },

    #[error("ambiguous matches remain for {} name(s): {}", .names.len(), .names.join(", "))]
    AmbiguousMatch { names: Vec<String> },

    #[error("join integrity violated: {0}")]
    JoinIntegrity(String),
}
