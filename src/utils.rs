use anyhow::{Context, Result};
use chrono::Local;
use env_logger::Builder;
use indicatif::{ProgressBar, ProgressStyle};
use lazy_static::lazy_static;
use log::{debug, info, LevelFilter};
use regex::Regex;
use std::io::Write;
use std::path::Path;
use std::time::{Duration, Instant};

/// Setup logging to stderr, or to `log_file` when given. Stdout is reserved
/// for the mapping table.
pub fn setup_logging(log_level: &str, log_file: Option<&Path>) -> Result<()> {
    let level = match log_level.to_lowercase().as_str() {
        "debug" => LevelFilter::Debug,
        "info" => LevelFilter::Info,
        "warn" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        _ => LevelFilter::Info,
    };

    let mut builder = Builder::new();
    builder
        .format(|buf, record| {
            writeln!(
                buf,
                "{} - {} - {}: {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .filter(None, level);

    match log_file {
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("Failed to create log file: {:?}", path))?;
            builder.target(env_logger::Target::Pipe(Box::new(file)));
        }
        None => {
            builder.target(env_logger::Target::Stderr);
        }
    }

    builder.try_init()?;

    info!("Logging initialized at level {}", level);

    Ok(())
}

/// Spinner on stderr for the reference scan; hidden when stderr is not a terminal
pub fn create_spinner_progress_bar(description: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {prefix:.bold.dim} [{elapsed_precise}] {pos} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_prefix(description.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Time a function execution and log its duration
pub fn time_operation<F, T>(name: &str, f: F) -> T
where
    F: FnOnce() -> T,
{
    let start = Instant::now();
    debug!("Starting operation: {}", name);

    let result = f();

    let duration = start.elapsed();
    debug!("Completed operation: {} in {:.2?}", name, duration);

    result
}

/// Join key for metabolite names: drops space, apostrophe, comma, underscore
/// and hyphen, then lowercases.
pub fn normalize_name(s: &str) -> String {
    lazy_static! {
        static ref SEPARATOR_RE: Regex = Regex::new(r"[ ',_-]").unwrap();
    }

    SEPARATOR_RE.replace_all(s, "").to_lowercase()
}

/// Get filename from path
pub fn get_filename(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "unknown_file".to_string())
}
