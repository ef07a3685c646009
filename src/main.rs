use anyhow::Result;
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use log::{error, info};
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;

use metabolite_mapper::hmdb_engine::HmdbProcessingEngine;
use metabolite_mapper::utils::{create_spinner_progress_bar, setup_logging};
use metabolite_mapper::writer::save_results;
use metabolite_mapper::{MapperConfig, MappingController, TieBreak};

/// Map metabolite names from a results CSV to KEGG and HMDB identifiers.
/// The mapping table is written to stdout as `name,kegg_id,hmdb_id`.
#[derive(Debug, Parser)]
#[command(name = "map-metabolites", version, about)]
struct Cli {
    /// Results CSV whose header holds the metabolite names
    input: PathBuf,

    /// HMDB metabolite XML dump (.xml or .xml.gz)
    #[arg(long, value_name = "FILE", default_value = "input/hmdb_metabolites.xml")]
    hmdb_xml: PathBuf,

    /// Curated overrides CSV with columns name,kegg_id,hmdb_id
    #[arg(long, value_name = "FILE", default_value = "resources/curated_metabolites.csv")]
    curated: PathBuf,

    /// Leading row-label columns in the results header
    #[arg(long, default_value_t = 3)]
    label_columns: usize,

    /// Trailer stripped from every metabolite header cell
    #[arg(long, default_value = " Results")]
    suffix: String,

    /// Policy when several candidates survive conflict resolution (fail, first)
    #[arg(long, default_value_t = TieBreak::Fail)]
    tie_break: TieBreak,

    /// Write the mapping table here instead of stdout
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Write run statistics as JSON
    #[arg(long, value_name = "FILE")]
    stats: Option<PathBuf>,

    /// Log level (debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log to this file instead of stderr
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,

    /// Show a spinner while the HMDB dump is scanned
    #[arg(long)]
    progress: bool,
}

impl Cli {
    fn mapper_config(&self) -> MapperConfig {
        MapperConfig {
            hmdb_xml: self.hmdb_xml.clone(),
            curated_csv: self.curated.clone(),
            label_columns: self.label_columns,
            header_suffix: self.suffix.clone(),
            tie_break: self.tie_break,
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let mut controller = MappingController::with_config(cli.mapper_config());
    if cli.progress {
        controller = controller.with_hmdb_engine(
            HmdbProcessingEngine::new().with_progress_bar(create_spinner_progress_bar("HMDB")),
        );
    }

    let (results, stats) = controller.execute(&cli.input)?;
    save_results(cli.output.as_deref(), &results)?;

    if let Some(path) = &cli.stats {
        stats.save(path)?;
        info!("Wrote run statistics to {:?}", path);
    }

    Ok(())
}

/// Missing or surplus arguments are usage mistakes, not failures
fn is_usage_error(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::MissingRequiredArgument
            | ErrorKind::UnknownArgument
            | ErrorKind::TooManyValues
            | ErrorKind::WrongNumberOfValues
    )
}

/// `Ok(None)` when usage was printed and the process should stop cleanly
fn parse_cli<I, T>(args: I) -> Result<Option<Cli>, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    match Cli::try_parse_from(args) {
        Ok(cli) => Ok(Some(cli)),
        Err(e) if is_usage_error(e.kind()) => {
            println!("{}", Cli::command().render_usage());
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

fn main() -> ExitCode {
    let cli = match parse_cli(std::env::args_os()) {
        Ok(Some(cli)) => cli,
        Ok(None) => return ExitCode::SUCCESS,
        // Help and version exit 0, invalid values exit 2
        Err(e) => e.exit(),
    };

    if let Err(e) = setup_logging(&cli.log_level, cli.log_file.as_deref()) {
        eprintln!("Failed to initialize logging: {:#}", e);
        return ExitCode::FAILURE;
    }

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Mapping failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
