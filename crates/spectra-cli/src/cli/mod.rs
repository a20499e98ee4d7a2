mod commands;
mod helpers;

use clap::Parser;
use spectra_core::SpectraError;
use std::path::PathBuf;

pub fn run_from_env() -> i32 {
    let args: Vec<String> = std::env::args().collect();
    match run(args) {
        Ok(code) => code,
        Err(error) => {
            eprintln!("error: {error:#}");
            error.exit_code()
        }
    }
}

pub fn run<I, S>(args: I) -> Result<i32, CliError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let args: Vec<String> = args.into_iter().map(Into::into).collect();
    match Cli::try_parse_from(&args) {
        Ok(cli) => dispatch(cli),
        Err(err) => match err.kind() {
            clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
                print!("{err}");
                Ok(0)
            }
            _ => Err(CliError::Usage(err.to_string())),
        },
    }
}

#[derive(Parser)]
#[command(name = "spectra-rs", about = "Spectral ingestion and tiered-cache engine")]
struct Cli {
    /// Cache root directory (defaults to $SPECTRA_CACHE_DIR or ./spectra-cache)
    #[arg(long, global = true)]
    cache_root: Option<PathBuf>,

    /// Ledger store path (defaults to <cache-root>/ledger.json)
    #[arg(long, global = true)]
    ledger_store: Option<PathBuf>,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(clap::Subcommand)]
enum CliCommand {
    /// Ingest one or more files or glob patterns into the cache
    Ingest(commands::IngestArgs),
    /// Show the cache index summary for a source hash
    Info(commands::InfoArgs),
    /// Show the tier ladder and preview viewport tier selection
    Tiers(commands::TiersArgs),
    /// Subtract or ratio two cached spectra at full resolution
    Diff(commands::DiffArgs),
    /// Inspect or administer the duplicate ledger
    Ledger(commands::LedgerArgs),
}

fn dispatch(cli: Cli) -> Result<i32, CliError> {
    let context = commands::CommandContext::resolve(cli.cache_root, cli.ledger_store);
    match cli.command {
        CliCommand::Ingest(args) => commands::run_ingest_command(&context, args),
        CliCommand::Info(args) => commands::run_info_command(&context, args),
        CliCommand::Tiers(args) => commands::run_tiers_command(&context, args),
        CliCommand::Diff(args) => commands::run_diff_command(&context, args),
        CliCommand::Ledger(args) => commands::run_ledger_command(&context, args),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("{0}")]
    Usage(String),
    #[error(transparent)]
    Core(#[from] SpectraError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl CliError {
    /// Stable exit-code mapping per error family.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Usage(_) => 2,
            Self::Core(SpectraError::Ingest(_)) => 3,
            Self::Core(SpectraError::Cache(_)) => 4,
            Self::Core(SpectraError::Ledger(_)) => 5,
            Self::Core(SpectraError::Math(_)) => 6,
            Self::Internal(_) => 7,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::CliError;
    use spectra_core::domain::{IngestError, LedgerError, MathError};
    use spectra_core::SpectraError;

    #[test]
    fn exit_codes_are_stable_per_error_family() {
        let usage = CliError::Usage("bad flag".to_string());
        assert_eq!(usage.exit_code(), 2);

        let ingest: CliError = SpectraError::from(IngestError::UnresolvedAxis {
            source_name: "x".to_string(),
            reason: "no unit".to_string(),
        })
        .into();
        assert_eq!(ingest.exit_code(), 3);

        let ledger: CliError = SpectraError::from(LedgerError::LockPoisoned).into();
        assert_eq!(ledger.exit_code(), 5);

        let math: CliError = SpectraError::from(MathError::EmptyOverlap).into();
        assert_eq!(math.exit_code(), 6);
    }
}
