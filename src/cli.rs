//! Command-line arguments of the `cellsync` binary.

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "cellsync",
    version,
    about = "Edit stored tables cell by cell and save changes in batches"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Settings file (default: cellsync.toml in the user config directory).
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// SQLite database, overriding the settings file.
    #[arg(long, value_name = "PATH", global = true)]
    pub db: Option<PathBuf>,

    /// Raise log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log errors.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Import a CSV file as a new dataset.
    Import(ImportArgs),

    /// List stored datasets.
    List,

    /// Print the first pages of a dataset.
    Show(ShowArgs),

    /// Change cells of a dataset and save them in one batch.
    Edit(EditArgs),
}

#[derive(Args)]
pub struct ImportArgs {
    #[arg(value_name = "CSV")]
    pub path: PathBuf,
}

#[derive(Args)]
pub struct ShowArgs {
    #[arg(value_name = "DATASET")]
    pub dataset: i64,

    /// Number of pages to load.
    #[arg(long, default_value_t = 1)]
    pub pages: usize,
}

#[derive(Args)]
pub struct EditArgs {
    #[arg(value_name = "DATASET")]
    pub dataset: i64,

    /// Cell assignment; may be repeated.
    #[arg(
        long = "set",
        value_name = "ROW:COLUMN=VALUE",
        required = true,
        value_parser = parse_assignment
    )]
    pub assignments: Vec<Assignment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub row_id: String,
    pub column_key: String,
    pub raw: String,
}

/// Splits `ROW:COLUMN=VALUE`. The value may itself contain `=`; the row id
/// may contain `:` since the column is taken after the last one.
pub fn parse_assignment(input: &str) -> Result<Assignment, String> {
    let (target, raw) = input
        .split_once('=')
        .ok_or_else(|| format!("expected ROW:COLUMN=VALUE, got {input:?}"))?;
    let (row_id, column_key) = target
        .rsplit_once(':')
        .filter(|(row_id, column_key)| !row_id.is_empty() && !column_key.is_empty())
        .ok_or_else(|| format!("expected ROW:COLUMN before '=', got {target:?}"))?;

    Ok(Assignment {
        row_id: row_id.to_string(),
        column_key: column_key.to_string(),
        raw: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_assignments() {
        assert_eq!(
            parse_assignment("a:b:count=x=1"),
            Ok(Assignment {
                row_id: "a:b".into(),
                column_key: "count".into(),
                raw: "x=1".into(),
            })
        );
        assert!(parse_assignment("1:count").is_err());
        assert!(parse_assignment(":count=1").is_err());
        assert!(parse_assignment("1count=1").is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
