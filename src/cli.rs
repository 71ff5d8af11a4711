//! Command-line interface definitions for the KBO publication collector.
//!
//! Store location can also come from the environment.

use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments.
///
/// # Examples
///
/// ```sh
/// # Collect two enterprises into ./store
/// kbo_publications -s ./store -e 0123.456.789,0987.654.321
///
/// # First 50 numbers of a CSV, with financial deposits
/// kbo_publications -s ./store --input-csv enterprise.csv --limit 50 --deposits
///
/// # Refresh every enterprise already in the store
/// kbo_publications -s ./store
///
/// # Store statistics only
/// kbo_publications -s ./store --stats
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Directory of the JSON store
    #[arg(short, long, env = "KBO_STORE_DIR", default_value = "./kbo_store")]
    pub store_dir: String,

    /// Enterprise numbers to process, comma separated. Without these or
    /// `--input-csv`, the enterprises already in the store are refreshed
    #[arg(short, long, value_delimiter = ',')]
    pub enterprise_numbers: Vec<String>,

    /// CSV file with an `EnterpriseNumber` column
    #[arg(long)]
    pub input_csv: Option<PathBuf>,

    /// Process at most this many enterprises
    #[arg(short, long)]
    pub limit: Option<usize>,

    /// Optional path to config.yaml file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Also collect published financial deposits
    #[arg(long)]
    pub deposits: bool,

    /// Print store statistics and exit
    #[arg(long)]
    pub stats: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from([
            "kbo_publications",
            "--store-dir",
            "./store",
            "--enterprise-numbers",
            "0123.456.789,0987.654.321",
            "--deposits",
        ]);

        assert_eq!(cli.store_dir, "./store");
        assert_eq!(cli.enterprise_numbers, vec!["0123.456.789", "0987.654.321"]);
        assert!(cli.deposits);
        assert!(!cli.stats);
        assert!(cli.input_csv.is_none());
    }

    #[test]
    fn test_cli_short_flags() {
        let cli = Cli::parse_from([
            "kbo_publications",
            "-s",
            "/tmp/store",
            "-l",
            "10",
            "-c",
            "config.yaml",
        ]);

        assert_eq!(cli.store_dir, "/tmp/store");
        assert_eq!(cli.limit, Some(10));
        assert_eq!(cli.config, Some(PathBuf::from("config.yaml")));
        assert!(cli.enterprise_numbers.is_empty());
    }

    #[test]
    fn test_cli_stats_only() {
        let cli = Cli::parse_from(["kbo_publications", "-s", "./s", "--stats"]);
        assert!(cli.stats);
    }
}
