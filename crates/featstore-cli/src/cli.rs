//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Output format for commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Which table of the database a command works on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum StoreKind {
    /// Generic GeoJSON features
    #[default]
    Features,
    /// Procedure descriptions
    Procedures,
    /// System descriptions
    Systems,
}

/// Reusable output arguments
#[derive(Debug, Clone, Args)]
pub struct OutputArgs {
    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

/// Entry selection arguments
#[derive(Debug, Clone, Default, Args)]
pub struct SelectArgs {
    /// Unique identifier, a trailing '*' matches any suffix (repeatable)
    #[arg(long)]
    pub uid: Vec<String>,

    /// Bounding box as min_x,min_y,max_x,max_y
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
    pub bbox: Option<Vec<f64>>,

    /// Only versions valid at this time (RFC3339 or YYYY-MM-DD, or "now")
    #[arg(long)]
    pub at: Option<String>,

    /// Only the latest version of each feature
    #[arg(long, conflicts_with = "at")]
    pub latest: bool,

    /// Match uid, name or description (repeatable)
    #[arg(short, long)]
    pub keyword: Vec<String>,

    /// Maximum number of entries
    #[arg(short, long)]
    pub limit: Option<usize>,
}

#[derive(Parser)]
#[command(name = "featstore")]
#[command(author, version, about = "CLI for the featstore feature store", long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Store configuration file
    #[arg(short, long, global = true, env = "FEATSTORE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Database file, overrides the configured path
    #[arg(short, long, global = true, env = "FEATSTORE_DB")]
    pub database: Option<PathBuf>,

    /// Write output to file instead of stdout
    #[arg(short, long, global = true)]
    pub output: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Import a GeoJSON Feature or FeatureCollection
    Import {
        /// GeoJSON file, '-' for stdin
        input: PathBuf,

        /// Parent id of the imported features
        #[arg(long)]
        parent: Option<u64>,
    },

    /// Show the current version of a feature
    Get {
        /// Unique identifier
        uid: String,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// List stored entries
    List {
        #[command(flatten)]
        select: SelectArgs,

        /// Table to list
        #[arg(long, value_enum, default_value = "features")]
        kind: StoreKind,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Show the extent of all stored geometries
    Bbox {
        #[command(flatten)]
        output: OutputArgs,
    },

    /// Count stored features and versions
    Count {
        /// Table to count
        #[arg(long, value_enum, default_value = "features")]
        kind: StoreKind,
    },

    /// Remove features
    Remove {
        /// Unique identifier of the feature whose current version is removed
        #[arg(id = "target_uid", value_name = "UID", required_unless_present = "all_matching")]
        uid: Option<String>,

        /// Remove every version matching the selection instead
        #[arg(long)]
        all_matching: bool,

        #[command(flatten)]
        select: SelectArgs,
    },

    /// Manage store configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Show the effective configuration
    Show,
    /// Print the configuration file path
    Path,
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_import() {
        let cli = Cli::try_parse_from([
            "featstore",
            "import",
            "gauges.geojson",
            "--parent",
            "7",
        ])
        .unwrap();
        match cli.command {
            Commands::Import { input, parent } => {
                assert_eq!(input, PathBuf::from("gauges.geojson"));
                assert_eq!(parent, Some(7));
            }
            _ => panic!("expected import"),
        }
    }

    #[test]
    fn test_parse_list_selection() {
        let cli = Cli::try_parse_from([
            "featstore",
            "-v",
            "list",
            "--bbox",
            "-5.5,40,10,52.25",
            "--uid",
            "urn:x:*",
            "--limit",
            "20",
            "--format",
            "json",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::List {
                select,
                kind,
                output,
            } => {
                assert_eq!(select.bbox, Some(vec![-5.5, 40.0, 10.0, 52.25]));
                assert_eq!(select.uid, ["urn:x:*"]);
                assert_eq!(select.limit, Some(20));
                assert_eq!(kind, StoreKind::Features);
                assert_eq!(output.format, OutputFormat::Json);
            }
            _ => panic!("expected list"),
        }
    }

    #[test]
    fn test_latest_conflicts_with_at() {
        assert!(Cli::try_parse_from(["featstore", "list", "--latest", "--at", "now"]).is_err());
    }

    #[test]
    fn test_remove_requires_target() {
        assert!(Cli::try_parse_from(["featstore", "remove"]).is_err());
        assert!(Cli::try_parse_from(["featstore", "remove", "urn:x:1"]).is_ok());
        assert!(
            Cli::try_parse_from(["featstore", "remove", "--all-matching", "--uid", "urn:x:*"]).is_ok()
        );
    }

    #[test]
    fn test_verbose_conflicts_with_quiet() {
        assert!(Cli::try_parse_from(["featstore", "-v", "-q", "count"]).is_err());
    }
}
