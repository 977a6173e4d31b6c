use clap::{ArgAction, Parser, Subcommand, ValueHint};

#[derive(Parser)]
#[command(
    author,
    version,
    about,
    help_template = "{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}"
)]
pub struct Args {
    /// Set output verbosity
    #[arg(short = 'v', long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress outputs
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output as json
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Disable colors in output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Provide custom config file
    #[arg(short, long, global = true, value_hint = ValueHint::FilePath)]
    pub config: Option<String>,

    /// Override the working directory holding the catalog and packages
    #[arg(short = 'w', long, global = true, value_hint = ValueHint::DirPath)]
    pub workdir: Option<String>,

    /// Set proxy
    #[arg(required = false, long, short = 'P', global = true)]
    pub proxy: Option<String>,

    /// Set request headers
    #[arg(required = false, long, short = 'H', global = true)]
    pub header: Option<Vec<String>>,

    /// Set user agent
    #[arg(required = false, long, short = 'A', global = true)]
    pub user_agent: Option<String>,

    /// Defaults to `info`
    #[clap(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Refresh the catalog and download missing web extensions
    #[clap(name = "sync", visible_alias = "s")]
    Sync {
        /// Keep the stored catalog, only download missing packages
        #[arg(short = 'n', long = "nometa")]
        no_meta: bool,

        /// Stop after this many catalog pages
        #[arg(long)]
        max_pages: Option<u64>,

        /// Keep at most this many catalog records
        #[arg(long)]
        max_records: Option<usize>,

        /// Only catalog entries with at least this many daily users
        #[arg(long)]
        min_users: Option<u64>,

        /// Only catalog entries with fewer daily users than this
        #[arg(long)]
        max_users: Option<u64>,
    },

    /// List catalog ids, hashes and names matching the selectors
    #[command(arg_required_else_help = true)]
    #[clap(name = "query", visible_alias = "q")]
    Query {
        /// `all`, `orphans`, catalog ids, content hashes or name patterns
        #[arg(required = true)]
        selectors: Vec<String>,
    },

    /// Print the stored package paths of the selectors
    #[command(arg_required_else_help = true)]
    #[clap(name = "get")]
    Get {
        #[arg(required = true)]
        selectors: Vec<String>,
    },

    /// Show catalog and store counts
    Info,

    /// Print the catalog records of the selectors as JSON
    Meta {
        #[arg(default_value = "all")]
        selectors: Vec<String>,
    },

    /// Write popularity and permission statistics as CSV
    Stats {
        /// Output file; stdout when omitted
        #[arg(short, long, value_hint = ValueHint::FilePath)]
        output: Option<String>,
    },

    /// Check stored packages against their hashes
    Verify {
        #[arg(default_value = "all")]
        selectors: Vec<String>,
    },

    /// Generate a default config file
    #[clap(name = "defconfig")]
    DefConfig,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_default_command_is_none() {
        let args = Args::try_parse_from(["extmirror", "-v"]).unwrap();
        assert!(args.command.is_none());
        assert_eq!(args.verbose, 1);
    }

    #[test]
    fn test_sync_flags() {
        let args =
            Args::try_parse_from(["extmirror", "sync", "-n", "--max-pages", "3"]).unwrap();
        match args.command {
            Some(Commands::Sync {
                no_meta, max_pages, ..
            }) => {
                assert!(no_meta);
                assert_eq!(max_pages, Some(3));
            }
            _ => panic!("expected sync"),
        }
    }

    #[test]
    fn test_meta_defaults_to_all() {
        let args = Args::try_parse_from(["extmirror", "meta"]).unwrap();
        match args.command {
            Some(Commands::Meta { selectors }) => assert_eq!(selectors, vec!["all"]),
            _ => panic!("expected meta"),
        }
    }

    #[test]
    fn test_query_requires_selectors() {
        assert!(Args::try_parse_from(["extmirror", "query"]).is_err());
    }
}
